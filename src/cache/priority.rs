//! Cache priority scoring
//!
//! Each factor lands in [0, 1]; the priority is their mean. Higher priority
//! files are warmed first and evicted last.

use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Observed history for one path. Survives [`super::CacheManager::clear`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileHistory {
    pub violations: usize,
    pub lines: usize,
    pub in_degree: usize,
    pub accesses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityFactors {
    pub recency: f64,
    pub inverse_size: f64,
    pub violation_density: f64,
    pub in_degree: f64,
    pub access_frequency: f64,
}

const SIZE_SCALE: f64 = 64.0 * 1024.0;
const DENSITY_SCALE: f64 = 10.0;
const SATURATION: f64 = 4.0;

impl PriorityFactors {
    pub fn compute(
        modified: Option<SystemTime>,
        now: SystemTime,
        size_bytes: u64,
        history: Option<&FileHistory>,
    ) -> Self {
        let recency = match modified {
            Some(mtime) => {
                let age = now.duration_since(mtime).unwrap_or(Duration::ZERO);
                1.0 / (1.0 + age.as_secs_f64() / 86_400.0)
            }
            None => 0.0,
        };
        let inverse_size = 1.0 / (1.0 + size_bytes as f64 / SIZE_SCALE);

        let (violation_density, in_degree, access_frequency) = match history {
            Some(h) => {
                let density = h.violations as f64 / h.lines.max(1) as f64 * DENSITY_SCALE;
                let degree = h.in_degree as f64;
                let accesses = h.accesses as f64;
                (
                    density.min(1.0),
                    degree / (degree + SATURATION),
                    accesses / (accesses + SATURATION),
                )
            }
            None => (0.0, 0.0, 0.0),
        };

        Self {
            recency,
            inverse_size,
            violation_density,
            in_degree,
            access_frequency,
        }
    }

    /// Mean of the five factors
    pub fn score(&self) -> f64 {
        let sum = self.recency
            + self.inverse_size
            + self.violation_density
            + self.in_degree
            + self.access_frequency;
        (sum / 5.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factors_are_bounded() {
        let now = SystemTime::now();
        let history = FileHistory {
            violations: 500,
            lines: 10,
            in_degree: 1000,
            accesses: 1000,
        };
        let f = PriorityFactors::compute(Some(now), now, 0, Some(&history));
        for value in [
            f.recency,
            f.inverse_size,
            f.violation_density,
            f.in_degree,
            f.access_frequency,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(f.score() > 0.9);
    }

    #[test]
    fn test_history_raises_priority() {
        let now = SystemTime::now();
        let cold = PriorityFactors::compute(Some(now), now, 4096, None);
        let hot = PriorityFactors::compute(
            Some(now),
            now,
            4096,
            Some(&FileHistory {
                violations: 3,
                lines: 100,
                in_degree: 4,
                accesses: 12,
            }),
        );
        assert!(hot.score() > cold.score());
    }

    #[test]
    fn test_older_and_larger_files_rank_lower() {
        let now = SystemTime::now();
        let week_ago = now - Duration::from_secs(7 * 86_400);
        let fresh = PriorityFactors::compute(Some(now), now, 1024, None);
        let stale = PriorityFactors::compute(Some(week_ago), now, 1024, None);
        let large = PriorityFactors::compute(Some(now), now, 10 * 1024 * 1024, None);
        assert!(fresh.score() > stale.score());
        assert!(fresh.score() > large.score());
    }
}
