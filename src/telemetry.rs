//! Logging setup
//!
//! Log levels come from `CONNASCENCE_LOG` (e.g.
//! `CONNASCENCE_LOG=connascence::cache=debug,connascence=info`). Without it,
//! `connascence=info` is used, or `connascence=debug` when verbose.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "CONNASCENCE_LOG";

static INIT: Once = Once::new();

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "connascence=debug"
    } else {
        "connascence=info"
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        let installed = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_thread_ids(verbose),
            )
            .with(filter)
            .try_init();
        if installed.is_err() {
            eprintln!("Warning: a tracing subscriber was already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
        tracing::info!("still fine");
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "connascence=info");
        assert_eq!(default_directive(true), "connascence=debug");
    }
}
