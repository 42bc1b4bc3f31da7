//! Logging setup for BaseLog binaries.
//!
//! `RUST_LOG` wins when set; otherwise `default_filter` applies.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit default is given.
pub const DEFAULT_FILTER: &str = "baselog=info,baselog_sync=info,baselog_sim=info";

/// Install the global subscriber. Does nothing if one is already installed.
pub fn init(default_filter: &str) {
    if try_init(default_filter).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Install the global subscriber, failing if one is already installed.
pub fn try_init(default_filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

/// `RUST_LOG` if set and valid, `default_filter` otherwise.
pub fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init(DEFAULT_FILTER);
        init(DEFAULT_FILTER);
        assert!(try_init(DEFAULT_FILTER).is_err());
    }
}
