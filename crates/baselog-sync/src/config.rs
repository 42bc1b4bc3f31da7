//! Engine configuration.
//!
//! Reconciliation policy is data, not code: the retry schedule, the rule for
//! accepting a read and the reaction to a failed write are all set here.

use std::time::Duration;

use crate::error::ConfigError;

/// Base Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 84532;

/// Upper bound on reads in one reconciliation sequence.
pub const MAX_ATTEMPTS: usize = 16;

/// Delays before each authoritative read of a reconciliation sequence.
///
/// Delays are relative to the previous read (or to the `Submitted`
/// transition for the first one) and never decrease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::escalating()
    }
}

impl RetrySchedule {
    /// Validate and build a schedule.
    pub fn new(delays: Vec<Duration>) -> Result<Self, ConfigError> {
        if delays.is_empty() {
            return Err(ConfigError::InvalidSchedule("no attempts".to_string()));
        }
        if delays.len() > MAX_ATTEMPTS {
            return Err(ConfigError::InvalidSchedule(format!(
                "{} attempts exceeds the limit of {}",
                delays.len(),
                MAX_ATTEMPTS
            )));
        }
        if let Some(i) = delays.windows(2).position(|w| w[1] < w[0]) {
            return Err(ConfigError::InvalidSchedule(format!(
                "delay {} ({:?}) is shorter than delay {} ({:?})",
                i + 1,
                delays[i + 1],
                i,
                delays[i]
            )));
        }
        Ok(Self { delays })
    }

    /// Five reads, 1s, 2s, 4s, 8s then 15s apart.
    pub fn escalating() -> Self {
        Self {
            delays: [1, 2, 4, 8, 15].into_iter().map(Duration::from_secs).collect(),
        }
    }

    /// A single read after `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delays: vec![delay],
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Sum of all delays.
    pub fn total(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Parse a comma separated list of milliseconds, e.g. `"1000,2000,4000"`.
    pub fn parse_millis(s: &str) -> Result<Self, ConfigError> {
        let delays = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| {
                        ConfigError::InvalidSchedule(format!("not a number of milliseconds: {p:?}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(delays)
    }
}

/// When an authoritative read ends a reconciliation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptPolicy {
    /// Any non-empty payload.
    AnyData,
    /// Only a payload whose entry for the attempt's slot holds the attempt's mood.
    #[default]
    ReflectsWrite,
}

/// What the grid does when a write fails after its optimistic projection is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Leave the optimistic projection on screen.
    #[default]
    KeepOptimistic,
    /// Restore the projection shown before the selection, if nothing newer replaced it.
    Retract,
}

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Reconciliation read schedule.
    pub schedule: RetrySchedule,

    /// Rule for accepting an authoritative read.
    pub accept: AcceptPolicy,

    /// Reaction to a write failing after `Submitted`.
    pub failure_policy: FailurePolicy,

    /// How long to wait for the confirmation watcher.
    pub confirmation_timeout: Duration,

    /// How long a settled attempt stays current before it is retired.
    pub observation_window: Duration,

    /// Network the wallet must be on to submit.
    pub required_chain_id: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule: RetrySchedule::default(),
            accept: AcceptPolicy::default(),
            failure_policy: FailurePolicy::default(),
            confirmation_timeout: Duration::from_secs(60),
            observation_window: Duration::from_secs(10),
            required_chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// - `BASELOG_RETRY_DELAYS_MS`: comma separated delays
    /// - `BASELOG_CONFIRM_TIMEOUT_MS`
    /// - `BASELOG_OBSERVATION_WINDOW_MS`
    /// - `BASELOG_FAILURE_POLICY`: `keep` or `retract`
    /// - `BASELOG_ACCEPT_POLICY`: `any` or `reflects-write`
    /// - `BASELOG_CHAIN_ID`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("BASELOG_RETRY_DELAYS_MS") {
            config.schedule = RetrySchedule::parse_millis(&v)?;
        }
        if let Some(v) = lookup("BASELOG_CONFIRM_TIMEOUT_MS") {
            config.confirmation_timeout = parse_millis("BASELOG_CONFIRM_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("BASELOG_OBSERVATION_WINDOW_MS") {
            config.observation_window = parse_millis("BASELOG_OBSERVATION_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("BASELOG_FAILURE_POLICY") {
            config.failure_policy = match v.trim() {
                "keep" | "keep-optimistic" => FailurePolicy::KeepOptimistic,
                "retract" => FailurePolicy::Retract,
                _ => return Err(invalid("BASELOG_FAILURE_POLICY", &v)),
            };
        }
        if let Some(v) = lookup("BASELOG_ACCEPT_POLICY") {
            config.accept = match v.trim() {
                "any" | "any-data" => AcceptPolicy::AnyData,
                "reflects-write" => AcceptPolicy::ReflectsWrite,
                _ => return Err(invalid("BASELOG_ACCEPT_POLICY", &v)),
            };
        }
        if let Some(v) = lookup("BASELOG_CHAIN_ID") {
            config.required_chain_id =
                v.trim().parse().map_err(|_| invalid("BASELOG_CHAIN_ID", &v))?;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_accept_policy(mut self, accept: AcceptPolicy) -> Self {
        self.accept = accept;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_observation_window(mut self, window: Duration) -> Self {
        self.observation_window = window;
        self
    }

    #[must_use]
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.required_chain_id = chain_id;
        self
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| invalid(key, value))
}
