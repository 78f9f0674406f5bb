//! Tracer configuration.
//!
//! Plain data with defaults. The kernel never reads files or environment
//! variables itself; embedders build a [`TracerConfig`] in code or
//! deserialize one from their own configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-run ceilings enforced inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Maximum events one run may record.
    pub max_events: usize,
    /// Maximum macrotasks one run may dispatch.
    pub max_macrotasks: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            max_macrotasks: 1_000,
        }
    }
}

/// Host-side settings for [`crate::Tracer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Wall-clock budget for one run, sandbox start to reply.
    #[serde(with = "duration_ms")]
    pub run_timeout: Duration,
    /// Ceilings enforced inside the sandbox.
    pub limits: SandboxLimits,
    /// Completed traces kept by source text; 0 disables caching.
    pub cache_capacity: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(5),
            limits: SandboxLimits::default(),
            cache_capacity: 64,
        }
    }
}

impl TracerConfig {
    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.limits.max_events = max_events;
        self
    }

    pub fn with_max_macrotasks(mut self, max_macrotasks: usize) -> Self {
        self.limits.max_macrotasks = max_macrotasks;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TracerConfig::default();
        assert_eq!(config.run_timeout, Duration::from_secs(5));
        assert_eq!(config.limits.max_events, 10_000);
        assert_eq!(config.limits.max_macrotasks, 1_000);
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn test_builders() {
        let config = TracerConfig::default()
            .with_run_timeout(Duration::from_millis(250))
            .with_max_events(10)
            .with_max_macrotasks(2)
            .with_cache_capacity(0);
        assert_eq!(config.run_timeout, Duration::from_millis(250));
        assert_eq!(config.limits, SandboxLimits { max_events: 10, max_macrotasks: 2 });
        assert_eq!(config.cache_capacity, 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TracerConfig =
            serde_json::from_str(r#"{ "run_timeout": 1500, "limits": { "max_events": 5 } }"#)
                .unwrap();
        assert_eq!(config.run_timeout, Duration::from_millis(1500));
        assert_eq!(config.limits.max_events, 5);
        assert_eq!(config.limits.max_macrotasks, 1_000);
        assert_eq!(config.cache_capacity, 64);
    }
}
