//! Gateway configuration.
//!
//! Every field has a default, so an empty JSON object is a valid configuration.

use crate::registry::RegistryMode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_MAX_CONCURRENT_FIELDS: usize = 32;
const DEFAULT_MUTATION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether any registered (or ad-hoc) document may run,
    /// or only explicitly allowed persisted queries
    pub registry_mode: RegistryMode,

    pub execution: ExecutionConfig,

    /// Upper bound for a single mutation handler. `None` disables the bound.
    pub mutation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// How many sibling fields of one selection set may be resolved at the same time.
    /// `0` is treated as `1`.
    pub max_concurrent_fields: usize,

    /// Upper bound for a single field resolver. `None` disables the bound.
    pub resolver_timeout_ms: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            registry_mode: RegistryMode::Open,
            execution: ExecutionConfig::default(),
            mutation_timeout_ms: Some(DEFAULT_MUTATION_TIMEOUT_MS),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fields: DEFAULT_MAX_CONCURRENT_FIELDS,
            resolver_timeout_ms: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_json(json: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json)
    }

    pub fn mutation_timeout(&self) -> Option<Duration> {
        self.mutation_timeout_ms.map(Duration::from_millis)
    }
}

impl ExecutionConfig {
    pub fn resolver_timeout(&self) -> Option<Duration> {
        self.resolver_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.max_concurrent_fields.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(GatewayConfig::from_json(b"{}").unwrap(), GatewayConfig::default());
    }

    #[test]
    fn parses_every_field() {
        let config = GatewayConfig::from_json(
            br#"{
                "registry_mode": "whitelist",
                "execution": { "max_concurrent_fields": 4, "resolver_timeout_ms": 250 },
                "mutation_timeout_ms": null
            }"#,
        )
        .unwrap();
        assert_eq!(config.registry_mode, RegistryMode::Whitelist);
        assert_eq!(config.execution.concurrency(), 4);
        assert_eq!(
            config.execution.resolver_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.mutation_timeout(), None);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(GatewayConfig::from_json(br#"{ "registry": "open" }"#).is_err());
    }

    #[test]
    fn zero_concurrency_still_makes_progress() {
        let config = ExecutionConfig {
            max_concurrent_fields: 0,
            resolver_timeout_ms: None,
        };
        assert_eq!(config.concurrency(), 1);
    }
}
