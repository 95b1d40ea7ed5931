//! Engine configuration.

use crate::error::AttributeError;
use crate::kind::AttributeKind;
use serde::{Deserialize, Serialize};

/// Tunables for an [`AttributeChanger`](crate::AttributeChanger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest change cascade allowed before processing aborts.
    pub max_propagation_depth: usize,
    /// Base (and initial final) value of every slot of a new owner.
    pub default_base_value: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_propagation_depth: 1024,
            default_base_value: 0.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration. Missing fields use defaults.
    pub fn from_json<K: AttributeKind>(json: &str) -> Result<Self, AttributeError<K>> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| AttributeError::InvalidConfig(e.to_string()))?;
        config.validate::<K>()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate<K: AttributeKind>(&self) -> Result<(), AttributeError<K>> {
        if self.max_propagation_depth == 0 {
            return Err(AttributeError::InvalidConfig(
                "max_propagation_depth must be at least 1".into(),
            ));
        }
        if !self.default_base_value.is_finite() {
            return Err(AttributeError::InvalidConfig(format!(
                "default_base_value must be finite, got {}",
                self.default_base_value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_json::<Stat>(r#"{ "default_base_value": 10.0 }"#).unwrap();
        assert_eq!(config.default_base_value, 10.0);
        assert_eq!(config.max_propagation_depth, 1024);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = EngineConfig::from_json::<Stat>(r#"{ "max_propagation_depth": 0 }"#).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = EngineConfig::from_json::<Stat>("{ nope").unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }
}
