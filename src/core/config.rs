/// Engine configuration — choice cardinality, canon deadline, seeding.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Where variation randomness comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeedStrategy {
    /// Derived from the state fingerprint (which includes the turn counter).
    #[default]
    FromState,
    /// Externally supplied seed, combined with the turn counter.
    Fixed(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_choices: usize,
    /// Turns into an act after which outstanding canon is force-picked.
    /// `None` means canon only advances opportunistically.
    pub force_canon_after_turns: Option<u32>,
    pub variation_seed: SeedStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_choices: 3,
            force_canon_after_turns: None,
            variation_seed: SeedStrategy::FromState,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_choices == 0 {
            return Err(ConfigError::Invalid(
                "max_choices must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_choices, 3);
        assert_eq!(config.force_canon_after_turns, None);
        assert_eq!(config.variation_seed, SeedStrategy::FromState);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_ron() {
        let config = EngineConfig::parse_ron("(force_canon_after_turns: Some(2))").unwrap();
        assert_eq!(config.max_choices, 3);
        assert_eq!(config.force_canon_after_turns, Some(2));

        let config =
            EngineConfig::parse_ron("(max_choices: 5, variation_seed: Fixed(99))").unwrap();
        assert_eq!(config.max_choices, 5);
        assert_eq!(config.variation_seed, SeedStrategy::Fixed(99));
    }

    #[test]
    fn zero_choices_rejected() {
        assert!(matches!(
            EngineConfig::parse_ron("(max_choices: 0)"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_ron_rejected() {
        assert!(matches!(
            EngineConfig::parse_ron("(max_choices: \"three\")"),
            Err(ConfigError::Ron(_))
        ));
    }
}
