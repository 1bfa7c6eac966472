use std::{path::Path, path::PathBuf, time::Duration};

use derivative::Derivative;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    engine::{recommended_hash_mb, AdapterSettings, HostCapabilities},
    error::{Error, Result},
    play::{resignation::PROBE_DEPTH, MAX_LEVEL, MIN_LEVEL},
};

/// Runtime settings, loadable from a JSON file; every field is optional there
#[derive(Derivative, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CoachConfig {
    pub engine_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    #[derivative(Default(value = "10_000"))]
    pub init_timeout_ms: u64,
    #[derivative(Default(value = "5_000"))]
    pub ready_timeout_ms: u64,
    /// Depth of the searches that score player moves
    #[derivative(Default(value = "10"))]
    pub eval_depth: u32,
    /// Depth of the search that looks for a drawing resource before resigning
    #[derivative(Default(value = "PROBE_DEPTH"))]
    pub probe_depth: u32,
    /// Transposition table size; `None` picks one from installed memory
    pub hash_mb: Option<u32>,
    /// Level to use instead of the stored one
    pub level_override: Option<u8>,
    /// Seed for move sampling; random when absent
    pub seed: Option<u64>,
}

impl CoachConfig {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        let config: CoachConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.init_timeout_ms == 0 || self.ready_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        if self.eval_depth == 0 || self.probe_depth == 0 {
            return Err(Error::Config("evalDepth and probeDepth must be at least 1".to_string()));
        }
        if let Some(level) = self.level_override {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                return Err(Error::Config(format!(
                    "levelOverride must be between {} and {}",
                    MIN_LEVEL, MAX_LEVEL
                )));
            }
        }
        Ok(())
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            hash_mb: Some(self.hash_mb.unwrap_or_else(recommended_hash_mb)),
            host: HostCapabilities::detect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoachConfig::default();
        assert_eq!(config.init_timeout_ms, 10_000);
        assert_eq!(config.ready_timeout_ms, 5_000);
        assert_eq!(config.eval_depth, 10);
        assert_eq!(config.probe_depth, 8);
        assert!(config.validate().is_ok());

        let settings = CoachConfig {
            hash_mb: Some(32),
            ..Default::default()
        }
        .adapter_settings();
        assert_eq!(settings.init_timeout, Duration::from_secs(10));
        assert_eq!(settings.hash_mb, Some(32));
    }

    #[test]
    fn test_partial_json() {
        let config: CoachConfig =
            serde_json::from_str(r#"{ "enginePath": "/usr/bin/stockfish", "evalDepth": 14 }"#).unwrap();
        assert_eq!(config.engine_path, Some(PathBuf::from("/usr/bin/stockfish")));
        assert_eq!(config.eval_depth, 14);
        assert_eq!(config.ready_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "levelOverride": 30 }}"#).unwrap();
        assert!(matches!(CoachConfig::load(file.path()), Err(Error::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "seed": 7, "hashMb": 64 }}"#).unwrap();
        let config = CoachConfig::load(file.path()).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.hash_mb, Some(64));
    }
}
