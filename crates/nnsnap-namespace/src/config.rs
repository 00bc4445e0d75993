use nnsnap_error::{Result, SnapError};
use nnsnap_types::Replication;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_REPLICATION: u16 = 3;
pub const DEFAULT_MIN_REPLICATION: u16 = 1;
pub const DEFAULT_MAX_REPLICATION: u16 = 512;
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;
pub const DEFAULT_MAX_SNAPSHOTS: usize = 65_536;

/// Namespace limits, loaded from JSON. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Replication for files created without an explicit factor.
    pub default_replication: u16,
    pub min_replication: u16,
    pub max_replication: u16,
    /// Largest block the namespace allocates for one append.
    pub block_size: u64,
    /// Maximum number of snapshots retained at once.
    pub max_snapshots: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            default_replication: DEFAULT_REPLICATION,
            min_replication: DEFAULT_MIN_REPLICATION,
            max_replication: DEFAULT_MAX_REPLICATION,
            block_size: DEFAULT_BLOCK_SIZE,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
        }
    }
}

impl NamespaceConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| SnapError::Config(format!("parse: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_replication == 0 {
            return Err(SnapError::Config(
                "min_replication must be positive".to_owned(),
            ));
        }
        if self.min_replication > self.max_replication {
            return Err(SnapError::Config(format!(
                "min_replication {} exceeds max_replication {}",
                self.min_replication, self.max_replication
            )));
        }
        if !(self.min_replication..=self.max_replication).contains(&self.default_replication) {
            return Err(SnapError::Config(format!(
                "default_replication {} outside {}..={}",
                self.default_replication, self.min_replication, self.max_replication
            )));
        }
        if self.block_size == 0 {
            return Err(SnapError::Config("block_size must be positive".to_owned()));
        }
        if self.max_snapshots == 0 {
            return Err(SnapError::Config(
                "max_snapshots must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Check a requested replication factor against the configured bounds.
    pub fn check_replication(&self, requested: u16) -> Result<Replication> {
        if (self.min_replication..=self.max_replication).contains(&requested) {
            Ok(Replication(requested))
        } else {
            Err(SnapError::InvalidReplication {
                requested,
                min: self.min_replication,
                max: self.max_replication,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        NamespaceConfig::default().validate().expect("defaults");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            NamespaceConfig::from_json_str(r#"{"block_size": 65536, "max_replication": 10}"#)
                .expect("parse");
        assert_eq!(config.block_size, 65_536);
        assert_eq!(config.max_replication, 10);
        assert_eq!(config.default_replication, DEFAULT_REPLICATION);
    }

    #[test]
    fn unknown_fields_and_bad_bounds_are_rejected() {
        let err = NamespaceConfig::from_json_str(r#"{"blocksize": 1}"#).expect_err("typo");
        assert!(matches!(err, SnapError::Config(_)));

        let err = NamespaceConfig::from_json_str(r#"{"min_replication": 5, "max_replication": 2}"#)
            .expect_err("inverted bounds");
        assert!(err.to_string().contains("exceeds"));

        let err = NamespaceConfig::from_json_str(r#"{"default_replication": 0}"#)
            .expect_err("default below min");
        assert!(matches!(err, SnapError::Config(_)));
    }

    #[test]
    fn replication_bounds_are_enforced() {
        let config = NamespaceConfig {
            max_replication: 6,
            ..NamespaceConfig::default()
        };
        assert_eq!(config.check_replication(6).expect("upper bound"), Replication(6));
        let err = config.check_replication(7).expect_err("too high");
        assert!(matches!(
            err,
            SnapError::InvalidReplication {
                requested: 7,
                min: 1,
                max: 6
            }
        ));
        assert!(config.check_replication(0).is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"max_snapshots": 8}}"#).expect("write config");
        let config = NamespaceConfig::load(file.path()).expect("load");
        assert_eq!(config.max_snapshots, 8);

        let missing = NamespaceConfig::load("/nonexistent/nnsnap.json").expect_err("missing");
        assert!(matches!(missing, SnapError::Io(_)));
    }
}
