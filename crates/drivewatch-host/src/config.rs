/// Host configuration, read once at startup from environment variables.
///
/// | Variable | Meaning | Default |
/// |---|---|---|
/// | `DRIVEWATCH_EXPORT_DIR` | Directory the CSV history is written to on shutdown | unset: no export |
/// | `DRIVEWATCH_EXPORT_NAME` | File-name stem of the export | `devices` |
/// | `DRIVEWATCH_LOG` | `error`, `warn`, `info`, `debug` or `trace` | `info` |
/// | `USERNAME` / `USER` | User stamped into history records | `unknown` |
/// | `COMPUTERNAME` / `HOSTNAME` | Machine stamped into history records | `unknown` |
use std::path::PathBuf;
use tracing::Level;

pub const ENV_EXPORT_DIR: &str = "DRIVEWATCH_EXPORT_DIR";
pub const ENV_EXPORT_NAME: &str = "DRIVEWATCH_EXPORT_NAME";
pub const ENV_LOG: &str = "DRIVEWATCH_LOG";

const DEFAULT_EXPORT_NAME: &str = "devices";
const UNKNOWN: &str = "unknown";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DRIVEWATCH_LOG={0:?} is not a log level (expected error, warn, info, debug or trace)")]
    InvalidLogLevel(String),
    #[error("DRIVEWATCH_EXPORT_NAME must not contain path separators, got {0:?}")]
    InvalidExportName(String),
}

/// Who and where the history records are attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_name: String,
    pub machine_name: String,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub export_dir: Option<PathBuf>,
    pub export_name: String,
    pub log_level: Level,
    pub identity: Identity,
}

impl HostConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level = match get(ENV_LOG) {
            Some(raw) => raw
                .trim()
                .parse::<Level>()
                .map_err(|_| ConfigError::InvalidLogLevel(raw.clone()))?,
            None => Level::INFO,
        };

        let export_name = match get(ENV_EXPORT_NAME) {
            Some(name) if name.contains(['/', '\\']) => {
                return Err(ConfigError::InvalidExportName(name));
            }
            Some(name) => name.trim().to_string(),
            None => DEFAULT_EXPORT_NAME.to_string(),
        };

        let identity = Identity {
            user_name: get("USERNAME")
                .or_else(|| get("USER"))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            machine_name: get("COMPUTERNAME")
                .or_else(|| get("HOSTNAME"))
                .unwrap_or_else(|| UNKNOWN.to_string()),
        };

        Ok(Self {
            export_dir: get(ENV_EXPORT_DIR).map(PathBuf::from),
            export_name,
            log_level,
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<HostConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HostConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.export_dir, None);
        assert_eq!(cfg.export_name, "devices");
        assert_eq!(cfg.log_level, Level::INFO);
        assert_eq!(cfg.identity.user_name, "unknown");
        assert_eq!(cfg.identity.machine_name, "unknown");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            (ENV_EXPORT_DIR, "C:\\exports"),
            (ENV_EXPORT_NAME, "usb"),
            (ENV_LOG, "debug"),
            ("USERNAME", "alex"),
            ("COMPUTERNAME", "WS-01"),
        ])
        .unwrap();
        assert_eq!(cfg.export_dir, Some(PathBuf::from("C:\\exports")));
        assert_eq!(cfg.export_name, "usb");
        assert_eq!(cfg.log_level, Level::DEBUG);
        assert_eq!(cfg.identity.user_name, "alex");
        assert_eq!(cfg.identity.machine_name, "WS-01");
    }

    #[test]
    fn test_unix_identity_fallback() {
        let cfg = config(&[("USER", "sam"), ("HOSTNAME", "box"), ("USERNAME", "")]).unwrap();
        assert_eq!(cfg.identity.user_name, "sam");
        assert_eq!(cfg.identity.machine_name, "box");
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            config(&[(ENV_LOG, "loud")]).unwrap_err(),
            ConfigError::InvalidLogLevel("loud".to_string())
        );
        assert!(matches!(
            config(&[(ENV_EXPORT_NAME, "../x")]),
            Err(ConfigError::InvalidExportName(_))
        ));
        assert!(matches!(
            config(&[(ENV_EXPORT_NAME, "a\\b")]),
            Err(ConfigError::InvalidExportName(_))
        ));
    }

    #[test]
    fn test_blank_export_name_uses_default() {
        for blank in ["", " ", "\t"] {
            let cfg = config(&[(ENV_EXPORT_NAME, blank)]).unwrap();
            assert_eq!(cfg.export_name, "devices", "{blank:?}");
        }
        let cfg = config(&[(ENV_EXPORT_NAME, "  usb ")]).unwrap();
        assert_eq!(cfg.export_name, "usb");
    }
}
