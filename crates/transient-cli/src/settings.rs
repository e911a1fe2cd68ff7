//! Layered settings: defaults < TOML file < `TRANSIENT_*` environment < flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use transient_runtime::{ReclaimConfig, ScopeId};

use crate::error::ConfigError;

const ENV_PREFIX: &str = "TRANSIENT_";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Marks a chat line as a command.
    pub command_prefix: String,
    pub grace_period_secs: u64,
    pub group_settle_ms: u64,
    /// Bot token file. Startup fails if it is set but unreadable or malformed.
    pub token_file: Option<PathBuf>,
    /// Directory for the daily log file; no file sink when unset.
    pub log_dir: Option<PathBuf>,
    /// Scope (guild) the console acts in.
    pub scope: ScopeId,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_prefix: "/".to_string(),
            grace_period_secs: 5,
            group_settle_ms: 1000,
            token_file: None,
            log_dir: None,
            scope: ScopeId(1),
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `path` when given. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TRANSIENT_*` variables. Unrelated variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "COMMAND_PREFIX" => self.command_prefix = value,
                "GRACE_PERIOD_SECS" => self.grace_period_secs = parse_number(&key, &value)?,
                "GROUP_SETTLE_MS" => self.group_settle_ms = parse_number(&key, &value)?,
                "TOKEN_FILE" => self.token_file = Some(PathBuf::from(value)),
                "LOG_DIR" => self.log_dir = Some(PathBuf::from(value)),
                "SCOPE" => self.scope = ScopeId(parse_number(&key, &value)?),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "command_prefix",
                "must be non-empty and contain no whitespace",
            ));
        }
        if self.grace_period_secs == 0 {
            return Err(ConfigError::invalid(
                "grace_period_secs",
                "must be at least one second",
            ));
        }
        Ok(())
    }

    pub fn reclaim_config(&self) -> ReclaimConfig {
        ReclaimConfig {
            grace_period: Duration::from_secs(self.grace_period_secs),
            group_settle_delay: Duration::from_millis(self.group_settle_ms),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, format!("`{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_the_bot_behaviour() {
        let settings = Settings::load(None).expect("defaults");
        assert_eq!(settings.command_prefix, "/");
        assert_eq!(
            settings.reclaim_config(),
            ReclaimConfig {
                grace_period: Duration::from_secs(5),
                group_settle_delay: Duration::from_secs(1),
            }
        );
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn file_values_override_defaults_and_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "command_prefix = \"!\"\ngrace_period_secs = 30\nscope = 42")
            .expect("write");

        let mut settings = Settings::load(Some(file.path())).expect("load");
        assert_eq!(settings.command_prefix, "!");
        assert_eq!(settings.grace_period_secs, 30);
        assert_eq!(settings.group_settle_ms, 1000);
        assert_eq!(settings.scope, ScopeId(42));

        settings
            .apply_env(vars(&[
                ("TRANSIENT_GRACE_PERIOD_SECS", "12"),
                ("TRANSIENT_LOG_DIR", "/var/log/transient"),
                ("TRANSIENT_SCOPE", "7"),
                ("HOME", "/root"),
            ]))
            .expect("env");
        assert_eq!(settings.grace_period_secs, 12);
        assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/transient")));
        assert_eq!(settings.command_prefix, "!");
        assert_eq!(settings.scope, ScopeId(7));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/transient.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "grace = 3").expect("write");
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn bad_numbers_and_prefixes_are_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(vars(&[("TRANSIENT_GRACE_PERIOD_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRANSIENT_GRACE_PERIOD_SECS"));

        settings.command_prefix = "go ".to_string();
        assert!(settings.validate().is_err());

        let settings = Settings {
            grace_period_secs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
