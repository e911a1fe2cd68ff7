//! Bot token loading.

use std::fmt;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Length of a bot token as issued by the chat platform.
pub const TOKEN_LEN: usize = 59;

pub struct Credentials {
    token: SecretString,
}

impl Credentials {
    /// Read the first line of `path` as the token.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|reason| ConfigError::Token {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let token = raw.lines().next().unwrap_or_default().trim();
        if token.is_empty() {
            return Err("token file is empty".to_string());
        }
        let len = token.chars().count();
        if len != TOKEN_LEN {
            return Err(format!("expected {TOKEN_LEN} characters, found {len}"));
        }
        Ok(Self {
            token: SecretString::from(token.to_string()),
        })
    }

    /// Safe to log: the last four characters only.
    pub fn fingerprint(&self) -> String {
        let token = self.token.expose_secret();
        let tail: String = token.chars().skip(TOKEN_LEN - 4).collect();
        format!("…{tail}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.fingerprint())
            .finish()
    }
}
