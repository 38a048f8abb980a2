//! Host connection configuration.

use crate::error::{EsxiError, EsxiResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted when the config carries no password.
pub const PASSWORD_ENV: &str = "ESXI_PASSWORD";

/// How to reach and authenticate against an ESXi host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// ESXi hostname / IP (e.g. "esx01.lab.local")
    pub host: String,
    /// SSH port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login (default "root")
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Private key used instead of the password when set
    #[serde(default)]
    pub private_key_path: Option<String>,
    /// Per-command session timeout in seconds (0 disables it)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Distributed switch targeted by ENS FPO changes that name none
    #[serde(default)]
    pub default_vds: Option<String>,
}

fn default_port() -> u16 {
    22
}
fn default_username() -> String {
    "root".to_string()
}
fn default_timeout() -> u64 {
    30
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: None,
            private_key_path: None,
            timeout_secs: default_timeout(),
            default_vds: None,
        }
    }
}

impl HostConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Load a YAML config file, filling the password from `ESXI_PASSWORD`.
    pub fn from_file(path: impl AsRef<Path>) -> EsxiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EsxiError::invalid_parameter(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let mut config: HostConfig = serde_yaml::from_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Fill missing secrets from the environment.
    pub fn apply_env(&mut self) {
        if self.password.is_none() {
            if let Ok(pw) = std::env::var(PASSWORD_ENV) {
                self.password = Some(pw);
            }
        }
    }

    pub fn validate(&self) -> EsxiResult<()> {
        if self.host.trim().is_empty() {
            return Err(EsxiError::invalid_parameter("Host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(EsxiError::invalid_parameter("Username must not be empty"));
        }
        if self.password.is_none() && self.private_key_path.is_none() {
            return Err(EsxiError::invalid_parameter(format!(
                "No credentials for {}: set password, privateKeyPath or {PASSWORD_ENV}",
                self.host
            )));
        }
        Ok(())
    }

    /// `host:port` for the TCP connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_optional_fields() {
        let config: HostConfig =
            serde_yaml::from_str("host: esx01.lab\npassword: secret\n").unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "root");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.default_vds.is_none());
        assert_eq!(config.address(), "esx01.lab:22");
    }

    #[test]
    fn from_file_reads_camel_case_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host: 10.0.0.5\nport: 2222\nprivateKeyPath: /root/.ssh/id_ed25519\ndefaultVds: dvs0"
        )
        .unwrap();
        let config = HostConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(config.default_vds.as_deref(), Some("dvs0"));
        assert_eq!(
            config.private_key_path.as_deref(),
            Some("/root/.ssh/id_ed25519")
        );
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let config = HostConfig::new("esx01");
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::EsxiErrorKind::InvalidParameter);
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut config = HostConfig::new("  ");
        config.password = Some("x".into());
        assert!(config.validate().is_err());
    }
}
