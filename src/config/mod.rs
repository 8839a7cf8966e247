//! Configuration management
//!
//! Settings come from an optional TOML file (`SIPDIR_CONFIG`, default
//! `sipdir.toml`) overlaid by `SIPDIR__<SECTION>__<KEY>` environment
//! variables. Missing sections fall back to their defaults.

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "SIPDIR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sipdir.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sip: SipConfig,
    pub registration: RegistrationConfig,
    pub switch: SwitchConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub domain: String,
    /// Extra names the server answers to
    pub localnames: Vec<String>,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5060,
            domain: "localhost".to_string(),
            localnames: Vec::new(),
        }
    }
}

/// Registration lifetime policy, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub min_expires: u32,
    pub max_expires: u32,
    pub default_expires: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            min_expires: 60,
            max_expires: 7200,
            default_expires: 3600,
            sweep_interval_secs: 30,
        }
    }
}

impl RegistrationConfig {
    /// Registration lifetime for a requested value
    ///
    /// `None` selects the default; everything else is clamped into
    /// `[min_expires, max_expires]`.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        let max = self.max_expires.max(self.min_expires);
        requested
            .unwrap_or(self.default_expires)
            .clamp(self.min_expires, max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Authentication realm; derived from the host when unset
    pub realm: Option<String>,
    /// Digest algorithm: md5, sha256 or sha512
    pub digest: String,
    pub host: String,
    pub mode: String,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            realm: None,
            digest: "md5".to_string(),
            host: String::new(),
            mode: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store location; the in-memory store reads `memory:<json file>` or `memory:`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost/sipdir".to_string(),
            max_connections: 10,
        }
    }
}

impl Config {
    /// Load from the file named by `SIPDIR_CONFIG` plus the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("SIPDIR")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sip.localnames")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn sip_bind(&self) -> String {
        format!("{}:{}", self.sip.bind_address, self.sip.bind_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sip.bind_port, 5060);
        assert_eq!(config.registration.min_expires, 60);
        assert_eq!(config.registration.max_expires, 7200);
        assert_eq!(config.registration.default_expires, 3600);
        assert_eq!(config.switch.realm, None);
        assert_eq!(config.sip_bind(), "0.0.0.0:5060");
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [sip]
            bind_port = 5080
            localnames = ["pbx", "pbx.example.com"]

            [switch]
            realm = "example.com"
            digest = "sha256"
            "#,
        )
        .unwrap();

        assert_eq!(config.sip.bind_port, 5080);
        assert_eq!(config.sip.bind_address, "0.0.0.0");
        assert_eq!(config.sip.localnames.len(), 2);
        assert_eq!(config.switch.realm.as_deref(), Some("example.com"));
        assert_eq!(config.switch.digest, "sha256");
        assert_eq!(config.registration, RegistrationConfig::default());
    }

    #[test]
    fn test_clamp() {
        let policy = RegistrationConfig::default();
        assert_eq!(policy.clamp(None), 3600);
        assert_eq!(policy.clamp(Some(10)), 60);
        assert_eq!(policy.clamp(Some(300)), 300);
        assert_eq!(policy.clamp(Some(86400)), 7200);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_from("/nonexistent/sipdir.toml").unwrap();
        assert_eq!(config.registration, RegistrationConfig::default());
    }
}
