//! Platform configuration.
//!
//! Loaded from a TOML file (`ARGUS_CONFIG` or `./argus.toml`), with the
//! database URL overridable via `DATABASE_URL`. Every field has a default
//! so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file path; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Database URL: `DATABASE_URL` wins over `[database].url`.
    pub fn database_url(&self) -> Result<String> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return Ok(url);
            }
        }
        self.database
            .url
            .clone()
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// CORS origins; `["*"]` allows all (development default).
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            allowed_origins: d_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string; `DATABASE_URL` overrides.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "d_16")]
    pub max_connections: u32,
    #[serde(default = "d_10")]
    pub connect_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 16,
            connect_retries: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool binaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "d_masscan")]
    pub masscan: String,
    #[serde(default = "d_nmap")]
    pub nmap: String,
    #[serde(default = "d_whatweb")]
    pub whatweb: String,
    #[serde(default = "d_wpscan")]
    pub wpscan: String,
    #[serde(default = "d_ffuf")]
    pub ffuf: String,
    #[serde(default = "d_chromium")]
    pub chromium: String,
    #[serde(default = "d_testssl")]
    pub testssl: String,
    #[serde(default = "d_nuclei")]
    pub nuclei: String,
    #[serde(default = "d_trivy")]
    pub trivy: String,
    #[serde(default = "d_prowler")]
    pub prowler: String,
    #[serde(default = "d_scoutsuite")]
    pub scoutsuite: String,
    #[serde(default = "d_subfinder")]
    pub subfinder: String,
    /// Wordlist directory for the fuzzer and API route discovery.
    #[serde(default = "d_wordlists")]
    pub wordlist_dir: String,
    /// Fallback scan deadline when a config bag carries no timeout.
    #[serde(default = "d_600")]
    pub default_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            masscan: d_masscan(),
            nmap: d_nmap(),
            whatweb: d_whatweb(),
            wpscan: d_wpscan(),
            ffuf: d_ffuf(),
            chromium: d_chromium(),
            testssl: d_testssl(),
            nuclei: d_nuclei(),
            trivy: d_trivy(),
            prowler: d_prowler(),
            scoutsuite: d_scoutsuite(),
            subfinder: d_subfinder(),
            wordlist_dir: d_wordlists(),
            default_timeout_secs: 600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8080
}
fn d_origins() -> Vec<String> {
    vec!["*".into()]
}
fn d_16() -> u32 {
    16
}
fn d_10() -> u32 {
    10
}
fn d_600() -> u64 {
    600
}
fn d_masscan() -> String {
    "/usr/local/bin/masscan".into()
}
fn d_nmap() -> String {
    "/usr/local/bin/nmap".into()
}
fn d_whatweb() -> String {
    "/usr/local/bin/whatweb".into()
}
fn d_wpscan() -> String {
    "/usr/local/bin/wpscan".into()
}
fn d_ffuf() -> String {
    "/usr/local/bin/ffuf".into()
}
fn d_chromium() -> String {
    "/usr/bin/chromium".into()
}
fn d_testssl() -> String {
    "/usr/local/bin/testssl.sh".into()
}
fn d_nuclei() -> String {
    "/usr/local/bin/nuclei".into()
}
fn d_trivy() -> String {
    "/usr/local/bin/trivy".into()
}
fn d_prowler() -> String {
    "/usr/local/bin/prowler".into()
}
fn d_scoutsuite() -> String {
    "/usr/local/bin/scout".into()
}
fn d_subfinder() -> String {
    "/usr/local/bin/subfinder".into()
}
fn d_wordlists() -> String {
    "/usr/share/wordlists".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 16);
        assert_eq!(config.tools.nmap, "/usr/local/bin/nmap");
        assert_eq!(config.tools.default_timeout_secs, 600);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9090

            [tools]
            nmap = "/opt/nmap/bin/nmap"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.tools.nmap, "/opt/nmap/bin/nmap");
        assert_eq!(config.tools.masscan, "/usr/local/bin/masscan");
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = Config::from_toml("[server\nport = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn database_url_from_config_section() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "postgres://argus@localhost/argus"
            "#,
        )
        .unwrap();
        // Only meaningful when DATABASE_URL is unset in the test env.
        if std::env::var("DATABASE_URL").is_err() {
            assert_eq!(
                config.database_url().unwrap(),
                "postgres://argus@localhost/argus"
            );
        }
    }
}
