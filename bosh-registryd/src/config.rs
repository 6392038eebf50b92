use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_DOMAIN_SUFFIX;

const PEM_CERT_PREFIX: &str = "-----BEGIN CERTIFICATE-----";

/// Local BOSH Lite alias understood by the bosh CLI
const VBOX_ALIAS: &str = "vbox";
const VBOX_ADDRESS: &str = "192.168.50.6";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub director: DirectorConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectorConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_director_port")]
    pub port: u16,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub client_secret: String,
    /// Inline PEM or path to a PEM file. Empty means system roots.
    #[serde(default)]
    pub ca_cert: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_director_port() -> u16 {
    25555
}

fn default_domain_suffix() -> String {
    DEFAULT_DOMAIN_SUFFIX.to_string()
}

fn default_freshness() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    10
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_director_port(),
            client: String::new(),
            client_secret: String::new(),
            ca_cert: String::new(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            freshness_secs: default_freshness(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl CatalogConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl DirectorConfig {
    /// CA bundle to trust when talking to the director, if one is configured
    pub fn ca_cert_pem(&self) -> Result<Option<Vec<u8>>> {
        let ca_cert = self.ca_cert.trim();
        if ca_cert.is_empty() {
            return Ok(None);
        }
        if ca_cert.starts_with(PEM_CERT_PREFIX) {
            return Ok(Some(ca_cert.as_bytes().to_vec()));
        }
        let pem = std::fs::read(ca_cert)
            .with_context(|| format!("Failed to read director CA cert from {}", ca_cert))?;
        Ok(Some(pem))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply `BOSH_*` environment overrides, as the bosh CLI reads them
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = var("BOSH_ENVIRONMENT") {
            self.director.host = host;
        }
        if let Some(client) = var("BOSH_CLIENT") {
            self.director.client = client;
        }
        if let Some(secret) = var("BOSH_CLIENT_SECRET") {
            self.director.client_secret = secret;
        }
        if let Some(ca_cert) = var("BOSH_CA_CERT") {
            self.director.ca_cert = ca_cert;
        }
        if self.director.host == VBOX_ALIAS {
            self.director.host = VBOX_ADDRESS.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.director.host.is_empty() {
            bail!("director host is not set (config [director].host or BOSH_ENVIRONMENT)");
        }
        if self.catalog.poll_interval_secs == 0 {
            bail!("catalog.poll_interval_secs must be greater than zero");
        }
        Ok(())
    }
}
