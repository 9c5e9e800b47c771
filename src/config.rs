use crate::error::Error;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::{LowerName, Name};

pub type SharedConfig = Arc<Config>;

/// Production ACME v2 directory of Let's Encrypt, the default directory.
pub const LETS_ENCRYPT: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Name of the built-in CNAME-redirect DNS challenge provider.
pub const PROVIDER_DNS_CNAME: &str = "dnscname";

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// ACME directory resource URI.
    #[serde(default = "default_server")]
    pub server: String,
    /// Registration email for the ACME directory. Required.
    #[serde(default)]
    pub email: String,
    /// Bind address for the HTTP API server.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// DNS challenge provider name.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// If the CA offers multiple chains, prefer the chain with an issuer
    /// matching this Subject Common Name.
    #[serde(default)]
    pub preferred_chain: String,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct DnsConfig {
    /// Bind address for the DNS server (UDP and TCP).
    #[serde(default = "default_dns_listen")]
    pub listen: SocketAddr,
    /// The NS domain name of this server.
    #[serde(default = "default_dns_domain")]
    pub domain: String,
    /// The zone serving the TXT records for challenges.
    #[serde(default = "default_dns_zone")]
    pub zone: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_tcp_timeout")]
    pub tcp_timeout: Duration,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    /// Storage driver to use, `local` or `memory`.
    #[serde(default = "default_storage_driver")]
    pub driver: String,
    /// Path to store certs and account data for the local driver.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        if conf.email.is_empty() {
            return Err(Error::EmailRequired);
        }
        Ok(conf)
    }

    /// The challenge zone as a fully qualified [`Name`].
    pub fn zone_name(&self) -> Result<Name, Error> {
        Ok(Name::from_str(&fqdn(&self.dns.zone))?)
    }

    /// The challenge zone as a [`LowerName`] for query comparisons.
    pub fn zone(&self) -> Result<LowerName, Error> {
        Ok(LowerName::from(self.zone_name()?))
    }

    /// The NS domain of this server as a fully qualified [`Name`].
    pub fn ns_name(&self) -> Result<Name, Error> {
        Ok(Name::from_str(&fqdn(&self.dns.domain))?)
    }
}

fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            listen: default_dns_listen(),
            domain: default_dns_domain(),
            zone: default_dns_zone(),
            tcp_timeout: default_dns_tcp_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            driver: default_storage_driver(),
            path: default_storage_path(),
        }
    }
}

fn default_server() -> String {
    LETS_ENCRYPT.to_string()
}

fn default_listen() -> SocketAddr {
    ([0, 0, 0, 0], 80).into()
}

fn default_provider() -> String {
    PROVIDER_DNS_CNAME.to_string()
}

fn default_dns_listen() -> SocketAddr {
    ([0, 0, 0, 0], 53).into()
}

fn default_dns_domain() -> String {
    "ns.local".to_string()
}

fn default_dns_zone() -> String {
    "acme.local".to_string()
}

fn default_dns_tcp_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_storage_driver() -> String {
    "local".to_string()
}

fn default_storage_path() -> String {
    format!(
        "{}/.certforge",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}
