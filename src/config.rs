use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::dnssec::ValidationOptions;
use crate::dnssec::constants::MAX_CHAIN_DEPTH;
use crate::dnssec::trust_anchor::{TrustAnchors, TrustedKey};

const DNS_PORT: u16 = 53;
const RESOLV_CONF: &str = "/etc/resolv.conf";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid upstream server: {0}")]
    InvalidUpstreamServer(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid trust anchor: {0}")]
    InvalidTrustAnchor(String),

    #[error("No upstream servers configured or found in /etc/resolv.conf")]
    NoUpstreamServers,
}

/// Address family used to reach upstream servers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    #[default]
    Any,
    V4,
    V6,
}

impl IpFamily {
    fn allows(self, addr: &SocketAddr) -> bool {
        match self {
            IpFamily::Any => true,
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for IpFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" | "" => Ok(IpFamily::Any),
            "4" | "v4" | "ipv4" => Ok(IpFamily::V4),
            "6" | "v6" | "ipv6" => Ok(IpFamily::V6),
            _ => Err(ConfigError::InvalidValue {
                key: "ip_family".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upstream servers, `ip` or `ip:port`
    pub servers: Vec<String>,

    /// Timeout for one upstream query
    pub timeout_secs: u64,

    /// Retries per upstream server
    pub retries: u32,

    pub ip_family: IpFamily,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            timeout_secs: 5,
            retries: 2,
            ip_family: IpFamily::Any,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Directory of `<name>.<ksk|zsk>.pem` certificates
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Trust anchors in `<domain> DNSKEY <flags> 3 <alg> <key>` form
    pub trust_anchors: Vec<String>,
    pub verbosity: u8,
    pub use_key_store: bool,
    pub batch_concurrency: usize,
    pub max_chain_depth: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            trust_anchors: Vec::new(),
            verbosity: 0,
            use_key_store: false,
            batch_concurrency: 8,
            max_chain_depth: MAX_CHAIN_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub keystore: KeyStoreConfig,
    pub validation: ValidationConfig,
}

impl Config {
    /// Read a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Defaults or `path`, then environment overrides, validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override with `TRUSTWALK_*` environment variables if present
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(servers) = var("TRUSTWALK_SERVERS") {
            let servers: Vec<String> = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if servers.is_empty() {
                return Err(ConfigError::InvalidUpstreamServer(
                    "No valid upstream servers provided".to_string(),
                ));
            }
            self.resolver.servers = servers;
        }

        if let Some(timeout) = var("TRUSTWALK_TIMEOUT") {
            self.resolver.timeout_secs = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(timeout.clone()))?;
        }

        if let Some(retries) = var("TRUSTWALK_RETRIES") {
            self.resolver.retries = parse_number("TRUSTWALK_RETRIES", &retries)?;
        }

        if let Some(family) = var("TRUSTWALK_IP_FAMILY") {
            self.resolver.ip_family = family.parse()?;
        }

        if let Some(dir) = var("TRUSTWALK_KEYSTORE_DIR") {
            self.keystore.directory = Some(PathBuf::from(dir));
        }

        if let Some(use_key_store) = var("TRUSTWALK_USE_KEYSTORE") {
            self.validation.use_key_store = parse_bool(&use_key_store, false);
        }

        if let Some(verbosity) = var("TRUSTWALK_VERBOSITY") {
            self.validation.verbosity = parse_number("TRUSTWALK_VERBOSITY", &verbosity)?;
        }

        if let Some(concurrency) = var("TRUSTWALK_CONCURRENCY") {
            self.validation.batch_concurrency = parse_number("TRUSTWALK_CONCURRENCY", &concurrency)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.resolver.timeout_secs > 300 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout too large (max 300 seconds)".to_string(),
            ));
        }
        if self.resolver.retries > 10 {
            return Err(ConfigError::InvalidValue {
                key: "retries".to_string(),
                value: format!("{} (max 10)", self.resolver.retries),
            });
        }
        for server in &self.resolver.servers {
            parse_server(server)?;
        }
        if self.validation.batch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.validation.max_chain_depth == 0 || self.validation.max_chain_depth > 128 {
            return Err(ConfigError::InvalidValue {
                key: "max_chain_depth".to_string(),
                value: format!("{} (expected 1-128)", self.validation.max_chain_depth),
            });
        }
        self.trust_anchors()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.timeout_secs)
    }

    /// Configured servers of the allowed family, else the system resolvers.
    pub fn upstream_servers(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let mut servers = self
            .resolver
            .servers
            .iter()
            .map(|s| parse_server(s))
            .collect::<Result<Vec<_>, _>>()?;
        if servers.is_empty() {
            servers = system_nameservers(Path::new(RESOLV_CONF))?;
            debug!("Using {} nameservers from {}", servers.len(), RESOLV_CONF);
        }
        servers.retain(|addr| self.resolver.ip_family.allows(addr));
        if servers.is_empty() {
            return Err(ConfigError::NoUpstreamServers);
        }
        Ok(servers)
    }

    pub fn trust_anchors(&self) -> Result<TrustAnchors, ConfigError> {
        self.validation
            .trust_anchors
            .iter()
            .map(|text| {
                text.parse::<TrustedKey>()
                    .map_err(|e| ConfigError::InvalidTrustAnchor(e.to_string()))
            })
            .collect()
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            verbosity: self.validation.verbosity,
            now: None,
            use_key_store: self.validation.use_key_store,
            max_chain_depth: self.validation.max_chain_depth,
            batch_concurrency: self.validation.batch_concurrency,
        }
    }
}

/// Parse `ip` or `ip:port`, defaulting to port 53.
pub fn parse_server(text: &str) -> Result<SocketAddr, ConfigError> {
    let text = text.trim();
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    text.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ConfigError::InvalidUpstreamServer(text.to_string()))
}

/// Nameservers listed in a resolv.conf file; a missing file yields none.
pub fn system_nameservers(path: &Path) -> Result<Vec<SocketAddr>, ConfigError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Io(format!("{}: {}", path.display(), e))),
    };
    let parsed = resolv_conf::Config::parse(&bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    Ok(parsed
        .nameservers
        .iter()
        .map(|ns| {
            let ip: IpAddr = ns.clone().into();
            SocketAddr::new(ip, DNS_PORT)
        })
        .collect())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
