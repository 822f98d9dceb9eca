//! Configuration for the digestd daemon.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use digest_auth::{Account, DigestAlgorithm, MemoryAccountStore};
use serde::Deserialize;
use smol_str::SmolStr;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Authentication realm (e.g., "testrealm@example")
    pub realm: String,

    /// Keys the nonce MAC; never leaves the process
    pub secret: String,

    /// MD5 or SHA-256
    pub algorithm: DigestAlgorithm,

    /// Nonce lifetime
    pub nonce_ttl: Duration,

    /// Path to users file (JSON)
    pub users_file: Option<PathBuf>,

    /// Throttle credential attempts and bare challenge requests per peer IP
    pub rate_limit: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "digestd".to_string(),
            secret: String::new(),
            algorithm: DigestAlgorithm::Md5,
            nonce_ttl: Duration::from_secs(300),
            users_file: None,
            rate_limit: false,
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// TCP listen address
    pub bind: String,

    /// How often expired nonces and idle rate limit buckets are swept
    pub sweep_interval: Duration,

    /// Authentication configuration
    pub auth: AuthConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_secs(60),
            auth: AuthConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            bail!("server secret must not be empty");
        }
        if self.auth.realm.is_empty() {
            bail!("realm must not be empty");
        }
        if self.auth.nonce_ttl.is_zero() {
            bail!("nonce TTL must be positive");
        }
        if self.sweep_interval.is_zero() {
            bail!("sweep interval must be positive");
        }
        Ok(())
    }
}

pub fn parse_algorithm(value: &str) -> Result<DigestAlgorithm> {
    DigestAlgorithm::parse(value).ok_or_else(|| anyhow!("unsupported digest algorithm: {}", value))
}

/// One entry of the users file: either a bare secret or a full record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserEntry {
    Secret(String),
    Full {
        secret: String,
        #[serde(default)]
        roles: BTreeSet<String>,
    },
}

/// Parses `{"alice": {"secret": "...", "roles": ["admin"]}}` or the shorthand
/// `{"alice": "secret"}`. Both forms may be mixed.
pub fn parse_accounts(contents: &str) -> Result<MemoryAccountStore> {
    let entries: BTreeMap<String, UserEntry> =
        serde_json::from_str(contents).context("users file is not a JSON object of users")?;

    entries
        .into_iter()
        .map(|(username, entry)| {
            if username.is_empty() {
                bail!("users file contains an empty username");
            }
            let account = match entry {
                UserEntry::Secret(secret) => Account::new(username, secret),
                UserEntry::Full { secret, roles } => {
                    let mut account = Account::new(username, secret);
                    account.roles = roles.into_iter().map(SmolStr::from).collect();
                    account
                }
            };
            Ok(account)
        })
        .collect()
}

pub fn load_accounts(path: &Path) -> Result<MemoryAccountStore> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read users file {}", path.display()))?;
    parse_accounts(&contents).with_context(|| format!("invalid users file {}", path.display()))
}
