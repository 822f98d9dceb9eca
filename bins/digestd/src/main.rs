use anyhow::{Context, Result};
use clap::Parser;
use digest_auth::{DigestGate, MemoryAccountStore};
use digest_observe::{set_auth_metrics, TracingAuthMetrics};
use digest_ratelimit::{RateLimitConfig, RateLimiter};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::{load_accounts, parse_algorithm, AuthConfig, DaemonConfig};

/// HTTP daemon that guards every path with Digest authentication
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address (TCP)
    #[arg(long, env = "DIGESTD_BIND", default_value = "127.0.0.1:8080")]
    bind: String,
    /// Realm advertised in challenges
    #[arg(long, env = "DIGEST_AUTH_REALM", default_value = "digestd")]
    realm: String,
    /// Server secret keying nonce MACs
    #[arg(long, env = "DIGEST_AUTH_SECRET", hide_env_values = true)]
    secret: String,
    /// JSON users file: {"alice": {"secret": "...", "roles": [...]}} or {"alice": "secret"}
    #[arg(long)]
    users_file: Option<PathBuf>,
    /// Seconds a nonce stays valid
    #[arg(long, default_value_t = 300)]
    nonce_ttl_secs: u64,
    /// Seconds between sweeps of expired nonces
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,
    /// Digest algorithm (MD5 or SHA-256)
    #[arg(long, default_value = "MD5")]
    algorithm: String,
    /// Throttle per client IP: credential attempts (10 per 5 minutes, burst 3)
    /// and bare challenge requests (120 per minute, burst 30)
    #[arg(long)]
    rate_limit: bool,
}

impl Args {
    fn into_config(self) -> Result<DaemonConfig> {
        let config = DaemonConfig {
            bind: self.bind,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            auth: AuthConfig {
                realm: self.realm,
                secret: self.secret,
                algorithm: parse_algorithm(&self.algorithm)?,
                nonce_ttl: Duration::from_secs(self.nonce_ttl_secs),
                users_file: self.users_file,
                rate_limit: self.rate_limit,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn build_gate(config: &AuthConfig) -> Result<DigestGate<MemoryAccountStore>> {
    let store = match &config.users_file {
        Some(path) => load_accounts(path)?,
        None => {
            warn!("no --users-file given; every request will be refused");
            MemoryAccountStore::new()
        }
    };
    info!(users = store.len(), realm = %config.realm, "accounts loaded");

    let mut gate = DigestGate::new(config.realm.as_str(), config.secret.as_bytes(), store)
        .with_algorithm(config.algorithm)
        .with_nonce_ttl(config.nonce_ttl);
    if config.rate_limit {
        gate = gate
            .with_rate_limiter(RateLimiter::new(RateLimitConfig::auth_preset()))
            .with_challenge_limiter(RateLimiter::new(RateLimitConfig::challenge_preset()));
    }
    Ok(gate)
}

fn spawn_sweeper(gate: Arc<DigestGate<MemoryAccountStore>>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        loop {
            ticker.tick().await;
            let nonces = gate.nonce_manager().cleanup();
            let buckets: usize = [gate.rate_limiter(), gate.challenge_limiter()]
                .into_iter()
                .flatten()
                .map(|l| l.cleanup_idle())
                .sum();
            if nonces > 0 || buckets > 0 {
                debug!(
                    nonces,
                    buckets,
                    live = gate.nonce_manager().count(),
                    "swept expired state"
                );
            }
        }
    });
}

#[tokio::main]
/// Entry point for the digest authentication daemon.
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_auth_metrics(Arc::new(TracingAuthMetrics));

    let config = Args::parse().into_config()?;
    let gate = Arc::new(build_gate(&config.auth)?);
    spawn_sweeper(Arc::clone(&gate), config.sweep_interval);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tokio::select! {
        result = server::run(listener, gate) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
