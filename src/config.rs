//! Centralized configuration for the tunnel broker.
//!
//! Every field is environment-variable overridable and has a working default,
//! matching the reference deployment (`0.0.0.0:3000` HTTP, `0.0.0.0:2222` SSH).
//! Unlike a web-backed deployment there is no required secret: the only fatal
//! startup condition is a missing or malformed host key (see `crate::key`).

use std::sync::OnceLock;

mod env {
    pub const SSH_ADDR: &str = "TUNNELBROKER_SSH_ADDR";
    pub const HTTP_ADDR: &str = "TUNNELBROKER_HTTP_ADDR";
    pub const HOST_KEY_PATH: &str = "TUNNELBROKER_HOST_KEY_PATH";
    pub const AUTHORIZED_KEYS_PATH: &str = "TUNNELBROKER_AUTHORIZED_KEYS_PATH";
    pub const UPSTREAM_HOST: &str = "TUNNELBROKER_UPSTREAM_HOST";
    pub const UPSTREAM_TIMEOUT_SECS: &str = "TUNNELBROKER_UPSTREAM_TIMEOUT_SECS";
}

const DEFAULT_SSH_ADDR: &str = "0.0.0.0:2222";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_HOST_KEY_PATH: &str = "./key/host";
const DEFAULT_AUTHORIZED_KEYS_PATH: &str = "./authorized_keys";
const DEFAULT_UPSTREAM_HOST: &str = "localhost:3000";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Config {
    pub ssh_addr: String,
    pub http_addr: String,
    pub host_key_path: String,
    pub authorized_keys_path: String,
    /// Host header value sent through the channel to the tunnel owner's local service.
    /// The broker's own label is never forwarded as the Host — this is a deliberately
    /// preserved placeholder from the reference, pulled from config instead of hardcoded
    /// so a deployment can correct it without a code change.
    pub upstream_host: String,
    pub upstream_timeout_secs: u64,
}

impl Config {
    fn load() -> Self {
        let ssh_addr =
            std::env::var(env::SSH_ADDR).unwrap_or_else(|_| DEFAULT_SSH_ADDR.to_string());
        let http_addr =
            std::env::var(env::HTTP_ADDR).unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
        let host_key_path = std::env::var(env::HOST_KEY_PATH)
            .unwrap_or_else(|_| DEFAULT_HOST_KEY_PATH.to_string());
        let authorized_keys_path = std::env::var(env::AUTHORIZED_KEYS_PATH)
            .unwrap_or_else(|_| DEFAULT_AUTHORIZED_KEYS_PATH.to_string());
        let upstream_host = std::env::var(env::UPSTREAM_HOST)
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_HOST.to_string());
        let upstream_timeout_secs = std::env::var(env::UPSTREAM_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        Self {
            ssh_addr,
            http_addr,
            host_key_path,
            authorized_keys_path,
            upstream_host,
            upstream_timeout_secs,
        }
    }
}

/// Initialize configuration. Must be called once at startup.
pub fn init() {
    CONFIG.get_or_init(Config::load);
}

/// Get the global configuration. Panics if `init()` was not called first.
pub fn get() -> &'static Config {
    CONFIG
        .get()
        .expect("config not initialized. Call config::init() first.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        // Exercised directly against Config::load rather than the process-wide
        // OnceLock so this test doesn't depend on env state from other tests.
        std::env::remove_var(env::SSH_ADDR);
        std::env::remove_var(env::HTTP_ADDR);
        std::env::remove_var(env::UPSTREAM_HOST);
        let cfg = Config::load();
        assert_eq!(cfg.ssh_addr, DEFAULT_SSH_ADDR);
        assert_eq!(cfg.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(cfg.upstream_host, DEFAULT_UPSTREAM_HOST);
        assert_eq!(cfg.upstream_timeout_secs, DEFAULT_UPSTREAM_TIMEOUT_SECS);
    }
}
