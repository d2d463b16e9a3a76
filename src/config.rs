use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub debug: bool,

    // Request handling
    pub request_timeout_secs: u64,
    pub upstream_timeout_secs: u64,
    pub forward_basic_auth: bool,

    // Shutdown
    pub shutdown_drain_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3030".to_string(),
            debug: false,
            request_timeout_secs: 30,
            upstream_timeout_secs: 10,
            forward_basic_auth: false,
            shutdown_drain_secs: 5,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let listen_addr =
        std::env::var("PMSERIES_LISTEN_ADDR").unwrap_or_else(|_| defaults.listen_addr.clone());

    let debug = std::env::var("DEBUG").is_ok();

    let request_timeout_secs =
        env_secs("PMSERIES_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);
    let upstream_timeout_secs =
        env_secs("PMSERIES_UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout_secs);

    // Credentials stored with a connection are only sent upstream when enabled
    let forward_basic_auth = env_flag("PMSERIES_FORWARD_BASIC_AUTH");

    let shutdown_drain_secs = env_secs("PMSERIES_SHUTDOWN_DRAIN_SECS", defaults.shutdown_drain_secs);

    if request_timeout_secs == 0 {
        anyhow::bail!("PMSERIES_REQUEST_TIMEOUT_SECS must be greater than zero");
    }

    Ok(Config {
        listen_addr,
        debug,
        request_timeout_secs,
        upstream_timeout_secs,
        forward_basic_auth,
        shutdown_drain_secs,
    })
}
