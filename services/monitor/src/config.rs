use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::db::DbConfig;
use crate::leader::{LeaderConfig, DEFAULT_LEADER_LOCK_KEY};
use crate::monitor::MonitorConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    pub monitor: MonitorConfig,
    pub leader: LeaderConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("FLEETMON_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8090".to_string())
            .parse()
            .context("FLEETMON_LISTEN_ADDR must be a socket address")?;

        let log_level = std::env::var("FLEETMON_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = env_flag("FLEETMON_DEV").unwrap_or(false);

        let database = DbConfig::from_env();

        let monitor_defaults = MonitorConfig::default();
        let interval = env_parse::<u64>("HOST_MONITOR_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(monitor_defaults.interval);
        if interval.is_zero() {
            bail!("HOST_MONITOR_INTERVAL_SECS must be greater than zero");
        }
        let batch_size =
            env_parse::<u32>("HOST_MONITOR_BATCH_SIZE")?.unwrap_or(monitor_defaults.batch_size);
        if batch_size == 0 {
            bail!("HOST_MONITOR_BATCH_SIZE must be greater than zero");
        }

        let leader_defaults = LeaderConfig::default();
        let leader = LeaderConfig {
            enabled: env_flag("LEADER_ELECTION_ENABLED").unwrap_or(leader_defaults.enabled),
            lock_key: env_parse::<i64>("LEADER_LOCK_KEY")?.unwrap_or(DEFAULT_LEADER_LOCK_KEY),
            renew_interval: env_parse::<u64>("LEADER_RENEW_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(leader_defaults.renew_interval),
        };
        if leader.renew_interval.is_zero() {
            bail!("LEADER_RENEW_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            monitor: MonitorConfig {
                interval,
                batch_size,
            },
            leader,
        })
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.to_lowercase() == "true")
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has invalid value {raw:?}")),
        Err(_) => Ok(None),
    }
}
