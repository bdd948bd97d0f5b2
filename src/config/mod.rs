//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::util::time::{NET_SYNC_TPS, SIMULATION_TPS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Region tag reported to lobby clients and matched against room settings
    pub region: String,
    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Network sync flushes per second (must not exceed tick_rate)
    pub net_sync_rate: u32,
    /// Log per-game simulation load averages
    pub perf_logging: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let tick_rate = parse_rate("TICK_RATE", SIMULATION_TPS)?;
        let net_sync_rate = parse_rate("NET_SYNC_RATE", NET_SYNC_TPS)?;
        if net_sync_rate > tick_rate {
            return Err(ConfigError::SyncRateTooHigh {
                sync: net_sync_rate,
                tick: tick_rate,
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            region: env::var("REGION").unwrap_or_else(|_| "local".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            tick_rate,
            net_sync_rate,
            perf_logging: env::var("PERF_LOGGING")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn parse_rate(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(var) {
        Ok(v) => v
            .parse::<u32>()
            .ok()
            .filter(|r| *r > 0)
            .ok_or(ConfigError::InvalidRate(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid tick rate in {0}")]
    InvalidRate(&'static str),

    #[error("NET_SYNC_RATE ({sync}) must not exceed TICK_RATE ({tick})")]
    SyncRateTooHigh { sync: u32, tick: u32 },
}
