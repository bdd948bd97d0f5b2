//! Time utilities for game simulation

use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default tick rate configuration. The simulation advances at
/// `SIMULATION_TPS` while accumulated changes are flushed to clients at
/// the slower `NET_SYNC_TPS` cadence.
pub const SIMULATION_TPS: u32 = 30;
pub const NET_SYNC_TPS: u32 = 10;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// A connection dropped before this much active time counts as abandoned
/// and is fully removed instead of kept for reconnect bookkeeping.
pub const MIN_ACTIVE_TIME_SECS: f32 = 10.0;
