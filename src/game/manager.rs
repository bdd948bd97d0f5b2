//! Multi-match manager
//!
//! Owns every live match, runs the two independent schedules (simulation
//! tick and network sync), routes sockets to their match, and implements
//! matchmaking. A single task owns the whole structure: tick passes, sync
//! passes and inbound commands are serialized through one loop, so a
//! match's `update` is never reentrant and no pass observes another
//! mid-iteration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

use super::r#match::Game;
use super::{GameMode, TeamMode, Transport};

/// Matchmaking request
#[derive(Debug, Clone)]
pub struct FindGameQuery {
    pub game_mode_idx: u32,
    pub auto_fill: bool,
    /// Slots to reserve for the requesting party
    pub player_count: u32,
    /// Existing team id to prefer when filling into a squad
    pub preferred_team_id: Option<u32>,
}

/// Matchmaking result: the assigned match and an opaque join credential
#[derive(Debug, Clone)]
pub struct FindGameResult {
    pub game_id: Uuid,
    pub join_token: Uuid,
    pub game_mode_idx: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FindGameError {
    #[error("matchmaking unavailable")]
    Unavailable,
}

/// Process-level counters for the health endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerStats {
    pub active_games: usize,
    pub total_players: usize,
}

pub struct GameManager {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    games: Vec<Game>,
    socket_games: HashMap<Uuid, Uuid>,
}

impl GameManager {
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            games: Vec::new(),
            socket_games: HashMap::new(),
        }
    }

    /// Create a match, synchronously initialized and usable immediately
    pub fn new_game(&mut self, mode: GameMode) -> Uuid {
        let id = Uuid::new_v4();
        let game = Game::new(id, mode, self.transport.clone(), self.config.perf_logging);
        info!(game_id = %id, ?mode, "created game");
        self.games.push(game);
        id
    }

    /// Find (or create) a match for the query and mint a join credential.
    ///
    /// Among joinable matches of the mode, the one with the smallest
    /// `started_time` wins. For team modes with auto-fill requested, the
    /// party is slotted into an existing under-committed auto-fill group
    /// when one exists, reusing that group's pending join code.
    pub fn find_game(&mut self, query: FindGameQuery) -> Result<FindGameResult, FindGameError> {
        let mode = GameMode {
            team_mode: TeamMode::from_idx(query.game_mode_idx),
            map_idx: 0,
        };

        let game_id = self
            .games
            .iter()
            .filter(|g| g.mode == mode && g.can_join())
            .min_by(|a, b| a.started_time.total_cmp(&b.started_time))
            .map(|g| g.id)
            .unwrap_or_else(|| self.new_game(mode));

        let game = self
            .games
            .iter_mut()
            .find(|g| g.id == game_id)
            .ok_or(FindGameError::Unavailable)?;

        let join_token = if mode.team_mode != TeamMode::Solo && query.auto_fill {
            game.reserve_fill_slot(query.player_count, query.preferred_team_id)
                .unwrap_or_else(|| game.register_party(query.player_count, true))
        } else {
            game.register_party(query.player_count, query.auto_fill)
        };

        Ok(FindGameResult {
            game_id,
            join_token,
            game_mode_idx: query.game_mode_idx,
        })
    }

    /// One simulation pass over all matches. Matches found stopped are
    /// compacted out in the same pass; safe because no other pass runs
    /// concurrently.
    pub fn tick_all(&mut self, dt: f32) {
        let mut i = 0;
        while i < self.games.len() {
            self.games[i].update(dt);
            if self.games[i].stopped {
                let gone = self.games.swap_remove(i).id;
                self.socket_games.retain(|_, gid| *gid != gone);
                info!(game_id = %gone, "removed stopped game");
            } else {
                i += 1;
            }
        }
    }

    /// One network-sync pass over all matches
    pub fn sync_all(&mut self) {
        for game in &mut self.games {
            game.net_sync();
        }
    }

    /// Bind a socket to its pre-resolved match, closing it if the match is
    /// no longer around
    pub fn on_open(&mut self, socket_id: Uuid, game_id: Uuid) {
        match self.games.iter().find(|g| g.id == game_id && !g.stopped) {
            Some(_) => {
                self.socket_games.insert(socket_id, game_id);
            }
            None => {
                warn!(socket = %socket_id, game_id = %game_id, "socket for missing game");
                self.transport.close(socket_id);
            }
        }
    }

    /// Route an inbound frame to the socket's match. The manager never
    /// interprets the contents.
    pub fn on_msg(&mut self, socket_id: Uuid, data: &[u8]) {
        let Some(game_id) = self.socket_games.get(&socket_id).copied() else {
            self.transport.close(socket_id);
            return;
        };
        if let Some(game) = self.games.iter_mut().find(|g| g.id == game_id) {
            game.handle_msg(socket_id, data);
        }
    }

    pub fn on_close(&mut self, socket_id: Uuid) {
        if let Some(game_id) = self.socket_games.remove(&socket_id) {
            if let Some(game) = self.games.iter_mut().find(|g| g.id == game_id) {
                game.handle_socket_close(socket_id);
            }
        }
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            active_games: self.games.len(),
            total_players: self.games.iter().map(|g| g.players.len()).sum(),
        }
    }

    pub fn game_mode_idx(&self, game_id: Uuid) -> Option<u32> {
        self.games.iter().find(|g| g.id == game_id).map(|g| {
            match g.mode.team_mode {
                TeamMode::Solo => 0,
                TeamMode::Duo => 1,
                TeamMode::Squad => 2,
            }
        })
    }
}

/// Commands routed into the manager task
pub enum ManagerCmd {
    FindGame {
        query: FindGameQuery,
        reply: oneshot::Sender<Result<FindGameResult, FindGameError>>,
    },
    SocketOpen {
        socket_id: Uuid,
        game_id: Uuid,
    },
    SocketMsg {
        socket_id: Uuid,
        data: Bytes,
    },
    SocketClose {
        socket_id: Uuid,
    },
    Stats {
        reply: oneshot::Sender<ManagerStats>,
    },
}

/// Cloneable handle to the manager task
#[derive(Clone)]
pub struct GameManagerHandle {
    cmd_tx: mpsc::Sender<ManagerCmd>,
}

impl GameManagerHandle {
    /// Spawn the manager task with its two schedules
    pub fn spawn(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ManagerCmd>(256);
        let mut manager = GameManager::new(config.clone(), transport);

        tokio::spawn(async move {
            let dt = 1.0 / config.tick_rate as f32;
            let mut tick_interval =
                interval(Duration::from_micros(1_000_000 / config.tick_rate as u64));
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sync_interval =
                interval(Duration::from_micros(1_000_000 / config.net_sync_rate as u64));
            sync_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick_interval.tick() => manager.tick_all(dt),
                    _ = sync_interval.tick() => manager.sync_all(),
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ManagerCmd::FindGame { query, reply }) => {
                            let _ = reply.send(manager.find_game(query));
                        }
                        Some(ManagerCmd::SocketOpen { socket_id, game_id }) => {
                            manager.on_open(socket_id, game_id);
                        }
                        Some(ManagerCmd::SocketMsg { socket_id, data }) => {
                            manager.on_msg(socket_id, &data);
                        }
                        Some(ManagerCmd::SocketClose { socket_id }) => {
                            manager.on_close(socket_id);
                        }
                        Some(ManagerCmd::Stats { reply }) => {
                            let _ = reply.send(manager.stats());
                        }
                        None => break,
                    },
                }
            }
            info!("game manager task exited");
        });

        Self { cmd_tx }
    }

    pub async fn find_game(&self, query: FindGameQuery) -> Result<FindGameResult, FindGameError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ManagerCmd::FindGame { query, reply })
            .await
            .map_err(|_| FindGameError::Unavailable)?;
        rx.await.map_err(|_| FindGameError::Unavailable)?
    }

    pub async fn socket_open(&self, socket_id: Uuid, game_id: Uuid) {
        let _ = self
            .cmd_tx
            .send(ManagerCmd::SocketOpen { socket_id, game_id })
            .await;
    }

    pub async fn socket_msg(&self, socket_id: Uuid, data: Bytes) {
        let _ = self
            .cmd_tx
            .send(ManagerCmd::SocketMsg { socket_id, data })
            .await;
    }

    pub async fn socket_close(&self, socket_id: Uuid) {
        let _ = self.cmd_tx.send(ManagerCmd::SocketClose { socket_id }).await;
    }

    pub async fn stats(&self) -> ManagerStats {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCmd::Stats { reply })
            .await
            .is_err()
        {
            return ManagerStats::default();
        }
        rx.await.unwrap_or_default()
    }
}
