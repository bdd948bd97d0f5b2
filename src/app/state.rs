//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameManagerHandle;
use crate::lobby::Lobby;
use crate::ws::ChannelTransport;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transport: Arc<ChannelTransport>,
    pub manager: GameManagerHandle,
    pub lobby: Arc<Lobby>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Outbound socket registry, shared by the manager task and handlers
        let transport = Arc::new(ChannelTransport::new());

        // Spawns the single task owning every match
        let manager = GameManagerHandle::spawn(config.clone(), transport.clone());

        let lobby = Arc::new(Lobby::new(manager.clone()));

        Self {
            config,
            transport,
            manager,
            lobby,
        }
    }
}
