//! Game simulation modules

pub mod barns;
pub mod gas;
pub mod grid;
pub mod group;
pub mod manager;
pub mod r#match;
pub mod player;
pub mod register;

pub use manager::GameManagerHandle;

use bytes::Bytes;
use uuid::Uuid;

/// Squad size for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamMode {
    Solo,
    Duo,
    Squad,
}

impl TeamMode {
    pub fn team_size(&self) -> usize {
        match self {
            TeamMode::Solo => 1,
            TeamMode::Duo => 2,
            TeamMode::Squad => 4,
        }
    }

    pub fn from_idx(idx: u32) -> Self {
        match idx {
            0 => TeamMode::Solo,
            1 => TeamMode::Duo,
            _ => TeamMode::Squad,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            TeamMode::Solo => 1,
            TeamMode::Duo => 2,
            TeamMode::Squad => 4,
        }
    }
}

/// Mode descriptor a match is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMode {
    pub team_mode: TeamMode,
    pub map_idx: u32,
}

impl GameMode {
    /// Total player capacity for this mode
    pub fn capacity(&self) -> usize {
        80
    }
}

/// Outbound socket collaborator. The core never touches the transport
/// directly; it only sends bytes to and closes sockets by id.
pub trait Transport: Send + Sync {
    fn send(&self, socket_id: Uuid, data: Bytes);
    fn close(&self, socket_id: Uuid);
}
