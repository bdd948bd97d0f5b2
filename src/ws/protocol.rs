//! Wire protocol message definitions
//!
//! Game sockets speak a binary protocol: a one-byte type discriminator
//! followed by a bincode-encoded payload for that type. Field-level layout
//! of the payloads is owned by the codec structs here; the game core only
//! ever reads the discriminator before dispatching.
//!
//! Lobby sockets speak a JSON protocol of `{type, data}` tagged messages.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Stable per-game entity id, assigned by the object register
pub type ObjectId = u32;

/// Message type discriminator, always the first byte on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    // client -> server
    Join = 1,
    Input = 2,
    Emote = 3,
    DropItem = 4,
    Spectate = 5,
    // server -> client
    Joined = 6,
    Update = 7,
    GameOver = 8,
    Disconnect = 9,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Join),
            2 => Some(Self::Input),
            3 => Some(Self::Emote),
            4 => Some(Self::DropItem),
            5 => Some(Self::Spectate),
            6 => Some(Self::Joined),
            7 => Some(Self::Update),
            8 => Some(Self::GameOver),
            9 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Split an inbound frame into its discriminator and payload bytes
pub fn split_frame(data: &[u8]) -> Option<(MsgType, &[u8])> {
    let (&tag, payload) = data.split_first()?;
    Some((MsgType::from_u8(tag)?, payload))
}

/// Decode a payload body for an already-identified message type
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(payload)
}

/// Encode an outbound frame: discriminator byte followed by the payload
pub fn encode_frame<T: Serialize>(msg_type: MsgType, payload: &T) -> Result<Bytes, bincode::Error> {
    let body = bincode::serialize(payload)?;
    let mut buf = Vec::with_capacity(1 + body.len());
    buf.push(msg_type as u8);
    buf.extend_from_slice(&body);
    Ok(Bytes::from(buf))
}

// ---------------------------------------------------------------------------
// Game protocol payloads (client -> server)
// ---------------------------------------------------------------------------

/// Request to join a match using a matchmaking credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinMsg {
    /// Join token minted by `find_game`
    pub token: Uuid,
    /// Display name
    pub name: String,
}

/// Per-frame player input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputMsg {
    /// Sequence number for stale-input rejection
    pub seq: u32,
    /// Movement direction, each axis in [-1, 1]
    pub move_x: f32,
    pub move_y: f32,
    /// Aim direction in radians
    pub aim: f32,
    /// Fire held this frame
    pub shooting: bool,
}

/// Emote or map ping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmoteMsg {
    pub emote_id: u32,
    pub x: f32,
    pub y: f32,
    pub is_ping: bool,
}

/// Drop an inventory item on the ground
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropItemMsg {
    pub item: String,
    pub slot: u8,
}

/// Spectator target control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectateMsg {
    pub spec_begin: bool,
    pub spec_next: bool,
    pub spec_prev: bool,
}

// ---------------------------------------------------------------------------
// Game protocol payloads (server -> client)
// ---------------------------------------------------------------------------

/// Acknowledges a successful join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedMsg {
    pub player_id: ObjectId,
    pub team_mode: u8,
    pub game_id: Uuid,
}

/// Full snapshot of one object, sent on creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullObjectData {
    pub id: ObjectId,
    pub kind: u8,
    pub x: f32,
    pub y: f32,
}

/// Delta for an object that changed since the last sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartObjectData {
    pub id: ObjectId,
    pub x: f32,
    pub y: f32,
}

/// One-shot explosion event, flushed every sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplosionData {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// One-shot emote event, flushed every sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmoteData {
    pub player_id: ObjectId,
    pub emote_id: u32,
    pub x: f32,
    pub y: f32,
    pub is_ping: bool,
}

/// Incremental state update, sent once per sync cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMsg {
    pub full_objects: Vec<FullObjectData>,
    pub part_objects: Vec<PartObjectData>,
    pub deleted_objects: Vec<ObjectId>,
    pub explosions: Vec<ExplosionData>,
    pub emotes: Vec<EmoteData>,
    pub gas_stage: u32,
    pub gas_radius: f32,
    pub alive_count: u32,
}

/// Final result pushed when the end-condition evaluator fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverMsg {
    pub winning_team_id: u32,
    pub game_over: bool,
}

// ---------------------------------------------------------------------------
// Lobby protocol (JSON)
// ---------------------------------------------------------------------------

/// Room settings a leader may change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomProps {
    pub region: String,
    pub game_mode_idx: u32,
    pub auto_fill: bool,
}

/// Messages sent from lobby client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum TeamClientMsg {
    Create {
        name: String,
        room_data: RoomProps,
    },
    Join {
        room_code: String,
        name: String,
    },
    ChangeName {
        name: String,
    },
    SetRoomProps(RoomProps),
    Kick {
        player_id: u32,
    },
    KeepAlive,
    PlayGame,
    GameComplete,
}

/// Lobby error taxonomy, all non-fatal and client-scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamErrorKind {
    JoinFailed,
    JoinFull,
    CreateFailed,
    LostConn,
    FindGameError,
    FindGameFull,
    FindGameInvalidProtocol,
}

/// Room state as broadcast to lobby clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateData {
    pub room_code: String,
    pub region: String,
    pub game_mode_idx: u32,
    pub auto_fill: bool,
    pub max_players: u32,
    pub finding_game: bool,
    pub last_error: String,
}

/// One member in a room state broadcast. `player_id` is the member's index
/// in the room at broadcast time, recomputed per broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPlayerData {
    pub name: String,
    pub player_id: u32,
    pub is_leader: bool,
    pub in_game: bool,
}

/// Messages sent from lobby server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum TeamServerMsg {
    State {
        local_player_id: u32,
        room: RoomStateData,
        players: Vec<TeamPlayerData>,
    },
    Error {
        #[serde(rename = "type")]
        kind: TeamErrorKind,
    },
    Kicked,
    KeepAlive,
    JoinGame {
        game_id: Uuid,
        join_token: Uuid,
        room_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let msg = JoinMsg {
            token: Uuid::new_v4(),
            name: "tester".to_string(),
        };
        let frame = encode_frame(MsgType::Join, &msg).unwrap();

        let (tag, payload) = split_frame(&frame).unwrap();
        assert_eq!(tag, MsgType::Join);
        let decoded: JoinMsg = decode_payload(payload).unwrap();
        assert_eq!(decoded.token, msg.token);
        assert_eq!(decoded.name, "tester");
    }

    #[test]
    fn unknown_discriminator_rejected() {
        assert!(split_frame(&[200, 1, 2, 3]).is_none());
        assert!(split_frame(&[]).is_none());
    }

    #[test]
    fn lobby_msg_json_shape() {
        let msg = TeamServerMsg::Error {
            kind: TeamErrorKind::JoinFull,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("join_full"));
    }
}
