//! Pre-game lobby ("team menu")
//!
//! Rooms group players before a match. Every mutating action results in
//! exactly one state (or error) broadcast cycle; the lobby mutex holds
//! across the whole action, including the matchmaking call, so actions on
//! a room never interleave.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::manager::{FindGameQuery, GameManagerHandle};
use crate::ws::protocol::{
    RoomProps, RoomStateData, TeamClientMsg, TeamErrorKind, TeamPlayerData, TeamServerMsg,
};

const ROOM_CODE_LEN: usize = 4;
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_ATTEMPTS: u32 = 100;

pub type LobbySender = mpsc::UnboundedSender<TeamServerMsg>;

struct RoomPlayer {
    conn_id: Uuid,
    name: String,
    is_leader: bool,
    in_game: bool,
    tx: LobbySender,
}

struct Room {
    /// Long-lived internal id, used as a correlation token in joinGame
    id: Uuid,
    code: String,
    props: RoomProps,
    max_players: u32,
    finding_game: bool,
    last_error: String,
    players: Vec<RoomPlayer>,
}

impl Room {
    fn state_data(&self) -> RoomStateData {
        RoomStateData {
            room_code: self.code.clone(),
            region: self.props.region.clone(),
            game_mode_idx: self.props.game_mode_idx,
            auto_fill: self.props.auto_fill,
            max_players: self.max_players,
            finding_game: self.finding_game,
            last_error: self.last_error.clone(),
        }
    }

    fn leader_index(&self) -> Option<usize> {
        self.players.iter().position(|p| p.is_leader)
    }
}

/// Derived room capacity from the mode index
fn max_players_for_mode(game_mode_idx: u32) -> u32 {
    (game_mode_idx * 2).clamp(2, 4)
}

/// Room registry and state machine. All methods are synchronous; the
/// async matchmaking handoff lives on [`Lobby`].
pub struct TeamMenu {
    rooms: HashMap<String, Room>,
    conn_rooms: HashMap<Uuid, String>,
    rng: ChaCha8Rng,
}

impl TeamMenu {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            conn_rooms: HashMap::new(),
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate a short code not held by any active room
    fn alloc_code(&mut self) -> Option<String> {
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| {
                    let i = self.rng.gen_range(0..ROOM_CODE_CHARS.len());
                    ROOM_CODE_CHARS[i] as char
                })
                .collect();
            if !self.rooms.contains_key(&code) {
                return Some(code);
            }
        }
        None
    }

    pub fn create(&mut self, conn_id: Uuid, tx: LobbySender, name: String, props: RoomProps) {
        // a connection abandons its previous room when creating a new one
        self.remove_player(conn_id);

        let Some(code) = self.alloc_code() else {
            let _ = tx.send(TeamServerMsg::Error {
                kind: TeamErrorKind::CreateFailed,
            });
            return;
        };

        let max_players = max_players_for_mode(props.game_mode_idx);
        let room = Room {
            id: Uuid::new_v4(),
            code: code.clone(),
            props,
            max_players,
            finding_game: false,
            last_error: String::new(),
            players: vec![RoomPlayer {
                conn_id,
                name,
                is_leader: true,
                in_game: false,
                tx,
            }],
        };

        info!(room_code = %code, "room created");
        self.conn_rooms.insert(conn_id, code.clone());
        self.rooms.insert(code.clone(), room);
        self.broadcast(&code);
    }

    pub fn join(&mut self, conn_id: Uuid, tx: LobbySender, code: String, name: String) {
        let Some(room) = self.rooms.get_mut(&code) else {
            let _ = tx.send(TeamServerMsg::Error {
                kind: TeamErrorKind::JoinFailed,
            });
            return;
        };
        if room.players.len() >= room.max_players as usize {
            let _ = tx.send(TeamServerMsg::Error {
                kind: TeamErrorKind::JoinFull,
            });
            return;
        }

        room.players.push(RoomPlayer {
            conn_id,
            name,
            is_leader: false,
            in_game: false,
            tx,
        });
        self.conn_rooms.insert(conn_id, code.clone());
        self.broadcast(&code);
    }

    pub fn change_name(&mut self, conn_id: Uuid, name: String) {
        let Some(code) = self.conn_rooms.get(&conn_id).cloned() else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&code) {
            if let Some(p) = room.players.iter_mut().find(|p| p.conn_id == conn_id) {
                p.name = name;
            }
            self.broadcast(&code);
        }
    }

    /// Leader-only; silently ignored for anyone else
    pub fn set_room_props(&mut self, conn_id: Uuid, props: RoomProps) {
        let Some(code) = self.conn_rooms.get(&conn_id).cloned() else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&code) else {
            return;
        };
        if !Self::is_leader(room, conn_id) {
            return;
        }

        room.max_players = max_players_for_mode(props.game_mode_idx);
        room.props = props;
        self.broadcast(&code);
    }

    /// Leader-only. The target gets a terminal `kicked` notice; everyone
    /// else gets the regular state broadcast from the removal path. A
    /// leader cannot kick themselves.
    pub fn kick(&mut self, conn_id: Uuid, target_player_id: u32) {
        let Some(code) = self.conn_rooms.get(&conn_id).cloned() else {
            return;
        };
        let Some(room) = self.rooms.get(&code) else {
            return;
        };
        if !Self::is_leader(room, conn_id) {
            return;
        }

        let Some(target) = room.players.get(target_player_id as usize) else {
            return;
        };
        if target.conn_id == conn_id {
            return;
        }

        let target_conn = target.conn_id;
        let _ = target.tx.send(TeamServerMsg::Kicked);
        info!(room_code = %code, player_id = target_player_id, "player kicked");
        self.remove_player(target_conn);
    }

    /// Heartbeat: ack the sender and rebroadcast current state to every
    /// member
    pub fn keep_alive(&self, conn_id: Uuid) {
        self.send_to(conn_id, TeamServerMsg::KeepAlive);
        if let Some(code) = self.conn_rooms.get(&conn_id) {
            self.broadcast(code);
        }
    }

    pub fn game_complete(&mut self, conn_id: Uuid) {
        let Some(code) = self.conn_rooms.get(&conn_id).cloned() else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&code) {
            if let Some(p) = room.players.iter_mut().find(|p| p.conn_id == conn_id) {
                p.in_game = false;
            }
            self.broadcast(&code);
        }
    }

    /// Shared removal path for disconnects and kicks. Deletes the room
    /// when it empties; transfers leadership to the new first member
    /// otherwise.
    pub fn remove_player(&mut self, conn_id: Uuid) {
        let Some(code) = self.conn_rooms.remove(&conn_id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&code) else {
            return;
        };

        let was_leader = room
            .players
            .iter()
            .find(|p| p.conn_id == conn_id)
            .map(|p| p.is_leader)
            .unwrap_or(false);
        room.players.retain(|p| p.conn_id != conn_id);

        if room.players.is_empty() {
            self.rooms.remove(&code);
            info!(room_code = %code, "room deleted");
            return;
        }
        if was_leader {
            room.players[0].is_leader = true;
        }
        self.broadcast(&code);
    }

    /// Send the current room state to every member. The per-recipient
    /// local player id is the member's index right now, recomputed on
    /// every broadcast so removals leave no gaps.
    fn broadcast(&self, code: &str) {
        let Some(room) = self.rooms.get(code) else {
            return;
        };
        let players: Vec<TeamPlayerData> = room
            .players
            .iter()
            .enumerate()
            .map(|(i, p)| TeamPlayerData {
                name: p.name.clone(),
                player_id: i as u32,
                is_leader: p.is_leader,
                in_game: p.in_game,
            })
            .collect();

        for (i, p) in room.players.iter().enumerate() {
            let _ = p.tx.send(TeamServerMsg::State {
                local_player_id: i as u32,
                room: room.state_data(),
                players: players.clone(),
            });
        }
    }

    fn is_leader(room: &Room, conn_id: Uuid) -> bool {
        room.players
            .iter()
            .any(|p| p.conn_id == conn_id && p.is_leader)
    }

    fn send_to(&self, conn_id: Uuid, msg: TeamServerMsg) {
        if let Some(code) = self.conn_rooms.get(&conn_id) {
            if let Some(room) = self.rooms.get(code) {
                if let Some(p) = room.players.iter().find(|p| p.conn_id == conn_id) {
                    let _ = p.tx.send(msg);
                }
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for TeamMenu {
    fn default() -> Self {
        Self::new()
    }
}

/// Lobby facade wiring the menu to matchmaking
pub struct Lobby {
    menu: Mutex<TeamMenu>,
    manager: GameManagerHandle,
}

impl Lobby {
    pub fn new(manager: GameManagerHandle) -> Self {
        Self {
            menu: Mutex::new(TeamMenu::new()),
            manager,
        }
    }

    /// Dispatch one inbound lobby message
    pub async fn handle(&self, conn_id: Uuid, tx: &LobbySender, msg: TeamClientMsg) {
        match msg {
            TeamClientMsg::Create { name, room_data } => {
                self.menu.lock().await.create(conn_id, tx.clone(), name, room_data);
            }
            TeamClientMsg::Join { room_code, name } => {
                self.menu
                    .lock()
                    .await
                    .join(conn_id, tx.clone(), room_code, name);
            }
            TeamClientMsg::ChangeName { name } => {
                self.menu.lock().await.change_name(conn_id, name);
            }
            TeamClientMsg::SetRoomProps(props) => {
                self.menu.lock().await.set_room_props(conn_id, props);
            }
            TeamClientMsg::Kick { player_id } => {
                self.menu.lock().await.kick(conn_id, player_id);
            }
            TeamClientMsg::KeepAlive => {
                self.menu.lock().await.keep_alive(conn_id);
            }
            TeamClientMsg::PlayGame => {
                self.play_game(conn_id).await;
            }
            TeamClientMsg::GameComplete => {
                self.menu.lock().await.game_complete(conn_id);
            }
        }
    }

    pub async fn disconnect(&self, conn_id: Uuid) {
        self.menu.lock().await.remove_player(conn_id);
    }

    pub async fn room_count(&self) -> usize {
        self.menu.lock().await.room_count()
    }

    /// Leader-only handoff to matchmaking. `finding_game` is cleared and a
    /// state broadcast issued on every exit path, success or failure, so
    /// the room is always left resumable.
    async fn play_game(&self, conn_id: Uuid) {
        let mut menu = self.menu.lock().await;

        let Some(code) = menu.conn_rooms.get(&conn_id).cloned() else {
            return;
        };
        let query = {
            let Some(room) = menu.rooms.get_mut(&code) else {
                return;
            };
            if !TeamMenu::is_leader(room, conn_id) {
                return;
            }
            room.finding_game = true;
            room.last_error = String::new();
            FindGameQuery {
                game_mode_idx: room.props.game_mode_idx,
                auto_fill: room.props.auto_fill,
                player_count: room.players.len() as u32,
                preferred_team_id: None,
            }
        };
        menu.broadcast(&code);

        let wanted_mode = query.game_mode_idx;
        let result = self.manager.find_game(query).await;

        // the room may have vanished while matchmaking ran
        if !menu.rooms.contains_key(&code) {
            menu.send_to(
                conn_id,
                TeamServerMsg::Error {
                    kind: TeamErrorKind::LostConn,
                },
            );
            return;
        }

        match result {
            Ok(res) if res.game_mode_idx == wanted_mode => {
                let room = menu.rooms.get_mut(&code).expect("checked above");
                let room_id = room.id;
                for p in &mut room.players {
                    p.in_game = true;
                    let _ = p.tx.send(TeamServerMsg::JoinGame {
                        game_id: res.game_id,
                        join_token: res.join_token,
                        room_id,
                    });
                }
                room.finding_game = false;
                info!(room_code = %code, game_id = %res.game_id, "room sent to game");
            }
            Ok(_) => {
                warn!(room_code = %code, "matchmaking returned wrong mode");
                self.fail_find(&mut menu, &code, conn_id, TeamErrorKind::FindGameInvalidProtocol);
            }
            Err(e) => {
                warn!(room_code = %code, error = %e, "matchmaking failed");
                self.fail_find(&mut menu, &code, conn_id, TeamErrorKind::FindGameError);
            }
        }
        menu.broadcast(&code);
    }

    fn fail_find(&self, menu: &mut TeamMenu, code: &str, leader: Uuid, kind: TeamErrorKind) {
        if let Some(room) = menu.rooms.get_mut(code) {
            room.finding_game = false;
            room.last_error = format!("{:?}", kind);
        }
        // errors go to the requesting leader only
        menu.send_to(leader, TeamServerMsg::Error { kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::test_support::RecordingTransport;
    use std::sync::Arc;

    fn props(mode_idx: u32) -> RoomProps {
        RoomProps {
            region: "local".to_string(),
            game_mode_idx: mode_idx,
            auto_fill: false,
        }
    }

    fn conn() -> (Uuid, LobbySender, mpsc::UnboundedReceiver<TeamServerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TeamServerMsg>) -> Vec<TeamServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn last_state(rx: &mut mpsc::UnboundedReceiver<TeamServerMsg>) -> Option<TeamServerMsg> {
        drain(rx)
            .into_iter()
            .filter(|m| matches!(m, TeamServerMsg::State { .. }))
            .last()
    }

    #[test]
    fn derived_capacity_clamps() {
        assert_eq!(max_players_for_mode(0), 2);
        assert_eq!(max_players_for_mode(1), 2);
        assert_eq!(max_players_for_mode(2), 4);
        assert_eq!(max_players_for_mode(9), 4);
    }

    #[test]
    fn create_then_join_broadcasts_to_both() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();

        menu.create(c1, tx1, "alice".to_string(), props(2));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            other => panic!("expected state, got {:?}", other),
        };

        menu.join(c2, tx2, code, "bob".to_string());

        for rx in [&mut rx1, &mut rx2] {
            match last_state(rx) {
                Some(TeamServerMsg::State {
                    players, ..
                }) => {
                    assert_eq!(players.len(), 2);
                    assert_eq!(players.iter().filter(|p| p.is_leader).count(), 1);
                }
                other => panic!("expected state, got {:?}", other),
            }
        }
    }

    #[test]
    fn join_unknown_code_fails() {
        let mut menu = TeamMenu::new();
        let (c, tx, mut rx) = conn();
        menu.join(c, tx, "ZZZZ".to_string(), "bob".to_string());
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [TeamServerMsg::Error {
                kind: TeamErrorKind::JoinFailed
            }]
        ));
    }

    #[test]
    fn third_join_at_duo_capacity_is_full() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        menu.create(c1, tx1, "a".to_string(), props(1));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => {
                assert_eq!(room.max_players, 2);
                room.room_code
            }
            _ => unreachable!(),
        };

        let (c2, tx2, _rx2) = conn();
        menu.join(c2, tx2, code.clone(), "b".to_string());

        let (c3, tx3, mut rx3) = conn();
        menu.join(c3, tx3, code, "c".to_string());
        assert!(matches!(
            drain(&mut rx3).as_slice(),
            [TeamServerMsg::Error {
                kind: TeamErrorKind::JoinFull
            }]
        ));
    }

    #[test]
    fn keep_alive_rebroadcasts_state_to_all_members() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            _ => unreachable!(),
        };
        menu.join(c2, tx2, code, "b".to_string());
        drain(&mut rx1);
        drain(&mut rx2);

        menu.keep_alive(c2);

        // sender gets the heartbeat ack plus the state rebroadcast
        let msgs = drain(&mut rx2);
        assert!(msgs.iter().any(|m| matches!(m, TeamServerMsg::KeepAlive)));
        assert!(msgs
            .iter()
            .any(|m| matches!(m, TeamServerMsg::State { .. })));
        // the other member gets the rebroadcast too
        assert!(last_state(&mut rx1).is_some());
    }

    #[test]
    fn leader_cannot_kick_self() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        drain(&mut rx1);

        menu.kick(c1, 0);
        assert_eq!(menu.room_count(), 1);
        assert!(drain(&mut rx1).is_empty());
    }

    #[test]
    fn kick_non_leader_keeps_leadership() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            _ => unreachable!(),
        };
        menu.join(c2, tx2, code, "b".to_string());
        drain(&mut rx1);
        drain(&mut rx2);

        menu.kick(c1, 1);

        // kicked player gets the terminal notice, not a state broadcast
        let kicked_msgs = drain(&mut rx2);
        assert!(matches!(kicked_msgs.as_slice(), [TeamServerMsg::Kicked]));

        match last_state(&mut rx1) {
            Some(TeamServerMsg::State { players, .. }) => {
                assert_eq!(players.len(), 1);
                assert!(players[0].is_leader);
            }
            _ => panic!("leader should get a state broadcast"),
        }
    }

    #[test]
    fn non_leader_props_change_silently_ignored() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            _ => unreachable!(),
        };
        menu.join(c2, tx2, code, "b".to_string());
        drain(&mut rx1);
        drain(&mut rx2);

        menu.set_room_props(c2, props(1));
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn leader_leaves_leadership_transfers() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            _ => unreachable!(),
        };
        menu.join(c2, tx2, code, "b".to_string());
        drain(&mut rx2);

        menu.remove_player(c1);
        match last_state(&mut rx2) {
            Some(TeamServerMsg::State {
                local_player_id,
                players,
                ..
            }) => {
                assert_eq!(players.len(), 1);
                assert!(players[0].is_leader);
                // indexes recomputed, no gaps
                assert_eq!(local_player_id, 0);
            }
            _ => panic!("expected state broadcast"),
        }
    }

    #[test]
    fn last_player_leaving_deletes_room() {
        let mut menu = TeamMenu::new();
        let (c1, tx1, _rx1) = conn();
        menu.create(c1, tx1, "a".to_string(), props(2));
        assert_eq!(menu.room_count(), 1);
        menu.remove_player(c1);
        assert_eq!(menu.room_count(), 0);
    }

    #[test]
    fn room_codes_never_collide() {
        let mut menu = TeamMenu::new();
        for _ in 0..10_000 {
            let (c, tx, _rx) = conn();
            menu.create(c, tx, "p".to_string(), props(2));
        }
        // every create landed in its own room
        assert_eq!(menu.room_count(), 10_000);
    }

    #[tokio::test]
    async fn play_game_hands_room_to_match() {
        let config = Arc::new(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            region: "local".to_string(),
            client_origin: "*".to_string(),
            tick_rate: 30,
            net_sync_rate: 10,
            perf_logging: false,
        });
        let transport = Arc::new(RecordingTransport::default());
        let manager = GameManagerHandle::spawn(config, transport);
        let lobby = Lobby::new(manager);

        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        lobby
            .handle(
                c1,
                &tx1,
                TeamClientMsg::Create {
                    name: "a".to_string(),
                    room_data: props(1),
                },
            )
            .await;
        let code = match last_state(&mut rx1) {
            Some(TeamServerMsg::State { room, .. }) => room.room_code,
            _ => unreachable!(),
        };
        lobby
            .handle(
                c2,
                &tx2,
                TeamClientMsg::Join {
                    room_code: code,
                    name: "b".to_string(),
                },
            )
            .await;

        lobby.handle(c1, &tx1, TeamClientMsg::PlayGame).await;

        for rx in [&mut rx1, &mut rx2] {
            let msgs = drain(rx);
            assert!(
                msgs.iter()
                    .any(|m| matches!(m, TeamServerMsg::JoinGame { .. })),
                "every member receives joinGame"
            );
            // final broadcast shows the room settled and members in game
            let state = msgs
                .iter()
                .rev()
                .find(|m| matches!(m, TeamServerMsg::State { .. }));
            match state {
                Some(TeamServerMsg::State { room, players, .. }) => {
                    assert!(!room.finding_game);
                    assert!(players.iter().all(|p| p.in_game));
                }
                _ => panic!("expected state broadcast"),
            }
        }

        // non-leader playGame is silently ignored
        lobby.handle(c2, &tx2, TeamClientMsg::PlayGame).await;
        assert!(drain(&mut rx2).is_empty());
    }
}
