//! Match instance - per-match state and the authoritative update/sync cycle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{MIN_ACTIVE_TIME_SECS, TICK_DURATION_MICROS};
use crate::ws::protocol::{
    decode_payload, encode_frame, split_frame, DropItemMsg, EmoteMsg, GameOverMsg, InputMsg,
    JoinMsg, JoinedMsg, MsgType, SpectateMsg, UpdateMsg,
};

use super::barns::{
    AirdropBarn, DeadBodyBarn, ExplosionBarn, LootBarn, PlaneBarn, ProjectileBarn, TimedBarn,
};
use super::gas::{Gas, GasConfig};
use super::group::{Group, GroupId};
use super::player::{DamageType, Player, PlayerBarn, PlayerId};
use super::register::{ObjectKind, ObjectRegister};
use super::{GameMode, Transport};

/// Square map edge length in world units
const MAP_SIZE: f32 = 1024.0;

/// Seconds after `over` before sockets close and the slot frees, letting
/// the final state update reach clients
const TEARDOWN_DELAY_SECS: f32 = 0.75;

/// A game with no remaining players past this age is stopped
const EMPTY_GAME_WINDOW_SECS: f32 = 10.0;

/// Unclaimed join tokens expire after this long; their reservations are
/// released so partially-filled squads do not leak slots
const JOIN_TOKEN_TTL_SECS: f32 = 30.0;

/// Ticks between simulation load log lines when perf logging is on
const PERF_LOG_INTERVAL_TICKS: u64 = 300;

/// Pending join credential minted by matchmaking
pub struct JoinToken {
    pub id: Uuid,
    pub auto_fill: bool,
    pub reserved_count: u32,
    pub group_id: GroupId,
    pub age: f32,
}

/// Pluggable end-of-match evaluator, polled once per tick
pub type EndCondition = Box<dyn Fn(&PlayerBarn, &HashMap<GroupId, Group>) -> bool + Send>;

/// Default rule: the match is over once at most one non-eliminated group
/// remains, provided more than one group ever entered
pub fn last_group_standing(players: &PlayerBarn, groups: &HashMap<GroupId, Group>) -> bool {
    if groups.len() < 2 {
        return false;
    }
    let remaining = groups
        .values()
        .filter(|g| !g.members.is_empty() && !g.all_dead_or_disconnected)
        .filter(|g| g.alive_players(players).iter().any(|p| !p.downed))
        .count();
    remaining <= 1
}

pub struct Game {
    pub id: Uuid,
    pub mode: GameMode,

    pub started: bool,
    pub stopped: bool,
    pub over: bool,

    /// Seconds since the match started accepting simulation
    pub started_time: f32,
    pub tick: u64,

    pub register: ObjectRegister,
    pub gas: Gas,

    pub players: PlayerBarn,
    pub projectiles: ProjectileBarn,
    pub loot: LootBarn,
    pub explosions: ExplosionBarn,
    pub smoke: TimedBarn,
    pub decals: TimedBarn,
    pub airdrops: AirdropBarn,
    pub dead_bodies: DeadBodyBarn,
    pub planes: PlaneBarn,

    pub groups: HashMap<GroupId, Group>,
    next_group_id: GroupId,
    pub join_tokens: HashMap<Uuid, JoinToken>,
    socket_players: HashMap<Uuid, PlayerId>,

    /// Broadcast messages accumulated across ticks, flushed once per sync
    msgs: Vec<bytes::Bytes>,

    transport: Arc<dyn Transport>,
    end_condition: EndCondition,
    /// Counts down from the teardown delay once the match is over
    over_timer: Option<f32>,

    rng: ChaCha8Rng,

    perf_enabled: bool,
    perf_acc_micros: u64,
    perf_samples: u64,
}

impl Game {
    pub fn new(id: Uuid, mode: GameMode, transport: Arc<dyn Transport>, perf_enabled: bool) -> Self {
        let seed = rand::random::<u64>();
        Self {
            id,
            mode,
            started: false,
            stopped: false,
            over: false,
            started_time: 0.0,
            tick: 0,
            register: ObjectRegister::default(),
            gas: Gas::new(GasConfig::default(), MAP_SIZE / 2.0, MAP_SIZE / 2.0),
            players: PlayerBarn::default(),
            projectiles: ProjectileBarn::default(),
            loot: LootBarn::default(),
            explosions: ExplosionBarn::default(),
            smoke: TimedBarn::default(),
            decals: TimedBarn::default(),
            airdrops: AirdropBarn::default(),
            dead_bodies: DeadBodyBarn::default(),
            planes: PlaneBarn::default(),
            groups: HashMap::new(),
            next_group_id: 1,
            join_tokens: HashMap::new(),
            socket_players: HashMap::new(),
            msgs: Vec::new(),
            transport,
            end_condition: Box::new(last_group_standing),
            over_timer: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            perf_enabled,
            perf_acc_micros: 0,
            perf_samples: 0,
        }
    }

    /// Replace the end-of-match evaluator
    pub fn set_end_condition(&mut self, cond: EndCondition) {
        self.end_condition = cond;
    }

    /// A match accepts joins while below capacity, not ended, and the gas
    /// is still in the early game
    pub fn can_join(&self) -> bool {
        self.players.live_count() < self.mode.capacity() && !self.over && self.gas.stage < 2
    }

    // -----------------------------------------------------------------------
    // Matchmaking support
    // -----------------------------------------------------------------------

    /// Create a fresh group plus a join token reserving `reserved` slots
    pub fn register_party(&mut self, reserved: u32, auto_fill: bool) -> Uuid {
        let group_id = self.alloc_group(auto_fill);
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.reserved_slots = reserved;
        }
        self.mint_token(group_id, auto_fill, reserved)
    }

    /// Reserve `count` slots in an existing auto-fill group with room for
    /// the whole party, preferring a team-id match. Reuses the group's
    /// pending join code when one exists.
    pub fn reserve_fill_slot(&mut self, count: u32, preferred_team_id: Option<u32>) -> Option<Uuid> {
        let team_size = self.mode.team_mode.team_size();
        let mut candidate: Option<GroupId> = None;
        for group in self.groups.values() {
            if !group.auto_fill || group.committed_count() + count as usize > team_size {
                continue;
            }
            if Some(group.team_id) == preferred_team_id {
                candidate = Some(group.id);
                break;
            }
            candidate.get_or_insert(group.id);
        }
        let group_id = candidate?;

        if let Some(group) = self.groups.get_mut(&group_id) {
            group.reserved_slots += count;
        }
        if let Some(token) = self
            .join_tokens
            .values_mut()
            .find(|t| t.group_id == group_id)
        {
            token.reserved_count += count;
            return Some(token.id);
        }
        Some(self.mint_token(group_id, true, count))
    }

    fn alloc_group(&mut self, auto_fill: bool) -> GroupId {
        let id = self.next_group_id;
        self.next_group_id += 1;
        // team id equals group id outside faction mode
        self.groups.insert(id, Group::new(id, id, auto_fill));
        id
    }

    fn mint_token(&mut self, group_id: GroupId, auto_fill: bool, reserved: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.join_tokens.insert(
            id,
            JoinToken {
                id,
                auto_fill,
                reserved_count: reserved,
                group_id,
                age: 0.0,
            },
        );
        id
    }

    /// Drop expired tokens and release their group reservations
    fn expire_tokens(&mut self, dt: f32) {
        let mut expired = Vec::new();
        for token in self.join_tokens.values_mut() {
            token.age += dt;
            if token.age >= JOIN_TOKEN_TTL_SECS {
                expired.push(token.id);
            }
        }
        for id in expired {
            if let Some(token) = self.join_tokens.remove(&id) {
                if let Some(group) = self.groups.get_mut(&token.group_id) {
                    group.reserved_slots = group.reserved_slots.saturating_sub(token.reserved_count);
                }
                debug!(game_id = %self.id, token = %id, "join token expired");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound messages
    // -----------------------------------------------------------------------

    /// Dispatch one inbound frame from a socket. The match only reads the
    /// discriminator; payload interpretation belongs to per-type handlers.
    pub fn handle_msg(&mut self, socket_id: Uuid, data: &[u8]) {
        let Some((msg_type, payload)) = split_frame(data) else {
            self.transport.close(socket_id);
            return;
        };

        let player_id = self.socket_players.get(&socket_id).copied();

        match (msg_type, player_id) {
            (MsgType::Join, None) => match decode_payload::<JoinMsg>(payload) {
                Ok(msg) => self.handle_join(socket_id, msg),
                Err(_) => self.transport.close(socket_id),
            },
            // an unrecognized socket sending anything but a join is dropped
            (_, None) => {
                warn!(game_id = %self.id, socket = %socket_id, "message from unassociated socket");
                self.transport.close(socket_id);
            }
            (MsgType::Join, Some(_)) => {} // duplicate join, ignore
            (MsgType::Input, Some(id)) => {
                if let Ok(msg) = decode_payload::<InputMsg>(payload) {
                    if let Some(p) = self.players.get_mut(id) {
                        p.handle_input(msg);
                    }
                }
            }
            (MsgType::Emote, Some(id)) => {
                if let Ok(msg) = decode_payload::<EmoteMsg>(payload) {
                    self.players.handle_emote(id, msg);
                }
            }
            (MsgType::DropItem, Some(id)) => {
                if let Ok(msg) = decode_payload::<DropItemMsg>(payload) {
                    let item = msg.item.clone();
                    if let Some((x, y)) = self.players.handle_drop_item(id, msg) {
                        self.loot.spawn(&mut self.register, item, x, y);
                    }
                }
            }
            (MsgType::Spectate, Some(id)) => {
                if let Ok(msg) = decode_payload::<SpectateMsg>(payload) {
                    self.handle_spectate(id, msg);
                }
            }
            _ => {} // server-bound types from clients are a no-op
        }
    }

    fn handle_join(&mut self, socket_id: Uuid, msg: JoinMsg) {
        if !self.join_tokens.contains_key(&msg.token) {
            warn!(game_id = %self.id, socket = %socket_id, "join with unknown token");
            self.transport.close(socket_id);
            return;
        }

        // Reject before touching the reservation: an untouched token still
        // expires and releases the group's reserved slots.
        if !self.can_join() {
            self.transport.close(socket_id);
            return;
        }

        let Some(token) = self.join_tokens.get_mut(&msg.token) else {
            return;
        };
        let group_id = token.group_id;
        token.reserved_count = token.reserved_count.saturating_sub(1);
        if token.reserved_count == 0 {
            self.join_tokens.remove(&msg.token);
        }

        let (x, y) = self.spawn_position();
        let player_id = self.register.register(ObjectKind::Player, x, y);

        let team_id = self.groups.get(&group_id).map(|g| g.team_id).unwrap_or(0);
        let name = if msg.name.trim().is_empty() {
            format!("Player{}", player_id)
        } else {
            msg.name
        };
        let player = Player::new(player_id, socket_id, name, group_id, team_id, x, y);

        if let Some(group) = self.groups.get_mut(&group_id) {
            group.reserved_slots = group.reserved_slots.saturating_sub(1);
            group.add_member(player_id);
        }

        self.players.add(player);
        self.socket_players.insert(socket_id, player_id);

        if !self.started {
            self.started = true;
        }

        if let Ok(frame) = encode_frame(
            MsgType::Joined,
            &JoinedMsg {
                player_id,
                team_mode: self.mode.team_mode.as_u8(),
                game_id: self.id,
            },
        ) {
            self.transport.send(socket_id, frame);
        }

        info!(
            game_id = %self.id,
            player_id,
            player_count = self.players.len(),
            "player joined"
        );
    }

    fn handle_spectate(&mut self, id: PlayerId, msg: SpectateMsg) {
        let Some(player) = self.players.get(id) else {
            return;
        };
        if !player.dead {
            return;
        }
        let group_id = player.group_id;
        let current = player.spectating.unwrap_or(id);

        let Some(group) = self.groups.get(&group_id) else {
            return;
        };
        let target = if msg.spec_prev {
            group.prev_player(&self.players, current)
        } else if msg.spec_next || msg.spec_begin {
            group.next_player(&self.players, current)
        } else {
            return;
        };

        if let Some(p) = self.players.get_mut(id) {
            p.spectating = target;
        }
    }

    /// Socket closed. The player is flagged disconnected rather than
    /// removed; only connections abandoned before the minimum active time
    /// are fully removed.
    pub fn handle_socket_close(&mut self, socket_id: Uuid) {
        let Some(player_id) = self.socket_players.remove(&socket_id) else {
            return;
        };

        let abandoned = {
            let Some(player) = self.players.get_mut(player_id) else {
                return;
            };
            player.disconnected = true;
            player.time_alive < MIN_ACTIVE_TIME_SECS && !player.dead
        };

        let group_id = self.players.get(player_id).map(|p| p.group_id);

        if abandoned {
            self.register.unregister(player_id);
            self.players.remove(player_id);
        } else {
            self.register.set_dirty(player_id);
        }

        if let Some(gid) = group_id {
            if let Some(group) = self.groups.get_mut(&gid) {
                group.update_status(&self.players);
            }
        }

        info!(game_id = %self.id, player_id, abandoned, "player disconnected");
    }

    // -----------------------------------------------------------------------
    // Combat hooks (called by collaborator systems and by the gas)
    // -----------------------------------------------------------------------

    /// A player was knocked down. When this was the last non-knocked
    /// teammate, the whole squad bleeds out.
    pub fn on_player_downed(&mut self, id: PlayerId, source: Option<PlayerId>) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        let group_id = player.group_id;
        player.down(source);
        self.register.set_dirty(id);

        let wiped = self
            .groups
            .get(&group_id)
            .map(|g| g.all_teammates_downed(&self.players, id))
            .unwrap_or(false);

        if wiped {
            let killed = self
                .groups
                .get(&group_id)
                .map(|g| g.kill_all_teammates(&mut self.players, id))
                .unwrap_or_default();
            for victim in killed {
                self.on_player_killed(victim);
            }
            let own_source = self.players.get(id).and_then(|p| p.downed_by);
            if let Some(p) = self.players.get_mut(id) {
                p.kill(DamageType::Bleeding, own_source);
            }
            self.on_player_killed(id);
        }
    }

    /// Finalize a player elimination: body, ledger, group status
    pub fn on_player_killed(&mut self, id: PlayerId) {
        let Some(player) = self.players.get(id) else {
            return;
        };
        let (x, y, group_id) = (player.x, player.y, player.group_id);

        self.dead_bodies.spawn(&mut self.register, x, y);
        self.register.unregister(id);

        if let Some(group) = self.groups.get_mut(&group_id) {
            group.update_status(&self.players);
        }
    }

    // -----------------------------------------------------------------------
    // Update / sync cycle
    // -----------------------------------------------------------------------

    /// Advance the simulation by one fixed step. Barn order matters: gas
    /// before players so players react to the current circle, players
    /// before the objects they spawn this tick, projectiles after their
    /// triggers, decoration passes last.
    pub fn update(&mut self, dt: f32) {
        if self.stopped {
            return;
        }
        let tick_start = Instant::now();
        self.tick += 1;

        if self.started {
            self.started_time += dt;
        }

        self.gas.update(dt, &mut self.rng);

        let gas_kills = self.players.update(dt, &self.gas, &mut self.register);
        for id in gas_kills {
            self.on_player_killed(id);
        }

        self.airdrops
            .update(dt, &mut self.register, &mut self.loot);
        self.projectiles.update(dt, &mut self.register);

        // decoration passes
        self.planes.update(dt, &mut self.register);
        self.smoke.update(dt, &mut self.register);
        self.decals.update(dt, &mut self.register);

        self.expire_tokens(dt);

        if !self.over && self.started && (self.end_condition)(&self.players, &self.groups) {
            self.finish();
        }

        if let Some(timer) = self.over_timer.as_mut() {
            *timer -= dt;
            if *timer <= 0.0 {
                self.stop();
            }
        }

        // an emptied-out match past its startup window frees its slot
        if !self.over
            && self.started
            && self.players.live_count() == 0
            && self.started_time > EMPTY_GAME_WINDOW_SECS
        {
            info!(game_id = %self.id, "all players left, stopping");
            self.stop();
        }

        if self.perf_enabled {
            self.sample_perf(tick_start);
        }
    }

    /// Mark the match over, push the final state immediately, and start the
    /// teardown grace timer
    fn finish(&mut self) {
        self.over = true;
        self.over_timer = Some(TEARDOWN_DELAY_SECS);

        let winning_team_id = self
            .groups
            .values()
            .find(|g| !g.all_dead_or_disconnected && !g.members.is_empty())
            .map(|g| g.team_id)
            .unwrap_or(0);

        if let Ok(frame) = encode_frame(
            MsgType::GameOver,
            &GameOverMsg {
                winning_team_id,
                game_over: true,
            },
        ) {
            self.msgs.push(frame);
        }

        // flush the final state now instead of waiting for the sync timer
        self.net_sync();

        info!(game_id = %self.id, winning_team_id, "game over");
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for socket_id in self.socket_players.keys() {
            self.transport.close(*socket_id);
        }
        info!(game_id = %self.id, "game stopped");
    }

    /// Serialize accumulated changes and flush them to every connected
    /// player. Runs at the (slower) sync cadence; the register folds all
    /// ticks since the previous call into one increment.
    pub fn net_sync(&mut self) {
        if self.stopped {
            return;
        }

        let inc = self.register.serialize_increment();
        let update = UpdateMsg {
            full_objects: inc.created,
            part_objects: inc.dirty,
            deleted_objects: inc.deleted,
            explosions: self.explosions.flush(),
            emotes: self.players.flush(),
            gas_stage: self.gas.stage,
            gas_radius: self.gas.radius,
            alive_count: self.players.alive_count() as u32,
        };

        let frame = match encode_frame(MsgType::Update, &update) {
            Ok(f) => f,
            Err(e) => {
                warn!(game_id = %self.id, error = %e, "failed to encode update");
                return;
            }
        };

        for socket_id in self.socket_players.keys() {
            self.transport.send(*socket_id, frame.clone());
            for msg in &self.msgs {
                self.transport.send(*socket_id, msg.clone());
            }
        }
        self.msgs.clear();
    }

    fn spawn_position(&mut self) -> (f32, f32) {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..self.gas.radius * 0.8);
        (
            self.gas.center_x + angle.cos() * distance,
            self.gas.center_y + angle.sin() * distance,
        )
    }

    fn sample_perf(&mut self, tick_start: Instant) {
        self.perf_acc_micros += tick_start.elapsed().as_micros() as u64;
        self.perf_samples += 1;
        if self.perf_samples >= PERF_LOG_INTERVAL_TICKS {
            let avg = self.perf_acc_micros / self.perf_samples;
            let load_pct = avg as f64 / TICK_DURATION_MICROS as f64 * 100.0;
            info!(
                game_id = %self.id,
                avg_tick_micros = avg,
                load_pct = format!("{:.1}", load_pct),
                "simulation load"
            );
            self.perf_acc_micros = 0;
            self.perf_samples = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::RecordingTransport;
    use crate::game::TeamMode;

    fn new_game(team_mode: TeamMode) -> (Game, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let game = Game::new(
            Uuid::new_v4(),
            GameMode {
                team_mode,
                map_idx: 0,
            },
            transport.clone(),
            false,
        );
        (game, transport)
    }

    fn join(game: &mut Game, token: Uuid, name: &str) -> Uuid {
        let socket = Uuid::new_v4();
        let frame = encode_frame(
            MsgType::Join,
            &JoinMsg {
                token,
                name: name.to_string(),
            },
        )
        .unwrap();
        game.handle_msg(socket, &frame);
        socket
    }

    #[test]
    fn unassociated_socket_non_join_is_disconnected() {
        let (mut game, transport) = new_game(TeamMode::Solo);
        let socket = Uuid::new_v4();
        let frame = encode_frame(MsgType::Input, &InputMsg::default()).unwrap();
        game.handle_msg(socket, &frame);
        assert_eq!(transport.closed.lock().as_slice(), &[socket]);
    }

    #[test]
    fn garbage_frame_is_disconnected() {
        let (mut game, transport) = new_game(TeamMode::Solo);
        let socket = Uuid::new_v4();
        game.handle_msg(socket, &[255, 0, 1]);
        assert_eq!(transport.closed.lock().len(), 1);
    }

    #[test]
    fn join_with_token_creates_player() {
        let (mut game, transport) = new_game(TeamMode::Duo);
        let token = game.register_party(2, false);
        join(&mut game, token, "alice");

        assert_eq!(game.players.len(), 1);
        assert!(game.started);
        // join ack went out
        assert_eq!(transport.sent.lock().len(), 1);
        // one reserved slot consumed, token kept for the second member
        assert!(game.join_tokens.contains_key(&token));
        join(&mut game, token, "bob");
        assert_eq!(game.players.len(), 2);
        assert!(!game.join_tokens.contains_key(&token));
    }

    #[test]
    fn join_with_unknown_token_is_closed() {
        let (mut game, transport) = new_game(TeamMode::Solo);
        join(&mut game, Uuid::new_v4(), "mallory");
        assert_eq!(game.players.len(), 0);
        assert_eq!(transport.closed.lock().len(), 1);
    }

    #[test]
    fn can_join_gated_on_gas_stage_and_over() {
        let (mut game, _) = new_game(TeamMode::Solo);
        assert!(game.can_join());

        game.gas.stage = 2;
        assert!(!game.can_join());

        game.gas.stage = 0;
        game.over = true;
        assert!(!game.can_join());
    }

    #[test]
    fn early_disconnect_removes_player() {
        let (mut game, _) = new_game(TeamMode::Solo);
        let token = game.register_party(1, false);
        let socket = join(&mut game, token, "alice");

        game.handle_socket_close(socket);
        assert_eq!(game.players.len(), 0);
    }

    #[test]
    fn late_disconnect_keeps_player_flagged() {
        let (mut game, _) = new_game(TeamMode::Solo);
        let token = game.register_party(1, false);
        let socket = join(&mut game, token, "alice");

        let id = *game.socket_players.get(&socket).unwrap();
        game.players.get_mut(id).unwrap().time_alive = MIN_ACTIVE_TIME_SECS + 1.0;

        game.handle_socket_close(socket);
        let p = game.players.get(id).unwrap();
        assert!(p.disconnected);
        assert!(!p.dead);
    }

    #[test]
    fn squad_wipe_bleeds_out_on_last_down() {
        let (mut game, _) = new_game(TeamMode::Duo);
        let token = game.register_party(2, false);
        let s1 = join(&mut game, token, "a");
        let s2 = join(&mut game, token, "b");
        let p1 = *game.socket_players.get(&s1).unwrap();
        let p2 = *game.socket_players.get(&s2).unwrap();

        game.on_player_downed(p1, Some(p2));
        assert!(!game.players.get(p1).unwrap().dead);

        game.on_player_downed(p2, Some(p1));
        assert!(game.players.get(p1).unwrap().dead);
        assert!(game.players.get(p2).unwrap().dead);
        assert_eq!(game.dead_bodies.len(), 2);
    }

    #[test]
    fn end_condition_triggers_over_and_deferred_stop() {
        let (mut game, transport) = new_game(TeamMode::Solo);
        let t1 = game.register_party(1, false);
        let t2 = game.register_party(1, false);
        let s1 = join(&mut game, t1, "a");
        join(&mut game, t2, "b");
        let p1 = *game.socket_players.get(&s1).unwrap();

        game.players.get_mut(p1).unwrap().dead = true;
        let gid = game.players.get(p1).unwrap().group_id;
        game.groups
            .get_mut(&gid)
            .unwrap()
            .update_status(&game.players);

        game.update(1.0 / 30.0);
        assert!(game.over);
        assert!(!game.can_join());
        assert!(!game.stopped);
        // final update was flushed immediately
        assert!(!transport.sent.lock().is_empty());

        // teardown delay elapses
        for _ in 0..30 {
            game.update(1.0 / 30.0);
        }
        assert!(game.stopped);
        assert!(!transport.closed.lock().is_empty());
    }

    #[test]
    fn reserve_fill_slot_prefers_team_match_and_reuses_token() {
        let (mut game, _) = new_game(TeamMode::Squad);
        let t1 = game.register_party(1, true);
        let g1 = game.join_tokens.get(&t1).unwrap().group_id;
        let _t2 = game.register_party(1, true);

        let team_id = game.groups.get(&g1).unwrap().team_id;
        let reused = game.reserve_fill_slot(1, Some(team_id)).unwrap();
        assert_eq!(reused, t1);
        assert_eq!(game.groups.get(&g1).unwrap().reserved_slots, 2);
    }

    #[test]
    fn rejected_join_keeps_reservation_until_expiry() {
        let (mut game, transport) = new_game(TeamMode::Duo);
        let token = game.register_party(2, true);
        let gid = game.join_tokens.get(&token).unwrap().group_id;

        game.gas.stage = 2;
        join(&mut game, token, "late");
        assert_eq!(game.players.len(), 0);
        assert_eq!(transport.closed.lock().len(), 1);

        // the untouched token still holds the reservation
        assert!(game.join_tokens.contains_key(&token));
        assert_eq!(game.groups.get(&gid).unwrap().reserved_slots, 2);

        // and expiry releases it
        for _ in 0..((JOIN_TOKEN_TTL_SECS as u32 + 1) * 30) {
            game.update(1.0 / 30.0);
        }
        assert!(!game.join_tokens.contains_key(&token));
        assert_eq!(game.groups.get(&gid).unwrap().reserved_slots, 0);
    }

    #[test]
    fn auto_fill_admits_whole_party() {
        let (mut game, transport) = new_game(TeamMode::Squad);
        let t1 = game.register_party(1, true);
        let s1 = join(&mut game, t1, "solo");
        let p1 = *game.socket_players.get(&s1).unwrap();
        let g1 = game.players.get(p1).unwrap().group_id;

        let t2 = game.reserve_fill_slot(2, None).unwrap();
        join(&mut game, t2, "duo_a");
        join(&mut game, t2, "duo_b");

        assert_eq!(game.players.len(), 3);
        assert!(transport.closed.lock().is_empty());
        // the party filled into the existing squad group
        assert!(game.players.iter().all(|p| p.group_id == g1));
    }

    #[test]
    fn full_groups_not_offered_for_fill() {
        let (mut game, _) = new_game(TeamMode::Duo);
        let _t = game.register_party(2, true);
        // both slots reserved, committed == team size
        assert!(game.reserve_fill_slot(1, None).is_none());
    }

    #[test]
    fn expired_tokens_release_reservations() {
        let (mut game, _) = new_game(TeamMode::Squad);
        let t = game.register_party(3, true);
        let gid = game.join_tokens.get(&t).unwrap().group_id;

        // run past the token TTL
        for _ in 0..((JOIN_TOKEN_TTL_SECS as u32 + 1) * 30) {
            game.update(1.0 / 30.0);
        }
        assert!(!game.join_tokens.contains_key(&t));
        assert_eq!(game.groups.get(&gid).unwrap().reserved_slots, 0);
    }
}
