//! Player entity and the player barn
//!
//! Players are the only simulation objects that own a socket. Inbound
//! gameplay messages are routed here by the match after dispatch; the barn
//! advances movement, life-state and gas damage every tick.

use tracing::debug;
use uuid::Uuid;

use crate::game::gas::Gas;
use crate::game::register::ObjectRegister;
use crate::ws::protocol::{DropItemMsg, EmoteData, EmoteMsg, InputMsg, ObjectId};

use std::collections::HashMap;

pub type PlayerId = ObjectId;

/// What eliminated a player, carried on kill attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageType {
    Player,
    Gas,
    Bleeding,
}

/// Base movement speed in world units per second
const MOVE_SPEED: f32 = 12.0;

pub struct Player {
    pub id: PlayerId,
    pub socket_id: Uuid,
    pub name: String,
    pub group_id: u32,
    pub team_id: u32,

    pub x: f32,
    pub y: f32,
    pub dir: f32,

    pub health: f32,
    pub dead: bool,
    pub downed: bool,
    pub disconnected: bool,
    /// Seconds this player has been active in the match
    pub time_alive: f32,

    /// Player who last downed this player, for bleed-out attribution
    pub downed_by: Option<PlayerId>,
    pub killed_by: Option<PlayerId>,
    pub kills: u32,

    pub last_input_seq: u32,
    pub input: InputMsg,
    /// Current spectate target when dead
    pub spectating: Option<PlayerId>,
}

impl Player {
    pub fn new(
        id: PlayerId,
        socket_id: Uuid,
        name: String,
        group_id: u32,
        team_id: u32,
        x: f32,
        y: f32,
    ) -> Self {
        Self {
            id,
            socket_id,
            name,
            group_id,
            team_id,
            x,
            y,
            dir: 0.0,
            health: 100.0,
            dead: false,
            downed: false,
            disconnected: false,
            time_alive: 0.0,
            downed_by: None,
            killed_by: None,
            kills: 0,
            last_input_seq: 0,
            input: InputMsg::default(),
            spectating: None,
        }
    }

    /// Store the latest input, rejecting stale sequence numbers
    pub fn handle_input(&mut self, input: InputMsg) {
        if self.dead || self.downed {
            return;
        }
        if input.seq <= self.last_input_seq && self.last_input_seq != 0 {
            return;
        }
        self.last_input_seq = input.seq;
        self.dir = input.aim;
        self.input = input;
    }

    /// Knock the player down, remembering the source for bleed attribution
    pub fn down(&mut self, source: Option<PlayerId>) {
        if self.dead || self.downed {
            return;
        }
        self.downed = true;
        self.downed_by = source;
        self.input = InputMsg::default();
    }

    /// Eliminate the player
    pub fn kill(&mut self, damage_type: DamageType, source: Option<PlayerId>) {
        if self.dead {
            return;
        }
        debug!(player_id = self.id, ?damage_type, "player killed");
        self.dead = true;
        self.downed = false;
        self.health = 0.0;
        self.killed_by = source;
        self.input = InputMsg::default();
    }

    pub fn alive(&self) -> bool {
        !self.dead && !self.disconnected
    }
}

/// Owns every player in a match
#[derive(Default)]
pub struct PlayerBarn {
    players: HashMap<PlayerId, Player>,
    /// Emotes received since the last sync, drained at flush time
    pending_emotes: Vec<EmoteData>,
}

impl PlayerBarn {
    pub fn add(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players still participating: not dead and not disconnected
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive()).count()
    }

    pub fn live_count(&self) -> usize {
        self.players.values().filter(|p| !p.disconnected).count()
    }

    pub fn handle_emote(&mut self, id: PlayerId, msg: EmoteMsg) {
        if let Some(p) = self.players.get(&id) {
            if p.dead {
                return;
            }
            self.pending_emotes.push(EmoteData {
                player_id: id,
                emote_id: msg.emote_id,
                x: msg.x,
                y: msg.y,
                is_ping: msg.is_ping,
            });
        }
    }

    pub fn handle_drop_item(&mut self, id: PlayerId, msg: DropItemMsg) -> Option<(f32, f32)> {
        let p = self.players.get(&id)?;
        if p.dead || msg.item.is_empty() {
            return None;
        }
        Some((p.x, p.y))
    }

    /// Advance movement, active time and gas damage for one tick. Returns
    /// ids of players the gas eliminated this tick.
    pub fn update(&mut self, dt: f32, gas: &Gas, register: &mut ObjectRegister) -> Vec<PlayerId> {
        let mut gas_kills = Vec::new();

        for player in self.players.values_mut() {
            if player.disconnected {
                continue;
            }
            player.time_alive += dt;

            if player.dead {
                continue;
            }

            if !player.downed {
                let (mx, my) = (
                    player.input.move_x.clamp(-1.0, 1.0),
                    player.input.move_y.clamp(-1.0, 1.0),
                );
                if mx != 0.0 || my != 0.0 {
                    let len = (mx * mx + my * my).sqrt();
                    player.x += mx / len * MOVE_SPEED * dt;
                    player.y += my / len * MOVE_SPEED * dt;
                    register.move_to(player.id, player.x, player.y);
                }
            }

            if !gas.is_inside(player.x, player.y) {
                player.health -= gas.damage_per_second() * dt;
                register.set_dirty(player.id);
                if player.health <= 0.0 {
                    player.kill(DamageType::Gas, None);
                    gas_kills.push(player.id);
                }
            }
        }

        gas_kills
    }

    /// Drain one-shot per-sync state
    pub fn flush(&mut self) -> Vec<EmoteData> {
        std::mem::take(&mut self.pending_emotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player(id: PlayerId) -> Player {
        Player::new(id, Uuid::new_v4(), format!("p{}", id), 1, 1, 0.0, 0.0)
    }

    #[test]
    fn stale_input_ignored() {
        let mut p = test_player(1);
        p.handle_input(InputMsg {
            seq: 5,
            move_x: 1.0,
            ..Default::default()
        });
        p.handle_input(InputMsg {
            seq: 3,
            move_x: -1.0,
            ..Default::default()
        });
        assert_eq!(p.input.move_x, 1.0);
        assert_eq!(p.last_input_seq, 5);
    }

    #[test]
    fn downed_player_takes_no_input() {
        let mut p = test_player(1);
        p.down(Some(2));
        p.handle_input(InputMsg {
            seq: 1,
            move_x: 1.0,
            ..Default::default()
        });
        assert_eq!(p.input.move_x, 0.0);
        assert_eq!(p.downed_by, Some(2));
    }

    #[test]
    fn kill_is_terminal() {
        let mut p = test_player(1);
        p.down(Some(2));
        p.kill(DamageType::Bleeding, p.downed_by);
        assert!(p.dead);
        assert!(!p.downed);
        assert_eq!(p.killed_by, Some(2));

        // a second kill does not change attribution
        p.kill(DamageType::Gas, None);
        assert_eq!(p.killed_by, Some(2));
    }

    #[test]
    fn dead_player_emotes_dropped() {
        let mut barn = PlayerBarn::default();
        let mut p = test_player(1);
        p.dead = true;
        barn.add(p);
        barn.handle_emote(
            1,
            EmoteMsg {
                emote_id: 3,
                x: 0.0,
                y: 0.0,
                is_ping: false,
            },
        );
        assert!(barn.flush().is_empty());
    }
}
