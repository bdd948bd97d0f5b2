//! Squad bookkeeping within a match
//!
//! A group is an ordered set of players sharing a team id. Member order is
//! insertion order and doubles as the turn order for spectator target
//! cycling. Members are never removed mid-match; disconnects are tracked on
//! the player, not the group.

use crate::game::player::{DamageType, PlayerBarn, PlayerId};

pub type GroupId = u32;

pub struct Group {
    pub id: GroupId,
    /// 0 = none; equals the group id outside faction mode
    pub team_id: u32,
    /// Opted in to receive unaffiliated matchmade players
    pub auto_fill: bool,
    /// Slots promised to pending joins, so concurrent matchmaking does not
    /// overcommit the squad
    pub reserved_slots: u32,
    pub members: Vec<PlayerId>,
    pub all_dead_or_disconnected: bool,
}

impl Group {
    pub fn new(id: GroupId, team_id: u32, auto_fill: bool) -> Self {
        Self {
            id,
            team_id,
            auto_fill,
            reserved_slots: 0,
            members: Vec::new(),
            all_dead_or_disconnected: false,
        }
    }

    /// Add a player exactly once; re-adding an existing member is a no-op
    pub fn add_member(&mut self, id: PlayerId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    /// Members plus outstanding reservations, the number matchmaking
    /// compares against the mode's team size
    pub fn committed_count(&self) -> usize {
        self.members.len() + self.reserved_slots as usize
    }

    /// Members passing an optional predicate
    pub fn members_where<'a, F>(&self, barn: &'a PlayerBarn, pred: F) -> Vec<&'a super::player::Player>
    where
        F: Fn(&super::player::Player) -> bool,
    {
        self.members
            .iter()
            .filter_map(|id| barn.get(*id))
            .filter(|p| pred(p))
            .collect()
    }

    /// Not dead and not disconnected, in member order
    pub fn alive_players<'a>(&self, barn: &'a PlayerBarn) -> Vec<&'a super::player::Player> {
        self.members_where(barn, |p| p.alive())
    }

    /// True iff every other not-dead member is downed. A remainder of zero
    /// is false, never vacuously true.
    pub fn all_teammates_downed(&self, barn: &PlayerBarn, excluding: PlayerId) -> bool {
        let others = self.members_where(barn, |p| p.id != excluding && !p.dead);
        !others.is_empty() && others.iter().all(|p| p.downed)
    }

    /// True if the caller is the sole member, or every other member is dead
    /// or disconnected. False on an empty remainder otherwise.
    pub fn all_teammates_dead_or_disconnected(
        &self,
        barn: &PlayerBarn,
        excluding: PlayerId,
    ) -> bool {
        if self.members.len() == 1 && self.members[0] == excluding {
            return true;
        }
        let others: Vec<PlayerId> = self
            .members
            .iter()
            .copied()
            .filter(|id| *id != excluding)
            .collect();
        if others.is_empty() {
            return false;
        }
        others.iter().all(|id| {
            barn.get(*id)
                .map(|p| p.dead || p.disconnected)
                .unwrap_or(true)
        })
    }

    /// Bleed out every other member, attributing each kill to that member's
    /// last downing source. Invoked exactly once, when the last non-knocked
    /// teammate becomes knocked. Returns the ids that were eliminated.
    pub fn kill_all_teammates(&self, barn: &mut PlayerBarn, excluding: PlayerId) -> Vec<PlayerId> {
        let mut killed = Vec::new();
        for id in &self.members {
            if *id == excluding {
                continue;
            }
            if let Some(p) = barn.get_mut(*id) {
                if !p.dead {
                    let source = p.downed_by;
                    p.kill(DamageType::Bleeding, source);
                    killed.push(*id);
                }
            }
        }
        killed
    }

    /// Recompute the eliminated flag from current member state
    pub fn update_status(&mut self, barn: &PlayerBarn) {
        self.all_dead_or_disconnected = !self.members.is_empty()
            && self.members.iter().all(|id| {
                barn.get(*id)
                    .map(|p| p.dead || p.disconnected)
                    .unwrap_or(true)
            });
    }

    /// Next alive member after `current`, wrapping at the end. None when no
    /// member is alive; callers must guard that case.
    pub fn next_player(&self, barn: &PlayerBarn, current: PlayerId) -> Option<PlayerId> {
        self.cycle(barn, current, 1)
    }

    /// Previous alive member before `current`, wrapping at the start
    pub fn prev_player(&self, barn: &PlayerBarn, current: PlayerId) -> Option<PlayerId> {
        self.cycle(barn, current, -1)
    }

    fn cycle(&self, barn: &PlayerBarn, current: PlayerId, step: i32) -> Option<PlayerId> {
        let alive: Vec<PlayerId> = self.alive_players(barn).iter().map(|p| p.id).collect();
        if alive.is_empty() {
            return None;
        }
        match alive.iter().position(|id| *id == current) {
            Some(pos) => {
                let len = alive.len() as i32;
                let next = (pos as i32 + step).rem_euclid(len) as usize;
                Some(alive[next])
            }
            // current target no longer alive; restart at the front
            None => Some(alive[0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Player;
    use uuid::Uuid;

    fn build(members: &[PlayerId]) -> (Group, PlayerBarn) {
        let mut group = Group::new(1, 1, false);
        let mut barn = PlayerBarn::default();
        for id in members {
            group.add_member(*id);
            barn.add(Player::new(
                *id,
                Uuid::new_v4(),
                format!("p{}", id),
                1,
                1,
                0.0,
                0.0,
            ));
        }
        (group, barn)
    }

    #[test]
    fn add_member_is_idempotent() {
        let (mut group, _) = build(&[1, 2]);
        group.add_member(2);
        assert_eq!(group.members, vec![1, 2]);
    }

    #[test]
    fn dead_or_disconnected_true_for_sole_member() {
        let (group, barn) = build(&[1]);
        assert!(group.all_teammates_dead_or_disconnected(&barn, 1));
    }

    #[test]
    fn dead_or_disconnected_requires_every_other_member() {
        let (group, mut barn) = build(&[1, 2, 3]);
        assert!(!group.all_teammates_dead_or_disconnected(&barn, 1));

        barn.get_mut(2).unwrap().dead = true;
        assert!(!group.all_teammates_dead_or_disconnected(&barn, 1));

        barn.get_mut(3).unwrap().disconnected = true;
        assert!(group.all_teammates_dead_or_disconnected(&barn, 1));
    }

    #[test]
    fn teammates_downed_never_vacuously_true() {
        let (group, mut barn) = build(&[1, 2]);
        // other member dead: remainder is empty, must be false
        barn.get_mut(2).unwrap().dead = true;
        assert!(!group.all_teammates_downed(&barn, 1));

        let (solo_group, solo_barn) = build(&[1]);
        assert!(!solo_group.all_teammates_downed(&solo_barn, 1));
    }

    #[test]
    fn teammates_downed_tracks_remaining_members() {
        let (group, mut barn) = build(&[1, 2, 3]);
        barn.get_mut(2).unwrap().down(Some(1));
        assert!(!group.all_teammates_downed(&barn, 1));

        barn.get_mut(3).unwrap().down(Some(1));
        assert!(group.all_teammates_downed(&barn, 1));
    }

    #[test]
    fn bleed_out_attributes_to_downing_source() {
        let (group, mut barn) = build(&[1, 2, 3]);
        barn.get_mut(2).unwrap().down(Some(9));
        barn.get_mut(3).unwrap().down(Some(7));

        let killed = group.kill_all_teammates(&mut barn, 1);
        assert_eq!(killed, vec![2, 3]);
        assert_eq!(barn.get(2).unwrap().killed_by, Some(9));
        assert_eq!(barn.get(3).unwrap().killed_by, Some(7));
        assert!(!barn.get(1).unwrap().dead);
    }

    #[test]
    fn cyclic_navigation_wraps_both_ends() {
        let (group, barn) = build(&[1, 2, 3]);
        assert_eq!(group.next_player(&barn, 3), Some(1));
        assert_eq!(group.prev_player(&barn, 1), Some(3));
        assert_eq!(group.next_player(&barn, 1), Some(2));
        assert_eq!(group.prev_player(&barn, 3), Some(2));
    }

    #[test]
    fn cyclic_navigation_skips_dead_members() {
        let (group, mut barn) = build(&[1, 2, 3]);
        barn.get_mut(2).unwrap().dead = true;
        assert_eq!(group.next_player(&barn, 1), Some(3));
        assert_eq!(group.prev_player(&barn, 1), Some(3));
    }

    #[test]
    fn navigation_none_with_zero_alive() {
        let (group, mut barn) = build(&[1, 2]);
        barn.get_mut(1).unwrap().dead = true;
        barn.get_mut(2).unwrap().dead = true;
        assert_eq!(group.next_player(&barn, 1), None);
    }

    #[test]
    fn update_status_flags_eliminated_group() {
        let (mut group, mut barn) = build(&[1, 2]);
        group.update_status(&barn);
        assert!(!group.all_dead_or_disconnected);

        barn.get_mut(1).unwrap().dead = true;
        barn.get_mut(2).unwrap().disconnected = true;
        group.update_status(&barn);
        assert!(group.all_dead_or_disconnected);
    }
}
