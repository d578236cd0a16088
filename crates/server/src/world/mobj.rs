//! Map objects and the state table that animates them.

use glam::Vec3;
use protocol::{MobjDdFlags, MobjState, StateId, ThingId};

use crate::spatial::GridCell;

/// A map object.
#[derive(Debug, Clone, Default)]
pub struct Mobj {
    pub id: ThingId,
    /// Player slot when this is a player's body or camera.
    pub player: Option<u8>,
    /// BSP leaf containing the origin.
    pub leaf: Option<u32>,
    pub pos: Vec3,
    pub floor_z: f32,
    pub ceiling_z: f32,
    pub mom: Vec3,
    pub angle: u32,
    pub selector: i32,
    pub state: Option<StateId>,
    pub tics: i32,
    pub radius: f32,
    pub height: f32,
    pub dd_flags: MobjDdFlags,
    pub floor_clip: f32,
    pub translucency: u8,
    pub vis_target: i16,
    /// Blockmap cell the mobj is linked into.
    pub(crate) cell: Option<GridCell>,
}

impl Mobj {
    pub fn new(pos: Vec3, radius: f32, height: f32) -> Self {
        Self {
            pos,
            radius,
            height,
            ..Default::default()
        }
    }

    /// Radius used for contact spreading.
    #[inline]
    pub fn visual_radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn is_missile(&self) -> bool {
        self.dd_flags.contains(MobjDdFlags::MISSILE)
    }

    /// Replicated fields, z untouched.
    pub fn snapshot(&self) -> MobjState {
        MobjState {
            id: self.id,
            player: self.player,
            leaf: self.leaf,
            pos: self.pos,
            floor_z: self.floor_z,
            ceiling_z: self.ceiling_z,
            mom: self.mom,
            angle: self.angle,
            selector: self.selector,
            state: self.state,
            tics: self.tics,
            radius: self.radius,
            height: self.height,
            dd_flags: self.dd_flags,
            floor_clip: self.floor_clip,
            translucency: self.translucency,
            vis_target: self.vis_target,
        }
    }
}

/// One animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDef {
    /// Duration, -1 for a frame that never advances.
    pub tics: i32,
    pub next: Option<StateId>,
}

/// Longest `next` chain followed when matching sequences.
const SEQUENCE_WALK_LIMIT: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct StateTable {
    states: Vec<StateDef>,
}

impl StateTable {
    pub fn new(states: Vec<StateDef>) -> Self {
        Self { states }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[inline]
    pub fn get(&self, id: StateId) -> Option<&StateDef> {
        self.states.get(id.0 as usize)
    }

    /// Starting tics of a state, 0 for none.
    pub fn tics(&self, id: Option<StateId>) -> i32 {
        id.and_then(|id| self.get(id)).map_or(0, |s| s.tics)
    }

    /// True when `new` is `old` or a frame `old` will advance into on its
    /// own, so a client already animating `old` needs no update.
    pub fn same_sequence(&self, new: Option<StateId>, old: Option<StateId>) -> bool {
        let (new, old) = match (new, old) {
            (None, None) => return true,
            (Some(new), Some(old)) => (new, old),
            _ => return false,
        };
        if new == old {
            return true;
        }
        if self.get(old).is_none_or(|s| s.tics == -1) {
            return false;
        }
        let mut it = self.get(old).and_then(|s| s.next);
        for _ in 0..SEQUENCE_WALK_LIMIT {
            let Some(id) = it else { return false };
            if id == old {
                return false;
            }
            if id == new {
                return true;
            }
            match self.get(id) {
                Some(def) if def.tics != -1 => it = def.next,
                _ => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_cycle() -> StateTable {
        // 0 -> 1 -> 2 -> 3 -> 0, 4 frozen, 5 -> 4
        StateTable::new(vec![
            StateDef { tics: 4, next: Some(StateId(1)) },
            StateDef { tics: 4, next: Some(StateId(2)) },
            StateDef { tics: 4, next: Some(StateId(3)) },
            StateDef { tics: 4, next: Some(StateId(0)) },
            StateDef { tics: -1, next: None },
            StateDef { tics: 8, next: Some(StateId(4)) },
        ])
    }

    #[test]
    fn test_same_sequence() {
        let t = walk_cycle();
        assert!(t.same_sequence(Some(StateId(2)), Some(StateId(2))));
        assert!(t.same_sequence(Some(StateId(3)), Some(StateId(0))));
        assert!(t.same_sequence(Some(StateId(0)), Some(StateId(3))));
        assert!(!t.same_sequence(Some(StateId(4)), Some(StateId(0))));
        // 4 is reached from 5 but never advances itself
        assert!(t.same_sequence(Some(StateId(4)), Some(StateId(5))));
        assert!(!t.same_sequence(Some(StateId(5)), Some(StateId(4))));
    }

    #[test]
    fn test_same_sequence_none() {
        let t = walk_cycle();
        assert!(t.same_sequence(None, None));
        assert!(!t.same_sequence(Some(StateId(1)), None));
        assert!(!t.same_sequence(None, Some(StateId(1))));
    }

    #[test]
    fn test_walk_is_bounded() {
        let mut chain: Vec<StateDef> = (0..40)
            .map(|i| StateDef { tics: 1, next: Some(StateId(i + 1)) })
            .collect();
        chain.push(StateDef { tics: 1, next: None });
        let t = StateTable::new(chain);
        assert!(t.same_sequence(Some(StateId(16)), Some(StateId(0))));
        assert!(!t.same_sequence(Some(StateId(17)), Some(StateId(0))));
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let mut mo = Mobj::new(Vec3::new(1.0, 2.0, 3.0), 20.0, 56.0);
        mo.id = 11;
        mo.translucency = 128;
        let s = mo.snapshot();
        assert_eq!(s.id, 11);
        assert_eq!(s.pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.translucency, 128);
    }
}
