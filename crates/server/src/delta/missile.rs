//! Missiles a client already knows the flight of.
//!
//! Once a client acks the creation of a missile it can move the missile on
//! its own. As long as the missile keeps the momentum it was created with,
//! later deltas need not carry its position or momentum on that axis.

use std::collections::HashMap;

use glam::Vec3;
use protocol::{MobjFlags, MobjState, ThingId};
use tracing::trace;

const AXIS_FLAGS: [MobjFlags; 3] = [
    MobjFlags::POS_X.union(MobjFlags::MOM_X),
    MobjFlags::POS_Y.union(MobjFlags::MOM_Y),
    MobjFlags::POS_Z.union(MobjFlags::MOM_Z),
];

#[derive(Debug, Clone, Default)]
pub struct MissileRecords {
    records: HashMap<ThingId, Vec3>,
}

impl MissileRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a missile on record with the momentum it was created with.
    pub fn add(&mut self, mobj: &MobjState) {
        trace!("Missile {} on record, mom {:?}", mobj.id, mobj.mom);
        self.records.insert(mobj.id, mobj.mom);
    }

    /// Flags the client can do without for this missile delta.
    pub fn check(&self, mobj: &MobjState) -> MobjFlags {
        let Some(mom) = self.records.get(&mobj.id) else {
            return MobjFlags::empty();
        };
        if *mom == Vec3::ZERO {
            return MobjFlags::empty();
        }
        let mut exclude = MobjFlags::empty();
        for (axis, flags) in AXIS_FLAGS.iter().enumerate() {
            if mom[axis] == mobj.mom[axis] {
                exclude |= *flags;
            }
        }
        exclude
    }

    pub fn remove(&mut self, id: ThingId) -> bool {
        let removed = self.records.remove(&id).is_some();
        if removed {
            trace!("Missile {} off record", id);
        }
        removed
    }

    #[inline]
    pub fn contains(&self, id: ThingId) -> bool {
        self.records.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missile(id: ThingId, mom: Vec3) -> MobjState {
        MobjState { id, mom, ..Default::default() }
    }

    #[test]
    fn test_unknown_missile_excludes_nothing() {
        let records = MissileRecords::new();
        assert!(records.check(&missile(1, Vec3::X)).is_empty());
    }

    #[test]
    fn test_matching_axes_are_excluded() {
        let mut records = MissileRecords::new();
        records.add(&missile(1, Vec3::new(8.0, 0.0, -1.0)));
        let ex = records.check(&missile(1, Vec3::new(8.0, 2.0, -1.0)));
        assert_eq!(
            ex,
            MobjFlags::POS_X | MobjFlags::MOM_X | MobjFlags::POS_Z | MobjFlags::MOM_Z
        );
    }

    #[test]
    fn test_resting_missile_excludes_nothing() {
        let mut records = MissileRecords::new();
        records.add(&missile(2, Vec3::ZERO));
        assert!(records.check(&missile(2, Vec3::ZERO)).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut records = MissileRecords::new();
        records.add(&missile(3, Vec3::X));
        assert!(records.contains(3));
        assert!(records.remove(3));
        assert!(!records.remove(3));
        assert!(records.is_empty());
    }
}
