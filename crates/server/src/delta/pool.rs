//! Per-client delta pool.
//!
//! Deltas live in a slot arena indexed by a 1024-bucket hash on the entity
//! id. At most one NEW delta exists per entity; any number of UNACKED ones
//! may wait for acknowledgement. Each tick the pool is rated into a max-heap
//! and the transport extracts deltas from it in priority order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use protocol::{Delta, DeltaPayload, DeltaState, DeltaType, MobjDdFlags, MobjFlags, PlayerFlags, ThingId};
use tracing::{trace, warn};

use super::missile::MissileRecords;
use super::rating::{delta_distance, max_sound_distance, score_delta, DeltaOrigins, OwnerInfo};
use super::{merge, subtract, MergeOutcome};
use crate::config::PoolConfig;
use crate::error::DeltaError;
use crate::world::World;

pub const POOL_HASH_SIZE: usize = 1024;
const POOL_HASH_MASK: u32 = POOL_HASH_SIZE as u32 - 1;

/// Stable reference to a delta in a pool. Goes stale when the delta is
/// removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeltaHandle {
    slot: u32,
    generation: u32,
}

/// Set and resend ids of the frame being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameIds {
    pub set: u8,
    /// 0 when the frame carries no resent deltas.
    pub resend: u8,
}

/// What rating and exclusion need to know about the world.
#[derive(Debug, Clone, Copy)]
pub struct PoolContext<'a> {
    pub world: &'a World,
    pub origins: &'a DeltaOrigins,
    pub config: &'a PoolConfig,
    pub now_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub new: usize,
    pub unacked: usize,
    pub queued: usize,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    delta: Option<Delta>,
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f32,
    handle: DeltaHandle,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

fn logic_error(err: DeltaError) {
    warn!("Dropping delta: {}", err);
    debug_assert!(false, "{err}");
}

#[derive(Debug)]
pub struct ClientPool {
    owner: usize,
    pub owner_info: OwnerInfo,
    hash: Vec<Vec<u32>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    queue: BinaryHeap<Ranked>,
    missiles: MissileRecords,
    set_dealer: u8,
    resend_dealer: u8,
    is_first: bool,
}

impl ClientPool {
    pub fn new(owner: usize) -> Self {
        Self {
            owner,
            owner_info: OwnerInfo::default(),
            hash: vec![Vec::new(); POOL_HASH_SIZE],
            slots: Vec::new(),
            free: Vec::new(),
            queue: BinaryHeap::new(),
            missiles: MissileRecords::new(),
            set_dealer: 0,
            resend_dealer: 1,
            is_first: true,
        }
    }

    #[inline]
    pub fn owner(&self) -> usize {
        self.owner
    }

    /// The next frame is the client's first since (re)initialisation.
    #[inline]
    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn set_first(&mut self, first: bool) {
        self.is_first = first;
    }

    #[inline]
    pub fn missiles(&self) -> &MissileRecords {
        &self.missiles
    }

    #[inline]
    fn bucket(id: u32) -> usize {
        (id & POOL_HASH_MASK) as usize
    }

    fn handle(&self, slot: u32) -> DeltaHandle {
        DeltaHandle { slot, generation: self.slots[slot as usize].generation }
    }

    pub fn get(&self, handle: DeltaHandle) -> Option<&Delta> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.delta.as_ref()
    }

    fn get_mut(&mut self, handle: DeltaHandle) -> Option<&mut Delta> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.delta.as_mut()
    }

    fn insert(&mut self, delta: Delta) -> DeltaHandle {
        let bucket = Self::bucket(delta.id);
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize].delta = Some(delta);
                slot
            }
            None => {
                self.slots.push(Slot { generation: 0, delta: Some(delta) });
                self.slots.len() as u32 - 1
            }
        };
        self.hash[bucket].push(slot);
        self.handle(slot)
    }

    fn remove_slot(&mut self, slot: u32) -> Option<Delta> {
        let entry = self.slots.get_mut(slot as usize)?;
        let delta = entry.delta.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        let bucket = &mut self.hash[Self::bucket(delta.id)];
        if let Some(pos) = bucket.iter().position(|&s| s == slot) {
            bucket.remove(pos);
        }
        self.free.push(slot);
        Some(delta)
    }

    /// Deltas in the hash bucket of `id`, in insertion order.
    fn bucket_deltas(&self, id: u32) -> impl Iterator<Item = &Delta> {
        self.hash[Self::bucket(id)]
            .iter()
            .filter_map(|&slot| self.slots[slot as usize].delta.as_ref())
    }

    /// Every delta held for the entity `(id, delta_type)`.
    pub fn find(&self, id: u32, delta_type: DeltaType) -> impl Iterator<Item = &Delta> {
        self.bucket_deltas(id)
            .filter(move |d| d.id == id && d.delta_type() == delta_type)
    }

    pub fn len(&self) -> usize {
        self.hash.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hash.iter().all(Vec::is_empty)
    }

    pub fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts { queued: self.queue.len(), ..Default::default() };
        for delta in self.slots.iter().filter_map(|s| s.delta.as_ref()) {
            match delta.state {
                DeltaState::New => counts.new += 1,
                DeltaState::Unacked => counts.unacked += 1,
            }
        }
        counts
    }

    pub fn count_unacked(&self) -> usize {
        self.counts().unacked
    }

    /// Masks out what the owner has no use for. Returns false when the
    /// delta must not enter the pool at all.
    fn exclude(&mut self, delta: &mut Delta, ctx: &PoolContext) -> bool {
        if delta.is_sound() {
            let distance = delta_distance(delta, ctx.world, ctx.origins, &self.owner_info);
            return distance <= max_sound_distance(delta, ctx.config);
        }

        let camera = ctx.world.players.get(self.owner).and_then(|p| p.mobj);
        match &mut delta.payload {
            DeltaPayload::Mobj { flags, mobj } => {
                if camera == Some(delta.id) {
                    // the client moves its own camera
                    flags.remove(
                        MobjFlags::CAMERA_EXCLUDE | MobjFlags::POS | MobjFlags::MOM | MobjFlags::ANGLE,
                    );
                }
                if flags.contains(MobjFlags::NULL) {
                    self.missiles.remove(delta.id);
                } else if mobj.dd_flags.contains(MobjDdFlags::MISSILE) && !flags.contains(MobjFlags::CREATE) {
                    flags.remove(self.missiles.check(mobj));
                }
            }
            DeltaPayload::Player { flags, .. } => {
                if delta.id as usize == self.owner {
                    flags.remove(PlayerFlags::CAMERA_EXCLUDE);
                } else {
                    flags.remove(PlayerFlags::NONCAMERA_EXCLUDE);
                }
            }
            _ => {}
        }
        true
    }

    /// Adds a freshly generated delta.
    ///
    /// Its fields are subtracted from the UNACKED deltas of the same entity,
    /// which are dropped if nothing remains. It then merges into the pending
    /// NEW delta, or becomes the NEW delta itself.
    pub fn add_delta(&mut self, delta: &Delta, ctx: &PoolContext) {
        let mut delta = delta.clone();
        if !self.exclude(&mut delta, ctx) || delta.is_void() {
            return;
        }
        delta.state = DeltaState::New;
        delta.set = 0;
        delta.resend = 0;

        let mut existing_new = None;
        let mut voided = Vec::new();
        for &slot in &self.hash[Self::bucket(delta.id)] {
            let Some(iter) = self.slots[slot as usize].delta.as_mut() else {
                continue;
            };
            if !iter.is_same(&delta) {
                continue;
            }
            match iter.state {
                DeltaState::New => existing_new = Some(slot),
                DeltaState::Unacked => {
                    // a stop must still follow its start
                    if delta.is_stop_sound() && iter.is_start_sound() {
                        continue;
                    }
                    if let Err(err) = subtract(iter, &delta) {
                        logic_error(err);
                        continue;
                    }
                    if iter.is_void() {
                        voided.push(slot);
                    }
                }
            }
        }
        for slot in voided {
            self.remove_slot(slot);
        }

        match existing_new {
            Some(slot) => {
                let Some(dest) = self.slots[slot as usize].delta.as_mut() else {
                    return;
                };
                match merge(dest, &delta) {
                    Ok(MergeOutcome::Merged) => {}
                    Ok(MergeOutcome::Cancelled) => {
                        self.remove_slot(slot);
                    }
                    Err(err) => logic_error(err),
                }
            }
            None => {
                self.insert(delta);
            }
        }
    }

    /// Drops the NEW deltas of a mobj that vanished predictably, and its
    /// missile record.
    pub fn mobj_removed(&mut self, id: ThingId) {
        let doomed: Vec<u32> = self.hash[Self::bucket(id)]
            .iter()
            .copied()
            .filter(|&slot| {
                self.slots[slot as usize].delta.as_ref().is_some_and(|d| {
                    d.state == DeltaState::New && d.delta_type() == DeltaType::Mobj && d.id == id
                })
            })
            .collect();
        for slot in doomed {
            self.remove_slot(slot);
        }
        self.missiles.remove(id);
    }

    /// Postponed deltas are left out of the queue.
    ///
    /// An UNACKED delta waits until its ack could have arrived. A NEW stop
    /// sound waits while a start sound for the same source is unacked.
    pub fn is_postponed(&self, delta: &Delta, now_ms: u32) -> bool {
        match delta.state {
            DeltaState::Unacked => delta.age(now_ms) < self.owner_info.ack_threshold,
            DeltaState::New => {
                if !delta.is_stop_sound() {
                    return false;
                }
                let postponed = self.bucket_deltas(delta.id).any(|iter| {
                    iter.state == DeltaState::Unacked && iter.is_same(delta) && iter.is_start_sound()
                });
                if postponed {
                    trace!("Postponing stop sound {:?} #{}", delta.delta_type(), delta.id);
                }
                postponed
            }
        }
    }

    fn queue_add(&mut self, handle: DeltaHandle, score: f32) {
        self.queue.push(Ranked { score, handle });
    }

    /// Scores every deliverable delta and rebuilds the priority queue.
    pub fn rate(&mut self, ctx: &PoolContext) {
        self.queue.clear();
        let mut ranked = Vec::new();
        for bucket in &self.hash {
            for &slot in bucket {
                let Some(delta) = self.slots[slot as usize].delta.as_ref() else {
                    continue;
                };
                if self.is_postponed(delta, ctx.now_ms) {
                    continue;
                }
                let distance = delta_distance(delta, ctx.world, ctx.origins, &self.owner_info);
                let score = score_delta(delta, distance, delta.age(ctx.now_ms), ctx.config);
                if score > 0.0 {
                    ranked.push((slot, score));
                }
            }
        }
        for (slot, score) in ranked {
            if let Some(delta) = self.slots[slot as usize].delta.as_mut() {
                delta.score = score;
            }
            let handle = self.handle(slot);
            self.queue_add(handle, score);
        }
    }

    /// The highest scoring queued delta still in the pool.
    pub fn extract(&mut self) -> Option<DeltaHandle> {
        while let Some(top) = self.queue.pop() {
            if self.get(top.handle).is_some() {
                return Some(top.handle);
            }
        }
        None
    }

    /// Ids for the next frame. A resend id is dealt only when the queue
    /// holds deltas that were transmitted before.
    pub fn begin_frame(&mut self) -> FrameIds {
        self.set_dealer = self.set_dealer.wrapping_add(1);
        let resending = self
            .queue
            .iter()
            .filter_map(|r| self.get(r.handle))
            .any(|d| d.state == DeltaState::Unacked);
        let resend = if resending {
            if self.resend_dealer == 0 {
                self.resend_dealer = 1;
            }
            let id = self.resend_dealer;
            self.resend_dealer = self.resend_dealer.wrapping_add(1);
            id
        } else {
            0
        };
        FrameIds { set: self.set_dealer, resend }
    }

    /// Records that the delta went out in the frame `ids`.
    pub fn mark_sent(&mut self, handle: DeltaHandle, ids: FrameIds, now_ms: u32) -> bool {
        let Some(delta) = self.get_mut(handle) else {
            return false;
        };
        match delta.state {
            DeltaState::New => {
                delta.state = DeltaState::Unacked;
                delta.set = ids.set;
            }
            DeltaState::Unacked => delta.resend = ids.resend,
        }
        delta.time_stamp = now_ms;
        true
    }

    /// Removes the UNACKED deltas of a set, or of a resend id when
    /// `resent`. Returns the age of the first acked delta.
    pub fn ack_set(&mut self, id: u8, resent: bool, now_ms: u32) -> Option<u32> {
        let acked: Vec<u32> = self
            .hash
            .iter()
            .flatten()
            .copied()
            .filter(|&slot| {
                self.slots[slot as usize].delta.as_ref().is_some_and(|d| {
                    d.state == DeltaState::Unacked && if resent { d.resend == id } else { d.set == id }
                })
            })
            .collect();

        let mut ack_time = None;
        for slot in acked {
            let Some(delta) = self.remove_slot(slot) else {
                continue;
            };
            ack_time.get_or_insert(delta.age(now_ms));
            if let DeltaPayload::Mobj { flags, mobj } = &delta.payload {
                if flags.contains(MobjFlags::CREATE) && mobj.dd_flags.contains(MobjDdFlags::MISSILE) {
                    self.missiles.add(mobj);
                }
            }
        }
        ack_time
    }

    /// Empties the pool and restarts the frame ids.
    pub fn drain(&mut self) {
        self.clear();
        self.set_dealer = 0;
        self.resend_dealer = 0;
    }

    /// Empties the pool for a new map.
    pub fn reset_for_map(&mut self) {
        self.clear();
        self.resend_dealer = 1;
        self.is_first = true;
        self.owner_info = OwnerInfo::default();
    }

    fn clear(&mut self) {
        self.hash.iter_mut().for_each(Vec::clear);
        self.slots.clear();
        self.free.clear();
        self.queue.clear();
        self.missiles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{MapBuilder, Mobj};
    use glam::Vec3;
    use proptest::prelude::*;
    use protocol::{MobjState, SoundFlags, SoundSource, SoundState};

    struct Fixture {
        world: World,
        origins: DeltaOrigins,
        config: PoolConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let world = MapBuilder::new(2, 2, 128.0).build(64.0).unwrap();
            let origins = DeltaOrigins::new(&world, &world.side_owners());
            Self { world, origins, config: PoolConfig::default() }
        }

        fn ctx(&self, now_ms: u32) -> PoolContext<'_> {
            PoolContext { world: &self.world, origins: &self.origins, config: &self.config, now_ms }
        }
    }

    fn mobj_delta(id: u32, flags: MobjFlags, x: f32) -> Delta {
        Delta::new(
            id,
            0,
            DeltaPayload::Mobj {
                flags,
                mobj: MobjState { id, pos: Vec3::new(x, 20.0, 0.0), radius: 20.0, height: 20.0, ..Default::default() },
            },
        )
    }

    fn sound_delta(id: u32, volume: f32) -> Delta {
        Delta::new(
            id,
            0,
            DeltaPayload::Sound {
                source: SoundSource::World,
                flags: SoundFlags::VOLUME,
                sound: SoundState { sound_id: id as i32, emitter: None, volume },
            },
        )
    }

    /// Sends everything in the queue as one frame.
    fn send_all(pool: &mut ClientPool, ctx: &PoolContext) -> FrameIds {
        pool.rate(ctx);
        let ids = pool.begin_frame();
        while let Some(h) = pool.extract() {
            pool.mark_sent(h, ids, ctx.now_ms);
        }
        ids
    }

    #[test]
    fn test_new_deltas_merge() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(7, MobjFlags::POS_X, 10.0), &f.ctx(0));
        let mut d2 = mobj_delta(7, MobjFlags::POS_Y, 0.0);
        if let DeltaPayload::Mobj { mobj, .. } = &mut d2.payload {
            mobj.pos.y = 44.0;
        }
        pool.add_delta(&d2, &f.ctx(0));

        let found: Vec<_> = pool.find(7, DeltaType::Mobj).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].state, DeltaState::New);
        let DeltaPayload::Mobj { flags, mobj } = &found[0].payload else {
            panic!("not a mobj delta");
        };
        assert_eq!(*flags, MobjFlags::POS_X | MobjFlags::POS_Y);
        assert_eq!(mobj.pos.x, 10.0);
        assert_eq!(mobj.pos.y, 44.0);
    }

    #[test]
    fn test_create_then_null_leaves_nothing() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(9, MobjFlags::CREATE | MobjFlags::POS, 1.0), &f.ctx(0));
        pool.add_delta(&mobj_delta(9, MobjFlags::NULL, 1.0), &f.ctx(0));
        assert_eq!(pool.find(9, DeltaType::Mobj).count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_void_delta_not_added() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(3, MobjFlags::empty(), 0.0), &f.ctx(0));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_superseded_unacked_delta_is_dropped() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(4, MobjFlags::POS_X | MobjFlags::ANGLE, 1.0), &f.ctx(0));
        send_all(&mut pool, &f.ctx(0));
        assert_eq!(pool.count_unacked(), 1);

        // partially superseded: ANGLE survives
        pool.add_delta(&mobj_delta(4, MobjFlags::POS_X, 2.0), &f.ctx(10));
        let unacked: Vec<_> = pool.find(4, DeltaType::Mobj).filter(|d| d.state == DeltaState::Unacked).collect();
        assert_eq!(unacked.len(), 1);
        assert_eq!(unacked[0].payload.bits(), MobjFlags::ANGLE.bits());

        pool.add_delta(&mobj_delta(4, MobjFlags::ANGLE, 2.0), &f.ctx(20));
        assert_eq!(pool.count_unacked(), 0);
        assert_eq!(pool.find(4, DeltaType::Mobj).count(), 1);
    }

    #[test]
    fn test_stop_sound_waits_for_start_ack() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.owner_info.ack_threshold = 100;
        pool.add_delta(&sound_delta(5, 1.0), &f.ctx(0));
        let ids = send_all(&mut pool, &f.ctx(0));

        pool.add_delta(&sound_delta(5, 0.0), &f.ctx(5));
        let stop = pool
            .find(5, DeltaType::Sound)
            .find(|d| d.state == DeltaState::New)
            .cloned()
            .unwrap();
        assert!(stop.is_stop_sound());
        assert!(pool.is_postponed(&stop, 5));

        // the stop is not even queued
        pool.rate(&f.ctx(5));
        let h = pool.extract();
        assert!(h.is_none());

        assert!(pool.ack_set(ids.set, false, 30).is_some());
        assert!(!pool.is_postponed(&stop, 30));
        pool.rate(&f.ctx(30));
        let h = pool.extract().unwrap();
        assert!(pool.get(h).unwrap().is_stop_sound());
    }

    #[test]
    fn test_unacked_waits_for_threshold() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.owner_info.ack_threshold = 100;
        pool.add_delta(&mobj_delta(6, MobjFlags::POS_X, 1.0), &f.ctx(0));
        send_all(&mut pool, &f.ctx(0));

        pool.rate(&f.ctx(50));
        assert!(pool.extract().is_none());

        pool.rate(&f.ctx(150));
        let ids = pool.begin_frame();
        assert_ne!(ids.resend, 0);
        let h = pool.extract().unwrap();
        assert!(pool.mark_sent(h, ids, 150));
        let d = pool.get(h).unwrap();
        assert_eq!(d.resend, ids.resend);
        assert_eq!(d.time_stamp, 150);

        assert_eq!(pool.ack_set(ids.resend, true, 170), Some(20));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_no_resend_id_without_resends() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(1, MobjFlags::POS_X, 1.0), &f.ctx(0));
        pool.rate(&f.ctx(0));
        let ids = pool.begin_frame();
        assert_eq!(ids, FrameIds { set: 1, resend: 0 });
    }

    #[test]
    fn test_acked_missile_create_goes_on_record() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        let mut create = mobj_delta(11, MobjFlags::CREATE | MobjFlags::POS | MobjFlags::MOM, 1.0);
        if let DeltaPayload::Mobj { mobj, .. } = &mut create.payload {
            mobj.dd_flags = MobjDdFlags::MISSILE;
            mobj.mom = Vec3::new(10.0, 0.0, 0.0);
        }
        pool.add_delta(&create, &f.ctx(0));
        let ids = send_all(&mut pool, &f.ctx(0));
        pool.ack_set(ids.set, false, 10);
        assert!(pool.missiles().contains(11));

        // the client flies it: only POS_Y/MOM_Y could differ
        let mut update = mobj_delta(11, MobjFlags::POS | MobjFlags::MOM, 30.0);
        if let DeltaPayload::Mobj { mobj, .. } = &mut update.payload {
            mobj.dd_flags = MobjDdFlags::MISSILE;
            mobj.mom = Vec3::new(10.0, 2.0, 0.0);
        }
        pool.add_delta(&update, &f.ctx(20));
        let d = pool.find(11, DeltaType::Mobj).next().unwrap();
        assert_eq!(d.payload.bits(), (MobjFlags::POS_Y | MobjFlags::MOM_Y).bits());

        pool.add_delta(&mobj_delta(11, MobjFlags::NULL, 30.0), &f.ctx(30));
        assert!(!pool.missiles().contains(11));
    }

    #[test]
    fn test_own_camera_and_player_exclusion() {
        let mut f = Fixture::new();
        let id = f.world.spawn_mobj(Mobj::new(Vec3::new(10.0, 10.0, 0.0), 16.0, 56.0));
        f.world.players[0].in_game = true;
        f.world.players[0].mobj = Some(id);

        let mut own = ClientPool::new(0);
        let mut other = ClientPool::new(1);
        let d = mobj_delta(id, MobjFlags::POS_X | MobjFlags::STATE | MobjFlags::HEIGHT, 5.0);
        own.add_delta(&d, &f.ctx(0));
        other.add_delta(&d, &f.ctx(0));
        assert_eq!(own.find(id, DeltaType::Mobj).next().unwrap().payload.bits(), MobjFlags::HEIGHT.bits());
        assert_eq!(other.find(id, DeltaType::Mobj).next().unwrap().payload.bits(), d.payload.bits());

        let p = Delta::new(
            0,
            0,
            DeltaPayload::Player {
                flags: PlayerFlags::FORWARDMOVE | PlayerFlags::MOBJ,
                player: Default::default(),
            },
        );
        own.add_delta(&p, &f.ctx(0));
        other.add_delta(&p, &f.ctx(0));
        let own_bits = own.find(0, DeltaType::Player).next().unwrap().payload.bits();
        assert_eq!(own_bits, PlayerFlags::MOBJ.bits());
        let other_bits = other.find(0, DeltaType::Player).next().unwrap().payload.bits();
        assert_eq!(other_bits, PlayerFlags::MOBJ.bits());
    }

    #[test]
    fn test_far_sound_not_added() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.owner_info.pos = Vec3::new(5000.0, 0.0, 0.0);
        let mut d = sound_delta(2, 1.0);
        d.payload = DeltaPayload::Sound {
            source: SoundSource::Sector,
            flags: SoundFlags::VOLUME,
            sound: SoundState { sound_id: 2, emitter: None, volume: 1.0 },
        };
        d.id = 0;
        pool.add_delta(&d, &f.ctx(0));
        assert!(pool.is_empty());

        // a stop carries everywhere
        if let DeltaPayload::Sound { sound, .. } = &mut d.payload {
            sound.volume = 0.0;
        }
        pool.add_delta(&d, &f.ctx(0));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_mobj_removed_drops_new_only() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(8, MobjFlags::ANGLE, 1.0), &f.ctx(0));
        send_all(&mut pool, &f.ctx(0));
        pool.add_delta(&mobj_delta(8, MobjFlags::POS_X, 1.0), &f.ctx(0));
        assert_eq!(pool.len(), 2);
        pool.mobj_removed(8);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.count_unacked(), 1);
    }

    #[test]
    fn test_stale_handle() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(0);
        pool.add_delta(&mobj_delta(8, MobjFlags::ANGLE, 1.0), &f.ctx(0));
        pool.rate(&f.ctx(0));
        let h = pool.extract().unwrap();
        pool.mobj_removed(8);
        assert!(pool.get(h).is_none());
        pool.add_delta(&mobj_delta(8, MobjFlags::ANGLE, 1.0), &f.ctx(0));
        assert!(pool.get(h).is_none());
        assert!(!pool.mark_sent(h, FrameIds::default(), 0));
    }

    #[test]
    fn test_drain_and_reset() {
        let f = Fixture::new();
        let mut pool = ClientPool::new(2);
        pool.add_delta(&mobj_delta(1, MobjFlags::ANGLE, 1.0), &f.ctx(0));
        send_all(&mut pool, &f.ctx(0));
        pool.set_first(false);
        pool.drain();
        assert!(pool.is_empty());
        assert_eq!(pool.counts(), PoolCounts::default());
        assert!(!pool.is_first());
        pool.reset_for_map();
        assert!(pool.is_first());
    }

    proptest! {
        #[test]
        fn prop_queue_extracts_in_score_order(scores in proptest::collection::vec(0.0f32..1.0e6, 1..64)) {
            let f = Fixture::new();
            let mut pool = ClientPool::new(0);
            for i in 0..scores.len() as u32 {
                pool.add_delta(&mobj_delta(i + 1, MobjFlags::ANGLE, 0.0), &f.ctx(0));
            }
            let handles: Vec<_> = (0..pool.slots.len() as u32).map(|s| pool.handle(s)).collect();
            for (h, s) in handles.iter().zip(&scores) {
                pool.queue_add(*h, *s);
            }
            let mut last = f32::INFINITY;
            let mut extracted = 0;
            while let Some(h) = pool.extract() {
                let pos = handles.iter().position(|x| *x == h).unwrap();
                prop_assert!(scores[pos] <= last);
                last = scores[pos];
                extracted += 1;
            }
            prop_assert_eq!(extracted, scores.len());
        }

        #[test]
        fn prop_void_delta_leaves_pool_unchanged(id in 1u32..4096, present in any::<bool>()) {
            let f = Fixture::new();
            let mut pool = ClientPool::new(0);
            if present {
                pool.add_delta(&mobj_delta(id, MobjFlags::POS_X, 1.0), &f.ctx(0));
            }
            let before = pool.find(id, DeltaType::Mobj).count();
            pool.add_delta(&mobj_delta(id, MobjFlags::empty(), 2.0), &f.ctx(0));
            prop_assert_eq!(pool.find(id, DeltaType::Mobj).count(), before);
            prop_assert!(pool.find(id, DeltaType::Mobj).all(|d| !d.is_void()));
        }
    }
}
