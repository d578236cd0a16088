//! Object links and BSP leaf contacts.
//!
//! Every frame the objects (mobjs and lights) are linked into a coarse
//! blockmap per object type. Spreading a leaf then walks the blocks around
//! it and, for each object found, floods outward from the object's own leaf
//! through the half-edges its radius reaches, recording a contact in every
//! leaf it touches. A per-leaf generation stamp marks the leaves visited by
//! the current flood so nothing has to be cleared between objects.

use std::ops::ControlFlow;

use glam::DVec2;
use protocol::ThingId;
use tracing::trace;

use crate::config::ObjlinkConfig;
use crate::error::MapError;
use crate::spatial::{Bounds, GridBlock, GridCell, Gridmap};
use crate::world::{middle_covers_opening, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjType {
    Mobj = 0,
    Lumobj = 1,
}

const NUM_OBJ_TYPES: usize = 2;

impl ObjType {
    pub const ALL: [ObjType; NUM_OBJ_TYPES] = [ObjType::Mobj, ObjType::Lumobj];
}

/// An object taking part in contact spreading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjRef {
    Mobj(ThingId),
    /// Index into the world's lumobjs.
    Lumobj(u32),
}

impl ObjRef {
    #[inline]
    pub fn obj_type(self) -> ObjType {
        match self {
            ObjRef::Mobj(_) => ObjType::Mobj,
            ObjRef::Lumobj(_) => ObjType::Lumobj,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ObjlinkBlock {
    links: Vec<usize>,
    done_spread: bool,
}

/// Where an object sits and how far it reaches.
struct Reach {
    origin: DVec2,
    radius: f64,
    leaf: u32,
}

struct ContactFinder {
    obj: ObjRef,
    origin: DVec2,
    /// Slightly shrunk radius for the edge distance test.
    radius: f64,
    /// Full-radius box for the leaf overlap test.
    bounds: Bounds,
}

#[derive(Debug)]
pub struct ObjlinkIndex {
    config: ObjlinkConfig,
    origin: DVec2,
    blockmaps: [Gridmap<ObjlinkBlock>; NUM_OBJ_TYPES],
    links: Vec<ObjRef>,
    contacts: Vec<[Vec<ObjRef>; NUM_OBJ_TYPES]>,
    leaf_valid: Vec<u32>,
    valid_count: u32,
    lum_max_radius: f64,
}

impl ObjlinkIndex {
    pub fn new(world: &World, config: &ObjlinkConfig) -> Result<Self, MapError> {
        let size = config.block_size;
        if !(size > 0.0) {
            return Err(MapError::InvalidCellSize(size, size));
        }
        let bounds = world.bounds();
        let w = (bounds.width() / size).ceil().max(1.0);
        let h = (bounds.height() / size).ceil().max(1.0);
        if w > f64::from(u32::MAX) || h > f64::from(u32::MAX) {
            return Err(MapError::GridDimensions(w as u64, h as u64));
        }
        let (w, h) = (w as u32, h as u32);
        let leaves = world.leaves.len();
        Ok(Self {
            config: config.clone(),
            origin: DVec2::new(bounds.min_x, bounds.min_y),
            blockmaps: [Gridmap::new(w, h)?, Gridmap::new(w, h)?],
            links: Vec::new(),
            contacts: vec![Default::default(); leaves],
            leaf_valid: vec![0; leaves],
            valid_count: 0,
            lum_max_radius: 0.0,
        })
    }

    /// Block of a map point. Points outside are clamped and flagged.
    fn to_block(&self, x: f64, y: f64) -> (GridCell, bool) {
        let grid = &self.blockmaps[0];
        let size = self.config.block_size;
        let axis = |v: f64, min: f64, n: u32| -> (u32, bool) {
            let max = min + f64::from(n) * size;
            if v < min {
                (0, true)
            } else if v >= max {
                (n - 1, true)
            } else {
                (((v - min) / size) as u32, false)
            }
        };
        let (cx, ax) = axis(x, self.origin.x, grid.width());
        let (cy, ay) = axis(y, self.origin.y, grid.height());
        (GridCell::new(cx, cy), ax | ay)
    }

    /// Drop every link and reset the spread flags.
    pub fn clear_for_frame(&mut self) {
        for bm in &mut self.blockmaps {
            let _ = bm.iterate_mut::<()>(|_, block| {
                block.links.clear();
                block.done_spread = false;
                ControlFlow::Continue(())
            });
        }
        self.links.clear();
        self.lum_max_radius = 0.0;
    }

    /// Queue an object for linking this frame.
    pub fn create(&mut self, obj: ObjRef) {
        self.links.push(obj);
    }

    fn reach(world: &World, obj: ObjRef) -> Option<Reach> {
        match obj {
            ObjRef::Mobj(id) => {
                let mo = world.mobj(id)?;
                Some(Reach {
                    origin: DVec2::new(f64::from(mo.pos.x), f64::from(mo.pos.y)),
                    radius: f64::from(mo.visual_radius()),
                    leaf: mo.leaf?,
                })
            }
            ObjRef::Lumobj(i) => {
                let lum = world.lumobjs.get(i as usize)?;
                if !lum.omni {
                    return None;
                }
                Some(Reach { origin: lum.origin.truncate(), radius: lum.radius, leaf: lum.leaf? })
            }
        }
    }

    /// Link the queued objects into their blocks. Objects outside the map
    /// are left out.
    pub fn link_objs(&mut self, world: &World) {
        for idx in 0..self.links.len() {
            let obj = self.links[idx];
            let origin = match obj {
                ObjRef::Mobj(id) => match world.mobj(id) {
                    Some(mo) => DVec2::new(f64::from(mo.pos.x), f64::from(mo.pos.y)),
                    None => continue,
                },
                ObjRef::Lumobj(i) => match world.lumobjs.get(i as usize) {
                    Some(lum) => {
                        self.lum_max_radius = self.lum_max_radius.max(lum.radius);
                        lum.origin.truncate()
                    }
                    None => continue,
                },
            };
            let (cell, adjusted) = self.to_block(origin.x, origin.y);
            if adjusted {
                trace!("{:?} lies outside the map, not linked", obj);
                continue;
            }
            let bm = &mut self.blockmaps[obj.obj_type() as usize];
            if let Some(block) = bm.get_or_insert_with(cell, ObjlinkBlock::default) {
                block.links.push(idx);
            }
        }
    }

    /// Forget last frame's contacts.
    pub fn init_for_new_frame(&mut self) {
        for lists in &mut self.contacts {
            for list in lists.iter_mut() {
                list.clear();
            }
        }
    }

    fn max_radius(&self, t: ObjType) -> f64 {
        match t {
            ObjType::Mobj => self.config.mobj_radius_max,
            ObjType::Lumobj => self.lum_max_radius,
        }
    }

    /// Find contacts for every object in the blocks around `leaf` that has
    /// not been spread yet this frame.
    pub fn spread_in_leaf(&mut self, world: &World, leaf: u32) {
        let Some(aabb) = world.leaves.get(leaf as usize).map(|l| l.aabb) else {
            return;
        };
        let mut pending = Vec::new();
        for t in ObjType::ALL {
            let r = self.max_radius(t);
            let (min, _) = self.to_block(aabb.min_x - r, aabb.min_y - r);
            let (max, _) = self.to_block(aabb.max_x + r, aabb.max_y + r);
            let _ = self.blockmaps[t as usize].block_iterate_mut::<()>(GridBlock::new(min, max), |_, block| {
                if !block.done_spread {
                    pending.extend(block.links.iter().copied());
                    block.done_spread = true;
                }
                ControlFlow::Continue(())
            });
        }
        for idx in pending {
            let obj = self.links[idx];
            self.find_contacts(world, obj);
        }
    }

    /// Spread every leaf.
    pub fn spread_all(&mut self, world: &World) {
        for leaf in 0..world.leaves.len() as u32 {
            self.spread_in_leaf(world, leaf);
        }
    }

    /// Run a full frame: link every mobj and light, then spread.
    pub fn rebuild(&mut self, world: &World) {
        self.clear_for_frame();
        for mo in world.mobjs() {
            self.create(ObjRef::Mobj(mo.id));
        }
        for i in 0..world.lumobjs.len() {
            self.create(ObjRef::Lumobj(i as u32));
        }
        self.link_objs(world);
        self.init_for_new_frame();
        self.spread_all(world);
    }

    fn add_contact(&mut self, leaf: u32, obj: ObjRef) {
        if let Some(lists) = self.contacts.get_mut(leaf as usize) {
            lists[obj.obj_type() as usize].push(obj);
        }
    }

    fn find_contacts(&mut self, world: &World, obj: ObjRef) {
        let Some(reach) = Self::reach(world, obj) else {
            return;
        };
        if reach.leaf as usize >= self.leaf_valid.len() {
            return;
        }
        self.valid_count = self.valid_count.wrapping_add(1);
        self.leaf_valid[reach.leaf as usize] = self.valid_count;
        self.add_contact(reach.leaf, obj);

        let finder = ContactFinder {
            obj,
            origin: reach.origin,
            radius: reach.radius * self.config.radius_shrink,
            bounds: Bounds::from_center(reach.origin.x, reach.origin.y, reach.radius),
        };
        let mut stack = vec![reach.leaf];
        while let Some(leaf) = stack.pop() {
            let Some(bsp) = world.leaves.get(leaf as usize) else {
                continue;
            };
            for &hedge in &bsp.hedges {
                if let Some(dest) = self.process_seg(world, hedge, &finder) {
                    self.leaf_valid[dest as usize] = self.valid_count;
                    self.add_contact(dest, finder.obj);
                    stack.push(dest);
                }
            }
        }
    }

    /// Leaf across `hedge` that the object spreads into, if any.
    fn process_seg(&self, world: &World, hedge: u32, p: &ContactFinder) -> Option<u32> {
        let h = world.hedges.get(hedge as usize)?;
        let twin = world.hedges.get(h.twin? as usize)?;
        let (src, dest) = (h.leaf, twin.leaf);
        if src == dest {
            return None;
        }
        let vc = self.valid_count;
        if !(*self.leaf_valid.get(src as usize)? == vc && *self.leaf_valid.get(dest as usize)? != vc) {
            return None;
        }
        let dest_leaf = world.leaves.get(dest as usize)?;
        if !p.bounds.intersects(&dest_leaf.aabb) {
            return None;
        }

        if let Some(line) = h.line {
            let line = world.lines.get(line as usize)?;
            let src_sec = world.leaf_sector(src)?;
            let dest_sec = world.leaf_sector(dest)?;
            if dest_sec.ceiling_height() <= dest_sec.floor_height()
                || dest_sec.ceiling_height() <= src_sec.floor_height()
                || dest_sec.floor_height() >= src_sec.ceiling_height()
            {
                return None;
            }
            if middle_covers_opening(line, h.line_back, &world.sides, &world.sectors, &world.materials) {
                return None;
            }
        }

        let distance = h.signed_distance(p.origin);
        if h.line.is_some() && distance < 0.0 {
            return None;
        }
        if distance.abs() >= p.radius {
            return None;
        }
        Some(dest)
    }

    /// Visit the objects of `t` in contact with `leaf`.
    pub fn iterate_leaf_contacts<B>(
        &self,
        leaf: u32,
        t: ObjType,
        mut f: impl FnMut(ObjRef) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        if let Some(lists) = self.contacts.get(leaf as usize) {
            for obj in &lists[t as usize] {
                f(*obj)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Contacts of `t` in `leaf`.
    pub fn leaf_contacts(&self, leaf: u32, t: ObjType) -> &[ObjRef] {
        self.contacts
            .get(leaf as usize)
            .map_or(&[][..], |lists| lists[t as usize].as_slice())
    }

    /// Total contacts over all leaves.
    pub fn contact_count(&self) -> usize {
        self.contacts.iter().flat_map(|l| l.iter()).map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{MapBuilder, Material, Mobj};
    use glam::{DVec3, Vec3};
    use protocol::delta::SECTION_MIDDLE;
    use protocol::MaterialId;

    fn index(world: &World) -> ObjlinkIndex {
        ObjlinkIndex::new(world, &ObjlinkConfig::default()).unwrap()
    }

    fn lum_leaves(idx: &ObjlinkIndex, world: &World, lum: u32) -> Vec<u32> {
        (0..world.leaves.len() as u32)
            .filter(|l| idx.leaf_contacts(*l, ObjType::Lumobj).contains(&ObjRef::Lumobj(lum)))
            .collect()
    }

    #[test]
    fn test_light_spreads_over_near_edge() {
        let world = MapBuilder::new(2, 1, 128.0)
            .lumobj(DVec3::new(120.0, 64.0, 32.0), 40.0, true)
            .lumobj(DVec3::new(40.0, 64.0, 32.0), 40.0, true)
            .build(128.0)
            .unwrap();
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(lum_leaves(&idx, &world, 0), vec![0, 1]);
        assert_eq!(lum_leaves(&idx, &world, 1), vec![0]);
    }

    #[test]
    fn test_only_omni_lights_spread() {
        let world = MapBuilder::new(2, 1, 128.0)
            .lumobj(DVec3::new(120.0, 64.0, 32.0), 40.0, false)
            .build(128.0)
            .unwrap();
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(idx.contact_count(), 0);
    }

    #[test]
    fn test_flood_crosses_several_leaves() {
        let world = MapBuilder::new(3, 1, 128.0)
            .lumobj(DVec3::new(190.0, 64.0, 32.0), 100.0, true)
            .build(128.0)
            .unwrap();
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(lum_leaves(&idx, &world, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_closed_sector_blocks_spread() {
        let world = MapBuilder::new(2, 1, 128.0)
            .sector_heights(1, 0.0, 0.0)
            .lumobj(DVec3::new(120.0, 64.0, 32.0), 40.0, true)
            .build(128.0)
            .unwrap();
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(lum_leaves(&idx, &world, 0), vec![0]);
    }

    #[test]
    fn test_opaque_middle_blocks_spread() {
        let mut world = MapBuilder::new(2, 1, 128.0)
            .material(Material { height: 256.0, opaque: true })
            .lumobj(DVec3::new(120.0, 64.0, 32.0), 40.0, true)
            .build(128.0)
            .unwrap();
        for side in &mut world.sides {
            side.sections[SECTION_MIDDLE].material = Some(MaterialId(2));
        }
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(lum_leaves(&idx, &world, 0), vec![0]);
    }

    #[test]
    fn test_mobj_contacts_and_frame_reset() {
        let mut world = MapBuilder::new(2, 1, 128.0).build(128.0).unwrap();
        let id = world.spawn_mobj(Mobj::new(Vec3::new(120.0, 64.0, 0.0), 20.0, 56.0));
        let mut idx = index(&world);
        idx.rebuild(&world);
        assert_eq!(idx.leaf_contacts(1, ObjType::Mobj), &[ObjRef::Mobj(id)]);

        let mut seen = Vec::new();
        let _ = idx.iterate_leaf_contacts::<()>(0, ObjType::Mobj, |o| {
            seen.push(o);
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec![ObjRef::Mobj(id)]);

        world.move_mobj(id, Vec3::new(30.0, 64.0, 0.0));
        idx.rebuild(&world);
        assert!(idx.leaf_contacts(1, ObjType::Mobj).is_empty());
        assert_eq!(idx.contact_count(), 1);
    }

    #[test]
    fn test_spread_in_leaf_is_once_per_block() {
        let mut world = MapBuilder::new(2, 1, 128.0).build(128.0).unwrap();
        world.spawn_mobj(Mobj::new(Vec3::new(120.0, 64.0, 0.0), 20.0, 56.0));
        let mut idx = index(&world);
        idx.clear_for_frame();
        for mo in world.mobjs() {
            idx.create(ObjRef::Mobj(mo.id));
        }
        idx.link_objs(&world);
        idx.init_for_new_frame();
        idx.spread_in_leaf(&world, 0);
        idx.spread_in_leaf(&world, 1);
        assert_eq!(idx.contact_count(), 2);
    }
}
