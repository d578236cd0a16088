//! World state: the map, its mobjs and the player slots.
//!
//! Mobjs are linked into a [`Blockmap`] by origin. Changing a mobj's x/y
//! must go through [`World::move_mobj`] so the link follows it.

mod builder;
mod map;
mod mobj;
mod player;

pub use builder::MapBuilder;
pub use map::{
    middle_covers_opening, BspLeaf, HEdge, Line, Lumobj, Material, Plane, Polyobj, Sector, Side,
    Surface, SIDE_MIDDLE_STRETCH,
};
pub use mobj::{Mobj, StateDef, StateTable};
pub use player::{Player, Psprite, FRICTION_NORMAL};

use std::collections::HashMap;
use std::ops::ControlFlow;

use glam::{DVec2, Vec3};
use protocol::{ThingId, MAX_PLAYERS};

use crate::error::MapError;
use crate::spatial::{Blockmap, Bounds};

#[derive(Debug, Clone)]
pub struct World {
    pub sectors: Vec<Sector>,
    pub lines: Vec<Line>,
    pub sides: Vec<Side>,
    pub polyobjs: Vec<Polyobj>,
    pub materials: Vec<Material>,
    pub states: StateTable,
    pub leaves: Vec<BspLeaf>,
    pub hedges: Vec<HEdge>,
    pub lumobjs: Vec<Lumobj>,
    pub players: [Player; MAX_PLAYERS],

    mobjs: HashMap<ThingId, Mobj>,
    mobj_blockmap: Blockmap<ThingId>,
    next_mobj_id: ThingId,
    bounds: Bounds,
}

impl World {
    /// An empty world over `bounds` whose mobj blockmap uses `cell_size`
    /// cells.
    pub fn new(bounds: Bounds, cell_size: f64) -> Result<Self, MapError> {
        Ok(Self {
            sectors: Vec::new(),
            lines: Vec::new(),
            sides: Vec::new(),
            polyobjs: Vec::new(),
            materials: Vec::new(),
            states: StateTable::default(),
            leaves: Vec::new(),
            hedges: Vec::new(),
            lumobjs: Vec::new(),
            players: [Player::default(); MAX_PLAYERS],
            mobjs: HashMap::with_capacity(256),
            mobj_blockmap: Blockmap::new(bounds, cell_size, cell_size)?,
            next_mobj_id: 1,
            bounds,
        })
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn mobj_blockmap(&self) -> &Blockmap<ThingId> {
        &self.mobj_blockmap
    }

    fn next_id(&mut self) -> ThingId {
        let id = self.next_mobj_id;
        self.next_mobj_id = self.next_mobj_id.wrapping_add(1);
        if self.next_mobj_id == 0 {
            self.next_mobj_id = 1;
        }
        id
    }

    /// Leaf whose box contains the point. Leaves are assumed not to overlap.
    pub fn leaf_at_point(&self, p: DVec2) -> Option<u32> {
        self.leaves
            .iter()
            .position(|leaf| leaf.aabb.contains(p.x, p.y))
            .map(|i| i as u32)
    }

    pub fn leaf_sector(&self, leaf: u32) -> Option<&Sector> {
        let leaf = self.leaves.get(leaf as usize)?;
        self.sectors.get(leaf.sector as usize)
    }

    /// Add a mobj and link it. Assigns its id and resolves its leaf and
    /// plane heights.
    pub fn spawn_mobj(&mut self, mut mobj: Mobj) -> ThingId {
        let mut id = self.next_id();
        while self.mobjs.contains_key(&id) {
            id = self.next_id();
        }
        mobj.id = id;
        self.place(&mut mobj);
        let (cell, _) = self.mobj_blockmap.cell(f64::from(mobj.pos.x), f64::from(mobj.pos.y));
        self.mobj_blockmap.link(cell, id);
        mobj.cell = Some(cell);
        self.mobjs.insert(id, mobj);
        id
    }

    fn place(&self, mobj: &mut Mobj) {
        let p = DVec2::new(f64::from(mobj.pos.x), f64::from(mobj.pos.y));
        mobj.leaf = self.leaf_at_point(p);
        if let Some(sector) = mobj.leaf.and_then(|l| self.leaf_sector(l)) {
            mobj.floor_z = sector.floor_height();
            mobj.ceiling_z = sector.ceiling_height();
        }
    }

    /// Move a mobj, relinking it if it changed cells. Returns false for an
    /// unknown id.
    pub fn move_mobj(&mut self, id: ThingId, pos: Vec3) -> bool {
        let Some(mut mobj) = self.mobjs.remove(&id) else {
            return false;
        };
        mobj.pos = pos;
        self.place(&mut mobj);
        let (cell, _) = self.mobj_blockmap.cell(f64::from(pos.x), f64::from(pos.y));
        if mobj.cell != Some(cell) {
            if let Some(old) = mobj.cell {
                self.mobj_blockmap.unlink(old, id);
            }
            self.mobj_blockmap.link(cell, id);
            mobj.cell = Some(cell);
        }
        self.mobjs.insert(id, mobj);
        true
    }

    pub fn remove_mobj(&mut self, id: ThingId) -> Option<Mobj> {
        let mobj = self.mobjs.remove(&id)?;
        if let Some(cell) = mobj.cell {
            self.mobj_blockmap.unlink(cell, id);
        }
        Some(mobj)
    }

    #[inline]
    pub fn is_used_id(&self, id: ThingId) -> bool {
        self.mobjs.contains_key(&id)
    }

    #[inline]
    pub fn mobj(&self, id: ThingId) -> Option<&Mobj> {
        self.mobjs.get(&id)
    }

    /// Mutable access for fields other than the x/y position.
    #[inline]
    pub fn mobj_mut(&mut self, id: ThingId) -> Option<&mut Mobj> {
        self.mobjs.get_mut(&id)
    }

    #[inline]
    pub fn mobjs(&self) -> impl Iterator<Item = &Mobj> {
        self.mobjs.values()
    }

    #[inline]
    pub fn mobj_count(&self) -> usize {
        self.mobjs.len()
    }

    /// Visit the ids of mobjs whose blockmap cell overlaps `b`.
    pub fn mobjs_in_box<B>(&self, b: &Bounds, f: impl FnMut(ThingId) -> ControlFlow<B>) -> ControlFlow<B> {
        let (block, _) = self.mobj_blockmap.cell_block(b);
        self.mobj_blockmap.iterate_block_objects(block, f)
    }

    /// The mobj of player `slot`, if it is in game and has one.
    pub fn player_mobj(&self, slot: usize) -> Option<&Mobj> {
        let player = self.players.get(slot)?;
        if !player.in_game {
            return None;
        }
        self.mobj(player.mobj?)
    }

    /// The line owning each side, by side index.
    pub fn side_owners(&self) -> Vec<Option<u32>> {
        let mut owners = vec![None; self.sides.len()];
        for (i, line) in self.lines.iter().enumerate() {
            for side in [line.front, line.back].into_iter().flatten() {
                if let Some(slot) = owners.get_mut(side as usize) {
                    *slot = Some(i as u32);
                }
            }
        }
        owners
    }
}
