//! Snapshot of the world as the clients are believed to know it.
//!
//! The live register is compared against the world every frame and then
//! brought up to date. The initial register is captured once at map load,
//! holds no mobjs, and is the baseline for clients joining later.

use protocol::delta::{
    PlaneState, PspriteState, SideSectionState, SurfaceState, CEILING_Z, FLOOR_Z, SECTION_BOTTOM,
    SECTION_MIDDLE, SECTION_TOP,
};
use protocol::{
    MobjDdFlags, MobjState, PlayerState, PolyState, SectorState, SideState, ThingId, MAX_PLAYERS,
};

use crate::world::{Mobj, Polyobj, Sector, World};

/// Buckets in the register's mobj table.
pub const MOBJ_HASH_SIZE: usize = 1024;
const MOBJ_HASH_MASK: u32 = MOBJ_HASH_SIZE as u32 - 1;

/// A mobj the clients know about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisteredMobj {
    /// Tic when the state was last sent because of the resend timer.
    pub last_state_sent: u32,
    pub mobj: MobjState,
}

impl RegisteredMobj {
    /// Zero the visible fields so the next comparison resends them.
    pub fn reset(&mut self) {
        let m = &mut self.mobj;
        m.pos = glam::Vec3::ZERO;
        m.angle = 0;
        m.selector = 0;
        m.state = None;
        m.radius = 0.0;
        m.height = 0.0;
        m.dd_flags = MobjDdFlags::empty();
        m.floor_clip = 0.0;
        m.translucency = 0;
        m.vis_target = 0;
    }
}

#[derive(Debug, Clone)]
pub struct WorldRegister {
    /// Game tic of the last update.
    pub gametic: u32,
    is_initial: bool,
    mobjs: Vec<Vec<RegisteredMobj>>,
    pub players: [PlayerState; MAX_PLAYERS],
    pub sectors: Vec<SectorState>,
    pub sides: Vec<SideState>,
    pub polys: Vec<PolyState>,
}

impl WorldRegister {
    /// Record the sectors, sides and polyobjs of `world`. Mobjs and players
    /// start unknown.
    pub fn capture(world: &World, owners: &[Option<u32>], is_initial: bool, gametic: u32) -> Self {
        Self {
            gametic,
            is_initial,
            mobjs: vec![Vec::new(); MOBJ_HASH_SIZE],
            players: [PlayerState::default(); MAX_PLAYERS],
            sectors: world.sectors.iter().map(register_sector).collect(),
            sides: (0..world.sides.len()).map(|i| register_side(world, owners, i)).collect(),
            polys: world.polyobjs.iter().map(register_poly).collect(),
        }
    }

    #[inline]
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    #[inline]
    fn bucket(id: ThingId) -> usize {
        (id & MOBJ_HASH_MASK) as usize
    }

    pub fn find_mobj(&self, id: ThingId) -> Option<&RegisteredMobj> {
        self.mobjs[Self::bucket(id)].iter().find(|r| r.mobj.id == id)
    }

    pub fn find_mobj_mut(&mut self, id: ThingId) -> Option<&mut RegisteredMobj> {
        self.mobjs[Self::bucket(id)].iter_mut().find(|r| r.mobj.id == id)
    }

    /// The record for `id`, created zeroed if missing.
    pub fn add_mobj(&mut self, id: ThingId) -> &mut RegisteredMobj {
        let bucket = &mut self.mobjs[Self::bucket(id)];
        let index = match bucket.iter().position(|r| r.mobj.id == id) {
            Some(i) => i,
            None => {
                bucket.push(RegisteredMobj {
                    last_state_sent: 0,
                    mobj: MobjState { id, ..Default::default() },
                });
                bucket.len() - 1
            }
        };
        &mut bucket[index]
    }

    pub fn remove_mobj(&mut self, id: ThingId) -> Option<RegisteredMobj> {
        let bucket = &mut self.mobjs[Self::bucket(id)];
        let index = bucket.iter().position(|r| r.mobj.id == id)?;
        Some(bucket.remove(index))
    }

    /// Ids of every registered mobj.
    pub fn mobj_ids(&self) -> Vec<ThingId> {
        self.mobjs.iter().flatten().map(|r| r.mobj.id).collect()
    }

    pub fn mobj_count(&self) -> usize {
        self.mobjs.iter().map(Vec::len).sum()
    }

    /// Forget a player so a reconnect receives everything again.
    pub fn remove_player(&mut self, slot: usize) {
        if let Some(p) = self.players.get_mut(slot) {
            *p = PlayerState::default();
        }
    }
}

/// Z as registered: [`FLOOR_Z`] when resting on the floor, [`CEILING_Z`]
/// when touching the ceiling.
pub fn maxed_z(mo: &Mobj) -> f32 {
    if mo.pos.z == mo.floor_z {
        FLOOR_Z
    } else if mo.pos.z + mo.height == mo.ceiling_z {
        CEILING_Z
    } else {
        mo.pos.z
    }
}

pub fn register_mobj(mo: &Mobj) -> MobjState {
    let mut state = mo.snapshot();
    state.pos.z = maxed_z(mo);
    state
}

pub fn register_player(world: &World, slot: usize) -> PlayerState {
    let Some(player) = world.players.get(slot) else {
        return PlayerState::default();
    };
    let mo = player.mobj.and_then(|id| world.mobj(id));
    let mut psprites = [PspriteState::default(); 2];
    for (dst, src) in psprites.iter_mut().zip(&player.psprites) {
        *dst = PspriteState {
            state: src.state,
            tics: src.tics,
            light: src.light,
            alpha: src.alpha,
            offset: src.offset,
        };
    }
    PlayerState {
        mobj: mo.map_or(0, |m| m.id),
        forward_move: player.forward_move,
        side_move: player.side_move,
        angle: mo.map_or(0, |m| m.angle),
        turn_delta: if mo.is_some() { player.turn_delta } else { 0 },
        friction: if mo.is_some() { player.friction } else { 0.0 },
        extra_light: player.extra_light,
        fixed_color_map: player.fixed_color_map,
        filter: player.packed_filter(),
        cl_yaw: mo.map_or(0, |m| m.angle),
        cl_pitch: player.look_dir,
        psprites,
    }
}

pub fn register_sector(sector: &Sector) -> SectorState {
    let mut state = SectorState {
        light_level: sector.light_level,
        rgb: sector.rgb,
        ..Default::default()
    };
    for (dst, src) in state.planes.iter_mut().zip(&sector.planes) {
        *dst = PlaneState {
            height: src.height,
            target: src.target,
            speed: src.speed,
            glow: src.glow,
            glow_rgb: src.glow_rgb,
            surface: SurfaceState {
                material: src.surface.material,
                rgba: src.surface.rgba,
            },
        };
    }
    state
}

/// Line flags of the side's owner, 0 for an unowned side.
pub fn owner_line_flags(world: &World, owners: &[Option<u32>], side: usize) -> u8 {
    owners
        .get(side)
        .copied()
        .flatten()
        .and_then(|line| world.lines.get(line as usize))
        .map_or(0, |line| line.flags)
}

pub fn register_side(world: &World, owners: &[Option<u32>], index: usize) -> SideState {
    let Some(side) = world.sides.get(index) else {
        return SideState::default();
    };
    let mut state = SideState {
        line_flags: owner_line_flags(world, owners, index),
        flags: side.flags,
        ..Default::default()
    };
    for sec in [SECTION_TOP, SECTION_MIDDLE, SECTION_BOTTOM] {
        let surface = &side.sections[sec];
        state.sections[sec] = SideSectionState {
            material: surface.material,
            rgba: surface.rgba,
            // only the middle section blends
            blend_mode: if sec == SECTION_MIDDLE { surface.blend_mode } else { 0 },
        };
    }
    state
}

pub fn register_poly(poly: &Polyobj) -> PolyState {
    PolyState {
        dest: poly.dest,
        speed: poly.speed,
        dest_angle: poly.dest_angle,
        angle_speed: poly.angle_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{MapBuilder, FRICTION_NORMAL};
    use glam::Vec3;

    fn world() -> World {
        MapBuilder::new(2, 1, 128.0).polyobj(glam::Vec2::new(10.0, 10.0)).build(64.0).unwrap()
    }

    #[test]
    fn test_capture_has_no_mobjs() {
        let mut w = world();
        w.spawn_mobj(Mobj::new(Vec3::new(10.0, 10.0, 0.0), 16.0, 56.0));
        let owners = w.side_owners();
        let reg = WorldRegister::capture(&w, &owners, true, 7);
        assert!(reg.is_initial());
        assert_eq!(reg.gametic, 7);
        assert_eq!(reg.mobj_count(), 0);
        assert_eq!(reg.sectors.len(), 2);
        assert_eq!(reg.sides.len(), w.sides.len());
        assert_eq!(reg.polys.len(), 1);
        assert_eq!(reg.sectors[0].planes[1].height, 128.0);
        assert_eq!(reg.sides[0].line_flags, w.lines[0].flags);
    }

    #[test]
    fn test_mobj_hash_chains() {
        let w = world();
        let mut reg = WorldRegister::capture(&w, &w.side_owners(), false, 0);
        // same bucket
        reg.add_mobj(3).mobj.radius = 1.0;
        reg.add_mobj(3 + MOBJ_HASH_SIZE as u32).mobj.radius = 2.0;
        assert_eq!(reg.add_mobj(3).mobj.radius, 1.0);
        assert_eq!(reg.mobj_count(), 2);
        assert_eq!(reg.find_mobj(1027).map(|r| r.mobj.radius), Some(2.0));
        assert!(reg.remove_mobj(3).is_some());
        assert!(reg.find_mobj(3).is_none());
        assert!(reg.find_mobj(1027).is_some());
        assert!(reg.remove_mobj(3).is_none());
    }

    #[test]
    fn test_maxed_z() {
        let mut mo = Mobj::new(Vec3::new(0.0, 0.0, 0.0), 16.0, 56.0);
        mo.floor_z = 0.0;
        mo.ceiling_z = 128.0;
        assert_eq!(maxed_z(&mo), FLOOR_Z);
        mo.pos.z = 72.0;
        assert_eq!(maxed_z(&mo), CEILING_Z);
        mo.pos.z = 30.0;
        assert_eq!(maxed_z(&mo), 30.0);
        assert_eq!(register_mobj(&mo).unmaxed_z(), 30.0);
    }

    #[test]
    fn test_reset_keeps_id_and_momentum() {
        let mut r = RegisteredMobj::default();
        r.mobj.id = 4;
        r.mobj.pos = Vec3::ONE;
        r.mobj.mom = Vec3::ONE;
        r.mobj.radius = 20.0;
        r.reset();
        assert_eq!(r.mobj.id, 4);
        assert_eq!(r.mobj.pos, Vec3::ZERO);
        assert_eq!(r.mobj.mom, Vec3::ONE);
        assert_eq!(r.mobj.radius, 0.0);
    }

    #[test]
    fn test_register_player_without_mobj() {
        let mut w = world();
        w.players[0].in_game = true;
        w.players[0].turn_delta = 5;
        w.players[0].filter = Some([1.0, 0.0, 0.0, 1.0]);
        let p = register_player(&w, 0);
        assert_eq!(p.mobj, 0);
        assert_eq!(p.turn_delta, 0);
        assert_eq!(p.friction, 0.0);
        assert_eq!(p.filter, 0xff00_00ff);

        let id = w.spawn_mobj(Mobj::new(Vec3::new(10.0, 10.0, 0.0), 16.0, 56.0));
        w.players[0].mobj = Some(id);
        let p = register_player(&w, 0);
        assert_eq!(p.mobj, id);
        assert_eq!(p.turn_delta, 5);
        assert_eq!(p.friction, FRICTION_NORMAL);
    }
}
