//! Comparing the live world against a register.
//!
//! Each `compare_*` returns the delta describing what differs, or `None`
//! when nothing does. A delta always carries a full snapshot of the entity;
//! its flags say which fields changed.

use protocol::delta::{PLANE_CEILING, PLANE_FLOOR, SECTION_BOTTOM, SECTION_MIDDLE, SECTION_TOP};
use protocol::{
    Delta, DeltaPayload, MobjDdFlags, MobjFlags, MobjState, PlayerFlags, PolyFlags, PspriteFlags,
    SectorFlags, SideFlags,
};

use super::register::{
    maxed_z, owner_line_flags, register_mobj, register_player, register_poly, register_sector,
    register_side, WorldRegister,
};
use crate::config::PoolConfig;
use crate::world::{Mobj, StateTable, World};

/// Timing inputs of one comparison pass.
#[derive(Debug, Clone, Copy)]
pub struct CompareClock {
    /// Delta time stamp.
    pub now_ms: u32,
    /// Real-time tic for the state resend timer.
    pub tic: u32,
}

/// Compare a live mobj with its registered copy. An unregistered mobj is
/// compared against zeros and flagged as created.
///
/// The register itself is not updated except for the state resend timer.
pub fn compare_mobj(
    reg: &mut WorldRegister,
    mo: &Mobj,
    states: &StateTable,
    config: &PoolConfig,
    clock: CompareClock,
) -> Option<Delta> {
    let zero = MobjState::default();
    let registered = reg.find_mobj(mo.id).cloned();
    let (mut df, r) = match &registered {
        Some(reg_mo) => (MobjFlags::empty(), &reg_mo.mobj),
        None => (MobjFlags::CREATE, &zero),
    };

    if r.pos.x != mo.pos.x {
        df |= MobjFlags::POS_X;
    }
    if r.pos.y != mo.pos.y {
        df |= MobjFlags::POS_Y;
    }
    if r.pos.z != maxed_z(mo) {
        df |= MobjFlags::POS_Z;
    }
    if r.mom.x != mo.mom.x {
        df |= MobjFlags::MOM_X;
    }
    if r.mom.y != mo.mom.y {
        df |= MobjFlags::MOM_Y;
    }
    if r.mom.z != mo.mom.z {
        df |= MobjFlags::MOM_Z;
    }
    if r.angle != mo.angle {
        df |= MobjFlags::ANGLE;
    }
    if r.selector != mo.selector {
        df |= MobjFlags::SELECTOR;
    }
    if r.translucency != mo.translucency {
        df |= MobjFlags::TRANSLUCENCY;
    }
    if r.vis_target != mo.vis_target {
        df |= MobjFlags::FADETARGET;
    }

    // A state that keeps changing is resent now and then even when the
    // client could follow the sequence itself.
    let resend_due = registered.as_ref().is_some_and(|reg_mo| {
        let interval = config.state_resend_base_tics
            + mo.id % config.state_resend_phase_tics.max(1);
        !mo.is_missile()
            && clock.tic.wrapping_sub(reg_mo.last_state_sent) > interval
            && r.state != mo.state
    });
    if resend_due || !states.same_sequence(mo.state, r.state) {
        df |= MobjFlags::STATE;
        if let Some(reg_mo) = reg.find_mobj_mut(mo.id) {
            reg_mo.last_state_sent = clock.tic;
        }
    }

    if r.radius != mo.radius {
        df |= MobjFlags::RADIUS;
    }
    if r.height != mo.height {
        df |= MobjFlags::HEIGHT;
    }
    if (r.dd_flags & MobjDdFlags::PACK_MASK) != (mo.dd_flags & MobjDdFlags::PACK_MASK) {
        df |= MobjFlags::FLAGS;
    }
    if r.floor_clip != mo.floor_clip {
        df |= MobjFlags::FLOORCLIP;
    }

    if df.is_empty() {
        return None;
    }
    Some(Delta::new(
        mo.id,
        clock.now_ms,
        DeltaPayload::Mobj { flags: df, mobj: register_mobj(mo) },
    ))
}

/// Compare player `slot` with its registered copy. View angles are left to
/// the client and never compared.
pub fn compare_player(reg: &WorldRegister, world: &World, slot: usize, now_ms: u32) -> Option<Delta> {
    let r = reg.players.get(slot)?;
    let s = register_player(world, slot);
    let mut df = PlayerFlags::empty();

    if r.mobj != s.mobj {
        df |= PlayerFlags::MOBJ;
    }
    if r.forward_move != s.forward_move {
        df |= PlayerFlags::FORWARDMOVE;
    }
    if r.side_move != s.side_move {
        df |= PlayerFlags::SIDEMOVE;
    }
    if r.turn_delta != s.turn_delta {
        df |= PlayerFlags::TURNDELTA;
    }
    if r.friction != s.friction {
        df |= PlayerFlags::FRICTION;
    }
    if r.extra_light != s.extra_light || r.fixed_color_map != s.fixed_color_map {
        df |= PlayerFlags::EXTRALIGHT;
    }
    if r.filter != s.filter {
        df |= PlayerFlags::FILTER;
    }
    for (i, (rp, sp)) in r.psprites.iter().zip(&s.psprites).enumerate() {
        let mut pf = PspriteFlags::empty();
        if rp.state != sp.state {
            pf |= PspriteFlags::STATE_PTR;
        }
        if rp.light != sp.light {
            pf |= PspriteFlags::LIGHT;
        }
        if rp.alpha != sp.alpha {
            pf |= PspriteFlags::ALPHA;
        }
        if rp.tics != sp.tics {
            pf |= PspriteFlags::STATE;
        }
        // only the weapon sprite bobs
        if i == 0 && rp.offset != sp.offset {
            pf |= PspriteFlags::OFFSET;
        }
        df |= PlayerFlags::psprite(i, pf);
    }
    if df.intersects(PlayerFlags::PSPRITE0 | PlayerFlags::PSPRITE1) {
        df |= PlayerFlags::PSPRITES;
    }

    if df.is_empty() {
        return None;
    }
    Some(Delta::new(slot as u32, now_ms, DeltaPayload::Player { flags: df, player: s }))
}

/// Compare sector `index`. A moving plane only gets a height correction
/// when it has drifted beyond the skip limit; target and speed always
/// travel together.
///
/// With `do_update` the register takes the live state when anything
/// changed, and always tracks the plane heights.
pub fn compare_sector(
    reg: &mut WorldRegister,
    world: &World,
    index: usize,
    do_update: bool,
    config: &PoolConfig,
    now_ms: u32,
) -> Option<Delta> {
    let sector = world.sectors.get(index)?;
    let r = reg.sectors.get_mut(index)?;
    let mut df = SectorFlags::empty();

    if r.light_level != sector.light_level {
        df |= SectorFlags::LIGHT;
    }
    for c in 0..3 {
        if r.rgb[c] != sector.rgb[c] {
            df |= SectorFlags::COLOR[c];
        }
    }
    for p in [PLANE_FLOOR, PLANE_CEILING] {
        let (rp, sp) = (&r.planes[p], &sector.planes[p]);
        if rp.surface.material != sp.surface.material {
            df |= SectorFlags::MATERIAL[p];
        }
        for c in 0..3 {
            if rp.surface.rgba[c] != sp.surface.rgba[c] {
                df |= SectorFlags::SURFACE_COLOR[p][c];
            }
            if rp.glow_rgb[c] != sp.glow_rgb[c] {
                df |= SectorFlags::GLOW_COLOR[p][c];
            }
        }
        if rp.glow != sp.glow {
            df |= SectorFlags::GLOW[p];
        }
        let moving = rp.speed != 0.0 || sp.speed != 0.0;
        let drift = (rp.height - sp.height).abs();
        if (!moving && drift > 0.0) || (moving && drift > config.plane_skip_limit) {
            df |= SectorFlags::HEIGHT[p];
        }
        if rp.target != sp.target || rp.speed != sp.speed {
            df |= SectorFlags::TARGET[p] | SectorFlags::SPEED[p];
        }
    }

    if do_update {
        if !df.is_empty() {
            *r = register_sector(sector);
        }
        r.planes[PLANE_FLOOR].height = sector.floor_height();
        r.planes[PLANE_CEILING].height = sector.ceiling_height();
    }

    if df.is_empty() {
        return None;
    }
    Some(Delta::new(
        index as u32,
        now_ms,
        DeltaPayload::Sector { flags: df, sector: register_sector(sector) },
    ))
}

/// Compare side `index` and its owning line's flags. Materials substituted
/// locally are not compared.
pub fn compare_side(
    reg: &mut WorldRegister,
    world: &World,
    owners: &[Option<u32>],
    index: usize,
    do_update: bool,
    now_ms: u32,
) -> Option<Delta> {
    let side = world.sides.get(index)?;
    let line_flags = owner_line_flags(world, owners, index);
    let r = reg.sides.get_mut(index)?;
    let mut df = SideFlags::empty();

    for sec in [SECTION_TOP, SECTION_MIDDLE, SECTION_BOTTOM] {
        let surface = &side.sections[sec];
        let rs = &mut r.sections[sec];
        if rs.material != surface.material && !surface.material_fix {
            df |= SideFlags::MATERIAL[sec];
            if do_update {
                rs.material = surface.material;
            }
        }
        for c in 0..3 {
            if rs.rgba[c] != surface.rgba[c] {
                df |= SideFlags::COLOR[sec][c];
                if do_update {
                    rs.rgba[c] = surface.rgba[c];
                }
            }
        }
    }
    let (rm, mid) = (&mut r.sections[SECTION_MIDDLE], &side.sections[SECTION_MIDDLE]);
    if rm.rgba[3] != mid.rgba[3] {
        df |= SideFlags::MID_COLOR_ALPHA;
        if do_update {
            rm.rgba[3] = mid.rgba[3];
        }
    }
    if rm.blend_mode != mid.blend_mode {
        df |= SideFlags::MID_BLENDMODE;
        if do_update {
            rm.blend_mode = mid.blend_mode;
        }
    }
    if r.line_flags != line_flags {
        df |= SideFlags::LINE_FLAGS;
        if do_update {
            r.line_flags = line_flags;
        }
    }
    if r.flags != side.flags {
        df |= SideFlags::FLAGS;
        if do_update {
            r.flags = side.flags;
        }
    }

    if df.is_empty() {
        return None;
    }
    Some(Delta::new(
        index as u32,
        now_ms,
        DeltaPayload::Side { flags: df, side: register_side(world, owners, index) },
    ))
}

pub fn compare_poly(reg: &WorldRegister, world: &World, index: usize, now_ms: u32) -> Option<Delta> {
    let r = reg.polys.get(index)?;
    let s = register_poly(world.polyobjs.get(index)?);
    let mut df = PolyFlags::empty();

    if r.dest.x != s.dest.x {
        df |= PolyFlags::DEST_X;
    }
    if r.dest.y != s.dest.y {
        df |= PolyFlags::DEST_Y;
    }
    if r.speed != s.speed {
        df |= PolyFlags::SPEED;
    }
    if r.dest_angle != s.dest_angle {
        df |= PolyFlags::DEST_ANGLE;
    }
    if r.angle_speed != s.angle_speed {
        df |= PolyFlags::ANGSPEED;
    }

    if df.is_empty() {
        return None;
    }
    Some(Delta::new(index as u32, now_ms, DeltaPayload::Poly { flags: df, poly: s }))
}
