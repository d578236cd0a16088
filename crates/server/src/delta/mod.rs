//! Delta generation, pooling and scheduling.
//!
//! The algebra here works on two deltas describing the same entity:
//! [`subtract`] drops fields from a stale delta that a newer one will resend,
//! [`merge`] folds a newer NEW delta into the pending NEW one.

pub mod compare;
pub mod missile;
pub mod pool;
pub mod rating;
pub mod register;
pub mod session;

pub use pool::{ClientPool, DeltaHandle, FrameIds, PoolContext, PoolCounts};
pub use rating::{DeltaOrigins, OwnerInfo};
pub use register::{RegisteredMobj, WorldRegister};
pub use session::{ReplicationSession, SectorEmitter, SoundOrigin, ALL_CLIENTS};

use protocol::delta::{PLANE_CEILING, PLANE_FLOOR, SECTION_BOTTOM, SECTION_MIDDLE, SECTION_TOP};
use protocol::{
    Delta, DeltaPayload, DeltaState, MobjFlags, PlayerFlags, PolyFlags, PspriteFlags, SectorFlags,
    SideFlags, SoundFlags,
};

use crate::error::DeltaError;

/// Result of merging one delta into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The two deltas negated each other and the destination must go.
    Cancelled,
}

fn check_same(a: &Delta, b: &Delta) -> Result<(), DeltaError> {
    if a.is_same(b) {
        Ok(())
    } else {
        Err(DeltaError::Mismatch {
            expected_type: a.delta_type(),
            expected_id: a.id,
            found_type: b.delta_type(),
            found_id: b.id,
        })
    }
}

/// Removes from `delta` every field that `sub` also carries. A null mobj
/// delta clears everything.
pub fn subtract(delta: &mut Delta, sub: &Delta) -> Result<(), DeltaError> {
    check_same(delta, sub)?;
    if sub.is_null_mobj() {
        delta.payload.clear_flags();
    } else {
        let bits = delta.payload.bits() & !sub.payload.bits();
        delta.payload.set_bits(bits);
    }
    Ok(())
}

/// Folds `src` into the NEW delta `dest`.
///
/// Nothing merges into a null mobj delta. A null arriving on a create
/// cancels both. A null arriving on anything else replaces it. Start and
/// stop sounds replace whatever sound was pending. Everything else is a
/// union of fields with the source's values winning; the destination keeps
/// its time stamp so overdue data keeps its age.
pub fn merge(dest: &mut Delta, src: &Delta) -> Result<MergeOutcome, DeltaError> {
    check_same(dest, src)?;
    if dest.state != DeltaState::New {
        return Err(DeltaError::NotNew(dest.delta_type(), dest.id));
    }

    if dest.is_null_mobj() {
        return Ok(MergeOutcome::Merged);
    }
    if dest.is_create_mobj() && src.is_null_mobj() {
        dest.payload.clear_flags();
        return Ok(MergeOutcome::Cancelled);
    }
    if src.is_null_mobj() {
        dest.payload = src.payload.clone();
        dest.payload.set_bits(MobjFlags::NULL.bits());
        return Ok(MergeOutcome::Merged);
    }
    if src.is_start_sound() || src.is_stop_sound() {
        dest.payload = src.payload.clone();
        return Ok(MergeOutcome::Merged);
    }

    let bits = dest.payload.bits() | src.payload.bits();
    apply_data(&mut dest.payload, &src.payload);
    dest.payload.set_bits(bits);
    Ok(MergeOutcome::Merged)
}

/// Copies the fields flagged in `src` into `dest`. Both must be the same
/// kind; mismatched kinds are left alone.
pub fn apply_data(dest: &mut DeltaPayload, src: &DeltaPayload) {
    match (dest, src) {
        (DeltaPayload::Mobj { mobj: d, .. }, DeltaPayload::Mobj { flags: sf, mobj: s }) => {
            let sf = *sf;
            d.player = s.player;
            if sf.intersects(MobjFlags::POS_X | MobjFlags::POS_Y) {
                d.leaf = s.leaf;
            }
            if sf.contains(MobjFlags::POS_X) {
                d.pos.x = s.pos.x;
            }
            if sf.contains(MobjFlags::POS_Y) {
                d.pos.y = s.pos.y;
            }
            if sf.contains(MobjFlags::POS_Z) {
                d.pos.z = s.pos.z;
                d.floor_z = s.floor_z;
                d.ceiling_z = s.ceiling_z;
            }
            if sf.contains(MobjFlags::MOM_X) {
                d.mom.x = s.mom.x;
            }
            if sf.contains(MobjFlags::MOM_Y) {
                d.mom.y = s.mom.y;
            }
            if sf.contains(MobjFlags::MOM_Z) {
                d.mom.z = s.mom.z;
            }
            if sf.contains(MobjFlags::ANGLE) {
                d.angle = s.angle;
            }
            if sf.contains(MobjFlags::SELECTOR) {
                d.selector = s.selector;
            }
            if sf.contains(MobjFlags::STATE) {
                d.state = s.state;
                d.tics = s.tics;
            }
            if sf.contains(MobjFlags::RADIUS) {
                d.radius = s.radius;
            }
            if sf.contains(MobjFlags::HEIGHT) {
                d.height = s.height;
            }
            if sf.contains(MobjFlags::FLAGS) {
                d.dd_flags = s.dd_flags;
            }
            if sf.contains(MobjFlags::FLOORCLIP) {
                d.floor_clip = s.floor_clip;
            }
            if sf.contains(MobjFlags::TRANSLUCENCY) {
                d.translucency = s.translucency;
            }
            if sf.contains(MobjFlags::FADETARGET) {
                d.vis_target = s.vis_target;
            }
        }
        (DeltaPayload::Player { player: d, .. }, DeltaPayload::Player { flags: sf, player: s }) => {
            let sf = *sf;
            if sf.contains(PlayerFlags::MOBJ) {
                d.mobj = s.mobj;
            }
            if sf.contains(PlayerFlags::FORWARDMOVE) {
                d.forward_move = s.forward_move;
            }
            if sf.contains(PlayerFlags::SIDEMOVE) {
                d.side_move = s.side_move;
            }
            if sf.contains(PlayerFlags::ANGLE) {
                d.angle = s.angle;
            }
            if sf.contains(PlayerFlags::TURNDELTA) {
                d.turn_delta = s.turn_delta;
            }
            if sf.contains(PlayerFlags::FRICTION) {
                d.friction = s.friction;
            }
            if sf.contains(PlayerFlags::EXTRALIGHT) {
                d.extra_light = s.extra_light;
                d.fixed_color_map = s.fixed_color_map;
            }
            if sf.contains(PlayerFlags::FILTER) {
                d.filter = s.filter;
            }
            if sf.contains(PlayerFlags::CLYAW) {
                d.cl_yaw = s.cl_yaw;
            }
            if sf.contains(PlayerFlags::CLPITCH) {
                d.cl_pitch = s.cl_pitch;
            }
            if sf.contains(PlayerFlags::PSPRITES) {
                for (i, (dp, sp)) in d.psprites.iter_mut().zip(&s.psprites).enumerate() {
                    let pf = sf.psprite_bits(i);
                    if pf.contains(PspriteFlags::STATE_PTR) {
                        dp.state = sp.state;
                        dp.tics = sp.tics;
                    }
                    if pf.contains(PspriteFlags::LIGHT) {
                        dp.light = sp.light;
                    }
                    if pf.contains(PspriteFlags::ALPHA) {
                        dp.alpha = sp.alpha;
                    }
                    if pf.contains(PspriteFlags::STATE) {
                        dp.tics = sp.tics;
                    }
                    if pf.contains(PspriteFlags::OFFSET) {
                        dp.offset = sp.offset;
                    }
                }
            }
        }
        (DeltaPayload::Sector { sector: d, .. }, DeltaPayload::Sector { flags: sf, sector: s }) => {
            let sf = *sf;
            if sf.contains(SectorFlags::LIGHT) {
                d.light_level = s.light_level;
            }
            for c in 0..3 {
                if sf.contains(SectorFlags::COLOR[c]) {
                    d.rgb[c] = s.rgb[c];
                }
            }
            for p in [PLANE_FLOOR, PLANE_CEILING] {
                let (dp, sp) = (&mut d.planes[p], &s.planes[p]);
                if sf.contains(SectorFlags::MATERIAL[p]) {
                    dp.surface.material = sp.surface.material;
                }
                if sf.contains(SectorFlags::HEIGHT[p]) {
                    dp.height = sp.height;
                }
                if sf.contains(SectorFlags::TARGET[p]) {
                    dp.target = sp.target;
                }
                if sf.contains(SectorFlags::SPEED[p]) {
                    dp.speed = sp.speed;
                }
                if sf.contains(SectorFlags::GLOW[p]) {
                    dp.glow = sp.glow;
                }
                for c in 0..3 {
                    if sf.contains(SectorFlags::SURFACE_COLOR[p][c]) {
                        dp.surface.rgba[c] = sp.surface.rgba[c];
                    }
                    if sf.contains(SectorFlags::GLOW_COLOR[p][c]) {
                        dp.glow_rgb[c] = sp.glow_rgb[c];
                    }
                }
            }
        }
        (DeltaPayload::Side { side: d, .. }, DeltaPayload::Side { flags: sf, side: s }) => {
            let sf = *sf;
            for sec in [SECTION_TOP, SECTION_MIDDLE, SECTION_BOTTOM] {
                if sf.contains(SideFlags::MATERIAL[sec]) {
                    d.sections[sec].material = s.sections[sec].material;
                }
                for c in 0..3 {
                    if sf.contains(SideFlags::COLOR[sec][c]) {
                        d.sections[sec].rgba[c] = s.sections[sec].rgba[c];
                    }
                }
            }
            if sf.contains(SideFlags::MID_COLOR_ALPHA) {
                d.sections[SECTION_MIDDLE].rgba[3] = s.sections[SECTION_MIDDLE].rgba[3];
            }
            if sf.contains(SideFlags::MID_BLENDMODE) {
                d.sections[SECTION_MIDDLE].blend_mode = s.sections[SECTION_MIDDLE].blend_mode;
            }
            if sf.contains(SideFlags::LINE_FLAGS) {
                d.line_flags = s.line_flags;
            }
            if sf.contains(SideFlags::FLAGS) {
                d.flags = s.flags;
            }
        }
        (DeltaPayload::Poly { poly: d, .. }, DeltaPayload::Poly { flags: sf, poly: s }) => {
            let sf = *sf;
            if sf.contains(PolyFlags::DEST_X) {
                d.dest.x = s.dest.x;
            }
            if sf.contains(PolyFlags::DEST_Y) {
                d.dest.y = s.dest.y;
            }
            if sf.contains(PolyFlags::SPEED) {
                d.speed = s.speed;
            }
            if sf.contains(PolyFlags::DEST_ANGLE) {
                d.dest_angle = s.dest_angle;
            }
            if sf.contains(PolyFlags::ANGSPEED) {
                d.angle_speed = s.angle_speed;
            }
        }
        (DeltaPayload::Sound { sound: d, .. }, DeltaPayload::Sound { flags: sf, sound: s, .. }) => {
            if sf.contains(SoundFlags::VOLUME) {
                d.volume = s.volume;
            }
            d.sound_id = s.sound_id;
            d.emitter = s.emitter;
        }
        _ => {}
    }
}
