//! Distances from a client's viewpoint and delta priority scores.

use glam::{Vec2, Vec3};
use protocol::{
    Delta, DeltaPayload, DeltaType, MobjFlags, MobjState, PlayerFlags, PolyFlags, SectorFlags,
    SoundFlags,
};

use crate::config::PoolConfig;
use crate::world::{Mobj, World};

/// Where the pool's owner is looking from, refreshed every generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OwnerInfo {
    pub pos: Vec3,
    pub angle: u32,
    /// Horizontal speed.
    pub speed: f32,
    /// Unacked deltas younger than this are not resent yet.
    pub ack_threshold: u32,
}

impl OwnerInfo {
    /// Viewpoint of player `slot`. Without a camera mobj the position is
    /// the origin.
    pub fn of_player(world: &World, slot: usize, ack_threshold: u32) -> Self {
        let camera = world.players.get(slot).and_then(|p| p.mobj).and_then(|id| world.mobj(id));
        match camera {
            Some(mo) => Self {
                pos: mo.pos,
                angle: mo.angle,
                speed: mo.mom.truncate().length(),
                ack_threshold,
            },
            None => Self { ack_threshold, ..Default::default() },
        }
    }
}

/// Fixed origins of map elements, computed once per map.
#[derive(Debug, Clone, Default)]
pub struct DeltaOrigins {
    pub sectors: Vec<Vec2>,
    /// Midpoint of the owning line; zero for unowned sides.
    pub sides: Vec<Vec2>,
}

impl DeltaOrigins {
    pub fn new(world: &World, owners: &[Option<u32>]) -> Self {
        let sectors = world.sectors.iter().map(|s| s.origin().as_vec2()).collect();
        let sides = owners
            .iter()
            .map(|owner| {
                owner
                    .and_then(|line| world.lines.get(line as usize))
                    .map_or(Vec2::ZERO, |line| (line.v1 + line.delta() / 2.0).as_vec2())
            })
            .collect();
        Self { sectors, sides }
    }
}

/// Distance to the centre of a live mobj; unbounded once it is gone.
fn live_mobj_distance(world: &World, mo: Option<&Mobj>, info: &OwnerInfo) -> f32 {
    match mo {
        Some(mo) if world.is_used_id(mo.id) => {
            let centre = Vec3::new(mo.pos.x, mo.pos.y, mo.pos.z + mo.height / 2.0);
            info.pos.distance(centre)
        }
        _ => f32::MAX,
    }
}

/// Distance to the centre of a registered mobj, whose z may be maxed.
fn registered_mobj_distance(mo: &MobjState, info: &OwnerInfo) -> f32 {
    let centre = Vec3::new(mo.pos.x, mo.pos.y, mo.unmaxed_z() + mo.height / 2.0);
    info.pos.distance(centre)
}

fn sector_distance(world: &World, origins: &DeltaOrigins, index: u32, info: &OwnerInfo) -> Option<f32> {
    let sector = world.sectors.get(index as usize)?;
    let origin = origins.sectors.get(index as usize)?;
    let mid_z = (sector.floor_height() + sector.ceiling_height()) / 2.0;
    Some(info.pos.distance(origin.extend(mid_z)))
}

fn poly_distance(world: &World, index: u32, info: &OwnerInfo) -> Option<f32> {
    let poly = world.polyobjs.get(index as usize)?;
    Some(info.pos.truncate().distance(poly.pos))
}

/// Distance from the owner to what the delta describes, 1 when unknown.
pub fn delta_distance(delta: &Delta, world: &World, origins: &DeltaOrigins, info: &OwnerInfo) -> f32 {
    let known = match (&delta.payload, delta.delta_type()) {
        // the registered position; may lag for old unacked data
        (DeltaPayload::Mobj { mobj, .. }, _) => Some(registered_mobj_distance(mobj, info)),
        (_, DeltaType::Player) => world
            .players
            .get(delta.id as usize)
            .and_then(|p| p.mobj)
            .map(|id| live_mobj_distance(world, world.mobj(id), info)),
        (_, DeltaType::Sector | DeltaType::SectorSound) => {
            sector_distance(world, origins, delta.id, info)
        }
        (_, DeltaType::Side) => origins
            .sides
            .get(delta.id as usize)
            .map(|o| info.pos.truncate().distance(*o)),
        (_, DeltaType::Poly | DeltaType::PolySound) => poly_distance(world, delta.id, info),
        (DeltaPayload::Sound { sound, .. }, DeltaType::MobjSound) => {
            let emitter = sound.emitter.unwrap_or(delta.id);
            Some(live_mobj_distance(world, world.mobj(emitter), info))
        }
        _ => None,
    };
    known.unwrap_or(1.0)
}

/// Farthest distance a sound delta is worth sending. Silence carries
/// everywhere.
pub fn max_sound_distance(delta: &Delta, config: &PoolConfig) -> f32 {
    let DeltaPayload::Sound { flags, sound, .. } = &delta.payload else {
        return f32::MAX;
    };
    let volume = if flags.contains(SoundFlags::VOLUME) { sound.volume } else { 1.0 };
    if volume <= 0.0 {
        return f32::MAX;
    }
    volume * config.sound_max_distance
}

/// Priority of a delta. Closer, older and more noticeable changes score
/// higher.
pub fn score_delta(delta: &Delta, distance: f32, age_ms: u32, config: &PoolConfig) -> f32 {
    let distance = distance.max(1.0);
    let mut score = config.base_scores.get(delta.delta_type()) / (distance * distance);

    score *= 1.0 + age_ms as f32 / (config.age_score_double_secs.max(f32::EPSILON) * 1000.0);

    match &delta.payload {
        DeltaPayload::Mobj { flags, mobj } => {
            if flags.contains(MobjFlags::CREATE) {
                score *= 1.5;
            }
            if flags.intersects(MobjFlags::POS_X | MobjFlags::POS_Y) {
                score *= 1.2;
            }
            let size = mobj.radius.max(mobj.height);
            if size < 16.0 {
                score *= size.max(2.0) / 16.0;
            } else if size > 50.0 {
                score *= size / 50.0;
            }
        }
        DeltaPayload::Player { flags, .. } => {
            if flags.contains(PlayerFlags::MOBJ) {
                score *= 2.0;
            }
        }
        DeltaPayload::Sector { flags, .. } => {
            if flags.contains(SectorFlags::LIGHT) {
                score *= 1.2;
            }
            if flags.intersects(SectorFlags::PLANE_MOTION) {
                score *= 3.0;
            }
        }
        DeltaPayload::Poly { flags, .. } => {
            if flags.contains(PolyFlags::SPEED) {
                score *= 1.2;
            }
        }
        DeltaPayload::Side { .. } | DeltaPayload::Sound { .. } => {}
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::MapBuilder;
    use protocol::{SectorState, SoundSource, SoundState};

    fn mobj_delta(flags: MobjFlags, radius: f32, height: f32) -> Delta {
        Delta::new(
            1,
            0,
            DeltaPayload::Mobj { flags, mobj: MobjState { radius, height, ..Default::default() } },
        )
    }

    fn sound_delta(source: SoundSource, id: u32, flags: SoundFlags, volume: f32) -> Delta {
        Delta::new(
            id,
            0,
            DeltaPayload::Sound { source, flags, sound: SoundState { sound_id: 1, emitter: None, volume } },
        )
    }

    #[test]
    fn test_distance_clamp_and_square() {
        let config = PoolConfig::default();
        let d = mobj_delta(MobjFlags::ANGLE, 20.0, 20.0);
        assert_eq!(score_delta(&d, 0.25, 0, &config), 1000.0);
        assert_eq!(score_delta(&d, 10.0, 0, &config), 10.0);
    }

    #[test]
    fn test_age_doubles_score() {
        let config = PoolConfig::default();
        let d = mobj_delta(MobjFlags::ANGLE, 20.0, 20.0);
        assert_eq!(score_delta(&d, 1.0, 1000, &config), 2000.0);
    }

    #[test]
    fn test_mobj_multipliers() {
        let config = PoolConfig::default();
        let created = mobj_delta(MobjFlags::CREATE | MobjFlags::POS_X, 20.0, 20.0);
        assert!((score_delta(&created, 1.0, 0, &config) - 1800.0).abs() < 1e-3);
        let tiny = mobj_delta(MobjFlags::ANGLE, 1.0, 1.0);
        assert_eq!(score_delta(&tiny, 1.0, 0, &config), 125.0);
        let big = mobj_delta(MobjFlags::ANGLE, 20.0, 100.0);
        assert_eq!(score_delta(&big, 1.0, 0, &config), 2000.0);
    }

    #[test]
    fn test_sector_plane_motion_triples() {
        let config = PoolConfig::default();
        let d = Delta::new(
            0,
            0,
            DeltaPayload::Sector { flags: SectorFlags::FLOOR_SPEED, sector: SectorState::default() },
        );
        assert_eq!(score_delta(&d, 1.0, 0, &config), 6000.0);
    }

    #[test]
    fn test_sound_distance_limits() {
        let config = PoolConfig::default();
        let loud = sound_delta(SoundSource::World, 1, SoundFlags::VOLUME, 0.5);
        assert_eq!(max_sound_distance(&loud, &config), 0.5 * 2025.0);
        let stop = sound_delta(SoundSource::World, 1, SoundFlags::VOLUME, 0.0);
        assert_eq!(max_sound_distance(&stop, &config), f32::MAX);
        let unset = sound_delta(SoundSource::World, 1, SoundFlags::empty(), 0.0);
        assert_eq!(max_sound_distance(&unset, &config), 2025.0);
    }

    #[test]
    fn test_delta_distances() {
        let world = MapBuilder::new(2, 1, 128.0).build(64.0).unwrap();
        let origins = DeltaOrigins::new(&world, &world.side_owners());
        let info = OwnerInfo { pos: Vec3::new(64.0, 64.0, 64.0), ..Default::default() };

        let sector = Delta::new(
            1,
            0,
            DeltaPayload::Sector { flags: SectorFlags::LIGHT, sector: SectorState::default() },
        );
        assert!((delta_distance(&sector, &world, &origins, &info) - 128.0).abs() < 1e-3);

        let world_sound = sound_delta(SoundSource::World, 3, SoundFlags::VOLUME, 1.0);
        assert_eq!(delta_distance(&world_sound, &world, &origins, &info), 1.0);

        // emitter no longer exists
        let gone = sound_delta(SoundSource::Mobj, 77, SoundFlags::VOLUME, 1.0);
        assert_eq!(delta_distance(&gone, &world, &origins, &info), f32::MAX);

        // left outer wall of sector 0 runs along x = 0
        assert!((delta_distance(&Delta::new(0, 0, side_payload()), &world, &origins, &info) - 64.0).abs() < 1e-3);
    }

    fn side_payload() -> DeltaPayload {
        DeltaPayload::Side { flags: protocol::SideFlags::FLAGS, side: Default::default() }
    }
}
