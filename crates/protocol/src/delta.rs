//! Replicated entity records and the delta envelope around them.

use glam::{Vec2, Vec3};

use crate::flags::{
    MobjDdFlags, MobjFlags, PlayerFlags, PolyFlags, SectorFlags, SideFlags, SoundFlags,
};

/// Thinker id of a mobj.
pub type ThingId = u32;

/// Number of player slots.
pub const MAX_PLAYERS: usize = 16;

/// Registered z of a mobj resting on its floor.
pub const FLOOR_Z: f32 = f32::MIN;
/// Registered z of a mobj touching its ceiling.
pub const CEILING_Z: f32 = f32::MAX;

/// Index into the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub u32);

/// Index into the material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Replicated mobj fields. The z coordinate may hold a floor/ceiling sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MobjState {
    pub id: ThingId,
    pub player: Option<u8>,
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
}

impl MobjState {
    /// Z with the floor/ceiling sentinels resolved.
    pub fn unmaxed_z(&self) -> f32 {
        if self.pos.z == FLOOR_Z {
            self.floor_z
        } else if self.pos.z == CEILING_Z {
            self.ceiling_z - self.height
        } else {
            self.pos.z
        }
    }
}

/// Weapon sprite overlay of a player.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PspriteState {
    pub state: Option<StateId>,
    pub tics: i32,
    pub light: f32,
    pub alpha: f32,
    pub offset: Vec2,
}

/// Replicated player fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerState {
    /// Camera mobj, 0 when none.
    pub mobj: ThingId,
    pub forward_move: i8,
    pub side_move: i8,
    pub angle: u32,
    pub turn_delta: u32,
    pub friction: f32,
    pub extra_light: i32,
    pub fixed_color_map: i32,
    /// Packed RGBA view filter, 0 when off.
    pub filter: u32,
    pub cl_yaw: u32,
    pub cl_pitch: f32,
    pub psprites: [PspriteState; 2],
}

/// A material-bearing surface of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceState {
    pub material: Option<MaterialId>,
    pub rgba: [f32; 4],
}

/// Floor or ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaneState {
    pub height: f32,
    pub target: f32,
    pub speed: f32,
    pub glow: f32,
    pub glow_rgb: [f32; 3],
    pub surface: SurfaceState,
}

/// Plane index of the floor.
pub const PLANE_FLOOR: usize = 0;
/// Plane index of the ceiling.
pub const PLANE_CEILING: usize = 1;

/// Replicated sector fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SectorState {
    pub light_level: f32,
    pub rgb: [f32; 3],
    pub planes: [PlaneState; 2],
}

/// One wall section of a side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SideSectionState {
    pub material: Option<MaterialId>,
    pub rgba: [f32; 4],
    pub blend_mode: u8,
}

/// Section indices of a side.
pub const SECTION_TOP: usize = 0;
pub const SECTION_MIDDLE: usize = 1;
pub const SECTION_BOTTOM: usize = 2;

/// Replicated side fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SideState {
    /// Top, middle and bottom sections.
    pub sections: [SideSectionState; 3],
    pub line_flags: u8,
    pub flags: u8,
}

/// Replicated polyobj fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolyState {
    pub dest: Vec2,
    pub speed: f32,
    pub dest_angle: u32,
    pub angle_speed: u32,
}

/// What a sound is attached to. Determines the delta type and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundSource {
    World,
    Mobj,
    Sector,
    Poly,
}

/// Sound start/stop payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoundState {
    pub sound_id: i32,
    /// Emitting mobj, for mobj sounds.
    pub emitter: Option<ThingId>,
    pub volume: f32,
}

/// Delta kinds, one per replicated entity kind.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaType {
    Mobj = 0,
    Player = 1,
    Sector = 2,
    Side = 3,
    Poly = 4,
    Sound = 5,
    MobjSound = 6,
    SectorSound = 7,
    PolySound = 8,
}

impl DeltaType {
    pub const ALL: [DeltaType; 9] = [
        DeltaType::Mobj,
        DeltaType::Player,
        DeltaType::Sector,
        DeltaType::Side,
        DeltaType::Poly,
        DeltaType::Sound,
        DeltaType::MobjSound,
        DeltaType::SectorSound,
        DeltaType::PolySound,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(usize::from(v)).copied()
    }

    #[inline]
    pub fn is_sound(self) -> bool {
        matches!(
            self,
            DeltaType::Sound | DeltaType::MobjSound | DeltaType::SectorSound | DeltaType::PolySound
        )
    }
}

/// Lifecycle of a delta inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaState {
    /// Not yet transmitted.
    #[default]
    New,
    /// Transmitted, waiting for the client's acknowledgement.
    Unacked,
}

/// Change flags plus a full snapshot of the entity.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaPayload {
    Mobj { flags: MobjFlags, mobj: MobjState },
    Player { flags: PlayerFlags, player: PlayerState },
    Sector { flags: SectorFlags, sector: SectorState },
    Side { flags: SideFlags, side: SideState },
    Poly { flags: PolyFlags, poly: PolyState },
    Sound { source: SoundSource, flags: SoundFlags, sound: SoundState },
}

impl DeltaPayload {
    pub fn delta_type(&self) -> DeltaType {
        match self {
            DeltaPayload::Mobj { .. } => DeltaType::Mobj,
            DeltaPayload::Player { .. } => DeltaType::Player,
            DeltaPayload::Sector { .. } => DeltaType::Sector,
            DeltaPayload::Side { .. } => DeltaType::Side,
            DeltaPayload::Poly { .. } => DeltaType::Poly,
            DeltaPayload::Sound { source, .. } => match source {
                SoundSource::World => DeltaType::Sound,
                SoundSource::Mobj => DeltaType::MobjSound,
                SoundSource::Sector => DeltaType::SectorSound,
                SoundSource::Poly => DeltaType::PolySound,
            },
        }
    }

    /// Raw change bits, whatever the kind.
    pub fn bits(&self) -> u32 {
        match self {
            DeltaPayload::Mobj { flags, .. } => flags.bits(),
            DeltaPayload::Player { flags, .. } => flags.bits(),
            DeltaPayload::Sector { flags, .. } => flags.bits(),
            DeltaPayload::Side { flags, .. } => flags.bits(),
            DeltaPayload::Poly { flags, .. } => flags.bits(),
            DeltaPayload::Sound { flags, .. } => flags.bits(),
        }
    }

    /// Clears every change bit.
    pub fn clear_flags(&mut self) {
        self.set_bits(0);
    }

    /// Replaces the change bits with `bits`, whatever the kind.
    pub fn set_bits(&mut self, bits: u32) {
        match self {
            DeltaPayload::Mobj { flags, .. } => *flags = MobjFlags::from_bits_retain(bits),
            DeltaPayload::Player { flags, .. } => *flags = PlayerFlags::from_bits_retain(bits),
            DeltaPayload::Sector { flags, .. } => *flags = SectorFlags::from_bits_retain(bits),
            DeltaPayload::Side { flags, .. } => *flags = SideFlags::from_bits_retain(bits),
            DeltaPayload::Poly { flags, .. } => *flags = PolyFlags::from_bits_retain(bits),
            DeltaPayload::Sound { flags, .. } => *flags = SoundFlags::from_bits_retain(bits),
        }
    }
}

/// A typed change record for one entity, destined for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Entity id. Meaning depends on the type (thinker id, player, sector, ...).
    pub id: u32,
    pub state: DeltaState,
    /// Real time in milliseconds when created or last transmitted.
    pub time_stamp: u32,
    /// Frame set the delta was transmitted in.
    pub set: u8,
    /// Resend id, 0 when never resent.
    pub resend: u8,
    pub score: f32,
    pub payload: DeltaPayload,
}

impl Delta {
    /// A NEW delta.
    pub fn new(id: u32, time_stamp: u32, payload: DeltaPayload) -> Self {
        Self {
            id,
            state: DeltaState::New,
            time_stamp,
            set: 0,
            resend: 0,
            score: 0.0,
            payload,
        }
    }

    #[inline]
    pub fn delta_type(&self) -> DeltaType {
        self.payload.delta_type()
    }

    /// No change bits at all.
    #[inline]
    pub fn is_void(&self) -> bool {
        self.payload.bits() == 0
    }

    /// Both deltas describe the same entity.
    #[inline]
    pub fn is_same(&self, other: &Delta) -> bool {
        self.id == other.id && self.delta_type() == other.delta_type()
    }

    #[inline]
    pub fn is_sound(&self) -> bool {
        matches!(self.payload, DeltaPayload::Sound { .. })
    }

    pub fn is_start_sound(&self) -> bool {
        match &self.payload {
            DeltaPayload::Sound { flags, sound, .. } => {
                flags.contains(SoundFlags::VOLUME) && sound.volume > 0.0
            }
            _ => false,
        }
    }

    pub fn is_stop_sound(&self) -> bool {
        match &self.payload {
            DeltaPayload::Sound { flags, sound, .. } => {
                flags.contains(SoundFlags::VOLUME) && sound.volume <= 0.0
            }
            _ => false,
        }
    }

    pub fn is_null_mobj(&self) -> bool {
        matches!(&self.payload, DeltaPayload::Mobj { flags, .. } if flags.contains(MobjFlags::NULL))
    }

    pub fn is_create_mobj(&self) -> bool {
        matches!(&self.payload, DeltaPayload::Mobj { flags, .. } if flags.contains(MobjFlags::CREATE))
    }

    /// Milliseconds since the time stamp.
    #[inline]
    pub fn age(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.time_stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobj_delta(id: u32, flags: MobjFlags) -> Delta {
        Delta::new(id, 0, DeltaPayload::Mobj { flags, mobj: MobjState::default() })
    }

    fn sound_delta(id: u32, volume: f32) -> Delta {
        Delta::new(
            id,
            0,
            DeltaPayload::Sound {
                source: SoundSource::Sector,
                flags: SoundFlags::VOLUME,
                sound: SoundState { sound_id: 3, emitter: None, volume },
            },
        )
    }

    #[test]
    fn test_void_and_same() {
        let a = mobj_delta(4, MobjFlags::empty());
        let b = mobj_delta(4, MobjFlags::POS_X);
        assert!(a.is_void());
        assert!(!b.is_void());
        assert!(a.is_same(&b));
        assert!(!a.is_same(&mobj_delta(5, MobjFlags::POS_X)));
        assert!(!sound_delta(4, 1.0).is_same(&a));
    }

    #[test]
    fn test_sound_classification() {
        let start = sound_delta(2, 0.5);
        let stop = sound_delta(2, 0.0);
        assert!(start.is_start_sound() && !start.is_stop_sound());
        assert!(stop.is_stop_sound() && !stop.is_start_sound());
        assert_eq!(start.delta_type(), DeltaType::SectorSound);
        assert!(start.delta_type().is_sound());
    }

    #[test]
    fn test_unmaxed_z() {
        let mut mo = MobjState { floor_z: 8.0, ceiling_z: 128.0, height: 56.0, ..Default::default() };
        mo.pos.z = FLOOR_Z;
        assert_eq!(mo.unmaxed_z(), 8.0);
        mo.pos.z = CEILING_Z;
        assert_eq!(mo.unmaxed_z(), 72.0);
        mo.pos.z = 30.0;
        assert_eq!(mo.unmaxed_z(), 30.0);
    }

    #[test]
    fn test_type_byte() {
        for t in DeltaType::ALL {
            assert_eq!(DeltaType::from_u8(t as u8), Some(t));
        }
        assert_eq!(DeltaType::from_u8(9), None);
    }
}
