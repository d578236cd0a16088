//! Change-flag sets carried by each delta kind.
//!
//! A set bit means the matching field of the payload is meaningful and must
//! be applied by the receiver.

use bitflags::bitflags;

bitflags! {
    /// Changed fields of a mobj delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MobjFlags: u32 {
        const POS_X = 0x0000_0001;
        const POS_Y = 0x0000_0002;
        const POS_Z = 0x0000_0004;
        const MOM_X = 0x0000_0008;
        const MOM_Y = 0x0000_0010;
        const MOM_Z = 0x0000_0020;
        const ANGLE = 0x0000_0040;
        const HEIGHT = 0x0000_0080;
        const FLAGS = 0x0000_0100;
        const SELECTOR = 0x0000_0200;
        const STATE = 0x0000_0400;
        const RADIUS = 0x0000_0800;
        const FLOORCLIP = 0x0000_2000;
        /// The mobj no longer exists.
        const NULL = 0x0001_0000;
        /// The receiver has never seen this mobj.
        const CREATE = 0x0002_0000;
        const TRANSLUCENCY = 0x0004_0000;
        const FADETARGET = 0x0008_0000;

        const POS = Self::POS_X.bits() | Self::POS_Y.bits() | Self::POS_Z.bits();
        const MOM = Self::MOM_X.bits() | Self::MOM_Y.bits() | Self::MOM_Z.bits();
        /// Sprite presentation the viewer never sees of its own camera.
        const CAMERA_EXCLUDE = Self::SELECTOR.bits() | Self::STATE.bits() | Self::RADIUS.bits();
    }
}

bitflags! {
    /// Per-psprite change bits, shifted into [`PlayerFlags`] at `16 + 8 * index`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PspriteFlags: u8 {
        const STATE_PTR = 0x01;
        const LIGHT = 0x04;
        const ALPHA = 0x08;
        const STATE = 0x10;
        const OFFSET = 0x20;
    }
}

bitflags! {
    /// Changed fields of a player delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PlayerFlags: u32 {
        const MOBJ = 0x0000_0001;
        const FORWARDMOVE = 0x0000_0002;
        const SIDEMOVE = 0x0000_0004;
        const ANGLE = 0x0000_0008;
        const TURNDELTA = 0x0000_0010;
        const FRICTION = 0x0000_0020;
        const EXTRALIGHT = 0x0000_0040;
        const FILTER = 0x0000_0080;
        const CLYAW = 0x0000_1000;
        const CLPITCH = 0x0000_2000;
        const PSPRITES = 0x0000_4000;
        const PSPRITE0 = 0x00ff_0000;
        const PSPRITE1 = 0xff00_0000;

        /// Fields the owning client predicts itself.
        const CAMERA_EXCLUDE = Self::FORWARDMOVE.bits() | Self::SIDEMOVE.bits()
            | Self::ANGLE.bits() | Self::TURNDELTA.bits();
        /// Fields nobody but the owning client needs.
        const NONCAMERA_EXCLUDE = Self::FORWARDMOVE.bits() | Self::SIDEMOVE.bits()
            | Self::ANGLE.bits() | Self::TURNDELTA.bits() | Self::EXTRALIGHT.bits()
            | Self::FILTER.bits() | Self::CLYAW.bits() | Self::CLPITCH.bits()
            | Self::PSPRITES.bits() | Self::PSPRITE0.bits() | Self::PSPRITE1.bits();
    }
}

impl PlayerFlags {
    /// Flags for psprite `index` (0 or 1).
    #[inline]
    pub fn psprite(index: usize, flags: PspriteFlags) -> Self {
        Self::from_bits_retain(u32::from(flags.bits()) << (16 + 8 * index))
    }

    /// Psprite bits of psprite `index`.
    #[inline]
    pub fn psprite_bits(self, index: usize) -> PspriteFlags {
        PspriteFlags::from_bits_truncate((self.bits() >> (16 + 8 * index)) as u8)
    }
}

bitflags! {
    /// Changed fields of a sector delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectorFlags: u32 {
        const FLOOR_HEIGHT = 0x0000_0001;
        const CEILING_HEIGHT = 0x0000_0002;
        const FLOOR_TARGET = 0x0000_0004;
        const FLOOR_SPEED = 0x0000_0008;
        const CEILING_TARGET = 0x0000_0010;
        const CEILING_SPEED = 0x0000_0020;
        const FLOOR_MATERIAL = 0x0000_0040;
        const CEILING_MATERIAL = 0x0000_0080;
        const LIGHT = 0x0000_0100;
        const COLOR_RED = 0x0000_0200;
        const COLOR_GREEN = 0x0000_0400;
        const COLOR_BLUE = 0x0000_0800;
        const FLOOR_COLOR_RED = 0x0000_1000;
        const FLOOR_COLOR_GREEN = 0x0000_2000;
        const FLOOR_COLOR_BLUE = 0x0000_4000;
        const CEIL_COLOR_RED = 0x0000_8000;
        const CEIL_COLOR_GREEN = 0x0001_0000;
        const CEIL_COLOR_BLUE = 0x0002_0000;
        const FLOOR_GLOW_RED = 0x0004_0000;
        const FLOOR_GLOW_GREEN = 0x0008_0000;
        const FLOOR_GLOW_BLUE = 0x0010_0000;
        const CEIL_GLOW_RED = 0x0020_0000;
        const CEIL_GLOW_GREEN = 0x0040_0000;
        const CEIL_GLOW_BLUE = 0x0080_0000;
        const FLOOR_GLOW = 0x0100_0000;
        const CEIL_GLOW = 0x0200_0000;

        /// Anything that moves a plane.
        const PLANE_MOTION = Self::FLOOR_HEIGHT.bits() | Self::CEILING_HEIGHT.bits()
            | Self::FLOOR_TARGET.bits() | Self::FLOOR_SPEED.bits()
            | Self::CEILING_TARGET.bits() | Self::CEILING_SPEED.bits();
    }
}

impl SectorFlags {
    pub const COLOR: [Self; 3] = [Self::COLOR_RED, Self::COLOR_GREEN, Self::COLOR_BLUE];

    /// Surface color bits indexed by plane then channel.
    pub const SURFACE_COLOR: [[Self; 3]; 2] = [
        [Self::FLOOR_COLOR_RED, Self::FLOOR_COLOR_GREEN, Self::FLOOR_COLOR_BLUE],
        [Self::CEIL_COLOR_RED, Self::CEIL_COLOR_GREEN, Self::CEIL_COLOR_BLUE],
    ];

    /// Glow color bits indexed by plane then channel.
    pub const GLOW_COLOR: [[Self; 3]; 2] = [
        [Self::FLOOR_GLOW_RED, Self::FLOOR_GLOW_GREEN, Self::FLOOR_GLOW_BLUE],
        [Self::CEIL_GLOW_RED, Self::CEIL_GLOW_GREEN, Self::CEIL_GLOW_BLUE],
    ];

    pub const GLOW: [Self; 2] = [Self::FLOOR_GLOW, Self::CEIL_GLOW];
    pub const HEIGHT: [Self; 2] = [Self::FLOOR_HEIGHT, Self::CEILING_HEIGHT];
    pub const TARGET: [Self; 2] = [Self::FLOOR_TARGET, Self::CEILING_TARGET];
    pub const SPEED: [Self; 2] = [Self::FLOOR_SPEED, Self::CEILING_SPEED];
    pub const MATERIAL: [Self; 2] = [Self::FLOOR_MATERIAL, Self::CEILING_MATERIAL];
}

bitflags! {
    /// Changed fields of a side delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SideFlags: u32 {
        const TOP_MATERIAL = 0x0001;
        const MID_MATERIAL = 0x0002;
        const BOTTOM_MATERIAL = 0x0004;
        const LINE_FLAGS = 0x0008;
        const TOP_COLOR_RED = 0x0010;
        const TOP_COLOR_GREEN = 0x0020;
        const TOP_COLOR_BLUE = 0x0040;
        const MID_COLOR_RED = 0x0080;
        const MID_COLOR_GREEN = 0x0100;
        const MID_COLOR_BLUE = 0x0200;
        const MID_COLOR_ALPHA = 0x0400;
        const BOTTOM_COLOR_RED = 0x0800;
        const BOTTOM_COLOR_GREEN = 0x1000;
        const BOTTOM_COLOR_BLUE = 0x2000;
        const MID_BLENDMODE = 0x4000;
        const FLAGS = 0x8000;
    }
}

impl SideFlags {
    /// Material bits indexed by section (top, middle, bottom).
    pub const MATERIAL: [Self; 3] = [Self::TOP_MATERIAL, Self::MID_MATERIAL, Self::BOTTOM_MATERIAL];

    /// RGB bits indexed by section then channel.
    pub const COLOR: [[Self; 3]; 3] = [
        [Self::TOP_COLOR_RED, Self::TOP_COLOR_GREEN, Self::TOP_COLOR_BLUE],
        [Self::MID_COLOR_RED, Self::MID_COLOR_GREEN, Self::MID_COLOR_BLUE],
        [Self::BOTTOM_COLOR_RED, Self::BOTTOM_COLOR_GREEN, Self::BOTTOM_COLOR_BLUE],
    ];
}

bitflags! {
    /// Changed fields of a polyobj delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PolyFlags: u32 {
        const DEST_X = 0x01;
        const DEST_Y = 0x02;
        const SPEED = 0x04;
        const DEST_ANGLE = 0x08;
        const ANGSPEED = 0x10;
    }
}

bitflags! {
    /// Sound delta contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SoundFlags: u32 {
        const VOLUME = 0x01;
        const REPEAT = 0x02;
        /// Emitted from the sector's floor plane.
        const FLOOR = 0x04;
        /// Emitted from the sector's ceiling plane.
        const CEILING = 0x08;
    }
}

bitflags! {
    /// Engine-side mobj flags replicated with [`MobjFlags::FLAGS`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MobjDdFlags: u32 {
        const DONTDRAW = 0x0000_0001;
        const SHADOW = 0x0000_0002;
        const ALTSHADOW = 0x0000_0004;
        const BRIGHTSHADOW = 0x0000_0008;
        const VIEWALIGN = 0x0000_0010;
        const FITTOP = 0x0000_0020;
        const NOFITBOTTOM = 0x0000_0040;
        const MISSILE = 0x0000_0100;
        const FLY = 0x0000_0200;
        const NOGRAVITY = 0x0000_0400;
        const ALWAYSLIT = 0x0000_0800;
        const SOLID = 0x2000_0000;
        /// Client-side only, never replicated.
        const REMOTE = 0x4000_0000;
        /// Server-side only, never replicated.
        const LOCAL = 0x8000_0000;

        /// Bits that travel in mobj deltas.
        const PACK_MASK = !(Self::REMOTE.bits() | Self::LOCAL.bits());
    }
}
