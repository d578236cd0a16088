//! Frame packing: a header followed by length-prefixed delta records.
//!
//! Each record is `type: u8, id: u32, flags: u32, len: u16` then `len` bytes
//! holding only the fields whose flag is set.

use bytes::Bytes;

use super::{ClientOpcode, ServerOpcode};
use crate::delta::{MaterialId, PspriteState, StateId};
use crate::flags::{
    MobjFlags, PlayerFlags, PolyFlags, PspriteFlags, SectorFlags, SideFlags, SoundFlags,
};
use crate::{
    BinaryReader, BinaryWriter, Delta, DeltaPayload, DeltaType, ProtocolError, SoundSource,
};

/// Opcode, set, resend and record count.
pub const FRAME_HEADER_LEN: usize = 5;
/// Type, id, flags and payload length of one record.
pub const RECORD_HEADER_LEN: usize = 11;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub first: bool,
    pub set: u8,
    pub resend: u8,
    pub count: u16,
}

/// Parsed record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub delta_type: DeltaType,
    pub id: u32,
    pub flags: u32,
}

/// Accumulates deltas into a frame until a byte budget is reached.
#[derive(Debug)]
pub struct FrameBuilder {
    first: bool,
    set: u8,
    resend: u8,
    count: u16,
    body: BinaryWriter,
}

impl FrameBuilder {
    pub fn new(set: u8, resend: u8, first: bool) -> Self {
        Self {
            first,
            set,
            resend,
            count: 0,
            body: BinaryWriter::with_capacity(1024),
        }
    }

    /// Bytes the finished frame would occupy.
    #[inline]
    pub fn len(&self) -> usize {
        FRAME_HEADER_LEN + self.body.len()
    }

    #[inline]
    pub fn count(&self) -> u16 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends the delta unless the frame would exceed `budget` bytes.
    pub fn try_push(&mut self, delta: &Delta, budget: usize) -> bool {
        if self.count == u16::MAX {
            return false;
        }
        let mut payload = BinaryWriter::with_capacity(64);
        write_payload(&mut payload, &delta.payload);
        let Ok(len) = u16::try_from(payload.len()) else {
            return false;
        };
        if self.len() + RECORD_HEADER_LEN + payload.len() > budget {
            return false;
        }
        self.body.put_u8(delta.delta_type() as u8);
        self.body.put_u32(delta.id);
        self.body.put_u32(delta.payload.bits());
        self.body.put_u16(len);
        self.body.put_slice(payload.as_slice());
        self.count += 1;
        true
    }

    pub fn finish(self) -> Bytes {
        let mut w = BinaryWriter::with_capacity(self.len());
        let opcode = if self.first {
            ServerOpcode::FirstFrame
        } else {
            ServerOpcode::Frame
        };
        w.put_u8(opcode as u8);
        w.put_u8(self.set);
        w.put_u8(self.resend);
        w.put_u16(self.count);
        w.put_slice(self.body.as_slice());
        w.finish()
    }
}

/// Reads the frame header and the record headers, skipping payloads.
pub fn read_frame(data: impl Into<Bytes>) -> Result<(FrameHeader, Vec<RecordHeader>), ProtocolError> {
    let mut r = BinaryReader::new(data);
    let first = match r.get_u8()? {
        x if x == ServerOpcode::Frame as u8 => false,
        x if x == ServerOpcode::FirstFrame as u8 => true,
        other => return Err(ProtocolError::InvalidOpcode(other)),
    };
    let header = FrameHeader {
        first,
        set: r.get_u8()?,
        resend: r.get_u8()?,
        count: r.get_u16()?,
    };
    let mut records = Vec::with_capacity(usize::from(header.count));
    for _ in 0..header.count {
        let type_byte = r.get_u8()?;
        let delta_type =
            DeltaType::from_u8(type_byte).ok_or(ProtocolError::UnknownDeltaType(type_byte))?;
        let id = r.get_u32()?;
        let flags = r.get_u32()?;
        let len = r.get_u16()?;
        r.skip(usize::from(len))?;
        records.push(RecordHeader { delta_type, id, flags });
    }
    Ok((header, records))
}

/// Builds an acknowledgement packet. A non-zero `resend` acks by resend id.
pub fn build_ack(set: u8, resend: u8) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(2);
    if resend != 0 {
        w.put_u8(ClientOpcode::AckResend as u8);
        w.put_u8(resend);
    } else {
        w.put_u8(ClientOpcode::AckSet as u8);
        w.put_u8(set);
    }
    w
}

/// Parses an acknowledgement packet into `(set_or_resend, is_resend)`.
pub fn read_ack(data: impl Into<Bytes>) -> Result<(u8, bool), ProtocolError> {
    let mut r = BinaryReader::new(data);
    let resent = match r.get_u8()? {
        x if x == ClientOpcode::AckSet as u8 => false,
        x if x == ClientOpcode::AckResend as u8 => true,
        other => return Err(ProtocolError::InvalidOpcode(other)),
    };
    Ok((r.get_u8()?, resent))
}

#[inline]
fn put_material(w: &mut BinaryWriter, m: Option<MaterialId>) {
    w.put_u32(m.map_or(u32::MAX, |m| m.0));
}

#[inline]
fn put_state(w: &mut BinaryWriter, s: Option<StateId>) {
    w.put_u32(s.map_or(u32::MAX, |s| s.0));
}

fn put_psprite(w: &mut BinaryWriter, flags: PspriteFlags, psp: &PspriteState) {
    if flags.contains(PspriteFlags::STATE_PTR) {
        put_state(w, psp.state);
        w.put_i32(psp.tics);
    }
    if flags.contains(PspriteFlags::LIGHT) {
        w.put_f32(psp.light);
    }
    if flags.contains(PspriteFlags::ALPHA) {
        w.put_f32(psp.alpha);
    }
    if flags.contains(PspriteFlags::OFFSET) {
        w.put_f32(psp.offset.x);
        w.put_f32(psp.offset.y);
    }
}

fn write_payload(w: &mut BinaryWriter, payload: &DeltaPayload) {
    match payload {
        DeltaPayload::Mobj { flags, mobj } => {
            let f = *flags;
            if f.contains(MobjFlags::NULL) {
                return;
            }
            if f.contains(MobjFlags::POS_X) {
                w.put_f32(mobj.pos.x);
            }
            if f.contains(MobjFlags::POS_Y) {
                w.put_f32(mobj.pos.y);
            }
            if f.contains(MobjFlags::POS_Z) {
                w.put_f32(mobj.pos.z);
            }
            if f.contains(MobjFlags::MOM_X) {
                w.put_f32(mobj.mom.x);
            }
            if f.contains(MobjFlags::MOM_Y) {
                w.put_f32(mobj.mom.y);
            }
            if f.contains(MobjFlags::MOM_Z) {
                w.put_f32(mobj.mom.z);
            }
            if f.contains(MobjFlags::ANGLE) {
                w.put_u32(mobj.angle);
            }
            if f.contains(MobjFlags::SELECTOR) {
                w.put_i32(mobj.selector);
            }
            if f.contains(MobjFlags::STATE) {
                put_state(w, mobj.state);
            }
            if f.contains(MobjFlags::RADIUS) {
                w.put_f32(mobj.radius);
            }
            if f.contains(MobjFlags::HEIGHT) {
                w.put_f32(mobj.height);
            }
            if f.contains(MobjFlags::FLAGS) {
                w.put_u32(mobj.dd_flags.bits());
            }
            if f.contains(MobjFlags::FLOORCLIP) {
                w.put_f32(mobj.floor_clip);
            }
            if f.contains(MobjFlags::TRANSLUCENCY) {
                w.put_u8(mobj.translucency);
            }
            if f.contains(MobjFlags::FADETARGET) {
                w.put_i16(mobj.vis_target);
            }
        }
        DeltaPayload::Player { flags, player } => {
            let f = *flags;
            if f.contains(PlayerFlags::MOBJ) {
                w.put_u32(player.mobj);
            }
            if f.contains(PlayerFlags::FORWARDMOVE) {
                w.put_i8(player.forward_move);
            }
            if f.contains(PlayerFlags::SIDEMOVE) {
                w.put_i8(player.side_move);
            }
            if f.contains(PlayerFlags::ANGLE) {
                w.put_u32(player.angle);
            }
            if f.contains(PlayerFlags::TURNDELTA) {
                w.put_u32(player.turn_delta);
            }
            if f.contains(PlayerFlags::FRICTION) {
                w.put_f32(player.friction);
            }
            if f.contains(PlayerFlags::EXTRALIGHT) {
                w.put_i32(player.extra_light);
                w.put_i32(player.fixed_color_map);
            }
            if f.contains(PlayerFlags::FILTER) {
                w.put_u32(player.filter);
            }
            if f.contains(PlayerFlags::CLYAW) {
                w.put_u32(player.cl_yaw);
            }
            if f.contains(PlayerFlags::CLPITCH) {
                w.put_f32(player.cl_pitch);
            }
            if f.contains(PlayerFlags::PSPRITES) {
                for (i, psp) in player.psprites.iter().enumerate() {
                    put_psprite(w, f.psprite_bits(i), psp);
                }
            }
        }
        DeltaPayload::Sector { flags, sector } => {
            let f = *flags;
            if f.contains(SectorFlags::LIGHT) {
                w.put_f32(sector.light_level);
            }
            for (c, bit) in SectorFlags::COLOR.iter().enumerate() {
                if f.contains(*bit) {
                    w.put_f32(sector.rgb[c]);
                }
            }
            for (p, plane) in sector.planes.iter().enumerate() {
                if f.contains(SectorFlags::MATERIAL[p]) {
                    put_material(w, plane.surface.material);
                }
                if f.contains(SectorFlags::HEIGHT[p]) {
                    w.put_f32(plane.height);
                }
                if f.contains(SectorFlags::TARGET[p]) {
                    w.put_f32(plane.target);
                }
                if f.contains(SectorFlags::SPEED[p]) {
                    w.put_f32(plane.speed);
                }
                for c in 0..3 {
                    if f.contains(SectorFlags::SURFACE_COLOR[p][c]) {
                        w.put_f32(plane.surface.rgba[c]);
                    }
                }
                for c in 0..3 {
                    if f.contains(SectorFlags::GLOW_COLOR[p][c]) {
                        w.put_f32(plane.glow_rgb[c]);
                    }
                }
                if f.contains(SectorFlags::GLOW[p]) {
                    w.put_f32(plane.glow);
                }
            }
        }
        DeltaPayload::Side { flags, side } => {
            let f = *flags;
            for (s, section) in side.sections.iter().enumerate() {
                if f.contains(SideFlags::MATERIAL[s]) {
                    put_material(w, section.material);
                }
                for c in 0..3 {
                    if f.contains(SideFlags::COLOR[s][c]) {
                        w.put_f32(section.rgba[c]);
                    }
                }
            }
            if f.contains(SideFlags::MID_COLOR_ALPHA) {
                w.put_f32(side.sections[1].rgba[3]);
            }
            if f.contains(SideFlags::MID_BLENDMODE) {
                w.put_u8(side.sections[1].blend_mode);
            }
            if f.contains(SideFlags::LINE_FLAGS) {
                w.put_u8(side.line_flags);
            }
            if f.contains(SideFlags::FLAGS) {
                w.put_u8(side.flags);
            }
        }
        DeltaPayload::Poly { flags, poly } => {
            let f = *flags;
            if f.contains(PolyFlags::DEST_X) {
                w.put_f32(poly.dest.x);
            }
            if f.contains(PolyFlags::DEST_Y) {
                w.put_f32(poly.dest.y);
            }
            if f.contains(PolyFlags::SPEED) {
                w.put_f32(poly.speed);
            }
            if f.contains(PolyFlags::DEST_ANGLE) {
                w.put_u32(poly.dest_angle);
            }
            if f.contains(PolyFlags::ANGSPEED) {
                w.put_u32(poly.angle_speed);
            }
        }
        DeltaPayload::Sound { source, flags, sound } => {
            w.put_i32(sound.sound_id);
            if *source == SoundSource::Mobj {
                w.put_u32(sound.emitter.unwrap_or(0));
            }
            if flags.contains(SoundFlags::VOLUME) {
                w.put_f32(sound.volume);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MobjState, SoundState};
    use glam::Vec3;

    fn moved_mobj(id: u32) -> Delta {
        let mobj = MobjState { id, pos: Vec3::new(1.0, 2.0, 3.0), ..Default::default() };
        Delta::new(id, 0, DeltaPayload::Mobj { flags: MobjFlags::POS_X | MobjFlags::POS_Y, mobj })
    }

    #[test]
    fn test_frame_headers() {
        let mut frame = FrameBuilder::new(4, 0, true);
        assert!(frame.try_push(&moved_mobj(12), 1400));
        let sound = Delta::new(
            3,
            0,
            DeltaPayload::Sound {
                source: SoundSource::Mobj,
                flags: SoundFlags::VOLUME,
                sound: SoundState { sound_id: 3, emitter: Some(3), volume: 1.0 },
            },
        );
        assert!(frame.try_push(&sound, 1400));
        let expected_len = frame.len();
        let data = frame.finish();
        assert_eq!(data.len(), expected_len);

        let (header, records) = read_frame(data).unwrap();
        assert_eq!(header, FrameHeader { first: true, set: 4, resend: 0, count: 2 });
        assert_eq!(records[0].delta_type, DeltaType::Mobj);
        assert_eq!(records[0].id, 12);
        assert_eq!(records[0].flags, (MobjFlags::POS_X | MobjFlags::POS_Y).bits());
        assert_eq!(records[1].delta_type, DeltaType::MobjSound);
    }

    #[test]
    fn test_budget_is_respected() {
        // Header plus one record of two floats.
        let one = FRAME_HEADER_LEN + RECORD_HEADER_LEN + 8;
        let mut frame = FrameBuilder::new(1, 0, false);
        assert!(frame.try_push(&moved_mobj(1), one));
        assert!(!frame.try_push(&moved_mobj(2), one + 5));
        assert_eq!(frame.count(), 1);
        assert_eq!(frame.len(), one);
    }

    #[test]
    fn test_ack_packets() {
        assert_eq!(read_ack(build_ack(9, 0).finish()).unwrap(), (9, false));
        assert_eq!(read_ack(build_ack(9, 2).finish()).unwrap(), (2, true));
        assert!(matches!(read_ack(vec![0x77u8, 1]), Err(ProtocolError::InvalidOpcode(0x77))));
    }
}
