use glam::Vec2;
use protocol::{StateId, ThingId};

/// Ground friction of a player standing on a normal floor.
pub const FRICTION_NORMAL: f32 = 0.906_25;

/// Weapon overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Psprite {
    pub state: Option<StateId>,
    pub tics: i32,
    pub light: f32,
    pub alpha: f32,
    pub offset: Vec2,
}

impl Default for Psprite {
    fn default() -> Self {
        Self {
            state: None,
            tics: 0,
            light: 1.0,
            alpha: 1.0,
            offset: Vec2::ZERO,
        }
    }
}

/// A player slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Player {
    pub in_game: bool,
    /// Controlled by this process rather than a remote client.
    pub local: bool,
    /// Camera mobj.
    pub mobj: Option<ThingId>,
    pub forward_move: i8,
    pub side_move: i8,
    pub turn_delta: u32,
    pub friction: f32,
    pub extra_light: i32,
    pub fixed_color_map: i32,
    /// View filter colour, `None` when off.
    pub filter: Option<[f32; 4]>,
    /// Vertical look direction.
    pub look_dir: f32,
    pub psprites: [Psprite; 2],
}

impl Default for Player {
    fn default() -> Self {
        Self {
            in_game: false,
            local: false,
            mobj: None,
            forward_move: 0,
            side_move: 0,
            turn_delta: 0,
            friction: FRICTION_NORMAL,
            extra_light: 0,
            fixed_color_map: 0,
            filter: None,
            look_dir: 0.0,
            psprites: [Psprite::default(); 2],
        }
    }
}

impl Player {
    /// View filter packed as little-endian RGBA bytes, 0 when off.
    pub fn packed_filter(&self) -> u32 {
        self.filter.map_or(0, |[r, g, b, a]| {
            let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u32;
            byte(r) | byte(g) << 8 | byte(b) << 16 | byte(a) << 24
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_filter() {
        let mut p = Player::default();
        assert_eq!(p.packed_filter(), 0);
        p.filter = Some([1.0, 0.0, 0.5, 1.0]);
        assert_eq!(p.packed_filter(), 0xff7f_00ff);
    }
}
