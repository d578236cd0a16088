//! Static map geometry: sectors, lines, sides, polyobjs and the BSP leaves
//! with their half-edges.

use glam::{DVec2, DVec3, Vec2};
use protocol::delta::{PLANE_CEILING, PLANE_FLOOR, SECTION_MIDDLE};
use protocol::MaterialId;

use crate::spatial::Bounds;

/// Middle texture stretches to fill the opening.
pub const SIDE_MIDDLE_STRETCH: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub height: f32,
    pub opaque: bool,
}

/// Paintable surface of a plane or a wall section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub material: Option<MaterialId>,
    pub rgba: [f32; 4],
    pub blend_mode: u8,
    /// The material was substituted locally and must not be replicated.
    pub material_fix: bool,
    /// Vertical texture offset.
    pub offset_y: f32,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            material: None,
            rgba: [1.0; 4],
            blend_mode: 0,
            material_fix: false,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Plane {
    pub height: f32,
    pub target: f32,
    pub speed: f32,
    pub glow: f32,
    pub glow_rgb: [f32; 3],
    pub surface: Surface,
}

#[derive(Debug, Clone, Default)]
pub struct Sector {
    pub light_level: f32,
    pub rgb: [f32; 3],
    pub planes: [Plane; 2],
    pub bounds: Bounds,
}

impl Sector {
    #[inline]
    pub fn floor_height(&self) -> f32 {
        self.planes[PLANE_FLOOR].height
    }

    #[inline]
    pub fn ceiling_height(&self) -> f32 {
        self.planes[PLANE_CEILING].height
    }

    /// Sound and rating origin.
    #[inline]
    pub fn origin(&self) -> DVec2 {
        DVec2::new(self.bounds.center_x(), self.bounds.center_y())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Side {
    /// Top, middle and bottom.
    pub sections: [Surface; 3],
    pub flags: u8,
    pub sector: u32,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub v1: DVec2,
    pub v2: DVec2,
    pub flags: u8,
    pub front: Option<u32>,
    pub back: Option<u32>,
}

impl Line {
    #[inline]
    pub fn side(&self, back: bool) -> Option<u32> {
        if back { self.back } else { self.front }
    }

    #[inline]
    pub fn delta(&self) -> DVec2 {
        self.v2 - self.v1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Polyobj {
    pub pos: Vec2,
    pub dest: Vec2,
    pub speed: f32,
    pub dest_angle: u32,
    pub angle_speed: u32,
}

/// Convex map region bounded by a ring of half-edges. The leaf lies to the
/// right of each of its half-edges.
#[derive(Debug, Clone)]
pub struct BspLeaf {
    pub aabb: Bounds,
    pub sector: u32,
    pub hedges: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct HEdge {
    pub v1: DVec2,
    pub v2: DVec2,
    /// Same edge walked the other way, in the neighbouring leaf.
    pub twin: Option<u32>,
    pub leaf: u32,
    pub line: Option<u32>,
    /// Which side of `line` faces this half-edge's leaf.
    pub line_back: bool,
    pub length: f64,
}

impl HEdge {
    pub fn new(v1: DVec2, v2: DVec2, leaf: u32) -> Self {
        Self {
            v1,
            v2,
            twin: None,
            leaf,
            line: None,
            line_back: false,
            length: v1.distance(v2),
        }
    }

    /// Signed distance from `p` to the edge line. Positive on the leaf side.
    #[inline]
    pub fn signed_distance(&self, p: DVec2) -> f64 {
        let d = self.v2 - self.v1;
        ((self.v1.y - p.y) * d.x - (self.v1.x - p.x) * d.y) / self.length
    }
}

/// Light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lumobj {
    pub origin: DVec3,
    pub radius: f64,
    /// Only omni lights spread into neighbouring leaves.
    pub omni: bool,
    pub leaf: Option<u32>,
}

/// True when the opaque middle material on the `back` side of a two-sided
/// line fills the whole gap between the two sectors.
pub fn middle_covers_opening(
    line: &Line,
    back: bool,
    sides: &[Side],
    sectors: &[Sector],
    materials: &[Material],
) -> bool {
    let (Some(front_id), Some(back_id)) = (line.side(back), line.side(!back)) else {
        return false;
    };
    let (Some(side), Some(other)) = (sides.get(front_id as usize), sides.get(back_id as usize)) else {
        return false;
    };
    let section = &side.sections[SECTION_MIDDLE];
    let Some(material) = section.material.and_then(|m| materials.get(m.0 as usize)) else {
        return false;
    };
    if !(material.opaque && section.blend_mode == 0 && section.rgba[3] >= 1.0) {
        return false;
    }
    if side.flags & SIDE_MIDDLE_STRETCH != 0 {
        return true;
    }
    let (Some(front_sec), Some(back_sec)) =
        (sectors.get(side.sector as usize), sectors.get(other.sector as usize))
    else {
        return false;
    };
    let open_top = front_sec.ceiling_height().min(back_sec.ceiling_height());
    let open_bottom = front_sec.floor_height().max(back_sec.floor_height());
    if material.height < open_top - open_bottom {
        return false;
    }
    let mat_top = open_top - section.offset_y;
    let mat_bottom = mat_top - material.height;
    mat_top >= open_top && mat_bottom <= open_bottom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(floor: f32, ceil: f32) -> Sector {
        let mut s = Sector::default();
        s.planes[PLANE_FLOOR].height = floor;
        s.planes[PLANE_CEILING].height = ceil;
        s
    }

    fn two_sided(mid: Option<MaterialId>) -> (Line, Vec<Side>) {
        let mut front = Side { sector: 0, ..Default::default() };
        front.sections[SECTION_MIDDLE].material = mid;
        let back = Side { sector: 1, ..Default::default() };
        let line = Line {
            v1: DVec2::ZERO,
            v2: DVec2::new(0.0, 64.0),
            flags: 0,
            front: Some(0),
            back: Some(1),
        };
        (line, vec![front, back])
    }

    #[test]
    fn test_signed_distance_positive_inside() {
        // up the left edge of a leaf spanning x in [0, 64]
        let h = HEdge::new(DVec2::new(0.0, 0.0), DVec2::new(0.0, 64.0), 0);
        assert_eq!(h.length, 64.0);
        assert!((h.signed_distance(DVec2::new(10.0, 32.0)) - 10.0).abs() < 1e-9);
        assert!(h.signed_distance(DVec2::new(-5.0, 32.0)) < 0.0);
    }

    #[test]
    fn test_middle_covers_opening() {
        let sectors = vec![sector(0.0, 128.0), sector(16.0, 96.0)];
        let tall = vec![Material { height: 128.0, opaque: true }];
        let (line, sides) = two_sided(Some(MaterialId(0)));
        assert!(middle_covers_opening(&line, false, &sides, &sectors, &tall));
        // nothing on the back side
        assert!(!middle_covers_opening(&line, true, &sides, &sectors, &tall));

        let short = vec![Material { height: 32.0, opaque: true }];
        assert!(!middle_covers_opening(&line, false, &sides, &sectors, &short));

        let grate = vec![Material { height: 128.0, opaque: false }];
        assert!(!middle_covers_opening(&line, false, &sides, &sectors, &grate));

        let (line, sides) = two_sided(None);
        assert!(!middle_covers_opening(&line, false, &sides, &sectors, &tall));
    }
}
