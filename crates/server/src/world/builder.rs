//! Builds rectangular test and demo maps: a grid of square sectors, one
//! leaf per sector, neighbouring leaves joined by two-sided lines.

use glam::{DVec2, DVec3, Vec2};
use protocol::delta::{PLANE_CEILING, PLANE_FLOOR, SECTION_BOTTOM, SECTION_MIDDLE, SECTION_TOP};
use protocol::MaterialId;

use super::map::{BspLeaf, HEdge, Line, Lumobj, Material, Polyobj, Sector, Side};
use super::mobj::StateTable;
use super::World;
use crate::error::MapError;
use crate::spatial::Bounds;

const LINE_BLOCKING: u8 = 0x01;
const LINE_TWO_SIDED: u8 = 0x04;

/// Wall material every builder map starts with.
pub const WALL_MATERIAL: MaterialId = MaterialId(0);
/// Floor and ceiling material every builder map starts with.
pub const FLAT_MATERIAL: MaterialId = MaterialId(1);

// Hedge order around a leaf, clockwise.
const LEFT: usize = 0;
const TOP: usize = 1;
const RIGHT: usize = 2;
const BOTTOM: usize = 3;

#[derive(Debug, Clone)]
pub struct MapBuilder {
    columns: u32,
    rows: u32,
    sector_size: f64,
    floor: f32,
    ceiling: f32,
    heights: Vec<(u32, f32, f32)>,
    materials: Vec<Material>,
    states: StateTable,
    polyobjs: Vec<Vec2>,
    lumobjs: Vec<(DVec3, f64, bool)>,
}

impl MapBuilder {
    pub fn new(columns: u32, rows: u32, sector_size: f64) -> Self {
        Self {
            columns,
            rows,
            sector_size,
            floor: 0.0,
            ceiling: 128.0,
            heights: Vec::new(),
            materials: vec![
                Material { height: 128.0, opaque: true },
                Material { height: 64.0, opaque: true },
            ],
            states: StateTable::default(),
            polyobjs: Vec::new(),
            lumobjs: Vec::new(),
        }
    }

    /// Default floor and ceiling heights.
    pub fn heights(mut self, floor: f32, ceiling: f32) -> Self {
        self.floor = floor;
        self.ceiling = ceiling;
        self
    }

    /// Override the plane heights of one sector.
    pub fn sector_heights(mut self, sector: u32, floor: f32, ceiling: f32) -> Self {
        self.heights.push((sector, floor, ceiling));
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    pub fn states(mut self, states: StateTable) -> Self {
        self.states = states;
        self
    }

    pub fn polyobj(mut self, pos: Vec2) -> Self {
        self.polyobjs.push(pos);
        self
    }

    pub fn lumobj(mut self, origin: DVec3, radius: f64, omni: bool) -> Self {
        self.lumobjs.push((origin, radius, omni));
        self
    }

    /// Sector index of grid position `(column, row)`.
    #[inline]
    pub fn sector_index(&self, column: u32, row: u32) -> u32 {
        row * self.columns + column
    }

    pub fn build(self, cell_size: f64) -> Result<World, MapError> {
        let s = self.sector_size;
        let bounds = Bounds::new(0.0, 0.0, f64::from(self.columns) * s, f64::from(self.rows) * s);
        let mut world = World::new(bounds, cell_size)?;
        world.materials = self.materials.clone();
        world.states = self.states.clone();

        for row in 0..self.rows {
            for column in 0..self.columns {
                let x0 = f64::from(column) * s;
                let y0 = f64::from(row) * s;
                let mut sector = Sector {
                    light_level: 1.0,
                    rgb: [1.0; 3],
                    bounds: Bounds::new(x0, y0, x0 + s, y0 + s),
                    ..Default::default()
                };
                for (plane, height) in [(PLANE_FLOOR, self.floor), (PLANE_CEILING, self.ceiling)] {
                    let p = &mut sector.planes[plane];
                    p.height = height;
                    p.target = height;
                    p.surface.material = Some(FLAT_MATERIAL);
                }
                world.sectors.push(sector);
                self.push_leaf(&mut world, column, row);
            }
        }

        for &(index, floor, ceiling) in &self.heights {
            let sector = world
                .sectors
                .get_mut(index as usize)
                .ok_or(MapError::UnknownSector(index))?;
            sector.planes[PLANE_FLOOR].height = floor;
            sector.planes[PLANE_FLOOR].target = floor;
            sector.planes[PLANE_CEILING].height = ceiling;
            sector.planes[PLANE_CEILING].target = ceiling;
        }

        for row in 0..self.rows {
            for column in 0..self.columns {
                let a = self.sector_index(column, row);
                if column == 0 {
                    outer_line(&mut world, a, LEFT);
                }
                if row == 0 {
                    outer_line(&mut world, a, BOTTOM);
                }
                if column + 1 < self.columns {
                    let b = self.sector_index(column + 1, row);
                    // front faces +x, the right-hand leaf
                    join(&mut world, b, LEFT, a, RIGHT);
                } else {
                    outer_line(&mut world, a, RIGHT);
                }
                if row + 1 < self.rows {
                    let b = self.sector_index(column, row + 1);
                    // front faces -y, the lower leaf
                    join(&mut world, a, TOP, b, BOTTOM);
                } else {
                    outer_line(&mut world, a, TOP);
                }
            }
        }

        for pos in &self.polyobjs {
            world.polyobjs.push(Polyobj { pos: *pos, dest: *pos, ..Default::default() });
        }
        for &(origin, radius, omni) in &self.lumobjs {
            let leaf = world.leaf_at_point(origin.truncate());
            world.lumobjs.push(Lumobj { origin, radius, omni, leaf });
        }
        Ok(world)
    }

    fn push_leaf(&self, world: &mut World, column: u32, row: u32) {
        let s = self.sector_size;
        let leaf = world.leaves.len() as u32;
        let x0 = f64::from(column) * s;
        let y0 = f64::from(row) * s;
        let (x1, y1) = (x0 + s, y0 + s);
        let corners = [
            DVec2::new(x0, y0),
            DVec2::new(x0, y1),
            DVec2::new(x1, y1),
            DVec2::new(x1, y0),
        ];
        let mut hedges = Vec::with_capacity(4);
        for i in 0..4 {
            hedges.push(world.hedges.len() as u32);
            world.hedges.push(HEdge::new(corners[i], corners[(i + 1) % 4], leaf));
        }
        world.leaves.push(BspLeaf {
            aabb: Bounds::new(x0, y0, x1, y1),
            sector: self.sector_index(column, row),
            hedges,
        });
    }
}

fn push_side(world: &mut World, sector: u32, middle: Option<MaterialId>) -> u32 {
    let mut side = Side { sector, ..Default::default() };
    side.sections[SECTION_MIDDLE].material = middle;
    if middle.is_none() {
        side.sections[SECTION_TOP].material = Some(WALL_MATERIAL);
        side.sections[SECTION_BOTTOM].material = Some(WALL_MATERIAL);
    }
    world.sides.push(side);
    (world.sides.len() - 1) as u32
}

fn outer_line(world: &mut World, leaf: u32, edge: usize) {
    let hedge = world.leaves[leaf as usize].hedges[edge];
    let sector = world.leaves[leaf as usize].sector;
    let side = push_side(world, sector, Some(WALL_MATERIAL));
    let line = world.lines.len() as u32;
    let h = &mut world.hedges[hedge as usize];
    h.line = Some(line);
    h.line_back = false;
    let (v1, v2) = (h.v1, h.v2);
    world.lines.push(Line { v1, v2, flags: LINE_BLOCKING, front: Some(side), back: None });
}

/// Join the `front_edge` of leaf `front` with the `back_edge` of leaf `back`
/// through one two-sided line running along the front half-edge.
fn join(world: &mut World, front: u32, front_edge: usize, back: u32, back_edge: usize) {
    let fh = world.leaves[front as usize].hedges[front_edge];
    let bh = world.leaves[back as usize].hedges[back_edge];
    let (front_sector, back_sector) =
        (world.leaves[front as usize].sector, world.leaves[back as usize].sector);
    let front_side = push_side(world, front_sector, None);
    let back_side = push_side(world, back_sector, None);
    let line = world.lines.len() as u32;
    let (v1, v2) = (world.hedges[fh as usize].v1, world.hedges[fh as usize].v2);
    world.lines.push(Line {
        v1,
        v2,
        flags: LINE_TWO_SIDED,
        front: Some(front_side),
        back: Some(back_side),
    });
    for (h, twin, back) in [(fh, bh, false), (bh, fh, true)] {
        let hedge = &mut world.hedges[h as usize];
        hedge.twin = Some(twin);
        hedge.line = Some(line);
        hedge.line_back = back;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_topology() {
        let world = MapBuilder::new(3, 2, 64.0).build(64.0).unwrap();
        assert_eq!(world.sectors.len(), 6);
        assert_eq!(world.leaves.len(), 6);
        assert_eq!(world.hedges.len(), 24);
        // 7 interior edges, 10 outer edges
        assert_eq!(world.lines.len(), 17);
        assert_eq!(world.sides.len(), 24);
        let twinned = world.hedges.iter().filter(|h| h.twin.is_some()).count();
        assert_eq!(twinned, 14);
        assert!(world.hedges.iter().all(|h| h.line.is_some()));
    }

    #[test]
    fn test_twins_are_reversed() {
        let world = MapBuilder::new(2, 2, 64.0).build(64.0).unwrap();
        for (i, h) in world.hedges.iter().enumerate() {
            if let Some(t) = h.twin {
                let twin = &world.hedges[t as usize];
                assert_eq!(twin.twin, Some(i as u32));
                assert_eq!((twin.v1, twin.v2), (h.v2, h.v1));
                assert_ne!(twin.leaf, h.leaf);
                assert_ne!(twin.line_back, h.line_back);
            }
        }
    }

    #[test]
    fn test_leaf_is_right_of_hedges() {
        let world = MapBuilder::new(2, 1, 64.0).build(64.0).unwrap();
        for leaf in &world.leaves {
            let c = DVec2::new(leaf.aabb.center_x(), leaf.aabb.center_y());
            for &h in &leaf.hedges {
                assert!(world.hedges[h as usize].signed_distance(c) > 0.0);
            }
        }
    }

    #[test]
    fn test_line_sides_face_their_sectors() {
        let world = MapBuilder::new(2, 1, 64.0).build(64.0).unwrap();
        for h in &world.hedges {
            let line = &world.lines[h.line.unwrap() as usize];
            let side = line.side(h.line_back).unwrap();
            assert_eq!(world.sides[side as usize].sector, world.leaves[h.leaf as usize].sector);
        }
    }

    #[test]
    fn test_overrides_and_extras() {
        let world = MapBuilder::new(2, 1, 64.0)
            .sector_heights(1, 0.0, 0.0)
            .polyobj(Vec2::new(32.0, 32.0))
            .lumobj(DVec3::new(100.0, 10.0, 40.0), 96.0, true)
            .build(64.0)
            .unwrap();
        assert_eq!(world.sectors[1].ceiling_height(), 0.0);
        assert_eq!(world.polyobjs.len(), 1);
        assert_eq!(world.lumobjs[0].leaf, Some(1));
        assert!(matches!(
            MapBuilder::new(1, 1, 64.0).sector_heights(5, 0.0, 0.0).build(64.0),
            Err(MapError::UnknownSector(5))
        ));
    }
}
