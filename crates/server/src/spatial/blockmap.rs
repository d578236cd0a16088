//! Uniform grid over map space linking objects into per-cell rings.
//!
//! Unlinking tombstones the ring slot instead of removing it, and the next
//! link into the same cell reuses the first tombstone. Objects that move
//! between cells every tick therefore stop allocating once their rings have
//! grown to size.

use std::ops::ControlFlow;

use super::bounds::Bounds;
use super::gridmap::{GridBlock, GridCell, Gridmap};
use crate::error::MapError;

#[derive(Debug, Clone)]
struct CellData<T> {
    ring: Vec<Option<T>>,
    object_count: u32,
}

impl<T> Default for CellData<T> {
    fn default() -> Self {
        Self { ring: Vec::new(), object_count: 0 }
    }
}

impl<T: Copy + PartialEq> CellData<T> {
    fn link(&mut self, obj: T) -> bool {
        if self.ring.iter().flatten().any(|o| *o == obj) {
            return false;
        }
        match self.ring.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(obj),
            None => self.ring.push(Some(obj)),
        }
        self.object_count += 1;
        true
    }

    fn unlink(&mut self, obj: T) -> bool {
        match self.ring.iter_mut().find(|slot| **slot == Some(obj)) {
            Some(slot) => {
                *slot = None;
                self.object_count -= 1;
                true
            }
            None => false,
        }
    }

    fn unlink_all(&mut self) -> usize {
        let n = self.object_count as usize;
        self.ring.iter_mut().for_each(|slot| *slot = None);
        self.object_count = 0;
        n
    }

    fn iterate<B>(&self, f: &mut impl FnMut(T) -> ControlFlow<B>) -> ControlFlow<B> {
        for obj in self.ring.iter().flatten() {
            f(*obj)?;
        }
        ControlFlow::Continue(())
    }
}

#[derive(Debug, Clone)]
pub struct Blockmap<T> {
    bounds: Bounds,
    cell_width: f64,
    cell_height: f64,
    grid: Gridmap<CellData<T>>,
}

impl<T: Copy + PartialEq> Blockmap<T> {
    /// Blockmap over `bounds` with cells of `cell_width` x `cell_height`.
    pub fn new(bounds: Bounds, cell_width: f64, cell_height: f64) -> Result<Self, MapError> {
        if !(cell_width > 0.0 && cell_height > 0.0) {
            return Err(MapError::InvalidCellSize(cell_width, cell_height));
        }
        if !(bounds.max_x > bounds.min_x && bounds.max_y > bounds.min_y) {
            return Err(MapError::InvalidBounds {
                min_x: bounds.min_x,
                min_y: bounds.min_y,
                max_x: bounds.max_x,
                max_y: bounds.max_y,
            });
        }
        let w = (bounds.width() / cell_width).ceil();
        let h = (bounds.height() / cell_height).ceil();
        if w > f64::from(u32::MAX) || h > f64::from(u32::MAX) {
            return Err(MapError::GridDimensions(w as u64, h as u64));
        }
        Ok(Self {
            bounds,
            cell_width,
            cell_height,
            grid: Gridmap::new(w as u32, h as u32)?,
        })
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    pub fn cell_size(&self) -> (f64, f64) {
        (self.cell_width, self.cell_height)
    }

    /// Width in cells.
    #[inline]
    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    /// Height in cells.
    #[inline]
    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    fn clip_axis(v: f64, min: f64, max: f64, cell: f64, out: &mut u32) -> bool {
        let mut v = v;
        let mut adjusted = false;
        if v < min {
            v = min;
            adjusted = true;
        } else if v >= max {
            v = max - 1.0;
            adjusted = true;
        }
        *out = ((v - min) / cell) as u32;
        adjusted
    }

    /// Column of map x. Returns true if x lay outside the bounds.
    pub fn clip_cell_x(&self, out: &mut u32, x: f64) -> bool {
        Self::clip_axis(x, self.bounds.min_x, self.bounds.max_x, self.cell_width, out)
    }

    /// Row of map y. Returns true if y lay outside the bounds.
    pub fn clip_cell_y(&self, out: &mut u32, y: f64) -> bool {
        Self::clip_axis(y, self.bounds.min_y, self.bounds.max_y, self.cell_height, out)
    }

    /// Cell containing a map point, clamped to the grid. The flag reports
    /// whether clamping happened.
    pub fn cell(&self, x: f64, y: f64) -> (GridCell, bool) {
        let mut cell = GridCell::default();
        let ax = self.clip_cell_x(&mut cell.x, x);
        let ay = self.clip_cell_y(&mut cell.y, y);
        let ac = self.grid.clip_cell(&mut cell);
        (cell, ax | ay | ac)
    }

    /// Cells touched by a map-space box, clamped to the grid.
    pub fn cell_block(&self, b: &Bounds) -> (GridBlock, bool) {
        let (min, a) = self.cell(b.min_x, b.min_y);
        let (max, c) = self.cell(b.max_x, b.max_y);
        (GridBlock::new(min, max), a | c)
    }

    /// Link `obj` into `cell`. Returns false if it was already linked there.
    pub fn link(&mut self, cell: GridCell, obj: T) -> bool {
        let mut cell = cell;
        self.grid.clip_cell(&mut cell);
        match self.grid.get_or_insert_with(cell, CellData::default) {
            Some(data) => data.link(obj),
            None => false,
        }
    }

    /// Link `obj` into every cell of `block`. Returns how many links were made.
    pub fn link_in_block(&mut self, block: GridBlock, obj: T) -> usize {
        let mut block = block;
        self.grid.clip_block(&mut block);
        block.cells().filter(|cell| self.link(*cell, obj)).count()
    }

    pub fn unlink(&mut self, cell: GridCell, obj: T) -> bool {
        let mut cell = cell;
        self.grid.clip_cell(&mut cell);
        self.grid.cell_mut(cell).is_some_and(|data| data.unlink(obj))
    }

    /// Unlink `obj` from every cell of `block`. Returns how many cells held it.
    pub fn unlink_in_block(&mut self, block: GridBlock, obj: T) -> usize {
        let mut n = 0;
        let _ = self.grid.block_iterate_mut::<()>(block, |_, data| {
            n += usize::from(data.unlink(obj));
            ControlFlow::Continue(())
        });
        n
    }

    /// Empty `cell`. Returns the number of objects unlinked.
    pub fn unlink_all(&mut self, cell: GridCell) -> usize {
        let mut cell = cell;
        self.grid.clip_cell(&mut cell);
        self.grid.cell_mut(cell).map_or(0, |data| data.unlink_all())
    }

    pub fn unlink_all_in_block(&mut self, block: GridBlock) -> usize {
        let mut n = 0;
        let _ = self.grid.block_iterate_mut::<()>(block, |_, data| {
            n += data.unlink_all();
            ControlFlow::Continue(())
        });
        n
    }

    /// Empty every cell. Ring storage is kept.
    pub fn clear(&mut self) {
        let _ = self.grid.iterate_mut::<()>(|_, data| {
            data.unlink_all();
            ControlFlow::Continue(())
        });
    }

    pub fn cell_object_count(&self, cell: GridCell) -> u32 {
        let mut cell = cell;
        self.grid.clip_cell(&mut cell);
        self.grid.cell(cell).map_or(0, |data| data.object_count)
    }

    /// Visit the objects linked into `cell`.
    pub fn iterate_cell_objects<B>(
        &self,
        cell: GridCell,
        mut f: impl FnMut(T) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut cell = cell;
        self.grid.clip_cell(&mut cell);
        match self.grid.cell(cell) {
            Some(data) => data.iterate(&mut f),
            None => ControlFlow::Continue(()),
        }
    }

    /// Visit the objects of every cell in `block`. An object linked into
    /// several cells is visited once per cell.
    pub fn iterate_block_objects<B>(
        &self,
        block: GridBlock,
        mut f: impl FnMut(T) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        self.grid.block_iterate(block, |_, data| data.iterate(&mut f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn square_map(size: f64, cell: f64) -> Blockmap<u32> {
        Blockmap::new(Bounds::new(0.0, 0.0, size, size), cell, cell).unwrap()
    }

    #[test]
    fn test_blockmap_4x4_link() {
        let mut bm = square_map(256.0, 64.0);
        assert_eq!((bm.width(), bm.height()), (4, 4));
        let obj1 = 1u32;
        assert!(bm.link(GridCell::new(1, 1), obj1));
        assert_eq!(bm.cell_object_count(GridCell::new(1, 1)), 1);
        assert_eq!(bm.cell_object_count(GridCell::new(0, 0)), 0);
    }

    #[test]
    fn test_invalid_construction() {
        let b = Bounds::new(0.0, 0.0, 64.0, 64.0);
        assert!(matches!(Blockmap::<u32>::new(b, 0.0, 8.0), Err(MapError::InvalidCellSize(..))));
        assert!(matches!(
            Blockmap::<u32>::new(Bounds::new(0.0, 0.0, 0.0, 10.0), 8.0, 8.0),
            Err(MapError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_cell_clamps() {
        let bm = Blockmap::<u32>::new(Bounds::new(-128.0, -128.0, 128.0, 72.0), 64.0, 64.0).unwrap();
        assert_eq!((bm.width(), bm.height()), (4, 4));
        assert_eq!(bm.cell(-128.0, -128.0), (GridCell::new(0, 0), false));
        assert_eq!(bm.cell(10.0, 0.0), (GridCell::new(2, 2), false));
        assert_eq!(bm.cell(-500.0, 500.0), (GridCell::new(0, 3), true));
        assert_eq!(bm.cell(128.0, 71.5), (GridCell::new(3, 3), true));
    }

    #[test]
    fn test_link_is_idempotent_and_reuses_tombstones() {
        let mut bm = square_map(128.0, 64.0);
        let c = GridCell::new(0, 1);
        assert!(bm.link(c, 1));
        assert!(!bm.link(c, 1));
        assert!(bm.link(c, 2));
        assert_eq!(bm.cell_object_count(c), 2);
        assert!(bm.unlink(c, 1));
        assert!(!bm.unlink(c, 1));
        assert!(bm.link(c, 3));
        let mut seen = Vec::new();
        let _ = bm.iterate_cell_objects::<()>(c, |o| {
            seen.push(o);
            ControlFlow::Continue(())
        });
        // 3 took the slot 1 left behind
        assert_eq!(seen, vec![3, 2]);
    }

    #[test]
    fn test_out_of_range_operates_on_edge_cell() {
        let mut bm = square_map(128.0, 64.0);
        assert!(bm.link(GridCell::new(40, 40), 9));
        assert_eq!(bm.cell_object_count(GridCell::new(1, 1)), 1);
        assert!(bm.unlink(GridCell::new(7, 7), 9));
    }

    #[test]
    fn test_block_operations() {
        let mut bm = square_map(256.0, 64.0);
        let (block, adjusted) = bm.cell_block(&Bounds::new(10.0, 10.0, 140.0, 70.0));
        assert!(!adjusted);
        assert_eq!(block, GridBlock::new(GridCell::new(0, 0), GridCell::new(2, 1)));
        assert_eq!(bm.link_in_block(block, 4), 6);
        bm.link(GridCell::new(3, 3), 5);

        let mut visits = 0;
        let _ = bm.iterate_block_objects::<()>(GridBlock::new(GridCell::new(0, 0), GridCell::new(3, 3)), |_| {
            visits += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(visits, 7);

        let found = bm.iterate_block_objects(block, |o| {
            if o == 4 { ControlFlow::Break(o) } else { ControlFlow::Continue(()) }
        });
        assert_eq!(found, ControlFlow::Break(4));

        assert_eq!(bm.unlink_in_block(block, 4), 6);
        assert_eq!(bm.unlink_all_in_block(GridBlock::new(GridCell::new(0, 0), GridCell::new(3, 3))), 1);
        assert_eq!(bm.cell_object_count(GridCell::new(3, 3)), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Link(u32, u32, u32),
        Unlink(u32, u32, u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..4, 0u32..4, 0u32..12).prop_map(|(x, y, o)| Op::Link(x, y, o)),
            (0u32..4, 0u32..4, 0u32..12).prop_map(|(x, y, o)| Op::Unlink(x, y, o)),
        ]
    }

    proptest! {
        #[test]
        fn prop_link_unlink_consistency(ops in prop::collection::vec(op_strategy(), 1..128)) {
            let mut bm = square_map(256.0, 64.0);
            let mut model: std::collections::HashMap<GridCell, std::collections::BTreeSet<u32>> =
                Default::default();
            for op in ops {
                match op {
                    Op::Link(x, y, o) => {
                        let cell = GridCell::new(x, y);
                        let fresh = model.entry(cell).or_default().insert(o);
                        prop_assert_eq!(bm.link(cell, o), fresh);
                    }
                    Op::Unlink(x, y, o) => {
                        let cell = GridCell::new(x, y);
                        let had = model.entry(cell).or_default().remove(&o);
                        prop_assert_eq!(bm.unlink(cell, o), had);
                    }
                }
            }
            for (cell, objs) in &model {
                prop_assert_eq!(bm.cell_object_count(*cell) as usize, objs.len());
                let mut seen = Vec::new();
                let _ = bm.iterate_cell_objects::<()>(*cell, |o| {
                    seen.push(o);
                    ControlFlow::Continue(())
                });
                seen.sort_unstable();
                prop_assert_eq!(seen, objs.iter().copied().collect::<Vec<_>>());
            }
        }
    }
}
