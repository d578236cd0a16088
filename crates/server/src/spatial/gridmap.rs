//! Sparse 2D grid of user values backed by a region quadtree.
//!
//! The tree covers a square of `ceil_pow2(max(width, height))` cells but only
//! `[0, width) x [0, height)` is addressable. Subtrees are allocated on the
//! first write into a cell and live until the gridmap is dropped. Nodes are
//! kept in an arena and refer to their children by index.

use std::ops::ControlFlow;

use crate::error::MapError;

/// Cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
}

impl GridCell {
    #[inline]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridBlock {
    pub min: GridCell,
    pub max: GridCell,
}

impl GridBlock {
    #[inline]
    pub const fn new(min: GridCell, max: GridCell) -> Self {
        Self { min, max }
    }

    /// Iterate every cell row by row.
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + use<> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| GridCell::new(x, y)))
    }
}

const TOP_LEFT: usize = 0;
const TOP_RIGHT: usize = 1;
const BOTTOM_LEFT: usize = 2;
const BOTTOM_RIGHT: usize = 3;

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Branch([Option<usize>; 4]),
    Leaf(Option<T>),
}

#[derive(Debug, Clone)]
struct Node<T> {
    origin: GridCell,
    size: u32,
    kind: NodeKind<T>,
}

impl<T> Node<T> {
    fn new(origin: GridCell, size: u32) -> Self {
        let kind = if size == 1 {
            NodeKind::Leaf(None)
        } else {
            NodeKind::Branch([None; 4])
        };
        Self { origin, size, kind }
    }

    /// Child slot holding `cell`, plus that child's origin.
    #[inline]
    fn quadrant(&self, cell: GridCell) -> (usize, GridCell) {
        let half = self.size >> 1;
        let left = cell.x < self.origin.x + half;
        let top = cell.y < self.origin.y + half;
        let x = if left { self.origin.x } else { self.origin.x + half };
        let y = if top { self.origin.y } else { self.origin.y + half };
        let slot = match (left, top) {
            (true, true) => TOP_LEFT,
            (false, true) => TOP_RIGHT,
            (true, false) => BOTTOM_LEFT,
            (false, false) => BOTTOM_RIGHT,
        };
        (slot, GridCell::new(x, y))
    }
}

/// What [`Gridmap::traverse`] hands its visitor.
#[derive(Debug)]
pub struct NodeView<'a, T> {
    pub origin: GridCell,
    pub size: u32,
    /// Set for leaves, `None` for branches and empty leaves.
    pub value: Option<&'a T>,
}

impl<T> NodeView<'_, T> {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.size == 1
    }
}

#[derive(Debug, Clone)]
pub struct Gridmap<T> {
    width: u32,
    height: u32,
    nodes: Vec<Node<T>>,
}

impl<T> Gridmap<T> {
    /// An empty gridmap of `width` x `height` cells.
    pub fn new(width: u32, height: u32) -> Result<Self, MapError> {
        let dim = width.max(height);
        if width == 0 || height == 0 {
            return Err(MapError::GridDimensions(u64::from(width), u64::from(height)));
        }
        let size = dim
            .checked_next_power_of_two()
            .ok_or(MapError::GridDimensions(u64::from(width), u64::from(height)))?;
        Ok(Self {
            width,
            height,
            nodes: vec![Node::new(GridCell::default(), size)],
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Edge length of the allocated square.
    #[inline]
    pub fn tree_size(&self) -> u32 {
        self.nodes[0].size
    }

    /// Number of allocated nodes, the root included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn in_range(&self, cell: GridCell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// Clamp `cell` into range. Returns true if it was adjusted.
    pub fn clip_cell(&self, cell: &mut GridCell) -> bool {
        let mut adjusted = false;
        if cell.x >= self.width {
            cell.x = self.width - 1;
            adjusted = true;
        }
        if cell.y >= self.height {
            cell.y = self.height - 1;
            adjusted = true;
        }
        adjusted
    }

    /// Clamp both corners of `block` into range. Returns true if either was
    /// adjusted.
    pub fn clip_block(&self, block: &mut GridBlock) -> bool {
        let a = self.clip_cell(&mut block.min);
        let b = self.clip_cell(&mut block.max);
        a | b
    }

    fn find_leaf(&self, cell: GridCell) -> Option<usize> {
        if !self.in_range(cell) {
            return None;
        }
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            match &node.kind {
                NodeKind::Leaf(_) => return Some(idx),
                NodeKind::Branch(children) => {
                    let (slot, _) = node.quadrant(cell);
                    idx = children[slot]?;
                }
            }
        }
    }

    fn find_or_alloc_leaf(&mut self, cell: GridCell) -> usize {
        let mut idx = 0;
        loop {
            let (slot, origin, size) = {
                let node = &self.nodes[idx];
                match &node.kind {
                    NodeKind::Leaf(_) => return idx,
                    NodeKind::Branch(children) => {
                        let (slot, origin) = node.quadrant(cell);
                        if let Some(child) = children[slot] {
                            idx = child;
                            continue;
                        }
                        (slot, origin, node.size >> 1)
                    }
                }
            };
            let child = self.nodes.len();
            self.nodes.push(Node::new(origin, size));
            if let NodeKind::Branch(children) = &mut self.nodes[idx].kind {
                children[slot] = Some(child);
            }
            idx = child;
        }
    }

    /// True if a leaf has been allocated for `cell`.
    pub fn leaf_at_cell(&self, cell: GridCell) -> bool {
        self.find_leaf(cell).is_some()
    }

    /// Value stored at `cell`. `None` when unpopulated or out of range.
    pub fn cell(&self, cell: GridCell) -> Option<&T> {
        let idx = self.find_leaf(cell)?;
        match &self.nodes[idx].kind {
            NodeKind::Leaf(value) => value.as_ref(),
            NodeKind::Branch(_) => None,
        }
    }

    pub fn cell_mut(&mut self, cell: GridCell) -> Option<&mut T> {
        let idx = self.find_leaf(cell)?;
        match &mut self.nodes[idx].kind {
            NodeKind::Leaf(value) => value.as_mut(),
            NodeKind::Branch(_) => None,
        }
    }

    /// Store `value` at `cell`, allocating the path to it. Returns the
    /// previous value. Out-of-range cells are ignored.
    pub fn set_cell(&mut self, cell: GridCell, value: T) -> Option<T> {
        debug_assert!(self.in_range(cell), "cell {cell:?} out of range");
        if !self.in_range(cell) {
            return None;
        }
        let idx = self.find_or_alloc_leaf(cell);
        match &mut self.nodes[idx].kind {
            NodeKind::Leaf(slot) => slot.replace(value),
            NodeKind::Branch(_) => None,
        }
    }

    /// Value at `cell`, created with `f` if the cell is unpopulated.
    pub fn get_or_insert_with(&mut self, cell: GridCell, f: impl FnOnce() -> T) -> Option<&mut T> {
        debug_assert!(self.in_range(cell), "cell {cell:?} out of range");
        if !self.in_range(cell) {
            return None;
        }
        let idx = self.find_or_alloc_leaf(cell);
        match &mut self.nodes[idx].kind {
            NodeKind::Leaf(slot) => Some(slot.get_or_insert_with(f)),
            NodeKind::Branch(_) => None,
        }
    }

    /// Visit every populated cell in allocation order.
    pub fn iterate<B>(&self, mut f: impl FnMut(GridCell, &T) -> ControlFlow<B>) -> ControlFlow<B> {
        for node in &self.nodes {
            if let NodeKind::Leaf(Some(value)) = &node.kind {
                f(node.origin, value)?;
            }
        }
        ControlFlow::Continue(())
    }

    pub fn iterate_mut<B>(
        &mut self,
        mut f: impl FnMut(GridCell, &mut T) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        for node in &mut self.nodes {
            if let NodeKind::Leaf(Some(value)) = &mut node.kind {
                f(node.origin, value)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Visit every populated cell of `block` (clipped first), row by row.
    pub fn block_iterate<B>(
        &self,
        block: GridBlock,
        mut f: impl FnMut(GridCell, &T) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut block = block;
        self.clip_block(&mut block);
        for cell in block.cells() {
            if let Some(value) = self.cell(cell) {
                f(cell, value)?;
            }
        }
        ControlFlow::Continue(())
    }

    pub fn block_iterate_mut<B>(
        &mut self,
        block: GridBlock,
        mut f: impl FnMut(GridCell, &mut T) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut block = block;
        self.clip_block(&mut block);
        for cell in block.cells() {
            if let Some(value) = self.cell_mut(cell) {
                f(cell, value)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Pre-order walk of the tree. With `leaf_only` branches are not visited.
    pub fn traverse<B>(
        &self,
        leaf_only: bool,
        mut f: impl FnMut(NodeView<'_, T>) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            match &node.kind {
                NodeKind::Leaf(value) => {
                    f(NodeView { origin: node.origin, size: node.size, value: value.as_ref() })?;
                }
                NodeKind::Branch(children) => {
                    if !leaf_only {
                        f(NodeView { origin: node.origin, size: node.size, value: None })?;
                    }
                    stack.extend(children.iter().rev().flatten());
                }
            }
        }
        ControlFlow::Continue(())
    }
}
