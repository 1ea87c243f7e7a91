//! 3D block packer for the brick texture atlas
//!
//! The atlas is modelled as a fixed integer grid of cells (one cell holds one
//! brick). Blocks are axis-aligned sub-regions of that grid. Two grids are
//! maintained:
//! - a flat occupancy grid mapping each cell to its owning block (or free)
//! - a coarse usage grid counting occupied cells per `COARSE_CELL`³ super-cell,
//!   used to skip regions that cannot hold the requested block

use crate::core::types::{UVec3, Vec3};
use crate::math::Aabb;

/// Occupancy value of a cell that no block owns
pub const FREE_CELL: u32 = u32::MAX;

/// Edge length (in cells) of a coarse usage super-cell
pub const COARSE_CELL: u32 = 4;

/// Handle of an allocated atlas block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// An allocated region of the atlas
#[derive(Clone, Debug, PartialEq)]
pub struct TextureBlock {
    /// First cell of the block
    pub min: UVec3,
    /// One past the last cell of the block
    pub max: UVec3,
    /// World-space box whose data lives in this block
    pub world_box: Aabb,
    /// Static content changed since the renderer last consumed it
    pub dirty_static: bool,
    /// Dynamic content changed since the renderer last consumed it
    pub dirty_dynamic: bool,
}

impl TextureBlock {
    /// Block extent in cells
    pub fn size(&self) -> UVec3 {
        self.max - self.min
    }

    /// Number of cells covered
    pub fn volume(&self) -> u32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Linear cell index of the block origin inside a grid of `grid` cells
    pub fn atlas_offset(&self, grid: UVec3) -> u32 {
        self.min.x + self.min.y * grid.x + self.min.z * grid.x * grid.y
    }

    /// Block footprint in normalized [0, 1] texture coordinates
    pub fn texture_box(&self, grid: UVec3) -> Aabb {
        let grid = grid.as_vec3();
        Aabb::new(self.min.as_vec3() / grid, self.max.as_vec3() / grid)
    }
}

/// Bin packer over a fixed 3D cell grid
#[derive(Debug)]
pub struct TextureBlockPacker3D {
    dim: UVec3,
    coarse_dim: UVec3,
    occupancy: Vec<u32>,
    usage: Vec<u32>,
    blocks: Vec<Option<TextureBlock>>,
    used_cells: u32,
    live_blocks: u32,
}

impl TextureBlockPacker3D {
    /// Create an empty packer over `dim` cells
    pub fn new(dim: UVec3) -> Self {
        let coarse_dim = (dim + UVec3::splat(COARSE_CELL - 1)) / COARSE_CELL;
        Self {
            dim,
            coarse_dim,
            occupancy: vec![FREE_CELL; (dim.x * dim.y * dim.z) as usize],
            usage: vec![0; (coarse_dim.x * coarse_dim.y * coarse_dim.z) as usize],
            blocks: Vec::new(),
            used_cells: 0,
            live_blocks: 0,
        }
    }

    /// Grid dimensions in cells
    pub fn dim(&self) -> UVec3 {
        self.dim
    }

    /// Total number of cells
    pub fn capacity(&self) -> u32 {
        self.dim.x * self.dim.y * self.dim.z
    }

    /// Number of cells not owned by any block
    pub fn free_cells(&self) -> u32 {
        self.capacity() - self.used_cells
    }

    /// Number of live blocks
    pub fn live_blocks(&self) -> u32 {
        self.live_blocks
    }

    /// Fraction of cells in use (0.0 - 1.0)
    pub fn utilization(&self) -> f32 {
        if self.capacity() == 0 {
            return 0.0;
        }
        self.used_cells as f32 / self.capacity() as f32
    }

    /// Allocate a `width` x `height` x `depth` block.
    ///
    /// Returns `None` when no free region exists; the grids are left untouched
    /// and the caller is expected to retry after an eviction pass.
    pub fn add_block(&mut self, width: u32, height: u32, depth: u32, world_box: Aabb) -> Option<BlockId> {
        let size = UVec3::new(width, height, depth);
        debug_assert!(size.min_element() > 0, "zero-sized atlas block requested");
        if size.min_element() == 0 || size.x > self.dim.x || size.y > self.dim.y || size.z > self.dim.z {
            return None;
        }

        let volume = width * height * depth;
        if volume > self.free_cells() {
            return None;
        }

        let position = self.find_free_region(size, volume)?;
        let id = self.claim_slot();
        self.fill_region(position, size, id.0);
        self.blocks[id.0 as usize] = Some(TextureBlock {
            min: position,
            max: position + size,
            world_box,
            dirty_static: false,
            dirty_dynamic: false,
        });
        self.used_cells += volume;
        self.live_blocks += 1;

        log::trace!("Atlas block {:?} allocated at {} ({}x{}x{})", id, position, width, height, depth);
        Some(id)
    }

    /// Free a block and clear exactly its footprint
    pub fn remove_block(&mut self, id: BlockId) {
        let Some(block) = self.blocks.get_mut(id.0 as usize).and_then(Option::take) else {
            debug_assert!(false, "atlas block {:?} freed twice or never allocated", id);
            return;
        };

        self.fill_region(block.min, block.size(), FREE_CELL);
        self.used_cells -= block.volume();
        self.live_blocks -= 1;
        log::trace!("Atlas block {:?} freed", id);
    }

    /// Block description, or `None` if the id is not in use
    pub fn get_block_info(&self, id: BlockId) -> Option<&TextureBlock> {
        self.blocks.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Mutable block description (dirty flags)
    pub fn get_block_info_mut(&mut self, id: BlockId) -> Option<&mut TextureBlock> {
        self.blocks.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Owner of a cell, if any
    pub fn block_at(&self, cell: UVec3) -> Option<BlockId> {
        if cell.cmpge(self.dim).any() {
            return None;
        }
        match self.occupancy[self.cell_index(cell)] {
            FREE_CELL => None,
            id => Some(BlockId(id)),
        }
    }

    /// Iterate all live blocks
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &TextureBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BlockId(i as u32), b)))
    }

    /// Drop every block
    pub fn clear(&mut self) {
        self.occupancy.fill(FREE_CELL);
        self.usage.fill(0);
        self.blocks.clear();
        self.used_cells = 0;
        self.live_blocks = 0;
    }

    /// Size of one cell in normalized texture coordinates
    pub fn cell_texture_size(&self) -> Vec3 {
        Vec3::ONE / self.dim.as_vec3()
    }

    fn find_free_region(&self, size: UVec3, volume: u32) -> Option<UVec3> {
        // Aligned candidates never straddle super-cells when the block size
        // divides the super-cell size, so the usage count is a valid bound
        let prunable = COARSE_CELL % size.x == 0 && COARSE_CELL % size.y == 0 && COARSE_CELL % size.z == 0;

        for cz in 0..self.coarse_dim.z {
            for cy in 0..self.coarse_dim.y {
                for cx in 0..self.coarse_dim.x {
                    let coarse = UVec3::new(cx, cy, cz);
                    let cell_min = coarse * COARSE_CELL;
                    let cell_max = (cell_min + UVec3::splat(COARSE_CELL)).min(self.dim);
                    let extent = cell_max - cell_min;
                    let cell_volume = extent.x * extent.y * extent.z;

                    if prunable
                        && cell_volume.saturating_sub(self.usage[self.coarse_index(coarse)]) < volume
                    {
                        continue;
                    }

                    // Candidates are aligned to the block size so freed blocks
                    // of equal size are always found again
                    let start = UVec3::new(
                        cell_min.x.div_ceil(size.x) * size.x,
                        cell_min.y.div_ceil(size.y) * size.y,
                        cell_min.z.div_ceil(size.z) * size.z,
                    );
                    for z in (start.z..cell_max.z).step_by(size.z as usize) {
                        for y in (start.y..cell_max.y).step_by(size.y as usize) {
                            for x in (start.x..cell_max.x).step_by(size.x as usize) {
                                let pos = UVec3::new(x, y, z);
                                if (pos + size).cmpgt(self.dim).any() {
                                    continue;
                                }
                                if self.region_is_free(pos, size) {
                                    return Some(pos);
                                }
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn region_is_free(&self, pos: UVec3, size: UVec3) -> bool {
        for z in pos.z..pos.z + size.z {
            for y in pos.y..pos.y + size.y {
                let row = self.cell_index(UVec3::new(pos.x, y, z));
                if self.occupancy[row..row + size.x as usize].iter().any(|&c| c != FREE_CELL) {
                    return false;
                }
            }
        }
        true
    }

    fn fill_region(&mut self, pos: UVec3, size: UVec3, value: u32) {
        for z in pos.z..pos.z + size.z {
            for y in pos.y..pos.y + size.y {
                for x in pos.x..pos.x + size.x {
                    let cell = UVec3::new(x, y, z);
                    let idx = self.cell_index(cell);
                    let coarse = self.coarse_index(cell / COARSE_CELL);
                    if value == FREE_CELL {
                        debug_assert_ne!(self.occupancy[idx], FREE_CELL);
                        self.usage[coarse] -= 1;
                    } else {
                        debug_assert_eq!(self.occupancy[idx], FREE_CELL);
                        self.usage[coarse] += 1;
                    }
                    self.occupancy[idx] = value;
                }
            }
        }
    }

    fn claim_slot(&mut self) -> BlockId {
        match self.blocks.iter().position(Option::is_none) {
            Some(free) => BlockId(free as u32),
            None => {
                self.blocks.push(None);
                BlockId(self.blocks.len() as u32 - 1)
            }
        }
    }

    fn cell_index(&self, cell: UVec3) -> usize {
        (cell.x + cell.y * self.dim.x + cell.z * self.dim.x * self.dim.y) as usize
    }

    fn coarse_index(&self, coarse: UVec3) -> usize {
        (coarse.x + coarse.y * self.coarse_dim.x + coarse.z * self.coarse_dim.x * self.coarse_dim.y) as usize
    }

    #[cfg(test)]
    fn occupancy(&self) -> &[u32] {
        &self.occupancy
    }
}
