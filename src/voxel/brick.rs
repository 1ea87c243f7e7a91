//! N³ voxel brick holding running sums of surface attributes
//!
//! Every cell keeps the linear sums of color, normal, opacity and emittance
//! together with the number of triangle contributions folded into it. Texel
//! values are the sums divided by the count, quantized only when a channel is
//! packed for upload. Contributions are added or subtracted exactly, so
//! inserting a mesh and later removing the same snapshot restores the
//! previous cell values up to float rounding.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use glam::Vec3;
use half::f16;

use super::scratch::ScratchBuffer;
use crate::atlas::{AtlasChannel, TexelFormat};
use crate::streaming::VoxelBudget;

/// Linear cell index, x fastest
#[inline]
pub fn cell_index(x: u32, y: u32, z: u32, size: u32) -> usize {
    debug_assert!(x < size && y < size && z < size);
    (x + y * size + z * size * size) as usize
}

#[inline]
fn to_unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Per-cell sample storage
#[derive(Clone, Debug)]
pub struct BrickSamples {
    /// Summed linear RGB
    pub color_sum: Vec<Vec3>,
    /// Summed normals, each biased into [0, 1]
    pub normal_sum: Vec<Vec3>,
    pub opacity_sum: Vec<f32>,
    pub emittance_sum: Vec<Vec3>,
    /// Triangle contributions folded into each cell
    pub counts: Vec<u32>,
}

impl BrickSamples {
    fn new(cells: usize) -> Self {
        Self {
            color_sum: vec![Vec3::ZERO; cells],
            normal_sum: vec![Vec3::ZERO; cells],
            opacity_sum: vec![0.0; cells],
            emittance_sum: vec![Vec3::ZERO; cells],
            counts: vec![0; cells],
        }
    }

    fn byte_size(cells: usize) -> usize {
        cells * (12 + 12 + 4 + 12 + 4)
    }

    fn reset_cell(&mut self, c: usize) {
        self.color_sum[c] = Vec3::ZERO;
        self.normal_sum[c] = Vec3::ZERO;
        self.opacity_sum[c] = 0.0;
        self.emittance_sum[c] = Vec3::ZERO;
        self.counts[c] = 0;
    }

    #[inline]
    fn average3(&self, sums: &[Vec3], c: usize) -> [f32; 4] {
        match self.counts[c] {
            0 => [0.0; 4],
            n => {
                let v = (sums[c] / n as f32).clamp(Vec3::ZERO, Vec3::ONE);
                [v.x, v.y, v.z, 1.0]
            }
        }
    }

    /// Averaged albedo in [0, 1], alpha 1 for covered cells
    pub fn albedo_f32(&self, c: usize) -> [f32; 4] {
        self.average3(&self.color_sum, c)
    }

    pub fn normal_f32(&self, c: usize) -> [f32; 4] {
        self.average3(&self.normal_sum, c)
    }

    pub fn emittance_f32(&self, c: usize) -> [f32; 4] {
        self.average3(&self.emittance_sum, c)
    }

    pub fn opacity_f32(&self, c: usize) -> f32 {
        match self.counts[c] {
            0 => 0.0,
            n => (self.opacity_sum[c] / n as f32).clamp(0.0, 1.0),
        }
    }

    pub fn albedo(&self, c: usize) -> [u8; 4] {
        self.albedo_f32(c).map(to_unorm)
    }

    pub fn normal(&self, c: usize) -> [u8; 4] {
        self.normal_f32(c).map(to_unorm)
    }

    pub fn emittance(&self, c: usize) -> [u8; 4] {
        self.emittance_f32(c).map(to_unorm)
    }

    pub fn opacity(&self, c: usize) -> u8 {
        to_unorm(self.opacity_f32(c))
    }

    /// Texel bytes for one atlas channel, x fastest.
    ///
    /// Opacity is always single-channel 8-bit; the other brick channels are
    /// converted to `format`. The tree channel carries no brick data.
    pub fn pack_channel(&self, channel: AtlasChannel, format: TexelFormat) -> Vec<u8> {
        let cells = 0..self.counts.len();
        let average: fn(&Self, usize) -> [f32; 4] = match channel {
            AtlasChannel::Tree => return Vec::new(),
            AtlasChannel::Opacity => return cells.map(|c| self.opacity(c)).collect(),
            AtlasChannel::Albedo => Self::albedo_f32,
            AtlasChannel::Normal => Self::normal_f32,
            AtlasChannel::Emittance => Self::emittance_f32,
        };
        match format {
            TexelFormat::Rgba8Unorm => cells.flat_map(|c| average(self, c).map(to_unorm)).collect(),
            TexelFormat::R8Unorm => cells.map(|c| to_unorm(average(self, c)[0])).collect(),
            TexelFormat::Rgba16Float => {
                let texels: Vec<[f16; 4]> = cells.map(|c| average(self, c).map(f16::from_f32)).collect();
                bytemuck::cast_slice(&texels).to_vec()
            }
            TexelFormat::Rgba32Float => {
                let texels: Vec<[f32; 4]> = cells.map(|c| average(self, c)).collect();
                bytemuck::cast_slice(&texels).to_vec()
            }
        }
    }
}

/// Voxel brick owned by one octree node
#[derive(Debug)]
pub struct Brick {
    size: u32,
    samples: RwLock<BrickSamples>,
    covered: AtomicU32,
    budget: Arc<VoxelBudget>,
}

impl Brick {
    /// Allocate an empty brick and register it with the budget
    pub fn new(size: u32, budget: &Arc<VoxelBudget>) -> Self {
        let cells = (size as usize).pow(3);
        budget.add_brick(BrickSamples::byte_size(cells));
        Self {
            size,
            samples: RwLock::new(BrickSamples::new(cells)),
            covered: AtomicU32::new(0),
            budget: Arc::clone(budget),
        }
    }

    /// Allocate an empty brick if the budget has room for it
    pub fn try_new(size: u32, budget: &Arc<VoxelBudget>) -> Option<Self> {
        let cells = (size as usize).pow(3);
        if !budget.try_reserve(BrickSamples::byte_size(cells)) {
            return None;
        }
        Some(Self {
            size,
            samples: RwLock::new(BrickSamples::new(cells)),
            covered: AtomicU32::new(0),
            budget: Arc::clone(budget),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn cell_count(&self) -> usize {
        (self.size as usize).pow(3)
    }

    /// True once any cell has at least one contribution
    pub fn has_brick_data(&self) -> bool {
        self.covered.load(Ordering::Acquire) > 0
    }

    pub fn covered_cells(&self) -> u32 {
        self.covered.load(Ordering::Acquire)
    }

    /// Shared access for uploads and inspection
    pub fn read(&self) -> RwLockReadGuard<'_, BrickSamples> {
        self.samples.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Fold scratch sums into the running sums.
    ///
    /// With `increment` the contributions are added, otherwise they are
    /// subtracted. A cell whose count drops to zero is cleared. Returns the
    /// number of cells written.
    pub fn update_brick_data(&self, scratch: &ScratchBuffer, increment: bool) -> usize {
        debug_assert_eq!(scratch.brick_size(), self.size);
        let mut samples = self.samples.write().unwrap_or_else(|e| e.into_inner());
        let mut written = 0;

        for &cell in scratch.touched() {
            let c = cell as usize;
            let weight = scratch.weight[c];
            let count = samples.counts[c];

            let next = if increment {
                count.saturating_add(weight)
            } else {
                count.saturating_sub(weight)
            };
            if next == 0 {
                samples.reset_cell(c);
                written += 1;
                continue;
            }

            if increment {
                samples.color_sum[c] += scratch.color[c];
                samples.normal_sum[c] += scratch.normal[c];
                samples.emittance_sum[c] += scratch.emittance[c];
                samples.opacity_sum[c] += scratch.opacity[c];
            } else {
                samples.color_sum[c] -= scratch.color[c];
                samples.normal_sum[c] -= scratch.normal[c];
                samples.emittance_sum[c] -= scratch.emittance[c];
                samples.opacity_sum[c] -= scratch.opacity[c];
            }
            samples.counts[c] = next;
            written += 1;
        }

        let covered = samples.counts.iter().filter(|&&n| n > 0).count() as u32;
        self.covered.store(covered, Ordering::Release);
        written
    }
}

impl Drop for Brick {
    fn drop(&mut self) {
        self.budget.remove_brick(BrickSamples::byte_size(self.cell_count()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> Arc<VoxelBudget> {
        Arc::new(VoxelBudget::new(16))
    }

    #[test]
    fn test_new_brick_is_empty_and_counted() {
        let budget = budget();
        let brick = Brick::new(4, &budget);
        assert!(!brick.has_brick_data());
        assert_eq!(budget.bricks(), 1);
        drop(brick);
        assert_eq!(budget.bricks(), 0);
        assert_eq!(budget.bytes(), 0);
    }

    #[test]
    fn test_try_new_respects_budget() {
        let budget = Arc::new(VoxelBudget::new(1));
        let first = Brick::try_new(2, &budget);
        assert!(first.is_some());
        assert!(Brick::try_new(2, &budget).is_none());
        assert_eq!(budget.bricks(), 1);
        drop(first);
        assert_eq!(budget.bricks(), 0);
        assert!(Brick::try_new(2, &budget).is_some());
    }

    #[test]
    fn test_insert_averages_contributions() {
        let brick = Brick::new(4, &budget());
        let mut s = ScratchBuffer::new(4);
        let c = cell_index(1, 2, 3, 4);
        s.accumulate(c, Vec3::new(1.0, 0.0, 0.0), 1.0, Vec3::Y, Vec3::ZERO);
        s.accumulate(c, Vec3::new(0.0, 0.0, 1.0), 0.5, Vec3::Y, Vec3::ZERO);
        assert_eq!(brick.update_brick_data(&s, true), 1);

        let samples = brick.read();
        assert_eq!(samples.counts[c], 2);
        assert_eq!(samples.albedo(c), [128, 0, 128, 255]);
        assert_eq!(samples.opacity(c), 191);
        assert_eq!(samples.normal(c), [128, 255, 128, 255]);
        drop(samples);
        assert!(brick.has_brick_data());
        assert_eq!(brick.covered_cells(), 1);
    }

    #[test]
    fn test_remove_restores_previous_values() {
        let brick = Brick::new(4, &budget());
        let c = cell_index(0, 0, 0, 4);

        let mut base = ScratchBuffer::new(4);
        base.accumulate(c, Vec3::new(0.2, 0.6, 0.9), 0.8, Vec3::X, Vec3::ZERO);
        brick.update_brick_data(&base, true);
        let before = brick.read().clone();

        let mut extra = ScratchBuffer::new(4);
        extra.accumulate(c, Vec3::new(1.0, 0.1, 0.0), 1.0, Vec3::Z, Vec3::splat(0.3));
        extra.accumulate(c, Vec3::new(0.5, 0.5, 0.5), 0.2, Vec3::NEG_Y, Vec3::ZERO);
        brick.update_brick_data(&extra, true);
        brick.update_brick_data(&extra, false);

        let after = brick.read();
        assert_eq!(after.counts[c], before.counts[c]);
        for k in 0..3 {
            assert!((after.albedo(c)[k] as i32 - before.albedo(c)[k] as i32).abs() <= 1);
            assert!((after.normal(c)[k] as i32 - before.normal(c)[k] as i32).abs() <= 1);
            assert!((after.emittance(c)[k] as i32 - before.emittance(c)[k] as i32).abs() <= 1);
        }
        assert!((after.opacity(c) as i32 - before.opacity(c) as i32).abs() <= 1);
    }

    #[test]
    fn test_dense_mesh_insert_remove_restores_cell() {
        let brick = Brick::new(4, &budget());
        let c = 0;

        let mut base = ScratchBuffer::new(4);
        base.accumulate(c, Vec3::splat(0.2), 0.4, Vec3::new(0.48, 0.6, 0.64), Vec3::ZERO);
        brick.update_brick_data(&base, true);
        let before = brick.read().clone();

        let mut dense = ScratchBuffer::new(4);
        for i in 0..40 {
            let t = i as f32 / 40.0;
            dense.accumulate(c, Vec3::new(t, 1.0 - t, 0.5), 0.9, Vec3::new(t, 0.0, 1.0).normalize(), Vec3::splat(t));
        }
        brick.update_brick_data(&dense, true);
        assert_eq!(brick.read().counts[c], 41);
        brick.update_brick_data(&dense, false);

        let after = brick.read();
        assert_eq!(after.counts[c], 1);
        assert_eq!(after.albedo(c), before.albedo(c));
        assert_eq!(after.normal(c), before.normal(c));
        assert_eq!(after.emittance(c), before.emittance(c));
        assert_eq!(after.opacity(c), before.opacity(c));
        assert!((after.albedo_f32(c)[0] - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_remove_to_zero_clears_cell() {
        let brick = Brick::new(4, &budget());
        let mut s = ScratchBuffer::new(4);
        s.accumulate(7, Vec3::ONE, 1.0, Vec3::Y, Vec3::ONE);
        brick.update_brick_data(&s, true);
        brick.update_brick_data(&s, false);
        assert!(!brick.has_brick_data());
        let samples = brick.read();
        assert_eq!(samples.counts[7], 0);
        assert_eq!(samples.albedo(7), [0; 4]);
        assert_eq!(samples.opacity(7), 0);
        assert_eq!(samples.color_sum[7], Vec3::ZERO);
    }

    #[test]
    fn test_over_removal_saturates() {
        let brick = Brick::new(2, &budget());
        let mut s = ScratchBuffer::new(2);
        s.accumulate(0, Vec3::ONE, 1.0, Vec3::Y, Vec3::ZERO);
        brick.update_brick_data(&s, false);
        assert_eq!(brick.read().counts[0], 0);
        assert!(!brick.has_brick_data());
    }

    #[test]
    fn test_pack_channel_sizes() {
        let brick = Brick::new(4, &budget());
        let samples = brick.read();
        assert_eq!(samples.pack_channel(AtlasChannel::Opacity, TexelFormat::Rgba8Unorm).len(), 64);
        assert_eq!(samples.pack_channel(AtlasChannel::Albedo, TexelFormat::Rgba8Unorm).len(), 256);
        assert_eq!(samples.pack_channel(AtlasChannel::Normal, TexelFormat::Rgba16Float).len(), 512);
        assert_eq!(samples.pack_channel(AtlasChannel::Emittance, TexelFormat::Rgba32Float).len(), 1024);
        assert!(samples.pack_channel(AtlasChannel::Tree, TexelFormat::Rgba8Unorm).is_empty());
    }

    #[test]
    fn test_pack_half_float_values() {
        let brick = Brick::new(2, &budget());
        let mut s = ScratchBuffer::new(2);
        s.accumulate(0, Vec3::ONE, 1.0, Vec3::Y, Vec3::ZERO);
        brick.update_brick_data(&s, true);
        let bytes = brick.read().pack_channel(AtlasChannel::Albedo, TexelFormat::Rgba16Float);
        let texels: Vec<f16> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(texels[0].to_f32(), 1.0);
        assert_eq!(texels[3].to_f32(), 1.0);
        assert_eq!(texels[4].to_f32(), 0.0);
    }
}
