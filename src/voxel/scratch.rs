//! Per-job scratch accumulators
//!
//! Voxelizing a node sums triangle contributions per cell before they are
//! folded into the node's brick. The sums live in a [`ScratchBuffer`] that is
//! borrowed from a fixed-size [`ScratchPool`], so the number of concurrent
//! jobs is bounded by the pool size and no job allocates its own buffers.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use glam::Vec3;

/// Sums of triangle contributions for every cell of one brick
#[derive(Debug)]
pub struct ScratchBuffer {
    brick_size: u32,
    pub(crate) color: Vec<Vec3>,
    pub(crate) opacity: Vec<f32>,
    /// Normals biased into [0, 1]
    pub(crate) normal: Vec<Vec3>,
    pub(crate) emittance: Vec<Vec3>,
    /// Number of triangles summed into each cell
    pub(crate) weight: Vec<u32>,
    touched: Vec<u32>,
}

impl ScratchBuffer {
    pub fn new(brick_size: u32) -> Self {
        let cells = (brick_size as usize).pow(3);
        Self {
            brick_size,
            color: vec![Vec3::ZERO; cells],
            opacity: vec![0.0; cells],
            normal: vec![Vec3::ZERO; cells],
            emittance: vec![Vec3::ZERO; cells],
            weight: vec![0; cells],
            touched: Vec::new(),
        }
    }

    pub fn brick_size(&self) -> u32 {
        self.brick_size
    }

    /// Resize for a different brick size, discarding all sums
    pub fn ensure_size(&mut self, brick_size: u32) {
        if self.brick_size != brick_size {
            *self = Self::new(brick_size);
        } else {
            self.clear();
        }
    }

    /// Add one triangle's averaged contribution to a cell
    pub fn accumulate(&mut self, cell: usize, color: Vec3, opacity: f32, normal: Vec3, emittance: Vec3) {
        if self.weight[cell] == 0 {
            self.touched.push(cell as u32);
        }
        self.color[cell] += color.clamp(Vec3::ZERO, Vec3::ONE);
        self.opacity[cell] += opacity.clamp(0.0, 1.0);
        self.normal[cell] += (normal * 0.5 + Vec3::splat(0.5)).clamp(Vec3::ZERO, Vec3::ONE);
        self.emittance[cell] += emittance.clamp(Vec3::ZERO, Vec3::ONE);
        self.weight[cell] += 1;
    }

    /// Cells with at least one contribution, in first-touch order
    pub fn touched(&self) -> &[u32] {
        &self.touched
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Reset only the cells that were written
    pub fn clear(&mut self) {
        for &cell in &self.touched {
            let c = cell as usize;
            self.color[c] = Vec3::ZERO;
            self.opacity[c] = 0.0;
            self.normal[c] = Vec3::ZERO;
            self.emittance[c] = Vec3::ZERO;
            self.weight[c] = 0;
        }
        self.touched.clear();
    }
}

/// Fixed set of scratch buffers claimed by jobs
#[derive(Debug)]
pub struct ScratchPool {
    slots: Vec<Mutex<Option<ScratchBuffer>>>,
    claimed: Vec<AtomicBool>,
}

impl ScratchPool {
    pub fn new(count: usize, brick_size: u32) -> Arc<Self> {
        let count = count.max(1);
        Arc::new(Self {
            slots: (0..count).map(|_| Mutex::new(Some(ScratchBuffer::new(brick_size)))).collect(),
            claimed: (0..count).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    /// Pool sized to a fraction of the available hardware threads
    pub fn for_hardware(fraction: f32, brick_size: u32) -> Arc<Self> {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let count = (threads as f32 * fraction).floor() as usize;
        Self::new(count, brick_size)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.claimed.iter().filter(|c| !c.load(Ordering::Acquire)).count()
    }

    /// Claim a free buffer, or `None` when every buffer is in use
    pub fn try_claim(self: &Arc<Self>) -> Option<ScratchLease> {
        for (index, flag) in self.claimed.iter().enumerate() {
            if flag
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            let buffer = self.slots[index].lock().ok().and_then(|mut slot| slot.take());
            match buffer {
                Some(buffer) => {
                    return Some(ScratchLease {
                        pool: Arc::clone(self),
                        index,
                        buffer,
                    });
                }
                None => {
                    log::error!("Scratch slot {} claimed but empty", index);
                    flag.store(false, Ordering::Release);
                }
            }
        }
        None
    }

    fn release(&self, index: usize, mut buffer: ScratchBuffer) {
        buffer.clear();
        if let Ok(mut slot) = self.slots[index].lock() {
            *slot = Some(buffer);
        }
        self.claimed[index].store(false, Ordering::Release);
    }
}

/// Exclusive access to one pooled buffer; returned to the pool on drop
#[derive(Debug)]
pub struct ScratchLease {
    pool: Arc<ScratchPool>,
    index: usize,
    buffer: ScratchBuffer,
}

impl Deref for ScratchLease {
    type Target = ScratchBuffer;

    fn deref(&self) -> &ScratchBuffer {
        &self.buffer
    }
}

impl DerefMut for ScratchLease {
    fn deref_mut(&mut self) -> &mut ScratchBuffer {
        &mut self.buffer
    }
}

impl Drop for ScratchLease {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, ScratchBuffer::new(0));
        self.pool.release(self.index, buffer);
    }
}
