//! Voxel memory budget
//!
//! Tracks how many bricks are resident on the CPU and how many bytes they
//! hold. Bricks register themselves on creation and deregister on drop, so
//! the counters are shared between the host and worker jobs.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Brick budget shared by every node of one environment
#[derive(Debug)]
pub struct VoxelBudget {
    /// Maximum number of CPU-resident bricks
    max_bricks: usize,
    /// Currently resident bricks
    bricks: AtomicUsize,
    /// Bytes held by resident bricks
    bytes: AtomicUsize,
}

impl VoxelBudget {
    /// Create a new budget
    ///
    /// # Arguments
    /// * `max_bricks` - Maximum number of bricks kept in CPU memory
    pub fn new(max_bricks: usize) -> Self {
        Self {
            max_bricks,
            bricks: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    // --- Tracking methods ---

    /// Register a new brick
    ///
    /// # Arguments
    /// * `bytes` - Size of the brick's sample storage
    pub fn add_brick(&self, bytes: usize) {
        self.bricks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Register a new brick only if it fits the budget.
    ///
    /// The check and the increment are one atomic step, so concurrent
    /// callers never push the count past `max_bricks`.
    pub fn try_reserve(&self, bytes: usize) -> bool {
        let reserved = self
            .bricks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_bricks).then_some(n + 1))
            .is_ok();
        if reserved {
            self.bytes.fetch_add(bytes, Ordering::Relaxed);
        }
        reserved
    }

    /// Deregister a brick, saturating at zero
    pub fn remove_brick(&self, bytes: usize) {
        let _ = self
            .bricks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(bytes)));
    }

    // --- Query methods ---

    pub fn max_bricks(&self) -> usize {
        self.max_bricks
    }

    pub fn bricks(&self) -> usize {
        self.bricks.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Number of bricks that can still be created
    pub fn available(&self) -> usize {
        self.max_bricks.saturating_sub(self.bricks())
    }

    /// Brick pressure (0.0 to 1.0+)
    ///
    /// Values above 0.9 indicate high pressure.
    /// Values above 1.0 indicate over-budget.
    pub fn pressure(&self) -> f32 {
        if self.max_bricks == 0 {
            return 0.0;
        }
        self.bricks() as f32 / self.max_bricks as f32
    }

    // --- Decision methods ---

    /// Returns true once usage exceeds 90% of the budget
    pub fn should_evict(&self) -> bool {
        self.pressure() > 0.9
    }

    /// Check whether one more brick fits
    pub fn can_allocate(&self) -> bool {
        self.bricks() < self.max_bricks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_budget_new() {
        let budget = VoxelBudget::new(64);
        assert_eq!(budget.bricks(), 0);
        assert_eq!(budget.bytes(), 0);
        assert_eq!(budget.available(), 64);
        assert!(budget.can_allocate());
    }

    #[test]
    fn test_budget_add_remove() {
        let budget = VoxelBudget::new(64);
        budget.add_brick(1000);
        budget.add_brick(1000);
        assert_eq!(budget.bricks(), 2);
        assert_eq!(budget.bytes(), 2000);

        budget.remove_brick(1000);
        assert_eq!(budget.bricks(), 1);
        assert_eq!(budget.bytes(), 1000);
        assert_eq!(budget.available(), 63);
    }

    #[test]
    fn test_budget_saturating_remove() {
        let budget = VoxelBudget::new(4);
        budget.remove_brick(500);
        assert_eq!(budget.bricks(), 0);
        assert_eq!(budget.bytes(), 0);
    }

    #[test]
    fn test_budget_pressure() {
        let budget = VoxelBudget::new(10);
        assert_eq!(budget.pressure(), 0.0);

        for _ in 0..5 {
            budget.add_brick(1);
        }
        assert!((budget.pressure() - 0.5).abs() < 1e-6);
        assert!(!budget.should_evict());

        for _ in 0..5 {
            budget.add_brick(1);
        }
        assert!(budget.should_evict());
        assert!(!budget.can_allocate());
    }

    #[test]
    fn test_budget_zero_capacity() {
        let budget = VoxelBudget::new(0);
        assert_eq!(budget.pressure(), 0.0);
        assert!(!budget.can_allocate());
    }

    #[test]
    fn test_try_reserve_stops_at_limit() {
        let budget = VoxelBudget::new(2);
        assert!(budget.try_reserve(10));
        assert!(budget.try_reserve(10));
        assert!(!budget.try_reserve(10));
        assert_eq!(budget.bricks(), 2);
        assert_eq!(budget.bytes(), 20);
    }

    #[test]
    fn test_try_reserve_concurrent_never_overshoots() {
        let budget = Arc::new(VoxelBudget::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || (0..50).filter(|_| budget.try_reserve(4)).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(budget.bricks(), 100);
        assert_eq!(budget.bytes(), 400);
    }

    #[test]
    fn test_budget_shared_across_threads() {
        let budget = Arc::new(VoxelBudget::new(10_000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        budget.add_brick(8);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(budget.bricks(), 4000);
        assert_eq!(budget.bytes(), 32_000);
    }
}
