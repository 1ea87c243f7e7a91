//! Per-frame pipeline statistics

use crate::voxel::svo::TraversalStats;

/// Counters for one [`SvoEnvironment::update`](super::SvoEnvironment::update) call
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SvoStats {
    pub frame: u32,
    /// Nodes that passed the frustum test
    pub visited: usize,
    /// Nodes created this frame
    pub created: usize,
    /// Nodes added to the processing queue
    pub queued: usize,
    /// Nodes voxelized by completed jobs
    pub processed: usize,
    /// Nodes whose brick allocation hit the voxel budget
    pub refused: usize,
    /// Jobs dispatched this frame
    pub jobs_dispatched: usize,
    /// Jobs still running after this frame
    pub jobs_outstanding: usize,
    /// Bricks written to the atlas
    pub uploaded: usize,
    /// Nodes dropped from the tree
    pub evicted_nodes: usize,
    /// Atlas blocks released
    pub freed_blocks: usize,
    /// Nodes waiting for processing
    pub process_queue: usize,
    /// Nodes waiting for upload
    pub upload_queue: usize,
    /// Live atlas blocks
    pub live_blocks: u32,
    /// CPU-resident bricks
    pub active_bricks: usize,
    pub scratch_free: usize,
    pub scratch_total: usize,
}

impl SvoStats {
    pub fn new(frame: u32) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn add_traversal(&mut self, traversal: &TraversalStats) {
        self.visited += traversal.visited;
        self.created += traversal.created;
        self.queued += traversal.queued;
    }

    /// Fraction of scratch buffers in use
    pub fn scratch_utilization(&self) -> f32 {
        if self.scratch_total == 0 {
            return 0.0;
        }
        1.0 - self.scratch_free as f32 / self.scratch_total as f32
    }

    pub fn log(&self) {
        log::debug!(
            "svo frame {}: visited {} created {} queued {} processed {} refused {} uploaded {} evicted {} | blocks {} bricks {} scratch {:.0}% | queues {}/{} jobs {}",
            self.frame,
            self.visited,
            self.created,
            self.queued,
            self.processed,
            self.refused,
            self.uploaded,
            self.evicted_nodes,
            self.live_blocks,
            self.active_bricks,
            self.scratch_utilization() * 100.0,
            self.process_queue,
            self.upload_queue,
            self.jobs_outstanding,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_utilization() {
        let stats = SvoStats {
            scratch_free: 1,
            scratch_total: 4,
            ..SvoStats::new(3)
        };
        assert!((stats.scratch_utilization() - 0.75).abs() < 1e-6);
        assert_eq!(SvoStats::default().scratch_utilization(), 0.0);
    }

    #[test]
    fn test_add_traversal() {
        let mut stats = SvoStats::new(1);
        stats.add_traversal(&TraversalStats {
            visited: 5,
            created: 2,
            queued: 3,
            ..Default::default()
        });
        assert_eq!((stats.visited, stats.created, stats.queued), (5, 2, 3));
    }
}
