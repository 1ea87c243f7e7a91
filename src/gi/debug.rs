//! Debug visualization of the octree

use crate::math::Aabb;

/// Immediate-mode box drawing supplied by the host
pub trait DebugDraw {
    fn draw_aabb(&mut self, world_box: &Aabb, color: [u8; 4]);
}

/// Node holds an atlas block with current data
pub const COLOR_RESIDENT: [u8; 4] = [64, 220, 64, 255];
/// Node has brick data the atlas does not hold yet
pub const COLOR_STALE: [u8; 4] = [230, 210, 40, 255];
/// Node without brick data
pub const COLOR_EMPTY: [u8; 4] = [128, 128, 128, 96];

/// Collects boxes instead of drawing them
#[derive(Clone, Debug, Default)]
pub struct RecordingDraw {
    pub boxes: Vec<(Aabb, [u8; 4])>,
}

impl DebugDraw for RecordingDraw {
    fn draw_aabb(&mut self, world_box: &Aabb, color: [u8; 4]) {
        self.boxes.push((*world_box, color));
    }
}

impl RecordingDraw {
    pub fn count(&self, color: [u8; 4]) -> usize {
        self.boxes.iter().filter(|(_, c)| *c == color).count()
    }
}
