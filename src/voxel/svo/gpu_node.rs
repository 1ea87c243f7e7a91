//! GPU tree metadata record
//!
//! One record per tree row, stored as five RGBA32F texels in the tree pool.
//! Brick nodes use their atlas block id as the row. Nodes above the brick
//! levels, the root included, take the rows after the block rows and carry
//! no brick. Node references inside a record use a signed encoding: positive
//! values are rows plus one, zero means there is no such node, and
//! [`NODE_NOT_RESIDENT`] marks a node that exists on the CPU but has no row.

use bytemuck::{Pod, Zeroable};

use crate::math::Aabb;

/// Reference to a missing node
pub const NODE_ABSENT: i32 = 0;

/// Reference to a node without an atlas block
pub const NODE_NOT_RESIDENT: i32 = -1;

/// RGBA32F texels per record
pub const TREE_TEXELS_PER_NODE: u32 = 5;

/// Atlas offset stored for nodes without a brick
pub const NO_BRICK_OFFSET: f32 = -1.0;

/// Tree metadata for one GPU-resident node - exactly 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuTreeNode {
    /// World-space minimum corner, w = edge length
    pub box_min: [f32; 4],
    /// World-space maximum corner, w = linear atlas offset of the brick or
    /// [`NO_BRICK_OFFSET`]
    pub box_max: [f32; 4],
    pub parent: i32,
    pub children: [i32; 8],
    _padding: [i32; 3],
}

/// Encode a reference to a node stored at `row`, or to an existing node
/// without one
pub fn encode_ref(row: Option<u32>, exists: bool) -> i32 {
    match (row, exists) {
        (Some(row), _) => row as i32 + 1,
        (None, true) => NODE_NOT_RESIDENT,
        (None, false) => NODE_ABSENT,
    }
}

/// Decode a positive reference back to its row
pub fn decode_ref(value: i32) -> Option<u32> {
    (value > 0).then(|| value as u32 - 1)
}

impl GpuTreeNode {
    pub fn new(world_box: &Aabb, atlas_offset: Option<u32>, parent: i32, children: [i32; 8]) -> Self {
        let size = world_box.max_extent();
        let offset = atlas_offset.map_or(NO_BRICK_OFFSET, |o| o as f32);
        Self {
            box_min: [world_box.min.x, world_box.min.y, world_box.min.z, size],
            box_max: [world_box.max.x, world_box.max.y, world_box.max.z, offset],
            parent,
            children,
            _padding: [0; 3],
        }
    }

    /// Linear atlas offset of the brick, if the node has one
    pub fn atlas_offset(&self) -> Option<u32> {
        (self.box_max[3] >= 0.0).then(|| self.box_max[3] as u32)
    }

    pub fn child_mask(&self) -> u8 {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != NODE_ABSENT)
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_record_size_matches_texels() {
        assert_eq!(
            std::mem::size_of::<GpuTreeNode>(),
            (TREE_TEXELS_PER_NODE * 16) as usize
        );
    }

    #[test]
    fn test_ref_encoding() {
        assert_eq!(encode_ref(Some(0), true), 1);
        assert_eq!(encode_ref(Some(41), true), 42);
        assert_eq!(encode_ref(None, true), NODE_NOT_RESIDENT);
        assert_eq!(encode_ref(None, false), NODE_ABSENT);
        assert_eq!(decode_ref(42), Some(41));
        assert_eq!(decode_ref(NODE_NOT_RESIDENT), None);
        assert_eq!(decode_ref(NODE_ABSENT), None);
    }

    #[test]
    fn test_new_record() {
        let b = Aabb::new(Vec3::ZERO, Vec3::splat(8.0));
        let mut children = [NODE_ABSENT; 8];
        children[2] = 5;
        children[7] = NODE_NOT_RESIDENT;
        let rec = GpuTreeNode::new(&b, Some(1234), NODE_ABSENT, children);
        assert_eq!(rec.box_min[3], 8.0);
        assert_eq!(rec.box_max[3], 1234.0);
        assert_eq!(rec.atlas_offset(), Some(1234));
        assert_eq!(rec.child_mask(), 0b1000_0100);
        let bytes: &[u8] = bytemuck::bytes_of(&rec);
        assert_eq!(bytes.len(), 80);
    }

    #[test]
    fn test_structural_record_has_no_brick() {
        let b = Aabb::new(Vec3::ZERO, Vec3::splat(64.0));
        let rec = GpuTreeNode::new(&b, None, NODE_ABSENT, [NODE_ABSENT; 8]);
        assert_eq!(rec.box_max[3], NO_BRICK_OFFSET);
        assert_eq!(rec.atlas_offset(), None);
        assert_eq!(rec.child_mask(), 0);
    }
}
