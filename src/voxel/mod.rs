//! Voxel bricks, voxelization and the streaming octree

pub mod brick;
pub mod scratch;
pub mod super_mesh;
pub mod svo;
pub mod voxelize;

pub use brick::{Brick, BrickSamples};
pub use scratch::{ScratchBuffer, ScratchLease, ScratchPool};
pub use super_mesh::SuperMesh;
pub use svo::{BrickUpdate, VoxelNode};
pub use voxelize::process_triangles;
