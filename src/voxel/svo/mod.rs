//! Streaming sparse voxel octree

pub mod gpu_node;
pub mod node;
pub mod pending;

pub use gpu_node::{decode_ref, GpuTreeNode, NODE_ABSENT, NODE_NOT_RESIDENT, NO_BRICK_OFFSET, TREE_TEXELS_PER_NODE};
pub use node::{BrickUpdate, EvictContext, ProcessContext, TraversalStats, UpdateContext, VoxelNode};
pub use pending::{MeshEdits, MeshMap, PendingMeshes};
