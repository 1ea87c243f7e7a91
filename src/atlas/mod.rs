//! Texture atlas management: block packing and texture pool access

pub mod packer;
pub mod backend;

pub use packer::{BlockId, TextureBlock, TextureBlockPacker3D};
pub use backend::{AtlasChannel, MemoryBackend, PoolDesc, PoolId, TexelFormat, TexelRegion, TextureBackend};
