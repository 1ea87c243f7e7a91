//! Texture pool interface consumed from the rendering backend
//!
//! The renderer owns the actual GPU textures. The SVO pipeline only needs to
//! allocate one 3D pool per logical channel, release it, and write texel
//! regions into it. [`MemoryBackend`] keeps pools in CPU memory and is used
//! by tests, benches and the headless demo.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{Result, UVec3};

/// Identifier of a texture pool handed out by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId(pub u32);

/// Logical atlas channels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtlasChannel {
    /// Flat tree-node metadata
    Tree,
    /// Brick opacity
    Opacity,
    /// Brick albedo (linear RGB)
    Albedo,
    /// Brick normals (biased to unsigned)
    Normal,
    /// Brick emittance
    Emittance,
}

impl AtlasChannel {
    /// Channels that hold per-brick voxel data
    pub const BRICK_CHANNELS: [AtlasChannel; 4] = [
        AtlasChannel::Opacity,
        AtlasChannel::Albedo,
        AtlasChannel::Normal,
        AtlasChannel::Emittance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AtlasChannel::Tree => "svo_tree",
            AtlasChannel::Opacity => "svo_opacity",
            AtlasChannel::Albedo => "svo_albedo",
            AtlasChannel::Normal => "svo_normal",
            AtlasChannel::Emittance => "svo_emittance",
        }
    }
}

/// Texel formats the pipeline writes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelFormat {
    /// 8-bit unorm RGBA
    #[default]
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 8-bit unorm single channel
    R8Unorm,
    /// 32-bit float RGBA
    Rgba32Float,
}

impl TexelFormat {
    pub fn bytes_per_texel(&self) -> usize {
        match self {
            TexelFormat::Rgba8Unorm => 4,
            TexelFormat::Rgba16Float => 8,
            TexelFormat::R8Unorm => 1,
            TexelFormat::Rgba32Float => 16,
        }
    }
}

/// Description of a texture pool
#[derive(Clone, Debug, PartialEq)]
pub struct PoolDesc {
    pub channel: AtlasChannel,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TexelFormat,
}

impl PoolDesc {
    pub fn extent(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.depth)
    }

    pub fn byte_size(&self) -> usize {
        (self.width * self.height * self.depth) as usize * self.format.bytes_per_texel()
    }
}

/// Texel-space region of a pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexelRegion {
    pub origin: UVec3,
    pub size: UVec3,
}

impl TexelRegion {
    pub fn new(origin: UVec3, size: UVec3) -> Self {
        Self { origin, size }
    }

    pub fn texel_count(&self) -> usize {
        (self.size.x * self.size.y * self.size.z) as usize
    }
}

/// Texture pool primitives provided by the renderer
pub trait TextureBackend: Send {
    /// Allocate a 3D pool
    fn create_pool(&mut self, desc: &PoolDesc) -> Result<PoolId>;

    /// Release a pool created by `create_pool`
    fn release_pool(&mut self, pool: PoolId);

    /// Overwrite `region` of `pool` with tightly packed texels
    fn update_region(&mut self, pool: PoolId, region: TexelRegion, data: &[u8]) -> Result<()>;
}

struct MemoryPool {
    desc: PoolDesc,
    data: Vec<u8>,
}

/// CPU-resident implementation of [`TextureBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    pools: HashMap<PoolId, MemoryPool>,
    next_id: u32,
    bytes_written: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool description, if the pool is alive
    pub fn desc(&self, pool: PoolId) -> Option<&PoolDesc> {
        self.pools.get(&pool).map(|p| &p.desc)
    }

    /// Raw bytes of one texel
    pub fn texel(&self, pool: PoolId, pos: UVec3) -> Option<&[u8]> {
        let pool = self.pools.get(&pool)?;
        if pos.cmpge(pool.desc.extent()).any() {
            return None;
        }
        let bpt = pool.desc.format.bytes_per_texel();
        let idx = (pos.x + pos.y * pool.desc.width + pos.z * pool.desc.width * pool.desc.height) as usize * bpt;
        Some(&pool.data[idx..idx + bpt])
    }

    /// Whole pool contents
    pub fn pool_data(&self, pool: PoolId) -> Option<&[u8]> {
        self.pools.get(&pool).map(|p| p.data.as_slice())
    }

    /// Number of live pools
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Total bytes written through `update_region`
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

impl TextureBackend for MemoryBackend {
    fn create_pool(&mut self, desc: &PoolDesc) -> Result<PoolId> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(Error::Texture(format!("{} has zero extent", desc.channel.label())));
        }
        let id = PoolId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "Created pool {} ({}x{}x{} {:?}, {}KB)",
            desc.channel.label(),
            desc.width,
            desc.height,
            desc.depth,
            desc.format,
            desc.byte_size() / 1024
        );
        self.pools.insert(id, MemoryPool { desc: desc.clone(), data: vec![0; desc.byte_size()] });
        Ok(id)
    }

    fn release_pool(&mut self, pool: PoolId) {
        self.pools.remove(&pool);
    }

    fn update_region(&mut self, pool: PoolId, region: TexelRegion, data: &[u8]) -> Result<()> {
        let target = self
            .pools
            .get_mut(&pool)
            .ok_or_else(|| Error::Texture(format!("unknown pool {:?}", pool)))?;

        let desc = &target.desc;
        let bpt = desc.format.bytes_per_texel();
        if (region.origin + region.size).cmpgt(desc.extent()).any() {
            return Err(Error::Texture(format!(
                "region {:?} exceeds {} extent {}",
                region,
                desc.channel.label(),
                desc.extent()
            )));
        }
        if data.len() != region.texel_count() * bpt {
            return Err(Error::Texture(format!(
                "expected {} bytes for region, got {}",
                region.texel_count() * bpt,
                data.len()
            )));
        }

        let row_bytes = region.size.x as usize * bpt;
        let mut src = 0;
        for z in 0..region.size.z {
            for y in 0..region.size.y {
                let dst_texel = region.origin.x
                    + (region.origin.y + y) * desc.width
                    + (region.origin.z + z) * desc.width * desc.height;
                let dst = dst_texel as usize * bpt;
                target.data[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
                src += row_bytes;
            }
        }
        self.bytes_written += data.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> PoolDesc {
        PoolDesc {
            channel: AtlasChannel::Albedo,
            width: 4,
            height: 4,
            depth: 2,
            format: TexelFormat::Rgba8Unorm,
        }
    }

    #[test]
    fn test_create_and_update() {
        let mut backend = MemoryBackend::new();
        let pool = backend.create_pool(&desc()).unwrap();
        let region = TexelRegion::new(UVec3::new(1, 1, 1), UVec3::new(2, 1, 1));
        backend.update_region(pool, region, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        assert_eq!(backend.texel(pool, UVec3::new(1, 1, 1)), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(backend.texel(pool, UVec3::new(2, 1, 1)), Some(&[5u8, 6, 7, 8][..]));
        assert_eq!(backend.texel(pool, UVec3::new(0, 0, 0)), Some(&[0u8; 4][..]));
        assert_eq!(backend.bytes_written(), 8);
    }

    #[test]
    fn test_update_rejects_bad_regions() {
        let mut backend = MemoryBackend::new();
        let pool = backend.create_pool(&desc()).unwrap();
        let outside = TexelRegion::new(UVec3::new(3, 0, 0), UVec3::new(2, 1, 1));
        assert!(backend.update_region(pool, outside, &[0; 8]).is_err());

        let short = TexelRegion::new(UVec3::ZERO, UVec3::new(2, 1, 1));
        assert!(backend.update_region(pool, short, &[0; 4]).is_err());
        assert!(backend.update_region(PoolId(99), short, &[0; 8]).is_err());
    }

    #[test]
    fn test_release() {
        let mut backend = MemoryBackend::new();
        let pool = backend.create_pool(&desc()).unwrap();
        backend.release_pool(pool);
        assert_eq!(backend.pool_count(), 0);
        assert!(backend.pool_data(pool).is_none());
    }
}
