//! Terrain heightfields sampled on demand by the voxelizer

pub mod generator;
pub mod sampler;

pub use generator::{NoiseTerrain, TerrainParams};
pub use sampler::{triangulate, SurfaceType, TerrainSampler};
