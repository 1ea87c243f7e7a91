//! svogi - sparse voxel octree streaming for voxel cone traced global illumination

pub mod core;
pub mod math;
pub mod atlas;
pub mod scene;
pub mod terrain;
pub mod streaming;
pub mod voxel;
pub mod gi;
