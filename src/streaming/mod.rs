//! Residency accounting for CPU-side voxel data

pub mod budget;

pub use budget::VoxelBudget;
