//! Voxel GI orchestration: configuration, background jobs, the per-frame
//! environment and its renderer-facing outputs

pub mod config;
pub mod debug;
pub mod environment;
pub mod jobs;
pub mod lights;
pub mod stats;

pub use config::SvoConfig;
pub use debug::DebugDraw;
pub use environment::{SvoEnvironment, SvoNodeInfo, SvoTextureInfo};
pub use jobs::{InlineJobs, JobSystem, RayonJobs};
pub use lights::{LightBuckets, LightMobility, LightSource, LightTi};
pub use stats::SvoStats;
