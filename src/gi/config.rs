//! Voxel GI configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atlas::TexelFormat;
use crate::core::{Error, Result};

/// Tunables for one [`SvoEnvironment`](super::SvoEnvironment)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvoConfig {
    /// World position of the root box's minimum corner
    pub world_origin: [f32; 3],
    /// Root node edge length in meters
    pub root_size: f32,
    /// Smallest node edge length; nodes are never split below this
    pub min_node_size: f32,
    /// Largest node that owns a brick; bigger nodes are structural only
    pub max_node_size: f32,
    /// Voxels per brick edge
    pub brick_size: u32,
    /// CPU-resident brick budget
    pub max_loaded_bricks: usize,
    pub max_uploads_per_frame: usize,
    pub max_jobs_per_frame: usize,
    pub max_nodes_per_job: usize,
    /// Scratch buffers as a fraction of hardware threads (at least one)
    pub scratch_fraction: f32,
    /// Frames a node may stay unseen before its subtree is dropped
    pub eviction_delay_frames: u32,
    /// Frames a node may stay unseen before its atlas block is reclaimed
    pub gpu_eviction_delay_frames: u32,
    /// Frames between periodic eviction passes
    pub eviction_interval_frames: u32,
    /// Distance / node size beyond which finer nodes are skipped (0 = off)
    pub lod_ratio: f32,
    /// Let terrain-only parents satisfy the LOD skip rule
    pub terrain_lod: bool,
    pub texel_format: TexelFormat,
    /// Atlas dimensions in bricks
    pub atlas_bricks: [u32; 3],
    /// Surface offset as a fraction of one voxel
    pub surface_offset: f32,
    /// Voxelize terrain a second time with the offset negated
    pub terrain_double_sided: bool,
    pub max_dirty_blocks_per_frame: usize,
    /// Consecutive over-budget frames before a warning is logged
    pub pressure_warning_frames: u32,
    pub max_lights_per_bucket: usize,
    pub light_search_radius: f32,
}

impl Default for SvoConfig {
    fn default() -> Self {
        Self {
            world_origin: [-512.0, -128.0, -512.0],
            root_size: 1024.0,
            min_node_size: 4.0,
            max_node_size: 64.0,
            brick_size: 16,
            max_loaded_bricks: 4096,
            max_uploads_per_frame: 32,
            max_jobs_per_frame: 8,
            max_nodes_per_job: 4,
            scratch_fraction: 0.5,
            eviction_delay_frames: 300,
            gpu_eviction_delay_frames: 60,
            eviction_interval_frames: 16,
            lod_ratio: 16.0,
            terrain_lod: false,
            texel_format: TexelFormat::Rgba8Unorm,
            atlas_bricks: [16, 16, 8],
            surface_offset: 0.5,
            terrain_double_sided: true,
            max_dirty_blocks_per_frame: 128,
            pressure_warning_frames: 120,
            max_lights_per_bucket: 16,
            light_search_radius: 128.0,
        }
    }
}

fn is_power_of_two_ratio(ratio: f32) -> bool {
    ratio >= 1.0 && ratio.fract() == 0.0 && (ratio as u64).is_power_of_two()
}

impl SvoConfig {
    /// Load and validate a JSON config; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(msg));

        if !(self.root_size > 0.0 && self.min_node_size > 0.0 && self.max_node_size > 0.0) {
            return fail("node sizes must be positive".into());
        }
        if self.min_node_size > self.max_node_size {
            return fail(format!(
                "min_node_size {} exceeds max_node_size {}",
                self.min_node_size, self.max_node_size
            ));
        }
        if self.max_node_size > self.root_size {
            return fail(format!(
                "max_node_size {} exceeds root_size {}",
                self.max_node_size, self.root_size
            ));
        }
        if !is_power_of_two_ratio(self.root_size / self.min_node_size)
            || !is_power_of_two_ratio(self.root_size / self.max_node_size)
        {
            return fail("root_size must be a power-of-two multiple of min and max node size".into());
        }
        if self.brick_size < 2 {
            return fail(format!("brick_size {} is too small", self.brick_size));
        }
        if self.atlas_bricks.contains(&0) {
            return fail("atlas_bricks must be non-zero on every axis".into());
        }
        if self.max_nodes_per_job == 0 || self.max_jobs_per_frame == 0 {
            return fail("job limits must be non-zero".into());
        }
        if !(0.0..=1.0).contains(&self.scratch_fraction) {
            return fail(format!("scratch_fraction {} outside [0, 1]", self.scratch_fraction));
        }
        if self.lod_ratio < 0.0 {
            return fail("lod_ratio must not be negative".into());
        }
        if self.eviction_interval_frames == 0 {
            return fail("eviction_interval_frames must be non-zero".into());
        }
        Ok(())
    }

    pub fn origin(&self) -> glam::Vec3 {
        glam::Vec3::from_array(self.world_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SvoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_node_sizes() {
        let config = SvoConfig {
            min_node_size: 128.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_non_power_of_two_ratio() {
        let config = SvoConfig {
            min_node_size: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_atlas() {
        let config = SvoConfig {
            atlas_bricks: [16, 0, 8],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SvoConfig = serde_json::from_str(r#"{"brick_size": 8, "texel_format": "Rgba16Float"}"#).unwrap();
        assert_eq!(config.brick_size, 8);
        assert_eq!(config.texel_format, TexelFormat::Rgba16Float);
        assert_eq!(config.root_size, 1024.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("svo.json");
        let config = SvoConfig {
            max_loaded_bricks: 77,
            lod_ratio: 4.0,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SvoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"brick_size": 0}"#).unwrap();
        assert!(matches!(SvoConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_reports_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SvoConfig::load(&path), Err(Error::Json(_))));
    }
}
