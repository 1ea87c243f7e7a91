//! Noise-based procedural heightfield

use std::sync::Arc;

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use super::sampler::{SurfaceType, TerrainSampler};
use crate::scene::Material;

pub const SURFACE_SAND: SurfaceType = 0;
pub const SURFACE_GRASS: SurfaceType = 1;
pub const SURFACE_ROCK: SurfaceType = 2;

/// Parameters controlling terrain generation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    pub sea_level: f32,    // Below this (plus a margin) the surface is sand
    pub rock_level: f32,   // Above this the surface is rock
    pub grid_step: f32,    // Spacing of triangulated height samples
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 64.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            sea_level: 24.0,
            rock_level: 48.0,
            grid_step: 2.0,
        }
    }
}

/// Heightfield built from fractal Brownian motion with banded surface types
pub struct NoiseTerrain {
    params: TerrainParams,
    noise: Fbm<Perlin>,
    materials: [Arc<Material>; 3],
}

impl NoiseTerrain {
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        let materials = [
            Arc::new(Material::opaque("sand", Vec3::new(0.85, 0.75, 0.55))),
            Arc::new(Material::opaque("grass", Vec3::new(0.2, 0.5, 0.15))),
            Arc::new(Material::opaque("rock", Vec3::new(0.4, 0.4, 0.42))),
        ];

        Self { params, noise, materials }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Replace the material used for one surface band
    pub fn set_surface_material(&mut self, surface: SurfaceType, material: Arc<Material>) {
        if let Some(slot) = self.materials.get_mut(surface as usize) {
            *slot = material;
        }
    }
}

impl TerrainSampler for NoiseTerrain {
    fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // [-1, 1] -> [0, height_scale]
        let noise_value = self.noise.get([nx, nz]);
        let normalized = (noise_value + 1.0) / 2.0;
        (normalized * self.params.height_scale as f64) as f32
    }

    fn surface_type_at(&self, x: f32, z: f32) -> SurfaceType {
        let h = self.height_at(x, z);
        if h < self.params.sea_level + 2.0 {
            SURFACE_SAND
        } else if h > self.params.rock_level {
            SURFACE_ROCK
        } else {
            SURFACE_GRASS
        }
    }

    fn surface_material(&self, surface: SurfaceType) -> Option<Arc<Material>> {
        self.materials.get(surface as usize).cloned()
    }

    fn grid_step(&self) -> f32 {
        self.params.grid_step
    }
}
