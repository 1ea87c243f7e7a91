//! svogi-demo - headless run of the voxel GI pipeline
//!
//! Usage: `svogi-demo [config.json] [frames]`
//!
//! Builds a small scene (noise terrain, a few boxes and lights), orbits a
//! camera around it and streams the octree into in-memory texture pools.
//! Set `RUST_LOG=svogi=debug` for per-frame statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::{Vec2, Vec3};

use svogi::core::camera::Camera;
use svogi::core::{logging, EntityId, Result};
use svogi::gi::{LightMobility, LightSource, SvoConfig, SvoEnvironment};
use svogi::math::Aabb;
use svogi::scene::{Material, MeshMobility, MeshSnapshot, StaticScene, VisArea};
use svogi::terrain::{NoiseTerrain, TerrainParams};

const DEFAULT_FRAMES: u32 = 240;

fn demo_config() -> SvoConfig {
    SvoConfig {
        world_origin: [-128.0, -32.0, -128.0],
        root_size: 256.0,
        min_node_size: 8.0,
        max_node_size: 32.0,
        brick_size: 8,
        max_loaded_bricks: 2048,
        atlas_bricks: [16, 16, 8],
        terrain_lod: true,
        lod_ratio: 8.0,
        ..Default::default()
    }
}

fn build_scene() -> StaticScene {
    let terrain = NoiseTerrain::new(TerrainParams {
        height_scale: 24.0,
        sea_level: 6.0,
        rock_level: 18.0,
        grid_step: 4.0,
        ..Default::default()
    });
    let stone = Arc::new(Material::opaque("stone", Vec3::new(0.55, 0.5, 0.45)));
    let pavement = MeshSnapshot::quad_xz(Vec2::new(-20.0, -20.0), Vec2::new(20.0, 20.0), 26.0, Some(stone));
    let hall = VisArea::new(
        "hall",
        vec![
            Vec3::new(-8.0, 26.0, -8.0),
            Vec3::new(8.0, 26.0, -8.0),
            Vec3::new(8.0, 26.0, 8.0),
            Vec3::new(-8.0, 26.0, 8.0),
        ],
        6.0,
    );

    StaticScene::new()
        .with_terrain(terrain)
        .with_mesh(pavement)
        .with_vis_area(hall)
}

fn main() -> Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            SvoConfig::load(&path)?
        }
        None => demo_config(),
    };
    let frames = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let mut env = SvoEnvironment::in_memory(config, Arc::new(build_scene()))?;

    let red = Arc::new(Material::opaque("red", Vec3::new(0.8, 0.1, 0.1)));
    let glow = Arc::new(Material::opaque("glow", Vec3::ONE).with_emittance(Vec3::new(4.0, 3.0, 1.0)));
    for i in 0..4 {
        let x = -12.0 + i as f32 * 8.0;
        let bounds = Aabb::new(Vec3::new(x, 26.0, -2.0), Vec3::new(x + 3.0, 30.0, 1.0));
        env.insert_mesh(EntityId(i), Arc::new(MeshSnapshot::cuboid(bounds, Some(Arc::clone(&red)))));
    }
    let lamp = MeshSnapshot::cuboid(Aabb::new(Vec3::new(-1.0, 31.0, -1.0), Vec3::new(1.0, 32.0, 1.0)), Some(glow));
    env.insert_mesh(EntityId(100), Arc::new(lamp.clone().with_mobility(MeshMobility::Dynamic)));

    env.add_light(EntityId(200), LightSource::omni(Vec3::new(0.0, 34.0, 0.0), 24.0, Vec3::new(4.0, 3.5, 3.0)));
    env.add_light(
        EntityId(201),
        LightSource::spot(Vec3::new(20.0, 40.0, 0.0), 40.0, Vec3::new(-1.0, -1.0, 0.0), 0.6, Vec3::splat(6.0))
            .with_mobility(LightMobility::Dynamic),
    );

    let start = Instant::now();
    let mut uploaded = 0;
    for frame in 0..frames {
        let angle = frame as f32 * 0.02;
        let eye = Vec3::new(angle.cos() * 60.0, 50.0, angle.sin() * 60.0);
        let camera = Camera::look_at(eye, Vec3::new(0.0, 26.0, 0.0), Vec3::Y);

        // the lamp bobs up and down
        let lift = Vec3::Y * (angle * 4.0).sin();
        env.insert_mesh(EntityId(100), Arc::new(lamp.translated(lift).with_mobility(MeshMobility::Dynamic)));

        env.update(&camera.snapshot())?;
        uploaded += env.stats().uploaded;
        let static_dirty = env.bricks_for_update(false).len();
        let dynamic_dirty = env.bricks_for_update(true).len();

        if frame % 60 == 0 {
            let stats = env.stats();
            log::info!(
                "frame {}: {} nodes, {} blocks, {} bricks, {} dirty static, {} dirty dynamic, {} lights",
                stats.frame,
                env.node_count(),
                stats.live_blocks,
                stats.active_bricks,
                static_dirty,
                dynamic_dirty,
                env.lights().static_lights.len() + env.lights().dynamic_lights.len(),
            );
        }
    }

    let info = env.static_texture_info();
    log::info!(
        "Done: {} frames in {:.2}s, {} bricks uploaded, atlas {}x{}x{} texels, {} KB written",
        frames,
        start.elapsed().as_secs_f32(),
        uploaded,
        info.tex_dim_xy[0],
        info.tex_dim_xy[1],
        info.tex_dim_z,
        env.backend().bytes_written() / 1024,
    );
    Ok(())
}
