//! Heightfield access and on-demand triangulation
//!
//! Terrain is never stored as a mesh. Nodes ask for the triangles inside
//! their box when they are first voxelized and drop them afterwards.

use std::sync::Arc;

use glam::Vec3;

use crate::math::Aabb;
use crate::scene::{LooseTriangle, Material};

/// Surface type id used to pick a terrain material
pub type SurfaceType = u8;

/// Y-up heightfield queried in world space
pub trait TerrainSampler: Send + Sync {
    fn height_at(&self, x: f32, z: f32) -> f32;

    fn surface_type_at(&self, _x: f32, _z: f32) -> SurfaceType {
        0
    }

    fn surface_material(&self, _surface: SurfaceType) -> Option<Arc<Material>> {
        None
    }

    /// Spacing of height samples in world units
    fn grid_step(&self) -> f32 {
        1.0
    }
}

/// Triangulate the heightfield inside `area`, keeping only grid quads whose
/// height range overlaps the box vertically.
///
/// Each quad is split along the diagonal that keeps matching surface types
/// together, and every triangle takes a single surface type so materials are
/// never blended across a type boundary.
pub fn triangulate(sampler: &dyn TerrainSampler, area: &Aabb) -> Vec<LooseTriangle> {
    let step = sampler.grid_step();
    if step <= 0.0 {
        return Vec::new();
    }

    let x0 = (area.min.x / step).floor() as i64;
    let x1 = (area.max.x / step).ceil() as i64;
    let z0 = (area.min.z / step).floor() as i64;
    let z1 = (area.max.z / step).ceil() as i64;

    let mut out = Vec::new();
    for gz in z0..z1 {
        for gx in x0..x1 {
            let (xa, xb) = (gx as f32 * step, (gx + 1) as f32 * step);
            let (za, zb) = (gz as f32 * step, (gz + 1) as f32 * step);

            let h = [
                sampler.height_at(xa, za),
                sampler.height_at(xb, za),
                sampler.height_at(xa, zb),
                sampler.height_at(xb, zb),
            ];
            let lo = h.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = h.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if hi < area.min.y || lo > area.max.y {
                continue;
            }

            let p00 = Vec3::new(xa, h[0], za);
            let p10 = Vec3::new(xb, h[1], za);
            let p01 = Vec3::new(xa, h[2], zb);
            let p11 = Vec3::new(xb, h[3], zb);
            let t = [
                sampler.surface_type_at(xa, za),
                sampler.surface_type_at(xb, za),
                sampler.surface_type_at(xa, zb),
                sampler.surface_type_at(xb, zb),
            ];

            // default diagonal 00-11, flipped when only the other pair agrees
            let flip = t[0] != t[3] && t[1] == t[2];
            let (first, second) = if flip {
                (([p00, p01, p10], [t[0], t[2], t[1]]), ([p10, p01, p11], [t[1], t[2], t[3]]))
            } else {
                (([p00, p11, p10], [t[0], t[3], t[1]]), ([p00, p01, p11], [t[0], t[2], t[3]]))
            };

            for (positions, types) in [first, second] {
                out.push(LooseTriangle {
                    positions,
                    material: sampler.surface_material(dominant(types)),
                });
            }
        }
    }
    out
}

/// Most frequent surface type among three corners, ties going to the first
fn dominant(types: [SurfaceType; 3]) -> SurfaceType {
    if types[1] == types[2] { types[1] } else { types[0] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::triangle::face_normal;

    struct Flat {
        height: f32,
    }

    impl TerrainSampler for Flat {
        fn height_at(&self, _x: f32, _z: f32) -> f32 {
            self.height
        }
    }

    /// Surface type 1 only near the (1, 1) corner of the unit cell
    struct Split;

    impl TerrainSampler for Split {
        fn height_at(&self, _x: f32, _z: f32) -> f32 {
            0.0
        }

        fn surface_type_at(&self, x: f32, z: f32) -> SurfaceType {
            if x + z >= 1.5 { 1 } else { 0 }
        }

        fn surface_material(&self, surface: SurfaceType) -> Option<Arc<Material>> {
            Some(Arc::new(Material::opaque(format!("s{surface}"), Vec3::ONE)))
        }
    }

    #[test]
    fn test_flat_patch_faces_up() {
        let terrain = Flat { height: 2.0 };
        let area = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 4.0, 4.0));
        let tris = triangulate(&terrain, &area);
        assert_eq!(tris.len(), 4 * 4 * 2);
        for t in &tris {
            let [a, b, c] = t.positions;
            assert!(face_normal(a, b, c).y > 0.99);
        }
    }

    #[test]
    fn test_vertical_clip() {
        let terrain = Flat { height: 10.0 };
        let below = Aabb::new(Vec3::ZERO, Vec3::new(4.0, 4.0, 4.0));
        assert!(triangulate(&terrain, &below).is_empty());
    }

    #[test]
    fn test_diagonal_isolates_odd_corner() {
        let tris = triangulate(&Split, &Aabb::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0)));
        assert_eq!(tris.len(), 2);
        for t in &tris {
            let [a, b, c] = t.positions;
            assert!(face_normal(a, b, c).y > 0.99);
        }
        // split runs 10-01 so the type-1 corner touches only one triangle
        let corner = Vec3::new(1.0, 0.0, 1.0);
        let touching = tris.iter().filter(|t| t.positions.contains(&corner)).count();
        assert_eq!(touching, 1);
        let names: Vec<_> = tris
            .iter()
            .map(|t| t.material.as_ref().map(|m| m.name.clone()).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["s0".to_string(), "s0".to_string()]);
    }

    #[test]
    fn test_dominant() {
        assert_eq!(dominant([0, 1, 1]), 1);
        assert_eq!(dominant([2, 1, 0]), 2);
        assert_eq!(dominant([3, 3, 0]), 3);
    }
}
