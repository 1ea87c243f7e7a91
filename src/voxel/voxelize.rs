//! Triangle to brick rasterization
//!
//! Each triangle is tested only against the cells covered by its bounding
//! box. A cell is rejected early by the distance from its center to the
//! triangle plane, then by an exact sphere/triangle test, and finally
//! sampled on a 4×4×4 sub-grid. Sub-samples that hit the triangle are shaded
//! and averaged into one contribution for the cell.

use glam::{UVec3, Vec3, Vec4Swizzles};

use super::brick::cell_index;
use super::scratch::ScratchBuffer;
use super::super_mesh::SuperMesh;
use crate::math::triangle::{barycentric, closest_point, face_normal, sphere_intersects};

/// Sub-samples per cell along each axis
pub const SUBSAMPLES: u32 = 4;

const HALF_DIAGONAL: f32 = 0.866_025_4; // sqrt(3) / 2

/// Statistics of one rasterization pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoxelizeStats {
    pub triangles: usize,
    pub cells_tested: usize,
    pub cells_hit: usize,
}

/// Rasterize every triangle of `mesh` into `scratch`.
///
/// `node_size` is the world-space edge length of the brick; mesh positions
/// must be relative to the brick's minimum corner.
pub fn process_triangles(mesh: &SuperMesh, node_size: f32, scratch: &mut ScratchBuffer) -> VoxelizeStats {
    let n = scratch.brick_size();
    let mut stats = VoxelizeStats::default();
    if n == 0 || node_size <= 0.0 {
        return stats;
    }

    let cell = node_size / n as f32;
    let radius = cell * HALF_DIAGONAL;
    let sub = cell / SUBSAMPLES as f32;
    let sub_radius_sq = (sub * HALF_DIAGONAL).powi(2);
    let last = (n - 1) as f32;

    for tri in &mesh.triangles {
        stats.triangles += 1;
        let [a, b, c] = mesh.triangle_positions(tri);
        let plane = face_normal(a, b, c);
        if plane == Vec3::ZERO {
            continue;
        }
        let material = &mesh.materials[tri.material as usize];
        let [va, vb, vc] = tri.indices.map(|i| mesh.vertices[i as usize]);

        let lo = ((a.min(b).min(c) - Vec3::splat(radius)) / cell).floor().clamp(Vec3::ZERO, Vec3::splat(last));
        let hi = ((a.max(b).max(c) + Vec3::splat(radius)) / cell).floor().clamp(Vec3::ZERO, Vec3::splat(last));
        let (lo, hi) = (lo.as_uvec3(), hi.as_uvec3());

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    stats.cells_tested += 1;
                    let cell_min = UVec3::new(x, y, z).as_vec3() * cell;
                    let center = cell_min + Vec3::splat(cell * 0.5);

                    if plane.dot(center - a).abs() > radius {
                        continue;
                    }
                    if !sphere_intersects(center, radius, a, b, c) {
                        continue;
                    }

                    let mut hits = 0u32;
                    let mut color = Vec3::ZERO;
                    let mut opacity = 0.0;
                    for sz in 0..SUBSAMPLES {
                        for sy in 0..SUBSAMPLES {
                            for sx in 0..SUBSAMPLES {
                                let sample = cell_min + (UVec3::new(sx, sy, sz).as_vec3() + 0.5) * sub;
                                let p = closest_point(sample, a, b, c);
                                if p.distance_squared(sample) > sub_radius_sq {
                                    continue;
                                }
                                let w = barycentric(p, a, b, c);
                                let uv = va.uv * w.x + vb.uv * w.y + vc.uv * w.z;
                                let vcol = va.color * w.x + vb.color * w.y + vc.color * w.z;
                                let tex = material.sample(uv);

                                color += tex.xyz() * vcol.xyz() * material.diffuse;
                                opacity += material.opacity * tex.w * vcol.w;
                                hits += 1;
                            }
                        }
                    }
                    if hits == 0 {
                        continue;
                    }

                    let inv = 1.0 / hits as f32;
                    scratch.accumulate(
                        cell_index(x, y, z, n),
                        color * inv,
                        opacity * inv,
                        tri.normal,
                        material.emittance,
                    );
                    stats.cells_hit += 1;
                }
            }
        }
    }
    stats
}
