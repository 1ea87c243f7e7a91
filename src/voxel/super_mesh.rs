//! Merged triangle set for one voxelization pass
//!
//! Geometry from meshes, terrain and vis areas is gathered into a single
//! indexed mesh in node-local coordinates (relative to the node's minimum
//! corner) before it is rasterized into a brick. Degenerate triangles are
//! dropped here, and vertices are pushed along their averaged normals by the
//! requested surface offset. Vertex normals are angle weighted so box
//! corners move along their diagonals.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::math::triangle::{face_normal, is_degenerate};
use crate::math::Aabb;
use crate::scene::material::srgba_to_linear;
use crate::scene::{LooseTriangle, Material, MeshSnapshot};

/// Grid used to weld loose vertices when averaging normals
const WELD_QUANTUM: f32 = 1.0e-3;

/// Interior angle of a triangle at corner `k`, used to weight vertex normals
fn corner_angle(p: [Vec3; 3], k: usize) -> f32 {
    let e1 = p[(k + 1) % 3] - p[k];
    let e2 = p[(k + 2) % 3] - p[k];
    e1.angle_between(e2)
}

#[derive(Clone, Copy, Debug)]
pub struct SuperVertex {
    pub position: Vec3,
    pub uv: Vec2,
    /// Linear vertex color with alpha
    pub color: Vec4,
}

#[derive(Clone, Copy, Debug)]
pub struct SuperTriangle {
    pub indices: [u32; 3],
    /// Face normal of the source triangle before offsetting
    pub normal: Vec3,
    pub material: u32,
}

#[derive(Debug)]
pub struct SuperMesh {
    anchor: Vec3,
    clip: Aabb,
    pub vertices: Vec<SuperVertex>,
    pub triangles: Vec<SuperTriangle>,
    pub materials: Vec<Arc<Material>>,
    dropped: usize,
}

impl SuperMesh {
    /// Empty mesh for the world-space `clip` box, anchored at its minimum
    pub fn new(clip: Aabb) -> Self {
        Self::with_anchor(clip.min, clip)
    }

    pub fn with_anchor(anchor: Vec3, clip: Aabb) -> Self {
        Self {
            anchor,
            clip: clip.translated(-anchor),
            vertices: Vec::new(),
            triangles: Vec::new(),
            materials: Vec::new(),
            dropped: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Degenerate triangles skipped so far
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    pub fn triangle_positions(&self, tri: &SuperTriangle) -> [Vec3; 3] {
        tri.indices.map(|i| self.vertices[i as usize].position)
    }

    fn material_index(&mut self, material: Option<&Arc<Material>>) -> u32 {
        let material = material.cloned().unwrap_or_else(Material::shared_fallback);
        if let Some(i) = self.materials.iter().position(|m| Arc::ptr_eq(m, &material)) {
            return i as u32;
        }
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    fn overlaps_clip(&self, p: [Vec3; 3]) -> bool {
        Aabb::from_points(p).is_some_and(|b| b.intersects(&self.clip))
    }

    /// Append an indexed mesh, returning how many triangles were kept
    pub fn add_mesh(&mut self, mesh: &MeshSnapshot, offset: f32) -> usize {
        let local: Vec<Vec3> = mesh.positions.iter().map(|&p| p - self.anchor).collect();
        let vertex_count = local.len() as u32;

        let mut accepted = Vec::with_capacity(mesh.indices.len() / 3);
        let mut normal_sums = vec![Vec3::ZERO; local.len()];
        for tri in mesh.indices.chunks_exact(3) {
            if tri.iter().any(|&i| i >= vertex_count) {
                self.dropped += 1;
                continue;
            }
            let p = [0, 1, 2].map(|k| local[tri[k] as usize]);
            if is_degenerate(p[0], p[1], p[2]) {
                self.dropped += 1;
                continue;
            }
            let n = face_normal(p[0], p[1], p[2]);
            for (k, &i) in tri.iter().enumerate() {
                normal_sums[i as usize] += n * corner_angle(p, k);
            }
            accepted.push(([tri[0], tri[1], tri[2]], p, n));
        }

        let material = self.material_index(mesh.material.as_ref());
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut kept = 0;

        for (tri, p, normal) in accepted {
            let moved = [0, 1, 2].map(|k| p[k] + normal_sums[tri[k] as usize].normalize_or_zero() * offset);
            if !self.overlaps_clip(moved) {
                continue;
            }
            let mut indices = [0u32; 3];
            for k in 0..3 {
                let src = tri[k];
                indices[k] = *remap.entry(src).or_insert_with(|| {
                    let color = mesh
                        .colors
                        .as_ref()
                        .and_then(|c| c.get(src as usize))
                        .map(|&c| srgba_to_linear(c))
                        .unwrap_or(Vec4::ONE);
                    self.vertices.push(SuperVertex {
                        position: moved[k],
                        uv: mesh.uvs.get(src as usize).copied().unwrap_or(Vec2::ZERO),
                        color,
                    });
                    (self.vertices.len() - 1) as u32
                });
            }
            self.triangles.push(SuperTriangle { indices, normal, material });
            kept += 1;
        }
        kept
    }

    /// Append unindexed triangles, welding coincident corners for normal
    /// averaging. Returns how many triangles were kept.
    pub fn add_loose(&mut self, triangles: &[LooseTriangle], offset: f32) -> usize {
        let key = |p: Vec3| (p / WELD_QUANTUM).round().as_ivec3();

        let mut accepted = Vec::with_capacity(triangles.len());
        let mut normal_sums: HashMap<glam::IVec3, Vec3> = HashMap::new();
        for t in triangles {
            let p = t.positions.map(|p| p - self.anchor);
            if is_degenerate(p[0], p[1], p[2]) {
                self.dropped += 1;
                continue;
            }
            let n = face_normal(p[0], p[1], p[2]);
            for (k, q) in p.into_iter().enumerate() {
                *normal_sums.entry(key(q)).or_insert(Vec3::ZERO) += n * corner_angle(p, k);
            }
            accepted.push((t, p, n));
        }

        let mut kept = 0;
        for (t, p, normal) in accepted {
            let moved = p.map(|q| {
                let n = normal_sums.get(&key(q)).copied().unwrap_or(normal);
                q + n.normalize_or_zero() * offset
            });
            if !self.overlaps_clip(moved) {
                continue;
            }
            let material = self.material_index(t.material.as_ref());
            let base = self.vertices.len() as u32;
            for q in moved {
                self.vertices.push(SuperVertex {
                    position: q,
                    uv: Vec2::new(q.x, q.z),
                    color: Vec4::ONE,
                });
            }
            self.triangles.push(SuperTriangle {
                indices: [base, base + 1, base + 2],
                normal,
                material,
            });
            kept += 1;
        }
        kept
    }
}
