//! Immutable mesh snapshots handed to the voxel environment
//!
//! A snapshot is created by the host when an entity is inserted or moved and
//! is shared read-only with worker jobs through `Arc`. Positions are world
//! space.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use super::material::Material;
use crate::math::Aabb;

/// How a mesh is expected to change over its lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MeshMobility {
    #[default]
    Static,
    Dynamic,
}

/// World-space triangle mesh with optional per-vertex attributes
#[derive(Clone, Debug)]
pub struct MeshSnapshot {
    pub world_box: Aabb,
    pub positions: Vec<Vec3>,
    /// Per-vertex texture coordinates; empty when the mesh has none
    pub uvs: Vec<Vec2>,
    /// Per-vertex sRGB colors
    pub colors: Option<Vec<[u8; 4]>>,
    pub indices: Vec<u32>,
    pub material: Option<Arc<Material>>,
    pub mobility: MeshMobility,
}

impl MeshSnapshot {
    /// Build a snapshot, computing its bounds from the positions
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, material: Option<Arc<Material>>) -> Self {
        let world_box = Aabb::from_points(positions.iter().copied())
            .unwrap_or_else(|| Aabb::new(Vec3::ZERO, Vec3::ZERO));
        Self {
            world_box,
            positions,
            uvs: Vec::new(),
            colors: None,
            indices,
            material,
            mobility: MeshMobility::Static,
        }
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 4]>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn with_mobility(mut self, mobility: MeshMobility) -> Self {
        self.mobility = mobility;
        self
    }

    /// Closed box with outward-facing triangles and shared corner vertices
    pub fn cuboid(bounds: Aabb, material: Option<Arc<Material>>) -> Self {
        let (lo, hi) = (bounds.min, bounds.max);
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { hi.x } else { lo.x },
                    if i & 2 != 0 { hi.y } else { lo.y },
                    if i & 4 != 0 { hi.z } else { lo.z },
                )
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 4, 6,  0, 6, 2, // -x
            1, 3, 7,  1, 7, 5, // +x
            0, 1, 5,  0, 5, 4, // -y
            2, 6, 7,  2, 7, 3, // +y
            0, 2, 3,  0, 3, 1, // -z
            4, 5, 7,  4, 7, 6, // +z
        ];
        Self::new(positions, indices, material)
    }

    /// Axis-aligned quad in the XZ plane facing +Y
    pub fn quad_xz(min: Vec2, max: Vec2, y: f32, material: Option<Arc<Material>>) -> Self {
        let positions = vec![
            Vec3::new(min.x, y, min.y),
            Vec3::new(max.x, y, min.y),
            Vec3::new(max.x, y, max.y),
            Vec3::new(min.x, y, max.y),
        ];
        let uvs = vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        Self::new(positions, vec![0, 2, 1, 0, 3, 2], material).with_uvs(uvs)
    }

    /// Copy of this mesh moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        let mut moved = self.clone();
        for p in &mut moved.positions {
            *p += offset;
        }
        moved.world_box = self.world_box.translated(offset);
        moved
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_dynamic(&self) -> bool {
        self.mobility == MeshMobility::Dynamic
    }
}

/// Unindexed triangle produced by procedural sources (terrain, vis areas)
#[derive(Clone, Debug)]
pub struct LooseTriangle {
    pub positions: [Vec3; 3],
    pub material: Option<Arc<Material>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::triangle::face_normal;

    #[test]
    fn test_cuboid_faces_point_outward() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let mesh = MeshSnapshot::cuboid(bounds, None);
        assert_eq!(mesh.triangle_count(), 12);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[tri[k] as usize]);
            let n = face_normal(a, b, c);
            let centroid = (a + b + c) / 3.0;
            assert!(n.dot(centroid) > 0.0, "inward face {:?}", tri);
        }
    }

    #[test]
    fn test_quad_faces_up() {
        let mesh = MeshSnapshot::quad_xz(Vec2::ZERO, Vec2::ONE, 2.0, None);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[tri[k] as usize]);
            assert!(face_normal(a, b, c).y > 0.99);
        }
        assert_eq!(mesh.world_box.min.y, 2.0);
    }

    #[test]
    fn test_translated_moves_bounds() {
        let mesh = MeshSnapshot::cuboid(Aabb::new(Vec3::ZERO, Vec3::ONE), None);
        let moved = mesh.translated(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.world_box.min.x, 10.0);
        assert_eq!(moved.positions[0].x, 10.0);
    }
}
