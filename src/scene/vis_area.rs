//! Indoor visibility areas
//!
//! A vis area is a prism defined by a floor polygon and a height. Its walls,
//! floor and ceiling are voxelized as occluders so light does not leak into
//! enclosed spaces.

use std::sync::Arc;

use glam::Vec3;

use super::material::Material;
use super::mesh::LooseTriangle;
use crate::math::Aabb;

#[derive(Clone, Debug)]
pub struct VisArea {
    pub name: String,
    /// Convex floor polygon wound so its fan normal points up (+Y)
    pub footprint: Vec<Vec3>,
    pub height: f32,
    pub material: Option<Arc<Material>>,
}

impl VisArea {
    pub fn new(name: impl Into<String>, footprint: Vec<Vec3>, height: f32) -> Self {
        Self {
            name: name.into(),
            footprint,
            height,
            material: None,
        }
    }

    pub fn with_material(mut self, material: Arc<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let up = Vec3::Y * self.height;
        Aabb::from_points(self.footprint.iter().flat_map(|&p| [p, p + up]))
    }

    /// Wall quads plus fan-triangulated floor and ceiling, facing inward
    pub fn boundary_triangles(&self) -> Vec<LooseTriangle> {
        let n = self.footprint.len();
        if n < 3 {
            return Vec::new();
        }
        let up = Vec3::Y * self.height;
        let tri = |a: Vec3, b: Vec3, c: Vec3| LooseTriangle {
            positions: [a, b, c],
            material: self.material.clone(),
        };

        let mut out = Vec::with_capacity(n * 2 + (n - 2) * 2);
        for i in 0..n {
            let a = self.footprint[i];
            let b = self.footprint[(i + 1) % n];
            out.push(tri(a, b + up, b));
            out.push(tri(a, a + up, b + up));
        }
        let base = self.footprint[0];
        for i in 1..n - 1 {
            let b = self.footprint[i];
            let c = self.footprint[i + 1];
            out.push(tri(base, b, c));
            out.push(tri(base + up, c + up, b + up));
        }
        out
    }
}
