//! Geometry providers queried when a node is voxelized for the first time

use std::sync::Arc;

use super::mesh::MeshSnapshot;
use super::vis_area::VisArea;
use crate::math::Aabb;
use crate::terrain::TerrainSampler;

/// Read-only access to geometry the environment does not track itself.
///
/// Called from worker threads; implementations must be cheap to query for a
/// small box and must not block on the host.
pub trait GeometrySource: Send + Sync {
    /// Static meshes overlapping a world-space box
    fn static_meshes(&self, area: &Aabb) -> Vec<Arc<MeshSnapshot>>;

    fn terrain(&self) -> Option<&dyn TerrainSampler> {
        None
    }

    fn vis_areas(&self, _area: &Aabb) -> Vec<Arc<VisArea>> {
        Vec::new()
    }
}

/// Source with no geometry at all
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyScene;

impl GeometrySource for EmptyScene {
    fn static_meshes(&self, _area: &Aabb) -> Vec<Arc<MeshSnapshot>> {
        Vec::new()
    }
}

/// Fixed set of static geometry with optional terrain
#[derive(Default)]
pub struct StaticScene {
    meshes: Vec<Arc<MeshSnapshot>>,
    vis_areas: Vec<Arc<VisArea>>,
    terrain: Option<Box<dyn TerrainSampler>>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mut self, mesh: MeshSnapshot) -> Self {
        self.meshes.push(Arc::new(mesh));
        self
    }

    pub fn with_vis_area(mut self, area: VisArea) -> Self {
        self.vis_areas.push(Arc::new(area));
        self
    }

    pub fn with_terrain(mut self, terrain: impl TerrainSampler + 'static) -> Self {
        self.terrain = Some(Box::new(terrain));
        self
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

impl GeometrySource for StaticScene {
    fn static_meshes(&self, area: &Aabb) -> Vec<Arc<MeshSnapshot>> {
        self.meshes
            .iter()
            .filter(|m| m.world_box.intersects(area))
            .cloned()
            .collect()
    }

    fn terrain(&self) -> Option<&dyn TerrainSampler> {
        self.terrain.as_deref()
    }

    fn vis_areas(&self, area: &Aabb) -> Vec<Arc<VisArea>> {
        self.vis_areas
            .iter()
            .filter(|v| v.bounds().is_some_and(|b| b.intersects(area)))
            .cloned()
            .collect()
    }
}
