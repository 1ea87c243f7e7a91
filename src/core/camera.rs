//! Camera and the per-frame camera snapshot used for octree culling

use crate::core::types::{Vec3, Mat4};
use crate::math::{Aabb, Frustum};
use glam::Quat;

/// Camera with position, rotation, and projection parameters
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation as quaternion
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);

        let rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));

        Self {
            rotation,
            ..Self::new(position, 60.0, 16.0 / 9.0)
        }
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation.conjugate());
        let translation_matrix = Mat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Freeze the current camera state for one update pass
    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            position: self.position,
            frustum: Some(Frustum::from_view_projection(&self.view_projection())),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}

/// Immutable camera state used by a single octree update pass.
///
/// Culling and eviction decisions within a frame are made against one
/// snapshot so they stay consistent with each other.
#[derive(Clone, Debug)]
pub struct CameraSnapshot {
    /// World-space eye position
    pub position: Vec3,
    /// View frustum; `None` means every box is visible
    pub frustum: Option<Frustum>,
}

impl CameraSnapshot {
    /// Snapshot that treats the whole world as visible
    pub fn unbounded(position: Vec3) -> Self {
        Self { position, frustum: None }
    }

    /// Frustum test over a world-space box
    pub fn is_visible(&self, world_box: &Aabb) -> bool {
        match &self.frustum {
            Some(frustum) => frustum.intersects_aabb(world_box),
            None => true,
        }
    }

    /// Distance from the eye to the closest point of a box (0 inside)
    pub fn distance_to(&self, world_box: &Aabb) -> f32 {
        world_box.distance_to_point(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward() {
        let camera = Camera::default();
        assert!((camera.forward().z - (-1.0)).abs() < 0.001);
    }

    #[test]
    fn test_view_matrix_translation() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(10.0, 0.0, 0.0);

        let origin_in_camera = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((origin_in_camera.x - (-10.0)).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_culls_behind_camera() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0), Vec3::Y);
        let snapshot = camera.snapshot();

        let ahead = Aabb::new(Vec3::new(-1.0, -1.0, -12.0), Vec3::new(1.0, 1.0, -10.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 10.0), Vec3::new(1.0, 1.0, 12.0));
        assert!(snapshot.is_visible(&ahead));
        assert!(!snapshot.is_visible(&behind));
    }

    #[test]
    fn test_unbounded_sees_everything() {
        let snapshot = CameraSnapshot::unbounded(Vec3::ZERO);
        let far_away = Aabb::new(Vec3::splat(1.0e6), Vec3::splat(1.0e6 + 1.0));
        assert!(snapshot.is_visible(&far_away));
        assert!(snapshot.distance_to(&far_away) > 1.0e6);
    }
}
