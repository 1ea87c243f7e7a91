//! Light gathering for voxel cone tracing
//!
//! Registered lights are culled against a search radius around the camera,
//! ranked by how strongly they can affect the view, and split into a static
//! bucket and a dynamic bucket of GPU records.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// How often a light changes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightMobility {
    #[default]
    Static,
    /// Changes rarely; gathered with static lights
    SemiStatic,
    Dynamic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightSource {
    pub position: Vec3,
    pub radius: f32,
    /// Spot direction; zero for omni lights
    pub direction: Vec3,
    /// Cosine of the spot half angle, ignored for omni lights
    pub cone_cos: f32,
    /// Linear color times intensity
    pub color: Vec3,
    pub mobility: LightMobility,
}

impl LightSource {
    pub fn omni(position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            position,
            radius,
            direction: Vec3::ZERO,
            cone_cos: -1.0,
            color,
            mobility: LightMobility::Static,
        }
    }

    pub fn spot(position: Vec3, radius: f32, direction: Vec3, half_angle: f32, color: Vec3) -> Self {
        Self {
            position,
            radius,
            direction: direction.normalize_or_zero(),
            cone_cos: half_angle.cos(),
            color,
            mobility: LightMobility::Static,
        }
    }

    pub fn with_mobility(mut self, mobility: LightMobility) -> Self {
        self.mobility = mobility;
        self
    }

    /// Attenuation-based rank; smaller sorts first
    pub fn sort_value(&self, eye: Vec3) -> f32 {
        let radius = self.radius.max(1e-3);
        let distance = (self.position.distance(eye) - radius).max(0.0);
        let intensity = self.color.max_element().max(1e-6);
        (distance / radius + 1.0).powi(2) / intensity
    }
}

/// GPU light record - 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightTi {
    /// xyz position, w radius
    pub pos_r: [f32; 4],
    /// xyz direction, w cone cosine
    pub dir_f: [f32; 4],
    /// rgb color, w 1 for dynamic lights
    pub col: [f32; 4],
    pub sort_val: f32,
    _padding: [f32; 3],
}

impl LightTi {
    pub fn from_source(light: &LightSource, sort_val: f32) -> Self {
        let p = light.position;
        let d = light.direction;
        let c = light.color;
        let dynamic = if light.mobility == LightMobility::Dynamic { 1.0 } else { 0.0 };
        Self {
            pos_r: [p.x, p.y, p.z, light.radius],
            dir_f: [d.x, d.y, d.z, light.cone_cos],
            col: [c.x, c.y, c.z, dynamic],
            sort_val,
            _padding: [0.0; 3],
        }
    }
}

/// Lights gathered for one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightBuckets {
    pub static_lights: Vec<LightTi>,
    pub dynamic_lights: Vec<LightTi>,
}

/// Gather lights whose influence sphere reaches within `search_radius` of
/// the eye, best first, at most `max_per_bucket` per bucket.
pub fn collect_lights<'a>(
    lights: impl IntoIterator<Item = &'a LightSource>,
    eye: Vec3,
    search_radius: f32,
    max_per_bucket: usize,
) -> LightBuckets {
    let mut buckets = LightBuckets::default();
    for light in lights {
        if light.position.distance(eye) - light.radius > search_radius {
            continue;
        }
        let record = LightTi::from_source(light, light.sort_value(eye));
        match light.mobility {
            LightMobility::Dynamic => buckets.dynamic_lights.push(record),
            LightMobility::Static | LightMobility::SemiStatic => buckets.static_lights.push(record),
        }
    }

    for bucket in [&mut buckets.static_lights, &mut buckets.dynamic_lights] {
        bucket.sort_by(|a, b| a.sort_val.total_cmp(&b.sort_val));
        bucket.truncate(max_per_bucket);
    }
    buckets
}
