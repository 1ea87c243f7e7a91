//! Surface materials sampled during voxelization

use std::sync::{Arc, LazyLock};

use glam::{Vec2, Vec3, Vec4};
use image::RgbaImage;

static FALLBACK: LazyLock<Arc<Material>> = LazyLock::new(|| Arc::new(Material::fallback()));

/// Convert an 8-bit sRGB channel to linear space
#[inline]
pub fn srgb_to_linear(value: u8) -> f32 {
    let c = value as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert an sRGB color with straight alpha to linear RGB + alpha
#[inline]
pub fn srgba_to_linear(rgba: [u8; 4]) -> Vec4 {
    Vec4::new(
        srgb_to_linear(rgba[0]),
        srgb_to_linear(rgba[1]),
        srgb_to_linear(rgba[2]),
        rgba[3] as f32 / 255.0,
    )
}

/// Surface description used to shade voxels
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    /// Linear diffuse tint, multiplied with texture and vertex color
    pub diffuse: Vec3,
    pub opacity: f32,
    /// Linear emitted radiance
    pub emittance: Vec3,
    /// sRGB diffuse texture, sampled with wrapping
    pub texture: Option<Arc<RgbaImage>>,
}

impl Material {
    /// Opaque untextured material
    pub fn opaque(name: impl Into<String>, diffuse: Vec3) -> Self {
        Self {
            name: name.into(),
            diffuse,
            opacity: 1.0,
            emittance: Vec3::ZERO,
            texture: None,
        }
    }

    /// Mid-gray, fully transparent material used when geometry carries none
    pub fn fallback() -> Self {
        Self {
            name: "fallback".to_string(),
            diffuse: Vec3::splat(0.5),
            opacity: 0.0,
            emittance: Vec3::ZERO,
            texture: None,
        }
    }

    /// Shared instance of [`Material::fallback`]
    pub fn shared_fallback() -> Arc<Material> {
        Arc::clone(&FALLBACK)
    }

    pub fn with_texture(mut self, texture: Arc<RgbaImage>) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_emittance(mut self, emittance: Vec3) -> Self {
        self.emittance = emittance;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Bilinearly filtered texture lookup in linear space.
    ///
    /// Returns white when the material has no texture.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let Some(texture) = &self.texture else {
            return Vec4::ONE;
        };
        let (w, h) = texture.dimensions();
        if w == 0 || h == 0 {
            return Vec4::ONE;
        }

        let x = uv.x.rem_euclid(1.0) * w as f32 - 0.5;
        let y = uv.y.rem_euclid(1.0) * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let texel = |tx: f32, ty: f32| {
            let px = (tx as i64).rem_euclid(w as i64) as u32;
            let py = (ty as i64).rem_euclid(h as i64) as u32;
            srgba_to_linear(texture.get_pixel(px, py).0)
        };

        let top = texel(x0, y0).lerp(texel(x0 + 1.0, y0), fx);
        let bottom = texel(x0, y0 + 1.0).lerp(texel(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(bottom, fy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_srgb_endpoints() {
        assert_eq!(srgb_to_linear(0), 0.0);
        assert!((srgb_to_linear(255) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(128) < 0.5);
    }

    #[test]
    fn test_fallback_is_transparent_gray() {
        let m = Material::shared_fallback();
        assert_eq!(m.diffuse, Vec3::splat(0.5));
        assert_eq!(m.opacity, 0.0);
    }

    #[test]
    fn test_untextured_sample_is_white() {
        let m = Material::opaque("plain", Vec3::ONE);
        assert_eq!(m.sample(Vec2::new(0.3, 0.7)), Vec4::ONE);
    }

    #[test]
    fn test_uniform_texture_sample() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let m = Material::opaque("red", Vec3::ONE).with_texture(Arc::new(img));
        let s = m.sample(Vec2::new(0.51, 0.12));
        assert!((s.x - 1.0).abs() < 1e-5);
        assert!(s.y.abs() < 1e-5);
        assert!((s.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_bilinear_blends_neighbors() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        let m = Material::opaque("ramp", Vec3::ONE).with_texture(Arc::new(img));
        // halfway between the two texel centers
        let s = m.sample(Vec2::new(0.5, 0.5));
        assert!((s.x - 0.5).abs() < 1e-4);
    }
}
