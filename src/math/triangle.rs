//! Triangle queries used by the voxelizer

use crate::core::types::Vec3;

/// Squared length below which two vertices are treated as coincident
pub const COINCIDENT_EPSILON_SQ: f32 = 1.0e-12;

/// Twice the triangle area below which a triangle is degenerate
pub const DEGENERATE_AREA_EPSILON: f32 = 1.0e-10;

/// Returns true when two vertices coincide or the triangle has no area
pub fn is_degenerate(a: Vec3, b: Vec3, c: Vec3) -> bool {
    if a.distance_squared(b) < COINCIDENT_EPSILON_SQ
        || b.distance_squared(c) < COINCIDENT_EPSILON_SQ
        || c.distance_squared(a) < COINCIDENT_EPSILON_SQ
    {
        return true;
    }
    (b - a).cross(c - a).length() < DEGENERATE_AREA_EPSILON
}

/// Unit face normal (zero for degenerate triangles)
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Closest point on triangle `abc` to `p` (Ericson, Real-Time Collision Detection 5.1.5)
pub fn closest_point(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Sphere vs. triangle overlap test
pub fn sphere_intersects(center: Vec3, radius: f32, a: Vec3, b: Vec3, c: Vec3) -> bool {
    closest_point(center, a, b, c).distance_squared(center) <= radius * radius
}

/// Barycentric weights `(u, v, w)` of `p` relative to `abc`.
///
/// A triangle with zero double-area yields `(1, 0, 0)` so the first
/// vertex dominates.
pub fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f32::EPSILON * d00.max(d11).max(1.0) {
        return Vec3::X;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vec3::new(1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    const B: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    const C: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    #[test]
    fn test_degenerate() {
        assert!(!is_degenerate(A, B, C));
        assert!(is_degenerate(A, A, C));
        assert!(is_degenerate(A, B, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_closest_point_regions() {
        // Above the face
        assert_eq!(closest_point(Vec3::new(0.25, 0.25, 1.0), A, B, C), Vec3::new(0.25, 0.25, 0.0));
        // Vertex region
        assert_eq!(closest_point(Vec3::new(-1.0, -1.0, 0.0), A, B, C), A);
        // Edge region
        let p = closest_point(Vec3::new(0.5, -1.0, 0.0), A, B, C);
        assert!((p - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_sphere_intersects() {
        assert!(sphere_intersects(Vec3::new(0.25, 0.25, 0.4), 0.5, A, B, C));
        assert!(!sphere_intersects(Vec3::new(0.25, 0.25, 0.6), 0.5, A, B, C));
    }

    #[test]
    fn test_barycentric() {
        let bary = barycentric(Vec3::new(0.25, 0.25, 0.0), A, B, C);
        assert!((bary - Vec3::new(0.5, 0.25, 0.25)).length() < 1e-6);
        assert_eq!(barycentric(B, A, B, C), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_barycentric_degenerate_falls_back_to_first_vertex() {
        assert_eq!(barycentric(Vec3::ONE, A, A, A), Vec3::X);
    }
}
