//! Reference evaluation of the lit shading model.
//!
//! Mirrors `shade()` in `shaders/lighting.wgsl`. The GPU path is the one that
//! draws; this one pins the rules down where tests can reach them.

use crate::light::{cube_face_for, shadow_slot};
use crate::uniforms::{LightUniform, LitTransformUniform, LIGHT_SLOTS};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Read access to shadow-map depth.
pub trait ShadowLookup {
    /// Stored depth at `uv` in shadow slot `slot`.
    fn depth(&self, slot: usize, uv: Vec2) -> f32;
}

/// A fragment to shade, in world space.
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec4,
}

/// One light's share of a fragment's colour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LightTerms {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
}

/// Smooth cone falloff: 0 outside the outer cone, 1 inside the inner cone.
pub fn spot_factor(cone_cos: f32, cos_outer: f32, cos_inner: f32, falloff: f32) -> f32 {
    let span = (cos_inner - cos_outer).max(1e-4);
    let t = ((cone_cos - cos_outer) / span).clamp(0.0, 1.0);
    if t <= 0.0 {
        return 0.0;
    }
    let smooth = t * t * (3.0 - 2.0 * t);
    smooth.powf(falloff.max(0.0))
}

pub fn attenuation_factor(attenuation: f32, distance: f32) -> f32 {
    1.0 / (1.0 + attenuation.max(0.0) * distance)
}

/// 1 when the fragment is lit by slot `slot`, 0 when occluded.
///
/// Fragments outside the light's frustum count as lit.
pub fn shadow_factor(
    position: Vec3,
    light_view: Mat4,
    light_projection: Mat4,
    bias: f32,
    slot: usize,
    shadows: &dyn ShadowLookup,
) -> f32 {
    let clip = light_projection * light_view * position.extend(1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.xyz() / clip.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5);
    let inside = (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y) && (0.0..=1.0).contains(&ndc.z);
    if !inside {
        return 1.0;
    }
    if ndc.z - bias <= shadows.depth(slot, uv) {
        1.0
    } else {
        0.0
    }
}

/// Contribution of light `i`. Disabled lights contribute nothing and never
/// touch their shadow slots.
pub fn light_terms(
    i: usize,
    point: &SurfacePoint,
    camera: Vec3,
    lights: &LightUniform,
    transforms: &LitTransformUniform,
    shadows: &dyn ShadowLookup,
) -> LightTerms {
    let [attenuation, bias, specular_power, enabled] = lights.params[i];
    if enabled < 0.5 {
        return LightTerms::default();
    }
    let [kind, cos_outer, cos_inner, falloff] = lights.shape[i];
    let light_pos = Vec4::from_array(lights.position[i]).xyz();
    let light_dir = Vec4::from_array(lights.direction[i]).xyz().normalize_or_zero();
    let normal = point.normal.normalize_or_zero();

    let (to_light, mut strength, face) = if kind == 1.0 {
        (-light_dir, 1.0, 0)
    } else {
        let offset = light_pos - point.position;
        let distance = offset.length().max(1e-4);
        let face = if kind == 0.0 { cube_face_for(-offset) } else { 0 };
        (offset / distance, attenuation_factor(attenuation, distance), face)
    };
    if kind == 2.0 {
        strength *= spot_factor((-to_light).dot(light_dir), cos_outer, cos_inner, falloff);
    }

    let slot = shadow_slot(i, face);
    let view = Mat4::from_cols_array_2d(&transforms.light_view[slot]);
    let projection = Mat4::from_cols_array_2d(&transforms.light_projection[i]);
    let lit = shadow_factor(point.position, view, projection, bias, slot, shadows);

    let n_dot_l = normal.dot(to_light).max(0.0);
    let diffuse = Vec4::from_array(lights.diffuse[i]) * n_dot_l * strength * lit;

    let specular = if specular_power > 0.0 && n_dot_l > 0.0 {
        let to_eye = (camera - point.position).normalize_or_zero();
        let half = (to_light + to_eye).normalize_or_zero();
        Vec4::from_array(lights.specular[i]) * normal.dot(half).max(0.0).powf(specular_power) * strength * lit
    } else {
        Vec4::ZERO
    };

    LightTerms {
        ambient: Vec4::from_array(lights.ambient[i]),
        diffuse,
        specular,
    }
}

/// Final colour of a fragment under all four lights.
pub fn shade(
    point: &SurfacePoint,
    camera: Vec3,
    lights: &LightUniform,
    transforms: &LitTransformUniform,
    shadows: &dyn ShadowLookup,
) -> Vec4 {
    let mut ambient = Vec4::ZERO;
    let mut diffuse = Vec4::ZERO;
    let mut specular = Vec4::ZERO;
    for i in 0..LIGHT_SLOTS {
        let terms = light_terms(i, point, camera, lights, transforms, shadows);
        ambient += terms.ambient;
        diffuse += terms.diffuse;
        specular += terms.specular;
    }
    let base = (ambient + diffuse).clamp(Vec4::ZERO, Vec4::ONE) * point.albedo;
    (base + specular).truncate().extend(point.albedo.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{default_lights, Light, LightKind};
    use crate::lighting::LightingState;
    use std::cell::RefCell;

    /// Shadow maps that are either all clear or all occluding, remembering every read.
    struct MockShadows {
        stored: f32,
        reads: RefCell<Vec<usize>>,
    }

    impl MockShadows {
        fn clear() -> Self {
            Self {
                stored: 1.0,
                reads: RefCell::new(Vec::new()),
            }
        }

        fn occluding() -> Self {
            Self {
                stored: 0.0,
                reads: RefCell::new(Vec::new()),
            }
        }
    }

    impl ShadowLookup for MockShadows {
        fn depth(&self, slot: usize, _uv: Vec2) -> f32 {
            self.reads.borrow_mut().push(slot);
            self.stored
        }
    }

    fn only(light: Light, slot: usize) -> [Light; 4] {
        let mut lights = default_lights();
        for l in lights.iter_mut() {
            l.enabled = false;
        }
        lights[slot] = light;
        lights
    }

    fn floor_point(x: f32, z: f32) -> SurfacePoint {
        SurfacePoint {
            position: Vec3::new(x, -10.0, z),
            normal: Vec3::Y,
            albedo: Vec4::ONE,
        }
    }

    fn overhead_point_light() -> Light {
        let mut light = default_lights()[0];
        light.position = Vec3::new(0.0, 20.0, 0.0);
        light.near = 1.0;
        light.ambient = Vec4::ZERO;
        light
    }

    fn eval(lights: &[Light; 4], point: &SurfacePoint, shadows: &MockShadows) -> Vec4 {
        let lighting = LightingState::build(lights, false);
        let transforms = lighting.lit_transforms(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);
        shade(point, Vec3::new(0.0, 10.0, -60.0), lighting.light_uniform(), &transforms, shadows)
    }

    /// A disabled light adds nothing and its shadow slots are never read.
    #[test]
    fn disabled_light_contributes_nothing() {
        let mut light = overhead_point_light();
        light.ambient = Vec4::new(0.3, 0.3, 0.3, 1.0);
        light.specular = Vec4::ONE;
        let point = floor_point(1.0, 1.0);

        let shadows = MockShadows::clear();
        let lit = eval(&only(light, 0), &point, &shadows);
        assert!(lit.x > 0.3);
        assert!(!shadows.reads.borrow().is_empty());

        light.enabled = false;
        let shadows = MockShadows::clear();
        let dark = eval(&only(light, 0), &point, &shadows);
        assert_eq!(dark.truncate(), Vec3::ZERO);
        assert!(shadows.reads.borrow().is_empty());
    }

    /// Occlusion removes diffuse and specular but keeps ambient.
    #[test]
    fn occluded_fragment_keeps_ambient_only() {
        let mut light = overhead_point_light();
        light.ambient = Vec4::new(0.1, 0.1, 0.1, 1.0);
        let point = floor_point(2.0, 0.0);
        let lit = eval(&only(light, 0), &point, &MockShadows::clear());
        let shadowed = eval(&only(light, 0), &point, &MockShadows::occluding());
        assert!(lit.x > shadowed.x);
        assert!((shadowed.x - 0.1).abs() < 1e-5);
    }

    /// A fragment straight below a point light samples the -Y face.
    #[test]
    fn point_light_samples_dominant_face() {
        let light = overhead_point_light();
        let shadows = MockShadows::clear();
        eval(&only(light, 0), &floor_point(0.5, -0.5), &shadows);
        assert_eq!(shadows.reads.borrow().as_slice(), &[shadow_slot(0, 0)]);

        let shadows = MockShadows::clear();
        let mut side = light;
        side.position = Vec3::new(-40.0, -9.0, 0.0);
        let point = SurfacePoint {
            normal: Vec3::NEG_X,
            ..floor_point(0.0, 0.0)
        };
        eval(&only(side, 2), &point, &shadows);
        assert!(shadows.reads.borrow().iter().all(|&s| s == shadow_slot(2, 2)));
    }

    /// Spot lights are dark outside the outer cone and full inside the inner cone.
    #[test]
    fn spot_cone() {
        assert_eq!(spot_factor(0.5, 0.9, 0.95, 5.0), 0.0);
        assert_eq!(spot_factor(0.99, 0.9, 0.95, 5.0), 1.0);
        let mid = spot_factor(0.925, 0.9, 0.95, 1.0);
        assert!(mid > 0.0 && mid < 1.0);

        let mut spot = overhead_point_light();
        spot.kind = LightKind::Spot;
        spot.set_direction(Vec3::NEG_Y);
        let below = eval(&only(spot, 3), &floor_point(0.0, 0.1), &MockShadows::clear());
        let outside = eval(&only(spot, 3), &floor_point(40.0, 0.0), &MockShadows::clear());
        assert!(below.x > 0.5);
        assert_eq!(outside.truncate(), Vec3::ZERO);
    }

    /// Directional lights ignore distance.
    #[test]
    fn directional_light_does_not_attenuate() {
        let mut sun = default_lights()[2];
        sun.attenuation = 1.0;
        sun.ambient = Vec4::ZERO;
        sun.set_direction(Vec3::NEG_Y);
        sun.position = Vec3::new(0.0, 40.0, 0.0);
        let near = eval(&only(sun, 2), &floor_point(0.0, 0.0), &MockShadows::clear());
        let far = eval(&only(sun, 2), &floor_point(30.0, 30.0), &MockShadows::clear());
        assert!((near.x - far.x).abs() < 1e-5);
        assert!(near.x > 0.0);
    }

    #[test]
    fn attenuation_falls_with_distance() {
        assert_eq!(attenuation_factor(0.0, 50.0), 1.0);
        assert!(attenuation_factor(0.5, 10.0) < attenuation_factor(0.5, 5.0));
    }
}
