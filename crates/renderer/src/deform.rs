//! Plane-to-sphere deformation with wave and height-map displacement.
//!
//! This is the domain-stage math. The wgpu backend runs the same formulas in
//! `shaders/deform.wgsl`; both the depth and the lit passes use the same
//! [`SurfaceState`] so shadows follow the surface exactly.

use crate::device::TextureHandle;
use crate::tessellation::TessellationSettings;
use crate::uniforms::{CameraUniform, DeformUniform};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// A travelling sinusoid along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub amplitude: f32,
    pub frequency: f32,
    pub speed: f32,
}

impl Wave {
    pub const fn new(amplitude: f32, frequency: f32, speed: f32) -> Self {
        Self {
            amplitude,
            frequency,
            speed,
        }
    }

    pub fn sample(&self, coord: f32, time: f32) -> f32 {
        self.amplitude * (self.frequency * coord + self.speed * time).sin()
    }

    pub(crate) fn packed(&self) -> [f32; 4] {
        [self.amplitude, self.frequency, self.speed, 0.0]
    }
}

/// Sum of one wave along X and one along Z.
pub fn wave_offset(waves: &[Wave; 2], x: f32, z: f32, time: f32) -> f32 {
    waves[0].sample(x, time) + waves[1].sample(z, time)
}

/// Parameters of the deformable surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformationParameters {
    /// Animation time in seconds. Only ever increases.
    #[serde(skip)]
    pub time: f32,
    /// 0 = flat plane, 1 = sphere.
    pub blend: f32,
    /// Sphere centre in the plane's local space.
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
    /// Waves along X and along Z.
    pub waves: [Wave; 2],
    pub height_amplitude: f32,
}

impl Default for DeformationParameters {
    fn default() -> Self {
        Self {
            time: 0.0,
            blend: 0.0,
            sphere_center: Vec3::new(15.1, 11.0, 15.0),
            sphere_radius: 8.0,
            waves: [Wave::new(0.0, 0.65, 1.0), Wave::new(0.0, 0.5, 1.0)],
            height_amplitude: 14.0,
        }
    }
}

/// Height-map lookup in [0, 1] per uv.
pub trait HeightField {
    fn sample(&self, uv: Vec2) -> f32;
}

impl<F: Fn(Vec2) -> f32> HeightField for F {
    fn sample(&self, uv: Vec2) -> f32 {
        self(uv)
    }
}

/// Point on the sphere for a plane uv.
///
/// u wraps around the equator, v runs from the south pole (0) to the north
/// pole (1), which keeps the plane's upper side facing outwards.
pub fn sphere_surface_position(uv: Vec2, center: Vec3, radius: f32) -> Vec3 {
    center + radius * sphere_normal(uv)
}

/// Outward unit normal of the sphere at a plane uv.
pub fn sphere_normal(uv: Vec2) -> Vec3 {
    let theta = TAU * uv.x;
    let phi = PI * (1.0 - uv.y);
    Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin())
}

/// Plane point moved towards the sphere by `params.blend`, before displacement.
pub fn blended_position(plane_position: Vec3, uv: Vec2, params: &DeformationParameters) -> Vec3 {
    let on_sphere = sphere_surface_position(uv, params.sphere_center, params.sphere_radius);
    plane_position.lerp(on_sphere, params.blend)
}

/// Direction displacement is applied along.
pub fn blended_normal(uv: Vec2, blend: f32) -> Vec3 {
    Vec3::Y
        .lerp(sphere_normal(uv), blend)
        .try_normalize()
        .unwrap_or(Vec3::Y)
}

/// Full domain-stage position.
pub fn deform_point(
    plane_position: Vec3,
    uv: Vec2,
    params: &DeformationParameters,
    height: &dyn HeightField,
) -> Vec3 {
    let displacement = height.sample(uv) * params.height_amplitude
        + wave_offset(&params.waves, plane_position.x, plane_position.z, params.time);
    blended_position(plane_position, uv, params) + blended_normal(uv, params.blend) * displacement
}

/// Surface normal by central differences over uv.
///
/// `plane_extent` is the plane's side length, mapping uv to plane position.
pub fn deformed_normal(uv: Vec2, plane_extent: f32, params: &DeformationParameters, height: &dyn HeightField) -> Vec3 {
    const STEP: f32 = 1e-3;
    let at = |uv: Vec2| {
        let plane = Vec3::new(uv.x * plane_extent, 0.0, uv.y * plane_extent);
        deform_point(plane, uv, params, height)
    };
    let du = at(uv + Vec2::new(STEP, 0.0)) - at(uv - Vec2::new(STEP, 0.0));
    let dv = at(uv + Vec2::new(0.0, STEP)) - at(uv - Vec2::new(0.0, STEP));
    dv.cross(du).try_normalize().unwrap_or(Vec3::Y)
}

/// Everything the deformable-plane programs bind, built once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceState {
    pub deform: DeformUniform,
    pub camera: CameraUniform,
    pub height_map: TextureHandle,
}

impl SurfaceState {
    pub fn new(
        params: &DeformationParameters,
        tessellation: &TessellationSettings,
        plane_extent: f32,
        camera: Vec3,
        height_map: TextureHandle,
    ) -> Self {
        let deform = DeformUniform {
            time_blend_height: [params.time, params.blend, params.height_amplitude, plane_extent],
            wave_x: params.waves[0].packed(),
            wave_z: params.waves[1].packed(),
            sphere: params.sphere_center.extend(params.sphere_radius).to_array(),
            tessellation: tessellation.packed_factors(),
            policy: tessellation.packed_policy(),
        };
        Self {
            deform,
            camera: CameraUniform {
                position: camera.extend(1.0).to_array(),
            },
            height_map,
        }
    }
}
