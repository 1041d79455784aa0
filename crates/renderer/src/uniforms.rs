//! Constant-buffer layouts.
//!
//! Each struct must match the WGSL struct of the same role in `shaders/`.
//! Everything is packed into `vec4` rows so the uniform address space rules
//! (16-byte array stride) hold without extra padding fields.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Number of shadow-map slots (4 lights x 6 cube faces).
pub const SHADOW_SLOTS: usize = 24;
/// Number of light slots.
pub const LIGHT_SLOTS: usize = 4;

pub(crate) fn mat(m: Mat4) -> [[f32; 4]; 4] {
    m.to_cols_array_2d()
}

/// World/view/projection (must match `Transforms` in the WGSL shaders).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformUniform {
    pub world: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl TransformUniform {
    pub fn new(world: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            world: mat(world),
            view: mat(view),
            projection: mat(projection),
        }
    }
}

impl Default for TransformUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Camera transforms plus every light's shadow transforms (must match `LitTransforms`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LitTransformUniform {
    pub world: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// Indexed by shadow slot (`light * 6 + face`).
    pub light_view: [[[f32; 4]; 4]; SHADOW_SLOTS],
    pub light_projection: [[[f32; 4]; 4]; LIGHT_SLOTS],
}

impl Default for LitTransformUniform {
    fn default() -> Self {
        let identity = mat(Mat4::IDENTITY);
        Self {
            world: identity,
            view: identity,
            projection: identity,
            light_view: [identity; SHADOW_SLOTS],
            light_projection: [identity; LIGHT_SLOTS],
        }
    }
}

/// Per-light shading data (must match `Lights`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    pub ambient: [[f32; 4]; LIGHT_SLOTS],
    pub diffuse: [[f32; 4]; LIGHT_SLOTS],
    pub specular: [[f32; 4]; LIGHT_SLOTS],
    /// xyz = position, w unused.
    pub position: [[f32; 4]; LIGHT_SLOTS],
    /// xyz = normalized direction, w unused.
    pub direction: [[f32; 4]; LIGHT_SLOTS],
    /// x = kind (0 point, 1 directional, 2 spot), y = cos(outer), z = cos(inner), w = falloff.
    pub shape: [[f32; 4]; LIGHT_SLOTS],
    /// x = attenuation, y = shadow bias, z = specular power, w = enabled (0 or 1).
    pub params: [[f32; 4]; LIGHT_SLOTS],
    /// x = show normals (0 or 1), yzw unused.
    pub flags: [f32; 4],
}

impl Default for LightUniform {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Camera position for specular and distance-driven tessellation (must match `CameraBlock`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// xyz = position, w = 1.
    pub position: [f32; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Deformation and tessellation parameters (must match `Deform`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DeformUniform {
    /// x = time, y = plane-to-sphere blend, z = height amplitude, w = plane extent.
    pub time_blend_height: [f32; 4],
    /// x = amplitude, y = frequency, z = speed for the wave along X.
    pub wave_x: [f32; 4],
    /// Same for the wave along Z.
    pub wave_z: [f32; 4],
    /// xyz = sphere centre (plane space), w = radius.
    pub sphere: [f32; 4],
    /// x = inside factor, y = edge factor, z = near bound, w = far bound.
    pub tessellation: [f32; 4],
    /// x = dynamic policy (0 or 1), y = max factor, z = min factor, w unused.
    pub policy: [f32; 4],
}

impl Default for DeformUniform {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Surface-detail blade parameters (must match `Wind`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WindUniform {
    pub wave_x: [f32; 4],
    pub wave_z: [f32; 4],
    /// x = blade height, y = blade half-width, z = surface lighting (0 or 1), w = time.
    pub blade: [f32; 4],
}

impl Default for WindUniform {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Separable blur step (must match `Blur`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlurUniform {
    /// xy = one-texel step along the blur axis, zw unused.
    pub step: [f32; 4],
    /// Centre weight first, then the weights for offsets 1..=5, then padding.
    pub weights: [[f32; 4]; 2],
}

impl Default for BlurUniform {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// x = threshold (must match `Threshold`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ThresholdUniform {
    pub params: [f32; 4],
}

/// x = intensity applied to the second input (must match `Merge`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MergeUniform {
    pub params: [f32; 4],
}

/// x = exposure, y = gamma correction (0 or 1) (must match `ToneMap`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ToneMapUniform {
    pub params: [f32; 4],
}

/// x = depth-array layer, y = near, z = far, w = orthographic (0 or 1) (must match `Preview`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PreviewUniform {
    pub params: [f32; 4],
}
