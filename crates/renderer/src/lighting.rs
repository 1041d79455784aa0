//! Per-frame lighting state shared by the shadow and lit passes.

use crate::light::{shadow_slot, Light, LightKind, FACES_PER_LIGHT};
use crate::uniforms::{mat, LightUniform, LitTransformUniform, LIGHT_SLOTS, SHADOW_SLOTS};
use glam::{Mat4, Vec4};

/// Shadow transforms and packed shading data for one frame.
///
/// Built once per frame so the depth passes and the lit passes see the same
/// matrices.
#[derive(Debug, Clone)]
pub struct LightingState {
    views: [Mat4; SHADOW_SLOTS],
    projections: [Mat4; LIGHT_SLOTS],
    kinds: [LightKind; LIGHT_SLOTS],
    enabled: [bool; LIGHT_SLOTS],
    uniform: LightUniform,
}

impl LightingState {
    /// Derive matrices for every slot and pack the light buffer.
    ///
    /// Disabled lights keep valid matrices, but their colours are zeroed and
    /// their enabled flag is cleared so shading skips them entirely.
    pub fn build(lights: &[Light; LIGHT_SLOTS], show_normals: bool) -> Self {
        let mut views = [Mat4::IDENTITY; SHADOW_SLOTS];
        let mut projections = [Mat4::IDENTITY; LIGHT_SLOTS];
        let mut uniform = LightUniform::default();

        for (i, light) in lights.iter().enumerate() {
            projections[i] = light.shadow_projection();
            for face in 0..FACES_PER_LIGHT {
                views[shadow_slot(i, face)] = light.face_view_matrix(face);
            }

            let (ambient, diffuse, specular) = if light.enabled {
                (light.ambient, light.diffuse, light.specular)
            } else {
                (Vec4::ZERO, Vec4::ZERO, Vec4::ZERO)
            };
            uniform.ambient[i] = ambient.to_array();
            uniform.diffuse[i] = diffuse.to_array();
            uniform.specular[i] = specular.to_array();
            uniform.position[i] = light.position.extend(1.0).to_array();
            uniform.direction[i] = light.direction().extend(0.0).to_array();
            uniform.shape[i] = [
                light.kind.shader_id(),
                light.spot_outer_degrees.to_radians().cos(),
                light.spot_inner_degrees.to_radians().cos(),
                light.spot_falloff,
            ];
            uniform.params[i] = [
                light.attenuation,
                light.shadow_bias,
                light.specular_power,
                if light.enabled { 1.0 } else { 0.0 },
            ];
        }
        uniform.flags[0] = if show_normals { 1.0 } else { 0.0 };

        Self {
            views,
            projections,
            kinds: lights.map(|l| l.kind),
            enabled: lights.map(|l| l.enabled),
            uniform,
        }
    }

    pub fn view(&self, light: usize, face: usize) -> Mat4 {
        self.views[shadow_slot(light, face)]
    }

    pub fn projection(&self, light: usize) -> Mat4 {
        self.projections[light]
    }

    pub fn kind(&self, light: usize) -> LightKind {
        self.kinds[light]
    }

    pub fn is_enabled(&self, light: usize) -> bool {
        self.enabled[light]
    }

    /// Faces to capture this frame: zero for disabled lights.
    pub fn shadow_faces(&self, light: usize) -> usize {
        if self.enabled[light] {
            self.kinds[light].shadow_faces()
        } else {
            0
        }
    }

    pub fn light_uniform(&self) -> &LightUniform {
        &self.uniform
    }

    /// Camera transforms joined with every shadow transform.
    pub fn lit_transforms(&self, world: Mat4, view: Mat4, projection: Mat4) -> LitTransformUniform {
        LitTransformUniform {
            world: mat(world),
            view: mat(view),
            projection: mat(projection),
            light_view: self.views.map(mat),
            light_projection: self.projections.map(mat),
        }
    }
}
