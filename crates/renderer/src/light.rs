//! Light model: per-light state and the matrices derived from it.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Faces of a point light's shadow cube, in capture order.
pub const CUBE_FACE_DIRECTIONS: [Vec3; 6] = [
    Vec3::NEG_Y,
    Vec3::Y,
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// Shadow-map faces per light slot.
pub const FACES_PER_LIGHT: usize = 6;

/// Shadow-map slot for a light's cube face.
pub fn shadow_slot(light_index: usize, face: usize) -> usize {
    light_index * FACES_PER_LIGHT + face
}

/// Cube face whose direction best matches `light_to_fragment` (dominant axis).
///
/// Ties resolve towards Y, then X, then Z.
pub fn cube_face_for(light_to_fragment: Vec3) -> usize {
    let a = light_to_fragment.abs();
    if a.y >= a.x && a.y >= a.z {
        if light_to_fragment.y < 0.0 {
            0
        } else {
            1
        }
    } else if a.x >= a.z {
        if light_to_fragment.x > 0.0 {
            2
        } else {
            3
        }
    } else if light_to_fragment.z > 0.0 {
        4
    } else {
        5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
}

impl LightKind {
    /// Value written into the light buffer's `shape.x`.
    pub fn shader_id(self) -> f32 {
        match self {
            LightKind::Point => 0.0,
            LightKind::Directional => 1.0,
            LightKind::Spot => 2.0,
        }
    }

    /// Number of shadow faces this kind renders and samples.
    pub fn shadow_faces(self) -> usize {
        match self {
            LightKind::Point => FACES_PER_LIGHT,
            LightKind::Directional | LightKind::Spot => 1,
        }
    }
}

/// One light slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    pub enabled: bool,
    pub position: Vec3,
    /// Not necessarily normalized; see [`Light::direction`].
    direction: Vec3,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub specular_power: f32,
    pub near: f32,
    pub far: f32,
    /// Depth bias subtracted before the shadow comparison.
    pub shadow_bias: f32,
    /// Spot cone half-angles in degrees.
    pub spot_inner_degrees: f32,
    pub spot_outer_degrees: f32,
    pub spot_falloff: f32,
    pub attenuation: f32,
    /// Orthographic extent used by directional lights.
    pub scene_width: f32,
    pub scene_height: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            enabled: true,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            ambient: Vec4::new(0.0, 0.0, 0.0, 1.0),
            diffuse: Vec4::new(0.7, 0.7, 0.7, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            specular_power: 30.0,
            near: 20.0,
            far: 100.0,
            shadow_bias: 0.007,
            spot_inner_degrees: 20.0,
            spot_outer_degrees: 25.0,
            spot_falloff: 5.0,
            attenuation: 0.0,
            scene_width: 100.0,
            scene_height: 100.0,
        }
    }
}

impl Light {
    pub fn set_kind(&mut self, kind: LightKind) {
        self.kind = kind;
    }

    /// Move and re-aim the light.
    pub fn update_transform(&mut self, position: Vec3, direction: Vec3) {
        self.position = position;
        self.set_direction(direction);
    }

    /// A zero vector keeps the previous direction.
    pub fn set_direction(&mut self, direction: Vec3) {
        if direction.length_squared() > f32::EPSILON {
            self.direction = direction;
        }
    }

    /// Normalized direction.
    pub fn direction(&self) -> Vec3 {
        self.direction.try_normalize().unwrap_or(Vec3::NEG_Y)
    }

    /// View matrix looking along the light's direction.
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix_towards(self.direction())
    }

    /// View matrix from the light's position looking along `direction`.
    ///
    /// Used per cube face; the light's own direction is left untouched.
    pub fn view_matrix_towards(&self, direction: Vec3) -> Mat4 {
        let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let up = if dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        Mat4::look_at_rh(self.position, self.position + dir, up)
    }

    /// 90 degree square frustum, one cube face wide.
    pub fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
    }

    pub fn ortho_matrix(&self, width: f32, height: f32, near: f32, far: f32) -> Mat4 {
        Mat4::orthographic_rh(-width * 0.5, width * 0.5, -height * 0.5, height * 0.5, near, far)
    }

    /// Projection suited to the light's kind, using its own planes.
    pub fn shadow_projection(&self) -> Mat4 {
        let near = self.near.max(0.01);
        let far = self.far.max(near + 0.01);
        match self.kind {
            LightKind::Directional => self.ortho_matrix(self.scene_width, self.scene_height, near, far),
            LightKind::Point | LightKind::Spot => self.projection_matrix(near, far),
        }
    }

    /// View matrix for one shadow face. Non-point lights only have face 0.
    pub fn face_view_matrix(&self, face: usize) -> Mat4 {
        match self.kind {
            LightKind::Point => self.view_matrix_towards(CUBE_FACE_DIRECTIONS[face % FACES_PER_LIGHT]),
            LightKind::Directional | LightKind::Spot => self.view_matrix(),
        }
    }
}

/// The four lights the scene starts with.
pub fn default_lights() -> [Light; 4] {
    let base = Light::default();
    [
        Light {
            kind: LightKind::Point,
            position: Vec3::new(-31.0, 5.0, -34.0),
            direction: Vec3::NEG_Y,
            ambient: Vec4::new(0.0, 0.1, 0.15, 1.0),
            diffuse: Vec4::new(0.9, 0.9, 0.9, 1.0),
            near: 18.0,
            ..base
        },
        Light {
            kind: LightKind::Point,
            enabled: false,
            position: Vec3::new(-45.0, 30.0, 18.0),
            direction: Vec3::new(1.0, -0.6, 0.0),
            diffuse: Vec4::new(0.13, 0.5, 0.13, 1.0),
            near: 25.0,
            ..base
        },
        Light {
            kind: LightKind::Directional,
            position: Vec3::new(30.0, 20.0, -0.5),
            direction: Vec3::new(-1.0, -0.6, 0.0),
            diffuse: Vec4::new(0.4, 0.12, 0.12, 1.0),
            near: 8.8,
            far: 95.5,
            ..base
        },
        Light {
            kind: LightKind::Spot,
            position: Vec3::new(32.0, 5.0, -30.0),
            direction: Vec3::new(0.0, -0.6, 1.0),
            diffuse: Vec4::new(0.7, 0.6, 0.0, 1.0),
            specular: Vec4::new(0.7, 0.7, 0.7, 1.0),
            shadow_bias: 0.005,
            ..base
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The light's own position lands on the origin of view space, and on the
    /// clip-space axis (x = y = 0) for every kind and every face.
    #[test]
    fn view_identity_for_all_kinds() {
        for light in default_lights() {
            for kind in [LightKind::Point, LightKind::Directional, LightKind::Spot] {
                let mut light = light;
                light.set_kind(kind);
                let projection = light.shadow_projection();
                for face in 0..kind.shadow_faces() {
                    let view = light.face_view_matrix(face);
                    let in_view = view.transform_point3(light.position);
                    assert!(in_view.length() < 1e-3, "{kind:?} face {face}: {in_view}");
                    let clip = projection * view * light.position.extend(1.0);
                    assert!(clip.x.abs() < 1e-3 && clip.y.abs() < 1e-3);
                }
            }
        }
    }

    /// A point ahead of the light along each face direction projects to the
    /// centre of that face's shadow map.
    #[test]
    fn cube_faces_look_along_their_axis() {
        let light = default_lights()[0];
        let projection = light.shadow_projection();
        for (face, dir) in CUBE_FACE_DIRECTIONS.iter().enumerate() {
            let target = light.position + *dir * 50.0;
            let clip = projection * light.face_view_matrix(face) * target.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(clip.w > 0.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
            assert_eq!(cube_face_for(*dir), face);
        }
    }

    /// Directions are renormalized and zero vectors are ignored.
    #[test]
    fn direction_is_normalized() {
        let mut light = Light::default();
        light.update_transform(Vec3::ONE, Vec3::new(0.0, -3.0, 4.0));
        assert!((light.direction().length() - 1.0).abs() < 1e-6);
        light.set_direction(Vec3::ZERO);
        assert!((light.direction() - Vec3::new(0.0, -0.6, 0.8)).length() < 1e-6);
    }

    #[test]
    fn dominant_axis_face_selection() {
        assert_eq!(cube_face_for(Vec3::new(0.2, -5.0, 1.0)), 0);
        assert_eq!(cube_face_for(Vec3::new(3.0, 1.0, -2.0)), 2);
        assert_eq!(cube_face_for(Vec3::new(-3.0, 1.0, -2.0)), 3);
        assert_eq!(cube_face_for(Vec3::new(0.5, 1.0, -2.0)), 5);
        assert_eq!(shadow_slot(3, 5), 23);
    }

    /// Default slots: point, point (disabled), directional, spot.
    #[test]
    fn default_light_set() {
        let lights = default_lights();
        let kinds: Vec<LightKind> = lights.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![LightKind::Point, LightKind::Point, LightKind::Directional, LightKind::Spot]
        );
        assert!(!lights[1].enabled);
        assert_eq!(lights[3].shadow_bias, 0.005);
    }
}
