//! World placement of scene objects.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Scale, then rotation, then translation.
///
/// The builder methods compose in that order regardless of call order, which
/// matches how the fixed scene lays out its props.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Placement {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Unscaled, unrotated placement at `translation`.
    pub fn at(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Replace the scale.
    pub fn scaled(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Replace the scale with a uniform factor.
    pub fn uniform_scale(self, factor: f32) -> Self {
        self.scaled(Vec3::splat(factor))
    }

    /// Add a rotation about +Y, in degrees.
    pub fn rotated_y_degrees(mut self, degrees: f32) -> Self {
        self.rotation = Quat::from_rotation_y(degrees.to_radians()) * self.rotation;
        self
    }

    /// Move by a world-space offset.
    pub fn translated(mut self, offset: Vec3) -> Self {
        self.translation += offset;
        self
    }

    /// World matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Map a local point into world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    /// Local -Z in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Local +X in world space.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Local +Y in world space.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scale is applied before rotation: a unit X offset scaled by 2 then
    /// turned 90 degrees ends up on -Z.
    #[test]
    fn scale_then_rotate_then_translate() {
        let p = Placement::at(Vec3::new(1.0, 0.0, 0.0))
            .scaled(Vec3::new(2.0, 1.0, 1.0))
            .rotated_y_degrees(90.0);
        let world = p.transform_point(Vec3::X);
        assert!((world - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-5);
        let via_matrix = p.matrix().transform_point3(Vec3::X);
        assert!((via_matrix - world).length() < 1e-5);
    }

    /// Translations accumulate.
    #[test]
    fn translated_accumulates() {
        let p = Placement::at(Vec3::new(-15.0, -8.0, -15.0)).translated(Vec3::new(15.1, 11.0, 15.0));
        assert!((p.translation - Vec3::new(0.1, 3.0, 0.0)).length() < 1e-5);
    }
}
