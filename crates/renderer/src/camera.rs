//! Free-fly camera.

use engine_core::Placement;
use glam::{Mat4, Quat, Vec2, Vec3};

/// Scene camera with configurable FOV and clipping planes.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera placement (position and rotation; scale is ignored).
    pub placement: Placement,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Aspect ratio (width / height).
    pub aspect: f32,
    /// Mouse sensitivity for look controls.
    pub sensitivity: f32,
    pitch: f32,
    yaw: f32,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            placement: Placement::at(Vec3::new(0.0, 10.0, -60.0)),
            fov_degrees: 45.0,
            near: 0.1,
            far: 200.0,
            aspect: 16.0 / 9.0,
            sensitivity: 0.002,
            pitch: 0.0,
            yaw: 0.0,
        };
        // Look down +Z at the scene.
        camera.set_yaw_pitch(std::f32::consts::PI, 0.0);
        camera
    }
}

impl Camera {
    /// Create a camera at the given position with the default orientation.
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self::default();
        camera.placement.translation = position;
        camera
    }

    /// Update aspect ratio (call on window resize).
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Process mouse movement for look controls.
    pub fn process_mouse(&mut self, delta_x: f32, delta_y: f32) {
        self.set_yaw_pitch(
            self.yaw - delta_x * self.sensitivity,
            self.pitch - delta_y * self.sensitivity,
        );
    }

    /// Free-fly in camera space.
    /// - move_xy: x = strafe, y = forward/back (from WASD)
    /// - move_y: vertical (QE)
    pub fn process_fly(&mut self, move_xy: Vec2, move_y: f32, speed: f32, dt: f32) {
        let p = &self.placement;
        let velocity = p.forward() * move_xy.y + p.right() * move_xy.x + p.up() * move_y;

        if velocity.length_squared() > 0.0 {
            self.placement.translation += velocity.normalize() * speed * dt;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        let eye = self.placement.translation;
        Mat4::look_at_rh(eye, eye + self.placement.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    /// Fixed view for screen-space quads: looks down -Z from z = 10.
    pub fn ortho_view_matrix() -> Mat4 {
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y)
    }

    pub fn position(&self) -> Vec3 {
        self.placement.translation
    }

    pub fn forward(&self) -> Vec3 {
        self.placement.forward()
    }

    /// Current yaw (left/right rotation) in radians.
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Current pitch (up/down rotation) in radians.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Set yaw and pitch directly (in radians) and rebuild rotation.
    pub fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32) {
        // Clamp pitch to prevent flipping
        let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
        self.yaw = yaw;
        self.pitch = pitch.clamp(-max_pitch, max_pitch);
        self.placement.rotation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch);
    }
}
