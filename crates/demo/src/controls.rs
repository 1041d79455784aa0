//! Keyboard and mouse controls: camera flight and live edits of the scene config.

use glam::Vec2;
use renderer::{Camera, PostMode, SceneConfig};
use std::collections::HashSet;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Blend change per second while `[` or `]` is held.
const BLEND_RATE: f32 = 0.5;
/// Exposure change per second while `-` or `=` is held.
const EXPOSURE_RATE: f32 = 1.0;

const BLUR_KEYS: [KeyCode; 9] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

/// Input state for the current frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys_held: HashSet<KeyCode>,
    /// Keys pressed this frame.
    keys_pressed: HashSet<KeyCode>,
    mouse_held: HashSet<MouseButton>,
    /// Accumulated raw mouse motion since the last frame.
    mouse_delta: Vec2,
}

impl InputState {
    /// Clear per-frame state. Call after the frame's controls are applied.
    pub fn end_frame(&mut self) {
        self.keys_pressed.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.keys_held.insert(key) {
                    self.keys_pressed.insert(key);
                }
            }
            ElementState::Released => {
                self.keys_held.remove(&key);
            }
        }
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.mouse_held.insert(button);
            }
            ElementState::Released => {
                self.mouse_held.remove(&button);
            }
        }
    }

    pub fn process_mouse_motion(&mut self, delta: (f64, f64)) {
        self.mouse_delta += Vec2::new(delta.0 as f32, delta.1 as f32);
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Get movement input as a normalized vector (WASD).
    pub fn movement(&self) -> Vec2 {
        let mut movement = Vec2::ZERO;
        if self.is_key_held(KeyCode::KeyW) {
            movement.y += 1.0;
        }
        if self.is_key_held(KeyCode::KeyS) {
            movement.y -= 1.0;
        }
        if self.is_key_held(KeyCode::KeyA) {
            movement.x -= 1.0;
        }
        if self.is_key_held(KeyCode::KeyD) {
            movement.x += 1.0;
        }
        movement.normalize_or_zero()
    }

    fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_held(negative) {
            value -= 1.0;
        }
        if self.is_key_held(positive) {
            value += 1.0;
        }
        value
    }
}

/// Stateful part of the controls.
#[derive(Debug, Default)]
pub struct Controls {
    /// Light slot the next Tab press toggles.
    next_light: usize,
}

impl Controls {
    /// Applies one frame of input. Returns true when the scene config changed.
    pub fn apply(
        &mut self,
        input: &InputState,
        config: &mut SceneConfig,
        camera: &mut Camera,
        speed: f32,
        dt: f32,
    ) -> bool {
        camera.process_fly(input.movement(), input.axis(KeyCode::KeyQ, KeyCode::KeyE), speed, dt);
        if input.mouse_held.contains(&MouseButton::Right) && input.mouse_delta != Vec2::ZERO {
            camera.process_mouse(input.mouse_delta.x, input.mouse_delta.y);
        }

        let before = config.clone();
        let post = &mut config.post;
        if input.is_key_pressed(KeyCode::F1) {
            post.enabled = !post.enabled;
        }
        if input.is_key_pressed(KeyCode::F2) {
            post.mode = match post.mode {
                PostMode::Blur => PostMode::Bloom,
                PostMode::Bloom => PostMode::Blur,
            };
        }
        if input.is_key_pressed(KeyCode::F3) {
            post.hdr = !post.hdr;
        }
        if input.is_key_pressed(KeyCode::F4) {
            post.gamma = !post.gamma;
        }
        if let Some(passes) = BLUR_KEYS.iter().position(|&key| input.is_key_pressed(key)) {
            post.blur_passes = passes + 1;
        }
        post.exposure += input.axis(KeyCode::Minus, KeyCode::Equal) * EXPOSURE_RATE * dt;

        if input.is_key_pressed(KeyCode::F5) {
            config.wireframe = !config.wireframe;
        }
        if input.is_key_pressed(KeyCode::F6) {
            config.surface_detail.enabled = !config.surface_detail.enabled;
        }
        if input.is_key_pressed(KeyCode::F7) {
            config.tessellation.dynamic = !config.tessellation.dynamic;
        }
        if input.is_key_pressed(KeyCode::F8) {
            config.show_normals = !config.show_normals;
        }
        if input.is_key_pressed(KeyCode::F9) {
            config.shadow_preview = match config.shadow_preview {
                None => Some(0),
                Some(slot) if slot + 1 < config.lights.len() => Some(slot + 1),
                Some(_) => None,
            };
        }
        if input.is_key_pressed(KeyCode::Tab) {
            let light = &mut config.lights[self.next_light];
            light.enabled = !light.enabled;
            log::debug!("Light {} enabled: {}", self.next_light, light.enabled);
            self.next_light = (self.next_light + 1) % config.lights.len();
        }
        config.deformation.blend += input.axis(KeyCode::BracketLeft, KeyCode::BracketRight) * BLEND_RATE * dt;

        config.clamp_to_limits();
        let changed = *config != before;
        if changed {
            log::debug!(
                "Config: post {} {:?} x{} hdr {} gamma {} wireframe {} grass {} blend {:.2}",
                config.post.enabled,
                config.post.mode,
                config.post.blur_passes,
                config.post.hdr,
                config.post.gamma,
                config.wireframe,
                config.surface_detail.enabled,
                config.deformation.blend
            );
        }
        changed
    }
}
