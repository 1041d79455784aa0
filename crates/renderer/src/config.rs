//! Per-frame scene configuration, as edited by the UI.

use crate::deform::DeformationParameters;
use crate::light::{default_lights, Light};
use crate::render_target::CASCADE_SIZES;
use crate::surface_detail::SurfaceDetailConfig;
use crate::tessellation::TessellationSettings;
use crate::uniforms::LIGHT_SLOTS;
use serde::{Deserialize, Serialize};

/// Deepest blur cascade.
pub const MAX_BLUR_PASSES: usize = CASCADE_SIZES.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostMode {
    /// Blur the whole scene.
    Blur,
    /// Blur only the bright parts and add them back.
    #[default]
    Bloom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub enabled: bool,
    pub mode: PostMode,
    /// Tone map before presenting.
    pub hdr: bool,
    /// Gamma-correct after tone mapping.
    pub gamma: bool,
    /// Cascade levels to blur, 1..=9.
    pub blur_passes: usize,
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
    pub exposure: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: PostMode::Bloom,
            hdr: false,
            gamma: false,
            blur_passes: MAX_BLUR_PASSES,
            bloom_threshold: 1.4,
            bloom_intensity: 1.0,
            exposure: 1.0,
        }
    }
}

impl PostProcessConfig {
    pub fn clamp_to_limits(&mut self) {
        self.blur_passes = self.blur_passes.clamp(1, MAX_BLUR_PASSES);
        self.bloom_threshold = self.bloom_threshold.clamp(0.0, 3.0);
        self.bloom_intensity = self.bloom_intensity.clamp(0.0, 1.0);
        self.exposure = self.exposure.clamp(0.0, 3.0);
    }
}

/// Everything the frame orchestrator reads each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub lights: [Light; LIGHT_SLOTS],
    pub deformation: DeformationParameters,
    pub tessellation: TessellationSettings,
    pub surface_detail: SurfaceDetailConfig,
    pub post: PostProcessConfig,
    pub wireframe: bool,
    pub show_normals: bool,
    /// Light slot whose face 0 is shown in the corner, if any.
    pub shadow_preview: Option<usize>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            lights: default_lights(),
            deformation: DeformationParameters::default(),
            tessellation: TessellationSettings::default(),
            surface_detail: SurfaceDetailConfig::default(),
            post: PostProcessConfig::default(),
            wireframe: false,
            show_normals: false,
            shadow_preview: None,
        }
    }
}

impl SceneConfig {
    /// Pull every value back into the range the UI allows.
    pub fn clamp_to_limits(&mut self) {
        self.post.clamp_to_limits();
        self.tessellation.clamp_to_limits();
        self.deformation.blend = self.deformation.blend.clamp(0.0, 1.0);
        if let Some(slot) = self.shadow_preview.as_mut() {
            *slot = (*slot).min(LIGHT_SLOTS - 1);
        }
    }
}
