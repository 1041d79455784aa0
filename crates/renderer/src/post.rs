//! Post-processing: threshold, blur cascade, bloom combine, tone map, present.
//!
//! The pipeline is an explicit state machine over [`PostStage`]. Each stage
//! writes its own targets and hands them to the next stage as read-only
//! inputs, so no target is ever read and written by the same pass.

use crate::config::{PostMode, PostProcessConfig, MAX_BLUR_PASSES};
use crate::device::{GraphicsDevice, MeshHandle, RenderTargetBinding, TextureView};
use crate::error::RenderResult;
use crate::light::{Light, LightKind, FACES_PER_LIGHT};
use crate::pipeline::{BlurAxis, Program, ProgramBinder};
use crate::render_target::{fullscreen_transforms, quad_transforms, unit_quad, RenderTarget, CASCADE_SIZES};
use crate::scene::CLEAR_COLOR;
use crate::uniforms::{BlurUniform, MergeUniform, PreviewUniform, ThresholdUniform, ToneMapUniform};
use glam::{Vec3, Vec4};

pub const BLUR_RADIUS: usize = 5;
pub const BLUR_SIGMA: f32 = 2.5;
/// Luminance floor in the threshold ramp.
pub const LUMINANCE_EPSILON: f32 = 1e-4;

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Normalized Gaussian weights for offsets 0..=5 (one side; the kernel is symmetric).
pub fn gaussian_weights() -> [f32; BLUR_RADIUS + 1] {
    let mut weights = [0.0; BLUR_RADIUS + 1];
    for (k, w) in weights.iter_mut().enumerate() {
        *w = (-((k * k) as f32) / (2.0 * BLUR_SIGMA * BLUR_SIGMA)).exp();
    }
    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    weights.map(|w| w / total)
}

/// Blur parameters for a pass writing a `width` x `height` target.
pub fn blur_uniform(axis: BlurAxis, width: u32, height: u32) -> BlurUniform {
    let step = match axis {
        BlurAxis::Horizontal => [1.0 / width.max(1) as f32, 0.0, 0.0, 0.0],
        BlurAxis::Vertical => [0.0, 1.0 / height.max(1) as f32, 0.0, 0.0],
    };
    let w = gaussian_weights();
    BlurUniform {
        step,
        weights: [[w[0], w[1], w[2], w[3]], [w[4], w[5], 0.0, 0.0]],
    }
}

/// Rec. 709 luminance.
pub fn luminance(color: Vec3) -> f32 {
    color.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

/// Bright-pass: keeps the part of the colour above the luminance threshold.
pub fn threshold(color: Vec4, threshold: f32) -> Vec4 {
    let l = luminance(color.truncate());
    let scale = (l - threshold).max(0.0) / l.max(LUMINANCE_EPSILON);
    (color.truncate() * scale).extend(1.0)
}

pub fn merge(base: Vec4, added: Vec4, intensity: f32) -> Vec4 {
    base + added * intensity
}

/// Exponential tone curve, optionally gamma-encoded.
pub fn tone_map(color: Vec3, exposure: f32, gamma: bool) -> Vec3 {
    let mapped = Vec3::ONE - (-color * exposure).exp();
    if gamma {
        mapped.powf(1.0 / 2.2)
    } else {
        mapped
    }
}

/// Where the pipeline is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostStage {
    Idle,
    Thresholding,
    Blurring,
    Combining,
    ToneMapping,
    Final,
}

impl PostStage {
    pub fn next(self, config: &PostProcessConfig) -> PostStage {
        let bloom = config.mode == PostMode::Bloom;
        let after_blend = if config.hdr {
            PostStage::ToneMapping
        } else {
            PostStage::Final
        };
        match self {
            PostStage::Idle if bloom => PostStage::Thresholding,
            PostStage::Idle | PostStage::Thresholding => PostStage::Blurring,
            PostStage::Blurring if bloom && config.blur_passes > 1 => PostStage::Combining,
            PostStage::Blurring | PostStage::Combining => after_blend,
            PostStage::ToneMapping => PostStage::Final,
            PostStage::Final => PostStage::Idle,
        }
    }
}

/// Passes issued, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub threshold: u32,
    pub blur_horizontal: u32,
    pub blur_vertical: u32,
    pub upscale: u32,
    pub combine: u32,
    pub scene_blend: u32,
    pub tone_map: u32,
    pub final_composite: u32,
}

impl PassCounts {
    pub fn total(&self) -> u32 {
        self.threshold
            + self.blur_horizontal
            + self.blur_vertical
            + self.upscale
            + self.combine
            + self.scene_blend
            + self.tone_map
            + self.final_composite
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReport {
    /// Stages visited, in order.
    pub stages: Vec<PostStage>,
    pub passes: PassCounts,
}

/// Face 0 of one light slot, drawn in the top-left corner of the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowPreview {
    pub shadow_maps: TextureView,
    pub params: PreviewUniform,
}

impl ShadowPreview {
    pub fn new(shadow_maps: TextureView, slot: usize, light: &Light) -> Self {
        let ortho = if light.kind == LightKind::Directional { 1.0 } else { 0.0 };
        Self {
            shadow_maps,
            params: PreviewUniform {
                params: [(slot * FACES_PER_LIGHT) as f32, light.near, light.far, ortho],
            },
        }
    }

    /// Draws into the current target, assumed to be the `width` x `height` screen.
    pub fn draw(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        quad: &MeshHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let side = height as f32 / 3.0;
        let (w, h) = (width as f32, height as f32);
        let transforms = quad_transforms(width, height, (side, side), (-w / 2.7, h / 2.7));
        device.set_depth_test(false);
        binder.draw(
            device,
            quad,
            &Program::DepthPreview {
                transforms: &transforms,
                params: &self.params,
                shadow_maps: self.shadow_maps,
            },
        )?;
        device.set_depth_test(true);
        Ok(())
    }
}

/// Full-screen targets, recreated on resize.
#[derive(Debug, Clone, Copy)]
struct ScreenTargets {
    scene: RenderTarget,
    threshold: RenderTarget,
    blur_filter: RenderTarget,
    bloom_filter: RenderTarget,
    tone_mapped: RenderTarget,
}

impl ScreenTargets {
    fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        Ok(Self {
            scene: RenderTarget::new(device, "Scene Target", width, height)?,
            threshold: RenderTarget::new(device, "Threshold Target", width, height)?,
            blur_filter: RenderTarget::new(device, "Blur Filter", width, height)?,
            bloom_filter: RenderTarget::new(device, "Bloom Filter", width, height)?,
            tone_mapped: RenderTarget::new(device, "Tone Mapped Target", width, height)?,
        })
    }

    fn release(self, device: &mut dyn GraphicsDevice) {
        for target in [self.scene, self.threshold, self.blur_filter, self.bloom_filter, self.tone_mapped] {
            target.release(device);
        }
    }
}

/// Post-processing targets and passes.
pub struct PostProcessPipeline {
    screen: ScreenTargets,
    horizontal: Vec<RenderTarget>,
    vertical: Vec<RenderTarget>,
    /// Levels 0..8; the deepest level never needs an upscale or combine target.
    upscale: Vec<RenderTarget>,
    combine: Vec<RenderTarget>,
    quad: MeshHandle,
    width: u32,
    height: u32,
}

impl PostProcessPipeline {
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<Self> {
        let level = |device: &mut dyn GraphicsDevice, label: &str, count: usize| {
            CASCADE_SIZES[..count]
                .iter()
                .enumerate()
                .map(|(i, &(w, h))| RenderTarget::new(device, &format!("{label} {i}"), w, h))
                .collect::<RenderResult<Vec<_>>>()
        };
        let pipeline = Self {
            screen: ScreenTargets::new(device, width, height)?,
            horizontal: level(device, "Horizontal Blur", MAX_BLUR_PASSES)?,
            vertical: level(device, "Vertical Blur", MAX_BLUR_PASSES)?,
            upscale: level(device, "Upscale", MAX_BLUR_PASSES - 1)?,
            combine: level(device, "Combine", MAX_BLUR_PASSES - 1)?,
            quad: device.create_mesh("Screen Quad", &unit_quad())?,
            width: width.max(1),
            height: height.max(1),
        };
        log::info!(
            "Post-processing targets ready: {}x{} screen, {} cascade levels",
            pipeline.width,
            pipeline.height,
            MAX_BLUR_PASSES
        );
        Ok(pipeline)
    }

    /// Where the lit scene is drawn when post-processing is on.
    pub fn scene_target(&self) -> RenderTargetBinding {
        self.screen.scene.binding()
    }

    /// The unit quad used for every screen-space draw.
    pub fn quad(&self) -> &MeshHandle {
        &self.quad
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Recreates the full-screen targets. Cascade levels keep their fixed sizes.
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.screen.release(device);
        self.screen = ScreenTargets::new(device, width, height)?;
        self.width = width;
        self.height = height;
        log::debug!("Post-processing resized to {width}x{height}");
        Ok(())
    }

    /// Runs every stage from the drawn scene to the back buffer.
    pub fn run(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        preview: Option<&ShadowPreview>,
    ) -> RenderResult<PostReport> {
        let levels = config.blur_passes.clamp(1, MAX_BLUR_PASSES);
        let mut report = PostReport::default();
        let mut current = self.screen.scene.view();
        device.set_depth_test(false);

        let mut stage = PostStage::Idle.next(config);
        while stage != PostStage::Idle {
            current = match stage {
                PostStage::Thresholding => self.threshold_pass(device, binder, config, &mut report.passes)?,
                PostStage::Blurring => self.blur_passes(device, binder, config, current, levels, &mut report.passes)?,
                PostStage::Combining => self.combine_passes(device, binder, config, levels, &mut report.passes)?,
                PostStage::ToneMapping => self.tone_map_pass(device, binder, config, current, &mut report.passes)?,
                PostStage::Final => self.final_pass(device, binder, current, preview, &mut report.passes)?,
                PostStage::Idle => current,
            };
            report.stages.push(stage);
            stage = stage.next(config);
        }

        device.set_depth_test(true);
        log::trace!("Post-processing: {:?}", report.passes);
        Ok(report)
    }

    fn threshold_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        counts: &mut PassCounts,
    ) -> RenderResult<TextureView> {
        let target = &self.screen.threshold;
        target.begin(device, BLACK);
        let params = ThresholdUniform {
            params: [config.bloom_threshold, 0.0, 0.0, 0.0],
        };
        binder.draw(
            device,
            &self.quad,
            &Program::Threshold {
                transforms: &target.transforms(),
                params: &params,
                source: self.screen.scene.view(),
            },
        )?;
        counts.threshold += 1;
        Ok(target.view())
    }

    /// Blurs `source` down the cascade. Returns the stage's output: the last
    /// vertical level when a combine walk follows, otherwise the blur or
    /// bloom filter.
    fn blur_passes(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        source: TextureView,
        levels: usize,
        counts: &mut PassCounts,
    ) -> RenderResult<TextureView> {
        let mut input = source;
        for level in 0..levels {
            for (axis, target) in [
                (BlurAxis::Horizontal, &self.horizontal[level]),
                (BlurAxis::Vertical, &self.vertical[level]),
            ] {
                target.begin(device, CLEAR_COLOR);
                let params = blur_uniform(axis, target.width, target.height);
                binder.draw(
                    device,
                    &self.quad,
                    &Program::Blur {
                        axis,
                        transforms: &target.transforms(),
                        params: &params,
                        source: input,
                    },
                )?;
                match axis {
                    BlurAxis::Horizontal => counts.blur_horizontal += 1,
                    BlurAxis::Vertical => counts.blur_vertical += 1,
                }
                input = target.view();
            }
        }

        match config.mode {
            PostMode::Blur => {
                let target = &self.screen.blur_filter;
                target.begin(device, CLEAR_COLOR);
                self.copy(device, binder, target, input)?;
                counts.upscale += 1;
                Ok(target.view())
            }
            PostMode::Bloom if levels == 1 => {
                self.scene_blend(device, binder, config, input, counts)?;
                Ok(self.screen.bloom_filter.view())
            }
            PostMode::Bloom => Ok(input),
        }
    }

    /// Walks the cascade from the second-deepest level up to level 0, adding
    /// each level's blur to the upscaled sum below it, then blends with the scene.
    fn combine_passes(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        levels: usize,
        counts: &mut PassCounts,
    ) -> RenderResult<TextureView> {
        let mut below = self.vertical[levels - 1].view();
        for level in (0..levels - 1).rev() {
            let upscale = &self.upscale[level];
            upscale.begin(device, CLEAR_COLOR);
            self.copy(device, binder, upscale, below)?;
            counts.upscale += 1;

            let combine = &self.combine[level];
            combine.begin(device, CLEAR_COLOR);
            let params = MergeUniform {
                params: [1.0, 0.0, 0.0, 0.0],
            };
            binder.draw(
                device,
                &self.quad,
                &Program::Merge {
                    transforms: &combine.transforms(),
                    params: &params,
                    base: self.vertical[level].view(),
                    added: upscale.view(),
                },
            )?;
            counts.combine += 1;
            below = combine.view();
        }

        self.scene_blend(device, binder, config, below, counts)?;
        Ok(self.screen.bloom_filter.view())
    }

    fn scene_blend(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        bloom: TextureView,
        counts: &mut PassCounts,
    ) -> RenderResult<()> {
        let target = &self.screen.bloom_filter;
        target.begin(device, CLEAR_COLOR);
        let params = MergeUniform {
            params: [config.bloom_intensity, 0.0, 0.0, 0.0],
        };
        binder.draw(
            device,
            &self.quad,
            &Program::Merge {
                transforms: &target.transforms(),
                params: &params,
                base: self.screen.scene.view(),
                added: bloom,
            },
        )?;
        counts.scene_blend += 1;
        Ok(())
    }

    fn tone_map_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        config: &PostProcessConfig,
        source: TextureView,
        counts: &mut PassCounts,
    ) -> RenderResult<TextureView> {
        let target = &self.screen.tone_mapped;
        target.begin(device, CLEAR_COLOR);
        let params = ToneMapUniform {
            params: [config.exposure, if config.gamma { 1.0 } else { 0.0 }, 0.0, 0.0],
        };
        binder.draw(
            device,
            &self.quad,
            &Program::ToneMap {
                transforms: &target.transforms(),
                params: &params,
                source,
            },
        )?;
        counts.tone_map += 1;
        Ok(target.view())
    }

    fn final_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        source: TextureView,
        preview: Option<&ShadowPreview>,
        counts: &mut PassCounts,
    ) -> RenderResult<TextureView> {
        let (width, height) = device.back_buffer_size();
        device.set_render_target(RenderTargetBinding::BackBuffer);
        device.clear_render_target(CLEAR_COLOR);
        binder.draw(
            device,
            &self.quad,
            &Program::Texture {
                transforms: &fullscreen_transforms(width, height),
                texture: source,
            },
        )?;
        counts.final_composite += 1;

        if let Some(preview) = preview {
            preview.draw(device, binder, &self.quad, width, height)?;
            device.set_depth_test(false);
        }
        Ok(source)
    }

    /// Resamples `source` into `target` with the plain texture program.
    fn copy(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        target: &RenderTarget,
        source: TextureView,
    ) -> RenderResult<()> {
        binder.draw(
            device,
            &self.quad,
            &Program::Texture {
                transforms: &target.transforms(),
                texture: source,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: PostMode, blur_passes: usize, hdr: bool) -> PostProcessConfig {
        PostProcessConfig {
            enabled: true,
            mode,
            hdr,
            blur_passes,
            ..Default::default()
        }
    }

    fn walk(config: &PostProcessConfig) -> Vec<PostStage> {
        let mut stages = Vec::new();
        let mut stage = PostStage::Idle.next(config);
        while stage != PostStage::Idle {
            stages.push(stage);
            stage = stage.next(config);
        }
        stages
    }

    /// Stage order for each mode.
    #[test]
    fn stage_transitions() {
        use PostStage::*;
        assert_eq!(
            walk(&config(PostMode::Bloom, 9, true)),
            vec![Thresholding, Blurring, Combining, ToneMapping, Final]
        );
        assert_eq!(walk(&config(PostMode::Bloom, 1, false)), vec![Thresholding, Blurring, Final]);
        assert_eq!(walk(&config(PostMode::Blur, 9, false)), vec![Blurring, Final]);
        assert_eq!(walk(&config(PostMode::Blur, 3, true)), vec![Blurring, ToneMapping, Final]);
    }

    /// Weights sum to one across the full 11-tap kernel and fall off with distance.
    #[test]
    fn gaussian_kernel() {
        let w = gaussian_weights();
        let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-6);
        for pair in w.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        let uniform = blur_uniform(BlurAxis::Vertical, 512, 288);
        assert_eq!(uniform.step, [0.0, 1.0 / 288.0, 0.0, 0.0]);
        assert_eq!(uniform.weights[0][0], w[0]);
        assert_eq!(uniform.weights[1][1], w[5]);
    }

    /// Colours below the threshold vanish; bright ones keep their hue.
    #[test]
    fn threshold_ramp() {
        assert_eq!(threshold(Vec4::new(0.5, 0.5, 0.5, 1.0), 1.4).truncate(), Vec3::ZERO);
        let bright = threshold(Vec4::new(3.0, 3.0, 3.0, 1.0), 1.4);
        assert!((bright.x - 1.6).abs() < 1e-5);
        let red = threshold(Vec4::new(10.0, 0.0, 0.0, 1.0), 1.0);
        assert!(red.x > 0.0 && red.y == 0.0 && red.z == 0.0);
        assert_eq!(threshold(Vec4::ZERO, 0.0).truncate(), Vec3::ZERO);
    }

    /// The tone curve stays within its documented bounds.
    #[test]
    fn tone_map_tolerance() {
        for i in 1..=100 {
            let c = i as f32 / 100.0;
            let out = tone_map(Vec3::splat(c), 1.0, false).x;
            assert!(out >= 0.6 * c, "c = {c}");
            assert!(out < 1.0);
        }
        assert!(tone_map(Vec3::splat(0.5), 1.0, false).x >= 0.39);
        let encoded = tone_map(Vec3::splat(0.5), 1.0, true).x;
        let linear = tone_map(Vec3::splat(0.5), 1.0, false).x;
        assert!((encoded - linear.powf(1.0 / 2.2)).abs() < 1e-6);
    }

    #[test]
    fn merge_scales_second_input() {
        let out = merge(Vec4::splat(0.2), Vec4::splat(0.5), 0.5);
        assert!((out - Vec4::splat(0.45)).length() < 1e-6);
    }

    /// The preview reads face 0 of the chosen slot.
    #[test]
    fn preview_layer() {
        let lights = crate::light::default_lights();
        let maps = TextureView::DepthArray(crate::device::DepthArrayId(0));
        let preview = ShadowPreview::new(maps, 2, &lights[2]);
        assert_eq!(preview.params.params, [12.0, 8.8, 95.5, 1.0]);
    }
}
