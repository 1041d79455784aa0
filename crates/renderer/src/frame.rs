//! Frame orchestration: shadows, lit scene, post-processing, present.

use crate::camera::Camera;
use crate::config::SceneConfig;
use crate::deform::SurfaceState;
use crate::device::{GraphicsDevice, RasterState, RenderTargetBinding};
use crate::error::RenderResult;
use crate::lighting::LightingState;
use crate::pipeline::ProgramBinder;
use crate::post::{PostProcessPipeline, PostReport, ShadowPreview};
use crate::scene::{
    SceneComposer, SceneContext, SceneMeshes, SceneReport, SceneTextures, TextureLibrary, DEFORM_PLANE_RESOLUTION,
};
use crate::shadow::{ShadowMapSet, ShadowPassEngine, ShadowReport, DEFAULT_SHADOW_MAP_SIZE};

/// What one frame did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub shadow: ShadowReport,
    pub scene: SceneReport,
    /// Present only when post-processing ran.
    pub post: Option<PostReport>,
    /// Whether the shadow-map preview was drawn.
    pub overlay: bool,
}

/// Owns every per-frame resource and sequences the passes.
pub struct FrameRenderer {
    binder: ProgramBinder,
    shadow_maps: ShadowMapSet,
    shadows: ShadowPassEngine,
    composer: SceneComposer,
    post: PostProcessPipeline,
}

impl FrameRenderer {
    pub fn new(device: &mut dyn GraphicsDevice, textures: &dyn TextureLibrary, screen: (u32, u32)) -> RenderResult<Self> {
        Self::with_shadow_map_size(device, textures, screen, DEFAULT_SHADOW_MAP_SIZE)
    }

    pub fn with_shadow_map_size(
        device: &mut dyn GraphicsDevice,
        textures: &dyn TextureLibrary,
        screen: (u32, u32),
        shadow_map_size: u32,
    ) -> RenderResult<Self> {
        let textures = SceneTextures::resolve(textures)?;
        let binder = ProgramBinder::new(device)?;
        let shadow_maps = ShadowMapSet::new(device, shadow_map_size)?;
        let meshes = SceneMeshes::build(device)?;
        let post = PostProcessPipeline::new(device, screen.0, screen.1)?;
        log::info!("Frame renderer ready at {}x{}", screen.0, screen.1);
        Ok(Self {
            binder,
            shadow_maps,
            shadows: ShadowPassEngine::new(),
            composer: SceneComposer::new(meshes, textures),
            post,
        })
    }

    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> RenderResult<()> {
        self.post.resize(device, width, height)
    }

    pub fn shadow_maps(&self) -> &ShadowMapSet {
        &self.shadow_maps
    }

    /// Applies UI limits, advances animation time by `dt` seconds, then renders.
    pub fn frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        config: &mut SceneConfig,
        camera: &Camera,
        dt: f32,
    ) -> RenderResult<FrameReport> {
        config.clamp_to_limits();
        if dt.is_finite() && dt > 0.0 {
            config.deformation.time += dt;
        }
        self.render(device, config, camera)
    }

    /// Renders and presents one frame. On failure the frame is discarded and
    /// nothing reaches the screen.
    pub fn render(&self, device: &mut dyn GraphicsDevice, config: &SceneConfig, camera: &Camera) -> RenderResult<FrameReport> {
        device.begin_frame()?;
        let report = match self.record(device, config, camera) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("Frame dropped: {err}");
                device.discard_frame();
                return Err(err);
            }
        };
        if let Err(err) = device.present() {
            device.discard_frame();
            return Err(err);
        }
        log::trace!("{report:?}");
        Ok(report)
    }

    fn record(&self, device: &mut dyn GraphicsDevice, config: &SceneConfig, camera: &Camera) -> RenderResult<FrameReport> {
        let lighting = LightingState::build(&config.lights, config.show_normals);
        let surface = SurfaceState::new(
            &config.deformation,
            &config.tessellation,
            DEFORM_PLANE_RESOLUTION as f32,
            camera.position(),
            self.composer.textures().height,
        );
        device.set_raster_state(RasterState::with_wireframe(config.wireframe));

        let casters = self.composer.meshes().shadow_casters(&config.deformation);
        let shadow = self
            .shadows
            .render(device, &self.binder, &self.shadow_maps, &lighting, &casters, &surface)?;

        let target = if config.post.enabled {
            self.post.scene_target()
        } else {
            RenderTargetBinding::BackBuffer
        };
        let scene = self.composer.render(
            device,
            &self.binder,
            &SceneContext {
                config,
                camera,
                lighting: &lighting,
                surface: &surface,
                shadow_maps: self.shadow_maps.view(),
                target,
            },
        )?;

        let preview = config.shadow_preview.and_then(|slot| {
            let light = config.lights.get(slot)?;
            Some(ShadowPreview::new(self.shadow_maps.view(), slot, light))
        });

        let post = if config.post.enabled {
            device.set_raster_state(RasterState::DEFAULT);
            Some(self.post.run(device, &self.binder, &config.post, preview.as_ref())?)
        } else {
            if let Some(preview) = &preview {
                let (width, height) = device.back_buffer_size();
                preview.draw(device, &self.binder, self.post.quad(), width, height)?;
            }
            None
        };

        Ok(FrameReport {
            shadow,
            scene,
            post,
            overlay: preview.is_some(),
        })
    }
}
