//! Whole-frame scenarios driven through the command-log device.

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use renderer::deform::Wave;
use renderer::pipeline::ProgramKind;
use renderer::post::{PassCounts, PostStage};
use renderer::scene::{DEFORM_PLANE_ORIGIN, DEFORM_PLANE_RESOLUTION};
use renderer::tessellation::{PatchFactors, TessellationSettings, MAX_FACTOR, MIN_FACTOR};
use renderer::uniforms::{CameraUniform, DeformUniform};
use renderer::{
    Camera, CullMode, FillMode, FrameRenderer, GraphicsDevice, MeshData, PostMode, RecordingDevice, RenderError,
    RenderTargetBinding, SceneConfig, ShaderStage, REQUIRED_TEXTURES,
};

const SHADOW_CASTERS: u32 = 11;

fn setup() -> (RecordingDevice, FrameRenderer, Camera) {
    let mut device = RecordingDevice::with_textures(1280, 720, REQUIRED_TEXTURES);
    let library = device.texture_library();
    let renderer = FrameRenderer::new(&mut device, &library, (1280, 720)).expect("renderer");
    let mut camera = Camera::new(Vec3::new(0.0, 10.0, -60.0));
    camera.set_aspect(1280, 720);
    (device, renderer, camera)
}

fn post_config(mode: PostMode, blur_passes: usize, hdr: bool) -> SceneConfig {
    let mut config = SceneConfig::default();
    config.post.enabled = true;
    config.post.mode = mode;
    config.post.blur_passes = blur_passes;
    config.post.hdr = hdr;
    config
}

fn programs_in_last_frame(device: &RecordingDevice) -> Vec<ProgramKind> {
    device
        .last_frame_passes()
        .iter()
        .flat_map(|pass| pass.draws.iter().map(|d| d.program))
        .collect()
}

/// Default lights are point, disabled, directional and spot: six cube faces
/// plus one face each, every face drawing the full caster list.
#[test]
fn default_frame_shadow_passes() {
    let (mut device, renderer, camera) = setup();
    let report = renderer
        .render(&mut device, &SceneConfig::default(), &camera)
        .expect("frame");

    assert_eq!(report.shadow.passes, 8);
    assert_eq!(report.shadow.draws, 8 * SHADOW_CASTERS);
    assert_eq!(report.shadow.slots, vec![0, 1, 2, 3, 4, 5, 12, 18]);

    let shadow_passes: Vec<_> = device
        .last_frame_passes()
        .into_iter()
        .filter(|pass| pass.target.is_depth_only())
        .collect();
    assert_eq!(shadow_passes.len(), 8);
    for pass in &shadow_passes {
        assert_eq!(pass.draws.len() as u32, SHADOW_CASTERS);
        let deformed = pass
            .draws
            .iter()
            .filter(|d| d.program == ProgramKind::DeformDepth)
            .count();
        assert_eq!(deformed, 1);
    }
    assert_eq!(device.presented_frames(), 1);
}

#[test]
fn every_light_enabled() {
    let (mut device, renderer, camera) = setup();
    let mut config = SceneConfig::default();
    config.lights[1].enabled = true;
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    assert_eq!(report.shadow.passes, 14);
    assert_eq!(report.shadow.slots.len(), 14);
    assert!(report.shadow.slots.contains(&6) && report.shadow.slots.contains(&11));
}

/// Without post-processing the lit scene goes straight to the back buffer.
#[test]
fn scene_draws_to_back_buffer() {
    let (mut device, renderer, camera) = setup();
    let report = renderer
        .render(&mut device, &SceneConfig::default(), &camera)
        .expect("frame");

    assert_eq!(report.scene.draws, 16);
    assert!(report.scene.surface_detail);
    assert!(report.post.is_none());
    assert!(!report.overlay);

    let passes = device.last_frame_passes();
    let scene = passes.last().expect("scene pass");
    assert_eq!(scene.target, RenderTargetBinding::BackBuffer);
    assert_eq!(scene.draws.len(), 16);
    assert!(scene.draws.iter().all(|d| d.depth_test));
}

/// The shadow depth passes, the lit plane and the blades all read the same
/// deformation and camera blocks.
#[test]
fn deformation_shared_by_depth_and_lit_passes() {
    let (mut device, renderer, camera) = setup();
    let mut config = SceneConfig::default();
    config.deformation.blend = 0.65;
    config.deformation.time = 3.25;
    config.deformation.height_amplitude = 2.5;
    config.deformation.waves = [Wave::new(1.5, 0.3, 2.0), Wave::new(0.75, 0.6, -1.0)];
    config.tessellation.inside = 9;
    config.tessellation.edge = 7;
    renderer.render(&mut device, &config, &camera).expect("frame");

    for (stage, slot) in [
        (ShaderStage::Hull, 0),
        (ShaderStage::Hull, 1),
        (ShaderStage::Domain, 1),
        (ShaderStage::Domain, 2),
    ] {
        let depth = device.uniforms_seen(ProgramKind::DeformDepth, stage, slot);
        let lit = device.uniforms_seen(ProgramKind::Deform, stage, slot);
        let blades = device.uniforms_seen(ProgramKind::SurfaceDetail, stage, slot);
        assert_eq!(depth.len(), 8);
        assert_eq!(lit.len(), 1);
        assert_eq!(blades.len(), 1);
        assert!(!lit[0].is_empty(), "{stage:?} {slot}");
        assert!(depth.iter().all(|bytes| *bytes == lit[0]), "{stage:?} {slot}");
        assert_eq!(blades[0], lit[0], "{stage:?} {slot}");
    }

    let bytes = &device.uniforms_seen(ProgramKind::Deform, ShaderStage::Hull, 0)[0];
    let deform: DeformUniform = bytemuck::pod_read_unaligned(bytes);
    assert_eq!(deform.time_blend_height[..3], [3.25, 0.65, 2.5]);
    assert_eq!(deform.wave_x[..3], [1.5, 0.3, 2.0]);
    assert_eq!(deform.wave_z[..3], [0.75, 0.6, -1.0]);
    assert_eq!(TessellationSettings::from_uniform(&deform), config.tessellation);
}

/// Patch factors as the GPU device derives them from the lit plane draw's inputs.
fn lit_plane_factors(device: &RecordingDevice) -> Vec<PatchFactors> {
    let read = |stage, slot| {
        let seen = device.uniforms_seen(ProgramKind::Deform, stage, slot);
        assert_eq!(seen.len(), 1);
        seen[0].clone()
    };
    let deform: DeformUniform = bytemuck::pod_read_unaligned(&read(ShaderStage::Hull, 0));
    let camera: CameraUniform = bytemuck::pod_read_unaligned(&read(ShaderStage::Hull, 1));
    let world: [[f32; 4]; 4] = bytemuck::pod_read_unaligned(&read(ShaderStage::Domain, 0)[..64]);
    TessellationSettings::from_uniform(&deform).policy().factors_for_mesh(
        &MeshData::patch_plane(DEFORM_PLANE_RESOLUTION),
        Mat4::from_cols_array_2d(&world),
        Vec4::from_array(camera.position).xyz(),
    )
}

/// With the dynamic policy the plane is refined near the camera and coarse from afar.
#[test]
fn dynamic_tessellation_follows_camera() {
    let (mut device, renderer, _) = setup();
    let mut config = SceneConfig::default();
    config.tessellation.dynamic = true;
    let center = DEFORM_PLANE_ORIGIN + Vec3::new(15.0, 0.0, 15.0);

    let near = Camera::new(center + Vec3::new(0.0, 2.0, 0.0));
    renderer.render(&mut device, &config, &near).expect("near frame");
    let near_factors = lit_plane_factors(&device);

    let far = Camera::new(center + Vec3::new(0.0, 200.0, 0.0));
    renderer.render(&mut device, &config, &far).expect("far frame");
    let far_factors = lit_plane_factors(&device);

    assert_eq!(near_factors.len(), (DEFORM_PLANE_RESOLUTION * DEFORM_PLANE_RESOLUTION) as usize);
    assert_ne!(near_factors, far_factors);
    for factors in near_factors.iter().chain(&far_factors) {
        assert!(factors
            .edges
            .iter()
            .chain(&factors.inside)
            .all(|f| (MIN_FACTOR..=MAX_FACTOR).contains(f)));
    }
    assert!(near_factors.contains(&PatchFactors::uniform(MAX_FACTOR)));
    assert!(far_factors.iter().all(|f| *f == PatchFactors::uniform(MIN_FACTOR)));
}

/// Blades are drawn without culling; the next draw is back to the frame's state.
#[test]
fn raster_state_restored_after_surface_detail() {
    let (mut device, renderer, camera) = setup();
    renderer
        .render(&mut device, &SceneConfig::default(), &camera)
        .expect("frame");

    let draws = device.last_frame_passes().pop().expect("scene pass").draws;
    let blades = draws
        .iter()
        .position(|d| d.program == ProgramKind::SurfaceDetail)
        .expect("surface detail draw");
    assert_eq!(draws[blades].raster.cull, CullMode::None);
    assert_eq!(draws[blades - 1].program, ProgramKind::Deform);
    assert_eq!(draws[blades + 1].raster.cull, CullMode::Back);
    assert_eq!(device.raster_state(), draws[blades + 1].raster);
}

/// Wireframe drops the floor and keeps the blades culled like everything else.
#[test]
fn wireframe_frame() {
    let (mut device, renderer, camera) = setup();
    let mut config = SceneConfig::default();
    config.wireframe = true;
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    assert_eq!(report.scene.draws, 15);

    let scene = device.last_frame_passes().pop().expect("scene pass");
    assert!(scene
        .draws
        .iter()
        .all(|d| d.raster.fill == FillMode::Wireframe && d.raster.cull == CullMode::Back));
}

#[test]
fn surface_detail_disabled() {
    let (mut device, renderer, camera) = setup();
    let mut config = SceneConfig::default();
    config.surface_detail.enabled = false;
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    assert_eq!(report.scene.draws, 15);
    assert!(!report.scene.surface_detail);
    assert!(!programs_in_last_frame(&device).contains(&ProgramKind::SurfaceDetail));
}

/// Full bloom: threshold, nine blur levels each way, eight upscale and combine
/// steps, one scene blend, final composite.
#[test]
fn bloom_full_cascade() {
    let (mut device, renderer, camera) = setup();
    let config = post_config(PostMode::Bloom, 9, false);
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    let post = report.post.expect("post report");

    assert_eq!(
        post.stages,
        vec![
            PostStage::Thresholding,
            PostStage::Blurring,
            PostStage::Combining,
            PostStage::Final
        ]
    );
    assert_eq!(
        post.passes,
        PassCounts {
            threshold: 1,
            blur_horizontal: 9,
            blur_vertical: 9,
            upscale: 8,
            combine: 8,
            scene_blend: 1,
            tone_map: 0,
            final_composite: 1,
        }
    );

    let passes = device.last_frame_passes();
    let last = passes.last().expect("final pass");
    assert_eq!(last.target, RenderTargetBinding::BackBuffer);
    assert_eq!(last.draws[0].program, ProgramKind::Texture);
    assert!(!last.draws[0].depth_test);
}

#[test]
fn bloom_with_tone_mapping() {
    let (mut device, renderer, camera) = setup();
    let config = post_config(PostMode::Bloom, 9, true);
    let post = renderer
        .render(&mut device, &config, &camera)
        .expect("frame")
        .post
        .expect("post report");
    assert_eq!(post.stages[3], PostStage::ToneMapping);
    assert_eq!(post.passes.tone_map, 1);
    assert_eq!(post.passes.total(), 38);
    assert!(programs_in_last_frame(&device).contains(&ProgramKind::ToneMap));
}

/// A single level has nothing to combine; the blur feeds the scene blend directly.
#[test]
fn bloom_single_level() {
    let (mut device, renderer, camera) = setup();
    let config = post_config(PostMode::Bloom, 1, false);
    let post = renderer
        .render(&mut device, &config, &camera)
        .expect("frame")
        .post
        .expect("post report");
    assert_eq!(
        post.stages,
        vec![PostStage::Thresholding, PostStage::Blurring, PostStage::Final]
    );
    assert_eq!(post.passes.combine, 0);
    assert_eq!(post.passes.upscale, 0);
    assert_eq!(post.passes.scene_blend, 1);
}

#[test]
fn blur_only() {
    let (mut device, renderer, camera) = setup();
    let config = post_config(PostMode::Blur, 3, false);
    let post = renderer
        .render(&mut device, &config, &camera)
        .expect("frame")
        .post
        .expect("post report");
    assert_eq!(post.stages, vec![PostStage::Blurring, PostStage::Final]);
    assert_eq!(post.passes.threshold, 0);
    assert_eq!(post.passes.blur_horizontal, 3);
    assert_eq!(post.passes.blur_vertical, 3);
    assert_eq!(post.passes.upscale, 1);
    assert!(!programs_in_last_frame(&device).contains(&ProgramKind::Merge));
}

/// Blur passes beyond the cascade depth are clamped before rendering.
#[test]
fn blur_passes_clamped() {
    let (mut device, mut renderer, camera) = setup();
    let mut config = post_config(PostMode::Bloom, 40, false);
    let report = renderer.frame(&mut device, &mut config, &camera, 0.0).expect("frame");
    assert_eq!(config.post.blur_passes, 9);
    assert_eq!(report.post.expect("post report").passes.blur_vertical, 9);
}

/// With post-processing on, the scene is drawn offscreen and never reads its own target.
#[test]
fn post_scene_goes_offscreen() {
    let (mut device, renderer, camera) = setup();
    let config = post_config(PostMode::Bloom, 9, false);
    renderer.render(&mut device, &config, &camera).expect("frame");

    let passes = device.last_frame_passes();
    let scene = passes
        .iter()
        .find(|pass| pass.draws.iter().any(|d| d.program == ProgramKind::Deform))
        .expect("scene pass");
    assert!(matches!(scene.target, RenderTargetBinding::Offscreen(_)));
    assert_eq!(scene.draws.len(), 16);
}

#[test]
fn shadow_preview_overlay() {
    let (mut device, renderer, camera) = setup();
    let mut config = SceneConfig::default();
    config.shadow_preview = Some(3);
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    assert!(report.overlay);

    let last = device.last_frame_passes().pop().expect("back buffer pass");
    let preview = last.draws.last().expect("preview draw");
    assert_eq!(preview.program, ProgramKind::DepthPreview);
    assert_eq!(preview.target, RenderTargetBinding::BackBuffer);

    config.post.enabled = true;
    let report = renderer.render(&mut device, &config, &camera).expect("frame");
    assert!(report.overlay);
    let last = device.last_frame_passes().pop().expect("back buffer pass");
    assert_eq!(last.draws.len(), 2);
    assert_eq!(last.draws[1].program, ProgramKind::DepthPreview);
}

#[test]
fn missing_texture_is_fatal() {
    let mut device = RecordingDevice::with_textures(640, 480, REQUIRED_TEXTURES.iter().copied().filter(|n| *n != "mars"));
    let library = device.texture_library();
    match FrameRenderer::new(&mut device, &library, (640, 480)) {
        Err(RenderError::MissingTexture(name)) => assert_eq!(name, "mars"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("renderer built without its textures"),
    }
}

/// A device failure mid-frame discards the frame; nothing is presented.
#[test]
fn failed_frame_not_presented() {
    let (mut device, renderer, camera) = setup();
    device.fail_after_draws(20);
    let result = renderer.render(&mut device, &SceneConfig::default(), &camera);
    assert!(matches!(result, Err(RenderError::DeviceLost(_))));
    assert_eq!(device.presented_frames(), 0);
    assert_eq!(device.discarded_frames(), 1);
}

#[test]
fn frame_advances_time() {
    let (mut device, mut renderer, camera) = setup();
    let mut config = SceneConfig::default();
    renderer.frame(&mut device, &mut config, &camera, 0.25).expect("frame");
    renderer.frame(&mut device, &mut config, &camera, 0.25).expect("frame");
    assert!((config.deformation.time - 0.5).abs() < 1e-6);

    renderer.frame(&mut device, &mut config, &camera, -1.0).expect("frame");
    renderer.frame(&mut device, &mut config, &camera, f32::NAN).expect("frame");
    assert!((config.deformation.time - 0.5).abs() < 1e-6);
    assert_eq!(device.presented_frames(), 4);
}

/// Resizing swaps the full-screen targets without leaking the old ones.
#[test]
fn resize_recreates_screen_targets() {
    let (mut device, mut renderer, camera) = setup();
    let before = device.live_targets();
    device.set_back_buffer_size(800, 600);
    renderer.resize(&mut device, 800, 600).expect("resize");
    assert_eq!(device.live_targets(), before);

    let config = post_config(PostMode::Bloom, 9, true);
    renderer.render(&mut device, &config, &camera).expect("frame");
    assert_eq!(device.presented_frames(), 1);
}

#[test]
fn config_from_ron() {
    let config: SceneConfig = ron::from_str("(post: (enabled: true, mode: Blur, blur_passes: 4), wireframe: true)")
        .expect("parse scene config");
    assert!(config.post.enabled);
    assert_eq!(config.post.mode, PostMode::Blur);
    assert_eq!(config.post.blur_passes, 4);
    assert!(config.wireframe);
    assert_eq!(config.lights, SceneConfig::default().lights);
}
