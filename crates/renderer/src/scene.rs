//! The fixed scene: object layout, meshes, textures and the lit pass.

use crate::camera::Camera;
use crate::config::SceneConfig;
use crate::deform::{DeformationParameters, SurfaceState};
use crate::device::{
    with_raster_state, GraphicsDevice, MeshHandle, RenderTargetBinding, TextureHandle, TextureView,
};
use crate::error::{RenderError, RenderResult};
use crate::lighting::LightingState;
use crate::mesh::MeshData;
use crate::pipeline::{LitInputs, Program, ProgramBinder};
use crate::shadow::ShadowCaster;
use crate::uniforms::{CameraUniform, LitTransformUniform, TransformUniform, LIGHT_SLOTS};
use engine_core::Placement;
use glam::{Mat4, Vec3};
use std::collections::HashMap;

/// Colour every scene target is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.05, 1.0];

pub const SPHERE_POSITIONS: [Vec3; 4] = [
    Vec3::new(-50.0, -4.0, 50.0),
    Vec3::new(20.0, -4.0, 50.0),
    Vec3::new(-20.0, -4.0, 50.0),
    Vec3::new(50.0, -4.0, 50.0),
];
pub const SPHERE_SCALE: f32 = 5.0;

pub const CUBE_POSITIONS: [Vec3; 4] = [
    Vec3::new(-30.0, -6.0, 0.0),
    Vec3::new(30.0, -6.0, 0.0),
    Vec3::new(0.0, -6.0, 30.0),
    Vec3::new(0.0, -6.0, -30.0),
];
pub const CUBE_SCALE: Vec3 = Vec3::new(1.0, 4.0, 5.0);

pub const DEFORM_PLANE_ORIGIN: Vec3 = Vec3::new(-15.0, -8.0, -15.0);
/// Patches per side of the deformable plane (one world unit each).
pub const DEFORM_PLANE_RESOLUTION: u32 = 30;
pub const FLOOR_ORIGIN: Vec3 = Vec3::new(-50.0, -10.0, -50.0);
pub const FLOOR_SIZE: u32 = 100;

/// Draws per shadow pass: 4 spheres, 4 cubes, the plane, the centre sphere, the floor.
pub const SHADOW_CASTERS: usize = 11;

pub fn sphere_placement(index: usize) -> Placement {
    Placement::at(SPHERE_POSITIONS[index]).uniform_scale(SPHERE_SCALE)
}

/// The last two cubes are turned to face the other axis.
pub fn cube_placement(index: usize) -> Placement {
    let placement = Placement::at(CUBE_POSITIONS[index]).scaled(CUBE_SCALE);
    if index > 1 {
        placement.rotated_y_degrees(90.0)
    } else {
        placement
    }
}

pub fn deform_plane_placement() -> Placement {
    Placement::at(DEFORM_PLANE_ORIGIN)
}

/// Marks the deformation's sphere centre.
pub fn center_sphere_placement(deformation: &DeformationParameters) -> Placement {
    deform_plane_placement().translated(deformation.sphere_center)
}

pub fn floor_placement() -> Placement {
    Placement::at(FLOOR_ORIGIN)
}

/// Uploaded scene geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneMeshes {
    pub sphere: MeshHandle,
    pub cube: MeshHandle,
    pub floor: MeshHandle,
    /// `PatchList4` plane for the tessellation stages.
    pub deform_plane: MeshHandle,
}

impl SceneMeshes {
    pub fn build(device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        Ok(Self {
            sphere: device.create_mesh("Sphere", &MeshData::sphere(1.0, 20, 20))?,
            cube: device.create_mesh("Cube", &MeshData::cube())?,
            floor: device.create_mesh("Floor", &MeshData::grid_plane(FLOOR_SIZE))?,
            deform_plane: device.create_mesh(
                "Deform Plane",
                &MeshData::patch_plane(DEFORM_PLANE_RESOLUTION),
            )?,
        })
    }

    /// The depth-only draw list, in draw order.
    pub fn shadow_casters(&self, deformation: &DeformationParameters) -> Vec<ShadowCaster> {
        let plain = |mesh: MeshHandle, placement: Placement| ShadowCaster {
            mesh,
            world: placement.matrix(),
            deformed: false,
        };
        let mut casters = Vec::with_capacity(SHADOW_CASTERS);
        for i in 0..4 {
            casters.push(plain(self.sphere, sphere_placement(i)));
            casters.push(plain(self.cube, cube_placement(i)));
        }
        casters.push(ShadowCaster {
            mesh: self.deform_plane,
            world: deform_plane_placement().matrix(),
            deformed: true,
        });
        casters.push(plain(self.sphere, center_sphere_placement(deformation)));
        casters.push(plain(self.floor, floor_placement()));
        casters
    }
}

/// Named textures, provided by whoever loaded them.
pub trait TextureLibrary {
    fn texture(&self, name: &str) -> Option<TextureHandle>;
}

impl TextureLibrary for HashMap<String, TextureHandle> {
    fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.get(name).copied()
    }
}

/// Texture names the scene needs.
pub const REQUIRED_TEXTURES: [&str; 10] = [
    "default", "height", "mars", "brick", "lwood", "dwood", "colour0", "colour1", "colour2", "colour3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTextures {
    pub default: TextureHandle,
    pub height: TextureHandle,
    pub mars: TextureHandle,
    pub brick: TextureHandle,
    pub light_wood: TextureHandle,
    pub dark_wood: TextureHandle,
    pub colours: [TextureHandle; 4],
}

impl SceneTextures {
    /// Looks up every required name; the first missing one is an error.
    pub fn resolve(library: &dyn TextureLibrary) -> RenderResult<Self> {
        let get = |name: &str| {
            library
                .texture(name)
                .ok_or_else(|| RenderError::MissingTexture(name.to_string()))
        };
        Ok(Self {
            default: get("default")?,
            height: get("height")?,
            mars: get("mars")?,
            brick: get("brick")?,
            light_wood: get("lwood")?,
            dark_wood: get("dwood")?,
            colours: [get("colour0")?, get("colour1")?, get("colour2")?, get("colour3")?],
        })
    }
}

/// Per-frame inputs of the lit pass.
pub struct SceneContext<'a> {
    pub config: &'a SceneConfig,
    pub camera: &'a Camera,
    pub lighting: &'a LightingState,
    pub surface: &'a SurfaceState,
    pub shadow_maps: TextureView,
    pub target: RenderTargetBinding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneReport {
    pub draws: u32,
    pub surface_detail: bool,
}

struct DrawCounter<'b> {
    binder: &'b ProgramBinder,
    count: u32,
}

impl DrawCounter<'_> {
    fn draw(&mut self, device: &mut dyn GraphicsDevice, mesh: &MeshHandle, program: &Program) -> RenderResult<()> {
        self.binder.draw(device, mesh, program)?;
        self.count += 1;
        Ok(())
    }
}

fn lit<'a>(
    ctx: &'a SceneContext,
    transforms: &'a LitTransformUniform,
    camera: &'a CameraUniform,
    albedo: TextureHandle,
) -> LitInputs<'a> {
    LitInputs {
        transforms,
        lights: ctx.lighting.light_uniform(),
        camera,
        albedo: TextureView::Texture(albedo),
        shadow_maps: ctx.shadow_maps,
    }
}

/// Draws the lit scene into one target.
pub struct SceneComposer {
    meshes: SceneMeshes,
    textures: SceneTextures,
}

impl SceneComposer {
    pub fn new(meshes: SceneMeshes, textures: SceneTextures) -> Self {
        Self { meshes, textures }
    }

    pub fn meshes(&self) -> &SceneMeshes {
        &self.meshes
    }

    pub fn textures(&self) -> &SceneTextures {
        &self.textures
    }

    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        ctx: &SceneContext,
    ) -> RenderResult<SceneReport> {
        let config = ctx.config;
        let view = ctx.camera.view_matrix();
        let projection = ctx.camera.projection_matrix();
        let camera = CameraUniform {
            position: ctx.camera.position().extend(1.0).to_array(),
        };
        let m = &self.meshes;
        let t = &self.textures;

        device.set_render_target(ctx.target);
        device.clear_render_target(CLEAR_COLOR);
        device.set_depth_test(true);

        let mut draws = DrawCounter { binder, count: 0 };
        let mut surface_detail = false;

        for i in 0..LIGHT_SLOTS {
            let gizmo = TransformUniform::new(
                Mat4::from_translation(config.lights[i].position),
                view,
                projection,
            );
            draws.draw(
                device,
                &m.sphere,
                &Program::Texture {
                    transforms: &gizmo,
                    texture: TextureView::Texture(t.default),
                },
            )?;

            let sphere = TransformUniform::new(sphere_placement(i).matrix(), view, projection);
            draws.draw(
                device,
                &m.sphere,
                &Program::Texture {
                    transforms: &sphere,
                    texture: TextureView::Texture(t.colours[i]),
                },
            )?;

            let cube = ctx.lighting.lit_transforms(cube_placement(i).matrix(), view, projection);
            draws.draw(device, &m.cube, &Program::Shadow(lit(ctx, &cube, &camera, t.brick)))?;
        }

        let plane = ctx
            .lighting
            .lit_transforms(deform_plane_placement().matrix(), view, projection);
        draws.draw(
            device,
            &m.deform_plane,
            &Program::Deform {
                lit: lit(ctx, &plane, &camera, t.mars),
                surface: ctx.surface,
            },
        )?;

        if config.surface_detail.enabled {
            let wind = config
                .surface_detail
                .wind_uniform(config.deformation.time);
            let program = Program::SurfaceDetail {
                lit: lit(ctx, &plane, &camera, t.mars),
                surface: ctx.surface,
                wind: &wind,
            };
            if config.wireframe {
                draws.draw(device, &m.deform_plane, &program)?;
            } else {
                let blades = device.raster_state().double_sided();
                with_raster_state(device, blades, |device| draws.draw(device, &m.deform_plane, &program))?;
            }
            surface_detail = true;
        }

        let center = ctx.lighting.lit_transforms(
            center_sphere_placement(&config.deformation).matrix(),
            view,
            projection,
        );
        draws.draw(device, &m.sphere, &Program::Shadow(lit(ctx, &center, &camera, t.default)))?;

        if !config.wireframe {
            // Dark wood under post-processing, light wood otherwise.
            let wood = if config.post.enabled { t.dark_wood } else { t.light_wood };
            let floor = ctx
                .lighting
                .lit_transforms(floor_placement().matrix(), view, projection);
            draws.draw(device, &m.floor, &Program::Shadow(lit(ctx, &floor, &camera, wood)))?;
        }

        let report = SceneReport {
            draws: draws.count,
            surface_detail,
        };
        log::trace!("Scene pass: {} draws", report.draws);
        Ok(report)
    }
}
