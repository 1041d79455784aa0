//! Shader program configurations.
//!
//! A closed set of program kinds, each with a static resource signature, and a
//! tagged parameter set ([`Program`]) that knows how to bind itself. Backends
//! build their pipelines from [`ProgramKind::signature`]; the recording device
//! checks draws against it.

use crate::deform::SurfaceState;
use crate::device::{
    AddressMode, BufferId, FilterMode, GraphicsDevice, MeshHandle, SamplerDesc, SamplerId, ShaderStage,
    TextureView,
};
use crate::error::RenderResult;
use crate::uniforms::{
    BlurUniform, CameraUniform, DeformUniform, LightUniform, LitTransformUniform, MergeUniform, PreviewUniform,
    ThresholdUniform, ToneMapUniform, TransformUniform, WindUniform,
};
use bytemuck::Pod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlurAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Unlit textured geometry.
    Texture,
    /// Depth-only geometry for shadow maps.
    Depth,
    /// Depth-only deformed plane.
    DeformDepth,
    /// Lit geometry with shadow lookups.
    Shadow,
    /// Lit deformed plane.
    Deform,
    /// Lit deformed plane plus grass blades.
    SurfaceDetail,
    Blur(BlurAxis),
    Threshold,
    Merge,
    ToneMap,
    /// Linearised view of one shadow map.
    DepthPreview,
}

/// What a signature slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Uniform,
    /// A 2D colour texture or offscreen target.
    Texture,
    /// All layers of a depth array.
    DepthArray,
    Sampler,
    ComparisonSampler,
}

impl ResourceKind {
    /// Whether `view` can be bound where this kind is declared.
    pub fn accepts(self, view: &TextureView) -> bool {
        match self {
            ResourceKind::Texture => matches!(view, TextureView::Texture(_) | TextureView::Target(_)),
            ResourceKind::DepthArray => matches!(view, TextureView::DepthArray(_)),
            _ => false,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, ResourceKind::Sampler | ResourceKind::ComparisonSampler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceSlot {
    pub stage: ShaderStage,
    pub slot: u32,
    pub kind: ResourceKind,
}

const fn slot(stage: ShaderStage, slot: u32, kind: ResourceKind) -> ResourceSlot {
    ResourceSlot { stage, slot, kind }
}

use ResourceKind::{ComparisonSampler, DepthArray, Sampler, Texture, Uniform};
use ShaderStage::{Domain, Geometry, Hull, Pixel, Vertex};

const TEXTURE_SIGNATURE: &[ResourceSlot] = &[
    slot(Vertex, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 0, Sampler),
];

const DEPTH_SIGNATURE: &[ResourceSlot] = &[slot(Vertex, 0, Uniform)];

const DEFORM_DEPTH_SIGNATURE: &[ResourceSlot] = &[
    slot(Hull, 0, Uniform),
    slot(Hull, 1, Uniform),
    slot(Domain, 0, Uniform),
    slot(Domain, 1, Uniform),
    slot(Domain, 2, Uniform),
    slot(Domain, 0, Texture),
    slot(Domain, 0, Sampler),
];

const SHADOW_SIGNATURE: &[ResourceSlot] = &[
    slot(Vertex, 0, Uniform),
    slot(Vertex, 2, Uniform),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 1, DepthArray),
    slot(Pixel, 0, Sampler),
    slot(Pixel, 1, ComparisonSampler),
];

const DEFORM_SIGNATURE: &[ResourceSlot] = &[
    slot(Hull, 0, Uniform),
    slot(Hull, 1, Uniform),
    slot(Domain, 0, Uniform),
    slot(Domain, 1, Uniform),
    slot(Domain, 2, Uniform),
    slot(Domain, 0, Texture),
    slot(Domain, 0, Sampler),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 1, DepthArray),
    slot(Pixel, 0, Sampler),
    slot(Pixel, 1, ComparisonSampler),
];

const SURFACE_DETAIL_SIGNATURE: &[ResourceSlot] = &[
    slot(Hull, 0, Uniform),
    slot(Hull, 1, Uniform),
    slot(Domain, 0, Uniform),
    slot(Domain, 1, Uniform),
    slot(Domain, 2, Uniform),
    slot(Domain, 0, Texture),
    slot(Domain, 0, Sampler),
    slot(Geometry, 0, Uniform),
    slot(Geometry, 1, Uniform),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 1, DepthArray),
    slot(Pixel, 0, Sampler),
    slot(Pixel, 1, ComparisonSampler),
];

/// Blur, threshold and tone map: one source image and one parameter block.
const FILTER_SIGNATURE: &[ResourceSlot] = &[
    slot(Vertex, 0, Uniform),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 0, Sampler),
];

const MERGE_SIGNATURE: &[ResourceSlot] = &[
    slot(Vertex, 0, Uniform),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 0, Texture),
    slot(Pixel, 1, Texture),
    slot(Pixel, 0, Sampler),
];

const PREVIEW_SIGNATURE: &[ResourceSlot] = &[
    slot(Vertex, 0, Uniform),
    slot(Pixel, 0, Uniform),
    slot(Pixel, 1, DepthArray),
];

impl ProgramKind {
    pub const ALL: [ProgramKind; 12] = [
        ProgramKind::Texture,
        ProgramKind::Depth,
        ProgramKind::DeformDepth,
        ProgramKind::Shadow,
        ProgramKind::Deform,
        ProgramKind::SurfaceDetail,
        ProgramKind::Blur(BlurAxis::Horizontal),
        ProgramKind::Blur(BlurAxis::Vertical),
        ProgramKind::Threshold,
        ProgramKind::Merge,
        ProgramKind::ToneMap,
        ProgramKind::DepthPreview,
    ];

    /// Every resource the program reads, by stage and slot.
    pub fn signature(self) -> &'static [ResourceSlot] {
        match self {
            ProgramKind::Texture => TEXTURE_SIGNATURE,
            ProgramKind::Depth => DEPTH_SIGNATURE,
            ProgramKind::DeformDepth => DEFORM_DEPTH_SIGNATURE,
            ProgramKind::Shadow => SHADOW_SIGNATURE,
            ProgramKind::Deform => DEFORM_SIGNATURE,
            ProgramKind::SurfaceDetail => SURFACE_DETAIL_SIGNATURE,
            ProgramKind::Blur(_) | ProgramKind::Threshold | ProgramKind::ToneMap => FILTER_SIGNATURE,
            ProgramKind::Merge => MERGE_SIGNATURE,
            ProgramKind::DepthPreview => PREVIEW_SIGNATURE,
        }
    }

    /// Programs that write depth only and have no pixel stage.
    pub fn is_depth_only(self) -> bool {
        matches!(self, ProgramKind::Depth | ProgramKind::DeformDepth)
    }

    /// Programs that consume `PatchList4` meshes.
    pub fn uses_patches(self) -> bool {
        matches!(
            self,
            ProgramKind::DeformDepth | ProgramKind::Deform | ProgramKind::SurfaceDetail
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Texture => "texture",
            ProgramKind::Depth => "depth",
            ProgramKind::DeformDepth => "deform_depth",
            ProgramKind::Shadow => "shadow",
            ProgramKind::Deform => "deform",
            ProgramKind::SurfaceDetail => "surface_detail",
            ProgramKind::Blur(BlurAxis::Horizontal) => "blur_horizontal",
            ProgramKind::Blur(BlurAxis::Vertical) => "blur_vertical",
            ProgramKind::Threshold => "threshold",
            ProgramKind::Merge => "merge",
            ProgramKind::ToneMap => "tone_map",
            ProgramKind::DepthPreview => "depth_preview",
        }
    }
}

/// Shading inputs shared by every lit program.
#[derive(Debug, Clone, Copy)]
pub struct LitInputs<'a> {
    pub transforms: &'a LitTransformUniform,
    pub lights: &'a LightUniform,
    pub camera: &'a CameraUniform,
    pub albedo: TextureView,
    pub shadow_maps: TextureView,
}

/// Parameters for one draw, tagged by program.
#[derive(Debug, Clone, Copy)]
pub enum Program<'a> {
    Texture {
        transforms: &'a TransformUniform,
        texture: TextureView,
    },
    Depth {
        transforms: &'a TransformUniform,
    },
    DeformDepth {
        transforms: &'a TransformUniform,
        surface: &'a SurfaceState,
    },
    Shadow(LitInputs<'a>),
    Deform {
        lit: LitInputs<'a>,
        surface: &'a SurfaceState,
    },
    SurfaceDetail {
        lit: LitInputs<'a>,
        surface: &'a SurfaceState,
        wind: &'a WindUniform,
    },
    Blur {
        axis: BlurAxis,
        transforms: &'a TransformUniform,
        params: &'a BlurUniform,
        source: TextureView,
    },
    Threshold {
        transforms: &'a TransformUniform,
        params: &'a ThresholdUniform,
        source: TextureView,
    },
    Merge {
        transforms: &'a TransformUniform,
        params: &'a MergeUniform,
        base: TextureView,
        added: TextureView,
    },
    ToneMap {
        transforms: &'a TransformUniform,
        params: &'a ToneMapUniform,
        source: TextureView,
    },
    DepthPreview {
        transforms: &'a TransformUniform,
        params: &'a PreviewUniform,
        shadow_maps: TextureView,
    },
}

impl Program<'_> {
    pub fn kind(&self) -> ProgramKind {
        match self {
            Program::Texture { .. } => ProgramKind::Texture,
            Program::Depth { .. } => ProgramKind::Depth,
            Program::DeformDepth { .. } => ProgramKind::DeformDepth,
            Program::Shadow(_) => ProgramKind::Shadow,
            Program::Deform { .. } => ProgramKind::Deform,
            Program::SurfaceDetail { .. } => ProgramKind::SurfaceDetail,
            Program::Blur { axis, .. } => ProgramKind::Blur(*axis),
            Program::Threshold { .. } => ProgramKind::Threshold,
            Program::Merge { .. } => ProgramKind::Merge,
            Program::ToneMap { .. } => ProgramKind::ToneMap,
            Program::DepthPreview { .. } => ProgramKind::DepthPreview,
        }
    }
}

/// Constant buffers, one per uniform layout.
#[derive(Debug, Clone, Copy)]
struct ConstantBuffers {
    transform: BufferId,
    lit_transform: BufferId,
    light: BufferId,
    camera: BufferId,
    deform: BufferId,
    wind: BufferId,
    blur: BufferId,
    threshold: BufferId,
    merge: BufferId,
    tone_map: BufferId,
    preview: BufferId,
}

/// Samplers shared by every program.
#[derive(Debug, Clone, Copy)]
pub struct Samplers {
    pub linear_wrap: SamplerId,
    pub linear_clamp: SamplerId,
    pub shadow: SamplerId,
}

/// Owns the program inputs and implements "bind parameters, issue draw".
pub struct ProgramBinder {
    buffers: ConstantBuffers,
    samplers: Samplers,
}

fn buffer_for<T: Pod>(device: &mut dyn GraphicsDevice, label: &str) -> RenderResult<BufferId> {
    device.create_constant_buffer(label, std::mem::size_of::<T>())
}

fn upload<T: Pod>(device: &mut dyn GraphicsDevice, buffer: BufferId, value: &T) -> RenderResult<()> {
    device.upload_constant_buffer(buffer, bytemuck::bytes_of(value))
}

impl ProgramBinder {
    pub fn new(device: &mut dyn GraphicsDevice) -> RenderResult<Self> {
        let buffers = ConstantBuffers {
            transform: buffer_for::<TransformUniform>(device, "Transform Buffer")?,
            lit_transform: buffer_for::<LitTransformUniform>(device, "Lit Transform Buffer")?,
            light: buffer_for::<LightUniform>(device, "Light Buffer")?,
            camera: buffer_for::<CameraUniform>(device, "Camera Buffer")?,
            deform: buffer_for::<DeformUniform>(device, "Deform Buffer")?,
            wind: buffer_for::<WindUniform>(device, "Wind Buffer")?,
            blur: buffer_for::<BlurUniform>(device, "Blur Buffer")?,
            threshold: buffer_for::<ThresholdUniform>(device, "Threshold Buffer")?,
            merge: buffer_for::<MergeUniform>(device, "Merge Buffer")?,
            tone_map: buffer_for::<ToneMapUniform>(device, "Tone Map Buffer")?,
            preview: buffer_for::<PreviewUniform>(device, "Preview Buffer")?,
        };
        let samplers = Samplers {
            linear_wrap: device.create_sampler(
                "Linear Wrap Sampler",
                SamplerDesc {
                    filter: FilterMode::Linear,
                    address: AddressMode::Wrap,
                    compare: false,
                },
            )?,
            linear_clamp: device.create_sampler(
                "Linear Clamp Sampler",
                SamplerDesc {
                    filter: FilterMode::Linear,
                    address: AddressMode::Clamp,
                    compare: false,
                },
            )?,
            shadow: device.create_sampler(
                "Shadow Sampler",
                SamplerDesc {
                    filter: FilterMode::Point,
                    address: AddressMode::Clamp,
                    compare: true,
                },
            )?,
        };
        log::info!("Program binder ready ({} program kinds)", ProgramKind::ALL.len());
        Ok(Self { buffers, samplers })
    }

    pub fn samplers(&self) -> Samplers {
        self.samplers
    }

    /// Selects the program and binds every input its signature declares.
    pub fn bind(&self, device: &mut dyn GraphicsDevice, program: &Program) -> RenderResult<()> {
        device.set_program(program.kind());
        let b = self.buffers;
        match *program {
            Program::Texture { transforms, texture } => {
                self.bind_transforms(device, transforms)?;
                device.bind_texture(Pixel, 0, texture);
                device.bind_sampler(Pixel, 0, self.samplers.linear_wrap);
            }
            Program::Depth { transforms } => {
                self.bind_transforms(device, transforms)?;
            }
            Program::DeformDepth { transforms, surface } => {
                upload(device, b.transform, transforms)?;
                device.bind_constant_buffer(Domain, 0, b.transform);
                self.bind_surface(device, surface)?;
            }
            Program::Shadow(lit) => {
                upload(device, b.lit_transform, lit.transforms)?;
                upload(device, b.camera, lit.camera)?;
                device.bind_constant_buffer(Vertex, 0, b.lit_transform);
                device.bind_constant_buffer(Vertex, 2, b.camera);
                self.bind_lit_pixel(device, &lit)?;
            }
            Program::Deform { lit, surface } => {
                upload(device, b.lit_transform, lit.transforms)?;
                device.bind_constant_buffer(Domain, 0, b.lit_transform);
                self.bind_surface(device, surface)?;
                self.bind_lit_pixel(device, &lit)?;
            }
            Program::SurfaceDetail { lit, surface, wind } => {
                upload(device, b.lit_transform, lit.transforms)?;
                upload(device, b.wind, wind)?;
                device.bind_constant_buffer(Domain, 0, b.lit_transform);
                device.bind_constant_buffer(Geometry, 0, b.lit_transform);
                device.bind_constant_buffer(Geometry, 1, b.wind);
                self.bind_surface(device, surface)?;
                self.bind_lit_pixel(device, &lit)?;
            }
            Program::Blur {
                transforms, params, source, ..
            } => {
                upload(device, b.blur, params)?;
                self.bind_filter(device, transforms, b.blur, source)?;
            }
            Program::Threshold {
                transforms,
                params,
                source,
            } => {
                upload(device, b.threshold, params)?;
                self.bind_filter(device, transforms, b.threshold, source)?;
            }
            Program::Merge {
                transforms,
                params,
                base,
                added,
            } => {
                upload(device, b.merge, params)?;
                self.bind_filter(device, transforms, b.merge, base)?;
                device.bind_texture(Pixel, 1, added);
            }
            Program::ToneMap {
                transforms,
                params,
                source,
            } => {
                upload(device, b.tone_map, params)?;
                self.bind_filter(device, transforms, b.tone_map, source)?;
            }
            Program::DepthPreview {
                transforms,
                params,
                shadow_maps,
            } => {
                self.bind_transforms(device, transforms)?;
                upload(device, b.preview, params)?;
                device.bind_constant_buffer(Pixel, 0, b.preview);
                device.bind_texture(Pixel, 1, shadow_maps);
            }
        }
        Ok(())
    }

    /// Binds the program and mesh, then issues the indexed draw.
    pub fn draw(&self, device: &mut dyn GraphicsDevice, mesh: &MeshHandle, program: &Program) -> RenderResult<()> {
        self.bind(device, program)?;
        device.bind_mesh(mesh);
        device.draw_indexed(mesh.index_count)
    }

    fn bind_transforms(&self, device: &mut dyn GraphicsDevice, transforms: &TransformUniform) -> RenderResult<()> {
        upload(device, self.buffers.transform, transforms)?;
        device.bind_constant_buffer(Vertex, 0, self.buffers.transform);
        Ok(())
    }

    fn bind_surface(&self, device: &mut dyn GraphicsDevice, surface: &SurfaceState) -> RenderResult<()> {
        let b = self.buffers;
        upload(device, b.deform, &surface.deform)?;
        upload(device, b.camera, &surface.camera)?;
        device.bind_constant_buffer(Hull, 0, b.deform);
        device.bind_constant_buffer(Hull, 1, b.camera);
        device.bind_constant_buffer(Domain, 1, b.deform);
        device.bind_constant_buffer(Domain, 2, b.camera);
        device.bind_texture(Domain, 0, TextureView::Texture(surface.height_map));
        device.bind_sampler(Domain, 0, self.samplers.linear_clamp);
        Ok(())
    }

    fn bind_lit_pixel(&self, device: &mut dyn GraphicsDevice, lit: &LitInputs) -> RenderResult<()> {
        upload(device, self.buffers.light, lit.lights)?;
        device.bind_constant_buffer(Pixel, 0, self.buffers.light);
        device.bind_texture(Pixel, 0, lit.albedo);
        device.bind_texture(Pixel, 1, lit.shadow_maps);
        device.bind_sampler(Pixel, 0, self.samplers.linear_wrap);
        device.bind_sampler(Pixel, 1, self.samplers.shadow);
        Ok(())
    }

    fn bind_filter(
        &self,
        device: &mut dyn GraphicsDevice,
        transforms: &TransformUniform,
        params: BufferId,
        source: TextureView,
    ) -> RenderResult<()> {
        self.bind_transforms(device, transforms)?;
        device.bind_constant_buffer(Pixel, 0, params);
        device.bind_texture(Pixel, 0, source);
        device.bind_sampler(Pixel, 0, self.samplers.linear_clamp);
        Ok(())
    }
}
