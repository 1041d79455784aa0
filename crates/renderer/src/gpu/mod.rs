//! wgpu implementation of [`GraphicsDevice`].
//!
//! The render core drives devices in immediate mode: a constant buffer can be
//! rewritten between two draws that both read it. wgpu defers all work to
//! submission, so every draw snapshots the constant buffers it reads into a
//! per-frame uniform arena, and the passes are recorded and replayed into one
//! command encoder on `present`.

mod patches;
mod pipelines;
mod texture;

pub use texture::Texture;

use crate::bindings::{BindingTable, Bound};
use crate::device::{
    BufferId, DepthArrayId, FillMode, GraphicsDevice, MeshHandle, MeshId, RasterState, RenderTargetBinding,
    SamplerDesc, SamplerId, ShaderStage, TargetId, TextureHandle, TextureView, Topology,
};
use crate::device::{AddressMode, FilterMode};
use crate::error::{RenderError, RenderResult};
use crate::mesh::MeshData;
use crate::pipeline::{ProgramKind, ResourceKind, ResourceSlot};
use crate::scene::TextureLibrary;
use crate::tessellation::TessellationSettings;
use crate::uniforms::{CameraUniform, DeformUniform};
use bytemuck::Pod;
use glam::{Mat4, Vec4, Vec4Swizzles};
use patches::{GpuMesh, PatchCache, PatchGeometry, PatchKey};
use pipelines::{binding_index, PipelineCache, PipelineKey, TargetFormat};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use texture::{ColorTarget, DepthArray};
use wgpu::util::DeviceExt;
use winit::window::Window;

struct ConstantBuffer {
    contents: Vec<u8>,
    /// Bumped on every upload; snapshots are shared while it is unchanged.
    version: u64,
}

struct UploadedMesh {
    gpu: GpuMesh,
    /// Control points of patch meshes, tessellated per draw.
    patches: Option<MeshData>,
}

#[derive(Debug, Clone, Copy)]
struct UniformSnapshot {
    binding: u32,
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone)]
enum Geometry {
    Mesh { id: MeshId, index_count: u32 },
    Patches(PatchKey),
}

struct RecordedDraw {
    pipeline: PipelineKey,
    geometry: Geometry,
    uniforms: Vec<UniformSnapshot>,
    textures: Vec<(u32, TextureView)>,
    samplers: Vec<(u32, SamplerId)>,
}

struct RecordedPass {
    target: RenderTargetBinding,
    clear: Option<[f32; 4]>,
    draws: Vec<RecordedDraw>,
}

#[derive(Default)]
struct FrameRecording {
    arena: Vec<u8>,
    snapshots: HashMap<(BufferId, u64), u64>,
    passes: Vec<RecordedPass>,
}

/// Window-backed graphics device.
pub struct GpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    uniform_alignment: u64,
    pipelines: PipelineCache,
    patches: PatchCache,
    depth_texture: Texture,

    buffers: HashMap<BufferId, ConstantBuffer>,
    samplers: HashMap<SamplerId, (SamplerDesc, wgpu::Sampler)>,
    targets: HashMap<TargetId, ColorTarget>,
    depth_arrays: HashMap<DepthArrayId, DepthArray>,
    meshes: HashMap<MeshId, UploadedMesh>,
    textures: HashMap<TextureHandle, Texture>,
    texture_names: HashMap<String, TextureHandle>,
    next_id: u32,

    bindings: BindingTable,
    program: Option<ProgramKind>,
    target: Option<RenderTargetBinding>,
    mesh: Option<MeshId>,
    raster: RasterState,
    depth_test: bool,
    wireframe_warned: bool,
    frame: FrameRecording,
}

impl GpuDevice {
    /// Opens the adapter and device and configures the window surface.
    pub async fn new(window: Arc<Window>, vsync: bool) -> RenderResult<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::creation("surface", e))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::creation("adapter", "no suitable GPU adapter"))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let wireframe = adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE);
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: if wireframe {
                        wgpu::Features::POLYGON_MODE_LINE
                    } else {
                        wgpu::Features::empty()
                    },
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::creation("device", e))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::creation("surface", "no supported surface format"))?;

        // Mailbox when vsync is wanted and available, otherwise the automatic modes.
        let present_mode = if vsync {
            surface_caps
                .present_modes
                .iter()
                .find(|m| matches!(m, wgpu::PresentMode::Mailbox))
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        let depth_texture = Texture::create_depth_texture(&device, config.width, config.height, "Depth Texture");
        let pipelines = PipelineCache::new(&device, wireframe);
        let uniform_alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            uniform_alignment,
            pipelines,
            patches: PatchCache::default(),
            depth_texture,
            buffers: HashMap::new(),
            samplers: HashMap::new(),
            targets: HashMap::new(),
            depth_arrays: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            texture_names: HashMap::new(),
            next_id: 0,
            bindings: BindingTable::default(),
            program: None,
            target: None,
            mesh: None,
            raster: RasterState::DEFAULT,
            depth_test: true,
            wireframe_warned: false,
            frame: FrameRecording::default(),
        })
    }

    /// Handle window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_texture = Texture::create_depth_texture(&self.device, width, height, "Depth Texture");
        log::debug!("Surface resized to {}x{}", width, height);
    }

    /// Uploads an RGBA image and registers it under `name`.
    pub fn upload_texture(&mut self, name: &str, image: &image::RgbaImage, srgb: bool) -> TextureHandle {
        let handle = TextureHandle(self.allocate());
        let texture = Texture::from_rgba(&self.device, &self.queue, name, image, srgb);
        log::info!("Loaded texture '{}' ({}x{})", name, image.width(), image.height());
        self.textures.insert(handle, texture);
        if let Some(previous) = self.texture_names.insert(name.to_string(), handle) {
            self.textures.remove(&previous);
        }
        handle
    }

    /// Loaded texture names, detached from the device.
    pub fn texture_library(&self) -> HashMap<String, TextureHandle> {
        self.texture_names.clone()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Copies the current contents of `buffer` into the frame's uniform arena.
    fn snapshot(&mut self, buffer: BufferId) -> RenderResult<(u64, u64)> {
        let record = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| RenderError::unknown_handle(buffer))?;
        let size = record.contents.len() as u64;
        if let Some(&offset) = self.frame.snapshots.get(&(buffer, record.version)) {
            return Ok((offset, size));
        }
        let arena = &mut self.frame.arena;
        let offset = (arena.len() as u64).next_multiple_of(self.uniform_alignment);
        arena.resize(offset as usize, 0);
        arena.extend_from_slice(&record.contents);
        self.frame.snapshots.insert((buffer, record.version), offset);
        Ok((offset, size))
    }

    /// Current contents of the buffer bound at (`stage`, `slot`).
    fn read_uniform<T: Pod>(&self, resolved: &[(ResourceSlot, Bound)], stage: ShaderStage, slot: u32) -> RenderResult<T> {
        let buffer = resolved
            .iter()
            .find_map(|(entry, bound)| match bound {
                Bound::Buffer(id) if entry.stage == stage && entry.slot == slot => Some(*id),
                _ => None,
            })
            .ok_or_else(|| RenderError::unknown_handle((stage, slot)))?;
        let contents = &self
            .buffers
            .get(&buffer)
            .ok_or_else(|| RenderError::unknown_handle(buffer))?
            .contents;
        let size = std::mem::size_of::<T>();
        if contents.len() < size {
            return Err(RenderError::creation(
                format!("{buffer:?} read"),
                format!("{} bytes where {size} are needed", contents.len()),
            ));
        }
        Ok(bytemuck::pod_read_unaligned(&contents[..size]))
    }

    /// Geometry for a draw of `mesh_id`; patch meshes are tessellated from the bound surface state.
    fn geometry(
        &mut self,
        program: ProgramKind,
        mesh_id: MeshId,
        index_count: u32,
        resolved: &[(ResourceSlot, Bound)],
    ) -> RenderResult<Geometry> {
        let mesh = self
            .meshes
            .get(&mesh_id)
            .ok_or_else(|| RenderError::unknown_handle(mesh_id))?;
        let Some(patches) = mesh.patches.as_ref() else {
            if index_count > mesh.gpu.index_count {
                return Err(RenderError::creation(
                    format!("{} draw", program.name()),
                    format!("{index_count} indices from a {}-index mesh", mesh.gpu.index_count),
                ));
            }
            return Ok(Geometry::Mesh {
                id: mesh_id,
                index_count,
            });
        };
        if !program.uses_patches() {
            return Err(RenderError::creation(
                format!("{} draw", program.name()),
                "patch mesh drawn with a triangle program",
            ));
        }

        let deform: DeformUniform = self.read_uniform(resolved, ShaderStage::Hull, 0)?;
        let camera: CameraUniform = self.read_uniform(resolved, ShaderStage::Hull, 1)?;
        let world: [[f32; 4]; 4] = self.read_uniform(resolved, ShaderStage::Domain, 0)?;
        let factors = TessellationSettings::from_uniform(&deform).policy().factors_for_mesh(
            patches,
            Mat4::from_cols_array_2d(&world),
            Vec4::from_array(camera.position).xyz(),
        );
        let key = PatchKey {
            mesh: mesh_id,
            geometry: if program == ProgramKind::SurfaceDetail {
                PatchGeometry::Blades
            } else {
                PatchGeometry::Surface
            },
            factors,
        };
        self.patches.prepare(&self.device, &key, patches);
        Ok(Geometry::Patches(key))
    }

    fn target_format(&self, target: RenderTargetBinding) -> RenderResult<TargetFormat> {
        match target {
            RenderTargetBinding::BackBuffer => Ok(TargetFormat::Color(self.config.format)),
            RenderTargetBinding::Offscreen(id) if self.targets.contains_key(&id) => {
                Ok(TargetFormat::Color(Texture::TARGET_FORMAT))
            }
            RenderTargetBinding::DepthLayer { array, layer }
                if self
                    .depth_arrays
                    .get(&array)
                    .is_some_and(|a| (layer as usize) < a.layers.len()) =>
            {
                Ok(TargetFormat::DepthOnly)
            }
            _ => Err(RenderError::unknown_handle(target)),
        }
    }

    /// The pass writing `target`, continuing the last pass when it writes the same target.
    fn pass_for(&mut self, target: RenderTargetBinding) -> &mut RecordedPass {
        let passes = &mut self.frame.passes;
        if passes.last().map_or(true, |pass| pass.target != target) {
            passes.push(RecordedPass {
                target,
                clear: None,
                draws: Vec::new(),
            });
        }
        let last = passes.len() - 1;
        &mut passes[last]
    }

    fn texture_view(&self, view: TextureView) -> RenderResult<&wgpu::TextureView> {
        let found = match view {
            TextureView::Texture(handle) => self.textures.get(&handle).map(|t| &t.view),
            TextureView::Target(id) => self.targets.get(&id).map(|t| &t.color.view),
            TextureView::DepthArray(array) => self.depth_arrays.get(&array).map(|a| &a.array.view),
            TextureView::DepthLayer { array, layer } => self
                .depth_arrays
                .get(&array)
                .and_then(|a| a.layers.get(layer as usize)),
        };
        found.ok_or_else(|| RenderError::unknown_handle(view))
    }

    fn bind_group(&self, draw: &RecordedDraw, arena: &wgpu::Buffer) -> RenderResult<wgpu::BindGroup> {
        let program = draw.pipeline.program;
        let layout = self
            .pipelines
            .bind_group_layout(program)
            .ok_or_else(|| RenderError::unknown_handle(program))?;

        let mut entries = Vec::with_capacity(draw.uniforms.len() + draw.textures.len() + draw.samplers.len());
        for uniform in &draw.uniforms {
            entries.push(wgpu::BindGroupEntry {
                binding: uniform.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: arena,
                    offset: uniform.offset,
                    size: NonZeroU64::new(uniform.size),
                }),
            });
        }
        for &(binding, view) in &draw.textures {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(self.texture_view(view)?),
            });
        }
        for &(binding, sampler) in &draw.samplers {
            let (_, sampler) = self
                .samplers
                .get(&sampler)
                .ok_or_else(|| RenderError::unknown_handle(sampler))?;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.name()),
            layout,
            entries: &entries,
        }))
    }

    fn draw_mesh(&self, geometry: &Geometry) -> RenderResult<(&GpuMesh, u32)> {
        match geometry {
            Geometry::Mesh { id, index_count } => self
                .meshes
                .get(id)
                .map(|mesh| (&mesh.gpu, *index_count))
                .ok_or_else(|| RenderError::unknown_handle(id)),
            Geometry::Patches(key) => self
                .patches
                .get(key)
                .map(|mesh| (mesh, mesh.index_count))
                .ok_or_else(|| RenderError::unknown_handle(key.mesh)),
        }
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &RecordedPass,
        arena: &wgpu::Buffer,
        surface_view: &wgpu::TextureView,
    ) -> RenderResult<()> {
        let bind_groups = pass
            .draws
            .iter()
            .map(|draw| self.bind_group(draw, arena))
            .collect::<RenderResult<Vec<_>>>()?;

        let (color_view, depth_view) = match pass.target {
            RenderTargetBinding::BackBuffer => (Some(surface_view), &self.depth_texture.view),
            RenderTargetBinding::Offscreen(id) => {
                let target = self
                    .targets
                    .get(&id)
                    .ok_or_else(|| RenderError::unknown_handle(id))?;
                (Some(&target.color.view), &target.depth.view)
            }
            RenderTargetBinding::DepthLayer { array, layer } => {
                let view = self
                    .depth_arrays
                    .get(&array)
                    .and_then(|a| a.layers.get(layer as usize))
                    .ok_or_else(|| RenderError::unknown_handle(pass.target))?;
                (None, view)
            }
        };

        let color_load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = match pass.clear {
            Some(_) => wgpu::LoadOp::Clear(1.0),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<_> = color_view
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .into_iter()
            .collect();

        let label = format!("{:?}", pass.target);
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (draw, bind_group) in pass.draws.iter().zip(&bind_groups) {
            let pipeline = self
                .pipelines
                .pipeline(&draw.pipeline)
                .ok_or_else(|| RenderError::creation(draw.pipeline.program.name(), "pipeline missing"))?;
            let (mesh, index_count) = self.draw_mesh(&draw.geometry)?;
            if index_count == 0 {
                continue;
            }
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..index_count, 0, 0..1);
        }
        Ok(())
    }
}

impl TextureLibrary for GpuDevice {
    fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.texture_names.get(name).copied()
    }
}

impl GraphicsDevice for GpuDevice {
    fn create_constant_buffer(&mut self, label: &str, size: usize) -> RenderResult<BufferId> {
        if size == 0 {
            return Err(RenderError::creation(label, "empty constant buffer"));
        }
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            ConstantBuffer {
                contents: vec![0; size],
                version: 0,
            },
        );
        Ok(id)
    }

    fn upload_constant_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> RenderResult<()> {
        let record = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::unknown_handle(buffer))?;
        if bytes.len() > record.contents.len() {
            return Err(RenderError::creation(
                format!("{buffer:?} upload"),
                format!("{} bytes into a {}-byte buffer", bytes.len(), record.contents.len()),
            ));
        }
        record.contents[..bytes.len()].copy_from_slice(bytes);
        record.version += 1;
        Ok(())
    }

    fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: BufferId) {
        self.bindings.bind_buffer(stage, slot, buffer);
    }

    fn create_sampler(&mut self, label: &str, desc: SamplerDesc) -> RenderResult<SamplerId> {
        let address = match desc.address {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        };
        let filter = match desc.filter {
            FilterMode::Point => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: desc.compare.then_some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let id = SamplerId(self.allocate());
        self.samplers.insert(id, (desc, sampler));
        Ok(id)
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: SamplerId) {
        self.bindings.bind_sampler(stage, slot, sampler);
    }

    fn bind_texture(&mut self, stage: ShaderStage, slot: u32, view: TextureView) {
        self.bindings.bind_texture(stage, slot, view);
    }

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> RenderResult<TargetId> {
        if width == 0 || height == 0 {
            return Err(RenderError::creation(label, "zero-sized render target"));
        }
        let id = TargetId(self.allocate());
        self.targets
            .insert(id, ColorTarget::new(&self.device, width, height, label));
        log::debug!("Created render target '{}' {}x{}", label, width, height);
        Ok(id)
    }

    fn release_render_target(&mut self, target: TargetId) {
        self.targets.remove(&target);
    }

    fn create_depth_array(&mut self, label: &str, size: u32, layers: u32) -> RenderResult<DepthArrayId> {
        if size == 0 || layers == 0 {
            return Err(RenderError::creation(label, "empty depth array"));
        }
        let limits = self.device.limits();
        if size > limits.max_texture_dimension_2d || layers > limits.max_texture_array_layers {
            return Err(RenderError::creation(
                label,
                format!("{size}x{size}x{layers} exceeds device limits"),
            ));
        }
        let id = DepthArrayId(self.allocate());
        self.depth_arrays
            .insert(id, DepthArray::new(&self.device, size, layers, label));
        log::info!("Created depth array '{}' ({} layers of {}x{})", label, layers, size, size);
        Ok(id)
    }

    fn create_mesh(&mut self, label: &str, data: &MeshData) -> RenderResult<MeshHandle> {
        if data.indices.is_empty() {
            return Err(RenderError::creation(label, "mesh has no indices"));
        }
        let handle = MeshHandle {
            id: MeshId(self.allocate()),
            index_count: data.indices.len() as u32,
            topology: data.topology,
        };
        let mesh = UploadedMesh {
            gpu: GpuMesh::new(&self.device, label, &data.vertices, &data.indices),
            patches: (data.topology == Topology::PatchList4).then(|| data.clone()),
        };
        self.meshes.insert(handle.id, mesh);
        Ok(handle)
    }

    fn set_render_target(&mut self, target: RenderTargetBinding) {
        self.target = Some(target);
    }

    fn clear_render_target(&mut self, color: [f32; 4]) {
        let Some(target) = self.target else {
            return;
        };
        let passes = &mut self.frame.passes;
        match passes.last_mut() {
            Some(pass) if pass.target == target && pass.draws.is_empty() => pass.clear = Some(color),
            _ => passes.push(RecordedPass {
                target,
                clear: Some(color),
                draws: Vec::new(),
            }),
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_raster_state(&mut self, state: RasterState) {
        if state.fill == FillMode::Wireframe && !self.pipelines.supports_wireframe() && !self.wireframe_warned {
            log::warn!("Adapter lacks POLYGON_MODE_LINE; wireframe falls back to solid fill");
            self.wireframe_warned = true;
        }
        self.raster = state;
    }

    fn raster_state(&self) -> RasterState {
        self.raster
    }

    fn set_program(&mut self, program: ProgramKind) {
        self.program = Some(program);
        self.bindings.clear();
    }

    fn bind_mesh(&mut self, mesh: &MeshHandle) {
        self.mesh = Some(mesh.id);
    }

    fn draw_indexed(&mut self, index_count: u32) -> RenderResult<()> {
        let program = self.program.ok_or(RenderError::NoProgram)?;
        let target = self.target.ok_or(RenderError::NoRenderTarget)?;
        let mesh_id = self.mesh.ok_or_else(|| RenderError::unknown_handle("no mesh bound"))?;
        let format = self.target_format(target)?;
        let resolved = self.bindings.resolve(program, target)?;

        let mut uniforms = Vec::new();
        let mut textures = Vec::new();
        let mut samplers = Vec::new();
        for (entry, bound) in &resolved {
            let binding = binding_index(entry);
            match *bound {
                Bound::Buffer(buffer) => {
                    let (offset, size) = self.snapshot(buffer)?;
                    uniforms.push(UniformSnapshot { binding, offset, size });
                }
                Bound::Texture(view) => {
                    self.texture_view(view)?;
                    textures.push((binding, view));
                }
                Bound::Sampler(sampler) => {
                    let (desc, _) = self
                        .samplers
                        .get(&sampler)
                        .ok_or_else(|| RenderError::unknown_handle(sampler))?;
                    if desc.compare != (entry.kind == ResourceKind::ComparisonSampler) {
                        return Err(RenderError::UnboundSlot {
                            program: program.name().to_string(),
                            stage: entry.stage,
                            slot: entry.slot,
                        });
                    }
                    samplers.push((binding, sampler));
                }
            }
        }

        let geometry = self.geometry(program, mesh_id, index_count, &resolved)?;
        let pipeline = PipelineKey {
            program,
            format,
            raster: self.raster,
            depth_test: self.depth_test,
        };
        self.pipelines.ensure(&self.device, pipeline);
        self.pass_for(target).draws.push(RecordedDraw {
            pipeline,
            geometry,
            uniforms,
            textures,
            samplers,
        });
        Ok(())
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.frame = FrameRecording::default();
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        let frame = std::mem::take(&mut self.frame);
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.surface.configure(&self.device, &self.config);
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let contents: &[u8] = if frame.arena.is_empty() {
            &[0; 16]
        } else {
            &frame.arena
        };
        let arena = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Arena"),
            contents,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        for pass in &frame.passes {
            self.encode_pass(&mut encoder, pass, &arena, &surface_view)?;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.patches.end_frame();
        Ok(())
    }

    fn discard_frame(&mut self) {
        let dropped = std::mem::take(&mut self.frame);
        log::debug!("Discarded frame with {} recorded passes", dropped.passes.len());
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
