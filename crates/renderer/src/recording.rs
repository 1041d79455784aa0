//! A [`GraphicsDevice`] that records commands instead of talking to a GPU.
//!
//! It enforces the same rules a real device would fail on: every slot of the
//! selected program must be bound, and nothing bound for reading may alias
//! the current write target. Tests and headless runs inspect the log.

use crate::bindings::{BindingTable, Bound};
use crate::device::{
    BufferId, DepthArrayId, GraphicsDevice, MeshHandle, MeshId, RasterState, RenderTargetBinding, SamplerDesc,
    SamplerId, ShaderStage, TargetId, TextureHandle, TextureView,
};
use crate::error::{RenderError, RenderResult};
use crate::mesh::MeshData;
use crate::pipeline::{ProgramKind, ResourceKind};
use crate::scene::TextureLibrary;
use std::collections::HashMap;

/// One recorded draw with the state it ran under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub program: ProgramKind,
    pub target: RenderTargetBinding,
    pub mesh: MeshId,
    pub index_count: u32,
    pub raster: RasterState,
    pub depth_test: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer { id: BufferId, size: usize },
    Upload { buffer: BufferId, bytes: Vec<u8> },
    BindBuffer { stage: ShaderStage, slot: u32, buffer: BufferId },
    CreateSampler { id: SamplerId, desc: SamplerDesc },
    BindSampler { stage: ShaderStage, slot: u32, sampler: SamplerId },
    BindTexture { stage: ShaderStage, slot: u32, view: TextureView },
    CreateTarget { id: TargetId, width: u32, height: u32 },
    ReleaseTarget(TargetId),
    CreateDepthArray { id: DepthArrayId, size: u32, layers: u32 },
    CreateMesh { handle: MeshHandle },
    SetRenderTarget(RenderTargetBinding),
    Clear { target: RenderTargetBinding, color: [f32; 4] },
    SetDepthTest(bool),
    SetRasterState(RasterState),
    SetProgram(ProgramKind),
    BindMesh(MeshId),
    Draw(DrawRecord),
    BeginFrame,
    Present,
    DiscardFrame,
}

/// Draws between two clears of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub target: RenderTargetBinding,
    pub draws: Vec<DrawRecord>,
}

#[derive(Debug, Clone)]
struct BufferRecord {
    size: usize,
    contents: Vec<u8>,
}

/// Command-log device.
#[derive(Debug)]
pub struct RecordingDevice {
    log: Vec<DeviceCommand>,
    buffers: HashMap<BufferId, BufferRecord>,
    samplers: HashMap<SamplerId, SamplerDesc>,
    targets: HashMap<TargetId, (u32, u32)>,
    depth_arrays: HashMap<DepthArrayId, u32>,
    meshes: HashMap<MeshId, MeshHandle>,
    textures: HashMap<String, TextureHandle>,
    bindings: BindingTable,
    next_id: u32,
    program: Option<ProgramKind>,
    target: Option<RenderTargetBinding>,
    mesh: Option<MeshId>,
    raster: RasterState,
    depth_test: bool,
    back_buffer: (u32, u32),
    in_frame: bool,
    draw_count: usize,
    fail_after: Option<usize>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            log: Vec::new(),
            buffers: HashMap::new(),
            samplers: HashMap::new(),
            targets: HashMap::new(),
            depth_arrays: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            bindings: BindingTable::default(),
            next_id: 0,
            program: None,
            target: None,
            mesh: None,
            raster: RasterState::DEFAULT,
            depth_test: true,
            back_buffer: (width.max(1), height.max(1)),
            in_frame: false,
            draw_count: 0,
            fail_after: None,
        }
    }

    /// A device with every given texture name registered.
    pub fn with_textures<'a>(width: u32, height: u32, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut device = Self::new(width, height);
        for name in names {
            device.register_texture(name);
        }
        device
    }

    pub fn register_texture(&mut self, name: &str) -> TextureHandle {
        if let Some(handle) = self.textures.get(name) {
            return *handle;
        }
        let handle = TextureHandle(self.allocate());
        self.textures.insert(name.to_string(), handle);
        handle
    }

    /// Registered names, detached from the device so both can be borrowed at once.
    pub fn texture_library(&self) -> HashMap<String, TextureHandle> {
        self.textures.clone()
    }

    pub fn set_back_buffer_size(&mut self, width: u32, height: u32) {
        self.back_buffer = (width.max(1), height.max(1));
    }

    /// Make every draw after the next `draws` fail as if the device was lost.
    pub fn fail_after_draws(&mut self, draws: usize) {
        self.fail_after = Some(self.draw_count + draws);
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Last bytes uploaded to `buffer`.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.contents.as_slice())
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> + '_ {
        self.log.iter().filter_map(|c| match c {
            DeviceCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Commands since the most recent `begin_frame`.
    pub fn last_frame(&self) -> &[DeviceCommand] {
        let start = self
            .log
            .iter()
            .rposition(|c| *c == DeviceCommand::BeginFrame)
            .unwrap_or(0);
        &self.log[start..]
    }

    /// The most recent frame split into passes, one per cleared target.
    pub fn last_frame_passes(&self) -> Vec<PassRecord> {
        let mut passes: Vec<PassRecord> = Vec::new();
        for command in self.last_frame() {
            match command {
                DeviceCommand::Clear { target, .. } => passes.push(PassRecord {
                    target: *target,
                    draws: Vec::new(),
                }),
                DeviceCommand::Draw(draw) => match passes.last_mut() {
                    Some(pass) if pass.target == draw.target => pass.draws.push(*draw),
                    _ => passes.push(PassRecord {
                        target: draw.target,
                        draws: vec![*draw],
                    }),
                },
                _ => {}
            }
        }
        passes
    }

    /// Bytes each `program` draw of the last frame saw in the uniform at
    /// `stage`/`slot`, in draw order. Unbound slots yield an empty entry.
    pub fn uniforms_seen(&self, program: ProgramKind, stage: ShaderStage, slot: u32) -> Vec<Vec<u8>> {
        let mut contents: HashMap<BufferId, &[u8]> = HashMap::new();
        let mut bound: Option<BufferId> = None;
        let mut seen = Vec::new();
        for command in self.last_frame() {
            match command {
                DeviceCommand::Upload { buffer, bytes } => {
                    contents.insert(*buffer, bytes);
                }
                DeviceCommand::SetProgram(_) => bound = None,
                DeviceCommand::BindBuffer {
                    stage: s,
                    slot: n,
                    buffer,
                } if *s == stage && *n == slot => bound = Some(*buffer),
                DeviceCommand::Draw(draw) if draw.program == program => {
                    let bytes = bound
                        .and_then(|buffer| contents.get(&buffer))
                        .map(|bytes| bytes.to_vec())
                        .unwrap_or_default();
                    seen.push(bytes);
                }
                _ => {}
            }
        }
        seen
    }

    pub fn presented_frames(&self) -> usize {
        self.count(&DeviceCommand::Present)
    }

    pub fn discarded_frames(&self) -> usize {
        self.count(&DeviceCommand::DiscardFrame)
    }

    fn count(&self, command: &DeviceCommand) -> usize {
        self.log.iter().filter(|c| *c == command).count()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_target(&self, target: RenderTargetBinding) -> RenderResult<()> {
        match target {
            RenderTargetBinding::BackBuffer => Ok(()),
            RenderTargetBinding::Offscreen(id) if self.targets.contains_key(&id) => Ok(()),
            RenderTargetBinding::DepthLayer { array, layer } => match self.depth_arrays.get(&array) {
                Some(&layers) if layer < layers => Ok(()),
                _ => Err(RenderError::unknown_handle(target)),
            },
            RenderTargetBinding::Offscreen(_) => Err(RenderError::unknown_handle(target)),
        }
    }

    fn check_view(&self, view: &TextureView) -> RenderResult<()> {
        let known = match *view {
            TextureView::Texture(handle) => self.textures.values().any(|h| *h == handle),
            TextureView::Target(id) => self.targets.contains_key(&id),
            TextureView::DepthLayer { array, layer } => {
                self.depth_arrays.get(&array).is_some_and(|&layers| layer < layers)
            }
            TextureView::DepthArray(array) => self.depth_arrays.contains_key(&array),
        };
        if known {
            Ok(())
        } else {
            Err(RenderError::unknown_handle(view))
        }
    }

    /// Every check a draw must pass.
    fn validate_draw(&self) -> RenderResult<(ProgramKind, RenderTargetBinding, MeshHandle)> {
        let program = self.program.ok_or(RenderError::NoProgram)?;
        let target = self.target.ok_or(RenderError::NoRenderTarget)?;
        self.check_target(target)?;
        let mesh_id = self.mesh.ok_or_else(|| RenderError::unknown_handle("no mesh bound"))?;
        let mesh = *self
            .meshes
            .get(&mesh_id)
            .ok_or_else(|| RenderError::unknown_handle(mesh_id))?;

        for (entry, bound) in self.bindings.resolve(program, target)? {
            match bound {
                Bound::Buffer(buffer) => {
                    if !self.buffers.contains_key(&buffer) {
                        return Err(RenderError::unknown_handle(buffer));
                    }
                }
                Bound::Texture(view) => self.check_view(&view)?,
                Bound::Sampler(sampler) => {
                    let desc = self
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
                }
            }
        }
        Ok((program, target, mesh))
    }
}

impl TextureLibrary for RecordingDevice {
    fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).copied()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_constant_buffer(&mut self, _label: &str, size: usize) -> RenderResult<BufferId> {
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            BufferRecord {
                size,
                contents: vec![0; size],
            },
        );
        self.log.push(DeviceCommand::CreateBuffer { id, size });
        Ok(id)
    }

    fn upload_constant_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> RenderResult<()> {
        let record = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::unknown_handle(buffer))?;
        if bytes.len() > record.size {
            return Err(RenderError::creation(
                format!("{buffer:?} upload"),
                format!("{} bytes into a {}-byte buffer", bytes.len(), record.size),
            ));
        }
        record.contents.clear();
        record.contents.extend_from_slice(bytes);
        self.log.push(DeviceCommand::Upload {
            buffer,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: BufferId) {
        self.bindings.bind_buffer(stage, slot, buffer);
        self.log.push(DeviceCommand::BindBuffer { stage, slot, buffer });
    }

    fn create_sampler(&mut self, _label: &str, desc: SamplerDesc) -> RenderResult<SamplerId> {
        let id = SamplerId(self.allocate());
        self.samplers.insert(id, desc);
        self.log.push(DeviceCommand::CreateSampler { id, desc });
        Ok(id)
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: SamplerId) {
        self.bindings.bind_sampler(stage, slot, sampler);
        self.log.push(DeviceCommand::BindSampler { stage, slot, sampler });
    }

    fn bind_texture(&mut self, stage: ShaderStage, slot: u32, view: TextureView) {
        self.bindings.bind_texture(stage, slot, view);
        self.log.push(DeviceCommand::BindTexture { stage, slot, view });
    }

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> RenderResult<TargetId> {
        if width == 0 || height == 0 {
            return Err(RenderError::creation(label, "zero-sized render target"));
        }
        let id = TargetId(self.allocate());
        self.targets.insert(id, (width, height));
        self.log.push(DeviceCommand::CreateTarget { id, width, height });
        Ok(id)
    }

    fn release_render_target(&mut self, target: TargetId) {
        self.targets.remove(&target);
        self.log.push(DeviceCommand::ReleaseTarget(target));
    }

    fn create_depth_array(&mut self, label: &str, size: u32, layers: u32) -> RenderResult<DepthArrayId> {
        if size == 0 || layers == 0 {
            return Err(RenderError::creation(label, "empty depth array"));
        }
        let id = DepthArrayId(self.allocate());
        self.depth_arrays.insert(id, layers);
        self.log.push(DeviceCommand::CreateDepthArray { id, size, layers });
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
        self.meshes.insert(handle.id, handle);
        self.log.push(DeviceCommand::CreateMesh { handle });
        Ok(handle)
    }

    fn set_render_target(&mut self, target: RenderTargetBinding) {
        self.target = Some(target);
        self.log.push(DeviceCommand::SetRenderTarget(target));
    }

    fn clear_render_target(&mut self, color: [f32; 4]) {
        if let Some(target) = self.target {
            self.log.push(DeviceCommand::Clear { target, color });
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
        self.log.push(DeviceCommand::SetDepthTest(enabled));
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
        self.log.push(DeviceCommand::SetRasterState(state));
    }

    fn raster_state(&self) -> RasterState {
        self.raster
    }

    fn set_program(&mut self, program: ProgramKind) {
        self.program = Some(program);
        self.bindings.clear();
        self.log.push(DeviceCommand::SetProgram(program));
    }

    fn bind_mesh(&mut self, mesh: &MeshHandle) {
        self.mesh = Some(mesh.id);
        self.log.push(DeviceCommand::BindMesh(mesh.id));
    }

    fn draw_indexed(&mut self, index_count: u32) -> RenderResult<()> {
        if self.fail_after.is_some_and(|limit| self.draw_count >= limit) {
            return Err(RenderError::device_lost("recording device failure injected"));
        }
        let (program, target, mesh) = self.validate_draw()?;
        if index_count > mesh.index_count {
            return Err(RenderError::creation(
                format!("{program:?} draw"),
                format!("{index_count} indices from a {}-index mesh", mesh.index_count),
            ));
        }
        self.draw_count += 1;
        self.log.push(DeviceCommand::Draw(DrawRecord {
            program,
            target,
            mesh: mesh.id,
            index_count,
            raster: self.raster,
            depth_test: self.depth_test,
        }));
        Ok(())
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.in_frame = true;
        self.log.push(DeviceCommand::BeginFrame);
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::device_lost("present without begin_frame"));
        }
        self.in_frame = false;
        self.log.push(DeviceCommand::Present);
        Ok(())
    }

    fn discard_frame(&mut self) {
        self.in_frame = false;
        self.log.push(DeviceCommand::DiscardFrame);
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.back_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AddressMode;
    use crate::device::FilterMode;

    fn ready_device() -> (RecordingDevice, BufferId, SamplerId, MeshHandle, TargetId) {
        let mut device = RecordingDevice::with_textures(64, 64, ["default"]);
        let buffer = device.create_constant_buffer("transforms", 192).unwrap();
        let sampler = device
            .create_sampler(
                "linear",
                SamplerDesc {
                    filter: FilterMode::Linear,
                    address: AddressMode::Wrap,
                    compare: false,
                },
            )
            .unwrap();
        let mesh = device.create_mesh("quad", &crate::render_target::unit_quad()).unwrap();
        let target = device.create_render_target("offscreen", 64, 64).unwrap();
        (device, buffer, sampler, mesh, target)
    }

    fn bind_texture_program(device: &mut RecordingDevice, buffer: BufferId, sampler: SamplerId, view: TextureView) {
        device.set_program(ProgramKind::Texture);
        device.bind_constant_buffer(ShaderStage::Vertex, 0, buffer);
        device.bind_texture(ShaderStage::Pixel, 0, view);
        device.bind_sampler(ShaderStage::Pixel, 0, sampler);
    }

    /// A fully bound draw is recorded with its state.
    #[test]
    fn records_valid_draw() {
        let (mut device, buffer, sampler, mesh, _) = ready_device();
        let texture = device.texture("default").unwrap();
        device.set_render_target(RenderTargetBinding::BackBuffer);
        bind_texture_program(&mut device, buffer, sampler, TextureView::Texture(texture));
        device.bind_mesh(&mesh);
        device.draw_indexed(mesh.index_count).unwrap();
        let draw = device.draws().next().unwrap();
        assert_eq!(draw.program, ProgramKind::Texture);
        assert_eq!(draw.target, RenderTargetBinding::BackBuffer);
    }

    /// Selecting a program drops earlier bindings.
    #[test]
    fn program_change_resets_bindings() {
        let (mut device, buffer, sampler, mesh, _) = ready_device();
        let texture = device.texture("default").unwrap();
        device.set_render_target(RenderTargetBinding::BackBuffer);
        bind_texture_program(&mut device, buffer, sampler, TextureView::Texture(texture));
        device.set_program(ProgramKind::Texture);
        device.bind_mesh(&mesh);
        assert!(matches!(
            device.draw_indexed(6),
            Err(RenderError::UnboundSlot {
                stage: ShaderStage::Vertex,
                slot: 0,
                ..
            })
        ));
    }

    /// Reading the target being written is rejected.
    #[test]
    fn rejects_read_write_hazard() {
        let (mut device, buffer, sampler, mesh, target) = ready_device();
        device.set_render_target(RenderTargetBinding::Offscreen(target));
        bind_texture_program(&mut device, buffer, sampler, TextureView::Target(target));
        device.bind_mesh(&mesh);
        assert!(matches!(device.draw_indexed(6), Err(RenderError::ResourceHazard { .. })));
    }

    #[test]
    fn draw_needs_program_and_target() {
        let (mut device, _, _, mesh, _) = ready_device();
        device.bind_mesh(&mesh);
        assert!(matches!(device.draw_indexed(6), Err(RenderError::NoProgram)));
        device.set_program(ProgramKind::Depth);
        assert!(matches!(device.draw_indexed(6), Err(RenderError::NoRenderTarget)));
    }

    /// Released targets cannot be drawn into.
    #[test]
    fn released_target_is_unknown() {
        let (mut device, buffer, _, mesh, target) = ready_device();
        device.release_render_target(target);
        device.set_render_target(RenderTargetBinding::Offscreen(target));
        device.set_program(ProgramKind::Depth);
        device.bind_constant_buffer(ShaderStage::Vertex, 0, buffer);
        device.bind_mesh(&mesh);
        assert!(matches!(device.draw_indexed(6), Err(RenderError::UnknownHandle(_))));
    }

    /// Uploads keep the latest bytes and refuse to overflow.
    #[test]
    fn uploads() {
        let (mut device, buffer, ..) = ready_device();
        device.upload_constant_buffer(buffer, &[7; 16]).unwrap();
        assert_eq!(device.buffer_contents(buffer), Some(&[7u8; 16][..]));
        assert!(device.upload_constant_buffer(buffer, &[0; 256]).is_err());
    }

    /// Each draw reports the bytes bound when it was issued, not the latest upload.
    #[test]
    fn uniforms_seen_per_draw() {
        let (mut device, buffer, sampler, mesh, _) = ready_device();
        let texture = TextureView::Texture(device.texture("default").unwrap());
        device.begin_frame().unwrap();
        device.set_render_target(RenderTargetBinding::BackBuffer);
        for value in [1u8, 2] {
            device.upload_constant_buffer(buffer, &[value; 8]).unwrap();
            bind_texture_program(&mut device, buffer, sampler, texture);
            device.bind_mesh(&mesh);
            device.draw_indexed(mesh.index_count).unwrap();
        }
        let seen = device.uniforms_seen(ProgramKind::Texture, ShaderStage::Vertex, 0);
        assert_eq!(seen, vec![vec![1u8; 8], vec![2u8; 8]]);
        assert_eq!(device.uniforms_seen(ProgramKind::Texture, ShaderStage::Pixel, 3), vec![Vec::<u8>::new(); 2]);
    }
}
