//! The seam between the render core and a graphics device.
//!
//! The core drives the device through a small immediate-mode vocabulary: bind
//! constant buffers, textures and samplers to a (stage, slot), choose a target
//! and a program, then issue indexed draws. Implementations are the wgpu
//! backend in [`crate::gpu`] and the command log in [`crate::recording`].

use crate::error::RenderResult;
use crate::mesh::MeshData;
use crate::pipeline::ProgramKind;

/// Pipeline stage a resource is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
}

/// Number of binding slots per stage and resource class.
pub const SLOTS_PER_STAGE: u32 = 8;

impl ShaderStage {
    pub const ALL: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
    ];

    pub fn index(self) -> u32 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Hull => 1,
            ShaderStage::Domain => 2,
            ShaderStage::Geometry => 3,
            ShaderStage::Pixel => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub u32);

/// Offscreen colour target (with its own depth buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// Layered depth-only target; each layer is one shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthArrayId(pub u32);

/// Texture owned by the texture library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// How a mesh's index buffer is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
    /// Quad patches of 4 control points, consumed by the tessellation stages.
    PatchList4,
}

/// An uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHandle {
    pub id: MeshId,
    pub index_count: u32,
    pub topology: Topology,
}

/// Something a shader can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureView {
    Texture(TextureHandle),
    /// Colour attachment of an offscreen target.
    Target(TargetId),
    /// One layer of a depth array, for previews.
    DepthLayer { array: DepthArrayId, layer: u32 },
    /// Every layer of a depth array, indexed in the shader.
    DepthArray(DepthArrayId),
}

/// Where the next draws write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetBinding {
    BackBuffer,
    Offscreen(TargetId),
    DepthLayer { array: DepthArrayId, layer: u32 },
}

impl RenderTargetBinding {
    /// True when reading `view` would alias this write destination.
    pub fn aliases(&self, view: &TextureView) -> bool {
        match (*self, *view) {
            (RenderTargetBinding::Offscreen(target), TextureView::Target(read)) => target == read,
            (
                RenderTargetBinding::DepthLayer { array, layer },
                TextureView::DepthLayer {
                    array: read,
                    layer: read_layer,
                },
            ) => array == read && layer == read_layer,
            (RenderTargetBinding::DepthLayer { array, .. }, TextureView::DepthArray(read)) => array == read,
            _ => false,
        }
    }

    pub fn is_depth_only(&self) -> bool {
        matches!(self, RenderTargetBinding::DepthLayer { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    Wireframe,
}

/// Rasterizer state shared by every draw until changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull: CullMode,
    pub fill: FillMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl RasterState {
    pub const DEFAULT: Self = Self {
        cull: CullMode::Back,
        fill: FillMode::Solid,
    };

    /// Solid or wireframe fill with back-face culling.
    pub fn with_wireframe(wireframe: bool) -> Self {
        Self {
            cull: CullMode::Back,
            fill: if wireframe { FillMode::Wireframe } else { FillMode::Solid },
        }
    }

    /// Same fill, culling disabled.
    pub fn double_sided(self) -> Self {
        Self {
            cull: CullMode::None,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address: AddressMode,
    /// Depth comparison (`reference <= stored` passes).
    pub compare: bool,
}

/// Primitive operations the render core needs from a device.
///
/// Bindings persist until overwritten, except that selecting a program resets
/// the bound inputs; every draw must therefore bind its full signature after
/// `set_program`.
pub trait GraphicsDevice {
    fn create_constant_buffer(&mut self, label: &str, size: usize) -> RenderResult<BufferId>;
    /// Replace the buffer contents (map, copy, unmap).
    fn upload_constant_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> RenderResult<()>;
    fn bind_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: BufferId);

    fn create_sampler(&mut self, label: &str, desc: SamplerDesc) -> RenderResult<SamplerId>;
    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: SamplerId);
    fn bind_texture(&mut self, stage: ShaderStage, slot: u32, view: TextureView);

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> RenderResult<TargetId>;
    fn release_render_target(&mut self, target: TargetId);
    fn create_depth_array(&mut self, label: &str, size: u32, layers: u32) -> RenderResult<DepthArrayId>;
    fn create_mesh(&mut self, label: &str, data: &MeshData) -> RenderResult<MeshHandle>;

    fn set_render_target(&mut self, target: RenderTargetBinding);
    /// Clear colour and depth of the current target (depth-only targets clear depth to 1).
    fn clear_render_target(&mut self, color: [f32; 4]);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_raster_state(&mut self, state: RasterState);
    fn raster_state(&self) -> RasterState;

    fn set_program(&mut self, program: ProgramKind);
    fn bind_mesh(&mut self, mesh: &MeshHandle);
    fn draw_indexed(&mut self, index_count: u32) -> RenderResult<()>;

    fn begin_frame(&mut self) -> RenderResult<()>;
    fn present(&mut self) -> RenderResult<()>;
    /// Drop everything recorded since `begin_frame` without presenting.
    fn discard_frame(&mut self);
    fn back_buffer_size(&self) -> (u32, u32);
}

/// Run `f` with `state` as the raster state, then put the previous state back.
///
/// The previous state is restored whether or not `f` succeeds.
pub fn with_raster_state<T>(
    device: &mut dyn GraphicsDevice,
    state: RasterState,
    f: impl FnOnce(&mut dyn GraphicsDevice) -> RenderResult<T>,
) -> RenderResult<T> {
    let previous = device.raster_state();
    device.set_raster_state(state);
    let result = f(device);
    device.set_raster_state(previous);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writing a shadow layer conflicts with reading the whole array or that layer,
    /// but not with a different layer.
    #[test]
    fn depth_layer_aliasing() {
        let array = DepthArrayId(0);
        let target = RenderTargetBinding::DepthLayer { array, layer: 3 };
        assert!(target.aliases(&TextureView::DepthArray(array)));
        assert!(target.aliases(&TextureView::DepthLayer { array, layer: 3 }));
        assert!(!target.aliases(&TextureView::DepthLayer { array, layer: 4 }));
        assert!(!RenderTargetBinding::BackBuffer.aliases(&TextureView::DepthArray(array)));
    }

    /// Offscreen targets alias only their own colour view.
    #[test]
    fn offscreen_aliasing() {
        let target = RenderTargetBinding::Offscreen(TargetId(7));
        assert!(target.aliases(&TextureView::Target(TargetId(7))));
        assert!(!target.aliases(&TextureView::Target(TargetId(8))));
        assert!(!target.aliases(&TextureView::Texture(TextureHandle(7))));
    }

    #[test]
    fn double_sided_keeps_fill() {
        let state = RasterState::with_wireframe(true).double_sided();
        assert_eq!(state.cull, CullMode::None);
        assert_eq!(state.fill, FillMode::Wireframe);
    }
}
