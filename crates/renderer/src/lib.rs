//! Multi-pass real-time renderer for Morphlight.
//!
//! A frame renders shadow maps for up to four lights, composes the lit scene
//! (including the deforming plane and its surface detail), optionally runs the
//! bloom and tone-mapping chain, and presents. The passes talk to the GPU only
//! through [`GraphicsDevice`]; [`GpuDevice`] drives wgpu, [`RecordingDevice`]
//! logs commands for tests and headless runs.

mod bindings;
pub mod camera;
pub mod config;
pub mod deform;
pub mod device;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod light;
pub mod lighting;
pub mod mesh;
pub mod pipeline;
pub mod post;
pub mod recording;
pub mod render_target;
pub mod scene;
pub mod shading;
pub mod shadow;
pub mod surface_detail;
pub mod tessellation;
pub mod uniforms;
pub mod vertex;

pub use camera::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use frame::{FrameRenderer, FrameReport};
pub use gpu::GpuDevice;
pub use light::{default_lights, Light, LightKind};
pub use mesh::*;
pub use recording::*;
pub use scene::{TextureLibrary, REQUIRED_TEXTURES};
pub use vertex::*;
