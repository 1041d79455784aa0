//! Error type shared by the render core and its device backends.

use crate::device::ShaderStage;

/// Everything that can go wrong between resource creation and present.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// A buffer, sampler, target, mesh or texture could not be created.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: String, reason: String },

    /// The device stopped accepting work.
    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// A named texture was not provided by the texture library.
    #[error("texture '{0}' is not loaded")]
    MissingTexture(String),

    /// A target was bound for reading while it is the current write destination.
    #[error("render target {target} is bound for reading and writing at once")]
    ResourceHazard { target: String },

    /// A draw was issued before the selected program's inputs were bound.
    #[error("{program} draw with nothing bound at {stage:?} slot {slot}")]
    UnboundSlot {
        program: String,
        stage: ShaderStage,
        slot: u32,
    },

    /// A handle that this device never issued (or already released).
    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("draw issued with no shader program selected")]
    NoProgram,

    #[error("draw issued with no render target set")]
    NoRenderTarget,
}

impl RenderError {
    pub fn creation(what: impl ToString, reason: impl ToString) -> Self {
        RenderError::ResourceCreation {
            what: what.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn device_lost(msg: impl ToString) -> Self {
        RenderError::DeviceLost(msg.to_string())
    }

    pub fn unknown_handle(what: impl std::fmt::Debug) -> Self {
        RenderError::UnknownHandle(format!("{what:?}"))
    }
}

/// Result alias used across the renderer.
pub type RenderResult<T> = Result<T, RenderError>;
