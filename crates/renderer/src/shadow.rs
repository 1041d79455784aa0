//! Shadow-map storage and the depth pass engine.

use crate::deform::SurfaceState;
use crate::device::{DepthArrayId, GraphicsDevice, MeshHandle, RenderTargetBinding, TextureView};
use crate::error::RenderResult;
use crate::light::shadow_slot;
use crate::lighting::LightingState;
use crate::pipeline::{Program, ProgramBinder};
use crate::uniforms::{TransformUniform, LIGHT_SLOTS, SHADOW_SLOTS};
use glam::Mat4;

pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

/// The 24 shadow maps (4 lights x 6 faces) as one layered depth target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapSet {
    array: DepthArrayId,
    size: u32,
}

impl ShadowMapSet {
    pub fn new(device: &mut dyn GraphicsDevice, size: u32) -> RenderResult<Self> {
        let size = size.max(1);
        let array = device.create_depth_array("Shadow Maps", size, SHADOW_SLOTS as u32)?;
        log::info!("Created {SHADOW_SLOTS} shadow maps at {size}x{size}");
        Ok(Self { array, size })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn array(&self) -> DepthArrayId {
        self.array
    }

    /// Every map, for the lit passes.
    pub fn view(&self) -> TextureView {
        TextureView::DepthArray(self.array)
    }

    /// Write destination for one slot.
    pub fn target(&self, slot: usize) -> RenderTargetBinding {
        RenderTargetBinding::DepthLayer {
            array: self.array,
            layer: slot as u32,
        }
    }
}

/// One object in the depth-only draw list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCaster {
    pub mesh: MeshHandle,
    pub world: Mat4,
    /// Drawn through the deformation stage.
    pub deformed: bool,
}

/// What one frame's shadow stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowReport {
    /// One pass per rendered face.
    pub passes: u32,
    pub draws: u32,
    /// Slots written, in order.
    pub slots: Vec<usize>,
}

/// Renders the depth-only object list into each enabled light's faces.
#[derive(Debug, Default)]
pub struct ShadowPassEngine;

impl ShadowPassEngine {
    pub fn new() -> Self {
        Self
    }

    /// Point lights render all six faces, other kinds face 0 only. Disabled
    /// lights are skipped and their slots keep stale contents.
    pub fn render(
        &self,
        device: &mut dyn GraphicsDevice,
        binder: &ProgramBinder,
        maps: &ShadowMapSet,
        lighting: &LightingState,
        casters: &[ShadowCaster],
        surface: &SurfaceState,
    ) -> RenderResult<ShadowReport> {
        let mut report = ShadowReport::default();
        device.set_depth_test(true);

        for light in 0..LIGHT_SLOTS {
            let projection = lighting.projection(light);
            for face in 0..lighting.shadow_faces(light) {
                let slot = shadow_slot(light, face);
                let view = lighting.view(light, face);
                device.set_render_target(maps.target(slot));
                device.clear_render_target([0.0, 0.0, 0.0, 1.0]);

                for caster in casters {
                    let transforms = TransformUniform::new(caster.world, view, projection);
                    let program = if caster.deformed {
                        Program::DeformDepth {
                            transforms: &transforms,
                            surface,
                        }
                    } else {
                        Program::Depth {
                            transforms: &transforms,
                        }
                    };
                    binder.draw(device, &caster.mesh, &program)?;
                    report.draws += 1;
                }
                report.passes += 1;
                report.slots.push(slot);
            }
        }

        log::trace!("Shadow stage: {} passes, {} draws", report.passes, report.draws);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DeviceCommand, RecordingDevice};

    /// One layer per slot, at the requested size.
    #[test]
    fn map_set_allocates_every_slot() {
        let mut device = RecordingDevice::default();
        let maps = ShadowMapSet::new(&mut device, 1024).unwrap();
        assert_eq!(maps.size(), 1024);
        assert!(device.commands().contains(&DeviceCommand::CreateDepthArray {
            id: maps.array(),
            size: 1024,
            layers: SHADOW_SLOTS as u32,
        }));
        assert_eq!(
            maps.target(SHADOW_SLOTS - 1),
            RenderTargetBinding::DepthLayer {
                array: maps.array(),
                layer: SHADOW_SLOTS as u32 - 1,
            }
        );
    }

    #[test]
    fn zero_size_is_raised_to_one() {
        let mut device = RecordingDevice::default();
        let maps = ShadowMapSet::new(&mut device, 0).unwrap();
        assert_eq!(maps.size(), 1);
    }
}
