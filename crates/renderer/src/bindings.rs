//! Per-program resource bindings, shared by the device implementations.

use crate::device::{BufferId, RenderTargetBinding, SamplerId, ShaderStage, TextureView};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{ProgramKind, ResourceKind, ResourceSlot};
use std::collections::HashMap;

/// Slots are numbered separately per class, as in the shader register model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SlotClass {
    Uniform,
    Texture,
    Sampler,
}

impl SlotClass {
    fn of(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Uniform => SlotClass::Uniform,
            ResourceKind::Texture | ResourceKind::DepthArray => SlotClass::Texture,
            ResourceKind::Sampler | ResourceKind::ComparisonSampler => SlotClass::Sampler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Buffer(BufferId),
    Texture(TextureView),
    Sampler(SamplerId),
}

/// What is bound where since the last program change.
#[derive(Debug, Default)]
pub struct BindingTable {
    slots: HashMap<(ShaderStage, u32, SlotClass), Bound>,
}

impl BindingTable {
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn bind_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: BufferId) {
        self.slots.insert((stage, slot, SlotClass::Uniform), Bound::Buffer(buffer));
    }

    pub fn bind_texture(&mut self, stage: ShaderStage, slot: u32, view: TextureView) {
        self.slots.insert((stage, slot, SlotClass::Texture), Bound::Texture(view));
    }

    pub fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: SamplerId) {
        self.slots.insert((stage, slot, SlotClass::Sampler), Bound::Sampler(sampler));
    }

    /// Pairs every signature entry of `program` with what is bound there.
    ///
    /// Fails when an entry is unbound or bound to the wrong kind of view, and
    /// when any bound view aliases `target`.
    pub fn resolve(
        &self,
        program: ProgramKind,
        target: RenderTargetBinding,
    ) -> RenderResult<Vec<(ResourceSlot, Bound)>> {
        let signature = program.signature();
        let mut resolved = Vec::with_capacity(signature.len());
        for entry in signature {
            let bound = self
                .slots
                .get(&(entry.stage, entry.slot, SlotClass::of(entry.kind)))
                .copied();
            let fits = match bound {
                Some(Bound::Buffer(_)) => entry.kind == ResourceKind::Uniform,
                Some(Bound::Texture(view)) => entry.kind.accepts(&view),
                Some(Bound::Sampler(_)) => entry.kind.is_sampler(),
                None => false,
            };
            match bound {
                Some(bound) if fits => resolved.push((*entry, bound)),
                _ => {
                    return Err(RenderError::UnboundSlot {
                        program: program.name().to_string(),
                        stage: entry.stage,
                        slot: entry.slot,
                    })
                }
            }
        }

        let hazard = self.slots.values().any(|bound| match bound {
            Bound::Texture(view) => target.aliases(view),
            _ => false,
        });
        if hazard {
            return Err(RenderError::ResourceHazard {
                target: format!("{target:?}"),
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DepthArrayId, TargetId};

    /// A texture bound where a depth array is declared does not count as bound.
    #[test]
    fn wrong_view_kind_is_unbound() {
        let mut table = BindingTable::default();
        table.bind_buffer(ShaderStage::Vertex, 0, BufferId(1));
        table.bind_buffer(ShaderStage::Pixel, 0, BufferId(2));
        table.bind_texture(ShaderStage::Pixel, 1, TextureView::Target(TargetId(3)));
        let err = table
            .resolve(ProgramKind::DepthPreview, RenderTargetBinding::BackBuffer)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnboundSlot {
                stage: ShaderStage::Pixel,
                slot: 1,
                ..
            }
        ));
    }

    /// Resolution follows signature order.
    #[test]
    fn resolves_in_signature_order() {
        let array = DepthArrayId(9);
        let mut table = BindingTable::default();
        table.bind_texture(ShaderStage::Pixel, 1, TextureView::DepthArray(array));
        table.bind_buffer(ShaderStage::Pixel, 0, BufferId(2));
        table.bind_buffer(ShaderStage::Vertex, 0, BufferId(1));
        let resolved = table
            .resolve(ProgramKind::DepthPreview, RenderTargetBinding::BackBuffer)
            .unwrap();
        let kinds: Vec<_> = resolved.iter().map(|(slot, _)| slot.kind).collect();
        assert_eq!(
            kinds,
            [ResourceKind::Uniform, ResourceKind::Uniform, ResourceKind::DepthArray]
        );
        assert!(matches!(
            table.resolve(
                ProgramKind::DepthPreview,
                RenderTargetBinding::DepthLayer { array, layer: 0 }
            ),
            Err(RenderError::ResourceHazard { .. })
        ));
    }
}
