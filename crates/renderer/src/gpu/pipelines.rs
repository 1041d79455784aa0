//! Bind group layouts, shader modules and render pipelines per program.
//!
//! Every program uses a single bind group. A signature entry at (stage, slot)
//! lands on binding `class base + stage index * 8 + slot`, which is the
//! numbering the WGSL sources use.

use super::texture::Texture;
use crate::device::{CullMode, FillMode, RasterState, SLOTS_PER_STAGE};
use crate::pipeline::{ProgramKind, ResourceKind, ResourceSlot};
use crate::vertex::{BladeVertex, Vertex};
use std::collections::HashMap;

const UNIFORM_BASE: u32 = 0;
const TEXTURE_BASE: u32 = 40;
const SAMPLER_BASE: u32 = 80;

const COMMON: &str = include_str!("../shaders/common.wgsl");
const DEFORM: &str = include_str!("../shaders/deform.wgsl");
const LIGHTING: &str = include_str!("../shaders/lighting.wgsl");
const SCREEN: &str = include_str!("../shaders/screen.wgsl");
const TEXTURE: &str = include_str!("../shaders/texture.wgsl");
const DEPTH: &str = include_str!("../shaders/depth.wgsl");
const DEFORM_DEPTH: &str = include_str!("../shaders/deform_depth.wgsl");
const LIT: &str = include_str!("../shaders/lit.wgsl");
const DEFORM_LIT: &str = include_str!("../shaders/deform_lit.wgsl");
const SURFACE_DETAIL: &str = include_str!("../shaders/surface_detail.wgsl");
const BLUR: &str = include_str!("../shaders/blur.wgsl");
const THRESHOLD: &str = include_str!("../shaders/threshold.wgsl");
const MERGE: &str = include_str!("../shaders/merge.wgsl");
const TONE_MAP: &str = include_str!("../shaders/tonemap.wgsl");
const DEPTH_PREVIEW: &str = include_str!("../shaders/depth_preview.wgsl");

/// Binding number of a signature entry.
pub fn binding_index(entry: &ResourceSlot) -> u32 {
    let base = match entry.kind {
        ResourceKind::Uniform => UNIFORM_BASE,
        ResourceKind::Texture | ResourceKind::DepthArray => TEXTURE_BASE,
        ResourceKind::Sampler | ResourceKind::ComparisonSampler => SAMPLER_BASE,
    };
    base + entry.stage.index() * SLOTS_PER_STAGE + entry.slot
}

/// WGSL sources concatenated into one module for `kind`.
fn shader_parts(kind: ProgramKind) -> &'static [&'static str] {
    match kind {
        ProgramKind::Texture => &[COMMON, SCREEN, TEXTURE],
        ProgramKind::Depth => &[COMMON, DEPTH],
        ProgramKind::DeformDepth => &[COMMON, DEFORM, DEFORM_DEPTH],
        ProgramKind::Shadow => &[COMMON, LIGHTING, LIT],
        ProgramKind::Deform => &[COMMON, DEFORM, LIGHTING, DEFORM_LIT],
        ProgramKind::SurfaceDetail => &[COMMON, DEFORM, LIGHTING, SURFACE_DETAIL],
        ProgramKind::Blur(_) => &[COMMON, SCREEN, BLUR],
        ProgramKind::Threshold => &[COMMON, SCREEN, THRESHOLD],
        ProgramKind::Merge => &[COMMON, SCREEN, MERGE],
        ProgramKind::ToneMap => &[COMMON, SCREEN, TONE_MAP],
        ProgramKind::DepthPreview => &[COMMON, SCREEN, DEPTH_PREVIEW],
    }
}

fn layout_entry(entry: &ResourceSlot) -> wgpu::BindGroupLayoutEntry {
    let ty = match entry.kind {
        ResourceKind::Uniform => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        ResourceKind::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        ResourceKind::DepthArray => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2Array,
            multisampled: false,
        },
        ResourceKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        ResourceKind::ComparisonSampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
    };
    wgpu::BindGroupLayoutEntry {
        binding: binding_index(entry),
        // Emulated hull, domain and geometry stages all run in the vertex stage.
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty,
        count: None,
    }
}

/// What a pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Color(wgpu::TextureFormat),
    DepthOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: ProgramKind,
    pub format: TargetFormat,
    pub raster: RasterState,
    pub depth_test: bool,
}

struct ProgramResources {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
}

/// Layouts and shaders built up front; pipelines built on first use.
pub struct PipelineCache {
    programs: HashMap<ProgramKind, ProgramResources>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    wireframe: bool,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device, wireframe: bool) -> Self {
        let programs = ProgramKind::ALL
            .into_iter()
            .map(|kind| {
                let entries: Vec<_> = kind.signature().iter().map(layout_entry).collect();
                let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(kind.name()),
                    entries: &entries,
                });
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(kind.name()),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kind.name()),
                    source: wgpu::ShaderSource::Wgsl(shader_parts(kind).concat().into()),
                });
                (
                    kind,
                    ProgramResources {
                        bind_group_layout,
                        pipeline_layout,
                        shader,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        log::info!("Compiled {} shader programs", programs.len());
        Self {
            programs,
            pipelines: HashMap::new(),
            wireframe,
        }
    }

    /// Whether wireframe fill is available on this adapter.
    pub fn supports_wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn bind_group_layout(&self, program: ProgramKind) -> Option<&wgpu::BindGroupLayout> {
        self.programs.get(&program).map(|p| &p.bind_group_layout)
    }

    pub fn pipeline(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Builds the pipeline for `key` unless it already exists.
    pub fn ensure(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(resources) = self.programs.get(&key.program) else {
            return;
        };
        log::debug!("Creating pipeline {:?}", key);
        let pipeline = create_pipeline(device, resources, key, self.wireframe);
        self.pipelines.insert(key, pipeline);
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    resources: &ProgramResources,
    key: PipelineKey,
    wireframe: bool,
) -> wgpu::RenderPipeline {
    let vertex_layout = if key.program == ProgramKind::SurfaceDetail {
        BladeVertex::layout()
    } else {
        Vertex::layout()
    };
    let color_targets = match key.format {
        TargetFormat::Color(format) => vec![Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })],
        TargetFormat::DepthOnly => Vec::new(),
    };
    let fragment = (!key.program.is_depth_only()).then(|| wgpu::FragmentState {
        module: &resources.shader,
        entry_point: Some("fs_main"),
        targets: &color_targets,
        compilation_options: Default::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(key.program.name()),
        layout: Some(&resources.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &resources.shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_layout],
            compilation_options: Default::default(),
        },
        fragment,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: match key.raster.cull {
                CullMode::Back => Some(wgpu::Face::Back),
                CullMode::None => None,
            },
            polygon_mode: match key.raster.fill {
                FillMode::Wireframe if wireframe => wgpu::PolygonMode::Line,
                _ => wgpu::PolygonMode::Fill,
            },
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: key.depth_test,
            depth_compare: if key.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ShaderStage;
    use std::collections::HashSet;

    /// Distinct signature entries never share a binding number.
    #[test]
    fn binding_numbers_are_unique_per_program() {
        for kind in ProgramKind::ALL {
            let mut seen = HashSet::new();
            for entry in kind.signature() {
                assert!(seen.insert(binding_index(entry)), "{kind:?} {entry:?}");
            }
        }
    }

    /// Numbers the WGSL sources hard-code.
    #[test]
    fn binding_numbers_match_shaders() {
        let slot = |stage, slot, kind| ResourceSlot { stage, slot, kind };
        assert_eq!(binding_index(&slot(ShaderStage::Vertex, 0, ResourceKind::Uniform)), 0);
        assert_eq!(binding_index(&slot(ShaderStage::Domain, 1, ResourceKind::Uniform)), 17);
        assert_eq!(binding_index(&slot(ShaderStage::Geometry, 1, ResourceKind::Uniform)), 25);
        assert_eq!(binding_index(&slot(ShaderStage::Pixel, 0, ResourceKind::Uniform)), 32);
        assert_eq!(binding_index(&slot(ShaderStage::Domain, 0, ResourceKind::Texture)), 56);
        assert_eq!(binding_index(&slot(ShaderStage::Pixel, 1, ResourceKind::DepthArray)), 73);
        assert_eq!(binding_index(&slot(ShaderStage::Pixel, 1, ResourceKind::ComparisonSampler)), 113);
    }

    /// Every program's shader source declares the entry points its pipeline uses.
    #[test]
    fn shader_sources_have_entry_points() {
        for kind in ProgramKind::ALL {
            let source = shader_parts(kind).concat();
            assert!(source.contains("fn vs_main"), "{kind:?}");
            assert_eq!(source.contains("fn fs_main"), !kind.is_depth_only(), "{kind:?}");
        }
    }
}
