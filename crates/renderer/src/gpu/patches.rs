//! Uploaded meshes, and the tessellated plane and blade meshes derived from
//! patch meshes, cached per factor set.

use crate::device::MeshId;
use crate::mesh::MeshData;
use crate::surface_detail::blade_mesh;
use crate::tessellation::{tessellate_patches, PatchFactors};
use bytemuck::Pod;
use std::collections::{HashMap, HashSet};
use wgpu::util::DeviceExt;

/// Vertex and index buffers on the GPU.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn new<V: Pod>(device: &wgpu::Device, label: &str, vertices: &[V], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

/// Which derived mesh a patch draw uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchGeometry {
    Surface,
    Blades,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub mesh: MeshId,
    pub geometry: PatchGeometry,
    pub factors: Vec<PatchFactors>,
}

/// Derived meshes, kept while they are drawn every frame.
#[derive(Default)]
pub struct PatchCache {
    meshes: HashMap<PatchKey, GpuMesh>,
    used: HashSet<PatchKey>,
}

impl PatchCache {
    /// Makes sure the derived mesh for `key` exists, tessellating `patches` if needed.
    pub fn prepare(&mut self, device: &wgpu::Device, key: &PatchKey, patches: &MeshData) {
        self.used.insert(key.clone());
        if self.meshes.contains_key(key) {
            return;
        }
        let tessellated = tessellate_patches(patches, &key.factors);
        let mesh = match key.geometry {
            PatchGeometry::Surface => GpuMesh::new(
                device,
                "Tessellated Surface",
                &tessellated.vertices,
                &tessellated.indices,
            ),
            PatchGeometry::Blades => {
                let blades = blade_mesh(&tessellated);
                GpuMesh::new(device, "Surface Detail", &blades.vertices, &blades.indices)
            }
        };
        log::debug!(
            "Tessellated {:?} {:?}: {} indices ({} cached)",
            key.mesh,
            key.geometry,
            mesh.index_count,
            self.meshes.len() + 1
        );
        self.meshes.insert(key.clone(), mesh);
    }

    pub fn get(&self, key: &PatchKey) -> Option<&GpuMesh> {
        self.meshes.get(key)
    }

    /// Drops every mesh that the frame just presented did not draw.
    pub fn end_frame(&mut self) {
        let used = std::mem::take(&mut self.used);
        self.meshes.retain(|key, _| used.contains(key));
    }
}
