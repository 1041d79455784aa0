//! Mesh data and primitive generation.
//!
//! Triangles wind counter-clockwise seen from the front (right-handed, +Y up).

use crate::device::Topology;
use crate::vertex::Vertex;
use glam::Vec3;

/// Mesh data before upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl Default for MeshData {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            topology: Topology::TriangleList,
        }
    }
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one quad given its corners in counter-clockwise order.
    fn push_quad(&mut self, corners: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&corners);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Cube spanning [-1, 1] on every axis.
    pub fn cube() -> Self {
        // (normal, u axis, v axis) with u x v == normal
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut mesh = Self::new();
        for (normal, u, v) in faces {
            let n = normal.to_array();
            mesh.push_quad([
                Vertex::new((normal - u - v).to_array(), n, [0.0, 1.0]),
                Vertex::new((normal + u - v).to_array(), n, [1.0, 1.0]),
                Vertex::new((normal + u + v).to_array(), n, [1.0, 0.0]),
                Vertex::new((normal - u + v).to_array(), n, [0.0, 0.0]),
            ]);
        }
        mesh
    }

    /// UV sphere.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = radius * phi.cos();
            let ring_radius = radius * phi.sin();

            for segment in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * segment as f32 / segments as f32;
                let position = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                let normal = position.normalize_or_zero();
                let uv = [
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                ];
                mesh.vertices
                    .push(Vertex::new(position.to_array(), normal.to_array(), uv));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[current, current + 1, next]);
                mesh.indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        mesh
    }

    /// Floor grid of `size` x `size` unit quads from the origin towards +X/+Z.
    pub fn grid_plane(size: u32) -> Self {
        let size = size.max(1);
        let mut mesh = Self::new();
        let stride = size + 1;

        for z in 0..=size {
            for x in 0..=size {
                mesh.vertices.push(Vertex::new(
                    [x as f32, 0.0, z as f32],
                    [0.0, 1.0, 0.0],
                    [x as f32 / size as f32, z as f32 / size as f32],
                ));
            }
        }

        for z in 0..size {
            for x in 0..size {
                let a = z * stride + x;
                let b = a + stride;
                let c = b + 1;
                let d = a + 1;
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }

        mesh
    }

    /// Plane of `resolution` x `resolution` quad patches for the tessellation stages.
    ///
    /// Control points per patch run (x, z), (x, z+1), (x+1, z+1), (x+1, z): the
    /// first domain coordinate follows +Z and the second +X, so domain-space
    /// counter-clockwise triangles face +Y. Texture coordinates span [0, 1]
    /// across the whole plane with u along +X.
    pub fn patch_plane(resolution: u32) -> Self {
        let resolution = resolution.max(1);
        let n = resolution as f32;
        let mut mesh = Self {
            topology: Topology::PatchList4,
            ..Self::new()
        };

        for z in 0..resolution {
            for x in 0..resolution {
                let base = mesh.vertices.len() as u32;
                for (dx, dz) in [(0u32, 0u32), (0, 1), (1, 1), (1, 0)] {
                    let px = (x + dx) as f32;
                    let pz = (z + dz) as f32;
                    mesh.vertices
                        .push(Vertex::new([px, 0.0, pz], [0.0, 1.0, 0.0], [px / n, pz / n]));
                }
                mesh.indices
                    .extend_from_slice(&[base, base + 1, base + 2, base + 3]);
            }
        }

        mesh
    }

    /// Screen-aligned quad in the z = 0 plane facing +Z, centred on (x, y).
    ///
    /// Texture v runs top to bottom.
    pub fn ortho_quad(width: f32, height: f32, x: f32, y: f32) -> Self {
        let (l, r) = (x - width * 0.5, x + width * 0.5);
        let (b, t) = (y - height * 0.5, y + height * 0.5);
        let n = [0.0, 0.0, 1.0];
        let mut mesh = Self::new();
        mesh.push_quad([
            Vertex::new([l, b, 0.0], n, [0.0, 1.0]),
            Vertex::new([r, b, 0.0], n, [1.0, 1.0]),
            Vertex::new([r, t, 0.0], n, [1.0, 0.0]),
            Vertex::new([l, t, 0.0], n, [0.0, 0.0]),
        ]);
        mesh
    }

    /// Number of patches in a `PatchList4` mesh.
    pub fn patch_count(&self) -> usize {
        match self.topology {
            Topology::PatchList4 => self.indices.len() / 4,
            Topology::TriangleList => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(mesh: &MeshData, index: u32) -> Vec3 {
        Vec3::from_array(mesh.vertices[index as usize].position)
    }

    fn face_normals(mesh: &MeshData) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        mesh.indices.chunks(3).map(|tri| {
            let a = position(mesh, tri[0]);
            let b = position(mesh, tri[1]);
            let c = position(mesh, tri[2]);
            ((b - a).cross(c - a), (a + b + c) / 3.0)
        })
    }

    /// Every cube triangle faces away from the centre.
    #[test]
    fn cube_faces_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.indices.len(), 36);
        for (normal, centroid) in face_normals(&cube) {
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    /// Sphere triangles away from the poles face outward.
    #[test]
    fn sphere_faces_outward() {
        let sphere = MeshData::sphere(1.0, 16, 12);
        assert_eq!(sphere.indices.len(), (16 * 12 * 6) as usize);
        for (normal, centroid) in face_normals(&sphere) {
            if normal.length() > 1e-6 {
                assert!(normal.dot(centroid) > 0.0);
            }
        }
    }

    #[test]
    fn grid_plane_faces_up() {
        let plane = MeshData::grid_plane(4);
        assert_eq!(plane.vertices.len(), 25);
        assert_eq!(plane.indices.len(), 4 * 4 * 6);
        for (normal, _) in face_normals(&plane) {
            assert!(normal.y > 0.0);
        }
    }

    /// The patch plane emits four control points per patch and covers [0, 1] in uv.
    #[test]
    fn patch_plane_layout() {
        let plane = MeshData::patch_plane(30);
        assert_eq!(plane.topology, Topology::PatchList4);
        assert_eq!(plane.patch_count(), 900);
        let max_uv = plane
            .vertices
            .iter()
            .fold(0.0f32, |acc, v| acc.max(v.tex_coords[0]).max(v.tex_coords[1]));
        assert!((max_uv - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ortho_quad_bounds() {
        let quad = MeshData::ortho_quad(200.0, 100.0, 10.0, 0.0);
        let xs: Vec<f32> = quad.vertices.iter().map(|v| v.position[0]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -90.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 110.0);
        for (normal, _) in face_normals(&quad) {
            assert!(normal.z > 0.0);
        }
    }
}
