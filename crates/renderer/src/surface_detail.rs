//! Optional grass-like surface detail grown on the deformed plane.
//!
//! One blade quad is emitted per tessellated triangle, rooted at the triangle
//! centroid. The vertex stage deforms the root with the plane's deformation,
//! extrudes the blade along the surface normal and sways its tip with the
//! wind function.

use crate::deform::{wave_offset, Wave};
use crate::mesh::MeshData;
use crate::uniforms::WindUniform;
use crate::vertex::BladeVertex;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Corners of one blade: (across, up).
const BLADE_CORNERS: [[f32; 2]; 4] = [[-1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [-1.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceDetailConfig {
    pub enabled: bool,
    /// Wind along X and along Z.
    pub wind: [Wave; 2],
    /// Light blades with the full shading instead of flat albedo.
    pub surface_lighting: bool,
    pub blade_height: f32,
    pub blade_width: f32,
}

impl Default for SurfaceDetailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wind: [Wave::new(0.83, 0.22, 1.0), Wave::new(0.33, 1.5, 1.0)],
            surface_lighting: false,
            blade_height: 1.2,
            blade_width: 0.3,
        }
    }
}

impl SurfaceDetailConfig {
    pub fn wind_uniform(&self, time: f32) -> WindUniform {
        WindUniform {
            wave_x: self.wind[0].packed(),
            wave_z: self.wind[1].packed(),
            blade: [
                self.blade_height,
                self.blade_width * 0.5,
                if self.surface_lighting { 1.0 } else { 0.0 },
                time,
            ],
        }
    }
}

/// Blade geometry for the vertex stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BladeMesh {
    pub vertices: Vec<BladeVertex>,
    pub indices: Vec<u32>,
}

/// One blade per triangle of a tessellated plane.
pub fn blade_mesh(tessellated: &MeshData) -> BladeMesh {
    let mut mesh = BladeMesh::default();
    for tri in tessellated.indices.chunks_exact(3) {
        let corners = [tri[0], tri[1], tri[2]].map(|i| tessellated.vertices[i as usize]);
        let base = corners
            .iter()
            .map(|v| Vec3::from_array(v.position))
            .sum::<Vec3>()
            / 3.0;
        let uv = corners
            .iter()
            .map(|v| Vec2::from_array(v.tex_coords))
            .sum::<Vec2>()
            / 3.0;

        let first = mesh.vertices.len() as u32;
        mesh.vertices.extend(BLADE_CORNERS.map(|corner| BladeVertex {
            base: base.to_array(),
            tex_coords: uv.to_array(),
            corner,
        }));
        mesh.indices
            .extend_from_slice(&[first, first + 1, first + 2, first, first + 2, first + 3]);
    }
    mesh
}

/// Direction a blade spreads across, perpendicular to the surface normal.
pub fn blade_side(normal: Vec3) -> Vec3 {
    normal.cross(Vec3::Z).try_normalize().unwrap_or(Vec3::X)
}

/// World-space blade corner given the deformed root and normal.
///
/// `plane_root` is the undeformed root, which the wind is evaluated at.
pub fn blade_corner(
    root: Vec3,
    normal: Vec3,
    plane_root: Vec3,
    corner: [f32; 2],
    config: &SurfaceDetailConfig,
    time: f32,
) -> Vec3 {
    let side = blade_side(normal);
    let [across, up] = corner;
    let sway = wave_offset(&config.wind, plane_root.x, plane_root.z, time) * up;
    root + side * (across * config.blade_width * 0.5 + sway) + normal * (up * config.blade_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::{tessellate_patches, PatchFactors};

    /// One quad per tessellated triangle, rooted at the centroid.
    #[test]
    fn one_blade_per_triangle() {
        let plane = MeshData::patch_plane(2);
        let tris = tessellate_patches(&plane, &vec![PatchFactors::uniform(2); plane.patch_count()]);
        let blades = blade_mesh(&tris);
        let triangles = tris.indices.len() / 3;
        assert_eq!(blades.vertices.len(), triangles * 4);
        assert_eq!(blades.indices.len(), triangles * 6);

        let first = &tris.indices[0..3];
        let centroid = first
            .iter()
            .map(|&i| Vec3::from_array(tris.vertices[i as usize].position))
            .sum::<Vec3>()
            / 3.0;
        assert!((Vec3::from_array(blades.vertices[0].base) - centroid).length() < 1e-6);
    }

    /// Roots stay put; only tips move with the wind.
    #[test]
    fn wind_sways_the_tip_only() {
        let config = SurfaceDetailConfig::default();
        let root = Vec3::new(3.0, 1.0, 2.0);
        let calm = |t: f32, corner| blade_corner(root, Vec3::Y, root, corner, &config, t);
        assert_eq!(calm(0.0, [-1.0, 0.0]), calm(1.7, [-1.0, 0.0]));
        assert_ne!(calm(0.0, [-1.0, 1.0]), calm(1.7, [-1.0, 1.0]));

        let tip = calm(0.0, [0.0, 1.0]);
        let sway = wave_offset(&config.wind, root.x, root.z, 0.0);
        assert!((tip - (root + Vec3::Y * config.blade_height + blade_side(Vec3::Y) * sway)).length() < 1e-5);
    }

    /// The uniform carries the half width and the lighting flag.
    #[test]
    fn wind_uniform_packing() {
        let config = SurfaceDetailConfig {
            surface_lighting: true,
            ..Default::default()
        };
        let uniform = config.wind_uniform(2.5);
        assert_eq!(uniform.wave_x, [0.83, 0.22, 1.0, 0.0]);
        assert_eq!(uniform.blade, [1.2, 0.15, 1.0, 2.5]);
    }
}
