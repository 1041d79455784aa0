//! Tessellation factor policy and quad-domain tessellation.
//!
//! Factors follow integer partitioning: every factor is rounded up to a whole
//! number of segments in `[MIN_FACTOR, MAX_FACTOR]`.

use crate::device::Topology;
use crate::mesh::MeshData;
use crate::uniforms::DeformUniform;
use crate::vertex::Vertex;
use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub const MIN_FACTOR: u32 = 1;
pub const MAX_FACTOR: u32 = 16;

/// User-facing tessellation settings. `dynamic` selects the active policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellationSettings {
    pub dynamic: bool,
    pub inside: u32,
    pub edge: u32,
    pub near: f32,
    pub far: f32,
}

impl Default for TessellationSettings {
    fn default() -> Self {
        Self {
            dynamic: false,
            inside: 5,
            edge: 5,
            near: 10.0,
            far: 32.0,
        }
    }
}

impl TessellationSettings {
    pub fn policy(&self) -> TessellationPolicy {
        if self.dynamic {
            TessellationPolicy::Dynamic {
                near: self.near,
                far: self.far,
            }
        } else {
            TessellationPolicy::Fixed {
                inside: self.inside,
                edge: self.edge,
            }
        }
    }

    pub fn clamp_to_limits(&mut self) {
        self.inside = self.inside.clamp(MIN_FACTOR, MAX_FACTOR);
        self.edge = self.edge.clamp(MIN_FACTOR, MAX_FACTOR);
        self.near = self.near.clamp(0.0, 100.0);
        self.far = self.far.clamp(0.0, 100.0);
    }

    pub(crate) fn packed_factors(&self) -> [f32; 4] {
        [self.inside as f32, self.edge as f32, self.near, self.far]
    }

    pub(crate) fn packed_policy(&self) -> [f32; 4] {
        [
            if self.dynamic { 1.0 } else { 0.0 },
            MAX_FACTOR as f32,
            MIN_FACTOR as f32,
            0.0,
        ]
    }

    /// Reads the settings back out of a packed deformation block.
    pub fn from_uniform(deform: &DeformUniform) -> Self {
        let [inside, edge, near, far] = deform.tessellation;
        Self {
            dynamic: deform.policy[0] > 0.5,
            inside: inside.max(0.0) as u32,
            edge: edge.max(0.0) as u32,
            near,
            far,
        }
    }
}

/// The active factor policy. Exactly one is in effect per draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TessellationPolicy {
    Fixed { inside: u32, edge: u32 },
    Dynamic { near: f32, far: f32 },
}

impl TessellationPolicy {
    /// Hull-stage factors for one patch whose centre is `patch_center` in world space.
    pub fn patch_factors(&self, camera: Vec3, patch_center: Vec3) -> PatchFactors {
        match *self {
            TessellationPolicy::Fixed { inside, edge } => PatchFactors {
                edges: [clamp_factor(edge as f32); 4],
                inside: [clamp_factor(inside as f32); 2],
            },
            TessellationPolicy::Dynamic { near, far } => {
                let factor = clamp_factor(factor_for_distance(camera.distance(patch_center), near, far));
                PatchFactors::uniform(factor)
            }
        }
    }

    /// Factors for every patch of a `PatchList4` mesh drawn with `world`.
    pub fn factors_for_mesh(&self, mesh: &MeshData, world: Mat4, camera: Vec3) -> Vec<PatchFactors> {
        mesh.indices
            .chunks_exact(4)
            .map(|patch| {
                let center = patch
                    .iter()
                    .map(|&i| Vec3::from_array(mesh.vertices[i as usize].position))
                    .sum::<Vec3>()
                    * 0.25;
                self.patch_factors(camera, world.transform_point3(center))
            })
            .collect()
    }
}

/// Maps camera distance linearly from `near` (max factor) to `far` (min factor).
pub fn factor_for_distance(distance: f32, near: f32, far: f32) -> f32 {
    let (max, min) = (MAX_FACTOR as f32, MIN_FACTOR as f32);
    if far <= near {
        return if distance <= near { max } else { min };
    }
    let t = ((distance - near) / (far - near)).clamp(0.0, 1.0);
    max + (min - max) * t
}

fn clamp_factor(factor: f32) -> u32 {
    if !factor.is_finite() {
        return MIN_FACTOR;
    }
    (factor.ceil() as u32).clamp(MIN_FACTOR, MAX_FACTOR)
}

/// Per-patch factors. Edges are ordered v = 0, u = 1, v = 1, u = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchFactors {
    pub edges: [u32; 4],
    /// Along u, along v.
    pub inside: [u32; 2],
}

impl PatchFactors {
    pub fn uniform(factor: u32) -> Self {
        Self {
            edges: [factor; 4],
            inside: [factor; 2],
        }
    }
}

/// Tessellated quad domain: points in `[0,1]^2` and CCW triangles over them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainMesh {
    pub points: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

impl DomainMesh {
    fn push(&mut self, p: Vec2) -> u32 {
        self.points.push(p);
        (self.points.len() - 1) as u32
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        let (pa, pb, pc) = (
            self.points[a as usize],
            self.points[b as usize],
            self.points[c as usize],
        );
        if (pb - pa).perp_dot(pc - pa) < 0.0 {
            self.triangles.push([a, c, b]);
        } else {
            self.triangles.push([a, b, c]);
        }
    }
}

const CORNERS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

/// Tessellates the unit quad domain.
///
/// The outer ring is split per edge factor and zipped to the boundary of the
/// inner grid. With an inside factor below 3 the inner grid collapses to the
/// centre point and the ring is fanned around it.
pub fn tessellate_quad(factors: &PatchFactors) -> DomainMesh {
    let edges = factors.edges.map(|f| f.clamp(MIN_FACTOR, MAX_FACTOR));
    let [ins_u, ins_v] = factors.inside.map(|f| f.clamp(MIN_FACTOR, MAX_FACTOR));
    let mut mesh = DomainMesh::default();

    // Outer ring, CCW, each point tagged with side + fraction along the side.
    let mut outer = Vec::new();
    for (side, &segments) in edges.iter().enumerate() {
        let (from, to) = (CORNERS[side], CORNERS[(side + 1) % 4]);
        for k in 0..segments {
            let f = k as f32 / segments as f32;
            outer.push((mesh.push(from.lerp(to, f)), side as f32 + f));
        }
    }

    if edges == [1; 4] && ins_u == 1 && ins_v == 1 {
        mesh.triangle(0, 1, 2);
        mesh.triangle(0, 2, 3);
        return mesh;
    }

    if ins_u < 3 || ins_v < 3 {
        let center = mesh.push(Vec2::splat(0.5));
        for i in 0..outer.len() {
            mesh.triangle(outer[i].0, outer[(i + 1) % outer.len()].0, center);
        }
        return mesh;
    }

    // Inner grid spans 1/ins .. 1 - 1/ins on each axis.
    let (nu, nv) = (ins_u - 1, ins_v - 1);
    let grid_base = mesh.points.len() as u32;
    for j in 0..nv {
        for i in 0..nu {
            mesh.push(Vec2::new(
                (i + 1) as f32 / ins_u as f32,
                (j + 1) as f32 / ins_v as f32,
            ));
        }
    }
    let grid = |i: u32, j: u32| grid_base + j * nu + i;
    for j in 0..nv - 1 {
        for i in 0..nu - 1 {
            let (a, b, c, d) = (grid(i, j), grid(i + 1, j), grid(i + 1, j + 1), grid(i, j + 1));
            mesh.triangle(a, b, c);
            mesh.triangle(a, c, d);
        }
    }

    // Inner ring, CCW from the lower-left grid corner.
    let (su, sv) = ((nu - 1) as f32, (nv - 1) as f32);
    let mut inner = Vec::new();
    for i in 0..nu - 1 {
        inner.push((grid(i, 0), i as f32 / su));
    }
    for j in 0..nv - 1 {
        inner.push((grid(nu - 1, j), 1.0 + j as f32 / sv));
    }
    for i in (1..nu).rev() {
        inner.push((grid(i, nv - 1), 2.0 + (nu - 1 - i) as f32 / su));
    }
    for j in (1..nv).rev() {
        inner.push((grid(0, j), 3.0 + (nv - 1 - j) as f32 / sv));
    }

    zip_rings(&mut mesh, &outer, &inner);
    mesh
}

/// Stitches two closed CCW rings whose points carry matching side parameters.
fn zip_rings(mesh: &mut DomainMesh, outer: &[(u32, f32)], inner: &[(u32, f32)]) {
    let param = |ring: &[(u32, f32)], i: usize| if i == ring.len() { 4.0 } else { ring[i].1 };
    let at = |ring: &[(u32, f32)], i: usize| ring[i % ring.len()].0;
    let (mut i, mut j) = (0, 0);
    while i < outer.len() || j < inner.len() {
        let advance_outer = j == inner.len() || (i < outer.len() && param(outer, i + 1) <= param(inner, j + 1));
        if advance_outer {
            mesh.triangle(at(outer, i), at(outer, i + 1), at(inner, j));
            i += 1;
        } else {
            mesh.triangle(at(outer, i), at(inner, j + 1), at(inner, j));
            j += 1;
        }
    }
}

/// Bilinear patch evaluation for control points ordered (x,z), (x,z+1), (x+1,z+1), (x+1,z).
///
/// Domain u runs from point 0 to point 1, v from point 0 to point 3.
pub fn patch_point(patch: &[Vertex; 4], uv: Vec2) -> Vertex {
    let lerp3 = |a: [f32; 3], b: [f32; 3], t: f32| Vec3::from_array(a).lerp(Vec3::from_array(b), t);
    let lerp2 = |a: [f32; 2], b: [f32; 2], t: f32| Vec2::from_array(a).lerp(Vec2::from_array(b), t);
    let position = lerp3(patch[0].position, patch[1].position, uv.x)
        .lerp(lerp3(patch[3].position, patch[2].position, uv.x), uv.y);
    let tex = lerp2(patch[0].tex_coords, patch[1].tex_coords, uv.x)
        .lerp(lerp2(patch[3].tex_coords, patch[2].tex_coords, uv.x), uv.y);
    Vertex::new(position.to_array(), [0.0, 1.0, 0.0], tex.to_array())
}

/// Expands a `PatchList4` mesh into a triangle list, one factor set per patch.
pub fn tessellate_patches(mesh: &MeshData, factors: &[PatchFactors]) -> MeshData {
    let mut out = MeshData::new();
    let mut cache: Vec<(PatchFactors, DomainMesh)> = Vec::new();
    for (patch, patch_factors) in mesh.indices.chunks_exact(4).zip(factors) {
        let control = [0, 1, 2, 3].map(|k| mesh.vertices[patch[k] as usize]);
        let position = match cache.iter().position(|(f, _)| f == patch_factors) {
            Some(found) => found,
            None => {
                cache.push((*patch_factors, tessellate_quad(patch_factors)));
                cache.len() - 1
            }
        };
        let domain = &cache[position].1;
        let base = out.vertices.len() as u32;
        out.vertices
            .extend(domain.points.iter().map(|&uv| patch_point(&control, uv)));
        out.indices
            .extend(domain.triangles.iter().flatten().map(|&i| base + i));
    }
    out.topology = Topology::TriangleList;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(mesh: &DomainMesh) -> f32 {
        mesh.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| mesh.points[i as usize]);
                0.5 * (b - a).perp_dot(c - a)
            })
            .sum()
    }

    /// Uniform factor n yields 2n^2 triangles covering the unit square.
    #[test]
    fn uniform_factor_triangle_count() {
        for n in 2..=MAX_FACTOR {
            let mesh = tessellate_quad(&PatchFactors::uniform(n));
            assert_eq!(mesh.triangles.len() as u32, 2 * n * n, "factor {n}");
            assert!((area(&mesh) - 1.0).abs() < 1e-4, "factor {n}");
        }
    }

    /// Factor 1 everywhere is the untessellated quad.
    #[test]
    fn unit_factor_is_two_triangles() {
        let mesh = tessellate_quad(&PatchFactors::uniform(1));
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.points.len(), 4);
    }

    /// Mixed factors still tile the domain with counter-clockwise triangles.
    #[test]
    fn mixed_factors_tile_the_domain() {
        for factors in [
            PatchFactors { edges: [3, 7, 1, 16], inside: [5, 9] },
            PatchFactors { edges: [2, 2, 2, 2], inside: [2, 6] },
            PatchFactors { edges: [4, 1, 4, 1], inside: [1, 1] },
        ] {
            let mesh = tessellate_quad(&factors);
            assert!((area(&mesh) - 1.0).abs() < 1e-4, "{factors:?}");
            for t in &mesh.triangles {
                let [a, b, c] = t.map(|i| mesh.points[i as usize]);
                assert!((b - a).perp_dot(c - a) > 0.0, "{factors:?}");
            }
        }
    }

    /// Edge splits match the edge factor so neighbouring patches share vertices.
    #[test]
    fn outer_edge_follows_edge_factor() {
        let mesh = tessellate_quad(&PatchFactors { edges: [6, 3, 3, 3], inside: [4, 4] });
        let on_bottom = mesh.points.iter().filter(|p| p.y == 0.0).count();
        assert_eq!(on_bottom, 7);
    }

    /// Distance mapping from 16 at near to 1 at far.
    #[test]
    fn dynamic_factor_mapping() {
        assert_eq!(factor_for_distance(5.0, 10.0, 32.0), 16.0);
        assert_eq!(factor_for_distance(10.0, 10.0, 32.0), 16.0);
        assert_eq!(factor_for_distance(32.0, 10.0, 32.0), 1.0);
        assert_eq!(factor_for_distance(100.0, 10.0, 32.0), 1.0);
        assert!((factor_for_distance(21.0, 10.0, 32.0) - 8.5).abs() < 1e-5);
        // degenerate range steps at near
        assert_eq!(factor_for_distance(9.0, 10.0, 10.0), 16.0);
        assert_eq!(factor_for_distance(11.0, 10.0, 5.0), 1.0);
    }

    /// The fixed policy ignores distance and clamps.
    #[test]
    fn fixed_policy_is_uniform() {
        let policy = TessellationSettings { inside: 40, edge: 0, ..Default::default() }.policy();
        let near = policy.patch_factors(Vec3::ZERO, Vec3::X);
        let far = policy.patch_factors(Vec3::ZERO, Vec3::X * 1000.0);
        assert_eq!(near, far);
        assert_eq!(near.inside, [16, 16]);
        assert_eq!(near.edges, [1; 4]);
    }

    /// Settings survive the trip through the deformation block.
    #[test]
    fn settings_from_uniform() {
        let settings = TessellationSettings { dynamic: true, inside: 7, edge: 3, near: 4.0, far: 50.0 };
        let uniform = DeformUniform {
            tessellation: settings.packed_factors(),
            policy: settings.packed_policy(),
            ..Default::default()
        };
        assert_eq!(TessellationSettings::from_uniform(&uniform), settings);
    }

    /// Expanded patches face +Y and keep the plane's texture coordinates.
    #[test]
    fn patches_expand_to_upward_triangles() {
        let plane = MeshData::patch_plane(2);
        let factors = vec![PatchFactors::uniform(3); plane.patch_count()];
        let tris = tessellate_patches(&plane, &factors);
        assert_eq!(tris.topology, Topology::TriangleList);
        assert_eq!(tris.indices.len(), 4 * 18 * 3);
        for t in tris.indices.chunks_exact(3) {
            let [a, b, c] = [t[0], t[1], t[2]].map(|i| Vec3::from_array(tris.vertices[i as usize].position));
            assert!((b - a).cross(c - a).y > 0.0);
        }
        let max_u = tris.vertices.iter().map(|v| v.tex_coords[0]).fold(0.0, f32::max);
        assert!((max_u - 1.0).abs() < 1e-6);
    }
}
