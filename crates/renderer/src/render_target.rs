//! Offscreen colour targets and screen-space quad transforms.
//!
//! Every screen-space draw uses one unit quad scaled into place, so targets
//! can be recreated on resize without touching any mesh.

use crate::camera::Camera;
use crate::device::{GraphicsDevice, RenderTargetBinding, TargetId, TextureView};
use crate::error::RenderResult;
use crate::mesh::MeshData;
use crate::uniforms::TransformUniform;
use glam::{Mat4, Vec3};

/// Blur cascade level sizes, largest first.
pub const CASCADE_SIZES: [(u32, u32); 9] = [
    (1184, 666),
    (1024, 576),
    (896, 504),
    (512, 288),
    (256, 144),
    (128, 72),
    (64, 36),
    (32, 18),
    (16, 9),
];

pub const SCREEN_NEAR: f32 = 0.1;
pub const SCREEN_FAR: f32 = 100.0;

/// 1x1 quad centred on the origin, facing the ortho camera.
pub fn unit_quad() -> MeshData {
    MeshData::ortho_quad(1.0, 1.0, 0.0, 0.0)
}

/// Orthographic projection covering a `width` x `height` screen centred on the origin.
pub fn screen_projection(width: u32, height: u32) -> Mat4 {
    let (w, h) = (width as f32 * 0.5, height as f32 * 0.5);
    Mat4::orthographic_rh(-w, w, -h, h, SCREEN_NEAR, SCREEN_FAR)
}

/// Unit quad placed on a `width` x `height` screen, `size` pixels large, centred at `center`.
pub fn quad_transforms(width: u32, height: u32, size: (f32, f32), center: (f32, f32)) -> TransformUniform {
    let world = Mat4::from_translation(Vec3::new(center.0, center.1, 0.0))
        * Mat4::from_scale(Vec3::new(size.0, size.1, 1.0));
    TransformUniform::new(world, Camera::ortho_view_matrix(), screen_projection(width, height))
}

/// Unit quad stretched over the whole of a `width` x `height` target.
pub fn fullscreen_transforms(width: u32, height: u32) -> TransformUniform {
    quad_transforms(width, height, (width as f32, height as f32), (0.0, 0.0))
}

/// An offscreen colour target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: TargetId,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(device: &mut dyn GraphicsDevice, label: &str, width: u32, height: u32) -> RenderResult<Self> {
        let (width, height) = (width.max(1), height.max(1));
        let id = device.create_render_target(label, width, height)?;
        Ok(Self { id, width, height })
    }

    pub fn binding(&self) -> RenderTargetBinding {
        RenderTargetBinding::Offscreen(self.id)
    }

    pub fn view(&self) -> TextureView {
        TextureView::Target(self.id)
    }

    /// Makes this the write destination and clears it.
    pub fn begin(&self, device: &mut dyn GraphicsDevice, clear: [f32; 4]) {
        device.set_render_target(self.binding());
        device.clear_render_target(clear);
    }

    /// Transforms that stretch the unit quad over this target.
    pub fn transforms(&self) -> TransformUniform {
        fullscreen_transforms(self.width, self.height)
    }

    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.release_render_target(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A stretched unit quad maps exactly onto clip space.
    #[test]
    fn quad_fills_the_target() {
        let (w, h) = CASCADE_SIZES[3];
        let t = fullscreen_transforms(w, h);
        let clip = Mat4::from_cols_array_2d(&t.projection)
            * Mat4::from_cols_array_2d(&t.view)
            * Mat4::from_cols_array_2d(&t.world);
        for v in &unit_quad().vertices {
            let p = clip.project_point3(Vec3::from_array(v.position));
            assert!((p.x.abs() - 1.0).abs() < 1e-5);
            assert!((p.y.abs() - 1.0).abs() < 1e-5);
            assert!((0.0..=1.0).contains(&p.z));
        }
    }

    /// Levels shrink monotonically and keep a 16:9 shape.
    #[test]
    fn cascade_levels_shrink() {
        for pair in CASCADE_SIZES.windows(2) {
            assert!(pair[1].0 < pair[0].0 && pair[1].1 < pair[0].1);
        }
        for (w, h) in CASCADE_SIZES {
            assert!((w as f32 / h as f32 - 16.0 / 9.0).abs() < 0.01);
        }
    }
}
