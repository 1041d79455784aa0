//! GPU textures: sampled images, colour targets, depth buffers and the shadow-map array.

/// A texture with its default view.
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    /// Offscreen colour targets hold HDR values for the post-processing chain.
    pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    /// Upload an RGBA8 image. Albedo maps are sRGB; data maps such as height maps are linear.
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        image: &image::RgbaImage,
        srgb: bool,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let (width, height) = image.dimensions();
        let format = if srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// Colour target that later passes sample.
    pub fn create_color_target(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        Self::create_attachment(
            device,
            width,
            height,
            1,
            Self::TARGET_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            label,
        )
    }

    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        Self::create_attachment(
            device,
            width,
            height,
            1,
            Self::DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            label,
        )
    }

    fn create_attachment(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        layers: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(if layers > 1 {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });
        Self { texture, view }
    }
}

/// Offscreen colour target with its own depth buffer.
pub struct ColorTarget {
    pub color: Texture,
    pub depth: Texture,
}

impl ColorTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        Self {
            color: Texture::create_color_target(device, width, height, label),
            depth: Texture::create_depth_texture(device, width, height, &format!("{label} Depth")),
        }
    }
}

/// Layered depth texture. The whole array is sampled; each layer is rendered separately.
pub struct DepthArray {
    pub array: Texture,
    pub layers: Vec<wgpu::TextureView>,
}

impl DepthArray {
    pub fn new(device: &wgpu::Device, size: u32, layers: u32, label: &str) -> Self {
        // A one-layer array still needs an array view for the sampling side.
        let array = Texture::create_attachment(
            device,
            size,
            size,
            layers.max(2),
            Texture::DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            label,
        );
        let layer_views = (0..layers)
            .map(|layer| {
                array.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("{label} Layer {layer}")),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        Self {
            array,
            layers: layer_views,
        }
    }
}
