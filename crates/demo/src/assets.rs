//! Texture images for the scene: loaded from disk or generated.

use crate::config::{DemoConfig, TextureSource};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use noise::{NoiseFn, Perlin};

/// The height map holds data, not colour.
const LINEAR_TEXTURES: [&str; 1] = ["height"];

pub struct TextureImage {
    pub name: String,
    pub image: RgbaImage,
    pub srgb: bool,
}

/// Builds every configured texture. A file that cannot be read is an error.
pub fn load_textures(config: &DemoConfig) -> Result<Vec<TextureImage>> {
    config
        .textures
        .iter()
        .map(|(name, source)| {
            let image = build_image(source, config.texture_size)
                .with_context(|| format!("building texture '{name}'"))?;
            Ok(TextureImage {
                name: name.clone(),
                image,
                srgb: !LINEAR_TEXTURES.contains(&name.as_str()),
            })
        })
        .collect()
}

pub fn build_image(source: &TextureSource, size: u32) -> Result<RgbaImage> {
    let size = size.max(1);
    let image = match source {
        TextureSource::File(path) => image::open(path)
            .with_context(|| format!("loading {}", path.display()))?
            .to_rgba8(),
        TextureSource::Solid(colour) => RgbaImage::from_pixel(size, size, Rgba(*colour)),
        TextureSource::Checker { a, b, cells } => {
            let cell = (size / (*cells).max(1)).max(1);
            RgbaImage::from_fn(size, size, |x, y| {
                if (x / cell + y / cell) % 2 == 0 {
                    Rgba(*a)
                } else {
                    Rgba(*b)
                }
            })
        }
        TextureSource::Wood { light, dark, rings } => {
            let perlin = Perlin::new(3);
            RgbaImage::from_fn(size, size, |x, y| {
                let (u, v) = (x as f64 / size as f64, y as f64 / size as f64);
                let distortion = fbm(&perlin, u * 4.0, v * 4.0, 3) * 0.3;
                let radius = ((u - 0.5).powi(2) + (v * 0.2).powi(2)).sqrt() + distortion;
                let grain = (radius * *rings as f64).fract();
                mix(*dark, *light, grain)
            })
        }
        TextureSource::Noise {
            low,
            high,
            seed,
            octaves,
            scale,
        } => {
            let perlin = Perlin::new(*seed);
            RgbaImage::from_fn(size, size, |x, y| {
                let (u, v) = (x as f64 / size as f64, y as f64 / size as f64);
                mix(*low, *high, fbm(&perlin, u * scale, v * scale, *octaves))
            })
        }
    };
    Ok(image)
}

/// Fractal sum of Perlin octaves, in 0..1.
fn fbm(perlin: &Perlin, x: f64, y: f64, octaves: u32) -> f64 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    let mut frequency = 1.0;

    for _ in 0..octaves.max(1) {
        value += amplitude * (perlin.get([x * frequency, y * frequency]) * 0.5 + 0.5);
        amplitude *= 0.5;
        frequency *= 2.0;
    }

    value.clamp(0.0, 1.0)
}

fn mix(a: [u8; 3], b: [u8; 3], t: f64) -> Rgba<u8> {
    let channel = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * t).round().clamp(0.0, 255.0) as u8;
    Rgba([channel(0), channel(1), channel(2), 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_alternates() {
        let image = build_image(
            &TextureSource::Checker {
                a: [255, 0, 0, 255],
                b: [0, 0, 255, 255],
                cells: 4,
            },
            16,
        )
        .expect("checker");
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(4, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(4, 4), &Rgba([255, 0, 0, 255]));
    }

    /// Generated noise stays between its two colours and is not flat.
    #[test]
    fn noise_spans_range() {
        let image = build_image(
            &TextureSource::Noise {
                low: [0, 0, 0],
                high: [200, 200, 200],
                seed: 7,
                octaves: 4,
                scale: 4.0,
            },
            64,
        )
        .expect("noise");
        let values: Vec<u8> = image.pixels().map(|p| p.0[0]).collect();
        assert!(values.iter().all(|&v| v <= 200));
        let (min, max) = (values.iter().min(), values.iter().max());
        assert!(max > min);
    }

    #[test]
    fn missing_file_is_an_error() {
        let source = TextureSource::File("does/not/exist.png".into());
        assert!(build_image(&source, 8).is_err());
    }

    /// Only the height map is uploaded as linear data.
    #[test]
    fn default_textures_build() {
        let mut config = DemoConfig::default();
        config.texture_size = 8;
        let textures = load_textures(&config).expect("textures");
        assert_eq!(textures.len(), renderer::REQUIRED_TEXTURES.len());
        for texture in &textures {
            assert_eq!(texture.srgb, texture.name != "height");
            assert_eq!(texture.image.dimensions(), (8, 8));
        }
    }
}
