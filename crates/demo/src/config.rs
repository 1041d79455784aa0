//! Demo configuration (window, shadow maps, textures, initial scene). Loaded from morphlight.ron at startup.

use crate::logging::LoggingConfig;
use renderer::{SceneConfig, REQUIRED_TEXTURES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "morphlight.ron";

/// Where a texture's pixels come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextureSource {
    /// PNG or JPEG on disk, relative to the working directory.
    File(PathBuf),
    Solid([u8; 4]),
    Checker { a: [u8; 4], b: [u8; 4], cells: u32 },
    /// Concentric grain rings, distorted by noise.
    Wood { light: [u8; 3], dark: [u8; 3], rings: f32 },
    /// Fractal Perlin noise mapped between two colours.
    Noise {
        low: [u8; 3],
        high: [u8; 3],
        seed: u32,
        octaves: u32,
        scale: f64,
    },
}

/// Persistent demo settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Window width in logical pixels.
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    /// Window height in logical pixels.
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_true")]
    pub vsync: bool,
    /// Side of every shadow map, in texels.
    #[serde(default = "default_shadow_map_size")]
    pub shadow_map_size: u32,
    /// Side of generated textures, in texels.
    #[serde(default = "default_texture_size")]
    pub texture_size: u32,
    /// Camera fly speed in units per second.
    #[serde(default = "default_camera_speed")]
    pub camera_speed: f32,
    /// Overrides per texture name; names left out keep their built-in source.
    #[serde(default)]
    pub textures: BTreeMap<String, TextureSource>,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}
fn default_shadow_map_size() -> u32 {
    renderer::shadow::DEFAULT_SHADOW_MAP_SIZE
}
fn default_texture_size() -> u32 {
    256
}
fn default_camera_speed() -> f32 {
    20.0
}

/// Built-in source for each required texture.
pub fn default_texture_sources() -> BTreeMap<String, TextureSource> {
    let colours: [[u8; 4]; 4] = [
        [200, 60, 60, 255],
        [60, 200, 60, 255],
        [60, 60, 200, 255],
        [220, 200, 60, 255],
    ];
    let mut sources = BTreeMap::new();
    sources.insert("default".to_string(), TextureSource::Solid([255, 255, 255, 255]));
    sources.insert(
        "height".to_string(),
        TextureSource::Noise {
            low: [0, 0, 0],
            high: [255, 255, 255],
            seed: 7,
            octaves: 5,
            scale: 4.0,
        },
    );
    sources.insert(
        "mars".to_string(),
        TextureSource::Noise {
            low: [90, 35, 20],
            high: [210, 120, 70],
            seed: 11,
            octaves: 6,
            scale: 8.0,
        },
    );
    sources.insert(
        "brick".to_string(),
        TextureSource::Checker {
            a: [150, 60, 45, 255],
            b: [110, 40, 30, 255],
            cells: 8,
        },
    );
    sources.insert(
        "lwood".to_string(),
        TextureSource::Wood {
            light: [225, 190, 140],
            dark: [180, 135, 85],
            rings: 12.0,
        },
    );
    sources.insert(
        "dwood".to_string(),
        TextureSource::Wood {
            light: [110, 70, 40],
            dark: [60, 35, 20],
            rings: 12.0,
        },
    );
    for (i, colour) in colours.into_iter().enumerate() {
        sources.insert(format!("colour{i}"), TextureSource::Solid(colour));
    }
    sources
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            vsync: default_true(),
            shadow_map_size: default_shadow_map_size(),
            texture_size: default_texture_size(),
            camera_speed: default_camera_speed(),
            textures: default_texture_sources(),
            scene: SceneConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DemoConfig {
    /// Load config from `morphlight.ron` in the working directory.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Missing file gives defaults; an invalid one is reported and also gives defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => Self::parse(&data).unwrap_or_else(|e| {
                log::warn!("Invalid config at {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            Err(_) => {
                log::debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    pub fn parse(data: &str) -> Result<Self, ron::error::SpannedError> {
        let mut config: Self = ron::from_str(data)?;
        config.fill_defaults();
        Ok(config)
    }

    /// Restore built-in sources for required textures the file left out, and pull values into range.
    fn fill_defaults(&mut self) {
        let builtin = default_texture_sources();
        for name in REQUIRED_TEXTURES {
            if !self.textures.contains_key(name) {
                if let Some(source) = builtin.get(name) {
                    self.textures.insert(name.to_string(), source.clone());
                }
            }
        }
        self.texture_size = self.texture_size.clamp(4, 4096);
        self.shadow_map_size = self.shadow_map_size.clamp(64, 8192);
        self.scene.clamp_to_limits();
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::PostMode;

    #[test]
    fn defaults_cover_required_textures() {
        let config = DemoConfig::default();
        for name in REQUIRED_TEXTURES {
            assert!(config.textures.contains_key(name), "no source for {name}");
        }
        assert_eq!(config.shadow_map_size, 2048);
    }

    /// A partial file keeps defaults for everything it leaves out.
    #[test]
    fn partial_file() {
        let config = DemoConfig::parse(
            r#"(
                window_width: 800,
                textures: { "mars": File("assets/mars.png") },
                scene: (post: (enabled: true, mode: Blur, blur_passes: 20)),
            )"#,
        )
        .expect("parse");
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 720);
        assert_eq!(config.textures["mars"], TextureSource::File("assets/mars.png".into()));
        assert_eq!(config.textures.len(), REQUIRED_TEXTURES.len());
        assert!(config.scene.post.enabled);
        assert_eq!(config.scene.post.mode, PostMode::Blur);
        assert_eq!(config.scene.post.blur_passes, 9);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = std::env::temp_dir().join(format!("morphlight-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, "(window_width: \"wide\")").expect("write");
        let config = DemoConfig::load_from(&path);
        assert_eq!(config.window_width, 1280);
        std::fs::remove_dir_all(&dir).ok();

        let missing = DemoConfig::load_from(&dir.join("absent.ron"));
        assert!(missing.vsync);
    }
}
