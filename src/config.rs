//! Runtime configuration.
//!
//! Everything here is a fixed constant of the viewer; there is no command line.
//! [`Config::default`] carries the values the viewer ships with and
//! [`Config::with_env_overrides`] lets the asset paths be pointed elsewhere.

use std::path::PathBuf;

use crate::data_structures::render_target::TargetPolicy;

/// Environment variable overriding [`Config::model_path`].
pub const MODEL_ENV: &str = "VISTA_MODEL";
/// Environment variable overriding [`Config::panorama_path`].
pub const PANORAMA_ENV: &str = "VISTA_PANORAMA";

/// Initial camera placement.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in degrees.
    pub fovy: f32,
}

/// Reference grid drawn on the ground plane.
#[derive(Clone, Debug, PartialEq)]
pub struct GridConfig {
    pub slices: u32,
    pub spacing: f32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Requested MSAA sample count. Falls back to 1 if the adapter refuses it.
    pub msaa_samples: u32,
    pub resizable: bool,
    /// Edge length of the square shadow map.
    pub shadow_resolution: u32,
    pub shadow_near: f32,
    pub shadow_far: f32,
    /// Edge length of each baked cubemap face.
    pub cubemap_size: u32,
    pub model_path: PathBuf,
    pub model_position: [f32; 3],
    pub model_scale: f32,
    pub panorama_path: PathBuf,
    pub camera: CameraConfig,
    pub clear_colour: wgpu::Color,
    pub grid: Option<GridConfig>,
    /// Edge length of the shadow map overlay in the top-left corner, in pixels.
    pub overlay_size: u32,
    pub target_policy: TargetPolicy,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let shadow_resolution = 1024;
        Self {
            title: "vista-ngin".to_string(),
            width: 800,
            height: 450,
            msaa_samples: 4,
            resizable: true,
            shadow_resolution,
            shadow_near: 0.01,
            shadow_far: 1000.0,
            cubemap_size: 1024,
            model_path: PathBuf::from("assets/Sponza/glTF/Sponza.gltf"),
            model_position: [0.0; 3],
            model_scale: 1.0,
            panorama_path: PathBuf::from("assets/skybox.hdr"),
            camera: CameraConfig {
                position: [50.0, 50.0, 50.0],
                target: [0.0, 10.0, 0.0],
                up: [0.0, 1.0, 0.0],
                fovy: 90.0,
            },
            // off-white
            clear_colour: wgpu::Color {
                r: 245.0 / 255.0,
                g: 245.0 / 255.0,
                b: 245.0 / 255.0,
                a: 1.0,
            },
            grid: Some(GridConfig {
                slices: 20,
                spacing: 10.0,
            }),
            overlay_size: shadow_resolution / 4,
            target_policy: TargetPolicy::Strict,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Replace the asset paths with [`MODEL_ENV`] / [`PANORAMA_ENV`] when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(MODEL_ENV) {
            self.model_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(PANORAMA_ENV) {
            self.panorama_path = PathBuf::from(path);
        }
        self
    }

    /// Half-width of the orthographic shadow frustum, half the shadow resolution.
    pub fn shadow_half_extent(&self) -> f32 {
        self.shadow_resolution as f32 / 2.0
    }
}
