//! Run configuration
//!
//! Read from `<base>/morph.json`. Every field has a default, so the file may
//! name only what it changes, or be absent altogether.

use crate::constants::limits::MAX_NUM_NODES;
use crate::constants::mesh::DEFAULT_COLOR;
use crate::constants::render::{DEFAULT_DEBUG_COLOR, DEFAULT_FRAME_SIZE};
use crate::error::{MorphError, Result};
use crate::mesh::MeshColoring;
use crate::nodes::{ZygoteOptions, ZygoteShape};
use crate::gpu::RenderFlags;
use glam::UVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "morph.json";

/// Where simulation steps execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gpu,
    /// Built-in programs stepped on the CPU
    Host,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    /// Program directory, relative to the base path unless absolute
    pub shader_dir: PathBuf,
    pub morph_programs: Vec<String>,
    /// Program selected at startup; the first registered one when unset
    pub active_program: Option<String>,
    pub backend: Backend,

    pub max_nodes: usize,
    pub zygote_samples: u32,
    pub zygote_shape: ZygoteShape,
    pub with_faces: bool,
    pub jitter: f32,
    pub seed: u64,
    pub num_iters: usize,
    /// User uniform values applied after loading, by uniform name
    pub unif_overrides: BTreeMap<String, Vec<f32>>,

    pub render_faces: bool,
    pub render_points: bool,
    pub render_wireframe: bool,
    pub frame_size: [u32; 2],
    pub debug_color: [f32; 4],
    pub mesh_color: [f32; 4],
    /// Heat-map faces by `data.x` over `[min, max]` instead of `mesh_color`
    pub color_by_data: Option<[f32; 2]>,

    pub log_input_nodes: bool,
    pub log_output_nodes: bool,
    pub log_render_data: bool,
    pub log_durations: bool,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            morph_programs: vec!["growth.wgsl".to_string(), "identity.wgsl".to_string()],
            active_program: None,
            backend: Backend::default(),
            max_nodes: MAX_NUM_NODES,
            zygote_samples: 10,
            zygote_shape: ZygoteShape::default(),
            with_faces: false,
            jitter: 0.0,
            seed: 0,
            num_iters: 0,
            unif_overrides: BTreeMap::new(),
            render_faces: true,
            render_points: true,
            render_wireframe: true,
            frame_size: DEFAULT_FRAME_SIZE,
            debug_color: DEFAULT_DEBUG_COLOR,
            mesh_color: DEFAULT_COLOR,
            color_by_data: None,
            log_input_nodes: false,
            log_output_nodes: false,
            log_render_data: false,
            log_durations: false,
        }
    }
}

impl MorphConfig {
    /// Loads `<base>/morph.json`, falling back to defaults when it does not exist
    pub fn load(base: &Path) -> Result<Self> {
        let path = base.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            log::info!("No {} in {}, using defaults", CONFIG_FILE_NAME, base.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| MorphError::io(&path, e))?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, base: &Path) -> Result<()> {
        let path = base.join(CONFIG_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| MorphError::io(&path, e))
    }

    pub fn shader_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.shader_dir)
    }

    pub fn zygote_samples(&self) -> UVec2 {
        UVec2::splat(self.zygote_samples)
    }

    pub fn zygote_options(&self) -> ZygoteOptions {
        ZygoteOptions {
            shape: self.zygote_shape,
            with_faces: self.with_faces,
            jitter: self.jitter,
            seed: self.seed,
        }
    }

    pub fn render_flags(&self) -> RenderFlags {
        RenderFlags {
            faces: self.render_faces,
            wireframe: self.render_wireframe,
            points: self.render_points,
        }
    }

    pub fn mesh_coloring(&self) -> MeshColoring {
        match self.color_by_data {
            Some([min, max]) => MeshColoring::Heat { min, max },
            None => MeshColoring::Constant(self.mesh_color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MorphConfig::default();
        assert_eq!(config.max_nodes, 1_562_500);
        assert_eq!(config.zygote_samples, 10);
        assert_eq!(config.num_iters, 0);
        assert_eq!(config.backend, Backend::Gpu);
        assert_eq!(config.frame_size, [1300, 700]);
        assert_eq!(config.morph_programs, vec!["growth.wgsl", "identity.wgsl"]);
        assert!(config.render_faces && config.render_points && config.render_wireframe);
        assert!(!config.log_durations);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let config = MorphConfig::from_json(
            r#"{ "backend": "host", "num_iters": 5, "zygote_shape": "sphere",
                 "unif_overrides": { "spring_len": [0.25] } }"#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Host);
        assert_eq!(config.num_iters, 5);
        assert_eq!(config.zygote_shape, ZygoteShape::Sphere);
        assert_eq!(config.unif_overrides["spring_len"], vec![0.25]);
        assert_eq!(config.zygote_samples, 10);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = MorphConfig::from_json("{ \"num_iters\": \"many\" }").unwrap_err();
        assert!(matches!(err, crate::error::MorphError::Config(_)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = std::env::temp_dir().join("morph_config_missing");
        let _ = std::fs::create_dir_all(&dir);
        let _ = std::fs::remove_file(dir.join(CONFIG_FILE_NAME));
        assert_eq!(MorphConfig::load(&dir).unwrap(), MorphConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join("morph_config_saved");
        std::fs::create_dir_all(&dir).unwrap();
        let config = MorphConfig {
            num_iters: 12,
            color_by_data: Some([0.0, 10.0]),
            ..Default::default()
        };
        config.save(&dir).unwrap();
        assert_eq!(MorphConfig::load(&dir).unwrap(), config);
    }

    #[test]
    fn test_mesh_coloring() {
        let mut config = MorphConfig::default();
        assert_eq!(config.mesh_coloring(), MeshColoring::Constant(DEFAULT_COLOR));
        config.color_by_data = Some([1.0, 2.0]);
        assert_eq!(config.mesh_coloring(), MeshColoring::Heat { min: 1.0, max: 2.0 });
    }
}
