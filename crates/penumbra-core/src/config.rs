// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renderer capacity limits and graphics presets, loaded from JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An error raised while loading or saving a [`RendererConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(std::io::Error),
    /// The configuration text is not valid JSON for a [`RendererConfig`].
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read renderer config: {e}"),
            ConfigError::Parse(e) => write!(f, "Invalid renderer config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Quality settings that can change at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsPreset {
    /// Display name of the preset.
    pub name: String,
    /// Whether shadow maps are rendered.
    pub shadow_enable: bool,
    /// Width and height of every shadow map layer.
    pub shadow_resolution: u32,
    /// Number of shadow map layers, one per shadow casting light.
    pub shadow_light_count: u32,
    /// Requested depth precision of the shadow maps.
    pub shadow_depth_bits: u32,
    /// Whether depth is mapped near = 1, far = 0.
    pub reverse_depth: bool,
}

impl Default for GraphicsPreset {
    fn default() -> Self {
        Self {
            name: "Medium".to_string(),
            shadow_enable: true,
            shadow_resolution: 2048,
            shadow_light_count: 4,
            shadow_depth_bits: 32,
            reverse_depth: true,
        }
    }
}

/// Capacity limits of the per-frame GPU buffers and the active graphics preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Materials per frame.
    pub max_material_count: usize,
    /// Lights per frame.
    pub max_light_count: usize,
    /// Cameras per frame.
    pub max_camera_count: usize,
    /// Primitive records per frame, summed over every batch packed that frame.
    pub max_primitive_count: usize,
    /// Indirect draw commands per frame, summed over every batch packed that frame.
    pub max_draw_count: usize,
    /// Joints per frame.
    pub max_joint_count: usize,
    /// Entries of the debug joint color table.
    pub max_debug_joint_colors: usize,
    /// The active graphics preset.
    pub graphics_preset: GraphicsPreset,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_material_count: 256,
            max_light_count: 40,
            max_camera_count: 20,
            max_primitive_count: 8000,
            max_draw_count: 8000,
            max_joint_count: 1000,
            max_debug_joint_colors: 32,
            graphics_preset: GraphicsPreset::default(),
        }
    }
}

impl RendererConfig {
    /// Parses a configuration; missing fields take their default value.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut config = RendererConfig::default();
        config.max_light_count = 7;
        config.graphics_preset.shadow_resolution = 512;

        let text = config.to_json_string().unwrap();
        let parsed = RendererConfig::from_json_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed = RendererConfig::from_json_str(
            r#"{ "max_draw_count": 12, "graphics_preset": { "shadow_enable": false } }"#,
        )
        .unwrap();

        assert_eq!(parsed.max_draw_count, 12);
        assert_eq!(parsed.max_material_count, 256);
        assert!(!parsed.graphics_preset.shadow_enable);
        assert_eq!(parsed.graphics_preset.shadow_resolution, 2048);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let result = RendererConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = RendererConfig::from_json_file("/nonexistent/penumbra/renderer.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
