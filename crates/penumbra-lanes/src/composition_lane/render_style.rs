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

//! Per-viewport render styles and the selection highlight.

use crate::buffer_lane::{PrimitiveColorSource, PrimitiveInterfaceSettings, PrimitiveSizeSource};
use penumbra_core::math::{mix, triangle_wave, Vec4};
use penumbra_core::scene::PrimitiveMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which primitive modes a viewport draws, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyleData {
    /// Draw filled polygons.
    pub polygon_fill: bool,
    /// Draw polygon edges.
    pub edge_lines: bool,
    /// Draw corner normals.
    pub corner_normals: bool,
    /// Draw polygon corners.
    pub corner_points: bool,
    /// Draw polygon centroids.
    pub polygon_centroids: bool,
    /// Edge line width.
    pub line_width: f32,
    /// Constant edge color.
    pub line_color: Vec4,
    /// Color source of edge lines.
    pub edge_lines_color_source: PrimitiveColorSource,
    /// Constant corner color.
    pub corner_color: Vec4,
    /// Color source of corner points.
    pub corner_points_color_source: PrimitiveColorSource,
    /// Constant centroid color.
    pub centroid_color: Vec4,
    /// Color source of polygon centroids.
    pub polygon_centroids_color_source: PrimitiveColorSource,
    /// Size of corner and centroid points.
    pub point_size: f32,
}

impl Default for RenderStyleData {
    fn default() -> Self {
        Self {
            polygon_fill: true,
            edge_lines: false,
            corner_normals: false,
            corner_points: false,
            polygon_centroids: false,
            line_width: 1.0,
            line_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_lines_color_source: PrimitiveColorSource::ConstantColor,
            corner_color: Vec4::new(1.0, 0.5, 0.0, 1.0),
            corner_points_color_source: PrimitiveColorSource::ConstantColor,
            centroid_color: Vec4::new(0.0, 0.0, 1.0, 1.0),
            polygon_centroids_color_source: PrimitiveColorSource::ConstantColor,
            point_size: 4.0,
        }
    }
}

impl RenderStyleData {
    /// Whether passes drawing `mode` run under this style.
    pub fn is_primitive_mode_enabled(&self, mode: PrimitiveMode) -> bool {
        match mode {
            PrimitiveMode::PolygonFill => self.polygon_fill,
            PrimitiveMode::EdgeLines => self.edge_lines,
            PrimitiveMode::CornerPoints => self.corner_points,
            PrimitiveMode::CornerNormals => self.corner_normals,
            PrimitiveMode::PolygonCentroids => self.polygon_centroids,
        }
    }

    /// Primitive record settings for passes drawing `mode`.
    pub fn primitive_settings(&self, mode: PrimitiveMode) -> PrimitiveInterfaceSettings {
        let (color_source, color, size) = match mode {
            PrimitiveMode::PolygonFill => return PrimitiveInterfaceSettings::default(),
            PrimitiveMode::EdgeLines | PrimitiveMode::CornerNormals => {
                (self.edge_lines_color_source, self.line_color, self.line_width)
            }
            PrimitiveMode::CornerPoints => {
                (self.corner_points_color_source, self.corner_color, self.point_size)
            }
            PrimitiveMode::PolygonCentroids => (
                self.polygon_centroids_color_source,
                self.centroid_color,
                self.point_size,
            ),
        };
        PrimitiveInterfaceSettings {
            color_source,
            constant_color0: color,
            constant_color1: color,
            size_source: PrimitiveSizeSource::ConstantSize,
            constant_size: size,
        }
    }
}

/// Per-viewport rendering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Style of items that are not selected.
    pub render_style_not_selected: RenderStyleData,
    /// Style of selected items.
    pub render_style_selected: RenderStyleData,
    /// Selection outline color at the bottom of the pulse.
    pub selection_highlight_low: Vec4,
    /// Selection outline color at the top of the pulse.
    pub selection_highlight_high: Vec4,
    /// Selection outline width at the bottom of the pulse.
    pub selection_highlight_width_low: f32,
    /// Selection outline width at the top of the pulse.
    pub selection_highlight_width_high: f32,
    /// Pulses per second.
    pub selection_highlight_frequency: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            render_style_not_selected: RenderStyleData::default(),
            render_style_selected: RenderStyleData {
                line_color: Vec4::new(1.0, 0.6, 0.0, 1.0),
                ..RenderStyleData::default()
            },
            selection_highlight_low: Vec4::new(0.0, 0.0, 2.0, 1.0),
            selection_highlight_high: Vec4::new(2.0, 1.0, 0.0, 1.0),
            selection_highlight_width_low: 4.0,
            selection_highlight_width_high: 6.0,
            selection_highlight_frequency: 1.0,
        }
    }
}

impl ViewportConfig {
    /// Selection outline settings at host time `time_seconds`.
    ///
    /// Color and width follow a triangle wave between the low and high values,
    /// one period per `1 / selection_highlight_frequency` seconds.
    pub fn selection_highlight_settings(&self, time_seconds: f64) -> PrimitiveInterfaceSettings {
        let t2 = self.selection_highlight_phase(time_seconds);
        PrimitiveInterfaceSettings {
            color_source: PrimitiveColorSource::ConstantColor,
            constant_color0: self
                .selection_highlight_low
                .lerp(self.selection_highlight_high, t2),
            constant_color1: Vec4::new(0.2, 0.5, 1.0, 1.0),
            size_source: PrimitiveSizeSource::ConstantSize,
            constant_size: mix(
                self.selection_highlight_width_low,
                self.selection_highlight_width_high,
                t2,
            ),
        }
    }

    /// Interpolation factor of the selection pulse, in `[0, 1]`.
    pub fn selection_highlight_phase(&self, time_seconds: f64) -> f32 {
        if self.selection_highlight_frequency <= 0.0 {
            return 0.0;
        }
        let period = 1.0 / self.selection_highlight_frequency;
        let t1 = time_seconds.rem_euclid(period as f64) as f32;
        0.5 + triangle_wave(t1, period) * 0.5
    }
}

/// Chooses the render style of a composition pass.
#[derive(Clone)]
pub enum RenderStyleProvider {
    /// [`ViewportConfig::render_style_not_selected`].
    NotSelected,
    /// [`ViewportConfig::render_style_selected`].
    Selected,
    /// A style computed from the viewport configuration.
    Custom(Arc<dyn Fn(&ViewportConfig) -> RenderStyleData + Send + Sync>),
}

impl RenderStyleProvider {
    /// The style this provider picks from `config`.
    pub fn resolve(&self, config: &ViewportConfig) -> RenderStyleData {
        match self {
            RenderStyleProvider::NotSelected => config.render_style_not_selected.clone(),
            RenderStyleProvider::Selected => config.render_style_selected.clone(),
            RenderStyleProvider::Custom(provider) => provider(config),
        }
    }
}

impl fmt::Debug for RenderStyleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStyleProvider::NotSelected => f.write_str("NotSelected"),
            RenderStyleProvider::Selected => f.write_str("Selected"),
            RenderStyleProvider::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mode_toggles() {
        let style = RenderStyleData {
            edge_lines: true,
            polygon_fill: false,
            ..Default::default()
        };
        assert!(style.is_primitive_mode_enabled(PrimitiveMode::EdgeLines));
        assert!(!style.is_primitive_mode_enabled(PrimitiveMode::PolygonFill));
        assert!(!style.is_primitive_mode_enabled(PrimitiveMode::CornerPoints));
    }

    #[test]
    fn test_edge_settings_use_line_style() {
        let style = RenderStyleData {
            line_width: 3.0,
            line_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            ..Default::default()
        };
        let settings = style.primitive_settings(PrimitiveMode::EdgeLines);
        assert_eq!(settings.constant_color0, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_relative_eq!(settings.constant_size, 3.0);
        assert_eq!(
            style.primitive_settings(PrimitiveMode::PolygonFill),
            PrimitiveInterfaceSettings::default()
        );
    }

    #[test]
    fn test_selection_pulse_spans_low_to_high() {
        let config = ViewportConfig {
            selection_highlight_frequency: 2.0,
            ..Default::default()
        };
        // Triangle wave: -1 at t = 0, +1 at half a period.
        let low = config.selection_highlight_settings(0.0);
        assert_relative_eq!(low.constant_size, config.selection_highlight_width_low);
        assert_eq!(low.constant_color0, config.selection_highlight_low);

        let high = config.selection_highlight_settings(0.25);
        assert_relative_eq!(high.constant_size, config.selection_highlight_width_high, epsilon = 1e-5);

        let next_period = config.selection_highlight_settings(0.5 + 0.125);
        let same_phase = config.selection_highlight_settings(0.125);
        assert_relative_eq!(next_period.constant_size, same_phase.constant_size, epsilon = 1e-5);
        for t in [0.0, 0.1, 0.37, 1.9, 12.345] {
            let phase = config.selection_highlight_phase(t);
            assert!((0.0..=1.0).contains(&phase), "{t}: {phase}");
        }
    }

    #[test]
    fn test_config_json_defaults() {
        let config: ViewportConfig =
            serde_json::from_str(r#"{ "selection_highlight_frequency": 3.0 }"#).unwrap();
        assert_relative_eq!(config.selection_highlight_frequency, 3.0);
        assert_eq!(config.render_style_selected, ViewportConfig::default().render_style_selected);

        let text = serde_json::to_string(&config).unwrap();
        let back: ViewportConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_provider_resolution() {
        let config = ViewportConfig::default();
        assert_eq!(
            RenderStyleProvider::Selected.resolve(&config),
            config.render_style_selected
        );
        let custom = RenderStyleProvider::Custom(Arc::new(|_| RenderStyleData {
            polygon_fill: false,
            ..Default::default()
        }));
        assert!(!custom.resolve(&config).polygon_fill);
    }
}
