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

//! One visual concern of a viewport: which layers, which passes, which filter.

use super::render_style::{RenderStyleData, RenderStyleProvider, ViewportConfig};
use crate::buffer_lane::PrimitiveInterfaceSettings;
use crate::forward_lane::{ForwardRenderer, PipelinePass, RenderParameters};
use crate::shadow_lane::LightProjections;
use penumbra_core::item::ItemFilter;
use penumbra_core::math::{UVec4, Vec4};
use penumbra_core::renderer::{GraphicsDevice, RenderPass, ResourceError, ShaderStages, Viewport};
use penumbra_core::scene::{Camera, LayerId, Mesh, MeshMemory, PrimitiveMode, SceneRoot, SceneView};
use penumbra_telemetry::RenderStats;
use serde::Serialize;
use std::sync::Arc;

/// Everything a composition pass needs to draw into one viewport.
pub struct ViewportRenderContext<'a, 'p> {
    /// Device the per-frame buffers are written through.
    pub device: &'a dyn GraphicsDevice,
    /// The viewport's open render pass.
    pub pass: &'a mut dyn RenderPass<'p>,
    /// Renderer owning the per-frame buffers.
    pub forward_renderer: &'a mut ForwardRenderer,
    /// Shared vertex and index buffers.
    pub mesh_memory: &'a MeshMemory,
    /// The rendered scene view.
    pub scene_view: &'a SceneView,
    /// The viewing camera, if any.
    pub camera: Option<&'a Camera>,
    /// Shadow maps of the scene view, if a shadow node produced them.
    pub light_projections: Option<&'a LightProjections>,
    /// Target rectangle and depth convention.
    pub viewport: Viewport,
    /// Render styles and selection highlight of the viewport.
    pub viewport_config: &'a ViewportConfig,
    /// Program replacing the passes' own, for passes that allow it.
    pub override_shader_stages: Option<&'a ShaderStages>,
    /// Program used when a pass's program failed to build.
    pub error_shader_stages: Option<&'a ShaderStages>,
    /// Joints highlighted by the debug joint colors.
    pub debug_joint_indices: UVec4,
    /// Debug joint color table.
    pub debug_joint_colors: &'a [Vec4],
    /// Host time of the frame, in seconds.
    pub time_seconds: f64,
    /// Frame counters.
    pub stats: &'a mut RenderStats,
}

/// Debug view of a [`CompositionPass`], for tooling panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionPassSummary {
    /// Pass name.
    pub name: String,
    /// Whether the pass draws.
    pub enabled: bool,
    /// Pipeline names, in draw order.
    pub pipelines: Vec<String>,
    /// Drawn index stream.
    pub primitive_mode: String,
    /// Flags that must all be set.
    pub require_all_bits_set: String,
    /// Flags of which one must be set.
    pub require_at_least_one_bit_set: String,
    /// Flags that must all be clear.
    pub require_all_bits_clear: String,
    /// Flags of which one must be clear.
    pub require_at_least_one_bit_clear: String,
    /// Whether the viewport's program override applies.
    pub allow_shader_stages_override: bool,
}

/// A filtered draw of some mesh layers (or a full-screen draw) with a list of
/// pipeline passes.
#[derive(Debug)]
pub struct CompositionPass {
    name: String,
    enabled: bool,
    /// Drawn index stream.
    pub primitive_mode: PrimitiveMode,
    /// Mesh layers drawn, in order. Empty draws `non_mesh_vertex_count` generated vertices.
    pub mesh_layers: Vec<LayerId>,
    /// Vertex count of the full-screen draw.
    pub non_mesh_vertex_count: u32,
    /// Pipeline passes, drawn in order.
    pub passes: Vec<Arc<PipelinePass>>,
    /// Mesh filter.
    pub filter: ItemFilter,
    /// Scene drawn instead of the viewport's.
    pub override_scene_root: Option<Arc<SceneRoot>>,
    /// Settings used instead of the render style's.
    pub primitive_settings: Option<PrimitiveInterfaceSettings>,
    /// Render style source. Without one every primitive mode is drawn.
    pub render_style: Option<RenderStyleProvider>,
    /// Whether the viewport's program override applies to this pass.
    pub allow_shader_stages_override: bool,
}

impl CompositionPass {
    /// An enabled pass drawing nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            primitive_mode: PrimitiveMode::PolygonFill,
            mesh_layers: Vec::new(),
            non_mesh_vertex_count: 0,
            passes: Vec::new(),
            filter: ItemFilter::default(),
            override_scene_root: None,
            primitive_settings: None,
            render_style: None,
            allow_shader_stages_override: true,
        }
    }

    /// Pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the pass draws.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the pass.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn resolve_settings(&self, style: Option<&RenderStyleData>) -> PrimitiveInterfaceSettings {
        self.primitive_settings
            .or_else(|| style.map(|s| s.primitive_settings(self.primitive_mode)))
            .unwrap_or_default()
    }

    /// Draws the pass into the viewport of `context`.
    ///
    /// Skipped passes (disabled, no scene, style without this mode, no
    /// resolvable layer) record nothing.
    pub fn render(&self, context: &mut ViewportRenderContext<'_, '_>) -> Result<(), ResourceError> {
        if !self.enabled {
            context.stats.composition_passes_skipped += 1;
            return Ok(());
        }

        let scene_view = context.scene_view;
        let Some(scene_root) = self
            .override_scene_root
            .as_ref()
            .or_else(|| scene_view.scene_root())
        else {
            log::error!("CompositionPass({}): Missing scene root, cannot render", self.name);
            context.stats.composition_passes_skipped += 1;
            return Ok(());
        };

        let viewport_config = context.viewport_config;
        let style = self
            .render_style
            .as_ref()
            .map(|provider| provider.resolve(viewport_config));
        if style
            .as_ref()
            .is_some_and(|s| !s.is_primitive_mode_enabled(self.primitive_mode))
        {
            log::trace!(
                "CompositionPass({}): {} is disabled by the render style",
                self.name,
                self.primitive_mode.as_str()
            );
            context.stats.composition_passes_skipped += 1;
            return Ok(());
        }
        let settings = self.resolve_settings(style.as_ref());
        let override_shader_stages = context
            .override_shader_stages
            .filter(|_| self.allow_shader_stages_override);

        if self.mesh_layers.is_empty() {
            log::debug!("CompositionPass({}): full-screen draw", self.name);
            let parameters = RenderParameters {
                camera: context.camera,
                non_mesh_vertex_count: self.non_mesh_vertex_count,
                passes: &self.passes,
                primitive_mode: self.primitive_mode,
                primitive_settings: settings,
                override_shader_stages,
                error_shader_stages: context.error_shader_stages,
                ..RenderParameters::new(context.mesh_memory, context.viewport, &self.name)
            };
            context.forward_renderer.draw_primitives(
                context.device,
                &mut *context.pass,
                &parameters,
                &mut *context.stats,
            )?;
            context.stats.composition_passes_rendered += 1;
            return Ok(());
        }

        let mut mesh_spans: Vec<&[Arc<Mesh>]> = Vec::with_capacity(self.mesh_layers.len());
        for id in &self.mesh_layers {
            match scene_root.mesh_layer(*id) {
                Some(layer) => {
                    log::trace!(
                        "CompositionPass({}): adding mesh layer {} with {} meshes",
                        self.name,
                        layer.name,
                        layer.meshes.len()
                    );
                    mesh_spans.push(&layer.meshes);
                }
                None => {
                    log::warn!("CompositionPass({}): mesh layer {:?} not found", self.name, id)
                }
            }
        }
        if mesh_spans.is_empty() {
            context.stats.composition_passes_skipped += 1;
            return Ok(());
        }

        log::trace!(
            "CompositionPass({}): {} passes, mode {}, filter {}",
            self.name,
            self.passes.len(),
            self.primitive_mode.as_str(),
            self.filter.describe()
        );
        let light_layer = scene_root.light_layer();
        let parameters = RenderParameters {
            ambient_light: light_layer.ambient_light,
            camera: context.camera,
            light_projections: context.light_projections,
            lights: &light_layer.lights,
            skins: scene_root.skins(),
            materials: scene_root.materials(),
            mesh_spans: &mesh_spans,
            passes: &self.passes,
            primitive_mode: self.primitive_mode,
            primitive_settings: settings,
            filter: self.filter,
            override_shader_stages,
            error_shader_stages: context.error_shader_stages,
            debug_joint_indices: context.debug_joint_indices,
            debug_joint_colors: context.debug_joint_colors,
            ..RenderParameters::new(context.mesh_memory, context.viewport, &self.name)
        };
        context.forward_renderer.render(
            context.device,
            &mut *context.pass,
            &parameters,
            &mut *context.stats,
        )?;
        context.stats.composition_passes_rendered += 1;
        Ok(())
    }

    /// Debug view of the pass.
    pub fn describe(&self) -> CompositionPassSummary {
        CompositionPassSummary {
            name: self.name.clone(),
            enabled: self.enabled,
            pipelines: self.passes.iter().map(|p| p.name().to_string()).collect(),
            primitive_mode: self.primitive_mode.as_str().to_string(),
            require_all_bits_set: self.filter.require_all_bits_set.to_names(),
            require_at_least_one_bit_set: self.filter.require_at_least_one_bit_set.to_names(),
            require_all_bits_clear: self.filter.require_all_bits_clear.to_names(),
            require_at_least_one_bit_clear: self.filter.require_at_least_one_bit_clear.to_names(),
            allow_shader_stages_override: self.allow_shader_stages_override,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mesh_with_counts, test_mesh_memory, test_pipeline_pass, test_stages};
    use penumbra_core::item::ItemFlags;
    use penumbra_core::renderer::headless::{HeadlessDevice, RecordedCommand};
    use penumbra_core::renderer::RenderPassDescriptor;
    use penumbra_core::RendererConfig;

    struct Fixture {
        device: HeadlessDevice,
        renderer: ForwardRenderer,
        memory: MeshMemory,
        view: SceneView,
        config: ViewportConfig,
        override_stages: Option<ShaderStages>,
    }

    fn scene_root() -> Arc<SceneRoot> {
        let mut root = SceneRoot::new("scene");
        if let Some(layer) = root.mesh_layer_mut(LayerId::CONTENT) {
            layer
                .meshes
                .push(Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[3, 3])));
        }
        Arc::new(root)
    }

    fn fixture(root: Option<Arc<SceneRoot>>) -> Fixture {
        let device = HeadlessDevice::new();
        let renderer = ForwardRenderer::new(&device, &RendererConfig::default()).unwrap();
        Fixture {
            device,
            renderer,
            memory: test_mesh_memory(),
            view: SceneView::new("view", root, None),
            config: ViewportConfig::default(),
            override_stages: None,
        }
    }

    fn run(fixture: &mut Fixture, pass: &CompositionPass) -> RenderStats {
        let mut stats = RenderStats::default();
        let mut encoder = fixture.device.create_command_encoder(Some("test"));
        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("viewport"),
                color_attachments: &[],
                depth_stencil_attachment: None,
            });
            let mut context = ViewportRenderContext {
                device: &fixture.device,
                pass: render_pass.as_mut(),
                forward_renderer: &mut fixture.renderer,
                mesh_memory: &fixture.memory,
                scene_view: &fixture.view,
                camera: None,
                light_projections: None,
                viewport: Viewport::default(),
                viewport_config: &fixture.config,
                override_shader_stages: fixture.override_stages.as_ref(),
                error_shader_stages: None,
                debug_joint_indices: UVec4::ZERO,
                debug_joint_colors: &[],
                time_seconds: 0.0,
                stats: &mut stats,
            };
            pass.render(&mut context).unwrap();
        }
        stats
    }

    fn recorded_inside_pass(device: &HeadlessDevice) -> usize {
        device.count_commands(|c| {
            !matches!(
                c,
                RecordedCommand::BeginRenderPass { .. } | RecordedCommand::EndRenderPass
            )
        })
    }

    fn content_pass(device: &HeadlessDevice) -> CompositionPass {
        let mut pass = CompositionPass::new("content");
        pass.mesh_layers = vec![LayerId::CONTENT];
        pass.filter = ItemFilter::require_all(ItemFlags::VISIBLE);
        pass.passes = vec![test_pipeline_pass(device, "fill", Some(test_stages("standard", true)))];
        pass
    }

    #[test]
    fn test_disabled_pass_records_nothing() {
        let mut fixture = fixture(Some(scene_root()));
        let mut pass = content_pass(&fixture.device);
        pass.set_enabled(false);
        assert!(!pass.is_enabled());

        let stats = run(&mut fixture, &pass);
        assert_eq!(recorded_inside_pass(&fixture.device), 0);
        assert_eq!(stats.composition_passes_skipped, 1);
        assert_eq!(stats.composition_passes_rendered, 0);
    }

    #[test]
    fn test_missing_layers_are_skipped() {
        let mut fixture = fixture(Some(scene_root()));
        let mut pass = content_pass(&fixture.device);
        pass.mesh_layers = vec![LayerId(42), LayerId::CONTENT];

        let stats = run(&mut fixture, &pass);
        assert_eq!(fixture.device.multi_draw_count(), 1);
        assert_eq!(stats.indirect_draws, 2);
        assert_eq!(stats.composition_passes_rendered, 1);

        fixture.device.clear_commands();
        pass.mesh_layers = vec![LayerId(42)];
        let stats = run(&mut fixture, &pass);
        assert_eq!(recorded_inside_pass(&fixture.device), 0);
        assert_eq!(stats.composition_passes_skipped, 1);
    }

    #[test]
    fn test_scene_root_resolution() {
        let mut fixture = fixture(None);
        let mut pass = content_pass(&fixture.device);

        let stats = run(&mut fixture, &pass);
        assert_eq!(recorded_inside_pass(&fixture.device), 0);
        assert_eq!(stats.composition_passes_skipped, 1);

        pass.override_scene_root = Some(scene_root());
        let stats = run(&mut fixture, &pass);
        assert_eq!(fixture.device.multi_draw_count(), 1);
        assert_eq!(stats.composition_passes_rendered, 1);
    }

    #[test]
    fn test_render_style_gates_primitive_mode() {
        let mut fixture = fixture(Some(scene_root()));
        let mut pass = content_pass(&fixture.device);
        pass.primitive_mode = PrimitiveMode::EdgeLines;
        pass.render_style = Some(RenderStyleProvider::NotSelected);

        let stats = run(&mut fixture, &pass);
        assert_eq!(recorded_inside_pass(&fixture.device), 0);
        assert_eq!(stats.composition_passes_skipped, 1);

        fixture.config.render_style_not_selected.edge_lines = true;
        let stats = run(&mut fixture, &pass);
        assert_eq!(stats.composition_passes_rendered, 1);
    }

    #[test]
    fn test_full_screen_pass_draws_generated_vertices() {
        let mut fixture = fixture(Some(scene_root()));
        let mut pass = CompositionPass::new("grid");
        pass.non_mesh_vertex_count = 12;
        pass.passes = vec![test_pipeline_pass(&fixture.device, "grid", Some(test_stages("grid", true)))];

        let stats = run(&mut fixture, &pass);
        assert!(fixture.device.commands().contains(&RecordedCommand::Draw {
            vertices: 0..12,
            instances: 0..1,
        }));
        assert_eq!(fixture.device.multi_draw_count(), 0);
        assert_eq!(stats.draw_calls, 1);
    }

    #[test]
    fn test_shader_override_needs_permission() {
        let mut fixture = fixture(Some(scene_root()));
        fixture.override_stages = Some(test_stages("debug normals", true));
        let mut pass = content_pass(&fixture.device);
        let overrides = |device: &HeadlessDevice| -> Vec<Option<String>> {
            device
                .commands()
                .into_iter()
                .filter_map(|c| match c {
                    RecordedCommand::SetPipeline {
                        shader_override, ..
                    } => Some(shader_override),
                    _ => None,
                })
                .collect()
        };

        run(&mut fixture, &pass);
        assert_eq!(overrides(&fixture.device), vec![Some("debug normals".to_string())]);

        fixture.device.clear_commands();
        pass.allow_shader_stages_override = false;
        run(&mut fixture, &pass);
        assert_eq!(overrides(&fixture.device), vec![None]);
    }

    #[test]
    fn test_settings_precedence() {
        let mut pass = CompositionPass::new("edges");
        pass.primitive_mode = PrimitiveMode::EdgeLines;
        let style = RenderStyleData {
            line_width: 7.0,
            ..Default::default()
        };

        assert_eq!(pass.resolve_settings(None), PrimitiveInterfaceSettings::default());
        assert_eq!(pass.resolve_settings(Some(&style)).constant_size, 7.0);

        let explicit = PrimitiveInterfaceSettings {
            constant_size: 2.0,
            ..Default::default()
        };
        pass.primitive_settings = Some(explicit);
        assert_eq!(pass.resolve_settings(Some(&style)), explicit);
    }

    #[test]
    fn test_describe_lists_pipelines_and_filter() {
        let device = HeadlessDevice::new();
        let mut pass = content_pass(&device);
        pass.filter.require_all_bits_clear = ItemFlags::SELECTED;

        let summary = pass.describe();
        assert_eq!(summary.name, "content");
        assert!(summary.enabled);
        assert_eq!(summary.pipelines, vec!["fill"]);
        assert_eq!(summary.primitive_mode, "polygon_fill");
        assert_eq!(summary.require_all_bits_set, "visible");
        assert_eq!(summary.require_all_bits_clear, "selected");
        assert_eq!(summary.require_at_least_one_bit_set, "(none)");
    }
}
