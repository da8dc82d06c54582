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

//! Defines [`AppRendering`], the orchestrator a host application drives once per frame.
//!
//! It owns the forward renderer, the pipeline passes, the ordered composition
//! passes of a viewport and one shadow render node per scene view. A frame is:
//!
//! 1. [`AppRendering::begin_frame`]
//! 2. [`AppRendering::execute_graph`] (shadow maps)
//! 3. [`AppRendering::render_viewport_main`] and
//!    [`AppRendering::render_viewport_renderables`] for every viewport
//! 4. [`AppRendering::end_frame`]

use crate::buffer_lane::{PrimitiveColorSource, PrimitiveInterfaceSettings};
use crate::composition_lane::{
    CompositionPass, RenderStyleProvider, ViewportConfig, ViewportRenderContext,
};
use crate::error::FrameError;
use crate::forward_lane::{ForwardRenderer, PipelinePass};
use crate::graph_lane::{FrameContext, RenderGraph, RenderGraphNode, ResourceKey};
use crate::shadow_lane::{DepthVisualizationNode, LightProjections, ShadowRenderNode};
use penumbra_core::graph::NodeId;
use penumbra_core::item::{ItemFilter, ItemFlags};
use penumbra_core::math::{UVec4, Vec4};
use penumbra_core::renderer::{
    BlendMode, CommandEncoder, CompareFunction, CullMode, DepthStencilState, FrontFace,
    GraphicsDevice, PrimitiveTopology, RenderPass, RenderPipelineDescriptor, ResourceError,
    ShaderStages, StencilOperation, StencilState, TextureFormat, Viewport,
};
use penumbra_core::scene::{LayerId, MeshMemory, PrimitiveMode, SceneView, SceneViewId, SceneViews};
use penumbra_core::{GraphicsPreset, RendererConfig};
use penumbra_telemetry::{RenderStats, ScopedTimer, Stopwatch, TelemetryService};
use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Stencil bit marking selected geometry; the outline draws where it is clear.
const SELECTION_STENCIL_BIT: u32 = 0b1000_0000;

/// Stencil bits counting hidden line overdraw.
const LINE_STENCIL_MASK: u32 = 0b0111_1111;

/// Vertices of the infinite grid plane: four triangles.
const GRID_VERTEX_COUNT: u32 = 12;

/// Interval of the periodic telemetry summary.
const TELEMETRY_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Number of frames kept in the telemetry history.
const TELEMETRY_HISTORY: usize = 240;

const DEBUG_JOINT_COLORS: [[f32; 3]; 24] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.5, 0.0, 0.0],
    [0.0, 0.5, 0.0],
    [0.0, 0.0, 0.5],
    [0.5, 0.5, 0.0],
    [0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5],
    [0.5, 0.5, 0.5],
    [1.0, 0.5, 0.0],
    [1.0, 0.0, 0.5],
    [0.5, 1.0, 0.0],
    [0.0, 1.0, 0.5],
    [0.5, 0.0, 1.0],
    [0.0, 0.5, 1.0],
    [1.0, 1.0, 0.5],
    [0.5, 1.0, 1.0],
    [1.0, 0.5, 1.0],
];

/// Shader programs used by the built-in pipeline passes.
///
/// A missing program disables the passes that use it.
#[derive(Debug, Clone, Default)]
pub struct Programs {
    /// Lit, textured meshes.
    pub standard: Option<ShaderStages>,
    /// Wide lines, for edges and normals.
    pub wide_lines: Option<ShaderStages>,
    /// Points, for corners and centroids.
    pub points: Option<ShaderStages>,
    /// Expanded triangles for the selection outline.
    pub outline: Option<ShaderStages>,
    /// Full-screen sky.
    pub sky: Option<ShaderStages>,
    /// Infinite ground grid.
    pub grid: Option<ShaderStages>,
    /// Brush previews.
    pub brush: Option<ShaderStages>,
    /// Unlit textured meshes, for render targets shown in the scene.
    pub textured: Option<ShaderStages>,
    /// Shadow map debug view.
    pub depth_visualization: Option<ShaderStages>,
    /// Drawn in place of programs that failed to build.
    pub error: Option<ShaderStages>,
    /// Depth-only shadow map rendering.
    pub shadow_depth: Option<ShaderStages>,
}

/// Something drawn into a viewport after the composition passes.
pub trait Renderable: Send + Sync {
    /// Records the renderable's draws into the viewport's pass.
    fn render(&self, context: &mut ViewportRenderContext<'_, '_>);
}

/// The viewport-specific inputs of a viewport render.
pub struct ViewportTarget<'a, 'p> {
    /// The device buffers are written through.
    pub device: &'a dyn GraphicsDevice,
    /// The viewport's open render pass.
    pub pass: &'a mut dyn RenderPass<'p>,
    /// Id of the rendered scene view, used to find its shadow maps.
    pub scene_view_id: SceneViewId,
    /// The rendered scene view.
    pub scene_view: &'a SceneView,
    /// Target rectangle and depth convention.
    pub viewport: Viewport,
    /// Render styles and selection highlight of the viewport.
    pub viewport_config: &'a ViewportConfig,
    /// Debug program replacing the standard one, if any.
    pub override_shader_stages: Option<&'a ShaderStages>,
    /// Host time of the frame, in seconds.
    pub time_seconds: f64,
}

/// The built-in pipelines.
#[derive(Debug)]
struct PipelinePasses {
    fill_opaque_positive_determinant: Arc<PipelinePass>,
    fill_opaque_negative_determinant: Arc<PipelinePass>,
    fill_opaque_selected_positive_determinant: Arc<PipelinePass>,
    fill_opaque_selected_negative_determinant: Arc<PipelinePass>,
    fill_translucent: Arc<PipelinePass>,
    edge_lines: Arc<PipelinePass>,
    corner_points: Arc<PipelinePass>,
    polygon_centroids: Arc<PipelinePass>,
    outline: Arc<PipelinePass>,
    sky: Arc<PipelinePass>,
    grid: Arc<PipelinePass>,
    brush_back: Arc<PipelinePass>,
    brush_front: Arc<PipelinePass>,
    rendertarget_meshes: Arc<PipelinePass>,
}

fn stencil(
    compare: CompareFunction,
    pass_op: StencilOperation,
    reference: u32,
    read_mask: u32,
    write_mask: u32,
) -> Option<StencilState> {
    Some(StencilState {
        compare,
        pass_op,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        reference,
        read_mask,
        write_mask,
    })
}

impl PipelinePasses {
    fn new(
        device: &dyn GraphicsDevice,
        mesh_memory: &MeshMemory,
        programs: &Programs,
        reverse_depth: bool,
    ) -> Result<Self, ResourceError> {
        let depth = |write: bool, compare: CompareFunction, stencil: Option<StencilState>| {
            Some(DepthStencilState {
                format: TextureFormat::Depth24PlusStencil8,
                depth_write_enabled: write,
                depth_compare: compare,
                stencil,
            })
        };
        let closer = CompareFunction::depth_closer(reverse_depth);
        let closer_or_equal = CompareFunction::depth_closer_or_equal(reverse_depth);
        let base = RenderPipelineDescriptor {
            vertex_input: Some(mesh_memory.vertex_input),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            depth_stencil: depth(true, closer, None),
            color_format: Some(TextureFormat::Rgba16Float),
            color_writes_enabled: true,
            blend: BlendMode::Opaque,
            ..Default::default()
        };

        // Pipelines created so far, destroyed again if a later one fails.
        let mut created: Vec<Arc<PipelinePass>> = Vec::new();
        let mut create = |label: &'static str,
                          stages: &Option<ShaderStages>,
                          descriptor: RenderPipelineDescriptor<'static>|
         -> Result<Arc<PipelinePass>, ResourceError> {
            let descriptor = RenderPipelineDescriptor {
                label: Some(Cow::Borrowed(label)),
                shader_stages: stages.clone(),
                ..descriptor
            };
            match PipelinePass::new(device, &descriptor) {
                Ok(pass) => {
                    let pass = Arc::new(pass);
                    created.push(pass.clone());
                    Ok(pass)
                }
                Err(e) => {
                    log::error!("AppRendering: Failed to create pipeline '{}': {:?}", label, e);
                    for pass in created.drain(..) {
                        pass.destroy(device);
                    }
                    Err(e)
                }
            }
        };

        let selected_stencil = stencil(
            CompareFunction::Always,
            StencilOperation::Replace,
            SELECTION_STENCIL_BIT,
            0,
            SELECTION_STENCIL_BIT,
        );

        Ok(Self {
            fill_opaque_positive_determinant: create(
                "Polygon Fill Opaque Positive Determinant",
                &programs.standard,
                base.clone(),
            )?,
            fill_opaque_negative_determinant: create(
                "Polygon Fill Opaque Negative Determinant",
                &programs.standard,
                RenderPipelineDescriptor {
                    front_face: FrontFace::Cw,
                    ..base.clone()
                },
            )?,
            fill_opaque_selected_positive_determinant: create(
                "Polygon Fill Opaque Selected Positive Determinant",
                &programs.standard,
                RenderPipelineDescriptor {
                    depth_stencil: depth(true, closer, selected_stencil),
                    ..base.clone()
                },
            )?,
            fill_opaque_selected_negative_determinant: create(
                "Polygon Fill Opaque Selected Negative Determinant",
                &programs.standard,
                RenderPipelineDescriptor {
                    front_face: FrontFace::Cw,
                    depth_stencil: depth(true, closer, selected_stencil),
                    ..base.clone()
                },
            )?,
            fill_translucent: create(
                "Polygon Fill Translucent",
                &programs.standard,
                RenderPipelineDescriptor {
                    cull_mode: CullMode::None,
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            edge_lines: create(
                "Edge Lines",
                &programs.wide_lines,
                RenderPipelineDescriptor {
                    topology: PrimitiveTopology::LineList,
                    depth_stencil: depth(
                        true,
                        closer_or_equal,
                        stencil(
                            CompareFunction::Equal,
                            StencilOperation::IncrementClamp,
                            0,
                            LINE_STENCIL_MASK,
                            LINE_STENCIL_MASK,
                        ),
                    ),
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            corner_points: create(
                "Corner Points",
                &programs.points,
                RenderPipelineDescriptor {
                    topology: PrimitiveTopology::PointList,
                    ..base.clone()
                },
            )?,
            polygon_centroids: create(
                "Polygon Centroids",
                &programs.points,
                RenderPipelineDescriptor {
                    topology: PrimitiveTopology::PointList,
                    ..base.clone()
                },
            )?,
            outline: create(
                "Outline (selection/hover)",
                &programs.outline,
                RenderPipelineDescriptor {
                    depth_stencil: depth(
                        false,
                        CompareFunction::Always,
                        stencil(
                            CompareFunction::NotEqual,
                            StencilOperation::Replace,
                            SELECTION_STENCIL_BIT,
                            SELECTION_STENCIL_BIT,
                            SELECTION_STENCIL_BIT,
                        ),
                    ),
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            // The depth buffer is cleared to the far plane; the sky only
            // covers pixels no mesh touched.
            sky: create(
                "Sky",
                &programs.sky,
                RenderPipelineDescriptor {
                    vertex_input: None,
                    cull_mode: CullMode::None,
                    depth_stencil: depth(
                        false,
                        CompareFunction::Equal,
                        stencil(CompareFunction::Equal, StencilOperation::Keep, 0, 0xff, 0),
                    ),
                    ..base.clone()
                },
            )?,
            grid: create(
                "Grid",
                &programs.grid,
                RenderPipelineDescriptor {
                    vertex_input: None,
                    cull_mode: CullMode::None,
                    depth_stencil: depth(
                        true,
                        closer_or_equal,
                        stencil(
                            CompareFunction::NotEqual,
                            StencilOperation::Keep,
                            SELECTION_STENCIL_BIT,
                            SELECTION_STENCIL_BIT,
                            0,
                        ),
                    ),
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            brush_back: create(
                "Brush back faces",
                &programs.brush,
                RenderPipelineDescriptor {
                    cull_mode: CullMode::Front,
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            brush_front: create(
                "Brush front faces",
                &programs.brush,
                RenderPipelineDescriptor {
                    blend: BlendMode::Translucent,
                    ..base.clone()
                },
            )?,
            rendertarget_meshes: create(
                "Rendertarget Meshes",
                &programs.textured,
                RenderPipelineDescriptor {
                    blend: BlendMode::Translucent,
                    ..base
                },
            )?,
        })
    }

    /// The pipeline drawing `mode` with the given blending, selection and winding.
    fn for_mode(
        &self,
        mode: PrimitiveMode,
        blend: BlendMode,
        selected: bool,
        negative_determinant: bool,
    ) -> Arc<PipelinePass> {
        let pass = match (mode, blend) {
            (PrimitiveMode::PolygonFill, BlendMode::Translucent) => &self.fill_translucent,
            (PrimitiveMode::PolygonFill, BlendMode::Opaque) => {
                match (selected, negative_determinant) {
                    (false, false) => &self.fill_opaque_positive_determinant,
                    (false, true) => &self.fill_opaque_negative_determinant,
                    (true, false) => &self.fill_opaque_selected_positive_determinant,
                    (true, true) => &self.fill_opaque_selected_negative_determinant,
                }
            }
            (PrimitiveMode::EdgeLines | PrimitiveMode::CornerNormals, _) => &self.edge_lines,
            (PrimitiveMode::CornerPoints, _) => &self.corner_points,
            (PrimitiveMode::PolygonCentroids, _) => &self.polygon_centroids,
        };
        pass.clone()
    }

    fn all(&self) -> [&Arc<PipelinePass>; 14] {
        [
            &self.fill_opaque_positive_determinant,
            &self.fill_opaque_negative_determinant,
            &self.fill_opaque_selected_positive_determinant,
            &self.fill_opaque_selected_negative_determinant,
            &self.fill_translucent,
            &self.edge_lines,
            &self.corner_points,
            &self.polygon_centroids,
            &self.outline,
            &self.sky,
            &self.grid,
            &self.brush_back,
            &self.brush_front,
            &self.rendertarget_meshes,
        ]
    }
}

/// Item filters of the built-in composition passes.
mod filters {
    use super::{ItemFilter, ItemFlags};

    const CONTENT_OR_CONTROLLER: ItemFlags = ItemFlags::CONTENT.union(ItemFlags::CONTROLLER);
    const VISIBLE_OPAQUE: ItemFlags = ItemFlags::VISIBLE.union(ItemFlags::OPAQUE);
    const CONTENT_VISIBLE_OPAQUE: ItemFlags = ItemFlags::CONTENT.union(VISIBLE_OPAQUE);
    const SELECTED_OR_HOVERED: ItemFlags =
        ItemFlags::SELECTED.union(ItemFlags::HOVERED_IN_ITEM_TREE);
    const NOT_SELECTED_CLEAR: ItemFlags = ItemFlags::TRANSLUCENT.union(SELECTED_OR_HOVERED);

    pub(super) fn opaque_not_selected() -> ItemFilter {
        ItemFilter {
            require_all_bits_set: VISIBLE_OPAQUE,
            require_at_least_one_bit_set: CONTENT_OR_CONTROLLER,
            require_all_bits_clear: NOT_SELECTED_CLEAR,
            ..ItemFilter::default()
        }
    }

    pub(super) fn opaque_not_selected_by_determinant(negative: bool) -> ItemFilter {
        let mut filter = opaque_not_selected();
        if negative {
            filter.require_all_bits_set |= ItemFlags::NEGATIVE_DETERMINANT;
        } else {
            filter.require_all_bits_clear |= ItemFlags::NEGATIVE_DETERMINANT;
        }
        filter
    }

    pub(super) fn opaque_selected() -> ItemFilter {
        ItemFilter {
            require_all_bits_set: CONTENT_VISIBLE_OPAQUE,
            require_at_least_one_bit_set: ItemFlags::SELECTED,
            require_all_bits_clear: ItemFlags::TRANSLUCENT,
            ..ItemFilter::default()
        }
    }

    pub(super) fn opaque_selected_or_hovered() -> ItemFilter {
        ItemFilter {
            require_all_bits_set: CONTENT_VISIBLE_OPAQUE,
            require_at_least_one_bit_set: SELECTED_OR_HOVERED,
            require_all_bits_clear: ItemFlags::TRANSLUCENT,
            ..ItemFilter::default()
        }
    }

    pub(super) fn opaque_selected_or_hovered_by_determinant(negative: bool) -> ItemFilter {
        let mut filter = opaque_selected_or_hovered();
        if negative {
            filter.require_all_bits_set |= ItemFlags::NEGATIVE_DETERMINANT;
        } else {
            filter.require_all_bits_clear |= ItemFlags::NEGATIVE_DETERMINANT;
        }
        filter
    }

    pub(super) fn translucent() -> ItemFilter {
        ItemFilter {
            require_all_bits_set: ItemFlags::VISIBLE.union(ItemFlags::TRANSLUCENT),
            require_at_least_one_bit_set: CONTENT_OR_CONTROLLER,
            require_all_bits_clear: ItemFlags::OPAQUE,
            ..ItemFilter::default()
        }
    }
}

/// The composition passes in draw order, plus the indices of the ones
/// [`AppRendering`] drives directly.
struct Composer {
    passes: Vec<CompositionPass>,
    selection_outline: usize,
    grid: usize,
}

impl Composer {
    fn new(pipelines: &PipelinePasses) -> Self {
        let mut passes = Vec::new();
        let content_layers = vec![LayerId::CONTENT, LayerId::CONTROLLER];

        for (selected, negative) in [(false, false), (false, true), (true, false), (true, true)] {
            let name = format!(
                "Content fill opaque {} {} determinant",
                if selected { "selected" } else { "not selected" },
                if negative { "negative" } else { "positive" },
            );
            let mut pass = CompositionPass::new(name);
            pass.mesh_layers = content_layers.clone();
            pass.filter = if selected {
                filters::opaque_selected_or_hovered_by_determinant(negative)
            } else {
                filters::opaque_not_selected_by_determinant(negative)
            };
            pass.render_style = Some(if selected {
                RenderStyleProvider::Selected
            } else {
                RenderStyleProvider::NotSelected
            });
            pass.passes = vec![pipelines.for_mode(
                PrimitiveMode::PolygonFill,
                BlendMode::Opaque,
                selected,
                negative,
            )];
            passes.push(pass);
        }

        for selected in [false, true] {
            let mut pass = CompositionPass::new(if selected {
                "Content edge lines opaque selected"
            } else {
                "Content edge lines opaque not selected"
            });
            pass.mesh_layers = vec![LayerId::CONTENT];
            pass.primitive_mode = PrimitiveMode::EdgeLines;
            pass.filter = if selected {
                filters::opaque_selected()
            } else {
                filters::opaque_not_selected()
            };
            pass.render_style = Some(if selected {
                RenderStyleProvider::Selected
            } else {
                RenderStyleProvider::NotSelected
            });
            pass.passes = vec![pipelines.for_mode(
                PrimitiveMode::EdgeLines,
                BlendMode::Opaque,
                selected,
                false,
            )];
            pass.allow_shader_stages_override = false;
            passes.push(pass);
        }

        // Settings are replaced by the selection pulse every frame.
        let mut selection_outline = CompositionPass::new("Content outline opaque selected");
        selection_outline.mesh_layers = vec![LayerId::CONTENT];
        selection_outline.filter = filters::opaque_selected_or_hovered();
        selection_outline.passes = vec![pipelines.outline.clone()];
        selection_outline.allow_shader_stages_override = false;
        selection_outline.primitive_settings = Some(PrimitiveInterfaceSettings {
            color_source: PrimitiveColorSource::ConstantColor,
            constant_color0: Vec4::new(1.0, 0.75, 0.0, 1.0),
            constant_color1: Vec4::new(0.0, 0.0, 1.0, 1.0),
            constant_size: -5.0,
            ..Default::default()
        });
        let selection_outline_index = passes.len();
        passes.push(selection_outline);

        let mut sky = CompositionPass::new("Sky");
        sky.non_mesh_vertex_count = crate::forward_lane::FULLSCREEN_VERTEX_COUNT;
        sky.passes = vec![pipelines.sky.clone()];
        sky.allow_shader_stages_override = false;
        passes.push(sky);

        let mut grid = CompositionPass::new("Grid");
        grid.non_mesh_vertex_count = GRID_VERTEX_COUNT;
        grid.passes = vec![pipelines.grid.clone()];
        grid.allow_shader_stages_override = false;
        let grid_index = passes.len();
        passes.push(grid);

        let mut translucent_fill = CompositionPass::new("Content fill translucent");
        translucent_fill.mesh_layers = vec![LayerId::CONTENT];
        translucent_fill.filter = filters::translucent();
        translucent_fill.passes = vec![pipelines.for_mode(
            PrimitiveMode::PolygonFill,
            BlendMode::Translucent,
            false,
            false,
        )];
        passes.push(translucent_fill);

        let mut translucent_outline = CompositionPass::new("Content outline translucent");
        translucent_outline.mesh_layers = vec![LayerId::CONTENT];
        translucent_outline.primitive_mode = PrimitiveMode::EdgeLines;
        translucent_outline.filter = filters::translucent();
        translucent_outline.passes = vec![pipelines.for_mode(
            PrimitiveMode::EdgeLines,
            BlendMode::Translucent,
            false,
            false,
        )];
        passes.push(translucent_outline);

        let mut brush = CompositionPass::new("Brush");
        brush.mesh_layers = vec![LayerId::BRUSH];
        brush.filter = ItemFilter::require_all(ItemFlags::VISIBLE.union(ItemFlags::BRUSH));
        brush.passes = vec![pipelines.brush_back.clone(), pipelines.brush_front.clone()];
        brush.allow_shader_stages_override = false;
        passes.push(brush);

        let mut rendertarget = CompositionPass::new("Rendertarget");
        rendertarget.mesh_layers = vec![LayerId::RENDERTARGET];
        rendertarget.filter =
            ItemFilter::require_all(ItemFlags::VISIBLE.union(ItemFlags::RENDERTARGET));
        rendertarget.passes = vec![pipelines.rendertarget_meshes.clone()];
        rendertarget.allow_shader_stages_override = false;
        passes.push(rendertarget);

        Self {
            passes,
            selection_outline: selection_outline_index,
            grid: grid_index,
        }
    }
}

/// Owns everything needed to draw the application's viewports.
pub struct AppRendering {
    config: RendererConfig,
    programs: Programs,
    mesh_memory: MeshMemory,
    forward_renderer: ForwardRenderer,
    render_graph: RenderGraph,
    pipeline_passes: PipelinePasses,
    composer: Composer,
    // Creation order is kept; one entry per scene view.
    shadow_nodes: Vec<(SceneViewId, NodeId)>,
    depth_visualization_nodes: Vec<(SceneViewId, NodeId)>,
    renderables: Mutex<Vec<Arc<dyn Renderable>>>,
    debug_joint_indices: UVec4,
    debug_joint_colors: Vec<Vec4>,
    // --- Frame metrics ---
    frame_stats: RenderStats,
    frame_timer: Stopwatch,
    telemetry: TelemetryService,
}

impl AppRendering {
    /// Creates the forward renderer, the pipelines and the composition passes.
    ///
    /// # Errors
    ///
    /// Returns the [`ResourceError`] of the first GPU resource that could not
    /// be created. Resources created before it are released.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: RendererConfig,
        programs: Programs,
        mesh_memory: MeshMemory,
    ) -> Result<Self, ResourceError> {
        let mut forward_renderer = ForwardRenderer::new(device, &config)?;
        let pipeline_passes = match PipelinePasses::new(
            device,
            &mesh_memory,
            &programs,
            config.graphics_preset.reverse_depth,
        ) {
            Ok(passes) => passes,
            Err(e) => {
                forward_renderer.destroy(device);
                return Err(e);
            }
        };
        let composer = Composer::new(&pipeline_passes);
        log::info!(
            "AppRendering: created {} pipelines and {} composition passes (preset '{}')",
            pipeline_passes.all().len(),
            composer.passes.len(),
            config.graphics_preset.name
        );

        Ok(Self {
            config,
            programs,
            mesh_memory,
            forward_renderer,
            render_graph: RenderGraph::new(),
            pipeline_passes,
            composer,
            shadow_nodes: Vec::new(),
            depth_visualization_nodes: Vec::new(),
            renderables: Mutex::new(Vec::new()),
            debug_joint_indices: UVec4::ZERO,
            debug_joint_colors: DEBUG_JOINT_COLORS
                .iter()
                .map(|[r, g, b]| Vec4::new(*r, *g, *b, 1.0))
                .collect(),
            frame_stats: RenderStats::default(),
            frame_timer: Stopwatch::new(),
            telemetry: TelemetryService::new(TELEMETRY_UPDATE_INTERVAL, TELEMETRY_HISTORY),
        })
    }

    // --- Frame lifecycle ---

    /// Rotates every ring buffer and starts the frame timer.
    pub fn begin_frame(&mut self) {
        self.forward_renderer.next_frame();
        for (_, id) in &self.shadow_nodes {
            if let Some(node) = self.render_graph.node_as_mut::<ShadowRenderNode>(*id) {
                node.next_frame();
            }
        }
        self.frame_stats.reset();
        self.frame_timer.start();
    }

    /// Runs the render graph: shadow maps, then the nodes consuming them.
    pub fn execute_graph(
        &mut self,
        device: &dyn GraphicsDevice,
        encoder: &mut dyn CommandEncoder,
        scene_views: &SceneViews,
        time_seconds: f64,
    ) -> Result<(), FrameError> {
        let _timer = ScopedTimer::new(|ms| log::trace!("AppRendering: render graph took {ms:.3} ms"));
        let mut context = FrameContext {
            device,
            encoder,
            scene_views,
            stats: &mut self.frame_stats,
            time_seconds,
        };
        self.render_graph.execute(&mut context)?;
        Ok(())
    }

    /// Draws the composition passes into the viewport of `target`, in order.
    ///
    /// The selection outline pulses with `target.time_seconds`.
    pub fn render_viewport_main(&mut self, target: &mut ViewportTarget<'_, '_>) -> Result<(), FrameError> {
        let highlight = target
            .viewport_config
            .selection_highlight_settings(target.time_seconds);
        let outline = self.composer.selection_outline;
        self.composer.passes[outline].primitive_settings = Some(highlight);

        let light_projections = Self::light_projections_for(
            &self.render_graph,
            &self.shadow_nodes,
            target.scene_view_id,
        );
        let mut context = ViewportRenderContext {
            device: target.device,
            pass: &mut *target.pass,
            forward_renderer: &mut self.forward_renderer,
            mesh_memory: &self.mesh_memory,
            scene_view: target.scene_view,
            camera: target.scene_view.camera().map(|c| &**c),
            light_projections,
            viewport: target.viewport,
            viewport_config: target.viewport_config,
            override_shader_stages: target.override_shader_stages,
            error_shader_stages: self.programs.error.as_ref(),
            debug_joint_indices: self.debug_joint_indices,
            debug_joint_colors: &self.debug_joint_colors,
            time_seconds: target.time_seconds,
            stats: &mut self.frame_stats,
        };

        context.pass.push_debug_group("AppRendering::render_viewport_main");
        let mut result = Ok(());
        for pass in &self.composer.passes {
            context.pass.push_debug_group(pass.name());
            result = pass.render(&mut context);
            context.pass.pop_debug_group();
            if result.is_err() {
                break;
            }
        }
        context.pass.pop_debug_group();
        result.map_err(FrameError::from)
    }

    /// Lets every registered renderable draw into the viewport of `target`.
    ///
    /// The renderables lock is held while they draw.
    pub fn render_viewport_renderables(&mut self, target: &mut ViewportTarget<'_, '_>) {
        let renderables = Self::lock(&self.renderables);
        if renderables.is_empty() {
            return;
        }
        let light_projections = Self::light_projections_for(
            &self.render_graph,
            &self.shadow_nodes,
            target.scene_view_id,
        );
        let mut context = ViewportRenderContext {
            device: target.device,
            pass: &mut *target.pass,
            forward_renderer: &mut self.forward_renderer,
            mesh_memory: &self.mesh_memory,
            scene_view: target.scene_view,
            camera: target.scene_view.camera().map(|c| &**c),
            light_projections,
            viewport: target.viewport,
            viewport_config: target.viewport_config,
            override_shader_stages: target.override_shader_stages,
            error_shader_stages: self.programs.error.as_ref(),
            debug_joint_indices: self.debug_joint_indices,
            debug_joint_colors: &self.debug_joint_colors,
            time_seconds: target.time_seconds,
            stats: &mut self.frame_stats,
        };
        for renderable in renderables.iter() {
            renderable.render(&mut context);
        }
    }

    /// Stops the frame timer and records the frame's statistics.
    pub fn end_frame(&mut self) {
        let cpu_time_ms = self.frame_timer.stop().unwrap_or_default();
        self.telemetry.record_frame(self.frame_stats, cpu_time_ms);
        self.telemetry.tick();
    }

    /// Counters of the current frame.
    pub fn frame_stats(&self) -> &RenderStats {
        &self.frame_stats
    }

    /// Frame history.
    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    // --- Shadow nodes ---

    fn shadow_parameters(preset: &GraphicsPreset) -> (u32, usize) {
        if preset.shadow_enable {
            (preset.shadow_resolution, preset.shadow_light_count as usize)
        } else {
            (1, 1)
        }
    }

    fn light_projections_for<'g>(
        render_graph: &'g RenderGraph,
        shadow_nodes: &[(SceneViewId, NodeId)],
        scene_view: SceneViewId,
    ) -> Option<&'g LightProjections> {
        let (_, id) = shadow_nodes.iter().find(|(view, _)| *view == scene_view)?;
        render_graph
            .node_as::<ShadowRenderNode>(*id)
            .map(ShadowRenderNode::light_projections)
    }

    /// Creates the shadow render node of a scene view and registers it in the graph.
    ///
    /// The current preset's resolution and light count are used when shadows
    /// are enabled, otherwise a single 1x1 map. A scene view that already has
    /// a node keeps it.
    pub fn create_shadow_node_for_scene_view(
        &mut self,
        device: &dyn GraphicsDevice,
        scene_view: SceneViewId,
    ) -> Result<NodeId, FrameError> {
        if let Some((_, id)) = self.shadow_nodes.iter().find(|(view, _)| *view == scene_view) {
            log::warn!("AppRendering: scene view {:?} already has a shadow node", scene_view);
            return Ok(*id);
        }

        let preset = &self.config.graphics_preset;
        let (resolution, light_count) = Self::shadow_parameters(preset);
        let node = ShadowRenderNode::new(
            device,
            format!("Shadow render node {:?}", scene_view),
            scene_view,
            self.mesh_memory,
            resolution,
            light_count,
            preset.reverse_depth,
            &self.config,
            self.programs.shadow_depth.clone(),
        )?;
        let node_name = node.name().to_owned();
        let id = self.render_graph.register_node(Box::new(node))?;
        log::debug!(
            "AppRendering: created '{}' ({}x{}, {} lights)",
            node_name,
            resolution,
            resolution,
            light_count
        );
        self.shadow_nodes.push((scene_view, id));
        Ok(id)
    }

    /// Unregisters the shadow node of `scene_view` and releases its GPU resources.
    ///
    /// A depth visualization node reading from it is destroyed too.
    pub fn destroy_shadow_node_for_scene_view(
        &mut self,
        device: &dyn GraphicsDevice,
        scene_view: SceneViewId,
    ) {
        if let Some(position) = self
            .depth_visualization_nodes
            .iter()
            .position(|(view, _)| *view == scene_view)
        {
            let (_, id) = self.depth_visualization_nodes.remove(position);
            if let Some(mut node) = self.render_graph.unregister_node(id) {
                node.destroy(device);
            }
        }

        let Some(position) = self.shadow_nodes.iter().position(|(view, _)| *view == scene_view)
        else {
            log::trace!("AppRendering: scene view {:?} has no shadow node", scene_view);
            return;
        };
        let (_, id) = self.shadow_nodes.remove(position);
        if let Some(mut node) = self.render_graph.unregister_node(id) {
            node.destroy(device);
        }
    }

    /// The shadow node of `scene_view`, if it has one.
    pub fn get_shadow_node_for_view(&self, scene_view: SceneViewId) -> Option<&ShadowRenderNode> {
        let (_, id) = self.shadow_nodes.iter().find(|(view, _)| *view == scene_view)?;
        self.render_graph.node_as::<ShadowRenderNode>(*id)
    }

    /// Every shadow node, in creation order.
    pub fn get_all_shadow_nodes(&self) -> Vec<&ShadowRenderNode> {
        self.shadow_nodes
            .iter()
            .filter_map(|(_, id)| self.render_graph.node_as::<ShadowRenderNode>(*id))
            .collect()
    }

    /// Rebuilds the viewport pipelines for a depth convention and swaps them
    /// into the composition passes, which keep the rest of their state.
    fn rebuild_pipelines(
        &mut self,
        device: &dyn GraphicsDevice,
        reverse_depth: bool,
    ) -> Result<(), ResourceError> {
        let rebuilt = PipelinePasses::new(device, &self.mesh_memory, &self.programs, reverse_depth)?;
        let old = self.pipeline_passes.all();
        let new = rebuilt.all();
        for pass in &mut self.composer.passes {
            for pipeline in &mut pass.passes {
                if let Some(index) = old.iter().position(|p| Arc::ptr_eq(p, pipeline)) {
                    *pipeline = new[index].clone();
                }
            }
        }
        for pipeline in old {
            pipeline.destroy(device);
        }
        self.pipeline_passes = rebuilt;
        Ok(())
    }

    /// Stores `preset` and reconfigures every shadow node for it.
    ///
    /// A change of depth convention also rebuilds the viewport pipelines, so
    /// depth tests and shadow lookups agree with the maps.
    pub fn handle_graphics_settings_changed(
        &mut self,
        device: &dyn GraphicsDevice,
        preset: &GraphicsPreset,
    ) -> Result<(), FrameError> {
        log::info!("AppRendering: applying graphics preset '{}'", preset.name);
        if preset.reverse_depth != self.config.graphics_preset.reverse_depth {
            log::debug!(
                "AppRendering: rebuilding viewport pipelines, reverse depth {}",
                preset.reverse_depth
            );
            self.rebuild_pipelines(device, preset.reverse_depth)?;
        }
        self.config.graphics_preset = preset.clone();
        let (resolution, light_count) = Self::shadow_parameters(preset);
        for (_, id) in &self.shadow_nodes {
            if let Some(node) = self.render_graph.node_as_mut::<ShadowRenderNode>(*id) {
                node.reconfigure(device, resolution, light_count, preset.reverse_depth)?;
            }
        }
        Ok(())
    }

    /// Creates a debug view of the shadow maps of `scene_view`, fed by its shadow node.
    pub fn create_depth_visualization_node(
        &mut self,
        device: &dyn GraphicsDevice,
        scene_view: SceneViewId,
        width: u32,
        height: u32,
    ) -> Result<NodeId, FrameError> {
        let Some(&(_, shadow_node)) = self.shadow_nodes.iter().find(|(view, _)| *view == scene_view)
        else {
            log::error!("AppRendering: scene view {:?} has no shadow node to visualize", scene_view);
            return Err(crate::RenderGraphError::UnknownNode.into());
        };
        if let Some((_, id)) = self
            .depth_visualization_nodes
            .iter()
            .find(|(view, _)| *view == scene_view)
        {
            return Ok(*id);
        }

        let node = DepthVisualizationNode::new(
            device,
            format!("Depth visualization {:?}", scene_view),
            width,
            height,
            self.programs.depth_visualization.clone(),
        )?;
        let node_name = node.name().to_owned();
        let id = self.render_graph.register_node(Box::new(node))?;
        if !self.render_graph.connect(ResourceKey::SHADOW_MAPS, shadow_node, id) {
            log::warn!("AppRendering: could not connect '{}' to its shadow node", node_name);
        }
        self.depth_visualization_nodes.push((scene_view, id));
        Ok(id)
    }

    /// The shadow map debug view of `scene_view`, if one was created.
    pub fn depth_visualization_node_mut(
        &mut self,
        scene_view: SceneViewId,
    ) -> Option<&mut DepthVisualizationNode> {
        let (_, id) = self
            .depth_visualization_nodes
            .iter()
            .find(|(view, _)| *view == scene_view)?;
        self.render_graph.node_as_mut::<DepthVisualizationNode>(*id)
    }

    /// The render graph.
    pub fn render_graph(&self) -> &RenderGraph {
        &self.render_graph
    }

    // --- Renderables ---

    fn lock(
        renderables: &Mutex<Vec<Arc<dyn Renderable>>>,
    ) -> MutexGuard<'_, Vec<Arc<dyn Renderable>>> {
        renderables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a renderable. Registering one twice is an error and is ignored.
    pub fn add(&self, renderable: Arc<dyn Renderable>) {
        let mut renderables = Self::lock(&self.renderables);
        if renderables.iter().any(|r| Arc::ptr_eq(r, &renderable)) {
            log::error!("AppRendering::add: renderable is already registered");
            return;
        }
        renderables.push(renderable);
    }

    /// Unregisters a renderable.
    pub fn remove(&self, renderable: &Arc<dyn Renderable>) {
        let mut renderables = Self::lock(&self.renderables);
        let Some(position) = renderables.iter().position(|r| Arc::ptr_eq(r, renderable)) else {
            log::error!("AppRendering::remove: renderable is not registered");
            return;
        };
        renderables.remove(position);
    }

    /// Number of registered renderables.
    pub fn renderable_count(&self) -> usize {
        Self::lock(&self.renderables).len()
    }

    // --- Composition ---

    /// The composition passes, in draw order.
    pub fn composition_passes(&self) -> &[CompositionPass] {
        &self.composer.passes
    }

    /// The composition pass called `name`.
    pub fn composition_pass_mut(&mut self, name: &str) -> Option<&mut CompositionPass> {
        self.composer.passes.iter_mut().find(|p| p.name() == name)
    }

    /// The pass drawing the outline of selected and hovered meshes.
    pub fn selection_outline_mut(&mut self) -> &mut CompositionPass {
        &mut self.composer.passes[self.composer.selection_outline]
    }

    /// Shows or hides the ground grid.
    pub fn set_grid_visible(&mut self, visible: bool) {
        self.composer.passes[self.composer.grid].set_enabled(visible);
    }

    /// The forward renderer.
    pub fn forward_renderer_mut(&mut self) -> &mut ForwardRenderer {
        &mut self.forward_renderer
    }

    // --- Skin debugging ---

    /// Selects the joints highlighted by the debug joint colors.
    pub fn set_debug_joint_indices(&mut self, indices: UVec4) {
        self.debug_joint_indices = indices;
    }

    /// Joints highlighted by the debug joint colors.
    pub fn debug_joint_indices(&self) -> UVec4 {
        self.debug_joint_indices
    }

    /// The debug joint color table.
    pub fn debug_joint_colors(&self) -> &[Vec4] {
        &self.debug_joint_colors
    }

    /// The debug joint color table, for editing.
    pub fn debug_joint_colors_mut(&mut self) -> &mut [Vec4] {
        &mut self.debug_joint_colors
    }

    /// Releases every GPU resource: graph nodes, pipelines and per-frame buffers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        let views: Vec<SceneViewId> = self.shadow_nodes.iter().map(|(view, _)| *view).collect();
        for view in views {
            self.destroy_shadow_node_for_scene_view(device, view);
        }
        for pass in self.pipeline_passes.all() {
            pass.destroy(device);
        }
        self.forward_renderer.destroy(device);
    }
}

impl std::fmt::Debug for AppRendering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRendering")
            .field("composition_passes", &self.composer.passes.len())
            .field("shadow_nodes", &self.shadow_nodes)
            .field("render_graph", &self.render_graph)
            .finish_non_exhaustive()
    }
}
