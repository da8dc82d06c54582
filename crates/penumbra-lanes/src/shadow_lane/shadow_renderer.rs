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

//! Depth-only rendering of the shadow maps.

use super::light_projections::{LightProjectionParameters, LightProjections};
use crate::buffer_lane::records::INVALID_INDEX;
use crate::buffer_lane::{
    BufferRange, DrawIndirectBuffer, JointBuffer, LightBuffer, MaterialBuffer, PrimitiveBatch,
    PrimitiveBuffer, PrimitiveInterfaceSettings, DRAW_COMMAND_STRIDE,
};
use penumbra_core::item::{ItemFilter, ItemFlags};
use penumbra_core::math::{UVec4, Vec4};
use penumbra_core::renderer::{
    binding, AddressMode, BlendMode, CommandEncoder, CompareFunction, CullMode,
    DepthStencilState, FilterMode, FrontFace, GraphicsDevice, LoadOp, Operations,
    PrimitiveTopology, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceError, SamplerDescriptor, SamplerId,
    ShaderStages, StoreOp, TextureFormat, TextureViewId, VertexInputId, Viewport,
};
use penumbra_core::scene::{Camera, Light, Material, Mesh, MeshMemory, PrimitiveMode, Skin};
use penumbra_core::RendererConfig;
use penumbra_telemetry::RenderStats;
use std::borrow::Cow;
use std::sync::Arc;

/// Number of depth-only pipelines kept alive.
pub const PIPELINE_CACHE_SIZE: usize = 8;

/// Meshes rendered into shadow maps.
pub const SHADOW_FILTER: ItemFilter =
    ItemFilter::require_all(ItemFlags::VISIBLE.union(ItemFlags::SHADOW_CAST));

#[derive(Debug, Clone, Copy)]
struct CachedPipeline {
    vertex_input: VertexInputId,
    reverse_depth: bool,
    pipeline: RenderPipelineId,
    last_use: u64,
}

#[derive(Debug, Clone, Copy)]
struct PackedSpan {
    primitives: BufferRange,
    draws: BufferRange,
    draw_count: u32,
}

/// Inputs of one [`ShadowRenderer::render`] call.
pub struct ShadowRenderParameters<'a> {
    /// Device the buffers are written through.
    pub device: &'a dyn GraphicsDevice,
    /// Encoder the passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Shared vertex and index buffers.
    pub mesh_memory: &'a MeshMemory,
    /// The viewing camera; directional projections follow it.
    pub view_camera: &'a Camera,
    /// Mesh spans drawn into every shadow map.
    pub mesh_spans: &'a [&'a [Arc<Mesh>]],
    /// Lights, sorted directional, point, spot.
    pub lights: &'a [Arc<Light>],
    /// Skins of the scene.
    pub skins: &'a [Arc<Skin>],
    /// Materials of the scene.
    pub materials: &'a [Arc<Material>],
    /// One depth view per shadow map layer.
    pub layer_views: &'a [TextureViewId],
    /// View of the whole shadow map array.
    pub shadow_map_texture: Option<TextureViewId>,
    /// Rebuilt with the projections of the lights drawn this frame.
    pub light_projections: &'a mut LightProjections,
    /// Width and height of a shadow map layer.
    pub resolution: u32,
    /// Number of shadow map layers.
    pub light_count: usize,
    /// Depth convention.
    pub reverse_depth: bool,
    /// Frame counters.
    pub stats: &'a mut RenderStats,
}

/// Renders the shadow maps of one scene view.
///
/// Owns the per-frame buffers of the shadow passes, a small cache of depth-only
/// pipelines and the samplers the lit passes read the maps with.
#[derive(Debug)]
pub struct ShadowRenderer {
    material_buffer: MaterialBuffer,
    joint_buffer: JointBuffer,
    light_buffer: LightBuffer,
    primitive_buffer: PrimitiveBuffer,
    draw_indirect_buffer: DrawIndirectBuffer,
    depth_stages: Option<ShaderStages>,
    pipeline_cache: Vec<CachedPipeline>,
    use_counter: u64,
    reverse_depth: bool,
    shadow_sampler_compare: SamplerId,
    shadow_sampler_no_compare: SamplerId,
}

fn create_compare_sampler(
    device: &dyn GraphicsDevice,
    reverse_depth: bool,
) -> Result<SamplerId, ResourceError> {
    device.create_sampler(&SamplerDescriptor {
        label: Some(Cow::Borrowed("shadow compare")),
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        address_mode: AddressMode::ClampToEdge,
        compare: Some(CompareFunction::depth_closer(reverse_depth)),
    })
}

impl ShadowRenderer {
    /// Allocates the buffers and samplers, sized from `config`.
    ///
    /// The comparison sampler follows `reverse_depth`, the depth convention
    /// the maps are rendered with.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        reverse_depth: bool,
        depth_stages: Option<ShaderStages>,
    ) -> Result<Self, ResourceError> {
        let shadow_sampler_compare = create_compare_sampler(device, reverse_depth)?;
        let shadow_sampler_no_compare = device.create_sampler(&SamplerDescriptor {
            label: Some(Cow::Borrowed("shadow no compare")),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode: AddressMode::ClampToEdge,
            compare: None,
        })?;

        Ok(Self {
            material_buffer: MaterialBuffer::new(device, config.max_material_count, 1)?,
            joint_buffer: JointBuffer::new(
                device,
                config.max_joint_count,
                config.max_debug_joint_colors,
                1,
            )?,
            light_buffer: LightBuffer::new(device, config.max_light_count, 1)?,
            primitive_buffer: PrimitiveBuffer::new(device, config.max_primitive_count)?,
            draw_indirect_buffer: DrawIndirectBuffer::new(device, config.max_draw_count)?,
            depth_stages,
            pipeline_cache: Vec::with_capacity(PIPELINE_CACHE_SIZE),
            use_counter: 0,
            reverse_depth,
            shadow_sampler_compare,
            shadow_sampler_no_compare,
        })
    }

    /// Depth convention of the comparison sampler.
    pub fn reverse_depth(&self) -> bool {
        self.reverse_depth
    }

    /// Switches the comparison sampler to the `reverse_depth` convention.
    ///
    /// Does nothing when the convention is unchanged. On failure the old
    /// sampler is kept.
    pub fn set_reverse_depth(
        &mut self,
        device: &dyn GraphicsDevice,
        reverse_depth: bool,
    ) -> Result<(), ResourceError> {
        if reverse_depth == self.reverse_depth {
            return Ok(());
        }
        let sampler = create_compare_sampler(device, reverse_depth)?;
        if let Err(e) = device.destroy_sampler(self.shadow_sampler_compare) {
            log::warn!("ShadowRenderer: Failed to destroy sampler: {:?}", e);
        }
        self.shadow_sampler_compare = sampler;
        self.reverse_depth = reverse_depth;
        Ok(())
    }

    /// Comparison sampler for filtered shadow lookups.
    pub fn shadow_sampler_compare(&self) -> SamplerId {
        self.shadow_sampler_compare
    }

    /// Plain sampler for reading raw depth.
    pub fn shadow_sampler_no_compare(&self) -> SamplerId {
        self.shadow_sampler_no_compare
    }

    /// Number of cached depth-only pipelines.
    pub fn cached_pipeline_count(&self) -> usize {
        self.pipeline_cache.len()
    }

    /// Advances every ring buffer to the next frame.
    pub fn next_frame(&mut self) {
        self.material_buffer.next_frame();
        self.joint_buffer.next_frame();
        self.light_buffer.next_frame();
        self.primitive_buffer.next_frame();
        self.draw_indirect_buffer.next_frame();
    }

    /// Depth-only pipeline for `vertex_input`, least recently used one evicted first.
    fn pipeline_for(
        &mut self,
        device: &dyn GraphicsDevice,
        vertex_input: VertexInputId,
        reverse_depth: bool,
    ) -> Result<RenderPipelineId, ResourceError> {
        self.use_counter += 1;
        if let Some(entry) = self
            .pipeline_cache
            .iter_mut()
            .find(|e| e.vertex_input == vertex_input && e.reverse_depth == reverse_depth)
        {
            entry.last_use = self.use_counter;
            return Ok(entry.pipeline);
        }

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Owned(format!("shadow depth [{}]", vertex_input.0))),
            shader_stages: self.depth_stages.clone(),
            vertex_input: Some(vertex_input),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::depth_closer(reverse_depth),
                stencil: None,
            }),
            color_format: None,
            color_writes_enabled: false,
            blend: BlendMode::Opaque,
        })?;

        if self.pipeline_cache.len() >= PIPELINE_CACHE_SIZE {
            if let Some((oldest, _)) = self
                .pipeline_cache
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_use)
            {
                let evicted = self.pipeline_cache.swap_remove(oldest);
                log::debug!(
                    "ShadowRenderer: evicting depth pipeline for vertex input {}",
                    evicted.vertex_input.0
                );
                if let Err(e) = device.destroy_render_pipeline(evicted.pipeline) {
                    log::warn!("ShadowRenderer: Failed to destroy pipeline: {:?}", e);
                }
            }
        }
        self.pipeline_cache.push(CachedPipeline {
            vertex_input,
            reverse_depth,
            pipeline,
            last_use: self.use_counter,
        });
        Ok(pipeline)
    }

    /// Renders one depth pass per shadowed light.
    ///
    /// The light projections are rebuilt first, then materials, joints and
    /// lights are packed once. The primitive and draw buffers do not depend on
    /// the light, so they are packed once per span and reused by every pass.
    /// Every pass clears its layer, even when nothing is drawn into it.
    pub fn render(&mut self, parameters: ShadowRenderParameters<'_>) -> Result<(), ResourceError> {
        let ShadowRenderParameters {
            device,
            encoder,
            mesh_memory,
            view_camera,
            mesh_spans,
            lights,
            skins,
            materials,
            layer_views,
            shadow_map_texture,
            light_projections,
            resolution,
            light_count,
            reverse_depth,
            stats,
        } = parameters;

        self.set_reverse_depth(device, reverse_depth)?;
        *light_projections = LightProjections::new(&LightProjectionParameters {
            lights,
            camera: view_camera,
            light_count,
            resolution,
            reverse_depth,
        });
        light_projections.shadow_map_texture = shadow_map_texture;
        light_projections.shadow_sampler_compare = Some(self.shadow_sampler_compare);
        light_projections.shadow_sampler_no_compare = Some(self.shadow_sampler_no_compare);

        let material_range = self.material_buffer.update(device, materials)?;
        let joint_range = self.joint_buffer.update(device, UVec4::ZERO, &[], skins)?;
        let light_range =
            self.light_buffer
                .update(device, lights, Some(&*light_projections), Vec4::ZERO)?;

        let settings = PrimitiveInterfaceSettings::default();
        let mut spans = Vec::with_capacity(mesh_spans.len());
        for meshes in mesh_spans.iter().filter(|s| !s.is_empty()) {
            let (primitives, primitive_count) = self.primitive_buffer.update(
                device,
                &PrimitiveBatch {
                    meshes,
                    mode: PrimitiveMode::PolygonFill,
                    filter: &SHADOW_FILTER,
                    settings: &settings,
                    material_indices: self.material_buffer.material_indices(),
                    joint_indices: self.joint_buffer.joint_indices(),
                    use_id_ranges: false,
                },
            )?;
            let (draws, draw_count) = self.draw_indirect_buffer.update(
                device,
                meshes,
                PrimitiveMode::PolygonFill,
                &SHADOW_FILTER,
            )?;
            if primitive_count != draw_count {
                log::error!(
                    "ShadowRenderer: {} primitive records but {} draw commands, skipping span",
                    primitive_count,
                    draw_count
                );
                continue;
            }
            if draw_count == 0 {
                continue;
            }
            spans.push(PackedSpan {
                primitives,
                draws,
                draw_count,
            });
        }

        let pipeline = self.pipeline_for(device, mesh_memory.vertex_input, reverse_depth)?;
        let clear_depth = if reverse_depth { 0.0 } else { 1.0 };
        let viewport = Viewport {
            x: 0,
            y: 0,
            width: resolution as i32,
            height: resolution as i32,
            reverse_depth,
        };

        for transforms in &light_projections.light_projection_transforms {
            let Some(layer_view) = layer_views.get(transforms.index) else {
                log::trace!(
                    "ShadowRenderer: no layer view for shadow map {}",
                    transforms.index
                );
                continue;
            };
            let light_index = lights
                .iter()
                .position(|l| l.id == transforms.light)
                .filter(|i| *i < self.light_buffer.max_light_count())
                .map(|i| i as u32)
                .unwrap_or(INVALID_INDEX);
            let control_range = self.light_buffer.update_control(device, light_index)?;

            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("shadow"),
                color_attachments: &[],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: *layer_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(clear_depth),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
            });
            pass.set_viewport(&viewport);
            pass.set_pipeline(pipeline, None);
            pass.bind_buffer_range(binding::MATERIAL, &material_range.binding());
            pass.bind_buffer_range(binding::LIGHT, &light_range.binding());
            pass.bind_buffer_range(binding::LIGHT_CONTROL, &control_range.binding());
            pass.bind_buffer_range(binding::JOINT, &joint_range.binding());
            pass.set_vertex_buffer(0, mesh_memory.vertex_buffer, 0);
            pass.set_index_buffer(mesh_memory.index_buffer, 0, mesh_memory.index_format);

            for span in &spans {
                pass.bind_buffer_range(binding::PRIMITIVE, &span.primitives.binding());
                pass.multi_draw_indexed_indirect(
                    span.draws.buffer,
                    span.draws.offset,
                    span.draw_count,
                    DRAW_COMMAND_STRIDE,
                );
                stats.multi_draw_calls += 1;
                stats.indirect_draws += span.draw_count;
            }
            drop(pass);

            stats.render_passes += 1;
            stats.shadow_passes += 1;
        }
        Ok(())
    }

    /// Releases buffers, pipelines and samplers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.material_buffer.destroy(device);
        self.joint_buffer.destroy(device);
        self.light_buffer.destroy(device);
        self.primitive_buffer.destroy(device);
        self.draw_indirect_buffer.destroy(device);
        for entry in self.pipeline_cache.drain(..) {
            if let Err(e) = device.destroy_render_pipeline(entry.pipeline) {
                log::warn!("ShadowRenderer: Failed to destroy pipeline: {:?}", e);
            }
        }
        for sampler in [self.shadow_sampler_compare, self.shadow_sampler_no_compare] {
            if let Err(e) = device.destroy_sampler(sampler) {
                log::warn!("ShadowRenderer: Failed to destroy sampler: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::renderer::headless::HeadlessDevice;

    fn config() -> RendererConfig {
        RendererConfig {
            max_primitive_count: 64,
            max_draw_count: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_cache_evicts_least_recently_used() {
        let device = HeadlessDevice::new();
        let mut renderer = ShadowRenderer::new(&device, &config(), true, None).unwrap();
        let baseline = device.live_pipeline_count();

        let first = renderer.pipeline_for(&device, VertexInputId(0), true).unwrap();
        for i in 1..PIPELINE_CACHE_SIZE {
            renderer.pipeline_for(&device, VertexInputId(i), true).unwrap();
        }
        // Touch the first entry so the second becomes the oldest.
        assert_eq!(renderer.pipeline_for(&device, VertexInputId(0), true).unwrap(), first);
        renderer.pipeline_for(&device, VertexInputId(100), true).unwrap();

        assert_eq!(renderer.cached_pipeline_count(), PIPELINE_CACHE_SIZE);
        assert_eq!(device.live_pipeline_count(), baseline + PIPELINE_CACHE_SIZE);
        assert_eq!(renderer.pipeline_for(&device, VertexInputId(0), true).unwrap(), first);
        assert!(renderer
            .pipeline_cache
            .iter()
            .all(|e| e.vertex_input != VertexInputId(1)));
    }

    #[test]
    fn test_compare_sampler_follows_depth_convention() {
        let device = HeadlessDevice::new();
        let mut renderer = ShadowRenderer::new(&device, &config(), true, None).unwrap();
        let reversed = renderer.shadow_sampler_compare();
        assert_eq!(
            device.sampler_compare(reversed),
            Some(Some(CompareFunction::Greater))
        );

        renderer.set_reverse_depth(&device, false).unwrap();
        let forward = renderer.shadow_sampler_compare();
        assert!(!renderer.reverse_depth());
        assert_eq!(device.sampler_compare(forward), Some(Some(CompareFunction::Less)));
        assert_eq!(device.sampler_compare(reversed), None);
        assert_eq!(device.live_sampler_count(), 2);

        renderer.set_reverse_depth(&device, false).unwrap();
        assert_eq!(renderer.shadow_sampler_compare(), forward);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let device = HeadlessDevice::new();
        let mut renderer = ShadowRenderer::new(&device, &config(), true, None).unwrap();
        renderer.pipeline_for(&device, VertexInputId(0), false).unwrap();
        renderer.destroy(&device);

        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_pipeline_count(), 0);
        assert_eq!(device.live_sampler_count(), 0);
    }
}
