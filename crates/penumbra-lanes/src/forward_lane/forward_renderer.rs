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

//! Multi-pass forward rendering of mesh layers through indirect draws.

use super::pipeline_pass::PipelinePass;
use super::render_parameters::RenderParameters;
use crate::buffer_lane::records::INVALID_INDEX;
use crate::buffer_lane::{
    BufferRange, CameraBuffer, DrawIndirectBuffer, JointBuffer, LightBuffer, MaterialBuffer,
    PrimitiveBatch, PrimitiveBuffer, DRAW_COMMAND_STRIDE,
};
use penumbra_core::renderer::{
    binding, AddressMode, FilterMode, GraphicsDevice, RenderPass, ResourceError,
    SamplerDescriptor, SamplerId, ShaderStages,
};
use penumbra_core::scene::{LightId, Mesh};
use penumbra_core::RendererConfig;
use penumbra_telemetry::RenderStats;
use std::borrow::Cow;
use std::sync::Arc;

/// Vertices of a full-screen triangle.
pub const FULLSCREEN_VERTEX_COUNT: u32 = 3;

/// Draws mesh spans pass by pass with one multi-draw-indirect per span.
///
/// Owns the ring-buffered camera, draw-indirect, joint, light, material and
/// primitive buffers; [`ForwardRenderer::next_frame`] rotates all of them.
#[derive(Debug)]
pub struct ForwardRenderer {
    camera_buffer: CameraBuffer,
    draw_indirect_buffer: DrawIndirectBuffer,
    joint_buffer: JointBuffer,
    light_buffer: LightBuffer,
    material_buffer: MaterialBuffer,
    primitive_buffer: PrimitiveBuffer,
    nearest_sampler: SamplerId,
}

impl ForwardRenderer {
    /// Allocates the buffers, sized from `config`.
    ///
    /// Every render call writes one camera, one light, one material and one
    /// joint block, so those buffers hold as many blocks per frame as there
    /// are camera slots.
    pub fn new(device: &dyn GraphicsDevice, config: &RendererConfig) -> Result<Self, ResourceError> {
        let nearest_sampler = device.create_sampler(&SamplerDescriptor {
            label: Some(Cow::Borrowed("forward nearest")),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode: AddressMode::ClampToEdge,
            compare: None,
        })?;
        Ok(Self {
            camera_buffer: CameraBuffer::new(device, config.max_camera_count)?,
            draw_indirect_buffer: DrawIndirectBuffer::new(device, config.max_draw_count)?,
            joint_buffer: JointBuffer::new(
                device,
                config.max_joint_count,
                config.max_debug_joint_colors,
                config.max_camera_count,
            )?,
            light_buffer: LightBuffer::new(
                device,
                config.max_light_count,
                config.max_camera_count,
            )?,
            material_buffer: MaterialBuffer::new(
                device,
                config.max_material_count,
                config.max_camera_count,
            )?,
            primitive_buffer: PrimitiveBuffer::new(device, config.max_primitive_count)?,
            nearest_sampler,
        })
    }

    /// Rotates every ring buffer to the next frame.
    pub fn next_frame(&mut self) {
        self.camera_buffer.next_frame();
        self.draw_indirect_buffer.next_frame();
        self.joint_buffer.next_frame();
        self.light_buffer.next_frame();
        self.material_buffer.next_frame();
        self.primitive_buffer.next_frame();
    }

    /// The primitive buffer, for reading back picking id ranges.
    pub fn primitive_buffer(&self) -> &PrimitiveBuffer {
        &self.primitive_buffer
    }

    /// Mutable access to the primitive buffer.
    pub fn primitive_buffer_mut(&mut self) -> &mut PrimitiveBuffer {
        &mut self.primitive_buffer
    }

    /// Limits every indirect draw to at most `count` indices, for debugging.
    pub fn set_max_index_count(&mut self, count: Option<u32>) {
        self.draw_indirect_buffer.set_max_index_count(count);
    }

    fn bind_camera(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
    ) -> Result<(), ResourceError> {
        if let Some(camera) = parameters.camera {
            let range = self.camera_buffer.update(
                device,
                camera,
                &parameters.viewport,
                parameters.viewport.reverse_depth,
            )?;
            pass.bind_buffer_range(binding::CAMERA, &range.binding());
        }
        Ok(())
    }

    fn bind_materials(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
    ) -> Result<(), ResourceError> {
        let range = self.material_buffer.update(device, parameters.materials)?;
        pass.bind_buffer_range(binding::MATERIAL, &range.binding());
        for (slot, texture) in self.material_buffer.texture_slots().iter().enumerate() {
            pass.set_texture(
                binding::MATERIAL_TEXTURE_BASE + slot as u32,
                texture.view,
                texture.sampler,
            );
        }
        Ok(())
    }

    fn bind_lights(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
    ) -> Result<bool, ResourceError> {
        // Written even without lights; shaders read the light counts from it.
        let range = self.light_buffer.update(
            device,
            parameters.lights,
            parameters.light_projections,
            parameters.ambient_light,
        )?;
        pass.bind_buffer_range(binding::LIGHT, &range.binding());

        let shadows_enabled = parameters.shadows_enabled();
        if let Some(projections) = parameters.light_projections.filter(|_| shadows_enabled) {
            if let Some(texture) = projections.shadow_map_texture {
                let sampler = projections
                    .shadow_sampler_no_compare
                    .unwrap_or(self.nearest_sampler);
                pass.set_texture(binding::SHADOW_TEXTURE, texture, sampler);
            }
        }
        Ok(shadows_enabled)
    }

    /// The program a pass draws with, and whether it replaces the pipeline's own.
    fn resolve_stages<'p>(
        pipeline_pass: &'p PipelinePass,
        parameters: &RenderParameters<'p>,
    ) -> Option<(Option<&'p ShaderStages>, bool)> {
        let (stages, overridden) = match parameters.override_shader_stages {
            Some(stages) => (stages, true),
            None => (pipeline_pass.shader_stages()?, false),
        };
        if stages.is_valid() {
            return Some((Some(stages), overridden));
        }
        match parameters.error_shader_stages {
            Some(error_stages) => {
                log::trace!(
                    "ForwardRenderer({}): program '{}' is invalid, using '{}'",
                    parameters.debug_label,
                    stages.name,
                    error_stages.name
                );
                Some((Some(error_stages), true))
            }
            None => {
                log::warn!(
                    "ForwardRenderer({}): program '{}' is invalid and there is no error program",
                    parameters.debug_label,
                    stages.name
                );
                None
            }
        }
    }

    /// Draws the mesh spans of `parameters` with every pass.
    ///
    /// Camera, materials, joints and lights are packed once. Primitive and
    /// draw-indirect records are packed per pass and span, and every non-empty
    /// span is drawn with one multi-draw-indirect call.
    pub fn render(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
        stats: &mut RenderStats,
    ) -> Result<(), ResourceError> {
        log::debug!(
            "ForwardRenderer::render({}): {} passes, {} spans",
            parameters.debug_label,
            parameters.passes.len(),
            parameters.mesh_spans.len()
        );

        pass.set_viewport(&parameters.viewport);
        self.bind_camera(device, pass, parameters)?;
        self.bind_materials(device, pass, parameters)?;
        let joint_range = self.joint_buffer.update(
            device,
            parameters.debug_joint_indices,
            parameters.debug_joint_colors,
            parameters.skins,
        )?;
        pass.bind_buffer_range(binding::JOINT, &joint_range.binding());
        let shadows_enabled = self.bind_lights(device, pass, parameters)?;
        log::trace!(
            "ForwardRenderer::render({}): shadows {}",
            parameters.debug_label,
            if shadows_enabled { "enabled" } else { "disabled" }
        );

        let memory = parameters.mesh_memory;
        for pipeline_pass in parameters.passes {
            let Some((stages, overridden)) = Self::resolve_stages(pipeline_pass, parameters)
            else {
                continue;
            };

            pipeline_pass.run_begin(pass);
            pass.push_debug_group(pipeline_pass.name());
            pass.set_pipeline(pipeline_pass.pipeline(), stages.filter(|_| overridden));
            pass.set_vertex_buffer(0, memory.vertex_buffer, 0);
            pass.set_index_buffer(memory.index_buffer, 0, memory.index_format);

            for meshes in parameters.mesh_spans.iter().filter(|s| !s.is_empty()) {
                let Some((primitives, draws, draw_count)) =
                    self.pack_span(device, meshes, parameters)?
                else {
                    continue;
                };
                pass.bind_buffer_range(binding::PRIMITIVE, &primitives.binding());
                pass.multi_draw_indexed_indirect(
                    draws.buffer,
                    draws.offset,
                    draw_count,
                    DRAW_COMMAND_STRIDE,
                );
                stats.multi_draw_calls += 1;
                stats.indirect_draws += draw_count;
            }

            pass.pop_debug_group();
            pipeline_pass.run_end(pass);
        }
        Ok(())
    }

    fn pack_span(
        &mut self,
        device: &dyn GraphicsDevice,
        meshes: &[Arc<Mesh>],
        parameters: &RenderParameters<'_>,
    ) -> Result<Option<(BufferRange, BufferRange, u32)>, ResourceError> {
        let (primitives, primitive_count) = self.primitive_buffer.update(
            device,
            &PrimitiveBatch {
                meshes,
                mode: parameters.primitive_mode,
                filter: &parameters.filter,
                settings: &parameters.primitive_settings,
                material_indices: self.material_buffer.material_indices(),
                joint_indices: self.joint_buffer.joint_indices(),
                use_id_ranges: false,
            },
        )?;
        let (draws, draw_count) = self.draw_indirect_buffer.update(
            device,
            meshes,
            parameters.primitive_mode,
            &parameters.filter,
        )?;
        if draw_count == 0 {
            return Ok(None);
        }
        if primitive_count != draw_count {
            log::error!(
                "ForwardRenderer({}): {} primitive records but {} draw commands, skipping span",
                parameters.debug_label,
                primitive_count,
                draw_count
            );
            return Ok(None);
        }
        Ok(Some((primitives, draws, draw_count)))
    }

    fn draw_vertices(
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
        vertex_count: u32,
        stats: &mut RenderStats,
    ) {
        for pipeline_pass in parameters.passes {
            let Some(stages) = pipeline_pass.shader_stages() else {
                continue;
            };
            let shader_override = match Self::resolve_stages(pipeline_pass, parameters) {
                Some((resolved, true)) => resolved,
                Some((_, false)) => None,
                None => {
                    log::trace!(
                        "ForwardRenderer({}): skipping pass '{}' with program '{}'",
                        parameters.debug_label,
                        pipeline_pass.name(),
                        stages.name
                    );
                    continue;
                }
            };

            pipeline_pass.run_begin(pass);
            pass.push_debug_group(pipeline_pass.name());
            pass.set_pipeline(pipeline_pass.pipeline(), shader_override);
            pass.draw(0..vertex_count, 0..1);
            stats.draw_calls += 1;
            pass.pop_debug_group();
            pipeline_pass.run_end(pass);
        }
    }

    /// Draws `non_mesh_vertex_count` generated vertices with every pass.
    ///
    /// Used by composition passes without mesh layers, such as the sky and
    /// the grid. Camera, materials and lights are bound; no mesh is packed.
    pub fn draw_primitives(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
        stats: &mut RenderStats,
    ) -> Result<(), ResourceError> {
        log::debug!(
            "ForwardRenderer::draw_primitives({}): {} vertices",
            parameters.debug_label,
            parameters.non_mesh_vertex_count
        );
        pass.set_viewport(&parameters.viewport);
        self.bind_camera(device, pass, parameters)?;
        self.bind_materials(device, pass, parameters)?;
        self.bind_lights(device, pass, parameters)?;
        Self::draw_vertices(pass, parameters, parameters.non_mesh_vertex_count, stats);
        Ok(())
    }

    /// Draws a full-screen triangle with every pass, optionally for one light.
    ///
    /// When `light` has a shadow projection, the light control block selecting
    /// it is bound too.
    pub fn render_fullscreen(
        &mut self,
        device: &dyn GraphicsDevice,
        pass: &mut dyn RenderPass<'_>,
        parameters: &RenderParameters<'_>,
        light: Option<LightId>,
        stats: &mut RenderStats,
    ) -> Result<(), ResourceError> {
        pass.set_viewport(&parameters.viewport);
        self.bind_materials(device, pass, parameters)?;
        self.bind_camera(device, pass, parameters)?;

        if let Some(light) = light {
            let has_projection = parameters
                .light_projections
                .and_then(|p| p.transforms_for_light(light))
                .is_some();
            if has_projection {
                let light_index = parameters
                    .lights
                    .iter()
                    .position(|l| l.id == light)
                    .filter(|i| *i < self.light_buffer.max_light_count())
                    .map(|i| i as u32)
                    .unwrap_or(INVALID_INDEX);
                let control_range = self.light_buffer.update_control(device, light_index)?;
                pass.bind_buffer_range(binding::LIGHT_CONTROL, &control_range.binding());
            } else {
                log::trace!(
                    "ForwardRenderer({}): light {:?} has no shadow projection",
                    parameters.debug_label,
                    light
                );
            }
        }

        self.bind_lights(device, pass, parameters)?;
        Self::draw_vertices(pass, parameters, FULLSCREEN_VERTEX_COUNT, stats);
        Ok(())
    }

    /// Releases buffers and samplers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.camera_buffer.destroy(device);
        self.draw_indirect_buffer.destroy(device);
        self.joint_buffer.destroy(device);
        self.light_buffer.destroy(device);
        self.material_buffer.destroy(device);
        self.primitive_buffer.destroy(device);
        if let Err(e) = device.destroy_sampler(self.nearest_sampler) {
            log::warn!("ForwardRenderer: Failed to destroy sampler: {:?}", e);
        }
    }
}
