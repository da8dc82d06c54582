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

//! Debug view of one shadow map layer.

use super::shadow_render_node::ShadowRenderNode;
use crate::error::FrameError;
use crate::graph_lane::{
    FrameContext, NodeInputs, RenderGraphNode, RenderGraphNodeBase, ResourceKey, Routing,
};
use penumbra_core::renderer::{
    binding, BlendMode, CullMode, Extent3D, FrontFace, GraphicsDevice, LoadOp, Operations,
    PrimitiveTopology, RenderPassColorAttachment, RenderPassDescriptor, RenderPipelineDescriptor,
    RenderPipelineId, ResourceError, ShaderStages, StoreOp, TextureDescriptor, TextureDimension,
    TextureFormat, TextureId, TextureUsage, TextureViewDescriptor, TextureViewId, Viewport,
};
use std::any::Any;
use std::borrow::Cow;

const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Draws the shadow map of the selected light into a color texture.
///
/// Consumes [`ResourceKey::SHADOW_MAPS`] from a [`ShadowRenderNode`] and
/// exposes the result as [`ResourceKey::DEPTH_VISUALIZATION`].
#[derive(Debug)]
pub struct DepthVisualizationNode {
    base: RenderGraphNodeBase,
    width: u32,
    height: u32,
    selected_light: usize,
    texture: Option<TextureId>,
    view: Option<TextureViewId>,
    pipeline: RenderPipelineId,
}

impl DepthVisualizationNode {
    /// Creates the node with a `width` x `height` color target.
    pub fn new(
        device: &dyn GraphicsDevice,
        name: impl Into<String>,
        width: u32,
        height: u32,
        stages: Option<ShaderStages>,
    ) -> Result<Self, ResourceError> {
        let mut base = RenderGraphNodeBase::new(name);
        base.register_input(
            Routing::ResourceProvidedByProducer,
            "shadow_maps",
            ResourceKey::SHADOW_MAPS,
        );
        base.register_output(
            Routing::ResourceProvidedByProducer,
            "depth_visualization",
            ResourceKey::DEPTH_VISUALIZATION,
        );
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Owned(format!("{} pipeline", base.name))),
            shader_stages: stages,
            vertex_input: None,
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            depth_stencil: None,
            color_format: Some(COLOR_FORMAT),
            color_writes_enabled: true,
            blend: BlendMode::Opaque,
        })?;
        let mut node = Self {
            base,
            width: 0,
            height: 0,
            selected_light: 0,
            texture: None,
            view: None,
            pipeline,
        };
        if let Err(e) = node.resize(device, width, height) {
            node.destroy_resources(device);
            return Err(e);
        }
        Ok(node)
    }

    /// Reallocates the color target. Does nothing when the size is unchanged.
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), ResourceError> {
        if width == self.width && height == self.height && self.texture.is_some() {
            return Ok(());
        }
        self.release_target(device);
        self.width = width;
        self.height = height;
        if width == 0 || height == 0 {
            return Ok(());
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Owned(format!("{} target", self.base.name))),
            size: Extent3D {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        self.texture = Some(texture);
        self.view = Some(device.create_texture_view(texture, &TextureViewDescriptor::default())?);
        Ok(())
    }

    /// Selects the shadow map layer of the `index`-th shadowed light.
    pub fn set_selected_light(&mut self, index: usize) {
        self.selected_light = index;
    }

    /// Index of the visualized shadowed light.
    pub fn selected_light(&self) -> usize {
        self.selected_light
    }

    /// View of the color target.
    pub fn view(&self) -> Option<TextureViewId> {
        self.view
    }

    fn release_target(&mut self, device: &dyn GraphicsDevice) {
        if let Some(view) = self.view.take() {
            if let Err(e) = device.destroy_texture_view(view) {
                log::warn!("DepthVisualizationNode: Failed to destroy view: {:?}", e);
            }
        }
        if let Some(texture) = self.texture.take() {
            if let Err(e) = device.destroy_texture(texture) {
                log::warn!("DepthVisualizationNode: Failed to destroy texture: {:?}", e);
            }
        }
    }

    fn destroy_resources(&mut self, device: &dyn GraphicsDevice) {
        self.release_target(device);
        if let Err(e) = device.destroy_render_pipeline(self.pipeline) {
            log::warn!("DepthVisualizationNode: Failed to destroy pipeline: {:?}", e);
        }
    }
}

impl RenderGraphNode for DepthVisualizationNode {
    fn base(&self) -> &RenderGraphNodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RenderGraphNodeBase {
        &mut self.base
    }

    fn producer_output_texture(&self, key: ResourceKey) -> Option<TextureViewId> {
        (key == ResourceKey::DEPTH_VISUALIZATION)
            .then_some(self.view)
            .flatten()
    }

    fn execute(
        &mut self,
        context: &mut FrameContext<'_>,
        inputs: &NodeInputs<'_>,
    ) -> Result<(), FrameError> {
        let Some(shadow) = inputs.input_node_as::<ShadowRenderNode>(ResourceKey::SHADOW_MAPS)
        else {
            log::trace!("DepthVisualizationNode({}): no shadow map producer", self.base.name);
            context.stats.graph_nodes_skipped += 1;
            return Ok(());
        };
        let projections = shadow.light_projections();
        let (Some(shadow_maps), Some(sampler)) = (
            projections.shadow_map_texture,
            projections.shadow_sampler_no_compare,
        ) else {
            log::trace!("DepthVisualizationNode({}): no shadow maps", self.base.name);
            context.stats.graph_nodes_skipped += 1;
            return Ok(());
        };
        let Some(layer) = projections
            .light_projection_transforms
            .get(self.selected_light)
            .map(|t| t.index as u32)
        else {
            log::trace!(
                "DepthVisualizationNode({}): light {} has no shadow map",
                self.base.name,
                self.selected_light
            );
            context.stats.graph_nodes_skipped += 1;
            return Ok(());
        };
        let Some(target) = self.view else {
            context.stats.graph_nodes_skipped += 1;
            return Ok(());
        };

        let mut pass = context.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("depth visualization"),
            color_attachments: &[RenderPassColorAttachment {
                view: target,
                ops: Operations {
                    load: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                    store: StoreOp::Store,
                },
            }],
            depth_stencil_attachment: None,
        });
        pass.set_viewport(&Viewport {
            x: 0,
            y: 0,
            width: self.width as i32,
            height: self.height as i32,
            reverse_depth: projections.reverse_depth,
        });
        pass.set_pipeline(self.pipeline, None);
        pass.set_texture(binding::SHADOW_TEXTURE, shadow_maps, sampler);
        // The instance index selects the array layer.
        pass.draw(0..3, layer..layer + 1);
        drop(pass);

        context.stats.render_passes += 1;
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.destroy_resources(device);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
