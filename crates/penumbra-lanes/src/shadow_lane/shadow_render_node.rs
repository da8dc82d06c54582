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

//! Render graph node producing the shadow maps of one scene view.

use super::light_projections::LightProjections;
use super::shadow_renderer::{ShadowRenderParameters, ShadowRenderer};
use crate::error::FrameError;
use crate::graph_lane::{
    FrameContext, NodeInputs, RenderGraphNode, RenderGraphNodeBase, ResourceKey, Routing,
};
use penumbra_core::renderer::{
    Extent3D, GraphicsDevice, ResourceError, SamplerId, ShaderStages, TextureDescriptor,
    TextureDimension, TextureFormat, TextureId, TextureUsage, TextureViewDescriptor,
    TextureViewDimension, TextureViewId,
};
use penumbra_core::scene::{MeshMemory, SceneViewId};
use penumbra_core::RendererConfig;
use std::any::Any;
use std::borrow::Cow;

/// Owns a depth texture array with one layer per shadowed light and renders
/// into it every frame.
///
/// The node has no inputs and exposes the array through its
/// [`ResourceKey::SHADOW_MAPS`] output.
#[derive(Debug)]
pub struct ShadowRenderNode {
    base: RenderGraphNodeBase,
    scene_view: SceneViewId,
    mesh_memory: MeshMemory,
    renderer: ShadowRenderer,
    resolution: u32,
    light_count: usize,
    reverse_depth: bool,
    texture: Option<TextureId>,
    layer_views: Vec<TextureViewId>,
    array_view: Option<TextureViewId>,
    light_projections: LightProjections,
}

impl ShadowRenderNode {
    /// Creates the node and allocates its shadow maps.
    ///
    /// # Arguments
    ///
    /// * `device` - The graphics device to allocate from.
    /// * `scene_view` - The scene view whose lights and meshes are rendered.
    /// * `mesh_memory` - Shared vertex and index buffers.
    /// * `resolution` - Width and height of each shadow map.
    /// * `light_count` - Number of shadow maps; zero leaves the node inert.
    /// * `reverse_depth` - Depth convention.
    /// * `config` - Buffer capacities.
    /// * `depth_stages` - Depth-only program.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &dyn GraphicsDevice,
        name: impl Into<String>,
        scene_view: SceneViewId,
        mesh_memory: MeshMemory,
        resolution: u32,
        light_count: usize,
        reverse_depth: bool,
        config: &RendererConfig,
        depth_stages: Option<ShaderStages>,
    ) -> Result<Self, ResourceError> {
        let mut base = RenderGraphNodeBase::new(name).without_inputs();
        base.register_output(
            Routing::ResourceProvidedByProducer,
            "shadow_maps",
            ResourceKey::SHADOW_MAPS,
        );
        let mut node = Self {
            base,
            scene_view,
            mesh_memory,
            renderer: ShadowRenderer::new(device, config, reverse_depth, depth_stages)?,
            resolution: 0,
            light_count: 0,
            reverse_depth,
            texture: None,
            layer_views: Vec::new(),
            array_view: None,
            light_projections: LightProjections::default(),
        };
        node.allocate(device, resolution, light_count, reverse_depth)?;
        Ok(node)
    }

    /// Reallocates the shadow maps. Does nothing when the configuration is unchanged.
    pub fn reconfigure(
        &mut self,
        device: &dyn GraphicsDevice,
        resolution: u32,
        light_count: usize,
        reverse_depth: bool,
    ) -> Result<(), ResourceError> {
        if resolution == self.resolution
            && light_count == self.light_count
            && reverse_depth == self.reverse_depth
        {
            return Ok(());
        }
        log::debug!(
            "ShadowRenderNode({}): reconfigure {}x{} x {} lights -> {}x{} x {} lights, reverse depth {}",
            self.base.name,
            self.resolution,
            self.resolution,
            self.light_count,
            resolution,
            resolution,
            light_count,
            reverse_depth
        );
        self.renderer.set_reverse_depth(device, reverse_depth)?;
        self.release_maps(device);
        self.allocate(device, resolution, light_count, reverse_depth)
    }

    fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        resolution: u32,
        light_count: usize,
        reverse_depth: bool,
    ) -> Result<(), ResourceError> {
        self.resolution = resolution;
        self.light_count = light_count;
        self.reverse_depth = reverse_depth;
        self.light_projections = LightProjections::default();

        if light_count == 0 || resolution == 0 {
            log::trace!("ShadowRenderNode({}): no shadow maps", self.base.name);
            return Ok(());
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Owned(format!("{} shadow maps", self.base.name))),
            size: Extent3D {
                width: resolution,
                height: resolution,
                depth_or_array_layers: light_count as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        self.texture = Some(texture);

        for layer in 0..light_count as u32 {
            let view = device.create_texture_view(
                texture,
                &TextureViewDescriptor {
                    label: Some(Cow::Owned(format!("{} shadow map {}", self.base.name, layer))),
                    dimension: Some(TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                },
            );
            match view {
                Ok(view) => self.layer_views.push(view),
                Err(e) => {
                    self.release_maps(device);
                    return Err(e);
                }
            }
        }

        let array_view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{} shadow map array", self.base.name))),
                dimension: Some(TextureViewDimension::D2Array),
                base_array_layer: 0,
                array_layer_count: Some(light_count as u32),
                ..Default::default()
            },
        );
        match array_view {
            Ok(view) => self.array_view = Some(view),
            Err(e) => {
                self.release_maps(device);
                return Err(e);
            }
        }
        self.light_projections.shadow_map_texture = self.array_view;
        self.light_projections.shadow_map_resolution = resolution;
        self.light_projections.reverse_depth = reverse_depth;
        Ok(())
    }

    fn release_maps(&mut self, device: &dyn GraphicsDevice) {
        for view in self.layer_views.drain(..).chain(self.array_view.take()) {
            if let Err(e) = device.destroy_texture_view(view) {
                log::warn!(
                    "ShadowRenderNode({}): Failed to destroy view: {:?}",
                    self.base.name,
                    e
                );
            }
        }
        if let Some(texture) = self.texture.take() {
            if let Err(e) = device.destroy_texture(texture) {
                log::warn!(
                    "ShadowRenderNode({}): Failed to destroy texture: {:?}",
                    self.base.name,
                    e
                );
            }
        }
        self.light_projections = LightProjections::default();
    }

    /// Comparison sampler the lit passes read the maps with.
    pub fn shadow_sampler_compare(&self) -> SamplerId {
        self.renderer.shadow_sampler_compare()
    }

    /// Plain sampler for reading raw depth.
    pub fn shadow_sampler_no_compare(&self) -> SamplerId {
        self.renderer.shadow_sampler_no_compare()
    }

    /// Advances the renderer's ring buffers to the next frame.
    pub fn next_frame(&mut self) {
        self.renderer.next_frame();
    }

    /// The scene view this node renders.
    pub fn scene_view(&self) -> SceneViewId {
        self.scene_view
    }

    /// Projections of the lights drawn by the last execution.
    pub fn light_projections(&self) -> &LightProjections {
        &self.light_projections
    }

    /// View of the whole shadow map array.
    pub fn shadow_texture(&self) -> Option<TextureViewId> {
        self.array_view
    }

    /// The depth texture array.
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// One single-layer view per shadow map.
    pub fn layer_views(&self) -> &[TextureViewId] {
        &self.layer_views
    }

    /// Width and height of each shadow map.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of shadow maps.
    pub fn light_count(&self) -> usize {
        self.light_count
    }

    /// Depth convention.
    pub fn reverse_depth(&self) -> bool {
        self.reverse_depth
    }

    fn skip(&self, context: &mut FrameContext<'_>, reason: &str) {
        log::trace!("ShadowRenderNode({}): {}", self.base.name, reason);
        context.stats.graph_nodes_skipped += 1;
    }
}

impl RenderGraphNode for ShadowRenderNode {
    fn base(&self) -> &RenderGraphNodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut RenderGraphNodeBase {
        &mut self.base
    }

    fn producer_output_texture(&self, key: ResourceKey) -> Option<TextureViewId> {
        (key == ResourceKey::SHADOW_MAPS)
            .then_some(self.array_view)
            .flatten()
    }

    fn execute(
        &mut self,
        context: &mut FrameContext<'_>,
        _inputs: &NodeInputs<'_>,
    ) -> Result<(), FrameError> {
        let Some(scene_view) = context.scene_views.get(self.scene_view) else {
            self.skip(context, "scene view is gone");
            return Ok(());
        };
        let (Some(scene_root), Some(camera)) = (scene_view.scene_root(), scene_view.camera())
        else {
            self.skip(context, "scene view has no scene root or camera");
            return Ok(());
        };
        let Some(content) = scene_root.content_layer().filter(|l| !l.meshes.is_empty()) else {
            self.skip(context, "no content meshes");
            return Ok(());
        };
        if self.texture.is_none() {
            self.skip(context, "shadow maps are not allocated");
            return Ok(());
        }

        let mut lights = scene_root.light_layer().lights.clone();
        lights.sort_by_key(|l| l.light_type.sort_rank());

        let mesh_spans = [content.meshes.as_slice()];
        self.renderer.render(ShadowRenderParameters {
            device: context.device,
            encoder: &mut *context.encoder,
            mesh_memory: &self.mesh_memory,
            view_camera: camera,
            mesh_spans: &mesh_spans,
            lights: &lights,
            skins: scene_root.skins(),
            materials: scene_root.materials(),
            layer_views: &self.layer_views,
            shadow_map_texture: self.array_view,
            light_projections: &mut self.light_projections,
            resolution: self.resolution,
            light_count: self.light_count,
            reverse_depth: self.reverse_depth,
            stats: &mut *context.stats,
        })?;
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.release_maps(device);
        self.renderer.destroy(device);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_lane::RenderGraph;
    use crate::test_support::{mesh_with_counts, run_frame, test_mesh_memory};
    use penumbra_core::item::ItemFlags;
    use penumbra_core::math::{Mat3, Mat4};
    use penumbra_core::renderer::headless::{HeadlessDevice, RecordedCommand};
    use penumbra_core::renderer::CompareFunction;
    use penumbra_core::scene::{
        Camera, LayerId, Light, LightId, LightType, SceneRoot, SceneView, SceneViews,
    };
    use std::sync::Arc;

    fn scene(lights: usize, index_count: u32) -> (SceneViews, SceneViewId) {
        let mut root = SceneRoot::new("scene");
        if let Some(layer) = root.mesh_layer_mut(LayerId::CONTENT) {
            layer.meshes.push(Arc::new(mesh_with_counts(
                1,
                ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST | ItemFlags::CONTENT,
                &[index_count],
            )));
        }
        for i in 0..lights {
            let mut light = Light::new(LightId(i as u64), format!("light {i}"), LightType::Directional);
            light.world_from_node = Mat4::from_rotation_x(-1.0);
            root.light_layer.lights.push(Arc::new(light));
        }
        let mut views = SceneViews::with_key();
        let id = views.insert(SceneView::new(
            "view",
            Some(Arc::new(root)),
            Some(Arc::new(Camera::new("camera"))),
        ));
        (views, id)
    }

    fn node(device: &HeadlessDevice, view: SceneViewId, resolution: u32, light_count: usize) -> ShadowRenderNode {
        ShadowRenderNode::new(
            device,
            "shadow",
            view,
            test_mesh_memory(),
            resolution,
            light_count,
            true,
            &RendererConfig::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_lights_is_inert() {
        let device = HeadlessDevice::new();
        let (views, id) = scene(0, 300);
        let mut graph = RenderGraph::new();
        let node_id = graph.register_node(Box::new(node(&device, id, 512, 0))).unwrap();

        let (result, stats) = run_frame(&device, &views, |context| graph.execute(context));
        result.unwrap();

        let shadow = graph.node_as::<ShadowRenderNode>(node_id).unwrap();
        assert!(shadow.texture().is_none());
        assert!(shadow.layer_views().is_empty());
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.render_pass_count(), 0);
        assert_eq!(stats.graph_nodes_skipped, 1);
    }

    #[test]
    fn test_one_light_renders_one_pass() {
        let device = HeadlessDevice::new();
        let (views, id) = scene(1, 300);
        let mut graph = RenderGraph::new();
        let node_id = graph.register_node(Box::new(node(&device, id, 512, 1))).unwrap();

        let (result, stats) = run_frame(&device, &views, |context| graph.execute(context));
        result.unwrap();

        let shadow = graph.node_as::<ShadowRenderNode>(node_id).unwrap();
        let projections = shadow.light_projections();
        assert_eq!(projections.len(), 1);
        let det = Mat3::from_mat4(projections.light_projection_transforms[0].clip_from_world)
            .determinant();
        assert!(det.abs() > 1e-8);
        assert_eq!(projections.shadow_map_texture, shadow.shadow_texture());
        assert!(projections.shadow_sampler_compare.is_some());

        assert_eq!(device.multi_draw_count(), 1);
        assert_eq!(device.render_pass_count(), 1);
        assert_eq!(stats.shadow_passes, 1);
        let clears: Vec<_> = device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginRenderPass { depth_clear, .. } => depth_clear,
                _ => None,
            })
            .collect();
        assert_eq!(clears, vec![0.0]);
    }

    #[test]
    fn test_layer_is_cleared_without_casters() {
        let device = HeadlessDevice::new();
        let (views, id) = scene(2, 0);
        let mut graph = RenderGraph::new();
        graph.register_node(Box::new(node(&device, id, 256, 2))).unwrap();

        let (result, _) = run_frame(&device, &views, |context| graph.execute(context));
        result.unwrap();

        assert_eq!(device.render_pass_count(), 2);
        assert_eq!(device.multi_draw_count(), 0);
    }

    #[test]
    fn test_reconfigure_is_idempotent() {
        let device = HeadlessDevice::new();
        let (_, id) = scene(0, 3);
        let mut shadow = node(&device, id, 512, 4);
        let counts = (device.live_texture_count(), device.live_view_count());
        assert_eq!(counts, (1, 5));

        shadow.reconfigure(&device, 512, 4, true).unwrap();
        assert_eq!((device.live_texture_count(), device.live_view_count()), counts);

        shadow.reconfigure(&device, 1024, 2, true).unwrap();
        assert_eq!((device.live_texture_count(), device.live_view_count()), (1, 3));
        let texture = device.texture(shadow.texture().unwrap()).unwrap();
        assert_eq!(texture.size.width, 1024);
        assert_eq!(texture.size.depth_or_array_layers, 2);
        for (layer, view) in shadow.layer_views().iter().enumerate() {
            assert_eq!(device.view(*view).unwrap().base_array_layer, layer as u32);
        }

        shadow.reconfigure(&device, 1024, 0, true).unwrap();
        assert_eq!((device.live_texture_count(), device.live_view_count()), (0, 0));
        assert!(shadow.shadow_texture().is_none());
    }

    #[test]
    fn test_reverse_depth_flip_swaps_comparison() {
        let device = HeadlessDevice::new();
        let (views, id) = scene(1, 300);
        let mut graph = RenderGraph::new();
        let node_id = graph.register_node(Box::new(node(&device, id, 512, 1))).unwrap();
        let reversed_sampler = graph
            .node_as::<ShadowRenderNode>(node_id)
            .unwrap()
            .shadow_sampler_compare();
        assert_eq!(
            device.sampler_compare(reversed_sampler),
            Some(Some(CompareFunction::Greater))
        );

        let shadow = graph.node_as_mut::<ShadowRenderNode>(node_id).unwrap();
        shadow.reconfigure(&device, 512, 1, false).unwrap();
        assert!(!shadow.reverse_depth());
        let sampler = shadow.shadow_sampler_compare();
        assert_eq!(device.sampler_compare(sampler), Some(Some(CompareFunction::Less)));
        assert_eq!(device.sampler_compare(reversed_sampler), None);
        assert_eq!(device.live_sampler_count(), 2);
        assert_eq!(device.live_texture_count(), 1);

        let (result, _) = run_frame(&device, &views, |context| graph.execute(context));
        result.unwrap();

        let shadow = graph.node_as::<ShadowRenderNode>(node_id).unwrap();
        let projections = shadow.light_projections();
        assert!(!projections.reverse_depth);
        assert_eq!(projections.shadow_sampler_compare, Some(sampler));

        let commands = device.commands();
        let clears: Vec<f32> = commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginRenderPass { depth_clear, .. } => *depth_clear,
                _ => None,
            })
            .collect();
        assert_eq!(clears, vec![1.0]);
        let depth_tests: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetPipeline { pipeline, .. } => device.pipeline(*pipeline),
                _ => None,
            })
            .map(|p| p.depth_compare)
            .collect();
        assert_eq!(depth_tests, vec![Some(CompareFunction::Less)]);
    }

    #[test]
    fn test_destroy_releases_gpu_resources() {
        let device = HeadlessDevice::new();
        let (_, id) = scene(0, 3);
        let mut shadow = node(&device, id, 128, 2);
        RenderGraphNode::destroy(&mut shadow, &device);

        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_view_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_sampler_count(), 0);
    }

    #[test]
    fn test_missing_scene_view_is_skipped() {
        let device = HeadlessDevice::new();
        let (mut views, id) = scene(1, 3);
        let mut graph = RenderGraph::new();
        graph.register_node(Box::new(node(&device, id, 128, 1))).unwrap();
        views.remove(id);

        let (result, stats) = run_frame(&device, &views, |context| graph.execute(context));
        result.unwrap();
        assert_eq!(device.render_pass_count(), 0);
        assert_eq!(stats.graph_nodes_executed, 1);
        assert_eq!(stats.graph_nodes_skipped, 1);
    }
}
