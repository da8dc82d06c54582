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

//! A [`GraphicsDevice`] that runs without a GPU.
//!
//! The headless device hands out unique handles from an atomic counter, keeps
//! track of which resources are alive, stores the bytes written to buffers and
//! records every command issued through its encoders. It backs the unit tests of
//! the render pipelines and lets a frame be driven end to end on machines
//! without a graphics adapter.

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::{CommandEncoder, GraphicsDevice, RenderPass};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A command recorded by a headless render pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A render pass was started.
    BeginRenderPass {
        /// Debug label of the pass.
        label: Option<String>,
        /// Color attachment views.
        color_views: Vec<TextureViewId>,
        /// Depth attachment view, if any.
        depth_view: Option<TextureViewId>,
        /// Depth clear value, if the depth attachment is cleared.
        depth_clear: Option<f32>,
    },
    /// The current render pass was dropped.
    EndRenderPass,
    /// A pipeline was bound.
    SetPipeline {
        /// The bound pipeline.
        pipeline: RenderPipelineId,
        /// Name of the overriding program, if any.
        shader_override: Option<String>,
    },
    /// The viewport was set.
    SetViewport(Viewport),
    /// A vertex buffer was bound.
    SetVertexBuffer {
        /// Vertex buffer slot.
        slot: u32,
        /// The bound buffer.
        buffer: BufferId,
    },
    /// An index buffer was bound.
    SetIndexBuffer {
        /// The bound buffer.
        buffer: BufferId,
        /// Index width.
        format: IndexFormat,
    },
    /// A buffer range was bound to a block binding point.
    BindBufferRange {
        /// Binding point.
        binding: u32,
        /// The bound range.
        range: BufferBinding,
    },
    /// A texture was bound to a unit.
    SetTexture {
        /// Texture unit.
        unit: u32,
        /// The bound view.
        view: TextureViewId,
        /// The bound sampler.
        sampler: SamplerId,
    },
    /// A non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Value added to each index.
        base_vertex: i32,
        /// Instance range.
        instances: Range<u32>,
    },
    /// A multi-draw-indirect call.
    MultiDrawIndexedIndirect {
        /// Buffer holding the draw commands.
        buffer: BufferId,
        /// Offset of the first command.
        offset: u64,
        /// Number of draws.
        draw_count: u32,
        /// Distance between commands.
        stride: u32,
    },
    /// A debug group was opened.
    PushDebugGroup(String),
    /// A debug group was closed.
    PopDebugGroup,
}

/// A texture alive on the headless device.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessTexture {
    /// Size of the texture.
    pub size: Extent3D,
    /// Texel format.
    pub format: TextureFormat,
}

/// A texture view alive on the headless device.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessTextureView {
    /// The viewed texture.
    pub texture: TextureId,
    /// First visible layer.
    pub base_array_layer: u32,
    /// Number of visible layers, `None` for all remaining layers.
    pub array_layer_count: Option<u32>,
}

/// A render pipeline alive on the headless device.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessPipeline {
    /// Descriptor label.
    pub label: String,
    /// Depth test, if the pipeline has a depth attachment.
    pub depth_compare: Option<CompareFunction>,
}

/// Everything the headless device knows about, guarded by one mutex.
#[derive(Debug, Default)]
pub struct HeadlessState {
    /// Contents of every live buffer.
    pub buffers: HashMap<BufferId, Vec<u8>>,
    /// Every live texture.
    pub textures: HashMap<TextureId, HeadlessTexture>,
    /// Every live texture view.
    pub views: HashMap<TextureViewId, HeadlessTextureView>,
    /// Every live sampler, with its comparison function.
    pub samplers: HashMap<SamplerId, Option<CompareFunction>>,
    /// Every live pipeline.
    pub pipelines: HashMap<RenderPipelineId, HeadlessPipeline>,
    /// Every live shader module.
    pub shader_modules: HashSet<ShaderModuleId>,
    /// Commands recorded by all encoders, in order.
    pub commands: Vec<RecordedCommand>,
    /// Number of command buffers submitted.
    pub submitted_command_buffers: u64,
    /// Total bytes passed to `write_buffer`.
    pub bytes_written: u64,
    /// When set, `create_buffer` fails once this many buffers are alive.
    pub buffer_limit: Option<usize>,
}

/// A recording, GPU-less implementation of [`GraphicsDevice`].
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    next_id: Arc<AtomicUsize>,
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicUsize::new(1)),
            state: Arc::new(Mutex::new(HeadlessState::default())),
        }
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Locks and returns the device state.
    pub fn state(&self) -> MutexGuard<'_, HeadlessState> {
        lock(&self.state)
    }

    /// A snapshot of all recorded commands.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    /// Forgets all recorded commands, keeping resources alive.
    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Counts recorded commands matching `predicate`.
    pub fn count_commands(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.state().commands.iter().filter(|c| predicate(c)).count()
    }

    /// Number of render passes begun.
    pub fn render_pass_count(&self) -> usize {
        self.count_commands(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
    }

    /// Number of multi-draw-indirect calls recorded.
    pub fn multi_draw_count(&self) -> usize {
        self.count_commands(|c| matches!(c, RecordedCommand::MultiDrawIndexedIndirect { .. }))
    }

    /// Number of non-indexed draws recorded.
    pub fn draw_count(&self) -> usize {
        self.count_commands(|c| matches!(c, RecordedCommand::Draw { .. }))
    }

    /// Number of live buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of live textures.
    pub fn live_texture_count(&self) -> usize {
        self.state().textures.len()
    }

    /// Number of live texture views.
    pub fn live_view_count(&self) -> usize {
        self.state().views.len()
    }

    /// Number of live samplers.
    pub fn live_sampler_count(&self) -> usize {
        self.state().samplers.len()
    }

    /// Number of live pipelines.
    pub fn live_pipeline_count(&self) -> usize {
        self.state().pipelines.len()
    }

    /// Comparison function of a live sampler; `None` if the sampler is not alive.
    pub fn sampler_compare(&self, id: SamplerId) -> Option<Option<CompareFunction>> {
        self.state().samplers.get(&id).copied()
    }

    /// Returns a pipeline's description if it is alive.
    pub fn pipeline(&self, id: RenderPipelineId) -> Option<HeadlessPipeline> {
        self.state().pipelines.get(&id).cloned()
    }

    /// Returns a texture's description if it is alive.
    pub fn texture(&self, id: TextureId) -> Option<HeadlessTexture> {
        self.state().textures.get(&id).cloned()
    }

    /// Returns a view's description if it is alive.
    pub fn view(&self, id: TextureViewId) -> Option<HeadlessTextureView> {
        self.state().views.get(&id).cloned()
    }

    /// Reads back `len` bytes of a buffer starting at `offset`.
    pub fn read_buffer(&self, id: BufferId, offset: u64, len: u64) -> Option<Vec<u8>> {
        let state = self.state();
        let data = state.buffers.get(&id)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        data.get(start..end).map(<[u8]>::to_vec)
    }
}

fn lock(state: &Mutex<HeadlessState>) -> MutexGuard<'_, HeadlessState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader_module(
        &self,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let id = ShaderModuleId(self.next());
        self.state().shader_modules.insert(id);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        if self.state().shader_modules.remove(&id) {
            Ok(())
        } else {
            Err(ResourceError::InvalidHandle)
        }
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let id = RenderPipelineId(self.next());
        let pipeline = HeadlessPipeline {
            label: descriptor.label.as_deref().unwrap_or("").to_string(),
            depth_compare: descriptor.depth_stencil.as_ref().map(|d| d.depth_compare),
        };
        self.state().pipelines.insert(id, pipeline);
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        match self.state().pipelines.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let size = usize::try_from(descriptor.size)
            .map_err(|_| ResourceError::InvalidDescriptor("buffer too large".to_string()))?;
        let mut state = self.state();
        if state.buffer_limit.is_some_and(|limit| state.buffers.len() >= limit) {
            return Err(ResourceError::BackendError("out of device memory".to_string()));
        }
        let id = BufferId(self.next());
        state.buffers.insert(id, vec![0; size]);
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        match self.state().buffers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        let start = usize::try_from(offset).map_err(|_| ResourceError::OutOfBounds)?;
        let end = start
            .checked_add(data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        let target = buffer
            .get_mut(start..end)
            .ok_or(ResourceError::OutOfBounds)?;
        target.copy_from_slice(data);
        state.bytes_written += data.len() as u64;
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let size = descriptor.size;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "zero-sized texture {:?}",
                descriptor.label
            )));
        }
        let id = TextureId(self.next());
        log::trace!(
            "HeadlessDevice: created texture {:?} {}x{}x{} {:?}",
            id,
            size.width,
            size.height,
            size.depth_or_array_layers,
            descriptor.format
        );
        self.state().textures.insert(
            id,
            HeadlessTexture {
                size,
                format: descriptor.format,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        match self.state().textures.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let mut state = self.state();
        let texture = state
            .textures
            .get(&texture_id)
            .ok_or(ResourceError::InvalidHandle)?;
        let layers = texture.size.depth_or_array_layers;
        let base = descriptor.base_array_layer;
        let in_bounds = match descriptor.array_layer_count {
            Some(count) => base.checked_add(count).is_some_and(|end| end <= layers),
            None => base < layers,
        };
        if !in_bounds {
            return Err(ResourceError::OutOfBounds);
        }
        let id = TextureViewId(self.next());
        state.views.insert(
            id,
            HeadlessTextureView {
                texture: texture_id,
                base_array_layer: descriptor.base_array_layer,
                array_layer_count: descriptor.array_layer_count,
            },
        );
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        match self.state().views.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let id = SamplerId(self.next());
        self.state().samplers.insert(id, descriptor.compare);
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        match self.state().samplers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder {
            state: self.state.clone(),
            id: self.next() as u64,
        })
    }

    fn submit_command_buffer(&self, _command_buffer: CommandBufferId) {
        self.state().submitted_command_buffers += 1;
    }
}

/// Command encoder of the [`HeadlessDevice`].
#[derive(Debug)]
pub struct HeadlessCommandEncoder {
    state: Arc<Mutex<HeadlessState>>,
    id: u64,
}

impl HeadlessCommandEncoder {
    /// Creates an encoder recording into `device`.
    pub fn new(device: &HeadlessDevice) -> Self {
        Self {
            state: device.state.clone(),
            id: device.next() as u64,
        }
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        let depth = descriptor.depth_stencil_attachment;
        let depth_clear = depth.and_then(|d| d.depth_ops).and_then(|ops| match ops.load {
            LoadOp::Clear(value) => Some(value),
            LoadOp::Load => None,
        });
        lock(&self.state)
            .commands
            .push(RecordedCommand::BeginRenderPass {
                label: descriptor.label.map(str::to_string),
                color_views: descriptor
                    .color_attachments
                    .iter()
                    .map(|a| a.view)
                    .collect(),
                depth_view: depth.map(|d| d.view),
                depth_clear,
            });
        Box::new(HeadlessRenderPass {
            state: &self.state,
            _encoder: PhantomData,
        })
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        CommandBufferId(self.id)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct HeadlessRenderPass<'pass> {
    state: &'pass Mutex<HeadlessState>,
    _encoder: PhantomData<&'pass mut ()>,
}

impl HeadlessRenderPass<'_> {
    fn record(&mut self, command: RecordedCommand) {
        lock(self.state).commands.push(command);
    }
}

impl Drop for HeadlessRenderPass<'_> {
    fn drop(&mut self) {
        self.record(RecordedCommand::EndRenderPass);
    }
}

impl<'pass> RenderPass<'pass> for HeadlessRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId, shader_override: Option<&ShaderStages>) {
        self.record(RecordedCommand::SetPipeline {
            pipeline,
            shader_override: shader_override.map(|s| s.name.clone()),
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(RecordedCommand::SetViewport(*viewport));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, index_format: IndexFormat) {
        self.record(RecordedCommand::SetIndexBuffer {
            buffer,
            format: index_format,
        });
    }

    fn bind_buffer_range(&mut self, binding: u32, range: &BufferBinding) {
        self.record(RecordedCommand::BindBufferRange {
            binding,
            range: *range,
        });
    }

    fn set_texture(&mut self, unit: u32, view: TextureViewId, sampler: SamplerId) {
        self.record(RecordedCommand::SetTexture {
            unit,
            view,
            sampler,
        });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn multi_draw_indexed_indirect(
        &mut self,
        indirect_buffer: BufferId,
        indirect_offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.record(RecordedCommand::MultiDrawIndexedIndirect {
            buffer: indirect_buffer,
            offset: indirect_offset,
            draw_count,
            stride,
        });
    }

    fn push_debug_group(&mut self, label: &str) {
        self.record(RecordedCommand::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.record(RecordedCommand::PopDebugGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn depth_array(layers: u32) -> TextureDescriptor<'static> {
        TextureDescriptor {
            label: Some(Cow::Borrowed("test depth")),
            size: Extent3D {
                width: 64,
                height: 64,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    #[test]
    fn test_buffer_write_and_read_back() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap();

        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();

        assert_eq!(device.read_buffer(buffer, 4, 4), Some(vec![1, 2, 3, 4]));
        assert_eq!(device.state().bytes_written, 4);
    }

    #[test]
    fn test_buffer_write_out_of_bounds_fails() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 8,
                usage: BufferUsage::STORAGE,
                mapped_at_creation: false,
            })
            .unwrap();

        let result = device.write_buffer(buffer, 4, &[0; 8]);
        assert_eq!(result, Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_resource_accounting() {
        let device = HeadlessDevice::new();
        let texture = device.create_texture(&depth_array(2)).unwrap();
        let view = device
            .create_texture_view(
                texture,
                &TextureViewDescriptor {
                    base_array_layer: 1,
                    array_layer_count: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(device.live_view_count(), 1);
        assert_eq!(device.view(view).unwrap().base_array_layer, 1);

        device.destroy_texture_view(view).unwrap();
        device.destroy_texture(texture).unwrap();
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_view_count(), 0);
        assert!(device.destroy_texture(texture).is_err());
    }

    #[test]
    fn test_samplers_and_pipelines_keep_their_compare() {
        let device = HeadlessDevice::new();
        let sampler = device
            .create_sampler(&SamplerDescriptor {
                compare: Some(CompareFunction::Less),
                ..Default::default()
            })
            .unwrap();
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(Cow::Borrowed("depth")),
                depth_stencil: Some(DepthStencilState {
                    format: TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: CompareFunction::Greater,
                    stencil: None,
                }),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(device.sampler_compare(sampler), Some(Some(CompareFunction::Less)));
        let described = device.pipeline(pipeline).unwrap();
        assert_eq!(described.label, "depth");
        assert_eq!(described.depth_compare, Some(CompareFunction::Greater));

        device.destroy_sampler(sampler).unwrap();
        assert_eq!(device.sampler_compare(sampler), None);
        assert!(device.destroy_sampler(sampler).is_err());
    }

    #[test]
    fn test_view_past_last_layer_fails() {
        let device = HeadlessDevice::new();
        let texture = device.create_texture(&depth_array(2)).unwrap();
        let result = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                base_array_layer: 2,
                array_layer_count: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(result, Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn test_zero_sized_texture_is_rejected() {
        let device = HeadlessDevice::new();
        assert!(device.create_texture(&depth_array(0)).is_err());
    }

    #[test]
    fn test_render_pass_records_commands() {
        let device = HeadlessDevice::new();
        let mut encoder = device.create_command_encoder(Some("test"));
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: TextureViewId(99),
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(0.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
            });
            pass.draw(0..3, 0..1);
            pass.multi_draw_indexed_indirect(BufferId(1), 0, 4, 20);
        }
        let command_buffer = encoder.finish();
        device.submit_command_buffer(command_buffer);

        let commands = device.commands();
        assert_eq!(commands.len(), 4);
        assert_eq!(
            commands[0],
            RecordedCommand::BeginRenderPass {
                label: Some("pass".to_string()),
                color_views: vec![],
                depth_view: Some(TextureViewId(99)),
                depth_clear: Some(0.0),
            }
        );
        assert_eq!(commands[3], RecordedCommand::EndRenderPass);
        assert_eq!(device.multi_draw_count(), 1);
        assert_eq!(device.draw_count(), 1);
        assert_eq!(device.state().submitted_command_buffers, 1);
    }
}
