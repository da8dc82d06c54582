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

use crate::renderer::api::{
    BufferBinding, BufferId, CommandBufferId, IndexFormat, RenderPassDescriptor,
    RenderPipelineId, SamplerId, ShaderStages, TextureViewId, Viewport,
};
use std::any::Any;
use std::ops::Range;

/// A trait representing an active render pass, used for recording drawing commands.
///
/// A `RenderPass` object is obtained from a [`CommandEncoder`] and provides methods
/// to set pipeline state, bind buffers and textures, and issue draw calls.
///
/// The `'pass` lifetime ensures that the pass object cannot outlive the [`CommandEncoder`]
/// that created it. Dropping the pass ends it.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline for subsequent draw calls.
    ///
    /// When `shader_override` is set, its stages replace the pipeline's own program.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId, shader_override: Option<&ShaderStages>);

    /// Restricts rasterization to the given viewport.
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Binds a byte range of a buffer to a shader block binding point.
    fn bind_buffer_range(&mut self, binding: u32, range: &BufferBinding);

    /// Binds a texture view and sampler to a texture unit.
    fn set_texture(&mut self, unit: u32, view: TextureViewId, sampler: SamplerId);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Records `draw_count` indexed draws whose arguments are read from `indirect_buffer`.
    ///
    /// Each command is `stride` bytes apart, starting at `indirect_offset`.
    fn multi_draw_indexed_indirect(
        &mut self,
        indirect_buffer: BufferId,
        indirect_offset: u64,
        draw_count: u32,
        stride: u32,
    );

    /// Opens a named debug group, visible in GPU capture tools.
    fn push_debug_group(&mut self, label: &str);

    /// Closes the innermost debug group.
    fn pop_debug_group(&mut self);
}

/// A trait for an object that records a sequence of GPU commands.
///
/// A `CommandEncoder` is the main tool for building a [`CommandBufferId`]. It
/// creates render passes, one at a time.
pub trait CommandEncoder {
    /// Begins a new render pass, returning a mutable `RenderPass` object.
    ///
    /// The returned `RenderPass` object borrows the encoder mutably, so only one
    /// pass can be active at a time. When the `RenderPass` object is dropped,
    /// the pass is ended.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    ///
    /// This method consumes the encoder. The returned [`CommandBufferId`] can then
    /// be submitted to the [`GraphicsDevice`]'s command queue.
    ///
    /// [`GraphicsDevice`]: crate::renderer::GraphicsDevice
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
