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

//! Descriptors used to record render passes, and the command buffer handle.

use crate::renderer::api::texture::TextureViewId;

/// An opaque handle to a recorded command buffer that is ready for submission.
///
/// This ID is returned by [`CommandEncoder::finish`] and consumed by
/// [`GraphicsDevice::submit_command_buffer`].
///
/// [`CommandEncoder::finish`]: crate::renderer::CommandEncoder::finish
/// [`GraphicsDevice::submit_command_buffer`]: crate::renderer::GraphicsDevice::submit_command_buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass will be stored to the attachment's memory.
    Store,
    /// The results of the render pass will be discarded.
    Discard,
}

/// Defines the load and store operations for a single render pass attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

/// A color attachment of a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassColorAttachment {
    /// The view rendered to.
    pub view: TextureViewId,
    /// Load/store operations, clearing to an RGBA color.
    pub ops: Operations<[f32; 4]>,
}

/// The depth/stencil attachment of a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDepthStencilAttachment {
    /// The depth view rendered to. For array textures this is a single-layer view.
    pub view: TextureViewId,
    /// The load and store operations for the depth aspect.
    pub depth_ops: Option<Operations<f32>>,
    /// The load and store operations for the stencil aspect.
    pub stencil_ops: Option<Operations<u32>>,
}

/// A descriptor for a render pass.
#[derive(Clone, Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// Color attachments used by the pass.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth/stencil attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}
