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

//! Pipeline state objects, shader stage bundles and vertex input handles.

use crate::renderer::api::texture::{CompareFunction, TextureFormat};
use std::borrow::Cow;

/// An opaque handle to a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(pub usize);

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderModuleId(pub usize);

/// An opaque handle to a vertex input layout (attribute formats and strides).
///
/// Pipelines are only compatible with the vertex input they were created for,
/// which is why pipeline caches key on this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexInputId(pub usize);

/// A descriptor used to create a [`ShaderModuleId`].
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Backend specific source text.
    pub source: Cow<'a, str>,
}

/// A named bundle of linked shader stages.
///
/// Shader compilation happens outside the renderer: a bundle that failed to
/// build is still handed over, marked invalid, and the renderer substitutes an
/// error program for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStages {
    /// Debug name of the program.
    pub name: String,
    /// The vertex stage.
    pub vertex: ShaderModuleId,
    /// The fragment stage, absent for depth-only programs.
    pub fragment: Option<ShaderModuleId>,
    /// Whether the stages compiled and linked.
    pub valid: bool,
}

impl ShaderStages {
    /// Returns `true` if the stages can be used for drawing.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList,
    /// Each pair of vertices is a line.
    LineList,
    /// Each triple of vertices is a triangle.
    #[default]
    TriangleList,
}

/// Which triangle faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Nothing is culled.
    #[default]
    None,
    /// Front faces are culled.
    Front,
    /// Back faces are culled.
    Back,
}

/// The winding that defines a front face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise triangles face forward.
    #[default]
    Ccw,
    /// Clockwise triangles face forward (mirrored geometry).
    Cw,
}

/// Stencil buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    /// Keep the current value.
    Keep,
    /// Replace with the reference value.
    Replace,
    /// Set to zero.
    Zero,
    /// Increment, clamping at the maximum value.
    IncrementClamp,
}

/// Stencil state shared by front and back faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Stencil comparison.
    pub compare: CompareFunction,
    /// Operation applied when stencil and depth pass.
    pub pass_op: StencilOperation,
    /// Operation applied when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Operation applied when stencil passes but depth fails.
    pub depth_fail_op: StencilOperation,
    /// Reference value.
    pub reference: u32,
    /// Mask applied when reading.
    pub read_mask: u32,
    /// Mask applied when writing.
    pub write_mask: u32,
}

/// Depth and stencil state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Depth attachment format.
    pub format: TextureFormat,
    /// Whether depth is written.
    pub depth_write_enabled: bool,
    /// Depth comparison; `Always` disables depth testing.
    pub depth_compare: CompareFunction,
    /// Optional stencil test.
    pub stencil: Option<StencilState>,
}

/// Color blending preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending.
    #[default]
    Opaque,
    /// Premultiplied alpha blending.
    Translucent,
}

/// A descriptor used to create a [`RenderPipelineId`].
#[derive(Debug, Clone, Default)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The program; `None` lets the caller bind shader stages per draw.
    pub shader_stages: Option<ShaderStages>,
    /// The vertex input layout; `None` for pipelines that generate vertices.
    pub vertex_input: Option<VertexInputId>,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Culling.
    pub cull_mode: CullMode,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Depth/stencil state; `None` when there is no depth attachment.
    pub depth_stencil: Option<DepthStencilState>,
    /// Color target format; `None` for depth-only pipelines.
    pub color_format: Option<TextureFormat>,
    /// Whether color writes are enabled at all.
    pub color_writes_enabled: bool,
    /// Blending for the color target.
    pub blend: BlendMode,
}
