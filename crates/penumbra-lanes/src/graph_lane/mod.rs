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

//! The render graph.
//!
//! Nodes declare input and output pins keyed by [`ResourceKey`]. Connections
//! link a producer's output to a consumer's input, and the graph executes the
//! enabled nodes in dependency order once per frame.

mod node;
mod render_graph;

pub use self::node::{FrameContext, Pin, RenderGraphNode, RenderGraphNodeBase, ResourceKey, Routing};
pub use self::render_graph::{NodeInputs, RenderGraph};
