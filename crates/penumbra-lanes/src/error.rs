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

//! Error types of the render graph and of frame recording.

use penumbra_core::renderer::ResourceError;
use thiserror::Error;

/// An error raised while building or running the render graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderGraphError {
    /// The enabled nodes form a cycle; nothing was executed.
    #[error("Render graph contains a cycle through: {}", nodes.join(", "))]
    Cycle {
        /// Names of the nodes that could not be ordered.
        nodes: Vec<String>,
    },

    /// The handle does not refer to a registered node.
    #[error("Unknown render graph node")]
    UnknownNode,

    /// A node with the same name is already registered.
    #[error("Render graph node '{0}' is already registered")]
    DuplicateNode(String),
}

/// An error raised while recording a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A GPU resource operation failed.
    #[error("GPU resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The render graph could not run.
    #[error(transparent)]
    Graph(#[from] RenderGraphError),
}
