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

//! # Penumbra Lanes
//!
//! The hot path of the renderer: per-frame GPU buffer packing, the render graph,
//! shadow map rendering, forward rendering and the composition passes a viewport
//! is drawn with.
//!
//! [`app_rendering::AppRendering`] ties everything together and is the entry point
//! used by the host application once per frame.

#![warn(missing_docs)]

pub mod app_rendering;
pub mod buffer_lane;
pub mod composition_lane;
pub mod error;
pub mod forward_lane;
pub mod graph_lane;
pub mod shadow_lane;

#[cfg(test)]
mod test_support;

pub use app_rendering::{AppRendering, Programs, Renderable, ViewportTarget};
pub use error::{FrameError, RenderGraphError};
