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

//! Forward rendering: pipeline passes, render parameters and the renderer
//! that packs and draws mesh spans.

mod forward_renderer;
mod pipeline_pass;
mod render_parameters;

pub use forward_renderer::{ForwardRenderer, FULLSCREEN_VERTEX_COUNT};
pub use pipeline_pass::{PassHook, PipelinePass};
pub use render_parameters::RenderParameters;
