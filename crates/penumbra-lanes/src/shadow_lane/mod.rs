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

//! Shadow map rendering: light projections, the depth-only renderer and the
//! render graph nodes built on it.

mod depth_visualization_node;
mod light_projections;
mod shadow_render_node;
mod shadow_renderer;

pub use depth_visualization_node::DepthVisualizationNode;
pub use light_projections::{
    texture_from_clip, LightProjectionParameters, LightProjectionTransforms, LightProjections,
    LOCAL_LIGHT_DEFAULT_FAR, LOCAL_LIGHT_NEAR, MIN_LIGHT_FOV,
};
pub use shadow_render_node::ShadowRenderNode;
pub use shadow_renderer::{
    ShadowRenderParameters, ShadowRenderer, PIPELINE_CACHE_SIZE, SHADOW_FILTER,
};
