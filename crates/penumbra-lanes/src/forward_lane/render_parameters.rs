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

//! Inputs of the forward renderer.

use super::pipeline_pass::PipelinePass;
use crate::buffer_lane::PrimitiveInterfaceSettings;
use crate::shadow_lane::LightProjections;
use penumbra_core::item::ItemFilter;
use penumbra_core::math::{UVec4, Vec4};
use penumbra_core::renderer::{ShaderStages, Viewport};
use penumbra_core::scene::{
    Camera, Light, Material, Mesh, MeshMemory, PrimitiveMode, Skin,
};
use std::sync::Arc;

/// Everything one forward renderer call reads.
///
/// Built per composition pass and viewport. Start from
/// [`RenderParameters::new`] and override fields with struct update syntax.
#[derive(Debug, Clone)]
pub struct RenderParameters<'a> {
    /// Shared vertex and index buffers.
    pub mesh_memory: &'a MeshMemory,
    /// Ambient term of the light block.
    pub ambient_light: Vec4,
    /// The viewing camera. Without one the camera block is left unbound.
    pub camera: Option<&'a Camera>,
    /// Shadow projections and maps of the viewed scene.
    pub light_projections: Option<&'a LightProjections>,
    /// Lights of the scene.
    pub lights: &'a [Arc<Light>],
    /// Skins of the scene.
    pub skins: &'a [Arc<Skin>],
    /// Materials of the scene.
    pub materials: &'a [Arc<Material>],
    /// Mesh layers drawn, in order.
    pub mesh_spans: &'a [&'a [Arc<Mesh>]],
    /// Vertex count of full-screen draws.
    pub non_mesh_vertex_count: u32,
    /// Pipeline passes, drawn in order.
    pub passes: &'a [Arc<PipelinePass>],
    /// Index stream drawn.
    pub primitive_mode: PrimitiveMode,
    /// Color and size selection of the primitive records.
    pub primitive_settings: PrimitiveInterfaceSettings,
    /// Target rectangle and depth convention.
    pub viewport: Viewport,
    /// Mesh filter.
    pub filter: ItemFilter,
    /// Program replacing every pass's own.
    pub override_shader_stages: Option<&'a ShaderStages>,
    /// Program used when a pass's program failed to build.
    pub error_shader_stages: Option<&'a ShaderStages>,
    /// Joints highlighted by the debug joint colors.
    pub debug_joint_indices: UVec4,
    /// Debug joint color table.
    pub debug_joint_colors: &'a [Vec4],
    /// Label of the debug group and log messages.
    pub debug_label: &'a str,
}

impl<'a> RenderParameters<'a> {
    /// Parameters that draw nothing into `viewport`.
    pub fn new(mesh_memory: &'a MeshMemory, viewport: Viewport, debug_label: &'a str) -> Self {
        Self {
            mesh_memory,
            ambient_light: Vec4::ZERO,
            camera: None,
            light_projections: None,
            lights: &[],
            skins: &[],
            materials: &[],
            mesh_spans: &[],
            non_mesh_vertex_count: 0,
            passes: &[],
            primitive_mode: PrimitiveMode::PolygonFill,
            primitive_settings: PrimitiveInterfaceSettings::default(),
            viewport,
            filter: ItemFilter::default(),
            override_shader_stages: None,
            error_shader_stages: None,
            debug_joint_indices: UVec4::ZERO,
            debug_joint_colors: &[],
            debug_label,
        }
    }

    /// Whether the lit passes sample the shadow maps.
    pub fn shadows_enabled(&self) -> bool {
        !self.lights.is_empty()
            && self
                .light_projections
                .is_some_and(|p| p.shadow_map_texture.is_some())
    }
}
