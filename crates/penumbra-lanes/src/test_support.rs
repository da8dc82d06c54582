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

//! Scene and buffer helpers shared by the unit tests.

use crate::buffer_lane::BufferRange;
use crate::forward_lane::PipelinePass;
use crate::graph_lane::FrameContext;
use bytemuck::Pod;
use penumbra_core::item::ItemFlags;
use penumbra_core::renderer::headless::HeadlessDevice;
use penumbra_core::renderer::{
    BufferId, GraphicsDevice, IndexFormat, RenderPipelineDescriptor, ShaderModuleId,
    ShaderStages, VertexInputId,
};
use penumbra_core::scene::{
    IndexRange, Mesh, MeshId, MeshMemory, Primitive, PrimitiveGeometry, PrimitiveMode,
    SceneViews,
};
use penumbra_telemetry::RenderStats;
use std::borrow::Cow;
use std::sync::Arc;

/// A mesh with one polygon-fill primitive per entry of `counts`, laid out back to back.
pub fn mesh_with_counts(id: u64, flags: ItemFlags, counts: &[u32]) -> Mesh {
    let mut mesh = Mesh::new(MeshId(id), format!("mesh {id}")).with_flags(flags);
    let mut base_index = 0;
    for &index_count in counts {
        let geometry = PrimitiveGeometry::new(base_index, 0).with_range(
            PrimitiveMode::PolygonFill,
            IndexRange {
                first_index: 0,
                index_count,
            },
        );
        mesh = mesh.with_primitive(Primitive {
            material: None,
            geometry,
        });
        base_index += index_count;
    }
    mesh
}

/// Mesh memory pointing at buffers the headless device never allocated.
pub fn test_mesh_memory() -> MeshMemory {
    MeshMemory {
        vertex_buffer: BufferId(9000),
        index_buffer: BufferId(9001),
        index_format: IndexFormat::Uint32,
        vertex_input: VertexInputId(0),
    }
}

/// Reads back the records written to `range`.
pub fn read_records<T: Pod>(device: &HeadlessDevice, range: &BufferRange) -> Vec<T> {
    let bytes = device
        .read_buffer(range.buffer, range.offset, range.size)
        .expect("range was never written");
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Runs `f` with a frame context recording into `device`.
pub fn run_frame<R>(
    device: &HeadlessDevice,
    scene_views: &SceneViews,
    f: impl FnOnce(&mut FrameContext<'_>) -> R,
) -> (R, RenderStats) {
    let mut encoder = device.create_command_encoder(Some("test frame"));
    let mut stats = RenderStats::default();
    let result = {
        let mut context = FrameContext {
            device,
            encoder: encoder.as_mut(),
            scene_views,
            stats: &mut stats,
            time_seconds: 0.0,
        };
        f(&mut context)
    };
    (result, stats)
}

/// A program named `name`.
pub fn test_stages(name: &str, valid: bool) -> ShaderStages {
    ShaderStages {
        name: name.to_string(),
        vertex: ShaderModuleId(1),
        fragment: Some(ShaderModuleId(2)),
        valid,
    }
}

/// A pipeline pass named `name` drawing with `stages`.
pub fn test_pipeline_pass(
    device: &HeadlessDevice,
    name: &str,
    stages: Option<ShaderStages>,
) -> Arc<PipelinePass> {
    let pass = PipelinePass::new(
        device,
        &RenderPipelineDescriptor {
            label: Some(Cow::Owned(name.to_string())),
            shader_stages: stages,
            ..Default::default()
        },
    )
    .expect("headless pipeline creation does not fail");
    Arc::new(pass)
}
