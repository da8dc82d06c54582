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

//! GPU-side layouts of the records written by the buffer packers.
//!
//! Every record is `#[repr(C)]` and `Pod` so it can be written with
//! `bytemuck::bytes_of`. Strides are multiples of 16 bytes to match std430 array
//! layout, except for [`DrawIndexedIndirectCommand`] whose layout is fixed by the
//! graphics API.

use bytemuck::{Pod, Zeroable};
use penumbra_core::math::Mat4;

/// Marks an unused texture slot or a light without a shadow map.
pub const INVALID_INDEX: u32 = u32::MAX;

/// Column-major 4x4 matrix as laid out in GPU memory.
pub type GpuMat4 = [[f32; 4]; 4];

/// Converts a matrix to its GPU layout.
pub fn gpu_mat4(m: &Mat4) -> GpuMat4 {
    m.to_cols_array_2d()
}

/// Per-primitive data, indexed by draw id.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PrimitiveRecord {
    /// Node transform.
    pub world_from_node: GpuMat4,
    /// Cofactor of the node transform, for normals.
    pub world_from_node_cofactor: GpuMat4,
    /// Color selected by the primitive color source.
    pub color: [f32; 4],
    /// Index into the material block.
    pub material_index: u32,
    /// Point size or line width selected by the size source.
    pub size: f32,
    /// 1.0 for skinned meshes, 0.0 otherwise.
    pub skinning_factor: f32,
    /// First joint of the mesh's skin in the joint block.
    pub base_joint_index: u32,
}

/// Per-material data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialRecord {
    /// Anisotropic roughness.
    pub roughness: [f32; 2],
    /// Metalness.
    pub metallic: f32,
    /// Dielectric reflectance.
    pub reflectance: f32,
    /// Base color.
    pub base_color: [f32; 4],
    /// Emissive color, w unused.
    pub emissive: [f32; 4],
    /// Opacity.
    pub opacity: f32,
    /// Texture slot of the base color texture or [`INVALID_INDEX`].
    pub base_color_texture: u32,
    /// Texture slot of the metallic-roughness texture or [`INVALID_INDEX`].
    pub metallic_roughness_texture: u32,
    /// Padding.
    pub _padding: u32,
}

/// Header of the light block, followed by one [`LightRecord`] per light.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightBlockHeader {
    /// Texture unit of the shadow map array.
    pub shadow_texture: u32,
    /// Width and height of a shadow map layer.
    pub shadow_map_size: u32,
    /// Number of directional lights.
    pub directional_light_count: u32,
    /// Number of spot lights.
    pub spot_light_count: u32,
    /// Number of point lights.
    pub point_light_count: u32,
    /// Padding.
    pub _padding: [u32; 3],
    /// Ambient light color.
    pub ambient_light: [f32; 4],
}

/// Per-light data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightRecord {
    /// Light view-projection used to render the shadow map.
    pub clip_from_world: GpuMat4,
    /// Light view-projection followed by the clip to texture mapping.
    pub texture_from_world: GpuMat4,
    /// Position, cosine of the inner cone angle.
    pub position_and_inner_spot_cos: [f32; 4],
    /// Direction, cosine of the outer cone angle.
    pub direction_and_outer_spot_cos: [f32; 4],
    /// Radiance, range.
    pub radiance_and_range: [f32; 4],
    /// Shadow map layer in x, or [`INVALID_INDEX`].
    pub shadow_params: [u32; 4],
}

/// Selects the light a shadow or full-screen pass is rendered for.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightControlRecord {
    /// Index of the light in the light block.
    pub light_index: u32,
    /// Padding.
    pub _padding: [u32; 3],
}

/// Header of the joint block.
///
/// It is followed by the debug color table (one `[f32; 4]` per entry, padded to
/// the configured maximum) and then one [`JointRecord`] per joint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct JointBlockHeader {
    /// Joints highlighted by the debug visualization.
    pub debug_joint_indices: [u32; 4],
    /// Number of valid entries in the debug color table.
    pub debug_joint_color_count: u32,
    /// Padding.
    pub _padding: [u32; 3],
}

/// Per-joint data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct JointRecord {
    /// Bind pose to world transform.
    pub world_from_bind: GpuMat4,
    /// Cofactor of `world_from_bind`, for normals.
    pub world_from_bind_cofactor: GpuMat4,
}

/// Per-view camera data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraRecord {
    /// Camera node transform.
    pub world_from_node: GpuMat4,
    /// Inverse view-projection.
    pub world_from_clip: GpuMat4,
    /// View-projection.
    pub clip_from_world: GpuMat4,
    /// Viewport x, y, width, height.
    pub viewport: [f32; 4],
    /// Horizontal and vertical field of view, aspect ratio, unused.
    pub fov: [f32; 4],
    /// 1.0 for forward depth, -1.0 for reverse depth.
    pub clip_depth_direction: f32,
    /// Near plane distance.
    pub view_depth_near: f32,
    /// Far plane distance.
    pub view_depth_far: f32,
    /// Exposure.
    pub exposure: f32,
}

/// Arguments of one indexed indirect draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    /// Number of indices drawn.
    pub index_count: u32,
    /// Number of instances drawn.
    pub instance_count: u32,
    /// First index in the index buffer.
    pub first_index: u32,
    /// Value added to each index.
    pub base_vertex: i32,
    /// First instance.
    pub first_instance: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_record_strides_are_multiples_of_16() {
        assert_eq!(size_of::<PrimitiveRecord>(), 160);
        assert_eq!(size_of::<MaterialRecord>(), 64);
        assert_eq!(size_of::<LightBlockHeader>(), 48);
        assert_eq!(size_of::<LightRecord>(), 192);
        assert_eq!(size_of::<LightControlRecord>(), 16);
        assert_eq!(size_of::<JointBlockHeader>(), 32);
        assert_eq!(size_of::<JointRecord>(), 128);
        assert_eq!(size_of::<CameraRecord>() % 16, 0);
        assert_eq!(size_of::<DrawIndexedIndirectCommand>(), 20);
    }
}
