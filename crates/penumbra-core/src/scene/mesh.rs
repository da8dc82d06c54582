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

use super::{Material, MeshId, SkinId};
use crate::item::ItemFlags;
use crate::math::{Mat4, Vec4};
use crate::renderer::api::{BufferId, IndexFormat, VertexInputId};
use std::sync::Arc;

/// Which index stream of a primitive is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    /// Filled triangles.
    #[default]
    PolygonFill,
    /// Polygon edges as lines.
    EdgeLines,
    /// Polygon corners as points.
    CornerPoints,
    /// Corner normals as short lines.
    CornerNormals,
    /// One point per polygon centroid.
    PolygonCentroids,
}

impl PrimitiveMode {
    /// Every mode, in declaration order.
    pub const ALL: [PrimitiveMode; 5] = [
        PrimitiveMode::PolygonFill,
        PrimitiveMode::EdgeLines,
        PrimitiveMode::CornerPoints,
        PrimitiveMode::CornerNormals,
        PrimitiveMode::PolygonCentroids,
    ];

    /// Position of the mode in [`PrimitiveMode::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveMode::PolygonFill => "polygon_fill",
            PrimitiveMode::EdgeLines => "edge_lines",
            PrimitiveMode::CornerPoints => "corner_points",
            PrimitiveMode::CornerNormals => "corner_normals",
            PrimitiveMode::PolygonCentroids => "polygon_centroids",
        }
    }
}

/// A range of indices inside the shared index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexRange {
    /// First index, relative to the primitive's `base_index`.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
}

/// Where a primitive's vertices and indices live in the shared mesh memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrimitiveGeometry {
    /// Offset of the primitive's first index in the index buffer.
    pub base_index: u32,
    /// Value added to every index before fetching a vertex.
    pub base_vertex: i32,
    ranges: [IndexRange; 5],
}

impl PrimitiveGeometry {
    /// Creates geometry with no index ranges.
    pub fn new(base_index: u32, base_vertex: i32) -> Self {
        Self {
            base_index,
            base_vertex,
            ranges: [IndexRange::default(); 5],
        }
    }

    /// Sets the index range drawn for `mode`.
    pub fn with_range(mut self, mode: PrimitiveMode, range: IndexRange) -> Self {
        self.ranges[mode.index()] = range;
        self
    }

    /// The index range drawn for `mode`; empty if the mode has no indices.
    pub fn index_range(&self, mode: PrimitiveMode) -> IndexRange {
        self.ranges[mode.index()]
    }
}

/// One drawable part of a mesh.
#[derive(Debug, Clone, Default)]
pub struct Primitive {
    /// Surface material, `None` draws with material slot 0.
    pub material: Option<Arc<Material>>,
    /// Location of the geometry in mesh memory.
    pub geometry: PrimitiveGeometry,
}

/// A joint of a skin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    /// Transform from bind pose to world space.
    pub world_from_bind: Mat4,
}

/// A set of joints deforming skinned meshes.
#[derive(Debug, Clone)]
pub struct Skin {
    /// Stable identity.
    pub id: SkinId,
    /// Debug name.
    pub name: String,
    /// Joints, in shader order.
    pub joints: Vec<Joint>,
}

/// A renderable scene item.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Stable identity.
    pub id: MeshId,
    /// Debug name.
    pub name: String,
    /// Item flag bits tested by render filters.
    pub flags: ItemFlags,
    /// Transform of the owning node.
    pub world_from_node: Mat4,
    /// The drawable parts.
    pub primitives: Vec<Primitive>,
    /// Skin deforming the mesh, if any.
    pub skin: Option<Arc<Skin>>,
    /// Point size for point modes.
    pub point_size: f32,
    /// Line width for line modes.
    pub line_width: f32,
    /// Color used when edges are drawn with the mesh's own color.
    pub wireframe_color: Vec4,
}

impl Mesh {
    /// Creates a visible content mesh with no primitives.
    pub fn new(id: MeshId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: ItemFlags::VISIBLE | ItemFlags::CONTENT | ItemFlags::OPAQUE,
            world_from_node: Mat4::IDENTITY,
            primitives: Vec::new(),
            skin: None,
            point_size: 4.0,
            line_width: 1.0,
            wireframe_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Replaces the flag bits.
    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Appends a primitive.
    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.primitives.push(primitive);
        self
    }

    /// Sets the node transform.
    pub fn with_transform(mut self, world_from_node: Mat4) -> Self {
        self.world_from_node = world_from_node;
        self
    }

    /// Attaches a skin.
    pub fn with_skin(mut self, skin: Arc<Skin>) -> Self {
        self.skin = Some(skin);
        self
    }
}

/// The shared vertex and index buffers all meshes are sub-allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshMemory {
    /// Interleaved vertex data.
    pub vertex_buffer: BufferId,
    /// Index data.
    pub index_buffer: BufferId,
    /// Width of one index.
    pub index_format: IndexFormat,
    /// Layout of the vertex data.
    pub vertex_input: VertexInputId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_range_defaults_to_empty() {
        let geometry = PrimitiveGeometry::new(10, 0).with_range(
            PrimitiveMode::PolygonFill,
            IndexRange {
                first_index: 0,
                index_count: 36,
            },
        );
        assert_eq!(geometry.index_range(PrimitiveMode::PolygonFill).index_count, 36);
        assert_eq!(geometry.index_range(PrimitiveMode::EdgeLines).index_count, 0);
    }

    #[test]
    fn test_mode_indices_follow_declaration_order() {
        for (i, mode) in PrimitiveMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), i);
        }
    }
}
