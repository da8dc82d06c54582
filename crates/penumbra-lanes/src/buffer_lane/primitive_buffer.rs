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

//! Packs one [`PrimitiveRecord`] per drawn primitive.

use super::records::{gpu_mat4, PrimitiveRecord};
use super::ring_writer::{slot_capacity_for_records, BufferRange, GpuRingBuffer};
use ahash::AHashMap;
use penumbra_core::item::ItemFilter;
use penumbra_core::math::{compute_cofactor, next_power_of_two, vec3_from_uint, Vec4};
use penumbra_core::renderer::{BufferUsage, GraphicsDevice, ResourceError};
use penumbra_core::scene::{MaterialId, Mesh, PrimitiveMode, SkinId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the record color comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveColorSource {
    /// The picking id offset packed into RGB.
    IdOffset,
    /// The mesh's wireframe color.
    MeshWireframeColor,
    /// `constant_color0` of the settings.
    #[default]
    ConstantColor,
}

/// Where the record size comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveSizeSource {
    /// The mesh's point size.
    MeshPointSize,
    /// The mesh's line width.
    MeshLineWidth,
    /// `constant_size` of the settings.
    #[default]
    ConstantSize,
}

/// How the color and size of primitive records are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveInterfaceSettings {
    /// Color source.
    pub color_source: PrimitiveColorSource,
    /// Primary constant color.
    pub constant_color0: Vec4,
    /// Secondary constant color, used by shaders drawing two-tone lines.
    pub constant_color1: Vec4,
    /// Size source.
    pub size_source: PrimitiveSizeSource,
    /// Constant size.
    pub constant_size: f32,
}

impl Default for PrimitiveInterfaceSettings {
    fn default() -> Self {
        Self {
            color_source: PrimitiveColorSource::ConstantColor,
            constant_color0: Vec4::ONE,
            constant_color1: Vec4::ONE,
            size_source: PrimitiveSizeSource::ConstantSize,
            constant_size: 1.0,
        }
    }
}

/// A block of picking ids assigned to one primitive.
#[derive(Debug, Clone)]
pub struct IdRange {
    /// First id of the block.
    pub offset: u32,
    /// Number of ids, one per index.
    pub length: u32,
    /// The mesh owning the primitive.
    pub mesh: Arc<Mesh>,
    /// Index of the primitive within the mesh.
    pub primitive_index: usize,
}

/// Inputs of a [`PrimitiveBuffer::update`].
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveBatch<'a> {
    /// Meshes in draw order.
    pub meshes: &'a [Arc<Mesh>],
    /// Index stream selecting the drawn primitives.
    pub mode: PrimitiveMode,
    /// Mesh filter.
    pub filter: &'a ItemFilter,
    /// Color and size selection.
    pub settings: &'a PrimitiveInterfaceSettings,
    /// Material index map produced by the material buffer this frame.
    pub material_indices: &'a AHashMap<MaterialId, u32>,
    /// First joint of every skin, produced by the joint buffer this frame.
    pub joint_indices: &'a AHashMap<SkinId, u32>,
    /// Whether picking id ranges are recorded.
    pub use_id_ranges: bool,
}

/// Number of primitives of `meshes` drawn in `mode` under `filter`.
pub fn count_drawn_primitives(meshes: &[Arc<Mesh>], mode: PrimitiveMode, filter: &ItemFilter) -> usize {
    meshes
        .iter()
        .filter(|mesh| filter.matches(mesh.flags))
        .map(|mesh| {
            mesh.primitives
                .iter()
                .filter(|p| p.geometry.index_range(mode).index_count > 0)
                .count()
        })
        .sum()
}

/// Writes primitive records for a batch of meshes.
#[derive(Debug)]
pub struct PrimitiveBuffer {
    writer: GpuRingBuffer,
    max_primitive_count: usize,
    packed_this_frame: usize,
    id_offset: u32,
    id_ranges: Vec<IdRange>,
}

const RECORD_SIZE: u64 = std::mem::size_of::<PrimitiveRecord>() as u64;

impl PrimitiveBuffer {
    /// Creates a buffer holding up to `max_primitive_count` records per frame.
    pub fn new(
        device: &dyn GraphicsDevice,
        max_primitive_count: usize,
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            writer: GpuRingBuffer::new(
                device,
                "primitive",
                BufferUsage::STORAGE,
                slot_capacity_for_records(RECORD_SIZE, max_primitive_count),
            )?,
            max_primitive_count,
            packed_this_frame: 0,
            id_offset: 0,
            id_ranges: Vec::new(),
        })
    }

    /// Maximum number of records per frame.
    pub fn max_primitive_count(&self) -> usize {
        self.max_primitive_count
    }

    /// Packs one record per primitive of every mesh passing the filter.
    ///
    /// Primitives with no indices for the batch mode are skipped, exactly as
    /// the draw-indirect packer skips them, so record `i` belongs to draw `i`.
    ///
    /// # Returns
    ///
    /// The written range and the number of records.
    ///
    /// # Panics
    ///
    /// Packing more than `max_primitive_count` records in one frame, across all
    /// updates, is fatal.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        batch: &PrimitiveBatch<'_>,
    ) -> Result<(BufferRange, u32), ResourceError> {
        let expected = count_drawn_primitives(batch.meshes, batch.mode, batch.filter);
        if self.packed_this_frame + expected > self.max_primitive_count {
            log::error!(
                "PrimitiveBuffer: {} records this frame plus {} exceed the maximum of {}",
                self.packed_this_frame,
                expected,
                self.max_primitive_count
            );
            panic!("primitive buffer capacity exceeded");
        }

        self.writer.begin(expected as u64 * RECORD_SIZE);
        let mut primitive_count = 0u32;
        for mesh in batch.meshes {
            if !batch.filter.matches(mesh.flags) {
                continue;
            }
            let world_from_node = mesh.world_from_node;
            let world_from_node_cofactor = compute_cofactor(&world_from_node);
            let (skinning_factor, base_joint_index) = match &mesh.skin {
                Some(skin) => (1.0, batch.joint_indices.get(&skin.id).copied().unwrap_or(0)),
                None => (0.0, 0),
            };

            for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
                let count = primitive.geometry.index_range(batch.mode).index_count;
                if count == 0 {
                    continue;
                }

                if batch.use_id_ranges {
                    let power_of_two = next_power_of_two(count);
                    let mask = power_of_two - 1;
                    let current_bits = self.id_offset & mask;
                    if current_bits != 0 {
                        self.id_offset += power_of_two - current_bits;
                    }
                }

                let color = match batch.settings.color_source {
                    PrimitiveColorSource::IdOffset => vec3_from_uint(self.id_offset).extend(0.0),
                    PrimitiveColorSource::MeshWireframeColor => mesh.wireframe_color,
                    PrimitiveColorSource::ConstantColor => batch.settings.constant_color0,
                };
                let size = match batch.settings.size_source {
                    PrimitiveSizeSource::MeshPointSize => mesh.point_size,
                    PrimitiveSizeSource::MeshLineWidth => mesh.line_width,
                    PrimitiveSizeSource::ConstantSize => batch.settings.constant_size,
                };
                let material_index = primitive
                    .material
                    .as_ref()
                    .and_then(|m| batch.material_indices.get(&m.id).copied())
                    .unwrap_or(0);

                let record = PrimitiveRecord {
                    world_from_node: gpu_mat4(&world_from_node),
                    world_from_node_cofactor: gpu_mat4(&world_from_node_cofactor),
                    color: color.to_array(),
                    material_index,
                    size,
                    skinning_factor,
                    base_joint_index,
                };
                self.writer.write(device, bytemuck::bytes_of(&record))?;
                primitive_count += 1;

                if batch.use_id_ranges {
                    self.id_ranges.push(IdRange {
                        offset: self.id_offset,
                        length: count,
                        mesh: mesh.clone(),
                        primitive_index,
                    });
                    self.id_offset += count;
                }
            }
        }

        let range = self.writer.end();
        self.packed_this_frame += primitive_count as usize;
        log::trace!(
            "PrimitiveBuffer: wrote {} records ({} bytes at offset {})",
            primitive_count,
            range.size,
            range.offset
        );
        Ok((range, primitive_count))
    }

    /// Forgets all id ranges and restarts ids at zero.
    pub fn reset_id_ranges(&mut self) {
        self.id_offset = 0;
        self.id_ranges.clear();
    }

    /// The next unassigned id.
    pub fn id_offset(&self) -> u32 {
        self.id_offset
    }

    /// Id ranges recorded since the last reset.
    pub fn id_ranges(&self) -> &[IdRange] {
        &self.id_ranges
    }

    /// Advances the ring buffer to the next frame.
    pub fn next_frame(&mut self) {
        self.writer.next_frame();
        self.packed_this_frame = 0;
    }

    /// Releases the GPU buffers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.writer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_lane::align_offset;
    use crate::test_support::{mesh_with_counts, read_records};
    use penumbra_core::item::ItemFlags;
    use penumbra_core::renderer::headless::HeadlessDevice;
    use penumbra_core::scene::{Material, MeshId, Primitive, Skin};

    fn empty_maps() -> (AHashMap<MaterialId, u32>, AHashMap<SkinId, u32>) {
        (AHashMap::new(), AHashMap::new())
    }

    fn pack(
        device: &HeadlessDevice,
        buffer: &mut PrimitiveBuffer,
        meshes: &[Arc<Mesh>],
        filter: &ItemFilter,
        use_id_ranges: bool,
    ) -> (BufferRange, u32) {
        let (materials, joints) = empty_maps();
        buffer
            .update(
                device,
                &PrimitiveBatch {
                    meshes,
                    mode: PrimitiveMode::PolygonFill,
                    filter,
                    settings: &PrimitiveInterfaceSettings::default(),
                    material_indices: &materials,
                    joint_indices: &joints,
                    use_id_ranges,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_id_ranges_never_overlap() {
        let sequences: [&[u32]; 4] = [
            &[3, 5, 7, 1, 64, 65, 2],
            &[1000, 1, 1, 3, 300, 17, 4096],
            &[6, 6, 6, 6, 6, 6],
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13],
        ];
        for counts in sequences {
            let device = HeadlessDevice::new();
            let mut buffer = PrimitiveBuffer::new(&device, 64).unwrap();
            let mesh = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, counts));
            pack(&device, &mut buffer, &[mesh], &ItemFilter::ALL, true);

            let ranges = buffer.id_ranges();
            assert_eq!(ranges.len(), counts.len());
            for (i, a) in ranges.iter().enumerate() {
                assert_eq!(a.offset % next_power_of_two(a.length), 0);
                for b in &ranges[i + 1..] {
                    let disjoint = a.offset + a.length <= b.offset || b.offset + b.length <= a.offset;
                    assert!(disjoint, "{:?} overlaps {:?}", (a.offset, a.length), (b.offset, b.length));
                }
            }
        }
    }

    #[test]
    fn test_reset_id_ranges() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 8).unwrap();
        let mesh = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[12]));
        pack(&device, &mut buffer, &[mesh], &ItemFilter::ALL, true);
        assert_eq!(buffer.id_offset(), 12);

        buffer.reset_id_ranges();
        assert_eq!(buffer.id_offset(), 0);
        assert!(buffer.id_ranges().is_empty());
    }

    #[test]
    fn test_shadow_filter_packs_only_visible_shadow_casters() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 16).unwrap();
        let meshes = vec![
            Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST, &[3])),
            Arc::new(mesh_with_counts(2, ItemFlags::VISIBLE, &[3])),
            Arc::new(mesh_with_counts(3, ItemFlags::SHADOW_CAST, &[3])),
            Arc::new(mesh_with_counts(4, ItemFlags::empty(), &[3])),
            Arc::new(mesh_with_counts(
                5,
                ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST | ItemFlags::CONTENT,
                &[3],
            )),
        ];
        let filter = ItemFilter::require_all(ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST);
        let (range, count) = pack(&device, &mut buffer, &meshes, &filter, true);

        assert_eq!(count, 2);
        let packed: Vec<u64> = buffer.id_ranges().iter().map(|r| r.mesh.id.0).collect();
        assert_eq!(packed, vec![1, 5]);
        assert_eq!(range.size, 2 * RECORD_SIZE);
    }

    #[test]
    fn test_record_contents() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 4).unwrap();

        let material = Arc::new(Material::new(MaterialId(7), "red"));
        let skin = Arc::new(Skin {
            id: SkinId(3),
            name: "skin".to_string(),
            joints: Vec::new(),
        });
        let mut mesh = mesh_with_counts(1, ItemFlags::VISIBLE, &[6]).with_skin(skin);
        mesh.primitives[0].material = Some(material);
        mesh.line_width = 2.5;
        let meshes = vec![Arc::new(mesh)];

        let mut materials = AHashMap::new();
        materials.insert(MaterialId(7), 4);
        let mut joints = AHashMap::new();
        joints.insert(SkinId(3), 11);
        let settings = PrimitiveInterfaceSettings {
            size_source: PrimitiveSizeSource::MeshLineWidth,
            ..Default::default()
        };
        let (range, _) = buffer
            .update(
                &device,
                &PrimitiveBatch {
                    meshes: &meshes,
                    mode: PrimitiveMode::PolygonFill,
                    filter: &ItemFilter::ALL,
                    settings: &settings,
                    material_indices: &materials,
                    joint_indices: &joints,
                    use_id_ranges: false,
                },
            )
            .unwrap();

        let records: Vec<PrimitiveRecord> = read_records(&device, &range);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].material_index, 4);
        assert_eq!(records[0].base_joint_index, 11);
        assert_eq!(records[0].skinning_factor, 1.0);
        assert_eq!(records[0].size, 2.5);
        assert!(buffer.id_ranges().is_empty());
    }

    #[test]
    fn test_primitives_without_indices_are_skipped() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 4).unwrap();
        let mesh = Mesh::new(MeshId(1), "empty").with_primitive(Primitive::default());
        let (_, count) = pack(&device, &mut buffer, &[Arc::new(mesh)], &ItemFilter::ALL, false);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_updates_without_id_ranges_keep_id_offset() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 4).unwrap();
        let first = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[3]));
        let second = Arc::new(mesh_with_counts(2, ItemFlags::VISIBLE, &[4]));

        pack(&device, &mut buffer, &[first], &ItemFilter::ALL, true);
        assert_eq!(buffer.id_offset(), 3);
        pack(&device, &mut buffer, &[second], &ItemFilter::ALL, false);
        assert_eq!(buffer.id_offset(), 3);
        assert_eq!(buffer.id_ranges().len(), 1);
    }

    #[test]
    fn test_several_updates_fill_one_frame() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 2).unwrap();
        let first = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[3]));
        let second = Arc::new(mesh_with_counts(2, ItemFlags::VISIBLE, &[3]));

        let (a, a_count) = pack(&device, &mut buffer, &[first], &ItemFilter::ALL, false);
        let (b, b_count) = pack(&device, &mut buffer, &[second], &ItemFilter::ALL, false);

        assert_eq!((a_count, b_count), (1, 1));
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, align_offset(RECORD_SIZE));
        assert_eq!(b.size, RECORD_SIZE);

        buffer.next_frame();
        let third = Arc::new(mesh_with_counts(3, ItemFlags::VISIBLE, &[3, 3]));
        let (_, count) = pack(&device, &mut buffer, &[third], &ItemFilter::ALL, false);
        assert_eq!(count, 2);
    }

    #[test]
    #[should_panic(expected = "primitive buffer capacity exceeded")]
    fn test_updates_past_capacity_in_one_frame_are_fatal() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 2).unwrap();
        let mesh = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[3, 3]));
        pack(&device, &mut buffer, &[mesh.clone()], &ItemFilter::ALL, false);
        pack(&device, &mut buffer, &[mesh], &ItemFilter::ALL, false);
    }

    #[test]
    #[should_panic(expected = "primitive buffer capacity exceeded")]
    fn test_packing_past_capacity_is_fatal() {
        let device = HeadlessDevice::new();
        let mut buffer = PrimitiveBuffer::new(&device, 2).unwrap();
        let mesh = Arc::new(mesh_with_counts(1, ItemFlags::VISIBLE, &[3, 3, 3]));
        pack(&device, &mut buffer, &[mesh], &ItemFilter::ALL, false);
    }
}
