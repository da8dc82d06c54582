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

//! Packs indexed indirect draw commands.

use super::primitive_buffer::count_drawn_primitives;
use super::records::DrawIndexedIndirectCommand;
use super::ring_writer::{slot_capacity_for_records, BufferRange, GpuRingBuffer};
use penumbra_core::item::ItemFilter;
use penumbra_core::renderer::{BufferUsage, GraphicsDevice, ResourceError};
use penumbra_core::scene::{Mesh, PrimitiveMode};
use std::sync::Arc;

/// Byte stride between two packed commands.
pub const DRAW_COMMAND_STRIDE: u32 = std::mem::size_of::<DrawIndexedIndirectCommand>() as u32;

/// Writes one [`DrawIndexedIndirectCommand`] per drawn primitive.
///
/// Command `i` draws the primitive whose record is at index `i` of the
/// primitive buffer packed with the same meshes, mode and filter.
#[derive(Debug)]
pub struct DrawIndirectBuffer {
    writer: GpuRingBuffer,
    max_draw_count: usize,
    packed_this_frame: usize,
    max_index_count: Option<u32>,
}

impl DrawIndirectBuffer {
    /// Creates a buffer holding up to `max_draw_count` commands per frame.
    pub fn new(device: &dyn GraphicsDevice, max_draw_count: usize) -> Result<Self, ResourceError> {
        Ok(Self {
            writer: GpuRingBuffer::new(
                device,
                "draw indirect",
                BufferUsage::INDIRECT,
                slot_capacity_for_records(DRAW_COMMAND_STRIDE as u64, max_draw_count),
            )?,
            max_draw_count,
            packed_this_frame: 0,
            max_index_count: None,
        })
    }

    /// Maximum number of commands per frame.
    pub fn max_draw_count(&self) -> usize {
        self.max_draw_count
    }

    /// Clamps the index count of every command, `None` to disable.
    ///
    /// Debug aid for bisecting broken index data.
    pub fn set_max_index_count(&mut self, max_index_count: Option<u32>) {
        self.max_index_count = max_index_count;
    }

    /// Packs the draws for `meshes` in `mode` under `filter`.
    ///
    /// # Returns
    ///
    /// The written range and the number of commands.
    ///
    /// # Panics
    ///
    /// Packing more than `max_draw_count` commands in one frame is fatal.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        meshes: &[Arc<Mesh>],
        mode: PrimitiveMode,
        filter: &ItemFilter,
    ) -> Result<(BufferRange, u32), ResourceError> {
        let expected = count_drawn_primitives(meshes, mode, filter);
        if self.packed_this_frame + expected > self.max_draw_count {
            log::error!(
                "DrawIndirectBuffer: {} commands this frame plus {} exceed the maximum of {}",
                self.packed_this_frame,
                expected,
                self.max_draw_count
            );
            panic!("draw indirect buffer capacity exceeded");
        }
        self.writer.begin(expected as u64 * DRAW_COMMAND_STRIDE as u64);

        let mut draw_count = 0u32;
        for mesh in meshes.iter().filter(|m| filter.matches(m.flags)) {
            for primitive in &mesh.primitives {
                let range = primitive.geometry.index_range(mode);
                if range.index_count == 0 {
                    continue;
                }
                let index_count = match self.max_index_count {
                    Some(max) => range.index_count.min(max),
                    None => range.index_count,
                };
                let command = DrawIndexedIndirectCommand {
                    index_count,
                    instance_count: 1,
                    first_index: primitive.geometry.base_index + range.first_index,
                    base_vertex: primitive.geometry.base_vertex,
                    first_instance: 0,
                };
                self.writer.write(device, bytemuck::bytes_of(&command))?;
                draw_count += 1;
            }
        }

        self.packed_this_frame += draw_count as usize;
        Ok((self.writer.end(), draw_count))
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
    use crate::test_support::{mesh_with_counts, read_records};
    use penumbra_core::item::ItemFlags;
    use penumbra_core::renderer::headless::HeadlessDevice;

    fn content() -> ItemFlags {
        ItemFlags::VISIBLE | ItemFlags::CONTENT | ItemFlags::OPAQUE
    }

    #[test]
    fn test_commands_follow_primitive_ranges() {
        let device = HeadlessDevice::new();
        let mut buffer = DrawIndirectBuffer::new(&device, 8).unwrap();
        let meshes = vec![
            Arc::new(mesh_with_counts(1, content(), &[6, 0, 9])),
            Arc::new(mesh_with_counts(2, content(), &[3])),
        ];

        let (range, count) = buffer
            .update(&device, &meshes, PrimitiveMode::PolygonFill, &ItemFilter::ALL)
            .unwrap();
        let commands: Vec<DrawIndexedIndirectCommand> = read_records(&device, &range);

        assert_eq!(count, 3);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].index_count, 6);
        assert_eq!(commands[0].first_index, 0);
        assert_eq!(commands[1].index_count, 9);
        assert_eq!(commands[1].first_index, 6);
        assert_eq!(commands[2].index_count, 3);
        assert!(commands.iter().all(|c| c.instance_count == 1 && c.first_instance == 0));
    }

    #[test]
    fn test_filter_and_clamp() {
        let device = HeadlessDevice::new();
        let mut buffer = DrawIndirectBuffer::new(&device, 8).unwrap();
        buffer.set_max_index_count(Some(4));
        let meshes = vec![
            Arc::new(mesh_with_counts(1, content(), &[6])),
            Arc::new(mesh_with_counts(2, ItemFlags::CONTENT, &[6])),
        ];
        let filter = ItemFilter::require_all(ItemFlags::VISIBLE);

        let (range, count) = buffer
            .update(&device, &meshes, PrimitiveMode::PolygonFill, &filter)
            .unwrap();
        let commands: Vec<DrawIndexedIndirectCommand> = read_records(&device, &range);

        assert_eq!(count, 1);
        assert_eq!(commands[0].index_count, 4);
    }

    #[test]
    fn test_several_updates_fill_one_frame() {
        let device = HeadlessDevice::new();
        let mut buffer = DrawIndirectBuffer::new(&device, 2).unwrap();
        let first = vec![Arc::new(mesh_with_counts(1, content(), &[6]))];
        let second = vec![Arc::new(mesh_with_counts(2, content(), &[9]))];

        let (a, _) = buffer
            .update(&device, &first, PrimitiveMode::PolygonFill, &ItemFilter::ALL)
            .unwrap();
        let (b, count) = buffer
            .update(&device, &second, PrimitiveMode::PolygonFill, &ItemFilter::ALL)
            .unwrap();
        let commands: Vec<DrawIndexedIndirectCommand> = read_records(&device, &b);

        assert_eq!(a.offset, 0);
        assert_ne!(b.offset, 0);
        assert_eq!(count, 1);
        assert_eq!(commands[0].index_count, 9);
    }

    #[test]
    #[should_panic(expected = "draw indirect buffer capacity exceeded")]
    fn test_updates_past_capacity_in_one_frame_are_fatal() {
        let device = HeadlessDevice::new();
        let mut buffer = DrawIndirectBuffer::new(&device, 2).unwrap();
        let meshes = vec![Arc::new(mesh_with_counts(1, content(), &[6, 6]))];
        let _ = buffer.update(&device, &meshes, PrimitiveMode::PolygonFill, &ItemFilter::ALL);
        let _ = buffer.update(&device, &meshes, PrimitiveMode::PolygonFill, &ItemFilter::ALL);
    }

    #[test]
    fn test_empty_mode_writes_nothing() {
        let device = HeadlessDevice::new();
        let mut buffer = DrawIndirectBuffer::new(&device, 8).unwrap();
        let meshes = vec![Arc::new(mesh_with_counts(1, content(), &[6]))];
        let (range, count) = buffer
            .update(&device, &meshes, PrimitiveMode::EdgeLines, &ItemFilter::ALL)
            .unwrap();
        assert_eq!(count, 0);
        assert!(range.is_empty());
    }
}
