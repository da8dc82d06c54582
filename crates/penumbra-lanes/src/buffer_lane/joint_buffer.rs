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

//! Packs skin joints and the debug joint color table.

use super::records::{gpu_mat4, JointBlockHeader, JointRecord};
use super::ring_writer::{BufferRange, GpuRingBuffer};
use ahash::AHashMap;
use penumbra_core::math::{compute_cofactor, UVec4, Vec4};
use penumbra_core::renderer::{BufferUsage, GraphicsDevice, ResourceError, BUFFER_OFFSET_ALIGNMENT};
use penumbra_core::scene::{Skin, SkinId};
use std::sync::Arc;

const HEADER_SIZE: u64 = std::mem::size_of::<JointBlockHeader>() as u64;
const COLOR_SIZE: u64 = std::mem::size_of::<[f32; 4]>() as u64;
const RECORD_SIZE: u64 = std::mem::size_of::<JointRecord>() as u64;

/// Writes the joint block: header, debug colors, then every joint of every skin.
#[derive(Debug)]
pub struct JointBuffer {
    writer: GpuRingBuffer,
    max_joint_count: usize,
    max_debug_joint_color_count: usize,
    joint_indices: AHashMap<SkinId, u32>,
}

impl JointBuffer {
    /// Creates a buffer holding up to `max_joint_count` joints per update and
    /// `updates_per_frame` updates per frame.
    pub fn new(
        device: &dyn GraphicsDevice,
        max_joint_count: usize,
        max_debug_joint_color_count: usize,
        updates_per_frame: usize,
    ) -> Result<Self, ResourceError> {
        let block_size = HEADER_SIZE
            + COLOR_SIZE * max_debug_joint_color_count as u64
            + RECORD_SIZE * max_joint_count as u64;
        let capacity = (block_size + BUFFER_OFFSET_ALIGNMENT) * updates_per_frame.max(1) as u64;
        Ok(Self {
            writer: GpuRingBuffer::new(device, "joint", BufferUsage::STORAGE, capacity)?,
            max_joint_count,
            max_debug_joint_color_count,
            joint_indices: AHashMap::new(),
        })
    }

    /// Maximum number of joints per update.
    pub fn max_joint_count(&self) -> usize {
        self.max_joint_count
    }

    /// Packs the block and records the first joint index of every skin.
    ///
    /// The color table is always padded to its configured size so the joint
    /// records start at a fixed offset. Extra colors are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the skins hold more than `max_joint_count` joints.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        debug_joint_indices: UVec4,
        debug_joint_colors: &[Vec4],
        skins: &[Arc<Skin>],
    ) -> Result<BufferRange, ResourceError> {
        self.joint_indices.clear();

        let color_count = debug_joint_colors
            .len()
            .min(self.max_debug_joint_color_count);
        if color_count < debug_joint_colors.len() {
            log::warn!(
                "JointBuffer: {} debug joint colors, only {} are used",
                debug_joint_colors.len(),
                self.max_debug_joint_color_count
            );
        }
        let joint_count: usize = skins.iter().map(|s| s.joints.len()).sum();
        if joint_count > self.max_joint_count {
            log::error!(
                "JointBuffer: {} joints exceed the limit of {}",
                joint_count,
                self.max_joint_count
            );
            panic!("joint buffer capacity exceeded");
        }

        let header = JointBlockHeader {
            debug_joint_indices: debug_joint_indices.to_array(),
            debug_joint_color_count: color_count as u32,
            _padding: [0; 3],
        };

        self.writer.begin(
            HEADER_SIZE
                + COLOR_SIZE * self.max_debug_joint_color_count as u64
                + RECORD_SIZE * joint_count as u64,
        );
        self.writer.write(device, bytemuck::bytes_of(&header))?;

        let mut colors = vec![[0.0f32; 4]; self.max_debug_joint_color_count];
        for (slot, color) in colors.iter_mut().zip(debug_joint_colors) {
            *slot = color.to_array();
        }
        self.writer.write(device, bytemuck::cast_slice(&colors))?;

        let mut joint_index = 0u32;
        for skin in skins {
            self.joint_indices.insert(skin.id, joint_index);
            for joint in &skin.joints {
                let record = JointRecord {
                    world_from_bind: gpu_mat4(&joint.world_from_bind),
                    world_from_bind_cofactor: gpu_mat4(&compute_cofactor(&joint.world_from_bind)),
                };
                self.writer.write(device, bytemuck::bytes_of(&record))?;
                joint_index += 1;
            }
        }
        Ok(self.writer.end())
    }

    /// First joint index of every skin packed by the last update.
    pub fn joint_indices(&self) -> &AHashMap<SkinId, u32> {
        &self.joint_indices
    }

    /// Advances the ring buffer to the next frame.
    pub fn next_frame(&mut self) {
        self.writer.next_frame();
    }

    /// Releases the GPU buffers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.writer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::read_records;
    use penumbra_core::math::{Mat4, Vec3};
    use penumbra_core::renderer::headless::HeadlessDevice;
    use penumbra_core::scene::Joint;

    fn skin(id: u64, joints: usize) -> Arc<Skin> {
        Arc::new(Skin {
            id: SkinId(id),
            name: format!("skin {id}"),
            joints: (0..joints)
                .map(|i| Joint {
                    world_from_bind: Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
                })
                .collect(),
        })
    }

    #[test]
    fn test_skin_base_indices_accumulate() {
        let device = HeadlessDevice::new();
        let mut buffer = JointBuffer::new(&device, 16, 4, 1).unwrap();
        let range = buffer
            .update(&device, UVec4::ZERO, &[], &[skin(1, 3), skin(2, 2), skin(3, 1)])
            .unwrap();

        assert_eq!(buffer.joint_indices().get(&SkinId(1)), Some(&0));
        assert_eq!(buffer.joint_indices().get(&SkinId(2)), Some(&3));
        assert_eq!(buffer.joint_indices().get(&SkinId(3)), Some(&5));
        assert_eq!(range.size, HEADER_SIZE + 4 * COLOR_SIZE + 6 * RECORD_SIZE);
    }

    #[test]
    fn test_color_table_is_padded() {
        let device = HeadlessDevice::new();
        let mut buffer = JointBuffer::new(&device, 4, 4, 1).unwrap();
        let colors = [Vec4::X, Vec4::Y];
        let range = buffer
            .update(&device, UVec4::new(1, 2, 3, 4), &colors, &[skin(7, 1)])
            .unwrap();

        let header: Vec<JointBlockHeader> = read_records(
            &device,
            &BufferRange {
                size: HEADER_SIZE,
                ..range
            },
        );
        assert_eq!(header[0].debug_joint_indices, [1, 2, 3, 4]);
        assert_eq!(header[0].debug_joint_color_count, 2);

        let joints: Vec<JointRecord> = read_records(
            &device,
            &BufferRange {
                offset: range.offset + HEADER_SIZE + 4 * COLOR_SIZE,
                size: RECORD_SIZE,
                ..range
            },
        );
        assert_eq!(joints[0].world_from_bind, gpu_mat4(&Mat4::IDENTITY));
    }
}
