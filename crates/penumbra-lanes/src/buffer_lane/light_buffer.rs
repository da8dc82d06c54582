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

//! Packs the light block and the light control block.

use super::records::{gpu_mat4, LightBlockHeader, LightControlRecord, LightRecord, INVALID_INDEX};
use super::ring_writer::{BufferRange, GpuRingBuffer};
use crate::shadow_lane::LightProjections;
use penumbra_core::math::{Mat4, Vec4};
use penumbra_core::renderer::{binding, BufferUsage, GraphicsDevice, ResourceError, BUFFER_OFFSET_ALIGNMENT};
use penumbra_core::scene::{Light, LightType};
use std::sync::Arc;

const HEADER_SIZE: u64 = std::mem::size_of::<LightBlockHeader>() as u64;
const RECORD_SIZE: u64 = std::mem::size_of::<LightRecord>() as u64;
const CONTROL_SIZE: u64 = std::mem::size_of::<LightControlRecord>() as u64;

/// Light control blocks written per light and frame: one per shadow layer
/// and per full-screen light pass, for every view.
const CONTROL_BLOCKS_PER_LIGHT: u64 = 8;

/// Writes the light block and the light control block.
#[derive(Debug)]
pub struct LightBuffer {
    light_writer: GpuRingBuffer,
    control_writer: GpuRingBuffer,
    max_light_count: usize,
}

impl LightBuffer {
    /// Creates buffers for up to `max_light_count` lights per update.
    ///
    /// The light block is rewritten for every view and pass, so the per-frame
    /// slot holds `updates_per_frame` full blocks.
    pub fn new(
        device: &dyn GraphicsDevice,
        max_light_count: usize,
        updates_per_frame: usize,
    ) -> Result<Self, ResourceError> {
        let block_size = HEADER_SIZE + RECORD_SIZE * max_light_count as u64;
        let light_capacity =
            (block_size + BUFFER_OFFSET_ALIGNMENT) * updates_per_frame.max(1) as u64;
        let control_capacity =
            BUFFER_OFFSET_ALIGNMENT * CONTROL_BLOCKS_PER_LIGHT * max_light_count.max(1) as u64;
        let mut light_writer =
            GpuRingBuffer::new(device, "light", BufferUsage::UNIFORM, light_capacity)?;
        let control_writer = match GpuRingBuffer::new(
            device,
            "light control",
            BufferUsage::UNIFORM,
            control_capacity,
        ) {
            Ok(writer) => writer,
            Err(e) => {
                light_writer.destroy(device);
                return Err(e);
            }
        };
        Ok(Self {
            light_writer,
            control_writer,
            max_light_count,
        })
    }

    /// Maximum number of lights per update.
    pub fn max_light_count(&self) -> usize {
        self.max_light_count
    }

    /// Packs the header and one record per light.
    ///
    /// Lights past `max_light_count` are dropped with a warning. Lights without
    /// a projection get identity transforms and no shadow layer.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        lights: &[Arc<Light>],
        light_projections: Option<&LightProjections>,
        ambient_light: Vec4,
    ) -> Result<BufferRange, ResourceError> {
        if lights.len() > self.max_light_count {
            log::warn!(
                "LightBuffer: {} lights exceed the limit of {}, extra lights are not packed",
                lights.len(),
                self.max_light_count
            );
        }
        let lights = &lights[..lights.len().min(self.max_light_count)];

        let count_of = |light_type: LightType| {
            lights
                .iter()
                .filter(|l| l.light_type == light_type)
                .count() as u32
        };
        let header = LightBlockHeader {
            shadow_texture: binding::SHADOW_TEXTURE,
            shadow_map_size: light_projections
                .map(|p| p.shadow_map_resolution)
                .unwrap_or(0),
            directional_light_count: count_of(LightType::Directional),
            spot_light_count: count_of(LightType::Spot),
            point_light_count: count_of(LightType::Point),
            _padding: [0; 3],
            ambient_light: ambient_light.to_array(),
        };

        self.light_writer
            .begin(HEADER_SIZE + RECORD_SIZE * lights.len() as u64);
        self.light_writer.write(device, bytemuck::bytes_of(&header))?;
        for light in lights {
            let transforms =
                light_projections.and_then(|p| p.transforms_for_light(light.id));
            let (clip_from_world, texture_from_world, shadow_index) = match transforms {
                Some(t) => (t.clip_from_world, t.texture_from_world, t.index as u32),
                None => (Mat4::IDENTITY, Mat4::IDENTITY, INVALID_INDEX),
            };
            let record = LightRecord {
                clip_from_world: gpu_mat4(&clip_from_world),
                texture_from_world: gpu_mat4(&texture_from_world),
                position_and_inner_spot_cos: light
                    .position()
                    .extend(light.inner_spot_angle.cos())
                    .to_array(),
                direction_and_outer_spot_cos: light
                    .direction()
                    .extend(light.outer_spot_angle.cos())
                    .to_array(),
                radiance_and_range: light.radiance().extend(light.range).to_array(),
                shadow_params: [shadow_index, 0, 0, 0],
            };
            self.light_writer.write(device, bytemuck::bytes_of(&record))?;
        }
        Ok(self.light_writer.end())
    }

    /// Writes a light control block selecting `light_index`.
    pub fn update_control(
        &mut self,
        device: &dyn GraphicsDevice,
        light_index: u32,
    ) -> Result<BufferRange, ResourceError> {
        let record = LightControlRecord {
            light_index,
            _padding: [0; 3],
        };
        self.control_writer.begin(CONTROL_SIZE);
        self.control_writer
            .write(device, bytemuck::bytes_of(&record))?;
        Ok(self.control_writer.end())
    }

    /// Advances both ring buffers to the next frame.
    pub fn next_frame(&mut self) {
        self.light_writer.next_frame();
        self.control_writer.next_frame();
    }

    /// Releases the GPU buffers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.light_writer.destroy(device);
        self.control_writer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow_lane::LightProjectionTransforms;
    use crate::test_support::read_records;
    use penumbra_core::renderer::headless::HeadlessDevice;
    use penumbra_core::scene::LightId;

    fn lights() -> Vec<Arc<Light>> {
        vec![
            Arc::new(Light::new(LightId(1), "sun", LightType::Directional)),
            Arc::new(Light::new(LightId(2), "bulb", LightType::Point)),
            Arc::new(Light::new(LightId(3), "lamp", LightType::Spot)),
        ]
    }

    #[test]
    fn test_header_and_shadow_params() {
        let device = HeadlessDevice::new();
        let mut buffer = LightBuffer::new(&device, 4, 2).unwrap();
        let projections = LightProjections {
            light_projection_transforms: vec![LightProjectionTransforms {
                light: LightId(3),
                clip_from_world: Mat4::from_scale(penumbra_core::math::Vec3::splat(2.0)),
                texture_from_world: Mat4::IDENTITY,
                world_from_light: Mat4::IDENTITY,
                index: 0,
            }],
            shadow_map_resolution: 512,
            ..Default::default()
        };

        let range = buffer
            .update(&device, &lights(), Some(&projections), Vec4::new(0.1, 0.1, 0.1, 0.0))
            .unwrap();
        assert_eq!(range.size, HEADER_SIZE + 3 * RECORD_SIZE);

        let header: Vec<LightBlockHeader> = read_records(
            &device,
            &BufferRange {
                size: HEADER_SIZE,
                ..range
            },
        );
        assert_eq!(header[0].directional_light_count, 1);
        assert_eq!(header[0].point_light_count, 1);
        assert_eq!(header[0].spot_light_count, 1);
        assert_eq!(header[0].shadow_map_size, 512);
        assert_eq!(header[0].shadow_texture, binding::SHADOW_TEXTURE);

        let records: Vec<LightRecord> = read_records(
            &device,
            &BufferRange {
                offset: range.offset + HEADER_SIZE,
                size: 3 * RECORD_SIZE,
                ..range
            },
        );
        assert_eq!(records[0].shadow_params[0], INVALID_INDEX);
        assert_eq!(records[0].clip_from_world, gpu_mat4(&Mat4::IDENTITY));
        assert_eq!(records[2].shadow_params[0], 0);
        assert_eq!(records[2].clip_from_world[0][0], 2.0);
    }

    #[test]
    fn test_zero_lights_still_writes_header() {
        let device = HeadlessDevice::new();
        let mut buffer = LightBuffer::new(&device, 4, 1).unwrap();
        let range = buffer.update(&device, &[], None, Vec4::ZERO).unwrap();
        assert_eq!(range.size, HEADER_SIZE);
    }

    #[test]
    fn test_excess_lights_are_dropped() {
        let device = HeadlessDevice::new();
        let mut buffer = LightBuffer::new(&device, 2, 1).unwrap();
        let range = buffer.update(&device, &lights(), None, Vec4::ZERO).unwrap();
        assert_eq!(range.size, HEADER_SIZE + 2 * RECORD_SIZE);
    }

    #[test]
    fn test_control_blocks_are_aligned() {
        let device = HeadlessDevice::new();
        let mut buffer = LightBuffer::new(&device, 2, 1).unwrap();
        let first = buffer.update_control(&device, 0).unwrap();
        let second = buffer.update_control(&device, 1).unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, BUFFER_OFFSET_ALIGNMENT);

        let record: Vec<LightControlRecord> = read_records(&device, &second);
        assert_eq!(record[0].light_index, 1);
    }
}
