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

//! Packs the per-view camera block.

use super::records::{gpu_mat4, CameraRecord};
use super::ring_writer::{BufferRange, GpuRingBuffer};
use penumbra_core::renderer::{
    BufferUsage, GraphicsDevice, ResourceError, Viewport, BUFFER_OFFSET_ALIGNMENT,
};
use penumbra_core::scene::Camera;

const RECORD_SIZE: u64 = std::mem::size_of::<CameraRecord>() as u64;

/// Writes one [`CameraRecord`] per view and pass.
#[derive(Debug)]
pub struct CameraBuffer {
    writer: GpuRingBuffer,
    max_camera_count: usize,
}

impl CameraBuffer {
    /// Creates a buffer for up to `max_camera_count` camera updates per frame.
    pub fn new(
        device: &dyn GraphicsDevice,
        max_camera_count: usize,
    ) -> Result<Self, ResourceError> {
        let stride = RECORD_SIZE.max(BUFFER_OFFSET_ALIGNMENT);
        Ok(Self {
            writer: GpuRingBuffer::new(
                device,
                "camera",
                BufferUsage::UNIFORM,
                stride * max_camera_count as u64,
            )?,
            max_camera_count,
        })
    }

    /// Maximum number of camera updates per frame.
    pub fn max_camera_count(&self) -> usize {
        self.max_camera_count
    }

    /// Packs `camera` as seen through `viewport`.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        camera: &Camera,
        viewport: &Viewport,
        reverse_depth: bool,
    ) -> Result<BufferRange, ResourceError> {
        let clip_from_world = camera.clip_from_world(viewport, reverse_depth);
        let aspect = viewport.aspect_ratio();
        let fov_y = camera.fov_y();
        let fov_x = 2.0 * ((fov_y * 0.5).tan() * aspect).atan();

        let record = CameraRecord {
            world_from_node: gpu_mat4(&camera.world_from_node),
            world_from_clip: gpu_mat4(&clip_from_world.inverse()),
            clip_from_world: gpu_mat4(&clip_from_world),
            viewport: [
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
            ],
            fov: [fov_x, fov_y, aspect, 0.0],
            clip_depth_direction: if reverse_depth { -1.0 } else { 1.0 },
            view_depth_near: camera.z_near,
            view_depth_far: camera.z_far,
            exposure: camera.exposure,
        };

        self.writer.begin(RECORD_SIZE);
        self.writer.write(device, bytemuck::bytes_of(&record))?;
        Ok(self.writer.end())
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
    use penumbra_core::renderer::headless::HeadlessDevice;

    #[test]
    fn test_camera_record_contents() {
        let device = HeadlessDevice::new();
        let mut buffer = CameraBuffer::new(&device, 2).unwrap();
        let camera = Camera::new("main");
        let viewport = Viewport {
            x: 0,
            y: 0,
            width: 200,
            height: 100,
            reverse_depth: true,
        };

        let range = buffer.update(&device, &camera, &viewport, true).unwrap();
        let record: Vec<CameraRecord> = read_records(&device, &range);

        assert_eq!(record[0].viewport, [0.0, 0.0, 200.0, 100.0]);
        assert_eq!(record[0].clip_depth_direction, -1.0);
        assert_eq!(record[0].fov[2], 2.0);
        assert!(record[0].fov[0] > record[0].fov[1]);
        assert_eq!(record[0].view_depth_near, camera.z_near);
    }

    #[test]
    fn test_views_get_aligned_ranges() {
        let device = HeadlessDevice::new();
        let mut buffer = CameraBuffer::new(&device, 2).unwrap();
        let camera = Camera::new("main");
        let viewport = Viewport::default();

        let first = buffer.update(&device, &camera, &viewport, false).unwrap();
        let second = buffer.update(&device, &camera, &viewport, false).unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, BUFFER_OFFSET_ALIGNMENT);
    }
}
