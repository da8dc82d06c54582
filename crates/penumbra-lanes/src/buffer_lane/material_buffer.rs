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

//! Packs the material library and assigns texture slots.

use super::records::{MaterialRecord, INVALID_INDEX};
use super::ring_writer::{BufferRange, GpuRingBuffer};
use ahash::AHashMap;
use penumbra_core::renderer::{BufferUsage, GraphicsDevice, ResourceError, BUFFER_OFFSET_ALIGNMENT};
use penumbra_core::scene::{Material, MaterialId, MaterialTexture};
use std::sync::Arc;

const RECORD_SIZE: u64 = std::mem::size_of::<MaterialRecord>() as u64;

/// Writes one [`MaterialRecord`] per material.
#[derive(Debug)]
pub struct MaterialBuffer {
    writer: GpuRingBuffer,
    max_material_count: usize,
    material_indices: AHashMap<MaterialId, u32>,
    texture_slots: Vec<MaterialTexture>,
}

impl MaterialBuffer {
    /// Creates a buffer holding up to `max_material_count` materials per update
    /// and `updates_per_frame` updates per frame.
    pub fn new(
        device: &dyn GraphicsDevice,
        max_material_count: usize,
        updates_per_frame: usize,
    ) -> Result<Self, ResourceError> {
        let capacity = (RECORD_SIZE * max_material_count as u64 + BUFFER_OFFSET_ALIGNMENT)
            * updates_per_frame.max(1) as u64;
        Ok(Self {
            writer: GpuRingBuffer::new(device, "material", BufferUsage::STORAGE, capacity)?,
            max_material_count,
            material_indices: AHashMap::new(),
            texture_slots: Vec::new(),
        })
    }

    /// Maximum number of materials per update.
    pub fn max_material_count(&self) -> usize {
        self.max_material_count
    }

    /// Packs `materials`, indexing them in order.
    ///
    /// Replaces the index map and texture slots of the previous update.
    ///
    /// # Panics
    ///
    /// Panics if there are more than `max_material_count` materials.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        materials: &[Arc<Material>],
    ) -> Result<BufferRange, ResourceError> {
        if materials.len() > self.max_material_count {
            log::error!(
                "MaterialBuffer: {} materials exceed the limit of {}",
                materials.len(),
                self.max_material_count
            );
            panic!("material buffer capacity exceeded");
        }
        self.material_indices.clear();
        self.texture_slots.clear();

        self.writer.begin(materials.len() as u64 * RECORD_SIZE);
        for (index, material) in materials.iter().enumerate() {
            let base_color_texture = self.allocate_texture_slot(material.base_color_texture);
            let metallic_roughness_texture =
                self.allocate_texture_slot(material.metallic_roughness_texture);
            let record = MaterialRecord {
                roughness: material.roughness.to_array(),
                metallic: material.metallic,
                reflectance: material.reflectance,
                base_color: material.base_color.to_array(),
                emissive: material.emissive.extend(0.0).to_array(),
                opacity: material.opacity,
                base_color_texture,
                metallic_roughness_texture,
                _padding: 0,
            };
            self.writer.write(device, bytemuck::bytes_of(&record))?;
            self.material_indices.insert(material.id, index as u32);
        }
        Ok(self.writer.end())
    }

    fn allocate_texture_slot(&mut self, texture: Option<MaterialTexture>) -> u32 {
        let Some(texture) = texture else {
            return INVALID_INDEX;
        };
        if let Some(slot) = self.texture_slots.iter().position(|t| *t == texture) {
            return slot as u32;
        }
        self.texture_slots.push(texture);
        (self.texture_slots.len() - 1) as u32
    }

    /// Index of `material` in the last packed buffer.
    pub fn index_of(&self, material: MaterialId) -> Option<u32> {
        self.material_indices.get(&material).copied()
    }

    /// Index map of the last update.
    pub fn material_indices(&self) -> &AHashMap<MaterialId, u32> {
        &self.material_indices
    }

    /// Textures referenced by the last update, in slot order.
    pub fn texture_slots(&self) -> &[MaterialTexture] {
        &self.texture_slots
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
    use penumbra_core::renderer::{SamplerId, TextureViewId};

    fn texture(view: usize) -> Option<MaterialTexture> {
        Some(MaterialTexture {
            view: TextureViewId(view),
            sampler: SamplerId(1),
        })
    }

    #[test]
    fn test_indices_follow_material_order() {
        let device = HeadlessDevice::new();
        let mut buffer = MaterialBuffer::new(&device, 8, 1).unwrap();
        let materials: Vec<_> = (10..13)
            .map(|i| Arc::new(Material::new(MaterialId(i), format!("m{i}"))))
            .collect();

        let range = buffer.update(&device, &materials).unwrap();

        assert_eq!(buffer.index_of(MaterialId(10)), Some(0));
        assert_eq!(buffer.index_of(MaterialId(12)), Some(2));
        assert_eq!(buffer.index_of(MaterialId(99)), None);
        assert_eq!(range.size, 3 * RECORD_SIZE);
    }

    #[test]
    fn test_texture_slots_are_deduplicated() {
        let device = HeadlessDevice::new();
        let mut buffer = MaterialBuffer::new(&device, 8, 1).unwrap();

        let mut a = Material::new(MaterialId(1), "a");
        a.base_color_texture = texture(5);
        a.metallic_roughness_texture = texture(6);
        let mut b = Material::new(MaterialId(2), "b");
        b.base_color_texture = texture(6);
        let c = Material::new(MaterialId(3), "c");
        let materials = vec![Arc::new(a), Arc::new(b), Arc::new(c)];

        let range = buffer.update(&device, &materials).unwrap();
        let records: Vec<MaterialRecord> = read_records(&device, &range);

        assert_eq!(buffer.texture_slots().len(), 2);
        assert_eq!(records[0].base_color_texture, 0);
        assert_eq!(records[0].metallic_roughness_texture, 1);
        assert_eq!(records[1].base_color_texture, 1);
        assert_eq!(records[2].base_color_texture, INVALID_INDEX);
        assert_eq!(records[2].metallic_roughness_texture, INVALID_INDEX);
    }

    #[test]
    #[should_panic(expected = "material buffer capacity exceeded")]
    fn test_too_many_materials_is_fatal() {
        let device = HeadlessDevice::new();
        let mut buffer = MaterialBuffer::new(&device, 2, 1).unwrap();
        let materials: Vec<_> = (0..3)
            .map(|i| Arc::new(Material::new(MaterialId(i), "m")))
            .collect();
        let _ = buffer.update(&device, &materials);
    }
}
