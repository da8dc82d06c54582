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

//! Ring-buffered writer for per-frame GPU data.

use penumbra_core::renderer::{
    BufferBinding, BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, ResourceError,
    BUFFER_OFFSET_ALIGNMENT, MAX_FRAMES_IN_FLIGHT,
};
use std::borrow::Cow;

/// A byte range written into one slot of a [`GpuRingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// Ring slot the range was written to.
    pub slot: usize,
    /// The slot's buffer.
    pub buffer: BufferId,
    /// Offset of the first written byte.
    pub offset: u64,
    /// Number of written bytes.
    pub size: u64,
}

impl BufferRange {
    /// The range as a shader binding.
    pub fn binding(&self) -> BufferBinding {
        BufferBinding {
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct WriteWindow {
    begin: u64,
    write_offset: u64,
    end: u64,
}

/// Rounds `value` up to the next multiple of [`BUFFER_OFFSET_ALIGNMENT`].
pub fn align_offset(value: u64) -> u64 {
    (value + BUFFER_OFFSET_ALIGNMENT - 1) & !(BUFFER_OFFSET_ALIGNMENT - 1)
}

/// Slot size holding `max_records` records of `record_size` bytes per frame,
/// however they are split across windows.
///
/// Every non-empty window holds at least one record and its start is padded by
/// less than [`BUFFER_OFFSET_ALIGNMENT`], so one alignment per record bounds the
/// padding of a frame.
pub fn slot_capacity_for_records(record_size: u64, max_records: usize) -> u64 {
    (record_size + BUFFER_OFFSET_ALIGNMENT) * max_records as u64
}

/// One device buffer per frame in flight, written through short-lived windows.
///
/// Each frame writes only to the current slot. A window is opened with
/// [`begin`](Self::begin), filled with [`write`](Self::write) and closed with
/// [`end`](Self::end), which returns the bytes written as a [`BufferRange`].
/// Windows start at aligned offsets so every range can be bound directly.
#[derive(Debug)]
pub struct GpuRingBuffer {
    slots: Vec<BufferId>,
    capacity: u64,
    current_index: usize,
    cursor: u64,
    window: Option<WriteWindow>,
    label: String,
}

impl GpuRingBuffer {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] buffers of `capacity` bytes each.
    ///
    /// # Arguments
    ///
    /// * `device` - The graphics device to allocate from.
    /// * `label` - Debug label, also used as the log prefix.
    /// * `usage` - Usage of the slot buffers; `COPY_DST` is always added.
    /// * `capacity` - Size of each slot in bytes.
    ///
    /// # Returns
    ///
    /// A `Result` containing the ring buffer or a `ResourceError`.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: impl Into<String>,
        usage: BufferUsage,
        capacity: u64,
    ) -> Result<Self, ResourceError> {
        let label = label.into();
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for i in 0..MAX_FRAMES_IN_FLIGHT {
            let buffer = device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Owned(format!("{} [slot {}]", label, i))),
                size: capacity,
                usage: usage | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            });
            match buffer {
                Ok(buffer) => slots.push(buffer),
                Err(e) => {
                    for created in slots {
                        if let Err(e) = device.destroy_buffer(created) {
                            log::warn!("GpuRingBuffer({}): Failed to destroy buffer: {:?}", label, e);
                        }
                    }
                    return Err(e);
                }
            }
        }
        log::trace!(
            "GpuRingBuffer({}): created {} slots of {} bytes",
            label,
            MAX_FRAMES_IN_FLIGHT,
            capacity
        );
        Ok(Self {
            slots,
            capacity,
            current_index: 0,
            cursor: 0,
            window: None,
            label,
        })
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size of each slot in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Index of the slot written this frame.
    pub fn current_slot_index(&self) -> usize {
        self.current_index
    }

    /// Buffer of the slot written this frame.
    pub fn current_buffer(&self) -> BufferId {
        self.slots[self.current_index]
    }

    /// Opens a write window of at most `max_bytes`, clamped to the slot capacity.
    pub fn begin(&mut self, max_bytes: u64) {
        if self.window.is_some() {
            log::warn!(
                "GpuRingBuffer({}): begin() while a window is open, discarding it",
                self.label
            );
        }
        let begin = align_offset(self.cursor).min(self.capacity);
        let end = begin.saturating_add(max_bytes).min(self.capacity);
        self.window = Some(WriteWindow {
            begin,
            write_offset: begin,
            end,
        });
    }

    /// Bytes left in the open window.
    pub fn remaining(&self) -> u64 {
        self.window
            .map(|w| w.end - w.write_offset)
            .unwrap_or(0)
    }

    /// Appends `bytes` to the open window.
    ///
    /// # Panics
    ///
    /// Writing past the end of the window is fatal: continuing would either drop
    /// draw data silently or overwrite data the GPU is about to read.
    pub fn write(&mut self, device: &dyn GraphicsDevice, bytes: &[u8]) -> Result<(), ResourceError> {
        let Some(window) = self.window.as_mut() else {
            log::error!("GpuRingBuffer({}): write() without begin()", self.label);
            return Err(ResourceError::OutOfBounds);
        };
        let len = bytes.len() as u64;
        if window.write_offset + len > window.end {
            log::error!(
                "GpuRingBuffer({}): buffer capacity {} exceeded (offset {}, write of {} bytes, window end {})",
                self.label,
                self.capacity,
                window.write_offset,
                len,
                window.end
            );
            panic!("{} buffer capacity exceeded", self.label);
        }
        device.write_buffer(self.slots[self.current_index], window.write_offset, bytes)?;
        window.write_offset += len;
        Ok(())
    }

    /// Closes the open window and returns the bytes written since `begin`.
    pub fn end(&mut self) -> BufferRange {
        let buffer = self.slots[self.current_index];
        match self.window.take() {
            Some(window) => {
                self.cursor = window.write_offset;
                BufferRange {
                    slot: self.current_index,
                    buffer,
                    offset: window.begin,
                    size: window.write_offset - window.begin,
                }
            }
            None => {
                log::warn!("GpuRingBuffer({}): end() without begin()", self.label);
                BufferRange {
                    slot: self.current_index,
                    buffer,
                    offset: 0,
                    size: 0,
                }
            }
        }
    }

    /// Drops the open window; its bytes are reused by the next window.
    pub fn cancel(&mut self) {
        self.window = None;
    }

    /// Advances to the next slot and rewinds the write cursor.
    pub fn next_frame(&mut self) {
        if self.window.take().is_some() {
            log::warn!(
                "GpuRingBuffer({}): next_frame() with an open window",
                self.label
            );
        }
        self.current_index = (self.current_index + 1) % self.slots.len();
        self.cursor = 0;
    }

    /// Releases the slot buffers.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for buffer in self.slots.drain(..) {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!(
                    "GpuRingBuffer({}): Failed to destroy buffer: {:?}",
                    self.label,
                    e
                );
            }
        }
        self.window = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::renderer::headless::HeadlessDevice;

    fn ring(device: &HeadlessDevice, capacity: u64) -> GpuRingBuffer {
        GpuRingBuffer::new(device, "test", BufferUsage::STORAGE, capacity).unwrap()
    }

    #[test]
    fn test_windows_start_aligned() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 1024);

        writer.begin(16);
        writer.write(&device, &[1; 10]).unwrap();
        let first = writer.end();
        writer.begin(16);
        writer.write(&device, &[2; 4]).unwrap();
        let second = writer.end();

        assert_eq!(first.offset, 0);
        assert_eq!(first.size, 10);
        assert_eq!(second.offset, BUFFER_OFFSET_ALIGNMENT);
        assert_eq!(device.read_buffer(second.buffer, second.offset, 4), Some(vec![2; 4]));
    }

    #[test]
    fn test_begin_clamps_to_capacity() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 64);
        writer.begin(1 << 20);
        assert_eq!(writer.remaining(), 64);
    }

    #[test]
    fn test_next_frame_rotates_slots() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 64);
        let mut seen = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT + 1 {
            seen.push(writer.current_buffer());
            writer.next_frame();
        }
        assert_eq!(seen[0], seen[MAX_FRAMES_IN_FLIGHT]);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(device.live_buffer_count(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_cancel_discards_window() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 512);
        writer.begin(32);
        writer.write(&device, &[0; 32]).unwrap();
        writer.cancel();
        writer.begin(32);
        assert_eq!(writer.end().offset, 0);
    }

    #[test]
    #[should_panic(expected = "test buffer capacity exceeded")]
    fn test_write_past_window_is_fatal() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 512);
        writer.begin(8);
        writer.write(&device, &[0; 8]).unwrap();
        let _ = writer.write(&device, &[0; 1]);
    }

    #[test]
    fn test_failed_creation_releases_created_slots() {
        let device = HeadlessDevice::new();
        device.state().buffer_limit = Some(1);
        let result = GpuRingBuffer::new(&device, "test", BufferUsage::STORAGE, 64);
        assert!(matches!(result, Err(ResourceError::BackendError(_))));
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_slot_capacity_absorbs_per_window_padding() {
        let device = HeadlessDevice::new();
        let record = [7u8; 48];
        let mut writer = ring(&device, slot_capacity_for_records(48, 3));
        for _ in 0..3 {
            writer.begin(48);
            writer.write(&device, &record).unwrap();
            let range = writer.end();
            assert_eq!(range.offset % BUFFER_OFFSET_ALIGNMENT, 0);
            assert_eq!(range.size, 48);
        }
    }

    #[test]
    fn test_destroy_releases_buffers() {
        let device = HeadlessDevice::new();
        let mut writer = ring(&device, 64);
        writer.destroy(&device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
