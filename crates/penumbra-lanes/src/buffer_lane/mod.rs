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

//! Per-frame GPU buffer packing.
//!
//! Every packer owns a [`GpuRingBuffer`] with one slot per frame in flight and
//! writes `#[repr(C)]` records from [`records`] into the current slot. The
//! returned [`BufferRange`]s are bound by the render passes.

pub mod camera_buffer;
pub mod draw_indirect_buffer;
pub mod joint_buffer;
pub mod light_buffer;
pub mod material_buffer;
pub mod primitive_buffer;
pub mod records;
pub mod ring_writer;

pub use self::camera_buffer::CameraBuffer;
pub use self::draw_indirect_buffer::{DrawIndirectBuffer, DRAW_COMMAND_STRIDE};
pub use self::joint_buffer::JointBuffer;
pub use self::light_buffer::LightBuffer;
pub use self::material_buffer::MaterialBuffer;
pub use self::primitive_buffer::{
    count_drawn_primitives, IdRange, PrimitiveBatch, PrimitiveBuffer, PrimitiveColorSource,
    PrimitiveInterfaceSettings, PrimitiveSizeSource,
};
pub use self::ring_writer::{align_offset, slot_capacity_for_records, BufferRange, GpuRingBuffer};
