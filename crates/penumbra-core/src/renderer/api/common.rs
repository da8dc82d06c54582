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

//! Provides common, backend-agnostic constants and data structures for the rendering API.

use serde::{Deserialize, Serialize};

/// Number of frames the CPU may record ahead of the GPU.
///
/// Every per-frame GPU buffer is allocated this many times and rotated once per
/// frame, so the CPU never writes a slot the GPU may still be reading.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Alignment, in bytes, of every buffer range bound to a shader block.
pub const BUFFER_OFFSET_ALIGNMENT: u64 = 256;

/// Fixed shader binding points shared between the buffer packers and the shaders.
pub mod binding {
    /// Material storage block.
    pub const MATERIAL: u32 = 0;
    /// Light uniform block.
    pub const LIGHT: u32 = 1;
    /// Light control block (index of the light being rendered).
    pub const LIGHT_CONTROL: u32 = 2;
    /// Primitive storage block.
    pub const PRIMITIVE: u32 = 3;
    /// Joint storage block.
    pub const JOINT: u32 = 4;
    /// Camera uniform block.
    pub const CAMERA: u32 = 5;
    /// Shadow map texture array.
    pub const SHADOW_TEXTURE: u32 = 6;
    /// First texture unit handed out to material textures.
    pub const MATERIAL_TEXTURE_BASE: u32 = 7;
}

/// Specifies the data type of indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexFormat {
    /// Indices are 16-bit unsigned integers.
    Uint16,
    /// Indices are 32-bit unsigned integers.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size_bytes(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// A rectangle of the render target, in pixels, plus its depth convention.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge.
    pub x: i32,
    /// Bottom edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// Whether depth is mapped near = 1, far = 0.
    pub reverse_depth: bool,
}

impl Viewport {
    /// Width over height, or 1.0 for an empty viewport.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}
