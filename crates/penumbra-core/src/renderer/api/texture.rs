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

//! Defines data structures related to GPU texture and sampler resources.

use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// An opaque handle to a view onto a texture (a subset of its layers, a format reinterpretation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a texture sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub usize);

/// The size of a texture in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth for 3D textures, array layer count for array textures.
    pub depth_or_array_layers: u32,
}

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// A two-dimensional texture (or an array of them).
    D2,
    /// A three-dimensional (volumetric) texture.
    D3,
}

/// The dimensionality of a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    /// A view of a single 2D layer.
    D2,
    /// A view of a range of layers of a 2D array texture.
    D2Array,
    /// A view of a 3D texture.
    D3,
}

/// The texel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, normalized.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float red channel.
    R32Float,
    /// 16-bit normalized depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns `true` for depth (and depth/stencil) formats.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32Float
        )
    }

    /// Picks the depth format closest to a requested bit depth.
    pub fn depth_from_bits(bits: u32) -> Self {
        match bits {
            0..=16 => TextureFormat::Depth16Unorm,
            17..=24 => TextureFormat::Depth24PlusStencil8,
            _ => TextureFormat::Depth32Float,
        }
    }
}

bitflags! {
    /// A set of flags describing the allowed usages of a [`TextureId`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// The texture can be the destination of a copy.
        const COPY_DST = 1 << 0;
        /// The texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 1;
        /// The texture can be a color or depth attachment of a render pass.
        const RENDER_ATTACHMENT = 1 << 2;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size in texels; `depth_or_array_layers` is the layer count for array textures.
    pub size: Extent3D,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Number of samples per texel.
    pub sample_count: u32,
    /// Dimensionality of the texture.
    pub dimension: TextureDimension,
    /// Texel format.
    pub format: TextureFormat,
    /// How the texture will be used.
    pub usage: TextureUsage,
}

/// A descriptor used to create a [`TextureViewId`].
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Format reinterpretation; `None` keeps the texture's format.
    pub format: Option<TextureFormat>,
    /// View dimensionality; `None` derives it from the texture.
    pub dimension: Option<TextureViewDimension>,
    /// The first array layer visible through the view.
    pub base_array_layer: u32,
    /// Number of visible layers; `None` means all remaining layers.
    pub array_layer_count: Option<u32>,
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    #[default]
    Nearest,
    /// Weighted average of neighbouring texels.
    Linear,
}

/// Behaviour for texture coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Coordinates are clamped to the edge.
    #[default]
    ClampToEdge,
    /// Coordinates wrap around.
    Repeat,
}

/// A comparison function used for depth testing and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if the new value is less than the existing value.
    Less,
    /// Passes if the new value is less than or equal to the existing value.
    LessEqual,
    /// Passes if the new value is greater than the existing value.
    Greater,
    /// Passes if the new value is greater than or equal to the existing value.
    GreaterEqual,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the values differ.
    NotEqual,
    /// Always passes.
    Always,
}

impl CompareFunction {
    /// The depth comparison that matches `less` semantics under the given depth convention.
    ///
    /// With reverse depth, near is 1.0 and far is 0.0, so "closer" means "greater".
    pub fn depth_closer(reverse_depth: bool) -> Self {
        if reverse_depth {
            CompareFunction::Greater
        } else {
            CompareFunction::Less
        }
    }

    /// Like [`depth_closer`](Self::depth_closer), but also passes on equal depth.
    pub fn depth_closer_or_equal(reverse_depth: bool) -> Self {
        if reverse_depth {
            CompareFunction::GreaterEqual
        } else {
            CompareFunction::LessEqual
        }
    }
}

/// A descriptor used to create a [`SamplerId`].
#[derive(Debug, Clone, Default)]
pub struct SamplerDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Addressing for all three coordinates.
    pub address_mode: AddressMode,
    /// When set, the sampler is a comparison sampler (used for shadow lookups).
    pub compare: Option<CompareFunction>,
}
