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

use super::MaterialId;
use crate::math::{Vec2, Vec3, Vec4};
use crate::renderer::api::{SamplerId, TextureViewId};

/// A texture view sampled by a material, with its sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialTexture {
    /// The sampled view.
    pub view: TextureViewId,
    /// The sampler.
    pub sampler: SamplerId,
}

/// Surface parameters of a metallic-roughness material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Stable identity.
    pub id: MaterialId,
    /// Debug name.
    pub name: String,
    /// Linear base color.
    pub base_color: Vec4,
    /// Emitted radiance.
    pub emissive: Vec3,
    /// Anisotropic roughness.
    pub roughness: Vec2,
    /// Metalness in `[0, 1]`.
    pub metallic: f32,
    /// Dielectric reflectance.
    pub reflectance: f32,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Optional base color texture.
    pub base_color_texture: Option<MaterialTexture>,
    /// Optional metallic-roughness texture.
    pub metallic_roughness_texture: Option<MaterialTexture>,
}

impl Material {
    /// A white dielectric with default parameters.
    pub fn new(id: MaterialId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            roughness: Vec2::splat(0.5),
            metallic: 0.0,
            reflectance: 0.5,
            opacity: 1.0,
            base_color_texture: None,
            metallic_roughness_texture: None,
        }
    }
}
