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

use super::LightId;
use crate::item::ItemFlags;
use crate::math::{Mat4, Vec3};

/// Kind of light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Parallel rays along the node's -Z axis.
    Directional,
    /// Omnidirectional from the node position.
    Point,
    /// A cone along the node's -Z axis.
    Spot,
}

impl LightType {
    /// Order in which lights are packed and shadowed: directional, point, spot.
    pub fn sort_rank(self) -> u8 {
        match self {
            LightType::Directional => 0,
            LightType::Point => 1,
            LightType::Spot => 2,
        }
    }
}

/// A light source.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Stable identity.
    pub id: LightId,
    /// Debug name.
    pub name: String,
    /// Kind of light.
    pub light_type: LightType,
    /// Linear color.
    pub color: Vec3,
    /// Scalar intensity applied to `color`.
    pub intensity: f32,
    /// Attenuation range, `0` for infinite.
    pub range: f32,
    /// Inner cone angle in radians, spot lights only.
    pub inner_spot_angle: f32,
    /// Outer cone angle in radians, spot lights only.
    pub outer_spot_angle: f32,
    /// Whether the light renders a shadow map.
    pub cast_shadow: bool,
    /// Transform of the owning node.
    pub world_from_node: Mat4,
    /// Item flag bits.
    pub flags: ItemFlags,
}

impl Light {
    /// Creates a white, shadow casting light at the origin.
    pub fn new(id: LightId, name: impl Into<String>, light_type: LightType) -> Self {
        Self {
            id,
            name: name.into(),
            light_type,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 0.0,
            inner_spot_angle: std::f32::consts::FRAC_PI_8,
            outer_spot_angle: std::f32::consts::FRAC_PI_4,
            cast_shadow: true,
            world_from_node: Mat4::IDENTITY,
            flags: ItemFlags::VISIBLE | ItemFlags::CONTENT,
        }
    }

    /// World space position of the light.
    pub fn position(&self) -> Vec3 {
        self.world_from_node.w_axis.truncate()
    }

    /// Direction the light travels, the node's -Z axis.
    pub fn direction(&self) -> Vec3 {
        (-self.world_from_node.z_axis.truncate()).normalize_or_zero()
    }

    /// The node's +Y axis, used as the up vector of light views.
    pub fn up(&self) -> Vec3 {
        self.world_from_node.y_axis.truncate().normalize_or_zero()
    }

    /// `color * intensity`.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}
