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

use crate::math::{Mat4, Vec3};
use crate::renderer::api::Viewport;

/// How a camera maps view space to clip space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection with a vertical field of view in radians.
    Perspective {
        /// Vertical field of view.
        fov_y: f32,
    },
    /// Orthographic projection with a fixed view height.
    Orthographic {
        /// Height of the view volume in world units.
        height: f32,
    },
}

/// A viewpoint into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Debug name.
    pub name: String,
    /// Projection kind.
    pub projection: Projection,
    /// Distance to the near plane.
    pub z_near: f32,
    /// Distance to the far plane.
    pub z_far: f32,
    /// Transform of the owning node.
    pub world_from_node: Mat4,
    /// Exposure applied by the tone mapper.
    pub exposure: f32,
    /// Half extent of the area covered by directional light shadows.
    pub shadow_range: f32,
}

impl Camera {
    /// A perspective camera at the origin looking down -Z.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_3,
            },
            z_near: 0.03,
            z_far: 200.0,
            world_from_node: Mat4::IDENTITY,
            exposure: 1.0,
            shadow_range: 22.0,
        }
    }

    /// World space camera position.
    pub fn position(&self) -> Vec3 {
        self.world_from_node.w_axis.truncate()
    }

    /// Vertical field of view, zero for orthographic cameras.
    pub fn fov_y(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fov_y } => fov_y,
            Projection::Orthographic { .. } => 0.0,
        }
    }

    /// Maps view space to clip space for `viewport`.
    ///
    /// With `reverse_depth` the near plane maps to depth 1 and the far plane to 0.
    pub fn clip_from_node(&self, viewport: &Viewport, reverse_depth: bool) -> Mat4 {
        let (near, far) = if reverse_depth {
            (self.z_far, self.z_near)
        } else {
            (self.z_near, self.z_far)
        };
        let aspect = viewport.aspect_ratio();
        match self.projection {
            Projection::Perspective { fov_y } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }

    /// Maps world space to clip space for `viewport`.
    pub fn clip_from_world(&self, viewport: &Viewport, reverse_depth: bool) -> Mat4 {
        self.clip_from_node(viewport, reverse_depth) * self.world_from_node.inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec4;
    use approx::assert_relative_eq;

    fn viewport() -> Viewport {
        Viewport {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            reverse_depth: false,
        }
    }

    #[test]
    fn test_reverse_depth_maps_near_to_one() {
        let camera = Camera::new("test");
        let near_point = Vec4::new(0.0, 0.0, -camera.z_near, 1.0);
        let far_point = Vec4::new(0.0, 0.0, -camera.z_far, 1.0);

        let forward = camera.clip_from_node(&viewport(), false);
        let reverse = camera.clip_from_node(&viewport(), true);

        let depth = |m: Mat4, p: Vec4| {
            let clip = m * p;
            clip.z / clip.w
        };
        assert_relative_eq!(depth(forward, near_point), 0.0, epsilon = 1e-4);
        assert_relative_eq!(depth(forward, far_point), 1.0, epsilon = 1e-4);
        assert_relative_eq!(depth(reverse, near_point), 1.0, epsilon = 1e-4);
        assert_relative_eq!(depth(reverse, far_point), 0.0, epsilon = 1e-4);
    }
}
