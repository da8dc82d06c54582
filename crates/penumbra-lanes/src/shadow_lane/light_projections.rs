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

//! Per-light shadow view-projections.

use penumbra_core::math::{Mat4, Vec3, Vec4};
use penumbra_core::renderer::{SamplerId, TextureViewId};
use penumbra_core::scene::{Camera, Light, LightId, LightType};
use std::sync::Arc;

/// Smallest field of view used for spot and point light projections.
pub const MIN_LIGHT_FOV: f32 = 1.0 * std::f32::consts::PI / 180.0;
/// Near plane of spot and point light projections.
pub const LOCAL_LIGHT_NEAR: f32 = 0.1;
/// Far plane of spot and point light projections without a range.
pub const LOCAL_LIGHT_DEFAULT_FAR: f32 = 100.0;

/// Shadow transforms of one light.
#[derive(Debug, Clone, PartialEq)]
pub struct LightProjectionTransforms {
    /// The light the transforms belong to.
    pub light: LightId,
    /// Maps world space to the light's clip space.
    pub clip_from_world: Mat4,
    /// Maps world space to shadow map texture coordinates and depth.
    pub texture_from_world: Mat4,
    /// The light's view transform, inverted.
    pub world_from_light: Mat4,
    /// Shadow map array layer.
    pub index: usize,
}

/// Shadow transforms of every shadowed light, plus what is needed to sample the maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightProjections {
    /// One entry per light with a shadow map, in layer order.
    pub light_projection_transforms: Vec<LightProjectionTransforms>,
    /// View of the whole shadow map array.
    pub shadow_map_texture: Option<TextureViewId>,
    /// Comparison sampler for filtered shadow lookups.
    pub shadow_sampler_compare: Option<SamplerId>,
    /// Plain sampler for reading raw depth.
    pub shadow_sampler_no_compare: Option<SamplerId>,
    /// Width and height of a shadow map layer.
    pub shadow_map_resolution: u32,
    /// Depth convention the maps were rendered with.
    pub reverse_depth: bool,
}

/// Parameters of a [`LightProjections`] rebuild.
#[derive(Debug, Clone, Copy)]
pub struct LightProjectionParameters<'a> {
    /// Lights, already sorted directional, point, spot.
    pub lights: &'a [Arc<Light>],
    /// The viewing camera; directional projections follow it.
    pub camera: &'a Camera,
    /// Number of shadow map layers.
    pub light_count: usize,
    /// Width and height of a shadow map layer.
    pub resolution: u32,
    /// Depth convention.
    pub reverse_depth: bool,
}

impl LightProjections {
    /// Computes projections for the shadow casting lights.
    ///
    /// Layers are handed out in light order to shadow casting lights only, so
    /// indices are compact. Lights past `light_count` get no projection.
    pub fn new(parameters: &LightProjectionParameters<'_>) -> Self {
        let mut transforms = Vec::new();
        let mut index = 0;
        for light in parameters.lights.iter().filter(|l| l.cast_shadow) {
            if index >= parameters.light_count {
                break;
            }
            let (clip_from_world, world_from_light) = match light.light_type {
                LightType::Directional => directional_projection(
                    light,
                    parameters.camera,
                    parameters.resolution,
                    parameters.reverse_depth,
                ),
                LightType::Spot | LightType::Point => {
                    local_light_projection(light, parameters.reverse_depth)
                }
            };
            transforms.push(LightProjectionTransforms {
                light: light.id,
                clip_from_world,
                texture_from_world: texture_from_clip() * clip_from_world,
                world_from_light,
                index,
            });
            index += 1;
        }

        Self {
            light_projection_transforms: transforms,
            shadow_map_resolution: parameters.resolution,
            reverse_depth: parameters.reverse_depth,
            ..Default::default()
        }
    }

    /// The transforms of `light`, if it has a shadow map.
    pub fn transforms_for_light(&self, light: LightId) -> Option<&LightProjectionTransforms> {
        self.light_projection_transforms
            .iter()
            .find(|t| t.light == light)
    }

    /// Number of lights with a shadow map.
    pub fn len(&self) -> usize {
        self.light_projection_transforms.len()
    }

    /// Whether no light has a shadow map.
    pub fn is_empty(&self) -> bool {
        self.light_projection_transforms.is_empty()
    }
}

/// Maps clip space x and y to `[0, 1]` texture coordinates, flipping y.
pub fn texture_from_clip() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 1.0),
    )
}

fn safe_up(direction: Vec3, preferred: Vec3) -> Vec3 {
    let direction = direction.normalize_or_zero();
    [preferred.normalize_or_zero(), Vec3::Y, Vec3::Z, Vec3::X]
        .into_iter()
        .find(|up| *up != Vec3::ZERO && direction.dot(*up).abs() < 0.99)
        .unwrap_or(Vec3::Y)
}

fn safe_direction(light: &Light) -> Vec3 {
    let direction = light.direction();
    if direction == Vec3::ZERO {
        Vec3::NEG_Z
    } else {
        direction
    }
}

/// Orthographic projection covering `[-r, r]²` around the camera, `r = camera.shadow_range`.
///
/// The projection center is snapped to the shadow map texel grid so the map
/// does not shimmer while the camera moves.
fn directional_projection(
    light: &Light,
    camera: &Camera,
    resolution: u32,
    reverse_depth: bool,
) -> (Mat4, Mat4) {
    let r = camera.shadow_range.max(f32::EPSILON);
    let direction = safe_direction(light);
    let up = safe_up(direction, light.up());

    let light_from_world_rotation = Mat4::look_to_rh(Vec3::ZERO, direction, up);
    let camera_in_light = light_from_world_rotation.transform_point3(camera.position());
    let texel_size = 2.0 * r / resolution.max(1) as f32;
    let snapped_in_light = Vec3::new(
        (camera_in_light.x / texel_size).floor() * texel_size,
        (camera_in_light.y / texel_size).floor() * texel_size,
        camera_in_light.z,
    );
    let snapped = light_from_world_rotation
        .inverse()
        .transform_point3(snapped_in_light);

    let eye = snapped - r * direction;
    let light_from_world = Mat4::look_at_rh(eye, snapped, up);
    let (near, far) = if reverse_depth { (2.0 * r, 0.0) } else { (0.0, 2.0 * r) };
    let clip_from_light = Mat4::orthographic_rh(-r, r, -r, r, near, far);

    (clip_from_light * light_from_world, light_from_world.inverse())
}

fn local_light_projection(light: &Light, reverse_depth: bool) -> (Mat4, Mat4) {
    let direction = safe_direction(light);
    let up = safe_up(direction, light.up());
    let light_from_world = Mat4::look_to_rh(light.position(), direction, up);

    let fov = light.outer_spot_angle.max(MIN_LIGHT_FOV);
    let far = if light.range > 0.0 {
        light.range
    } else {
        LOCAL_LIGHT_DEFAULT_FAR
    };
    let (near, far) = if reverse_depth {
        (far, LOCAL_LIGHT_NEAR)
    } else {
        (LOCAL_LIGHT_NEAR, far)
    };
    let clip_from_light = Mat4::perspective_rh(fov, 1.0, near, far);

    (clip_from_light * light_from_world, light_from_world.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use penumbra_core::math::Mat3;

    fn light(id: u64, light_type: LightType, cast_shadow: bool) -> Arc<Light> {
        let mut light = Light::new(LightId(id), format!("light {id}"), light_type);
        light.cast_shadow = cast_shadow;
        light.world_from_node = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_4);
        light.world_from_node.w_axis = Vec4::new(0.0, 5.0, 5.0, 1.0);
        Arc::new(light)
    }

    fn build(lights: &[Arc<Light>], light_count: usize, reverse_depth: bool) -> LightProjections {
        let camera = Camera::new("camera");
        LightProjections::new(&LightProjectionParameters {
            lights,
            camera: &camera,
            light_count,
            resolution: 512,
            reverse_depth,
        })
    }

    #[test]
    fn test_indices_are_stable_across_frames() {
        let lights = vec![
            light(1, LightType::Directional, true),
            light(2, LightType::Point, true),
            light(3, LightType::Spot, true),
        ];
        let first = build(&lights, 4, true);
        let second = build(&lights, 4, true);

        for (a, b) in first
            .light_projection_transforms
            .iter()
            .zip(&second.light_projection_transforms)
        {
            assert_eq!(a.light, b.light);
            assert_eq!(a.index, b.index);
        }
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_indices_are_compacted_after_removal() {
        let mut lights = vec![
            light(1, LightType::Directional, true),
            light(2, LightType::Point, true),
            light(3, LightType::Spot, true),
        ];
        let before = build(&lights, 4, false);
        assert_eq!(before.transforms_for_light(LightId(3)).map(|t| t.index), Some(2));

        lights.remove(1);
        let after = build(&lights, 4, false);
        assert_eq!(after.transforms_for_light(LightId(1)).map(|t| t.index), Some(0));
        assert_eq!(after.transforms_for_light(LightId(3)).map(|t| t.index), Some(1));
        assert!(after.transforms_for_light(LightId(2)).is_none());
    }

    #[test]
    fn test_non_casting_and_excess_lights_are_skipped() {
        let lights = vec![
            light(1, LightType::Directional, false),
            light(2, LightType::Spot, true),
            light(3, LightType::Spot, true),
        ];
        let projections = build(&lights, 1, false);
        assert_eq!(projections.len(), 1);
        assert_eq!(projections.light_projection_transforms[0].light, LightId(2));
        assert_eq!(projections.light_projection_transforms[0].index, 0);
    }

    #[test]
    fn test_projections_are_not_degenerate() {
        for light_type in [LightType::Directional, LightType::Point, LightType::Spot] {
            let lights = vec![light(1, light_type, true)];
            for reverse_depth in [false, true] {
                let projections = build(&lights, 1, reverse_depth);
                let m = projections.light_projection_transforms[0].clip_from_world;
                let det = Mat3::from_mat4(m).determinant();
                assert!(det.abs() > 1e-8, "{light_type:?} reverse={reverse_depth}");
            }
        }
    }

    #[test]
    fn test_texture_from_clip_maps_ndc_corners() {
        let m = texture_from_clip();
        let top_left = m * Vec4::new(-1.0, 1.0, 0.25, 1.0);
        assert_relative_eq!(top_left.x, 0.0);
        assert_relative_eq!(top_left.y, 0.0);
        assert_relative_eq!(top_left.z, 0.25);
        let bottom_right = m * Vec4::new(1.0, -1.0, 0.0, 1.0);
        assert_relative_eq!(bottom_right.x, 1.0);
        assert_relative_eq!(bottom_right.y, 1.0);
    }

    #[test]
    fn test_straight_down_light_is_finite() {
        let mut light = Light::new(LightId(9), "sun", LightType::Directional);
        light.world_from_node = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let projections = build(&[Arc::new(light)], 1, false);
        let m = projections.light_projection_transforms[0].clip_from_world;
        assert!(m.is_finite());
    }
}
