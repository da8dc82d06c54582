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

//! Math helpers shared by the buffer packers and projection code.
//!
//! Vector and matrix types come from `glam`; this module only adds the few
//! operations the renderer needs on top of it.

pub use glam::{Mat3, Mat4, Quat, UVec4, Vec2, Vec3, Vec4};

/// Computes the cofactor matrix of `m`.
///
/// The cofactor is used to transform normals: unlike `inverse().transpose()` it
/// stays finite for singular matrices and keeps the sign of the determinant,
/// so mirrored transforms produce correctly flipped normals.
pub fn compute_cofactor(m: &Mat4) -> Mat4 {
    let a = m.to_cols_array_2d();
    let mut out = [[0.0f32; 4]; 4];

    for (col, out_col) in out.iter_mut().enumerate() {
        for (row, value) in out_col.iter_mut().enumerate() {
            let mut minor = [[0.0f32; 3]; 3];
            let mut mc = 0;
            for (c, a_col) in a.iter().enumerate() {
                if c == col {
                    continue;
                }
                let mut mr = 0;
                for (r, a_value) in a_col.iter().enumerate() {
                    if r == row {
                        continue;
                    }
                    minor[mc][mr] = *a_value;
                    mr += 1;
                }
                mc += 1;
            }
            let det = Mat3::from_cols_array_2d(&minor).determinant();
            let sign = if (row + col) % 2 == 0 { 1.0 } else { -1.0 };
            *value = sign * det;
        }
    }

    Mat4::from_cols_array_2d(&out)
}

/// Returns the smallest power of two greater than or equal to `value`.
///
/// Zero maps to one, matching the allocation rules of the picking id ranges.
pub fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

/// Packs the low 24 bits of `value` into an RGB color with 8 bits per channel.
pub fn vec3_from_uint(value: u32) -> Vec3 {
    let r = (value & 0xff) as f32 / 255.0;
    let g = ((value >> 8) & 0xff) as f32 / 255.0;
    let b = ((value >> 16) & 0xff) as f32 / 255.0;
    Vec3::new(r, g, b)
}

/// Linear interpolation between `x` and `y`.
pub fn mix(x: f32, y: f32, a: f32) -> f32 {
    x * (1.0 - a) + y * a
}

/// A triangle wave with period `p`, ranging over `[-1, 1]`.
///
/// The wave is `-1` at `t = 0`, `1` at `t = p / 2` and back to `-1` at `t = p`.
pub fn triangle_wave(t: f32, p: f32) -> f32 {
    2.0 * (2.0 * (t / p - (t / p + 0.5).floor())).abs() - 1.0
}
