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

//! The scene data model consumed by the renderer.
//!
//! Everything here is plain data, shared through `Arc` and read-only from the
//! renderer's point of view. The editor owns and mutates the scene; the renderer
//! only walks it once per frame.

mod camera;
mod light;
mod material;
mod mesh;
mod root;

pub use camera::{Camera, Projection};
pub use light::{Light, LightType};
pub use material::{Material, MaterialTexture};
pub use mesh::{
    IndexRange, Joint, Mesh, MeshMemory, Primitive, PrimitiveGeometry, PrimitiveMode, Skin,
};
pub use root::{LayerId, LightLayer, MeshLayer, SceneRoot, SceneView, SceneViews};

macro_rules! scene_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);
    };
}

scene_id!(
    /// Identifies a mesh for the lifetime of the scene.
    MeshId
);
scene_id!(
    /// Identifies a material for the lifetime of the scene.
    MaterialId
);
scene_id!(
    /// Identifies a light for the lifetime of the scene.
    LightId
);
scene_id!(
    /// Identifies a skin for the lifetime of the scene.
    SkinId
);

slotmap::new_key_type! {
    /// A handle to a scene view stored in a [`SceneViews`] arena.
    pub struct SceneViewId;
}
