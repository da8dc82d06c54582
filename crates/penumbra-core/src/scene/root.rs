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

use super::{Camera, Light, Material, Mesh, SceneViewId, Skin};
use crate::math::Vec4;
use slotmap::SlotMap;
use std::sync::Arc;

/// Identifies a mesh layer within a scene root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl LayerId {
    /// User content.
    pub const CONTENT: LayerId = LayerId(1);
    /// Editor controllers (gizmos and handles).
    pub const CONTROLLER: LayerId = LayerId(2);
    /// Tool meshes.
    pub const TOOL: LayerId = LayerId(3);
    /// Brush previews.
    pub const BRUSH: LayerId = LayerId(4);
    /// Meshes displaying render target textures.
    pub const RENDERTARGET: LayerId = LayerId(5);
}

/// An ordered group of meshes drawn together.
#[derive(Debug, Clone)]
pub struct MeshLayer {
    /// Layer identity.
    pub id: LayerId,
    /// Debug name.
    pub name: String,
    /// Meshes in draw order.
    pub meshes: Vec<Arc<Mesh>>,
}

impl MeshLayer {
    /// Creates an empty layer.
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            meshes: Vec::new(),
        }
    }
}

/// The lights of a scene plus its ambient term.
#[derive(Debug, Clone, Default)]
pub struct LightLayer {
    /// Debug name.
    pub name: String,
    /// Lights in scene order.
    pub lights: Vec<Arc<Light>>,
    /// Ambient light color, alpha unused.
    pub ambient_light: Vec4,
}

/// A complete scene as seen by the renderer.
#[derive(Debug, Clone, Default)]
pub struct SceneRoot {
    /// Debug name.
    pub name: String,
    /// Mesh layers.
    pub mesh_layers: Vec<MeshLayer>,
    /// The light layer.
    pub light_layer: LightLayer,
    /// Material library.
    pub materials: Vec<Arc<Material>>,
    /// Skins of the scene.
    pub skins: Vec<Arc<Skin>>,
}

impl SceneRoot {
    /// Creates a scene with an empty content layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh_layers: vec![MeshLayer::new(LayerId::CONTENT, "content")],
            light_layer: LightLayer {
                name: "lights".to_string(),
                ..Default::default()
            },
            materials: Vec::new(),
            skins: Vec::new(),
        }
    }

    /// Looks up a mesh layer.
    pub fn mesh_layer(&self, id: LayerId) -> Option<&MeshLayer> {
        self.mesh_layers.iter().find(|layer| layer.id == id)
    }

    /// Looks up a mesh layer for modification.
    pub fn mesh_layer_mut(&mut self, id: LayerId) -> Option<&mut MeshLayer> {
        self.mesh_layers.iter_mut().find(|layer| layer.id == id)
    }

    /// The content layer, if present.
    pub fn content_layer(&self) -> Option<&MeshLayer> {
        self.mesh_layer(LayerId::CONTENT)
    }

    /// The light layer.
    pub fn light_layer(&self) -> &LightLayer {
        &self.light_layer
    }

    /// The material library.
    pub fn materials(&self) -> &[Arc<Material>] {
        &self.materials
    }

    /// The skins.
    pub fn skins(&self) -> &[Arc<Skin>] {
        &self.skins
    }
}

/// A viewport's window onto a scene: which root it shows and from where.
#[derive(Debug, Clone, Default)]
pub struct SceneView {
    /// Debug name.
    pub name: String,
    /// The viewed scene, absent while nothing is loaded.
    pub scene_root: Option<Arc<SceneRoot>>,
    /// The viewing camera, absent until one is assigned.
    pub camera: Option<Arc<Camera>>,
}

impl SceneView {
    /// Creates a scene view.
    pub fn new(
        name: impl Into<String>,
        scene_root: Option<Arc<SceneRoot>>,
        camera: Option<Arc<Camera>>,
    ) -> Self {
        Self {
            name: name.into(),
            scene_root,
            camera,
        }
    }

    /// The viewed scene.
    pub fn scene_root(&self) -> Option<&Arc<SceneRoot>> {
        self.scene_root.as_ref()
    }

    /// The viewing camera.
    pub fn camera(&self) -> Option<&Arc<Camera>> {
        self.camera.as_ref()
    }
}

/// Arena of all scene views, keyed by handle.
pub type SceneViews = SlotMap<SceneViewId, SceneView>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_layer_lookup() {
        let mut root = SceneRoot::new("scene");
        root.mesh_layers
            .push(MeshLayer::new(LayerId::BRUSH, "brush"));

        assert!(root.content_layer().is_some());
        assert_eq!(root.mesh_layer(LayerId::BRUSH).map(|l| l.name.as_str()), Some("brush"));
        assert!(root.mesh_layer(LayerId::TOOL).is_none());
    }

    #[test]
    fn test_scene_views_arena() {
        let mut views = SceneViews::with_key();
        let id = views.insert(SceneView::new("main", None, None));
        assert!(views[id].scene_root().is_none());
        views.remove(id);
        assert!(views.get(id).is_none());
    }
}
