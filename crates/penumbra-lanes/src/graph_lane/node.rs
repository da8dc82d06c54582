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

//! Render graph node trait, pins and resource keys.

use super::render_graph::NodeInputs;
use crate::error::FrameError;
use penumbra_core::graph::NodeId;
use penumbra_core::math::Vec2;
use penumbra_core::renderer::{CommandEncoder, GraphicsDevice, TextureViewId};
use penumbra_core::scene::SceneViews;
use penumbra_telemetry::RenderStats;
use std::any::Any;
use std::fmt;

/// Identifies the resource flowing through a pin connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(pub u32);

impl ResourceKey {
    /// No resource.
    pub const NONE: Self = Self(0);
    /// Matches any key.
    pub const WILDCARD: Self = Self(1);
    /// The window's default framebuffer.
    pub const WINDOW: Self = Self(2);
    /// A viewport's color target.
    pub const VIEWPORT: Self = Self(3);
    /// The shadow map texture array.
    pub const SHADOW_MAPS: Self = Self(4);
    /// The shadow map depth visualization texture.
    pub const DEPTH_VISUALIZATION: Self = Self(5);
    /// A texture displayed by the GUI.
    pub const TEXTURE_FOR_GUI: Self = Self(6);
    /// A texture rendered for an in-scene render target.
    pub const RENDERTARGET_TEXTURE: Self = Self(7);
    /// Ordering only, no resource.
    pub const DEPENDENCY: Self = Self(8);

    /// A readable name for the well-known keys.
    pub fn name(self) -> &'static str {
        match self {
            Self::NONE => "none",
            Self::WILDCARD => "wildcard",
            Self::WINDOW => "window",
            Self::VIEWPORT => "viewport",
            Self::SHADOW_MAPS => "shadow_maps",
            Self::DEPTH_VISUALIZATION => "depth_visualization",
            Self::TEXTURE_FOR_GUI => "texture_for_gui",
            Self::RENDERTARGET_TEXTURE => "rendertarget_texture",
            Self::DEPENDENCY => "dependency",
            _ => "custom",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// Which side of a connection owns the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Routing {
    /// The producer creates the resource and the consumer reads it.
    #[default]
    ResourceProvidedByProducer,
    /// The consumer supplies the resource the producer renders into.
    ResourceProvidedByConsumer,
}

/// A named input or output slot of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    /// Debug label.
    pub label: String,
    /// Resource flowing through the pin.
    pub key: ResourceKey,
    /// Resource ownership.
    pub routing: Routing,
    /// Connected nodes: producers for an input pin, consumers for an output pin.
    pub connections: Vec<NodeId>,
}

impl Pin {
    /// An unconnected pin.
    pub fn new(label: impl Into<String>, key: ResourceKey, routing: Routing) -> Self {
        Self {
            label: label.into(),
            key,
            routing,
            connections: Vec::new(),
        }
    }

    /// Whether the pin serves `key`.
    pub fn matches(&self, key: ResourceKey) -> bool {
        self.key == key || self.key == ResourceKey::WILDCARD || key == ResourceKey::WILDCARD
    }
}

/// State shared by every node: name, enable flag, pins and layout.
#[derive(Debug, Clone)]
pub struct RenderGraphNodeBase {
    /// Unique name within the graph.
    pub name: String,
    /// Disabled nodes are neither executed nor resolved as producers.
    pub enabled: bool,
    /// Input pins.
    pub inputs: Vec<Pin>,
    /// Output pins.
    pub outputs: Vec<Pin>,
    /// Whether input pins may be registered.
    pub accepts_inputs: bool,
    /// Whether output pins may be registered.
    pub accepts_outputs: bool,
    /// Longest producer chain above the node, set by [`sort`](super::RenderGraph::sort).
    pub depth: usize,
    /// Position computed by [`automatic_layout`](super::RenderGraph::automatic_layout).
    pub position: Vec2,
}

impl RenderGraphNodeBase {
    /// An enabled node accepting both inputs and outputs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
            accepts_inputs: true,
            accepts_outputs: true,
            depth: 0,
            position: Vec2::ZERO,
        }
    }

    /// Declares that the node has no inputs.
    pub fn without_inputs(mut self) -> Self {
        self.accepts_inputs = false;
        self
    }

    /// Declares that the node has no outputs.
    pub fn without_outputs(mut self) -> Self {
        self.accepts_outputs = false;
        self
    }

    /// Adds an input pin. Rejected when the node accepts no inputs.
    pub fn register_input(
        &mut self,
        routing: Routing,
        label: impl Into<String>,
        key: ResourceKey,
    ) -> bool {
        let label = label.into();
        if !self.accepts_inputs {
            log::error!(
                "RenderGraphNode({}): does not accept inputs, rejecting input pin '{}' ({})",
                self.name,
                label,
                key
            );
            return false;
        }
        self.inputs.push(Pin::new(label, key, routing));
        true
    }

    /// Adds an output pin. Rejected when the node accepts no outputs.
    pub fn register_output(
        &mut self,
        routing: Routing,
        label: impl Into<String>,
        key: ResourceKey,
    ) -> bool {
        let label = label.into();
        if !self.accepts_outputs {
            log::error!(
                "RenderGraphNode({}): does not accept outputs, rejecting output pin '{}' ({})",
                self.name,
                label,
                key
            );
            return false;
        }
        self.outputs.push(Pin::new(label, key, routing));
        true
    }

    /// The input pin serving `key`.
    pub fn input(&self, key: ResourceKey) -> Option<&Pin> {
        self.inputs.iter().find(|p| p.matches(key))
    }

    /// The output pin serving `key`.
    pub fn output(&self, key: ResourceKey) -> Option<&Pin> {
        self.outputs.iter().find(|p| p.matches(key))
    }

    pub(crate) fn input_mut(&mut self, key: ResourceKey) -> Option<&mut Pin> {
        self.inputs.iter_mut().find(|p| p.matches(key))
    }

    pub(crate) fn output_mut(&mut self, key: ResourceKey) -> Option<&mut Pin> {
        self.outputs.iter_mut().find(|p| p.matches(key))
    }
}

/// Everything a node needs to record its work for the current frame.
pub struct FrameContext<'a> {
    /// The device resources are written through.
    pub device: &'a dyn GraphicsDevice,
    /// The encoder render passes are recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Scene views nodes resolve their inputs from.
    pub scene_views: &'a SceneViews,
    /// Counters for the current frame.
    pub stats: &'a mut RenderStats,
    /// Host time in seconds, drives animated effects.
    pub time_seconds: f64,
}

/// A unit of work in the render graph.
///
/// Nodes are owned by a [`RenderGraph`](super::RenderGraph) and executed once
/// per frame in dependency order. Producers expose their resources through
/// [`producer_output_texture`](Self::producer_output_texture) or, for richer
/// data, by being downcast through [`as_any`](Self::as_any).
pub trait RenderGraphNode: Any + Send + Sync {
    /// Shared node state.
    fn base(&self) -> &RenderGraphNodeBase;

    /// Shared node state, mutably.
    fn base_mut(&mut self) -> &mut RenderGraphNodeBase;

    /// Unique name within the graph.
    fn name(&self) -> &str {
        &self.base().name
    }

    /// Whether the node runs and resolves as a producer.
    fn is_enabled(&self) -> bool {
        self.base().enabled
    }

    /// Enables or disables the node.
    fn set_enabled(&mut self, enabled: bool) {
        self.base_mut().enabled = enabled;
    }

    /// The texture this node produces for `key`, if any.
    fn producer_output_texture(&self, _key: ResourceKey) -> Option<TextureViewId> {
        None
    }

    /// Records the node's work for the frame.
    ///
    /// # Arguments
    ///
    /// * `context` - Device, encoder and per-frame data.
    /// * `inputs` - Resolves the producers connected to this node's inputs.
    fn execute(
        &mut self,
        context: &mut FrameContext<'_>,
        inputs: &NodeInputs<'_>,
    ) -> Result<(), FrameError>;

    /// Releases the node's GPU resources. Called when the node is discarded.
    fn destroy(&mut self, _device: &dyn GraphicsDevice) {}

    /// Upcast for downcasting to the concrete node type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete node type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn RenderGraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraphNode")
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
