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

//! The render graph: node arena, pin connections and execution.

use super::node::{FrameContext, Pin, RenderGraphNode, ResourceKey, Routing};
use crate::error::RenderGraphError;
use ahash::AHashMap;
use penumbra_core::graph::{topological_sort, NodeId};
use penumbra_core::math::Vec2;
use penumbra_core::renderer::TextureViewId;
use slotmap::SlotMap;
use std::fmt;

/// Arena slot; empty while the node is being executed.
type NodeSlot = Option<Box<dyn RenderGraphNode>>;

/// Owns the nodes of a frame and runs them in dependency order.
///
/// Edges are stored on the pins of both endpoints: a consumer's input pin
/// lists its producers and a producer's output pin lists its consumers.
#[derive(Default)]
pub struct RenderGraph {
    nodes: SlotMap<NodeId, NodeSlot>,
    execution_order: Vec<NodeId>,
}

impl fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraph")
            .field("node_count", &self.nodes.len())
            .field("execution_order", &self.execution_order)
            .finish()
    }
}

impl RenderGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`RenderGraphError::DuplicateNode`] if a node with the same name
    /// is already registered. The graph is left unchanged.
    pub fn register_node(
        &mut self,
        mut node: Box<dyn RenderGraphNode>,
    ) -> Result<NodeId, RenderGraphError> {
        let name = node.name().to_owned();
        if self.find_node(&name).is_some() {
            log::error!("RenderGraph: node '{}' is already registered", name);
            return Err(RenderGraphError::DuplicateNode(name));
        }
        let base = node.base_mut();
        for pin in base.inputs.iter_mut().chain(base.outputs.iter_mut()) {
            pin.connections.clear();
        }
        let id = self.nodes.insert(Some(node));
        log::debug!("RenderGraph: registered node '{}'", name);
        Ok(id)
    }

    /// Removes a node and every connection to it.
    pub fn unregister_node(&mut self, id: NodeId) -> Option<Box<dyn RenderGraphNode>> {
        let node = self.nodes.remove(id)??;
        for other in self.nodes.values_mut().flatten() {
            let base = other.base_mut();
            for pin in base.inputs.iter_mut().chain(base.outputs.iter_mut()) {
                pin.connections.retain(|c| *c != id);
            }
        }
        self.execution_order.retain(|n| *n != id);
        log::debug!("RenderGraph: unregistered node '{}'", node.name());
        Some(node)
    }

    /// Connects `producer`'s output pin to `consumer`'s input pin for `key`.
    ///
    /// A producer-routed input holds a single producer: connecting a new one
    /// replaces the previous connection.
    ///
    /// # Returns
    ///
    /// `false` if either pin is missing or the edge already exists.
    pub fn connect(&mut self, key: ResourceKey, producer: NodeId, consumer: NodeId) -> bool {
        if producer == consumer {
            log::error!("RenderGraph: cannot connect a node to itself ({})", key);
            return false;
        }
        let (Some(producer_node), Some(consumer_node)) = (self.node(producer), self.node(consumer))
        else {
            log::error!("RenderGraph: connect({}) with an unknown node", key);
            return false;
        };
        if producer_node.base().output(key).is_none() {
            log::error!(
                "RenderGraph: producer '{}' has no output pin for {}",
                producer_node.name(),
                key
            );
            return false;
        }
        let Some(input) = consumer_node.base().input(key) else {
            log::error!(
                "RenderGraph: consumer '{}' has no input pin for {}",
                consumer_node.name(),
                key
            );
            return false;
        };
        if input.connections.contains(&producer) {
            log::error!(
                "RenderGraph: '{}' -> '{}' is already connected for {}",
                producer_node.name(),
                consumer_node.name(),
                key
            );
            return false;
        }

        let replaced = if input.routing == Routing::ResourceProvidedByProducer {
            input.connections.clone()
        } else {
            Vec::new()
        };
        let producer_name = producer_node.name().to_owned();
        let consumer_name = consumer_node.name().to_owned();
        for old_producer in replaced {
            log::warn!(
                "RenderGraph: '{}' input {} was connected to '{}', replacing it with '{}'",
                consumer_name,
                key,
                self.node_name(old_producer),
                producer_name
            );
            self.remove_edge(key, old_producer, consumer);
        }

        if let Some(pin) = self.node_mut(producer).and_then(|n| n.base_mut().output_mut(key)) {
            pin.connections.push(consumer);
        }
        if let Some(pin) = self.node_mut(consumer).and_then(|n| n.base_mut().input_mut(key)) {
            pin.connections.push(producer);
        }
        true
    }

    /// Removes exactly the `producer -> consumer` edge for `key`.
    ///
    /// # Returns
    ///
    /// `false` if the edge did not exist.
    pub fn disconnect(&mut self, key: ResourceKey, producer: NodeId, consumer: NodeId) -> bool {
        let connected = self
            .node(consumer)
            .and_then(|n| n.base().input(key))
            .is_some_and(|pin| pin.connections.contains(&producer));
        if !connected {
            log::error!(
                "RenderGraph: disconnect({}) of '{}' -> '{}': no such connection",
                key,
                self.node_name(producer),
                self.node_name(consumer)
            );
            return false;
        }
        self.remove_edge(key, producer, consumer);
        true
    }

    fn remove_edge(&mut self, key: ResourceKey, producer: NodeId, consumer: NodeId) {
        if let Some(pin) = self.node_mut(producer).and_then(|n| n.base_mut().output_mut(key)) {
            pin.connections.retain(|c| *c != consumer);
        }
        if let Some(pin) = self.node_mut(consumer).and_then(|n| n.base_mut().input_mut(key)) {
            pin.connections.retain(|c| *c != producer);
        }
    }

    /// Computes the execution order over enabled nodes and updates node depths.
    ///
    /// # Errors
    ///
    /// Returns [`RenderGraphError::Cycle`] when the enabled nodes form a cycle.
    pub fn sort(&mut self) -> Result<Vec<NodeId>, RenderGraphError> {
        let enabled: Vec<NodeId> = self
            .nodes
            .iter()
            .filter_map(|(id, slot)| slot.as_deref().filter(|n| n.is_enabled()).map(|_| id))
            .collect();
        let edges = self.edges();

        let order = match topological_sort(enabled, edges.iter().copied()) {
            Ok(order) => order,
            Err(cycle) => {
                let names: Vec<String> = cycle
                    .unresolved
                    .iter()
                    .map(|id| self.node_name(*id).to_owned())
                    .collect();
                log::error!(
                    "RenderGraph: cycle detected through [{}]\n{}",
                    names.join(", "),
                    self.dump()
                );
                return Err(RenderGraphError::Cycle { nodes: names });
            }
        };

        let mut depths: AHashMap<NodeId, usize> = AHashMap::new();
        for &id in &order {
            let depth = edges
                .iter()
                .filter(|(_, consumer)| *consumer == id)
                .filter_map(|(producer, _)| depths.get(producer))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depths.insert(id, depth);
        }
        for (id, depth) in depths {
            if let Some(node) = self.node_mut(id) {
                node.base_mut().depth = depth;
            }
        }
        Ok(order)
    }

    /// Places enabled nodes on a grid: one column per depth, one row per node.
    pub fn automatic_layout(&mut self, spacing: Vec2) {
        let order = match self.sort() {
            Ok(order) => order,
            Err(_) => return,
        };
        let mut rows: AHashMap<usize, usize> = AHashMap::new();
        for id in order {
            if let Some(node) = self.node_mut(id) {
                let base = node.base_mut();
                let row = rows.entry(base.depth).or_insert(0);
                base.position = Vec2::new(base.depth as f32 * spacing.x, *row as f32 * spacing.y);
                *row += 1;
            }
        }
    }

    /// Executes every enabled node once, producers before consumers.
    ///
    /// A node that fails is logged and the remaining nodes still run.
    ///
    /// # Errors
    ///
    /// Returns [`RenderGraphError::Cycle`] without running any node.
    pub fn execute(&mut self, context: &mut FrameContext<'_>) -> Result<(), RenderGraphError> {
        let order = self.sort()?;
        self.execution_order = order.clone();

        for id in order {
            let Some(mut node) = self.nodes.get_mut(id).and_then(Option::take) else {
                continue;
            };
            let result = {
                let inputs = NodeInputs {
                    nodes: &self.nodes,
                    consumer: node.name().to_owned(),
                    inputs: node.base().inputs.clone(),
                };
                node.execute(context, &inputs)
            };
            context.stats.graph_nodes_executed += 1;
            if let Err(e) = result {
                log::error!("RenderGraph: node '{}' failed: {}", node.name(), e);
            }
            if let Some(slot) = self.nodes.get_mut(id) {
                *slot = Some(node);
            }
        }
        Ok(())
    }

    /// The node behind `id`.
    pub fn node(&self, id: NodeId) -> Option<&dyn RenderGraphNode> {
        self.nodes.get(id)?.as_deref()
    }

    /// The node behind `id`, mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut dyn RenderGraphNode> {
        match self.nodes.get_mut(id) {
            Some(Some(node)) => Some(node.as_mut()),
            _ => None,
        }
    }

    /// The node behind `id` as its concrete type.
    pub fn node_as<T: RenderGraphNode>(&self, id: NodeId) -> Option<&T> {
        self.node(id)?.as_any().downcast_ref::<T>()
    }

    /// The node behind `id` as its concrete type, mutably.
    pub fn node_as_mut<T: RenderGraphNode>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// The node named `name`.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, slot)| slot.as_deref().is_some_and(|n| n.name() == name))
            .map(|(id, _)| id)
    }

    /// Every registered node.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &dyn RenderGraphNode)> {
        self.nodes
            .iter()
            .filter_map(|(id, slot)| slot.as_deref().map(|n| (id, n)))
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The single producer connected to `consumer`'s input for `key`.
    pub fn producer_for(&self, consumer: NodeId, key: ResourceKey) -> Option<NodeId> {
        let pin = self.node(consumer)?.base().input(key)?;
        match pin.connections.as_slice() {
            [producer] => Some(*producer),
            _ => None,
        }
    }

    /// The consumers connected to `producer`'s output for `key`.
    pub fn consumers_for(&self, producer: NodeId, key: ResourceKey) -> Vec<NodeId> {
        self.node(producer)
            .and_then(|n| n.base().output(key))
            .map(|pin| pin.connections.clone())
            .unwrap_or_default()
    }

    /// Order of the last [`execute`](Self::execute).
    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .iter()
            .filter_map(|(id, slot)| slot.as_deref().map(|n| (id, n)))
            .flat_map(|(consumer, node)| {
                node.base()
                    .inputs
                    .iter()
                    .flat_map(|pin| pin.connections.iter())
                    .map(move |producer| (*producer, consumer))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn node_name(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name()).unwrap_or("<unknown>")
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        for (_, node) in self.nodes() {
            out.push_str(&format!(
                "  '{}'{}\n",
                node.name(),
                if node.is_enabled() { "" } else { " (disabled)" }
            ));
            for pin in &node.base().inputs {
                let producers: Vec<&str> =
                    pin.connections.iter().map(|id| self.node_name(*id)).collect();
                out.push_str(&format!(
                    "    in  '{}' {} <- [{}]\n",
                    pin.label,
                    pin.key,
                    producers.join(", ")
                ));
            }
            for pin in &node.base().outputs {
                let consumers: Vec<&str> =
                    pin.connections.iter().map(|id| self.node_name(*id)).collect();
                out.push_str(&format!(
                    "    out '{}' {} -> [{}]\n",
                    pin.label,
                    pin.key,
                    consumers.join(", ")
                ));
            }
        }
        out
    }
}

/// Resolves the producers connected to the inputs of the executing node.
pub struct NodeInputs<'a> {
    nodes: &'a SlotMap<NodeId, NodeSlot>,
    consumer: String,
    inputs: Vec<Pin>,
}

impl<'a> NodeInputs<'a> {
    /// The enabled producer connected to the input for `key`.
    ///
    /// Resolves only when exactly one producer is connected and it is enabled.
    pub fn producer_node(&self, key: ResourceKey) -> Option<&'a dyn RenderGraphNode> {
        let Some(pin) = self.inputs.iter().find(|p| p.matches(key)) else {
            log::trace!("NodeInputs({}): no input pin for {}", self.consumer, key);
            return None;
        };
        let [producer] = pin.connections.as_slice() else {
            log::trace!(
                "NodeInputs({}): input {} has {} producers, expected one",
                self.consumer,
                key,
                pin.connections.len()
            );
            return None;
        };
        match self.nodes.get(*producer).and_then(|slot| slot.as_deref()) {
            Some(node) if node.is_enabled() => Some(node),
            Some(node) => {
                log::trace!(
                    "NodeInputs({}): producer '{}' for {} is disabled",
                    self.consumer,
                    node.name(),
                    key
                );
                None
            }
            None => {
                log::trace!("NodeInputs({}): producer for {} is gone", self.consumer, key);
                None
            }
        }
    }

    /// The texture the producer for `key` exposes.
    pub fn input_texture(&self, key: ResourceKey) -> Option<TextureViewId> {
        self.producer_node(key)?.producer_output_texture(key)
    }

    /// The producer for `key` as its concrete type.
    pub fn input_node_as<T: RenderGraphNode>(&self, key: ResourceKey) -> Option<&'a T> {
        self.producer_node(key)?.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::graph_lane::RenderGraphNodeBase;
    use crate::test_support::run_frame;
    use penumbra_core::renderer::headless::HeadlessDevice;
    use penumbra_core::scene::SceneViews;
    use std::any::Any;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct TestNode {
        base: RenderGraphNodeBase,
        log: Log,
    }

    impl TestNode {
        fn boxed(name: &str, inputs: &[ResourceKey], outputs: &[ResourceKey], log: &Log) -> Box<Self> {
            let mut base = RenderGraphNodeBase::new(name);
            for key in inputs {
                base.register_input(Routing::ResourceProvidedByProducer, "in", *key);
            }
            for key in outputs {
                base.register_output(Routing::ResourceProvidedByProducer, "out", *key);
            }
            Box::new(Self {
                base,
                log: log.clone(),
            })
        }
    }

    impl RenderGraphNode for TestNode {
        fn base(&self) -> &RenderGraphNodeBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut RenderGraphNodeBase {
            &mut self.base
        }

        fn execute(
            &mut self,
            _context: &mut FrameContext<'_>,
            inputs: &NodeInputs<'_>,
        ) -> Result<(), FrameError> {
            let producer = inputs
                .producer_node(ResourceKey::SHADOW_MAPS)
                .map(|p| p.name().to_owned())
                .unwrap_or_else(|| "-".to_owned());
            self.log
                .lock()
                .unwrap()
                .push(format!("{}<{}", self.base.name, producer));
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    const KEY: ResourceKey = ResourceKey::SHADOW_MAPS;

    fn execute(graph: &mut RenderGraph) -> Result<(), RenderGraphError> {
        let device = HeadlessDevice::new();
        let scene_views = SceneViews::with_key();
        run_frame(&device, &scene_views, |context| graph.execute(context)).0
    }

    #[test]
    fn test_producers_run_before_consumers() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        assert!(graph.connect(KEY, producer, consumer));

        execute(&mut graph).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["producer<-", "consumer<producer"]);
        assert_eq!(graph.execution_order(), &[producer, consumer]);
        assert_eq!(graph.node(consumer).unwrap().base().depth, 1);
    }

    #[test]
    fn test_cycle_runs_nothing() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let a = graph.register_node(TestNode::boxed("a", &[KEY], &[KEY], &log)).unwrap();
        let b = graph.register_node(TestNode::boxed("b", &[KEY], &[KEY], &log)).unwrap();
        assert!(graph.connect(KEY, a, b));
        assert!(graph.connect(KEY, b, a));

        let result = execute(&mut graph);

        assert!(matches!(result, Err(RenderGraphError::Cycle { ref nodes }) if nodes.len() == 2));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_node_breaks_cycle() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let a = graph.register_node(TestNode::boxed("a", &[KEY], &[KEY], &log)).unwrap();
        let b = graph.register_node(TestNode::boxed("b", &[KEY], &[KEY], &log)).unwrap();
        graph.connect(KEY, a, b);
        graph.connect(KEY, b, a);
        graph.node_mut(b).unwrap().set_enabled(false);

        execute(&mut graph).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a<-"]);
    }

    #[test]
    fn test_connect_is_last_write_wins() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let first = graph.register_node(TestNode::boxed("first", &[], &[KEY], &log)).unwrap();
        let second = graph.register_node(TestNode::boxed("second", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();

        assert!(graph.connect(KEY, first, consumer));
        assert!(graph.connect(KEY, second, consumer));

        assert_eq!(graph.producer_for(consumer, KEY), Some(second));
        assert!(graph.consumers_for(first, KEY).is_empty());
        assert_eq!(graph.consumers_for(second, KEY), vec![consumer]);
    }

    #[test]
    fn test_connect_rejects_duplicates_and_missing_pins() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();

        assert!(graph.connect(KEY, producer, consumer));
        assert!(!graph.connect(KEY, producer, consumer));
        assert!(!graph.connect(ResourceKey::VIEWPORT, producer, consumer));
        assert!(!graph.connect(KEY, producer, producer));
    }

    #[test]
    fn test_disconnect_missing_edge_is_noop() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();

        assert!(!graph.disconnect(KEY, producer, consumer));
        assert!(graph.connect(KEY, producer, consumer));
        assert!(graph.disconnect(KEY, producer, consumer));
        assert_eq!(graph.producer_for(consumer, KEY), None);
        assert!(!graph.disconnect(KEY, producer, consumer));
    }

    #[test]
    fn test_disabled_producer_resolves_as_absent() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();
        graph.connect(KEY, producer, consumer);
        graph.node_mut(producer).unwrap().set_enabled(false);

        execute(&mut graph).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["consumer<-"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        graph.register_node(TestNode::boxed("node", &[], &[], &log)).unwrap();
        let result = graph.register_node(TestNode::boxed("node", &[], &[], &log));
        assert_eq!(result.unwrap_err(), RenderGraphError::DuplicateNode("node".into()));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_unregister_clears_peer_pins() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();
        graph.connect(KEY, producer, consumer);

        let removed = graph.unregister_node(producer).unwrap();
        assert_eq!(removed.name(), "producer");
        assert!(graph.node(consumer).unwrap().base().input(KEY).unwrap().connections.is_empty());
        assert!(graph.node_as::<TestNode>(consumer).is_some());
        assert!(graph.find_node("producer").is_none());
    }

    #[test]
    fn test_automatic_layout_uses_depth() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.register_node(TestNode::boxed("producer", &[], &[KEY], &log)).unwrap();
        let consumer = graph.register_node(TestNode::boxed("consumer", &[KEY], &[], &log)).unwrap();
        graph.connect(KEY, producer, consumer);

        graph.automatic_layout(Vec2::new(100.0, 50.0));
        assert_eq!(graph.node(producer).unwrap().base().position, Vec2::ZERO);
        assert_eq!(graph.node(consumer).unwrap().base().position, Vec2::new(100.0, 0.0));
    }
}
