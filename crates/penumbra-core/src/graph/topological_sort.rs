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

//! A generic implementation of Kahn's algorithm for topological sorting.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

/// An error indicating that a cycle was detected in the graph.
///
/// Carries the nodes that could not be ordered: every member of a cycle, plus
/// every node that transitively depends on one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// The nodes left with unresolved dependencies.
    pub unresolved: Vec<T>,
}

impl<T: fmt::Debug> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle detected, {} node(s) could not be ordered: {:?}",
            self.unresolved.len(),
            self.unresolved
        )
    }
}

impl<T: fmt::Debug> std::error::Error for CycleError<T> {}

/// Performs a topological sort on a generic directed graph.
///
/// The graph is defined by a collection of nodes and a set of directed edges
/// representing dependencies (from producer to consumer). Edges that mention a
/// node missing from `nodes` are ignored, which lets callers pass the full edge
/// set of a graph while sorting only a subset of its nodes.
///
/// Nodes without dependencies are emitted in the order they appear in `nodes`,
/// so the result is deterministic for a given input order.
///
/// # Type Parameters
///
/// * `T`: The type of the nodes in the graph. It must be hashable and equatable
///   to be used in internal maps.
///
/// # Arguments
///
/// * `nodes`: An iterator over the unique nodes in the graph.
/// * `edges`: An iterator over the directed edges, represented as `(producer, consumer)` tuples.
///
/// # Returns
///
/// * `Ok(Vec<T>)`: A vector of nodes in a valid topological order.
/// * `Err(CycleError)`: If the graph contains one or more cycles.
pub fn topological_sort<T>(
    nodes: impl IntoIterator<Item = T>,
    edges: impl IntoIterator<Item = (T, T)>,
) -> Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash,
{
    let node_list: Vec<T> = nodes.into_iter().collect();
    if node_list.is_empty() {
        return Ok(Vec::new());
    }

    let mut adjacency_list: HashMap<T, Vec<T>> = HashMap::new();
    let mut in_degree: HashMap<T, usize> = node_list.iter().map(|id| (*id, 0)).collect();

    // 1. Build adjacency list and in-degree counts from edges between known nodes.
    for (producer, consumer) in edges {
        if !in_degree.contains_key(&producer) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&consumer) {
            *degree += 1;
            adjacency_list.entry(producer).or_default().push(consumer);
        }
    }

    // 2. Initialize queue with all root nodes (in-degree of 0).
    let mut queue: VecDeque<T> = node_list
        .iter()
        .copied()
        .filter(|node| in_degree.get(node).copied().unwrap_or(0) == 0)
        .collect();

    // 3. Process the queue.
    let mut sorted_list = Vec::with_capacity(node_list.len());
    while let Some(producer) = queue.pop_front() {
        sorted_list.push(producer);
        if let Some(consumers) = adjacency_list.get(&producer) {
            for &consumer in consumers {
                if let Some(degree) = in_degree.get_mut(&consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(consumer);
                    }
                }
            }
        }
    }

    // 4. Check for cycles.
    if sorted_list.len() != node_list.len() {
        let unresolved = node_list
            .into_iter()
            .filter(|node| in_degree.get(node).copied().unwrap_or(0) > 0)
            .collect();
        Err(CycleError { unresolved })
    } else {
        Ok(sorted_list)
    }
}
