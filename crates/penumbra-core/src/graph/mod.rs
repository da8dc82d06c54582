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

//! Generic graph utilities and the handle type used for render graph nodes.

mod topological_sort;

pub use topological_sort::{topological_sort, CycleError};

slotmap::new_key_type! {
    /// A stable handle to a node registered in a render graph.
    ///
    /// Handles are plain arena keys: holding one never keeps the node alive, and a
    /// handle to an unregistered node simply fails to resolve.
    pub struct NodeId;
}
