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

//! # Penumbra Core
//!
//! Foundational crate containing the GPU abstraction traits, the scene data model
//! consumed by the renderer, and the shared types every other penumbra crate builds on.

#![warn(missing_docs)]

pub mod config;
pub mod graph;
pub mod item;
pub mod math;
pub mod renderer;
pub mod scene;

pub use config::{ConfigError, GraphicsPreset, RendererConfig};
pub use item::{ItemFilter, ItemFlags};
