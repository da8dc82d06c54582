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

//! # Penumbra Telemetry
//!
//! Logging lifecycle, per-frame render statistics and timing utilities.
//!
//! Logging goes through the `log` facade everywhere in penumbra. The backend is
//! installed once, at process start, with [`logging::init_logging`].

#![warn(missing_docs)]

pub mod frame_stats;
pub mod logging;
pub mod service;
pub mod utils;

pub use frame_stats::{FrameReport, RenderStats};
pub use logging::{init_logging, LoggingConfig, LoggingError, LoggingHandle};
pub use service::TelemetryService;
pub use utils::timer::{ScopedTimer, Stopwatch};
