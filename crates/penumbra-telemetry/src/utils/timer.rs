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

//! Provides a stopwatch and an RAII scope timer. (RAII = Resource Acquisition Is Initialization)

use std::time::Instant;

/// Measures elapsed wall time between `start` and `stop`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stopwatch {
    started: Option<Instant>,
}

impl Stopwatch {
    /// Creates a stopped stopwatch.
    pub fn new() -> Self {
        Self { started: None }
    }

    /// Creates a running stopwatch.
    pub fn started() -> Self {
        Self {
            started: Some(Instant::now()),
        }
    }

    /// Starts (or restarts) the stopwatch.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Whether the stopwatch is running.
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Milliseconds since `start`, or `None` if never started.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.started
            .map(|start| start.elapsed().as_secs_f64() * 1000.0)
    }

    /// Stops the stopwatch and returns the elapsed milliseconds.
    pub fn stop(&mut self) -> Option<f64> {
        let elapsed = self.elapsed_ms();
        self.started = None;
        elapsed
    }
}

/// Times a scope and hands the elapsed milliseconds to a sink when dropped.
///
/// The measurement is recorded even on early returns.
pub struct ScopedTimer<F: FnOnce(f64)> {
    stopwatch: Stopwatch,
    sink: Option<F>,
}

impl<F: FnOnce(f64)> ScopedTimer<F> {
    /// Starts a timer reporting to `sink`.
    pub fn new(sink: F) -> Self {
        Self {
            stopwatch: Stopwatch::started(),
            sink: Some(sink),
        }
    }
}

impl<F: FnOnce(f64)> Drop for ScopedTimer<F> {
    fn drop(&mut self) {
        if let (Some(sink), Some(elapsed_ms)) = (self.sink.take(), self.stopwatch.elapsed_ms()) {
            sink(elapsed_ms);
        }
    }
}
