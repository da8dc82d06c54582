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

//! Process-wide logging backend lifecycle.
//!
//! Call [`init_logging`] once from the process entry point, before any renderer
//! object is created. Library code never installs a logger on its own; it only
//! emits records through the `log` macros.

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Settings for the logging backend.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used for every module without an override.
    pub default_level: LevelFilter,
    /// Per-module level overrides, applied in order.
    pub module_levels: Vec<(String, LevelFilter)>,
    /// When set, `RUST_LOG` takes precedence over `default_level`.
    pub honor_rust_log: bool,
    /// Route output through the test harness capture.
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: LevelFilter::Info,
            module_levels: Vec::new(),
            honor_rust_log: true,
            is_test: false,
        }
    }
}

impl LoggingConfig {
    /// Adds a per-module override.
    pub fn with_module_level(mut self, module: impl Into<String>, level: LevelFilter) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }
}

/// An error raised by [`init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// The backend was already installed by an earlier call.
    AlreadyInitialized,
    /// Another logger was installed outside of penumbra.
    Backend(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::AlreadyInitialized => write!(f, "Logging is already initialized."),
            LoggingError::Backend(msg) => write!(f, "Failed to install logger: {msg}"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Proof that the logging backend is installed.
///
/// The handle adjusts the global level filter at runtime.
#[derive(Debug)]
pub struct LoggingHandle {
    initial_level: LevelFilter,
}

impl LoggingHandle {
    /// The level the backend was installed with.
    pub fn initial_level(&self) -> LevelFilter {
        self.initial_level
    }

    /// The current global maximum level.
    pub fn max_level(&self) -> LevelFilter {
        log::max_level()
    }

    /// Changes the global maximum level.
    pub fn set_max_level(&self, level: LevelFilter) {
        log::set_max_level(level);
    }
}

/// Installs the `env_logger` backend.
///
/// Only the first call installs anything: later calls return
/// [`LoggingError::AlreadyInitialized`] and leave the backend untouched.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(LoggingError::AlreadyInitialized);
    }

    let mut builder = if config.honor_rust_log {
        Builder::from_env(Env::default().default_filter_or(config.default_level.to_string()))
    } else {
        let mut builder = Builder::new();
        builder.filter_level(config.default_level);
        builder
    };
    for (module, level) in &config.module_levels {
        builder.filter_module(module, *level);
    }
    builder.is_test(config.is_test);

    if let Err(e) = builder.try_init() {
        INITIALIZED.store(false, Ordering::SeqCst);
        return Err(LoggingError::Backend(e.to_string()));
    }

    log::debug!(
        "[Logging] Initialized with default level {}",
        config.default_level
    );
    Ok(LoggingHandle {
        initial_level: config.default_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig {
            default_level: LevelFilter::Debug,
            honor_rust_log: false,
            is_test: true,
            ..Default::default()
        }
        .with_module_level("penumbra_lanes", LevelFilter::Trace);

        let handle = init_logging(&config).unwrap();
        assert_eq!(handle.initial_level(), LevelFilter::Debug);

        let second = init_logging(&config);
        assert!(matches!(second, Err(LoggingError::AlreadyInitialized)));
    }
}
