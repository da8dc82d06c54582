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

//! Service collecting frame reports and summarizing them periodically.

use crate::frame_stats::{FrameReport, RenderStats};
use anyhow::Context;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

/// Keeps a bounded history of frame reports.
#[derive(Debug)]
pub struct TelemetryService {
    history: VecDeque<FrameReport>,
    history_capacity: usize,
    frames_recorded: u64,
    last_update: Instant,
    update_interval: Duration,
}

impl TelemetryService {
    /// Creates a service keeping the last `history_capacity` frames.
    pub fn new(update_interval: Duration, history_capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(history_capacity),
            history_capacity: history_capacity.max(1),
            frames_recorded: 0,
            last_update: Instant::now(),
            update_interval,
        }
    }

    /// Records a completed frame, evicting the oldest one when full.
    pub fn record_frame(&mut self, stats: RenderStats, cpu_time_ms: f64) -> &FrameReport {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(FrameReport {
            frame_index: self.frames_recorded,
            cpu_time_ms,
            stats,
        });
        self.frames_recorded += 1;
        &self.history[self.history.len() - 1]
    }

    /// Should be called once per frame.
    /// Logs a summary if the update interval has passed.
    pub fn tick(&mut self) -> bool {
        if self.last_update.elapsed() < self.update_interval {
            return false;
        }
        if let Some(frame_ms) = self.average_frame_time_ms() {
            let stats = self.average_stats();
            log::debug!(
                "[Telemetry] {:.2} ms/frame, {} passes, {} draws, {} indirect draws, {} shadow passes",
                frame_ms,
                stats.render_passes,
                stats.draw_calls,
                stats.indirect_draws,
                stats.shadow_passes
            );
        } else {
            log::trace!("[Telemetry] No frames recorded yet");
        }
        self.last_update = Instant::now();
        true
    }

    /// The most recent report.
    pub fn latest(&self) -> Option<&FrameReport> {
        self.history.back()
    }

    /// The retained reports, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &FrameReport> {
        self.history.iter()
    }

    /// Total number of frames ever recorded.
    pub fn frames_recorded(&self) -> u64 {
        self.frames_recorded
    }

    /// Mean CPU frame time over the retained history.
    pub fn average_frame_time_ms(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let total: f64 = self.history.iter().map(|r| r.cpu_time_ms).sum();
        Some(total / self.history.len() as f64)
    }

    /// Per-frame mean of every counter over the retained history, rounded down.
    pub fn average_stats(&self) -> RenderStats {
        let count = self.history.len() as u32;
        if count == 0 {
            return RenderStats::default();
        }
        let mut total = RenderStats::default();
        for report in &self.history {
            total.accumulate(&report.stats);
        }
        RenderStats {
            graph_nodes_executed: total.graph_nodes_executed / count,
            graph_nodes_skipped: total.graph_nodes_skipped / count,
            render_passes: total.render_passes / count,
            draw_calls: total.draw_calls / count,
            multi_draw_calls: total.multi_draw_calls / count,
            indirect_draws: total.indirect_draws / count,
            shadow_passes: total.shadow_passes / count,
            composition_passes_rendered: total.composition_passes_rendered / count,
            composition_passes_skipped: total.composition_passes_skipped / count,
            bytes_written: total.bytes_written / u64::from(count),
        }
    }

    /// Writes the retained history to `path` as JSON.
    pub fn export_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let reports: Vec<&FrameReport> = self.history.iter().collect();
        let text = serde_json::to_string_pretty(&reports)
            .context("Failed to serialize frame reports")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write telemetry to {}", path.display()))?;
        Ok(())
    }
}

impl Default for TelemetryService {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(draws: u32) -> RenderStats {
        RenderStats {
            draw_calls: draws,
            ..Default::default()
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut service = TelemetryService::new(Duration::from_secs(1), 2);
        service.record_frame(stats(1), 1.0);
        service.record_frame(stats(2), 2.0);
        service.record_frame(stats(3), 3.0);

        let kept: Vec<u64> = service.history().map(|r| r.frame_index).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(service.frames_recorded(), 3);
        assert_eq!(service.latest().map(|r| r.stats.draw_calls), Some(3));
    }

    #[test]
    fn test_averages() {
        let mut service = TelemetryService::default();
        assert!(service.average_frame_time_ms().is_none());

        service.record_frame(stats(2), 4.0);
        service.record_frame(stats(4), 8.0);
        assert_eq!(service.average_frame_time_ms(), Some(6.0));
        assert_eq!(service.average_stats().draw_calls, 3);
    }

    #[test]
    fn test_tick_respects_interval() {
        let mut service = TelemetryService::new(Duration::ZERO, 4);
        assert!(service.tick());

        let mut slow = TelemetryService::new(Duration::from_secs(3600), 4);
        assert!(!slow.tick());
    }

    #[test]
    fn test_export_json() {
        let mut service = TelemetryService::default();
        service.record_frame(stats(7), 1.5);

        let path = std::env::temp_dir().join(format!(
            "penumbra-telemetry-{}.json",
            std::process::id()
        ));
        service.export_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let reports: Vec<FrameReport> = serde_json::from_str(&text).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].stats.draw_calls, 7);
        let _ = std::fs::remove_file(&path);
    }
}
