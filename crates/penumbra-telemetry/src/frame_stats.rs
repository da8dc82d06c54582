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

//! Per-frame render statistics.

use serde::{Deserialize, Serialize};

/// Work performed by the renderer during one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Render graph nodes executed.
    pub graph_nodes_executed: u32,
    /// Render graph nodes skipped (disabled or missing inputs).
    pub graph_nodes_skipped: u32,
    /// Render passes begun.
    pub render_passes: u32,
    /// Non-indirect draw calls.
    pub draw_calls: u32,
    /// Multi-draw-indirect calls.
    pub multi_draw_calls: u32,
    /// Draw records submitted through multi-draw-indirect calls.
    pub indirect_draws: u32,
    /// Shadow map layers rendered.
    pub shadow_passes: u32,
    /// Composition passes that drew something.
    pub composition_passes_rendered: u32,
    /// Composition passes skipped.
    pub composition_passes_skipped: u32,
    /// Bytes written to GPU buffers.
    pub bytes_written: u64,
}

impl RenderStats {
    /// Adds the counters of `other` to `self`.
    pub fn accumulate(&mut self, other: &RenderStats) {
        self.graph_nodes_executed += other.graph_nodes_executed;
        self.graph_nodes_skipped += other.graph_nodes_skipped;
        self.render_passes += other.render_passes;
        self.draw_calls += other.draw_calls;
        self.multi_draw_calls += other.multi_draw_calls;
        self.indirect_draws += other.indirect_draws;
        self.shadow_passes += other.shadow_passes;
        self.composition_passes_rendered += other.composition_passes_rendered;
        self.composition_passes_skipped += other.composition_passes_skipped;
        self.bytes_written += other.bytes_written;
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = RenderStats::default();
    }

    /// Total number of draw submissions of any kind.
    pub fn total_draws(&self) -> u32 {
        self.draw_calls + self.indirect_draws
    }
}

/// Statistics of a completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Sequential frame number.
    pub frame_index: u64,
    /// CPU time spent recording the frame.
    pub cpu_time_ms: f64,
    /// Render work of the frame.
    pub stats: RenderStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_reset() {
        let mut total = RenderStats::default();
        let frame = RenderStats {
            draw_calls: 2,
            indirect_draws: 5,
            bytes_written: 1024,
            ..Default::default()
        };

        total.accumulate(&frame);
        total.accumulate(&frame);
        assert_eq!(total.draw_calls, 4);
        assert_eq!(total.total_draws(), 14);
        assert_eq!(total.bytes_written, 2048);

        total.reset();
        assert_eq!(total, RenderStats::default());
    }
}
