use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::clamp;
use crate::error::{EngineError, Result};

/// Shortest clip the trim handles can produce, in seconds.
pub const DEFAULT_MIN_GAP_SECONDS: f64 = 0.1;

/// Which trim handle an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimEdge {
    In,
    Out,
}

/// In/out points selected on one clip of duration `duration`.
///
/// Every mutation keeps `0 <= in_time < out_time <= duration`; out-of-range
/// edits are clamped and `NaN` edits are ignored.
///
/// # Example
/// ```
/// use trim_engine::trim::TrimRange;
///
/// let mut range = TrimRange::new(10.0, 0.1).expect("valid duration");
/// range.set_out_time(4.0);
/// range.set_in_time(9.0);
/// assert_eq!(range.in_time(), 3.9);
/// assert!(range.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrimRange {
    in_time: f64,
    out_time: f64,
    duration: f64,
    min_gap: f64,
}

impl TrimRange {
    /// Creates a range spanning the whole clip.
    ///
    /// `min_gap` is capped at `duration` so clips shorter than the gap are
    /// still representable. A non-positive gap falls back to
    /// [`DEFAULT_MIN_GAP_SECONDS`].
    pub fn new(duration: f64, min_gap: f64) -> Result<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::InvalidAsset {
                path: PathBuf::new(),
                duration_seconds: duration,
            });
        }
        let min_gap = if min_gap.is_finite() && min_gap > 0.0 {
            min_gap
        } else {
            DEFAULT_MIN_GAP_SECONDS
        };

        Ok(Self {
            in_time: 0.0,
            out_time: duration,
            duration,
            min_gap: min_gap.min(duration),
        })
    }

    pub fn in_time(&self) -> f64 {
        self.in_time
    }

    pub fn out_time(&self) -> f64 {
        self.out_time
    }

    /// Duration of the clip the range is bound to.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Effective minimum distance between the handles.
    pub fn min_gap(&self) -> f64 {
        self.min_gap
    }

    /// Length of the selected window.
    pub fn trim_duration(&self) -> f64 {
        self.out_time - self.in_time
    }

    /// Moves the in point, clamped to `[0, out_time - min_gap]`.
    pub fn set_in_time(&mut self, value: f64) -> f64 {
        if value.is_nan() {
            debug!("ignored NaN in-point edit");
            return self.in_time;
        }
        let candidate = clamp(value, 0.0, self.out_time - self.min_gap);
        if candidate < self.out_time {
            self.in_time = candidate;
        }
        self.in_time
    }

    /// Moves the out point, clamped to `[in_time + min_gap, duration]`.
    pub fn set_out_time(&mut self, value: f64) -> f64 {
        if value.is_nan() {
            debug!("ignored NaN out-point edit");
            return self.out_time;
        }
        let candidate = clamp(value, self.in_time + self.min_gap, self.duration);
        // Rounding can push `in_time + min_gap` past the clip end.
        if candidate > self.in_time && candidate <= self.duration {
            self.out_time = candidate;
        }
        self.out_time
    }

    /// Moves one handle and returns its stored value.
    pub fn set_edge(&mut self, edge: TrimEdge, value: f64) -> f64 {
        match edge {
            TrimEdge::In => self.set_in_time(value),
            TrimEdge::Out => self.set_out_time(value),
        }
    }

    /// Returns whether the range spans the whole clip.
    pub fn is_full(&self) -> bool {
        self.in_time == 0.0 && self.out_time == self.duration
    }

    /// Returns whether `time` falls inside `[in_time, out_time)`.
    pub fn contains(&self, time: f64) -> bool {
        self.in_time <= time && time < self.out_time
    }

    pub fn is_valid(&self) -> bool {
        0.0 <= self.in_time && self.in_time < self.out_time && self.out_time <= self.duration
    }
}
