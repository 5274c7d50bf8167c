//! Constant-velocity motion prediction over box edges.

use std::time::Duration;

use crate::detect::Detection;
use crate::geometry::BBox;
use crate::track::Track;

/// Default lookahead horizon.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(200);

/// Extrapolates where a tracked class will be `lookahead` after its latest sample.
///
/// Each edge (x1, y1, x2, y2) moves with its own velocity, so a box that grows or
/// shrinks keeps doing so. No smoothing, no acceleration term, no confidence weighting.
#[derive(Clone, Copy, Debug)]
pub struct MotionPredictor {
    lookahead: Duration,
}

impl MotionPredictor {
    pub fn new(lookahead: Duration) -> Self {
        Self { lookahead }
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    /// Predicted box, or `None` with fewer than two samples or equal timestamps.
    pub fn predict(&self, track: &Track) -> Option<BBox> {
        let (older, newer) = track.last_two()?;
        extrapolate(older, newer, self.lookahead.as_secs_f64())
    }
}

impl Default for MotionPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKAHEAD)
    }
}

fn extrapolate(older: &Detection, newer: &Detection, lookahead: f64) -> Option<BBox> {
    if newer.timestamp <= older.timestamp {
        return None;
    }
    let dt = newer.timestamp.saturating_sub(older.timestamp).as_secs_f64();
    let edge = |b1: f64, b2: f64| b2 + ((b2 - b1) / dt) * lookahead;
    let (b1, b2) = (older.bbox, newer.bbox);
    Some(BBox::new(
        edge(b1.x1, b2.x1),
        edge(b1.y1, b2.y1),
        edge(b1.x2, b2.x2),
        edge(b1.y2, b2.y2),
    ))
}
