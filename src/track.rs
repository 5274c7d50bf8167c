//! Per-class, time-windowed detection history.
//!
//! One `TrackStore` belongs to one stream. It is the only state the pipeline carries
//! from frame to frame, and it never holds a detection older than its window.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::detect::Detection;
use crate::frame::Timestamp;

/// Default history window.
pub const DEFAULT_TRACK_WINDOW: Duration = Duration::from_millis(500);

/// Recent detections of one class, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Track {
    samples: VecDeque<Detection>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Detection> {
        self.samples.back()
    }

    /// The two most recent samples, older first.
    pub fn last_two(&self) -> Option<(&Detection, &Detection)> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        Some((&self.samples[n - 2], &self.samples[n - 1]))
    }

    fn push(&mut self, detection: Detection) {
        self.samples.push_back(detection);
    }

    /// Drop samples with `now - t > window`. Order of survivors is unchanged.
    fn prune(&mut self, now: Timestamp, window: Duration) {
        self.samples
            .retain(|sample| now.saturating_sub(sample.timestamp) <= window);
    }
}

impl FromIterator<Detection> for Track {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Windowed history for every class seen by one stream.
#[derive(Clone, Debug)]
pub struct TrackStore {
    window: Duration,
    tracks: BTreeMap<u32, Track>,
}

impl TrackStore {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            tracks: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append `detection` to its class track, then prune that track at `now`.
    ///
    /// Tracks are created lazily. A track left empty by pruning is removed.
    pub fn update(&mut self, class_id: u32, detection: Detection, now: Timestamp) {
        let track = self.tracks.entry(class_id).or_default();
        track.push(detection);
        track.prune(now, self.window);
        if track.is_empty() {
            self.tracks.remove(&class_id);
        }
    }

    /// Prune every track at `now` and drop the empty ones.
    pub fn prune(&mut self, now: Timestamp) {
        let window = self.window;
        self.tracks.retain(|class_id, track| {
            track.prune(now, window);
            if track.is_empty() {
                log::trace!("track for class {} expired", class_id);
            }
            !track.is_empty()
        });
    }

    pub fn get(&self, class_id: u32) -> Option<&Track> {
        self.tracks.get(&class_id)
    }

    /// Tracks in ascending class order.
    pub fn tracks(&self) -> impl Iterator<Item = (u32, &Track)> {
        self.tracks.iter().map(|(class_id, track)| (*class_id, track))
    }

    pub fn classes(&self) -> Vec<u32> {
        self.tracks.keys().copied().collect()
    }

    /// Number of classes currently tracked.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_WINDOW)
    }
}
