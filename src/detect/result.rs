use crate::frame::Timestamp;
use crate::geometry::BBox;

/// One object as reported by a detector backend, before confidence filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub bbox: BBox,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(class_id: u32, bbox: BBox, confidence: f32) -> Self {
        Self {
            class_id,
            bbox,
            confidence,
        }
    }

    /// Stamp with the capture time of the frame it was found in.
    pub fn at(self, timestamp: Timestamp) -> Detection {
        Detection {
            class_id: self.class_id,
            bbox: self.bbox,
            confidence: self.confidence,
            timestamp,
        }
    }
}

/// Canonical detection: passed the confidence filter, stamped with capture time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub bbox: BBox,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub timestamp: Timestamp,
}

impl Detection {
    pub fn new(class_id: u32, bbox: BBox, confidence: f32, timestamp: Timestamp) -> Self {
        Self {
            class_id,
            bbox,
            confidence,
            timestamp,
        }
    }
}
