#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::CHANNELS;
use crate::geometry::BBox;

/// Box/score layout of a YOLOv8 detection head: `[1, 4 + classes, anchors]`.
const CXCYWH: usize = 4;
const NMS_IOU: f64 = 0.45;
/// Candidates below this score are never worth decoding.
const DECODE_FLOOR: f32 = 0.05;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// This backend loads a local model file and performs inference on RGB frames.
/// It does not perform any network I/O or write to disk beyond model loading.
/// Frames are resized (nearest neighbour) to the square model input, and boxes are
/// scaled back to frame coordinates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let side = self.input_size as usize;
        let (w, h) = (width as usize, height as usize);
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let src_x = (x * w / side).min(w - 1);
            let src_y = (y * h / side).min(h - 1);
            pixels[(src_y * w + src_x) * CHANNELS + c] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= CXCYWH {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let classes = shape[1] - CXCYWH;
        let anchors = shape[2];
        let sx = f64::from(width) / f64::from(self.input_size);
        let sy = f64::from(height) / f64::from(self.input_size);

        let mut candidates = Vec::new();
        for a in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, preds[[0, CXCYWH + c, a]]))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < DECODE_FLOOR {
                continue;
            }
            let cx = f64::from(preds[[0, 0, a]]);
            let cy = f64::from(preds[[0, 1, a]]);
            let bw = f64::from(preds[[0, 2, a]]);
            let bh = f64::from(preds[[0, 3, a]]);
            let bbox = BBox::new(
                (cx - bw / 2.0) * sx,
                (cy - bh / 2.0) * sy,
                (cx + bw / 2.0) * sx,
                (cy + bh / 2.0) * sy,
            );
            candidates.push(RawDetection::new(class_id as u32, bbox, score.min(1.0)));
        }

        Ok(suppress_overlaps(candidates, NMS_IOU))
    }
}

/// Greedy per-class non-maximum suppression.
fn suppress_overlaps(mut candidates: Vec<RawDetection>, iou: f64) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_best_of_overlapping_same_class() {
        let kept = suppress_overlaps(
            vec![
                RawDetection::new(1, BBox::new(0.0, 0.0, 10.0, 10.0), 0.6),
                RawDetection::new(1, BBox::new(1.0, 1.0, 11.0, 11.0), 0.9),
                RawDetection::new(2, BBox::new(1.0, 1.0, 11.0, 11.0), 0.5),
            ],
            NMS_IOU,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 2);
    }
}
