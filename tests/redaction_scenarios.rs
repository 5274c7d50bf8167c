//! Worked redaction scenarios over the public API.

use std::time::Duration;

use redaction_kernel::{
    normalize_detections, BBox, Compositor, Detection, Frame, MotionPredictor, PixelRect,
    RawDetection, RedactionMask, Timestamp, TrackStore,
};

fn at(secs: f64) -> Timestamp {
    Timestamp::from_secs_f64(secs)
}

fn assert_box_close(actual: BBox, expected: (f64, f64, f64, f64)) {
    let (x1, y1, x2, y2) = expected;
    for (got, want) in [
        (actual.x1, x1),
        (actual.y1, y1),
        (actual.x2, x2),
        (actual.y2, y2),
    ] {
        assert!(
            (got - want).abs() < 1e-9,
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }
}

fn gradient(width: u32, height: u32) -> Vec<u8> {
    (0..width * height * 3).map(|i| (i % 251) as u8).collect()
}

#[test]
fn scenario_a_linear_motion_extrapolates_each_edge() {
    let mut store = TrackStore::new(Duration::from_millis(500));
    let first = Detection::new(7, BBox::new(10.0, 10.0, 50.0, 50.0), 0.9, at(0.0));
    let second = Detection::new(7, BBox::new(20.0, 10.0, 60.0, 50.0), 0.9, at(0.1));
    store.update(7, first, at(0.0));
    store.update(7, second, at(0.1));

    let track = store.get(7).expect("class 7 tracked");
    assert_eq!(track.len(), 2);

    // 100 px/s on x1 and x2, stationary y.
    let ahead = MotionPredictor::new(Duration::from_millis(200))
        .predict(track)
        .expect("two samples predict");
    assert_box_close(ahead, (40.0, 10.0, 80.0, 50.0));

    let one_interval = MotionPredictor::new(Duration::from_millis(100))
        .predict(track)
        .expect("two samples predict");
    assert_box_close(one_interval, (30.0, 10.0, 70.0, 50.0));
}

#[test]
fn scenario_b_expired_history_yields_no_prediction() {
    let mut store = TrackStore::new(Duration::from_millis(500));
    store.update(
        3,
        Detection::new(3, BBox::new(0.0, 0.0, 10.0, 10.0), 0.8, at(0.0)),
        at(0.0),
    );

    store.prune(at(0.6));

    assert!(store.get(3).is_none());
    let predictor = MotionPredictor::default();
    assert!(store.tracks().all(|(_, track)| predictor.predict(track).is_none()));
}

#[test]
fn scenario_c_box_off_the_top_left_is_clamped() {
    let bbox = BBox::new(-5.0, -5.0, 15.0, 15.0);
    assert_eq!(
        bbox.clamp_to(100, 100),
        Some(PixelRect {
            x1: 0,
            y1: 0,
            x2: 15,
            y2: 15
        })
    );

    let data = gradient(100, 100);
    let frame = Frame::from_rgb(data.clone(), 100, 100, Timestamp::ZERO).unwrap();
    let mask: RedactionMask = [bbox].into_iter().collect();
    let out = Compositor::default().redact(frame, &mask);

    assert_eq!(out.regions_redacted(), 1);
    for y in 0..100usize {
        for x in 0..100usize {
            if x <= 15 && y <= 15 {
                continue;
            }
            let i = (y * 100 + x) * 3;
            assert_eq!(out.as_rgb()[i..i + 3], data[i..i + 3], "pixel ({x},{y}) changed");
        }
    }
}

#[test]
fn scenario_d_low_confidence_is_never_tracked_or_redacted() {
    let raw = vec![RawDetection::new(1, BBox::new(10.0, 10.0, 30.0, 30.0), 0.2)];
    let accepted = normalize_detections(raw, 0.5, at(0.0));
    assert!(accepted.is_empty());

    let mut store = TrackStore::default();
    for det in accepted.iter().cloned() {
        store.update(det.class_id, det, at(0.0));
    }
    assert!(store.get(1).is_none());

    let data = gradient(40, 40);
    let frame = Frame::from_rgb(data.clone(), 40, 40, Timestamp::ZERO).unwrap();
    let mask: RedactionMask = accepted.iter().map(|d| d.bbox).collect();
    let out = Compositor::default().redact(frame, &mask);
    assert_eq!(out.regions_redacted(), 0);
    assert_eq!(out.as_rgb(), &data[..]);
}

#[test]
fn threshold_is_inclusive() {
    let raw = vec![
        RawDetection::new(1, BBox::new(0.0, 0.0, 4.0, 4.0), 0.5),
        RawDetection::new(2, BBox::new(0.0, 0.0, 4.0, 4.0), 0.499),
    ];
    let accepted = normalize_detections(raw, 0.5, at(1.0));
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].class_id, 1);
    assert_eq!(accepted[0].timestamp, at(1.0));
}

#[test]
fn redaction_never_escapes_the_frame() {
    let data = gradient(32, 24);
    let frame = Frame::from_rgb(data.clone(), 32, 24, Timestamp::ZERO).unwrap();
    // Reaches past the right and bottom edges.
    let mask: RedactionMask = [BBox::new(20.0, 10.0, 500.0, 400.0)].into_iter().collect();

    let out = Compositor::default().redact(frame, &mask);

    assert_eq!(out.as_rgb().len(), data.len());
    for y in 0..24usize {
        for x in 0..20usize {
            let i = (y * 32 + x) * 3;
            assert_eq!(out.as_rgb()[i..i + 3], data[i..i + 3]);
        }
    }
}

#[test]
fn reapplying_a_mask_keeps_region_flat() {
    let bbox = BBox::new(4.0, 4.0, 20.0, 20.0);
    let mask: RedactionMask = [bbox, bbox].into_iter().collect();
    let frame = Frame::from_rgb(gradient(24, 24), 24, 24, Timestamp::ZERO).unwrap();

    let out = Compositor::default().redact(frame, &mask);
    let rect = bbox.clamp_to(24, 24).unwrap();

    let values: Vec<u8> = (rect.y1..=rect.y2)
        .flat_map(|y| (rect.x1..=rect.x2).map(move |x| (y, x)))
        .map(|(y, x)| out.as_rgb()[((y * 24 + x) * 3) as usize])
        .collect();
    let lo = *values.iter().min().unwrap();
    let hi = *values.iter().max().unwrap();
    assert!(hi - lo <= 2, "region spread {}..{}", lo, hi);
}
