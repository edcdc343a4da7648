use qyoo_core::{PixelBuffer, PixelView, Point2};
use qyoo_marker::{
    marker_transform, render_bits, render_marker, ChecksumScheme, DetectError, DetectionStatus,
    MarkerModel, MarkerModelSpec, QyooDetector, QyooDetectorParams, RenderStyle, StagedDetector,
};

fn detector() -> QyooDetector {
    QyooDetector::new(MarkerModel::default(), QyooDetectorParams::default())
}

fn scene(payload: u64, center: Point2<f32>, side: f32, rotation_deg: f32) -> PixelBuffer<u8> {
    let t = marker_transform(center, side, rotation_deg).unwrap();
    render_marker(&MarkerModel::default(), payload, &t, 200, 200, &RenderStyle::default()).unwrap()
}

/// Deterministic LCG noise in `[lo, lo + span)`.
fn noise(width: usize, height: usize, lo: u8, span: u32) -> PixelBuffer<u8> {
    let mut state = 0x2545_f491u32;
    PixelBuffer::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        lo + ((state >> 24) % span) as u8
    })
    .unwrap()
}

#[test]
fn rotated_marker_decodes_with_pose() {
    let center = Point2::new(120.0, 115.0);
    let img = scene(7, center, 100.0, 10.0);
    let r = detector().detect(&img.view());

    assert_eq!(r.status, DetectionStatus::Success, "{r:?}");
    assert_eq!(r.payload, Some(7));
    let rot = r.rotation_deg().unwrap();
    assert!((rot - 10.0).abs() < 2.0, "rotation {rot}");
    let c = r.center().unwrap();
    assert!((c - center).norm() < 1.0, "centre {c:?}");
    assert!(r.confidence > 0.0 && r.confidence <= 1.0);

    let corners = r.corners.unwrap();
    let tl = marker_transform(center, 100.0, 10.0)
        .unwrap()
        .apply(Point2::new(0.0, 0.0));
    assert!((corners[0] - tl).norm() < 2.5, "TL {:?} vs {:?}", corners[0], tl);
}

#[test]
fn steep_rotation_is_resolved_by_the_key() {
    let center = Point2::new(100.0, 100.0);
    let img = scene(0xabc, center, 110.0, 100.0);
    let d = detector().try_detect(&img.view()).unwrap();
    assert_eq!(d.payload(), 0xabc);
    let rot = d.transform().rotation().to_degrees();
    assert!((rot - 100.0).abs() < 2.0, "rotation {rot}");
    assert_ne!(d.marker.quarter_turns, 0);
}

#[test]
fn blank_and_noise_frames_have_no_marker() {
    let det = detector();
    let blank = PixelBuffer::filled(200, 200, 128u8).unwrap();
    assert_eq!(det.detect(&blank.view()).status, DetectionStatus::NoMarkerFound);

    let full = noise(200, 200, 0, 256);
    assert_eq!(det.detect(&full.view()).status, DetectionStatus::NoMarkerFound);

    let faint = noise(200, 200, 100, 57);
    let r = det.detect(&faint.view());
    assert_eq!(r.status, DetectionStatus::NoMarkerFound);
    assert!(r.payload.is_none() && r.transform.is_none());
}

#[test]
fn corrupted_checksum_keeps_the_pose() {
    let model = MarkerModel::default();
    let mut bits = model.encode_bits(7).unwrap();
    bits[12] = !bits[12];
    let t = marker_transform(Point2::new(100.0, 100.0), 100.0, -6.0).unwrap();
    let img = render_bits(&model, &bits, &t, 200, 200, &RenderStyle::default()).unwrap();

    let det = detector();
    let r = det.detect(&img.view());
    assert_eq!(r.status, DetectionStatus::ChecksumMismatch);
    assert!(r.transform.is_some() && r.corners.is_some());
    assert!(r.payload.is_none());
    assert!(matches!(
        det.try_detect(&img.view()),
        Err(DetectError::ChecksumMismatch { .. })
    ));
}

#[test]
fn borrowed_caller_buffer_is_accepted() {
    let img = scene(321, Point2::new(96.0, 104.0), 96.0, 3.0);
    let raw: Vec<u8> = img.into_raw();
    let view = PixelView::new(200, 200, &raw).unwrap();
    assert_eq!(detector().detect(&view).payload, Some(321));
    assert!(PixelView::new(200, 199, &raw).is_err());
}

#[test]
fn staged_detector_enforces_call_order() {
    let mut staged = StagedDetector::new(detector());
    assert!(staged.query_marker().is_none());

    let img = scene(7, Point2::new(100.0, 100.0), 100.0, 0.0);
    assert_eq!(staged.process_frame(&img.view()), DetectionStatus::Success);
    let handle = staged.query_marker().unwrap();
    assert_eq!(staged.decode_payload(handle), Ok(7));

    let blank = PixelBuffer::filled(200, 200, 90u8).unwrap();
    assert_eq!(
        staged.process_frame(&blank.view()),
        DetectionStatus::NoMarkerFound
    );
    assert!(staged.query_marker().is_none());
    assert_eq!(
        staged.decode_payload(handle),
        Err(DetectError::NoMarkerFound)
    );
    assert_eq!(
        staged.last_result().map(|r| r.status),
        Some(DetectionStatus::NoMarkerFound)
    );
}

#[test]
fn decode_before_any_frame_is_not_processed() {
    let mut staged = StagedDetector::new(detector());
    let img = scene(9, Point2::new(100.0, 100.0), 100.0, 0.0);
    staged.process_frame(&img.view());
    let handle = staged.query_marker().unwrap();

    let fresh = StagedDetector::new(detector());
    assert_eq!(fresh.decode_payload(handle), Err(DetectError::NotProcessed));
}

#[test]
fn custom_model_loads_from_json_and_detects() {
    let spec = MarkerModelSpec {
        rows: 3,
        cols: 3,
        payload_bits: 8,
        checksum: ChecksumScheme::Parity,
        ..MarkerModelSpec::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    qyoo_marker::write_json(&spec, &path).unwrap();
    let model = MarkerModel::from_json_file(&path).unwrap();
    assert_eq!(model.spec(), &spec);

    let t = marker_transform(Point2::new(100.0, 100.0), 100.0, 5.0).unwrap();
    let img = render_marker(&model, 0xa5, &t, 200, 200, &RenderStyle::default()).unwrap();
    let r = QyooDetector::new(model, QyooDetectorParams::default()).detect(&img.view());
    assert_eq!(r.payload, Some(0xa5));

    std::fs::write(&path, r#"{ "rows": 2, "cols": 2 }"#).unwrap();
    assert!(MarkerModel::from_json_file(&path).is_err());
}
