//! End-to-end runs of the document pipeline against synthetic model outputs.

use doc_locator::{
    compose_coverage, CoordinateMapping, DocumentLocator, FrameSample, LocatorConfig, Point,
    ProtoLayout, RawOutputs, Rect, SegmentationSource, StubBackend, SyntheticDocument,
};

fn locator_with(config: LocatorConfig, document: &SyntheticDocument) -> DocumentLocator {
    let backend = StubBackend::with_document(config.model.width, config.model.height, document);
    DocumentLocator::new(config, Box::new(backend)).expect("locator")
}

fn config(model: u32) -> LocatorConfig {
    let mut config = LocatorConfig::default();
    config.model.width = model;
    config.model.height = model;
    config
}

fn black(width: u32, height: u32) -> FrameSample {
    FrameSample::from_rgb(width, height, vec![0; (width * height * 3) as usize]).expect("frame")
}

#[test]
fn single_anchor_maps_to_real_frame() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.9);
    let mut locator = locator_with(config(320), &document);

    let prediction = locator
        .locate(&black(640, 640))
        .expect("locate")
        .expect("prediction");

    assert_eq!(prediction.class_name, "id_card");
    assert_eq!(prediction.probability_label(), "90.0");
    assert_eq!(prediction.rect, Rect::new(220.0, 260.0, 200.0, 120.0));

    let segmentation = prediction.segmentation.expect("segmentation");
    assert_eq!(segmentation.possible_polygons.len(), 1);
    assert!((segmentation.possible_polygons[0].intersect_score - 1.0).abs() < 1e-6);
    assert_eq!(
        segmentation.polygon,
        [
            Point::new(220.0, 260.0),
            Point::new(419.0, 260.0),
            Point::new(419.0, 379.0),
            Point::new(220.0, 379.0),
        ]
    );
    assert_eq!(segmentation.angle, 0.0);
    assert!(doc_locator::segment::rectangularity(&segmentation.polygon) > 0.99);
}

#[test]
fn declared_real_size_scales_a_preview_frame() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.9);
    let mut locator = locator_with(config(320), &document);

    let prediction = locator
        .locate_at(&black(320, 320), 1280, 1280)
        .expect("locate")
        .expect("prediction");
    assert_eq!(prediction.rect, Rect::new(440.0, 520.0, 400.0, 240.0));
}

#[test]
fn letterboxed_frame_maps_through_padding() {
    // 640x480 frame pads to 640x640, so model pixels are 2 real pixels each way.
    let document = SyntheticDocument::new((160.0, 120.0), (100.0, 60.0), 0.7);
    let mut locator = locator_with(config(320), &document);

    let prediction = locator
        .locate(&black(640, 480))
        .expect("locate")
        .expect("prediction");
    assert_eq!(prediction.rect, Rect::new(220.0, 180.0, 200.0, 120.0));
    assert_eq!(prediction.probability_label(), "70.0");
}

#[test]
fn overlapping_anchors_collapse_to_best() {
    // Two anchors on the same document, one slightly shifted, plus a far one.
    let anchors = [
        [100.0, 100.0, 80.0, 50.0, 0.6],
        [102.0, 101.0, 80.0, 50.0, 0.95],
        [250.0, 250.0, 40.0, 40.0, 0.5],
    ];
    let features = 4 + 1 + 1;
    let mut detections = vec![0.0f32; features * anchors.len()];
    for (a, anchor) in anchors.iter().enumerate() {
        for (f, value) in anchor.iter().enumerate() {
            detections[f * anchors.len() + a] = *value;
        }
    }
    let outputs = RawOutputs {
        detections,
        detection_shape: [1, features, anchors.len()],
        protos: vec![0.0; 8 * 8],
        proto_shape: [1, 1, 8, 8],
        proto_layout: ProtoLayout::ChannelFirst,
    };

    let mut cfg = config(320);
    cfg.detection.segment = false;
    let locator = DocumentLocator::new(cfg, Box::new(StubBackend::empty(320, 320, 1)))
        .expect("locator");
    let mapping = CoordinateMapping::direct(320, 320, 320, 320);
    let predictions = locator
        .postprocess(outputs, &mapping, None)
        .expect("postprocess");

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].probability_label(), "95.0");
    assert_eq!(predictions[1].probability_label(), "50.0");
    assert!(predictions[0].rect.iou(&predictions[1].rect) <= 0.2);
}

#[test]
fn channel_outlines_are_filtered_by_detection_box() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.9);
    let mut cfg = config(320);
    cfg.detection.source = SegmentationSource::Channels;
    let mut locator = locator_with(cfg, &document);

    let prediction = locator
        .locate(&black(320, 320))
        .expect("locate")
        .expect("prediction");
    // Prototype cells 27..52 x 32..47 scale by 4 onto the frame, which lands
    // the outline at 108..204 x 128..184, inside the 110..210 x 130..190 box
    // only in part.
    assert!(prediction.segmentation.is_none());

    let mut cfg = config(320);
    cfg.detection.source = SegmentationSource::Channels;
    cfg.detection.intersect_threshold = 0.9;
    let mut locator = locator_with(cfg, &document);
    let prediction = locator
        .locate(&black(320, 320))
        .expect("locate")
        .expect("prediction");
    let segmentation = prediction.segmentation.expect("segmentation");
    assert_eq!(segmentation.polygon[0], Point::new(108.0, 128.0));
}

#[test]
fn fractional_box_keeps_its_solid_mask() {
    // Lands at x = y = 180.6 on the real frame before snapping.
    let document = SyntheticDocument::new((100.3, 100.3), (20.0, 20.0), 0.9);
    let mut locator = locator_with(config(320), &document);

    let prediction = locator
        .locate(&black(640, 640))
        .expect("locate")
        .expect("prediction");
    assert_eq!(prediction.rect, Rect::new(180.0, 180.0, 40.0, 40.0));

    let segmentation = prediction.segmentation.expect("segmentation");
    assert!((segmentation.possible_polygons[0].intersect_score - 1.0).abs() < 1e-6);
    assert_eq!(segmentation.polygon[0], Point::new(180.0, 180.0));
    assert_eq!(segmentation.polygon[2], Point::new(219.0, 219.0));
}

#[test]
fn channel_outlines_follow_letterbox_mapping() {
    // Prototype rows 22..=36 sit at model y 88..=144, which the padded
    // 640x480 frame doubles to 176..=288.
    let document = SyntheticDocument::new((160.0, 120.0), (100.0, 60.0), 0.9);
    let mut cfg = config(320);
    cfg.detection.source = SegmentationSource::Channels;
    cfg.detection.intersect_threshold = 0.9;
    let mut locator = locator_with(cfg, &document);

    let prediction = locator
        .locate(&black(640, 480))
        .expect("locate")
        .expect("prediction");
    assert_eq!(prediction.rect, Rect::new(220.0, 180.0, 200.0, 120.0));
    let segmentation = prediction.segmentation.expect("segmentation");
    assert_eq!(segmentation.polygon[0], Point::new(216.0, 176.0));
    assert_eq!(segmentation.polygon[2], Point::new(408.0, 288.0));
    assert!(prediction.mask.is_none());
}

#[test]
fn instance_masks_compose_into_a_coverage_overlay() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.9);
    let mut locator = locator_with(config(320), &document);

    let predictions = locator.locate_all(&black(640, 640)).expect("locate");
    assert_eq!(predictions.len(), 1);
    let mask = predictions[0].mask.as_ref().expect("mask");
    assert_eq!(mask.origin(), (220, 260));

    let coverage = compose_coverage(predictions.iter().filter_map(|p| p.mask.as_ref()), 640, 640);
    assert_eq!(coverage.len(), 640 * 640);
    assert_eq!(coverage.iter().filter(|&&c| c != 0).count(), 200 * 120);
    assert_eq!(coverage[260 * 640 + 220], 1);
    assert_eq!(coverage[260 * 640 + 219], 0);
}

#[test]
fn weak_detections_produce_nothing() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.25);
    let mut locator = locator_with(config(320), &document);
    assert!(locator.locate(&black(320, 320)).expect("locate").is_none());
    assert!(locator.locate_all(&black(320, 320)).expect("locate").is_empty());
}

#[test]
fn prediction_serializes_for_overlays() {
    let document = SyntheticDocument::new((160.0, 160.0), (100.0, 60.0), 0.9);
    let mut locator = locator_with(config(320), &document);
    let prediction = locator
        .locate(&black(320, 320))
        .expect("locate")
        .expect("prediction");

    let json = serde_json::to_value(&prediction).expect("json");
    assert_eq!(json["class_name"], "id_card");
    assert_eq!(json["rect"]["w"], 100.0);
    assert_eq!(json["segmentation"]["polygon"].as_array().map(Vec::len), Some(4));
    assert!(json.get("mask").is_none());
}
