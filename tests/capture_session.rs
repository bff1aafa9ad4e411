use anyhow::Result;
use doc_locator::config::CaptureSettings;
use doc_locator::{
    CaptureSession, DocumentLocator, FrameSample, LocatorConfig, StubBackend, SyntheticDocument,
};

fn locator() -> DocumentLocator {
    let mut config = LocatorConfig::default();
    config.model.width = 64;
    config.model.height = 64;
    let document = SyntheticDocument::new((32.0, 32.0), (40.0, 24.0), 0.8);
    let backend = StubBackend::with_document(64, 64, &document);
    DocumentLocator::new(config, Box::new(backend)).expect("locator")
}

fn blind_locator() -> DocumentLocator {
    let mut config = LocatorConfig::default();
    config.model.width = 64;
    config.model.height = 64;
    DocumentLocator::new(config, Box::new(StubBackend::empty(64, 64, 1))).expect("locator")
}

/// Vertical stripes two pixels wide; `invert` swaps dark and light.
fn stripes(invert: bool) -> FrameSample {
    let mut rgb = Vec::with_capacity(64 * 64 * 3);
    for _ in 0..64 {
        for x in 0..64u32 {
            let light = ((x / 2) % 2 == 0) != invert;
            let v = if light { 220 } else { 30 };
            rgb.extend_from_slice(&[v, v, v]);
        }
    }
    FrameSample::from_rgb(64, 64, rgb).expect("frame")
}

fn every_frame() -> CaptureSettings {
    let mut capture = LocatorConfig::default().capture;
    capture.motion_interval = 1;
    capture
}

#[test]
fn steady_sharp_document_is_accepted_on_second_frame() -> Result<()> {
    let mut locator = locator();
    let mut session = CaptureSession::new(&every_frame());

    let first = session.tick(&mut locator, stripes(false))?;
    assert!(first.prediction.is_some());
    assert_eq!(first.motion, None);
    assert!(!first.stabilized);
    assert_eq!(first.sharpness, None);
    assert!(!first.accepted);

    let second = session.tick(&mut locator, stripes(false))?;
    assert_eq!(second.motion, Some(0.0));
    assert!(second.stabilized);
    assert!(second.sharpness.expect("measured") > 0.05);
    assert!(second.accepted);
    Ok(())
}

#[test]
fn moving_frame_is_rejected() -> Result<()> {
    let mut locator = locator();
    let mut session = CaptureSession::new(&every_frame());

    session.tick(&mut locator, stripes(false))?;
    let moved = session.tick(&mut locator, stripes(true))?;
    assert_eq!(moved.motion, Some(1.0));
    assert!(!moved.stabilized);
    assert_eq!(moved.sharpness, None);
    assert!(!moved.accepted);

    // The inverted frame becomes the new reference.
    let settled = session.tick(&mut locator, stripes(true))?;
    assert!(settled.accepted);
    Ok(())
}

#[test]
fn no_document_means_no_capture() -> Result<()> {
    let mut locator = blind_locator();
    let mut session = CaptureSession::new(&every_frame());

    for _ in 0..3 {
        let decision = session.tick(&mut locator, stripes(false))?;
        assert!(decision.prediction.is_none());
        assert!(!decision.accepted);
    }
    assert!(session.last_prediction().is_none());
    Ok(())
}

#[test]
fn default_cadence_accepts_only_on_sampling_frames() -> Result<()> {
    let mut locator = locator();
    let mut session = CaptureSession::new(&LocatorConfig::default().capture);

    let accepted: Vec<u32> = (0..13)
        .map(|_| session.tick(&mut locator, stripes(false)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|decision| decision.accepted)
        .map(|decision| decision.frame_index)
        .collect();
    // Sampling frames are ticks 0, 6 and 12; the first has nothing to compare to.
    assert_eq!(accepted, vec![0, 0]);
    Ok(())
}

#[test]
fn reset_starts_a_fresh_cadence() -> Result<()> {
    let mut locator = locator();
    let mut session = CaptureSession::new(&every_frame());

    session.tick(&mut locator, stripes(false))?;
    session.reset();
    let after = session.tick(&mut locator, stripes(false))?;
    assert_eq!(after.frame_index, 0);
    assert_eq!(after.motion, None);
    assert!(!after.accepted);
    Ok(())
}

#[test]
fn decisions_serialize_for_logging() -> Result<()> {
    let mut locator = locator();
    let mut session = CaptureSession::new(&every_frame());
    let decision = session.tick(&mut locator, stripes(false))?;

    let json = serde_json::to_value(&decision)?;
    assert_eq!(json["frame_index"], 0);
    assert_eq!(json["accepted"], false);
    assert!(json["motion"].is_null());
    assert_eq!(json["prediction"]["class_name"], "id_card");
    Ok(())
}
