//! Live-capture state machine.
//!
//! A `CaptureSession` is the only state that survives between frames: the
//! last motion reference frame, the last prediction and the cadence counter.
//! The capture loop owns one session and feeds it every frame in order.

use anyhow::Result;
use serde::Serialize;

use crate::config::CaptureSettings;
use crate::detect::Prediction;
use crate::frame::FrameSample;
use crate::pipeline::DocumentLocator;
use crate::quality::FrameQualityAnalyzer;

/// Outcome of one tick.
#[derive(Clone, Debug, Serialize)]
pub struct CaptureDecision {
    /// Position of this frame in the motion cadence, `0` on sampling frames.
    pub frame_index: u32,
    pub prediction: Option<Prediction>,
    /// Set only on frames where motion was sampled against a previous frame.
    pub motion: Option<f32>,
    pub stabilized: bool,
    /// Measured only when every other gate already passed.
    pub sharpness: Option<f32>,
    /// The frame should be handed on for capture.
    pub accepted: bool,
}

pub struct CaptureSession {
    analyzer: FrameQualityAnalyzer,
    motion_interval: u32,
    frame_index: u32,
    previous_sample: Option<FrameSample>,
    last_prediction: Option<Prediction>,
}

impl CaptureSession {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            analyzer: FrameQualityAnalyzer::new(
                settings.motion_threshold,
                settings.motion_pixel_delta,
                settings.sharpness_threshold,
            ),
            motion_interval: settings.motion_interval.max(1),
            frame_index: 0,
            previous_sample: None,
            last_prediction: None,
        }
    }

    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.last_prediction.as_ref()
    }

    /// Forget every frame seen so far.
    pub fn reset(&mut self) {
        self.frame_index = 0;
        self.previous_sample = None;
        self.last_prediction = None;
    }

    /// Process one frame.
    ///
    /// A frame is accepted when the document was already seen on an earlier
    /// frame, it is seen again now, motion against the last sampled frame is
    /// below threshold and the frame is sharp.
    pub fn tick(
        &mut self,
        locator: &mut DocumentLocator,
        sample: FrameSample,
    ) -> Result<CaptureDecision> {
        let frame_index = self.frame_index;
        let sampling = frame_index == 0;

        let mut motion = None;
        if sampling {
            if let Some(previous) = &self.previous_sample {
                motion = Some(self.analyzer.motion(&sample, previous)?);
            }
        }
        let stabilized = motion.map_or(false, |m| self.analyzer.is_stabilized(m));

        let prediction = locator.locate(&sample)?;

        let mut sharpness = None;
        let mut accepted = false;
        if prediction.is_some() && self.last_prediction.is_some() && stabilized {
            let value = self.analyzer.sharpness(&sample);
            sharpness = Some(value);
            accepted = self.analyzer.is_sharp(value);
        }

        if let Some(current) = &prediction {
            self.last_prediction = Some(current.clone());
        }
        if sampling {
            self.previous_sample = Some(sample);
        }
        self.frame_index = (frame_index + 1) % self.motion_interval;

        if accepted {
            log::info!("frame {} accepted for capture", frame_index);
        }
        Ok(CaptureDecision {
            frame_index,
            prediction,
            motion,
            stabilized,
            sharpness,
            accepted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocatorConfig;
    use crate::detect::{StubBackend, SyntheticDocument};

    fn locator() -> DocumentLocator {
        let mut config = LocatorConfig::default();
        config.model.width = 64;
        config.model.height = 64;
        let document = SyntheticDocument::new((32.0, 32.0), (32.0, 24.0), 0.9);
        let backend = StubBackend::with_document(64, 64, &document);
        DocumentLocator::new(config, Box::new(backend)).expect("locator")
    }

    fn frame(value: u8) -> FrameSample {
        FrameSample::from_rgb(64, 64, vec![value; 64 * 64 * 3]).expect("frame")
    }

    #[test]
    fn motion_is_sampled_on_the_cadence() -> Result<()> {
        let mut locator = locator();
        let mut session = CaptureSession::new(&LocatorConfig::default().capture);

        let decisions: Vec<CaptureDecision> = (0..7)
            .map(|_| session.tick(&mut locator, frame(10)))
            .collect::<Result<_>>()?;
        let indices: Vec<u32> = decisions.iter().map(|d| d.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 0]);
        assert_eq!(decisions[0].motion, None);
        assert!(decisions[1..6].iter().all(|d| d.motion.is_none()));
        assert_eq!(decisions[6].motion, Some(0.0));
        assert!(decisions[6].stabilized);
        Ok(())
    }

    #[test]
    fn flat_frames_never_pass_the_sharpness_gate() -> Result<()> {
        let mut locator = locator();
        let mut capture = LocatorConfig::default().capture;
        capture.motion_interval = 1;
        let mut session = CaptureSession::new(&capture);

        let first = session.tick(&mut locator, frame(10))?;
        assert!(first.prediction.is_some());
        assert!(!first.accepted);

        let second = session.tick(&mut locator, frame(10))?;
        assert!(second.stabilized);
        assert_eq!(second.sharpness, Some(0.0));
        assert!(!second.accepted);
        assert!(session.last_prediction().is_some());

        session.reset();
        assert!(session.last_prediction().is_none());
        Ok(())
    }
}
