use image::RgbImage;

use crate::error::{Error, Result};
use crate::models::{Detection, TagSet};
use crate::sampler::SampledFrame;

/// Maps one frame to the objects found in it. Loaded once per process and
/// reused for every video.
pub trait Detector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for &mut D {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

/// Detects nothing. Used when no model is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDetector;

impl Detector for NoDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub tags: TagSet,
    pub frames_sampled: u64,
    pub frames_failed: u64,
}

/// Runs `detector` over every sampled frame and collects the unique labels.
///
/// A frame the detector fails on contributes nothing; `on_failure` hears
/// about it and the remaining frames are still processed.
pub fn aggregate_tags<I, D, F>(frames: I, detector: &mut D, mut on_failure: F) -> Aggregation
where
    I: IntoIterator<Item = SampledFrame>,
    D: Detector + ?Sized,
    F: FnMut(u64, &Error),
{
    let mut out = Aggregation::default();
    for frame in frames {
        out.frames_sampled += 1;
        match detector.detect(&frame.image) {
            Ok(detections) => {
                for det in detections {
                    out.tags.insert(det.class_name);
                }
            }
            Err(err) => {
                out.frames_failed += 1;
                log::debug!("detector failed on frame {}: {err}", frame.index);
                on_failure(frame.index, &err);
            }
        }
    }
    out
}
