use image::RgbImage;

use crate::error::Error;
use crate::models::SampleSpec;
use crate::video::VideoHandle;

#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub index: u64,
    pub image: RgbImage,
}

/// Single forward pass over a handle, yielding every `frame_skip`-th frame.
///
/// Skipped frames are still read so the decode cursor advances exactly once
/// per frame. A read error ends the stream; whatever was yielded before it
/// stands as the result.
pub struct FrameSampler<'a, H: VideoHandle + ?Sized> {
    handle: &'a mut H,
    frame_skip: u64,
    next_index: u64,
    done: bool,
    interrupted: Option<Error>,
}

impl<'a, H: VideoHandle + ?Sized> FrameSampler<'a, H> {
    pub fn new(handle: &'a mut H, spec: &SampleSpec) -> Self {
        let fps = handle.info().fps;
        let frame_skip = spec.frame_skip(fps);
        if fps <= 0.0 || fps.is_nan() {
            log::warn!("unknown frame rate, sampling every frame");
        }
        Self {
            handle,
            frame_skip,
            next_index: 0,
            done: false,
            interrupted: None,
        }
    }

    pub fn frame_skip(&self) -> u64 {
        self.frame_skip
    }

    /// Frames successfully read so far, sampled or not.
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    /// The read error that stopped the stream early, if any.
    pub fn interrupted(&self) -> Option<&Error> {
        self.interrupted.as_ref()
    }

    pub fn take_interrupted(&mut self) -> Option<Error> {
        self.interrupted.take()
    }
}

impl<H: VideoHandle + ?Sized> Iterator for FrameSampler<'_, H> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        while !self.done {
            match self.handle.read_frame() {
                Ok(Some(image)) => {
                    let index = self.next_index;
                    self.next_index += 1;
                    if index % self.frame_skip == 0 {
                        return Some(SampledFrame { index, image });
                    }
                }
                Ok(None) => self.done = true,
                Err(err) => {
                    log::debug!("frame read failed after {} frames: {err}", self.next_index);
                    self.done = true;
                    self.interrupted = Some(err);
                }
            }
        }
        None
    }
}

impl<H: VideoHandle + ?Sized> std::iter::FusedIterator for FrameSampler<'_, H> {}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::Result;
    use crate::models::StreamInfo;

    /// Replays a fixed script of read outcomes and counts reads.
    struct ScriptedHandle {
        info: StreamInfo,
        script: VecDeque<Result<Option<RgbImage>>>,
        reads: u64,
    }

    impl ScriptedHandle {
        fn frames(fps: f64, count: u64) -> Self {
            let mut script: VecDeque<_> = (0..count)
                .map(|i| Ok(Some(RgbImage::from_pixel(2, 2, image::Rgb([i as u8, 0, 0])))))
                .collect();
            script.push_back(Ok(None));
            Self {
                info: StreamInfo {
                    fps,
                    frame_count: count,
                    width: 2,
                    height: 2,
                },
                script,
                reads: 0,
            }
        }
    }

    impl VideoHandle for ScriptedHandle {
        fn info(&self) -> StreamInfo {
            self.info
        }

        fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            self.reads += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    #[test]
    fn samples_every_frame_skip() {
        let mut handle = ScriptedHandle::frames(1.0, 25);
        let spec = SampleSpec::default();
        let indices: Vec<u64> = FrameSampler::new(&mut handle, &spec)
            .map(|f| f.index)
            .collect();
        assert_eq!(indices, vec![0, 10, 20]);
        // 25 frames plus the end-of-stream read
        assert_eq!(handle.reads, 26);
    }

    #[test]
    fn zero_fps_samples_every_frame() {
        let mut handle = ScriptedHandle::frames(0.0, 4);
        let spec = SampleSpec::default();
        let mut sampler = FrameSampler::new(&mut handle, &spec);
        assert_eq!(sampler.frame_skip(), 1);
        let indices: Vec<u64> = sampler.by_ref().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(sampler.interrupted().is_none());
    }

    #[test]
    fn thirty_fps_ten_second_clip_samples_first_frame_only() {
        let mut handle = ScriptedHandle::frames(30.0, 300);
        let spec = SampleSpec::default();
        let mut sampler = FrameSampler::new(&mut handle, &spec);
        assert_eq!(sampler.frame_skip(), 300);
        let frames: Vec<_> = sampler.by_ref().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].index, 0);
        assert_eq!(sampler.frames_read(), 300);
    }

    #[test]
    fn read_error_stops_sampling() {
        let mut handle = ScriptedHandle::frames(1.0, 0);
        handle.script = VecDeque::from(vec![
            Ok(Some(RgbImage::new(2, 2))),
            Ok(Some(RgbImage::new(2, 2))),
            Err(Error::Decode("corrupt packet".to_string())),
            Ok(Some(RgbImage::new(2, 2))),
        ]);
        let spec = SampleSpec::new(1.0).unwrap();
        let mut sampler = FrameSampler::new(&mut handle, &spec);
        let indices: Vec<u64> = sampler.by_ref().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(matches!(sampler.interrupted(), Some(Error::Decode(_))));
        assert!(sampler.next().is_none());
        assert_eq!(handle.reads, 3);
    }
}
