use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::metadata::MetadataResolver;
use crate::models::{SampleSpec, ScanResult, ScanStats, VideoRecord};
use crate::probe::ContainerProbe;
use crate::report::RecordSink;
use crate::sampler::FrameSampler;
use crate::tags::{aggregate_tags, Detector};
use crate::video::{VideoHandle, VideoOpener};

pub const DEFAULT_VIDEO_SUFFIX: &str = ".MP4";

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub video_suffix: String,
    /// Exact-case suffix matching is the default; `.mp4` files are not
    /// picked up unless this is turned off.
    pub suffix_case_sensitive: bool,
    pub sample: SampleSpec,
}

impl ScanConfig {
    pub fn for_folder(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            video_suffix: DEFAULT_VIDEO_SUFFIX.to_string(),
            suffix_case_sensitive: true,
            sample: SampleSpec::default(),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        if self.suffix_case_sensitive {
            return file_name.ends_with(&self.video_suffix);
        }
        let suffix = self.video_suffix.as_bytes();
        let name = file_name.as_bytes();
        name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }
}

#[derive(Debug)]
pub enum ScanEvent<'a> {
    Started {
        root: &'a Path,
    },
    Processing {
        file_name: &'a str,
    },
    OpenFailed {
        file_name: &'a str,
        error: &'a Error,
    },
    Sampling {
        file_name: &'a str,
        fps: f64,
        frame_count: u64,
        frame_skip: u64,
    },
    FrameFailed {
        file_name: &'a str,
        frame_index: u64,
        error: &'a Error,
    },
    StreamInterrupted {
        file_name: &'a str,
        frames_read: u64,
        error: &'a Error,
    },
    Recorded {
        record: &'a VideoRecord,
    },
}

/// Collaborators a scan runs against.
pub struct ScanContext<'a, O, P, D, S>
where
    O: VideoOpener + ?Sized,
    P: ContainerProbe + ?Sized,
    D: Detector + ?Sized,
    S: RecordSink + ?Sized,
{
    pub opener: &'a O,
    pub probe: &'a P,
    pub detector: &'a mut D,
    pub sink: &'a mut S,
    pub metadata: &'a MetadataResolver,
}

pub fn scan_directory<O, P, D, S>(
    config: &ScanConfig,
    ctx: ScanContext<'_, O, P, D, S>,
) -> Result<ScanResult>
where
    O: VideoOpener + ?Sized,
    P: ContainerProbe + ?Sized,
    D: Detector + ?Sized,
    S: RecordSink + ?Sized,
{
    scan_directory_with_progress(config, ctx, |_| {})
}

/// Scans the direct children of `config.root` in listing order, writing each
/// record to the sink as soon as it is built. Files that fail to open are
/// skipped.
pub fn scan_directory_with_progress<O, P, D, S, F>(
    config: &ScanConfig,
    ctx: ScanContext<'_, O, P, D, S>,
    mut on_event: F,
) -> Result<ScanResult>
where
    O: VideoOpener + ?Sized,
    P: ContainerProbe + ?Sized,
    D: Detector + ?Sized,
    S: RecordSink + ?Sized,
    F: FnMut(&ScanEvent<'_>),
{
    if !config.root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            config.root.to_string_lossy()
        )));
    }

    let ScanContext {
        opener,
        probe,
        detector,
        sink,
        metadata,
    } = ctx;

    on_event(&ScanEvent::Started { root: &config.root });

    let mut stats = ScanStats::default();
    let mut records = Vec::new();
    let entries = WalkDir::new(&config.root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in entries {
        let entry = match entry {
            Ok(v) => v,
            Err(err) => {
                log::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            log::debug!("skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if !config.matches(file_name) {
            continue;
        }

        stats.files_seen += 1;
        on_event(&ScanEvent::Processing { file_name });

        let path = entry.path();
        let mut handle = match opener.open(path) {
            Ok(v) => v,
            Err(error) => {
                stats.files_skipped += 1;
                on_event(&ScanEvent::OpenFailed {
                    file_name,
                    error: &error,
                });
                continue;
            }
        };

        let info = handle.info();
        let mut sampler = FrameSampler::new(&mut handle, &config.sample);
        on_event(&ScanEvent::Sampling {
            file_name,
            fps: info.fps,
            frame_count: info.frame_count,
            frame_skip: sampler.frame_skip(),
        });

        let aggregation = {
            let frames = sampler.by_ref();
            aggregate_tags(frames, &mut *detector, |frame_index, error| {
                on_event(&ScanEvent::FrameFailed {
                    file_name,
                    frame_index,
                    error,
                })
            })
        };
        if let Some(error) = sampler.take_interrupted() {
            on_event(&ScanEvent::StreamInterrupted {
                file_name,
                frames_read: sampler.frames_read(),
                error: &error,
            });
        }
        drop(sampler);
        drop(handle);

        stats.frames_sampled += aggregation.frames_sampled;
        stats.frames_failed += aggregation.frames_failed;

        let meta = metadata.resolve(path, file_name, &info, probe);
        let record = VideoRecord::new(file_name, meta, aggregation.tags);
        sink.write_record(&record)?;
        stats.files_recorded += 1;
        on_event(&ScanEvent::Recorded { record: &record });
        records.push(record);
    }

    Ok(ScanResult { records, stats })
}
