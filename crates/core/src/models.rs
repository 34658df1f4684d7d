use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 10.0;

/// How often a video is sampled for detection, in seconds of footage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSpec {
    interval_secs: f64,
}

impl SampleSpec {
    pub fn new(interval_secs: f64) -> Result<Self> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "sample interval must be a positive number of seconds, got {interval_secs}"
            )));
        }
        Ok(Self { interval_secs })
    }

    /// Stride between sampled frames. Never zero; an unknown frame rate
    /// samples every frame.
    pub fn frame_skip(&self, fps: f64) -> u64 {
        if fps.is_nan() || fps <= 0.0 {
            return 1;
        }
        // float-to-int casts saturate
        ((fps * self.interval_secs).floor() as u64).max(1)
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl StreamInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    pub fn new(class_id: usize, class_name: impl Into<String>) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
        }
    }
}

/// Unique detection labels for one video, serialized in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    labels: BTreeSet<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.labels.insert(label.into())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str("none");
        }
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(label)?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub resolution: String,
    pub duration_secs: f64,
    pub camera_type: String,
    pub date_created: Option<NaiveDateTime>,
}

/// One report row.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub file_name: String,
    pub resolution: String,
    pub duration_secs: f64,
    pub camera_type: String,
    pub date_created: Option<NaiveDateTime>,
    pub tags: TagSet,
}

impl VideoRecord {
    pub fn new(file_name: impl Into<String>, metadata: VideoMetadata, tags: TagSet) -> Self {
        Self {
            file_name: file_name.into(),
            resolution: metadata.resolution,
            duration_secs: metadata.duration_secs,
            camera_type: metadata.camera_type,
            date_created: metadata.date_created,
            tags,
        }
    }

    pub fn date_created_display(&self) -> String {
        match self.date_created {
            Some(date) => date.format(DATE_FORMAT).to_string(),
            None => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: u64,
    pub files_recorded: u64,
    pub files_skipped: u64,
    pub frames_sampled: u64,
    pub frames_failed: u64,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub records: Vec<VideoRecord>,
    pub stats: ScanStats,
}
