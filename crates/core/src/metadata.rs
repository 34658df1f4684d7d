use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use crate::error::{Error, Result};
use crate::models::{StreamInfo, VideoMetadata};
use crate::probe::ContainerProbe;

pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const CAMERA_MARKER: &str = "DJI";
const UNKNOWN_CAMERA: &str = "Unknown";

/// One tier of the date-created fallback chain.
pub trait DateSource {
    fn name(&self) -> &'static str;

    fn date_created(&self, path: &Path, file_name: &str) -> Result<NaiveDateTime>;
}

/// Timestamp token at underscore position 1, e.g. `DJI_20240802161422_0005_D.MP4`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameTimestamp;

impl DateSource for FilenameTimestamp {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn date_created(&self, _path: &Path, file_name: &str) -> Result<NaiveDateTime> {
        let token = file_name.split('_').nth(1).ok_or_else(|| {
            Error::InvalidArgument(format!("no timestamp token in {file_name:?}"))
        })?;
        NaiveDateTime::parse_from_str(token, FILENAME_TIMESTAMP_FORMAT).map_err(|e| {
            Error::InvalidArgument(format!("bad timestamp token {token:?}: {e}"))
        })
    }
}

/// The file's status-change time on Unix, creation time elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemTimestamp;

impl DateSource for FilesystemTimestamp {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn date_created(&self, path: &Path, _file_name: &str) -> Result<NaiveDateTime> {
        Ok(change_time(path)?.naive_local())
    }
}

#[cfg(unix)]
fn change_time(path: &Path) -> Result<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;

    let md = std::fs::metadata(path)?;
    Local
        .timestamp_opt(md.ctime(), md.ctime_nsec().clamp(0, 999_999_999) as u32)
        .earliest()
        .ok_or_else(|| Error::InvalidArgument(format!("ctime out of range for {}", path.display())))
}

#[cfg(not(unix))]
fn change_time(path: &Path) -> Result<DateTime<Local>> {
    let md = std::fs::metadata(path)?;
    let time = md.created().or_else(|_| md.modified())?;
    Ok(DateTime::<Local>::from(time))
}

/// Tries each tier in order; the first success wins.
pub struct DateResolver {
    tiers: Vec<Box<dyn DateSource>>,
}

impl DateResolver {
    pub fn new(tiers: Vec<Box<dyn DateSource>>) -> Self {
        Self { tiers }
    }

    pub fn resolve(&self, path: &Path, file_name: &str) -> Option<NaiveDateTime> {
        for tier in &self.tiers {
            match tier.date_created(path, file_name) {
                Ok(date) => return Some(date),
                Err(err) => log::debug!("{} date for {file_name}: {err}", tier.name()),
            }
        }
        log::warn!("no creation date for {file_name}");
        None
    }
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new(vec![Box::new(FilenameTimestamp), Box::new(FilesystemTimestamp)])
    }
}

/// Camera type from the probed encoder string, falling back to the filename.
///
/// A probe that succeeds without mentioning DJI still lets the filename decide.
pub fn camera_type(file_name: &str, encoder: Result<String>) -> String {
    let filename_guess = || {
        if file_name.contains(CAMERA_MARKER) {
            CAMERA_MARKER.to_string()
        } else {
            UNKNOWN_CAMERA.to_string()
        }
    };

    let encoder = match encoder {
        Ok(encoder) => encoder,
        Err(err) => {
            log::debug!("probe failed for {file_name}: {err}");
            return filename_guess();
        }
    };

    if !encoder.to_uppercase().contains(CAMERA_MARKER) {
        return filename_guess();
    }

    // Uppercasing matched but the original case did not, e.g. "dji avata".
    let Some(pos) = encoder.find(CAMERA_MARKER) else {
        return CAMERA_MARKER.to_string();
    };
    encoder[pos + CAMERA_MARKER.len()..].trim().to_string()
}

#[derive(Default)]
pub struct MetadataResolver {
    dates: DateResolver,
}

impl MetadataResolver {
    pub fn new(dates: DateResolver) -> Self {
        Self { dates }
    }

    pub fn resolve<P: ContainerProbe + ?Sized>(
        &self,
        path: &Path,
        file_name: &str,
        info: &StreamInfo,
        probe: &P,
    ) -> VideoMetadata {
        VideoMetadata {
            resolution: info.resolution(),
            duration_secs: info.duration_secs(),
            camera_type: camera_type(file_name, probe.encoder_description(path)),
            date_created: self.dates.resolve(path, file_name),
        }
    }
}
