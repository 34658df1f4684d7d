use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::models::StreamInfo;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the container's descriptive codec/encoder string.
pub trait ContainerProbe {
    fn encoder_description(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    pub ffprobe: PathBuf,
    pub timeout: Duration,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ContainerProbe for FfprobeProbe {
    fn encoder_description(&self, path: &Path) -> Result<String> {
        let output = run_ffprobe(&self.ffprobe, path, &["-show_streams"], self.timeout)?;
        encoder_from_output(&output)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_long_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
    pub nb_frames: Option<String>,
    pub duration: Option<String>,
}

/// Runs ffprobe with JSON output and kills it if it outlives `timeout`.
pub fn run_ffprobe(
    ffprobe: &Path,
    path: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<ProbeOutput> {
    log::debug!("running {} {:?} {}", ffprobe.display(), args, path.display());
    let mut child = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json"])
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Probe(format!("failed to spawn {}: {e}", ffprobe.display())))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Probe("ffprobe stdout not captured".to_string()))?;
    // Drain the pipe while waiting so a large JSON document cannot stall the child.
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return Err(Error::Timeout {
                tool: ffprobe.display().to_string(),
                timeout,
            });
        }
    };

    let stdout = reader
        .join()
        .map_err(|_| Error::Probe("ffprobe reader thread panicked".to_string()))??;
    if !status.success() {
        return Err(Error::Probe(format!(
            "{} exited with {status}",
            ffprobe.display()
        )));
    }

    Ok(serde_json::from_slice(&stdout)?)
}

pub fn encoder_from_output(output: &ProbeOutput) -> Result<String> {
    let stream = output
        .streams
        .first()
        .ok_or_else(|| Error::Probe("no streams in container".to_string()))?;
    stream
        .codec_long_name
        .clone()
        .ok_or_else(|| Error::Probe("stream has no codec_long_name".to_string()))
}

pub fn probe_stream_info(ffprobe: &Path, path: &Path, timeout: Duration) -> Result<StreamInfo> {
    let output = run_ffprobe(
        ffprobe,
        path,
        &["-show_streams", "-select_streams", "v:0"],
        timeout,
    )?;
    stream_info_from_output(&output)
}

pub fn stream_info_from_output(output: &ProbeOutput) -> Result<StreamInfo> {
    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::Probe("no video stream".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::Probe("video stream has no dimensions".to_string())),
    };

    let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .map(|rate| parse_frame_rate(rate))
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .or_else(|| {
            let duration = stream.duration.as_deref()?.trim().parse::<f64>().ok()?;
            (duration > 0.0 && fps > 0.0).then(|| (duration * fps).round() as u64)
        })
        .unwrap_or(0);

    Ok(StreamInfo {
        fps,
        frame_count,
        width,
        height,
    })
}

/// Parses ffprobe rates such as `30000/1001` or `25`. Unknown rates are 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    };
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
