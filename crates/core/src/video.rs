use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use image::RgbImage;

use crate::error::{Error, Result};
use crate::models::StreamInfo;
use crate::probe::{probe_stream_info, DEFAULT_PROBE_TIMEOUT};

/// An open video, read strictly front to back. Dropping it releases the
/// underlying decoder.
pub trait VideoHandle {
    fn info(&self) -> StreamInfo;

    /// `Ok(None)` marks a clean end of stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

pub trait VideoOpener {
    type Handle: VideoHandle;

    fn open(&self, path: &Path) -> Result<Self::Handle>;
}

/// Decodes through an `ffmpeg` child that writes packed rgb24 frames to a pipe.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub probe_timeout: Duration,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl VideoOpener for FfmpegOpener {
    type Handle = FfmpegHandle;

    fn open(&self, path: &Path) -> Result<FfmpegHandle> {
        let open_err = |reason: String| Error::Open {
            path: path.to_path_buf(),
            reason,
        };

        let info = probe_stream_info(&self.ffprobe, path, self.probe_timeout)
            .map_err(|e| open_err(e.to_string()))?;

        log::debug!("decoding {} with {}", path.display(), self.ffmpeg.display());
        // Frames keep their coded orientation so they match the probed size.
        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn {}: {e}", self.ffmpeg.display())))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(open_err("ffmpeg stdout not captured".to_string()));
        };

        Ok(FfmpegHandle {
            child,
            stdout: BufReader::new(stdout),
            frame_len: info.width as usize * info.height as usize * 3,
            info,
            finished: false,
        })
    }
}

pub struct FfmpegHandle {
    child: Child,
    stdout: BufReader<ChildStdout>,
    info: StreamInfo,
    frame_len: usize,
    finished: bool,
}

impl VideoHandle for FfmpegHandle {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let filled = match read_full(&mut self.stdout, &mut buf) {
            Ok(n) => n,
            Err(err) => {
                self.finished = true;
                return Err(err.into());
            }
        };

        if filled == 0 {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(Error::Decode(format!("ffmpeg exited with {status}")));
            }
            return Ok(None);
        }

        if filled < self.frame_len {
            self.finished = true;
            return Err(Error::Decode(format!(
                "truncated frame: {filled} of {} bytes",
                self.frame_len
            )));
        }

        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| Error::Decode("frame buffer does not match stream size".to_string()))
    }
}

impl Drop for FfmpegHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
