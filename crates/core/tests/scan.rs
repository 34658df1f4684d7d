use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use footscan_core::metadata::MetadataResolver;
use footscan_core::probe::ContainerProbe;
use footscan_core::report::{ReportWriter, REPORT_HEADER};
use footscan_core::scan::{
    scan_directory, scan_directory_with_progress, ScanConfig, ScanContext, ScanEvent,
};
use footscan_core::tags::{Detector, NoDetector};
use footscan_core::video::{VideoHandle, VideoOpener};
use footscan_core::{Detection, Error, Result, StreamInfo, VideoRecord};
use image::{Rgb, RgbImage};

/// Serves synthetic frames for known file names; anything else fails to open.
struct FakeOpener {
    videos: HashMap<String, FakeVideo>,
}

#[derive(Clone, Copy)]
struct FakeVideo {
    info: StreamInfo,
    /// Frame index at which decoding breaks, if any.
    fail_at: Option<u64>,
}

struct FakeHandle {
    video: FakeVideo,
    next: u64,
}

impl VideoOpener for FakeOpener {
    type Handle = FakeHandle;

    fn open(&self, path: &Path) -> Result<FakeHandle> {
        let name = path.file_name().unwrap().to_str().unwrap();
        match self.videos.get(name) {
            Some(video) => Ok(FakeHandle {
                video: *video,
                next: 0,
            }),
            None => Err(Error::Open {
                path: path.to_path_buf(),
                reason: "moov atom not found".to_string(),
            }),
        }
    }
}

impl VideoHandle for FakeHandle {
    fn info(&self) -> StreamInfo {
        self.video.info
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if Some(self.next) == self.video.fail_at {
            return Err(Error::Decode("invalid NAL unit".to_string()));
        }
        if self.next >= self.video.info.frame_count {
            return Ok(None);
        }
        // The red channel carries the frame index modulo 256.
        let frame = RgbImage::from_pixel(4, 4, Rgb([(self.next % 256) as u8, 0, 0]));
        self.next += 1;
        Ok(Some(frame))
    }
}

/// Reports a "person" in every frame and a "boat" when the red channel is odd.
struct PixelDetector {
    calls: u64,
    fail_on_red: Option<u8>,
}

impl Detector for PixelDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        let red = frame.get_pixel(0, 0).0[0];
        if Some(red) == self.fail_on_red {
            return Err(Error::Detector("inference failed".to_string()));
        }
        let mut out = vec![Detection::new(0, "person"), Detection::new(0, "person")];
        if red % 2 == 1 {
            out.push(Detection::new(8, "boat"));
        }
        Ok(out)
    }
}

struct FailingProbe;

impl ContainerProbe for FailingProbe {
    fn encoder_description(&self, _path: &Path) -> Result<String> {
        Err(Error::Probe("ffprobe exited with 1".to_string()))
    }
}

struct EncoderProbe(&'static str);

impl ContainerProbe for EncoderProbe {
    fn encoder_description(&self, _path: &Path) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("footscan-it-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"\0\0\0\x18ftypmp42").unwrap();
}

fn video(fps: f64, frame_count: u64) -> FakeVideo {
    FakeVideo {
        info: StreamInfo {
            fps,
            frame_count,
            width: 3840,
            height: 2160,
        },
        fail_at: None,
    }
}

const DJI_NAME: &str = "DJI_20240802161422_0005_D.MP4";

#[test]
fn dji_clip_end_to_end() {
    let dir = temp_dir("e2e");
    touch(&dir, DJI_NAME);

    let opener = FakeOpener {
        videos: HashMap::from([(DJI_NAME.to_string(), video(30.0, 300))]),
    };
    let mut detector = PixelDetector {
        calls: 0,
        fail_on_red: None,
    };
    let mut report = ReportWriter::new(Vec::new()).unwrap();
    let metadata = MetadataResolver::default();

    let res = scan_directory(
        &ScanConfig::for_folder(&dir),
        ScanContext {
            opener: &opener,
            probe: &FailingProbe,
            detector: &mut detector,
            sink: &mut report,
            metadata: &metadata,
        },
    )
    .unwrap();

    // frame_skip is 300, so only frame 0 reaches the detector
    assert_eq!(detector.calls, 1);
    assert_eq!(res.stats.frames_sampled, 1);
    assert_eq!(res.records.len(), 1);

    let text = String::from_utf8(report.finish().unwrap()).unwrap();
    assert_eq!(
        text,
        format!(
            "{REPORT_HEADER}\n{DJI_NAME},3840x2160,10.00,DJI,2024-08-02 16:14:22,person\n"
        )
    );
}

#[test]
fn unopenable_file_is_skipped() {
    let dir = temp_dir("skip");
    touch(&dir, DJI_NAME);
    touch(&dir, "CORRUPT_0001.MP4");

    let opener = FakeOpener {
        videos: HashMap::from([(DJI_NAME.to_string(), video(30.0, 300))]),
    };
    let mut report = ReportWriter::new(Vec::new()).unwrap();
    let metadata = MetadataResolver::default();
    let mut open_failures = Vec::new();

    let res = scan_directory_with_progress(
        &ScanConfig::for_folder(&dir),
        ScanContext {
            opener: &opener,
            probe: &FailingProbe,
            detector: &mut NoDetector,
            sink: &mut report,
            metadata: &metadata,
        },
        |event| {
            if let ScanEvent::OpenFailed { file_name, .. } = event {
                open_failures.push(file_name.to_string());
            }
        },
    )
    .unwrap();

    assert_eq!(open_failures, vec!["CORRUPT_0001.MP4".to_string()]);
    assert_eq!(res.stats.files_seen, 2);
    assert_eq!(res.stats.files_skipped, 1);
    assert_eq!(res.stats.files_recorded, 1);

    let text = String::from_utf8(report.finish().unwrap()).unwrap();
    let rows: Vec<&str> = text.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with(DJI_NAME));
    assert!(rows[0].ends_with(",none"));
}

#[test]
fn only_exact_suffix_is_scanned_by_default() {
    let dir = temp_dir("suffix");
    for name in ["A.MP4", "b.mp4", "c.MOV", "notes.txt"] {
        touch(&dir, name);
    }
    fs::create_dir_all(dir.join("nested.MP4")).unwrap();

    let opener = FakeOpener {
        videos: ["A.MP4", "b.mp4", "c.MOV"]
            .into_iter()
            .map(|n| (n.to_string(), video(25.0, 50)))
            .collect(),
    };
    let metadata = MetadataResolver::default();

    let mut records: Vec<VideoRecord> = Vec::new();
    let res = scan_directory(
        &ScanConfig::for_folder(&dir),
        ScanContext {
            opener: &opener,
            probe: &FailingProbe,
            detector: &mut NoDetector,
            sink: &mut records,
            metadata: &metadata,
        },
    )
    .unwrap();
    assert_eq!(res.stats.files_seen, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_name, "A.MP4");

    let mut cfg = ScanConfig::for_folder(&dir);
    cfg.suffix_case_sensitive = false;
    let mut records: Vec<VideoRecord> = Vec::new();
    scan_directory(
        &cfg,
        ScanContext {
            opener: &opener,
            probe: &FailingProbe,
            detector: &mut NoDetector,
            sink: &mut records,
            metadata: &metadata,
        },
    )
    .unwrap();
    let mut names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["A.MP4", "b.mp4"]);
}

#[test]
fn tags_survive_detector_and_decode_failures() {
    let dir = temp_dir("failures");
    let name = "GOPR0042.MP4";
    touch(&dir, name);

    // 1 fps with a 1s interval samples every frame; decoding breaks at frame 5.
    let mut clip = video(1.0, 10);
    clip.fail_at = Some(5);
    let opener = FakeOpener {
        videos: HashMap::from([(name.to_string(), clip)]),
    };
    let mut detector = PixelDetector {
        calls: 0,
        fail_on_red: Some(1),
    };
    let metadata = MetadataResolver::default();
    let mut cfg = ScanConfig::for_folder(&dir);
    cfg.sample = footscan_core::SampleSpec::new(1.0).unwrap();

    let mut frame_failures = Vec::new();
    let mut interrupted_after = None;
    let mut records: Vec<VideoRecord> = Vec::new();
    let res = scan_directory_with_progress(
        &cfg,
        ScanContext {
            opener: &opener,
            probe: &EncoderProbe("HEVC (High Efficiency Video Coding)"),
            detector: &mut detector,
            sink: &mut records,
            metadata: &metadata,
        },
        |event| match event {
            ScanEvent::FrameFailed { frame_index, .. } => frame_failures.push(*frame_index),
            ScanEvent::StreamInterrupted { frames_read, .. } => {
                interrupted_after = Some(*frames_read)
            }
            _ => {}
        },
    )
    .unwrap();

    assert_eq!(frame_failures, vec![1]);
    assert_eq!(interrupted_after, Some(5));
    assert_eq!(res.stats.frames_sampled, 5);
    assert_eq!(res.stats.frames_failed, 1);

    // frame 3 is the only odd frame left that the detector handled
    let record = &records[0];
    assert_eq!(record.tags.to_string(), "boat,person");
    assert_eq!(record.camera_type, "Unknown");
    assert_eq!(record.resolution, "3840x2160");
    assert!(record.date_created.is_some());
}

#[test]
fn dji_encoder_names_the_camera() {
    let dir = temp_dir("encoder");
    let name = "clip_0001.MP4";
    touch(&dir, name);

    let opener = FakeOpener {
        videos: HashMap::from([(name.to_string(), video(0.0, 3))]),
    };
    let metadata = MetadataResolver::default();
    let mut records: Vec<VideoRecord> = Vec::new();
    let res = scan_directory(
        &ScanConfig::for_folder(&dir),
        ScanContext {
            opener: &opener,
            probe: &EncoderProbe("DJI Mini 4 Pro"),
            detector: &mut NoDetector,
            sink: &mut records,
            metadata: &metadata,
        },
    )
    .unwrap();

    assert_eq!(records[0].camera_type, "Mini 4 Pro");
    // unknown frame rate: every frame is sampled and the length is zero
    assert_eq!(res.stats.frames_sampled, 3);
    assert_eq!(records[0].duration_secs, 0.0);
}

#[test]
fn missing_root_is_rejected() {
    let opener = FakeOpener {
        videos: HashMap::new(),
    };
    let metadata = MetadataResolver::default();
    let mut records: Vec<VideoRecord> = Vec::new();
    let err = scan_directory(
        &ScanConfig::for_folder("/nonexistent/footscan/root"),
        ScanContext {
            opener: &opener,
            probe: &FailingProbe,
            detector: &mut NoDetector,
            sink: &mut records,
            metadata: &metadata,
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
