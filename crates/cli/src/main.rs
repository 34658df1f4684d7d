use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use footscan_core::metadata::MetadataResolver;
use footscan_core::probe::{FfprobeProbe, DEFAULT_PROBE_TIMEOUT};
use footscan_core::report::{report_file_name, ReportWriter};
use footscan_core::scan::{
    scan_directory_with_progress, ScanConfig, ScanContext, ScanEvent, DEFAULT_VIDEO_SUFFIX,
};
use footscan_core::tags::Detector;
use footscan_core::video::FfmpegOpener;
use footscan_core::{Error, SampleSpec, DEFAULT_SAMPLE_INTERVAL_SECS};
use tracing_subscriber::prelude::*;

fn main() {
    init_logging();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Scan(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return;
        }
        Ok(Command::Usage) => {
            print_help();
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = real_main(args) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,footscan=info,footscan_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    dir: String,
    interval: f64,
    suffix: String,
    ignore_case: bool,
    model: PathBuf,
    confidence: Option<f32>,
    out: Option<PathBuf>,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl Args {
    fn new(dir: String) -> Self {
        Self {
            dir,
            interval: DEFAULT_SAMPLE_INTERVAL_SECS,
            suffix: DEFAULT_VIDEO_SUFFIX.to_string(),
            ignore_case: false,
            model: PathBuf::from("yolov8n.onnx"),
            confidence: None,
            out: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Scan(Args),
    Help,
    Usage,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> footscan_core::Result<Command> {
    let mut args = args.into_iter();
    let mut positional = Vec::new();
    let mut interval = None;
    let mut suffix = None;
    let mut ignore_case = false;
    let mut model = None;
    let mut confidence = None;
    let mut out = None;
    let mut ffmpeg = None;
    let mut ffprobe = None;
    let mut probe_timeout = None;

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| Error::InvalidArgument(format!("missing value for {name}")))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--interval" => interval = Some(parse_number::<f64>("--interval", &value("--interval")?)?),
            "--suffix" => suffix = Some(value("--suffix")?),
            "--ignore-case" => ignore_case = true,
            "--model" => model = Some(PathBuf::from(value("--model")?)),
            "--confidence" => {
                confidence = Some(parse_number::<f32>("--confidence", &value("--confidence")?)?)
            }
            "--out" => out = Some(PathBuf::from(value("--out")?)),
            "--ffmpeg" => ffmpeg = Some(PathBuf::from(value("--ffmpeg")?)),
            "--ffprobe" => ffprobe = Some(PathBuf::from(value("--ffprobe")?)),
            "--probe-timeout" => {
                let secs = parse_number::<f64>("--probe-timeout", &value("--probe-timeout")?)?;
                probe_timeout = Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                    Error::InvalidArgument(format!("invalid --probe-timeout: {secs}"))
                })?);
            }
            _ if arg.starts_with("--") => {
                return Err(Error::InvalidArgument(format!("unknown arg: {arg}")));
            }
            _ => positional.push(arg),
        }
    }

    if positional.len() != 1 {
        return Ok(Command::Usage);
    }

    let mut parsed = Args::new(positional.remove(0));
    if let Some(v) = interval {
        parsed.interval = v;
    }
    if let Some(v) = suffix {
        parsed.suffix = v;
    }
    if let Some(v) = model {
        parsed.model = v;
    }
    if let Some(v) = ffmpeg {
        parsed.ffmpeg = v;
    }
    if let Some(v) = ffprobe {
        parsed.ffprobe = v;
    }
    if let Some(v) = probe_timeout {
        parsed.probe_timeout = v;
    }
    parsed.ignore_case = ignore_case;
    parsed.confidence = confidence;
    parsed.out = out;
    Ok(Command::Scan(parsed))
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> footscan_core::Result<T> {
    raw.parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid {name}: {raw}")))
}

fn real_main(args: Args) -> footscan_core::Result<()> {
    let mut cfg = ScanConfig::for_folder(&args.dir);
    cfg.video_suffix = args.suffix.clone();
    cfg.suffix_case_sensitive = !args.ignore_case;
    cfg.sample = SampleSpec::new(args.interval)?;
    if !cfg.root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            args.dir
        )));
    }

    let mut detector = load_detector(&args)?;

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(report_file_name(&args.dir)));
    let mut report = ReportWriter::new(File::create(&out_path)?)?;

    let opener = FfmpegOpener {
        ffmpeg: args.ffmpeg.clone(),
        ffprobe: args.ffprobe.clone(),
        probe_timeout: args.probe_timeout,
    };
    let probe = FfprobeProbe {
        ffprobe: args.ffprobe.clone(),
        timeout: args.probe_timeout,
    };
    let metadata = MetadataResolver::default();

    let ctx = ScanContext {
        opener: &opener,
        probe: &probe,
        detector: detector.as_mut(),
        sink: &mut report,
        metadata: &metadata,
    };
    let res = scan_directory_with_progress(&cfg, ctx, print_event)?;
    let rows = report.rows();
    report.finish()?;

    println!(
        "files_seen: {}, recorded: {}, skipped: {}, frames_sampled: {}, frames_failed: {}",
        res.stats.files_seen,
        res.stats.files_recorded,
        res.stats.files_skipped,
        res.stats.frames_sampled,
        res.stats.frames_failed
    );
    println!("Wrote {rows} rows to {}", out_path.display());
    Ok(())
}

fn print_event(event: &ScanEvent<'_>) {
    match event {
        ScanEvent::Started { root } => println!("Scanning directory: {}", root.display()),
        ScanEvent::Processing { file_name } => println!("Processing: {file_name}"),
        ScanEvent::OpenFailed { file_name, error } => {
            println!("Failed to open: {file_name} ({error})")
        }
        ScanEvent::Sampling {
            fps,
            frame_count,
            frame_skip,
            ..
        } => println!(
            "Video FPS: {fps}, Total frames: {frame_count}, Sampling every {frame_skip} frames"
        ),
        ScanEvent::FrameFailed {
            file_name,
            frame_index,
            error,
        } => println!("Detection failed on frame {frame_index} of {file_name}: {error}"),
        ScanEvent::StreamInterrupted {
            file_name,
            frames_read,
            error,
        } => println!("Stopped reading {file_name} after {frames_read} frames: {error}"),
        ScanEvent::Recorded { record } => println!(
            "Metadata for {}: Resolution={}, Length={:.2}s, Camera={}, Date={}, Tags={}",
            record.file_name,
            record.resolution,
            record.duration_secs,
            record.camera_type,
            record.date_created_display(),
            record.tags
        ),
    }
}

#[cfg(feature = "onnx")]
fn load_detector(args: &Args) -> footscan_core::Result<Box<dyn Detector>> {
    use footscan_core::detector::{YoloConfig, YoloDetector};

    let mut config = YoloConfig::default();
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }
    Ok(Box::new(YoloDetector::from_file(&args.model, config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(args: &Args) -> footscan_core::Result<Box<dyn Detector>> {
    log::warn!(
        "built without the `onnx` feature, ignoring model {}; every video will be tagged `none`",
        args.model.display()
    );
    Ok(Box::new(footscan_core::tags::NoDetector))
}

fn print_help() {
    println!(
        r#"footscan

USAGE:
  footscan <dir> [options]

Scans <dir> for video files and writes one CSV row per video with its
resolution, length, camera type, creation date and detected objects.

OPTIONS:
  --interval <secs>       Seconds of footage between sampled frames (default 10)
  --suffix <suffix>       File name suffix to scan (default .MP4)
  --ignore-case           Match the suffix case-insensitively
  --model <path>          YOLOv8 ONNX model (default yolov8n.onnx)
  --confidence <score>    Minimum detection score (default 0.25)
  --out <path>            Report path (default derived from <dir>)
  --ffmpeg <path>         ffmpeg binary (default ffmpeg)
  --ffprobe <path>        ffprobe binary (default ffprobe)
  --probe-timeout <secs>  Limit for each ffprobe call (default 30)

NOTES:
  - The suffix match is exact-case unless --ignore-case is given.
  - RUST_LOG controls diagnostic logging on stderr.
"#
    );
}
