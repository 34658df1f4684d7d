use std::io::{BufWriter, Write};

use crate::error::Result;
use crate::models::VideoRecord;

pub const REPORT_HEADER: &str = "Video,Resolution,Length (s),Camera Type,Date Created,Tags";

/// Sink for finished rows.
pub trait RecordSink {
    fn write_record(&mut self, record: &VideoRecord) -> Result<()>;
}

/// Writes the fixed-column report. Fields are written as-is; the tag column
/// itself is a comma join.
pub struct ReportWriter<W: Write> {
    out: BufWriter<W>,
    rows: u64,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut out = BufWriter::new(inner);
        writeln!(out, "{REPORT_HEADER}")?;
        Ok(Self { out, rows: 0 })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes buffered rows and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: Write> RecordSink for ReportWriter<W> {
    fn write_record(&mut self, record: &VideoRecord) -> Result<()> {
        writeln!(self.out, "{}", format_row(record))?;
        self.rows += 1;
        Ok(())
    }
}

impl RecordSink for Vec<VideoRecord> {
    fn write_record(&mut self, record: &VideoRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

pub fn format_row(record: &VideoRecord) -> String {
    format!(
        "{},{},{:.2},{},{},{}",
        record.file_name,
        record.resolution,
        record.duration_secs,
        record.camera_type,
        record.date_created_display(),
        record.tags
    )
}

/// Report name derived from the scanned directory: `/mnt/footage/` becomes
/// `mnt-footage.csv`. Only `/` and the platform separator are flattened.
pub fn report_file_name(dir: &str) -> String {
    let flattened: String = dir
        .chars()
        .map(|c| {
            if c == '/' || c == std::path::MAIN_SEPARATOR {
                '-'
            } else {
                c
            }
        })
        .collect();
    format!("{}.csv", flattened.trim_matches('-'))
}
