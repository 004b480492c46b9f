use super::record::Record;
use super::SessionTags;
use crate::error::{Error, Result};
use chrono::{DateTime, Local, SecondsFormat};
use log::{info, trace};
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

/// One measurement run, from `start` to `stop`, writing to the output log.
#[derive(Debug)]
pub struct Session {
    pub label: String,
    pub tags: SessionTags,
    pub interval_ms: u64,
    /// Index of the next row to be written
    pub tick: u64,
    pub started_at: DateTime<Local>,
    path: PathBuf,
    log: LineWriter<File>,
}

impl Session {
    /// Open the output log for a new session.
    ///
    /// The first session truncates the file and writes `header`, later
    /// sessions append to whatever is there.
    pub fn open(
        path: &Path,
        header: Option<&str>,
        label: &str,
        tags: SessionTags,
        interval_ms: u64,
    ) -> Result<Self> {
        let output_error = |source| Error::Output {
            path: path.to_path_buf(),
            source,
        };

        let mut options = OpenOptions::new();
        options.create(true);
        if header.is_some() {
            trace!("Creating log file {path:?}");
            options.write(true).truncate(true);
        } else {
            trace!("Appending to log file {path:?}");
            options.append(true);
        }
        let mut log = LineWriter::new(options.open(path).map_err(output_error)?);
        if let Some(header) = header {
            writeln!(log, "{header}").map_err(output_error)?;
        }

        Ok(Self {
            label: label.to_owned(),
            tags,
            interval_ms,
            tick: 0,
            started_at: Local::now(),
            path: path.to_path_buf(),
            log,
        })
    }

    /// Write one row and advance the tick index.
    pub fn write_row(&mut self, freq: u64, rates: &[f64]) -> io::Result<()> {
        let record = Record {
            benchmark: &self.tags.benchmark,
            kernel: &self.label,
            freq_mode: self.tags.freq_mode,
            tick: self.tick,
            freq,
            bin_policy: self.tags.bin_policy,
            rates,
        };
        trace!("{record}");
        writeln!(self.log, "{record}")?;
        self.tick += 1;
        Ok(())
    }

    /// Flush and close the log. Returns the number of rows written.
    pub fn close(mut self) -> Result<u64> {
        self.log.flush().map_err(|source| Error::Output {
            path: self.path.clone(),
            source,
        })?;
        let elapsed = Local::now() - self.started_at;
        info!(
            "Session {} started {} ran {} ms, {} rows",
            self.label,
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            elapsed.num_milliseconds(),
            self.tick
        );
        Ok(self.tick)
        // File is closed when it goes out of scope
    }
}
