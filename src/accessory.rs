use crate::read_sysfs_u64;
use glob::{glob, Pattern};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

// Each devfreq device (GPU, memory bus...) has a directory here with its
// current operating frequency in Hz.
pub const DEVFREQ_DIR: &str = "/sys/class/devfreq";
const FREQ_FILE: &str = "cur_freq";

/// The device frequency column of the log.
///
/// A read failure is logged and the last good value is reported again.
#[derive(Debug, Clone)]
pub struct FrequencySource {
    path: Option<PathBuf>,
    last: Option<u64>,
}

impl FrequencySource {
    /// A source without a backing file always reports 0.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        match &path {
            Some(p) => info!("Device frequency read from {}", p.display()),
            None => warn!("No device frequency source, the Freq column will be 0"),
        }
        Self { path, last: None }
    }

    /// Find the frequency file of the `device`-th devfreq device under `root`,
    /// devices being taken in name order.
    #[must_use]
    pub fn locate(root: &Path, device: usize) -> Option<PathBuf> {
        let pattern = format!("{}/*/{FREQ_FILE}", Pattern::escape(&root.to_string_lossy()));
        let paths = match glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                error!("Bad devfreq pattern {pattern}: {e}");
                return None;
            }
        };
        let mut paths: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).collect();
        paths.sort();
        paths.into_iter().nth(device)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read(&mut self) -> u64 {
        let Some(path) = &self.path else {
            return 0;
        };
        match read_sysfs_u64(path) {
            Ok(freq) => {
                self.last = Some(freq);
                freq
            }
            Err(e) => {
                warn!("Device frequency: {e}, reporting previous value");
                self.last.unwrap_or(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_device(root: &Path, name: &str, freq: u64) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(FREQ_FILE);
        fs::write(&path, format!("{freq}\n")).unwrap();
        path
    }

    #[test]
    fn test_locate_by_device_index() {
        let root = tempfile::tempdir().unwrap();
        let gpu = make_device(root.path(), "3d00000.gpu", 585_000_000);
        let bus = make_device(root.path(), "soc:qcom,cpubw", 762);

        assert_eq!(FrequencySource::locate(root.path(), 0), Some(gpu));
        assert_eq!(FrequencySource::locate(root.path(), 1), Some(bus));
        assert_eq!(FrequencySource::locate(root.path(), 2), None);
    }

    #[test]
    fn test_read_reports_stale_value_on_failure() {
        let root = tempfile::tempdir().unwrap();
        let path = make_device(root.path(), "gpu", 300);
        let mut source = FrequencySource::new(Some(path.clone()));
        assert_eq!(source.read(), 300);

        fs::write(&path, "busy").unwrap();
        assert_eq!(source.read(), 300);

        fs::write(&path, "450\n").unwrap();
        assert_eq!(source.read(), 450);
    }

    #[test]
    fn test_missing_source_reads_zero() {
        let mut source = FrequencySource::new(None);
        assert_eq!(source.read(), 0);
        assert!(source.path().is_none());
    }
}
