pub mod accessory;
pub mod cli;
pub mod cpuinfo;
pub mod error;
pub mod rapl;
pub mod sampler;
pub mod timer;
pub mod topology;

pub use error::{Error, Result};
pub use sampler::{Phase, Sampler, SamplerConfig, SessionTags};

use log::warn;
use std::fs;
use std::path::Path;

/// Read a sysfs attribute, trimmed of its trailing newline.
///
/// # Errors
/// `Error::Read` naming the path if the file can't be read.
pub fn read_sysfs_string(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|content| content.trim().to_owned())
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a sysfs attribute holding a single unsigned integer.
///
/// # Errors
/// `Error::Read` if the file can't be read, `Error::Parse` if it doesn't hold a number.
pub fn read_sysfs_u64(path: &Path) -> Result<u64> {
    let content = read_sysfs_string(path)?;
    content.parse().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        content,
    })
}

/// Number of logical cores configured on this host, 0 if unknown.
#[must_use]
pub fn core_count() -> usize {
    use sysconf::raw::{sysconf, SysconfVariable};
    match sysconf(SysconfVariable::ScNprocessorsConf) {
        Ok(count) => usize::try_from(count).unwrap_or(0),
        Err(_) => {
            warn!("Failed to query processor count");
            0
        }
    }
}
