use crate::read_sysfs_u64;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;

pub const CPU_DIR: &str = "/sys/devices/system/cpu";

/// Logical cores grouped by physical package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// Number of logical cores found
    pub cores: usize,
    /// Package id -> first logical core seen in that package
    pub packages: BTreeMap<u64, usize>,
}

impl Topology {
    /// Read the package id of each logical core under `cpu_dir`, stopping at the
    /// first core without one. `max_cores` bounds the scan, 0 leaves it open.
    #[must_use]
    pub fn detect(cpu_dir: &Path, max_cores: usize) -> Self {
        let mut topology = Self::default();
        for core in 0.. {
            if max_cores > 0 && core >= max_cores {
                break;
            }
            let path = cpu_dir.join(format!("cpu{core}/topology/physical_package_id"));
            let package = match read_sysfs_u64(&path) {
                Ok(package) => package,
                Err(e) => {
                    debug!("Topology scan ends at core {core}: {e}");
                    break;
                }
            };
            debug!("core {core} in package {package}");
            topology.packages.entry(package).or_insert(core);
            topology.cores = core + 1;
        }
        info!(
            "Detected {} cores in {} packages",
            topology.cores,
            topology.package_count()
        );
        topology
    }

    #[must_use]
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}
