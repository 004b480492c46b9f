use crate::error::{Error, Result};
use crate::{read_sysfs_string, read_sysfs_u64};
use glob::{glob, Pattern};
use log::{debug, error, info, trace, warn};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

// The powercap tree has one directory per package, intel-rapl:<package>, holding
// the package energy counter. Sub-domains (core, uncore, dram...) are nested
// one level down as intel-rapl:<package>:<n>. The same layout is used on AMD.
pub const RAPL_DIR: &str = "/sys/class/powercap/intel-rapl";

const NAME_FILE: &str = "name";
const ENERGY_FILE: &str = "energy_uj";
const MAX_ENERGY_FILE: &str = "max_energy_range_uj";

/// One energy counter exposed by powercap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub package: usize,
    /// `None` for the package zone itself
    pub subdomain: Option<usize>,
    pub name: String,
    pub energy_path: PathBuf,
    /// Value at which the counter wraps back to zero, in µJ
    pub max_energy_range: Option<u64>,
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.subdomain {
            Some(sub) => write!(f, "intel-rapl:{}:{} {}", self.package, sub, self.name),
            None => write!(f, "intel-rapl:{} {}", self.package, self.name),
        }
    }
}

/// The set of domains found on this host.
///
/// Domains are ordered by package, then package zone before its sub-domains,
/// then sub-domain index. Every per-domain list in the crate follows this order.
#[derive(Debug, Clone)]
pub struct RAPL {
    domains: Vec<Domain>,
}

/// Counter values for every domain, in discovery order.
///
/// `None` marks a domain that hasn't been read successfully yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    readings: Vec<Option<u64>>,
}

impl Snapshot {
    #[must_use]
    pub fn unread(len: usize) -> Self {
        Self {
            readings: vec![None; len],
        }
    }

    #[must_use]
    pub fn readings(&self) -> &[Option<u64>] {
        &self.readings
    }
}

impl From<Vec<Option<u64>>> for Snapshot {
    fn from(readings: Vec<Option<u64>>) -> Self {
        Self { readings }
    }
}

impl RAPL {
    /// Walk the powercap tree under `root`.
    ///
    /// Packages are probed from 0 upwards and the walk stops at the first
    /// package without a zone, so a gap hides every package above it.
    /// `package_limit` bounds the walk when the package count is known.
    /// Within a package every sub-domain present is kept, gaps in the
    /// sub-domain numbering are skipped.
    ///
    /// # Errors
    /// `Error::Discovery` if package 0 has no readable zone name.
    pub fn discover(root: &Path, package_limit: Option<usize>) -> Result<Self> {
        let mut domains = Vec::new();
        for package in 0.. {
            if package_limit.is_some_and(|limit| package >= limit) {
                trace!("RAPL: package limit {package} reached");
                break;
            }
            let zone = root.join(format!("intel-rapl:{package}"));
            let name = match read_sysfs_string(&zone.join(NAME_FILE)) {
                Ok(name) => name,
                Err(Error::Read { path, source }) if package == 0 => {
                    error!("Could not open {}", path.display());
                    return Err(Error::Discovery { path, source });
                }
                Err(e) => {
                    debug!("RAPL: no zone for package {package}, stopping discovery ({e})");
                    break;
                }
            };
            domains.push(Domain::new(package, None, name, &zone));

            for (sub, sub_zone) in subdomain_zones(&zone, package) {
                match read_sysfs_string(&sub_zone.join(NAME_FILE)) {
                    Ok(name) => domains.push(Domain::new(package, Some(sub), name, &sub_zone)),
                    Err(e) => debug!("RAPL: skipping sub-domain {package}:{sub}: {e}"),
                }
            }
        }

        for domain in &domains {
            info!("RAPL domain: {domain}");
        }
        Ok(Self { domains })
    }

    #[must_use]
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Read every counter into a fresh snapshot.
    #[must_use]
    pub fn baseline(&self) -> Snapshot {
        let mut snapshot = Snapshot::unread(self.len());
        self.refresh(&mut snapshot);
        snapshot
    }

    /// Re-read every counter into `snapshot`.
    ///
    /// A counter that can't be read is logged and keeps its previous value.
    /// Returns the number of failed reads.
    pub fn refresh(&self, snapshot: &mut Snapshot) -> usize {
        let mut failures = 0;
        for (domain, reading) in self.domains.iter().zip(snapshot.readings.iter_mut()) {
            match read_sysfs_u64(&domain.energy_path) {
                Ok(value) => *reading = Some(value),
                Err(e) => {
                    warn!("RAPL: {e}, keeping previous value for {}", domain.name);
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Energy rate of every domain between two snapshots, in µJ per millisecond.
    ///
    /// The delta is divided by the nominal interval, not the measured time
    /// between the reads. Domains missing a reading on either side report 0.
    #[must_use]
    pub fn rates(&self, before: &Snapshot, after: &Snapshot, interval_ms: u64) -> Vec<f64> {
        let interval_ms = interval_ms as f64;
        self.domains
            .iter()
            .zip(before.readings.iter().zip(after.readings.iter()))
            .map(|(domain, pair)| match pair {
                (Some(before), Some(after)) => {
                    match energy_delta(*before, *after, domain.max_energy_range) {
                        Some(delta) => delta as f64 / interval_ms,
                        None => {
                            warn!("RAPL: {} went backwards with no known range", domain.name);
                            0.0
                        }
                    }
                }
                _ => 0.0,
            })
            .collect()
    }
}

impl Domain {
    fn new(package: usize, subdomain: Option<usize>, name: String, zone: &Path) -> Self {
        let max_energy_range = read_sysfs_u64(&zone.join(MAX_ENERGY_FILE)).ok();
        Self {
            package,
            subdomain,
            name,
            energy_path: zone.join(ENERGY_FILE),
            max_energy_range,
        }
    }
}

/// Energy consumed between two counter readings, accounting for one wrap.
///
/// Returns `None` when the counter went backwards and the wrap point is unknown.
#[must_use]
pub fn energy_delta(before: u64, after: u64, max_energy_range: Option<u64>) -> Option<u64> {
    if after >= before {
        Some(after - before)
    } else {
        max_energy_range
            .and_then(|range| range.checked_sub(before))
            .map(|to_wrap| to_wrap + after)
    }
}

/// Sub-domain zones of a package, sorted by sub-domain index.
fn subdomain_zones(zone: &Path, package: usize) -> Vec<(usize, PathBuf)> {
    let pattern = format!(
        "{}/intel-rapl:{package}:*",
        Pattern::escape(&zone.to_string_lossy())
    );
    let paths = match glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            error!("Bad RAPL sub-domain pattern {pattern}: {e}");
            return Vec::new();
        }
    };

    let mut zones: Vec<(usize, PathBuf)> = paths
        .filter_map(|path| match path {
            Ok(p) => subdomain_from_path(&p).map(|sub| (sub, p)),
            Err(e) => {
                error!("Failed to load RAPL path: {e}");
                None
            }
        })
        .collect();
    zones.sort_by_key(|(sub, _)| *sub);
    zones
}

/// Parse a sub-domain zone path, `.../intel-rapl:<package>:<sub>`, and extract `<sub>`.
#[must_use]
pub fn subdomain_from_path(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .split(':')
        .nth(2)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_zone(dir: &Path, name: &str, energy: u64) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(NAME_FILE), format!("{name}\n")).unwrap();
        fs::write(dir.join(ENERGY_FILE), format!("{energy}\n")).unwrap();
    }

    fn package_dir(root: &Path, package: usize) -> PathBuf {
        root.join(format!("intel-rapl:{package}"))
    }

    fn sub_dir(root: &Path, package: usize, sub: usize) -> PathBuf {
        package_dir(root, package).join(format!("intel-rapl:{package}:{sub}"))
    }

    #[test]
    fn test_discover_packages_and_subdomains() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 100);
        make_zone(&sub_dir(root.path(), 0, 0), "core", 10);
        make_zone(&sub_dir(root.path(), 0, 1), "uncore", 20);
        make_zone(&package_dir(root.path(), 1), "package-1", 200);
        make_zone(&sub_dir(root.path(), 1, 0), "core", 30);

        let rapl = RAPL::discover(root.path(), None).unwrap();
        let names: Vec<&str> = rapl.domains().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["package-0", "core", "uncore", "package-1", "core"]);
        assert_eq!(rapl.domains()[2].subdomain, Some(1));
        assert_eq!(rapl.domains()[3].package, 1);
        assert_eq!(rapl.domains()[3].subdomain, None);
    }

    #[test]
    fn test_discovery_stops_at_missing_package() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 1);
        make_zone(&package_dir(root.path(), 1), "package-1", 1);
        make_zone(&package_dir(root.path(), 3), "package-3", 1);

        let rapl = RAPL::discover(root.path(), Some(4)).unwrap();
        assert_eq!(rapl.len(), 2);
        assert!(rapl.domains().iter().all(|d| d.package < 2));
    }

    #[test]
    fn test_discovery_respects_package_limit() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 1);
        make_zone(&package_dir(root.path(), 1), "package-1", 1);

        let rapl = RAPL::discover(root.path(), Some(1)).unwrap();
        assert_eq!(rapl.len(), 1);
    }

    #[test]
    fn test_sparse_subdomains_are_kept() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 1);
        make_zone(&sub_dir(root.path(), 0, 0), "core", 1);
        // sub-domain 1 exists but has no name
        fs::create_dir_all(sub_dir(root.path(), 0, 1)).unwrap();
        make_zone(&sub_dir(root.path(), 0, 2), "dram", 1);

        let rapl = RAPL::discover(root.path(), None).unwrap();
        let subs: Vec<Option<usize>> = rapl.domains().iter().map(|d| d.subdomain).collect();
        assert_eq!(subs, [None, Some(0), Some(2)]);
    }

    #[test]
    fn test_missing_package_zero_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            RAPL::discover(root.path(), None),
            Err(Error::Discovery { .. })
        ));
    }

    #[test]
    fn test_refresh_keeps_stale_value_on_failure() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 100);
        make_zone(&sub_dir(root.path(), 0, 0), "core", 50);
        let rapl = RAPL::discover(root.path(), None).unwrap();

        let mut snapshot = rapl.baseline();
        assert_eq!(snapshot.readings(), [Some(100), Some(50)]);

        fs::remove_file(sub_dir(root.path(), 0, 0).join(ENERGY_FILE)).unwrap();
        fs::write(package_dir(root.path(), 0).join(ENERGY_FILE), "150").unwrap();
        assert_eq!(rapl.refresh(&mut snapshot), 1);
        assert_eq!(snapshot.readings(), [Some(150), Some(50)]);
    }

    #[test]
    fn test_rates_divide_by_interval() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 0);
        make_zone(&sub_dir(root.path(), 0, 0), "core", 0);
        let rapl = RAPL::discover(root.path(), None).unwrap();

        let before = Snapshot::from(vec![Some(1_000), Some(500)]);
        let after = Snapshot::from(vec![Some(1_750), Some(500)]);
        assert_eq!(rapl.rates(&before, &after, 10), [75.0, 0.0]);

        let after = Snapshot::from(vec![Some(1_003), Some(501)]);
        assert_eq!(rapl.rates(&before, &after, 7), [3.0 / 7.0, 1.0 / 7.0]);
    }

    #[test]
    fn test_rates_for_unread_domain_are_zero() {
        let root = tempfile::tempdir().unwrap();
        make_zone(&package_dir(root.path(), 0), "package-0", 0);
        let rapl = RAPL::discover(root.path(), None).unwrap();

        let before = Snapshot::unread(1);
        let after = Snapshot::from(vec![Some(1_000)]);
        assert_eq!(rapl.rates(&before, &after, 10), [0.0]);
    }

    #[test]
    fn test_energy_delta_wraps() {
        assert_eq!(energy_delta(10, 25, None), Some(15));
        assert_eq!(energy_delta(990, 5, Some(1_000)), Some(15));
        assert_eq!(energy_delta(990, 5, None), None);
    }

    #[test]
    fn test_max_energy_range_is_read() {
        let root = tempfile::tempdir().unwrap();
        let zone = package_dir(root.path(), 0);
        make_zone(&zone, "package-0", 0);
        fs::write(zone.join(MAX_ENERGY_FILE), "262143328850\n").unwrap();
        let rapl = RAPL::discover(root.path(), None).unwrap();
        assert_eq!(rapl.domains()[0].max_energy_range, Some(262_143_328_850));
    }

    #[test]
    fn test_subdomain_from_path() {
        let path = Path::new(RAPL_DIR).join("intel-rapl:1/intel-rapl:1:2");
        assert_eq!(subdomain_from_path(&path), Some(2));
        assert_eq!(subdomain_from_path(Path::new(RAPL_DIR)), None);
    }
}
