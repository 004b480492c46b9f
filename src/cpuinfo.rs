use crate::error::{Error, Result};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Vendor {
    Intel,
    Amd,
    Other,
}

/// Processor identification of the first CPU listed in `/proc/cpuinfo`.
///
/// Only used to tell the user which processor the energy readings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    pub vendor: Vendor,
    pub family: Option<u32>,
    pub model: Option<u32>,
}

impl CpuInfo {
    /// # Errors
    /// `Error::Read` if the file can't be read.
    pub fn detect(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut vendor = None;
        let mut family = None;
        let mut model = None;
        for line in text.lines() {
            // The first processor block is enough
            if line.trim().is_empty() && vendor.is_some() {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "vendor_id" if vendor.is_none() => {
                    vendor = Some(match value {
                        "GenuineIntel" => Vendor::Intel,
                        "AuthenticAMD" => Vendor::Amd,
                        _ => Vendor::Other,
                    });
                }
                "cpu family" if family.is_none() => family = value.parse().ok(),
                "model" if model.is_none() => model = value.parse().ok(),
                _ => {}
            }
        }
        Self {
            vendor: vendor.unwrap_or(Vendor::Other),
            family,
            model,
        }
    }

    /// Name of the micro-architecture for processors known to expose RAPL.
    #[must_use]
    pub fn microarchitecture(&self) -> Option<&'static str> {
        match (self.vendor, self.family?) {
            (Vendor::Intel, 6) => intel_model_name(self.model?),
            (Vendor::Amd, 0x17) => Some("Zen/Zen 2"),
            (Vendor::Amd, 0x19) => Some("Zen 3/Zen 4"),
            (Vendor::Amd, 0x1a) => Some("Zen 5"),
            _ => None,
        }
    }
}

fn intel_model_name(model: u32) -> Option<&'static str> {
    let name = match model {
        42 => "Sandybridge",
        45 => "Sandybridge-EP",
        58 => "Ivybridge",
        62 => "Ivybridge-EP",
        60 | 69 | 70 => "Haswell",
        63 => "Haswell-EP",
        61 | 71 => "Broadwell",
        79 => "Broadwell-EP",
        86 => "Broadwell-DE",
        78 | 94 => "Skylake",
        85 => "Skylake-X",
        142 | 158 => "Kaby Lake",
        87 => "Knight's Landing",
        133 => "Knight's Mill",
        55 | 76 | 74 | 90 | 92 | 122 | 95 => "Atom",
        _ => return None,
    };
    Some(name)
}

impl Display for CpuInfo {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}", self.vendor)?;
        if let Some(family) = self.family {
            write!(f, " family {family}")?;
        }
        if let Some(model) = self.model {
            write!(f, " model {model}")?;
        }
        match self.microarchitecture() {
            Some(arch) => write!(f, " ({arch})"),
            None => write!(f, " (unsupported)"),
        }
    }
}
