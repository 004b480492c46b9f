use crate::rapl::RAPL_DIR;
use crate::sampler::{SamplerConfig, SessionTags};
use ::clap::Parser;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
  /*
    Global configuration variable, parsed once from the command line and the
    RAPL_* environment variables.

    Only the binaries read it. The library takes an explicit SamplerConfig
    built with Configuration::sampler_config().
  */

  pub static ref CONFIGURATION: Configuration = Configuration::new();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub benchmark: String,
    pub kernel: String,
    pub device: usize,
    pub freq_mode: i64,
    pub bin_policy: i64,
    pub min_freq: u64,
    pub max_freq: u64,
    pub step_freq: u64,
    pub interval_ms: u64,
    pub reset_interval_ms: u64,
    pub duration_secs: u64,
    pub sessions: u32,
    pub stats_dir: PathBuf,
    pub powercap_root: PathBuf,
    pub devfreq_dir: PathBuf,
    pub freq_path: Option<PathBuf>,
}

impl Configuration {
    fn new() -> Self {
        Self::from_cli(CLI::parse())
    }

    /// Parse an explicit argument list, environment variables still apply.
    ///
    /// # Errors
    /// The clap error for a malformed command line.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        CLI::try_parse_from(args).map(Self::from_cli)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// `<stats_dir>/output_<benchmark>_<interval>ms.csv`
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        let filename = format!("output_{}_{}ms.csv", self.benchmark, self.interval_ms);
        Path::new(&self.stats_dir).join(filename)
    }

    #[must_use]
    pub fn session_tags(&self) -> SessionTags {
        SessionTags {
            benchmark: self.benchmark.clone(),
            freq_mode: self.freq_mode,
            bin_policy: self.bin_policy,
        }
    }

    /// `package_limit` comes from the topology scan, `None` when it found nothing.
    #[must_use]
    pub fn sampler_config(&self, package_limit: Option<usize>) -> SamplerConfig {
        let frequency_path = self.freq_path.clone().or_else(|| {
            crate::accessory::FrequencySource::locate(&self.devfreq_dir, self.device)
        });
        SamplerConfig {
            powercap_root: self.powercap_root.clone(),
            package_limit,
            frequency_path,
            output_path: self.output_path(),
        }
    }

    fn from_cli(args: CLI) -> Self {
        Configuration {
            benchmark: args.benchmark,
            kernel: args.kernel,
            device: args.device,
            freq_mode: args.freq_mode,
            bin_policy: args.bin_policy,
            min_freq: args.min_freq,
            max_freq: args.max_freq,
            step_freq: args.step_freq,
            interval_ms: args.interval,
            reset_interval_ms: args.reset_interval,
            duration_secs: args.duration,
            sessions: args.sessions,
            stats_dir: args.stats_dir,
            powercap_root: args.powercap_root,
            devfreq_dir: args.devfreq_dir,
            freq_path: args.freq_path,
        }
    }
}

/*
  >>> ATTENTION <<<

    When updating this structure, you probably want to update
    the Configuration structure (and its implementation) too.
*/

#[derive(Parser)]
#[command(author, version, about, long_about=None)]
struct CLI {
    #[arg(
        long,
        short,
        env = "RAPL_BENCHMARK",
        default_value = "unknown",
        help = "Benchmark name, first column of every row and part of the log file name"
    )]
    benchmark: String,
    #[arg(
        long,
        short,
        default_value = "main",
        help = "Kernel (session) label, second column of every row"
    )]
    kernel: String,
    #[arg(
        long,
        env = "RAPL_DEVICE",
        default_value_t = 0,
        help = "Index of the devfreq device whose frequency is logged"
    )]
    device: usize,
    #[arg(long, env = "RAPL_FREQ_MODE", default_value_t = 0, allow_hyphen_values = true)]
    freq_mode: i64,
    #[arg(long, env = "RAPL_BIN_POLICY", default_value_t = 0, allow_hyphen_values = true)]
    bin_policy: i64,
    #[arg(long, env = "RAPL_MIN_FREQ", default_value_t = 0)]
    min_freq: u64,
    #[arg(long, env = "RAPL_MAX_FREQ", default_value_t = 0)]
    max_freq: u64,
    #[arg(long, env = "RAPL_STEP_FREQ", default_value_t = 0)]
    step_freq: u64,
    #[arg(
        long,
        short,
        env = "RAPL_INTERVAL_MS",
        default_value_t = 0,
        help = "Sampling interval in milliseconds"
    )]
    interval: u64,
    #[arg(
        long,
        env = "RAPL_RESET_INTERVAL",
        default_value_t = 0,
        help = "Pause between consecutive sessions in milliseconds"
    )]
    reset_interval: u64,
    #[arg(
        long,
        short,
        default_value_t = 10,
        help = "Number of seconds each session samples for"
    )]
    duration: u64,
    #[arg(long, default_value_t = 1, help = "Number of start/stop sessions to run")]
    sessions: u32,
    #[arg(
        long,
        short,
        default_value = "./stats",
        help = "Directory to store the energy log in"
    )]
    stats_dir: PathBuf,
    #[arg(long, default_value = RAPL_DIR)]
    powercap_root: PathBuf,
    #[arg(long, default_value = crate::accessory::DEVFREQ_DIR)]
    devfreq_dir: PathBuf,
    #[arg(long, help = "Frequency file to log instead of the devfreq device")]
    freq_path: Option<PathBuf>,
}
