pub mod record;
mod session;

use crate::accessory::FrequencySource;
use crate::error::{Error, Result};
use crate::rapl::{Domain, Snapshot, RAPL};
use crate::timer::{RepeatingTimer, Tick};
use log::{error, info, trace, warn};
use session::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Everything the sampler needs to know about the host and where to log.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Root of the powercap RAPL tree, normally [`crate::rapl::RAPL_DIR`]
    pub powercap_root: PathBuf,
    /// Stop package discovery at this many packages
    pub package_limit: Option<usize>,
    /// File holding the device frequency, the Freq column is 0 without one
    pub frequency_path: Option<PathBuf>,
    pub output_path: PathBuf,
}

/// Configuration values repeated on every row of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTags {
    pub benchmark: String,
    pub freq_mode: i64,
    pub bin_policy: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Domains discovered and read once, no session started yet
    Baselined,
    Sampling,
    Stopped,
    /// A tick panicked, the sampler can't be restarted
    Failed,
}

/// State driven by the timer thread on every tick.
///
/// It moves onto the timer thread on `start` and comes back when `stop`
/// joins that thread, so it is never shared between threads.
#[derive(Debug)]
struct Recorder {
    rapl: Arc<RAPL>,
    frequency: FrequencySource,
    before: Snapshot,
    after: Snapshot,
    /// The next tick only re-reads the baseline
    baseline_pending: bool,
    session: Option<Session>,
}

impl Recorder {
    fn new(rapl: Arc<RAPL>, frequency: FrequencySource) -> Self {
        let before = rapl.baseline();
        // Starting from the baseline makes a failed first read report the baseline value
        let after = before.clone();
        Self {
            rapl,
            frequency,
            before,
            after,
            baseline_pending: true,
            session: None,
        }
    }

    fn begin(&mut self, session: Session) {
        self.session = Some(session);
        self.baseline_pending = true;
    }

    fn finish(&mut self) -> Result<u64> {
        match self.session.take() {
            Some(session) => session.close(),
            None => Ok(0),
        }
    }
}

impl Tick for Recorder {
    fn tick(&mut self) {
        let failures = self.rapl.refresh(&mut self.after);
        if failures > 0 {
            warn!("{failures} RAPL domain(s) could not be read this tick");
        }

        let Some(session) = self.session.as_mut() else {
            error!("Tick without an open session");
            return;
        };

        // The first tick of a session only provides the baseline: the read at
        // construction (or the end of the previous session) is not one interval
        // away.
        if self.baseline_pending {
            trace!("Baseline tick for session {}", session.label);
            self.before.clone_from(&self.after);
            self.baseline_pending = false;
            return;
        }

        let freq = self.frequency.read();
        let rates = self.rapl.rates(&self.before, &self.after, session.interval_ms);
        if let Err(e) = session.write_row(freq, &rates) {
            error!("Failed to write tick {} of session {}: {e}", session.tick, session.label);
        }
        self.before.clone_from(&self.after);
    }
}

/// Periodic RAPL energy sampler.
///
/// Discovers the energy domains and reads a baseline once, at construction.
/// Each `start`/`stop` pair is one session: a background thread samples every
/// domain at the session interval and appends one CSV row per tick to the
/// output log. The first session in the sampler's lifetime truncates the log
/// and writes the header, later ones append.
pub struct Sampler {
    config: SamplerConfig,
    rapl: Arc<RAPL>,
    header: String,
    timer: RepeatingTimer<Recorder>,
    /// Present whenever no session is running
    recorder: Option<Recorder>,
    phase: Phase,
    sessions_started: u64,
    rows_written: u64,
    current_label: Option<String>,
}

impl Sampler {
    /// Discover the RAPL domains and take the initial baseline.
    ///
    /// # Errors
    /// `Error::Discovery` if package 0 has no powercap zone.
    pub fn new(config: SamplerConfig) -> Result<Self> {
        let rapl = Arc::new(RAPL::discover(
            &config.powercap_root,
            config.package_limit,
        )?);
        let header = record::header(rapl.domains().iter().map(|d| d.name.as_str()));
        let frequency = FrequencySource::new(config.frequency_path.clone());
        let recorder = Recorder::new(Arc::clone(&rapl), frequency);
        info!("Sampler ready with {} domains", rapl.len());

        Ok(Self {
            config,
            rapl,
            header,
            timer: RepeatingTimer::new(),
            recorder: Some(recorder),
            phase: Phase::Baselined,
            sessions_started: 0,
            rows_written: 0,
            current_label: None,
        })
    }

    /// Open the log and start sampling every `interval` in the background.
    ///
    /// Returns as soon as the sampling thread is launched. The first tick of
    /// every session only re-reads the baseline, rows start on the second.
    ///
    /// # Errors
    /// * `Error::AlreadySampling` if a session is running
    /// * `Error::InvalidInterval` if `interval` is under a millisecond
    /// * `Error::Output` if the log can't be opened
    /// * `Error::TickPanicked` if an earlier session died
    pub fn start(&mut self, label: &str, interval: Duration, tags: SessionTags) -> Result<()> {
        match self.phase {
            Phase::Sampling => {
                let current = self.current_label.clone().unwrap_or_default();
                warn!("Measure start for {label} while {current} is running");
                return Err(Error::AlreadySampling(current));
            }
            Phase::Failed => return Err(Error::TickPanicked),
            Phase::Baselined | Phase::Stopped => {}
        }
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        if interval_ms == 0 {
            return Err(Error::InvalidInterval);
        }
        let Some(mut recorder) = self.recorder.take() else {
            return Err(Error::TickPanicked);
        };

        let first = self.sessions_started == 0;
        let header = first.then_some(self.header.as_str());
        let session = match Session::open(&self.config.output_path, header, label, tags, interval_ms) {
            Ok(session) => session,
            Err(e) => {
                self.recorder = Some(recorder);
                return Err(e);
            }
        };
        if first {
            info!("Measure start: {label} every {interval_ms} ms");
        } else {
            info!("Measure restart: {label} every {interval_ms} ms");
        }

        recorder.begin(session);
        self.timer.start(Duration::from_millis(interval_ms), recorder);
        self.sessions_started += 1;
        self.current_label = Some(label.to_owned());
        self.phase = Phase::Sampling;
        Ok(())
    }

    /// Stop sampling and close the log.
    ///
    /// Blocks until the in-flight tick, if any, has completed.
    ///
    /// # Errors
    /// * `Error::NotSampling` if no session is running
    /// * `Error::TickPanicked` if the sampling thread died, the sampler is unusable afterwards
    /// * `Error::Output` if the log can't be flushed
    pub fn stop(&mut self) -> Result<()> {
        if self.phase != Phase::Sampling {
            warn!("Measure stop without a running session");
            return Err(Error::NotSampling);
        }
        let label = self.current_label.take().unwrap_or_default();
        let mut recorder = match self.timer.stop() {
            Ok(Some(recorder)) => recorder,
            Ok(None) => {
                self.phase = Phase::Failed;
                return Err(Error::NotSampling);
            }
            Err(e) => {
                error!("Measure stop: session {label} lost");
                self.phase = Phase::Failed;
                return Err(e);
            }
        };
        let closed = recorder.finish();
        self.recorder = Some(recorder);
        self.phase = Phase::Stopped;
        info!("Measure stop: {label}");

        let rows = closed?;
        self.rows_written += rows;
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn domains(&self) -> &[Domain] {
        self.rapl.domains()
    }

    /// The header row written at the top of the log.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    /// Rows written by all completed sessions.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if self.phase == Phase::Sampling {
            if let Err(e) = self.stop() {
                error!("Failed to stop sampler on drop: {e}");
            }
        }
    }
}
