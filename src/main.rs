use log::{error, info, trace, warn};
use rapl_logger::cli::CONFIGURATION;
use rapl_logger::cpuinfo::{CpuInfo, CPUINFO_PATH};
use rapl_logger::topology::{Topology, CPU_DIR};
use rapl_logger::{core_count, Sampler};
use std::fs;
use std::path::Path;
use std::process;
use std::thread;
use std::time::Duration;

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();
    trace!("Configuration: {:#?}", *CONFIGURATION);

    match CpuInfo::detect(Path::new(CPUINFO_PATH)) {
        Ok(cpu) => info!("Found {cpu} processor"),
        Err(e) => warn!("Processor not identified: {e}"),
    }
    let topology = Topology::detect(Path::new(CPU_DIR), core_count());
    let package_limit = Some(topology.package_count()).filter(|&count| count > 0);

    if CONFIGURATION.step_freq > 0 {
        info!(
            "Frequency range {}..={} step {}",
            CONFIGURATION.min_freq, CONFIGURATION.max_freq, CONFIGURATION.step_freq
        );
    }

    if let Err(e) = fs::create_dir_all(&CONFIGURATION.stats_dir) {
        error!("Failed to create {}: {e}", CONFIGURATION.stats_dir.display());
        process::exit(1);
    }

    let mut sampler = match Sampler::new(CONFIGURATION.sampler_config(package_limit)) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_sessions(&mut sampler) {
        error!("{e}");
        process::exit(1);
    }
    info!(
        "{} rows written to {}",
        sampler.rows_written(),
        sampler.output_path().display()
    );
}

/// Sample for the configured duration, as many times as configured, pausing
/// for the reset interval between sessions.
fn run_sessions(sampler: &mut Sampler) -> rapl_logger::Result<()> {
    for session in 0..CONFIGURATION.sessions {
        if session > 0 {
            thread::sleep(Duration::from_millis(CONFIGURATION.reset_interval_ms));
        }
        sampler.start(
            &CONFIGURATION.kernel,
            CONFIGURATION.interval(),
            CONFIGURATION.session_tags(),
        )?;
        thread::sleep(Duration::from_secs(CONFIGURATION.duration_secs));
        sampler.stop()?;
    }
    Ok(())
}
