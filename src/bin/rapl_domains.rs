use chrono::{Local, SecondsFormat};
use clap::Parser;
use log::{error, warn};
use rapl_logger::accessory::{FrequencySource, DEVFREQ_DIR};
use rapl_logger::cpuinfo::{CpuInfo, CPUINFO_PATH};
use rapl_logger::rapl::{RAPL, RAPL_DIR};
use rapl_logger::topology::{Topology, CPU_DIR};
use rapl_logger::{core_count, read_sysfs_u64};
use std::path::{Path, PathBuf};
use std::process;

/// List the processor, its packages and every RAPL domain with its current counter
#[derive(Parser)]
#[command(author, version, about, long_about=None)]
struct CLI {
    #[arg(long, default_value = RAPL_DIR)]
    powercap_root: PathBuf,
    #[arg(long, default_value = DEVFREQ_DIR)]
    devfreq_dir: PathBuf,
}

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();
    let args = CLI::parse();

    match CpuInfo::detect(Path::new(CPUINFO_PATH)) {
        Ok(cpu) => println!("Processor: {cpu}"),
        Err(e) => warn!("{e}"),
    }
    let topology = Topology::detect(Path::new(CPU_DIR), core_count());
    println!(
        "Topology: {} cores in {} packages",
        topology.cores,
        topology.package_count()
    );

    let limit = Some(topology.package_count()).filter(|&count| count > 0);
    let rapl = match RAPL::discover(&args.powercap_root, limit) {
        Ok(rapl) => rapl,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let now = Local::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    for domain in rapl.domains() {
        match read_sysfs_u64(&domain.energy_path) {
            Ok(energy) => println!("{now},{domain},{energy}"),
            Err(e) => println!("{now},{domain},unreadable ({e})"),
        }
    }

    for device in 0.. {
        let Some(path) = FrequencySource::locate(&args.devfreq_dir, device) else {
            break;
        };
        let freq = FrequencySource::new(Some(path.clone())).read();
        println!("device {device}: {} {freq}", path.display());
    }
}
