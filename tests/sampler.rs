use rapl_logger::{Error, Phase, Sampler, SamplerConfig, SessionTags};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(5);

fn make_zone(dir: &Path, name: &str, energy: u64) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("name"), format!("{name}\n")).unwrap();
    fs::write(dir.join("energy_uj"), format!("{energy}\n")).unwrap();
}

fn tags() -> SessionTags {
    SessionTags {
        benchmark: String::from("integration"),
        freq_mode: 1,
        bin_policy: 0,
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_restart_appends_without_second_header() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    make_zone(&root.path().join("intel-rapl:0"), "package-0", 10);
    make_zone(&root.path().join("intel-rapl:0/intel-rapl:0:0"), "core", 5);
    // package 2 is unreachable, package 1 is missing
    make_zone(&root.path().join("intel-rapl:2"), "package-2", 10);

    let output_path = out.path().join("output_integration_5ms.csv");
    fs::write(&output_path, "left over from an earlier run\n").unwrap();

    let mut sampler = Sampler::new(SamplerConfig {
        powercap_root: root.path().to_path_buf(),
        package_limit: Some(4),
        frequency_path: None,
        output_path: output_path.clone(),
    })
    .unwrap();
    assert!(!sampler.is_running());

    sampler.start("first", INTERVAL, tags()).unwrap();
    assert!(sampler.is_running());
    thread::sleep(Duration::from_millis(80));
    sampler.stop().unwrap();
    assert!(!sampler.is_running());

    let lines = read_lines(&output_path);
    assert_eq!(
        lines[0],
        "Benchmark,Kernel,FreqMode,Timestamp,Freq,BinPolicy,package-0,core"
    );
    let first_rows = lines.len() - 1;
    assert!(first_rows >= 1);
    assert_eq!(first_rows as u64, sampler.rows_written());
    assert!(lines[1].starts_with("integration,first,1,0,0,0,"));

    sampler.start("second", INTERVAL, tags()).unwrap();
    thread::sleep(Duration::from_millis(80));
    sampler.stop().unwrap();
    assert_eq!(sampler.phase(), Phase::Stopped);

    let lines = read_lines(&output_path);
    let headers = lines.iter().filter(|l| l.starts_with("Benchmark,")).count();
    assert_eq!(headers, 1);
    assert!(lines.len() - 1 > first_rows);
    assert!(lines[first_rows + 1].starts_with("integration,second,1,0,"));
    for line in &lines {
        assert_eq!(line.split(',').count(), 8);
    }
}

#[test]
fn test_misuse_is_reported() {
    let root = tempfile::tempdir().unwrap();
    make_zone(&root.path().join("intel-rapl:0"), "package-0", 10);
    let mut sampler = Sampler::new(SamplerConfig {
        powercap_root: root.path().to_path_buf(),
        package_limit: None,
        frequency_path: None,
        output_path: root.path().join("out.csv"),
    })
    .unwrap();

    assert!(matches!(sampler.stop(), Err(Error::NotSampling)));
    sampler.start("k", INTERVAL, tags()).unwrap();
    assert!(matches!(
        sampler.start("k", INTERVAL, tags()),
        Err(Error::AlreadySampling(_))
    ));
    sampler.stop().unwrap();
    assert!(matches!(sampler.stop(), Err(Error::NotSampling)));
}
