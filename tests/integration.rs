use nanotsc::cycles;
use nanotsc::frequency::{FrequencyResolver, FrequencySource, SourceKind};
use nanotsc::overhead::measure_overhead_with;
use nanotsc::{measure_overhead, CalibrationConfig, CalibrationContext, TimeUnit};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nanotsc-it-{}-{}", std::process::id(), name));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn fixture_config(name: &str, tsc: Option<&str>, max: Option<&str>, cpuinfo: Option<&str>) -> CalibrationConfig {
    let dir = fixture_dir(name);
    let write = |file: &str, contents: Option<&str>| {
        let path = dir.join(file);
        match contents {
            Some(c) => fs::write(&path, c).unwrap(),
            None => {
                let _ = fs::remove_file(&path);
            }
        }
        path
    };
    CalibrationConfig {
        tsc_freq_path: write("tsc_freq_khz", tsc),
        max_freq_path: write("cpuinfo_max_freq", max),
        cpuinfo_path: write("cpuinfo", cpuinfo),
        ..CalibrationConfig::quick()
    }
}

/// Counter ticks per second over a busy-waited wall-clock window.
fn reference_hz(window: Duration) -> f64 {
    let wall = Instant::now();
    let t0 = cycles::raw_now();
    while wall.elapsed() < window {
        std::hint::spin_loop();
    }
    let t1 = cycles::raw_now();
    (t1 - t0) as f64 / wall.elapsed().as_secs_f64()
}

#[test]
fn calibrate_from_tsc_freq_file() {
    init_logging();
    let config = fixture_config("tsc", Some("2400000\n"), Some("3000000\n"), None);
    let ctx = CalibrationContext::calibrate(&config).unwrap();

    assert_eq!(ctx.frequency().as_khz(), 2_400_000);
    assert_eq!(ctx.frequency().as_hz(), 2_400_000_000);
    assert_eq!(ctx.frequency_source(), Some(SourceKind::TscFreq));
}

#[test]
fn calibrate_falls_back_to_max_freq() {
    init_logging();
    let config = fixture_config("max", Some("abc\n"), Some("3000000\n"), None);
    let ctx = CalibrationContext::calibrate(&config).unwrap();

    assert_eq!(ctx.frequency().as_khz(), 3_000_000);
    assert_eq!(ctx.frequency_source(), Some(SourceKind::MaxCpuFreq));
}

#[test]
fn calibrate_falls_back_to_cpuinfo() {
    init_logging();
    let table = "processor\t: 0\ncpu family\t: 6\ncpu MHz\t\t: 2900.000\n";
    let config = fixture_config("cpuinfo", None, Some("\n"), Some(table));
    let ctx = CalibrationContext::calibrate(&config).unwrap();

    assert_eq!(ctx.frequency().as_hz(), 2_900_000_000);
    assert_eq!(ctx.frequency_source(), Some(SourceKind::CpuInfo));
}

#[test]
fn sleep_fallback_tracks_real_counter_rate() {
    init_logging();
    let config = CalibrationConfig {
        sleep_interval_ms: 200,
        ..fixture_config("sleep", None, None, None)
    };
    let resolution = FrequencyResolver::from_config(&config).resolve_detailed();
    let reference = reference_hz(Duration::from_millis(200));

    assert_eq!(resolution.source, Some(SourceKind::Sleep));
    assert_eq!(resolution.attempts, 4);
    let measured = resolution.estimate.as_hz() as f64;
    let error = (measured - reference).abs() / reference;
    assert!(
        error < 0.05,
        "sleep estimate {} vs reference {} ({:.2}% off)",
        measured,
        reference,
        error * 100.0
    );
}

#[test]
fn exhausted_file_sources_yield_unknown() {
    init_logging();
    let config = fixture_config("none", None, None, None);
    let resolver = FrequencyResolver::new(
        FrequencyResolver::from_config(&config)
            .sources()
            .iter()
            .filter(|s| !matches!(s, FrequencySource::Sleep(_)))
            .cloned()
            .collect(),
    );
    let estimate = resolver.resolve();
    assert!(estimate.is_unknown());

    let ctx = CalibrationContext::from_parts(measure_overhead(10), estimate);
    assert_eq!(ctx.elapsed(1_000, TimeUnit::Nanosecond), None);
}

#[test]
fn overhead_bounds_every_calibration_sample() {
    let mut deltas = Vec::with_capacity(1000);
    let overhead = measure_overhead_with(1000, |d| deltas.push(d));
    let min = *deltas.iter().min().unwrap();
    assert_eq!(overhead.cycles(), min);
}

#[test]
fn corrected_empty_bracket_approaches_zero() {
    let overhead = measure_overhead(1000);
    let mut best = u64::MAX;
    for _ in 0..1000 {
        let t0 = cycles::start();
        let t1 = cycles::end();
        best = best.min(overhead.correct(t1 - t0));
    }
    assert!(best <= overhead.cycles().max(100), "best = {}, overhead = {:?}", best, overhead);
}

#[test]
fn recalibration_replaces_context() {
    init_logging();
    let first = CalibrationContext::calibrate(&fixture_config("re1", Some("1000000\n"), None, None)).unwrap();
    let second = first
        .recalibrate(&fixture_config("re2", Some("2000000\n"), None, None))
        .unwrap();

    assert_eq!(first.frequency().as_khz(), 1_000_000);
    assert_eq!(second.frequency().as_khz(), 2_000_000);
}

#[test]
fn measured_workload_is_positive() {
    let config = fixture_config("measure", Some("2400000\n"), None, None);
    let ctx = CalibrationContext::calibrate(&config).unwrap();
    let (sum, ns) = ctx.measure(|| (0..std::hint::black_box(10_000u64)).fold(0u64, |acc, x| acc.wrapping_add(x * x)));
    assert!(sum > 0);
    assert!(ns.unwrap() > 0.0);
}
