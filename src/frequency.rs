//! Counter frequency resolution.
//!
//! Sources are tried in order and the first strictly positive, well-formed
//! answer wins:
//!
//! 1. `/sys/devices/system/cpu/cpu0/tsc_freq_khz` (exact TSC frequency, kHz)
//! 2. `/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq` (rated clock, kHz)
//! 3. `cpu MHz` in `/proc/cpuinfo` (current clock, fractional MHz)
//! 4. Counting TSC ticks across a wall-clock sleep
//!
//! Sources 2 and 3 only approximate the TSC rate, and only on CPUs with an
//! invariant TSC. Every failure is "source unavailable" and falls through.
//! When all sources fail the result is [`FrequencyEstimate::UNKNOWN`].

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::cycles;
use crate::error::{Result, TscError};

pub const TSC_FREQ_KHZ_PATH: &str = "/sys/devices/system/cpu/cpu0/tsc_freq_khz";
pub const CPUINFO_MAX_FREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";
pub const CPUINFO_PATH: &str = "/proc/cpuinfo";
pub const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Sysfs values are tiny; anything this large is not a frequency.
const READ_BUFFER_SIZE: usize = 1024;
const CPUINFO_LINE_LIMIT: usize = 2048;
const CPU_MHZ_LABEL: &str = "cpu MHz";

/// Counter ticks per second. Zero is the "unknown" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrequencyEstimate(u64);

impl FrequencyEstimate {
    pub const UNKNOWN: FrequencyEstimate = FrequencyEstimate(0);

    pub const fn from_hz(hz: u64) -> Self {
        Self(hz)
    }

    /// Returns `None` if `khz * 1000` overflows.
    pub fn from_khz(khz: u64) -> Option<Self> {
        khz.checked_mul(1_000).map(Self)
    }

    pub fn as_hz(&self) -> u64 {
        self.0
    }

    pub fn as_khz(&self) -> u64 {
        self.0 / 1_000
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == 0
    }

    pub fn cycles_per_ns(&self) -> f64 {
        self.0 as f64 / 1e9
    }
}

impl fmt::Display for FrequencyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("unknown")
        } else {
            write!(f, "{:.3} GHz", self.0 as f64 / 1e9)
        }
    }
}

/// Which kind of source produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    TscFreq,
    MaxCpuFreq,
    CpuInfo,
    Sleep,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::TscFreq => "tsc_freq_khz",
            SourceKind::MaxCpuFreq => "cpuinfo_max_freq",
            SourceKind::CpuInfo => "cpuinfo",
            SourceKind::Sleep => "sleep",
        };
        f.write_str(name)
    }
}

/// One step of the fallback cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrequencySource {
    /// File holding the exact TSC frequency in kHz.
    TscFreqKhz(PathBuf),
    /// File holding the maximum CPU clock in kHz.
    MaxCpuFreqKhz(PathBuf),
    /// `label: value` table with a `cpu MHz` entry.
    CpuInfoMhz(PathBuf),
    /// Count ticks across a sleep of the given length.
    Sleep(Duration),
}

impl FrequencySource {
    pub fn kind(&self) -> SourceKind {
        match self {
            FrequencySource::TscFreqKhz(_) => SourceKind::TscFreq,
            FrequencySource::MaxCpuFreqKhz(_) => SourceKind::MaxCpuFreq,
            FrequencySource::CpuInfoMhz(_) => SourceKind::CpuInfo,
            FrequencySource::Sleep(_) => SourceKind::Sleep,
        }
    }

    /// Attempts this source. Any error means "unavailable".
    pub fn probe(&self) -> Result<FrequencyEstimate> {
        let estimate = match self {
            FrequencySource::TscFreqKhz(path) | FrequencySource::MaxCpuFreqKhz(path) => {
                let khz = read_decimal_file(path)?;
                FrequencyEstimate::from_khz(khz).ok_or_else(|| {
                    TscError::Malformed(format!("{}: {} kHz overflows", path.display(), khz))
                })?
            }
            FrequencySource::CpuInfoMhz(path) => {
                let file = open_source(path)?;
                FrequencyEstimate::from_hz(parse_cpuinfo_mhz(BufReader::new(file))?)
            }
            FrequencySource::Sleep(interval) => measure_by_sleep(*interval)?,
        };

        if estimate.is_unknown() {
            return Err(TscError::NonPositive(self.kind().to_string()));
        }
        Ok(estimate)
    }
}

/// Outcome of a cascade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub estimate: FrequencyEstimate,
    /// Source that produced `estimate`, `None` if every source failed.
    pub source: Option<SourceKind>,
    /// Number of sources probed, including the successful one.
    pub attempts: usize,
}

/// Ordered list of frequency sources.
#[derive(Debug, Clone)]
pub struct FrequencyResolver {
    sources: Vec<FrequencySource>,
}

impl Default for FrequencyResolver {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

impl FrequencyResolver {
    pub fn new(sources: Vec<FrequencySource>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(vec![
            FrequencySource::TscFreqKhz(config.tsc_freq_path.clone()),
            FrequencySource::MaxCpuFreqKhz(config.max_freq_path.clone()),
            FrequencySource::CpuInfoMhz(config.cpuinfo_path.clone()),
            FrequencySource::Sleep(config.sleep_interval()),
        ])
    }

    pub fn sources(&self) -> &[FrequencySource] {
        &self.sources
    }

    pub fn resolve(&self) -> FrequencyEstimate {
        self.resolve_detailed().estimate
    }

    pub fn resolve_detailed(&self) -> Resolution {
        for (idx, source) in self.sources.iter().enumerate() {
            match source.probe() {
                Ok(estimate) => {
                    info!(source = %source.kind(), hz = estimate.as_hz(), "TSC frequency resolved");
                    return Resolution {
                        estimate,
                        source: Some(source.kind()),
                        attempts: idx + 1,
                    };
                }
                Err(e) => {
                    debug!(source = %source.kind(), error = %e, "Frequency source unavailable");
                }
            }
        }

        warn!(
            "Could not determine TSC frequency from any of {} sources",
            self.sources.len()
        );
        Resolution {
            estimate: FrequencyEstimate::UNKNOWN,
            source: None,
            attempts: self.sources.len(),
        }
    }
}

/// Runs the default cascade against the live system.
pub fn resolve_frequency() -> FrequencyEstimate {
    FrequencyResolver::default().resolve()
}

fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TscError::SourceMissing(path.display().to_string()),
        _ => TscError::IoError(format!("{}: {}", path.display(), e)),
    })
}

/// Reads a whole file that must contain one decimal integer.
///
/// The content must fit in a 1024-byte buffer and be read to EOF before it is
/// parsed; a partial read is never handed to the parser.
pub fn read_decimal_file(path: &Path) -> Result<u64> {
    let mut file = open_source(path)?;
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut filled = 0;

    loop {
        if filled == buf.len() {
            return Err(TscError::Truncated(path.display().to_string()));
        }
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TscError::IoError(format!("{}: {}", path.display(), e))),
        }
    }

    parse_decimal_token(&buf[..filled])
        .map_err(|e| TscError::Malformed(format!("{}: {}", path.display(), e)))
}

/// Accepts exactly `[0-9]+` optionally followed by a single `\n`.
pub fn parse_decimal_token(bytes: &[u8]) -> Result<u64> {
    let digits = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    if digits.is_empty() {
        return Err(TscError::Malformed("empty content".to_string()));
    }

    digits.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return Err(TscError::Malformed(format!(
                "unexpected byte 0x{:02x} in decimal token",
                b
            )));
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| TscError::Malformed("decimal token overflows u64".to_string()))
    })
}

/// Finds the first `cpu MHz : <value>` line and returns the value in Hz.
pub fn parse_cpuinfo_mhz<R: BufRead>(mut reader: R) -> Result<u64> {
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let n = reader
            .by_ref()
            .take(CPUINFO_LINE_LIMIT as u64)
            .read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        if n == CPUINFO_LINE_LIMIT && line.last() != Some(&b'\n') {
            return Err(TscError::Truncated("cpuinfo line too long".to_string()));
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            continue;
        };
        if let Some((label, value)) = text.split_once(':') {
            if label.trim() == CPU_MHZ_LABEL {
                let hz = parse_mhz(value.trim())?;
                if hz == 0 {
                    return Err(TscError::NonPositive(CPU_MHZ_LABEL.to_string()));
                }
                return Ok(hz);
            }
        }
    }

    Err(TscError::LabelNotFound(CPU_MHZ_LABEL.to_string()))
}

/// `"2400.000"` -> 2_400_000_000. Digits past the sixth decimal are dropped.
fn parse_mhz(value: &str) -> Result<u64> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TscError::Malformed(format!("bad MHz value '{}'", value)));
    }

    let whole_mhz = parse_decimal_token(whole.as_bytes())?;
    let mut frac_hz = 0u64;
    for i in 0..6 {
        let digit = frac.as_bytes().get(i).map_or(0, |b| u64::from(b - b'0'));
        frac_hz = frac_hz * 10 + digit;
    }

    whole_mhz
        .checked_mul(1_000_000)
        .and_then(|hz| hz.checked_add(frac_hz))
        .ok_or_else(|| TscError::Malformed(format!("MHz value '{}' overflows", value)))
}

fn measure_by_sleep(interval: Duration) -> Result<FrequencyEstimate> {
    let wall = Instant::now();
    let t0 = cycles::raw_now();
    thread::sleep(interval);
    let t1 = cycles::raw_now();
    let elapsed_ns = wall.elapsed().as_nanos();

    if elapsed_ns == 0 {
        return Err(TscError::NonPositive("sleep interval".to_string()));
    }
    let hz = u128::from(t1.saturating_sub(t0)) * 1_000_000_000 / elapsed_ns;
    Ok(FrequencyEstimate::from_hz(hz.min(u128::from(u64::MAX)) as u64))
}
