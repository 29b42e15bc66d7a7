//! Timing and memory reporting around a solve.
//!
//! Process memory is the resident set size as seen by `sysinfo`. It is read
//! once before the solve and once after, while a sampler thread polls it in
//! between to catch the peak. On platforms where the process cannot be
//! inspected every reading is `None` and the report says so.

use crate::error::Result;
use crate::sequence::ChainDetail;
use crate::solver::{Backend, SolverHandle};
use crossbeam_channel::RecvTimeoutError;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(5);

/// The answer of one solve together with what it cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub backend: Backend,
    pub ceiling: u64,
    pub detail: ChainDetail,
    pub elapsed: Duration,
    /// Memo table memory allocated for the call.
    pub table_bytes: usize,
    /// Resident set size right before the solve.
    pub rss_before: Option<u64>,
    /// Highest resident set size seen while solving.
    pub rss_peak: Option<u64>,
    /// Resident set size right after the solve.
    pub rss_after: Option<u64>,
}

impl Report {
    /// Resident memory gained (or released, if negative) across the solve.
    pub fn memory_delta(&self) -> Option<i64> {
        Some(self.rss_after? as i64 - self.rss_before? as i64)
    }

    /// How far resident memory rose above its starting point at the peak.
    pub fn peak_growth(&self) -> Option<u64> {
        Some(self.rss_peak?.saturating_sub(self.rss_before?))
    }
}

/// Resident memory of the current process.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
        );
        ProcessMemory {
            system,
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Current resident set size in bytes.
    pub fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|process| process.memory())
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls resident memory on its own thread until stopped, keeping the maximum.
struct PeakSampler {
    stop: crossbeam_channel::Sender<()>,
    thread: JoinHandle<Option<u64>>,
}

impl PeakSampler {
    fn start() -> Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("collatz-rss-sampler".to_string())
            .spawn(move || {
                let mut memory = ProcessMemory::new();
                let mut peak = None;
                loop {
                    peak = peak.max(memory.resident_bytes());
                    match stopped.recv_timeout(SAMPLE_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                peak
            })?;
        Ok(PeakSampler { stop, thread })
    }

    fn finish(self) -> Option<u64> {
        let _ = self.stop.send(());
        self.thread.join().ok().flatten()
    }
}

/// Run `handle` on `ceiling`, timing it and tracking process memory.
pub fn measure(handle: &SolverHandle, ceiling: u64) -> Result<Report> {
    let table_bytes = handle.table_bytes(ceiling);
    let mut memory = ProcessMemory::new();
    let rss_before = memory.resident_bytes();
    let sampler = PeakSampler::start()?;

    let start = Instant::now();
    let outcome = handle.determine_longest_chain(ceiling);
    let elapsed = start.elapsed();

    let sampled = sampler.finish();
    let rss_after = memory.resident_bytes();
    let detail = outcome?;

    let rss_peak = sampled.max(rss_before).max(rss_after);
    debug!(
        backend = %handle.backend(),
        ceiling,
        ?rss_before,
        ?rss_peak,
        ?rss_after,
        "solve measured"
    );
    Ok(Report {
        backend: handle.backend(),
        ceiling,
        detail,
        elapsed,
        table_bytes,
        rss_before,
        rss_peak,
        rss_after,
    })
}

/// Human-readable byte count using binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn format_signed_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { '-' } else { '+' };
    format!("{}{}", sign, format_bytes(bytes.unsigned_abs()))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Number with longest chain was {} with {} terms.",
            self.detail.number, self.detail.terms
        )?;
        writeln!(f, "Backend: {} (ceiling {})", self.backend, self.ceiling)?;
        writeln!(f, "Elapsed: {:.3?}", self.elapsed)?;
        match (self.memory_delta(), self.peak_growth(), self.rss_peak) {
            (Some(delta), Some(growth), Some(peak)) => writeln!(
                f,
                "Process memory: {} (peak {}, resident {})",
                format_signed_bytes(delta),
                format_signed_bytes(growth as i64),
                format_bytes(peak)
            )?,
            _ => writeln!(f, "Process memory: unavailable")?,
        }
        write!(f, "Memo table: {}", format_bytes(self.table_bytes as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{SolverConfig, create_solver};
    use std::hint::black_box;

    fn report_with_memory(before: Option<u64>, peak: Option<u64>, after: Option<u64>) -> Report {
        Report {
            backend: Backend::Parallel,
            ceiling: 100,
            detail: ChainDetail::new(97, 119),
            elapsed: Duration::from_millis(2),
            table_bytes: 404,
            rss_before: before,
            rss_peak: peak,
            rss_after: after,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(4_000_004), "3.81 MiB");
        assert_eq!(format_signed_bytes(-2048), "-2.00 KiB");
        assert_eq!(format_signed_bytes(0), "+0 B");
    }

    #[test]
    fn test_memory_delta_and_peak() {
        let report = report_with_memory(Some(10 << 20), Some(14 << 20), Some(9 << 20));
        assert_eq!(report.memory_delta(), Some(-(1 << 20)));
        assert_eq!(report.peak_growth(), Some(4 << 20));
        assert!(
            report
                .to_string()
                .contains("Process memory: -1.00 MiB (peak +4.00 MiB, resident 14.00 MiB)")
        );

        let missing = report_with_memory(None, Some(1), Some(1));
        assert_eq!(missing.memory_delta(), None);
        assert_eq!(missing.peak_growth(), None);
        assert!(missing.to_string().contains("Process memory: unavailable"));
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    fn test_resident_bytes_tracks_allocation() {
        let mut memory = ProcessMemory::new();
        let before = memory.resident_bytes().unwrap();
        // Every page is written, so all of it becomes resident
        let block = black_box(vec![1u8; 64 << 20]);
        let after = memory.resident_bytes().unwrap();
        assert!(after >= before + (32 << 20), "before {before}, after {after}");
        drop(block);
    }

    #[test]
    fn test_measure() {
        let handle = create_solver(&SolverConfig::new(Backend::Sequential)).unwrap();
        let report = measure(&handle, 10).unwrap();
        assert_eq!(report.detail, ChainDetail::new(9, 20));
        assert_eq!(report.backend, Backend::Sequential);
        assert_eq!(report.table_bytes, 44);

        let text = report.to_string();
        assert!(text.starts_with("Number with longest chain was 9 with 20 terms."));
        assert!(text.contains("Backend: sequential (ceiling 10)"));
        assert!(text.contains("Process memory: "));
        assert!(text.ends_with("Memo table: 44 B"));
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    fn test_measure_samples_process_memory() {
        let handle = create_solver(&SolverConfig::new(Backend::Sequential)).unwrap();
        let report = measure(&handle, 1_000_000).unwrap();
        assert_eq!(report.detail, ChainDetail::new(837_799, 525));

        let before = report.rss_before.unwrap();
        let peak = report.rss_peak.unwrap();
        let after = report.rss_after.unwrap();
        assert!(peak >= before && peak >= after);
        assert!(report.memory_delta().is_some());
        assert!(!report.to_string().contains("unavailable"));
    }

    #[test]
    fn test_measure_propagates_errors() {
        let handle = create_solver(&SolverConfig::default()).unwrap();
        assert!(measure(&handle, 0).is_err());
    }
}
