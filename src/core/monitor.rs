//! Host resource sampling and snapshot caching.
//!
//! [`SystemMonitor`] reads CPU, memory, disk and worker-process figures via
//! `sysinfo`. Every figure degrades to a neutral zero when its source is
//! unavailable, so sampling never fails. [`MetricsCache`] bounds sampling
//! cost by serving the last snapshot until the refresh interval elapses.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sysinfo::{Disks, Pid, ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::debug;

use crate::util::clock::now_ms;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point-in-time host metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Global CPU utilisation in percent.
    pub cpu_percent: f64,
    /// One-minute load average divided by core count, in percent.
    pub normalized_load: f64,
    /// Used memory in percent of total.
    pub memory_percent: f64,
    /// Available memory in megabytes.
    pub memory_available_mb: f64,
    /// Used space of the root (or largest) disk in percent.
    pub disk_percent: f64,
    /// Number of processes matching the worker patterns.
    pub worker_process_count: usize,
    /// Resident memory of the worker processes in megabytes.
    pub worker_memory_mb: f64,
    /// Resident memory of this process in megabytes.
    pub process_memory_mb: f64,
    /// Physical CPU cores.
    pub cpu_cores: usize,
    /// Running inside a container or managed platform.
    pub in_container: bool,
    /// False while no CPU usage delta is available yet (right after start);
    /// `cpu_percent` then reads zero and the score rests on `normalized_load`.
    pub cpu_measured: bool,
    /// Capture time in milliseconds since the epoch.
    pub timestamp_ms: u128,
}

impl MetricsSnapshot {
    /// A snapshot with every load figure at zero.
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            cpu_percent: 0.0,
            normalized_load: 0.0,
            memory_percent: 0.0,
            memory_available_mb: 0.0,
            disk_percent: 0.0,
            worker_process_count: 0,
            worker_memory_mb: 0.0,
            process_memory_mb: 0.0,
            cpu_cores: physical_cores(),
            in_container: false,
            cpu_measured: true,
            timestamp_ms: now_ms(),
        }
    }

    /// Memory attributed to the scheduler: this process plus its workers.
    #[must_use]
    pub fn monitored_memory_mb(&self) -> f64 {
        self.process_memory_mb + self.worker_memory_mb
    }
}

/// Anything that can produce a [`MetricsSnapshot`].
pub trait MetricsSource: Send + Sync {
    /// Take a fresh sample. Must not fail; unavailable figures read as zero.
    fn sample(&self) -> MetricsSnapshot;
}

/// `sysinfo` state plus the last CPU reading.
///
/// CPU usage is a delta between two refreshes at least
/// [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] apart, so a refresh that comes
/// sooner is skipped and the previous reading reused.
struct HostReader {
    system: System,
    cpu_refreshed_at: std::time::Instant,
    last_cpu: Option<f64>,
}

/// `sysinfo`-backed metrics source.
///
/// CPU counters are primed on construction. Samples taken before the
/// minimum update interval has passed report `cpu_measured: false`.
pub struct SystemMonitor {
    reader: Mutex<HostReader>,
    worker_patterns: Vec<String>,
    cpu_cores: usize,
    in_container: bool,
    own_pid: Option<Pid>,
}

impl std::fmt::Debug for SystemMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMonitor")
            .field("worker_patterns", &self.worker_patterns)
            .field("cpu_cores", &self.cpu_cores)
            .field("in_container", &self.in_container)
            .finish_non_exhaustive()
    }
}

impl SystemMonitor {
    /// Create a monitor matching worker processes by the given name patterns.
    #[must_use]
    pub fn new(worker_patterns: &[String]) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            reader: Mutex::new(HostReader {
                system,
                cpu_refreshed_at: std::time::Instant::now(),
                last_cpu: None,
            }),
            worker_patterns: worker_patterns.iter().map(|p| p.to_lowercase()).collect(),
            cpu_cores: physical_cores(),
            in_container: detect_container(),
            own_pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn is_worker(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.worker_patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

#[allow(clippy::cast_precision_loss)]
impl MetricsSource for SystemMonitor {
    fn sample(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            cpu_cores: self.cpu_cores,
            in_container: self.in_container,
            ..MetricsSnapshot::neutral()
        };
        let mut reader = self.reader.lock();
        let HostReader {
            system: sys,
            cpu_refreshed_at,
            last_cpu,
        } = &mut *reader;

        sys.refresh_memory();
        let total = sys.total_memory();
        if total > 0 {
            snapshot.memory_percent = sys.used_memory() as f64 / total as f64 * 100.0;
        }
        snapshot.memory_available_mb = sys.available_memory() as f64 / BYTES_PER_MB;

        if cpu_refreshed_at.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            sys.refresh_cpu_usage();
            *cpu_refreshed_at = std::time::Instant::now();
            *last_cpu = Some(f64::from(sys.global_cpu_usage()));
        }
        match *last_cpu {
            Some(cpu) => snapshot.cpu_percent = cpu,
            None => {
                snapshot.cpu_measured = false;
                debug!("cpu usage not measurable yet; relying on load average");
            }
        }
        let load = System::load_average();
        snapshot.normalized_load = load.one / self.cpu_cores.max(1) as f64 * 100.0;

        sys.refresh_processes(ProcessesToUpdate::All, true);
        for process in sys.processes().values() {
            if self.is_worker(&process.name().to_string_lossy()) {
                snapshot.worker_process_count += 1;
                snapshot.worker_memory_mb += process.memory() as f64 / BYTES_PER_MB;
            }
        }
        if let Some(process) = self.own_pid.and_then(|pid| sys.process(pid)) {
            snapshot.process_memory_mb = process.memory() as f64 / BYTES_PER_MB;
        }
        drop(reader);

        snapshot.disk_percent = disk_percent();
        sanitize(&mut snapshot);
        debug!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            disk = snapshot.disk_percent,
            workers = snapshot.worker_process_count,
            "sampled host metrics"
        );
        snapshot
    }
}

/// Metrics source returning a settable snapshot. Used for dry runs and tests.
#[derive(Debug)]
pub struct StaticMetrics {
    snapshot: RwLock<MetricsSnapshot>,
}

impl StaticMetrics {
    /// Serve `snapshot` until replaced.
    #[must_use]
    pub const fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Replace the served snapshot.
    pub fn set(&self, snapshot: MetricsSnapshot) {
        *self.snapshot.write() = snapshot;
    }
}

impl MetricsSource for StaticMetrics {
    fn sample(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp_ms: now_ms(),
            ..self.snapshot.read().clone()
        }
    }
}

/// Caches the latest snapshot for a refresh interval.
pub struct MetricsCache {
    source: Arc<dyn MetricsSource>,
    interval: Duration,
    cached: RwLock<Option<(Instant, MetricsSnapshot)>>,
    refreshing: Mutex<()>,
}

impl std::fmt::Debug for MetricsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCache")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl MetricsCache {
    /// Wrap a source with the given freshness interval.
    #[must_use]
    pub fn new(source: Arc<dyn MetricsSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            cached: RwLock::new(None),
            refreshing: Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<MetricsSnapshot> {
        self.cached
            .read()
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.interval)
            .map(|(_, snapshot)| snapshot.clone())
    }

    /// Cached snapshot, resampled when older than the interval.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }
        let _guard = self.refreshing.lock();
        // Another caller may have refreshed while we waited.
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }
        self.store(self.source.sample())
    }

    /// Resample unconditionally.
    #[must_use]
    pub fn refresh(&self) -> MetricsSnapshot {
        let _guard = self.refreshing.lock();
        self.store(self.source.sample())
    }

    fn store(&self, snapshot: MetricsSnapshot) -> MetricsSnapshot {
        *self.cached.write() = Some((Instant::now(), snapshot.clone()));
        snapshot
    }
}

/// Physical core count, falling back to logical cores.
#[must_use]
pub fn physical_cores() -> usize {
    let physical = num_cpus::get_physical();
    if physical > 0 {
        physical
    } else {
        num_cpus::get().max(1)
    }
}

/// Detect container or managed platform environments.
#[must_use]
pub fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    if ["KUBERNETES_SERVICE_HOST", "DYNO", "GOOGLE_CLOUD_PROJECT"]
        .iter()
        .any(|key| std::env::var_os(key).is_some())
    {
        return true;
    }
    std::env::var("CONTAINER")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[allow(clippy::cast_precision_loss)]
fn disk_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));
    match disk {
        Some(d) if d.total_space() > 0 => {
            let used = d.total_space().saturating_sub(d.available_space());
            used as f64 / d.total_space() as f64 * 100.0
        }
        _ => 0.0,
    }
}

fn sanitize(snapshot: &mut MetricsSnapshot) {
    for value in [
        &mut snapshot.cpu_percent,
        &mut snapshot.normalized_load,
        &mut snapshot.memory_percent,
        &mut snapshot.memory_available_mb,
        &mut snapshot.disk_percent,
        &mut snapshot.worker_memory_mb,
        &mut snapshot.process_memory_mb,
    ] {
        if !value.is_finite() || *value < 0.0 {
            *value = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting(AtomicUsize);

    impl MetricsSource for Counting {
        fn sample(&self) -> MetricsSnapshot {
            self.0.fetch_add(1, Ordering::SeqCst);
            MetricsSnapshot::neutral()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cache_respects_interval() {
        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = MetricsCache::new(source.clone(), Duration::from_secs(30));
        let _ = cache.snapshot();
        let _ = cache.snapshot();
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = cache.snapshot();
        assert_eq!(source.0.load(Ordering::SeqCst), 2);

        let _ = cache.refresh();
        assert_eq!(source.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn sanitize_zeroes_bad_values() {
        let mut s = MetricsSnapshot::neutral();
        s.cpu_percent = f64::NAN;
        s.disk_percent = -4.0;
        s.memory_percent = 50.0;
        sanitize(&mut s);
        assert!(s.cpu_percent.abs() < f64::EPSILON);
        assert!(s.disk_percent.abs() < f64::EPSILON);
        assert!((s.memory_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn system_monitor_sample_is_sane() {
        let monitor = SystemMonitor::new(&["chrome".to_string()]);
        let s = monitor.sample();
        assert!(s.cpu_cores >= 1);
        assert!(s.memory_percent >= 0.0 && s.memory_percent <= 100.0);
        assert!(s.disk_percent >= 0.0 && s.disk_percent <= 100.0);
    }

    #[test]
    fn cpu_is_measured_once_counters_have_a_delta() {
        let monitor = SystemMonitor::new(&[]);
        let early = monitor.sample();
        assert!(!early.cpu_measured);
        assert!(early.cpu_percent.abs() < f64::EPSILON);

        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL + Duration::from_millis(50));
        let later = monitor.sample();
        assert!(later.cpu_measured);
        assert!((0.0..=100.0).contains(&later.cpu_percent));
        // A quick resample reuses the last reading.
        assert!(monitor.sample().cpu_measured);
    }

    #[test]
    fn worker_matching_is_case_insensitive() {
        let monitor = SystemMonitor::new(&["Chrome".to_string()]);
        assert!(monitor.is_worker("google-CHROME"));
        assert!(!monitor.is_worker("firefox"));
    }
}
