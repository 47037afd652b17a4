//! System-stats provider seam.
//!
//! The default [`ProcStatsProvider`] reads Linux `/proc`. Files that are
//! missing or unreadable contribute zeros, so other platforms still get a
//! well-formed (if empty) sample. CPU utilisation is the difference between
//! consecutive `/proc/stat` readings; the first sample covers the time since
//! boot (host) or process start (process).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::CollectorError;

/// Ticks per second of `/proc` time fields (`USER_HZ`).
const CLOCK_TICKS: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuStats {
    pub cores: usize,
    pub load_average_1m: f64,
    pub load_average_5m: f64,
    pub load_average_15m: f64,
    /// 1-minute load over core count, capped at 1.
    pub load_ratio: f64,
    /// Busy share of all CPU time since the previous sample.
    pub usage_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub usage_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskStats {
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub usage_ratio: f64,
    pub read_bytes: u64,
    pub written_bytes: u64,
}

impl DiskStats {
    fn set_capacity(&mut self, total_bytes: u64, available_bytes: u64) {
        self.total_bytes = total_bytes;
        self.available_bytes = available_bytes.min(total_bytes);
        self.used_bytes = total_bytes - self.available_bytes;
        self.usage_ratio = if total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / total_bytes as f64
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessStats {
    pub pid: u32,
    pub resident_memory_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub threads: u64,
    pub open_fds: u64,
    pub cpu_seconds_total: f64,
    /// Process CPU time over wall time and core count, since the previous sample.
    pub cpu_usage_ratio: f64,
    /// Unix timestamp of process start.
    pub start_time_seconds: f64,
}

/// One read-only sample of host and process statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
    pub process: ProcessStats,
}

/// Source of [`SystemStats`].
#[async_trait]
pub trait SystemStatsProvider: Send + Sync {
    async fn sample(&self) -> Result<SystemStats, CollectorError>;
}

/// Aggregate `cpu` line of `/proc/stat`, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|line| line.starts_with("cpu "))?;
        let mut fields = line.split_whitespace().skip(1);
        let mut next = || fields.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        Some(Self {
            user: next(),
            nice: next(),
            system: next(),
            idle: next(),
            iowait: next(),
            irq: next(),
            softirq: next(),
            steal: next(),
        })
    }

    fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
            + self.steal
    }

    fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    fn usage_since(&self, previous: &CpuTimes) -> f64 {
        let total = self.total().saturating_sub(previous.total());
        if total == 0 {
            return 0.0;
        }
        let busy = self.busy().saturating_sub(previous.busy());
        (busy as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// CPU and start time fields of `/proc/self/stat`, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ProcessTimes {
    cpu_ticks: u64,
    start_ticks: u64,
}

/// Fields after the parenthesised command name, which may contain spaces.
fn parse_process_stat(text: &str) -> Option<ProcessTimes> {
    let (_, rest) = text.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |index: usize| fields.get(index).and_then(|v| v.parse::<u64>().ok());
    // rest[0] is field 3 (state): utime = 14, stime = 15, starttime = 22.
    Some(ProcessTimes {
        cpu_ticks: field(11)? + field(12)?,
        start_ticks: field(19)?,
    })
}

fn parse_boot_time(stat: &str) -> Option<u64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn parse_uptime(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse::<f64>().ok()
}

#[derive(Debug, Default)]
struct PreviousSample {
    cpu: CpuTimes,
    /// Process CPU ticks and host uptime at the previous sample.
    process: Option<(u64, f64)>,
}

/// Provider reading `/proc`, plus filesystem capacity of one mount.
#[derive(Debug)]
pub struct ProcStatsProvider {
    root: PathBuf,
    disk_path: PathBuf,
    previous: Mutex<PreviousSample>,
}

impl Default for ProcStatsProvider {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcStatsProvider {
    /// Provider reading from `root` instead of `/proc`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            disk_path: PathBuf::from("/"),
            previous: Mutex::new(PreviousSample::default()),
        }
    }

    /// Report capacity of the filesystem holding `path` (default `/`).
    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    async fn read(&self, relative: &str) -> Option<String> {
        tokio::fs::read_to_string(self.root.join(relative)).await.ok()
    }

    async fn count_fds(&self) -> u64 {
        let Ok(mut entries) = tokio::fs::read_dir(self.root.join("self/fd")).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        count
    }

    async fn disk(&self) -> DiskStats {
        let mut disk = self.read("diskstats").await.map(|t| parse_diskstats(&t)).unwrap_or_default();
        let path = self.disk_path.clone();
        match tokio::task::spawn_blocking(move || filesystem_capacity(&path)).await {
            Ok(Some((mount_point, total, available))) => {
                disk.mount_point = mount_point;
                disk.set_capacity(total, available);
            }
            Ok(None) => tracing::debug!(path = %self.disk_path.display(), "no filesystem found"),
            Err(err) => tracing::debug!(error = %err, "filesystem capacity lookup failed"),
        }
        disk
    }

    fn cpu_usage(&self, stat: Option<&str>) -> f64 {
        let Some(current) = stat.and_then(CpuTimes::parse) else {
            return 0.0;
        };
        let mut previous = self.previous.lock();
        let usage = current.usage_since(&previous.cpu);
        previous.cpu = current;
        usage
    }

    fn process_cpu(
        &self,
        process: &mut ProcessStats,
        times: ProcessTimes,
        uptime: Option<f64>,
        boot_time: Option<u64>,
        cores: usize,
    ) {
        let started_after_boot = times.start_ticks as f64 / CLOCK_TICKS;
        process.cpu_seconds_total = times.cpu_ticks as f64 / CLOCK_TICKS;
        if let Some(boot_time) = boot_time {
            process.start_time_seconds = boot_time as f64 + started_after_boot;
        }
        let Some(uptime) = uptime else {
            return;
        };

        let mut previous = self.previous.lock();
        let (ticks_before, uptime_before) =
            previous.process.unwrap_or((0, started_after_boot));
        previous.process = Some((times.cpu_ticks, uptime));
        drop(previous);

        let wall = uptime - uptime_before;
        if wall > 0.0 && cores > 0 {
            let cpu = times.cpu_ticks.saturating_sub(ticks_before) as f64 / CLOCK_TICKS;
            process.cpu_usage_ratio = (cpu / wall / cores as f64).clamp(0.0, 1.0);
        }
    }
}

/// Mount point, total and available bytes of the filesystem holding `path`.
fn filesystem_capacity(path: &Path) -> Option<(String, u64, u64)> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| {
            (
                disk.mount_point().display().to_string(),
                disk.total_space(),
                disk.available_space(),
            )
        })
}

#[async_trait]
impl SystemStatsProvider for ProcStatsProvider {
    async fn sample(&self) -> Result<SystemStats, CollectorError> {
        let cores = num_cpus::get();
        let stat = self.read("stat").await;

        let mut cpu = self
            .read("loadavg")
            .await
            .map(|text| parse_loadavg(&text, cores))
            .unwrap_or(CpuStats { cores, ..CpuStats::default() });
        cpu.usage_ratio = self.cpu_usage(stat.as_deref());

        let memory = self.read("meminfo").await.map(|t| parse_meminfo(&t)).unwrap_or_default();
        let disk = self.disk().await;
        let network = self.read("net/dev").await.map(|t| parse_net_dev(&t)).unwrap_or_default();

        let mut process = self
            .read("self/status")
            .await
            .map(|t| parse_process_status(&t))
            .unwrap_or_default();
        process.pid = std::process::id();
        process.open_fds = self.count_fds().await;
        if let Some(times) = self.read("self/stat").await.as_deref().and_then(parse_process_stat) {
            let uptime = self.read("uptime").await.as_deref().and_then(parse_uptime);
            let boot_time = stat.as_deref().and_then(parse_boot_time);
            self.process_cpu(&mut process, times, uptime, boot_time, cores);
        }

        Ok(SystemStats { cpu, memory, disk, network, process })
    }
}

fn parse_loadavg(text: &str, cores: usize) -> CpuStats {
    let mut loads = text.split_whitespace().map(|v| v.parse::<f64>().unwrap_or(0.0));
    let load_average_1m = loads.next().unwrap_or(0.0);
    let load_average_5m = loads.next().unwrap_or(0.0);
    let load_average_15m = loads.next().unwrap_or(0.0);
    let load_ratio = if cores == 0 {
        0.0
    } else {
        (load_average_1m / cores as f64).clamp(0.0, 1.0)
    };
    CpuStats {
        cores,
        load_average_1m,
        load_average_5m,
        load_average_15m,
        load_ratio,
        usage_ratio: 0.0,
    }
}

/// Value of a `Key:   1234 kB` line, in bytes.
fn kib_field(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        let value = rest.split_whitespace().next()?.parse::<u64>().ok()?;
        Some(if rest.trim_end().ends_with("kB") { value * 1024 } else { value })
    })
}

fn parse_meminfo(text: &str) -> MemoryStats {
    let total_bytes = kib_field(text, "MemTotal").unwrap_or(0);
    let available_bytes = kib_field(text, "MemAvailable")
        .or_else(|| kib_field(text, "MemFree"))
        .unwrap_or(0);
    let used_bytes = total_bytes.saturating_sub(available_bytes);
    let usage_ratio = if total_bytes == 0 {
        0.0
    } else {
        used_bytes as f64 / total_bytes as f64
    };
    MemoryStats { total_bytes, available_bytes, used_bytes, usage_ratio }
}

const SECTOR_BYTES: u64 = 512;

/// Whole block devices only; partitions and loop/ram devices are skipped.
fn parse_diskstats(text: &str) -> DiskStats {
    let mut devices: Vec<&str> = Vec::new();
    let mut stats = DiskStats::default();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }
        if devices.iter().any(|device| name.len() > device.len() && name.starts_with(device)) {
            continue;
        }
        devices.push(name);
        let sectors_read = fields[5].parse::<u64>().unwrap_or(0);
        let sectors_written = fields[9].parse::<u64>().unwrap_or(0);
        stats.read_bytes += sectors_read * SECTOR_BYTES;
        stats.written_bytes += sectors_written * SECTOR_BYTES;
    }
    stats
}

fn parse_net_dev(text: &str) -> NetworkStats {
    let mut stats = NetworkStats::default();
    for line in text.lines().skip(2) {
        let Some((interface, counters)) = line.split_once(':') else {
            continue;
        };
        if interface.trim() == "lo" {
            continue;
        }
        let fields: Vec<u64> = counters
            .split_whitespace()
            .map(|v| v.parse::<u64>().unwrap_or(0))
            .collect();
        if fields.len() >= 9 {
            stats.received_bytes += fields[0];
            stats.transmitted_bytes += fields[8];
        }
    }
    stats
}

fn parse_process_status(text: &str) -> ProcessStats {
    let threads = text
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    ProcessStats {
        resident_memory_bytes: kib_field(text, "VmRSS").unwrap_or(0),
        virtual_memory_bytes: kib_field(text, "VmSize").unwrap_or(0),
        threads,
        ..ProcessStats::default()
    }
}
