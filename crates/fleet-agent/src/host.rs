//! Host load sampling from procfs

use std::time::Duration;
use tracing::debug;

/// Point-in-time load of this host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostLoad {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub cpu_count: u32,
    pub memory_total_mb: u64,
}

/// Aggregate CPU jiffies from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse().ok())
        .collect::<Option<_>>()?;

    if fields.len() < 4 {
        return None;
    }

    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    // guest time is already counted in user/nice
    let total = fields.iter().take(8).sum();
    Some(CpuTimes { idle, total })
}

/// Busy percentage between two samples
pub fn cpu_percent_between(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let idle = after.idle.saturating_sub(before.idle).min(total);
    (total - idle) as f64 / total as f64 * 100.0
}

/// Memory totals from `/proc/meminfo`, in kB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn used_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        let used = self.total_kb.saturating_sub(self.available_kb);
        used as f64 / self.total_kb as f64 * 100.0
    }

    pub fn total_mb(&self) -> u64 {
        self.total_kb / 1024
    }
}

/// Parse `/proc/meminfo`. Kernels without `MemAvailable` fall back to
/// free + buffers + cached.
pub fn parse_meminfo(meminfo: &str) -> Option<MemInfo> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next()?.parse().ok())
    };

    let total_kb = field("MemTotal")?;
    let available_kb = field("MemAvailable").or_else(|| {
        Some(field("MemFree")? + field("Buffers").unwrap_or(0) + field("Cached").unwrap_or(0))
    })?;

    Some(MemInfo {
        total_kb,
        available_kb,
    })
}

async fn read_cpu_times() -> Option<CpuTimes> {
    let stat = tokio::fs::read_to_string("/proc/stat").await.ok()?;
    parse_cpu_times(&stat)
}

/// Sample host load; CPU is measured over `window`.
///
/// Fields that cannot be read (non-Linux hosts) are reported as zero.
pub async fn sample(window: Duration) -> HostLoad {
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(0);

    let cpu_percent = match read_cpu_times().await {
        Some(before) => {
            tokio::time::sleep(window).await;
            read_cpu_times()
                .await
                .map(|after| cpu_percent_between(before, after))
                .unwrap_or(0.0)
        }
        None => 0.0,
    };

    let memory = match tokio::fs::read_to_string("/proc/meminfo").await {
        Ok(content) => parse_meminfo(&content),
        Err(e) => {
            debug!(error = %e, "Cannot read /proc/meminfo");
            None
        }
    };

    HostLoad {
        cpu_percent,
        memory_percent: memory.map(|m| m.used_percent()).unwrap_or(0.0),
        cpu_count,
        memory_total_mb: memory.map(|m| m.total_mb()).unwrap_or(0),
    }
}

/// Hostname from the kernel, if available
pub fn hostname() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
}
