//! Memory region monitoring
//!
//! Usage figures for the two regions the generators fill. The heap monitor
//! reads process/system figures where the platform exposes them and falls
//! back to internally tracked bytes elsewhere; the metadata monitor is a
//! plain byte counter maintained by the code-loading facility. Figures are
//! monotonically meaningful, not bit-exact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Assumed total when the platform exposes no figure (8 GiB)
const DEFAULT_REGION_TOTAL: u64 = 8 * 1024 * 1024 * 1024;

/// Heap-region usage snapshot: the three figures a status report carries
#[derive(Debug, Clone, Copy)]
pub struct HeapUsage {
    pub current: u64,
    pub maximum: u64,
    pub free: u64,
}

/// Heap-region monitor (thread-safe)
///
/// Tracks bytes the generator has handed to the allocator, and prefers the
/// process resident set over the tracked figure when the platform can
/// report it.
#[derive(Clone, Default)]
pub struct HeapRegionMonitor {
    tracked: Arc<AtomicU64>,
}

impl HeapRegionMonitor {
    pub fn new() -> Self {
        Self {
            tracked: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record bytes handed to the allocator
    pub fn record_allocation(&self, bytes: u64) {
        self.tracked.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes released back for reclamation
    pub fn record_reclaim(&self, bytes: u64) {
        self.tracked.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Bytes currently tracked by this monitor
    pub fn tracked_bytes(&self) -> u64 {
        self.tracked.load(Ordering::Relaxed)
    }

    /// Get the current heap-region figures
    pub fn usage(&self) -> HeapUsage {
        let current = resident_bytes().unwrap_or_else(|| self.tracked_bytes());
        let maximum = system_total_bytes();
        HeapUsage {
            current,
            maximum,
            free: maximum.saturating_sub(current),
        }
    }
}

/// Resident set size of this process, where the platform exposes it
#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<u64> {
    None
}

/// Total system memory, defaulting to 8 GiB if unknown
fn system_total_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
            for line in meminfo.lines() {
                if let Some(rest) = line.strip_prefix("MemTotal:") {
                    if let Some(kb) = rest
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        return kb * 1024;
                    }
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        if let Some(bytes) = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            return bytes;
        }
    }

    DEFAULT_REGION_TOTAL
}

/// Metadata-region monitor (thread-safe)
///
/// Counts bytes occupied by registered code unit definitions. Handles are
/// cheap clones sharing one counter.
#[derive(Clone, Default)]
pub struct MetadataRegionMonitor {
    used: Arc<AtomicU64>,
}

impl MetadataRegionMonitor {
    pub fn new() -> Self {
        Self {
            used: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record the metadata footprint of one registered definition
    pub fn record_definition(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes currently occupied in the metadata region
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

/// Process-wide metadata-region monitor instance
static METADATA_REGION: once_cell::sync::Lazy<MetadataRegionMonitor> =
    once_cell::sync::Lazy::new(MetadataRegionMonitor::new);

/// One-time capability probe for the metadata-region monitor.
///
/// Yields a handle to thread into a generator at construction; `None` means
/// the region cannot be observed and usage reporting stays disabled for the
/// life of that generator.
pub fn probe_metadata_region() -> Option<MetadataRegionMonitor> {
    debug!("metadata region monitor probe succeeded");
    Some(METADATA_REGION.clone())
}
