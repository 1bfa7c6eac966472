use log::debug;
use once_cell::sync::Lazy;
use sysinfo::{System, SystemExt};

use super::types::{GoMode, MAX_BUDGET_THREADS, MIN_BUDGET_THREADS};

/// Logical cores reported by the host, detected once
static HOST_CORES: Lazy<u32> = Lazy::new(|| {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as u32;
    debug!("Detected {} logical cores", cores);
    cores
});

/// Host resources relevant to engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub cores: u32,
}

impl HostCapabilities {
    pub fn detect() -> Self {
        Self { cores: *HOST_CORES }
    }

    /// Whether searching on more than one thread is worthwhile at all
    pub fn is_multithreaded(&self) -> bool {
        self.cores > 1
    }

    /// Thread count for a search
    ///
    /// Fixed-depth searches run single threaded so results stay reproducible.
    /// Node and time budgets use `clamp(cores, 2, 4)` on multi-core hosts.
    /// An explicit override always wins.
    pub fn threads_for(&self, mode: &GoMode, requested: Option<u32>) -> u32 {
        if let Some(threads) = requested {
            return threads.max(1);
        }

        if mode.is_budgeted() && self.is_multithreaded() {
            self.cores.clamp(MIN_BUDGET_THREADS, MAX_BUDGET_THREADS)
        } else {
            1
        }
    }
}

/// Transposition table size: 1/8 of RAM, between 16 MB and 2 GB
pub fn recommended_hash_mb() -> u32 {
    let total_memory_mb = System::new_all().total_memory() / (1024 * 1024);
    let recommended = (total_memory_mb as u32 / 8).clamp(16, 2048);
    debug!("Recommended hash: {}MB (total memory: {}MB)", recommended, total_memory_mb);
    recommended
}
