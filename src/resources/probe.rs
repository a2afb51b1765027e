//! Host memory and CPU readings.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use sysinfo::System;

/// Source of host memory and core counts.
///
/// Readings are synchronous and cheap; they run before any expensive
/// suspension point.
pub trait MemoryProbe: Send + Sync {
    /// Total physical memory in bytes, or 0 if unknown.
    fn total_memory(&self) -> u64;

    /// Memory currently available to the process in bytes, or 0 if unknown.
    fn available_memory(&self) -> u64;

    /// Number of logical CPU cores, or 0 if unknown.
    fn logical_cores(&self) -> usize;
}

/// Probe backed by the operating system.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
    cores: AtomicUsize,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            cores: AtomicUsize::new(0),
        }
    }

    fn with_refreshed<T>(&self, read: impl FnOnce(&System) -> T, fallback: T) -> T {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                read(&system)
            }
            Err(_) => {
                tracing::warn!("memory probe lock poisoned, reporting unknown memory");
                fallback
            }
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn total_memory(&self) -> u64 {
        self.with_refreshed(|s| s.total_memory(), 0)
    }

    fn available_memory(&self) -> u64 {
        self.with_refreshed(|s| s.available_memory(), 0)
    }

    fn logical_cores(&self) -> usize {
        let cached = self.cores.load(Ordering::Relaxed);
        if cached > 0 {
            return cached;
        }
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(0);
        self.cores.store(count, Ordering::Relaxed);
        count
    }
}

impl std::fmt::Debug for SystemMemoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemoryProbe")
            .field("cores", &self.cores.load(Ordering::Relaxed))
            .finish()
    }
}

/// Probe with caller-supplied readings.
///
/// Available memory can be changed at runtime to simulate memory pressure.
#[derive(Debug)]
pub struct FixedMemoryProbe {
    total: u64,
    available: AtomicU64,
    cores: usize,
}

impl FixedMemoryProbe {
    pub fn new(total: u64, available: u64, cores: usize) -> Self {
        Self {
            total,
            available: AtomicU64::new(available),
            cores,
        }
    }

    pub fn set_available(&self, bytes: u64) {
        self.available.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn total_memory(&self) -> u64 {
        self.total
    }

    fn available_memory(&self) -> u64 {
        self.available.load(Ordering::Relaxed)
    }

    fn logical_cores(&self) -> usize {
        self.cores
    }
}
