use std::path::Path;

use parking_lot::Mutex;
use sysinfo::System;

use crate::types::MemoryInfo;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Host facilities the bridge queries: memory figures and the filesystem
pub trait HostEnvironment: Send + Sync {
    fn memory_info(&self) -> MemoryInfo;

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// [`HostEnvironment`] backed by the operating system
pub struct SystemEnvironment {
    system: Mutex<System>,
}

impl SystemEnvironment {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnvironment for SystemEnvironment {
    /// Resident size of this process and memory still available to the system, in MB
    fn memory_info(&self) -> MemoryInfo {
        let mut system = self.system.lock();
        system.refresh_memory();

        let used_bytes = match sysinfo::get_current_pid() {
            Ok(pid) => {
                system.refresh_process(pid);
                system.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            Err(e) => {
                tracing::debug!("Process id unavailable: {}", e);
                0
            }
        };

        MemoryInfo {
            used_memory_mb: used_bytes / BYTES_PER_MB,
            available_memory_mb: system.available_memory() / BYTES_PER_MB,
        }
    }
}
