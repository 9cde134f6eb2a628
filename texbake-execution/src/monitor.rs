//! System resource sampling for scale-down decisions

use sysinfo::System;

/// One utilisation sample, both values in percent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub ram_percent: f32,
}

impl ResourceSample {
    pub fn new(cpu_percent: f32, ram_percent: f32) -> Self {
        Self {
            cpu_percent,
            ram_percent,
        }
    }
}

pub trait ResourceMonitor: Send {
    fn sample(&mut self) -> ResourceSample;
}

/// Samples global CPU and memory usage with `sysinfo`
pub struct SysinfoMonitor {
    system: System,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for SysinfoMonitor {
    fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let ram_percent = if total == 0 {
            0.0
        } else {
            (self.system.used_memory() as f64 / total as f64 * 100.0) as f32
        };
        ResourceSample::new(self.system.global_cpu_usage(), ram_percent)
    }
}
