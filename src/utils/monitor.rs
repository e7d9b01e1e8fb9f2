use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

/// Wall-clock time spent in one pipeline phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTiming {
    pub phase: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub memory_usage_percent: f32,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

struct MonitorState {
    last_mark: Instant,
    phases: Vec<PhaseTiming>,
    peak_memory_mb: u64,
    #[cfg(feature = "cli")]
    system: System,
}

/// Logs per-phase timings and, with the `cli` feature, process CPU and memory.
pub struct SystemMonitor {
    enabled: bool,
    start_time: Instant,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    state: Mutex<MonitorState>,
}

impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        #[cfg(feature = "cli")]
        let system = if enabled {
            let mut system = System::new_with_specifics(RefreshKind::everything());
            // 初始刷新，之後的 CPU 使用率才有比較基準
            system.refresh_all();
            system
        } else {
            System::new()
        };

        Self {
            enabled,
            start_time: now,
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
            state: Mutex::new(MonitorState {
                last_mark: now,
                phases: Vec::new(),
                peak_memory_mb: 0,
                #[cfg(feature = "cli")]
                system,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Closes the current phase and returns its duration.
    pub fn mark_phase(&self, phase: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state.lock().ok()?;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_mark);
        state.last_mark = now;
        state.phases.push(PhaseTiming {
            phase: phase.to_string(),
            elapsed,
        });
        Some(elapsed)
    }

    pub fn phases(&self) -> Vec<PhaseTiming> {
        self.state
            .lock()
            .map(|state| state.phases.clone())
            .unwrap_or_default()
    }

    #[cfg(feature = "cli")]
    pub fn get_stats(&self) -> Option<SystemStats> {
        if !self.enabled {
            return None;
        }

        let mut state = self.state.lock().ok()?;
        state.system.refresh_all();

        let process = state.system.process(self.pid?)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let cpu_usage = process.cpu_usage();
        let total_memory = state.system.total_memory() / 1024 / 1024;
        let memory_percent = if total_memory > 0 {
            (memory_mb as f32 / total_memory as f32) * 100.0
        } else {
            0.0
        };

        // 更新峰值記憶體
        state.peak_memory_mb = state.peak_memory_mb.max(memory_mb);

        Some(SystemStats {
            cpu_usage,
            memory_usage_mb: memory_mb,
            memory_usage_percent: memory_percent,
            peak_memory_mb: state.peak_memory_mb,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    #[cfg(not(feature = "cli"))]
    pub fn get_stats(&self) -> Option<SystemStats> {
        None
    }

    pub fn log_stats(&self, phase: &str) {
        let Some(phase_time) = self.mark_phase(phase) else {
            return;
        };
        match self.get_stats() {
            Some(stats) => tracing::info!(
                "📊 {} ({:?}) - CPU: {:.1}%, Memory: {}MB ({:.1}%), Peak: {}MB, Total: {:?}",
                phase,
                phase_time,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.memory_usage_percent,
                stats.peak_memory_mb,
                stats.elapsed_time
            ),
            None => tracing::info!("📊 {} took {:?}", phase, phase_time),
        }
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let breakdown = self
            .phases()
            .iter()
            .map(|p| format!("{}={:?}", p.phase, p.elapsed))
            .collect::<Vec<_>>()
            .join(", ");
        let peak = self
            .state
            .lock()
            .map(|state| state.peak_memory_mb)
            .unwrap_or(0);
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB, Phases: [{}]",
            self.start_time.elapsed(),
            peak,
            breakdown
        );
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
