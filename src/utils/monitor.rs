use std::time::Duration;
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::Instant;
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resource usage sampled at the end of one filter phase.
#[derive(Debug, Clone)]
pub struct PhaseSample {
    pub phase: String,
    pub phase_time: Duration,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
}

pub fn messages_per_second(messages: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        messages as f64 / secs
    } else {
        0.0
    }
}

/// 最耗時的階段
pub fn slowest_phase(samples: &[PhaseSample]) -> Option<&PhaseSample> {
    samples.iter().max_by_key(|s| s.phase_time)
}

#[cfg(feature = "cli")]
struct MonitorState {
    system: System,
    pid: Pid,
    phase_started: Instant,
    samples: Vec<PhaseSample>,
}

/// Records how long each filter phase took and what the process used meanwhile.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    state: Option<Mutex<MonitorState>>,
    started: Instant,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let state = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => {
                    let mut system = System::new();
                    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
                    Some(Mutex::new(MonitorState {
                        system,
                        pid,
                        phase_started: Instant::now(),
                        samples: Vec::new(),
                    }))
                }
                Err(e) => {
                    tracing::warn!("Process monitoring unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            state,
            started: Instant::now(),
        }
    }

    /// Closes the current phase and starts timing the next one.
    pub fn sample(&self, phase: &str) -> Option<PhaseSample> {
        let mut state = self.state.as_ref()?.lock().ok()?;
        let pid = state.pid;
        state
            .system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), false);

        let (cpu_usage, memory_mb) = {
            let process = state.system.process(pid)?;
            (process.cpu_usage(), process.memory() / 1024 / 1024)
        };
        let peak_memory_mb = state
            .samples
            .iter()
            .map(|s| s.peak_memory_mb)
            .max()
            .unwrap_or(0)
            .max(memory_mb);

        let now = Instant::now();
        let sample = PhaseSample {
            phase: phase.to_string(),
            phase_time: now.duration_since(state.phase_started),
            cpu_usage,
            memory_mb,
            peak_memory_mb,
        };
        state.phase_started = now;
        state.samples.push(sample.clone());
        Some(sample)
    }

    pub fn samples(&self) -> Vec<PhaseSample> {
        self.state
            .as_ref()
            .and_then(|state| state.lock().ok().map(|s| s.samples.clone()))
            .unwrap_or_default()
    }

    pub fn log_stats(&self, phase: &str) {
        if let Some(sample) = self.sample(phase) {
            tracing::info!(
                "📊 {} took {:.3}s - CPU: {:.1}%, Memory: {}MB, Peak: {}MB",
                sample.phase,
                sample.phase_time.as_secs_f64(),
                sample.cpu_usage,
                sample.memory_mb,
                sample.peak_memory_mb
            );
        }
    }

    /// Summarizes the run once the output bag is closed.
    pub fn log_final_stats(&self, messages_written: u64) {
        if !self.is_enabled() {
            return;
        }
        let samples = self.samples();
        let elapsed = self.started.elapsed();
        let peak = samples.iter().map(|s| s.peak_memory_mb).max().unwrap_or(0);

        tracing::info!(
            "📊 Final Stats - {} messages in {:.3}s ({:.0} msg/s), Peak Memory: {}MB",
            messages_written,
            elapsed.as_secs_f64(),
            messages_per_second(messages_written, elapsed),
            peak
        );
        if let Some(slowest) = slowest_phase(&samples) {
            tracing::info!(
                "📊 Slowest phase: {} ({:.3}s)",
                slowest.phase,
                slowest.phase_time.as_secs_f64()
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 建置沒有 sysinfo，提供空實現
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self, _messages_written: u64) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(phase: &str, millis: u64) -> PhaseSample {
        PhaseSample {
            phase: phase.to_string(),
            phase_time: Duration::from_millis(millis),
            cpu_usage: 0.0,
            memory_mb: 10,
            peak_memory_mb: 10,
        }
    }

    #[test]
    fn test_messages_per_second() {
        assert_eq!(messages_per_second(500, Duration::from_secs(2)), 250.0);
        assert_eq!(messages_per_second(500, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_slowest_phase() {
        let samples = vec![sample("Scan", 20), sample("Write", 900), sample("Plan", 1)];
        assert_eq!(slowest_phase(&samples).map(|s| s.phase.as_str()), Some("Write"));
        assert!(slowest_phase(&[]).is_none());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = SystemMonitor::default();
        assert!(!monitor.is_enabled());
        assert!(monitor.sample("Scan").is_none());
        assert!(monitor.samples().is_empty());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_enabled_monitor_keeps_phase_order() {
        let monitor = SystemMonitor::new(true);
        if monitor.sample("Scan").is_some() {
            monitor.sample("Write");
            let phases: Vec<String> = monitor.samples().into_iter().map(|s| s.phase).collect();
            assert_eq!(phases, vec!["Scan".to_string(), "Write".to_string()]);
            assert!(monitor.samples()[1].peak_memory_mb >= monitor.samples()[0].memory_mb);
        }
    }
}
