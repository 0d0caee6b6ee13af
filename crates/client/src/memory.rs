//! Process memory monitoring.
//!
//! A background task samples process memory on a fixed interval and publishes
//! [`MemoryEvent`]s on a broadcast channel when usage crosses the configured
//! threshold or resident memory jumps by more than [`RSS_LEAK_DELTA_MB`]
//! between ticks. Sampling is independent of the request path and event
//! emission never blocks the sampling loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// RSS growth between consecutive samples that is flagged as a potential
/// leak.
pub const RSS_LEAK_DELTA_MB: f64 = 50.0;

const EVENT_CHANNEL_CAPACITY: usize = 16;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point-in-time memory snapshot, all fields in megabytes.
///
/// Field mapping on this runtime: `rss_mb` and `heap_used_mb` are the
/// process resident set, `heap_total_mb` is total system memory, and
/// `external_mb` is the non-resident part of the process virtual size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    pub rss_mb: f64,
    pub heap_used_mb: f64,
    pub heap_total_mb: f64,
    pub external_mb: f64,
}

impl MemorySample {
    /// Heap usage as a percentage of the total, 0 when the total is unknown.
    pub fn usage_percent(&self) -> f64 {
        if self.heap_total_mb <= 0.0 {
            0.0
        } else {
            self.heap_used_mb / self.heap_total_mb * 100.0
        }
    }
}

/// Events published by the monitor.
#[derive(Debug, Clone)]
pub enum MemoryEvent {
    /// Heap usage crossed the configured threshold.
    ThresholdExceeded {
        sample: MemorySample,
        usage_percent: f64,
        threshold_percent: f64,
    },
    /// Resident memory grew more than [`RSS_LEAK_DELTA_MB`] since the
    /// previous sample.
    LeakDetected { delta_mb: f64, sample: MemorySample },
}

/// Reads process/system memory through sysinfo.
struct Sampler {
    system: System,
    pid: Option<Pid>,
}

impl Sampler {
    fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                warn!(error = err, "could not resolve current pid; process samples will be zero");
                None
            }
        };
        Self { system: System::new(), pid }
    }

    fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();

        let (rss, virt) = match self.pid {
            Some(pid) => {
                self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                self.system
                    .process(pid)
                    .map(|process| (process.memory(), process.virtual_memory()))
                    .unwrap_or((0, 0))
            }
            None => (0, 0),
        };

        let rss_mb = rss as f64 / BYTES_PER_MB;
        MemorySample {
            rss_mb,
            heap_used_mb: rss_mb,
            heap_total_mb: self.system.total_memory() as f64 / BYTES_PER_MB,
            external_mb: virt.saturating_sub(rss) as f64 / BYTES_PER_MB,
        }
    }
}

/// Periodic sampler of process memory with threshold/leak signaling.
///
/// Owned by a single client; the sampling task is started explicitly and
/// stopped by [`MemoryMonitor::stop`] or on drop.
pub struct MemoryMonitor {
    threshold_percent: f64,
    events: broadcast::Sender<MemoryEvent>,
    sampler: Arc<Mutex<Sampler>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    /// Create a monitor with the given usage threshold (percent).
    pub fn new(threshold_percent: f64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            threshold_percent,
            events,
            sampler: Arc::new(Mutex::new(Sampler::new())),
            task: Mutex::new(None),
        }
    }

    /// Start periodic sampling. Idempotent while a task is running; a no-op
    /// outside a tokio runtime.
    pub fn start(&self, interval: Duration) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("memory monitoring requested outside a tokio runtime; sampler not started");
            return;
        };

        let sampler = Arc::clone(&self.sampler);
        let events = self.events.clone();
        let threshold_percent = self.threshold_percent;

        *task = Some(handle.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut previous_rss_mb: Option<f64> = None;

            loop {
                ticker.tick().await;

                let sample = sampler.lock().sample();
                let usage_percent = sample.usage_percent();
                debug!(
                    rss_mb = sample.rss_mb,
                    usage_percent,
                    "memory sample"
                );

                if usage_percent > threshold_percent {
                    warn!(
                        usage_percent,
                        threshold_percent, "memory threshold exceeded"
                    );
                    let _ = events.send(MemoryEvent::ThresholdExceeded {
                        sample,
                        usage_percent,
                        threshold_percent,
                    });
                }

                if let Some(previous) = previous_rss_mb {
                    let delta_mb = sample.rss_mb - previous;
                    if delta_mb > RSS_LEAK_DELTA_MB {
                        error!(delta_mb, rss_mb = sample.rss_mb, "possible memory leak");
                        let _ = events.send(MemoryEvent::LeakDetected { delta_mb, sample });
                    }
                }
                previous_rss_mb = Some(sample.rss_mb);
            }
        }));
    }

    /// Stop the sampling task if it is running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Whether the sampling task is currently running.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Take an instantaneous snapshot, independent of whether sampling has
    /// been started.
    pub fn current_usage(&self) -> MemorySample {
        self.sampler.lock().sample()
    }

    /// Subscribe to threshold/leak events.
    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.events.subscribe()
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_usage_works_without_start() {
        let monitor = MemoryMonitor::new(80.0);
        let sample = monitor.current_usage();

        assert!(sample.rss_mb >= 0.0);
        assert!(sample.heap_used_mb >= 0.0);
        assert!(sample.heap_total_mb >= 0.0);
        assert!(sample.external_mb >= 0.0);
    }

    #[test]
    fn a_running_process_has_resident_memory() {
        let monitor = MemoryMonitor::new(80.0);
        let sample = monitor.current_usage();

        assert!(sample.rss_mb > 0.0, "our own process should be resident");
        assert!(sample.heap_total_mb > sample.heap_used_mb);
    }

    #[test]
    fn usage_percent_handles_zero_total() {
        let sample =
            MemorySample { rss_mb: 10.0, heap_used_mb: 10.0, heap_total_mb: 0.0, external_mb: 0.0 };
        assert_eq!(sample.usage_percent(), 0.0);
    }

    #[test]
    fn usage_percent_is_a_ratio() {
        let sample = MemorySample {
            rss_mb: 25.0,
            heap_used_mb: 25.0,
            heap_total_mb: 100.0,
            external_mb: 0.0,
        };
        assert!((sample.usage_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn start_and_stop_control_the_sampling_task() {
        let monitor = MemoryMonitor::new(80.0);
        assert!(!monitor.is_running());

        monitor.start(Duration::from_millis(50));
        assert!(monitor.is_running());

        // Second start is a no-op while running.
        monitor.start(Duration::from_millis(50));

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn subscribe_receives_no_events_when_under_threshold() {
        // Threshold of 100% cannot be crossed, so the receiver stays empty.
        let monitor = MemoryMonitor::new(100.0);
        let mut events = monitor.subscribe();

        monitor.start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.stop();

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }
}
