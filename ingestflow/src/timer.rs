//! Background timer that periodically invokes a reporting callback.
//!
//! The timer owns one OS thread for its lifetime, running a small
//! current-thread tokio runtime so ticks keep coming while the workflow's own
//! runtime is busy. [`RepeatedTimer::stop`] signals the thread and joins it,
//! so no reporting thread outlives the workflow that started it.

use crate::errors::{panic_message, TimerError};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Default interval between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

type Callback = Arc<dyn Fn() + Send + Sync>;

enum TimerState {
    Idle,
    Running {
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Invokes a callback every `interval` on a background thread.
///
/// Can be started once and stopped once. Not reentrant.
pub struct RepeatedTimer {
    name: String,
    interval: Duration,
    callback: Callback,
    state: TimerState,
}

impl std::fmt::Debug for RepeatedTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepeatedTimer")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RepeatedTimer {
    /// Creates a timer; nothing runs until [`start`](Self::start).
    ///
    /// Fails with [`TimerError::ZeroInterval`] when `interval` is zero.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, TimerError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(TimerError::ZeroInterval(name));
        }
        Ok(Self {
            name,
            interval,
            callback: Arc::new(callback),
            state: TimerState::Idle,
        })
    }

    /// Returns the interval between ticks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    /// Spawns the background thread.
    ///
    /// The thread drives a current-thread tokio runtime. Ticks that fall
    /// behind a slow callback are delayed, not bunched up.
    pub fn start(&mut self) -> Result<(), TimerError> {
        if !matches!(self.state, TimerState::Idle) {
            return Err(TimerError::AlreadyStarted(self.name.clone()));
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let interval = self.interval;
        let callback = Arc::clone(&self.callback);
        let name = self.name.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}-timer", self.name))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!(timer = %name, "Timer runtime could not be built: {e}");
                        return;
                    }
                };

                runtime.block_on(async move {
                    let mut ticks = tokio::time::interval(interval);
                    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // first tick completes immediately
                    ticks.tick().await;

                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => break,
                            _ = ticks.tick() => {
                                if let Err(payload) =
                                    std::panic::catch_unwind(AssertUnwindSafe(|| callback()))
                                {
                                    warn!(
                                        timer = %name,
                                        "Timer callback panicked: {}",
                                        panic_message(payload.as_ref())
                                    );
                                }
                            }
                        }
                    }
                });
            })
            .map_err(|e| TimerError::SpawnFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        debug!(timer = %self.name, interval_ms = interval.as_millis() as u64, "Timer started");
        self.state = TimerState::Running { shutdown, handle };
        Ok(())
    }

    /// Signals the background thread and waits for it to exit.
    ///
    /// Returns true if this call stopped a running timer. Blocks for at most
    /// the duration of an in-flight callback.
    pub fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.state, TimerState::Stopped) {
            TimerState::Running { shutdown, handle } => {
                let _ = shutdown.send(());
                if handle.join().is_err() {
                    warn!(timer = %self.name, "Timer thread exited abnormally");
                }
                debug!(timer = %self.name, "Timer stopped");
                true
            }
            TimerState::Idle | TimerState::Stopped => false,
        }
    }
}

impl Drop for RepeatedTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(interval_ms: u64) -> (RepeatedTimer, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let timer = RepeatedTimer::new("test", Duration::from_millis(interval_ms), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (timer, ticks)
    }

    #[test]
    fn test_timer_ticks_until_stopped() {
        let (mut timer, ticks) = counting_timer(10);

        timer.start().unwrap();
        assert!(timer.is_running());
        std::thread::sleep(Duration::from_millis(100));
        assert!(timer.stop());
        assert!(!timer.is_running());

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected at least two ticks, got {after_stop}");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_timer_does_not_tick_before_interval() {
        let (mut timer, ticks) = counting_timer(10_000);

        timer.start().unwrap();
        assert!(timer.stop());
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = RepeatedTimer::new("spinning", Duration::ZERO, || {});

        assert_eq!(
            result.unwrap_err(),
            TimerError::ZeroInterval("spinning".to_string())
        );
    }

    #[test]
    fn test_timer_starts_once() {
        let (mut timer, _) = counting_timer(1_000);

        timer.start().unwrap();
        assert_eq!(
            timer.start(),
            Err(TimerError::AlreadyStarted("test".to_string()))
        );
        assert!(timer.stop());
        assert!(timer.start().is_err());
    }

    #[test]
    fn test_timer_stops_once() {
        let (mut timer, _) = counting_timer(1_000);

        assert!(!timer.stop());
        let (mut timer2, _) = counting_timer(1_000);
        timer2.start().unwrap();
        assert!(timer2.stop());
        assert!(!timer2.stop());
    }

    #[test]
    fn test_timer_survives_panicking_callback() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut timer = RepeatedTimer::new("panicky", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("report failed");
        })
        .unwrap();

        timer.start().unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert!(timer.stop());
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_drop_joins_thread() {
        let (mut timer, ticks) = counting_timer(5);
        timer.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        drop(timer);

        let after_drop = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }
}
