//! Wake conditions for the render thread.
//!
//! The render thread blocks on three auto-reset conditions and reacts to the
//! first one signaled, checked in priority order: shutdown, stream switch,
//! samples ready.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// The condition that woke the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Shutdown,
    StreamSwitch,
    SamplesReady,
}

#[derive(Debug, Default)]
struct Pending {
    shutdown: bool,
    stream_switch: bool,
    samples_ready: bool,
}

impl Pending {
    /// Takes the highest-priority pending condition, resetting it.
    fn take(&mut self) -> Option<Wake> {
        if std::mem::take(&mut self.shutdown) {
            Some(Wake::Shutdown)
        } else if std::mem::take(&mut self.stream_switch) {
            Some(Wake::StreamSwitch)
        } else if std::mem::take(&mut self.samples_ready) {
            Some(Wake::SamplesReady)
        } else {
            None
        }
    }
}

/// The set of wake conditions shared by the engine, notifications and the device.
#[derive(Debug, Default)]
pub(crate) struct WakeSignals {
    pending: Mutex<Pending>,
    cond: Condvar,
}

impl WakeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_shutdown(&self) {
        self.signal(|p| p.shutdown = true);
    }

    pub fn signal_stream_switch(&self) {
        self.signal(|p| p.stream_switch = true);
    }

    pub fn signal_samples_ready(&self) {
        self.signal(|p| p.samples_ready = true);
    }

    /// Clears shutdown and readiness before a fresh render thread starts.
    ///
    /// A pending stream switch survives so a device lost while stopped is
    /// handled once rendering resumes.
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        pending.shutdown = false;
        pending.samples_ready = false;
    }

    /// Blocks until a condition is signaled and consumes it.
    pub fn wait(&self) -> Wake {
        let mut pending = self.pending.lock();
        loop {
            if let Some(wake) = pending.take() {
                return wake;
            }
            self.cond.wait(&mut pending);
        }
    }

    fn signal(&self, set: impl FnOnce(&mut Pending)) {
        let mut pending = self.pending.lock();
        set(&mut pending);
        self.cond.notify_one();
    }
}

/// Handle a device uses to announce that it wants more audio.
///
/// Passed to [`AudioClient::set_ready_signal()`]; the device calls
/// [`notify()`](ReadySignal::notify) once per period. Repeated notifications
/// before the render thread wakes collapse into one.
///
/// [`AudioClient::set_ready_signal()`]: crate::endpoint::AudioClient::set_ready_signal
#[derive(Debug, Clone)]
pub struct ReadySignal {
    wake: Arc<WakeSignals>,
}

impl ReadySignal {
    pub(crate) fn new(wake: Arc<WakeSignals>) -> Self {
        Self { wake }
    }

    /// Signals buffer readiness to the render thread.
    pub fn notify(&self) {
        self.wake.signal_samples_ready();
    }
}

/// A manual-reset event: stays set until explicitly reset.
#[derive(Debug, Default)]
pub(crate) struct ManualResetEvent {
    set: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetEvent {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.set.lock() = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.set.lock() = false;
    }

    #[cfg(test)]
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Waits until the event is set or `timeout` elapses. Returns `true` if set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.set.lock();
        while !*set {
            if self.cond.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_prefers_shutdown() {
        let wake = WakeSignals::new();
        wake.signal_samples_ready();
        wake.signal_stream_switch();
        wake.signal_shutdown();

        assert_eq!(wake.wait(), Wake::Shutdown);
        assert_eq!(wake.wait(), Wake::StreamSwitch);
        assert_eq!(wake.wait(), Wake::SamplesReady);
    }

    #[test]
    fn test_repeated_signals_collapse() {
        let wake = WakeSignals::new();
        wake.signal_samples_ready();
        wake.signal_samples_ready();
        wake.signal_shutdown();

        assert_eq!(wake.wait(), Wake::Shutdown);
        assert_eq!(wake.wait(), Wake::SamplesReady);
        assert!(wake.pending.lock().take().is_none());
    }

    #[test]
    fn test_wait_blocks_until_signaled() {
        let wake = Arc::new(WakeSignals::new());
        let ready = ReadySignal::new(Arc::clone(&wake));

        let waiter = {
            let wake = Arc::clone(&wake);
            thread::spawn(move || wake.wait())
        };
        thread::sleep(Duration::from_millis(20));
        ready.notify();

        assert_eq!(waiter.join().unwrap(), Wake::SamplesReady);
    }

    #[test]
    fn test_clear_discards_pending() {
        let wake = WakeSignals::new();
        wake.signal_shutdown();
        wake.clear();
        wake.signal_samples_ready();
        assert_eq!(wake.wait(), Wake::SamplesReady);
    }

    #[test]
    fn test_clear_keeps_stream_switch() {
        let wake = WakeSignals::new();
        wake.signal_stream_switch();
        wake.signal_shutdown();
        wake.clear();
        assert_eq!(wake.wait(), Wake::StreamSwitch);
    }

    #[test]
    fn test_manual_reset_event_times_out() {
        let event = ManualResetEvent::new();
        let start = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_manual_reset_event_stays_set() {
        let event = Arc::new(ManualResetEvent::new());
        let setter = {
            let event = Arc::clone(&event);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                event.set();
            })
        };

        assert!(event.wait_timeout(Duration::from_secs(2)));
        setter.join().unwrap();

        // Still set for later waiters until reset
        assert!(event.wait_timeout(Duration::ZERO));
        event.reset();
        assert!(!event.is_set());
    }
}
