//! Render engine lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::endpoint::{
    AudioClient, DataFlow, DeviceEnumerator, Endpoint, EndpointObserver, SessionObserver,
};
use crate::event::emit;
use crate::format::{MixFormat, SampleType};
use crate::pipeline::{
    DeviceContext, ReadySignal, RenderBuffer, RenderLoop, StreamSwitchCoordinator,
    SwitchNotifier, SwitchSettings, SwitchSignals, SwitchState, WakeSignals,
};
use crate::{EventCallback, RenderConfig, RenderError, RenderEvent, MIN_LATENCY_MS};

/// Name given to the render thread.
const RENDER_THREAD_NAME: &str = "stream-render";

/// Lifecycle state of a [`RenderEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, `initialize` not yet called.
    Uninitialized,
    /// Initialized and ready to start.
    Idle,
    /// The render thread is feeding the device.
    Running,
    /// The render thread is moving to a new endpoint.
    Switching,
    /// Rendering ended, by request or after a failure.
    Stopped,
    /// All resources released. Terminal.
    ShutDown,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Switching => "switching",
            Self::Stopped => "stopped",
            Self::ShutDown => "shut down",
        })
    }
}

/// Statistics about rendering since initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Render cycles that exchanged a buffer with the device.
    pub cycles: u64,
    /// Frames of real audio delivered.
    pub audio_frames: u64,
    /// Frames of silence delivered.
    pub silent_frames: u64,
    /// Completed stream switches.
    pub stream_switches: u64,
    /// Readiness wakes skipped because the device padding could not be queried.
    pub skipped_cycles: u64,
    /// Producer bytes rejected, truncated or discarded on overflow.
    pub overflow_bytes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub cycles: AtomicU64,
    pub audio_frames: AtomicU64,
    pub silent_frames: AtomicU64,
    pub stream_switches: AtomicU64,
    pub skipped_cycles: AtomicU64,
    pub overflow_bytes: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> RenderStats {
        RenderStats {
            cycles: self.cycles.load(Ordering::SeqCst),
            audio_frames: self.audio_frames.load(Ordering::SeqCst),
            silent_frames: self.silent_frames.load(Ordering::SeqCst),
            stream_switches: self.stream_switches.load(Ordering::SeqCst),
            skipped_cycles: self.skipped_cycles.load(Ordering::SeqCst),
            overflow_bytes: self.overflow_bytes.load(Ordering::SeqCst),
        }
    }
}

/// Fixed properties of the stream, captured at initialization.
#[derive(Debug)]
pub(crate) struct SessionInfo {
    pub format: MixFormat,
    pub sample_type: SampleType,
    pub frame_size: usize,
    pub latency: Duration,
}

/// State shared between the engine, its producers and the render thread.
pub(crate) struct EngineShared {
    state: Mutex<EngineState>,
    pub buffer: Mutex<RenderBuffer>,
    pub wake: Arc<WakeSignals>,
    pub switch: Arc<SwitchSignals>,
    pub stats: StatsCounters,
    fault: Mutex<Option<RenderError>>,
    /// Client whose clock is running, for `stop` to halt from outside the render thread.
    pub active_client: Mutex<Option<Arc<dyn AudioClient>>>,
    pub buffer_frames: AtomicU32,
    pub session: SessionInfo,
    events: Option<EventCallback>,
}

impl EngineShared {
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: EngineState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::trace!(from = %previous, to = %state, "engine state");
        }
    }

    pub fn emit(&self, event: RenderEvent) {
        emit(self.events.as_ref(), event);
    }

    /// Records a fatal render-thread failure and marks the engine stopped.
    pub fn fail(&self, error: RenderError) {
        *self.active_client.lock() = None;
        let reason = error.to_string();
        *self.fault.lock() = Some(error);
        self.set_state(EngineState::Stopped);
        self.emit(RenderEvent::Stopped { reason });
    }

    fn put(&self, data: &[u8]) -> Result<usize, RenderError> {
        let state = self.state();
        if state == EngineState::ShutDown {
            return Err(RenderError::InvalidState {
                operation: "write audio",
                state,
            });
        }

        let result = self.buffer.lock().write(data);
        match result {
            Ok(outcome) => {
                let lost = outcome.dropped + (data.len() - outcome.written);
                if lost > 0 {
                    self.stats
                        .overflow_bytes
                        .fetch_add(lost as u64, Ordering::Relaxed);
                }
                if outcome.dropped > 0 {
                    tracing::debug!(dropped = outcome.dropped, "dropped oldest buffered audio");
                    self.emit(RenderEvent::BufferOverflow {
                        dropped_bytes: outcome.dropped,
                    });
                }
                Ok(outcome.written)
            }
            Err(e) => {
                self.stats
                    .overflow_bytes
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

/// Cloneable handle for writing audio from any thread.
///
/// Obtained from [`RenderEngine::producer()`]. Writes go to the same ring
/// buffer as [`RenderEngine::put_audio_data()`].
///
/// # Example
///
/// ```ignore
/// let producer = engine.producer()?;
/// std::thread::spawn(move || {
///     let period = vec![0u8; 3840];
///     producer.write(&period).ok();
/// });
/// ```
#[derive(Clone)]
pub struct AudioProducer {
    shared: Arc<EngineShared>,
}

impl AudioProducer {
    /// Appends PCM bytes in the device mix format. Returns the bytes buffered.
    pub fn write(&self, data: &[u8]) -> Result<usize, RenderError> {
        self.shared.put(data)
    }

    /// Bytes waiting to be rendered.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffer.lock().available_read()
    }

    /// Frame size of the mix format in bytes.
    pub fn frame_size(&self) -> usize {
        self.shared.session.frame_size
    }
}

impl fmt::Debug for AudioProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProducer")
            .field("frame_size", &self.shared.session.frame_size)
            .finish_non_exhaustive()
    }
}

/// Event-driven audio render engine.
///
/// Created by [`RenderEngine::builder()`]. Producers write PCM bytes in the
/// device's mix format; a dedicated render thread feeds them to the endpoint
/// every time the device signals it can take more, padding with silence when
/// the producer falls behind.
///
/// # Lifecycle
///
/// 1. [`initialize()`](RenderEngine::initialize) opens the endpoint
/// 2. [`start()`](RenderEngine::start) spawns the render thread and starts the device clock
/// 3. [`stop()`](RenderEngine::stop) halts rendering and discards buffered audio; `start` may follow
/// 4. [`shutdown()`](RenderEngine::shutdown) releases everything. Dropping the engine does the same
///
/// If the render thread dies (device failure or failed stream switch) the
/// engine moves to [`EngineState::Stopped`] and the cause is available from
/// [`take_fault()`](RenderEngine::take_fault).
pub struct RenderEngine {
    enumerator: Arc<dyn DeviceEnumerator>,
    endpoint: Option<Arc<dyn Endpoint>>,
    config: RenderConfig,
    events: Option<EventCallback>,
    shared: Option<Arc<EngineShared>>,
    /// Held while no render thread is running.
    device: Option<DeviceContext>,
    render_thread: Option<JoinHandle<Option<DeviceContext>>>,
    notifier: Option<Arc<SwitchNotifier>>,
    closed: bool,
}

impl RenderEngine {
    pub(crate) fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        endpoint: Option<Arc<dyn Endpoint>>,
        config: RenderConfig,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            enumerator,
            endpoint,
            config,
            events,
            shared: None,
            device: None,
            render_thread: None,
            notifier: None,
            closed: false,
        }
    }

    /// Opens the endpoint in shared event-driven mode.
    ///
    /// Captures the device mix format, sizes the ring buffer from it and, when
    /// stream switching is enabled, registers for session and default-device
    /// notifications.
    ///
    /// # Errors
    ///
    /// - [`RenderError::LatencyTooLow`] if `latency_ms` is below [`MIN_LATENCY_MS`]
    /// - [`RenderError::AlreadyInitialized`] on a second call
    /// - [`RenderError::UnsupportedFormat`] if the mix format is neither 16-bit PCM nor float
    /// - [`RenderError::Endpoint`] if any device primitive fails
    pub fn initialize(&mut self, latency_ms: u32) -> Result<(), RenderError> {
        if latency_ms < MIN_LATENCY_MS {
            return Err(RenderError::LatencyTooLow {
                requested_ms: latency_ms,
                minimum_ms: MIN_LATENCY_MS,
            });
        }
        if self.closed {
            return Err(RenderError::InvalidState {
                operation: "initialize",
                state: EngineState::ShutDown,
            });
        }
        if self.shared.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }

        let role = self.config.role;
        let latency = Duration::from_millis(u64::from(latency_ms));

        let endpoint = match &self.endpoint {
            Some(endpoint) => Arc::clone(endpoint),
            None => self
                .enumerator
                .default_endpoint(DataFlow::Render, role)
                .map_err(|source| RenderError::NoDefaultEndpoint { role, source })?,
        };

        let client = endpoint
            .activate()
            .map_err(|e| RenderError::endpoint("activate audio client", e))?;
        let format = client
            .mix_format()
            .map_err(|e| RenderError::endpoint("get mix format", e))?;
        let sample_type = format.sample_type()?;
        let frame_size = format.frame_size();

        let wake = Arc::new(WakeSignals::new());
        let device = DeviceContext::open(
            endpoint,
            client,
            &format,
            latency,
            ReadySignal::new(Arc::clone(&wake)),
        )?;

        let switch = Arc::new(SwitchSignals::new());
        if self.config.enable_stream_switch {
            let notifier = Arc::new(SwitchNotifier::new(
                Arc::clone(&switch),
                Arc::clone(&wake),
                role,
                self.events.clone(),
            ));
            device
                .client
                .register_session_observer(Arc::clone(&notifier) as Arc<dyn SessionObserver>)
                .map_err(|e| RenderError::endpoint("register session notifications", e))?;
            if let Err(e) = self
                .enumerator
                .register_endpoint_observer(Arc::clone(&notifier) as Arc<dyn EndpointObserver>)
            {
                if let Err(e) = device.client.unregister_session_observer() {
                    tracing::warn!(error = %e, "failed to unregister session notifications");
                }
                return Err(RenderError::endpoint("register endpoint notifications", e));
            }
            self.notifier = Some(notifier);
        }

        let capacity = self.config.ring_buffer_capacity(frame_size);
        tracing::debug!(
            endpoint = %device.endpoint.id(),
            %format,
            latency_ms,
            buffer_frames = device.buffer_frames,
            ring_bytes = capacity,
            %role,
            "render engine initialized"
        );

        self.shared = Some(Arc::new(EngineShared {
            state: Mutex::new(EngineState::Idle),
            buffer: Mutex::new(RenderBuffer::new(
                capacity,
                frame_size,
                self.config.overflow_policy,
            )),
            wake,
            switch,
            stats: StatsCounters::default(),
            fault: Mutex::new(None),
            active_client: Mutex::new(None),
            buffer_frames: AtomicU32::new(device.buffer_frames),
            session: SessionInfo {
                format,
                sample_type,
                frame_size,
                latency,
            },
            events: self.events.clone(),
        }));
        self.device = Some(device);

        Ok(())
    }

    /// Spawns the render thread and starts the device clock.
    ///
    /// Accepted from [`EngineState::Idle`] and [`EngineState::Stopped`].
    ///
    /// # Errors
    ///
    /// - [`RenderError::NotInitialized`] before `initialize`
    /// - [`RenderError::InvalidState`] when already running, shut down, or when
    ///   a failed stream switch released the device
    /// - [`RenderError::Endpoint`] if the device clock does not start
    pub fn start(&mut self) -> Result<(), RenderError> {
        let shared = Arc::clone(self.shared.as_ref().ok_or(RenderError::NotInitialized)?);
        let state = shared.state();
        if !matches!(state, EngineState::Idle | EngineState::Stopped) {
            return Err(RenderError::InvalidState {
                operation: "start",
                state,
            });
        }

        self.join_render_thread();
        let Some(device) = self.device.take() else {
            return Err(RenderError::InvalidState {
                operation: "start",
                state,
            });
        };

        shared.wake.clear();
        shared.buffer_frames.store(device.buffer_frames, Ordering::SeqCst);
        let client = Arc::clone(&device.client);
        *shared.active_client.lock() = Some(Arc::clone(&client));

        let coordinator = self.notifier.as_ref().map(|notifier| {
            StreamSwitchCoordinator::new(
                Arc::clone(&self.enumerator),
                Arc::clone(notifier),
                ReadySignal::new(Arc::clone(&shared.wake)),
                SwitchSettings {
                    format: shared.session.format.clone(),
                    latency: shared.session.latency,
                    role: self.config.role,
                    timeout: self.config.switch_timeout,
                },
            )
        });

        shared.set_state(EngineState::Running);
        let render_loop = RenderLoop::new(
            Arc::clone(&shared),
            device,
            coordinator,
            self.config.realtime_priority,
        );
        let handle = thread::Builder::new()
            .name(RENDER_THREAD_NAME.into())
            .spawn(move || render_loop.run())
            .map_err(|e| {
                *shared.active_client.lock() = None;
                shared.set_state(EngineState::Stopped);
                RenderError::ThreadSpawn(e)
            })?;
        self.render_thread = Some(handle);

        if let Err(e) = client.start() {
            shared.wake.signal_shutdown();
            self.join_render_thread();
            *shared.active_client.lock() = None;
            shared.set_state(state);
            return Err(RenderError::endpoint("start audio client", e));
        }

        tracing::debug!(
            frame_size = shared.session.frame_size,
            sample_type = ?shared.session.sample_type,
            "render engine started"
        );
        shared.emit(RenderEvent::Started);
        Ok(())
    }

    /// Stops rendering: signals the render thread, stops the device clock,
    /// joins the thread and discards buffered audio.
    ///
    /// Stopping an idle or already stopped engine succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotInitialized`] before `initialize` and
    /// [`RenderError::InvalidState`] after `shutdown`.
    pub fn stop(&mut self) -> Result<(), RenderError> {
        let shared = Arc::clone(self.shared.as_ref().ok_or(RenderError::NotInitialized)?);
        match shared.state() {
            EngineState::Running | EngineState::Switching => {}
            EngineState::Idle | EngineState::Stopped => {
                self.join_render_thread();
                shared.buffer.lock().reset();
                return Ok(());
            }
            state @ (EngineState::Uninitialized | EngineState::ShutDown) => {
                return Err(RenderError::InvalidState {
                    operation: "stop",
                    state,
                });
            }
        }

        shared.wake.signal_shutdown();
        let client = shared.active_client.lock().take();
        if let Some(client) = client {
            if let Err(e) = client.stop() {
                tracing::warn!(error = %e, "failed to stop audio client");
            }
        }

        self.join_render_thread();
        shared.buffer.lock().reset();

        // A render-thread failure racing with this call already reported itself.
        if shared.state() != EngineState::Stopped {
            shared.set_state(EngineState::Stopped);
            shared.emit(RenderEvent::Stopped {
                reason: "stop requested".into(),
            });
        }
        tracing::debug!("render engine stopped");
        Ok(())
    }

    /// Releases the endpoint, notification registrations and render thread.
    ///
    /// Idempotent. The engine cannot be used afterwards.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let Some(shared) = self.shared.clone() else {
            return;
        };

        if matches!(
            shared.state(),
            EngineState::Running | EngineState::Switching
        ) {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "failed to stop render engine during shutdown");
            }
        }
        self.join_render_thread();

        if self.notifier.take().is_some() {
            if let Err(e) = self.enumerator.unregister_endpoint_observer() {
                tracing::warn!(error = %e, "failed to unregister endpoint notifications");
            }
        }
        if let Some(device) = self.device.take() {
            if self.config.enable_stream_switch {
                if let Err(e) = device.client.unregister_session_observer() {
                    tracing::warn!(error = %e, "failed to unregister session notifications");
                }
            }
            drop(device);
        }

        *shared.active_client.lock() = None;
        shared.buffer.lock().reset();
        shared.set_state(EngineState::ShutDown);
        tracing::debug!("render engine shut down");
    }

    /// Appends PCM bytes in the device mix format. Returns the bytes buffered.
    ///
    /// May be called in any state after `initialize`; audio written before
    /// `start` plays once rendering begins.
    ///
    /// # Errors
    ///
    /// - [`RenderError::BufferOverflow`] when the write does not fit under
    ///   [`OverflowPolicy::Reject`](crate::OverflowPolicy::Reject)
    /// - [`RenderError::NotInitialized`] before `initialize`
    pub fn put_audio_data(&self, data: &[u8]) -> Result<usize, RenderError> {
        self.shared
            .as_ref()
            .ok_or(RenderError::NotInitialized)?
            .put(data)
    }

    /// Returns a handle for writing audio from other threads.
    pub fn producer(&self) -> Result<AudioProducer, RenderError> {
        let shared = self.shared.as_ref().ok_or(RenderError::NotInitialized)?;
        Ok(AudioProducer {
            shared: Arc::clone(shared),
        })
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> EngineState {
        match &self.shared {
            Some(shared) => shared.state(),
            None if self.closed => EngineState::ShutDown,
            None => EngineState::Uninitialized,
        }
    }

    /// Returns the last state published by the stream-switch procedure.
    pub fn switch_state(&self) -> SwitchState {
        self.shared
            .as_ref()
            .map_or(SwitchState::Stable, |shared| shared.switch.state())
    }

    /// Returns `true` while the render thread is feeding or switching devices.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            EngineState::Running | EngineState::Switching
        )
    }

    /// Returns current render statistics.
    pub fn stats(&self) -> RenderStats {
        self.shared
            .as_ref()
            .map(|shared| shared.stats.snapshot())
            .unwrap_or_default()
    }

    /// Takes the error that stopped the render thread, if any.
    pub fn take_fault(&self) -> Option<RenderError> {
        self.shared.as_ref().and_then(|shared| shared.fault.lock().take())
    }

    /// Returns the mix format captured at initialization.
    pub fn mix_format(&self) -> Option<&MixFormat> {
        self.shared.as_ref().map(|shared| &shared.session.format)
    }

    /// Returns the device buffer capacity in frames, or 0 before `initialize`.
    pub fn buffer_frames(&self) -> u32 {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.buffer_frames.load(Ordering::SeqCst))
    }

    /// Bytes waiting in the ring buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.buffer.lock().available_read())
    }

    /// Returns the device's default period converted to frames at the mix
    /// sample rate, rounded to nearest.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidState`] when no device is open and
    /// [`RenderError::Endpoint`] if the period query fails.
    pub fn frames_per_period(&self) -> Result<u32, RenderError> {
        let shared = self.shared.as_ref().ok_or(RenderError::NotInitialized)?;
        let client = match &self.device {
            Some(device) => Some(Arc::clone(&device.client)),
            None => shared.active_client.lock().clone(),
        };
        let client = client.ok_or(RenderError::InvalidState {
            operation: "query device period",
            state: shared.state(),
        })?;

        let period = client
            .device_period()
            .map_err(|e| RenderError::endpoint("get device period", e))?;
        Ok(shared.session.format.frames_in(period.default))
    }

    /// Joins a finished or signaled render thread and takes back its device.
    fn join_render_thread(&mut self) {
        let Some(handle) = self.render_thread.take() else {
            return;
        };
        match handle.join() {
            Ok(device) => self.device = device,
            Err(_) => {
                tracing::error!("render thread panicked");
                self.device = None;
            }
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{MockEndpoint, MockEnumerator};
    use crate::OverflowPolicy;

    fn engine_with(config: RenderConfig) -> (RenderEngine, MockEndpoint) {
        let endpoint = MockEndpoint::new("speakers", MixFormat::pcm16(48_000, 2));
        let enumerator = Arc::new(MockEnumerator::new(endpoint.clone()));
        let engine = RenderEngine::new(
            enumerator,
            Some(Arc::new(endpoint.clone())),
            config,
            None,
        );
        (engine, endpoint)
    }

    fn quiet_config() -> RenderConfig {
        RenderConfig {
            realtime_priority: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Running.to_string(), "running");
        assert_eq!(EngineState::ShutDown.to_string(), "shut down");
    }

    #[test]
    fn test_render_stats_default() {
        let stats = RenderStats::default();
        assert_eq!(stats.cycles, 0);
        assert_eq!(stats.skipped_cycles, 0);
        assert_eq!(stats.overflow_bytes, 0);
    }

    #[test]
    fn test_latency_boundary() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        assert!(matches!(
            engine.initialize(29),
            Err(RenderError::LatencyTooLow {
                requested_ms: 29,
                minimum_ms: 30
            })
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        engine.initialize(30).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();
        assert!(matches!(
            engine.initialize(40),
            Err(RenderError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_ring_capacity_follows_mix_format() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();

        // 10 periods × 960 frames × 4 bytes
        let shared = engine.shared.as_ref().unwrap();
        assert_eq!(shared.buffer.lock().capacity(), 38_400);
    }

    #[test]
    fn test_operations_before_initialize() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        assert!(matches!(engine.start(), Err(RenderError::NotInitialized)));
        assert!(matches!(
            engine.put_audio_data(&[0; 4]),
            Err(RenderError::NotInitialized)
        ));
        assert_eq!(engine.buffer_frames(), 0);
        assert!(engine.mix_format().is_none());
    }

    #[test]
    fn test_reject_overflow_counts_bytes() {
        let config = RenderConfig {
            ring_buffer_periods: 1,
            frames_per_period: 4,
            ..quiet_config()
        };
        let (mut engine, _endpoint) = engine_with(config);
        engine.initialize(40).unwrap();

        assert_eq!(engine.put_audio_data(&[1; 12]).unwrap(), 12);
        assert!(matches!(
            engine.put_audio_data(&[2; 8]),
            Err(RenderError::BufferOverflow {
                requested: 8,
                available: 4
            })
        ));
        assert_eq!(engine.stats().overflow_bytes, 8);
        assert_eq!(engine.buffered_bytes(), 12);
    }

    #[test]
    fn test_drop_oldest_emits_event() {
        let dropped = Arc::new(AtomicU64::new(0));
        let config = RenderConfig {
            ring_buffer_periods: 1,
            frames_per_period: 4,
            overflow_policy: OverflowPolicy::DropOldest,
            ..quiet_config()
        };
        let endpoint = MockEndpoint::new("speakers", MixFormat::pcm16(48_000, 2));
        let enumerator = Arc::new(MockEnumerator::new(endpoint.clone()));
        let events = {
            let dropped = Arc::clone(&dropped);
            crate::event_callback(move |event| {
                if let RenderEvent::BufferOverflow { dropped_bytes } = event {
                    dropped.fetch_add(dropped_bytes as u64, Ordering::SeqCst);
                }
            })
        };
        let mut engine = RenderEngine::new(enumerator, None, config, Some(events));
        engine.initialize(40).unwrap();

        engine.put_audio_data(&[1; 16]).unwrap();
        engine.put_audio_data(&[2; 8]).unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 8);
        assert_eq!(engine.buffered_bytes(), 16);
    }

    #[test]
    fn test_frames_per_period_from_device_period() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();
        // Mock default period is 10ms
        assert_eq!(engine.frames_per_period().unwrap(), 480);
    }

    #[test]
    fn test_start_stop_restart() {
        let (mut engine, endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(endpoint.is_running());
        assert!(matches!(
            engine.start(),
            Err(RenderError::InvalidState {
                operation: "start",
                state: EngineState::Running
            })
        ));

        engine.stop().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!endpoint.is_running());

        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop().unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut engine, endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();
        engine.start().unwrap();
        assert!(endpoint.has_session_observer());

        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::ShutDown);
        assert!(!endpoint.is_running());
        assert!(!endpoint.has_session_observer());
        assert!(matches!(
            engine.put_audio_data(&[0; 4]),
            Err(RenderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_shutdown_before_initialize() {
        let (mut engine, _endpoint) = engine_with(quiet_config());
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::ShutDown);
        assert!(engine.initialize(40).is_err());
    }

    #[test]
    fn test_stream_switch_disabled_registers_nothing() {
        let config = RenderConfig {
            enable_stream_switch: false,
            ..quiet_config()
        };
        let (mut engine, endpoint) = engine_with(config);
        engine.initialize(40).unwrap();
        assert!(!endpoint.has_session_observer());
    }

    #[test]
    fn test_render_cycle_counts_frames() {
        let (mut engine, endpoint) = engine_with(quiet_config());
        engine.initialize(40).unwrap();
        engine.put_audio_data(&[7; 40]).unwrap();
        engine.start().unwrap();

        endpoint.tick();
        assert!(endpoint.wait_for_buffers(1, Duration::from_secs(2)));
        engine.stop().unwrap();

        let stats = engine.stats();
        assert_eq!(stats.audio_frames, 10);
        assert_eq!(stats.cycles, 1);
    }
}
