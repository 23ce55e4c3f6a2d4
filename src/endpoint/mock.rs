//! Scripted output endpoint for testing without hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{
    AudioClient, DataFlow, DeviceEnumerator, DevicePeriod, DeviceRole, DisconnectReason,
    Endpoint, EndpointObserver, RenderClient, SessionObserver,
};
use crate::format::MixFormat;
use crate::pipeline::ReadySignal;
use crate::EndpointError;

/// Default scheduling period reported by mock devices.
const MOCK_DEFAULT_PERIOD: Duration = Duration::from_millis(10);
const MOCK_MINIMUM_PERIOD: Duration = Duration::from_millis(3);

/// One buffer released to a [`MockEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBuffer {
    /// Frames released.
    pub frames: u32,
    /// Whether the buffer was flagged as silence.
    pub silent: bool,
    /// Bytes handed over. All zero for silent buffers.
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MockDevice {
    format: Option<MixFormat>,
    buffer_frames_override: Option<u32>,
    buffer_frames: u32,
    padding: u32,
    ready: Option<ReadySignal>,
    observer: Option<Arc<dyn SessionObserver>>,
    rendered: Vec<RenderedBuffer>,
    running: bool,
    activations: usize,
    fail_activate: bool,
    fail_next_acquire: bool,
    fail_next_padding: bool,
}

struct MockShared {
    id: String,
    device: Mutex<MockDevice>,
    released: Condvar,
}

/// A mock output device that records everything rendered to it.
///
/// The device never plays on its own: call [`tick()`](MockEndpoint::tick) to
/// simulate one device period, which drains its queue and raises the readiness
/// signal. Clones share the same device.
///
/// # Example
///
/// ```
/// use stream_render::endpoint::MockEndpoint;
/// use stream_render::format::MixFormat;
///
/// let speakers = MockEndpoint::new("speakers", MixFormat::pcm16(48_000, 2))
///     .with_buffer_frames(480);
/// assert!(speakers.rendered().is_empty());
/// ```
#[derive(Clone)]
pub struct MockEndpoint {
    shared: Arc<MockShared>,
}

impl MockEndpoint {
    /// Creates a device with the given id and mix format.
    ///
    /// The buffer capacity defaults to the requested latency in frames.
    pub fn new(id: impl Into<String>, format: MixFormat) -> Self {
        Self {
            shared: Arc::new(MockShared {
                id: id.into(),
                device: Mutex::new(MockDevice {
                    format: Some(format),
                    ..Default::default()
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Fixes the device buffer capacity regardless of the requested latency.
    #[must_use]
    pub fn with_buffer_frames(self, frames: u32) -> Self {
        self.shared.device.lock().buffer_frames_override = Some(frames);
        self
    }

    /// Changes the mix format reported to clients activated afterwards.
    pub fn set_mix_format(&self, format: MixFormat) {
        self.shared.device.lock().format = Some(format);
    }

    /// Simulates one device period: plays everything queued and signals readiness.
    pub fn tick(&self) {
        let ready = {
            let mut device = self.shared.device.lock();
            device.padding = 0;
            device.ready.clone()
        };
        if let Some(ready) = ready {
            ready.notify();
        }
    }

    /// Delivers a session disconnect to the registered observer, if any.
    pub fn disconnect(&self, reason: DisconnectReason) {
        let observer = self.shared.device.lock().observer.clone();
        if let Some(observer) = observer {
            observer.on_session_disconnected(reason);
        }
    }

    /// Waits until at least `count` buffers have been released. Returns `false` on timeout.
    pub fn wait_for_buffers(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut device = self.shared.device.lock();
        while device.rendered.len() < count {
            if self
                .shared
                .released
                .wait_until(&mut device, deadline)
                .timed_out()
            {
                return device.rendered.len() >= count;
            }
        }
        true
    }

    /// Returns every buffer released so far.
    pub fn rendered(&self) -> Vec<RenderedBuffer> {
        self.shared.device.lock().rendered.clone()
    }

    /// Returns `true` while the device clock is started.
    pub fn is_running(&self) -> bool {
        self.shared.device.lock().running
    }

    /// Returns `true` while a session observer is registered.
    pub fn has_session_observer(&self) -> bool {
        self.shared.device.lock().observer.is_some()
    }

    /// Number of clients activated on this device.
    pub fn activations(&self) -> usize {
        self.shared.device.lock().activations
    }

    /// Makes subsequent activations fail.
    pub fn fail_activation(&self, fail: bool) {
        self.shared.device.lock().fail_activate = fail;
    }

    /// Makes the next buffer acquisition fail.
    pub fn fail_next_acquire(&self) {
        self.shared.device.lock().fail_next_acquire = true;
    }

    /// Makes the next padding query fail.
    pub fn fail_next_padding(&self) {
        self.shared.device.lock().fail_next_padding = true;
    }
}

impl std::fmt::Debug for MockEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEndpoint")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

impl Endpoint for MockEndpoint {
    fn id(&self) -> String {
        self.shared.id.clone()
    }

    fn activate(&self) -> Result<Arc<dyn AudioClient>, EndpointError> {
        let mut device = self.shared.device.lock();
        if device.fail_activate {
            return Err(EndpointError::DeviceInvalidated);
        }
        device.activations += 1;
        Ok(Arc::new(MockClient {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockClient {
    shared: Arc<MockShared>,
}

impl MockClient {
    fn format(&self) -> Result<MixFormat, EndpointError> {
        self.shared
            .device
            .lock()
            .format
            .clone()
            .ok_or(EndpointError::DeviceInvalidated)
    }
}

impl AudioClient for MockClient {
    fn mix_format(&self) -> Result<MixFormat, EndpointError> {
        self.format()
    }

    fn initialize(&self, latency: Duration, format: &MixFormat) -> Result<u32, EndpointError> {
        let mut device = self.shared.device.lock();
        let frames = device
            .buffer_frames_override
            .unwrap_or_else(|| format.frames_in(latency));
        device.buffer_frames = frames;
        device.padding = 0;
        Ok(frames)
    }

    fn device_period(&self) -> Result<DevicePeriod, EndpointError> {
        Ok(DevicePeriod {
            default: MOCK_DEFAULT_PERIOD,
            minimum: MOCK_MINIMUM_PERIOD,
        })
    }

    fn set_ready_signal(&self, signal: ReadySignal) -> Result<(), EndpointError> {
        self.shared.device.lock().ready = Some(signal);
        Ok(())
    }

    fn render_client(&self) -> Result<Box<dyn RenderClient>, EndpointError> {
        let frame_size = self.format()?.frame_size();
        Ok(Box::new(MockRenderClient {
            shared: Arc::clone(&self.shared),
            frame_size,
            scratch: Vec::new(),
        }))
    }

    fn current_padding(&self) -> Result<u32, EndpointError> {
        let mut device = self.shared.device.lock();
        if std::mem::take(&mut device.fail_next_padding) {
            return Err(EndpointError::backend("injected padding failure"));
        }
        Ok(device.padding)
    }

    fn start(&self) -> Result<(), EndpointError> {
        self.shared.device.lock().running = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), EndpointError> {
        self.shared.device.lock().running = false;
        Ok(())
    }

    fn register_session_observer(
        &self,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<(), EndpointError> {
        self.shared.device.lock().observer = Some(observer);
        Ok(())
    }

    fn unregister_session_observer(&self) -> Result<(), EndpointError> {
        self.shared.device.lock().observer = None;
        Ok(())
    }
}

struct MockRenderClient {
    shared: Arc<MockShared>,
    frame_size: usize,
    scratch: Vec<u8>,
}

impl RenderClient for MockRenderClient {
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], EndpointError> {
        {
            let mut device = self.shared.device.lock();
            if std::mem::take(&mut device.fail_next_acquire) {
                return Err(EndpointError::backend("injected acquire failure"));
            }
            let free = device.buffer_frames.saturating_sub(device.padding);
            if frames > free {
                return Err(EndpointError::unsupported(format!(
                    "requested {frames} frames with only {free} free"
                )));
            }
        }

        self.scratch.clear();
        self.scratch.resize(frames as usize * self.frame_size, 0);
        Ok(&mut self.scratch)
    }

    fn release_buffer(&mut self, frames: u32, silent: bool) -> Result<(), EndpointError> {
        let len = frames as usize * self.frame_size;
        let data = if silent {
            vec![0; len]
        } else {
            self.scratch.get(..len).map(<[u8]>::to_vec).ok_or_else(|| {
                EndpointError::backend(format!("released {frames} frames without acquiring them"))
            })?
        };

        let mut device = self.shared.device.lock();
        device.padding += frames;
        device.rendered.push(RenderedBuffer {
            frames,
            silent,
            data,
        });
        self.shared.released.notify_all();
        Ok(())
    }
}

/// A mock device enumerator with a settable default device.
///
/// # Example
///
/// ```
/// use stream_render::endpoint::{DataFlow, DeviceRole, MockEndpoint, MockEnumerator};
/// use stream_render::format::MixFormat;
///
/// let speakers = MockEndpoint::new("speakers", MixFormat::float32(48_000, 2));
/// let headset = MockEndpoint::new("headset", MixFormat::float32(48_000, 2));
/// let enumerator = MockEnumerator::new(speakers);
///
/// // Simulate the user picking the headset
/// enumerator.set_default(headset);
/// enumerator.notify_default_changed(DataFlow::Render, DeviceRole::Console, "headset");
/// ```
pub struct MockEnumerator {
    default: Mutex<Option<MockEndpoint>>,
    observer: Mutex<Option<Arc<dyn EndpointObserver>>>,
}

impl MockEnumerator {
    /// Creates an enumerator whose default render device is `default`.
    pub fn new(default: MockEndpoint) -> Self {
        Self {
            default: Mutex::new(Some(default)),
            observer: Mutex::new(None),
        }
    }

    /// Replaces the default device without notifying.
    pub fn set_default(&self, endpoint: MockEndpoint) {
        *self.default.lock() = Some(endpoint);
    }

    /// Removes the default device so lookups fail.
    pub fn clear_default(&self) {
        *self.default.lock() = None;
    }

    /// Delivers a default-device change to the registered observer, if any.
    pub fn notify_default_changed(&self, flow: DataFlow, role: DeviceRole, device_id: &str) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_default_device_changed(flow, role, device_id);
        }
    }

    /// Returns `true` while an endpoint observer is registered.
    pub fn has_observer(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn default_endpoint(
        &self,
        _flow: DataFlow,
        role: DeviceRole,
    ) -> Result<Arc<dyn Endpoint>, EndpointError> {
        self.default
            .lock()
            .clone()
            .map(|endpoint| Arc::new(endpoint) as Arc<dyn Endpoint>)
            .ok_or_else(|| EndpointError::DeviceNotFound {
                name: format!("default {role} render device"),
            })
    }

    fn register_endpoint_observer(
        &self,
        observer: Arc<dyn EndpointObserver>,
    ) -> Result<(), EndpointError> {
        *self.observer.lock() = Some(observer);
        Ok(())
    }

    fn unregister_endpoint_observer(&self) -> Result<(), EndpointError> {
        *self.observer.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Wake, WakeSignals};

    fn speakers() -> MockEndpoint {
        MockEndpoint::new("speakers", MixFormat::pcm16(48_000, 2)).with_buffer_frames(8)
    }

    #[test]
    fn test_mock_buffer_exchange_records_data() {
        let endpoint = speakers();
        let client = endpoint.activate().unwrap();
        let format = client.mix_format().unwrap();
        assert_eq!(client.initialize(Duration::from_millis(40), &format).unwrap(), 8);

        let mut render = client.render_client().unwrap();
        let region = render.get_buffer(2).unwrap();
        assert_eq!(region.len(), 8);
        region.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        render.release_buffer(2, false).unwrap();

        assert_eq!(client.current_padding().unwrap(), 2);
        let rendered = endpoint.rendered();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!rendered[0].silent);
    }

    #[test]
    fn test_mock_rejects_more_than_free_frames() {
        let endpoint = speakers();
        let client = endpoint.activate().unwrap();
        let format = client.mix_format().unwrap();
        client.initialize(Duration::from_millis(40), &format).unwrap();

        let mut render = client.render_client().unwrap();
        render.get_buffer(6).unwrap();
        render.release_buffer(6, true).unwrap();
        assert!(render.get_buffer(3).is_err());

        endpoint.tick();
        assert!(render.get_buffer(8).is_ok());
    }

    #[test]
    fn test_mock_injected_failures_fire_once() {
        let endpoint = speakers();
        let client = endpoint.activate().unwrap();
        let format = client.mix_format().unwrap();
        client.initialize(Duration::from_millis(40), &format).unwrap();
        let mut render = client.render_client().unwrap();

        endpoint.fail_next_acquire();
        assert!(render.get_buffer(1).is_err());
        assert!(render.get_buffer(1).is_ok());

        endpoint.fail_next_padding();
        assert!(client.current_padding().is_err());
        assert!(client.current_padding().is_ok());
    }

    #[test]
    fn test_mock_tick_notifies_ready_signal() {
        let endpoint = speakers();
        let client = endpoint.activate().unwrap();
        let wake = Arc::new(WakeSignals::new());
        client
            .set_ready_signal(ReadySignal::new(Arc::clone(&wake)))
            .unwrap();

        endpoint.tick();
        assert_eq!(wake.wait(), Wake::SamplesReady);
    }

    #[test]
    fn test_mock_enumerator_default_lookup() {
        let enumerator = MockEnumerator::new(speakers());
        let endpoint = enumerator
            .default_endpoint(DataFlow::Render, DeviceRole::Console)
            .unwrap();
        assert_eq!(endpoint.id(), "speakers");

        enumerator.clear_default();
        assert!(matches!(
            enumerator.default_endpoint(DataFlow::Render, DeviceRole::Console),
            Err(EndpointError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_mock_activation_failure() {
        let endpoint = speakers();
        endpoint.fail_activation(true);
        assert!(matches!(
            endpoint.activate(),
            Err(EndpointError::DeviceInvalidated)
        ));
        endpoint.fail_activation(false);
        assert!(endpoint.activate().is_ok());
        assert_eq!(endpoint.activations(), 1);
    }
}
