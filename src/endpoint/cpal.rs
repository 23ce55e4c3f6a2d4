//! Output endpoints on the host's audio devices via CPAL.
//!
//! CPAL is callback driven: the device pulls samples when it needs them. Each
//! client keeps a byte queue sized to the device buffer. The render thread
//! fills it through [`RenderClient`], the output callback drains it and then
//! raises the readiness signal, so the queue depth plays the role of padding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use super::{
    AudioClient, DataFlow, DeviceEnumerator, DevicePeriod, DeviceRole, DisconnectReason,
    Endpoint, EndpointObserver, RenderClient, SessionObserver,
};
use crate::format::{MixFormat, SampleType};
use crate::pipeline::ReadySignal;
use crate::EndpointError;

/// How often the default output device is checked for changes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Period reported for CPAL devices. CPAL does not expose the device period.
const DEVICE_PERIOD: Duration = Duration::from_millis(10);
const MINIMUM_DEVICE_PERIOD: Duration = Duration::from_millis(3);

type DeviceQueue = Arc<Mutex<HeapRb<u8>>>;
type SharedObserver = Arc<Mutex<Option<Arc<dyn SessionObserver>>>>;

fn backend(e: impl std::fmt::Display) -> EndpointError {
    EndpointError::backend(e.to_string())
}

fn default_output_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|device| device.name().ok())
}

fn find_output_device(name: &str) -> Result<Device, EndpointError> {
    let devices = cpal::default_host().output_devices().map_err(backend)?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(EndpointError::DeviceNotFound {
        name: name.to_string(),
    })
}

/// Enumerates output devices of the default CPAL host.
///
/// CPAL has no default-device notifications, so a background thread polls the
/// default output device while an observer is registered. A change is
/// reported for every [`DeviceRole`]; CPAL has a single default.
pub struct CpalEnumerator {
    poll_interval: Duration,
    watcher: Mutex<Option<DefaultDeviceWatcher>>,
}

struct DefaultDeviceWatcher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl DefaultDeviceWatcher {
    fn spawn(
        observer: Arc<dyn EndpointObserver>,
        poll_interval: Duration,
    ) -> Result<Self, EndpointError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("stream-render-device-watch".into())
                .spawn(move || {
                    let mut current = default_output_name();
                    while !stop.load(Ordering::SeqCst) {
                        thread::park_timeout(poll_interval);
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }

                        let latest = default_output_name();
                        if latest == current {
                            continue;
                        }
                        tracing::debug!(from = ?current, to = ?latest, "default output device changed");
                        if let Some(id) = &latest {
                            for role in DeviceRole::ALL {
                                observer.on_default_device_changed(DataFlow::Render, role, id);
                            }
                        }
                        current = latest;
                    }
                })
                .map_err(backend)?
        };

        Ok(Self { stop, thread })
    }

    fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            tracing::error!("default device watcher panicked");
        }
    }
}

impl CpalEnumerator {
    /// Creates an enumerator on the default host.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            watcher: Mutex::new(None),
        }
    }

    /// Sets how often the default output device is polled.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lists the names of all output devices.
    pub fn output_device_names() -> Result<Vec<String>, EndpointError> {
        let devices = cpal::default_host().output_devices().map_err(backend)?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for CpalEnumerator {
    fn default_endpoint(
        &self,
        flow: DataFlow,
        _role: DeviceRole,
    ) -> Result<Arc<dyn Endpoint>, EndpointError> {
        if flow != DataFlow::Render {
            return Err(EndpointError::unsupported("only render endpoints are supported"));
        }
        Ok(Arc::new(CpalEndpoint::default_output()?))
    }

    fn register_endpoint_observer(
        &self,
        observer: Arc<dyn EndpointObserver>,
    ) -> Result<(), EndpointError> {
        let mut watcher = self.watcher.lock();
        if let Some(previous) = watcher.take() {
            previous.shutdown();
        }
        *watcher = Some(DefaultDeviceWatcher::spawn(observer, self.poll_interval)?);
        Ok(())
    }

    fn unregister_endpoint_observer(&self) -> Result<(), EndpointError> {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.shutdown();
        }
        Ok(())
    }
}

impl Drop for CpalEnumerator {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.shutdown();
        }
    }
}

/// A CPAL output device, identified by name.
#[derive(Debug, Clone)]
pub struct CpalEndpoint {
    name: String,
}

impl CpalEndpoint {
    /// Returns the host's current default output device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no default output device is configured.
    pub fn default_output() -> Result<Self, EndpointError> {
        let name = default_output_name().ok_or_else(|| EndpointError::DeviceNotFound {
            name: "default output".to_string(),
        })?;
        Ok(Self { name })
    }

    /// Opens a specific output device by name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device with the given name exists.
    pub fn by_name(name: &str) -> Result<Self, EndpointError> {
        find_output_device(name)?;
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Endpoint for CpalEndpoint {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn activate(&self) -> Result<Arc<dyn AudioClient>, EndpointError> {
        // Fail early if the device disappeared since the endpoint was resolved.
        find_output_device(&self.name)?;
        Ok(Arc::new(CpalAudioClient {
            name: self.name.clone(),
            observer: Arc::new(Mutex::new(None)),
            inner: Mutex::new(ClientInner::default()),
        }))
    }
}

#[derive(Default)]
struct ClientInner {
    stream: Option<StreamSetup>,
    ready: Option<ReadySignal>,
    running: Option<StreamOwner>,
}

/// Stream parameters fixed by `initialize`.
struct StreamSetup {
    config: CpalStreamConfig,
    sample_type: SampleType,
    frame_size: usize,
    queue: DeviceQueue,
}

struct CpalAudioClient {
    name: String,
    observer: SharedObserver,
    inner: Mutex<ClientInner>,
}

impl AudioClient for CpalAudioClient {
    fn mix_format(&self) -> Result<MixFormat, EndpointError> {
        let device = find_output_device(&self.name)?;
        let config = device.default_output_config().map_err(backend)?;
        let rate = config.sample_rate().0;
        let channels = config.channels();

        match config.sample_format() {
            SampleFormat::I16 => Ok(MixFormat::pcm16(rate, channels)),
            SampleFormat::F32 => Ok(MixFormat::float32(rate, channels)),
            other => Err(EndpointError::unsupported(format!("{other:?} output samples"))),
        }
    }

    fn initialize(&self, latency: Duration, format: &MixFormat) -> Result<u32, EndpointError> {
        let mut inner = self.inner.lock();
        if inner.stream.is_some() {
            return Err(EndpointError::unsupported("client already initialized"));
        }

        let sample_type = format
            .sample_type()
            .map_err(|e| EndpointError::unsupported(e.to_string()))?;
        let frame_size = format.frame_size();
        let buffer_frames = format.frames_in(latency);
        if buffer_frames == 0 {
            return Err(EndpointError::unsupported(format!(
                "latency {}ms is shorter than one frame",
                latency.as_millis()
            )));
        }

        inner.stream = Some(StreamSetup {
            config: CpalStreamConfig {
                channels: format.channels,
                sample_rate: SampleRate(format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            sample_type,
            frame_size,
            queue: Arc::new(Mutex::new(HeapRb::new(buffer_frames as usize * frame_size))),
        });
        Ok(buffer_frames)
    }

    fn device_period(&self) -> Result<DevicePeriod, EndpointError> {
        Ok(DevicePeriod {
            default: DEVICE_PERIOD,
            minimum: MINIMUM_DEVICE_PERIOD,
        })
    }

    fn set_ready_signal(&self, signal: ReadySignal) -> Result<(), EndpointError> {
        self.inner.lock().ready = Some(signal);
        Ok(())
    }

    fn render_client(&self) -> Result<Box<dyn RenderClient>, EndpointError> {
        let inner = self.inner.lock();
        let setup = inner
            .stream
            .as_ref()
            .ok_or_else(|| EndpointError::unsupported("client not initialized"))?;
        Ok(Box::new(CpalRenderClient {
            queue: Arc::clone(&setup.queue),
            frame_size: setup.frame_size,
            scratch: Vec::new(),
        }))
    }

    fn current_padding(&self) -> Result<u32, EndpointError> {
        let inner = self.inner.lock();
        let setup = inner
            .stream
            .as_ref()
            .ok_or_else(|| EndpointError::unsupported("client not initialized"))?;
        let queued = setup.queue.lock().occupied_len();
        Ok((queued / setup.frame_size) as u32)
    }

    fn start(&self) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock();
        if inner.running.is_none() {
            let setup = inner
                .stream
                .as_ref()
                .ok_or_else(|| EndpointError::unsupported("client not initialized"))?;
            let ready = inner
                .ready
                .clone()
                .ok_or_else(|| EndpointError::unsupported("ready signal not set"))?;
            let params = StreamParams {
                device_name: self.name.clone(),
                config: setup.config.clone(),
                sample_type: setup.sample_type,
                queue: Arc::clone(&setup.queue),
                ready,
                observer: Arc::clone(&self.observer),
            };
            inner.running = Some(StreamOwner::spawn(params)?);
        }

        match &inner.running {
            Some(owner) => owner.request(StreamCommand::Play),
            None => Ok(()),
        }
    }

    fn stop(&self) -> Result<(), EndpointError> {
        match &self.inner.lock().running {
            Some(owner) => owner.request(StreamCommand::Pause),
            None => Ok(()),
        }
    }

    fn register_session_observer(
        &self,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<(), EndpointError> {
        *self.observer.lock() = Some(observer);
        Ok(())
    }

    fn unregister_session_observer(&self) -> Result<(), EndpointError> {
        *self.observer.lock() = None;
        Ok(())
    }
}

impl Drop for CpalAudioClient {
    fn drop(&mut self) {
        if let Some(owner) = self.inner.get_mut().running.take() {
            owner.shutdown();
        }
    }
}

/// Copies render-thread output into the device queue.
struct CpalRenderClient {
    queue: DeviceQueue,
    frame_size: usize,
    scratch: Vec<u8>,
}

impl RenderClient for CpalRenderClient {
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], EndpointError> {
        let len = frames as usize * self.frame_size;
        let free = self.queue.lock().vacant_len();
        if len > free {
            return Err(EndpointError::unsupported(format!(
                "requested {len} bytes with only {free} free"
            )));
        }
        self.scratch.clear();
        self.scratch.resize(len, 0);
        Ok(&mut self.scratch)
    }

    fn release_buffer(&mut self, frames: u32, silent: bool) -> Result<(), EndpointError> {
        let len = frames as usize * self.frame_size;
        let data = self
            .scratch
            .get_mut(..len)
            .ok_or_else(|| EndpointError::backend("released more frames than acquired"))?;
        if silent {
            data.fill(0);
        }

        let pushed = self.queue.lock().push_slice(data);
        if pushed < len {
            return Err(EndpointError::backend(format!(
                "device queue overflow: {pushed} of {len} bytes queued"
            )));
        }
        Ok(())
    }
}

enum StreamCommand {
    Play,
    Pause,
}

/// Everything the stream-owner thread needs to build the output stream.
struct StreamParams {
    device_name: String,
    config: CpalStreamConfig,
    sample_type: SampleType,
    queue: DeviceQueue,
    ready: ReadySignal,
    observer: SharedObserver,
}

impl StreamParams {
    fn build(self) -> Result<Stream, EndpointError> {
        let device = find_output_device(&self.device_name)?;
        let StreamParams {
            config,
            sample_type,
            queue,
            ready,
            observer,
            ..
        } = self;

        let stream = match sample_type {
            SampleType::Pcm16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    drain_into(&queue, data, i16::from_le_bytes);
                    ready.notify();
                },
                stream_error_callback(observer),
                None,
            ),
            SampleType::Float32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    drain_into(&queue, data, f32::from_le_bytes);
                    ready.notify();
                },
                stream_error_callback(observer),
                None,
            ),
        };

        stream.map_err(backend)
    }
}

fn stream_error_callback(observer: SharedObserver) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            tracing::warn!("output device no longer available");
            let observer = observer.lock().clone();
            if let Some(observer) = observer {
                observer.on_session_disconnected(DisconnectReason::DeviceRemoval);
            }
        }
        other => {
            tracing::error!(error = %other, "audio stream error");
        }
    }
}

/// Fills `out` with samples decoded from the queue, padding with silence on underrun.
///
/// Never blocks: if the render thread holds the queue, this period plays silence.
fn drain_into<T: Copy + Default, const N: usize>(
    queue: &Mutex<HeapRb<u8>>,
    out: &mut [T],
    decode: fn([u8; N]) -> T,
) {
    let Some(mut queue) = queue.try_lock() else {
        out.fill(T::default());
        return;
    };

    let mut bytes = [0u8; N];
    for sample in out.iter_mut() {
        *sample = if queue.occupied_len() >= N {
            queue.pop_slice(&mut bytes);
            decode(bytes)
        } else {
            T::default()
        };
    }
}

/// Thread that owns the (non-`Send`) CPAL stream.
struct StreamOwner {
    commands: mpsc::Sender<(StreamCommand, mpsc::Sender<Result<(), EndpointError>>)>,
    thread: JoinHandle<()>,
}

impl StreamOwner {
    fn spawn(params: StreamParams) -> Result<Self, EndpointError> {
        let (command_tx, command_rx) =
            mpsc::channel::<(StreamCommand, mpsc::Sender<Result<(), EndpointError>>)>();
        let (built_tx, built_rx) = mpsc::channel::<Result<(), EndpointError>>();

        let thread = thread::Builder::new()
            .name("stream-render-cpal".into())
            .spawn(move || {
                let stream = match params.build() {
                    Ok(stream) => {
                        let _ = built_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = built_tx.send(Err(e));
                        return;
                    }
                };

                // Runs until the client drops the command sender.
                for (command, reply) in command_rx {
                    let result = match command {
                        StreamCommand::Play => stream.play().map_err(backend),
                        StreamCommand::Pause => stream.pause().map_err(backend),
                    };
                    let _ = reply.send(result);
                }
            })
            .map_err(backend)?;

        match built_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                thread,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EndpointError::backend("stream thread exited during setup"))
            }
        }
    }

    fn request(&self, command: StreamCommand) -> Result<(), EndpointError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send((command, reply_tx))
            .map_err(|_| EndpointError::DeviceInvalidated)?;
        reply_rx
            .recv()
            .map_err(|_| EndpointError::DeviceInvalidated)?
    }

    fn shutdown(self) {
        drop(self.commands);
        if self.thread.join().is_err() {
            tracing::error!("stream thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_decodes_little_endian_i16() {
        let queue = Mutex::new(HeapRb::<u8>::new(16));
        queue.lock().push_slice(&[0x01, 0x00, 0xff, 0xff]);

        let mut out = [7i16; 3];
        drain_into(&queue, &mut out, i16::from_le_bytes);
        assert_eq!(out, [1, -1, 0]);
        assert_eq!(queue.lock().occupied_len(), 0);
    }

    #[test]
    fn test_drain_decodes_f32_and_pads_partial_sample() {
        let queue = Mutex::new(HeapRb::<u8>::new(16));
        queue.lock().push_slice(&0.5f32.to_le_bytes());
        queue.lock().push_slice(&[0xaa, 0xbb]);

        let mut out = [1.0f32; 2];
        drain_into(&queue, &mut out, f32::from_le_bytes);
        assert!((out[0] - 0.5).abs() < f32::EPSILON);
        assert!(out[1].abs() < f32::EPSILON);
        // The partial sample waits for the rest of its bytes
        assert_eq!(queue.lock().occupied_len(), 2);
    }

    #[test]
    fn test_drain_plays_silence_when_contended() {
        let queue = Mutex::new(HeapRb::<u8>::new(16));
        queue.lock().push_slice(&[1, 0, 1, 0]);

        let _held = queue.lock();
        let mut out = [5i16; 2];
        drain_into(&queue, &mut out, i16::from_le_bytes);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_default_output_mix_format() {
        let endpoint = CpalEndpoint::default_output().unwrap();
        let client = endpoint.activate().unwrap();
        let format = client.mix_format().unwrap();
        println!("Default output {}: {format}", endpoint.name());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_list_output_devices() {
        let names = CpalEnumerator::output_device_names().unwrap();
        println!("Output devices: {names:?}");
    }
}
