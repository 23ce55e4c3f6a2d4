//! Output endpoint capabilities consumed by the render engine.
//!
//! The engine does not talk to an audio API directly. It drives whatever
//! implements these traits:
//!
//! - [`DeviceEnumerator`]: resolves the default endpoint for a role and
//!   reports default-device changes to an [`EndpointObserver`]
//! - [`Endpoint`]: one output device, activated into an [`AudioClient`]
//! - [`AudioClient`]: format, initialization, clock and padding of the device stream
//! - [`RenderClient`]: the acquire/release buffer exchange
//!
//! [`MockEndpoint`] and [`MockEnumerator`] script these for tests. With the
//! `cpal-backend` feature, [`CpalEnumerator`] drives the host's default output.

#[cfg(feature = "cpal-backend")]
mod cpal;
mod mock;

#[cfg(feature = "cpal-backend")]
pub use self::cpal::{CpalEndpoint, CpalEnumerator};
pub use mock::{MockEndpoint, MockEnumerator, RenderedBuffer};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::format::MixFormat;
use crate::pipeline::ReadySignal;
use crate::EndpointError;

/// Direction of audio flow through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFlow {
    /// Playback.
    Render,
    /// Recording.
    Capture,
}

/// Logical purpose of a default device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceRole {
    /// Games, system sounds and general output.
    #[default]
    Console,
    /// Music and movies.
    Multimedia,
    /// Voice communication.
    Communications,
}

impl DeviceRole {
    /// All roles, in declaration order.
    pub const ALL: [DeviceRole; 3] = [Self::Console, Self::Multimedia, Self::Communications];
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Console => "console",
            Self::Multimedia => "multimedia",
            Self::Communications => "communications",
        })
    }
}

/// Why an audio session was disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The device was removed.
    DeviceRemoval,
    /// The device's shared-mode format changed.
    FormatChanged,
    /// The audio service stopped.
    ServerShutdown,
    /// The user session logged off.
    SessionLogoff,
    /// The session was disconnected by the remote desktop host.
    SessionDisconnected,
    /// Another client took exclusive control of the device.
    ExclusiveModeOverride,
}

/// Scheduling period of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePeriod {
    /// Interval between readiness signals in shared mode.
    pub default: Duration,
    /// Smallest supported interval.
    pub minimum: Duration,
}

/// Receives session notifications from an [`AudioClient`].
///
/// Called on arbitrary platform threads; implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// The session on the active endpoint went away.
    fn on_session_disconnected(&self, reason: DisconnectReason);
}

/// Receives default-device notifications from a [`DeviceEnumerator`].
///
/// Called on arbitrary platform threads; implementations must not block.
pub trait EndpointObserver: Send + Sync {
    /// The default device for `flow` and `role` is now `device_id`.
    fn on_default_device_changed(&self, flow: DataFlow, role: DeviceRole, device_id: &str);
}

/// Resolves default endpoints and reports default-device changes.
pub trait DeviceEnumerator: Send + Sync {
    /// Returns the current default endpoint for `flow` and `role`.
    fn default_endpoint(
        &self,
        flow: DataFlow,
        role: DeviceRole,
    ) -> Result<Arc<dyn Endpoint>, EndpointError>;

    /// Starts delivering default-device changes to `observer`.
    fn register_endpoint_observer(
        &self,
        observer: Arc<dyn EndpointObserver>,
    ) -> Result<(), EndpointError>;

    /// Stops delivering default-device changes. Succeeds when nothing is registered.
    fn unregister_endpoint_observer(&self) -> Result<(), EndpointError>;
}

/// One audio output device.
pub trait Endpoint: Send + Sync {
    /// Stable identifier of the device.
    fn id(&self) -> String;

    /// Creates a new audio client on the device.
    fn activate(&self) -> Result<Arc<dyn AudioClient>, EndpointError>;
}

/// A stream on an [`Endpoint`].
///
/// Methods take `&self`: the engine calls [`stop()`](AudioClient::stop) from the
/// controlling thread while the render thread is using the client.
pub trait AudioClient: Send + Sync {
    /// Returns the device's shared-mode mix format.
    fn mix_format(&self) -> Result<MixFormat, EndpointError>;

    /// Opens the stream in event-driven mode with the given latency hint.
    ///
    /// Returns the device buffer capacity in frames. Rejects latencies the
    /// device cannot honor.
    fn initialize(&self, latency: Duration, format: &MixFormat) -> Result<u32, EndpointError>;

    /// Returns the device's default and minimum scheduling periods.
    fn device_period(&self) -> Result<DevicePeriod, EndpointError>;

    /// Binds the signal the device raises whenever it can accept more frames.
    fn set_ready_signal(&self, signal: ReadySignal) -> Result<(), EndpointError>;

    /// Acquires the buffer-exchange service of an initialized stream.
    fn render_client(&self) -> Result<Box<dyn RenderClient>, EndpointError>;

    /// Returns the number of frames queued in the device and not yet played.
    fn current_padding(&self) -> Result<u32, EndpointError>;

    /// Starts the device clock.
    fn start(&self) -> Result<(), EndpointError>;

    /// Stops the device clock.
    fn stop(&self) -> Result<(), EndpointError>;

    /// Starts delivering session notifications to `observer`.
    fn register_session_observer(
        &self,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<(), EndpointError>;

    /// Stops delivering session notifications. Succeeds when nothing is registered.
    fn unregister_session_observer(&self) -> Result<(), EndpointError>;
}

/// Buffer exchange with the device, owned by the render thread.
pub trait RenderClient: Send {
    /// Returns a writable region for `frames` frames of audio.
    ///
    /// The region is at least `frames × frame_size` bytes.
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], EndpointError>;

    /// Hands `frames` frames of the acquired region to the device.
    ///
    /// With `silent` set the device plays silence regardless of the region's contents.
    fn release_buffer(&mut self, frames: u32, silent: bool) -> Result<(), EndpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_role_default() {
        assert_eq!(DeviceRole::default(), DeviceRole::Console);
    }

    #[test]
    fn test_device_role_display() {
        assert_eq!(DeviceRole::Communications.to_string(), "communications");
        assert_eq!(DeviceRole::ALL.len(), 3);
    }
}
