//! Error types for stream-render.
//!
//! Errors are split into two categories:
//! - **Engine errors** ([`RenderError`]): returned from engine operations, or recorded as the
//!   engine's fault when the render loop dies
//! - **Endpoint errors** ([`EndpointError`]): reported by the device capabilities the engine
//!   consumes, wrapped into [`RenderError::Endpoint`] with the failing operation's name

use std::time::Duration;

use crate::endpoint::DeviceRole;
use crate::engine::EngineState;
use crate::format::MixFormat;

/// Errors produced by the render engine.
///
/// Configuration and initialization errors are returned synchronously from
/// [`RenderEngine::initialize()`]. Runtime render failures and stream-switch
/// failures stop the engine; they are retrievable with [`RenderEngine::take_fault()`]
/// and reported via [`RenderEvent`](crate::RenderEvent).
///
/// [`RenderEngine::initialize()`]: crate::RenderEngine::initialize
/// [`RenderEngine::take_fault()`]: crate::RenderEngine::take_fault
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The requested engine latency is too small for shared event-driven mode.
    #[error("engine latency {requested_ms}ms is below the {minimum_ms}ms minimum")]
    LatencyTooLow {
        /// Latency passed to `initialize`.
        requested_ms: u32,
        /// Smallest accepted latency.
        minimum_ms: u32,
    },

    /// Engine options are inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The engine was used before `initialize` succeeded.
    #[error("engine not initialized (call initialize first)")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// The operation is not valid in the engine's current state.
    #[error("cannot {operation} while engine is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the engine was in.
        state: EngineState,
    },

    /// The device mix format uses a sample type the engine cannot render.
    #[error("unsupported mix format: {format}")]
    UnsupportedFormat {
        /// Description of the rejected format.
        format: String,
    },

    /// A device primitive failed.
    #[error("{operation} failed: {source}")]
    Endpoint {
        /// The device operation that failed.
        operation: &'static str,
        /// The underlying endpoint error.
        #[source]
        source: EndpointError,
    },

    /// A producer write did not fit in the ring buffer.
    #[error("render buffer overflow: {requested}-byte write with only {available} bytes free")]
    BufferOverflow {
        /// Size of the rejected write.
        requested: usize,
        /// Free space at the time of the write.
        available: usize,
    },

    /// No new default device was announced before the stream-switch deadline.
    #[error("stream switch timed out after {}ms waiting for a new default device", waited.as_millis())]
    SwitchTimeout {
        /// How long the switch waited.
        waited: Duration,
    },

    /// The new default device's mix format differs from the original.
    #[error("new mix format {candidate} does not match original {original}")]
    FormatMismatch {
        /// Format captured at initialization.
        original: MixFormat,
        /// Format reported by the new endpoint.
        candidate: MixFormat,
    },

    /// The default endpoint for the configured role could not be resolved.
    #[error("no default {role} output endpoint: {source}")]
    NoDefaultEndpoint {
        /// Role that was looked up.
        role: DeviceRole,
        /// The underlying endpoint error.
        #[source]
        source: EndpointError,
    },

    /// The render thread could not be created.
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl RenderError {
    /// Wraps an endpoint failure with the name of the operation that produced it.
    pub fn endpoint(operation: &'static str, source: EndpointError) -> Self {
        Self::Endpoint { operation, source }
    }

    /// Returns `true` for failures raised while switching streams.
    #[must_use]
    pub fn is_stream_switch_failure(&self) -> bool {
        matches!(
            self,
            Self::SwitchTimeout { .. } | Self::FormatMismatch { .. } | Self::NoDefaultEndpoint { .. }
        )
    }
}

/// Errors reported by an [`Endpoint`](crate::endpoint::Endpoint) implementation.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The requested device does not exist.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name or id of the missing device.
        name: String,
    },

    /// The device went away and its objects are no longer usable.
    #[error("device invalidated")]
    DeviceInvalidated,

    /// The device cannot honor the request (latency, format, buffer size).
    #[error("not supported: {0}")]
    Unsupported(String),

    /// An error from the underlying audio library.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// Custom error for user-implemented endpoints.
    #[error("{0}")]
    Custom(String),
}

impl EndpointError {
    /// Creates a custom endpoint error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates an unsupported-request error with the given message.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_error_display() {
        let err = RenderError::LatencyTooLow {
            requested_ms: 29,
            minimum_ms: 30,
        };
        assert_eq!(
            err.to_string(),
            "engine latency 29ms is below the 30ms minimum"
        );
    }

    #[test]
    fn test_endpoint_error_wrapping() {
        let err = RenderError::endpoint("acquire render buffer", EndpointError::DeviceInvalidated);
        assert_eq!(err.to_string(), "acquire render buffer failed: device invalidated");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_switch_timeout_display() {
        let err = RenderError::SwitchTimeout {
            waited: Duration::from_millis(500),
        };
        assert!(err.to_string().contains("500ms"));
        assert!(err.is_stream_switch_failure());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = RenderError::InvalidState {
            operation: "start",
            state: EngineState::Running,
        };
        assert_eq!(err.to_string(), "cannot start while engine is running");
        assert!(!err.is_stream_switch_failure());
    }

    #[test]
    fn test_endpoint_error_helpers() {
        assert_eq!(EndpointError::custom("boom").to_string(), "boom");
        assert_eq!(
            EndpointError::backend("alsa").to_string(),
            "audio backend error: alsa"
        );
        assert_eq!(
            EndpointError::unsupported("latency").to_string(),
            "not supported: latency"
        );
    }
}
