//! Runtime events for monitoring the render engine.
//!
//! Events are notifications about engine behavior for logging and metrics.
//! Fatal conditions are also reported here, in addition to the engine
//! moving to [`EngineState::Stopped`](crate::EngineState::Stopped).

use std::sync::Arc;

use crate::endpoint::DisconnectReason;

/// Runtime events emitted by the render engine.
///
/// # Example
///
/// ```
/// use stream_render::RenderEvent;
///
/// fn handle_event(event: RenderEvent) {
///     match event {
///         RenderEvent::Started => eprintln!("rendering"),
///         RenderEvent::Stopped { reason } => eprintln!("stopped: {reason}"),
///         RenderEvent::StreamSwitchRequested { reason } => {
///             eprintln!("switching streams: {reason:?}");
///         }
///         RenderEvent::StreamSwitchCompleted { endpoint_id } => {
///             eprintln!("now rendering to {endpoint_id}");
///         }
///         RenderEvent::StreamSwitchAborted { reason } => eprintln!("switch aborted: {reason}"),
///         RenderEvent::RenderFailed { error } => eprintln!("render failed: {error}"),
///         RenderEvent::BufferOverflow { dropped_bytes } => {
///             eprintln!("dropped {dropped_bytes} bytes");
///         }
///         RenderEvent::PriorityBoostUnavailable { reason } => {
///             eprintln!("no real-time priority: {reason}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// The render thread is running and the device clock has started.
    Started,

    /// The render loop exited.
    Stopped {
        /// Why rendering stopped.
        reason: String,
    },

    /// A notification asked the engine to move to a new endpoint.
    StreamSwitchRequested {
        /// What triggered the switch. `None` for a default-device change.
        reason: Option<DisconnectReason>,
    },

    /// Rendering resumed on a newly resolved default endpoint.
    StreamSwitchCompleted {
        /// Id of the endpoint now in use.
        endpoint_id: String,
    },

    /// A stream switch failed; the engine has stopped.
    StreamSwitchAborted {
        /// Description of the failure.
        reason: String,
    },

    /// A device buffer exchange failed; the engine has stopped.
    RenderFailed {
        /// Description of the failure.
        error: String,
    },

    /// Buffered audio was discarded to make room for a producer write.
    ///
    /// Only emitted under [`OverflowPolicy::DropOldest`](crate::OverflowPolicy::DropOldest).
    BufferOverflow {
        /// Number of bytes discarded.
        dropped_bytes: usize,
    },

    /// The render thread could not obtain real-time scheduling.
    PriorityBoostUnavailable {
        /// Why the boost was refused.
        reason: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`RenderEngineBuilder::on_event()`]. Callbacks run on the
/// render thread, the producer's thread, or a platform notification thread,
/// and must not block.
///
/// [`RenderEngineBuilder::on_event()`]: crate::RenderEngineBuilder::on_event
pub type EventCallback = Arc<dyn Fn(RenderEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_render::{event_callback, RenderEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RenderEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sends an event to the callback if one is configured.
pub(crate) fn emit(callback: Option<&EventCallback>, event: RenderEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_event_debug() {
        let event = RenderEvent::BufferOverflow { dropped_bytes: 128 };
        let debug = format!("{:?}", event);
        assert!(debug.contains("BufferOverflow"));
        assert!(debug.contains("128"));
    }

    #[test]
    fn test_render_event_clone() {
        let event = RenderEvent::StreamSwitchRequested {
            reason: Some(DisconnectReason::FormatChanged),
        };
        if let RenderEvent::StreamSwitchRequested { reason } = event.clone() {
            assert_eq!(reason, Some(DisconnectReason::FormatChanged));
        } else {
            panic!("Expected StreamSwitchRequested variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        emit(Some(&callback), RenderEvent::Started);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_emit_without_callback() {
        emit(None, RenderEvent::Started);
    }
}
