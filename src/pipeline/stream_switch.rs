//! Stream switching: moving rendering to a new default endpoint.
//!
//! Notifications arrive on platform threads and only flip signals
//! ([`SwitchNotifier`]). The render thread owns the state machine
//! ([`StreamSwitchCoordinator`]) and performs the switch when it wakes on the
//! stream-switch condition:
//!
//! ```text
//! Stable --armed--> ArmedWaitingForDevice --device ready--> Reinitializing --ok--> Stable
//!                            |                                   |
//!                         timeout                              failed
//!                            v                                   v
//!                         Aborted <------------------------------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::device::DeviceContext;
use super::wake::{ManualResetEvent, ReadySignal, WakeSignals};
use crate::endpoint::{
    DataFlow, DeviceEnumerator, DeviceRole, DisconnectReason, EndpointObserver, SessionObserver,
};
use crate::event::{emit, EventCallback};
use crate::format::MixFormat;
use crate::{RenderError, RenderEvent};

/// Where the engine is in the stream-switch procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchState {
    /// Rendering to a known endpoint.
    #[default]
    Stable,
    /// The old endpoint was released; waiting for the new default device.
    ArmedWaitingForDevice,
    /// Opening and initializing the new endpoint.
    Reinitializing,
    /// The switch failed. Terminal.
    Aborted,
}

/// Inputs that drive [`SwitchState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchInput {
    /// A switch was requested and the render thread took it up.
    Armed,
    /// The new default device was announced in time.
    DeviceReady,
    /// No device was announced before the deadline.
    Timeout,
    /// The new endpoint is initialized and running.
    Reinitialized,
    /// Any step of the switch failed.
    Failed,
}

impl SwitchState {
    /// Returns the state after `input`. Inputs that do not apply leave the state unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use stream_render::{SwitchInput, SwitchState};
    ///
    /// let state = SwitchState::Stable
    ///     .on(SwitchInput::Armed)
    ///     .on(SwitchInput::Timeout);
    /// assert_eq!(state, SwitchState::Aborted);
    /// assert_eq!(state.on(SwitchInput::Armed), SwitchState::Aborted);
    /// ```
    #[must_use]
    pub fn on(self, input: SwitchInput) -> SwitchState {
        use SwitchInput as I;
        use SwitchState as S;

        match (self, input) {
            (S::Aborted, _) => S::Aborted,
            (S::Stable, I::Armed) => S::ArmedWaitingForDevice,
            (S::ArmedWaitingForDevice, I::DeviceReady) => S::Reinitializing,
            (S::ArmedWaitingForDevice | S::Reinitializing, I::Timeout | I::Failed) => S::Aborted,
            (S::Reinitializing, I::Reinitialized) => S::Stable,
            (state, _) => state,
        }
    }

    /// Returns `true` once no further transitions can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SwitchState::Aborted
    }
}

/// Signals shared between notification callbacks and the render thread.
#[derive(Debug, Default)]
pub(crate) struct SwitchSignals {
    /// Set by notifications when a switch is requested, cleared by the render thread.
    ///
    /// Held while `ready_to_proceed` changes, so arming and finishing a switch
    /// never interleave.
    in_switch: Mutex<bool>,
    /// Manual reset: set once the new default device is known.
    ready_to_proceed: ManualResetEvent,
    /// Last state published by the render thread.
    state: Mutex<SwitchState>,
}

impl SwitchSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SwitchState {
        *self.state.lock()
    }

    fn publish(&self, state: SwitchState) {
        *self.state.lock() = state;
    }

    /// Marks a switch as requested, optionally ready to proceed.
    ///
    /// Returns `true` if no switch was pending before.
    fn arm(&self, ready: bool) -> bool {
        let mut in_switch = self.in_switch.lock();
        let newly_armed = !*in_switch;
        *in_switch = true;
        if ready {
            self.ready_to_proceed.set();
        }
        newly_armed
    }

    /// Ends the current switch: clears the request and the ready signal together.
    fn finish(&self) {
        let mut in_switch = self.in_switch.lock();
        self.ready_to_proceed.reset();
        *in_switch = false;
    }

    #[cfg(test)]
    fn in_switch(&self) -> bool {
        *self.in_switch.lock()
    }
}

/// Turns session and endpoint notifications into stream-switch signals.
pub(crate) struct SwitchNotifier {
    signals: Arc<SwitchSignals>,
    wake: Arc<WakeSignals>,
    role: DeviceRole,
    events: Option<EventCallback>,
}

impl SwitchNotifier {
    pub fn new(
        signals: Arc<SwitchSignals>,
        wake: Arc<WakeSignals>,
        role: DeviceRole,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            signals,
            wake,
            role,
            events,
        }
    }

    fn request_switch(&self, reason: Option<DisconnectReason>) {
        tracing::debug!(?reason, "stream switch requested");
        self.wake.signal_stream_switch();
        emit(
            self.events.as_ref(),
            RenderEvent::StreamSwitchRequested { reason },
        );
    }
}

impl SessionObserver for SwitchNotifier {
    fn on_session_disconnected(&self, reason: DisconnectReason) {
        match reason {
            // The new default device will be announced separately.
            DisconnectReason::DeviceRemoval => {
                self.signals.arm(false);
                self.request_switch(Some(reason));
            }
            // Same device, new format: no default-device change will follow.
            DisconnectReason::FormatChanged => {
                self.signals.arm(true);
                self.request_switch(Some(reason));
            }
            other => {
                tracing::debug!(reason = ?other, "session disconnect does not trigger a stream switch");
            }
        }
    }
}

impl EndpointObserver for SwitchNotifier {
    fn on_default_device_changed(&self, flow: DataFlow, role: DeviceRole, device_id: &str) {
        if flow != DataFlow::Render || role != self.role {
            return;
        }

        tracing::debug!(device_id, %role, "default render device changed");
        if self.signals.arm(true) {
            self.request_switch(None);
        }
    }
}

/// Performs stream switches on the render thread.
pub(crate) struct StreamSwitchCoordinator {
    enumerator: Arc<dyn DeviceEnumerator>,
    notifier: Arc<SwitchNotifier>,
    signals: Arc<SwitchSignals>,
    /// Format captured at initialization; new endpoints must match it exactly.
    format: MixFormat,
    latency: Duration,
    role: DeviceRole,
    timeout: Duration,
    ready: ReadySignal,
    state: SwitchState,
}

/// Settings a coordinator needs from the engine's session.
pub(crate) struct SwitchSettings {
    pub format: MixFormat,
    pub latency: Duration,
    pub role: DeviceRole,
    pub timeout: Duration,
}

impl StreamSwitchCoordinator {
    pub fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        notifier: Arc<SwitchNotifier>,
        ready: ReadySignal,
        settings: SwitchSettings,
    ) -> Self {
        let signals = Arc::clone(&notifier.signals);
        let state = signals.state();
        Self {
            enumerator,
            notifier,
            signals,
            format: settings.format,
            latency: settings.latency,
            role: settings.role,
            timeout: settings.timeout,
            ready,
            state,
        }
    }

    /// Moves rendering from `device` to the current default endpoint.
    ///
    /// `device` is released before waiting for the new endpoint, so on failure
    /// there is nothing to fall back to.
    pub fn handle(&mut self, device: DeviceContext) -> Result<DeviceContext, RenderError> {
        self.advance(SwitchInput::Armed);
        tracing::info!(from = %device.endpoint.id(), role = %self.role, "stream switch started");

        let result = self.switch_endpoint(device);

        match result {
            Ok(device) => {
                self.advance(SwitchInput::Reinitialized);
                tracing::info!(to = %device.endpoint.id(), "stream switch completed");
                Ok(device)
            }
            Err(e) => {
                self.signals.finish();
                self.advance(SwitchInput::Failed);
                tracing::error!(error = %e, "stream switch aborted");
                Err(e)
            }
        }
    }

    fn switch_endpoint(&mut self, device: DeviceContext) -> Result<DeviceContext, RenderError> {
        device
            .client
            .stop()
            .map_err(|e| RenderError::endpoint("stop audio client", e))?;

        // The mix format is kept for the comparison below.
        device
            .client
            .unregister_session_observer()
            .map_err(|e| RenderError::endpoint("unregister session notifications", e))?;
        drop(device);

        if !self.signals.ready_to_proceed.wait_timeout(self.timeout) {
            self.advance(SwitchInput::Timeout);
            return Err(RenderError::SwitchTimeout {
                waited: self.timeout,
            });
        }
        self.advance(SwitchInput::DeviceReady);

        let endpoint = self
            .enumerator
            .default_endpoint(DataFlow::Render, self.role)
            .map_err(|source| RenderError::NoDefaultEndpoint {
                role: self.role,
                source,
            })?;

        let client = endpoint
            .activate()
            .map_err(|e| RenderError::endpoint("activate audio client", e))?;

        let candidate = client
            .mix_format()
            .map_err(|e| RenderError::endpoint("get mix format", e))?;
        if !candidate.matches(&self.format) {
            return Err(RenderError::FormatMismatch {
                original: self.format.clone(),
                candidate,
            });
        }

        let device = DeviceContext::open(
            endpoint,
            client,
            &self.format,
            self.latency,
            self.ready.clone(),
        )?;

        device
            .client
            .register_session_observer(Arc::clone(&self.notifier) as Arc<dyn SessionObserver>)
            .map_err(|e| RenderError::endpoint("register session notifications", e))?;

        self.signals.finish();

        if let Err(e) = device.client.start() {
            if let Err(e) = device.client.unregister_session_observer() {
                tracing::debug!(error = %e, "failed to unregister session notifications");
            }
            return Err(RenderError::endpoint("start audio client", e));
        }

        Ok(device)
    }

    fn advance(&mut self, input: SwitchInput) {
        let next = self.state.on(input);
        tracing::trace!(from = ?self.state, to = ?next, ?input, "switch state");
        self.state = next;
        self.signals.publish(next);
    }
}
