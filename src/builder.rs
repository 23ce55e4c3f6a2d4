//! Builder pattern for `RenderEngine`.

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{DeviceEnumerator, DeviceRole, Endpoint};
use crate::{
    event_callback, EventCallback, OverflowPolicy, RenderConfig, RenderEngine, RenderError,
    RenderEvent,
};

/// Builder for configuring a render engine.
///
/// Use [`RenderEngine::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stream_render::endpoint::{DeviceRole, MockEndpoint, MockEnumerator};
/// use stream_render::format::MixFormat;
/// use stream_render::{OverflowPolicy, RenderEngine};
///
/// let speakers = MockEndpoint::new("speakers", MixFormat::float32(48_000, 2));
/// let enumerator = Arc::new(MockEnumerator::new(speakers));
///
/// let mut engine = RenderEngine::builder()
///     .role(DeviceRole::Multimedia)
///     .overflow_policy(OverflowPolicy::DropOldest)
///     .realtime_priority(false)
///     .on_event(|e| tracing::debug!(?e, "render event"))
///     .build(enumerator)?;
///
/// engine.initialize(40)?;
/// # Ok::<(), stream_render::RenderError>(())
/// ```
#[must_use]
pub struct RenderEngineBuilder {
    /// Fixed endpoint; `None` resolves the default device for the role.
    endpoint: Option<Arc<dyn Endpoint>>,
    /// Event callback.
    event_callback: Option<EventCallback>,
    /// Engine configuration.
    config: RenderConfig,
}

impl Default for RenderEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            event_callback: None,
            config: RenderConfig::default(),
        }
    }

    /// Render to a specific endpoint instead of the current default device.
    ///
    /// Stream switches still move to the default device for the configured role.
    pub fn endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the device role used to resolve the default device.
    ///
    /// Default: [`DeviceRole::Console`]
    pub fn role(mut self, role: DeviceRole) -> Self {
        self.config.role = role;
        self
    }

    /// Enable or disable following the default device on removal or change.
    ///
    /// Default: enabled
    pub fn stream_switch(mut self, enabled: bool) -> Self {
        self.config.enable_stream_switch = enabled;
        self
    }

    /// Enable or disable the real-time scheduling request for the render thread.
    ///
    /// Default: enabled
    pub fn realtime_priority(mut self, enabled: bool) -> Self {
        self.config.realtime_priority = enabled;
        self
    }

    /// Set the ring buffer depth in periods.
    pub fn ring_buffer_periods(mut self, periods: usize) -> Self {
        self.config.ring_buffer_periods = periods;
        self
    }

    /// Set the period size in frames used to size the ring buffer.
    pub fn frames_per_period(mut self, frames: usize) -> Self {
        self.config.frames_per_period = frames;
        self
    }

    /// Set the behavior when a producer overruns the ring buffer.
    ///
    /// Default: [`OverflowPolicy::Reject`]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// Set how long a stream switch waits for the new default device.
    ///
    /// Default: 500ms
    pub fn switch_timeout(mut self, timeout: Duration) -> Self {
        self.config.switch_timeout = timeout;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include stream switches, overflow drops and render failures.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RenderEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom engine configuration.
    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), RenderError> {
        if self.config.ring_buffer_periods == 0 {
            return Err(RenderError::InvalidConfig {
                reason: "ring_buffer_periods must be at least 1".into(),
            });
        }
        if self.config.frames_per_period == 0 {
            return Err(RenderError::InvalidConfig {
                reason: "frames_per_period must be at least 1".into(),
            });
        }
        if self.config.switch_timeout.is_zero() {
            return Err(RenderError::InvalidConfig {
                reason: "switch_timeout must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Creates the engine. Call [`RenderEngine::initialize()`] next.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if the ring buffer would be
    /// empty or the switch timeout is zero.
    pub fn build(self, enumerator: Arc<dyn DeviceEnumerator>) -> Result<RenderEngine, RenderError> {
        self.validate()?;
        Ok(RenderEngine::new(
            enumerator,
            self.endpoint,
            self.config,
            self.event_callback,
        ))
    }

    /// Creates an engine on the host's default output device via CPAL.
    ///
    /// # Errors
    ///
    /// Same as [`build()`](Self::build).
    #[cfg(feature = "cpal-backend")]
    pub fn build_default(self) -> Result<RenderEngine, RenderError> {
        self.build(Arc::new(crate::endpoint::CpalEnumerator::new()))
    }
}

impl RenderEngine {
    /// Creates a new builder for configuring a render engine.
    pub fn builder() -> RenderEngineBuilder {
        RenderEngineBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{MockEndpoint, MockEnumerator};
    use crate::format::MixFormat;

    fn enumerator() -> Arc<MockEnumerator> {
        Arc::new(MockEnumerator::new(MockEndpoint::new(
            "speakers",
            MixFormat::pcm16(48_000, 2),
        )))
    }

    #[test]
    fn test_builder_default() {
        let builder = RenderEngineBuilder::new();
        assert!(builder.endpoint.is_none());
        assert!(builder.event_callback.is_none());
        assert_eq!(builder.config.role, DeviceRole::Console);
    }

    #[test]
    fn test_builder_setters() {
        let builder = RenderEngine::builder()
            .role(DeviceRole::Communications)
            .stream_switch(false)
            .realtime_priority(false)
            .ring_buffer_periods(4)
            .frames_per_period(480)
            .overflow_policy(OverflowPolicy::Truncate)
            .switch_timeout(Duration::from_millis(200));

        let config = &builder.config;
        assert_eq!(config.role, DeviceRole::Communications);
        assert!(!config.enable_stream_switch);
        assert!(!config.realtime_priority);
        assert_eq!(config.ring_buffer_capacity(4), 4 * 480 * 4);
        assert_eq!(config.overflow_policy, OverflowPolicy::Truncate);
        assert_eq!(config.switch_timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_builder_rejects_empty_ring() {
        let result = RenderEngine::builder()
            .ring_buffer_periods(0)
            .build(enumerator());
        assert!(matches!(result, Err(RenderError::InvalidConfig { .. })));

        let result = RenderEngine::builder()
            .frames_per_period(0)
            .build(enumerator());
        assert!(matches!(result, Err(RenderError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_switch_timeout() {
        let result = RenderEngine::builder()
            .switch_timeout(Duration::ZERO)
            .build(enumerator());
        assert!(matches!(result, Err(RenderError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_with_config() {
        let config = RenderConfig {
            role: DeviceRole::Multimedia,
            ..Default::default()
        };
        let builder = RenderEngine::builder().with_config(config);
        assert_eq!(builder.config.role, DeviceRole::Multimedia);
    }

    #[test]
    fn test_builder_event_callback_attached() {
        let builder = RenderEngine::builder().on_event(|_| {});
        assert!(builder.event_callback.is_some());
    }

    #[test]
    fn test_build_resolves_default_at_initialize() {
        let mut engine = RenderEngine::builder()
            .realtime_priority(false)
            .build(enumerator())
            .unwrap();
        engine.initialize(30).unwrap();
        assert_eq!(engine.mix_format(), Some(&MixFormat::pcm16(48_000, 2)));
    }
}
