//! Configuration types for the render engine.

use std::time::Duration;

use crate::endpoint::DeviceRole;

/// Smallest engine latency accepted by [`RenderEngine::initialize()`].
///
/// Shared-mode event-driven rendering cannot keep the device fed below this.
///
/// [`RenderEngine::initialize()`]: crate::RenderEngine::initialize
pub const MIN_LATENCY_MS: u32 = 30;

/// How long a stream switch waits for the new default device to be announced.
pub const DEFAULT_SWITCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Default ring buffer depth, in device periods.
pub const DEFAULT_RING_BUFFER_PERIODS: usize = 10;

/// Default period size, in frames (20ms at 48kHz).
pub const DEFAULT_FRAMES_PER_PERIOD: usize = 960;

/// What happens when a producer writes more than the ring buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Reject the whole write with [`RenderError::BufferOverflow`]. Nothing is buffered.
    ///
    /// [`RenderError::BufferOverflow`]: crate::RenderError::BufferOverflow
    #[default]
    Reject,

    /// Buffer the largest whole-frame prefix that fits and report how much was taken.
    Truncate,

    /// Discard the oldest buffered frames to make room for the new data.
    ///
    /// Emits [`RenderEvent::BufferOverflow`](crate::RenderEvent::BufferOverflow).
    DropOldest,
}

/// Configuration for the render engine.
///
/// Use [`RenderConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_render::{DeviceRole, OverflowPolicy, RenderConfig};
///
/// let config = RenderConfig {
///     role: DeviceRole::Communications,
///     overflow_policy: OverflowPolicy::DropOldest,
///     ..Default::default()
/// };
/// assert!(config.enable_stream_switch);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Role used to resolve "the current default device" after a stream switch.
    ///
    /// Default: [`DeviceRole::Console`]
    pub role: DeviceRole,

    /// Follow the default device when the active endpoint is removed or changed.
    ///
    /// When disabled, no notifications are registered and a lost device simply
    /// stops delivering readiness signals.
    /// Default: true
    pub enable_stream_switch: bool,

    /// Ask the OS for the "Audio" real-time scheduling class on the render thread.
    ///
    /// Best effort; failure is reported via
    /// [`RenderEvent::PriorityBoostUnavailable`](crate::RenderEvent::PriorityBoostUnavailable).
    /// Default: true
    pub realtime_priority: bool,

    /// Ring buffer depth in periods.
    ///
    /// Default: 10
    pub ring_buffer_periods: usize,

    /// Frames per period used to size the ring buffer.
    ///
    /// Default: 960
    pub frames_per_period: usize,

    /// Behavior when a producer overruns the ring buffer.
    ///
    /// Default: [`OverflowPolicy::Reject`]
    pub overflow_policy: OverflowPolicy,

    /// Deadline for the new default device to appear during a stream switch.
    ///
    /// Expiry aborts the switch and stops the engine.
    /// Default: 500ms
    pub switch_timeout: Duration,
}

impl RenderConfig {
    /// Returns the ring buffer capacity in bytes for the given frame size.
    #[must_use]
    pub fn ring_buffer_capacity(&self, frame_size: usize) -> usize {
        self.ring_buffer_periods * self.frames_per_period * frame_size
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::default(),
            enable_stream_switch: true,
            realtime_priority: true,
            ring_buffer_periods: DEFAULT_RING_BUFFER_PERIODS,
            frames_per_period: DEFAULT_FRAMES_PER_PERIOD,
            overflow_policy: OverflowPolicy::default(),
            switch_timeout: DEFAULT_SWITCH_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.role, DeviceRole::Console);
        assert!(config.enable_stream_switch);
        assert!(config.realtime_priority);
        assert_eq!(config.ring_buffer_periods, 10);
        assert_eq!(config.frames_per_period, 960);
        assert_eq!(config.overflow_policy, OverflowPolicy::Reject);
        assert_eq!(config.switch_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_ring_buffer_capacity() {
        let config = RenderConfig::default();
        // 10 periods x 960 frames x 4 bytes (16-bit stereo)
        assert_eq!(config.ring_buffer_capacity(4), 38_400);
        // 32-bit float stereo
        assert_eq!(config.ring_buffer_capacity(8), 76_800);
    }

    #[test]
    fn test_overflow_policy_default() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Reject);
    }
}
