//! The render thread: waits for a wake condition, then feeds the device.
//!
//! Each time the device signals readiness the loop decides how many frames
//! to hand over and whether they are real audio or silence:
//!
//! 1. Nothing pending: fill all free device frames with silence.
//! 2. Everything pending fits: deliver the whole frames that are pending,
//!    leaving the rest of the free space untouched.
//! 3. More pending than fits: deliver exactly the free frames of audio.
//!
//! A failed buffer exchange ends the loop; there is no retry of the cycle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::device::DeviceContext;
use super::stream_switch::StreamSwitchCoordinator;
use super::wake::Wake;
use crate::engine::{EngineShared, EngineState};
use crate::platform;
use crate::{EndpointError, RenderError, RenderEvent};

/// What one render cycle hands to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPlan {
    /// Deliver `frames` frames flagged as silence.
    Silence {
        /// Frames to release.
        frames: u32,
    },
    /// Copy `frames` frames of buffered audio to the device.
    Audio {
        /// Frames to copy and release.
        frames: u32,
    },
}

impl RenderPlan {
    /// Frames released to the device by this plan.
    #[must_use]
    pub fn frames(self) -> u32 {
        match self {
            Self::Silence { frames } | Self::Audio { frames } => frames,
        }
    }

    /// Bytes taken from the ring buffer by this plan.
    #[must_use]
    pub fn bytes_consumed(self, frame_size: usize) -> usize {
        match self {
            Self::Silence { .. } => 0,
            Self::Audio { frames } => frames as usize * frame_size,
        }
    }
}

/// Decides what a render cycle delivers.
///
/// `buffer_frames` is the device buffer capacity, `padding` the frames it
/// still has queued, `pending` the bytes waiting in the ring buffer.
///
/// # Example
///
/// ```
/// use stream_render::{plan_cycle, RenderPlan};
///
/// // 480-frame device buffer, 4-byte frames, device drained
/// assert_eq!(plan_cycle(480, 0, 0, 4), RenderPlan::Silence { frames: 480 });
/// assert_eq!(plan_cycle(480, 0, 200, 4), RenderPlan::Audio { frames: 50 });
/// assert_eq!(plan_cycle(480, 0, 3000, 4), RenderPlan::Audio { frames: 480 });
/// ```
#[must_use]
pub fn plan_cycle(buffer_frames: u32, padding: u32, pending: usize, frame_size: usize) -> RenderPlan {
    let frames_available = buffer_frames.saturating_sub(padding);
    let frame_size = frame_size.max(1);

    if pending == 0 {
        RenderPlan::Silence {
            frames: frames_available,
        }
    } else if pending <= frames_available as usize * frame_size {
        // Sub-frame remainders stay buffered for a later cycle.
        RenderPlan::Audio {
            frames: (pending / frame_size) as u32,
        }
    } else {
        RenderPlan::Audio {
            frames: frames_available,
        }
    }
}

/// State moved onto the render thread for the lifetime of one `start`/`stop` cycle.
pub(crate) struct RenderLoop {
    shared: Arc<EngineShared>,
    device: DeviceContext,
    coordinator: Option<StreamSwitchCoordinator>,
    realtime_priority: bool,
}

impl RenderLoop {
    pub fn new(
        shared: Arc<EngineShared>,
        device: DeviceContext,
        coordinator: Option<StreamSwitchCoordinator>,
        realtime_priority: bool,
    ) -> Self {
        Self {
            shared,
            device,
            coordinator,
            realtime_priority,
        }
    }

    /// Runs until shutdown or a fatal failure.
    ///
    /// Returns the device context so the engine can restart on it, or `None`
    /// when a failed stream switch already released it.
    pub fn run(self) -> Option<DeviceContext> {
        let RenderLoop {
            shared,
            mut device,
            mut coordinator,
            realtime_priority,
        } = self;

        let _priority = if realtime_priority {
            match platform::boost_current_thread() {
                Ok(guard) => Some(guard),
                Err(reason) => {
                    tracing::warn!(%reason, "unable to enable real-time priority on render thread");
                    shared.emit(RenderEvent::PriorityBoostUnavailable { reason });
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(endpoint = %device.endpoint.id(), "render thread started");

        let mut padding_failures = 0u32;
        loop {
            match shared.wake.wait() {
                Wake::Shutdown => {
                    // A switch that finished after `stop` started the new clock.
                    *shared.active_client.lock() = None;
                    if let Err(e) = device.client.stop() {
                        tracing::warn!(error = %e, "failed to stop audio client");
                    }
                    tracing::debug!("render thread shutting down");
                    return Some(device);
                }
                Wake::StreamSwitch => {
                    let Some(coordinator) = coordinator.as_mut() else {
                        tracing::debug!("stream switch signal ignored, switching disabled");
                        continue;
                    };

                    shared.set_state(EngineState::Switching);
                    *shared.active_client.lock() = None;

                    match coordinator.handle(device) {
                        Ok(new_device) => {
                            device = new_device;
                            shared
                                .buffer_frames
                                .store(device.buffer_frames, Ordering::SeqCst);
                            *shared.active_client.lock() = Some(Arc::clone(&device.client));
                            shared.set_state(EngineState::Running);
                            shared.stats.stream_switches.fetch_add(1, Ordering::SeqCst);
                            shared.emit(RenderEvent::StreamSwitchCompleted {
                                endpoint_id: device.endpoint.id(),
                            });
                        }
                        Err(e) => {
                            shared.emit(RenderEvent::StreamSwitchAborted {
                                reason: e.to_string(),
                            });
                            shared.fail(e);
                            return None;
                        }
                    }
                }
                Wake::SamplesReady => {
                    if let Err(e) = render_cycle(&shared, &mut device, &mut padding_failures) {
                        tracing::error!(error = %e, "render cycle failed, stopping render thread");
                        if let Err(e) = device.client.stop() {
                            tracing::warn!(error = %e, "failed to stop audio client");
                        }
                        shared.emit(RenderEvent::RenderFailed {
                            error: e.to_string(),
                        });
                        shared.fail(e);
                        return Some(device);
                    }
                }
            }
        }
    }
}

/// Performs one readiness cycle against the device.
///
/// `padding_failures` counts consecutive cycles skipped because the padding
/// query failed; only the first of a run is logged as a warning.
fn render_cycle(
    shared: &EngineShared,
    device: &mut DeviceContext,
    padding_failures: &mut u32,
) -> Result<(), RenderError> {
    let padding = match device.client.current_padding() {
        Ok(padding) => {
            if *padding_failures > 0 {
                tracing::debug!(skipped = *padding_failures, "device padding available again");
                *padding_failures = 0;
            }
            padding
        }
        Err(e) => {
            // A padding query failure skips the cycle; the next wake retries.
            shared.stats.skipped_cycles.fetch_add(1, Ordering::Relaxed);
            *padding_failures = padding_failures.saturating_add(1);
            if *padding_failures == 1 {
                tracing::warn!(error = %e, "unable to query device padding, skipping cycles");
            } else {
                tracing::trace!(error = %e, skipped = *padding_failures, "padding query failed");
            }
            return Ok(());
        }
    };

    let frame_size = shared.session.frame_size;
    let pending = shared.buffer.lock().available_read();
    let plan = plan_cycle(device.buffer_frames, padding, pending, frame_size);

    tracing::trace!(padding, pending, ?plan, "render cycle");

    let frames = plan.frames();
    if frames == 0 {
        return Ok(());
    }

    let region = device
        .render
        .get_buffer(frames)
        .map_err(|e| RenderError::endpoint("acquire render buffer", e))?;

    let silent = match plan {
        RenderPlan::Silence { .. } => true,
        RenderPlan::Audio { .. } => {
            let bytes = plan.bytes_consumed(frame_size);
            let len = region.len();
            let dest = region.get_mut(..bytes).ok_or_else(|| {
                RenderError::endpoint(
                    "acquire render buffer",
                    EndpointError::backend(format!(
                        "device returned {len} bytes for {frames} frames"
                    )),
                )
            })?;
            shared.buffer.lock().read(dest);
            false
        }
    };

    device
        .render
        .release_buffer(frames, silent)
        .map_err(|e| RenderError::endpoint("release render buffer", e))?;

    shared.stats.cycles.fetch_add(1, Ordering::Relaxed);
    let counter = if silent {
        &shared.stats.silent_frames
    } else {
        &shared.stats.audio_frames
    };
    counter.fetch_add(u64::from(frames), Ordering::Relaxed);

    Ok(())
}
