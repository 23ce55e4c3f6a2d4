//! Render pipeline components.
//!
//! Audio flows from producers to the device through a ring buffer drained by
//! a dedicated render thread:
//!
//! ```text
//! Producers → Ring Buffer → Render Thread → Device Buffer
//!                              ↑
//!            shutdown / stream switch / samples ready
//! ```
//!
//! - **Ring Buffer**: Fixed-capacity byte FIFO guarded by one short-held mutex
//! - **Wake Signals**: The three conditions the render thread blocks on
//! - **Render Loop**: Plans each cycle and performs the device buffer exchange
//! - **Stream Switch**: Follows the default device when the endpoint goes away
//!
//! The buffer lock is never held across a device call.

mod device;
mod render_loop;
mod ring_buffer;
mod stream_switch;
mod wake;

pub(crate) use device::DeviceContext;
pub use render_loop::{plan_cycle, RenderPlan};
pub(crate) use render_loop::RenderLoop;
pub use ring_buffer::{RenderBuffer, WriteOutcome};
pub(crate) use stream_switch::{
    StreamSwitchCoordinator, SwitchNotifier, SwitchSettings, SwitchSignals,
};
pub use stream_switch::{SwitchInput, SwitchState};
pub use wake::ReadySignal;
pub(crate) use wake::WakeSignals;
#[cfg(test)]
pub(crate) use wake::Wake;
