//! # stream-render
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Low-latency event-driven audio rendering with default-device stream switching.
//!
//! `stream-render` takes a continuous stream of PCM bytes from any number of
//! producer threads and feeds it to an output endpoint every time the device
//! signals it can take more. When the endpoint is removed or the default device
//! changes, rendering moves to the new default device without tearing down
//! the engine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stream_render::RenderEngine;
//!
//! let mut engine = RenderEngine::builder()
//!     .on_event(|e| tracing::warn!(?e, "render event"))
//!     .build_default()?;
//!
//! engine.initialize(40)?;                       // 40ms engine latency
//! let producer = engine.producer()?;
//! engine.start()?;
//!
//! // Write PCM in the device mix format from any thread
//! producer.write(&pcm_bytes)?;
//!
//! engine.stop()?;
//! engine.shutdown();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Producer threads**: Append bytes to a fixed-capacity ring buffer
//! - **Render thread**: Sleeps until shutdown, stream switch or device readiness,
//!   then moves whole frames from the ring buffer to the device, or silence
//!   when nothing is pending
//! - **Notification threads**: Platform callbacks only raise signals; the
//!   render thread performs the stream switch itself
//!
//! The ring buffer lock is held only for memory copies, never across a device call.
//!
//! ## Backends
//!
//! The engine drives anything implementing the [`endpoint`] traits. The
//! default `cpal-backend` feature provides [`CpalEnumerator`](endpoint::CpalEnumerator);
//! [`MockEnumerator`](endpoint::MockEnumerator) scripts a device for tests.

// unsafe_code is denied in Cargo.toml; the MMCSS calls opt out locally
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
pub mod endpoint;
mod engine;
mod error;
mod event;
pub mod format;
mod pipeline;
mod platform;

pub use builder::RenderEngineBuilder;
pub use config::{
    OverflowPolicy, RenderConfig, DEFAULT_FRAMES_PER_PERIOD, DEFAULT_RING_BUFFER_PERIODS,
    DEFAULT_SWITCH_TIMEOUT, MIN_LATENCY_MS,
};
pub use endpoint::{DataFlow, DeviceRole, DisconnectReason};
pub use engine::{AudioProducer, EngineState, RenderEngine, RenderStats};
pub use error::{EndpointError, RenderError};
pub use event::{event_callback, EventCallback, RenderEvent};
pub use pipeline::{
    plan_cycle, ReadySignal, RenderBuffer, RenderPlan, SwitchInput, SwitchState, WriteOutcome,
};
