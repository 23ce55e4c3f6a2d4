//! The objects held for the active output endpoint.

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{AudioClient, Endpoint, RenderClient};
use crate::format::MixFormat;
use crate::pipeline::ReadySignal;
use crate::RenderError;

/// An initialized stream on an endpoint.
///
/// Owned by whoever drives the device: the engine while idle, the render
/// thread while running. Dropping it releases the endpoint.
pub(crate) struct DeviceContext {
    pub endpoint: Arc<dyn Endpoint>,
    pub client: Arc<dyn AudioClient>,
    pub render: Box<dyn RenderClient>,
    /// Device buffer capacity in frames.
    pub buffer_frames: u32,
}

impl DeviceContext {
    /// Runs the initialization sequence on an activated client: open the
    /// stream, bind the readiness signal, acquire the render service.
    pub fn open(
        endpoint: Arc<dyn Endpoint>,
        client: Arc<dyn AudioClient>,
        format: &MixFormat,
        latency: Duration,
        ready: ReadySignal,
    ) -> Result<Self, RenderError> {
        let buffer_frames = client
            .initialize(latency, format)
            .map_err(|e| RenderError::endpoint("initialize audio client", e))?;

        client
            .set_ready_signal(ready)
            .map_err(|e| RenderError::endpoint("set ready signal", e))?;

        let render = client
            .render_client()
            .map_err(|e| RenderError::endpoint("get render client", e))?;

        tracing::debug!(
            endpoint = %endpoint.id(),
            buffer_frames,
            latency_ms = latency.as_millis() as u64,
            "audio client initialized"
        );

        Ok(Self {
            endpoint,
            client,
            render,
            buffer_frames,
        })
    }
}
