//! Sine tone example.
//!
//! Plays a 440 Hz tone on the default output device for five seconds. Unplug
//! the device or change the default output while it runs to watch the engine
//! follow the new default.
//!
//! Run with: cargo run --example sine

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use stream_render::format::encode_samples;
use stream_render::{RenderEngine, RenderError};
use tracing_subscriber::EnvFilter;

const FREQUENCY: f32 = 440.0;
const AMPLITUDE: f32 = 0.2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut engine = RenderEngine::builder()
        .on_event(|event| println!("Event: {event:?}"))
        .build_default()?;

    engine.initialize(40)?;

    let format = engine
        .mix_format()
        .cloned()
        .ok_or(RenderError::NotInitialized)?;
    let sample_type = format.sample_type()?;
    let channels = usize::from(format.channels);
    let period = engine.frames_per_period()? as usize;

    println!("Sine Tone Example");
    println!("=================");
    println!("Device format: {format}");
    println!("Period: {period} frames");
    println!();

    let producer = engine.producer()?;
    engine.start()?;

    let step = TAU * FREQUENCY / format.sample_rate as f32;
    let mut phase = 0.0f32;
    let mut samples = Vec::with_capacity(period * channels);
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        // Keep roughly four periods queued ahead of the device
        if producer.buffered_bytes() >= 4 * period * producer.frame_size() {
            std::thread::sleep(Duration::from_millis(2));
            continue;
        }

        samples.clear();
        for _ in 0..period {
            let value = AMPLITUDE * phase.sin();
            samples.extend(std::iter::repeat(value).take(channels));
            phase = (phase + step) % TAU;
        }

        match producer.write(&encode_samples(&samples, sample_type)) {
            Ok(_) => {}
            Err(RenderError::BufferOverflow { .. }) => {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let stats = engine.stats();
    engine.stop()?;
    engine.shutdown();

    println!();
    println!("Stats:");
    println!("  Render cycles:   {}", stats.cycles);
    println!("  Audio frames:    {}", stats.audio_frames);
    println!("  Silent frames:   {}", stats.silent_frames);
    println!("  Stream switches: {}", stats.stream_switches);
    println!("Done!");

    Ok(())
}
