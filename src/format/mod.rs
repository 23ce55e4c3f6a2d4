//! Audio format description and sample conversion.
//!
//! This module provides:
//! - The device mix format ([`MixFormat`]) and its byte-exact comparison
//! - Classification into a render sample type ([`SampleType`])
//! - Helpers to encode f32 audio into device bytes

mod convert;
mod mix_format;

pub use convert::{decode_samples, encode_samples, f32_to_i16, i16_to_f32};
pub use mix_format::{
    ExtensibleFields, FormatTag, MixFormat, SampleType, SubFormat, CHANNEL_MASK_STEREO,
};
