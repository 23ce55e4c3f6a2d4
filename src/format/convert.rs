//! Sample conversion between `f32` and the device byte layouts.

use super::SampleType;

/// Converts f32 samples to i16.
///
/// Input should be in the range [-1.0, 1.0].
/// Values outside this range are clamped.
///
/// Uses × 32767 (not 32768) for symmetric scaling, so -1.0 maps to -32767.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Converts i16 samples to f32.
///
/// Output will be in the range [-1.0, 1.0].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Encodes f32 samples into little-endian device bytes of the given sample type.
///
/// Producers use this to turn generated or decoded audio into the byte stream
/// accepted by [`RenderEngine::put_audio_data()`](crate::RenderEngine::put_audio_data).
pub fn encode_samples(samples: &[f32], sample_type: SampleType) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * sample_type.bytes_per_sample());
    match sample_type {
        SampleType::Pcm16 => {
            for &sample in samples {
                bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
            }
        }
        SampleType::Float32 => {
            for &sample in samples {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
    bytes
}

/// Decodes little-endian device bytes into f32 samples.
///
/// A trailing partial sample is ignored.
pub fn decode_samples(bytes: &[u8], sample_type: SampleType) -> Vec<f32> {
    match sample_type {
        SampleType::Pcm16 => bytes
            .chunks_exact(2)
            .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
            .collect(),
        SampleType::Float32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(2.0), 32767); // Clamped
        assert_eq!(f32_to_i16(-2.0), -32768); // Clamped
    }

    #[test]
    fn test_i16_to_f32() {
        assert!((i16_to_f32(0) - 0.0).abs() < f32::EPSILON);
        assert!((i16_to_f32(16384) - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_encode_pcm16_little_endian() {
        let bytes = encode_samples(&[1.0, -1.0], SampleType::Pcm16);
        assert_eq!(bytes, vec![0xFF, 0x7F, 0x01, 0x80]);
    }

    #[test]
    fn test_encode_float32_size() {
        let bytes = encode_samples(&[0.25; 6], SampleType::Float32);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &0.25f32.to_le_bytes());
    }

    #[test]
    fn test_decode_ignores_partial_sample() {
        let samples = decode_samples(&[0, 0, 0, 0x40, 0xAA], SampleType::Pcm16);
        assert_eq!(samples.len(), 2);
        assert!((samples[1] - 0.5).abs() < 0.001);
    }
}
