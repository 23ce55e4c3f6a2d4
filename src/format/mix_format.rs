//! Device mix format and render sample type classification.

use std::fmt;
use std::time::Duration;

use crate::RenderError;

/// `KSDATAFORMAT_SUBTYPE_PCM` in its in-memory (little-endian GUID) layout.
const SUBTYPE_PCM: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT` in its in-memory layout.
const SUBTYPE_IEEE_FLOAT: [u8; 16] = [
    0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Size of the extension that follows the base header of an extensible format.
const EXTENSIBLE_EXTRA_BYTES: u16 = 22;

/// Speaker mask for front left + front right.
pub const CHANNEL_MASK_STEREO: u32 = 0x3;

/// Wave format tag of a mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Integer PCM.
    Pcm,
    /// IEEE floating point.
    IeeeFloat,
    /// Extensible header; the real encoding is in [`ExtensibleFields::sub_format`].
    Extensible,
}

impl FormatTag {
    /// Returns the numeric wave format tag.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Pcm => 0x0001,
            Self::IeeeFloat => 0x0003,
            Self::Extensible => 0xFFFE,
        }
    }
}

/// Sample encoding carried by an extensible format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubFormat {
    /// Integer PCM.
    Pcm,
    /// IEEE floating point.
    IeeeFloat,
    /// Any other sub-format GUID, in its in-memory layout.
    Other([u8; 16]),
}

impl SubFormat {
    fn guid_bytes(self) -> [u8; 16] {
        match self {
            Self::Pcm => SUBTYPE_PCM,
            Self::IeeeFloat => SUBTYPE_IEEE_FLOAT,
            Self::Other(guid) => guid,
        }
    }
}

/// Extension fields of an extensible mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensibleFields {
    /// Bits of precision actually carried in each sample container.
    pub valid_bits_per_sample: u16,
    /// Speaker positions present in the stream.
    pub channel_mask: u32,
    /// Sample encoding.
    pub sub_format: SubFormat,
}

/// The sample type the render loop writes into device buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// 16-bit signed little-endian integers.
    Pcm16,
    /// 32-bit little-endian IEEE floats.
    Float32,
}

impl SampleType {
    /// Returns the size of one sample in bytes.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// The shared-mode mix format of an output endpoint.
///
/// Captured once at initialization. During a stream switch the new endpoint's
/// format is compared against it with [`MixFormat::matches()`], which looks at
/// the serialized header including any extension fields.
///
/// # Example
///
/// ```
/// use stream_render::format::{MixFormat, SampleType};
///
/// let format = MixFormat::pcm16(48000, 2);
/// assert_eq!(format.frame_size(), 4);
/// assert_eq!(format.sample_type().unwrap(), SampleType::Pcm16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MixFormat {
    /// Wave format tag.
    pub tag: FormatTag,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
    /// Average data rate in bytes per second.
    pub avg_bytes_per_sec: u32,
    /// Bytes per frame.
    pub block_align: u16,
    /// Container size of one sample in bits.
    pub bits_per_sample: u16,
    /// Present for [`FormatTag::Extensible`].
    pub extensible: Option<ExtensibleFields>,
}

impl MixFormat {
    fn with_layout(
        tag: FormatTag,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        extensible: Option<ExtensibleFields>,
    ) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            tag,
            channels,
            sample_rate,
            avg_bytes_per_sec: sample_rate * u32::from(block_align),
            block_align,
            bits_per_sample,
            extensible,
        }
    }

    /// Plain 16-bit integer PCM.
    #[must_use]
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self::with_layout(FormatTag::Pcm, sample_rate, channels, 16, None)
    }

    /// Plain 32-bit IEEE float.
    #[must_use]
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self::with_layout(FormatTag::IeeeFloat, sample_rate, channels, 32, None)
    }

    /// Extensible 32-bit float, the usual shared-mode mix format.
    #[must_use]
    pub fn extensible_float32(sample_rate: u32, channels: u16, channel_mask: u32) -> Self {
        Self::with_layout(
            FormatTag::Extensible,
            sample_rate,
            channels,
            32,
            Some(ExtensibleFields {
                valid_bits_per_sample: 32,
                channel_mask,
                sub_format: SubFormat::IeeeFloat,
            }),
        )
    }

    /// Bytes per frame (one sample for every channel).
    #[must_use]
    pub fn frame_size(&self) -> usize {
        usize::from(self.block_align)
    }

    /// Classifies the format into a sample type the render loop supports.
    ///
    /// Integer PCM must be 16-bit; float formats are accepted as-is.
    pub fn sample_type(&self) -> Result<SampleType, RenderError> {
        let encoding = match (self.tag, self.extensible) {
            (FormatTag::Pcm, _) => Some(SubFormat::Pcm),
            (FormatTag::IeeeFloat, _) => Some(SubFormat::IeeeFloat),
            (FormatTag::Extensible, Some(ext)) => Some(ext.sub_format),
            (FormatTag::Extensible, None) => None,
        };

        match encoding {
            Some(SubFormat::Pcm) if self.bits_per_sample == 16 => Ok(SampleType::Pcm16),
            Some(SubFormat::Pcm) => Err(RenderError::UnsupportedFormat {
                format: format!("{}-bit integer PCM", self.bits_per_sample),
            }),
            Some(SubFormat::IeeeFloat) => Ok(SampleType::Float32),
            _ => Err(RenderError::UnsupportedFormat {
                format: self.to_string(),
            }),
        }
    }

    /// Serializes the format header in little-endian wave-format layout.
    ///
    /// The base header is 18 bytes; extensible formats append 22 bytes of extension.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let extra = if self.extensible.is_some() {
            EXTENSIBLE_EXTRA_BYTES
        } else {
            0
        };

        let mut bytes = Vec::with_capacity(18 + usize::from(extra));
        bytes.extend_from_slice(&self.tag.code().to_le_bytes());
        bytes.extend_from_slice(&self.channels.to_le_bytes());
        bytes.extend_from_slice(&self.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&self.avg_bytes_per_sec.to_le_bytes());
        bytes.extend_from_slice(&self.block_align.to_le_bytes());
        bytes.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(&extra.to_le_bytes());

        if let Some(ext) = self.extensible {
            bytes.extend_from_slice(&ext.valid_bits_per_sample.to_le_bytes());
            bytes.extend_from_slice(&ext.channel_mask.to_le_bytes());
            bytes.extend_from_slice(&ext.sub_format.guid_bytes());
        }

        bytes
    }

    /// Returns `true` if both formats serialize to identical bytes.
    #[must_use]
    pub fn matches(&self, other: &MixFormat) -> bool {
        self.to_bytes() == other.to_bytes()
    }

    /// Converts a duration into frames at this format's sample rate, rounded to nearest.
    #[must_use]
    pub fn frames_in(&self, duration: Duration) -> u32 {
        (f64::from(self.sample_rate) * duration.as_secs_f64() + 0.5) as u32
    }
}

impl fmt::Display for MixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoding = match (self.tag, self.extensible.map(|ext| ext.sub_format)) {
            (FormatTag::IeeeFloat, _) | (FormatTag::Extensible, Some(SubFormat::IeeeFloat)) => {
                "float"
            }
            (FormatTag::Pcm, _) | (FormatTag::Extensible, Some(SubFormat::Pcm)) => "int",
            _ => "unknown",
        };
        write!(
            f,
            "{}Hz/{}ch/{}-bit {}",
            self.sample_rate, self.channels, self.bits_per_sample, encoding
        )
    }
}
