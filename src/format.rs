use std::fmt;
use std::str::FromStr;

use alsa::pcm::Format;

/// Sample encodings a handle can be configured with.
///
/// The `*3` variants are packed 24-bit samples occupying three bytes; the
/// plain 24-bit variants sit in the low three bytes of a 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    #[default]
    Unknown,
    S8,
    U8,
    S16LE,
    S16BE,
    U16LE,
    U16BE,
    S24LE,
    S24BE,
    U24LE,
    U24BE,
    S32LE,
    S32BE,
    U32LE,
    U32BE,
    S243LE,
    S243BE,
    U243LE,
    U243BE,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 18] = [
        SampleFormat::S8,
        SampleFormat::U8,
        SampleFormat::S16LE,
        SampleFormat::S16BE,
        SampleFormat::U16LE,
        SampleFormat::U16BE,
        SampleFormat::S24LE,
        SampleFormat::S24BE,
        SampleFormat::U24LE,
        SampleFormat::U24BE,
        SampleFormat::S32LE,
        SampleFormat::S32BE,
        SampleFormat::U32LE,
        SampleFormat::U32BE,
        SampleFormat::S243LE,
        SampleFormat::S243BE,
        SampleFormat::U243LE,
        SampleFormat::U243BE,
    ];

    /// Bytes occupied by one sample. Total: anything outside the catalog
    /// (including `Unknown`) counts as one byte.
    pub fn byte_width(self) -> usize {
        use SampleFormat::*;
        match self {
            S8 | U8 => 1,
            S16LE | S16BE | U16LE | U16BE => 2,
            S243LE | S243BE | U243LE | U243BE => 3,
            S24LE | S24BE | U24LE | U24BE | S32LE | S32BE | U32LE | U32BE => 4,
            Unknown => 1,
        }
    }

    pub fn is_signed(self) -> bool {
        use SampleFormat::*;
        matches!(
            self,
            S8 | S16LE | S16BE | S24LE | S24BE | S32LE | S32BE | S243LE | S243BE
        )
    }

    pub fn is_big_endian(self) -> bool {
        use SampleFormat::*;
        matches!(
            self,
            S16BE | U16BE | S24BE | U24BE | S32BE | U32BE | S243BE | U243BE
        )
    }

    /// Significant bits per sample, as opposed to the storage width.
    pub fn bits(self) -> u32 {
        use SampleFormat::*;
        match self {
            Unknown | S8 | U8 => 8,
            S16LE | S16BE | U16LE | U16BE => 16,
            S24LE | S24BE | U24LE | U24BE | S243LE | S243BE | U243LE | U243BE => 24,
            S32LE | S32BE | U32LE | U32BE => 32,
        }
    }

    /// Byte pattern of one silent sample.
    ///
    /// Signed encodings are silent at zero; unsigned ones at the midpoint,
    /// i.e. with only the top significant bit set.
    pub fn silence(self) -> Vec<u8> {
        let width = self.byte_width();
        let mut sample = vec![0u8; width];
        if self.is_signed() || self == SampleFormat::Unknown {
            return sample;
        }
        // Index of the byte holding the most significant bit. Word-packed
        // 24-bit samples keep it in the third byte from the low end.
        let msb_from_low = (self.bits() as usize / 8) - 1;
        let idx = if self.is_big_endian() {
            width - 1 - msb_from_low
        } else {
            msb_from_low
        };
        sample[idx] = 0x80;
        sample
    }

    /// Human readable name, as printed by the front end.
    pub fn describe(self) -> String {
        if self == SampleFormat::Unknown {
            return "Unrecognized format".to_string();
        }
        let sign = if self.is_signed() { "Signed" } else { "Unsigned" };
        let mut text = format!("{} {} bit", sign, self.bits());
        if self.byte_width() > 1 {
            text.push_str(if self.is_big_endian() {
                " Big Endian"
            } else {
                " Little Endian"
            });
        }
        if matches!(
            self,
            SampleFormat::S243LE | SampleFormat::S243BE | SampleFormat::U243LE | SampleFormat::U243BE
        ) {
            text.push_str(" in 3bytes");
        }
        text
    }

    pub fn name(self) -> &'static str {
        use SampleFormat::*;
        match self {
            Unknown => "UNKNOWN",
            S8 => "S8",
            U8 => "U8",
            S16LE => "S16_LE",
            S16BE => "S16_BE",
            U16LE => "U16_LE",
            U16BE => "U16_BE",
            S24LE => "S24_LE",
            S24BE => "S24_BE",
            U24LE => "U24_LE",
            U24BE => "U24_BE",
            S32LE => "S32_LE",
            S32BE => "S32_BE",
            U32LE => "U32_LE",
            U32BE => "U32_BE",
            S243LE => "S24_3LE",
            S243BE => "S24_3BE",
            U243LE => "U24_3LE",
            U243BE => "U24_3BE",
        }
    }

    pub fn to_alsa(self) -> Format {
        use SampleFormat::*;
        match self {
            Unknown => Format::Unknown,
            S8 => Format::S8,
            U8 => Format::U8,
            S16LE => Format::S16LE,
            S16BE => Format::S16BE,
            U16LE => Format::U16LE,
            U16BE => Format::U16BE,
            S24LE => Format::S24LE,
            S24BE => Format::S24BE,
            U24LE => Format::U24LE,
            U24BE => Format::U24BE,
            S32LE => Format::S32LE,
            S32BE => Format::S32BE,
            U32LE => Format::U32LE,
            U32BE => Format::U32BE,
            S243LE => Format::S243LE,
            S243BE => Format::S243BE,
            U243LE => Format::U243LE,
            U243BE => Format::U243BE,
        }
    }

    /// Formats outside the catalog (float, mu-law, ...) come back as `Unknown`.
    pub fn from_alsa(format: Format) -> Self {
        SampleFormat::ALL
            .iter()
            .copied()
            .find(|f| f.to_alsa() == format)
            .unwrap_or(SampleFormat::Unknown)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sample format '{0}'")]
pub struct ParseFormatError(pub String);

impl FromStr for SampleFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        SampleFormat::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted || f.name().replace('_', "") == wanted)
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_width_covers_catalog() {
        for format in SampleFormat::ALL {
            assert!((1..=4).contains(&format.byte_width()), "{format}");
        }
        assert_eq!(SampleFormat::Unknown.byte_width(), 1);
    }

    #[test]
    fn byte_width_groups() {
        assert_eq!(SampleFormat::U8.byte_width(), 1);
        assert_eq!(SampleFormat::S16BE.byte_width(), 2);
        assert_eq!(SampleFormat::U243LE.byte_width(), 3);
        assert_eq!(SampleFormat::S24LE.byte_width(), 4);
        assert_eq!(SampleFormat::U32BE.byte_width(), 4);
    }

    #[test]
    fn silence_patterns() {
        assert_eq!(SampleFormat::S16LE.silence(), vec![0, 0]);
        assert_eq!(SampleFormat::U8.silence(), vec![0x80]);
        assert_eq!(SampleFormat::U16LE.silence(), vec![0x00, 0x80]);
        assert_eq!(SampleFormat::U16BE.silence(), vec![0x80, 0x00]);
        assert_eq!(SampleFormat::U24LE.silence(), vec![0, 0, 0x80, 0]);
        assert_eq!(SampleFormat::U24BE.silence(), vec![0, 0x80, 0, 0]);
        assert_eq!(SampleFormat::U243BE.silence(), vec![0x80, 0, 0]);
    }

    #[test]
    fn parses_alsa_names() {
        assert_eq!("S16_LE".parse::<SampleFormat>().unwrap(), SampleFormat::S16LE);
        assert_eq!("s24_3le".parse::<SampleFormat>().unwrap(), SampleFormat::S243LE);
        assert_eq!("U8".parse::<SampleFormat>().unwrap(), SampleFormat::U8);
        assert!("FLOAT_LE".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn alsa_mapping_is_consistent() {
        for format in SampleFormat::ALL {
            assert_eq!(SampleFormat::from_alsa(format.to_alsa()), format);
        }
        assert_eq!(SampleFormat::from_alsa(Format::FloatLE), SampleFormat::Unknown);
    }

    #[test]
    fn describes_formats() {
        assert_eq!(SampleFormat::U8.describe(), "Unsigned 8 bit");
        assert_eq!(SampleFormat::S16LE.describe(), "Signed 16 bit Little Endian");
        assert_eq!(SampleFormat::Unknown.describe(), "Unrecognized format");
    }
}
