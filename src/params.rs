use std::fmt;

use crate::error::PcmError;
use crate::format::SampleFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub fn to_alsa(self) -> alsa::Direction {
        match self {
            Direction::Playback => alsa::Direction::Playback,
            Direction::Capture => alsa::Direction::Capture,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Playback => f.write_str("playback"),
            Direction::Capture => f.write_str("capture"),
        }
    }
}

/// How transfers behave when the device cannot take or give data right away.
///
/// Only `Block` has semantics of its own here; the other two are handed to
/// the driver at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlockingMode {
    #[default]
    Block,
    Nonblock,
    /// Signal-driven notification. The ALSA backend cannot request it and
    /// refuses the open with EOPNOTSUPP; the virtual device treats it like
    /// `Block`.
    Async,
}

/// Sample layout in the transfer buffers. Only interleaved access is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    #[default]
    RwInterleaved,
}

/// Stream properties, requested by the caller and rewritten with the
/// device's actual values once negotiation succeeds.
///
/// `periods` and `buffer_frames` of zero leave the choice to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
    pub periods: u32,
    pub buffer_frames: usize,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            format: SampleFormat::U8,
            rate: 8000,
            channels: 1,
            periods: 0,
            buffer_frames: 0,
        }
    }
}

impl StreamParameters {
    pub fn new(format: SampleFormat, rate: u32, channels: u32) -> Self {
        Self {
            format,
            rate,
            channels,
            periods: 0,
            buffer_frames: 0,
        }
    }

    pub fn with_periods(mut self, periods: u32) -> Self {
        self.periods = periods;
        self
    }

    pub fn with_buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = frames;
        self
    }

    pub fn access(&self) -> Access {
        Access::RwInterleaved
    }

    pub fn sample_byte_width(&self) -> usize {
        self.format.byte_width()
    }

    pub fn frame_byte_width(&self) -> Result<usize, PcmError> {
        if self.channels == 0 {
            return Err(PcmError::InvalidConfiguration("channel count is zero"));
        }
        Ok(self.sample_byte_width() * self.channels as usize)
    }
}
