//! Hardware parameter negotiation.
//!
//! The requested properties are applied to a fresh configuration space in a
//! fixed order: access, format, rate, channels, periods, buffer size. The
//! first step the device refuses aborts the whole negotiation and is named
//! in the error. Nothing reaches the device until the final commit, which
//! happens after any running stream has been drained.

use tracing::{debug, info};

use crate::error::{HwParam, PcmError};
use crate::params::StreamParameters;
use crate::session::PcmSession;

/// Negotiates `desired` against `session` and returns the values the device
/// actually took.
pub fn negotiate(
    session: &dyn PcmSession,
    desired: &StreamParameters,
) -> Result<StreamParameters, PcmError> {
    let mut space = session.hw_space().map_err(PcmError::config(HwParam::Space))?;
    let mut actual = *desired;

    space
        .set_access_interleaved()
        .map_err(PcmError::config(HwParam::Access))?;
    space
        .set_format(desired.format)
        .map_err(PcmError::config(HwParam::Format))?;
    debug!(format = %desired.format, "format accepted");

    actual.rate = space
        .set_rate_near(desired.rate)
        .map_err(PcmError::config(HwParam::Rate))?;
    debug!(requested = desired.rate, actual = actual.rate, "rate negotiated");

    space
        .set_channels(desired.channels)
        .map_err(PcmError::config(HwParam::Channels))?;

    if desired.periods > 0 {
        actual.periods = space
            .set_periods_near(desired.periods)
            .map_err(PcmError::config(HwParam::Periods))?;
        debug!(requested = desired.periods, actual = actual.periods, "periods negotiated");
    }

    if desired.buffer_frames > 0 {
        actual.buffer_frames = space
            .set_buffer_size_near(desired.buffer_frames)
            .map_err(PcmError::config(HwParam::BufferSize))?;
        debug!(
            requested = desired.buffer_frames,
            actual = actual.buffer_frames,
            "buffer size negotiated"
        );
    }

    // Pending frames are played out before the stream is reconfigured.
    if let Err(fault) = session.drain() {
        debug!(%fault, "nothing to drain before commit");
    }

    space.commit().map_err(PcmError::config(HwParam::Commit))?;
    info!(
        format = %actual.format,
        rate = actual.rate,
        channels = actual.channels,
        periods = actual.periods,
        buffer_frames = actual.buffer_frames,
        "hardware parameters applied"
    );
    Ok(actual)
}

/// Highest rate the hardware runs at natively, with resampling disabled.
pub fn max_sample_rate(session: &dyn PcmSession) -> Result<u32, PcmError> {
    let mut space = session.hw_space().map_err(PcmError::config(HwParam::Space))?;
    space
        .set_rate_resample(false)
        .map_err(PcmError::config(HwParam::Resample))?;
    space.rate_max().map_err(PcmError::config(HwParam::Rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use crate::params::{BlockingMode, Direction};
    use crate::session::PcmDriver;
    use crate::virtual_pcm::{StreamState, VirtualCaps, VirtualDevice};

    fn session(caps: VirtualCaps) -> (VirtualDevice, Box<dyn PcmSession>) {
        let device = VirtualDevice::new("virtual", caps);
        let session = device
            .open("virtual", Direction::Playback, BlockingMode::Block)
            .unwrap();
        (device, session)
    }

    #[test]
    fn reports_actual_values() {
        let caps = VirtualCaps {
            rate: 8000..=48000,
            periods: 2..=8,
            buffer_frames: 256..=1024,
            ..Default::default()
        };
        let (device, session) = session(caps);
        let desired = StreamParameters::new(SampleFormat::S16LE, 96000, 2)
            .with_periods(16)
            .with_buffer_frames(100);
        let actual = negotiate(session.as_ref(), &desired).unwrap();
        assert_eq!(actual.rate, 48000);
        assert_eq!(actual.periods, 8);
        assert_eq!(actual.buffer_frames, 256);
        assert_eq!(actual.channels, 2);
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Prepared));
    }

    #[test]
    fn zero_periods_and_buffer_are_left_to_the_device() {
        let (device, session) = session(VirtualCaps::default());
        let desired = StreamParameters::new(SampleFormat::U8, 8000, 1);
        let actual = negotiate(session.as_ref(), &desired).unwrap();
        assert_eq!(actual.periods, 0);
        assert_eq!(actual.buffer_frames, 0);
        assert!(device.config(Direction::Playback).unwrap().buffer_frames > 0);
    }

    #[test]
    fn access_is_checked_first() {
        let caps = VirtualCaps {
            interleaved: false,
            formats: vec![SampleFormat::S16LE],
            channels: 2..=2,
            ..Default::default()
        };
        let (device, session) = session(caps);
        let desired = StreamParameters::new(SampleFormat::U8, 8000, 6);
        let err = negotiate(session.as_ref(), &desired).unwrap_err();
        assert_eq!(err.param(), Some(HwParam::Access));
        assert_eq!(device.config(Direction::Playback), None);
    }

    #[test]
    fn format_wins_over_channels() {
        let caps = VirtualCaps {
            formats: vec![SampleFormat::S16LE],
            channels: 2..=2,
            ..Default::default()
        };
        let (_device, session) = session(caps);
        let desired = StreamParameters::new(SampleFormat::U8, 8000, 6);
        let err = negotiate(session.as_ref(), &desired).unwrap_err();
        assert_eq!(err.param(), Some(HwParam::Format));
    }

    #[test]
    fn failed_negotiation_keeps_previous_configuration() {
        let (device, session) = session(VirtualCaps::default());
        let good = StreamParameters::new(SampleFormat::S16LE, 44100, 2);
        negotiate(session.as_ref(), &good).unwrap();
        let before = device.config(Direction::Playback);

        let bad = StreamParameters::new(SampleFormat::S16LE, 44100, 64);
        let err = negotiate(session.as_ref(), &bad).unwrap_err();
        assert_eq!(err.param(), Some(HwParam::Channels));
        assert_eq!(device.config(Direction::Playback), before);
    }

    #[test]
    fn drains_before_commit() {
        let (device, session) = session(VirtualCaps::default());
        let params = StreamParameters::new(SampleFormat::U8, 8000, 1);
        negotiate(session.as_ref(), &params).unwrap();
        session.writei(&[0; 16]).unwrap();
        negotiate(session.as_ref(), &params).unwrap();
        assert_eq!(device.drain_count(), 1);
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Prepared));
    }

    #[test]
    fn max_rate_is_the_range_end() {
        let caps = VirtualCaps {
            rate: 8000..=96000,
            ..Default::default()
        };
        let (_device, session) = session(caps);
        assert_eq!(max_sample_rate(session.as_ref()).unwrap(), 96000);
    }
}
