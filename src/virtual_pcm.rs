//! An in-process PCM device.
//!
//! [`VirtualDevice`] behaves like a small sound card: it has a capability
//! range to negotiate against, one stream slot per direction, a ring buffer
//! whose fill level is tracked, and the ALSA stream state machine
//! (prepared, running, paused, xrun, draining, setup). Played frames are
//! recorded and captured frames are taken from a feed, so it doubles as a
//! test fixture: faults can be injected into the next transfers.

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::Fault;
use crate::format::SampleFormat;
use crate::params::{BlockingMode, Direction};
use crate::session::{HwSpace, PcmDriver, PcmSession};

const DEFAULT_PERIODS: u32 = 4;
const DEFAULT_BUFFER_FRAMES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualCaps {
    pub interleaved: bool,
    pub formats: Vec<SampleFormat>,
    pub rate: RangeInclusive<u32>,
    pub channels: RangeInclusive<u32>,
    pub periods: RangeInclusive<u32>,
    pub buffer_frames: RangeInclusive<usize>,
    pub can_pause: bool,
}

impl Default for VirtualCaps {
    fn default() -> Self {
        Self {
            interleaved: true,
            formats: SampleFormat::ALL.to_vec(),
            rate: 4000..=192_000,
            channels: 1..=8,
            periods: 2..=32,
            buffer_frames: 64..=65_536,
            can_pause: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualConfig {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
    pub periods: u32,
    pub buffer_frames: usize,
}

impl VirtualConfig {
    fn frame_width(&self) -> usize {
        self.format.byte_width() * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Setup,
    Prepared,
    Running,
    Xrun,
    Draining,
    Paused,
}

#[derive(Debug, Default)]
struct Shared {
    caps: VirtualCaps,
    open: [bool; 2],
    faults: VecDeque<Fault>,
    played: Vec<u8>,
    capture_feed: VecDeque<u8>,
    prepares: usize,
    drains: usize,
    stream: [Option<StreamSnapshot>; 2],
}

#[derive(Debug, Clone, Copy)]
struct StreamSnapshot {
    state: StreamState,
    config: Option<VirtualConfig>,
}

/// A virtual sound card. Clones share the same card.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    name: String,
    shared: Arc<Mutex<Shared>>,
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new("virtual", VirtualCaps::default())
    }
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Playback => 0,
        Direction::Capture => 1,
    }
}

impl VirtualDevice {
    pub fn new(name: impl Into<String>, caps: VirtualCaps) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Mutex::new(Shared {
                caps,
                ..Default::default()
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A panic while holding the lock leaves plain data behind.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `count` transfer submissions fail with an xrun.
    pub fn inject_xrun(&self, count: usize) {
        let mut shared = self.lock();
        for _ in 0..count {
            shared.faults.push_back(Fault::from_errno(libc::EPIPE));
        }
    }

    /// Makes the next transfer submission fail with `fault`.
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Everything accepted by playback streams so far.
    pub fn played(&self) -> Vec<u8> {
        self.lock().played.clone()
    }

    /// Queues bytes for capture streams to read.
    pub fn feed_capture(&self, bytes: &[u8]) {
        self.lock().capture_feed.extend(bytes.iter().copied());
    }

    pub fn prepare_count(&self) -> usize {
        self.lock().prepares
    }

    pub fn drain_count(&self) -> usize {
        self.lock().drains
    }

    pub fn is_open(&self, direction: Direction) -> bool {
        self.lock().open[slot(direction)]
    }

    pub fn state(&self, direction: Direction) -> Option<StreamState> {
        self.lock().stream[slot(direction)].map(|s| s.state)
    }

    /// Configuration committed on the stream, if any.
    pub fn config(&self, direction: Direction) -> Option<VirtualConfig> {
        self.lock().stream[slot(direction)].and_then(|s| s.config)
    }
}

impl PcmDriver for VirtualDevice {
    fn open(
        &self,
        name: &str,
        direction: Direction,
        mode: BlockingMode,
    ) -> Result<Box<dyn PcmSession>, Fault> {
        if name != self.name {
            return Err(Fault::from_errno(libc::ENOENT));
        }
        let mut shared = self.lock();
        if shared.open[slot(direction)] {
            return Err(Fault::from_errno(libc::EBUSY));
        }
        shared.open[slot(direction)] = true;
        shared.stream[slot(direction)] = Some(StreamSnapshot {
            state: StreamState::Open,
            config: None,
        });
        drop(shared);
        debug!(device = name, %direction, ?mode, "opened virtual PCM");
        Ok(Box::new(VirtualSession {
            device: self.clone(),
            direction,
            mode,
            stream: Mutex::new(Stream {
                state: StreamState::Open,
                config: None,
                queued: 0,
            }),
        }))
    }
}

#[derive(Debug)]
struct Stream {
    state: StreamState,
    config: Option<VirtualConfig>,
    /// Playback: frames waiting in the ring buffer.
    queued: usize,
}

pub struct VirtualSession {
    device: VirtualDevice,
    direction: Direction,
    mode: BlockingMode,
    stream: Mutex<Stream>,
}

fn badfd() -> Fault {
    Fault::from_errno(libc::EBADFD)
}

impl VirtualSession {
    fn stream(&self) -> MutexGuard<'_, Stream> {
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, stream: &Stream, shared: &mut Shared) {
        shared.stream[slot(self.direction)] = Some(StreamSnapshot {
            state: stream.state,
            config: stream.config,
        });
    }

    fn config(stream: &Stream) -> Result<VirtualConfig, Fault> {
        stream.config.ok_or_else(badfd)
    }

    /// Pops an injected fault; an xrun also moves the stream into the xrun state.
    fn take_fault(stream: &mut Stream, shared: &mut Shared) -> Result<(), Fault> {
        match shared.faults.pop_front() {
            Some(fault) => {
                if fault.is_xrun() {
                    stream.state = StreamState::Xrun;
                }
                Err(fault)
            }
            None => Ok(()),
        }
    }

    fn check_transferable(stream: &Stream) -> Result<(), Fault> {
        match stream.state {
            StreamState::Prepared | StreamState::Running | StreamState::Draining => Ok(()),
            StreamState::Xrun => Err(Fault::from_errno(libc::EPIPE)),
            StreamState::Open | StreamState::Setup | StreamState::Paused => Err(badfd()),
        }
    }

    fn captured_frames(shared: &Shared, config: &VirtualConfig) -> usize {
        (shared.capture_feed.len() / config.frame_width()).min(config.buffer_frames)
    }

    fn available(&self, stream: &Stream, shared: &Shared) -> Result<usize, Fault> {
        let config = Self::config(stream)?;
        Ok(match self.direction {
            Direction::Playback => config.buffer_frames.saturating_sub(stream.queued),
            Direction::Capture => Self::captured_frames(shared, &config),
        })
    }

    fn write_locked(
        &self,
        stream: &mut Stream,
        shared: &mut Shared,
        frames: &[u8],
    ) -> Result<usize, Fault> {
        let config = Self::config(stream)?;
        Self::take_fault(stream, shared)?;
        Self::check_transferable(stream)?;
        if stream.state == StreamState::Draining {
            return Err(badfd());
        }
        let width = config.frame_width();
        let requested = frames.len() / width;
        let free = config.buffer_frames.saturating_sub(stream.queued);
        let accepted = match self.mode {
            // The hardware plays out whatever does not fit while we block.
            BlockingMode::Block | BlockingMode::Async => requested,
            BlockingMode::Nonblock => requested.min(free),
        };
        if accepted == 0 && requested > 0 {
            return Err(Fault::from_errno(libc::EAGAIN));
        }
        stream.queued = (stream.queued + accepted).min(config.buffer_frames);
        shared.played.extend_from_slice(&frames[..accepted * width]);
        if accepted > 0 {
            stream.state = StreamState::Running;
        }
        Ok(accepted)
    }

    fn read_locked(
        &self,
        stream: &mut Stream,
        shared: &mut Shared,
        frames: &mut [u8],
    ) -> Result<usize, Fault> {
        let config = Self::config(stream)?;
        Self::take_fault(stream, shared)?;
        Self::check_transferable(stream)?;
        let width = config.frame_width();
        let requested = frames.len() / width;
        let captured = shared.capture_feed.len() / width;
        let draining = stream.state == StreamState::Draining;
        let delivered = if draining || self.mode == BlockingMode::Nonblock {
            requested.min(captured)
        } else {
            requested
        };
        if delivered == 0 && requested > 0 {
            if draining {
                stream.state = StreamState::Setup;
                return Err(badfd());
            }
            return Err(Fault::from_errno(libc::EAGAIN));
        }
        let from_feed = delivered.min(captured) * width;
        for (dst, src) in frames.iter_mut().zip(shared.capture_feed.drain(..from_feed)) {
            *dst = src;
        }
        // Blocking reads past the feed get what the hardware hears: silence.
        let silence = config.format.silence();
        for (dst, src) in frames[from_feed..delivered * width]
            .iter_mut()
            .zip(silence.iter().cycle())
        {
            *dst = *src;
        }
        if !draining {
            stream.state = StreamState::Running;
        } else if shared.capture_feed.len() < width {
            stream.state = StreamState::Setup;
        }
        Ok(delivered)
    }
}

impl PcmSession for VirtualSession {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn hw_space(&self) -> Result<Box<dyn HwSpace + '_>, Fault> {
        let caps = self.device.lock().caps.clone();
        Ok(Box::new(VirtualSpace {
            session: self,
            caps,
            access: false,
            format: None,
            rate: None,
            channels: None,
            periods: None,
            buffer_frames: None,
        }))
    }

    fn writei(&self, frames: &[u8]) -> Result<usize, Fault> {
        if self.direction != Direction::Playback {
            return Err(badfd());
        }
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        let result = self.write_locked(&mut stream, &mut shared, frames);
        self.publish(&stream, &mut shared);
        result
    }

    fn readi(&self, frames: &mut [u8]) -> Result<usize, Fault> {
        if self.direction != Direction::Capture {
            return Err(badfd());
        }
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        let result = self.read_locked(&mut stream, &mut shared, frames);
        self.publish(&stream, &mut shared);
        result
    }

    fn prepare(&self) -> Result<(), Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        Self::config(&stream)?;
        stream.state = StreamState::Prepared;
        stream.queued = 0;
        shared.prepares += 1;
        self.publish(&stream, &mut shared);
        Ok(())
    }

    fn drain(&self) -> Result<(), Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        if stream.state == StreamState::Open {
            return Err(badfd());
        }
        shared.drains += 1;
        match self.direction {
            // A nonblocking drain plays out one period per call and reports
            // EAGAIN until the ring is empty.
            Direction::Playback if self.mode == BlockingMode::Nonblock && stream.queued > 0 => {
                let period = match stream.config {
                    Some(config) => (config.buffer_frames / config.periods.max(1) as usize).max(1),
                    None => stream.queued,
                };
                stream.queued = stream.queued.saturating_sub(period);
                stream.state = if stream.queued > 0 {
                    StreamState::Draining
                } else {
                    StreamState::Setup
                };
                self.publish(&stream, &mut shared);
                if stream.queued > 0 {
                    return Err(Fault::from_errno(libc::EAGAIN));
                }
                return Ok(());
            }
            Direction::Playback => {
                stream.queued = 0;
                stream.state = StreamState::Setup;
            }
            Direction::Capture => {
                let residual = match stream.config {
                    Some(config) => shared.capture_feed.len() >= config.frame_width(),
                    None => false,
                };
                stream.state = if residual && stream.state == StreamState::Running {
                    StreamState::Draining
                } else {
                    StreamState::Setup
                };
            }
        }
        self.publish(&stream, &mut shared);
        Ok(())
    }

    fn drop_pending(&self) -> Result<(), Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        if stream.state == StreamState::Open {
            return Err(badfd());
        }
        stream.queued = 0;
        if self.direction == Direction::Capture {
            shared.capture_feed.clear();
        }
        stream.state = StreamState::Setup;
        self.publish(&stream, &mut shared);
        Ok(())
    }

    fn pause(&self, enable: bool) -> Result<(), Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        if !shared.caps.can_pause {
            return Err(Fault::from_errno(libc::ENOSYS));
        }
        stream.state = match (enable, stream.state) {
            (true, StreamState::Running) => StreamState::Paused,
            (false, StreamState::Paused) => StreamState::Running,
            _ => return Err(badfd()),
        };
        self.publish(&stream, &mut shared);
        Ok(())
    }

    fn delay(&self) -> Result<i64, Fault> {
        let stream = self.stream();
        let shared = self.device.lock();
        let config = Self::config(&stream)?;
        let frames = match self.direction {
            Direction::Playback => stream.queued,
            Direction::Capture => Self::captured_frames(&shared, &config),
        };
        Ok(frames as i64)
    }

    fn avail_update(&self) -> Result<usize, Fault> {
        let stream = self.stream();
        let shared = self.device.lock();
        self.available(&stream, &shared)
    }

    fn forwardable(&self) -> Result<usize, Fault> {
        self.avail_update()
    }

    fn forward(&self, frames: usize) -> Result<usize, Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        let config = Self::config(&stream)?;
        let frames = frames.min(self.available(&stream, &shared)?);
        match self.direction {
            Direction::Playback => stream.queued += frames,
            Direction::Capture => {
                shared.capture_feed.drain(..frames * config.frame_width());
            }
        }
        Ok(frames)
    }

    // While the stream runs, one period of hardware progress makes room
    // (playback) or data (capture). A stopped stream just times out.
    fn wait(&self, timeout_ms: Option<u32>) -> Result<bool, Fault> {
        let mut stream = self.stream();
        let mut shared = self.device.lock();
        let config = Self::config(&stream)?;
        if self.available(&stream, &shared)? > 0 {
            return Ok(true);
        }
        if stream.state == StreamState::Running {
            let period = (config.buffer_frames / config.periods.max(1) as usize).max(1);
            match self.direction {
                Direction::Playback => stream.queued = stream.queued.saturating_sub(period),
                Direction::Capture => {
                    let silence = config.format.silence();
                    let bytes = period * config.frame_width();
                    shared
                        .capture_feed
                        .extend(silence.iter().copied().cycle().take(bytes));
                }
            }
            return Ok(true);
        }
        drop(shared);
        drop(stream);
        if let Some(ms) = timeout_ms {
            thread::sleep(Duration::from_millis(ms as u64));
        }
        Ok(false)
    }

    // The stream slot is released by `Drop`.
    fn close(self: Box<Self>) -> Result<(), Fault> {
        debug!(device = self.device.name(), direction = %self.direction, "closing virtual PCM");
        Ok(())
    }
}

impl Drop for VirtualSession {
    fn drop(&mut self) {
        let mut shared = self.device.lock();
        shared.open[slot(self.direction)] = false;
        shared.stream[slot(self.direction)] = None;
    }
}

struct VirtualSpace<'a> {
    session: &'a VirtualSession,
    caps: VirtualCaps,
    access: bool,
    format: Option<SampleFormat>,
    rate: Option<u32>,
    channels: Option<u32>,
    periods: Option<u32>,
    buffer_frames: Option<usize>,
}

fn einval() -> Fault {
    Fault::from_errno(libc::EINVAL)
}

/// Nearest value to `value` inside `range`. An empty range has no
/// configuration to offer.
fn clamp<T: Ord + Copy>(value: T, range: &RangeInclusive<T>) -> Result<T, Fault> {
    if range.is_empty() {
        return Err(einval());
    }
    Ok(value.clamp(*range.start(), *range.end()))
}

impl HwSpace for VirtualSpace<'_> {
    fn set_access_interleaved(&mut self) -> Result<(), Fault> {
        if !self.caps.interleaved {
            return Err(einval());
        }
        self.access = true;
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), Fault> {
        if format == SampleFormat::Unknown || !self.caps.formats.contains(&format) {
            return Err(einval());
        }
        self.format = Some(format);
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, Fault> {
        let actual = clamp(rate, &self.caps.rate)?;
        self.rate = Some(actual);
        Ok(actual)
    }

    fn set_channels(&mut self, channels: u32) -> Result<(), Fault> {
        if channels == 0 || !self.caps.channels.contains(&channels) {
            return Err(einval());
        }
        self.channels = Some(channels);
        Ok(())
    }

    fn set_periods_near(&mut self, periods: u32) -> Result<u32, Fault> {
        let actual = clamp(periods, &self.caps.periods)?;
        self.periods = Some(actual);
        Ok(actual)
    }

    fn set_buffer_size_near(&mut self, frames: usize) -> Result<usize, Fault> {
        let actual = clamp(frames, &self.caps.buffer_frames)?;
        self.buffer_frames = Some(actual);
        Ok(actual)
    }

    fn set_rate_resample(&mut self, _resample: bool) -> Result<(), Fault> {
        Ok(())
    }

    fn rate_max(&self) -> Result<u32, Fault> {
        if self.caps.rate.is_empty() {
            return Err(einval());
        }
        Ok(*self.caps.rate.end())
    }

    fn commit(self: Box<Self>) -> Result<(), Fault> {
        let (Some(format), Some(rate), Some(channels)) = (self.format, self.rate, self.channels)
        else {
            return Err(einval());
        };
        if !self.access {
            return Err(einval());
        }
        let mut stream = self.session.stream();
        if matches!(stream.state, StreamState::Running | StreamState::Paused) {
            return Err(Fault::from_errno(libc::EBUSY));
        }
        let config = VirtualConfig {
            format,
            rate,
            channels,
            periods: match self.periods {
                Some(periods) => periods,
                None => clamp(DEFAULT_PERIODS, &self.caps.periods)?,
            },
            buffer_frames: match self.buffer_frames {
                Some(frames) => frames,
                None => clamp(DEFAULT_BUFFER_FRAMES, &self.caps.buffer_frames)?,
            },
        };
        stream.config = Some(config);
        stream.state = StreamState::Prepared;
        stream.queued = 0;
        let mut shared = self.session.device.lock();
        self.session.publish(&stream, &mut shared);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(device: &VirtualDevice, direction: Direction) -> Box<dyn PcmSession> {
        device.open("virtual", direction, BlockingMode::Block).unwrap()
    }

    fn configure(session: &dyn PcmSession, format: SampleFormat, channels: u32) {
        let mut space = session.hw_space().unwrap();
        space.set_access_interleaved().unwrap();
        space.set_format(format).unwrap();
        space.set_rate_near(48000).unwrap();
        space.set_channels(channels).unwrap();
        space.commit().unwrap();
    }

    #[test]
    fn second_open_is_busy() {
        let device = VirtualDevice::default();
        let first = open(&device, Direction::Playback);
        let err = device
            .open("virtual", Direction::Playback, BlockingMode::Block)
            .err()
            .unwrap();
        assert_eq!(err.errno(), libc::EBUSY);
        // the other direction has its own slot
        let _capture = open(&device, Direction::Capture);
        first.close().unwrap();
        assert!(!device.is_open(Direction::Playback));
        let _again = open(&device, Direction::Playback);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let device = VirtualDevice::default();
        let err = device
            .open("hw:9,9", Direction::Playback, BlockingMode::Block)
            .err()
            .unwrap();
        assert_eq!(err.errno(), libc::ENOENT);
    }

    #[test]
    fn commit_moves_to_prepared() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Playback);
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Open));
        configure(session.as_ref(), SampleFormat::S16LE, 2);
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Prepared));
        let config = device.config(Direction::Playback).unwrap();
        assert_eq!(config.periods, DEFAULT_PERIODS);
        assert_eq!(config.buffer_frames, DEFAULT_BUFFER_FRAMES);
    }

    #[test]
    fn write_before_commit_is_bad_state() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Playback);
        let err = session.writei(&[0; 4]).unwrap_err();
        assert_eq!(err.errno(), libc::EBADFD);
    }

    #[test]
    fn xrun_sticks_until_prepare() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Playback);
        configure(session.as_ref(), SampleFormat::U8, 1);
        device.inject_xrun(1);
        assert!(session.writei(&[1, 2]).unwrap_err().is_xrun());
        assert!(session.writei(&[1, 2]).unwrap_err().is_xrun());
        session.prepare().unwrap();
        assert_eq!(session.writei(&[1, 2]).unwrap(), 2);
        assert_eq!(device.played(), vec![1, 2]);
    }

    #[test]
    fn nonblocking_write_stops_at_full_buffer() {
        let caps = VirtualCaps {
            buffer_frames: 8..=8,
            ..Default::default()
        };
        let device = VirtualDevice::new("virtual", caps);
        let session = device
            .open("virtual", Direction::Playback, BlockingMode::Nonblock)
            .unwrap();
        configure(session.as_ref(), SampleFormat::U8, 1);
        assert_eq!(session.writei(&[0; 6]).unwrap(), 6);
        assert_eq!(session.writei(&[0; 6]).unwrap(), 2);
        assert!(session.writei(&[0; 6]).unwrap_err().is_would_block());
        assert_eq!(session.delay().unwrap(), 8);
        assert!(session.wait(Some(0)).unwrap());
        assert!(session.avail_update().unwrap() > 0);
    }

    #[test]
    fn capture_reads_feed_then_silence() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Capture);
        configure(session.as_ref(), SampleFormat::U8, 1);
        device.feed_capture(&[1, 2, 3]);
        let mut buf = [0u8; 5];
        assert_eq!(session.readi(&mut buf).unwrap(), 5);
        assert_eq!(buf, [1, 2, 3, 0x80, 0x80]);
    }

    #[test]
    fn capture_drain_leaves_residual_frames() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Capture);
        configure(session.as_ref(), SampleFormat::U8, 1);
        let mut buf = [0u8; 2];
        session.readi(&mut buf).unwrap();
        device.feed_capture(&[7, 8, 9]);
        session.drain().unwrap();
        assert_eq!(device.state(Direction::Capture), Some(StreamState::Draining));
        let mut rest = [0u8; 8];
        assert_eq!(session.readi(&mut rest).unwrap(), 3);
        assert_eq!(&rest[..3], &[7, 8, 9]);
        assert_eq!(device.state(Direction::Capture), Some(StreamState::Setup));
    }

    #[test]
    fn pause_needs_running_stream_and_capability() {
        let device = VirtualDevice::default();
        let session = open(&device, Direction::Playback);
        configure(session.as_ref(), SampleFormat::U8, 1);
        assert_eq!(session.pause(true).unwrap_err().errno(), libc::EBADFD);
        session.writei(&[0; 4]).unwrap();
        session.pause(true).unwrap();
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Paused));
        session.pause(false).unwrap();

        let fixed = VirtualDevice::new(
            "virtual",
            VirtualCaps {
                can_pause: false,
                ..Default::default()
            },
        );
        let session = open(&fixed, Direction::Playback);
        assert!(session.pause(true).unwrap_err().is_unsupported());
    }

    #[test]
    fn forward_is_clamped_to_available() {
        let caps = VirtualCaps {
            buffer_frames: 16..=16,
            ..Default::default()
        };
        let device = VirtualDevice::new("virtual", caps);
        let session = open(&device, Direction::Playback);
        configure(session.as_ref(), SampleFormat::U8, 1);
        session.writei(&[0; 10]).unwrap();
        assert_eq!(session.forwardable().unwrap(), 6);
        assert_eq!(session.forward(100).unwrap(), 6);
        assert_eq!(session.delay().unwrap(), 16);
    }

    #[test]
    fn nonblocking_drain_plays_out_period_by_period() {
        let caps = VirtualCaps {
            periods: 4..=4,
            buffer_frames: 16..=16,
            ..Default::default()
        };
        let device = VirtualDevice::new("virtual", caps);
        let session = device
            .open("virtual", Direction::Playback, BlockingMode::Nonblock)
            .unwrap();
        configure(session.as_ref(), SampleFormat::U8, 1);
        session.writei(&[0; 10]).unwrap();

        assert!(session.drain().unwrap_err().is_would_block());
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Draining));
        assert_eq!(session.writei(&[0; 2]).unwrap_err().errno(), libc::EBADFD);
        assert!(session.drain().unwrap_err().is_would_block());
        session.drain().unwrap();
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Setup));
        assert_eq!(session.delay().unwrap(), 0);
    }

    #[test]
    fn empty_capability_range_is_refused() {
        let caps = VirtualCaps {
            rate: 48000..=44100,
            ..Default::default()
        };
        let device = VirtualDevice::new("virtual", caps);
        let session = open(&device, Direction::Playback);
        let mut space = session.hw_space().unwrap();
        assert_eq!(space.set_rate_near(44100).unwrap_err().errno(), libc::EINVAL);
        assert_eq!(space.rate_max().unwrap_err().errno(), libc::EINVAL);
        assert_eq!(space.set_channels(0).unwrap_err().errno(), libc::EINVAL);
    }

    #[test]
    fn dropping_session_releases_slot() {
        let device = VirtualDevice::default();
        drop(open(&device, Direction::Capture));
        assert!(!device.is_open(Direction::Capture));
    }
}
