use std::io;

use tracing::{debug, warn};

use crate::alsa::AlsaDriver;
use crate::error::{Fault, HwParam, PcmError};
use crate::negotiate;
use crate::params::{BlockingMode, Direction, StreamParameters};
use crate::session::{PcmDriver, PcmSession};
use crate::transfer;

/// One PCM stream: opened for a direction, configured, then read from or
/// written to as bytes.
///
/// The native session is released on [`close`](Handle::close) or when the
/// handle is dropped, whichever comes first. The handle does no locking; a
/// handle shared between threads must be serialized by the caller.
pub struct Handle {
    session: Option<Box<dyn PcmSession>>,
    device: String,
    direction: Direction,
    mode: BlockingMode,
    params: StreamParameters,
    configured: bool,
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl Handle {
    pub fn new() -> Self {
        Self {
            session: None,
            device: String::new(),
            direction: Direction::Playback,
            mode: BlockingMode::Block,
            params: StreamParameters::default(),
            configured: false,
        }
    }

    /// Opens an ALSA device ("default", "hw:0,0", ...).
    pub fn open(
        &mut self,
        device: &str,
        direction: Direction,
        mode: BlockingMode,
    ) -> Result<(), PcmError> {
        self.open_with(&AlsaDriver, device, direction, mode)
    }

    pub fn open_with(
        &mut self,
        driver: &dyn PcmDriver,
        device: &str,
        direction: Direction,
        mode: BlockingMode,
    ) -> Result<(), PcmError> {
        if self.session.is_some() {
            return Err(PcmError::Open {
                device: device.to_string(),
                fault: Fault::from_errno(libc::EBUSY),
            });
        }
        let session = driver
            .open(device, direction, mode)
            .map_err(|fault| PcmError::Open {
                device: device.to_string(),
                fault,
            })?;
        self.session = Some(session);
        self.device = device.to_string();
        self.direction = direction;
        self.mode = mode;
        self.configured = false;
        Ok(())
    }

    fn session(&self, op: &'static str) -> Result<&dyn PcmSession, PcmError> {
        self.session.as_deref().ok_or(PcmError::NotOpen { op })
    }

    /// Negotiates `desired` with the device and applies the result. The
    /// returned parameters are the ones the device took; they replace the
    /// handle's parameters only if the whole negotiation succeeds.
    pub fn configure(&mut self, desired: StreamParameters) -> Result<StreamParameters, PcmError> {
        if desired.channels == 0 {
            return Err(PcmError::InvalidConfiguration("channel count is zero"));
        }
        let session = self.session("configure")?;
        match negotiate::negotiate(session, &desired) {
            Ok(actual) => {
                self.params = actual;
                self.configured = true;
                Ok(actual)
            }
            Err(e) => {
                // A refused commit may have left the device unconfigured.
                if e.param() == Some(HwParam::Commit) {
                    self.configured = false;
                }
                Err(e)
            }
        }
    }

    fn configured_session(&self, op: &'static str) -> Result<&dyn PcmSession, PcmError> {
        let session = self.session(op)?;
        if !self.configured {
            return Err(PcmError::NotConfigured { op });
        }
        Ok(session)
    }

    /// Writes the whole frames in `buf`, returning the bytes accepted. A
    /// trailing partial frame is not written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, PcmError> {
        let session = self.configured_session("write")?;
        transfer::write(session, buf, &self.params)
    }

    /// Reads whole frames into `buf`, returning the bytes filled.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PcmError> {
        let session = self.configured_session("read")?;
        transfer::read(session, buf, &self.params)
    }

    /// Playback: waits until every buffered frame was played, then stops.
    /// Capture: stops, leaving already captured frames readable.
    pub fn drain(&mut self) -> Result<(), PcmError> {
        self.session("drain")?
            .drain()
            .map_err(PcmError::io("drain"))
    }

    /// Stops immediately, discarding buffered frames.
    pub fn drop_frames(&mut self) -> Result<(), PcmError> {
        self.session("drop")?
            .drop_pending()
            .map_err(PcmError::io("drop"))
    }

    /// Makes a stopped stream ready to transfer again.
    pub fn prepare(&mut self) -> Result<(), PcmError> {
        self.session("prepare")?
            .prepare()
            .map_err(PcmError::io("prepare"))
    }

    pub fn pause(&mut self) -> Result<(), PcmError> {
        self.set_paused("pause", true)
    }

    pub fn unpause(&mut self) -> Result<(), PcmError> {
        self.set_paused("unpause", false)
    }

    fn set_paused(&mut self, op: &'static str, enable: bool) -> Result<(), PcmError> {
        self.session(op)?.pause(enable).map_err(|fault| {
            if fault.is_unsupported() {
                PcmError::Unsupported { op }
            } else {
                PcmError::Io { op, fault }
            }
        })
    }

    /// Releases the native session. Safe to call any number of times.
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.configured = false;
        match session.close() {
            Ok(()) => debug!(device = %self.device, "closed PCM"),
            Err(fault) => warn!(device = %self.device, %fault, "error while closing PCM"),
        }
    }

    pub fn max_sample_rate(&self) -> Result<u32, PcmError> {
        negotiate::max_sample_rate(self.session("max_sample_rate")?)
    }

    /// Frames between submission and audibility (playback) or between
    /// arrival and retrieval (capture).
    pub fn delay(&self) -> Result<i64, PcmError> {
        self.session("delay")?.delay().map_err(PcmError::io("delay"))
    }

    /// Moves the application position forward by up to `frames`, limited to
    /// what the device can safely skip. Returns the frames skipped.
    pub fn skip_frames(&mut self, frames: usize) -> Result<usize, PcmError> {
        let session = self.session("skip")?;
        let forwardable = session.forwardable().map_err(PcmError::io("forwardable"))?;
        session
            .forward(frames.min(forwardable))
            .map_err(PcmError::io("forward"))
    }

    /// Waits until the device is ready for I/O. `Ok(false)` is a timeout.
    pub fn wait(&self, timeout_ms: Option<u32>) -> Result<bool, PcmError> {
        self.session("wait")?.wait(timeout_ms).map_err(PcmError::io("wait"))
    }

    pub fn available_frames(&self) -> Result<usize, PcmError> {
        self.session("avail")?
            .avail_update()
            .map_err(PcmError::io("avail"))
    }

    pub fn available_bytes(&self) -> Result<usize, PcmError> {
        Ok(self.available_frames()? * self.frame_byte_width()?)
    }

    pub fn sample_byte_width(&self) -> usize {
        self.params.sample_byte_width()
    }

    pub fn frame_byte_width(&self) -> Result<usize, PcmError> {
        self.params.frame_byte_width()
    }

    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> BlockingMode {
        self.mode
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl io::Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Handle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Handle::read(self, buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::format::SampleFormat;
    use crate::virtual_pcm::{StreamState, VirtualCaps, VirtualDevice};

    fn open(device: &VirtualDevice, direction: Direction) -> Handle {
        let mut handle = Handle::new();
        handle
            .open_with(device, "virtual", direction, BlockingMode::Block)
            .unwrap();
        handle
    }

    #[test]
    fn write_before_configure_is_rejected() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        handle.params = StreamParameters::new(SampleFormat::U8, 8000, 1);
        let err = handle.write(&[0; 4]).unwrap_err();
        assert!(matches!(err, PcmError::NotConfigured { op: "write" }));
    }

    #[test]
    fn zero_channels_is_rejected_before_the_device() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        let err = handle
            .configure(StreamParameters::new(SampleFormat::U8, 8000, 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(device.config(Direction::Playback), None);
    }

    #[test]
    fn zero_channels_on_write_is_invalid_configuration() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        handle
            .configure(StreamParameters::new(SampleFormat::U8, 8000, 1))
            .unwrap();
        handle.params.channels = 0;
        let err = handle.write(&[0; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(handle.frame_byte_width().unwrap_err().kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn failed_configure_keeps_parameters() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        let good = StreamParameters::new(SampleFormat::S16LE, 44100, 2);
        handle.configure(good).unwrap();
        let err = handle
            .configure(StreamParameters::new(SampleFormat::S16LE, 44100, 99))
            .unwrap_err();
        assert_eq!(err.param(), Some(HwParam::Channels));
        assert_eq!(handle.params(), &good);
        assert!(handle.is_configured());
        assert_eq!(handle.write(&[0; 8]).unwrap(), 8);
    }

    #[test]
    fn operations_on_closed_handle_are_io_errors() {
        let mut handle = Handle::new();
        assert_eq!(handle.drain().unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(handle.write(&[0]).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(handle.delay().unwrap_err().kind(), ErrorKind::Io);
        handle.close();
        handle.close();
    }

    #[test]
    fn open_twice_is_refused() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        let err = handle
            .open_with(&device, "virtual", Direction::Capture, BlockingMode::Block)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Open);
        assert_eq!(handle.direction(), Direction::Playback);
        assert!(!device.is_open(Direction::Capture));
    }

    #[test]
    fn pause_without_support_is_unsupported() {
        let device = VirtualDevice::new(
            "virtual",
            VirtualCaps {
                can_pause: false,
                ..Default::default()
            },
        );
        let mut handle = open(&device, Direction::Playback);
        handle
            .configure(StreamParameters::new(SampleFormat::U8, 8000, 1))
            .unwrap();
        handle.write(&[0; 8]).unwrap();
        assert_eq!(handle.pause().unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn pause_and_unpause() {
        let device = VirtualDevice::default();
        let mut handle = open(&device, Direction::Playback);
        handle
            .configure(StreamParameters::new(SampleFormat::U8, 8000, 1))
            .unwrap();
        handle.write(&[0; 8]).unwrap();
        handle.pause().unwrap();
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Paused));
        handle.unpause().unwrap();
        assert_eq!(device.state(Direction::Playback), Some(StreamState::Running));
    }

    #[test]
    fn available_bytes_scale_by_frame_width() {
        let caps = VirtualCaps {
            buffer_frames: 1024..=1024,
            ..Default::default()
        };
        let device = VirtualDevice::new("virtual", caps);
        let mut handle = open(&device, Direction::Playback);
        handle
            .configure(StreamParameters::new(SampleFormat::S16LE, 48000, 2))
            .unwrap();
        handle.write(&[0; 400]).unwrap();
        assert_eq!(handle.available_frames().unwrap(), 924);
        assert_eq!(handle.available_bytes().unwrap(), 924 * 4);
        assert_eq!(handle.delay().unwrap(), 100);
    }

    #[test]
    fn dropping_the_handle_closes_the_session() {
        let device = VirtualDevice::default();
        {
            let _handle = open(&device, Direction::Capture);
            assert!(device.is_open(Direction::Capture));
        }
        assert!(!device.is_open(Direction::Capture));
    }
}
