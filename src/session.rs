//! The seam between a [`Handle`](crate::Handle) and whatever actually moves
//! the samples.
//!
//! A [`PcmDriver`] resolves a device name into a [`PcmSession`], the owned
//! native session. Hardware configuration goes through an [`HwSpace`]: a
//! provisional capability descriptor that is narrowed step by step and only
//! touches the live device when [`HwSpace::commit`] is called.

use crate::error::Fault;
use crate::format::SampleFormat;
use crate::params::{BlockingMode, Direction};

pub trait PcmDriver {
    fn open(
        &self,
        name: &str,
        direction: Direction,
        mode: BlockingMode,
    ) -> Result<Box<dyn PcmSession>, Fault>;
}

/// One open PCM stream. Transfer sizes are frame-aligned byte slices and the
/// return values count frames.
pub trait PcmSession: Send {
    fn direction(&self) -> Direction;

    /// The full configuration space of the device.
    fn hw_space(&self) -> Result<Box<dyn HwSpace + '_>, Fault>;

    fn writei(&self, frames: &[u8]) -> Result<usize, Fault>;
    fn readi(&self, frames: &mut [u8]) -> Result<usize, Fault>;

    fn prepare(&self) -> Result<(), Fault>;
    fn drain(&self) -> Result<(), Fault>;
    /// Stops immediately, discarding pending frames.
    fn drop_pending(&self) -> Result<(), Fault>;
    fn pause(&self, enable: bool) -> Result<(), Fault>;

    fn delay(&self) -> Result<i64, Fault>;
    fn avail_update(&self) -> Result<usize, Fault>;
    fn forwardable(&self) -> Result<usize, Fault>;
    fn forward(&self, frames: usize) -> Result<usize, Fault>;
    /// `Ok(false)` on timeout. `None` waits without limit.
    fn wait(&self, timeout_ms: Option<u32>) -> Result<bool, Fault>;

    fn close(self: Box<Self>) -> Result<(), Fault>;
}

pub trait HwSpace {
    fn set_access_interleaved(&mut self) -> Result<(), Fault>;
    fn set_format(&mut self, format: SampleFormat) -> Result<(), Fault>;
    /// Returns the rate actually selected.
    fn set_rate_near(&mut self, rate: u32) -> Result<u32, Fault>;
    fn set_channels(&mut self, channels: u32) -> Result<(), Fault>;
    fn set_periods_near(&mut self, periods: u32) -> Result<u32, Fault>;
    fn set_buffer_size_near(&mut self, frames: usize) -> Result<usize, Fault>;
    fn set_rate_resample(&mut self, resample: bool) -> Result<(), Fault>;
    fn rate_max(&self) -> Result<u32, Fault>;

    /// Applies the narrowed space to the device.
    fn commit(self: Box<Self>) -> Result<(), Fault>;
}
