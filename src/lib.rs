//! Blocking byte-stream access to a PCM audio device.
//!
//! A [`Handle`] is opened for playback or capture, configured with the
//! desired [`StreamParameters`] (the device may substitute the nearest
//! values it supports) and then driven with [`Handle::write`] or
//! [`Handle::read`]. A single underrun or overrun during a transfer is
//! recovered transparently; a second one on the same call is an error.
//!
//! ```no_run
//! use rawpcm::{BlockingMode, Direction, Handle, SampleFormat, StreamParameters};
//!
//! # fn main() -> Result<(), rawpcm::PcmError> {
//! let mut handle = Handle::new();
//! handle.open("default", Direction::Playback, BlockingMode::Block)?;
//! handle.configure(StreamParameters::new(SampleFormat::U8, 8000, 1))?;
//! let wrote = handle.write(&[128; 20])?;
//! assert_eq!(wrote, 20);
//! handle.close();
//! # Ok(())
//! # }
//! ```

pub mod alsa;
pub mod error;
pub mod format;
pub mod handle;
pub mod negotiate;
pub mod params;
pub mod rt;
pub mod session;
pub mod stream;
pub mod transfer;
pub mod virtual_pcm;

pub use crate::alsa::{AlsaDriver, AlsaSession};
pub use error::{ErrorKind, Fault, HwParam, PcmError};
pub use format::SampleFormat;
pub use handle::Handle;
pub use params::{Access, BlockingMode, Direction, StreamParameters};
pub use session::{HwSpace, PcmDriver, PcmSession};
pub use virtual_pcm::{VirtualCaps, VirtualDevice};
