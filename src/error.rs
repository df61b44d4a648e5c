use std::fmt;
use std::io;

use thiserror::Error;

/// A fault reported by the native session: the positive errno plus the
/// driver's own description of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct Fault {
    errno: i32,
    detail: String,
}

impl Fault {
    pub fn new(errno: i32, detail: impl Into<String>) -> Self {
        Self {
            errno,
            detail: detail.into(),
        }
    }

    /// Builds a fault described by the OS text for `errno`.
    pub fn from_errno(errno: i32) -> Self {
        let text = io::Error::from_raw_os_error(errno).to_string();
        Self::new(errno, text)
    }

    pub fn errno(&self) -> i32 {
        self.errno
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Underrun on playback, overrun on capture.
    pub fn is_xrun(&self) -> bool {
        self.errno == libc::EPIPE
    }

    pub fn is_would_block(&self) -> bool {
        self.errno == libc::EAGAIN
    }

    pub fn is_unsupported(&self) -> bool {
        self.errno == libc::ENOSYS || self.errno == libc::EOPNOTSUPP
    }
}

impl From<alsa::Error> for Fault {
    fn from(e: alsa::Error) -> Self {
        Fault::new(e.errno(), e.to_string())
    }
}

/// Negotiation steps, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HwParam {
    Space,
    Access,
    Format,
    Rate,
    Channels,
    Periods,
    BufferSize,
    Resample,
    Commit,
}

impl fmt::Display for HwParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HwParam::Space => "hardware parameter structure",
            HwParam::Access => "access type",
            HwParam::Format => "sample format",
            HwParam::Rate => "sample rate",
            HwParam::Channels => "number of channels",
            HwParam::Periods => "number of periods",
            HwParam::BufferSize => "buffer size",
            HwParam::Resample => "hardware rate restriction",
            HwParam::Commit => "hardware parameters",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum PcmError {
    #[error("cannot open audio device '{device}': {fault}")]
    Open { device: String, fault: Fault },
    #[error("cannot set {param}: {fault}")]
    Config { param: HwParam, fault: Fault },
    #[error("{op} failed: {fault}")]
    Io { op: &'static str, fault: Fault },
    #[error("{op} on a handle that is not open")]
    NotOpen { op: &'static str },
    #[error("{op} before the hardware parameters were applied")]
    NotConfigured { op: &'static str },
    #[error("{op} is not supported by the device")]
    Unsupported { op: &'static str },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}

/// Coarse classification of [`PcmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Open,
    Config,
    Io,
    Unsupported,
    InvalidConfiguration,
}

impl PcmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PcmError::Open { .. } => ErrorKind::Open,
            PcmError::Config { .. } => ErrorKind::Config,
            PcmError::Io { .. } | PcmError::NotOpen { .. } | PcmError::NotConfigured { .. } => {
                ErrorKind::Io
            }
            PcmError::Unsupported { .. } => ErrorKind::Unsupported,
            PcmError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            PcmError::Open { fault, .. }
            | PcmError::Config { fault, .. }
            | PcmError::Io { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// The failing negotiation step, for configuration errors.
    pub fn param(&self) -> Option<HwParam> {
        match self {
            PcmError::Config { param, .. } => Some(*param),
            _ => None,
        }
    }

    pub fn is_would_block(&self) -> bool {
        self.fault().is_some_and(Fault::is_would_block)
    }

    pub(crate) fn io(op: &'static str) -> impl FnOnce(Fault) -> PcmError {
        move |fault| PcmError::Io { op, fault }
    }

    pub(crate) fn config(param: HwParam) -> impl FnOnce(Fault) -> PcmError {
        move |fault| PcmError::Config { param, fault }
    }
}

impl From<PcmError> for io::Error {
    fn from(e: PcmError) -> Self {
        let kind = match e.kind() {
            _ if e.is_would_block() => io::ErrorKind::WouldBlock,
            ErrorKind::Open => match e.fault() {
                Some(fault) => io::Error::from_raw_os_error(fault.errno()).kind(),
                None => io::ErrorKind::NotFound,
            },
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::InvalidConfiguration | ErrorKind::Config => io::ErrorKind::InvalidInput,
            ErrorKind::Io => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
