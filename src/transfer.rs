//! Byte buffers in, frames out.
//!
//! Buffers are cut down to whole frames before they reach the device; a
//! trailing partial frame is not transferred. An xrun on submission gets
//! exactly one recovery: the stream is prepared again and the same
//! submission is retried once. Anything else, including a second xrun, is
//! returned to the caller.

use tracing::warn;

use crate::error::{Fault, PcmError};
use crate::params::StreamParameters;
use crate::session::PcmSession;

/// Number of whole frames in `len` bytes.
pub fn frames_in(len: usize, sample_width: usize, channels: u32) -> Result<usize, PcmError> {
    if channels == 0 {
        return Err(PcmError::InvalidConfiguration("channel count is zero"));
    }
    Ok(len / sample_width.max(1) / channels as usize)
}

/// Submits the whole frames of `buf` for playback. Returns bytes accepted.
pub fn write(
    session: &dyn PcmSession,
    buf: &[u8],
    params: &StreamParameters,
) -> Result<usize, PcmError> {
    let frames = frames_in(buf.len(), params.sample_byte_width(), params.channels)?;
    let frame_width = params.frame_byte_width()?;
    if frames == 0 {
        return Ok(0);
    }
    let aligned = &buf[..frames * frame_width];
    let accepted = with_xrun_recovery(session, "write", || session.writei(aligned))?;
    Ok(accepted * frame_width)
}

/// Fills the whole frames of `buf` from the capture stream. Returns bytes read.
pub fn read(
    session: &dyn PcmSession,
    buf: &mut [u8],
    params: &StreamParameters,
) -> Result<usize, PcmError> {
    let frames = frames_in(buf.len(), params.sample_byte_width(), params.channels)?;
    let frame_width = params.frame_byte_width()?;
    if frames == 0 {
        return Ok(0);
    }
    let aligned = &mut buf[..frames * frame_width];
    let delivered = with_xrun_recovery(session, "read", || session.readi(aligned))?;
    Ok(delivered * frame_width)
}

fn with_xrun_recovery(
    session: &dyn PcmSession,
    op: &'static str,
    mut submit: impl FnMut() -> Result<usize, Fault>,
) -> Result<usize, PcmError> {
    match submit() {
        Err(fault) if fault.is_xrun() => {
            warn!(op, direction = %session.direction(), "xrun, preparing stream and retrying once");
            session.prepare().map_err(PcmError::io("recover"))?;
            submit().map_err(PcmError::io(op))
        }
        other => other.map_err(PcmError::io(op)),
    }
}
