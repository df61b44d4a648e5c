//! Pumps between a byte source/sink and a configured [`Handle`].

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::PcmError;
use crate::handle::Handle;
use crate::params::{Direction, StreamParameters};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("PCM error: {0}")]
    Pcm(#[from] PcmError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes handed to or taken from the device.
    pub bytes: u64,
    /// Transfers that moved less than a full chunk.
    pub short_transfers: u64,
}

/// Line printed before streaming starts, in the style of aplay.
pub fn describe(handle: &Handle, name: &str) -> String {
    let params = handle.params();
    let verb = match handle.direction() {
        Direction::Playback => "Playing",
        Direction::Capture => "Recording",
    };
    let layout = match params.channels {
        1 => "Mono".to_string(),
        2 => "Stereo".to_string(),
        n => format!("Channels {}", n),
    };
    format!(
        "{} raw data '{}' : {}, Rate {} Hz, {}",
        verb,
        name,
        params.format.describe(),
        params.rate,
        layout
    )
}

/// Bytes of audio in `secs` seconds at `params`, saturating on overflow.
pub fn bytes_for(secs: u64, params: &StreamParameters) -> u64 {
    let frame = params.frame_byte_width().unwrap_or(1) as u64;
    secs.saturating_mul(u64::from(params.rate))
        .saturating_mul(frame)
}

/// Fills `buf` from `source` until it is full or the source ends.
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes everything `source` yields to the playback `handle`, in chunks of
/// `chunk` bytes, then drains the stream.
///
/// Bytes that do not make a whole frame are carried over to the next chunk;
/// a partial frame left at the end of the source is dropped.
pub fn play<R: Read>(
    handle: &mut Handle,
    source: &mut R,
    chunk: usize,
) -> Result<StreamStats, StreamError> {
    let frame = handle.frame_byte_width()?;
    let chunk = chunk.max(frame);
    let mut buf = vec![0u8; chunk];
    let mut pending = 0;
    let mut stats = StreamStats::default();

    loop {
        let read = fill(source, &mut buf[pending..])?;
        let available = pending + read;
        if available < chunk {
            stats.short_transfers += u64::from(read > 0);
        }

        let mut offset = 0;
        while available - offset >= frame {
            match handle.write(&buf[offset..available]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(e) if e.is_would_block() => {
                    handle.wait(None)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        stats.bytes += offset as u64;

        buf.copy_within(offset..available, 0);
        pending = available - offset;

        if read == 0 {
            break;
        }
    }

    if pending > 0 {
        warn!(bytes = pending, "dropping trailing partial frame");
    }
    drain(handle)?;
    debug!(bytes = stats.bytes, "playback finished");
    Ok(stats)
}

/// Drains the stream, waiting for the device while a nonblocking drain is
/// still in progress.
fn drain(handle: &mut Handle) -> Result<(), PcmError> {
    loop {
        match handle.drain() {
            Err(e) if e.is_would_block() => {
                handle.wait(None)?;
            }
            other => return other,
        }
    }
}

/// Copies captured audio from `handle` to `sink` in chunks of `chunk` bytes
/// until `limit` bytes were recorded, or forever without a limit.
pub fn record<W: Write>(
    handle: &mut Handle,
    sink: &mut W,
    chunk: usize,
    limit: Option<u64>,
) -> Result<StreamStats, StreamError> {
    let frame = handle.frame_byte_width()?;
    let chunk = (chunk.max(frame) / frame) * frame;
    let mut buf = vec![0u8; chunk];
    let mut stats = StreamStats::default();

    loop {
        let want = match limit {
            Some(limit) if stats.bytes >= limit => break,
            Some(limit) => {
                let left = (limit - stats.bytes).min(chunk as u64) as usize;
                (left / frame).max(1) * frame
            }
            None => chunk,
        };
        let got = match handle.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(e) if e.is_would_block() => {
                handle.wait(None)?;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if got < want {
            stats.short_transfers += 1;
        }
        sink.write_all(&buf[..got])?;
        stats.bytes += got as u64;
    }

    sink.flush()?;
    debug!(bytes = stats.bytes, "recording finished");
    Ok(stats)
}
