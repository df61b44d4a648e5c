use alsa::pcm::{Access, Frames, HwParams, PCM};
use alsa::ValueOr;
use tracing::debug;

use crate::error::Fault;
use crate::format::SampleFormat;
use crate::params::{BlockingMode, Direction};
use crate::session::{HwSpace, PcmDriver, PcmSession};

/// Upper bound on how far a period count is searched for when the exact
/// value is rejected.
const PERIODS_SEARCH_SPAN: u32 = 1024;

/// Opens sessions on ALSA PCM devices by name ("default", "hw:0,0", ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlsaDriver;

impl PcmDriver for AlsaDriver {
    fn open(
        &self,
        name: &str,
        direction: Direction,
        mode: BlockingMode,
    ) -> Result<Box<dyn PcmSession>, Fault> {
        let nonblock = match mode {
            BlockingMode::Block => false,
            BlockingMode::Nonblock => true,
            // The alsa crate has no way to request SND_PCM_ASYNC.
            BlockingMode::Async => return Err(Fault::from_errno(libc::EOPNOTSUPP)),
        };
        let pcm = PCM::new(name, direction.to_alsa(), nonblock)?;
        debug!(device = name, %direction, ?mode, "opened ALSA PCM");
        Ok(Box::new(AlsaSession { pcm, direction }))
    }
}

pub struct AlsaSession {
    pcm: PCM,
    direction: Direction,
}

impl AlsaSession {
    fn frames_to_bytes(&self, frames: usize) -> usize {
        self.pcm.frames_to_bytes(frames as Frames).max(0) as usize
    }

    fn current_format(&self) -> Result<SampleFormat, Fault> {
        let hwp = self.pcm.hw_params_current()?;
        Ok(SampleFormat::from_alsa(hwp.get_format()?))
    }
}

impl PcmSession for AlsaSession {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn hw_space(&self) -> Result<Box<dyn HwSpace + '_>, Fault> {
        let hwp = HwParams::any(&self.pcm)?;
        Ok(Box::new(AlsaSpace {
            pcm: &self.pcm,
            hwp,
        }))
    }

    fn writei(&self, frames: &[u8]) -> Result<usize, Fault> {
        let io = self.pcm.io_bytes();
        Ok(io.writei(frames)?)
    }

    fn readi(&self, frames: &mut [u8]) -> Result<usize, Fault> {
        let io = self.pcm.io_bytes();
        Ok(io.readi(frames)?)
    }

    fn prepare(&self) -> Result<(), Fault> {
        Ok(self.pcm.prepare()?)
    }

    fn drain(&self) -> Result<(), Fault> {
        Ok(self.pcm.drain()?)
    }

    fn drop_pending(&self) -> Result<(), Fault> {
        Ok(self.pcm.drop()?)
    }

    fn pause(&self, enable: bool) -> Result<(), Fault> {
        Ok(self.pcm.pause(enable)?)
    }

    fn delay(&self) -> Result<i64, Fault> {
        Ok(self.pcm.delay()? as i64)
    }

    fn avail_update(&self) -> Result<usize, Fault> {
        Ok(self.pcm.avail_update()?.max(0) as usize)
    }

    fn forwardable(&self) -> Result<usize, Fault> {
        self.avail_update()
    }

    // The alsa crate does not wrap snd_pcm_forward, so the application
    // pointer is moved by submitting silence or discarding captured frames.
    fn forward(&self, frames: usize) -> Result<usize, Fault> {
        if frames == 0 {
            return Ok(0);
        }
        let io = self.pcm.io_bytes();
        match self.direction {
            Direction::Playback => {
                let pattern = self.current_format()?.silence();
                let bytes = self.frames_to_bytes(frames);
                let silence: Vec<u8> = pattern.iter().copied().cycle().take(bytes).collect();
                Ok(io.writei(&silence)?)
            }
            Direction::Capture => {
                let mut scratch = vec![0u8; self.frames_to_bytes(frames)];
                Ok(io.readi(&mut scratch)?)
            }
        }
    }

    fn wait(&self, timeout_ms: Option<u32>) -> Result<bool, Fault> {
        Ok(self.pcm.wait(timeout_ms)?)
    }

    // snd_pcm_close runs when the PCM is dropped.
    fn close(self: Box<Self>) -> Result<(), Fault> {
        drop(self.pcm);
        Ok(())
    }
}

struct AlsaSpace<'a> {
    pcm: &'a PCM,
    hwp: HwParams<'a>,
}

impl HwSpace for AlsaSpace<'_> {
    fn set_access_interleaved(&mut self) -> Result<(), Fault> {
        Ok(self.hwp.set_access(Access::RWInterleaved)?)
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), Fault> {
        Ok(self.hwp.set_format(format.to_alsa())?)
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, Fault> {
        Ok(self.hwp.set_rate_near(rate, ValueOr::Nearest)?)
    }

    fn set_channels(&mut self, channels: u32) -> Result<(), Fault> {
        Ok(self.hwp.set_channels(channels)?)
    }

    // A failed set leaves the space untouched, so candidates are tried in
    // order of distance from the request, smaller one first on a tie.
    fn set_periods_near(&mut self, periods: u32) -> Result<u32, Fault> {
        let first = match self.hwp.set_periods(periods, ValueOr::Nearest) {
            Ok(()) => return Ok(self.hwp.get_periods()?),
            Err(e) => Fault::from(e),
        };
        for distance in 1..=PERIODS_SEARCH_SPAN {
            let below = periods.checked_sub(distance).filter(|&p| p > 0);
            let above = periods.checked_add(distance);
            for candidate in below.into_iter().chain(above) {
                if self.hwp.set_periods(candidate, ValueOr::Nearest).is_ok() {
                    return Ok(self.hwp.get_periods()?);
                }
            }
        }
        Err(first)
    }

    fn set_buffer_size_near(&mut self, frames: usize) -> Result<usize, Fault> {
        let actual = self.hwp.set_buffer_size_near(frames as Frames)?;
        Ok(actual.max(0) as usize)
    }

    fn set_rate_resample(&mut self, resample: bool) -> Result<(), Fault> {
        Ok(self.hwp.set_rate_resample(resample)?)
    }

    fn rate_max(&self) -> Result<u32, Fault> {
        Ok(self.hwp.get_rate_max()?)
    }

    fn commit(self: Box<Self>) -> Result<(), Fault> {
        Ok(self.pcm.hw_params(&self.hwp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_mode_is_refused_before_opening() {
        let err = AlsaDriver
            .open("default", Direction::Playback, BlockingMode::Async)
            .err()
            .unwrap();
        assert_eq!(err.errno(), libc::EOPNOTSUPP);
    }
}
