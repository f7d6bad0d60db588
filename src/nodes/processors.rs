//! Stock processors

use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::processor::{ChannelMode, DEFAULT_IN_FRAMES, DEFAULT_OUT_FRAMES, Processor};
use crate::runtime::sample::Block;

/// Copies every channel unchanged
#[derive(Debug, Clone)]
pub struct PassThrough {
    frames: usize,
}

impl PassThrough {
    pub fn new() -> Self {
        Self {
            frames: DEFAULT_IN_FRAMES,
        }
    }

    /// Read and write `frames` frames per cycle.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for PassThrough {
    fn channel_mode(&self) -> ChannelMode {
        ChannelMode::Mono
    }

    fn next_frames(&mut self) -> (usize, usize) {
        (self.frames, self.frames)
    }

    fn process(&mut self, dst: &mut Block<'_>, src: &Block<'_>) -> WorkResult<()> {
        let n = src.frames.min(dst.frames);
        dst.samples[..n].copy_from_slice(&src.samples[..n]);
        dst.frames = n;
        Ok(())
    }
}

/// Averages all input channels into one output channel
#[derive(Debug, Clone, Default)]
pub struct ToMono;

impl Processor for ToMono {
    fn channel_mode(&self) -> ChannelMode {
        ChannelMode::Full
    }

    fn next_frames(&mut self) -> (usize, usize) {
        (DEFAULT_IN_FRAMES, DEFAULT_OUT_FRAMES)
    }

    fn process(&mut self, dst: &mut Block<'_>, src: &Block<'_>) -> WorkResult<()> {
        if dst.channels != 1 {
            return Err(WorkError::Processor(format!(
                "cannot mix down to a {}-channel output",
                dst.channels
            )));
        }

        let n = src.frames.min(dst.frames);
        let count = src.channels as f64;
        let out = &mut dst.samples[..n];
        out.fill(0.0);
        for c in 0..src.channels {
            for (acc, s) in out.iter_mut().zip(src.channel(c)) {
                *acc += s;
            }
        }
        for acc in out.iter_mut() {
            *acc /= count;
        }
        dst.frames = n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &mut [f64], frames: usize, channels: usize) -> Block<'_> {
        Block {
            samples,
            frames,
            channels,
            sample_rate: 8000,
        }
    }

    #[test]
    fn test_pass_through_copies_available_frames() {
        let mut input = [1.0, 2.0, 3.0];
        let mut output = [0.0; 4];
        let src = block(&mut input, 3, 1);
        let mut dst = block(&mut output, 4, 1);

        PassThrough::new().process(&mut dst, &src).unwrap();
        assert_eq!(dst.frames, 3);
        assert_eq!(output, [1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_to_mono_averages() {
        // three channels of two frames each
        let mut input = [1.0, 2.0, 3.0, 4.0, 5.0, 9.0];
        let mut output = [0.0; 2];
        let src = block(&mut input, 2, 3);
        let mut dst = block(&mut output, 2, 1);

        ToMono.process(&mut dst, &src).unwrap();
        assert_eq!(dst.frames, 2);
        assert_eq!(output, [3.0, 5.0]);
    }

    #[test]
    fn test_to_mono_rejects_multichannel_output() {
        let mut input = [0.0; 4];
        let mut output = [0.0; 4];
        let src = block(&mut input, 2, 2);
        let mut dst = block(&mut output, 2, 2);

        assert!(matches!(
            ToMono.process(&mut dst, &src),
            Err(WorkError::Processor(_))
        ));
    }
}
