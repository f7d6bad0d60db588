//! Computation plugged into a node
//!
//! A node owns exactly one processor and calls it once per cycle (or once
//! per channel per cycle in [`ChannelMode::Mono`]). The processor decides
//! how many frames it wants to read and write each cycle.

use super::errors::WorkResult;
use super::sample::Block;

/// Frames read per cycle by [`FnProcessor`] unless configured otherwise.
pub const DEFAULT_IN_FRAMES: usize = 1024;
/// Frames written per cycle by [`FnProcessor`] unless configured otherwise.
pub const DEFAULT_OUT_FRAMES: usize = 1024;

/// How a node presents blocks to its processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// One call per channel with one-channel views of input and output.
    Mono,
    /// One call with every channel present.
    Full,
}

/// The per-cycle computation of a node
pub trait Processor: Send {
    fn channel_mode(&self) -> ChannelMode;

    /// Frames to read and write in the coming cycle, as `(in, out)`.
    fn next_frames(&mut self) -> (usize, usize);

    /// Transform `src` into `dst`.
    ///
    /// `dst.frames` arrives as the requested output count; set it to the
    /// frames actually produced (it must not grow). Returning
    /// `StreamError::EndOfStream` ends the node's run successfully.
    fn process(&mut self, dst: &mut Block<'_>, src: &Block<'_>) -> WorkResult<()>;
}

/// Adapts a closure into a [`Processor`] with fixed frame counts
pub struct FnProcessor<F> {
    mode: ChannelMode,
    in_frames: usize,
    out_frames: usize,
    f: F,
}

impl<F> FnProcessor<F>
where
    F: FnMut(&mut Block<'_>, &Block<'_>) -> WorkResult<()> + Send,
{
    pub fn new(mode: ChannelMode, f: F) -> Self {
        Self {
            mode,
            in_frames: DEFAULT_IN_FRAMES,
            out_frames: DEFAULT_OUT_FRAMES,
            f,
        }
    }

    pub fn with_frames(mut self, in_frames: usize, out_frames: usize) -> Self {
        self.in_frames = in_frames;
        self.out_frames = out_frames;
        self
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: FnMut(&mut Block<'_>, &Block<'_>) -> WorkResult<()> + Send,
{
    fn channel_mode(&self) -> ChannelMode {
        self.mode
    }

    fn next_frames(&mut self) -> (usize, usize) {
        (self.in_frames, self.out_frames)
    }

    fn process(&mut self, dst: &mut Block<'_>, src: &Block<'_>) -> WorkResult<()> {
        (self.f)(dst, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_processor_defaults() {
        let mut p = FnProcessor::new(ChannelMode::Full, |_dst: &mut Block<'_>, _src: &Block<'_>| Ok(()));
        assert_eq!(p.channel_mode(), ChannelMode::Full);
        assert_eq!(p.next_frames(), (DEFAULT_IN_FRAMES, DEFAULT_OUT_FRAMES));

        let mut p = p.with_frames(10, 5);
        assert_eq!(p.next_frames(), (10, 5));
    }

    #[test]
    fn test_fn_processor_calls_closure() {
        let mut p = FnProcessor::new(ChannelMode::Mono, |dst: &mut Block<'_>, src: &Block<'_>| {
            for (d, s) in dst.samples.iter_mut().zip(src.samples.iter()) {
                *d = s * 2.0;
            }
            dst.frames = src.frames.min(dst.frames);
            Ok(())
        });

        let mut input = [1.0, 2.0, 3.0];
        let mut output = [0.0; 3];
        let src = Block {
            samples: &mut input,
            frames: 3,
            channels: 1,
            sample_rate: 8000,
        };
        let mut dst = Block {
            samples: &mut output,
            frames: 3,
            channels: 1,
            sample_rate: 8000,
        };
        p.process(&mut dst, &src).unwrap();
        assert_eq!(dst.frames, 3);
        assert_eq!(output, [2.0, 4.0, 6.0]);
    }
}
