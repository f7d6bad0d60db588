//! Core data types for block processing

use std::fmt;

/// CD-quality sample rate in Hz
pub const CD_SAMPLE_RATE: u32 = 44_100;

/// Shape of a stream: sample rate and channel count
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Form {
    sample_rate: u32,
    channels: usize,
}

impl Form {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }

    pub fn stereo(sample_rate: u32) -> Self {
        Self::new(sample_rate, 2)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Two forms can be connected when their sample rates agree.
    pub fn is_compatible(&self, other: &Form) -> bool {
        self.sample_rate == other.sample_rate
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ch@{}Hz", self.channels, self.sample_rate)
    }
}

/// One block of samples handed to a [`Processor`](super::Processor)
///
/// Samples are channel-deinterleaved: all frames of channel 0, then all
/// frames of channel 1, and so on, so channel `c` is
/// `samples[c * frames..(c + 1) * frames]`.
///
/// `channels` and `sample_rate` are fixed for the node's lifetime (except that
/// per-channel processing sees `channels == 1`); `frames` is set by the node
/// before each call and, on the output block, updated by the processor to the
/// number of frames actually produced.
#[derive(Debug)]
pub struct Block<'a> {
    pub samples: &'a mut [f64],
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
}

impl Block<'_> {
    /// The frame run of channel `c`.
    #[inline]
    pub fn channel(&self, c: usize) -> &[f64] {
        &self.samples[c * self.frames..(c + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, c: usize) -> &mut [f64] {
        let frames = self.frames;
        &mut self.samples[c * frames..(c + 1) * frames]
    }
}

/// Resize `samples` to exactly `channels * frames` elements.
///
/// When the current capacity is too small, capacity grows to `ceil(5N / 3)`
/// so a stream of varying block sizes settles after a few reallocations.
/// Existing contents are preserved; newly exposed elements are zero.
pub fn grow_buffer(samples: &mut Vec<f64>, channels: usize, frames: usize) {
    let len = channels * frames;
    if samples.capacity() < len {
        let target = (5 * len).div_ceil(3);
        samples.reserve_exact(target - samples.len());
    }
    samples.resize(len, 0.0);
}

/// Node-owned storage behind a [`Block`]
#[derive(Debug)]
pub(crate) struct BlockBuffer {
    samples: Vec<f64>,
    frames: usize,
    channels: usize,
    sample_rate: u32,
}

impl BlockBuffer {
    pub(crate) fn new(form: Form) -> Self {
        Self {
            samples: Vec::new(),
            frames: 0,
            channels: form.channels(),
            sample_rate: form.sample_rate(),
        }
    }

    /// Make room for `frames` frames and declare them.
    pub(crate) fn resize(&mut self, frames: usize) {
        grow_buffer(&mut self.samples, self.channels, frames);
        self.frames = frames;
    }

    pub(crate) fn frames(&self) -> usize {
        self.frames
    }

    /// Declare a frame count no larger than the last `resize`.
    pub(crate) fn set_frames(&mut self, frames: usize) {
        debug_assert!(frames * self.channels <= self.samples.len());
        self.frames = frames;
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    pub(crate) fn samples(&self) -> &[f64] {
        &self.samples[..self.channels * self.frames]
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [f64] {
        let len = self.channels * self.frames;
        &mut self.samples[..len]
    }

    /// All channels at the declared frame count.
    pub(crate) fn view(&mut self) -> Block<'_> {
        let len = self.channels * self.frames;
        Block {
            samples: &mut self.samples[..len],
            frames: self.frames,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Channel `c` alone, as a one-channel block.
    pub(crate) fn channel_view(&mut self, c: usize) -> Block<'_> {
        let frames = self.frames;
        Block {
            samples: &mut self.samples[c * frames..(c + 1) * frames],
            frames,
            channels: 1,
            sample_rate: self.sample_rate,
        }
    }

    /// Repack channel runs laid out at the declared frame count so they are
    /// `produced` frames apart, then declare `produced` frames.
    pub(crate) fn compact(&mut self, produced: usize) {
        let stride = self.frames;
        debug_assert!(produced <= stride);
        if produced < stride {
            for c in 1..self.channels {
                let start = c * stride;
                self.samples
                    .copy_within(start..start + produced, c * produced);
            }
        }
        self.frames = produced;
    }
}
