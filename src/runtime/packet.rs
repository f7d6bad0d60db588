//! Per-connection transfer unit
//!
//! A `Packet` moves by value between the node thread and its connection's
//! worker thread: the node fills or drains it through the connection's
//! [`ChannelMap`], the worker performs one blocking call on the endpoint
//! and hands it back with the outcome. Whoever holds the packet has
//! exclusive access to its buffer.

use std::sync::Arc;

use super::channel_map::ChannelMap;
use super::errors::StreamError;
use super::ports::{Sink, Source};
use super::sample::{BlockBuffer, grow_buffer};

/// The external side of a connection
#[derive(Clone)]
pub(crate) enum Endpoint {
    Source(Arc<dyn Source>),
    Sink(Arc<dyn Sink>),
}

impl Endpoint {
    pub(crate) fn close(&self) {
        match self {
            Endpoint::Source(source) => source.close(),
            Endpoint::Sink(sink) => sink.close(),
        }
    }
}

pub(crate) struct Packet {
    /// Local deinterleaved samples, stride `frames`.
    samples: Vec<f64>,
    /// Channel count on the connection side.
    channels: usize,
    map: ChannelMap,
    /// Frames requested before a receive, achieved after it.
    frames: usize,
    error: Option<StreamError>,
    endpoint: Endpoint,
}

impl Packet {
    pub(crate) fn new(endpoint: Endpoint, node_channels: usize, selection: &[usize]) -> Self {
        let mut packet = Self {
            samples: Vec::new(),
            channels: 0,
            map: ChannelMap::identity(0),
            frames: 0,
            error: None,
            endpoint,
        };
        packet.reset(node_channels, selection);
        packet
    }

    /// Rebuild the channel map and clear all per-block state, keeping the
    /// buffer's allocation.
    pub(crate) fn reset(&mut self, node_channels: usize, selection: &[usize]) {
        self.map = ChannelMap::new(node_channels, selection);
        self.channels = self.map.local_channels();
        self.error = None;
        self.frames = 0;
        self.samples.clear();
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn frames(&self) -> usize {
        self.frames
    }

    pub(crate) fn take_error(&mut self) -> Option<StreamError> {
        self.error.take()
    }

    /// Size the buffer for a receive of up to `frames` frames.
    pub(crate) fn prepare_receive(&mut self, frames: usize) {
        self.error = None;
        self.frames = frames;
        grow_buffer(&mut self.samples, self.channels, frames);
    }

    /// Copy every node channel this connection carries into `dst`.
    ///
    /// Channels it does not carry are left untouched; each input channel has
    /// exactly one contributing connection. Returns the frames copied.
    pub(crate) fn scatter_into(&self, dst: &mut BlockBuffer) -> usize {
        let frames = self.frames;
        let node_channels = dst.channels();
        let out = dst.samples_mut();
        for c in 0..node_channels {
            let Some(local) = self.map.map_forward(c) else {
                continue;
            };
            let src = &self.samples[local * frames..(local + 1) * frames];
            out[c * frames..(c + 1) * frames].copy_from_slice(src);
        }
        frames
    }

    /// Fill every local channel from the node channel it carries.
    pub(crate) fn gather_from(&mut self, src: &BlockBuffer) {
        let frames = src.frames();
        grow_buffer(&mut self.samples, self.channels, frames);
        let input = src.samples();
        for local in 0..self.channels {
            let c = self.map.map_inverse(local);
            self.samples[local * frames..(local + 1) * frames]
                .copy_from_slice(&input[c * frames..(c + 1) * frames]);
        }
        self.frames = frames;
        self.error = None;
    }

    /// Perform the single blocking endpoint call for this round and record
    /// the outcome. Runs on the connection's worker thread.
    pub(crate) fn transfer(&mut self) {
        match &self.endpoint {
            Endpoint::Source(source) => match source.receive(&mut self.samples) {
                Ok(frames) => {
                    self.frames = frames;
                    self.error = None;
                }
                Err(err) => {
                    self.frames = 0;
                    self.error = Some(err);
                }
            },
            Endpoint::Sink(sink) => {
                let len = self.channels * self.frames;
                self.error = sink.send(&self.samples[..len]).err();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::pipe::pipe;
    use crate::runtime::sample::{CD_SAMPLE_RATE, Form};
    use proptest::prelude::*;

    fn detached(channels: usize, selection: &[usize]) -> Packet {
        let (sink, _source) = pipe(Form::new(CD_SAMPLE_RATE, channels.max(selection.len())));
        Packet::new(Endpoint::Sink(Arc::new(sink)), channels, selection)
    }

    fn filled_block(channels: usize, frames: usize) -> BlockBuffer {
        let mut block = BlockBuffer::new(Form::new(CD_SAMPLE_RATE, channels));
        block.resize(frames);
        for (i, s) in block.samples_mut().iter_mut().enumerate() {
            *s = i as f64;
        }
        block
    }

    #[test]
    fn test_scatter_swapped_channels() {
        let n = 8;
        let mut packet = detached(2, &[1, 0]);
        packet.prepare_receive(n);
        for (i, s) in packet.samples.iter_mut().enumerate() {
            *s = i as f64;
        }

        let mut block = BlockBuffer::new(Form::stereo(CD_SAMPLE_RATE));
        block.resize(n);
        assert_eq!(packet.scatter_into(&mut block), n);

        let out = block.samples();
        for i in 0..n {
            assert_eq!(out[i], packet.samples[i + n]);
            assert_eq!(out[i + n], packet.samples[i]);
        }
    }

    #[test]
    fn test_gather_swapped_channels() {
        let n = 8;
        let block = filled_block(2, n);
        let mut packet = detached(2, &[1, 0]);
        packet.gather_from(&block);

        assert_eq!(packet.frames(), n);
        let src = block.samples();
        for i in 0..n {
            assert_eq!(src[i], packet.samples[i + n]);
            assert_eq!(src[i + n], packet.samples[i]);
        }
    }

    #[test]
    fn test_gather_duplicates_channel() {
        let block = filled_block(1, 5);
        let mut packet = detached(1, &[0, 0]);
        packet.gather_from(&block);

        assert_eq!(packet.channels, 2);
        assert_eq!(&packet.samples[..5], block.samples());
        assert_eq!(&packet.samples[5..10], block.samples());
    }

    #[test]
    fn test_scatter_skips_unmapped() {
        let n = 4;
        let mut packet = detached(3, &[2]);
        packet.prepare_receive(n);
        packet.samples.fill(7.0);

        let mut block = BlockBuffer::new(Form::new(CD_SAMPLE_RATE, 3));
        block.resize(n);
        block.samples_mut().fill(-1.0);
        packet.scatter_into(&mut block);

        assert!(block.samples()[..2 * n].iter().all(|&s| s == -1.0));
        assert!(block.samples()[2 * n..].iter().all(|&s| s == 7.0));
    }

    #[test]
    fn test_reset_keeps_allocation() {
        let mut packet = detached(2, &[]);
        packet.prepare_receive(512);
        let capacity = packet.samples.capacity();

        packet.error = Some(StreamError::Closed);
        packet.reset(2, &[1]);
        assert_eq!(packet.channels, 1);
        assert_eq!(packet.frames(), 0);
        assert!(packet.take_error().is_none());
        assert!(packet.samples.is_empty());
        assert_eq!(packet.samples.capacity(), capacity);
    }

    #[test]
    fn test_transfer_records_sink_error() {
        let (sink, source) = pipe(Form::mono(CD_SAMPLE_RATE));
        drop(source);
        let mut packet = Packet::new(Endpoint::Sink(Arc::new(sink)), 1, &[]);
        let block = filled_block(1, 4);
        packet.gather_from(&block);
        packet.transfer();
        assert_eq!(packet.take_error(), Some(StreamError::Closed));
    }

    fn selection_strategy() -> impl Strategy<Value = (usize, Vec<usize>)> {
        (1usize..8).prop_flat_map(|channels| {
            (
                Just(channels),
                Just((0..channels).collect::<Vec<_>>()).prop_shuffle(),
                1usize..=channels,
            )
                .prop_map(|(channels, perm, len)| (channels, perm[..len].to_vec()))
        })
    }

    proptest! {
        /// Gathering a block into a connection and scattering it back
        /// reproduces every selected channel bit for bit.
        #[test]
        fn gather_scatter_round_trip(
            (channels, selection) in selection_strategy(),
            frames in 0usize..64,
        ) {
            let original = filled_block(channels, frames);
            let mut packet = detached(channels, &selection);
            packet.gather_from(&original);

            let mut restored = BlockBuffer::new(Form::new(CD_SAMPLE_RATE, channels));
            restored.resize(frames);
            restored.samples_mut().fill(f64::NAN);
            prop_assert_eq!(packet.scatter_into(&mut restored), frames);

            for &c in &selection {
                let run = c * frames..(c + 1) * frames;
                let got: Vec<u64> = restored.samples()[run.clone()].iter().map(|s| s.to_bits()).collect();
                let want: Vec<u64> = original.samples()[run].iter().map(|s| s.to_bits()).collect();
                prop_assert_eq!(got, want);
            }
        }
    }
}
