//! Point-to-point blocking stream between two threads
//!
//! [`pipe`] returns a connected writer/reader pair. Blocks travel over a
//! zero-capacity channel, so `send` returns only once the reader has taken
//! the block. The reader may ask for fewer frames than a block holds; the
//! remainder is kept for its next `receive`.
//!
//! Each end carries a close [`Signal`] that the other end selects on, which
//! lets either side unblock the other from any thread.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::sync::{Arc, Mutex, PoisonError};

use super::errors::StreamError;
use super::ports::{Sink, Source};
use super::sample::Form;
use super::signal::Signal;

struct Shared {
    form: Form,
    writer_closed: Signal,
    reader_closed: Signal,
}

/// Writable end of a [`pipe`]
pub struct PipeSink {
    shared: Arc<Shared>,
    blocks: Sender<Vec<f64>>,
}

/// Readable end of a [`pipe`]
pub struct PipeSource {
    shared: Arc<Shared>,
    blocks: Receiver<Vec<f64>>,
    pending: Mutex<Pending>,
}

/// Unread remainder of the last block taken off the channel
#[derive(Default)]
struct Pending {
    samples: Vec<f64>,
    frames: usize,
    offset: usize,
}

impl Pending {
    fn remaining(&self) -> usize {
        self.frames - self.offset
    }
}

/// Create a connected (writer, reader) pair carrying samples of shape `form`.
pub fn pipe(form: Form) -> (PipeSink, PipeSource) {
    let (tx, rx) = bounded(0);
    let shared = Arc::new(Shared {
        form,
        writer_closed: Signal::new(),
        reader_closed: Signal::new(),
    });
    (
        PipeSink {
            shared: Arc::clone(&shared),
            blocks: tx,
        },
        PipeSource {
            shared,
            blocks: rx,
            pending: Mutex::new(Pending::default()),
        },
    )
}

impl Sink for PipeSink {
    fn form(&self) -> Form {
        self.shared.form
    }

    fn send(&self, samples: &[f64]) -> Result<(), StreamError> {
        let shared = &self.shared;
        if shared.writer_closed.is_fired() || shared.reader_closed.is_fired() {
            return Err(StreamError::Closed);
        }
        let channels = shared.form.channels();
        if samples.is_empty() || channels == 0 {
            return Ok(());
        }
        if samples.len() % channels != 0 {
            return Err(StreamError::Misaligned {
                len: samples.len(),
                channels,
            });
        }

        select! {
            send(self.blocks, samples.to_vec()) -> res => res.map_err(|_| StreamError::Closed),
            recv(shared.reader_closed.listener()) -> _ => Err(StreamError::Closed),
            recv(shared.writer_closed.listener()) -> _ => Err(StreamError::Closed),
        }
    }

    fn close(&self) {
        self.shared.writer_closed.fire();
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        self.close();
    }
}

impl Source for PipeSource {
    fn form(&self) -> Form {
        self.shared.form
    }

    fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError> {
        let shared = &self.shared;
        if shared.reader_closed.is_fired() {
            return Err(StreamError::Closed);
        }
        let channels = shared.form.channels();
        let wanted = samples.len().checked_div(channels).unwrap_or(0);
        if wanted == 0 {
            return Ok(0);
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.remaining() == 0 {
            let block = select! {
                recv(self.blocks) -> block => block.map_err(|_| StreamError::EndOfStream)?,
                recv(shared.writer_closed.listener()) -> _ => return Err(StreamError::EndOfStream),
                recv(shared.reader_closed.listener()) -> _ => return Err(StreamError::Closed),
            };
            pending.frames = block.len() / channels;
            pending.samples = block;
            pending.offset = 0;
        }

        let n = wanted.min(pending.remaining());
        let stride = pending.frames;
        let offset = pending.offset;
        for c in 0..channels {
            let start = c * stride + offset;
            samples[c * n..(c + 1) * n].copy_from_slice(&pending.samples[start..start + n]);
        }
        pending.offset += n;
        Ok(n)
    }

    fn close(&self) {
        self.shared.reader_closed.fire();
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        self.close();
    }
}
