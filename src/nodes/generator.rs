//! Synthetic sources

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::runtime::errors::StreamError;
use crate::runtime::ports::Source;
use crate::runtime::sample::Form;

/// Endless source whose every sample is the same value
pub struct Constant {
    form: Form,
    value: f64,
    closed: AtomicBool,
}

impl Constant {
    pub fn new(form: Form, value: f64) -> Self {
        Self {
            form,
            value,
            closed: AtomicBool::new(false),
        }
    }
}

impl Source for Constant {
    fn form(&self) -> Form {
        self.form
    }

    fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        let frames = samples.len().checked_div(self.form.channels()).unwrap_or(0);
        samples[..frames * self.form.channels()].fill(self.value);
        Ok(frames)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Endless white noise in `[-1, 1)` from a seeded xorshift generator
pub struct Noise {
    form: Form,
    state: AtomicU64,
    closed: AtomicBool,
}

impl Noise {
    pub fn new(form: Form, seed: u64) -> Self {
        // xorshift never leaves zero
        let seed = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self {
            form,
            state: AtomicU64::new(seed),
            closed: AtomicBool::new(false),
        }
    }
}

fn xorshift(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

impl Source for Noise {
    fn form(&self) -> Form {
        self.form
    }

    fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        let frames = samples.len().checked_div(self.form.channels()).unwrap_or(0);

        let mut x = self.state.load(Ordering::Relaxed);
        for s in &mut samples[..frames * self.form.channels()] {
            x = xorshift(x);
            *s = (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0;
        }
        self.state.store(x, Ordering::Relaxed);
        Ok(frames)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Ends a source after a fixed number of frames
pub struct Limit<S: ?Sized> {
    inner: Arc<S>,
    remaining: Mutex<usize>,
}

impl<S: Source + ?Sized> Limit<S> {
    pub fn new(inner: Arc<S>, frames: usize) -> Self {
        Self {
            inner,
            remaining: Mutex::new(frames),
        }
    }

    /// Frames left before end of stream.
    pub fn remaining(&self) -> usize {
        *self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Source + ?Sized> Source for Limit<S> {
    fn form(&self) -> Form {
        self.inner.form()
    }

    fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError> {
        let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
        if *remaining == 0 {
            return Err(StreamError::EndOfStream);
        }
        let channels = self.inner.form().channels();
        let wanted = samples.len().checked_div(channels).unwrap_or(0);
        let frames = wanted.min(*remaining);

        let got = self.inner.receive(&mut samples[..frames * channels])?;
        *remaining -= got.min(*remaining);
        Ok(got)
    }

    fn close(&self) {
        self.inner.close();
    }
}
