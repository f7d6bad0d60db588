//! Sink that keeps everything it is sent

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::runtime::errors::StreamError;
use crate::runtime::ports::{Sink, Source};
use crate::runtime::sample::Form;

/// Records every channel it receives, in order
pub struct Recorder {
    form: Form,
    channels: Mutex<Vec<Vec<f64>>>,
    closed: AtomicBool,
}

impl Recorder {
    pub fn new(form: Form) -> Self {
        Self {
            form,
            channels: Mutex::new(vec![Vec::new(); form.channels()]),
            closed: AtomicBool::new(false),
        }
    }

    /// Read `source` to its end, `chunk` frames at a time.
    ///
    /// Returns the recording, or the first error other than end of stream.
    pub fn record(source: &dyn Source, chunk: usize) -> Result<Self, StreamError> {
        let recorder = Self::new(source.form());
        let mut buf = vec![0.0; chunk * recorder.form.channels()];
        loop {
            match source.receive(&mut buf) {
                Ok(frames) => recorder.append(&buf[..frames * recorder.form.channels()]),
                Err(StreamError::EndOfStream) => break,
                Err(err) => return Err(err),
            }
        }
        debug!("Recorded {} frames of {}", recorder.frames(), recorder.form);
        Ok(recorder)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frames recorded so far.
    pub fn frames(&self) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.first().map_or(0, Vec::len)
    }

    /// Everything recorded on channel `c`.
    pub fn channel(&self, c: usize) -> Vec<f64> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)[c].clone()
    }

    fn append(&self, samples: &[f64]) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let frames = samples.len().checked_div(channels.len()).unwrap_or(0);
        for (c, recorded) in channels.iter_mut().enumerate() {
            recorded.extend_from_slice(&samples[c * frames..(c + 1) * frames]);
        }
    }
}

impl Sink for Recorder {
    fn form(&self) -> Form {
        self.form
    }

    fn send(&self, samples: &[f64]) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        let channels = self.form.channels();
        if channels > 0 && samples.len() % channels != 0 {
            return Err(StreamError::Misaligned {
                len: samples.len(),
                channels,
            });
        }
        self.append(samples);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::generator::{Constant, Limit};
    use crate::runtime::sample::CD_SAMPLE_RATE;
    use std::sync::Arc;

    #[test]
    fn test_send_appends_per_channel() {
        let recorder = Recorder::new(Form::stereo(CD_SAMPLE_RATE));
        recorder.send(&[1.0, 2.0, 10.0, 20.0]).unwrap();
        recorder.send(&[3.0, 30.0]).unwrap();

        assert_eq!(recorder.frames(), 3);
        assert_eq!(recorder.channel(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(recorder.channel(1), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_send_after_close() {
        let recorder = Recorder::new(Form::mono(CD_SAMPLE_RATE));
        recorder.close();
        assert!(recorder.is_closed());
        assert_eq!(recorder.send(&[1.0]), Err(StreamError::Closed));
    }

    #[test]
    fn test_record_drains_source() {
        let source = Limit::new(Arc::new(Constant::new(Form::stereo(CD_SAMPLE_RATE), 0.25)), 100);
        let recorder = Recorder::record(&source, 32).unwrap();
        assert_eq!(recorder.frames(), 100);
        assert!(recorder.channel(1).iter().all(|&s| s == 0.25));
    }
}
