//! Endpoint traits for the streams a node reads from and writes to
//!
//! Sources and sinks are shared between the node (which closes them on
//! shutdown) and the connection worker performing I/O on them, so every
//! method takes `&self` and implementations must be `Send + Sync`.

use std::fmt;

use super::errors::StreamError;
use super::sample::Form;

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// A producer of deinterleaved sample blocks
pub trait Source: Send + Sync {
    /// Shape of the samples this source produces.
    fn form(&self) -> Form;

    /// Blocking read of up to `samples.len() / channels` frames.
    ///
    /// Returns the number of frames `n` written; channel `c` occupies
    /// `samples[c * n..(c + 1) * n]`. Returns `StreamError::EndOfStream`
    /// exactly when exhausted.
    fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError>;

    /// Release resources. Idempotent, and must unblock a pending `receive`.
    fn close(&self);
}

/// A consumer of deinterleaved sample blocks
pub trait Sink: Send + Sync {
    /// Shape of the samples this sink accepts.
    fn form(&self) -> Form;

    /// Blocking write of `samples.len() / channels` frames in deinterleaved layout.
    fn send(&self, samples: &[f64]) -> Result<(), StreamError>;

    /// Release resources. Idempotent, and must unblock a pending `send`.
    fn close(&self);
}
