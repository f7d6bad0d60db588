//! Error types for the runtime system

use super::ports::PortDirection;

/// Error reported by an external source or sink
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Clean end of input. A node whose inputs end this way finishes successfully.
    #[error("End of stream")]
    EndOfStream,

    #[error("Stream closed")]
    Closed,

    #[error("Buffer of {len} samples is not a whole number of {channels}-channel frames")]
    Misaligned { len: usize, channels: usize },

    #[error("{0}")]
    Other(String),
}

/// Error type for wiring operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Sample rate mismatch: got {got} Hz, expected {expected} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },

    #[error("Channel count mismatch: got {got}, expected {expected}")]
    ChannelCountMismatch { expected: usize, got: usize },

    #[error("Channel {channel} out of range for {direction} (node has {channels})")]
    ChannelOutOfRange {
        direction: PortDirection,
        channel: usize,
        channels: usize,
    },

    #[error("Input channel {0} already has a source")]
    InputChannelTaken(usize),

    #[error("Unconnected {direction} channel {channel}")]
    Disconnected {
        direction: PortDirection,
        channel: usize,
    },

    #[error("Per-channel processing needs equal channel counts: {inputs} in, {outputs} out")]
    MonoChannelMismatch { inputs: usize, outputs: usize },

    #[error("Node '{0}' has already been started")]
    AlreadyStarted(String),
}

/// Error type for a node's processing loop
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Processor error: {0}")]
    Processor(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Connection '{0}' exited unexpectedly")]
    ConnectionLost(String),
}

impl WorkError {
    /// True for the clean end-of-stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, WorkError::Stream(StreamError::EndOfStream))
    }
}

/// Result type for processing operations
pub type WorkResult<T = ()> = Result<T, WorkError>;

/// A node's run failure, as reported by [`Graph`](super::Graph)
#[derive(Debug, thiserror::Error)]
#[error("Node '{node}' failed: {source}")]
pub struct NodeFailure {
    pub node: String,
    #[source]
    pub source: WorkError,
}
