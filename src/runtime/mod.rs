//! Runtime support for block-streaming node graphs

pub mod channel_map;
mod connection;
pub mod errors;
pub mod graph;
pub mod node;
mod packet;
pub mod pipe;
pub mod ports;
pub mod processor;
pub mod sample;
mod signal;

pub use channel_map::ChannelMap;
pub use errors::{ConnectionError, NodeFailure, StreamError, WorkError, WorkResult};
pub use graph::{Graph, GraphRun};
pub use node::Node;
pub use pipe::{PipeSink, PipeSource, pipe};
pub use ports::{PortDirection, Sink, Source};
pub use processor::{ChannelMode, DEFAULT_IN_FRAMES, DEFAULT_OUT_FRAMES, FnProcessor, Processor};
pub use sample::{Block, CD_SAMPLE_RATE, Form, grow_buffer};
