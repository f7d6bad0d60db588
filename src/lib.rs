//! Block-streaming dataflow nodes
//!
//! A [`Node`] reads deinterleaved multi-channel sample blocks from one or
//! more [`Source`]s, runs a [`Processor`] over them and writes the result to
//! one or more [`Sink`]s, one block per cycle. Nodes chain together through
//! [`Node::open_output`], which returns the readable end of a pipe that the
//! next node takes as an input.
//!
//! # Architecture
//!
//! - **Node**: owns the processor and two block buffers, runs the cycle loop
//! - **Connections**: one worker thread per input and output, each doing one
//!   blocking read or write per request
//! - **Channel maps**: let a connection carry a subset of a node's channels,
//!   reordered or (for outputs) duplicated
//! - **Graph**: runs many nodes on their own threads and collects failures
//!
//! # Example
//!
//! ```no_run
//! use plug::{CD_SAMPLE_RATE, Constant, Form, Limit, Node, PassThrough, Recorder};
//! use std::sync::Arc;
//!
//! let form = Form::mono(CD_SAMPLE_RATE);
//! let node = Node::new(form, form, PassThrough::new());
//! node.connect_input(Arc::new(Limit::new(Arc::new(Constant::new(form, 1.0)), 4096)), &[])?;
//! let output = node.open_output(&[])?;
//!
//! let reader = std::thread::spawn(move || Recorder::record(&output, 512));
//! node.run()?;
//! assert_eq!(reader.join().unwrap()?.frames(), 4096);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod nodes;
pub mod runtime;

pub use nodes::{Constant, Limit, Noise, PassThrough, Recorder, ToMono};

pub use runtime::{
    Block, CD_SAMPLE_RATE, ChannelMap, ChannelMode, ConnectionError, DEFAULT_IN_FRAMES, DEFAULT_OUT_FRAMES, FnProcessor,
    Form, Graph, GraphRun, Node, NodeFailure, PipeSink, PipeSource, PortDirection, Processor, Sink, Source, StreamError,
    WorkError, WorkResult, pipe,
};
