//! Ready-made processors and endpoints
//!
//! - **Processors**: [`PassThrough`] and [`ToMono`]
//! - **Sources**: [`Constant`], [`Noise`], and [`Limit`] to bound either
//! - **Sinks**: [`Recorder`]

mod generator;
mod processors;
mod recorder;

pub use generator::{Constant, Limit, Noise};
pub use processors::{PassThrough, ToMono};
pub use recorder::Recorder;
