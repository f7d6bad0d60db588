//! Example: chain of pass-through nodes mixed down to mono
//!
//! Feeds seeded noise through `--stages` pass-through nodes, averages the
//! channels in a final node and records the result.
//!
//! Usage:
//!   cargo run --release --example chain -- \
//!       --frames 441000 --channels 2 --stages 3

use clap::Parser;
use plug::{Form, Graph, Limit, Node, Noise, PassThrough, Recorder, ToMono};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Total frames to stream
    #[arg(short, long, default_value_t = 441_000)]
    frames: usize,

    /// Channels per stage
    #[arg(short, long, default_value_t = 2)]
    channels: usize,

    /// Sample rate in Hz
    #[arg(long, default_value_t = plug::CD_SAMPLE_RATE)]
    sample_rate: u32,

    /// Pass-through stages before the mixdown
    #[arg(short, long, default_value_t = 3)]
    stages: usize,

    /// Frames per cycle in each pass-through stage
    #[arg(short, long, default_value_t = plug::DEFAULT_IN_FRAMES)]
    block: usize,

    /// Noise seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let form = Form::new(args.sample_rate, args.channels);
    let mono = Form::mono(args.sample_rate);

    info!("=== Chain Example ===");
    info!("{} frames of {}, {} stages of {} frames", args.frames, form, args.stages, args.block);

    let mut graph = Graph::new();
    let noise = Arc::new(Noise::new(form, args.seed));
    let mut upstream: Arc<dyn plug::Source> = Arc::new(Limit::new(noise, args.frames));

    for stage in 0..args.stages {
        let node = graph.add_node(
            Node::new(form, form, PassThrough::new().with_frames(args.block)).with_name(format!("stage{}", stage)),
        );
        node.connect_input(upstream, &[])?;
        upstream = Arc::new(node.open_output(&[])?);
    }

    let mixdown = graph.add_node(Node::new(form, mono, ToMono).with_name("mixdown"));
    mixdown.connect_input(upstream, &[])?;
    let output = mixdown.open_output(&[])?;
    graph.check_connectivity()?;

    let start = Instant::now();
    let run = graph.run();
    let recorder = thread::Builder::new()
        .name("recorder".to_string())
        .spawn(move || Recorder::record(&output, 4096))?;

    let failures = run.wait();
    for failure in &failures {
        error!("{}", failure);
    }
    let recording = recorder.join().map_err(|_| "recorder thread panicked")??;

    let samples = recording.channel(0);
    let mean = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
    info!(
        "Recorded {} frames in {:.2?} (mean {:.5})",
        recording.frames(),
        start.elapsed(),
        mean
    );

    if failures.is_empty() { Ok(()) } else { Err(format!("{} nodes failed", failures.len()).into()) }
}
