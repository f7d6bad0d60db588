//! Processing node
//!
//! A [`Node`] owns one [`Processor`] and the full set of connections feeding
//! it and fed by it. Wiring happens through `&self` under a lock, so several
//! threads may configure the same node; [`Node::run`] then drives the
//! read → process → write cycle on the caller's thread until end of stream.
//!
//! Every connection gets a worker thread for the duration of the run. Per
//! cycle the node hands each input worker a packet to fill, waits for all of
//! them, processes, hands each output worker a packet to drain and waits for
//! all of them again. Cycles never overlap.

use crossbeam_channel::Select;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::errors::{ConnectionError, WorkError, WorkResult};
use super::packet::{Endpoint, Packet};
use super::pipe::{PipeSource, pipe};
use super::ports::{PortDirection, Sink, Source};
use super::processor::{ChannelMode, Processor};
use super::sample::{BlockBuffer, Form};
use super::signal::Signal;

/// A processor together with its input and output connections
pub struct Node {
    name: String,
    in_form: Form,
    out_form: Form,
    wiring: Mutex<Wiring>,
}

/// Configuration collected before `run`
struct Wiring {
    /// Taken by `run`; `None` once the node has started.
    processor: Option<Box<dyn Processor>>,
    input_claims: Vec<usize>,
    output_claims: Vec<usize>,
    inputs: Vec<Packet>,
    outputs: Vec<Packet>,
}

impl Wiring {
    fn check_connectivity(&self) -> Result<(), ConnectionError> {
        let unclaimed = |claims: &[usize]| claims.iter().position(|&n| n == 0);
        if let Some(channel) = unclaimed(&self.input_claims) {
            return Err(ConnectionError::Disconnected {
                direction: PortDirection::Input,
                channel,
            });
        }
        if let Some(channel) = unclaimed(&self.output_claims) {
            return Err(ConnectionError::Disconnected {
                direction: PortDirection::Output,
                channel,
            });
        }
        Ok(())
    }

    /// Claim input channels, all or nothing.
    fn claim_inputs(&mut self, channels: &[usize]) -> Result<(), ConnectionError> {
        let mut claims = self.input_claims.clone();
        for &c in channels {
            if claims[c] > 0 {
                return Err(ConnectionError::InputChannelTaken(c));
            }
            claims[c] += 1;
        }
        self.input_claims = claims;
        Ok(())
    }

    fn claim_outputs(&mut self, channels: &[usize]) {
        for &c in channels {
            self.output_claims[c] += 1;
        }
    }
}

/// Node channels a selection refers to, all of them when it is empty.
fn selected(selection: &[usize], channels: usize) -> Vec<usize> {
    if selection.is_empty() {
        (0..channels).collect()
    } else {
        selection.to_vec()
    }
}

impl Node {
    /// Create a node reading `in_form` and writing `out_form`.
    pub fn new<P: Processor + 'static>(in_form: Form, out_form: Form, processor: P) -> Self {
        Self {
            name: "node".to_string(),
            in_form,
            out_form,
            wiring: Mutex::new(Wiring {
                processor: Some(Box::new(processor)),
                input_claims: vec![0; in_form.channels()],
                output_claims: vec![0; out_form.channels()],
                inputs: Vec::new(),
                outputs: Vec::new(),
            }),
        }
    }

    /// Set the name used in logs and worker thread names.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_form(&self) -> Form {
        self.in_form
    }

    pub fn output_form(&self) -> Form {
        self.out_form
    }

    /// Feed input channels from `source`.
    ///
    /// With an empty `selection` the source supplies every input channel in
    /// order. Otherwise `selection[i] == c` routes the source's channel `i`
    /// to input channel `c`. Each input channel accepts exactly one source.
    pub fn connect_input(&self, source: Arc<dyn Source>, selection: &[usize]) -> Result<(), ConnectionError> {
        let form = source.form();
        self.register(PortDirection::Input, Endpoint::Source(source), form, selection)
    }

    /// Copy output channels to `sink`.
    ///
    /// With an empty `selection` the sink receives every output channel in
    /// order. Otherwise the sink's channel `i` receives output channel
    /// `selection[i]`; output channels may repeat and may feed any number
    /// of sinks.
    pub fn connect_output(&self, sink: Arc<dyn Sink>, selection: &[usize]) -> Result<(), ConnectionError> {
        let form = sink.form();
        self.register(PortDirection::Output, Endpoint::Sink(sink), form, selection)
    }

    /// Like [`connect_output`](Self::connect_output), into a fresh pipe whose
    /// readable end is returned.
    pub fn open_output(&self, selection: &[usize]) -> Result<PipeSource, ConnectionError> {
        let channels = if selection.is_empty() {
            self.out_form.channels()
        } else {
            selection.len()
        };
        let form = Form::new(self.out_form.sample_rate(), channels);
        let (sink, source) = pipe(form);
        self.register(PortDirection::Output, Endpoint::Sink(Arc::new(sink)), form, selection)?;
        Ok(source)
    }

    /// Check that every input and output channel has at least one connection.
    pub fn check_connectivity(&self) -> Result<(), ConnectionError> {
        self.lock_wiring().check_connectivity()
    }

    fn lock_wiring(&self) -> std::sync::MutexGuard<'_, Wiring> {
        self.wiring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        direction: PortDirection,
        endpoint: Endpoint,
        form: Form,
        selection: &[usize],
    ) -> Result<(), ConnectionError> {
        let node_form = match direction {
            PortDirection::Input => self.in_form,
            PortDirection::Output => self.out_form,
        };
        let node_channels = node_form.channels();

        let mut wiring = self.lock_wiring();
        if wiring.processor.is_none() {
            return Err(ConnectionError::AlreadyStarted(self.name.clone()));
        }
        if !node_form.is_compatible(&form) {
            return Err(ConnectionError::SampleRateMismatch {
                expected: node_form.sample_rate(),
                got: form.sample_rate(),
            });
        }
        if let Some(&channel) = selection.iter().find(|&&c| c >= node_channels) {
            return Err(ConnectionError::ChannelOutOfRange {
                direction,
                channel,
                channels: node_channels,
            });
        }
        let channels = selected(selection, node_channels);
        if form.channels() != channels.len() {
            return Err(ConnectionError::ChannelCountMismatch {
                expected: channels.len(),
                got: form.channels(),
            });
        }

        let packet = Packet::new(endpoint, node_channels, selection);
        match direction {
            PortDirection::Input => {
                wiring.claim_inputs(&channels)?;
                wiring.inputs.push(packet);
                debug!("[{}] Input {} connected: {} via {:?}", self.name, wiring.inputs.len() - 1, form, channels);
            }
            PortDirection::Output => {
                wiring.claim_outputs(&channels);
                wiring.outputs.push(packet);
                debug!("[{}] Output {} connected: {} via {:?}", self.name, wiring.outputs.len() - 1, form, channels);
            }
        }
        Ok(())
    }

    /// Run the node until its inputs end.
    ///
    /// Returns `Ok` when an input or the processor reports end of stream and
    /// the first other error otherwise. May be called once; whatever the
    /// outcome, every source and sink has been closed and every worker
    /// thread joined by the time it returns.
    ///
    /// # Panics
    /// Panics if the inputs of one cycle deliver differing frame counts, or
    /// if a per-channel processor produces differing frame counts.
    pub fn run(&self) -> WorkResult<()> {
        let mut runner = {
            let mut wiring = self.lock_wiring();
            let processor = wiring
                .processor
                .take()
                .ok_or_else(|| ConnectionError::AlreadyStarted(self.name.clone()))?;
            Runner::new(
                self,
                processor,
                std::mem::take(&mut wiring.inputs),
                std::mem::take(&mut wiring.outputs),
            )
        };
        let checked = self.check_connectivity().and_then(|()| runner.check_mode());
        if let Err(err) = checked {
            warn!("[{}] Not started: {}", self.name, err);
            return Err(err.into());
        }

        info!(
            "[{}] Running with {} inputs and {} outputs",
            self.name,
            runner.inputs.len(),
            runner.outputs.len()
        );
        match runner.start().and_then(|()| runner.cycle_until_end()) {
            Ok(()) => {
                info!(
                    "[{}] Finished after {} cycles, {} frames in, {} frames out",
                    self.name, runner.cycles, runner.frames_in, runner.frames_out
                );
                Ok(())
            }
            Err(err) => {
                warn!("[{}] Failed after {} cycles: {}", self.name, runner.cycles, err);
                Err(err)
            }
        }
    }
}

/// Packets and their workers for one direction
struct Links {
    /// Indexed like `connections`; `None` while the worker holds the packet.
    packets: Vec<Option<Packet>>,
    connections: Vec<Connection>,
    endpoints: Vec<Endpoint>,
}

impl Links {
    fn new(packets: Vec<Packet>) -> Self {
        Self {
            endpoints: packets.iter().map(|p| p.endpoint().clone()).collect(),
            packets: packets.into_iter().map(Some).collect(),
            connections: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.packets.len()
    }

    fn spawn(&mut self, node: &str, tag: &str, shutdown: &Signal) -> WorkResult<()> {
        for i in 0..self.packets.len() {
            let conn = Connection::spawn(format!("{}/{}{}", node, tag, i), shutdown.listener().clone())?;
            self.connections.push(conn);
        }
        Ok(())
    }

    fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter().flatten()
    }

    fn packets_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.iter_mut().flatten()
    }

    /// Hand every packet to its worker.
    fn dispatch(&mut self) -> WorkResult<()> {
        for (slot, conn) in self.packets.iter_mut().zip(&self.connections) {
            if let Some(packet) = slot.take() {
                conn.request(packet)?;
            }
        }
        Ok(())
    }

    /// Take every packet back, failing on the first error to arrive.
    fn collect(&mut self) -> WorkResult<()> {
        let mut pending: Vec<usize> = (0..self.connections.len()).collect();
        while !pending.is_empty() {
            let mut select = Select::new();
            for &i in &pending {
                select.recv(self.connections[i].responses());
            }
            let op = select.select();
            let at = op.index();
            let i = pending.swap_remove(at);
            let conn = &self.connections[i];
            let mut packet = op
                .recv(conn.responses())
                .map_err(|_| WorkError::ConnectionLost(conn.name().to_string()))?;

            let error = packet.take_error();
            self.packets[i] = Some(packet);
            if let Some(err) = error {
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn close(&self) {
        for endpoint in &self.endpoints {
            endpoint.close();
        }
    }

    fn join(&mut self) {
        for conn in &mut self.connections {
            conn.join();
        }
    }
}

/// State of one run. Dropping it shuts the run down.
struct Runner {
    name: String,
    in_form: Form,
    out_form: Form,
    processor: Box<dyn Processor>,
    in_block: BlockBuffer,
    out_block: BlockBuffer,
    inputs: Links,
    outputs: Links,
    shutdown: Signal,
    cycles: u64,
    frames_in: u64,
    frames_out: u64,
}

impl Runner {
    fn new(node: &Node, processor: Box<dyn Processor>, inputs: Vec<Packet>, outputs: Vec<Packet>) -> Self {
        Self {
            name: node.name.clone(),
            in_form: node.in_form,
            out_form: node.out_form,
            processor,
            in_block: BlockBuffer::new(node.in_form),
            out_block: BlockBuffer::new(node.out_form),
            inputs: Links::new(inputs),
            outputs: Links::new(outputs),
            shutdown: Signal::new(),
            cycles: 0,
            frames_in: 0,
            frames_out: 0,
        }
    }

    fn check_mode(&self) -> Result<(), ConnectionError> {
        let (inputs, outputs) = (self.in_form.channels(), self.out_form.channels());
        if self.processor.channel_mode() == ChannelMode::Mono && inputs != outputs {
            return Err(ConnectionError::MonoChannelMismatch { inputs, outputs });
        }
        Ok(())
    }

    fn start(&mut self) -> WorkResult<()> {
        self.inputs.spawn(&self.name, "in", &self.shutdown)?;
        self.outputs.spawn(&self.name, "out", &self.shutdown)
    }

    fn cycle_until_end(&mut self) -> WorkResult<()> {
        loop {
            match self.cycle() {
                Ok(()) => self.cycles += 1,
                Err(err) if err.is_end_of_stream() => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn cycle(&mut self) -> WorkResult<()> {
        let (in_frames, out_frames) = self.processor.next_frames();
        self.in_block.resize(in_frames);
        self.out_block.resize(out_frames);

        for packet in self.inputs.packets_mut() {
            packet.prepare_receive(in_frames);
        }
        self.inputs.dispatch()?;
        self.inputs.collect()?;

        let mut frames = None;
        for packet in self.inputs.packets() {
            let n = packet.frames();
            match frames {
                None => frames = Some(n),
                Some(m) => assert!(
                    m == n,
                    "[{}] frame count mismatch between inputs: {} and {}",
                    self.name,
                    m,
                    n
                ),
            }
        }
        for packet in self.inputs.packets() {
            packet.scatter_into(&mut self.in_block);
        }
        let frames = frames.unwrap_or(in_frames);
        self.in_block.set_frames(frames);
        self.frames_in += frames as u64;

        let produced = self.process(out_frames)?;
        self.frames_out += produced as u64;

        for packet in self.outputs.packets_mut() {
            packet.gather_from(&self.out_block);
        }
        self.outputs.dispatch()?;
        self.outputs.collect()
    }

    /// Run the processor and settle the output block's frame count.
    fn process(&mut self, out_frames: usize) -> WorkResult<usize> {
        match self.processor.channel_mode() {
            ChannelMode::Full => {
                let src = self.in_block.view();
                let mut dst = self.out_block.view();
                self.processor.process(&mut dst, &src)?;
                let produced = dst.frames.min(out_frames);
                self.out_block.set_frames(produced);
                Ok(produced)
            }
            ChannelMode::Mono => {
                let mut produced = None;
                for c in 0..self.in_block.channels() {
                    let src = self.in_block.channel_view(c);
                    let mut dst = self.out_block.channel_view(c);
                    self.processor.process(&mut dst, &src)?;
                    let n = dst.frames.min(out_frames);
                    match produced {
                        None => produced = Some(n),
                        Some(m) => assert!(
                            m == n,
                            "[{}] frame count mismatch between channels: {} and {}",
                            self.name,
                            m,
                            n
                        ),
                    }
                }
                let produced = produced.unwrap_or(0);
                self.out_block.compact(produced);
                Ok(produced)
            }
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown.fire();
        self.outputs.close();
        self.inputs.close();
        self.outputs.join();
        self.inputs.join();
        debug!("[{}] All connections closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::StreamError;
    use crate::runtime::processor::FnProcessor;
    use crate::runtime::sample::{Block, CD_SAMPLE_RATE};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Endless zero source that counts calls.
    #[derive(Default)]
    struct Probe {
        channels: usize,
        receives: AtomicUsize,
        closed: AtomicBool,
    }

    impl Probe {
        fn new(channels: usize) -> Arc<Self> {
            Arc::new(Self {
                channels,
                ..Default::default()
            })
        }
    }

    impl Source for Probe {
        fn form(&self) -> Form {
            Form::new(CD_SAMPLE_RATE, self.channels)
        }

        fn receive(&self, samples: &mut [f64]) -> Result<usize, StreamError> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            if self.closed.load(Ordering::SeqCst) {
                return Err(StreamError::Closed);
            }
            samples.fill(0.0);
            Ok(samples.len() / self.channels)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn copy_node(in_channels: usize, out_channels: usize) -> Node {
        let processor = FnProcessor::new(ChannelMode::Full, |_dst: &mut Block<'_>, _src: &Block<'_>| Ok(()));
        Node::new(
            Form::new(CD_SAMPLE_RATE, in_channels),
            Form::new(CD_SAMPLE_RATE, out_channels),
            processor,
        )
        .with_name("test")
    }

    fn claims(node: &Node) -> (Vec<usize>, Vec<usize>) {
        let wiring = node.lock_wiring();
        (wiring.input_claims.clone(), wiring.output_claims.clone())
    }

    #[test]
    fn test_sample_rate_mismatch() {
        let node = copy_node(1, 1);
        let (sink, _source) = pipe(Form::mono(48_000));
        assert_eq!(
            node.connect_output(Arc::new(sink), &[]),
            Err(ConnectionError::SampleRateMismatch {
                expected: CD_SAMPLE_RATE,
                got: 48_000
            })
        );
        assert_eq!(claims(&node).1, vec![0]);
    }

    #[test]
    fn test_output_channel_count() {
        let node = copy_node(1, 2);
        let (sink, _source) = pipe(Form::mono(CD_SAMPLE_RATE));
        assert_eq!(
            node.connect_output(Arc::new(sink), &[]),
            Err(ConnectionError::ChannelCountMismatch { expected: 2, got: 1 })
        );

        let (sink, _source) = pipe(Form::stereo(CD_SAMPLE_RATE));
        assert!(node.connect_output(Arc::new(sink), &[1, 1]).is_ok());
        assert_eq!(claims(&node).1, vec![0, 2]);
    }

    #[test]
    fn test_selection_out_of_range() {
        let node = copy_node(2, 2);
        assert_eq!(
            node.open_output(&[0, 2]).err(),
            Some(ConnectionError::ChannelOutOfRange {
                direction: PortDirection::Output,
                channel: 2,
                channels: 2
            })
        );
        assert_eq!(
            node.connect_input(Probe::new(1), &[5]),
            Err(ConnectionError::ChannelOutOfRange {
                direction: PortDirection::Input,
                channel: 5,
                channels: 2
            })
        );
    }

    #[test]
    fn test_input_claimed_twice() {
        let node = copy_node(2, 1);
        node.connect_input(Probe::new(1), &[1]).unwrap();
        assert_eq!(
            node.connect_input(Probe::new(1), &[1]),
            Err(ConnectionError::InputChannelTaken(1))
        );
        assert_eq!(
            node.connect_input(Probe::new(2), &[]),
            Err(ConnectionError::InputChannelTaken(1))
        );
        assert_eq!(claims(&node).0, vec![0, 1]);
    }

    #[test]
    fn test_duplicate_within_one_input_selection() {
        let node = copy_node(2, 1);
        assert_eq!(
            node.connect_input(Probe::new(2), &[0, 0]),
            Err(ConnectionError::InputChannelTaken(0))
        );
        assert_eq!(claims(&node).0, vec![0, 0]);

        node.connect_input(Probe::new(1), &[0]).unwrap();
        node.connect_input(Probe::new(1), &[1]).unwrap();
        assert_eq!(claims(&node).0, vec![1, 1]);
    }

    #[test]
    fn test_check_connectivity() {
        let node = copy_node(2, 1);
        node.connect_input(Probe::new(1), &[0]).unwrap();
        assert_eq!(
            node.check_connectivity(),
            Err(ConnectionError::Disconnected {
                direction: PortDirection::Input,
                channel: 1
            })
        );

        node.connect_input(Probe::new(1), &[1]).unwrap();
        assert_eq!(
            node.check_connectivity(),
            Err(ConnectionError::Disconnected {
                direction: PortDirection::Output,
                channel: 0
            })
        );

        let _out = node.open_output(&[]).unwrap();
        assert_eq!(node.check_connectivity(), Ok(()));
    }

    #[test]
    fn test_run_without_connectivity_spawns_nothing() {
        let node = copy_node(1, 1);
        let probe = Probe::new(1);
        node.connect_input(probe.clone(), &[]).unwrap();

        let err = node.run().unwrap_err();
        assert!(matches!(
            err,
            WorkError::Connection(ConnectionError::Disconnected {
                direction: PortDirection::Output,
                channel: 0
            })
        ));
        assert_eq!(probe.receives.load(Ordering::SeqCst), 0);
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_mono_processor_needs_matching_channels() {
        let processor = FnProcessor::new(ChannelMode::Mono, |_dst: &mut Block<'_>, _src: &Block<'_>| Ok(()));
        let node = Node::new(Form::stereo(CD_SAMPLE_RATE), Form::mono(CD_SAMPLE_RATE), processor);
        node.connect_input(Probe::new(2), &[]).unwrap();
        let _out = node.open_output(&[]).unwrap();

        let err = node.run().unwrap_err();
        assert!(matches!(
            err,
            WorkError::Connection(ConnectionError::MonoChannelMismatch { inputs: 2, outputs: 1 })
        ));
    }

    #[test]
    fn test_wiring_after_run_is_rejected() {
        let processor = FnProcessor::new(ChannelMode::Full, |_dst: &mut Block<'_>, _src: &Block<'_>| {
            Err(StreamError::EndOfStream.into())
        });
        let node = Node::new(Form::mono(CD_SAMPLE_RATE), Form::mono(CD_SAMPLE_RATE), processor).with_name("once");
        let probe = Probe::new(1);
        node.connect_input(probe.clone(), &[]).unwrap();
        let _out = node.open_output(&[]).unwrap();

        assert!(node.run().is_ok());
        assert_eq!(probe.receives.load(Ordering::SeqCst), 1);
        assert!(probe.closed.load(Ordering::SeqCst));

        let started = ConnectionError::AlreadyStarted("once".to_string());
        assert_eq!(node.open_output(&[]).err(), Some(started.clone()));
        assert!(matches!(node.run(), Err(WorkError::Connection(err)) if err == started));
    }

    #[test]
    fn test_processor_error_is_returned() {
        let processor = FnProcessor::new(ChannelMode::Full, |_dst: &mut Block<'_>, _src: &Block<'_>| {
            Err(WorkError::Processor("overload".to_string()))
        });
        let node = Node::new(Form::mono(CD_SAMPLE_RATE), Form::mono(CD_SAMPLE_RATE), processor);
        node.connect_input(Probe::new(1), &[]).unwrap();
        let _out = node.open_output(&[]).unwrap();

        assert!(matches!(node.run(), Err(WorkError::Processor(msg)) if msg == "overload"));
    }
}
