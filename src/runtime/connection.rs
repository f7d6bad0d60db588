//! Connection workers
//!
//! Every input and output of a running node gets one worker thread. The
//! node hands it a [`Packet`] over a dedicated request channel; the worker
//! performs exactly one blocking call on the packet's endpoint and returns
//! the packet over a dedicated response channel. The worker never holds
//! more than one packet, so a connection is never asked to start a second
//! operation before the first has been answered.
//!
//! The shared shutdown listener is checked only between endpoint calls. A
//! worker blocked inside `receive`/`send` is released by closing the
//! endpoint, which the node does on its way out.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use super::errors::{WorkError, WorkResult};
use super::packet::Packet;

pub(crate) struct Connection {
    name: String,
    requests: Sender<Packet>,
    responses: Receiver<Packet>,
    handle: Option<JoinHandle<()>>,
}

impl Connection {
    /// Spawn a worker thread named `name` that exits once `shutdown` fires.
    pub(crate) fn spawn(name: String, shutdown: Receiver<()>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = bounded(1);
        let (response_tx, response_rx) = bounded(1);
        let worker_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || serve(&worker_name, &request_rx, &response_tx, &shutdown))?;

        Ok(Self {
            name,
            requests: request_tx,
            responses: response_rx,
            handle: Some(handle),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Hand `packet` to the worker.
    pub(crate) fn request(&self, packet: Packet) -> WorkResult<()> {
        self.requests
            .send(packet)
            .map_err(|_| WorkError::ConnectionLost(self.name.clone()))
    }

    /// Where the worker returns packets.
    pub(crate) fn responses(&self) -> &Receiver<Packet> {
        &self.responses
    }

    /// Wait for the worker thread. Call only after shutdown has fired.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("[{}] Connection worker panicked", self.name);
        }
    }
}

fn serve(name: &str, requests: &Receiver<Packet>, responses: &Sender<Packet>, shutdown: &Receiver<()>) {
    let mut transfers = 0usize;

    loop {
        let mut packet = select! {
            recv(shutdown) -> _ => break,
            recv(requests) -> msg => match msg {
                Ok(packet) => packet,
                Err(_) => break,
            },
        };

        packet.transfer();
        transfers += 1;

        select! {
            send(responses, packet) -> res => {
                if res.is_err() {
                    break;
                }
            }
            recv(shutdown) -> _ => break,
        }
    }

    debug!("[{}] Connection worker exiting after {} transfers", name, transfers);
}
