//! Running many nodes together
//!
//! Nodes connected through pipes each run their own loop; a [`Graph`] just
//! starts every node on a dedicated thread and funnels their failures onto
//! one channel.

use crossbeam_channel::{Receiver, unbounded};
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

use super::errors::{NodeFailure, WorkError};
use super::node::Node;

/// A set of nodes that run together
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Arc<Node>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` and return a handle for wiring it.
    pub fn add_node(&mut self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        self.nodes.push(Arc::clone(&node));
        node
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Check every node's connectivity, reporting the first node found
    /// lacking. Cycles are not detected.
    pub fn check_connectivity(&self) -> Result<(), NodeFailure> {
        for node in &self.nodes {
            node.check_connectivity().map_err(|err| NodeFailure {
                node: node.name().to_string(),
                source: err.into(),
            })?;
        }
        Ok(())
    }

    /// Start every node on its own thread.
    pub fn run(&self) -> GraphRun {
        let (errors_tx, errors_rx) = unbounded();
        let mut threads = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let name = node.name().to_string();
            let worker = Arc::clone(node);
            let errors = errors_tx.clone();

            let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                if let Err(source) = worker.run() {
                    let _ = errors.send(NodeFailure {
                        node: worker.name().to_string(),
                        source,
                    });
                }
            });
            match spawned {
                Ok(handle) => threads.push((name, handle)),
                Err(err) => {
                    error!("[{}] Failed to start node thread: {}", name, err);
                    let _ = errors_tx.send(NodeFailure {
                        node: name,
                        source: WorkError::Spawn(err),
                    });
                }
            }
        }

        info!("Started {} node threads", threads.len());
        GraphRun {
            errors: errors_rx,
            threads,
        }
    }
}

/// Handle on a running [`Graph`]
pub struct GraphRun {
    errors: Receiver<NodeFailure>,
    threads: Vec<(String, JoinHandle<()>)>,
}

impl GraphRun {
    /// Failures as they happen. Disconnects once every node has returned.
    pub fn errors(&self) -> &Receiver<NodeFailure> {
        &self.errors
    }

    /// Wait for every node and return the failures not yet received.
    ///
    /// # Panics
    /// Once every thread has been joined, re-raises the first panic of a
    /// node thread, such as a frame count mismatch between its inputs.
    pub fn wait(self) -> Vec<NodeFailure> {
        let failures: Vec<NodeFailure> = self.errors.iter().collect();

        let total = self.threads.len();
        let mut panicked = None;
        for (name, handle) in self.threads {
            if let Err(payload) = handle.join() {
                error!("[{}] Node thread panicked", name);
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        info!("All {} node threads completed, {} failed", total, failures.len());
        failures
    }
}
