//! Broadcast-once signal for cancellation and close notification
//!
//! Backed by a zero-capacity channel on which nothing is ever sent. Firing
//! drops the only sender, which disconnects the channel and makes every
//! clone of the receiver ready at once, so it can sit in a `select!` next
//! to the channel a thread is actually waiting on.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use std::sync::{Mutex, PoisonError};

pub(crate) struct Signal {
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        let (trigger, listener) = bounded(0);
        Self {
            trigger: Mutex::new(Some(trigger)),
            listener,
        }
    }

    /// Fire the signal. Later calls do nothing.
    pub(crate) fn fire(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(crate) fn is_fired(&self) -> bool {
        matches!(self.listener.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (with an error) once the signal fires.
    pub(crate) fn listener(&self) -> &Receiver<()> {
        &self.listener
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
