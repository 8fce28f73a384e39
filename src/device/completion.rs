//! Completion notification by message passing.
//!
//! Backends hand the [`CompletionSignal`] to whatever thread or driver
//! callback observes the end of a launch; the execution queue worker owns
//! the [`Completion`] and blocks on it.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug)]
enum DeviceEvent {
    Complete,
    Failed(String),
}

/// Sending half, fired exactly once by the backend.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Sender<DeviceEvent>,
}

/// Receiving half, awaited by the dispatching worker.
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<DeviceEvent>,
}

pub fn completion() -> (CompletionSignal, Completion) {
    // capacity 1 so the signalling side never blocks
    let (tx, rx) = bounded(1);
    (CompletionSignal { tx }, Completion { rx })
}

impl CompletionSignal {
    pub fn complete(self) {
        // receiver may already be gone if the queue was torn down
        let _ = self.tx.send(DeviceEvent::Complete);
    }

    pub fn fail<S: Into<String>>(self, reason: S) {
        let _ = self.tx.send(DeviceEvent::Failed(reason.into()));
    }
}

impl Completion {
    /// Block until the device reports completion.
    pub fn wait(self) -> Result<()> {
        match self.rx.recv() {
            Ok(event) => Self::resolve(event),
            Err(_) => Err(Error::device("completion signal dropped")),
        }
    }

    fn resolve(event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::Complete => Ok(()),
            DeviceEvent::Failed(reason) => Err(Error::device(reason)),
        }
    }
}
