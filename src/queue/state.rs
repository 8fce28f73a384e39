//! Execution queue state machine.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// Nothing dispatched, waiting for work.
    Idle,
    /// Head task taken, kernel being materialized and submitted.
    Dispatching,
    /// Submitted, waiting for the device.
    InFlight,
    /// Device finished, completion callback running.
    Completing,
    /// Worker gone; no further dispatch.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    TaskAvailable,
    Submitted,
    DeviceCompleted,
    CallbackReturned,
    Close,
    Fault,
}

impl QueueState {
    pub fn on(self, event: QueueEvent) -> Result<QueueState> {
        use QueueEvent::*;
        use QueueState::*;

        match (self, event) {
            (Idle, TaskAvailable) => Ok(Dispatching),
            (Dispatching, Submitted) => Ok(InFlight),
            (InFlight, DeviceCompleted) => Ok(Completing),
            (Completing, CallbackReturned) => Ok(Idle),
            (Idle, Close) => Ok(Closed),
            (Closed, Close) => Ok(Closed),
            (_, Fault) => Ok(Closed),
            (from, event) => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// True while a task is owned by the worker.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            QueueState::Dispatching | QueueState::InFlight | QueueState::Completing
        )
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueState::Idle => "idle",
            QueueState::Dispatching => "dispatching",
            QueueState::InFlight => "in-flight",
            QueueState::Completing => "completing",
            QueueState::Closed => "closed",
        };
        f.write_str(name)
    }
}
