//! Start/done rendezvous between the render loop and the compile worker.
//!
//! `start` is a unit signal sent once by the render loop. `done` carries the
//! compile outcome itself, so the render loop never reads compiled bytes that
//! were not handed to it through the channel. Both channels hold a single
//! message and each side consumes its end once.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::task::{CompileError, CompileOutcome};

/// Default bound for the per-frame wait on `done`.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_micros(100);

/// Creates the two ends of a fresh handshake.
pub fn handshake() -> (RenderLink, WorkerLink) {
    let (start_tx, start_rx) = bounded(1);
    let (done_tx, done_rx) = bounded(1);
    (
        RenderLink {
            start: Some(start_tx),
            done: done_rx,
            started: false,
            finished: false,
        },
        WorkerLink {
            start: start_rx,
            done: done_tx,
        },
    )
}

#[derive(Debug)]
pub enum DonePoll {
    /// `start` has not been signalled, so `done` was not consulted.
    NotStarted,
    /// The worker is still compiling.
    Pending,
    Done(CompileOutcome),
    /// The worker exited without publishing an outcome.
    Disconnected,
    /// The outcome was already taken by an earlier poll.
    Consumed,
}

/// Render loop side of the handshake.
#[derive(Debug)]
pub struct RenderLink {
    start: Option<Sender<()>>,
    done: Receiver<CompileOutcome>,
    started: bool,
    finished: bool,
}

impl RenderLink {
    /// Signals `start`. Returns `true` only for the call that fired it.
    pub fn signal_start(&mut self) -> bool {
        let Some(start) = self.start.take() else {
            return false;
        };
        if start.send(()).is_err() {
            tracing::warn!("compile worker is gone; start signal dropped");
        }
        self.started = true;
        true
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Waits up to `timeout` for the compile outcome.
    pub fn poll_done(&mut self, timeout: Duration) -> DonePoll {
        if !self.started {
            return DonePoll::NotStarted;
        }
        if self.finished {
            return DonePoll::Consumed;
        }
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => {
                self.finished = true;
                DonePoll::Done(outcome)
            }
            Err(RecvTimeoutError::Timeout) => DonePoll::Pending,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                DonePoll::Disconnected
            }
        }
    }

    /// Blocks until the outcome arrives. Intended for headless callers.
    pub fn wait_done(&mut self) -> DonePoll {
        if !self.started {
            return DonePoll::NotStarted;
        }
        if self.finished {
            return DonePoll::Consumed;
        }
        self.finished = true;
        match self.done.recv() {
            Ok(outcome) => DonePoll::Done(outcome),
            Err(_) => DonePoll::Disconnected,
        }
    }
}

/// Compile worker side of the handshake.
#[derive(Debug)]
pub struct WorkerLink {
    start: Receiver<()>,
    done: Sender<CompileOutcome>,
}

impl WorkerLink {
    /// Suspends until the render loop signals `start`.
    pub fn wait_for_start(&self) -> Result<(), CompileError> {
        self.start.recv().map_err(|_| CompileError::Cancelled)
    }

    /// Publishes the outcome, consuming the link.
    pub fn publish(self, outcome: CompileOutcome) {
        if self.done.send(outcome).is_err() {
            tracing::debug!("render loop dropped before the compile outcome was delivered");
        }
    }
}
