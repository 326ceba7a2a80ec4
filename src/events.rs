//! Events flowing from the engine worker to the front end.
//!
//! The worker never blocks on a front end that has gone away: every send
//! through an [`EventSender`] ignores a disconnected receiver. The one event
//! that expects an answer, [`EngineEvent::DuplicateGroupFound`], carries its
//! own reply channel.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::duplicates::{ResolutionRequest, RunSummary};
use crate::progress::ProgressSnapshot;

/// Everything the engine reports while a run is in flight.
#[derive(Debug)]
pub enum EngineEvent {
    /// Counters after an entry was processed.
    Progress(ProgressSnapshot),
    /// Free-form status line, e.g. "currently extracting: photos.zip".
    Status(String),
    /// A duplicate group needs a keep/discard decision.
    DuplicateGroupFound(ResolutionRequest),
    /// A non-fatal failure.
    Error {
        /// Description including the offending path
        message: String,
        /// Whether the caller asked for errors to be surfaced to the user
        user_facing: bool,
    },
    /// Terminal event; nothing follows it.
    Finished(Box<RunSummary>),
}

/// Cloneable sending half used by the worker.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<Sender<EngineEvent>>,
}

impl EventSender {
    /// New connected pair.
    #[must_use]
    pub fn channel() -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops every event.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Wrap an existing channel.
    #[must_use]
    pub fn from_sender(tx: Sender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Whether a receiver was attached when this sender was built.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.tx.is_some()
    }

    /// Send an event. Returns `false` if nobody is listening.
    pub fn send(&self, event: EngineEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Shorthand for [`EngineEvent::Status`].
    pub fn status(&self, message: impl Into<String>) {
        self.send(EngineEvent::Status(message.into()));
    }

    /// Shorthand for [`EngineEvent::Error`].
    pub fn error(&self, message: impl Into<String>, user_facing: bool) {
        self.send(EngineEvent::Error {
            message: message.into(),
            user_facing,
        });
    }
}
