// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Errors reported by the assembler and the publisher.
//!
//! Every variant describes a protocol violation by the caller (or a listener), never a data
//! problem. None of them are retried internally.

use crate::{ChangeKind, SubjectId};
use std::{fmt, thread::ThreadId};

/// The error type produced by listener callbacks.
pub type ListenerError = Box<dyn std::error::Error + 'static>;

/// Error returned by [`EventPublisher`](crate::EventPublisher) registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherError {
    /// The registered (subject, listener) pairs contain a dependency cycle. Holds every pair
    /// that could not be ordered, using the listener's effective subject.
    Cycle { remaining: Vec<(SubjectId, SubjectId)> },
    /// A listener was removed that was never added (only reported in strict mode).
    UnknownListener {
        subject: SubjectId,
        listener: SubjectId,
    },
}

impl fmt::Display for PublisherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherError::Cycle { remaining } => {
                f.write_str("listener cycle detected among")?;
                for (subject, listener) in remaining {
                    write!(f, " {subject}->{listener}")?;
                }
                Ok(())
            }
            PublisherError::UnknownListener { subject, listener } => {
                write!(f, "listener {listener} is not registered on {subject}")
            }
        }
    }
}

impl std::error::Error for PublisherError {}

/// Error returned by [`EventAssembler`](crate::EventAssembler) and event replay.
#[derive(Debug)]
pub enum EventError {
    /// An operation that requires an open event was called outside of one, or a commit/discard
    /// had no matching begin.
    NotInEvent { operation: &'static str },
    /// An event was begun while another one is open and nesting was not allowed by the
    /// enclosing call.
    ConcurrentModification { owner: ThreadId },
    /// A reorder was requested while other edits are pending.
    ReorderWithPendingEdits,
    /// The reorder map is not a permutation of `0..len`.
    InvalidReorderMap { len: usize },
    /// An element already changed in this operation was changed again while contradicting
    /// edits are not allowed.
    ContradictingEdit { kind: ChangeKind, index: usize },
    /// An event was replayed whose new values are not tracked.
    UntrackedValue { index: usize },
    /// An event was replayed onto a list it does not describe.
    IndexOutOfBounds { index: usize, len: usize },
    Publisher(PublisherError),
    /// The first error raised by a listener during a notification wave.
    Listener(ListenerError),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::NotInEvent { operation } => {
                write!(f, "{operation} called while no event is in progress")
            }
            EventError::ConcurrentModification { owner } => write!(
                f,
                "cannot begin a new event while another event is in progress by thread {owner:?}"
            ),
            EventError::ReorderWithPendingEdits => {
                f.write_str("cannot combine a reorder with other pending changes")
            }
            EventError::InvalidReorderMap { len } => {
                write!(f, "reorder map is not a permutation of 0..{len}")
            }
            EventError::ContradictingEdit { kind, index } => write!(
                f,
                "{kind} at {index} contradicts an earlier change in the same event"
            ),
            EventError::UntrackedValue { index } => {
                write!(f, "value at {index} is not tracked by this event")
            }
            EventError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} is out of bounds for length {len}")
            }
            EventError::Publisher(e) => e.fmt(f),
            EventError::Listener(e) => write!(f, "listener failed: {e}"),
        }
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EventError::Publisher(e) => Some(e),
            EventError::Listener(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<PublisherError> for EventError {
    fn from(value: PublisherError) -> Self {
        EventError::Publisher(value)
    }
}
