// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Receiving change events.

use crate::{ChangeEvent, ListenerError};

/// Observer of an [`EventAssembler`](crate::EventAssembler).
///
/// The event is rewound before every call. It is shared with the other listeners of the same
/// list and must not be kept past the call; use [`ChangeEvent::copy`] for that.
///
/// A listener may mutate other lists, or the list it observes, while handling an event. Such
/// changes are delivered within the same notification wave.
pub trait ListEventListener<E> {
    fn list_changed(&mut self, event: &mut ChangeEvent<E>) -> Result<(), ListenerError>;
}

impl<E, F> ListEventListener<E> for F
where
    F: FnMut(&mut ChangeEvent<E>) -> Result<(), ListenerError>,
{
    fn list_changed(&mut self, event: &mut ChangeEvent<E>) -> Result<(), ListenerError> {
        self(event)
    }
}

/// A listener that records every event it sees.
///
/// Mostly useful in tests.
#[derive(Debug)]
pub struct RecordingListener<E> {
    /// One line per event, as rendered by [`ChangeEvent`]'s `Display` impl.
    pub changes_seen: Vec<String>,
    pub events: Vec<ChangeEvent<E>>,
}

impl<E> Default for RecordingListener<E> {
    fn default() -> Self {
        Self {
            changes_seen: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl<E> RecordingListener<E> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E> ListEventListener<E> for RecordingListener<E> {
    fn list_changed(&mut self, event: &mut ChangeEvent<E>) -> Result<(), ListenerError> {
        self.changes_seen.push(event.to_string());
        self.events.push(event.copy());
        Ok(())
    }
}
