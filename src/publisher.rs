// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # EventPublisher
//!
//! Lists observing other lists form a dependency graph. When a source list changes, every list
//! derived from it must see the change before any list derived from *those* lists, or a
//! downstream list would observe a half-updated pipeline. The [`EventPublisher`] owns the
//! registrations of one pipeline and notifies listeners in an order that respects the graph.
//!
//! Every participant is identified by a [`SubjectId`]. A registration `(subject, listener)` is an
//! edge from the subject to the listener. When the listener is a helper object acting on behalf
//! of another list, [`EventPublisher::set_related_subject`] makes the edge point to that list
//! instead.
//!
//! The notification order is recomputed whenever the registrations change. Registrations that
//! would create a cycle are rejected and the previous order stays in place.
//!
//! ## Re-entrancy
//!
//! Listeners are called synchronously and may change other lists (or the list they observe),
//! which fires further events before the first call to [`EventPublisher::fire_event`] returns.
//! Such nested calls only mark the listeners of their subject as pending. The outermost call
//! notifies every pending listener in dependency order, then runs the
//! [`EventFormat::post_event`] cleanup of every subject that fired, once per subject.

mod ordering;

use crate::{ListRandomState, ListenerError, PublisherError, PublisherOptions};
use smallvec::SmallVec;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, trace, warn};

static NEXT_SUBJECT: AtomicU64 = AtomicU64::new(0);

/// Identity of a participant in a publisher's dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct SubjectId(u64);

impl SubjectId {
    /// Allocates an identifier that is unique within this process.
    pub fn new() -> Self {
        Self(NEXT_SUBJECT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivers events for one registration, and cleans up after a subject has fired.
///
/// The format given to [`EventPublisher::add_listener`] delivers the event of `subject` to
/// `listener`. The format given to [`EventPublisher::fire_event`] is only used for
/// [`EventFormat::post_event`].
#[expect(unused_variables)]
pub trait EventFormat {
    /// Delivers the pending event of `subject` to `listener`.
    fn fire(&self, subject: SubjectId, listener: SubjectId) -> Result<(), ListenerError>;

    /// Called once per subject after every listener of a wave has been notified.
    fn post_event(&self, subject: SubjectId) {}

    /// Returns whether this registration should be dropped instead of notified.
    fn is_stale(&self, subject: SubjectId, listener: SubjectId) -> bool {
        false
    }
}

#[derive(Clone)]
struct Registration {
    subject: SubjectId,
    listener: SubjectId,
    format: Rc<dyn EventFormat>,
    /// Cleared when the registration is removed, so that an in-flight wave skips it.
    live: Rc<Cell<bool>>,
}

/// Bookkeeping of one notification wave.
struct Wave {
    /// The notification order at the start of the wave.
    order: Rc<[Registration]>,
    pending: Vec<bool>,
    /// No slot before this one is pending.
    next: usize,
    fired: SmallVec<[(SubjectId, Rc<dyn EventFormat>); 4]>,
    error: Option<ListenerError>,
    stale: usize,
}

impl Wave {
    fn new(order: Rc<[Registration]>) -> Self {
        Self {
            pending: vec![false; order.len()],
            next: order.len(),
            order,
            fired: SmallVec::new(),
            error: None,
            stale: 0,
        }
    }

    fn enqueue(&mut self, subject: SubjectId, format: Rc<dyn EventFormat>) {
        for (slot, registration) in self.order.iter().enumerate() {
            if registration.subject == subject {
                self.pending[slot] = true;
                self.next = self.next.min(slot);
            }
        }
        if !self.fired.iter().any(|(fired, _)| *fired == subject) {
            self.fired.push((subject, format));
        }
    }

    fn take_next(&mut self) -> Option<Registration> {
        let slot = (self.next..self.pending.len()).find(|&slot| self.pending[slot])?;
        self.pending[slot] = false;
        self.next = slot + 1;
        Some(self.order[slot].clone())
    }
}

#[derive(Default)]
struct PublisherState {
    /// In registration order.
    registrations: Vec<Registration>,
    order: Option<Rc<[Registration]>>,
    related: HashMap<SubjectId, SubjectId, ListRandomState>,
    reentrant: usize,
    wave: Option<Wave>,
}

impl PublisherState {
    fn effective(&self, listener: SubjectId) -> SubjectId {
        self.related.get(&listener).copied().unwrap_or(listener)
    }

    /// Recomputes the notification order from the registrations.
    ///
    /// On a cycle the previous order is kept.
    fn rebuild(&mut self) -> Result<(), PublisherError> {
        let edges: Vec<_> = self
            .registrations
            .iter()
            .map(|registration| (registration.subject, self.effective(registration.listener)))
            .collect();
        match ordering::dependency_order(&edges) {
            Ok(order) => {
                debug!(registrations = edges.len(), "rebuilt listener order");
                self.order = Some(
                    order
                        .into_iter()
                        .map(|edge| self.registrations[edge].clone())
                        .collect(),
                );
                Ok(())
            }
            Err(remaining) => {
                warn!(?remaining, "listener registration would create a cycle");
                Err(PublisherError::Cycle { remaining })
            }
        }
    }

    fn order(&self) -> Rc<[Registration]> {
        self.order.clone().unwrap_or_else(|| Rc::new([]))
    }
}

/// Registry of listeners for one pipeline of lists.
///
/// A publisher is shared by reference (usually through an `Rc`) between every list of a pipeline.
/// It is not thread-safe; the whole pipeline is expected to be driven from one thread at a time.
pub struct EventPublisher {
    options: PublisherOptions,
    state: RefCell<PublisherState>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::with_options(PublisherOptions::default())
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let order: Vec<_> = state
            .order()
            .iter()
            .map(|registration| (registration.subject, registration.listener))
            .collect();
        f.debug_struct("EventPublisher")
            .field("options", &self.options)
            .field("order", &order)
            .field("related", &state.related)
            .finish_non_exhaustive()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PublisherOptions) -> Self {
        Self {
            options,
            state: RefCell::new(PublisherState::default()),
        }
    }

    pub fn options(&self) -> PublisherOptions {
        self.options
    }

    /// Registers `listener` for events of `subject`, delivered through `format`.
    ///
    /// Fails, leaving the registry unchanged, if the registration creates a dependency cycle.
    /// A registration added while events are being delivered is first notified in the next wave.
    pub fn add_listener(
        &self,
        subject: SubjectId,
        listener: SubjectId,
        format: Rc<dyn EventFormat>,
    ) -> Result<(), PublisherError> {
        let mut state = self.state.borrow_mut();
        state.registrations.push(Registration {
            subject,
            listener,
            format,
            live: Rc::new(Cell::new(true)),
        });
        if let Err(e) = state.rebuild() {
            state.registrations.pop();
            return Err(e);
        }
        debug!(%subject, %listener, "added listener");
        Ok(())
    }

    /// Removes the first registration of `listener` on `subject`.
    ///
    /// The listener is not notified anymore, even by a wave that is already in progress.
    pub fn remove_listener(
        &self,
        subject: SubjectId,
        listener: SubjectId,
    ) -> Result<(), PublisherError> {
        let mut state = self.state.borrow_mut();
        let Some(position) = state.registrations.iter().position(|registration| {
            registration.subject == subject && registration.listener == listener
        }) else {
            if self.options.strict_listener_removal {
                return Err(PublisherError::UnknownListener { subject, listener });
            }
            debug!(%subject, %listener, "ignoring removal of unknown listener");
            return Ok(());
        };
        let removed = state.registrations.remove(position);
        removed.live.set(false);
        debug!(%subject, %listener, "removed listener");
        state.rebuild()
    }

    /// Orders `listener` as if it were `related`.
    ///
    /// Use this when a listener is a helper object that forwards events to the list `related`, so
    /// that the listeners of `related` are notified after it. Fails, leaving the registry
    /// unchanged, if this creates a dependency cycle.
    pub fn set_related_subject(
        &self,
        listener: SubjectId,
        related: SubjectId,
    ) -> Result<(), PublisherError> {
        self.update_related(listener, Some(related))
    }

    /// Undoes [`EventPublisher::set_related_subject`].
    pub fn clear_related_subject(&self, listener: SubjectId) -> Result<(), PublisherError> {
        self.update_related(listener, None)
    }

    fn update_related(
        &self,
        listener: SubjectId,
        related: Option<SubjectId>,
    ) -> Result<(), PublisherError> {
        let mut state = self.state.borrow_mut();
        let previous = match related {
            Some(related) => state.related.insert(listener, related),
            None => state.related.remove(&listener),
        };
        if let Err(e) = state.rebuild() {
            match previous {
                Some(previous) => state.related.insert(listener, previous),
                None => state.related.remove(&listener),
            };
            return Err(e);
        }
        Ok(())
    }

    /// The listeners registered on `subject`, in registration order.
    pub fn listeners(&self, subject: SubjectId) -> Vec<SubjectId> {
        self.state
            .borrow()
            .registrations
            .iter()
            .filter(|registration| registration.subject == subject)
            .map(|registration| registration.listener)
            .collect()
    }

    /// The registrations in notification order.
    pub fn notification_order(&self) -> Vec<(SubjectId, SubjectId)> {
        self.state
            .borrow()
            .order()
            .iter()
            .map(|registration| (registration.subject, registration.listener))
            .collect()
    }

    /// Returns whether a notification wave is in progress.
    pub fn is_firing(&self) -> bool {
        self.state.borrow().reentrant > 0
    }

    /// Notifies every listener of `subject`.
    ///
    /// When called from within a listener, the listeners are only marked as pending and the call
    /// returns immediately; the outermost call delivers them. Errors returned by listeners do not
    /// stop the wave. The first one is returned once every listener has been notified and every
    /// `post_event` cleanup has run.
    pub fn fire_event(
        &self,
        subject: SubjectId,
        format: Rc<dyn EventFormat>,
    ) -> Result<(), ListenerError> {
        {
            let mut state = self.state.borrow_mut();
            if state.reentrant == 0 {
                let order = state.order();
                state.wave = Some(Wave::new(order));
            }
            state.reentrant += 1;
            if let Some(wave) = state.wave.as_mut() {
                wave.enqueue(subject, format);
            }
            if state.reentrant > 1 {
                trace!(%subject, "queued nested event");
                state.reentrant -= 1;
                return Ok(());
            }
        }

        loop {
            self.drain();
            let fired = {
                let mut state = self.state.borrow_mut();
                state
                    .wave
                    .as_mut()
                    .map(|wave| std::mem::take(&mut wave.fired))
                    .unwrap_or_default()
            };
            if fired.is_empty() {
                break;
            }
            for (subject, format) in fired {
                format.post_event(subject);
            }
        }

        let mut state = self.state.borrow_mut();
        state.reentrant -= 1;
        let Some(wave) = state.wave.take() else {
            return Ok(());
        };
        if wave.stale > 0 {
            state.registrations.retain(|registration| registration.live.get());
            debug!(stale = wave.stale, "dropped stale listeners");
            // dropping registrations never introduces a cycle
            state.rebuild().ok();
        }
        match wave.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Notifies pending listeners in order until none is left.
    fn drain(&self) {
        loop {
            let registration = {
                let mut state = self.state.borrow_mut();
                let Some(registration) = state.wave.as_mut().and_then(Wave::take_next) else {
                    break;
                };
                registration
            };
            let Registration {
                subject,
                listener,
                format,
                live,
            } = registration;
            if !live.get() {
                continue;
            }
            if format.is_stale(subject, listener) {
                live.set(false);
                if let Some(wave) = self.state.borrow_mut().wave.as_mut() {
                    wave.stale += 1;
                }
                continue;
            }
            trace!(%subject, %listener, "notifying listener");
            if let Err(e) = format.fire(subject, listener) {
                warn!(%subject, %listener, error = %e, "listener failed");
                if let Some(wave) = self.state.borrow_mut().wave.as_mut() {
                    wave.error.get_or_insert(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Journal = Rc<RefCell<Vec<String>>>;

    /// Writes `"<listener> <- <subject>"` on fire and `"post <subject>"` on cleanup.
    struct Journaling {
        journal: Journal,
        names: Rc<HashMap<SubjectId, &'static str>>,
    }

    impl EventFormat for Journaling {
        fn fire(&self, subject: SubjectId, listener: SubjectId) -> Result<(), ListenerError> {
            self.journal
                .borrow_mut()
                .push(format!("{} <- {}", self.names[&listener], self.names[&subject]));
            Ok(())
        }

        fn post_event(&self, subject: SubjectId) {
            self.journal
                .borrow_mut()
                .push(format!("post {}", self.names[&subject]));
        }
    }

    fn setup<const N: usize>(
        names: [&'static str; N],
    ) -> ([SubjectId; N], Journal, Rc<Journaling>) {
        let ids: [SubjectId; N] = std::array::from_fn(|_| SubjectId::new());
        let journal = Journal::default();
        let journaling = Rc::new(Journaling {
            journal: Rc::clone(&journal),
            names: Rc::new(ids.iter().copied().zip(names).collect()),
        });
        (ids, journal, journaling)
    }

    #[test]
    fn subject_ids_are_unique() {
        let a = SubjectId::new();
        let b = SubjectId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("#{}", a.get()));
    }

    #[test]
    fn fires_only_listeners_of_the_subject() {
        let ([a, b, x, y], journal, journaling) = setup(["a", "b", "x", "y"]);
        let publisher = EventPublisher::new();
        publisher.add_listener(a, x, journaling.clone()).unwrap();
        publisher.add_listener(b, y, journaling.clone()).unwrap();
        publisher.fire_event(a, journaling).unwrap();
        assert_eq!(*journal.borrow(), ["x <- a", "post a"]);
    }

    #[test]
    fn cycle_keeps_previous_order() {
        let ([a, b], _, journaling) = setup(["a", "b"]);
        let publisher = EventPublisher::new();
        publisher.add_listener(a, b, journaling.clone()).unwrap();
        let error = publisher.add_listener(b, a, journaling).unwrap_err();
        assert_eq!(
            error,
            PublisherError::Cycle {
                remaining: vec![(a, b), (b, a)]
            }
        );
        assert!(publisher.listeners(b).is_empty());
        assert_eq!(publisher.notification_order(), [(a, b)]);
    }

    #[test]
    fn related_subject_cycle_is_rolled_back() {
        let ([a, b, helper], _, journaling) = setup(["a", "b", "helper"]);
        let publisher = EventPublisher::new();
        publisher.add_listener(a, b, journaling.clone()).unwrap();
        publisher.add_listener(b, helper, journaling).unwrap();
        assert!(publisher.set_related_subject(helper, a).is_err());
        publisher.set_related_subject(helper, b).unwrap_err();
        assert_eq!(publisher.notification_order(), [(a, b), (b, helper)]);
        publisher.clear_related_subject(helper).unwrap();
    }

    #[test]
    fn strict_removal_reports_unknown_listeners() {
        let ([a, b], _, _) = setup(["a", "b"]);
        let lenient = EventPublisher::new();
        assert_eq!(lenient.remove_listener(a, b), Ok(()));
        let strict =
            EventPublisher::with_options(PublisherOptions::default().with_strict_listener_removal(true));
        assert_eq!(
            strict.remove_listener(a, b),
            Err(PublisherError::UnknownListener {
                subject: a,
                listener: b
            })
        );
    }
}
