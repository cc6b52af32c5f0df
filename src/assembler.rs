// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # EventAssembler
//!
//! An [`EventAssembler`] collects the edits a list makes during one atomic operation and, once the
//! operation is committed, hands them to the [`EventPublisher`] as a single [`ChangeEvent`].
//!
//! ```
//! use listdelta::{EventAssembler, EventPublisher, RecordingListener, SubjectId};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let publisher = Rc::new(EventPublisher::new());
//! let assembler = EventAssembler::<char>::new(SubjectId::new(), Rc::clone(&publisher));
//! let recorder = Rc::new(RefCell::new(RecordingListener::new()));
//! assembler.add_listener(SubjectId::new(), Rc::clone(&recorder))?;
//!
//! // [A, D, E] becomes [A, B, C, D, E]
//! assembler.begin_event(false)?;
//! assembler.element_inserted(1, 'B')?;
//! assembler.element_inserted(2, 'C')?;
//! assembler.commit_event()?;
//!
//! assert_eq!(recorder.borrow().changes_seen, ["[insert 1, insert 2]"]);
//! # Ok::<(), listdelta::EventError>(())
//! ```
//!
//! ## Nesting
//!
//! An operation may call other operations on the same list, each with its own
//! [`EventAssembler::begin_event`] / [`EventAssembler::commit_event`] pair. Only the outermost
//! commit publishes. The outer call decides whether nesting is allowed at all; an inner begin
//! that is not allowed fails with [`EventError::ConcurrentModification`]. Inside a nested
//! operation an element may be changed more than once, and the event keeps the first old value
//! and the last new value.
//!
//! ## Fast path and tree
//!
//! Edits are first recorded in an [`ElementaryEditLog`]. The first edit it cannot take moves
//! everything into a [`DeltaTree`], which is used for the rest of the operation and for later
//! operations until [`EventAssembler::use_fast_path`] turns the log back on.

use crate::{
    AssemblerOptions, Block, ChangeEvent, ChangeKind, DeltaTree, ElementaryEditLog, EventError,
    EventFormat, EventPublisher, ListEventListener, ListenerError, SubjectId,
    event::EventStorage,
};
use smallvec::SmallVec;
use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
    thread::{self, ThreadId},
};
use tracing::{debug, warn};

/// Pending edits of one list.
struct EventState<E> {
    options: AssemblerOptions,
    log: ElementaryEditLog<E>,
    tree: DeltaTree<E>,
    /// The edits of the current operation live in the tree rather than the log.
    in_tree: bool,
    reorder: Option<Rc<[usize]>>,
    /// A reorder was recorded in this operation. Later edits may overwrite its edits.
    reordered: bool,
    /// One entry per open `begin_event`, holding whether it allows nested events.
    frames: SmallVec<[bool; 4]>,
    owner: Option<ThreadId>,
    /// The publisher is delivering this list's event.
    publishing: bool,
    /// A listener has been handed the event being delivered.
    delivered: bool,
    /// Edits made since the last listener was handed the event.
    late: DeltaTree<E>,
    blocks: Option<Rc<[Block<E>]>>,
}

impl<E: Clone + PartialEq> EventState<E> {
    fn new(options: AssemblerOptions) -> Self {
        Self {
            options,
            log: ElementaryEditLog::new(),
            tree: DeltaTree::new(),
            in_tree: !options.fast_path,
            reorder: None,
            reordered: false,
            frames: SmallVec::new(),
            owner: None,
            publishing: false,
            delivered: false,
            late: DeltaTree::new(),
            blocks: None,
        }
    }

    fn storage(&self) -> EventStorage<'_, E> {
        if self.in_tree {
            EventStorage::Tree(&self.tree)
        } else {
            EventStorage::Log(&self.log)
        }
    }

    fn is_empty(&self) -> bool {
        self.reorder.is_none() && self.storage().is_empty()
    }

    fn require_event(&self, operation: &'static str) -> Result<(), EventError> {
        if self.frames.is_empty() {
            return Err(EventError::NotInEvent { operation });
        }
        Ok(())
    }

    fn allow_contradictions(&mut self) {
        let allow = self.frames.len() > 1 || self.publishing || self.reordered;
        self.tree.set_allow_contradicting_events(allow);
        self.late.set_allow_contradicting_events(true);
    }

    /// The current blocks, computed at most once per batch of edits.
    fn materialize(&mut self) -> (Rc<[Block<E>]>, Option<Rc<[usize]>>) {
        let blocks = match &self.blocks {
            Some(blocks) => Rc::clone(blocks),
            None => {
                let blocks = self.storage().blocks();
                self.blocks = Some(Rc::clone(&blocks));
                blocks
            }
        };
        (blocks, self.reorder.clone())
    }

    /// Called before a listener is handed the event.
    fn deliver(&mut self) -> (Rc<[Block<E>]>, Option<Rc<[usize]>>) {
        self.delivered = true;
        self.late.reset();
        self.materialize()
    }

    fn record(
        &mut self,
        kind: ChangeKind,
        start: usize,
        end: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> Result<(), EventError> {
        let (old_value, new_value) = if self.options.track_values {
            (old_value, new_value)
        } else {
            (None, None)
        };
        let late = (self.publishing && self.delivered)
            .then(|| (old_value.clone(), new_value.clone()));
        if !self.in_tree && !self.log.accepts(kind, start, end) {
            self.escalate()?;
        }
        if self.in_tree {
            self.tree
                .target_change(kind, start, end, old_value, new_value)?;
        } else {
            self.log.add_change(kind, start, end, old_value, new_value);
        }
        self.blocks = None;
        if self.reorder.take().is_some() {
            debug!(%kind, start, "reorder combined with other edits, delivering plain edits");
        }
        if let Some((old_value, new_value)) = late {
            self.late
                .target_change(kind, start, end, old_value, new_value)?;
        }
        Ok(())
    }

    /// Moves the logged edits into the tree and stops using the log.
    fn escalate(&mut self) -> Result<(), EventError> {
        debug!(
            blocks = self.log.blocks().len(),
            "edit log cannot take the change, switching to the delta tree"
        );
        self.tree.reset();
        self.tree.add_all(&self.log)?;
        self.log.reset();
        self.in_tree = true;
        self.options.fast_path = false;
        Ok(())
    }

    /// Forgets the current operation.
    fn clear(&mut self) {
        self.log.reset();
        self.tree.reset();
        self.late.reset();
        self.in_tree = !self.options.fast_path;
        self.reorder = None;
        self.reordered = false;
        self.blocks = None;
        self.publishing = false;
        self.delivered = false;
        if self.frames.is_empty() {
            self.owner = None;
        }
        self.allow_contradictions();
    }

    /// Ends the delivery of the current event.
    ///
    /// Edits made after the last listener was handed the event have not been seen by anyone.
    /// They become the pending event, and `true` is returned so that it is delivered as well.
    fn finish_delivery(&mut self) -> bool {
        if self.late.is_empty() {
            self.clear();
            return false;
        }
        self.tree = std::mem::take(&mut self.late);
        self.log.reset();
        self.in_tree = true;
        self.blocks = None;
        self.delivered = false;
        self.allow_contradictions();
        true
    }
}

struct Shared<E> {
    state: RefCell<EventState<E>>,
    /// Handed to every listener in turn.
    cursor: RefCell<ChangeEvent<E>>,
}

impl<E: Clone + PartialEq> Shared<E> {
    fn deliver<L>(&self, listener: &RefCell<L>) -> Result<(), ListenerError>
    where
        L: ListEventListener<E> + ?Sized,
    {
        let (blocks, reorder) = self.state.borrow_mut().deliver();
        let mut cursor = self.cursor.try_borrow_mut()?;
        cursor.refresh(blocks, reorder);
        listener.try_borrow_mut()?.list_changed(&mut cursor)
    }
}

enum ListenerRef<L: ?Sized> {
    Strong(Rc<RefCell<L>>),
    Weak(Weak<RefCell<L>>),
}

impl<L: ?Sized> ListenerRef<L> {
    fn get(&self) -> Option<Rc<RefCell<L>>> {
        match self {
            ListenerRef::Strong(listener) => Some(Rc::clone(listener)),
            ListenerRef::Weak(listener) => listener.upgrade(),
        }
    }
}

/// Delivers the events of one assembler to one listener.
struct ListenerFormat<E, L: ?Sized> {
    shared: Weak<Shared<E>>,
    listener: ListenerRef<L>,
}

impl<E, L> EventFormat for ListenerFormat<E, L>
where
    E: Clone + PartialEq,
    L: ListEventListener<E> + ?Sized,
{
    fn fire(&self, _subject: SubjectId, _listener: SubjectId) -> Result<(), ListenerError> {
        let (Some(shared), Some(listener)) = (self.shared.upgrade(), self.listener.get()) else {
            return Ok(());
        };
        shared.deliver(&listener)
    }

    fn is_stale(&self, _subject: SubjectId, _listener: SubjectId) -> bool {
        self.shared.strong_count() == 0 || self.listener.get().is_none()
    }
}

/// Clears the pending edits once the event has been delivered to everyone, and fires a follow-up
/// event for edits nobody has seen.
struct CleanupFormat<E> {
    shared: Weak<Shared<E>>,
    publisher: Weak<EventPublisher>,
}

impl<E: Clone + PartialEq + 'static> EventFormat for CleanupFormat<E> {
    fn fire(&self, _subject: SubjectId, _listener: SubjectId) -> Result<(), ListenerError> {
        Ok(())
    }

    fn post_event(&self, subject: SubjectId) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if !shared.state.borrow_mut().finish_delivery() {
            return;
        }
        let Some(publisher) = self.publisher.upgrade() else {
            shared.state.borrow_mut().clear();
            return;
        };
        debug!(%subject, "edits made after delivery, firing a follow-up event");
        let follow_up = Rc::new(CleanupFormat {
            shared: Rc::downgrade(&shared),
            publisher: Rc::downgrade(&publisher),
        });
        // still inside the wave, so this only queues the listeners again
        if let Err(e) = publisher.fire_event(subject, follow_up) {
            warn!(%subject, error = %e, "follow-up event failed");
        }
    }
}

/// Collects the edits of one list into change events.
pub struct EventAssembler<E> {
    subject: SubjectId,
    publisher: Rc<EventPublisher>,
    shared: Rc<Shared<E>>,
}

impl<E> fmt::Debug for EventAssembler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAssembler")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl<E> EventAssembler<E> {
    /// The identity of the list this assembler collects edits for.
    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn publisher(&self) -> &Rc<EventPublisher> {
        &self.publisher
    }

    pub fn options(&self) -> AssemblerOptions {
        self.shared.state.borrow().options
    }
}

impl<E: Clone + PartialEq + 'static> EventAssembler<E> {
    pub fn new(subject: SubjectId, publisher: Rc<EventPublisher>) -> Self {
        Self::with_options(subject, publisher, AssemblerOptions::default())
    }

    pub fn with_options(
        subject: SubjectId,
        publisher: Rc<EventPublisher>,
        options: AssemblerOptions,
    ) -> Self {
        Self {
            subject,
            publisher,
            shared: Rc::new(Shared {
                state: RefCell::new(EventState::new(options)),
                cursor: RefCell::new(ChangeEvent::default()),
            }),
        }
    }

    /// Opens an atomic operation.
    ///
    /// `allow_nested` states whether another `begin_event` may be called before the matching
    /// commit. It does not relax the contradiction check: an element may only be changed twice
    /// once a nested operation is actually open (or while the list's event is being delivered).
    /// Fails with [`EventError::ConcurrentModification`] if an operation is already open and did
    /// not allow nesting, or was opened by another thread.
    pub fn begin_event(&self, allow_nested: bool) -> Result<(), EventError> {
        let mut state = self.shared.state.borrow_mut();
        let current = thread::current().id();
        let nesting_allowed = state.frames.last().is_none_or(|&allowed| allowed);
        if let Some(owner) = state.owner.filter(|&owner| owner != current || !nesting_allowed) {
            return Err(EventError::ConcurrentModification { owner });
        }
        state.owner = Some(current);
        state.frames.push(allow_nested);
        state.allow_contradictions();
        Ok(())
    }

    /// Closes the innermost atomic operation.
    ///
    /// Closing the outermost one publishes the collected edits, unless there are none. Returns
    /// the first error raised by a listener, after every listener has been notified.
    ///
    /// While this list's own event is being delivered, the edits join that event and reach the
    /// listeners that have not been notified yet. Edits made after its last listener was notified
    /// are delivered as a follow-up event in the same wave.
    pub fn commit_event(&self) -> Result<(), EventError> {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.frames.pop().is_none() {
                return Err(EventError::NotInEvent {
                    operation: "commit_event",
                });
            }
            state.allow_contradictions();
            if !state.frames.is_empty() || state.publishing {
                // the wave that is delivering this list picks up the new edits
                return Ok(());
            }
            if state.is_empty() {
                state.clear();
                return Ok(());
            }
            state.publishing = true;
        }
        let cleanup = Rc::new(CleanupFormat {
            shared: Rc::downgrade(&self.shared),
            publisher: Rc::downgrade(&self.publisher),
        });
        self.publisher
            .fire_event(self.subject, cleanup)
            .map_err(EventError::Listener)
    }

    /// Closes the innermost atomic operation without publishing it.
    ///
    /// Closing the outermost one drops every edit collected since it was opened. Edits of a
    /// discarded nested operation stay part of the enclosing one.
    pub fn discard_event(&self) -> Result<(), EventError> {
        let mut state = self.shared.state.borrow_mut();
        if state.frames.pop().is_none() {
            return Err(EventError::NotInEvent {
                operation: "discard_event",
            });
        }
        state.allow_contradictions();
        if state.frames.is_empty() && !state.publishing {
            state.clear();
        }
        Ok(())
    }

    /// Opens an atomic operation that is discarded unless committed.
    pub fn transact(&self, allow_nested: bool) -> Result<EventTransaction<'_, E>, EventError> {
        self.begin_event(allow_nested)?;
        Ok(EventTransaction {
            assembler: self,
            open: true,
        })
    }

    /// Records a change over `start..end`, in the coordinates of the list after every edit
    /// recorded so far.
    pub fn add_change(
        &self,
        kind: ChangeKind,
        start: usize,
        end: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> Result<(), EventError> {
        let mut state = self.shared.state.borrow_mut();
        state.require_event("add_change")?;
        if start >= end {
            return Ok(());
        }
        state.record(kind, start, end, old_value, new_value)
    }

    pub fn element_inserted(&self, index: usize, new_value: E) -> Result<(), EventError> {
        self.add_change(ChangeKind::Insert, index, index + 1, None, Some(new_value))
    }

    pub fn element_updated(
        &self,
        index: usize,
        old_value: E,
        new_value: E,
    ) -> Result<(), EventError> {
        self.add_change(
            ChangeKind::Update,
            index,
            index + 1,
            Some(old_value),
            Some(new_value),
        )
    }

    pub fn element_deleted(&self, index: usize, old_value: E) -> Result<(), EventError> {
        self.add_change(ChangeKind::Delete, index, index + 1, Some(old_value), None)
    }

    /// Records a pure reordering: the element now at `i` was at `map[i]`.
    ///
    /// The event also describes the reordering as every element deleted and inserted again, so
    /// listeners that ignore [`ChangeEvent::is_reordering`] still see a correct (if coarse)
    /// change. Element values are not tracked for these edits. A reordering of an empty list is a
    /// no-op.
    pub fn reorder(&self, map: &[usize]) -> Result<(), EventError> {
        let mut state = self.shared.state.borrow_mut();
        state.require_event("reorder")?;
        if map.is_empty() {
            return Ok(());
        }
        if !state.is_empty() {
            return Err(EventError::ReorderWithPendingEdits);
        }
        let len = map.len();
        let mut seen = vec![false; len];
        for &from in map {
            if from >= len || std::mem::replace(&mut seen[from], true) {
                return Err(EventError::InvalidReorderMap { len });
            }
        }
        state.record(ChangeKind::Delete, 0, len, None, None)?;
        state.record(ChangeKind::Insert, 0, len, None, None)?;
        state.reorder = Some(map.into());
        state.reordered = true;
        state.allow_contradictions();
        Ok(())
    }

    /// Re-publishes `event` as an atomic operation of this list.
    ///
    /// A reordering is forwarded as such if nothing else is pending here.
    pub fn forward_event(&self, event: &ChangeEvent<E>) -> Result<(), EventError> {
        self.begin_event(true)?;
        let replayed = if event.is_reordering() && self.is_event_empty() {
            self.reorder(event.reorder_map())
        } else {
            event.blocks().iter().try_for_each(|block| {
                self.add_change(
                    block.kind(),
                    block.start(),
                    block.end() + 1,
                    block.old_value().cloned(),
                    block.new_value().cloned(),
                )
            })
        };
        match replayed {
            Ok(()) => self.commit_event(),
            Err(e) => {
                self.discard_event()?;
                Err(e)
            }
        }
    }

    /// Returns whether the pending edits cancel out.
    pub fn is_event_empty(&self) -> bool {
        self.shared.state.borrow().is_empty()
    }

    /// Number of currently open atomic operations.
    pub fn nesting_depth(&self) -> usize {
        self.shared.state.borrow().frames.len()
    }

    /// Turns the edit log on or off for subsequent operations.
    pub fn use_fast_path(&self, enabled: bool) {
        let mut state = self.shared.state.borrow_mut();
        state.options.fast_path = enabled;
        if state.is_empty() {
            state.in_tree = !enabled;
        }
    }

    /// Notifies `listener` of every event of this list.
    ///
    /// `id` is the listener's identity in the publisher's dependency graph: the subject of the
    /// list it feeds, or a fresh [`SubjectId`] for a plain observer.
    pub fn add_listener<L>(&self, id: SubjectId, listener: Rc<RefCell<L>>) -> Result<(), EventError>
    where
        L: ListEventListener<E> + 'static,
    {
        self.register(id, ListenerRef::Strong(listener))
    }

    /// Like [`EventAssembler::add_listener`], but without keeping `listener` alive. The
    /// registration is dropped once the listener is.
    pub fn add_weak_listener<L>(
        &self,
        id: SubjectId,
        listener: &Rc<RefCell<L>>,
    ) -> Result<(), EventError>
    where
        L: ListEventListener<E> + 'static,
    {
        self.register(id, ListenerRef::Weak(Rc::downgrade(listener)))
    }

    fn register<L>(&self, id: SubjectId, listener: ListenerRef<L>) -> Result<(), EventError>
    where
        L: ListEventListener<E> + 'static,
    {
        let format = Rc::new(ListenerFormat {
            shared: Rc::downgrade(&self.shared),
            listener,
        });
        self.publisher.add_listener(self.subject, id, format)?;
        Ok(())
    }

    pub fn remove_listener(&self, id: SubjectId) -> Result<(), EventError> {
        self.publisher.remove_listener(self.subject, id)?;
        Ok(())
    }
}

/// An open atomic operation that is discarded unless committed.
#[must_use = "the operation is discarded when the transaction is dropped"]
pub struct EventTransaction<'a, E: Clone + PartialEq + 'static> {
    assembler: &'a EventAssembler<E>,
    open: bool,
}

impl<E: Clone + PartialEq + 'static> EventTransaction<'_, E> {
    pub fn assembler(&self) -> &EventAssembler<E> {
        self.assembler
    }

    pub fn commit(mut self) -> Result<(), EventError> {
        self.open = false;
        self.assembler.commit_event()
    }
}

impl<E: Clone + PartialEq + 'static> Drop for EventTransaction<'_, E> {
    fn drop(&mut self) {
        if self.open {
            self.assembler.discard_event().ok();
        }
    }
}
