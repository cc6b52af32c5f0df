// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A `Vec` that publishes its changes.
//!
//! [`ObservableVec`] is the simplest possible collaborator of an [`EventAssembler`]: every
//! mutating method is one atomic operation, and [`ObservableVec::batch`] composes several of them
//! into one event.
//!
//! ```
//! use listdelta::{EventPublisher, ObservableVec, RecordingListener, SubjectId};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let list = ObservableVec::from_vec(Rc::new(EventPublisher::new()), vec!['A', 'A', 'B', 'B', 'C', 'C']);
//! let recorder = Rc::new(RefCell::new(RecordingListener::new()));
//! list.add_listener(SubjectId::new(), Rc::clone(&recorder))?;
//!
//! list.retain(|c| *c == 'B')?;
//!
//! assert_eq!(list.to_vec(), ['B', 'B']);
//! assert_eq!(recorder.borrow().changes_seen, ["[delete 0..=1, delete 2..=3]"]);
//! # Ok::<(), listdelta::EventError>(())
//! ```
//!
//! The list uses interior mutability so that listeners can read it, or change it again, while an
//! event is being delivered. Share it through an `Rc`.

use crate::{
    AssemblerOptions, EventAssembler, EventError, EventPublisher, ListEventListener, SubjectId,
};
use std::{cell::RefCell, cmp::Ordering, fmt, rc::Rc};

pub struct ObservableVec<E> {
    items: RefCell<Vec<E>>,
    assembler: EventAssembler<E>,
}

impl<E: fmt::Debug> fmt::Debug for ObservableVec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("subject", &self.assembler.subject())
            .field("items", &self.items.borrow())
            .finish()
    }
}

fn check_index(index: usize, len: usize) -> Result<(), EventError> {
    if index < len {
        Ok(())
    } else {
        Err(EventError::IndexOutOfBounds { index, len })
    }
}

impl<E: Clone + PartialEq + 'static> ObservableVec<E> {
    pub fn new(publisher: Rc<EventPublisher>) -> Self {
        Self::from_vec(publisher, Vec::new())
    }

    /// Wraps `items` without publishing anything.
    pub fn from_vec(publisher: Rc<EventPublisher>, items: Vec<E>) -> Self {
        Self::with_options(publisher, items, AssemblerOptions::default())
    }

    pub fn with_options(
        publisher: Rc<EventPublisher>,
        items: Vec<E>,
        options: AssemblerOptions,
    ) -> Self {
        Self {
            items: RefCell::new(items),
            assembler: EventAssembler::with_options(SubjectId::new(), publisher, options),
        }
    }

    pub fn subject(&self) -> SubjectId {
        self.assembler.subject()
    }

    pub fn assembler(&self) -> &EventAssembler<E> {
        &self.assembler
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<E> {
        self.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.items.borrow().clone()
    }

    /// Runs `change` as one atomic operation.
    ///
    /// The items are not borrowed while listeners run.
    fn atomically<R>(
        &self,
        change: impl FnOnce(&mut Vec<E>, &EventAssembler<E>) -> Result<R, EventError>,
    ) -> Result<R, EventError> {
        self.assembler.begin_event(true)?;
        let result = {
            let mut items = self.items.borrow_mut();
            change(&mut items, &self.assembler)
        };
        match result {
            Ok(value) => {
                self.assembler.commit_event()?;
                Ok(value)
            }
            Err(e) => {
                self.assembler.discard_event()?;
                Err(e)
            }
        }
    }

    pub fn push(&self, value: E) -> Result<(), EventError> {
        self.atomically(|items, assembler| {
            items.push(value.clone());
            assembler.element_inserted(items.len() - 1, value)
        })
    }

    pub fn insert(&self, index: usize, value: E) -> Result<(), EventError> {
        self.insert_all(index, [value])
    }

    pub fn insert_all(
        &self,
        index: usize,
        values: impl IntoIterator<Item = E>,
    ) -> Result<(), EventError> {
        self.atomically(|items, assembler| {
            check_index(index, items.len() + 1)?;
            for (offset, value) in values.into_iter().enumerate() {
                items.insert(index + offset, value.clone());
                assembler.element_inserted(index + offset, value)?;
            }
            Ok(())
        })
    }

    /// Replaces the element at `index` and returns the previous one.
    pub fn set(&self, index: usize, value: E) -> Result<E, EventError> {
        self.atomically(|items, assembler| {
            check_index(index, items.len())?;
            let old = std::mem::replace(&mut items[index], value.clone());
            assembler.element_updated(index, old.clone(), value)?;
            Ok(old)
        })
    }

    pub fn remove(&self, index: usize) -> Result<E, EventError> {
        self.atomically(|items, assembler| {
            check_index(index, items.len())?;
            let old = items.remove(index);
            assembler.element_deleted(index, old.clone())?;
            Ok(old)
        })
    }

    /// Removes every element for which `keep` returns false, front to back, and returns how many
    /// were removed.
    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> Result<usize, EventError> {
        self.atomically(|items, assembler| {
            let mut index = 0;
            let mut removed = 0;
            while index < items.len() {
                if keep(&items[index]) {
                    index += 1;
                } else {
                    assembler.element_deleted(index, items.remove(index))?;
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    pub fn clear(&self) -> Result<(), EventError> {
        self.atomically(|items, assembler| {
            for old in items.drain(..) {
                assembler.element_deleted(0, old)?;
            }
            Ok(())
        })
    }

    /// Sorts the list (stably) and publishes the permutation as a reordering.
    pub fn sort_by(&self, mut compare: impl FnMut(&E, &E) -> Ordering) -> Result<(), EventError> {
        self.atomically(|items, assembler| {
            if !assembler.is_event_empty() {
                return Err(EventError::ReorderWithPendingEdits);
            }
            let mut map: Vec<usize> = (0..items.len()).collect();
            map.sort_by(|&a, &b| compare(&items[a], &items[b]));
            if map.iter().enumerate().all(|(to, &from)| to == from) {
                return Ok(());
            }
            let sorted = map.iter().map(|&from| items[from].clone()).collect();
            *items = sorted;
            assembler.reorder(&map)
        })
    }

    /// Runs `operations` as one atomic operation.
    ///
    /// Every change made by `operations` is published as a single event once it returns `Ok`.
    /// On error nothing is published, but the list keeps the changes already made.
    pub fn batch<R>(
        &self,
        operations: impl FnOnce(&Self) -> Result<R, EventError>,
    ) -> Result<R, EventError> {
        self.assembler.begin_event(true)?;
        match operations(self) {
            Ok(value) => {
                self.assembler.commit_event()?;
                Ok(value)
            }
            Err(e) => {
                self.assembler.discard_event()?;
                Err(e)
            }
        }
    }

    pub fn add_listener<L>(&self, id: SubjectId, listener: Rc<RefCell<L>>) -> Result<(), EventError>
    where
        L: ListEventListener<E> + 'static,
    {
        self.assembler.add_listener(id, listener)
    }

    pub fn add_weak_listener<L>(
        &self,
        id: SubjectId,
        listener: &Rc<RefCell<L>>,
    ) -> Result<(), EventError>
    where
        L: ListEventListener<E> + 'static,
    {
        self.assembler.add_weak_listener(id, listener)
    }

    pub fn remove_listener(&self, id: SubjectId) -> Result<(), EventError> {
        self.assembler.remove_listener(id)
    }
}
