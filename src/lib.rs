// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # listdelta: Minimal Change Events for Observable Lists
//!
//! This crate records how a list changed during one atomic operation, compresses the individual
//! insertions, updates and deletions into a minimal sequence of [`Block`]s, and delivers the
//! result to every dependent observer in an order that respects the dependencies between them.
//!
//! It is the event core of an observable-collection library: the lists themselves (sorted,
//! filtered, transformed views) are collaborators built on top of it. [`ObservableVec`] is the
//! simplest such collaborator and is included as a reference.
//!
//! ## Core Concepts
//!
//! - An **edit** ([`Edit`]) is a single insert, update or delete at an index.
//! - A **block** ([`Block`]) is a maximal run of edits of the same kind over contiguous indices
//!   that share their old and new value. The indices of a block are relative to the list after
//!   every earlier block has been applied.
//! - An **atomic operation** is everything between [`EventAssembler::begin_event`] and the
//!   matching [`EventAssembler::commit_event`]. Operations may nest; only the outermost one
//!   publishes.
//! - A **change event** ([`ChangeEvent`]) is the cursor listeners use to walk the blocks of one
//!   atomic operation, element by element or block by block.
//!
//! ## Recording Edits
//!
//! Edits are reported in the coordinates of the list as it is at the time of the call, so callers
//! can report them as they happen. Most operations append or remove in index order; those are
//! recorded in an [`ElementaryEditLog`] by index arithmetic alone. Anything else moves the
//! operation to a [`DeltaTree`], a balanced tree that tracks both the list before the operation
//! and the list after every edit so far, and so renumbers later edits as earlier ones shift the
//! list.
//!
//! Edits cancel out where they can: inserting an element and deleting it again within one
//! operation leaves no trace, and an operation whose edits all cancel out publishes nothing.
//!
//! ## Propagation
//!
//! Lists that observe other lists form a dependency graph, held by an [`EventPublisher`] shared by
//! every list of a pipeline. The publisher notifies listeners in topological order, so a list is
//! never notified before every list it depends on has processed the same change. Listeners may
//! change other lists while being notified; those changes are delivered in the same wave.
//!
//! ## Getting Started
//!
//! ```rust
//! use listdelta::{ChangeEvent, EventPublisher, ListenerError, ObservableVec, SubjectId};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let publisher = Rc::new(EventPublisher::new());
//! let source = Rc::new(ObservableVec::from_vec(Rc::clone(&publisher), vec![1, 2, 3]));
//! let doubled = Rc::new(ObservableVec::from_vec(Rc::clone(&publisher), vec![2, 4, 6]));
//!
//! // `doubled` follows `source`. Registering it under its own subject id places its listeners
//! // after it in the notification order.
//! let target = Rc::clone(&doubled);
//! let follow = move |event: &mut ChangeEvent<i32>| -> Result<(), ListenerError> {
//!     let mut doubled_event = Vec::new();
//!     for block in event.blocks() {
//!         let double = |value: Option<&i32>| value.map(|v| v * 2);
//!         doubled_event.push(listdelta::Block::new(
//!             block.kind(),
//!             block.start(),
//!             block.len(),
//!             double(block.old_value()),
//!             double(block.new_value()),
//!         ));
//!     }
//!     let mut items = target.to_vec();
//!     let event = ChangeEvent::from_blocks(doubled_event);
//!     event.apply_to(&mut items)?;
//!     target.batch(|list| {
//!         list.clear()?;
//!         list.insert_all(0, items)
//!     })?;
//!     Ok(())
//! };
//! source.add_listener(doubled.subject(), Rc::new(RefCell::new(follow)))?;
//!
//! source.insert_all(1, [10, 11])?;
//! assert_eq!(doubled.to_vec(), [2, 20, 22, 4, 6]);
//! # Ok::<(), listdelta::EventError>(())
//! ```
//!
//! ## Features
//!
//! - `serde`: Provides `serde` support for edits, blocks, subject identifiers and options.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for [`ChangeKind`] and
//!   [`test_util::EditScript`], useful for property-based testing.
//!
//! ## License
//!
//! This project is licensed under either of
//!
//! - Apache License, Version 2.0 (<http://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license (<http://opensource.org/licenses/MIT>)
//!
//! at your option.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

mod change;
pub use change::{Block, ChangeKind, Edit};
mod edit_log;
pub use edit_log::ElementaryEditLog;
mod delta_tree;
pub use delta_tree::DeltaTree;
mod event;
pub use event::ChangeEvent;
mod assembler;
pub use assembler::{EventAssembler, EventTransaction};
mod publisher;
pub use publisher::{EventFormat, EventPublisher, SubjectId};
mod listener;
pub use listener::{ListEventListener, RecordingListener};
mod list;
pub use list::ObservableVec;
mod options;
pub use options::{AssemblerOptions, PublisherOptions};
mod error;
pub use error::{EventError, ListenerError, PublisherError};
/// Edit scripts for property-based testing.
#[cfg(any(test, feature = "arbitrary"))]
pub mod test_util;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes all hash maps use a fixed seed.
///
/// This should only be enabled for testing and benchmarking, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

fn create_map<K, V>() -> std::collections::HashMap<K, V, ListRandomState> {
    std::collections::HashMap::with_hasher(ListRandomState::default())
}

/// The hasher of every map in this crate.
///
/// Falls back to a fixed seed once [`enable_determinism`] has been called.
#[derive(Clone)]
pub struct ListRandomState {
    inner: RandomState,
}

impl Default for ListRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for ListRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}
