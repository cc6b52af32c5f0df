// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # ChangeEvent
//!
//! A [`ChangeEvent`] is the cursor listeners receive when a list changes. It walks the block
//! sequence of one atomic operation either element by element ([`ChangeEvent::next`]) or block by
//! block ([`ChangeEvent::next_block`]).
//!
//! One cursor is shared by every listener of a list within a notification wave. The assembler
//! refreshes and rewinds it before each listener is called, so a listener always starts at the
//! beginning and must not hold on to the cursor past its callback. Use [`ChangeEvent::copy`] to
//! keep an independent snapshot.
//!
//! ## Mixing element and block iteration
//!
//! Calling [`ChangeEvent::next_block`] moves to the first element of the following block, even
//! if [`ChangeEvent::next`] has not visited every element of the current one. Those elements are
//! skipped for the rest of the pass.
//!
//! ```
//! # use listdelta::{Block, ChangeEvent, ChangeKind};
//! let mut event = ChangeEvent::from_blocks(vec![
//!     Block::new(ChangeKind::Insert, 0, 3, None, Some('x')),
//!     Block::new(ChangeKind::Delete, 5, 1, Some('y'), None),
//! ]);
//! assert!(event.next());
//! assert!(event.next_block());
//! assert_eq!(event.kind(), ChangeKind::Delete);
//! assert!(!event.next());
//! ```

use crate::{Block, ChangeKind, DeltaTree, Edit, ElementaryEditLog, EventError};
use std::{fmt, rc::Rc};

/// The two places the edits of an atomic operation can be recorded in.
pub(crate) enum EventStorage<'a, E> {
    Log(&'a ElementaryEditLog<E>),
    Tree(&'a DeltaTree<E>),
}

impl<E: Clone + PartialEq> EventStorage<'_, E> {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            EventStorage::Log(log) => log.is_empty(),
            EventStorage::Tree(tree) => tree.is_empty(),
        }
    }

    pub(crate) fn blocks(&self) -> Rc<[Block<E>]> {
        match self {
            EventStorage::Log(log) => log.blocks().into(),
            EventStorage::Tree(tree) => tree.blocks().into(),
        }
    }
}

/// Cursor over the blocks of one atomic operation.
#[derive(Debug)]
pub struct ChangeEvent<E> {
    blocks: Rc<[Block<E>]>,
    /// `reorder[new_index] == old_index`.
    reorder: Option<Rc<[usize]>>,
    /// `None` before the first step, `Some(blocks.len())` once exhausted.
    block: Option<usize>,
    offset: usize,
}

impl<E> Default for ChangeEvent<E> {
    fn default() -> Self {
        Self {
            blocks: Rc::new([]),
            reorder: None,
            block: None,
            offset: 0,
        }
    }
}

impl<E> Clone for ChangeEvent<E> {
    fn clone(&self) -> Self {
        Self {
            blocks: Rc::clone(&self.blocks),
            reorder: self.reorder.clone(),
            block: self.block,
            offset: self.offset,
        }
    }
}

impl<E> ChangeEvent<E> {
    /// Creates an event over an already canonical block sequence.
    pub fn from_blocks(blocks: Vec<Block<E>>) -> Self {
        Self {
            blocks: blocks.into(),
            ..Self::default()
        }
    }

    /// Replaces the content of this cursor and rewinds it.
    pub(crate) fn refresh(&mut self, blocks: Rc<[Block<E>]>, reorder: Option<Rc<[usize]>>) {
        self.blocks = blocks;
        self.reorder = reorder;
        self.reset();
    }

    /// Rewinds the cursor to before the first element.
    pub fn reset(&mut self) {
        self.block = None;
        self.offset = 0;
    }

    /// Returns an independent snapshot of this event, rewound to the start.
    #[must_use]
    pub fn copy(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }

    /// Advances to the next elementary edit and returns whether there is one.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        match self.block {
            None => {
                self.block = Some(0);
                self.offset = 0;
            }
            Some(block) if block < self.blocks.len() => {
                if self.offset + 1 < self.blocks[block].len() {
                    self.offset += 1;
                } else {
                    self.block = Some(block + 1);
                    self.offset = 0;
                }
            }
            Some(_) => {}
        }
        self.on_block()
    }

    /// Advances to the first element of the next block and returns whether there is one.
    pub fn next_block(&mut self) -> bool {
        self.block = Some(match self.block {
            None => 0,
            Some(block) => (block + 1).min(self.blocks.len()),
        });
        self.offset = 0;
        self.on_block()
    }

    /// Returns whether [`ChangeEvent::next`] would find another elementary edit.
    #[must_use]
    pub fn has_next(&self) -> bool {
        match self.block {
            None => !self.blocks.is_empty(),
            Some(block) if block < self.blocks.len() => {
                self.offset + 1 < self.blocks[block].len() || block + 1 < self.blocks.len()
            }
            Some(_) => false,
        }
    }

    /// Returns whether [`ChangeEvent::next_block`] would find another block.
    #[must_use]
    pub fn has_next_block(&self) -> bool {
        match self.block {
            None => !self.blocks.is_empty(),
            Some(block) => block + 1 < self.blocks.len(),
        }
    }

    fn on_block(&self) -> bool {
        self.block.is_some_and(|block| block < self.blocks.len())
    }

    fn current(&self) -> &Block<E> {
        match self.block {
            Some(block) if block < self.blocks.len() => &self.blocks[block],
            Some(_) => panic!("change event is exhausted"),
            None => panic!("change event has not started; call next() or next_block() first"),
        }
    }

    /// Index of the current elementary edit, relative to the list after every earlier edit of
    /// this event.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on an edit.
    #[must_use]
    pub fn index(&self) -> usize {
        self.current().index_at(self.offset)
    }

    /// Kind of the current edit.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on an edit.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.current().kind
    }

    /// Value of the current element before the edit, if tracked.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on an edit.
    pub fn old_value(&self) -> Option<&E> {
        self.current().old_value()
    }

    /// Value of the current element after the edit, if tracked.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on an edit.
    pub fn new_value(&self) -> Option<&E> {
        self.current().new_value()
    }

    /// First index of the current block.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on a block.
    #[must_use]
    pub fn block_start(&self) -> usize {
        self.current().start
    }

    /// Last index (inclusive) of the current block.
    ///
    /// # Panics
    /// Panics if the cursor is not positioned on a block.
    #[must_use]
    pub fn block_end(&self) -> usize {
        self.current().end
    }

    /// Returns whether this event is a pure reordering of the list.
    #[must_use]
    pub fn is_reordering(&self) -> bool {
        self.reorder.is_some()
    }

    /// The permutation of a reordering event: the element now at `i` was at `reorder_map()[i]`.
    ///
    /// # Panics
    /// Panics if this event is not a reordering.
    pub fn reorder_map(&self) -> &[usize] {
        match &self.reorder {
            Some(map) => map,
            None => panic!("reorder_map() called on an event that is not a reordering"),
        }
    }

    pub fn blocks(&self) -> &[Block<E>] {
        &self.blocks
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every elementary edit of this event, independent of the cursor position.
    pub fn edits(&self) -> impl Iterator<Item = Edit<E>> + '_
    where
        E: Clone,
    {
        self.blocks.iter().flat_map(Block::edits)
    }

    /// Replays this event onto `list`, which must look like the list before the event.
    ///
    /// On error, `list` may be partially updated.
    pub fn apply_to(&self, list: &mut Vec<E>) -> Result<(), EventError>
    where
        E: Clone,
    {
        if let Some(map) = &self.reorder {
            if map.len() != list.len() {
                return Err(EventError::IndexOutOfBounds {
                    index: map.len(),
                    len: list.len(),
                });
            }
            let before = std::mem::take(list);
            list.extend(map.iter().map(|&from| before[from].clone()));
            return Ok(());
        }
        for edit in self.edits() {
            let len = list.len();
            let out_of_bounds = match edit.kind {
                ChangeKind::Insert => edit.index > len,
                ChangeKind::Update | ChangeKind::Delete => edit.index >= len,
            };
            if out_of_bounds {
                return Err(EventError::IndexOutOfBounds {
                    index: edit.index,
                    len,
                });
            }
            match edit.kind {
                ChangeKind::Delete => {
                    list.remove(edit.index);
                }
                ChangeKind::Update | ChangeKind::Insert => {
                    let value = edit
                        .new_value
                        .ok_or(EventError::UntrackedValue { index: edit.index })?;
                    if edit.kind == ChangeKind::Insert {
                        list.insert(edit.index, value);
                    } else {
                        list[edit.index] = value;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<E> fmt::Display for ChangeEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(map) = &self.reorder {
            return write!(f, "reorder {map:?}");
        }
        f.write_str("[")?;
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{block}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::EditScript;
    use ChangeKind::*;

    fn sample() -> ChangeEvent<char> {
        ChangeEvent::from_blocks(vec![
            Block::new(Delete, 0, 2, Some('A'), None),
            Block::new(Insert, 1, 2, None, Some('x')),
            Block::new(Update, 3, 1, Some('C'), Some('c')),
        ])
    }

    fn walk(event: &mut ChangeEvent<char>) -> Vec<(ChangeKind, usize)> {
        let mut seen = Vec::new();
        while event.next() {
            seen.push((event.kind(), event.index()));
        }
        seen
    }

    #[test]
    fn next_expands_blocks() {
        let mut event = sample();
        assert!(event.has_next());
        assert_eq!(
            walk(&mut event),
            [
                (Delete, 0),
                (Delete, 0),
                (Insert, 1),
                (Insert, 2),
                (Update, 3)
            ]
        );
        assert!(!event.has_next());
        assert!(!event.next());
    }

    #[test]
    fn reset_repeats_the_same_pass() {
        let mut event = sample();
        let first = walk(&mut event);
        event.reset();
        assert_eq!(walk(&mut event), first);
    }

    #[test]
    fn block_iteration() {
        let mut event = sample();
        let mut blocks = Vec::new();
        while event.has_next_block() {
            assert!(event.next_block());
            blocks.push((event.kind(), event.block_start(), event.block_end()));
        }
        assert_eq!(blocks, [(Delete, 0, 1), (Insert, 1, 2), (Update, 3, 3)]);
        assert!(!event.next_block());
    }

    #[test]
    fn next_block_skips_unvisited_elements() {
        let mut event = sample();
        assert!(event.next());
        assert!(event.next_block());
        assert_eq!((event.kind(), event.index()), (Insert, 1));
        assert!(event.next());
        assert_eq!((event.kind(), event.index()), (Insert, 2));
        assert!(event.next());
        assert_eq!(event.new_value(), Some(&'c'));
    }

    #[test]
    #[should_panic = "has not started"]
    fn accessors_before_start_panic() {
        let _ = sample().block_start();
    }

    #[test]
    #[should_panic = "exhausted"]
    fn accessors_after_exhaustion_panic() {
        let mut event = sample();
        walk(&mut event);
        let _ = event.index();
    }

    #[test]
    #[should_panic = "not a reordering"]
    fn reorder_map_requires_a_reordering() {
        let _ = sample().reorder_map();
    }

    #[test]
    fn copy_is_independent_of_the_original() {
        let mut event = sample();
        event.next();
        let mut copy = event.copy();
        event.refresh(Rc::new([]), None);
        assert!(!event.has_next());
        assert_eq!(walk(&mut copy).len(), 5);
    }

    #[test]
    fn apply_to_replays_the_event() {
        let mut list = vec!['A', 'A', 'B', 'C'];
        sample().apply_to(&mut list).unwrap();
        assert_eq!(list, ['B', 'x', 'x', 'c']);
    }

    #[test]
    fn apply_to_rejects_untracked_values() {
        let event = ChangeEvent::from_blocks(vec![Block::new(Insert, 0, 1, None, None)]);
        let mut list = vec![1];
        assert!(matches!(
            event.apply_to(&mut list),
            Err(EventError::UntrackedValue { index: 0 })
        ));
    }

    #[test]
    fn apply_to_rejects_foreign_lists() {
        let mut list = vec!['A'];
        assert!(matches!(
            sample().apply_to(&mut list),
            Err(EventError::IndexOutOfBounds { index: 0, len: 0 })
        ));
    }

    #[test]
    fn display() {
        insta::assert_snapshot!(sample(), @"[delete 0..=1, insert 1..=2, update 3]");
        let mut event = ChangeEvent::<u8>::default();
        event.refresh(Rc::new([]), Some(vec![2, 0, 1].into()));
        insta::assert_snapshot!(event, @"reorder [2, 0, 1]");
    }

    #[quickcheck]
    fn qc_iteration_is_repeatable_and_matches_blocks(script: EditScript) {
        let original = script.initial();
        let mut tree = DeltaTree::new();
        tree.set_allow_contradicting_events(true);
        for edit in script.edits(&original) {
            tree.target_change(
                edit.kind,
                edit.index,
                edit.index + 1,
                edit.old_value,
                edit.new_value,
            )
            .unwrap();
        }
        let mut event = ChangeEvent::default();
        event.refresh(EventStorage::Tree(&tree).blocks(), None);

        let pass = |event: &mut ChangeEvent<u32>| {
            let mut seen = Vec::new();
            while event.next() {
                seen.push(Edit {
                    kind: event.kind(),
                    index: event.index(),
                    old_value: event.old_value().copied(),
                    new_value: event.new_value().copied(),
                });
            }
            seen
        };
        let first = pass(&mut event);
        event.reset();
        assert_eq!(pass(&mut event), first);

        event.reset();
        let mut by_block = Vec::new();
        while event.next_block() {
            let block = &event.blocks()[by_block.len()];
            assert_eq!(event.block_start(), block.start());
            by_block.push(block.clone());
        }
        let expanded: Vec<_> = by_block.iter().flat_map(Block::edits).collect();
        assert_eq!(expanded, first);
    }
}
