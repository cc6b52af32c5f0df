// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The fast path for recording edits.
//!
//! Most atomic operations touch a single contiguous range, or a sequence of ranges in strictly
//! increasing index order (appends, front-to-back removals). Such edits can be appended to a
//! run-length log by index arithmetic alone, and the log then *is* the canonical block sequence.
//!
//! Removals that fall into a gap between logged blocks are accepted too, which covers removals
//! processed back-to-front: the removal is placed in front of the blocks after it, and those
//! blocks move down by the number of removed elements. Anything else is rejected so the caller can
//! move to the [`DeltaTree`](crate::DeltaTree).

use crate::{Block, ChangeKind};

/// Run-length encoded log of edits that never overlap an earlier edit.
#[derive(Clone, Debug)]
pub struct ElementaryEditLog<E> {
    blocks: Vec<Block<E>>,
}

impl<E> Default for ElementaryEditLog<E> {
    fn default() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl<E> ElementaryEditLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first element not covered by the last block, in the coordinates of the list
    /// after every logged edit.
    fn last_changed_index(&self) -> usize {
        self.blocks.last().map_or(0, Block::next_index)
    }

    /// Returns whether an edit starting at `start` can be logged after every earlier entry.
    #[must_use]
    pub fn can_append(&self, start: usize) -> bool {
        start >= self.last_changed_index()
    }

    /// Finds the block in front of which a removal of `start..end` can be logged.
    ///
    /// Every element in front of a block's start is untouched by that block and the ones after
    /// it, so the removal fits if it ends before the block and starts after the previous one.
    fn gap_for_delete(&self, start: usize, end: usize) -> Option<usize> {
        let at = self.blocks.iter().position(|block| end <= block.start)?;
        let floor = at
            .checked_sub(1)
            .map_or(0, |previous| self.blocks[previous].next_index());
        (start >= floor).then_some(at)
    }

    /// Returns whether [`ElementaryEditLog::add_change`] would accept the change.
    #[must_use]
    pub fn accepts(&self, kind: ChangeKind, start: usize, end: usize) -> bool {
        self.can_append(start)
            || (kind == ChangeKind::Delete && self.gap_for_delete(start, end).is_some())
    }

    /// Clears the log, keeping its allocation.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The logged edits as a canonical block sequence.
    pub fn blocks(&self) -> &[Block<E>] {
        &self.blocks
    }
}

impl<E: PartialEq> ElementaryEditLog<E> {
    /// Logs a change to `start..end` and returns whether it was accepted.
    ///
    /// The log is left untouched when the change is rejected.
    pub fn add_change(
        &mut self,
        kind: ChangeKind,
        start: usize,
        end: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> bool {
        debug_assert!(start < end, "empty change {start}..{end}");
        if self.can_append(start) {
            let block = Block::new(kind, start, end - start, old_value, new_value);
            if let Some(last) = self.blocks.last_mut() {
                if last.absorb(&block) {
                    return true;
                }
            }
            self.blocks.push(block);
            return true;
        }
        if kind != ChangeKind::Delete {
            return false;
        }
        let Some(at) = self.gap_for_delete(start, end) else {
            return false;
        };
        let len = end - start;
        for block in &mut self.blocks[at..] {
            block.start -= len;
            block.end -= len;
        }
        self.blocks
            .insert(at, Block::new(kind, start, len, old_value, new_value));
        self.coalesce(at);
        if at > 0 {
            self.coalesce(at - 1);
        }
        true
    }

    /// Merges the block after `at` into it, if possible.
    fn coalesce(&mut self, at: usize) {
        if at + 1 >= self.blocks.len() {
            return;
        }
        let (head, tail) = self.blocks.split_at_mut(at + 1);
        if head[at].absorb(&tail[0]) {
            self.blocks.remove(at + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChangeKind::*;

    fn render<E>(log: &ElementaryEditLog<E>) -> Vec<String> {
        log.blocks().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn appends_merge_into_one_block() {
        let mut log = ElementaryEditLog::new();
        for i in 0..4 {
            assert!(log.add_change(Insert, i, i + 1, None, None::<u8>));
        }
        assert_eq!(render(&log), ["insert 0..=3"]);
    }

    #[test]
    fn removals_front_to_back_merge_at_the_same_index() {
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Delete, 0, 1, Some('A'), None));
        assert!(log.add_change(Delete, 0, 1, Some('A'), None));
        assert!(log.add_change(Delete, 2, 3, Some('C'), None));
        assert!(log.add_change(Delete, 2, 3, Some('C'), None));
        assert_eq!(render(&log), ["delete 0..=1", "delete 2..=3"]);
    }

    #[test]
    fn removals_back_to_front_are_renumbered() {
        // [A, A, B, B, C, C]
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Delete, 5, 6, Some('C'), None));
        assert!(log.add_change(Delete, 4, 5, Some('C'), None));
        assert!(log.accepts(Delete, 1, 2));
        assert!(log.add_change(Delete, 1, 2, Some('A'), None));
        assert!(log.add_change(Delete, 0, 1, Some('A'), None));
        assert_eq!(render(&log), ["delete 0..=1", "delete 2..=3"]);
    }

    #[test]
    fn removal_into_a_gap_merges_with_both_neighbours() {
        // [A, A, A, A], removing index 0, then index 2, then the one in between
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Delete, 0, 1, Some('A'), None));
        assert!(log.add_change(Delete, 1, 2, Some('A'), None));
        assert_eq!(render(&log), ["delete 0", "delete 1"]);
        assert!(log.add_change(Delete, 0, 1, Some('A'), None));
        assert_eq!(render(&log), ["delete 0..=2"]);
    }

    #[test]
    fn removal_overlapping_a_block_is_rejected() {
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Insert, 2, 4, None, Some(1)));
        assert!(!log.accepts(Delete, 1, 3));
        assert!(!log.add_change(Delete, 1, 3, Some(1), None));
        assert!(log.add_change(Delete, 0, 2, Some(0), None));
        assert_eq!(render(&log), ["delete 0..=1", "insert 0..=1"]);
    }

    #[test]
    fn distinct_values_do_not_merge() {
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Insert, 1, 2, None, Some('B')));
        assert!(log.add_change(Insert, 2, 3, None, Some('C')));
        assert_eq!(render(&log), ["insert 1", "insert 2"]);
    }

    #[test]
    fn rejects_edits_behind_the_last_change() {
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Insert, 3, 5, None, None::<u8>));
        assert!(!log.can_append(4));
        assert!(!log.add_change(Update, 0, 1, None, None));
        assert!(!log.add_change(Delete, 3, 4, None, None));
        assert!(!log.add_change(Insert, 1, 2, None, None));
        assert!(log.add_change(Delete, 5, 6, None, None));
        assert_eq!(render(&log), ["insert 3..=4", "delete 5"]);
    }

    #[test]
    fn reset_empties_the_log() {
        let mut log = ElementaryEditLog::new();
        assert!(log.add_change(Update, 0, 2, Some(1), Some(2)));
        assert!(!log.is_empty());
        log.reset();
        assert!(log.is_empty());
        assert!(log.can_append(0));
    }
}
