// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Edits and Blocks
//!
//! An [`Edit`] is the irreducible description of a change to one element of a list: an
//! insertion, an update or a deletion at a given index. Within one atomic operation, edits are
//! compressed into [`Block`]s, maximal runs of same-kind edits over contiguous indices that also
//! share their old and new value.
//!
//! Indices in a block sequence are always relative to the list as it looks after every previous
//! block has been applied. A delete block `2..=3` therefore removes two elements that both sit at
//! index `2` at the time they are removed.

use std::fmt;

/// The kind of change applied to a single element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum ChangeKind {
    Delete,
    Update,
    Insert,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Delete => f.write_str("delete"),
            ChangeKind::Update => f.write_str("update"),
            ChangeKind::Insert => f.write_str("insert"),
        }
    }
}

/// A single index-level change.
///
/// `None` in either value slot means the value is not tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Edit<E> {
    pub kind: ChangeKind,
    pub index: usize,
    pub old_value: Option<E>,
    pub new_value: Option<E>,
}

impl<E> Edit<E> {
    pub fn insert(index: usize, new_value: impl Into<Option<E>>) -> Self {
        Self {
            kind: ChangeKind::Insert,
            index,
            old_value: None,
            new_value: new_value.into(),
        }
    }

    pub fn update(
        index: usize,
        old_value: impl Into<Option<E>>,
        new_value: impl Into<Option<E>>,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            index,
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    pub fn delete(index: usize, old_value: impl Into<Option<E>>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            index,
            old_value: old_value.into(),
            new_value: None,
        }
    }
}

/// A maximal run of elementary edits of one kind.
///
/// All elements in a block share the same old and new value, so a single pair describes every
/// element. When value tracking is disabled both values are `None` and blocks only split on kind
/// and contiguity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Block<E> {
    pub(crate) kind: ChangeKind,
    pub(crate) start: usize,
    /// Inclusive.
    pub(crate) end: usize,
    pub(crate) old_value: Option<E>,
    pub(crate) new_value: Option<E>,
}

impl<E> Block<E> {
    /// Creates a block of `len` elements starting at `start`.
    ///
    /// # Panics
    /// Panics if `len` is zero.
    pub fn new(
        kind: ChangeKind,
        start: usize,
        len: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> Self {
        assert!(len > 0, "a block must cover at least one element");
        Self {
            kind,
            start,
            end: start + len - 1,
            old_value,
            new_value,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// The last index covered by this block (inclusive).
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Blocks are never empty; provided for symmetry with [`Block::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn old_value(&self) -> Option<&E> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> Option<&E> {
        self.new_value.as_ref()
    }

    /// The index at which the next edit must start to extend this block.
    pub(crate) fn next_index(&self) -> usize {
        match self.kind {
            ChangeKind::Delete => self.start,
            ChangeKind::Update | ChangeKind::Insert => self.end + 1,
        }
    }

    /// Index of the `offset`-th elementary edit of this block.
    pub(crate) fn index_at(&self, offset: usize) -> usize {
        match self.kind {
            ChangeKind::Delete => self.start,
            ChangeKind::Update | ChangeKind::Insert => self.start + offset,
        }
    }

    /// Expands this block into its elementary edits.
    pub fn edits(&self) -> impl Iterator<Item = Edit<E>> + '_
    where
        E: Clone,
    {
        (0..self.len()).map(move |offset| Edit {
            kind: self.kind,
            index: self.index_at(offset),
            old_value: self.old_value.clone(),
            new_value: self.new_value.clone(),
        })
    }
}

impl<E: PartialEq> Block<E> {
    /// Returns whether `next`, immediately following `self` in a block sequence, could be merged
    /// into `self`.
    #[must_use]
    pub fn can_absorb(&self, next: &Block<E>) -> bool {
        self.kind == next.kind
            && next.start == self.next_index()
            && self.old_value == next.old_value
            && self.new_value == next.new_value
    }

    /// Merges `next` into `self` if [`Block::can_absorb`] allows it.
    pub fn absorb(&mut self, next: &Block<E>) -> bool {
        if !self.can_absorb(next) {
            return false;
        }
        self.end += next.len();
        true
    }
}

impl<E> fmt::Display for Block<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.start)?;
        if self.end != self.start {
            write!(f, "..={}", self.end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_blocks_expand_at_their_start() {
        let block = Block::new(ChangeKind::Delete, 2, 3, Some('c'), None);
        let indices: Vec<_> = block.edits().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 2, 2]);
        assert_eq!(block.to_string(), "delete 2..=4");
    }

    #[test]
    fn insert_blocks_expand_contiguously() {
        let block = Block::new(ChangeKind::Insert, 1, 2, None, Some('x'));
        let edits: Vec<_> = block.edits().collect();
        assert_eq!(edits, vec![Edit::insert(1, 'x'), Edit::insert(2, 'x')]);
    }

    #[test]
    fn absorb_requires_identical_values() {
        let mut a = Block::new(ChangeKind::Delete, 0, 1, Some("A"), None);
        let b = Block::new(ChangeKind::Delete, 0, 1, Some("A"), None);
        let c = Block::new(ChangeKind::Delete, 0, 1, Some("B"), None);
        assert!(a.absorb(&b));
        assert_eq!(a.len(), 2);
        assert!(!a.absorb(&c));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn absorb_requires_contiguity() {
        let a = Block::<()>::new(ChangeKind::Update, 0, 2, None, None);
        assert!(a.can_absorb(&Block::new(ChangeKind::Update, 2, 1, None, None)));
        assert!(!a.can_absorb(&Block::new(ChangeKind::Update, 3, 1, None, None)));
        assert!(!a.can_absorb(&Block::new(ChangeKind::Insert, 2, 1, None, None)));
    }

    #[test]
    fn single_element_display() {
        assert_eq!(
            Block::<u8>::new(ChangeKind::Insert, 3, 1, None, None).to_string(),
            "insert 3"
        );
    }
}
