// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # DeltaTree
//!
//! The general path for recording edits. The tree holds the list as a sequence of *runs*, each
//! tagged as unchanged, inserted, updated or deleted, and so knows two coordinate spaces at
//! once:
//!
//! - the *source* space: the list as it was before the atomic operation started, made of
//!   unchanged, updated and deleted elements;
//! - the *target* space: the list as it is after every edit recorded so far, made of unchanged,
//!   updated and inserted elements.
//!
//! Edits arrive in target coordinates, in any order. Deleted elements have no width in target
//! space and stay in the tree so that the final block sequence can be derived from a single
//! in-order walk.
//!
//! The runs are kept in an implicit treap (a randomized balanced binary tree ordered by
//! position), stored in an arena so that nodes are plain indices. Each node caches the target
//! length of its subtree for `O(log n)` positional splits, and the number of changed elements so
//! emptiness checks are `O(1)`.
//!
//! The untouched tail of the list is not stored up front. Whenever an edit reaches past the known
//! target length the tree grows by an unchanged run, so the tree never needs to know the length of
//! the list it describes.

use crate::{Block, ChangeKind, EventError, ElementaryEditLog};
use std::fmt;

type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunKind {
    Unchanged,
    Insert,
    Update,
    Delete,
}

/// A run of elements that share a kind and a pair of values.
#[derive(Clone)]
struct Run<E> {
    kind: RunKind,
    len: usize,
    old: Option<E>,
    new: Option<E>,
}

impl<E> Run<E> {
    fn unchanged(len: usize) -> Self {
        Self {
            kind: RunKind::Unchanged,
            len,
            old: None,
            new: None,
        }
    }

    fn target_len(&self) -> usize {
        match self.kind {
            RunKind::Delete => 0,
            RunKind::Unchanged | RunKind::Insert | RunKind::Update => self.len,
        }
    }

    fn changed_len(&self) -> usize {
        match self.kind {
            RunKind::Unchanged => 0,
            RunKind::Insert | RunKind::Update | RunKind::Delete => self.len,
        }
    }
}

impl<E: Clone> Run<E> {
    /// Shortens this run to `at` elements and returns the remainder.
    fn split_off(&mut self, at: usize) -> Self {
        debug_assert!(0 < at && at < self.len);
        let tail = Self {
            kind: self.kind,
            len: self.len - at,
            old: self.old.clone(),
            new: self.new.clone(),
        };
        self.len = at;
        tail
    }
}

impl<E: PartialEq> Run<E> {
    fn absorb(&mut self, next: &Run<E>) -> bool {
        if self.kind != next.kind || self.old != next.old || self.new != next.new {
            return false;
        }
        self.len += next.len;
        true
    }
}

impl<E> fmt::Debug for Run<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.len)
    }
}

struct Node<E> {
    run: Run<E>,
    priority: u64,
    left: Option<NodeId>,
    right: Option<NodeId>,
    /// Target length of the subtree rooted here.
    target: usize,
    /// Changed elements in the subtree rooted here.
    changed: usize,
}

/// Tree-backed recorder for arbitrary sequences of index-based edits.
pub struct DeltaTree<E> {
    nodes: Vec<Node<E>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    seed: u64,
    allow_contradicting_events: bool,
}

impl<E> Default for DeltaTree<E> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            seed: 0x9e37_79b9_7f4a_7c15,
            allow_contradicting_events: false,
        }
    }
}

impl<E> fmt::Debug for DeltaTree<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.runs()).finish()
    }
}

impl<E> DeltaTree<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows an element that was already changed in this operation to be changed again.
    ///
    /// Contradicting edits are resolved by keeping the first old value and the latest new value.
    /// When not allowed, such edits are rejected with [`EventError::ContradictingEdit`]. Deleting
    /// an element inserted by the same operation is always allowed and cancels both edits.
    pub fn set_allow_contradicting_events(&mut self, allow: bool) {
        self.allow_contradicting_events = allow;
    }

    #[must_use]
    pub fn allows_contradicting_events(&self) -> bool {
        self.allow_contradicting_events
    }

    /// Discards every recorded edit.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
    }

    /// Returns whether the recorded edits cancel out entirely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_of(self.root) == 0
    }

    /// Length of the list after every recorded edit, as far as the tree knows it.
    #[must_use]
    pub fn target_len(&self) -> usize {
        self.target_of(self.root)
    }

    fn target_of(&self, node: Option<NodeId>) -> usize {
        node.map_or(0, |id| self.nodes[id].target)
    }

    fn changed_of(&self, node: Option<NodeId>) -> usize {
        node.map_or(0, |id| self.nodes[id].changed)
    }

    fn next_priority(&mut self) -> u64 {
        // xorshift64
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed = x;
        x
    }

    fn alloc(&mut self, run: Run<E>) -> NodeId {
        let priority = self.next_priority();
        let node = Node {
            target: run.target_len(),
            changed: run.changed_len(),
            run,
            priority,
            left: None,
            right: None,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id] = node;
            id
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn pull(&mut self, id: NodeId) {
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        let target = self.target_of(left) + self.nodes[id].run.target_len() + self.target_of(right);
        let changed =
            self.changed_of(left) + self.nodes[id].run.changed_len() + self.changed_of(right);
        let node = &mut self.nodes[id];
        node.target = target;
        node.changed = changed;
    }

    fn merge(&mut self, a: Option<NodeId>, b: Option<NodeId>) -> Option<NodeId> {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => {
                if self.nodes[a].priority > self.nodes[b].priority {
                    let right = self.nodes[a].right;
                    self.nodes[a].right = self.merge(right, Some(b));
                    self.pull(a);
                    Some(a)
                } else {
                    let left = self.nodes[b].left;
                    self.nodes[b].left = self.merge(Some(a), left);
                    self.pull(b);
                    Some(b)
                }
            }
        }
    }

    /// In-order runs.
    fn runs(&self) -> Vec<&Run<E>> {
        let mut out = Vec::with_capacity(self.nodes.len() - self.free.len());
        let mut stack = Vec::new();
        let mut cursor = self.root;
        loop {
            while let Some(id) = cursor {
                stack.push(id);
                cursor = self.nodes[id].left;
            }
            let Some(id) = stack.pop() else { break };
            out.push(&self.nodes[id].run);
            cursor = self.nodes[id].right;
        }
        out
    }

    fn any_run(&self, node: Option<NodeId>, predicate: &impl Fn(&Run<E>) -> bool) -> bool {
        node.is_some_and(|id| {
            let node = &self.nodes[id];
            predicate(&node.run)
                || self.any_run(node.left, predicate)
                || self.any_run(node.right, predicate)
        })
    }

    /// Moves the runs of a subtree out in order and frees its nodes.
    fn take_runs(&mut self, node: Option<NodeId>, out: &mut Vec<Run<E>>) {
        let Some(id) = node else { return };
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        self.take_runs(left, out);
        out.push(std::mem::replace(&mut self.nodes[id].run, Run::unchanged(0)));
        self.free.push(id);
        self.take_runs(right, out);
    }
}

impl<E: Clone + PartialEq> DeltaTree<E> {
    /// Splits off the longest prefix whose target length is `at`.
    ///
    /// Deleted runs sitting exactly at the boundary go to the left, so an insertion at `at` lands
    /// after any deletion at the same position.
    fn split(&mut self, node: Option<NodeId>, at: usize) -> (Option<NodeId>, Option<NodeId>) {
        let Some(id) = node else { return (None, None) };
        let left = self.nodes[id].left;
        let left_target = self.target_of(left);
        let run_target = self.nodes[id].run.target_len();
        if at < left_target || (at == left_target && run_target > 0) {
            let (a, b) = self.split(left, at);
            self.nodes[id].left = b;
            self.pull(id);
            (a, Some(id))
        } else if at >= left_target + run_target {
            let right = self.nodes[id].right;
            let (a, b) = self.split(right, at - left_target - run_target);
            self.nodes[id].right = a;
            self.pull(id);
            (Some(id), b)
        } else {
            let tail = self.nodes[id].run.split_off(at - left_target);
            let right = self.nodes[id].right.take();
            self.pull(id);
            let tail = self.alloc(tail);
            (Some(id), self.merge(Some(tail), right))
        }
    }

    /// Grows the tree with unchanged elements until its target length is at least `len`.
    fn ensure_target_len(&mut self, len: usize) {
        let known = self.target_len();
        if known < len {
            let tail = self.alloc(Run::unchanged(len - known));
            self.root = self.merge(self.root, Some(tail));
        }
    }

    /// Builds a subtree from runs, merging neighbours that share kind and values.
    fn build(&mut self, runs: Vec<Run<E>>) -> Option<NodeId> {
        let mut coalesced: Vec<Run<E>> = Vec::with_capacity(runs.len());
        for run in runs {
            if run.len == 0 {
                continue;
            }
            if !coalesced.last_mut().is_some_and(|last| last.absorb(&run)) {
                coalesced.push(run);
            }
        }
        let mut subtree = None;
        for run in coalesced {
            let id = self.alloc(run);
            subtree = self.merge(subtree, Some(id));
        }
        subtree
    }

    /// Splits the tree around the target range `start..end`, rewrites the runs in it with
    /// `rewrite`, and reassembles the tree.
    ///
    /// If `contradicts` matches any run in the range while contradicting events are not allowed,
    /// the tree is left untouched and an error is returned.
    fn rewrite_range(
        &mut self,
        kind: ChangeKind,
        start: usize,
        end: usize,
        contradicts: impl Fn(&Run<E>) -> bool,
        rewrite: impl Fn(Run<E>) -> Option<Run<E>>,
    ) -> Result<(), EventError> {
        debug_assert!(start < end, "empty change {start}..{end}");
        self.ensure_target_len(end);
        let (left, rest) = self.split(self.root, start);
        let (middle, right) = self.split(rest, end - start);

        if !self.allow_contradicting_events && self.any_run(middle, &contradicts) {
            let restored = self.merge(left, middle);
            self.root = self.merge(restored, right);
            return Err(EventError::ContradictingEdit { kind, index: start });
        }

        let mut runs = Vec::new();
        self.take_runs(middle, &mut runs);
        let runs = runs.into_iter().filter_map(rewrite).collect();
        let middle = self.build(runs);
        let left = self.merge(left, middle);
        self.root = self.merge(left, right);
        Ok(())
    }

    /// Records the insertion of `end - start` elements at target index `start`.
    pub fn target_insert(
        &mut self,
        start: usize,
        end: usize,
        new_value: Option<E>,
    ) -> Result<(), EventError> {
        debug_assert!(start < end, "empty change {start}..{end}");
        self.ensure_target_len(start);
        let (left, right) = self.split(self.root, start);
        let inserted = self.alloc(Run {
            kind: RunKind::Insert,
            len: end - start,
            old: None,
            new: new_value,
        });
        let left = self.merge(left, Some(inserted));
        self.root = self.merge(left, right);
        Ok(())
    }

    /// Records the deletion of the elements at target indices `start..end`.
    ///
    /// Elements inserted earlier in this operation simply disappear. Elements updated earlier
    /// keep the old value of that first update.
    pub fn target_delete(
        &mut self,
        start: usize,
        end: usize,
        old_value: Option<E>,
    ) -> Result<(), EventError> {
        self.rewrite_range(
            ChangeKind::Delete,
            start,
            end,
            |run| run.kind == RunKind::Update,
            |run| match run.kind {
                RunKind::Insert => None,
                RunKind::Delete => Some(run),
                RunKind::Unchanged => Some(Run {
                    kind: RunKind::Delete,
                    len: run.len,
                    old: old_value.clone(),
                    new: None,
                }),
                RunKind::Update => Some(Run {
                    kind: RunKind::Delete,
                    len: run.len,
                    old: run.old,
                    new: None,
                }),
            },
        )
    }

    /// Records an update of the elements at target indices `start..end`.
    ///
    /// An element inserted earlier in this operation stays an insertion of the new value. An
    /// element updated earlier keeps its first old value.
    pub fn target_update(
        &mut self,
        start: usize,
        end: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> Result<(), EventError> {
        self.rewrite_range(
            ChangeKind::Update,
            start,
            end,
            |run| matches!(run.kind, RunKind::Insert | RunKind::Update),
            |run| match run.kind {
                RunKind::Delete => Some(run),
                RunKind::Insert => Some(Run {
                    new: new_value.clone(),
                    ..run
                }),
                RunKind::Unchanged => Some(Run {
                    kind: RunKind::Update,
                    len: run.len,
                    old: old_value.clone(),
                    new: new_value.clone(),
                }),
                RunKind::Update => Some(Run {
                    new: new_value.clone(),
                    ..run
                }),
            },
        )
    }

    /// Records a change of any kind over target indices `start..end`.
    pub fn target_change(
        &mut self,
        kind: ChangeKind,
        start: usize,
        end: usize,
        old_value: Option<E>,
        new_value: Option<E>,
    ) -> Result<(), EventError> {
        match kind {
            ChangeKind::Insert => self.target_insert(start, end, new_value),
            ChangeKind::Update => self.target_update(start, end, old_value, new_value),
            ChangeKind::Delete => self.target_delete(start, end, old_value),
        }
    }

    /// Replays every edit of a fast-path log into this tree.
    pub fn add_all(&mut self, log: &ElementaryEditLog<E>) -> Result<(), EventError> {
        for block in log.blocks() {
            self.target_change(
                block.kind,
                block.start,
                block.end + 1,
                block.old_value.clone(),
                block.new_value.clone(),
            )?;
        }
        Ok(())
    }

    /// Computes the canonical block sequence describing every recorded edit.
    pub fn blocks(&self) -> Vec<Block<E>> {
        let mut blocks: Vec<Block<E>> = Vec::new();
        let mut index = 0;
        for run in self.runs() {
            let kind = match run.kind {
                RunKind::Unchanged => {
                    index += run.len;
                    continue;
                }
                RunKind::Delete => ChangeKind::Delete,
                RunKind::Update => ChangeKind::Update,
                RunKind::Insert => ChangeKind::Insert,
            };
            let block = Block::new(kind, index, run.len, run.old.clone(), run.new.clone());
            index += run.target_len();
            if !blocks.last_mut().is_some_and(|last| last.absorb(&block)) {
                blocks.push(block);
            }
        }
        blocks
    }
}
