// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for edit scripts.

use crate::{ChangeKind, Edit};
use quickcheck::{Arbitrary, Gen};

impl Arbitrary for ChangeKind {
    fn arbitrary(g: &mut Gen) -> Self {
        *g.choose(&[ChangeKind::Delete, ChangeKind::Update, ChangeKind::Insert])
            .expect("non-empty slice")
    }
}

/// One step of an [`EditScript`], resolved against the list it is applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub kind: ChangeKind,
    /// Reduced modulo the valid index range when the step is resolved.
    pub position: usize,
    pub value: u32,
}

/// A list length plus a sequence of edits that is valid against any list of that length.
///
/// Values are drawn from a small range so that neighbouring edits often carry equal values and
/// exercise block merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditScript {
    pub initial_len: usize,
    pub steps: Vec<Step>,
}

impl EditScript {
    /// The list the script starts from: distinct values `100..100 + initial_len`.
    pub fn initial(&self) -> Vec<u32> {
        (100..).take(self.initial_len).collect()
    }

    /// Resolves every step against `initial`, tracking the list as it changes.
    ///
    /// Steps that would read from an empty list become insertions.
    pub fn edits(&self, initial: &[u32]) -> Vec<Edit<u32>> {
        let mut list = initial.to_vec();
        let mut edits = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let kind = if list.is_empty() {
                ChangeKind::Insert
            } else {
                step.kind
            };
            let edit = match kind {
                ChangeKind::Insert => {
                    let index = step.position % (list.len() + 1);
                    list.insert(index, step.value);
                    Edit::insert(index, step.value)
                }
                ChangeKind::Update => {
                    let index = step.position % list.len();
                    let old = std::mem::replace(&mut list[index], step.value);
                    Edit::update(index, old, step.value)
                }
                ChangeKind::Delete => {
                    let index = step.position % list.len();
                    Edit::delete(index, list.remove(index))
                }
            };
            edits.push(edit);
        }
        edits
    }
}

impl Arbitrary for Step {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            kind: ChangeKind::arbitrary(g),
            position: usize::arbitrary(g),
            value: u32::from(u8::arbitrary(g) % 3),
        }
    }
}

impl Arbitrary for EditScript {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            initial_len: usize::arbitrary(g) % 16,
            steps: Vec::arbitrary(g),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let initial_len = self.initial_len;
        let steps = self.steps.clone();
        let fewer_steps = self.steps.shrink().map(move |steps| Self {
            initial_len,
            steps,
        });
        let shorter_list = self.initial_len.shrink().map(move |initial_len| Self {
            initial_len,
            steps: steps.clone(),
        });
        Box::new(fewer_steps.chain(shorter_list))
    }
}
