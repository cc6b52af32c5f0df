//! End-to-end tests of lists publishing change events to each other.

use listdelta::{
    ChangeEvent, ChangeKind, EventAssembler, EventError, EventPublisher, ListenerError,
    ObservableVec, RecordingListener, SubjectId,
};
use std::{cell::RefCell, rc::Rc};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Recorder = Rc<RefCell<RecordingListener<char>>>;

fn observed(items: &str) -> (ObservableVec<char>, Recorder) {
    init_tracing();
    let list = ObservableVec::from_vec(Rc::new(EventPublisher::new()), items.chars().collect());
    let recorder = Recorder::default();
    list.add_listener(SubjectId::new(), Rc::clone(&recorder))
        .unwrap();
    (list, recorder)
}

fn replay(start: &str, recorder: &RecordingListener<char>) -> Vec<char> {
    let mut mirror: Vec<char> = start.chars().collect();
    for event in &recorder.events {
        event.apply_to(&mut mirror).unwrap();
    }
    mirror
}

#[test]
fn filtering_publishes_one_block_per_run() {
    let (list, recorder) = observed("AABBCC");
    assert_eq!(list.retain(|c| *c == 'B').unwrap(), 4);
    assert_eq!(list.to_vec(), ['B', 'B']);

    let recorder = recorder.borrow();
    assert_eq!(recorder.changes_seen, ["[delete 0..=1, delete 2..=3]"]);
    let blocks = recorder.events[0].blocks();
    assert_eq!(blocks[0].old_value(), Some(&'A'));
    assert_eq!(blocks[1].old_value(), Some(&'C'));
    assert_eq!(replay("AABBCC", &recorder), list.to_vec());
}

#[test]
fn removal_order_does_not_change_the_event() {
    let removals: [&[usize]; 3] = [&[0, 0, 2, 2], &[5, 4, 1, 0], &[4, 4, 0, 0]];
    for order in removals {
        let (list, recorder) = observed("AABBCC");
        list.batch(|list| {
            for &index in order {
                list.remove(index)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(list.to_vec(), ['B', 'B'], "{order:?}");
        assert_eq!(
            recorder.borrow().changes_seen,
            ["[delete 0..=1, delete 2..=3]"],
            "{order:?}"
        );
    }
}

#[test]
fn inserts_are_numbered_in_final_coordinates() {
    let (list, recorder) = observed("ADE");
    list.batch(|list| {
        list.insert(1, 'C')?;
        list.insert(1, 'B')
    })
    .unwrap();
    assert_eq!(list.to_vec(), ['A', 'B', 'C', 'D', 'E']);

    let recorder = recorder.borrow();
    assert_eq!(recorder.changes_seen, ["[insert 1, insert 2]"]);
    let mut event = recorder.events[0].copy();
    let mut seen = Vec::new();
    while event.next() {
        seen.push((event.kind(), event.index(), event.new_value().copied()));
    }
    assert_eq!(
        seen,
        [
            (ChangeKind::Insert, 1, Some('B')),
            (ChangeKind::Insert, 2, Some('C'))
        ]
    );
}

#[test]
fn changes_that_cancel_out_publish_nothing() {
    let (list, recorder) = observed("abc");
    list.batch(|list| {
        list.insert(1, 'x')?;
        list.insert(4, 'y')?;
        list.remove(1)?;
        list.remove(3).map(drop)
    })
    .unwrap();
    assert_eq!(list.to_vec(), ['a', 'b', 'c']);
    assert!(recorder.borrow().changes_seen.is_empty());
    assert!(list.assembler().is_event_empty());

    list.push('d').unwrap();
    assert_eq!(recorder.borrow().changes_seen, ["[insert 3]"]);
}

#[test]
fn sorting_is_exclusive_of_other_edits() {
    let (list, recorder) = observed("cab");
    let result = list.batch(|list| {
        list.push('d')?;
        list.sort_by(Ord::cmp)
    });
    assert!(matches!(result, Err(EventError::ReorderWithPendingEdits)));
    assert_eq!(list.assembler().nesting_depth(), 0);
    assert!(recorder.borrow().changes_seen.is_empty());

    let (empty, recorder) = observed("");
    empty.sort_by(Ord::cmp).unwrap();
    assert!(recorder.borrow().changes_seen.is_empty());
}

#[test]
fn untracked_reordering_still_replays() {
    let (list, recorder) = observed("dcba");
    list.sort_by(Ord::cmp).unwrap();
    let recorder = recorder.borrow();
    let event = &recorder.events[0];
    assert!(event.is_reordering());
    assert_eq!(event.reorder_map(), [3, 2, 1, 0]);
    assert!(event.blocks().iter().all(|block| block.new_value().is_none()));
    assert_eq!(replay("dcba", &recorder), ['a', 'b', 'c', 'd']);
}

/// A list that mirrors another list by forwarding its events.
fn forwarding_listener(
    target: Rc<EventAssembler<char>>,
) -> Rc<RefCell<impl FnMut(&mut ChangeEvent<char>) -> Result<(), ListenerError>>> {
    Rc::new(RefCell::new(
        move |event: &mut ChangeEvent<char>| -> Result<(), ListenerError> {
            target.forward_event(event)?;
            Ok(())
        },
    ))
}

#[test]
fn forwarded_events_reach_downstream_lists() {
    init_tracing();
    let publisher = Rc::new(EventPublisher::new());
    let source = ObservableVec::from_vec(Rc::clone(&publisher), vec!['a', 'b', 'c']);
    let mirror = Rc::new(EventAssembler::new(SubjectId::new(), Rc::clone(&publisher)));
    source
        .add_listener(mirror.subject(), forwarding_listener(Rc::clone(&mirror)))
        .unwrap();
    let recorder = Recorder::default();
    mirror
        .add_listener(SubjectId::new(), Rc::clone(&recorder))
        .unwrap();

    source
        .batch(|list| {
            list.remove(0)?;
            list.set(1, 'C')?;
            list.push('d')
        })
        .unwrap();
    source.sort_by(|a, b| b.cmp(a)).unwrap();

    let recorder = recorder.borrow();
    assert_eq!(
        recorder.changes_seen,
        ["[delete 0, update 1, insert 2]", "reorder [2, 0, 1]"]
    );
    assert_eq!(replay("abc", &recorder), source.to_vec());
    assert!(mirror.is_event_empty());
    assert_eq!(mirror.nesting_depth(), 0);
}

#[test]
fn events_can_be_walked_block_by_block() {
    let (list, recorder) = observed("xxcdef");
    list.batch(|list| {
        list.remove(0)?;
        list.remove(0)?;
        list.set(2, 'X')?;
        list.insert(4, 'y')
    })
    .unwrap();

    let recorder = recorder.borrow();
    assert_eq!(
        recorder.changes_seen,
        ["[delete 0..=1, update 2, insert 4]"]
    );
    let mut event = recorder.events[0].copy();
    let mut spans = Vec::new();
    while event.next_block() {
        spans.push((event.kind(), event.block_start(), event.block_end()));
    }
    assert_eq!(
        spans,
        [
            (ChangeKind::Delete, 0, 1),
            (ChangeKind::Update, 2, 2),
            (ChangeKind::Insert, 4, 4)
        ]
    );
    assert!(!event.has_next());
    event.reset();
    assert!(event.has_next_block());
}
