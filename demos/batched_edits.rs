// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The example drives an `EventAssembler` by hand, the way a list implementation would, and
//! prints the events its listener receives.

use listdelta::{
    ChangeEvent, ChangeKind, EventAssembler, EventPublisher, ListenerError, SubjectId,
};
use std::{cell::RefCell, error::Error, rc::Rc};

fn print_event(event: &mut ChangeEvent<char>) -> Result<(), ListenerError> {
    println!("{event}");
    // Walk the event one element at a time. Indices are already adjusted for every earlier
    // change in the same event.
    while event.next() {
        match event.kind() {
            ChangeKind::Delete => println!("  delete {:?} at {}", event.old_value(), event.index()),
            ChangeKind::Update => println!(
                "  update {:?} -> {:?} at {}",
                event.old_value(),
                event.new_value(),
                event.index()
            ),
            ChangeKind::Insert => println!("  insert {:?} at {}", event.new_value(), event.index()),
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let publisher = Rc::new(EventPublisher::new());
    let list = EventAssembler::<char>::new(SubjectId::new(), publisher);
    list.add_listener(SubjectId::new(), Rc::new(RefCell::new(print_event)))?;

    // Removing every 'A' and 'C' from [A, A, B, B, C, C], back to front. The listener sees two
    // blocks: [A, A] removed at 0, then [C, C] removed at 2 of the shortened list.
    list.begin_event(false)?;
    for (index, value) in [(5, 'C'), (4, 'C'), (1, 'A'), (0, 'A')] {
        list.element_deleted(index, value)?;
    }
    list.commit_event()?;

    // Edits in arbitrary order move the event to the delta tree, which renumbers them.
    list.begin_event(false)?;
    list.element_inserted(1, 'y')?;
    list.element_inserted(0, 'x')?;
    list.element_updated(3, 'B', 'b')?;
    list.commit_event()?;

    // A nested operation may change an element again. Only the outermost commit publishes.
    list.begin_event(true)?;
    list.element_updated(0, 'x', 'X')?;
    list.begin_event(false)?;
    list.element_updated(0, 'X', 'Z')?;
    list.commit_event()?;
    list.commit_event()?;

    // Edits that cancel out publish nothing.
    let transaction = list.transact(false)?;
    transaction.assembler().element_inserted(2, 'q')?;
    transaction.assembler().element_deleted(2, 'q')?;
    transaction.commit()?;

    // A reordering is published as such, together with a coarse description as plain edits.
    list.begin_event(false)?;
    list.reorder(&[2, 0, 1])?;
    list.commit_event()?;

    // Dropping an uncommitted transaction discards it.
    {
        let transaction = list.transact(false)?;
        transaction.assembler().element_inserted(0, 'n')?;
    }
    assert!(list.is_event_empty());
    Ok(())
}
