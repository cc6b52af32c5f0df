// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The example builds a small pipeline of lists: a source list of words, a derived list holding
//! the same words in upper case, and a report that reads both lists whenever the source changes.
//!
//! Run it with `RUST_LOG=listdelta=trace` to see every notification.

use listdelta::{
    ChangeEvent, ChangeKind, Edit, EventError, EventPublisher, ListenerError, ObservableVec,
    SubjectId,
};
use std::{cell::RefCell, error::Error, rc::Rc};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Every list of one pipeline shares a publisher. It decides in which order listeners are
    // notified.
    let publisher = Rc::new(EventPublisher::new());
    let words = ObservableVec::from_vec(
        Rc::clone(&publisher),
        vec!["alpha".to_string(), "beta".to_string()],
    );
    let shouted = Rc::new(ObservableVec::from_vec(
        Rc::clone(&publisher),
        vec!["ALPHA".to_string(), "BETA".to_string()],
    ));

    // The derived list replays each edit of the source event on its own elements. It is
    // registered under the derived list's subject, so anything listening to `shouted` is ordered
    // after it.
    let target = Rc::clone(&shouted);
    let shout = move |event: &mut ChangeEvent<String>| -> Result<(), ListenerError> {
        if event.is_reordering() {
            // upper case sorts like lower case
            target.sort_by(|a, b| a.cmp(b))?;
            return Ok(());
        }
        let edits: Vec<Edit<String>> = event.edits().collect();
        target.batch(|list| {
            for edit in edits {
                let shouted = edit.new_value.map(|word| word.to_uppercase());
                match (edit.kind, shouted) {
                    (ChangeKind::Delete, _) => drop(list.remove(edit.index)?),
                    (ChangeKind::Update, Some(word)) => drop(list.set(edit.index, word)?),
                    (ChangeKind::Insert, Some(word)) => list.insert(edit.index, word)?,
                    (_, None) => return Err(EventError::UntrackedValue { index: edit.index }),
                }
            }
            Ok(())
        })?;
        Ok(())
    };
    words.add_listener(shouted.subject(), Rc::new(RefCell::new(shout)))?;

    // The report listens to the derived list, so by the time it runs the derived list has
    // caught up with the source.
    let report = {
        let shouted = Rc::clone(&shouted);
        move |event: &mut ChangeEvent<String>| -> Result<(), ListenerError> {
            println!("shouted list changed: {event}");
            println!("  now {:?}", shouted.to_vec());
            Ok(())
        }
    };
    shouted.add_listener(SubjectId::new(), Rc::new(RefCell::new(report)))?;

    words.push("gamma".to_string())?;
    words.batch(|list| {
        list.insert(0, "omega".to_string())?;
        list.remove(2)?;
        Ok(())
    })?;
    words.sort_by(|a, b| a.cmp(b))?;

    assert_eq!(shouted.to_vec(), ["ALPHA", "GAMMA", "OMEGA"]);
    Ok(())
}
