//! Randomised edits against a list, checking that the published events replay to the same list.

use listdelta::{
    AssemblerOptions, EventError, EventPublisher, ObservableVec, RecordingListener, SubjectId,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{cell::RefCell, rc::Rc};

/// Applies one random edit to `list`. `next_value` keeps every inserted value distinct.
fn random_edit(
    rng: &mut StdRng,
    list: &ObservableVec<u32>,
    next_value: &mut u32,
) -> Result<(), EventError> {
    *next_value += 1;
    let value = *next_value;
    let len = list.len();
    match rng.random_range(0..6) {
        0 => list.insert(rng.random_range(0..=len), value),
        1 if len > 0 => list.set(rng.random_range(0..len), value).map(drop),
        2 if len > 0 => list.remove(rng.random_range(0..len)).map(drop),
        3 => {
            let modulus = rng.random_range(2..5);
            list.retain(|v| v % modulus != 0).map(drop)
        }
        4 => list.insert_all(
            rng.random_range(0..=len),
            (0..rng.random_range(1..4)).map(|offset| value * 10 + offset),
        ),
        _ => list.push(value),
    }
}

fn random_batch(
    rng: &mut StdRng,
    list: &ObservableVec<u32>,
    next_value: &mut u32,
    depth: usize,
) -> Result<(), EventError> {
    list.batch(|list| {
        for _ in 0..rng.random_range(1..8) {
            if depth < 2 && rng.random_bool(0.2) {
                random_batch(rng, list, next_value, depth + 1)?;
            } else {
                random_edit(rng, list, next_value)?;
            }
        }
        Ok(())
    })
}

#[test]
fn random_batches_replay_to_the_list() {
    listdelta::enable_determinism();
    for seed in 0..300 {
        let mut rng = StdRng::seed_from_u64(seed);
        let initial: Vec<u32> = (0..rng.random_range(0..10)).collect();
        let options = AssemblerOptions::default()
            .with_fast_path(rng.random_bool(0.5))
            .with_track_values(true);
        let list = ObservableVec::with_options(
            Rc::new(EventPublisher::new()),
            initial.clone(),
            options,
        );
        let recorder = Rc::new(RefCell::new(RecordingListener::new()));
        list.add_listener(SubjectId::new(), Rc::clone(&recorder))
            .unwrap();

        let mut next_value = 1_000;
        let mut mirror = initial;
        for round in 0..12 {
            if rng.random_bool(0.1) {
                list.sort_by(|a, b| b.cmp(a)).unwrap();
            } else if rng.random_bool(0.3) {
                list.assembler().use_fast_path(rng.random_bool(0.5));
                random_edit(&mut rng, &list, &mut next_value).unwrap();
            } else {
                random_batch(&mut rng, &list, &mut next_value, 0).unwrap();
            }

            for event in recorder.borrow_mut().events.drain(..) {
                assert!(!event.is_empty(), "seed {seed} round {round}: empty event");
                event.apply_to(&mut mirror).unwrap();
            }
            assert_eq!(mirror, list.to_vec(), "seed {seed} round {round}");
            assert_eq!(list.assembler().nesting_depth(), 0);
        }
    }
}

#[test]
fn published_blocks_are_maximal() {
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let list = ObservableVec::from_vec(Rc::new(EventPublisher::new()), vec![0u32; 8]);
        let recorder = Rc::new(RefCell::new(RecordingListener::new()));
        list.add_listener(SubjectId::new(), Rc::clone(&recorder))
            .unwrap();
        // only zeros and ones, so equal neighbours are common
        list.batch(|list| {
            for _ in 0..rng.random_range(1..10) {
                let len = list.len();
                let value = rng.random_range(0..2);
                match rng.random_range(0..3) {
                    0 => list.insert(rng.random_range(0..=len), value)?,
                    1 if len > 0 => drop(list.remove(rng.random_range(0..len))?),
                    _ if len > 0 => drop(list.set(rng.random_range(0..len), 1)?),
                    _ => list.push(value)?,
                }
            }
            Ok(())
        })
        .unwrap();

        let recorder = recorder.borrow();
        let Some(event) = recorder.events.first() else {
            continue;
        };
        for pair in event.blocks().windows(2) {
            assert!(
                !pair[0].can_absorb(&pair[1]),
                "seed {seed}: {} and {} should be one block",
                pair[0],
                pair[1]
            );
        }
    }
}
