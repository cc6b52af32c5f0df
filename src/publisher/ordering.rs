// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Dependency ordering of (subject, listener) pairs.

use crate::{SubjectId, create_map};
use std::collections::VecDeque;

/// Orders `edges` so that every edge into a subject comes before any edge out of it.
///
/// Each edge is a `(subject, target)` pair, where the target is the subject the listener stands
/// for. Subjects without incoming edges are processed first, in order of first appearance. Once
/// every edge into a target has been processed, all edges into that target are emitted in
/// registration order and the target is queued.
///
/// Returns the edge indices in notification order, or every edge that could not be ordered if the
/// edges contain a cycle.
pub(super) fn dependency_order(
    edges: &[(SubjectId, SubjectId)],
) -> Result<Vec<usize>, Vec<(SubjectId, SubjectId)>> {
    let mut nodes = create_map::<SubjectId, usize>();
    let mut appearance = Vec::new();
    let mut node_of = |subject: SubjectId| {
        *nodes.entry(subject).or_insert_with(|| {
            appearance.push(subject);
            appearance.len() - 1
        })
    };
    let edges_by_node: Vec<(usize, usize)> = edges
        .iter()
        .map(|&(subject, target)| (node_of(subject), node_of(target)))
        .collect();

    let node_count = appearance.len();
    let mut unsatisfied = vec![0usize; node_count];
    let mut outgoing = vec![Vec::new(); node_count];
    let mut incoming = vec![Vec::new(); node_count];
    for (edge, &(source, target)) in edges_by_node.iter().enumerate() {
        unsatisfied[target] += 1;
        outgoing[source].push(edge);
        incoming[target].push(edge);
    }

    let mut queue: VecDeque<usize> = (0..node_count)
        .filter(|&node| unsatisfied[node] == 0)
        .collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(node) = queue.pop_front() {
        for &edge in &outgoing[node] {
            let target = edges_by_node[edge].1;
            unsatisfied[target] -= 1;
            if unsatisfied[target] == 0 {
                order.extend_from_slice(&incoming[target]);
                queue.push_back(target);
            }
        }
    }

    if order.len() == edges.len() {
        return Ok(order);
    }
    let mut emitted = vec![false; edges.len()];
    for &edge in &order {
        emitted[edge] = true;
    }
    Err(edges
        .iter()
        .zip(emitted)
        .filter_map(|(&edge, emitted)| (!emitted).then_some(edge))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subjects<const N: usize>() -> [SubjectId; N] {
        std::array::from_fn(|_| SubjectId::new())
    }

    #[test]
    fn chain_with_shortcut() {
        let [a, b, c] = subjects();
        // every registration order puts (a, b) first and (b, c) after it
        let pairs = [(a, b), (b, c), (a, c)];
        for rotation in 0..3 {
            let mut edges = pairs;
            edges.rotate_left(rotation);
            let order: Vec<_> = dependency_order(&edges)
                .unwrap()
                .into_iter()
                .map(|edge| edges[edge])
                .collect();
            assert_eq!(order[0], (a, b), "{edges:?}");
            let b_to_c = order.iter().position(|&edge| edge == (b, c)).unwrap();
            let a_to_c = order.iter().position(|&edge| edge == (a, c)).unwrap();
            assert!(b_to_c > 0 && a_to_c > 0);
        }
    }

    #[test]
    fn independent_sources_keep_registration_order() {
        let [a, b, x, y] = subjects();
        let edges = [(b, y), (a, x), (b, x)];
        let order = dependency_order(&edges).unwrap();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn cycle_reports_remaining_edges() {
        let [a, b, c, d] = subjects();
        let edges = [(d, a), (a, b), (b, c), (c, a)];
        let remaining = dependency_order(&edges).unwrap_err();
        assert_eq!(remaining, [(d, a), (a, b), (b, c), (c, a)]);
    }

    #[test]
    fn self_listener_is_a_cycle() {
        let [a] = subjects();
        assert_eq!(dependency_order(&[(a, a)]).unwrap_err(), [(a, a)]);
    }

    #[test]
    fn empty() {
        assert_eq!(dependency_order(&[]).unwrap(), Vec::<usize>::new());
    }
}
