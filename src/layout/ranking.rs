use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Longest-path ranks over a topological order that follows declaration order.
/// Cycles are broken at the earliest declared remaining node; edges pointing
/// backwards in the resulting order do not constrain ranks.
pub(super) fn compute_ranks(node_ids: &[usize], edges: &[(usize, usize)]) -> BTreeMap<usize, usize> {
    let order_key: BTreeMap<usize, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, idx))
        .collect();
    let key = |id: usize| order_key.get(&id).copied().unwrap_or(usize::MAX);

    let mut adj: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut indeg: BTreeMap<usize, usize> = node_ids.iter().map(|id| (*id, 0)).collect();
    for &(from, to) in edges {
        if !order_key.contains_key(&from) || !order_key.contains_key(&to) || from == to {
            continue;
        }
        adj.entry(from).or_default().push(to);
        *indeg.entry(to).or_insert(0) += 1;
    }

    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = indeg
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| Reverse((key(*id), *id)))
        .collect();
    let mut order = Vec::with_capacity(node_ids.len());
    let mut processed = BTreeSet::new();
    loop {
        while let Some(Reverse((_, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(&id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((key(*next), *next)));
                    }
                }
            }
        }
        if processed.len() >= node_ids.len() {
            break;
        }
        let Some(next) = node_ids
            .iter()
            .copied()
            .filter(|id| !processed.contains(id))
            .min_by_key(|id| key(*id))
        else {
            break;
        };
        ready.push(Reverse((key(next), next)));
    }

    let position: BTreeMap<usize, usize> =
        order.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let mut ranks: BTreeMap<usize, usize> = BTreeMap::new();
    for &node in &order {
        let rank = *ranks.entry(node).or_insert(0);
        let from_idx = position.get(&node).copied().unwrap_or(0);
        for next in adj.get(&node).into_iter().flatten() {
            if position.get(next).is_none_or(|to_idx| *to_idx <= from_idx) {
                continue;
            }
            let entry = ranks.entry(*next).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }
    ranks
}

/// Median-heuristic crossing reduction, sweeping down then up `passes` times.
pub(super) fn order_rank_nodes(rank_nodes: &mut [Vec<usize>], edges: &[(usize, usize)], passes: usize) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(from, to) in edges {
        outgoing.entry(from).or_default().push(to);
        incoming.entry(to).or_default().push(from);
    }

    let positions_of = |rank_nodes: &[Vec<usize>]| -> BTreeMap<usize, usize> {
        rank_nodes
            .iter()
            .flat_map(|bucket| bucket.iter().enumerate().map(|(idx, id)| (*id, idx)))
            .collect()
    };
    let mut positions = positions_of(rank_nodes);

    let sort_bucket = |bucket: &mut Vec<usize>,
                       neighbors: &BTreeMap<usize, Vec<usize>>,
                       positions: &BTreeMap<usize, usize>| {
        let current: BTreeMap<usize, usize> =
            bucket.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
        let mut keyed: Vec<(f32, usize, usize)> = bucket
            .iter()
            .enumerate()
            .map(|(idx, id)| (median_position(*id, neighbors, positions, &current), idx, *id))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        *bucket = keyed.into_iter().map(|(_, _, id)| id).collect();
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
            positions = positions_of(rank_nodes);
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
            positions = positions_of(rank_nodes);
        }
    }
}

pub(super) fn median_position(
    node_id: usize,
    neighbors: &BTreeMap<usize, Vec<usize>>,
    positions: &BTreeMap<usize, usize>,
    current: &BTreeMap<usize, usize>,
) -> f32 {
    let fallback = current.get(&node_id).copied().unwrap_or(0) as f32;
    let mut values: Vec<f32> = neighbors
        .get(&node_id)
        .into_iter()
        .flatten()
        .filter_map(|neighbor| positions.get(neighbor).map(|pos| *pos as f32))
        .collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_longest_path() {
        let ranks = compute_ranks(&[0, 1, 2, 3], &[(0, 1), (1, 2), (0, 2), (2, 3)]);
        assert_eq!(ranks[&0], 0);
        assert_eq!(ranks[&1], 1);
        assert_eq!(ranks[&2], 2);
        assert_eq!(ranks[&3], 3);
    }

    #[test]
    fn cycles_are_broken_in_declaration_order() {
        let ranks = compute_ranks(&[0, 1, 2], &[(0, 1), (1, 2), (2, 1)]);
        assert_eq!(ranks[&0], 0);
        assert_eq!(ranks[&1], 1);
        assert_eq!(ranks[&2], 2);
    }

    #[test]
    fn ordering_uncrosses_simple_pairs() {
        let mut ranks = vec![vec![0, 1], vec![3, 2]];
        order_rank_nodes(&mut ranks, &[(0, 2), (1, 3)], 2);
        assert_eq!(ranks[0], vec![0, 1]);
        assert_eq!(ranks[1], vec![2, 3]);
    }
}
