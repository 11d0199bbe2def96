use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::cmp::Reverse;

use crate::dag::PlanError;

/// Orders the keys of `adjacency` so that every producer precedes its
/// consumers. Ties are broken by `string_of`, making plans reproducible for
/// equal inputs.
pub(crate) fn topological_sort<K, F>(
    adjacency: &BTreeMap<K, Vec<K>>,
    string_of: F,
) -> Result<Vec<K>, PlanError>
where
    K: Copy + Ord + std::hash::Hash,
    F: Fn(&K) -> String,
{
    let mut in_degree: HashMap<K, usize> = adjacency.keys().map(|k| (*k, 0)).collect();
    for downstream in adjacency.values() {
        for k in downstream {
            *in_degree
                .get_mut(k)
                .ok_or_else(|| PlanError::Internal("downstream key missing from adjacency".to_string()))? += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(String, K)>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(k, _)| Reverse((string_of(k), *k)))
        .collect();

    let mut sorted = Vec::with_capacity(adjacency.len());
    while let Some(Reverse((_, k))) = ready.pop() {
        sorted.push(k);
        for downstream in &adjacency[&k] {
            let degree = in_degree.get_mut(downstream).expect("checked above");
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse((string_of(downstream), *downstream)));
            }
        }
    }

    if sorted.len() != adjacency.len() {
        return Err(PlanError::CycleDetected);
    }
    Ok(sorted)
}
