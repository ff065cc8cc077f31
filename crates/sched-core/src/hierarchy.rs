//! Parent-before-child ordering of flat hierarchies
//!
//! Code values, WBS entries and similar trees arrive as flat lists where each
//! entry names its parent. Sources make no promise about order, and real
//! exports contain orphans and the occasional cycle, so the sort works in
//! stable passes and never drops an entry.

use std::collections::HashSet;
use std::hash::Hash;

/// An entry that knows its own id and its parent's id
pub trait HierarchyEntry {
    type Id: Eq + Hash + Copy;

    fn entry_id(&self) -> Option<Self::Id>;

    fn parent_id(&self) -> Option<Self::Id>;
}

/// Sort entries implementing [`HierarchyEntry`]
pub fn sort_entries<T: HierarchyEntry>(entries: Vec<T>) -> Vec<T> {
    sort_hierarchy(entries, T::entry_id, T::parent_id)
}

/// Reorder `entries` so that every parent present in the input precedes its
/// children.
///
/// Each pass appends, in input order, every remaining entry whose parent is
/// absent, outside the input, the entry itself, or already placed. When a
/// pass places nothing the rest form cycles or depend on one; they are
/// appended in input order. The output is always a permutation of the input.
pub fn sort_hierarchy<T, K, I, P>(entries: Vec<T>, id_fn: I, parent_fn: P) -> Vec<T>
where
    K: Eq + Hash + Copy,
    I: Fn(&T) -> Option<K>,
    P: Fn(&T) -> Option<K>,
{
    let known: HashSet<K> = entries.iter().filter_map(&id_fn).collect();
    let mut placed: HashSet<K> = HashSet::with_capacity(known.len());
    let mut sorted = Vec::with_capacity(entries.len());
    let mut remaining = entries;
    let mut passes = 0usize;

    while !remaining.is_empty() {
        passes += 1;
        let before = remaining.len();
        let mut deferred = Vec::new();

        for entry in remaining {
            let id = id_fn(&entry);
            let ready = match parent_fn(&entry) {
                None => true,
                Some(parent) => {
                    Some(parent) == id || !known.contains(&parent) || placed.contains(&parent)
                }
            };

            if ready {
                if let Some(id) = id {
                    placed.insert(id);
                }
                sorted.push(entry);
            } else {
                deferred.push(entry);
            }
        }

        if deferred.len() == before {
            tracing::warn!(
                entries = deferred.len(),
                "hierarchy contains a cycle, keeping remaining entries in input order"
            );
            sorted.extend(deferred);
            break;
        }

        remaining = deferred;
    }

    tracing::debug!(entries = sorted.len(), passes, "sorted hierarchy");
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node {
        id: i32,
        parent: Option<i32>,
    }

    impl HierarchyEntry for Node {
        type Id = i32;

        fn entry_id(&self) -> Option<i32> {
            Some(self.id)
        }

        fn parent_id(&self) -> Option<i32> {
            self.parent
        }
    }

    fn node(id: i32, parent: Option<i32>) -> Node {
        Node { id, parent }
    }

    fn ids(nodes: &[Node]) -> Vec<i32> {
        nodes.iter().map(|n| n.id).collect()
    }

    fn assert_parents_first(nodes: &[Node]) {
        let present: HashSet<i32> = nodes.iter().map(|n| n.id).collect();
        for (pos, n) in nodes.iter().enumerate() {
            if let Some(parent) = n.parent {
                if parent != n.id && present.contains(&parent) {
                    let parent_pos = nodes.iter().position(|p| p.id == parent).unwrap();
                    assert!(parent_pos < pos, "parent {parent} after child {}", n.id);
                }
            }
        }
    }

    #[test]
    fn test_children_before_parents_reordered() {
        let input = vec![
            node(3, Some(2)),
            node(2, Some(1)),
            node(1, None),
            node(4, Some(1)),
        ];
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), vec![1, 4, 2, 3]);
        assert_parents_first(&sorted);
    }

    #[test]
    fn test_stable_for_sorted_input() {
        let input = vec![node(1, None), node(2, Some(1)), node(3, Some(2)), node(4, None)];
        let sorted = sort_entries(input.clone());
        assert_eq!(sorted, input);
    }

    #[test]
    fn test_orphan_treated_as_root() {
        let input = vec![node(2, Some(99)), node(1, None)];
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn test_two_cycle_terminates() {
        let input = vec![node(1, Some(2)), node(2, Some(1))];
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), vec![1, 2]);
    }

    #[test]
    fn test_cycle_keeps_descendants() {
        let input = vec![
            node(5, Some(3)),
            node(1, None),
            node(3, Some(4)),
            node(4, Some(3)),
            node(2, Some(1)),
        ];
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), vec![1, 2, 5, 3, 4]);
    }

    #[test]
    fn test_self_parent_is_root() {
        let input = vec![node(2, Some(1)), node(1, Some(1))];
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), vec![1, 2]);
    }

    #[test]
    fn test_permutation_of_input() {
        let input = vec![
            node(7, Some(3)),
            node(3, Some(9)),
            node(9, Some(7)),
            node(1, Some(8)),
            node(8, None),
            node(6, Some(1)),
            node(2, Some(2)),
        ];
        let sorted = sort_entries(input.clone());
        assert_eq!(sorted.len(), input.len());
        let mut expected = ids(&input);
        let mut actual = ids(&sorted);
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_deep_reversed_chain() {
        let depth = 2_000;
        let input: Vec<Node> = (1..=depth)
            .rev()
            .map(|id| node(id, if id == 1 { None } else { Some(id - 1) }))
            .collect();
        let sorted = sort_entries(input);
        assert_eq!(ids(&sorted), (1..=depth).collect::<Vec<_>>());
    }

    #[test]
    fn test_closures_over_missing_ids() {
        let input: Vec<(Option<i32>, Option<i32>)> = vec![(None, Some(1)), (Some(1), None)];
        let sorted = sort_hierarchy(input, |e| e.0, |e| e.1);
        assert_eq!(sorted, vec![(Some(1), None), (None, Some(1))]);
    }

    #[test]
    fn test_empty_input() {
        let sorted = sort_entries(Vec::<Node>::new());
        assert!(sorted.is_empty());
    }
}
