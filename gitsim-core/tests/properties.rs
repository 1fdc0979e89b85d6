//! Property tests for the ordering and balance invariants of the index trees.

use std::collections::{BTreeMap, BTreeSet};

use gitsim_core::{BlockIndex, BranchHierarchy, ContributorIndex, IndexSnapshot, RoleDirectory};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u16),
    Delete(u16),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0u16..400, any::<u16>()).prop_map(|(k, v)| Op::Insert(k, v)),
            2 => (0u16..400).prop_map(Op::Delete),
        ],
        0..300,
    )
}

fn role_key(k: u16) -> String {
    format!("user{:03}@example.com", k)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn block_index_matches_btreemap(ops in ops(), degree in 2usize..6) {
        let mut index = BlockIndex::new(degree).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(index.insert(k, v), model.insert(k, v));
                }
                Op::Delete(k) => {
                    prop_assert_eq!(index.delete(&k), model.remove(&k));
                }
            }
            prop_assert_eq!(index.validate(), Ok(()));
        }

        prop_assert_eq!(index.len(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(index.search(k), Some(v));
        }
        let mut keys: Vec<u16> = index.traverse_preorder().into_iter().map(|(k, _, _)| *k).collect();
        keys.sort_unstable();
        prop_assert_eq!(keys, model.keys().copied().collect::<Vec<_>>());
    }

    #[test]
    fn role_directory_stays_balanced(ops in ops()) {
        let mut directory = RoleDirectory::new();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let key = role_key(k);
                    let value = format!("role{}", v);
                    let previous = directory.insert(&key, value.as_str());
                    prop_assert_eq!(previous, model.insert(key, value));
                }
                Op::Delete(k) => {
                    let key = role_key(k);
                    prop_assert_eq!(directory.delete(&key), model.remove(&key));
                }
            }
            prop_assert_eq!(directory.validate(), Ok(()));
        }

        prop_assert_eq!(directory.len(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(directory.search(k), Some(v.as_str()));
        }
        // AVL height bound: h < 1.45 * log2(n + 2)
        let bound = 1.45 * ((model.len() + 2) as f64).log2();
        prop_assert!((directory.height() as f64) < bound + 1.0);
    }

    #[test]
    fn contributor_index_keeps_search_order(ops in ops()) {
        let mut index = ContributorIndex::new();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(k, _) => {
                    let name = format!("dev{:03}", k);
                    if model.insert(name.clone()) {
                        index.insert(name, "dev@example.com", "developer");
                    }
                }
                Op::Delete(k) => {
                    let name = format!("dev{:03}", k);
                    let removed = index.delete(&name).map(|c| c.name);
                    prop_assert_eq!(removed.is_some(), model.remove(&name));
                }
            }
            prop_assert_eq!(index.validate(), Ok(()));
        }

        prop_assert_eq!(index.len(), model.len());
        let mut listed: Vec<&str> = index.list_all().into_iter().map(|c| c.name.as_str()).collect();
        listed.sort_unstable();
        prop_assert_eq!(listed, model.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn delete_twice_is_a_noop(keys in prop::collection::btree_set(0u16..1000, 1..200), victim in 0u16..1000) {
        let mut index = BlockIndex::default();
        for &k in &keys {
            index.insert(k, ());
        }
        index.delete(&victim);
        let before = index.traverse_preorder().into_iter().map(|(k, _, d)| (*k, d)).collect::<Vec<_>>();
        prop_assert_eq!(index.delete(&victim), None);
        let after = index.traverse_preorder().into_iter().map(|(k, _, d)| (*k, d)).collect::<Vec<_>>();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn only_merged_branches_are_removed(flags in prop::collection::vec(any::<bool>(), 1..20)) {
        let mut branches = BranchHierarchy::new();
        let main = branches.root();
        for (i, &merged) in flags.iter().enumerate() {
            let id = branches.add_child(main, format!("feature-{}", i)).unwrap();
            branches.set_merged(id, merged).unwrap();
        }

        for (i, &merged) in flags.iter().enumerate() {
            let name = format!("feature-{}", i);
            prop_assert_eq!(branches.remove_child(main, &name), merged);
            prop_assert_eq!(branches.find_branch(&name).is_some(), !merged);
        }
        let unmerged = flags.iter().filter(|&&merged| !merged).count();
        prop_assert_eq!(branches.branch_count(), unmerged + 1);
    }
}

#[test]
fn empty_index_set_snapshot_round_trips() {
    let set = gitsim_core::IndexSet::default();
    let bytes = set.snapshot().to_bytes().unwrap();
    let restored = gitsim_core::IndexSet::restore(IndexSnapshot::from_bytes(&bytes).unwrap()).unwrap();
    assert_eq!(restored.branches.list_all(), vec!["main"]);
    assert!(restored.contributors.is_empty());
    assert!(restored.blocks.is_empty());
    assert!(restored.roles.is_empty());
}
