// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

/// Key -> { Cell } index with ordered iteration.
#[derive(Clone, Debug)]
pub struct SetMap<K, C>
where
    K: Ord,
{
    map: BTreeMap<K, BTreeSet<C>>,
}

impl<K, C> Display for SetMap<K, C>
where
    K: Ord + Display,
    C: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (k, set) in self.map.iter() {
            write!(f, "{}:", k)?;
            for v in set.iter() {
                write!(f, " {}", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<K, C> SetMap<K, C>
where
    K: Ord,
    C: Ord,
{
    pub fn new() -> SetMap<K, C> {
        SetMap {
            map: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&BTreeSet<C>> {
        self.map.get(key)
    }

    pub fn insert(&mut self, key: K, val: C) {
        self.map.entry(key).or_default().insert(val);
    }

    pub fn remove(&mut self, key: &K, val: &C) {
        let Some(set) = self.map.get_mut(key) else {
            return;
        };
        set.remove(val);
        if set.is_empty() {
            self.map.remove(key);
        }
    }

    pub fn contains(&self, key: &K, val: &C) -> bool {
        self.map.get(key).is_some_and(|set| set.contains(val))
    }

    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, K, BTreeSet<C>> {
        self.map.iter()
    }

    /// Union of all cells whose key satisfies `pred`.
    pub fn collect_where<F>(&self, pred: F) -> BTreeSet<&C>
    where
        F: Fn(&K) -> bool,
    {
        self.map
            .iter()
            .filter(|(k, _)| pred(*k))
            .flat_map(|(_, set)| set.iter())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
