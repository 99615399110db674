//! Case-insensitive name set.
//!
//! Header names, mapped column names, and table column names are all compared
//! without regard to case, but log lines and generated statements must keep
//! the casing the name was first seen with. [`CaseFoldSet`] keys entries by
//! their lower-cased form and hands back the original spelling.

use std::collections::{BTreeMap, btree_map};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFoldSet {
    entries: BTreeMap<String, String>,
}

impl CaseFoldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value`; returns `false` when a case-insensitive equal is already
    /// present, in which case the existing casing is kept.
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.entries.entry(fold(&value)) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains_key(&fold(value))
    }

    /// Returns the canonical (first-added) casing of `value`.
    pub fn get(&self, value: &str) -> Option<&str> {
        self.entries.get(&fold(value)).map(String::as_str)
    }

    pub fn remove(&mut self, value: &str) -> Option<String> {
        self.entries.remove(&fold(value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates canonical values ordered by their folded form.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CaseFoldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CaseFoldSet::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for CaseFoldSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

pub(crate) fn fold(value: &str) -> String {
    value.to_lowercase()
}
