//! UriTable: structural layer mapping URIs to stored values behind stable
//! generational slots.

use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;
use std::rc::Rc;

/// Stable identifier for a table entry. Generational: a slot freed by
/// `remove` never compares equal to any slot issued later, even when the
/// underlying storage is reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot(DefaultKey);

impl Slot {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Slot(k)
    }
    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Entry<V> {
    uri: Rc<str>,
    value: V,
    hash: u64,
}

/// URI-keyed storage: a hash index over precomputed hashes pointing into
/// slotmap storage. The URI is held as `Rc<str>` so the table and every
/// handle issued for the entry share one allocation.
pub struct UriTable<V> {
    hasher: RandomState,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum InsertError {
    DuplicateUri,
}

impl<V> UriTable<V> {
    pub fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    fn make_hash(&self, uri: &str) -> u64 {
        self.hasher.hash_one(uri)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, uri: &str) -> Option<Slot> {
        let hash = self.make_hash(uri);
        self.index
            .find(hash, |&k| {
                self.slots.get(k).map(|e| &*e.uri == uri).unwrap_or(false)
            })
            .map(|&k| Slot::new(k))
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.find(uri).is_some()
    }

    /// Insert a new URI -> value entry and return its slot. A URI that is
    /// already present is rejected without touching the existing entry.
    pub fn insert(&mut self, uri: Rc<str>, value: V) -> Result<Slot, InsertError> {
        let hash = self.make_hash(&uri);
        let entry = Entry { uri, value, hash };
        // Use HashTable::entry to deduplicate or insert.
        match self.index.entry(
            hash,
            |&k| self.slots.get(k).map(|e| e.uri == entry.uri).unwrap_or(false),
            |&k| self.slots.get(k).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateUri),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(entry);
                let _ = v.insert(k);
                Ok(Slot::new(k))
            }
        }
    }

    pub fn remove(&mut self, slot: Slot) -> Option<(Rc<str>, V)> {
        let k = slot.raw();

        // Remove slot
        let entry = self.slots.remove(k)?;

        // Unlink from index via occupied entry removal
        self.index
            .find_entry(entry.hash, |&kk| kk == k)
            .expect("index holds every live slot")
            .remove();

        Some((entry.uri, entry.value))
    }

    pub fn uri(&self, slot: Slot) -> Option<&Rc<str>> {
        self.slots.get(slot.raw()).map(|e| &e.uri)
    }

    pub fn value(&self, slot: Slot) -> Option<&V> {
        self.slots.get(slot.raw()).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, slot: Slot) -> Option<&mut V> {
        self.slots.get_mut(slot.raw()).map(|e| &mut e.value)
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            it: self.slots.iter(),
        }
    }
}

impl<V> Default for UriTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over live entries in `UriTable`.
pub struct Iter<'a, V> {
    it: slotmap::basic::Iter<'a, DefaultKey, Entry<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Slot, &'a Rc<str>, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(k, e)| (Slot::new(k), &e.uri, &e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn rc(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    /// Invariant: duplicate URIs are rejected and the table remains unchanged.
    #[test]
    fn duplicate_insert_rejected() {
        let mut t: UriTable<i32> = UriTable::new();
        let slot = t.insert(rc("file:///lib/util.pm"), 1).unwrap();
        match t.insert(rc("file:///lib/util.pm"), 2) {
            Err(InsertError::DuplicateUri) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(t.value(slot), Some(&1));
        assert_eq!(t.len(), 1);
    }

    /// Invariant: `find(uri).is_some() == contains(uri)` for present and
    /// absent URIs.
    #[test]
    fn find_contains_parity() {
        let mut t: UriTable<i32> = UriTable::new();
        let present = ["file:///a", "file:///b", "file:///c"];
        for (i, uri) in present.iter().enumerate() {
            t.insert(rc(uri), i as i32).unwrap();
        }

        for uri in present {
            assert!(t.find(uri).is_some());
            assert!(t.contains(uri));
        }

        for uri in ["file:///x", "file:///y", "file:///z"] {
            assert!(t.find(uri).is_none());
            assert!(!t.contains(uri));
        }
    }

    /// Invariant: slot accessors resolve while the entry exists and return
    /// `None` after removal; `value_mut` updates the stored value.
    #[test]
    fn slot_access_and_mutation() {
        let mut t: UriTable<i32> = UriTable::new();
        let slot = t.insert(rc("file:///doc.txt"), 10).unwrap();
        assert_eq!(t.uri(slot).map(|u| &**u), Some("file:///doc.txt"));
        assert_eq!(t.value(slot), Some(&10));

        *t.value_mut(slot).unwrap() += 5;
        assert_eq!(t.value(slot), Some(&15));

        let (uri, value) = t.remove(slot).unwrap();
        assert_eq!(&*uri, "file:///doc.txt");
        assert_eq!(value, 15);
        assert!(t.uri(slot).is_none());
        assert!(t.value(slot).is_none());
        assert!(t.remove(slot).is_none());
    }

    /// Invariant: removing an entry invalidates its slot and does not alias
    /// a new entry inserted afterward, even if the physical slot is reused
    /// (generational keys).
    #[test]
    fn stale_slot_does_not_alias_new_entry() {
        let mut t: UriTable<i32> = UriTable::new();
        let s1 = t.insert(rc("file:///old"), 1).unwrap();
        let _ = t.remove(s1).unwrap();
        // Next insert likely reuses the freed slot with bumped generation.
        let s2 = t.insert(rc("file:///new"), 2).unwrap();
        assert_ne!(s1, s2, "slots must differ across generations");
        assert!(t.value(s1).is_none(), "stale slot must not resolve");
        assert!(t.contains("file:///new"));
        assert!(!t.contains("file:///old"));
    }

    /// Invariant: iteration yields each live entry exactly once and the
    /// table shares the URI allocation it yields.
    #[test]
    fn iteration_yields_live_entries() {
        let mut t: UriTable<i32> = UriTable::new();
        let uris = ["file:///a", "file:///b", "file:///c"];
        for (i, uri) in uris.iter().enumerate() {
            t.insert(rc(uri), i as i32).unwrap();
        }
        let gone = t.find("file:///b").unwrap();
        t.remove(gone).unwrap();

        let seen: BTreeSet<String> = t.iter().map(|(_s, u, _v)| u.to_string()).collect();
        let expected: BTreeSet<String> =
            ["file:///a", "file:///c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
        assert_eq!(t.iter().count(), t.len());

        for (slot, uri, _v) in t.iter() {
            let shared = t.uri(slot).unwrap();
            assert!(Rc::ptr_eq(shared, uri));
        }
    }
}
