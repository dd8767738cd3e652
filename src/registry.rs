//! DependencyRegistry: reference counting and handle identity atop
//! `UriTable`.

use crate::uri_table::{self, Slot, UriTable};
use core::hash::{Hash, Hasher};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

/// Error for a `release` or `evict` that targets a URI with no live
/// entry: the caller's acquire/release bookkeeping is broken. The failed
/// call mutates nothing.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("imbalanced reference: no live dependency for `{uri}`")]
pub struct ImbalancedReference {
    uri: String,
}

impl ImbalancedReference {
    fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
        }
    }

    /// The URI the failed call targeted.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Opaque identity token for a live dependency entry.
///
/// Every handle issued for a URI while its entry stays live compares
/// equal to the others and shares one `Rc<str>` allocation; once the
/// entry is evicted, the next acquire mints a handle unequal to every
/// handle issued before. Equality and hashing are by identity, never by
/// URI string value, so handles can index per-dependency state in hash
/// maps. Holding a `Dependency` does not keep its entry alive; only the
/// explicit reference count does.
#[derive(Clone)]
pub struct Dependency {
    slot: Slot,
    uri: Rc<str>,
}

impl Dependency {
    fn new(slot: Slot, uri: Rc<str>) -> Self {
        Self { slot, uri }
    }

    /// The URI this handle was created for.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && Rc::ptr_eq(&self.uri, &other.uri)
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.uri) as *const u8 as usize).hash(state);
        self.slot.hash(state);
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dependency").field(&self.uri).finish()
    }
}

// Per-entry bookkeeping: the number of outstanding, unmatched acquires.
struct Descriptor {
    count: usize,
}

/// Reference-counted registry of file dependencies, keyed by URI.
///
/// The registry is the exclusive owner of its entries. An entry exists
/// exactly while its count is positive: the first `acquire` for a URI
/// creates it, matched `release`s tear it down, and eviction happens
/// synchronously the instant the count reaches zero. Callers MUST pair
/// every `acquire` with exactly one `release`; there is no fallback
/// reclamation.
pub struct DependencyRegistry {
    table: UriTable<Descriptor>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self {
            table: UriTable::new(),
        }
    }

    /// Number of live dependency entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether `uri` currently has a live entry.
    pub fn contains(&self, uri: &str) -> bool {
        self.table.contains(uri)
    }

    /// Record one more acquisition of `uri` and return its handle.
    ///
    /// The first acquire for a URI creates its entry with a count of 1
    /// and mints the handle; later acquires while the entry lives bump
    /// the count and return the same handle identity. Never fails.
    pub fn acquire(&mut self, uri: &str) -> Dependency {
        if let Some(slot) = self.table.find(uri) {
            let count = {
                let descriptor = self
                    .table
                    .value_mut(slot)
                    .expect("slot returned by find is live");
                descriptor.count += 1;
                descriptor.count
            };
            trace!(uri, count, "dependency reference added");
            let shared = self
                .table
                .uri(slot)
                .expect("slot returned by find is live");
            return Dependency::new(slot, Rc::clone(shared));
        }

        let shared: Rc<str> = Rc::from(uri);
        let slot = self
            .table
            .insert(Rc::clone(&shared), Descriptor { count: 1 })
            .expect("URI was absent, insert cannot collide");
        debug!(uri, "dependency created");
        Dependency::new(slot, shared)
    }

    /// Withdraw one acquisition of `uri`.
    ///
    /// Releasing the last outstanding acquisition evicts the entry
    /// synchronously before this call returns; a later `acquire` of the
    /// same URI starts a fresh entry with a new handle identity.
    ///
    /// # Errors
    ///
    /// `ImbalancedReference` if `uri` has no live entry, i.e. a release
    /// without a matching acquire.
    pub fn release(&mut self, uri: &str) -> Result<(), ImbalancedReference> {
        let Some(slot) = self.table.find(uri) else {
            return Err(ImbalancedReference::new(uri));
        };
        let count = {
            let descriptor = self
                .table
                .value_mut(slot)
                .expect("slot returned by find is live");
            descriptor.count -= 1;
            descriptor.count
        };
        if count == 0 {
            self.table
                .remove(slot)
                .expect("slot returned by find is live");
            debug!(uri, "dependency evicted");
        } else {
            trace!(uri, count, "dependency reference removed");
        }
        Ok(())
    }

    /// Return the live handle for `uri` without touching its count.
    ///
    /// Absence is a normal outcome, not an error.
    pub fn get(&self, uri: &str) -> Option<Dependency> {
        let slot = self.table.find(uri)?;
        let shared = self
            .table
            .uri(slot)
            .expect("slot returned by find is live");
        Some(Dependency::new(slot, Rc::clone(shared)))
    }

    /// Number of outstanding, unmatched acquisitions for `uri`, if live.
    pub fn ref_count(&self, uri: &str) -> Option<usize> {
        let slot = self.table.find(uri)?;
        self.table.value(slot).map(|d| d.count)
    }

    /// Drop `uri`'s entry outright, regardless of its count.
    ///
    /// Intended for resources that ceased to exist (e.g. deleted on
    /// disk) while consumers still hold acquisitions; those acquisitions
    /// are settled by the eviction and must not be released afterward.
    ///
    /// # Errors
    ///
    /// `ImbalancedReference` if `uri` has no live entry.
    pub fn evict(&mut self, uri: &str) -> Result<(), ImbalancedReference> {
        let Some(slot) = self.table.find(uri) else {
            return Err(ImbalancedReference::new(uri));
        };
        self.table
            .remove(slot)
            .expect("slot returned by find is live");
        debug!(uri, "dependency evicted");
        Ok(())
    }

    /// Iterate over the handle of every live entry, in no particular
    /// order. A point-in-time view; the registry cannot be mutated while
    /// the iterator borrows it.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            it: self.table.iter(),
        }
    }
}

impl Default for DependencyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over live dependencies, yielding one `Dependency` per URI.
pub struct Iter<'a> {
    it: uri_table::Iter<'a, Descriptor>,
}

impl Iterator for Iter<'_> {
    type Item = Dependency;
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(slot, uri, _d)| Dependency::new(slot, Rc::clone(uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: the error carries the offending URI, both through the
    /// accessor and in its display message.
    #[test]
    fn imbalanced_reference_reports_uri() {
        let mut r = DependencyRegistry::new();
        let err = r.release("file:///missing.pm").unwrap_err();
        assert_eq!(err.uri(), "file:///missing.pm");
        assert!(err.to_string().contains("file:///missing.pm"));
    }

    /// Invariant: handle equality is identity, not URI string equality.
    /// Handles for the same URI from different registries never compare
    /// equal.
    #[test]
    fn handles_compare_by_identity_not_uri() {
        let mut r1 = DependencyRegistry::new();
        let mut r2 = DependencyRegistry::new();
        let h1 = r1.acquire("file:///shared.pm");
        let h2 = r2.acquire("file:///shared.pm");
        assert_eq!(h1.uri(), h2.uri());
        assert_ne!(h1, h2);
    }
}
