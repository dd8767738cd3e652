//! dep-registry: a single-threaded registry that maps resource URIs to
//! unique, reference-counted dependency handles for language tooling
//! hosts.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let many independent consumers declare and withdraw interest
//!   in the same resource (typically a file) without duplicating handle
//!   objects or leaking registry entries once the last consumer is gone.
//! - Layers:
//!   - UriTable<V>: structural map from URI to a stored value that
//!     returns stable, generational `Slot`s for O(1) average access
//!     without re-hashing.
//!   - DependencyRegistry: public API that pairs each live URI with a
//!     reference count and a unique `Dependency` handle; evicts the
//!     entry the instant its count reaches zero.
//!
//! Constraints
//! - Single-threaded: handles share their URI via `Rc`, so the types are
//!   `!Send`/`!Sync` by construction (no atomics, no locks). A
//!   multi-threaded host must wrap the registry in its own mutual
//!   exclusion.
//! - Explicit accounting only: every `acquire` must be paired with
//!   exactly one `release`. There is no fallback reclamation; an
//!   unmatched `release` is a caller bug surfaced as
//!   `ImbalancedReference`.
//! - Stable identity: all handles issued for a URI while its entry stays
//!   live compare equal and share one allocation; after eviction the
//!   next acquire mints a handle unequal to every earlier one.
//!   Generational slots make this structural rather than conventional.
//!
//! Why this split?
//! - Localize invariants: UriTable owns index/storage consistency and
//!   duplicate rejection; the registry owns counting and eviction.
//! - Clear failure boundaries: the structural layer never observes an
//!   imbalanced count, and the registry never touches the hash index
//!   directly.
//!
//! Hasher and rehashing invariants
//! - Each entry stores a precomputed `u64` hash and indexing always uses
//!   the stored hash; a URI is never re-hashed after insertion.
//!
//! Eviction semantics
//! - A release that drives the count to zero removes the entry
//!   synchronously before returning. Nothing is deferred or batched;
//!   callers may rely on `get` reporting absence immediately afterward.
//!
//! Notes and non-goals
//! - No durability: state lives for the owning process only; dependencies
//!   are re-established as documents are reopened.
//! - No change notification, file reading, or URI normalization; keys are
//!   opaque strings.
//! - Public API surface is `DependencyRegistry`, `Dependency`, and
//!   `ImbalancedReference`; the `uri_table` layer is an implementation
//!   detail.

mod registry;
pub mod uri_table;

// Public surface
pub use registry::{Dependency, DependencyRegistry, ImbalancedReference, Iter};
