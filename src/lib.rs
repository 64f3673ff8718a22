//! Purpose: Layered archive resolver library used by the `strata` CLI and host loaders.
//! Exports: `core` (archive reading, extraction, resolution, errors) and the `api` facade.
//! Role: Resolves compiled units and resources across a primary archive and its bundled subordinates.
//! Invariants: Resolution chains are immutable once built; lookups are safe from many threads.
//! Invariants: Subordinate failures are recorded as outcomes, never raised.
pub mod api;
pub mod core;
