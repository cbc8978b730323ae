//! # chromacache
//!
//! Concurrent link cache for color transforms.
//!
//! Building a transform is expensive (external engine work, large
//! lookup tables, profile I/O) and the rendering pipeline asks for the
//! same (source, destination, parameters) combination over and over,
//! from many threads at once. This cache guarantees:
//! - at most one build per unique key, no matter how many threads race
//! - a bounded number of resident transforms, with the slot reserved
//!   before the build starts
//! - eviction of idle entries only, oldest-idle first
//! - blocking (optionally bounded) waits when the cache is full of
//!   in-use entries, instead of failure
//!
//! ## Architecture
//! - **Map**: AHash map keyed on the full link key tuple (O(1) lookup)
//! - **Slab**: slot vector with a free list; indices stay stable so a
//!   checkout can point back at its entry
//! - **Monitor**: one mutex plus two condvars ("entry became valid",
//!   "a slot came free"), each waited on in a predicate re-check loop

#![warn(missing_docs)]

mod cache;
mod key;
mod stats;

pub use cache::{Link, LinkCache, DEFAULT_CAPACITY};
pub use key::LinkKey;
pub use stats::{CacheStats, StatsSnapshot};
