//! Two-tier expiring cache for external lookup results.
//!
//! Layering: an in-process short-TTL map in front of one JSON collection per
//! namespace on disk, optionally mirrored to the object store. A `set`
//! rewrites the whole per-namespace collection (read-modify-write), a
//! simplicity/cost tradeoff that is acceptable only while collections stay
//! small. An entry older than the expiry horizon reads as a miss even though
//! it stays on disk until the next overwrite.

pub mod memory;
pub mod tiered;

pub use tiered::TieredCache;
