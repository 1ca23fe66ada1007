//! Background job bodies, one per job type.
//!
//! Every worker follows the same skeleton: walk the job type's checkpoint
//! schedule with merge-updates, finish with a single terminal update carrying
//! the result payload, and on any escaping error issue one
//! `failed`-with-error-text update. Workers never raise to their spawner.

pub mod merge;
pub mod research;
pub mod validate;
