//! Schedule Resolution Module
//!
//! Pure cutoff computation for a shop's batching schedule:
//! - which cutoff the next order should target
//! - the next occurrence of every configured slot
//!
//! No I/O happens here; composing these results with live batch state is the
//! orchestrator's job.

mod resolver;


pub use resolver::{next_cutoff, slot_occurrences, validate_slots};
