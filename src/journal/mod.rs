//! Journal: per-host JSONL event log and BLAKE3 run-list digests.

pub mod digest;
pub mod eventlog;

pub use eventlog::Journal;
