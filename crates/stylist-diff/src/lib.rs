//! Unified diff parsing.
//!
//! This crate parses `git diff` style unified multi-file diffs into per-file
//! hunk summaries. It is I/O-free; the engine turns each [`FileDiff`] into a
//! formatting finding.

mod unified;

pub use unified::{parse_multi_file_diff, DiffParseError, FileDiff, Hunk};
