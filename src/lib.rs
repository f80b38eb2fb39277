//! Personal command-line time tracker. Punch in and out of named projects,
//! annotate sessions with comments, and report tracked hours and pay from
//! the recorded history. Sessions live in per-day JSON files; older file
//! formats are migrated forward transparently on read.
//!

pub mod cli;
pub mod config;
pub mod errors;
pub mod storage;
pub mod utils;
