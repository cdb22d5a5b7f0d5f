//! File I/O primitives for inbox files
//!
//! Inbox files are append-mostly org-mode-style text files, one per agent.
//! This module provides the two things every higher-level inbox operation
//! needs on top of `std::fs`:
//!
//! - **File locking**: advisory locks with exponential backoff retry, so
//!   concurrent readers/writers (the relay client and the agent's own tools)
//!   don't interleave partial writes.
//! - **Atomic rewrite**: temp-file-then-rename so a reader never observes a
//!   half-written file, even if the process rewriting it is killed mid-write.

pub mod error;
pub mod lock;
pub mod rewrite;

pub use error::InboxError;
pub use lock::{acquire_lock, FileLock};
pub use rewrite::{append, rewrite as rewrite_file};
