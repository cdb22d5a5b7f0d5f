//! The Inbox Store: durable, per-recipient append-only message files.

pub mod parser;
pub mod store;

pub use parser::{format_record, parse_records};
pub use store::{
    append, complete_task, delete, dispatch_task, existing_ids, find_thread, inbox_path, mark,
    scan, MutationOutcome,
};
