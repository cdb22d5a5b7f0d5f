//! Core types and durable storage for dmrelay
//!
//! This crate provides the pieces shared between the relay server and the
//! client: the `Message` record and its org-mode-style on-disk grammar, id
//! generation and thread resolution, the Agent Address Resolver, the Inbox
//! Store, the Agent Task Queue, and the Side-channel Router. The wire
//! protocol and session/presence machinery live in `dmrelay-server`; this
//! crate is entirely transport-agnostic.

pub mod config;
pub mod id;
pub mod inbox;
pub mod io;
pub mod logging;
pub mod message;
pub mod resolver;
pub mod sidechannel;
pub mod task_queue;

pub use message::{Message, Priority, StatusTag, TaskStatus};

// Re-export toml for config file access from downstream crates.
pub use toml;
