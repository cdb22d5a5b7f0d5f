//! Relay-facing error taxonomy: what goes wrong during auth, addressing,
//! delivery, and frame parsing, independent of the durable-storage errors
//! `dmrelay_core::io::InboxError` already covers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("address {address} could not be resolved")]
    Address { address: String },

    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },

    #[error("could not parse frame: {reason}")]
    Parse { reason: String },

    #[error("protocol violation: {reason}")]
    Protocol { reason: String },

    #[error(transparent)]
    InboxIo(#[from] dmrelay_core::io::InboxError),
}
