//! Agent Address Resolver: the `@claude` indirection and per-owner
//! whitelists.
//!
//! Pure by design — it never touches relay state, so routing rules can be
//! unit-tested without a live socket.

/// Outcome of resolving a `(from, to)` address pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Deliver to `target` as normal.
    Allowed { target: String },
    /// `from` is not on `target`'s whitelist; synthesize an auto-reply
    /// instead of delivering.
    Refused {
        /// The `-claude` address that refused the message.
        target: String,
        /// Message text to send back to `from`, "from" `target`.
        auto_reply_text: String,
    },
}

/// A read-only view of whatever whitelist (if any) the session for a
/// `-claude` owner currently has. `None` means no live session for that
/// owner exists, in which case no whitelist is consulted at all.
pub trait WhitelistLookup {
    /// Returns `Some(whitelist)` if a session for `owner`'s `-claude`
    /// address exists. An empty slice means "unrestricted".
    fn whitelist_for(&self, owner: &str) -> Option<&[String]>;
}

/// Resolve `(from_user, to_user)` into a routing decision.
pub fn resolve(from_user: &str, to_user: &str, whitelist: &impl WhitelistLookup) -> Resolution {
    if to_user == "claude" {
        return Resolution::Allowed {
            target: format!("{from_user}-claude"),
        };
    }

    if let Some(owner) = to_user.strip_suffix("-claude") {
        if let Some(wl) = whitelist.whitelist_for(owner) {
            if !wl.is_empty() && !wl.iter().any(|h| h == from_user) {
                return Resolution::Refused {
                    target: to_user.to_string(),
                    auto_reply_text: format!(
                        "Auto-reply: @{to_user} is not accepting messages from @{from_user}."
                    ),
                };
            }
        }
        // No owner session, or no/empty whitelist: treat as a regular
        // (possibly offline) user address.
        return Resolution::Allowed {
            target: to_user.to_string(),
        };
    }

    Resolution::Allowed {
        target: to_user.to_string(),
    }
}
