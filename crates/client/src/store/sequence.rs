//! Request sequencing for overlapping fetches.
//!
//! Each fetch takes a [`Ticket`] when it is issued. When its response
//! arrives, the store applies it only if no newer ticket has been issued
//! since, so the collection always reflects the most recently *requested*
//! data rather than whichever response happened to arrive last.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic ticket counter for one collection.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    issued: AtomicU64,
}

impl SequenceGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
        }
    }

    /// Issue the next ticket.
    pub fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `ticket` is still the newest one issued.
    ///
    /// Call this while holding the state's write lock so the check and the
    /// write happen together.
    #[must_use]
    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}
