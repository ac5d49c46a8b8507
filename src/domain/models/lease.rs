//! Single-writer lease model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lease guarding the fixture store and cycle audit trail.
pub const WRITER_LEASE_NAME: &str = "transform-writer";

/// An advisory lock record with an owner and expiry.
///
/// An expired lease may be taken over by any owner, so a crashed holder never
/// blocks the system for longer than the lease TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
