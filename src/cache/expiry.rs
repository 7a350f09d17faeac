// Expiry policy for cache entries.
// TTL math and the proactive refresh threshold.

use chrono::{DateTime, TimeDelta, Utc};

use super::entry::Entry;

/// How usable a cached entry is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than half its TTL.
    Fresh,
    /// Past half its TTL but not yet expired; serve it and refresh.
    Stale,
    /// Past `expires_at`.
    Expired,
}

impl Freshness {
    pub fn display(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Expired => "expired",
        }
    }
}

impl Entry {
    /// Time since the entry was written.
    pub fn age_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.cached_at)
    }

    pub fn age(&self) -> TimeDelta {
        self.age_at(Utc::now())
    }

    /// The TTL the entry was written with.
    pub fn ttl(&self) -> TimeDelta {
        self.expires_at.signed_duration_since(self.cached_at)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True once more than half the TTL has elapsed. Hard-expired entries
    /// always need a refresh.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) > self.ttl() / 2
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        if self.is_expired_at(now) {
            Freshness::Expired
        } else if self.needs_refresh_at(now) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness_at(Utc::now())
    }
}
