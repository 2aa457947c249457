//! Single-flight visit sequencing.
//!
//! Each visit takes a fresh token when it begins and publishes it as the
//! current one. Once it settles, the visit may navigate only if its token is
//! still the published one. Publishing is the supersession point: a later
//! `begin()` makes every earlier handle permanently stale.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VisitToken(u64);

impl VisitToken {
    /// The raw generation number.
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Handle returned by [`VisitSequencer::begin`].
#[derive(Debug)]
#[must_use = "settle the handle once the visit's work completes"]
pub struct VisitHandle {
    token: VisitToken,
}

impl VisitHandle {
    /// The token this handle is bound to.
    pub fn token(&self) -> VisitToken {
        self.token
    }
}

/// How a settled visit ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// No visit began after this one.
    Current,
    /// A later visit began; the caller must not navigate.
    Superseded,
}

impl VisitOutcome {
    /// Whether the caller may act on the visit.
    pub fn is_current(&self) -> bool {
        matches!(self, VisitOutcome::Current)
    }
}

/// Generation counter deciding which visit is current.
#[derive(Debug, Default)]
pub struct VisitSequencer {
    next: AtomicU64,
    current: AtomicU64,
}

impl VisitSequencer {
    /// Create a sequencer with no visit published.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a visit and publish its token.
    pub fn begin(&self) -> VisitHandle {
        let token = VisitToken(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.current.fetch_max(token.0, Ordering::SeqCst);
        tracing::trace!(generation = token.0, "visit began");
        VisitHandle { token }
    }

    /// Decide whether a finished visit is still current.
    ///
    /// Call only after the visit's fetch and ingestion have completed.
    pub fn settle(&self, handle: &VisitHandle) -> VisitOutcome {
        if self.current.load(Ordering::SeqCst) == handle.token.0 {
            VisitOutcome::Current
        } else {
            VisitOutcome::Superseded
        }
    }

    /// The published token, if any visit has begun.
    pub fn current(&self) -> Option<VisitToken> {
        match self.current.load(Ordering::SeqCst) {
            0 => None,
            generation => Some(VisitToken(generation)),
        }
    }
}
