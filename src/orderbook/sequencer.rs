//! Update-id sequencing
//!
//! Decides, from update ids alone, whether a diff continues the book,
//! repeats what the book already holds, or leaves a hole.

use super::SyncPhase;

/// Verdict on an incoming diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The diff continues the book and must be applied
    Apply,
    /// Everything in the diff is already reflected in the book
    Stale,
    /// Updates between the book and the diff are missing
    Gap { expected: u64 },
    /// The book is not accepting diffs (not seeded, or desynced)
    Closed,
}

/// Sequencing state of one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    last_applied_id: u64,
    phase: SyncPhase,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            last_applied_id: 0,
            phase: SyncPhase::Seeding,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn last_applied_id(&self) -> u64 {
        self.last_applied_id
    }

    /// Next update id the book needs
    pub fn expected_next(&self) -> u64 {
        self.last_applied_id.saturating_add(1)
    }

    /// Start (or restart) seeding
    pub fn begin_seeding(&mut self) {
        self.phase = SyncPhase::Seeding;
        self.last_applied_id = 0;
    }

    /// The snapshot with `last_update_id` has been applied
    pub fn seeded(&mut self, last_update_id: u64) {
        self.last_applied_id = last_update_id;
        self.phase = SyncPhase::Buffering;
    }

    pub fn admit(&self, first_update_id: u64, final_update_id: u64) -> Admission {
        match self.phase {
            SyncPhase::Seeding | SyncPhase::Desynced => return Admission::Closed,
            SyncPhase::Buffering | SyncPhase::Synced => {}
        }

        if final_update_id <= self.last_applied_id {
            return Admission::Stale;
        }

        let expected = self.expected_next();
        let continues = match self.phase {
            // First useful diff must straddle the snapshot id
            SyncPhase::Buffering => first_update_id <= expected,
            // Afterwards diffs must chain exactly
            _ => first_update_id == expected,
        };

        if continues {
            Admission::Apply
        } else {
            Admission::Gap { expected }
        }
    }

    /// Record an applied diff
    pub fn commit(&mut self, final_update_id: u64) {
        debug_assert!(final_update_id >= self.last_applied_id);
        self.last_applied_id = final_update_id;
        self.phase = SyncPhase::Synced;
    }

    pub fn desync(&mut self) {
        self.phase = SyncPhase::Desynced;
    }
}
