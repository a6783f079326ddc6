//! Persistence seam for the emotion model.
//!
//! [`EmotionState`][crate::EmotionState] never talks to a database directly;
//! it writes through a [`MoodJournal`] supplied at construction time.  The
//! SQLite storage layer in `peach-memory` is the production implementation.

use peach_types::{EmotionRecord, MoodLogEntry};
use thiserror::Error;

/// Errors reported by a journal backend.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("mood journal backend error: {0}")]
    Backend(String),
}

/// Durable home for active mood intensities and the mood log.
pub trait MoodJournal: Send + Sync {
    /// Replace the persisted active-mood snapshot with `active`.
    fn save_active(&self, active: &[EmotionRecord]) -> Result<(), JournalError>;

    /// Append one entry to the mood log.
    fn log_mood(&self, entry: &MoodLogEntry) -> Result<(), JournalError>;

    /// Load the persisted active-mood snapshot.
    fn load_active(&self) -> Result<Vec<EmotionRecord>, JournalError>;

    /// Load the most recent `limit` log entries, oldest first.
    fn recent_log(&self, limit: usize) -> Result<Vec<MoodLogEntry>, JournalError>;
}
