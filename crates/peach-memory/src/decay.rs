//! Decay Engine – ages episodic importance and delegates mood fading.
//!
//! Importance follows a half-life curve measured from the record's last
//! decay pass (`decayed_at`):
//!
//! ```text
//! importance ← importance × 0.5 ^ (elapsed × class_scale / half_life)
//! ```
//!
//! `class_scale` speeds up decay of positive-mood records and slows it for
//! negative ones.  Because the curve is applied to the time since the last
//! pass, running the engine often or rarely converges on the same value.

use peach_emotion::EmotionState;
use peach_types::{EpisodicRecord, MoodClass, clamp_unit};
use tracing::{debug, warn};

use crate::storage::{Storage, StorageError};
use crate::tagging::TaggingEngine;

/// Seconds for importance to halve at neutral scale.
pub const HALF_LIFE_SECS: f64 = 86_400.0;
/// Records whose importance drops below this leave active memory.
pub const EVICTION_FLOOR: f32 = 0.1;
/// Records above this importance are rehearsed by [`DecayEngine::reinforce_important`].
pub const REHEARSAL_THRESHOLD: f32 = 0.3;
/// Importance added to each rehearsed record.
pub const REHEARSAL_BOOST: f32 = 0.2;

/// Outcome of one episodic decay pass.
#[derive(Debug, Default)]
pub struct DecayReport {
    /// Records decayed and written back, evicted ones included.
    pub updated: usize,
    /// Records removed from active memory.
    pub evicted: Vec<EpisodicRecord>,
    /// Records whose write-back failed; they stay active.
    pub failed: usize,
}

/// Time-based ageing of episodic records.
#[derive(Debug, Clone, Copy)]
pub struct DecayEngine {
    half_life_secs: f64,
    floor: f32,
}

impl Default for DecayEngine {
    fn default() -> Self {
        Self::new(HALF_LIFE_SECS, EVICTION_FLOOR)
    }
}

impl DecayEngine {
    pub fn new(half_life_secs: f64, floor: f32) -> Self {
        Self {
            half_life_secs: half_life_secs.max(f64::EPSILON),
            floor,
        }
    }

    /// Exponent scale for a mood label.
    ///
    /// The class factor stretches elapsed time rather than multiplying the
    /// result.  A plain `× 1.15` on the decayed value would lift importance
    /// above its previous value for short intervals.
    pub fn class_scale(mood: &str) -> f64 {
        match MoodClass::of(mood) {
            MoodClass::Positive => 1.15,
            MoodClass::Negative => 0.85,
            MoodClass::Neutral => 1.0,
        }
    }

    /// Multiplier to apply to `record.importance` at `now`.  Always in
    /// `(0, 1]`.
    pub fn decay_factor(&self, record: &EpisodicRecord, now: f64) -> f32 {
        let elapsed = (now - record.decayed_at).max(0.0);
        let exponent = elapsed * Self::class_scale(&record.mood) / self.half_life_secs;
        0.5f64.powf(exponent) as f32
    }

    /// Decay every record in `records`, re-categorise and persist it, then
    /// evict those below the floor.  Evicted rows keep their faded
    /// importance in storage so pruning can find them.  A failed write is
    /// counted and logged, and the record stays active for the next pass.
    pub fn decay_episodic(
        &self,
        records: &mut Vec<EpisodicRecord>,
        storage: &Storage,
        tagging: &TaggingEngine,
        now: f64,
    ) -> DecayReport {
        let mut report = DecayReport::default();
        let mut kept = Vec::with_capacity(records.len());

        for mut record in records.drain(..) {
            let before = record.importance;
            record.importance = clamp_unit(record.importance * self.decay_factor(&record, now));
            record.decayed_at = now.max(record.decayed_at);
            record.category = tagging.categorize(&record);

            if let Err(e) = storage.record_decay(&record) {
                warn!(id = ?record.id, error = %e, "failed to persist decayed record");
                report.failed += 1;
                kept.push(record);
                continue;
            }
            report.updated += 1;

            if record.importance < self.floor {
                debug!(id = ?record.id, before, after = record.importance, "record evicted");
                report.evicted.push(record);
            } else {
                kept.push(record);
            }
        }

        *records = kept;
        report
    }

    /// Let the emotion model settle its own decay.  Returns moods removed.
    pub fn decay_moods(&self, emotion: &mut EmotionState) -> usize {
        emotion.decay()
    }

    /// Raise `record.importance` by `amount`, capped at `1.0`.
    pub fn reinforce(record: &mut EpisodicRecord, amount: f32) {
        record.importance = clamp_unit(record.importance + amount.max(0.0));
    }

    /// Rehearse every stored record above `threshold` by `boost`, and mirror
    /// the change onto `active`.  Returns the number of stored rows touched.
    pub fn reinforce_important(
        &self,
        storage: &Storage,
        active: &mut [EpisodicRecord],
        threshold: f32,
        boost: f32,
    ) -> Result<usize, StorageError> {
        let touched = storage.reinforce_above(threshold, boost)?;
        for record in active.iter_mut().filter(|r| r.importance > threshold) {
            Self::reinforce(record, boost);
        }
        debug!(touched, threshold, boost, "important memories rehearsed");
        Ok(touched)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
