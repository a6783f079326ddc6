//! [`EmotionState`] – per-mood intensity with boost, echo and decay.
//!
//! ## Model
//!
//! Each active mood owns an [`EmotionRecord`] holding an intensity in
//! `[0, 1]` and the time it was last touched.  Moods not present in the map
//! are implicitly at intensity `0`.
//!
//! * **Boost** – `intensity ← min(1, intensity + boost × scale)` where
//!   `scale = 1 + volatility × U(0.5, 1.5)`.
//! * **Echo** – every *other* mood above [`ECHO_THRESHOLD`] gains
//!   `boost × ECHO_FACTOR`, clamped to `1`.
//! * **Decay** – settled lazily before every read and write.  A mood idle for
//!   more than [`DECAY_INTERVAL_SECS`] loses [`DECAY_RATE`] per whole elapsed
//!   interval and is dropped once it reaches [`REMOVAL_FLOOR`].
//!
//! ## Determinism
//!
//! Ties between equally intense moods always resolve to the mood that became
//! active first.  The only random inputs are drawn from the injected
//! [`RngCore`]; seed it with [`EmotionState::seeded`] to pin outcomes.
//! [`EmotionState::choose_response_style`] deliberately picks uniformly among
//! three styles for close relationships with no stronger signal.

use std::collections::VecDeque;
use std::sync::Arc;

use peach_types::{
    Clock, ContextFlags, EmotionRecord, EpisodicRecord, ExternalCue, MoodLogEntry, ResponseStyle,
    clamp_unit,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::journal::MoodJournal;
use crate::lexicon;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Scales how far a single boost can overshoot its nominal amount.
pub const VOLATILITY: f32 = 0.6;
/// Moods above this intensity echo every boost given to another mood.
pub const ECHO_THRESHOLD: f32 = 0.6;
/// Fraction of a boost that echoes into elevated moods.
pub const ECHO_FACTOR: f32 = 0.25;
/// Idle seconds before a mood starts to fade.
pub const DECAY_INTERVAL_SECS: f64 = 60.0;
/// Intensity lost per whole idle interval.
pub const DECAY_RATE: f32 = 0.05;
/// Moods at or below this intensity after decay are removed.
pub const REMOVAL_FLOOR: f32 = 0.1;
/// In-memory mood log capacity.
pub const MOOD_LOG_CAPACITY: usize = 100;

const FALLBACK_MOOD: &str = "curious";
const FALLBACK_BOOST: f32 = 0.1;

/// Map an intensity to its descriptor word.
pub fn describe_intensity(value: f32) -> &'static str {
    if value >= 0.85 {
        "overwhelming"
    } else if value >= 0.6 {
        "strong"
    } else if value >= 0.4 {
        "noticeable"
    } else if value >= 0.2 {
        "faint"
    } else {
        "barely there"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EmotionState
// ─────────────────────────────────────────────────────────────────────────────

/// Owned mood → intensity mapping.
pub struct EmotionState {
    /// Active moods in activation order.
    active: Vec<EmotionRecord>,
    /// Most recent boosts, oldest first.
    mood_log: VecDeque<MoodLogEntry>,
    volatility: f32,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    journal: Option<Arc<dyn MoodJournal>>,
}

impl EmotionState {
    /// Create an empty state drawing randomness from `rng`.
    pub fn new(clock: Arc<dyn Clock>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            active: Vec::new(),
            mood_log: VecDeque::with_capacity(MOOD_LOG_CAPACITY),
            volatility: VOLATILITY,
            clock,
            rng,
            journal: None,
        }
    }

    /// Create an empty state with a reproducible random source.
    pub fn seeded(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::new(clock, Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Attach a journal and restore the active moods and recent log from it.
    ///
    /// A journal that fails to load leaves the state empty; the failure is
    /// logged and writes are still attempted afterwards.
    pub fn with_journal(mut self, journal: Arc<dyn MoodJournal>) -> Self {
        match journal.load_active() {
            Ok(active) => {
                self.active = active
                    .into_iter()
                    .map(|mut r| {
                        r.intensity = clamp_unit(r.intensity);
                        r
                    })
                    .collect();
            }
            Err(e) => warn!(error = %e, "failed to restore active moods"),
        }
        match journal.recent_log(MOOD_LOG_CAPACITY) {
            Ok(log) => self.mood_log = log.into_iter().collect(),
            Err(e) => warn!(error = %e, "failed to restore mood log"),
        }
        self.journal = Some(journal);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// Current intensity of `mood`, `0.0` when inactive.  Does not decay.
    pub fn intensity(&self, mood: &str) -> f32 {
        self.active
            .iter()
            .find(|r| r.mood == mood)
            .map(|r| r.intensity)
            .unwrap_or(0.0)
    }

    /// Snapshot of all active moods in activation order.  Does not decay.
    pub fn active(&self) -> &[EmotionRecord] {
        &self.active
    }

    /// The last `limit` mood log entries, oldest first.
    pub fn emotional_history(&self, limit: usize) -> Vec<MoodLogEntry> {
        let skip = self.mood_log.len().saturating_sub(limit);
        self.mood_log.iter().skip(skip).cloned().collect()
    }

    /// Get the record for `mood`, inserting a zero-intensity one if absent.
    fn entry_mut(&mut self, mood: &str, now: f64) -> &mut EmotionRecord {
        let idx = match self.active.iter().position(|r| r.mood == mood) {
            Some(idx) => idx,
            None => {
                self.active.push(EmotionRecord {
                    mood: mood.to_string(),
                    intensity: 0.0,
                    last_updated: now,
                });
                self.active.len() - 1
            }
        };
        &mut self.active[idx]
    }

    // ── Updates ──────────────────────────────────────────────────────────────

    /// Boost `mood` by `boost` scaled by volatility, echo into other elevated
    /// moods, log the change and persist.  Returns the new intensity.
    pub fn update_emotion(&mut self, mood: &str, boost: f32) -> f32 {
        self.decay();
        let now = self.clock.now();
        let scale = 1.0 + self.volatility * self.rng.gen_range(0.5f32..1.5f32);

        let entry = self.entry_mut(mood, now);
        entry.intensity = clamp_unit(entry.intensity + boost * scale);
        entry.last_updated = now;
        let intensity = entry.intensity;

        self.apply_echo(mood, boost, now);

        let log_entry = MoodLogEntry {
            mood: mood.to_string(),
            intensity,
            timestamp: now,
        };
        if self.mood_log.len() == MOOD_LOG_CAPACITY {
            self.mood_log.pop_front();
        }
        self.mood_log.push_back(log_entry.clone());
        debug!(mood, boost, intensity, "mood boosted");

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.log_mood(&log_entry) {
                warn!(error = %e, mood, "failed to append mood log");
            }
        }
        self.persist();
        intensity
    }

    fn apply_echo(&mut self, source: &str, boost: f32, now: f64) {
        let echo = boost * ECHO_FACTOR;
        for record in self.active.iter_mut() {
            if record.mood != source && record.intensity > ECHO_THRESHOLD {
                record.intensity = clamp_unit(record.intensity + echo);
                record.last_updated = now;
            }
        }
    }

    /// Boost every mood whose keywords appear in `text`; with no match,
    /// nudge [`FALLBACK_MOOD`].  Returns the moods that were boosted.
    pub fn update_mood_from_input(
        &mut self,
        text: &str,
        context: Option<&ContextFlags>,
    ) -> Vec<String> {
        let matched = lexicon::matching_moods(text);
        let mut boosted = Vec::with_capacity(matched.len().max(1));
        for mood in &matched {
            let boost = 0.15 + self.rng.gen_range(0.05f32..0.2f32);
            self.update_emotion(mood, boost);
            boosted.push(mood.to_string());
        }
        if let Some(ctx) = context {
            self.update_mood_from_context(ctx);
        }
        if matched.is_empty() {
            self.update_emotion(FALLBACK_MOOD, FALLBACK_BOOST);
            boosted.push(FALLBACK_MOOD.to_string());
        }
        boosted
    }

    /// Apply every discrete context signal.  Signals fire independently.
    pub fn update_mood_from_context(&mut self, ctx: &ContextFlags) {
        if ctx.deep_conversation {
            self.update_emotion("reflective", 0.2);
            self.update_emotion("warm", 0.1);
        }
        if ctx.low_energy {
            self.update_emotion("reassuring", 0.2);
            self.update_emotion("gentle", 0.1);
        }
        if ctx.close_relationship {
            self.update_emotion("affectionate", 0.15);
            self.update_emotion("curious", 0.1);
        }
        if ctx.seconds_since_last > 300.0 {
            self.update_emotion("longing", 0.2);
            self.update_emotion("melancholy", 0.1);
        }
    }

    /// Let an episodic memory's tags stir their associated moods.
    pub fn process_memory(&mut self, record: &EpisodicRecord) {
        for tag in &record.tags {
            if let Some(mood) = lexicon::mood_for_tag(tag) {
                let boost = 0.1 + self.rng.gen_range(0.05f32..0.15f32);
                self.update_emotion(mood, boost);
            }
        }
    }

    /// React to a non-verbal cue from the front-end.
    pub fn external_trigger(&mut self, cue: ExternalCue) {
        match cue {
            ExternalCue::SoothingVoice => self.update_emotion("peaceful", 0.2),
            ExternalCue::SharpVoice => self.update_emotion("concerned", 0.2),
            ExternalCue::Blush => self.update_emotion("shy", 0.15),
            ExternalCue::Laugh => self.update_emotion("playful", 0.2),
        };
    }

    // ── Decay ────────────────────────────────────────────────────────────────

    /// Settle time-based decay for every active mood.
    ///
    /// Only whole idle intervals are charged; the remainder carries over to
    /// the next call.  Returns the number of moods removed.
    pub fn decay(&mut self) -> usize {
        let now = self.clock.now();
        let mut changed = false;
        for record in self.active.iter_mut() {
            let elapsed = now - record.last_updated;
            if elapsed > DECAY_INTERVAL_SECS {
                let steps = (elapsed / DECAY_INTERVAL_SECS).floor();
                record.intensity = clamp_unit(record.intensity - DECAY_RATE * steps as f32);
                record.last_updated += steps * DECAY_INTERVAL_SECS;
                changed = true;
            }
        }
        let before = self.active.len();
        self.active.retain(|r| r.intensity > REMOVAL_FLOOR);
        let removed = before - self.active.len();
        if removed > 0 {
            debug!(removed, "faded moods removed");
        }
        if changed {
            self.persist();
        }
        removed
    }

    fn persist(&self) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save_active(&self.active) {
                warn!(error = %e, "failed to persist active moods");
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Active moods ordered by intensity, ties in activation order.
    fn ranked(&self) -> Vec<&EmotionRecord> {
        let mut ranked: Vec<&EmotionRecord> = self.active.iter().collect();
        ranked.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        ranked
    }

    /// The most intense mood; [`FALLBACK_MOOD`] when nothing is active.
    pub fn current_mood(&mut self) -> String {
        self.decay();
        self.ranked()
            .first()
            .map(|r| r.mood.clone())
            .unwrap_or_else(|| FALLBACK_MOOD.to_string())
    }

    /// Return the first mood in `moods` whose intensity exceeds `threshold`.
    pub fn has_spike(&mut self, threshold: f32, moods: &[&str]) -> Option<String> {
        self.decay();
        self.active
            .iter()
            .find(|r| r.intensity > threshold && moods.contains(&r.mood.as_str()))
            .map(|r| r.mood.clone())
    }

    /// Pick a reply style from context signals, falling back to the mood.
    pub fn choose_response_style(&mut self, context: Option<&ContextFlags>) -> ResponseStyle {
        if let Some(ctx) = context {
            if ctx.low_energy {
                return ResponseStyle::Reassurance;
            }
            if ctx.deep_conversation {
                return ResponseStyle::Reflective;
            }
            if ctx.close_relationship {
                const CLOSE: [ResponseStyle; 3] = [
                    ResponseStyle::Sweetness,
                    ResponseStyle::Reflective,
                    ResponseStyle::Reassurance,
                ];
                return CLOSE[self.rng.gen_range(0..CLOSE.len())];
            }
        }
        let mood = self.current_mood();
        lexicon::style_for_mood(&mood)
    }

    /// Describe the two strongest moods together, e.g. `"strong longing"` or
    /// `"conflicted (hopeful / numb)"`.
    pub fn blended_mood(&mut self) -> String {
        self.decay();
        let ranked = self.ranked();
        match ranked.as_slice() {
            [] => "calm and steady".to_string(),
            [only] => format!("{} {}", describe_intensity(only.intensity), only.mood),
            [first, second, ..] => {
                let (m1, m2) = (first.mood.as_str(), second.mood.as_str());
                if lexicon::is_contradictory(m1, m2) {
                    return format!("conflicted ({m1} / {m2})");
                }
                let descriptor = describe_intensity((first.intensity + second.intensity) / 2.0);
                if let Some(blend) = lexicon::poetic_blend(m1, m2) {
                    format!("{descriptor} {blend}")
                } else if first.intensity > 0.4 && second.intensity > 0.4 {
                    format!("{descriptor} {m1}-{m2}")
                } else {
                    format!("{descriptor} {m1}")
                }
            }
        }
    }

    /// Name the blend of the two strongest moods without a descriptor.
    /// Falls back to [`blended_mood`][Self::blended_mood] with fewer than two.
    pub fn poetic_blend(&mut self) -> String {
        self.decay();
        let ranked = self.ranked();
        if let [first, second, ..] = ranked.as_slice() {
            let (m1, m2) = (first.mood.as_str(), second.mood.as_str());
            return lexicon::poetic_blend(m1, m2)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{m1}-{m2}"));
        }
        self.blended_mood()
    }

    /// Summarise the last five boosts in prose.
    pub fn self_reflect(&self, poetic: bool) -> String {
        if self.mood_log.is_empty() {
            return "I've been emotionally low-key lately. Nothing much to reflect on.".to_string();
        }

        let mut recent = self.emotional_history(5);
        recent.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        let mut unique: Vec<(String, f32)> = Vec::new();
        for entry in recent {
            if !unique.iter().any(|(m, _)| *m == entry.mood) {
                unique.push((entry.mood, entry.intensity));
            }
        }
        let phrases: Vec<String> = unique
            .iter()
            .map(|(m, i)| format!("{} {m}", describe_intensity(*i)))
            .collect();

        match (poetic, phrases.as_slice()) {
            (true, [one]) => format!(
                "Today I've carried a sense of {one} with me. It tints everything I see."
            ),
            (true, _) => format!(
                "My heart has held many shades lately: {}. They pass through me like weather, brief but felt.",
                join_phrases(&phrases)
            ),
            (false, [one]) => format!("I've been feeling {one} lately."),
            (false, _) => format!(
                "Lately I've felt a mix of {}. Just being honest with you.",
                join_phrases(&phrases)
            ),
        }
    }
}

fn join_phrases(phrases: &[String]) -> String {
    match phrases {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
