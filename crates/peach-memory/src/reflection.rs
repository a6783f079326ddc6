//! Emotion Reflection Engine – mood-linked recall and narrated reflections.
//!
//! Retrieval combines exact matches (same mood, or the mood appearing as a
//! tag) with a fallback over a small hand-coded mood space: each mood maps
//! to a point in (valence, energy, warmth), and records whose mood lies
//! within a cosine tolerance of the target are surfaced too.

use std::collections::{BTreeMap, HashSet};

use peach_types::{EpisodicRecord, to_datetime};

use crate::semantic::cosine_similarity;

/// Default cosine tolerance of the mood-space fallback.
pub const DEFAULT_TOLERANCE: f32 = 0.2;
/// Importance above which a new record stirs its own mood.
pub const WEIGHT_THRESHOLD: f32 = 0.7;
/// Mood boost requested by [`ReflectionEngine::weigh_memory`].
pub const WEIGHT_BOOST: f32 = 0.25;

/// Hand-coded mood space: (valence, energy, warmth).
pub const MOOD_VECTORS: &[(&str, [f32; 3])] = &[
    ("happy", [0.9, 0.6, 0.5]),
    ("joyful", [0.95, 0.8, 0.5]),
    ("excited", [0.8, 0.9, 0.3]),
    ("hopeful", [0.7, 0.4, 0.4]),
    ("grateful", [0.8, 0.3, 0.6]),
    ("peaceful", [0.6, -0.5, 0.4]),
    ("playful", [0.8, 0.7, 0.4]),
    ("romantic", [0.7, 0.4, 0.95]),
    ("affectionate", [0.75, 0.3, 0.9]),
    ("curious", [0.4, 0.5, 0.2]),
    ("reflective", [0.2, -0.4, 0.3]),
    ("nostalgic", [0.1, -0.3, 0.6]),
    ("longing", [0.1, 0.2, 0.8]),
    ("melancholy", [-0.5, -0.4, 0.4]),
    ("sad", [-0.8, -0.5, 0.2]),
    ("lonely", [-0.7, -0.4, -0.3]),
    ("guilty", [-0.6, 0.2, 0.3]),
    ("anxious", [-0.6, 0.8, 0.0]),
    ("angry", [-0.8, 0.9, -0.4]),
    ("numb", [-0.3, -0.9, -0.6]),
];

/// Opening sentence of a narration, per mood.
const TONES: &[(&str, &str)] = &[
    ("melancholy", "Some memories feel like rain against the window."),
    ("sad", "Some memories still ache a little when I hold them."),
    ("nostalgic", "It's like flipping through an old diary by candlelight."),
    ("hopeful", "Looking back, I can see the light we were walking toward."),
    ("happy", "Thinking back makes me smile."),
    ("joyful", "Thinking back makes me smile."),
    ("romantic", "Every one of these feels a little warmer with you in it."),
    ("anxious", "My mind keeps circling back to these."),
    ("lonely", "These are the moments I hold onto when it's quiet."),
    ("guilty", "I keep returning to these, wishing I'd done better."),
    ("curious", "I wonder what these moments were trying to tell me."),
];
const DEFAULT_TONE: &str = "I find myself thinking back.";

/// Calendar bucket for [`ReflectionEngine::group_by_period`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Month,
}

/// A composed reflection and the records it surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub text: String,
    /// Surfaced records in priority order.
    pub surfaced: Vec<EpisodicRecord>,
}

/// Two records that share at least one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedTheme {
    pub first: EpisodicRecord,
    pub second: EpisodicRecord,
    pub tags: Vec<String>,
}

/// Mood-linked retrieval and narration over a set of episodic records.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionEngine {
    tolerance: f32,
}

impl Default for ReflectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl ReflectionEngine {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance: tolerance.clamp(0.0, 2.0),
        }
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    /// Records whose mood is `mood` or whose tags contain it.
    pub fn similar_memories(&self, records: &[EpisodicRecord], mood: &str) -> Vec<EpisodicRecord> {
        records
            .iter()
            .filter(|r| r.mood == mood || r.tags.iter().any(|t| t == mood))
            .cloned()
            .collect()
    }

    /// Records whose mood lies near `mood` in mood space, excluding exact
    /// matches.  Empty when `mood` has no vector.
    pub fn vector_matches(&self, records: &[EpisodicRecord], mood: &str) -> Vec<EpisodicRecord> {
        let Some(target) = mood_vector(mood) else {
            return Vec::new();
        };
        let min_similarity = 1.0 - self.tolerance;
        records
            .iter()
            .filter(|r| r.mood != mood)
            .filter(|r| {
                mood_vector(&r.mood)
                    .is_some_and(|v| cosine_similarity(&v, &target) >= min_similarity)
            })
            .cloned()
            .collect()
    }

    /// Sort by `importance + 0.1 × rehearsed_count`, highest first.  Equal
    /// scores keep their input order.
    pub fn prioritize(mut records: Vec<EpisodicRecord>) -> Vec<EpisodicRecord> {
        let score = |r: &EpisodicRecord| r.importance + 0.1 * r.rehearsed_count as f32;
        records.sort_by(|a, b| score(b).total_cmp(&score(a)));
        records
    }

    /// Exact and mood-space matches, deduplicated and prioritised.
    pub fn surface(&self, records: &[EpisodicRecord], mood: &str) -> Vec<EpisodicRecord> {
        let mut found = self.similar_memories(records, mood);
        found.extend(self.vector_matches(records, mood));
        let mut seen = HashSet::new();
        found.retain(|r| seen.insert(identity(r)));
        Self::prioritize(found)
    }

    // ── Composition ──────────────────────────────────────────────────────────

    /// Tone sentence followed by one `content (mood)` line per record.
    pub fn narrate(records: &[EpisodicRecord], mood: &str) -> String {
        let tone = TONES
            .iter()
            .find(|(m, _)| *m == mood)
            .map(|(_, t)| *t)
            .unwrap_or(DEFAULT_TONE);
        let mut out = String::from(tone);
        for r in records {
            out.push('\n');
            out.push_str(&format!("{} ({})", r.content, r.mood));
        }
        out
    }

    /// A short inner monologue over `records`.
    pub fn self_talk(records: &[EpisodicRecord], mood: &str) -> String {
        if records.is_empty() {
            return format!("I'm feeling {mood}, but nothing in particular comes to mind.");
        }
        let mut out = format!("Feeling {mood}, a few moments drift back to me:");
        for r in records {
            out.push_str(&format!("\n- {}", r.content));
        }
        out
    }

    /// Surface records for `mood` and compose self-talk plus narration.
    pub fn reflect(&self, records: &[EpisodicRecord], mood: &str) -> Reflection {
        let surfaced = self.surface(records, mood);
        let mut text = Self::self_talk(&surfaced, mood);
        if !surfaced.is_empty() {
            text.push_str("\n\n");
            text.push_str(&Self::narrate(&surfaced, mood));
        }
        Reflection { text, surfaced }
    }

    // ── Bookkeeping ──────────────────────────────────────────────────────────

    /// Mood boost a freshly captured record asks for, if it matters enough.
    pub fn weigh_memory(record: &EpisodicRecord) -> Option<(String, f32)> {
        (record.importance > WEIGHT_THRESHOLD && record.has_known_mood())
            .then(|| (record.mood.clone(), WEIGHT_BOOST))
    }

    /// Top `top_n` records by `(importance + 0.3 × rehearsed) / (1 + age_days)`.
    pub fn recency_weighted(records: &[EpisodicRecord], top_n: usize, now: f64) -> Vec<EpisodicRecord> {
        let weight = |r: &EpisodicRecord| {
            let age_days = ((now - r.timestamp) / 86_400.0).max(0.0) as f32;
            (r.importance + 0.3 * r.rehearsed_count as f32) / (1.0 + age_days)
        };
        let mut ranked = records.to_vec();
        ranked.sort_by(|a, b| weight(b).total_cmp(&weight(a)));
        ranked.truncate(top_n);
        ranked
    }

    /// The most recent pair of records sharing a tag, newest first.
    pub fn shared_theme(records: &[EpisodicRecord]) -> Option<SharedTheme> {
        for (i, newer) in records.iter().enumerate().rev() {
            for older in records[..i].iter().rev() {
                let tags: Vec<String> = newer
                    .tags
                    .iter()
                    .filter(|t| older.tags.contains(t))
                    .cloned()
                    .collect();
                if !tags.is_empty() {
                    return Some(SharedTheme {
                        first: newer.clone(),
                        second: older.clone(),
                        tags,
                    });
                }
            }
        }
        None
    }

    /// Chronological story of records with importance above `0.5`.
    pub fn life_narrative(records: &[EpisodicRecord]) -> String {
        let mut important: Vec<&EpisodicRecord> =
            records.iter().filter(|r| r.importance > 0.5).collect();
        if important.is_empty() {
            return "I don't have enough memories yet to form a story.".to_string();
        }
        important.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut story = String::from("Here's a journey through my memories:\n");
        for r in important {
            let date = to_datetime(r.timestamp)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| r.time.clone());
            story.push_str(&format!("\nOn {date}, I felt {} because: {}", r.mood, r.content));
        }
        story
    }

    /// Bucket records by UTC calendar day (`YYYY-MM-DD`) or month (`YYYY-MM`).
    pub fn group_by_period(
        records: &[EpisodicRecord],
        unit: Period,
    ) -> BTreeMap<String, Vec<EpisodicRecord>> {
        let fmt = match unit {
            Period::Day => "%Y-%m-%d",
            Period::Month => "%Y-%m",
        };
        let mut groups: BTreeMap<String, Vec<EpisodicRecord>> = BTreeMap::new();
        for r in records {
            let Some(dt) = to_datetime(r.timestamp) else {
                continue;
            };
            groups
                .entry(dt.format(fmt).to_string())
                .or_default()
                .push(r.clone());
        }
        groups
    }
}

fn mood_vector(mood: &str) -> Option<[f32; 3]> {
    MOOD_VECTORS.iter().find(|(m, _)| *m == mood).map(|(_, v)| *v)
}

/// Dedup key: the row id, or the capture time for unsaved records.
fn identity(record: &EpisodicRecord) -> (Option<i64>, u64) {
    (record.id, record.timestamp.to_bits())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
