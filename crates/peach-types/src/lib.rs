//! `peach-types` – the shared vocabulary of the Peach memory stack.
//!
//! Every crate in the workspace speaks in these types: chat turns, episodic
//! records, mood intensities and the small enums that classify them.  The
//! module also hosts the injected [`Clock`] so that time-dependent behaviour
//! (decay, idle triggers) can be pinned in tests.

use chrono::DateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of tags carried by a single episodic record.
pub const MAX_TAGS: usize = 5;

/// Clamp a score into the unit interval `[0.0, 1.0]`.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Render a unix timestamp (seconds) as the `YYYY-MM-DD HH:MM` display string
/// stored alongside episodic records.  Times are rendered in UTC.
pub fn display_time(timestamp: f64) -> String {
    to_datetime(timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Convert a unix timestamp (seconds) into a UTC [`DateTime`].
pub fn to_datetime(timestamp: f64) -> Option<DateTime<chrono::Utc>> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of "now" as fractional unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of dialogue.  Append-only once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    pub mood: Option<String>,
    /// Capture time in unix seconds.
    pub timestamp: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Episodic classification enums
// ─────────────────────────────────────────────────────────────────────────────

/// How the speaker relates the utterance to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Personal,
    Shared,
    External,
    Neutral,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Personal => "personal",
            Relation::Shared => "shared",
            Relation::External => "external",
            Relation::Neutral => "neutral",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(Relation::Personal),
            "shared" => Some(Relation::Shared),
            "external" => Some(Relation::External),
            "neutral" => Some(Relation::Neutral),
            _ => None,
        }
    }
}

/// Durability class of an episodic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Core,
    Casual,
    Fleeting,
    Imagined,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Casual => "casual",
            Category::Fleeting => "fleeting",
            Category::Imagined => "imagined",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "core" => Some(Category::Core),
            "casual" => Some(Category::Casual),
            "fleeting" => Some(Category::Fleeting),
            "imagined" => Some(Category::Imagined),
            _ => None,
        }
    }
}

/// Lexical colouring of an utterance.  Declaration order is the tie-break
/// order used by sentiment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentColor {
    Warm,
    Melancholy,
    Bright,
    Neutral,
    Anxious,
    Reflective,
}

impl SentimentColor {
    pub const ALL: [SentimentColor; 6] = [
        SentimentColor::Warm,
        SentimentColor::Melancholy,
        SentimentColor::Bright,
        SentimentColor::Neutral,
        SentimentColor::Anxious,
        SentimentColor::Reflective,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentColor::Warm => "warm",
            SentimentColor::Melancholy => "melancholy",
            SentimentColor::Bright => "bright",
            SentimentColor::Neutral => "neutral",
            SentimentColor::Anxious => "anxious",
            SentimentColor::Reflective => "reflective",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Coarse valence of a mood label, used to bias memory decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodClass {
    Positive,
    Negative,
    Neutral,
}

const POSITIVE_MOODS: &[&str] = &[
    "happy", "hopeful", "excited", "joyful", "grateful", "proud", "playful", "inspired",
    "peaceful",
];
const NEGATIVE_MOODS: &[&str] = &[
    "sad", "angry", "anxious", "lonely", "guilty", "shame", "resentful", "numb",
];

impl MoodClass {
    pub fn of(mood: &str) -> Self {
        let mood = mood.to_lowercase();
        if POSITIVE_MOODS.contains(&mood.as_str()) {
            MoodClass::Positive
        } else if NEGATIVE_MOODS.contains(&mood.as_str()) {
            MoodClass::Negative
        } else {
            MoodClass::Neutral
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicRecord
// ─────────────────────────────────────────────────────────────────────────────

/// Mood label stored on records captured without an explicit mood.
pub const UNKNOWN_MOOD: &str = "unknown";

/// A durable, tagged, scored representation of one meaningful user utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRecord {
    /// Monotonic row id, assigned by storage on insert.
    pub id: Option<i64>,
    /// Human-readable capture time (`YYYY-MM-DD HH:MM`, UTC).
    pub time: String,
    pub content: String,
    pub mood: String,
    /// At most [`MAX_TAGS`] unique tags.
    pub tags: Vec<String>,
    /// Decaying relevance score in `[0, 1]`.
    pub importance: f32,
    pub relation_to_user: Relation,
    pub category: Category,
    pub sentiment_color: SentimentColor,
    /// Capture time in unix seconds.
    pub timestamp: f64,
    pub rehearsed_count: u32,
    /// Time of the last decay pass applied to `importance`.
    pub decayed_at: f64,
}

impl EpisodicRecord {
    /// Whether the record carries a mood other than the placeholder.
    pub fn has_known_mood(&self) -> bool {
        !self.mood.is_empty() && self.mood != UNKNOWN_MOOD
    }

    /// Merge `extra` into the tag set, keeping the first [`MAX_TAGS`] unique
    /// entries.  Existing tags win over new ones.
    pub fn merge_tags<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in extra {
            if self.tags.len() >= MAX_TAGS {
                break;
            }
            let tag = tag.into();
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emotion records
// ─────────────────────────────────────────────────────────────────────────────

/// Intensity of one currently active mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub mood: String,
    pub intensity: f32,
    pub last_updated: f64,
}

/// An append-only log line written on every mood boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodLogEntry {
    pub mood: String,
    pub intensity: f32,
    pub timestamp: f64,
}

/// Discrete conversational signals supplied by the front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFlags {
    pub deep_conversation: bool,
    pub low_energy: bool,
    pub close_relationship: bool,
    /// Seconds since the previous user message.
    pub seconds_since_last: f64,
}

/// Reply style derived from context and mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Humor,
    Reassurance,
    Sweetness,
    Reflective,
    Neutral,
}

impl std::fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResponseStyle::Humor => "humor",
            ResponseStyle::Reassurance => "reassurance",
            ResponseStyle::Sweetness => "sweetness",
            ResponseStyle::Reflective => "reflective",
            ResponseStyle::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Non-verbal cues from an avatar or voice front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalCue {
    SoothingVoice,
    SharpVoice,
    Blush,
    Laugh,
}

// ─────────────────────────────────────────────────────────────────────────────
// Global error
// ─────────────────────────────────────────────────────────────────────────────

/// Process-level error surfaced to the binary.
#[derive(Error, Debug)]
pub enum PeachError {
    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EpisodicRecord {
        EpisodicRecord {
            id: None,
            time: display_time(0.0),
            content: "we watched the stars together last night".into(),
            mood: UNKNOWN_MOOD.into(),
            tags: vec!["cosmic".into()],
            importance: 0.4,
            relation_to_user: Relation::Shared,
            category: Category::Casual,
            sentiment_color: SentimentColor::Neutral,
            timestamp: 0.0,
            rehearsed_count: 0,
            decayed_at: 0.0,
        }
    }

    #[test]
    fn clamp_unit_bounds_values() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert!((clamp_unit(0.42) - 0.42).abs() < f32::EPSILON);
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        assert_eq!(word_count("I miss you so much,  it's been a rough week"), 10);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn display_time_renders_utc_minutes() {
        // 2024-03-10 12:30:00 UTC
        assert_eq!(display_time(1_710_073_800.0), "2024-03-10 12:30");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100.0);
        clock.advance(60.5);
        assert!((clock.now() - 160.5).abs() < 1e-9);
        clock.set(5.0);
        assert_eq!(clock.now(), 5.0);
    }

    #[test]
    fn enum_labels_roundtrip_through_text() {
        for c in [Category::Core, Category::Casual, Category::Fleeting, Category::Imagined] {
            assert_eq!(Category::from_label(c.as_str()), Some(c));
        }
        for s in SentimentColor::ALL {
            assert_eq!(SentimentColor::from_label(s.as_str()), Some(s));
        }
        assert_eq!(Relation::from_label("shared"), Some(Relation::Shared));
        assert_eq!(Role::from_label("system"), None);
    }

    #[test]
    fn mood_class_is_case_insensitive() {
        assert_eq!(MoodClass::of("Hopeful"), MoodClass::Positive);
        assert_eq!(MoodClass::of("anxious"), MoodClass::Negative);
        assert_eq!(MoodClass::of("curious"), MoodClass::Neutral);
    }

    #[test]
    fn merge_tags_dedups_and_caps() {
        let mut r = record();
        r.merge_tags(["cosmic", "night", "together", "stars", "sky", "wonder"]);
        assert_eq!(r.tags.len(), MAX_TAGS);
        assert_eq!(r.tags[0], "cosmic");
        assert!(!r.tags.contains(&"wonder".to_string()));
    }

    #[test]
    fn unknown_mood_is_not_known() {
        let mut r = record();
        assert!(!r.has_known_mood());
        r.mood = "hopeful".into();
        assert!(r.has_known_mood());
    }

    #[test]
    fn episodic_record_serializes_enums_lowercase() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"shared\""));
        assert!(json.contains("\"casual\""));
    }

    #[test]
    fn peach_error_display() {
        let err = PeachError::Storage("disk full".into());
        assert!(err.to_string().contains("disk full"));
    }
}
