//! Tagging Engine – tags, importance, category and relation from raw text.
//!
//! Linguistic analysis sits behind the [`FeatureExtractor`] trait: the engine
//! only needs entity labels and content-word lemmas, not how they were
//! produced.  [`LexicalExtractor`] is a dependency-free default built from
//! small word lists and suffix rules.

use std::collections::HashSet;

use peach_types::{Category, EpisodicRecord, MAX_TAGS, Relation};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Word lists
// ─────────────────────────────────────────────────────────────────────────────

/// Emotional keywords copied verbatim into the tag set.
pub const EMOTIONAL_KEYWORDS: &[&str] = &[
    "love", "miss", "dream", "hope", "hurt", "excited", "guilt", "nostalgia",
];

/// Concrete images mapped to the concept they symbolise.
pub const SYMBOLIC_MAP: &[(&str, &str)] = &[
    ("star", "cosmic"),
    ("sea", "depth"),
    ("rain", "melancholy"),
    ("sun", "warmth"),
    ("mirror", "reflection"),
    ("dream", "unreal"),
];

/// Words whose presence raises a record's importance.
pub const IMPORTANCE_WORDS: &[&str] = &[
    "love", "hate", "dream", "hope", "fear", "cry", "beautiful", "miss", "remember",
];

/// Moods and tags that always make a record `core`.
pub const HIGH_IMPACT: &[&str] = &[
    "love", "grief", "longing", "hope", "hurt", "shame", "nostalgia",
];

/// Phrases marking a record as imagined rather than lived.
pub const SPECULATIVE_MARKERS: &[&str] = &["someday", "i wish", "maybe", "imagine if", "if only"];

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does",
    "doing", "don't", "for", "from", "get", "got", "had", "has", "have", "he", "her", "here",
    "him", "his", "how", "i", "i'm", "i've", "i'd", "i'll", "if", "in", "into", "is", "it",
    "it's", "its", "just", "like", "me", "more", "most", "much", "my", "myself", "no", "not",
    "now", "of", "off", "on", "one", "only", "or", "our", "out", "over", "really", "she", "so",
    "some", "still", "such", "than", "that", "that's", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "why", "will", "with",
    "would", "you", "you're", "your", "yours",
];

const DATE_WORDS: &[&str] = &[
    "today", "yesterday", "tomorrow", "week", "weekend", "month", "year", "monday", "tuesday",
    "wednesday", "thursday", "friday", "saturday", "sunday", "january", "february", "march",
    "april", "june", "july", "august", "september", "october", "november", "december",
    "birthday", "anniversary",
];

const TIME_WORDS: &[&str] = &[
    "tonight", "morning", "evening", "afternoon", "night", "midnight", "noon", "o'clock", "am",
    "pm", "hour", "minute",
];

const FIRST_PERSON: &[&str] = &["i", "i'm", "i've", "i'd", "i'll", "me", "my", "myself"];
const SECOND_PERSON: &[&str] = &["you", "you're", "you've", "you'd", "you'll", "your", "yours"];
const PLURAL_FIRST: &[&str] = &["we", "we're", "we've", "we'd", "we'll", "us", "our", "ours"];
const THIRD_PLURAL: &[&str] = &["they", "they're", "they've", "them", "their", "theirs"];

// ─────────────────────────────────────────────────────────────────────────────
// Feature extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Linguistic features the tagging rules consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextFeatures {
    /// Lower-case entity category labels (`"date"`, `"person"`, …).
    pub entities: Vec<String>,
    /// Lemmatised content words, stop words removed.
    pub lemmas: Vec<String>,
}

/// Pluggable text analysis capability.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, text: &str) -> TextFeatures;
}

/// Word-list entity spotting and suffix-stripping lemmatisation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalExtractor;

impl FeatureExtractor for LexicalExtractor {
    fn extract(&self, text: &str) -> TextFeatures {
        let mut entities: Vec<String> = Vec::new();
        let mut lemmas: Vec<String> = Vec::new();
        let push = |list: &mut Vec<String>, value: &str| {
            if !list.iter().any(|v| v == value) {
                list.push(value.to_string());
            }
        };

        let text = text.replace('\u{2019}', "'");
        let mut sentence_start = true;
        for raw in text.split_whitespace() {
            let word = trim_token(raw);
            let ends_sentence = raw.ends_with(['.', '!', '?']);
            if word.is_empty() {
                sentence_start |= ends_sentence;
                continue;
            }
            let lower = word.to_lowercase();

            if DATE_WORDS.contains(&lower.as_str()) {
                push(&mut entities, "date");
            } else if TIME_WORDS.contains(&lower.as_str()) {
                push(&mut entities, "time");
            } else if lower.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
                push(&mut entities, "cardinal");
            } else if !sentence_start
                && lower != "i"
                && !lower.starts_with("i'")
                && word.chars().next().is_some_and(char::is_uppercase)
            {
                push(&mut entities, "person");
            }

            if lower.chars().count() > 2
                && !STOP_WORDS.contains(&lower.as_str())
                && lower.chars().any(char::is_alphabetic)
            {
                push(&mut lemmas, &lemmatize(&lower));
            }
            sentence_start = ends_sentence;
        }

        TextFeatures { entities, lemmas }
    }
}

/// Strip surrounding punctuation, keeping inner apostrophes.
fn trim_token(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .trim_matches('\'')
}

/// Light plural / inflection stripping.
pub fn lemmatize(word: &str) -> String {
    let w = word.replace('\u{2019}', "'");
    if let Some(stem) = w.strip_suffix("'s") {
        return stem.to_string();
    }
    if let Some(stem) = w.strip_suffix("ies") {
        if stem.len() > 1 {
            return format!("{stem}y");
        }
    }
    if w.ends_with("sses") {
        return w[..w.len() - 2].to_string();
    }
    if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") && !w.ends_with("is") {
        return w[..w.len() - 1].to_string();
    }
    w
}

/// Lower-case word tokens of `text` with punctuation trimmed.
fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| trim_token(raw).replace('\u{2019}', "'").to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// TaggingEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Derives tags, importance, category and relation-to-user.
pub struct TaggingEngine {
    extractor: Box<dyn FeatureExtractor>,
}

impl Default for TaggingEngine {
    fn default() -> Self {
        Self::new(Box::new(LexicalExtractor))
    }
}

impl TaggingEngine {
    pub fn new(extractor: Box<dyn FeatureExtractor>) -> Self {
        Self { extractor }
    }

    /// Up to [`MAX_TAGS`] unique tags: entity labels, emotional keywords,
    /// symbolic concepts, then content lemmas.
    pub fn extract_tags(&self, text: &str) -> Vec<String> {
        let features = self.extractor.extract(text);
        let toks = tokens(text);
        let lemmas: Vec<String> = toks.iter().map(|t| lemmatize(t)).collect();

        let mut candidates: Vec<String> = features.entities;
        candidates.extend(
            EMOTIONAL_KEYWORDS
                .iter()
                .filter(|kw| toks.iter().any(|t| t.starts_with(*kw)))
                .map(|kw| kw.to_string()),
        );
        candidates.extend(
            SYMBOLIC_MAP
                .iter()
                .filter(|(image, _)| lemmas.iter().any(|l| l == image))
                .map(|(_, concept)| concept.to_string()),
        );
        candidates.extend(features.lemmas);

        let mut seen = HashSet::new();
        let total = candidates.len();
        let tags: Vec<String> = candidates
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .take(MAX_TAGS)
            .collect();
        if total > tags.len() {
            debug!(total, kept = tags.len(), "tags trimmed");
        }
        tags
    }

    /// Share of [`IMPORTANCE_WORDS`] present, counted per word and divided
    /// by five, capped at `1.0`.
    pub fn rate_importance(&self, text: &str) -> f32 {
        let toks = tokens(text);
        let hits = IMPORTANCE_WORDS
            .iter()
            .filter(|w| toks.iter().any(|t| t.starts_with(*w)))
            .count();
        (hits as f32 / 5.0).min(1.0)
    }

    /// Classify a record.  `core` and `fleeting` take precedence over
    /// `imagined`.
    pub fn categorize(&self, record: &EpisodicRecord) -> Category {
        let mood = record.mood.to_lowercase();
        let high_impact = HIGH_IMPACT.contains(&mood.as_str())
            || record.tags.iter().any(|t| HIGH_IMPACT.contains(&t.as_str()));
        if record.importance > 0.7 || high_impact {
            return Category::Core;
        }
        if record.importance < 0.3 {
            return Category::Fleeting;
        }
        let lowered = record.content.to_lowercase();
        if SPECULATIVE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Category::Imagined;
        }
        Category::Casual
    }

    /// Pronoun heuristic: "you" with "I" → personal, "we" → shared,
    /// "they"/"them" → external.
    pub fn user_relation(&self, text: &str) -> Relation {
        let toks = tokens(text);
        let has = |set: &[&str]| toks.iter().any(|t| set.contains(&t.as_str()));
        if has(SECOND_PERSON) && has(FIRST_PERSON) {
            Relation::Personal
        } else if has(PLURAL_FIRST) {
            Relation::Shared
        } else if has(THIRD_PLURAL) {
            Relation::External
        } else {
            Relation::Neutral
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use peach_types::SentimentColor;

    fn engine() -> TaggingEngine {
        TaggingEngine::default()
    }

    fn record(importance: f32, mood: &str, tags: &[&str], content: &str) -> EpisodicRecord {
        EpisodicRecord {
            id: None,
            time: String::new(),
            content: content.into(),
            mood: mood.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            importance,
            relation_to_user: Relation::Neutral,
            category: Category::Casual,
            sentiment_color: SentimentColor::Neutral,
            timestamp: 0.0,
            rehearsed_count: 0,
            decayed_at: 0.0,
        }
    }

    // ── extract_tags ─────────────────────────────────────────────────────────

    #[test]
    fn scenario_sentence_tags() {
        let tags = engine().extract_tags("I miss you so much, it's been a rough week");
        assert_eq!(tags, vec!["date", "miss", "rough", "week"]);
    }

    #[test]
    fn tags_are_capped_and_unique() {
        let text = "Love and dreams under the stars by the sea, rain and sun in the mirror, \
                    hope and hurt and guilt on Monday morning with 3 friends";
        let tags = engine().extract_tags(text);
        assert!(tags.len() <= MAX_TAGS);
        let unique: HashSet<&String> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn symbolic_images_become_concepts() {
        let tags = engine().extract_tags("the stars tonight");
        assert!(tags.contains(&"cosmic".to_string()));
        assert!(tags.contains(&"time".to_string()));
    }

    #[test]
    fn person_entities_skip_sentence_starts() {
        let features = LexicalExtractor.extract("Yesterday Sam called. Later we talked");
        assert!(features.entities.contains(&"person".to_string()));
        assert!(features.entities.contains(&"date".to_string()));

        let features = LexicalExtractor.extract("Later we talked");
        assert!(!features.entities.contains(&"person".to_string()));
    }

    #[test]
    fn lemmas_drop_stop_words_and_plurals() {
        let features = LexicalExtractor.extract("the flowers and the memories");
        assert_eq!(features.lemmas, vec!["flower", "memory"]);
    }

    #[test]
    fn custom_extractor_is_used() {
        struct Fixed;
        impl FeatureExtractor for Fixed {
            fn extract(&self, _: &str) -> TextFeatures {
                TextFeatures {
                    entities: vec!["gpe".into()],
                    lemmas: vec!["city".into()],
                }
            }
        }
        let tags = TaggingEngine::new(Box::new(Fixed)).extract_tags("anything at all");
        assert_eq!(tags, vec!["gpe", "city"]);
    }

    // ── rate_importance ──────────────────────────────────────────────────────

    #[test]
    fn importance_counts_charged_words() {
        let e = engine();
        assert_eq!(e.rate_importance("I miss you so much, it's been a rough week"), 0.2);
        assert_eq!(e.rate_importance("nothing charged here"), 0.0);
        let all = "love hate dream hope fear cry beautiful miss remember";
        assert_eq!(e.rate_importance(all), 1.0);
    }

    // ── categorize ───────────────────────────────────────────────────────────

    #[test]
    fn categorize_boundaries_are_strict() {
        let e = engine();
        assert_eq!(e.categorize(&record(0.7, "unknown", &[], "plain")), Category::Casual);
        assert_eq!(e.categorize(&record(0.71, "unknown", &[], "plain")), Category::Core);
        assert_eq!(e.categorize(&record(0.3, "unknown", &[], "plain")), Category::Casual);
        assert_eq!(e.categorize(&record(0.29, "unknown", &[], "plain")), Category::Fleeting);
    }

    #[test]
    fn high_impact_mood_or_tag_is_core() {
        let e = engine();
        assert_eq!(e.categorize(&record(0.0, "longing", &[], "x")), Category::Core);
        assert_eq!(e.categorize(&record(0.0, "unknown", &["hurt"], "x")), Category::Core);
    }

    #[test]
    fn speculative_text_is_imagined_unless_fleeting() {
        let e = engine();
        let text = "maybe someday we will live by the sea";
        assert_eq!(e.categorize(&record(0.4, "unknown", &[], text)), Category::Imagined);
        assert_eq!(e.categorize(&record(0.1, "unknown", &[], text)), Category::Fleeting);
    }

    #[test]
    fn scenario_sentence_is_fleeting() {
        let e = engine();
        let text = "I miss you so much, it's been a rough week";
        let rec = record(
            e.rate_importance(text),
            "unknown",
            &["date", "miss", "rough", "week"],
            text,
        );
        assert_eq!(e.categorize(&rec), Category::Fleeting);
    }

    // ── user_relation ────────────────────────────────────────────────────────

    #[test]
    fn relation_heuristic() {
        let e = engine();
        assert_eq!(e.user_relation("I miss you"), Relation::Personal);
        assert_eq!(e.user_relation("We went hiking"), Relation::Shared);
        assert_eq!(e.user_relation("They called them back"), Relation::External);
        assert_eq!(e.user_relation("The weather is nice"), Relation::Neutral);
    }

    #[test]
    fn relation_matches_words_not_substrings() {
        // "youth" and "wedding" must not count as "you" / "we".
        assert_eq!(engine().user_relation("youth wedding"), Relation::Neutral);
    }
}
