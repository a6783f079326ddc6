//! [`MemoryOrchestrator`] – the ingestion façade.
//!
//! Every chat turn goes through [`MemoryOrchestrator::capture`], which runs a
//! fixed pipeline:
//!
//! 1. append to the rolling chat window and persist to chat history;
//! 2. for qualifying user messages, build, persist and index an episodic
//!    record;
//! 3. decay episodic importance and mood intensity;
//! 4. let the new record and the message text stir the emotion model;
//! 5. evaluate reflection triggers and, if one fires, ask the text
//!    generator for extra tags on the most recent records.
//!
//! Storage, index and generator failures are logged and the pipeline moves
//! on; a capture never fails.
//!
//! Background upkeep runs through a [`MaintenanceHandle`].  Every importance
//! write, whether from decay or rehearsal, happens while the active-memory
//! lock is held, so the stored row always matches the live record.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use peach_emotion::EmotionState;
use peach_types::{
    Category, ChatEntry, Clock, ContextFlags, EpisodicRecord, ResponseStyle, Role, UNKNOWN_MOOD,
    display_time, word_count,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::collaborator::{TextGenerator, parse_tags, tag_prompt};
use crate::decay::{DecayEngine, REHEARSAL_BOOST, REHEARSAL_THRESHOLD};
use crate::reflection::{Period, ReflectionEngine, SharedTheme};
use crate::semantic::{SemanticIndex, sentiment_color};
use crate::storage::{CleanupReport, DeleteFilter, Storage, StorageError};
use crate::tagging::TaggingEngine;

/// Moods whose spikes trigger a reflection.
pub const SPIKE_MOODS: &[&str] = &["melancholy", "guilty", "hopeful", "nostalgic"];
/// Records sent for tag enrichment per reflection.
pub const ENRICH_WINDOW: usize = 5;
/// Recent records [`MemoryOrchestrator::self_dialogue`] picks from.
pub const DIALOGUE_WINDOW: usize = 10;
/// Importance added to a record each time a reflection surfaces it.
pub const REHEARSAL_REINFORCE: f32 = 0.05;
/// Results returned by semantic recall.
pub const SEMANTIC_RECALL_K: usize = 5;

const DIALOGUE_TONES: &[(&str, &str)] = &[
    ("sad", "like you're quietly mourning a beautiful memory you can't touch anymore"),
    ("melancholy", "like you're quietly mourning a beautiful memory you can't touch anymore"),
    ("nostalgic", "like you're flipping through an old diary by candlelight"),
    ("happy", "like you're dreaming with a soft smile under sunshine"),
    ("anxious", "like you're whispering through a lump in your throat"),
    ("excited", "like you're glowing with wonder and wide-eyed curiosity"),
];
const NEUTRAL_TONE: &str = "like you're gently thinking out loud";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Rolling chat window size.
    pub max_history: usize,
    /// User messages need *more* than this many words to become episodic.
    pub min_episodic_words: usize,
    /// Periodic reflection fires every N episodic captures.
    pub reflection_every: usize,
    /// Idle reflection fires when this long has passed since the last one.
    pub reflection_interval_secs: u64,
    /// Mood intensity that counts as a spike.
    pub spike_threshold: f32,
    /// Records loaded into active memory at startup.
    pub active_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            min_episodic_words: 5,
            reflection_every: 5,
            reflection_interval_secs: 600,
            spike_threshold: 0.85,
            active_limit: 20,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Why a reflection ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionTrigger {
    Periodic,
    Idle,
    EmotionSpike,
    Manual,
}

impl ReflectionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionTrigger::Periodic => "periodic",
            ReflectionTrigger::Idle => "idle",
            ReflectionTrigger::EmotionSpike => "emotion spike",
            ReflectionTrigger::Manual => "manual",
        }
    }
}

/// What one [`MemoryOrchestrator::capture`] call did.
#[derive(Debug, Default, Clone)]
pub struct CaptureOutcome {
    /// The persisted episodic record, when one was created.
    pub episodic: Option<EpisodicRecord>,
    pub trigger: Option<ReflectionTrigger>,
    /// Records evicted from active memory by this call's decay pass.
    pub evicted: usize,
    /// Records whose tags were enriched.
    pub enriched: usize,
}

/// Result of [`MemoryOrchestrator::hybrid_recall`].
#[derive(Debug, Default, Clone)]
pub struct HybridRecall {
    pub chat: Vec<ChatEntry>,
    /// Semantically closest contents, when a query was given.
    pub semantic: Vec<String>,
    /// Recent episodic records, when no query was given.
    pub episodic: Vec<EpisodicRecord>,
}

/// Totals from one [`MaintenanceHandle::run_once`] pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaintenanceReport {
    pub updated: usize,
    pub evicted: usize,
    pub failed: usize,
    pub moods_faded: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct MemoryOrchestrator {
    config: MemoryConfig,
    clock: Arc<dyn Clock>,
    storage: Arc<Storage>,
    semantic: Arc<SemanticIndex>,
    tagging: Arc<TaggingEngine>,
    decay: DecayEngine,
    reflection: ReflectionEngine,
    emotion: Arc<Mutex<EmotionState>>,
    active: Arc<Mutex<Vec<EpisodicRecord>>>,
    chat_window: VecDeque<ChatEntry>,
    /// Episodic records captured this session.
    captured: usize,
    last_reflection: f64,
    collaborator: Option<Arc<dyn TextGenerator>>,
    rng: Box<dyn RngCore + Send>,
}

impl MemoryOrchestrator {
    /// Wire the pipeline together and load recent state from `storage`.
    ///
    /// Load failures are logged and leave the corresponding in-memory state
    /// empty.
    pub fn new(
        config: MemoryConfig,
        storage: Arc<Storage>,
        semantic: Arc<SemanticIndex>,
        emotion: EmotionState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut active = storage
            .query_episodic(config.active_limit, None, None)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to load episodic memories");
                Vec::new()
            });
        active.reverse();
        let chat_window: VecDeque<ChatEntry> = storage
            .recent_chat(config.max_history)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to load chat history");
                Vec::new()
            })
            .into();
        info!(
            active = active.len(),
            chat = chat_window.len(),
            "memory orchestrator ready"
        );

        let now = clock.now();
        Self {
            config,
            clock,
            storage,
            semantic,
            tagging: Arc::new(TaggingEngine::default()),
            decay: DecayEngine::default(),
            reflection: ReflectionEngine::default(),
            emotion: Arc::new(Mutex::new(emotion)),
            active: Arc::new(Mutex::new(active)),
            chat_window,
            captured: 0,
            last_reflection: now,
            collaborator: None,
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    /// Attach the text generator used for enrichment and dialogue.
    pub fn with_collaborator(mut self, collaborator: Arc<dyn TextGenerator>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    /// Replace the random source used to pick dialogue memories.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    /// Replace the tagging engine (e.g. with a richer feature extractor).
    pub fn with_tagging(mut self, tagging: TaggingEngine) -> Self {
        self.tagging = Arc::new(tagging);
        self
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Run one chat turn through the pipeline.
    pub fn capture(&mut self, role: Role, content: &str, mood: Option<&str>) -> CaptureOutcome {
        let now = self.clock.now();
        let entry = ChatEntry {
            role,
            content: content.to_string(),
            mood: mood.map(str::to_string),
            timestamp: now,
        };
        if let Err(e) = self.storage.append_chat(&entry) {
            error!(error = %e, "failed to save chat entry");
        }
        self.chat_window.push_back(entry);
        while self.chat_window.len() > self.config.max_history {
            self.chat_window.pop_front();
        }

        let mut outcome = CaptureOutcome::default();
        if role == Role::User && word_count(content) > self.config.min_episodic_words {
            outcome.episodic = self.record_episode(content, mood, now);
        }

        outcome.evicted = self.decay_all(now);

        {
            let mut emotion = self.emotion.lock();
            if let Some(record) = &outcome.episodic {
                if let Some((weighted_mood, boost)) = ReflectionEngine::weigh_memory(record) {
                    emotion.update_emotion(&weighted_mood, boost);
                }
                emotion.process_memory(record);
            }
            if role == Role::User {
                emotion.update_mood_from_input(content, None);
            }
        }

        if outcome.episodic.is_some() {
            self.captured += 1;
        }
        outcome.trigger = self.evaluate_triggers(outcome.episodic.is_some(), now);
        if let Some(trigger) = outcome.trigger {
            outcome.enriched = self.enrich_tags(trigger);
        }
        outcome
    }

    fn record_episode(&self, content: &str, mood: Option<&str>, now: f64) -> Option<EpisodicRecord> {
        let mut record = EpisodicRecord {
            id: None,
            time: display_time(now),
            content: content.to_string(),
            mood: mood.unwrap_or(UNKNOWN_MOOD).to_string(),
            tags: self.tagging.extract_tags(content),
            importance: self.tagging.rate_importance(content),
            relation_to_user: self.tagging.user_relation(content),
            category: Category::Casual,
            sentiment_color: sentiment_color(content),
            timestamp: now,
            rehearsed_count: 0,
            decayed_at: now,
        };
        record.category = self.tagging.categorize(&record);

        match self.storage.insert_episodic(&record) {
            Ok(id) => record.id = Some(id),
            Err(e) => {
                error!(error = %e, "failed to save episodic record");
                return None;
            }
        }
        info!(
            id = ?record.id,
            importance = record.importance,
            category = record.category.as_str(),
            "episodic memory captured"
        );

        if let Err(e) = self.semantic.index_record(&record) {
            self.semantic.report_failure(&record, &e);
        }
        self.active.lock().push(record.clone());
        Some(record)
    }

    /// Episodic and mood decay.  Returns the number of evicted records.
    fn decay_all(&self, now: f64) -> usize {
        let report = {
            let mut active = self.active.lock();
            self.decay
                .decay_episodic(&mut active, &self.storage, &self.tagging, now)
        };
        self.decay.decay_moods(&mut self.emotion.lock());
        report.evicted.len()
    }

    fn evaluate_triggers(&self, episodic: bool, now: f64) -> Option<ReflectionTrigger> {
        let every = self.config.reflection_every;
        if episodic && every > 0 && self.captured % every == 0 {
            return Some(ReflectionTrigger::Periodic);
        }
        if now - self.last_reflection > self.config.reflection_interval_secs as f64 {
            return Some(ReflectionTrigger::Idle);
        }
        let spike = self
            .emotion
            .lock()
            .has_spike(self.config.spike_threshold, SPIKE_MOODS);
        if let Some(mood) = spike {
            debug!(mood, "emotion spike");
            return Some(ReflectionTrigger::EmotionSpike);
        }
        None
    }

    /// Ask the text generator for extra tags on the most recent records.
    /// Returns how many records gained tags; `0` without a generator.
    pub fn enrich_tags(&mut self, trigger: ReflectionTrigger) -> usize {
        self.last_reflection = self.clock.now();
        info!(reason = trigger.as_str(), "reflection triggered");

        let Some(generator) = self.collaborator.clone() else {
            debug!("no text generator attached; enrichment skipped");
            return 0;
        };
        let recent = match self.storage.query_episodic(ENRICH_WINDOW, None, None) {
            Ok(recent) => recent,
            Err(e) => {
                warn!(error = %e, "failed to load records for enrichment");
                return 0;
            }
        };

        let mut enriched = 0;
        for mut record in recent {
            let Some(id) = record.id else { continue };
            let reply = match generator.generate(&tag_prompt(&record.content)) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(id, error = %e, "tag enrichment failed");
                    continue;
                }
            };
            let before = record.tags.len();
            record.merge_tags(parse_tags(&reply));
            if record.tags.len() == before {
                continue;
            }
            if let Err(e) = self.storage.update_episodic_tags(id, &record.tags) {
                warn!(id, error = %e, "failed to persist enriched tags");
                continue;
            }
            if let Some(live) = self.active.lock().iter_mut().find(|r| r.id == Some(id)) {
                live.tags = record.tags.clone();
            }
            debug!(id, tags = ?record.tags, "tags enriched");
            enriched += 1;
        }
        enriched
    }

    // ── Recall ───────────────────────────────────────────────────────────────

    /// Short-term recall: the last `max_history` chat turns, oldest first.
    pub fn recall(&self) -> Vec<ChatEntry> {
        self.storage
            .recent_chat(self.config.max_history)
            .unwrap_or_else(|e| {
                warn!(error = %e, "chat recall fell back to the in-memory window");
                self.chat_window.iter().cloned().collect()
            })
    }

    /// Chat recall plus either semantic matches for `query` or the most
    /// recent episodic records.
    pub fn hybrid_recall(&self, query: Option<&str>) -> HybridRecall {
        let chat = self.recall();
        match query {
            Some(q) => HybridRecall {
                chat,
                semantic: self.semantic.query_nearest(q, SEMANTIC_RECALL_K),
                episodic: Vec::new(),
            },
            None => HybridRecall {
                chat,
                semantic: Vec::new(),
                episodic: self
                    .storage
                    .query_episodic(self.config.active_limit, None, None)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "episodic recall fell back to active memory");
                        self.active_memories()
                    }),
            },
        }
    }

    /// Top `top_n` active records by rehearsal-weighted recency.
    pub fn weighted_recall(&self, top_n: usize) -> Vec<EpisodicRecord> {
        let now = self.clock.now();
        ReflectionEngine::recency_weighted(&self.active.lock(), top_n, now)
    }

    // ── Reflection ───────────────────────────────────────────────────────────

    /// Reflect on active memories linked to `mood` (default: current mood).
    /// Surfaced records are rehearsed.
    pub fn reflect(&mut self, mood: Option<&str>) -> String {
        let mood = match mood {
            Some(m) => m.to_string(),
            None => self.emotion.lock().current_mood(),
        };
        let snapshot = self.active_memories();
        let reflection = self.reflection.reflect(&snapshot, &mood);
        for record in &reflection.surfaced {
            self.rehearse(record.id);
        }
        reflection.text
    }

    fn rehearse(&self, id: Option<i64>) {
        let Some(id) = id else { return };
        let mut active = self.active.lock();
        let Some(record) = active.iter_mut().find(|r| r.id == Some(id)) else {
            return;
        };
        record.rehearsed_count += 1;
        DecayEngine::reinforce(record, REHEARSAL_REINFORCE);
        if let Err(e) = self.storage.update_episodic(record) {
            warn!(id, error = %e, "failed to persist rehearsal");
        }
    }

    /// Speak aloud about one recent memory.  Uses the text generator when
    /// attached and falls back to local self-talk otherwise.
    pub fn self_dialogue(&mut self) -> String {
        let candidates: Vec<EpisodicRecord> = {
            let active = self.active.lock();
            active.iter().rev().take(DIALOGUE_WINDOW).cloned().collect()
        };
        if candidates.is_empty() {
            return "I haven't experienced enough yet to reflect on anything... but I'm ready."
                .to_string();
        }
        let memory = candidates[self.rng.gen_range(0..candidates.len())].clone();
        self.rehearse(memory.id);

        let mood = self.emotion.lock().current_mood();
        let summary = poetic_summary(&memory, self.rng.gen_range(0..3));

        if let Some(generator) = &self.collaborator {
            let tone = DIALOGUE_TONES
                .iter()
                .find(|(m, _)| *m == mood)
                .map(|(_, t)| *t)
                .unwrap_or(NEUTRAL_TONE);
            let prompt = format!(
                "Reflect aloud in a few sentences on this memory:\n{summary}\n\
                 Mood: {}, Tags: {}.\nSpeak {tone}.",
                memory.mood,
                memory.tags.join(", ")
            );
            match generator.generate(&prompt) {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => warn!("text generator returned an empty reflection"),
                Err(e) => warn!(error = %e, "reflection narration failed"),
            }
        }
        format!(
            "{summary}\n{}",
            ReflectionEngine::self_talk(std::slice::from_ref(&memory), &mood)
        )
    }

    /// Reflection requested by the user.
    pub fn manual_reflect(&mut self) -> usize {
        self.enrich_tags(ReflectionTrigger::Manual)
    }

    /// Reflect when `level` is extreme (above 0.8 or below 0.2).  Returns
    /// the enrichment count when a reflection ran.
    pub fn emotional_spike_reflect(&mut self, level: f32) -> Option<usize> {
        (level > 0.8 || level < 0.2).then(|| self.enrich_tags(ReflectionTrigger::EmotionSpike))
    }

    /// Most recent pair of active records sharing a tag.
    pub fn shared_theme(&self) -> Option<SharedTheme> {
        ReflectionEngine::shared_theme(&self.active.lock())
    }

    /// Stored records bucketed by calendar period.
    pub fn timeline(&self, unit: Period) -> BTreeMap<String, Vec<EpisodicRecord>> {
        let records = self.all_records();
        ReflectionEngine::group_by_period(&records, unit)
    }

    /// Chronological story of the important stored records.
    pub fn life_story(&self) -> String {
        ReflectionEngine::life_narrative(&self.all_records())
    }

    fn all_records(&self) -> Vec<EpisodicRecord> {
        self.storage.all_episodic().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to active memory");
            self.active_memories()
        })
    }

    // ── Forgetting ───────────────────────────────────────────────────────────

    /// Delete matching records everywhere.  Returns how many were removed.
    pub fn forget(&mut self, filter: &DeleteFilter) -> Result<usize, StorageError> {
        let ids = self.storage.delete_episodic(filter)?;
        self.drop_ids(&ids);
        Ok(ids.len())
    }

    /// Delete stored records that have faded below the eviction floor.
    pub fn prune_faded(&mut self) -> Result<usize, StorageError> {
        let ids = self.storage.prune_below(crate::decay::EVICTION_FLOOR)?;
        self.drop_ids(&ids);
        Ok(ids.len())
    }

    /// Delete chat turns and records captured before `cutoff` (unix
    /// seconds), along with their index entries.
    pub fn cleanup_older_than(&mut self, cutoff: f64) -> Result<CleanupReport, StorageError> {
        let report = self.storage.cleanup_older_than(cutoff)?;
        self.chat_window.retain(|e| e.timestamp >= cutoff);
        self.drop_ids(&report.episodic_removed);
        Ok(report)
    }

    fn drop_ids(&self, ids: &[i64]) {
        if ids.is_empty() {
            return;
        }
        let gone: HashSet<i64> = ids.iter().copied().collect();
        self.active
            .lock()
            .retain(|r| r.id.is_none_or(|id| !gone.contains(&id)));
        if let Err(e) = self.semantic.remove(ids) {
            error!(target: "peach::semantic", error = %e, "failed to drop index entries");
        }
    }

    // ── Emotion ──────────────────────────────────────────────────────────────

    pub fn current_mood(&self) -> String {
        self.emotion.lock().current_mood()
    }

    pub fn blended_mood(&self) -> String {
        self.emotion.lock().blended_mood()
    }

    pub fn response_style(&self, context: Option<&ContextFlags>) -> ResponseStyle {
        self.emotion.lock().choose_response_style(context)
    }

    /// Shared handle to the emotion model.
    pub fn emotion(&self) -> Arc<Mutex<EmotionState>> {
        Arc::clone(&self.emotion)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// The in-process rolling chat window, oldest first.
    pub fn chat_window(&self) -> Vec<ChatEntry> {
        self.chat_window.iter().cloned().collect()
    }

    /// Snapshot of active episodic memory, oldest first.
    pub fn active_memories(&self) -> Vec<EpisodicRecord> {
        self.active.lock().clone()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Current time on the orchestrator's clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// A cloneable handle for background upkeep.
    pub fn maintenance(&self) -> MaintenanceHandle {
        MaintenanceHandle {
            clock: Arc::clone(&self.clock),
            storage: Arc::clone(&self.storage),
            tagging: Arc::clone(&self.tagging),
            decay: self.decay,
            emotion: Arc::clone(&self.emotion),
            active: Arc::clone(&self.active),
        }
    }
}

fn poetic_summary(memory: &EpisodicRecord, variant: usize) -> String {
    let excerpt: String = memory.content.chars().take(60).collect();
    match variant {
        0 => format!("I remember... you once told me, '{excerpt}'"),
        1 => format!(
            "It stayed with me, the time you felt {} and said: '{excerpt}'",
            memory.mood
        ),
        _ => format!("There was a moment... quiet, vivid. You shared this: '{excerpt}'"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MaintenanceHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Decay and rehearsal over shared orchestrator state.
#[derive(Clone)]
pub struct MaintenanceHandle {
    clock: Arc<dyn Clock>,
    storage: Arc<Storage>,
    tagging: Arc<TaggingEngine>,
    decay: DecayEngine,
    emotion: Arc<Mutex<EmotionState>>,
    active: Arc<Mutex<Vec<EpisodicRecord>>>,
}

impl MaintenanceHandle {
    /// One decay pass over active memory and the emotion model.
    pub fn run_once(&self) -> MaintenanceReport {
        let now = self.clock.now();
        let report = {
            let mut active = self.active.lock();
            self.decay
                .decay_episodic(&mut active, &self.storage, &self.tagging, now)
        };

        let moods_faded = self.decay.decay_moods(&mut self.emotion.lock());
        let summary = MaintenanceReport {
            updated: report.updated,
            evicted: report.evicted.len(),
            failed: report.failed,
            moods_faded,
        };
        debug!(?summary, "maintenance pass complete");
        summary
    }

    /// Rehearse every important stored record.
    pub fn rehearse(&self) -> Result<usize, StorageError> {
        let mut active = self.active.lock();
        self.decay
            .reinforce_important(&self.storage, &mut active, REHEARSAL_THRESHOLD, REHEARSAL_BOOST)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::GenerationError;
    use crate::decay::HALF_LIFE_SECS;
    use crate::semantic::{EmbedError, Embedder, HashingEmbedder};
    use peach_types::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const START: f64 = 1_710_000_000.0;

    struct Fixture {
        clock: Arc<ManualClock>,
        storage: Arc<Storage>,
        memory: MemoryOrchestrator,
    }

    fn fixture_with(embedder: Arc<dyn Embedder>) -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let semantic = Arc::new(SemanticIndex::open_in_memory(embedder).unwrap());
        let emotion = EmotionState::seeded(clock.clone(), 42).with_journal(storage.clone());
        let memory = MemoryOrchestrator::new(
            MemoryConfig::default(),
            storage.clone(),
            semantic,
            emotion,
            clock.clone(),
        )
        .with_rng(Box::new(StdRng::seed_from_u64(9)));
        Fixture { clock, storage, memory }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(HashingEmbedder::default()))
    }

    /// Replies with a fixed tag list and counts calls.
    struct ScriptedGenerator {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map_err(|_| GenerationError::Unavailable("offline".into()))
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Backend("model not loaded".into()))
        }
    }

    fn errand(i: usize) -> String {
        format!("I went to the market with my brother {i}")
    }

    // ── capture ──────────────────────────────────────────────────────────────

    #[test]
    fn scenario_message_creates_episodic_record() {
        let mut f = fixture();
        let outcome = f.memory.capture(
            Role::User,
            "I miss you so much, it's been a rough week",
            None,
        );
        let record = outcome.episodic.expect("episodic record");
        assert!(record.tags.contains(&"miss".to_string()));
        assert!(record.importance > 0.0);
        assert_eq!(record.relation_to_user, peach_types::Relation::Personal);
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
        assert!(f.memory.emotion().lock().intensity("romantic") > 0.0);
    }

    #[test]
    fn short_and_assistant_messages_are_not_episodic() {
        let mut f = fixture();
        assert!(f.memory.capture(Role::User, "hi there you", None).episodic.is_none());
        let long = "sure, I can tell you all about it right now";
        assert!(f.memory.capture(Role::Assistant, long, Some("playful")).episodic.is_none());
        assert_eq!(f.storage.count_episodic().unwrap(), 0);
        assert_eq!(f.memory.recall().len(), 2);
    }

    #[test]
    fn chat_window_is_bounded() {
        let mut f = fixture();
        for i in 0..15 {
            f.memory.capture(Role::Assistant, &format!("turn {i}"), None);
        }
        let window = f.memory.chat_window();
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].content, "turn 5");
        assert_eq!(f.storage.recent_chat(100).unwrap().len(), 15);
    }

    #[test]
    fn fifth_qualifying_message_triggers_periodic_enrichment() {
        let mut f = fixture();
        let generator = ScriptedGenerator::ok("longing, distance");
        f.memory = f.memory.with_collaborator(generator.clone());

        for i in 1..=4 {
            let outcome = f.memory.capture(Role::User, &errand(i), None);
            assert!(outcome.episodic.is_some());
            assert_eq!(outcome.trigger, None, "message {i}");
        }
        let outcome = f.memory.capture(Role::User, &errand(5), None);
        assert_eq!(outcome.trigger, Some(ReflectionTrigger::Periodic));
        assert_eq!(generator.calls.load(Ordering::SeqCst), ENRICH_WINDOW);
        assert_eq!(outcome.enriched, ENRICH_WINDOW);

        let newest = &f.storage.query_episodic(1, None, None).unwrap()[0];
        assert!(newest.tags.contains(&"longing".to_string()));
        assert!(newest.tags.len() <= peach_types::MAX_TAGS);
    }

    #[test]
    fn idle_trigger_fires_after_interval() {
        let mut f = fixture();
        f.clock.advance(601.0);
        let outcome = f.memory.capture(Role::Assistant, "still here", None);
        assert_eq!(outcome.trigger, Some(ReflectionTrigger::Idle));
        // The reflection resets the idle timer.
        let outcome = f.memory.capture(Role::Assistant, "still here", None);
        assert_eq!(outcome.trigger, None);
    }

    #[test]
    fn spike_trigger_fires_on_loaded_mood() {
        let mut f = fixture();
        f.memory.emotion().lock().update_emotion("nostalgic", 1.0);
        let outcome = f.memory.capture(Role::Assistant, "okay", None);
        assert_eq!(outcome.trigger, Some(ReflectionTrigger::EmotionSpike));
    }

    #[test]
    fn missing_or_failing_generator_is_skipped() {
        let mut f = fixture();
        f.memory.capture(Role::User, &errand(1), None);
        assert_eq!(f.memory.manual_reflect(), 0);

        let generator = ScriptedGenerator::failing();
        f.memory = f.memory.with_collaborator(generator.clone());
        assert_eq!(f.memory.manual_reflect(), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn embedding_failure_keeps_the_record() {
        let mut f = fixture_with(Arc::new(BrokenEmbedder));
        let outcome = f.memory.capture(Role::User, &errand(1), None);
        assert!(outcome.episodic.is_some());
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
        assert!(f.memory.hybrid_recall(Some("market")).semantic.is_empty());
    }

    #[test]
    fn zero_importance_records_leave_active_memory() {
        let mut f = fixture();
        let outcome = f.memory.capture(Role::User, &errand(1), None);
        assert_eq!(outcome.episodic.unwrap().importance, 0.0);
        assert_eq!(outcome.evicted, 1);
        assert!(f.memory.active_memories().is_empty());
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
    }

    #[test]
    fn important_memory_stirs_its_mood() {
        let mut f = fixture();
        let text = "I remember how much I love you and hope we never cry again";
        let outcome = f.memory.capture(Role::User, text, Some("grateful"));
        let record = outcome.episodic.unwrap();
        assert!(record.importance > 0.7);
        assert_eq!(record.category, Category::Core);
        assert!(f.memory.emotion().lock().intensity("grateful") > 0.0);
    }

    // ── recall ───────────────────────────────────────────────────────────────

    #[test]
    fn hybrid_recall_with_and_without_query() {
        let mut f = fixture();
        f.memory.capture(Role::User, "we watched the stars over the sea last night", None);
        f.memory.capture(Role::User, "my boss yelled about the quarterly report today", None);

        let semantic = f.memory.hybrid_recall(Some("stars over the sea"));
        assert_eq!(semantic.chat.len(), 2);
        assert_eq!(semantic.semantic[0], "we watched the stars over the sea last night");

        let plain = f.memory.hybrid_recall(None);
        assert_eq!(plain.episodic.len(), 2);
        assert!(plain.semantic.is_empty());
    }

    #[test]
    fn restart_restores_active_memory_and_chat() {
        let f = fixture();
        let mut memory = f.memory;
        memory.capture(Role::User, "I love the way the rain sounds at night", None);
        drop(memory);

        let semantic = Arc::new(
            SemanticIndex::open_in_memory(Arc::new(HashingEmbedder::default())).unwrap(),
        );
        let emotion = EmotionState::seeded(f.clock.clone(), 1).with_journal(f.storage.clone());
        let revived = MemoryOrchestrator::new(
            MemoryConfig::default(),
            f.storage.clone(),
            semantic,
            emotion,
            f.clock.clone(),
        );
        assert_eq!(revived.active_memories().len(), 1);
        assert_eq!(revived.chat_window().len(), 1);
    }

    // ── reflection ───────────────────────────────────────────────────────────

    #[test]
    fn reflect_rehearses_surfaced_records() {
        let mut f = fixture();
        let text = "I love you and I hope we can dream together";
        let record = f.memory.capture(Role::User, text, Some("hopeful")).episodic.unwrap();
        let id = record.id.unwrap();

        let text = f.memory.reflect(Some("hopeful"));
        assert!(text.contains("dream together"));

        let stored = f.storage.get_episodic(id).unwrap().unwrap();
        assert_eq!(stored.rehearsed_count, 1);
        assert!(stored.importance > record.importance - 1e-6);
    }

    #[test]
    fn self_dialogue_without_memories() {
        let mut f = fixture();
        assert!(f.memory.self_dialogue().contains("haven't experienced enough"));
    }

    #[test]
    fn self_dialogue_uses_generator_then_falls_back() {
        let mut f = fixture();
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);

        let local = f.memory.self_dialogue();
        assert!(local.contains("rain sounds"));

        f.memory = f.memory.with_collaborator(ScriptedGenerator::ok("  A soft reply.  "));
        assert_eq!(f.memory.self_dialogue(), "A soft reply.");

        f.memory = f.memory.with_collaborator(ScriptedGenerator::failing());
        assert!(f.memory.self_dialogue().contains("rain sounds"));
    }

    #[test]
    fn spike_reflect_only_on_extremes() {
        let mut f = fixture();
        assert_eq!(f.memory.emotional_spike_reflect(0.5), None);
        assert_eq!(f.memory.emotional_spike_reflect(0.9), Some(0));
        assert_eq!(f.memory.emotional_spike_reflect(0.1), Some(0));
    }

    #[test]
    fn timeline_and_story() {
        let mut f = fixture();
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);
        f.clock.advance(86_400.0 * 2.0);
        f.memory.capture(Role::User, "I remember the beautiful dream I had, I hope it returns", None);

        let days = f.memory.timeline(Period::Day);
        assert_eq!(days.len(), 2);
        assert!(f.memory.life_story().contains("beautiful dream"));
    }

    // ── forgetting ───────────────────────────────────────────────────────────

    #[test]
    fn forget_removes_everywhere() {
        let mut f = fixture();
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);
        f.memory.capture(Role::User, "I love the smell of coffee in the morning", None);

        let removed = f.memory.forget(&DeleteFilter::Keyword("coffee".into())).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
        assert!(f.memory.active_memories().iter().all(|r| !r.content.contains("coffee")));
        assert!(f.memory.hybrid_recall(Some("coffee morning")).semantic.iter().all(|c| !c.contains("coffee")));
    }

    #[test]
    fn prune_removes_faded_rows() {
        let mut f = fixture();
        f.memory.capture(Role::User, &errand(1), None);
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);
        assert_eq!(f.memory.prune_faded().unwrap(), 1);
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
    }

    #[test]
    fn cleanup_clears_old_records_from_recall() {
        let mut f = fixture();
        f.memory.capture(Role::User, "I love the smell of coffee in the morning", None);
        f.clock.advance(86_400.0 * 3.0);
        let cutoff = f.clock.now();
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);

        let report = f.memory.cleanup_older_than(cutoff).unwrap();
        assert_eq!(report.episodic_removed.len(), 1);
        assert_eq!(report.chat_removed, 1);
        assert_eq!(f.memory.chat_window().len(), 1);
        assert_eq!(f.storage.count_episodic().unwrap(), 1);
        let recalled = f.memory.hybrid_recall(Some("coffee morning")).semantic;
        assert!(recalled.iter().all(|c| !c.contains("coffee")));
    }

    // ── maintenance ──────────────────────────────────────────────────────────

    #[test]
    fn maintenance_pass_decays_shared_state() {
        let mut f = fixture();
        let record = f
            .memory
            .capture(Role::User, "I love you and I hope we can dream together", None)
            .episodic
            .unwrap();
        let handle = f.memory.maintenance();

        f.clock.advance(HALF_LIFE_SECS);
        let report = handle.run_once();
        assert_eq!(report.updated, 1);
        assert!(report.moods_faded > 0);

        let live = &f.memory.active_memories()[0];
        assert!((live.importance - record.importance * 0.5).abs() < 1e-4);
        let stored = f.storage.get_episodic(record.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.importance, live.importance);
    }

    #[test]
    fn maintenance_evicts_long_idle_records() {
        let mut f = fixture();
        f.memory.capture(Role::User, "I love the way the rain sounds at night", None);
        let handle = f.memory.maintenance();
        f.clock.advance(HALF_LIFE_SECS * 10.0);
        let report = handle.run_once();
        assert_eq!(report.evicted, 1);
        assert!(f.memory.active_memories().is_empty());
    }

    #[test]
    fn records_faded_by_maintenance_can_be_pruned() {
        let mut f = fixture();
        let record = f
            .memory
            .capture(Role::User, "I love the way the rain sounds at night", None)
            .episodic
            .unwrap();
        let handle = f.memory.maintenance();
        f.clock.advance(HALF_LIFE_SECS * 10.0);
        assert_eq!(handle.run_once().evicted, 1);

        let stored = f.storage.get_episodic(record.id.unwrap()).unwrap().unwrap();
        assert!(stored.importance < crate::decay::EVICTION_FLOOR);
        assert_eq!(f.memory.prune_faded().unwrap(), 1);
        assert_eq!(f.storage.count_episodic().unwrap(), 0);
    }

    fn hopeful(i: usize) -> EpisodicRecord {
        EpisodicRecord {
            id: None,
            time: display_time(START),
            content: format!("I hope the garden blooms again this spring {i}"),
            mood: "hopeful".into(),
            tags: vec!["garden".into()],
            importance: 0.9,
            relation_to_user: peach_types::Relation::Neutral,
            category: Category::Core,
            sentiment_color: peach_types::SentimentColor::Neutral,
            timestamp: START,
            rehearsed_count: 0,
            decayed_at: START,
        }
    }

    #[test]
    fn concurrent_maintenance_keeps_rehearsals() {
        const RECORDS: usize = 300;
        const ROUNDS: u32 = 5;

        let clock = Arc::new(ManualClock::new(START));
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        for i in 0..RECORDS {
            storage.insert_episodic(&hopeful(i)).unwrap();
        }
        let semantic = Arc::new(
            SemanticIndex::open_in_memory(Arc::new(HashingEmbedder::default())).unwrap(),
        );
        let config = MemoryConfig {
            active_limit: RECORDS,
            ..MemoryConfig::default()
        };
        let mut memory = MemoryOrchestrator::new(
            config,
            storage.clone(),
            semantic,
            EmotionState::seeded(clock.clone(), 3),
            clock.clone(),
        );
        assert_eq!(memory.active_memories().len(), RECORDS);

        let handle = memory.maintenance();
        let ticker = clock.clone();
        let worker = std::thread::spawn(move || {
            for _ in 0..ROUNDS {
                ticker.advance(600.0);
                handle.run_once();
            }
        });
        for _ in 0..ROUNDS {
            memory.reflect(Some("hopeful"));
        }
        worker.join().unwrap();

        let live = memory.active_memories();
        assert_eq!(live.len(), RECORDS);
        for record in live {
            let stored = storage.get_episodic(record.id.unwrap()).unwrap().unwrap();
            assert_eq!(record.rehearsed_count, ROUNDS);
            assert_eq!(stored.rehearsed_count, record.rehearsed_count);
            assert_eq!(stored.importance, record.importance);
            assert_eq!(stored.decayed_at, record.decayed_at);
        }
    }

    #[test]
    fn maintenance_rehearsal_boosts_important_records() {
        let mut f = fixture();
        let record = f
            .memory
            .capture(Role::User, "I love the way the rain sounds at night", None)
            .episodic
            .unwrap();
        let touched = f.memory.maintenance().rehearse().unwrap();
        assert_eq!(touched, 0, "importance 0.2 is below the rehearsal threshold");

        let text = "I remember how much I love you and hope we never cry again";
        f.memory.capture(Role::User, text, None);
        assert_eq!(f.memory.maintenance().rehearse().unwrap(), 1);
        let stored = f.storage.get_episodic(record.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.importance, record.importance);
    }
}
