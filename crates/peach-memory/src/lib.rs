//! `peach-memory` – The Memory Core.
//!
//! Turns a stream of chat turns into durable, decaying, reflectable memory
//! backed by a local SQLite substrate.
//!
//! # Modules
//!
//! - [`storage`] – [`Storage`][storage::Storage]: versioned SQLite schema for
//!   chat history, episodic records, active moods and the mood log.
//! - [`tagging`] – [`TaggingEngine`][tagging::TaggingEngine]: tags,
//!   importance, category and relation-to-user from raw text, behind a
//!   pluggable [`FeatureExtractor`][tagging::FeatureExtractor].
//! - [`semantic`] – [`SemanticIndex`][semantic::SemanticIndex]: embedding
//!   store with cosine-similarity recall, plus the keyword sentiment
//!   colouring.
//! - [`decay`] – [`DecayEngine`][decay::DecayEngine]: half-life ageing,
//!   eviction and rehearsal.
//! - [`reflection`] – [`ReflectionEngine`][reflection::ReflectionEngine]:
//!   mood-linked recall, narration, timelines and the life story.
//! - [`collaborator`] – [`TextGenerator`][collaborator::TextGenerator]: the
//!   optional seam to an external language model.
//! - [`orchestrator`] – [`MemoryOrchestrator`][orchestrator::MemoryOrchestrator]:
//!   the ingestion pipeline and reflection triggers, and the
//!   [`MaintenanceHandle`][orchestrator::MaintenanceHandle] used for
//!   background upkeep.

pub mod collaborator;
pub mod decay;
pub mod orchestrator;
pub mod reflection;
pub mod semantic;
pub mod storage;
pub mod tagging;

pub use collaborator::{GenerationError, TextGenerator};
pub use decay::{DecayEngine, DecayReport};
pub use orchestrator::{
    CaptureOutcome, HybridRecall, MaintenanceHandle, MaintenanceReport, MemoryConfig,
    MemoryOrchestrator, ReflectionTrigger,
};
pub use reflection::{Period, Reflection, ReflectionEngine, SharedTheme};
pub use semantic::{EmbedError, Embedder, HashingEmbedder, SemanticIndex};
pub use storage::{CleanupReport, DeleteFilter, Storage, StorageError};
pub use tagging::{FeatureExtractor, LexicalExtractor, TaggingEngine, TextFeatures};
