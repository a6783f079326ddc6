//! Semantic Engine – embedding index and lexical sentiment colour.
//!
//! Episodic content is encoded by an [`Embedder`] and stored in a
//! [`SemanticIndex`], a small SQLite vector table ranked by cosine
//! similarity.  Index failures never propagate into capture: they are
//! reported on the `peach::semantic` tracing target and, when configured,
//! appended to a failure log file.
//!
//! # Storage layout
//!
//! | column    | type | description                                  |
//! |-----------|------|----------------------------------------------|
//! | id        | TEXT | episodic record id                           |
//! | content   | TEXT | indexed text                                 |
//! | mood      | TEXT | record mood at capture time                  |
//! | tags      | TEXT | JSON array of tags at capture time           |
//! | embedding | BLOB | little-endian f32 vector (4 × N bytes)       |

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use peach_types::{EpisodicRecord, SentimentColor};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while encoding or indexing text.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Nothing to embed")]
    Empty,
    #[error("Embedding backend error: {0}")]
    Backend(String),
    #[error("Embedding request timed out")]
    Timeout,
    #[error("Embedding vectors must be non-empty and equal in length")]
    DimensionMismatch,
    #[error("Index error: {0}")]
    Index(#[from] rusqlite::Error),
    #[error("Metadata codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedders
// ─────────────────────────────────────────────────────────────────────────────

/// Turns text into a dense vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Default dimensionality of [`HashingEmbedder`].
pub const HASHING_DIMS: usize = 64;

/// Signed feature hashing of lower-case word tokens, L2-normalised.
///
/// Purely local and deterministic; good enough to rank texts that share
/// vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dims: HASHING_DIMS }
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut v = vec![0.0f32; self.dims];
        let mut any = false;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let idx = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            v[idx] += sign;
            any = true;
        }
        if !any {
            return Err(EmbedError::Empty);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector helpers
// ─────────────────────────────────────────────────────────────────────────────

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SemanticIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata stored next to each vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub mood: String,
    pub tags: Vec<String>,
}

/// A ranked hit from [`SemanticIndex::query_scored`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// SQLite-backed vector index keyed by episodic record id.
pub struct SemanticIndex {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    failure_log: Option<PathBuf>,
}

impl SemanticIndex {
    /// Open (or create) a persistent index at `path`.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self, EmbedError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, embedder)
    }

    /// Open a temporary in-memory index (useful for testing).
    pub fn open_in_memory(embedder: Arc<dyn Embedder>) -> Result<Self, EmbedError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, embedder)
    }

    fn from_connection(conn: Connection, embedder: Arc<dyn Embedder>) -> Result<Self, EmbedError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS semantic_index (
                id        TEXT NOT NULL PRIMARY KEY,
                content   TEXT NOT NULL,
                mood      TEXT NOT NULL,
                tags      TEXT NOT NULL,
                embedding BLOB NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            failure_log: None,
        })
    }

    /// Also append indexing failures to the file at `path`.
    pub fn with_failure_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.failure_log = Some(path.into());
        self
    }

    /// Store one vector entry, replacing any previous entry with the same id.
    pub fn add_record(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: &IndexMetadata,
    ) -> Result<(), EmbedError> {
        if embedding.is_empty() {
            return Err(EmbedError::DimensionMismatch);
        }
        let tags = serde_json::to_string(&metadata.tags)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO semantic_index (id, content, mood, tags, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, content, metadata.mood, tags, embedding_to_bytes(embedding)],
        )?;
        Ok(())
    }

    /// Embed and store a persisted episodic record.
    pub fn index_record(&self, record: &EpisodicRecord) -> Result<(), EmbedError> {
        let key = index_key(record);
        let embedding = self.embedder.embed(&record.content)?;
        self.add_record(
            &key,
            &record.content,
            &embedding,
            &IndexMetadata {
                mood: record.mood.clone(),
                tags: record.tags.clone(),
            },
        )?;
        debug!(key = %key, dims = embedding.len(), "record indexed");
        Ok(())
    }

    /// Report an indexing failure on the side channel.
    pub fn report_failure(&self, record: &EpisodicRecord, err: &EmbedError) {
        let key = index_key(record);
        error!(target: "peach::semantic", key = %key, error = %err, "embedding failed");
        let Some(path) = &self.failure_log else {
            return;
        };
        let preview: String = record.content.chars().take(50).collect();
        let line = format!("{}: {preview} - Error: {err}\n", record.timestamp);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            error!(target: "peach::semantic", error = %e, "failure log unavailable");
        }
    }

    /// Rank stored entries against `text`.
    pub fn query_scored(&self, text: &str, k: usize) -> Result<Vec<SemanticMatch>, EmbedError> {
        let query = self.embedder.embed(text)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, content, embedding FROM semantic_index")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;
        let mut scored = Vec::new();
        for row in rows {
            let (id, content, blob) = row?;
            let embedding = bytes_to_embedding(&blob);
            if embedding.len() != query.len() {
                continue;
            }
            let score = cosine_similarity(&embedding, &query);
            scored.push(SemanticMatch { id, content, score });
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// The `k` stored contents closest to `text`.  Empty on any failure.
    pub fn query_nearest(&self, text: &str, k: usize) -> Vec<String> {
        match self.query_scored(text, k) {
            Ok(hits) => hits.into_iter().map(|m| m.content).collect(),
            Err(e) => {
                error!(target: "peach::semantic", error = %e, "semantic recall failed");
                Vec::new()
            }
        }
    }

    /// Drop the entries for the given episodic ids.
    pub fn remove(&self, ids: &[i64]) -> Result<usize, EmbedError> {
        let conn = self.conn.lock();
        let mut removed = 0;
        for id in ids {
            removed += conn.execute(
                "DELETE FROM semantic_index WHERE id = ?1",
                params![id.to_string()],
            )?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, EmbedError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM semantic_index", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, EmbedError> {
        Ok(self.len()? == 0)
    }
}

/// Index key for a record: its row id, or its timestamp before persistence.
fn index_key(record: &EpisodicRecord) -> String {
    match record.id {
        Some(id) => id.to_string(),
        None => record.timestamp.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sentiment colour
// ─────────────────────────────────────────────────────────────────────────────

/// Keyword buckets, in tie-break order.
pub const SENTIMENT_BUCKETS: &[(SentimentColor, &[&str])] = &[
    (
        SentimentColor::Warm,
        &["love", "hope", "happiness", "joy", "bright", "sunshine", "comfort"],
    ),
    (
        SentimentColor::Melancholy,
        &["sad", "grief", "loss", "lonely", "tears", "heartache", "rain"],
    ),
    (
        SentimentColor::Bright,
        &["bright", "excited", "joyful", "future", "dream", "inspired", "adventure"],
    ),
    (
        SentimentColor::Neutral,
        &["calm", "peace", "normal", "quiet", "neutral", "balanced"],
    ),
    (
        SentimentColor::Anxious,
        &["nervous", "worried", "fear", "stress", "overwhelmed", "anxiety"],
    ),
    (
        SentimentColor::Reflective,
        &["memory", "remember", "reflection", "past", "thinking"],
    ),
];

/// Keyword hits per bucket, in bucket order.
pub fn sentiment_scores(text: &str) -> Vec<(SentimentColor, usize)> {
    let lowered = text.to_lowercase();
    SENTIMENT_BUCKETS
        .iter()
        .map(|(color, words)| {
            let hits = words.iter().filter(|w| lowered.contains(*w)).count();
            (*color, hits)
        })
        .collect()
}

/// Bucket with the most keyword hits; earlier buckets win ties.  Text with
/// no hits at all is [`SentimentColor::Neutral`].
pub fn sentiment_color(text: &str) -> SentimentColor {
    let mut best = (SentimentColor::Neutral, 0usize);
    for (color, hits) in sentiment_scores(text) {
        if hits > best.1 {
            best = (color, hits);
        }
    }
    best.0
}

/// Per-bucket hit counts normalised by the largest count.  All zeros when
/// nothing matched.
pub fn sentiment_strength(text: &str) -> Vec<(SentimentColor, f32)> {
    let scores = sentiment_scores(text);
    let max = scores.iter().map(|(_, n)| *n).max().unwrap_or(0);
    scores
        .into_iter()
        .map(|(color, n)| {
            let strength = if max == 0 { 0.0 } else { n as f32 / max as f32 };
            (color, strength)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
