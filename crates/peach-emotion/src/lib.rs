//! `peach-emotion` – The Emotion State Model.
//!
//! Tracks how strongly each mood is currently felt, how that feeling echoes
//! into other elevated moods, and how it fades when left alone.
//!
//! # Modules
//!
//! - [`state`] – [`EmotionState`][state::EmotionState]: the owned mood →
//!   intensity map with boost, echo, lazy decay, style selection, blending
//!   and self-reflection.
//! - [`lexicon`] – the fixed keyword and pairing tables the state model
//!   consults.
//! - [`journal`] – [`MoodJournal`][journal::MoodJournal]: the persistence
//!   seam implemented by the storage layer.

pub mod journal;
pub mod lexicon;
pub mod state;

pub use journal::{JournalError, MoodJournal};
pub use state::{EmotionState, describe_intensity};
