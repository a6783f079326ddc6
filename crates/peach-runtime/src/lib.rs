//! `peach-runtime` – The Outer Services.
//!
//! Everything that talks to the world outside the memory core: the model
//! server, the background executor, and the tracing pipeline.
//!
//! # Modules
//!
//! - [`llm_driver`] – [`OllamaGenerator`][llm_driver::OllamaGenerator]:
//!   a blocking HTTP client for a local [Ollama](https://ollama.com) server
//!   that implements the memory core's
//!   [`TextGenerator`][peach_memory::TextGenerator] seam.
//! - [`embedder`] – [`OllamaEmbedder`][embedder::OllamaEmbedder]: remote
//!   sentence embeddings for the semantic index, with a bounded timeout.
//! - [`scheduler`] – [`MaintenanceScheduler`][scheduler::MaintenanceScheduler]:
//!   the tokio interval task driving decay and rehearsal on the blocking
//!   pool.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod embedder;
pub mod llm_driver;
pub mod scheduler;
pub mod telemetry;

pub use embedder::OllamaEmbedder;
pub use llm_driver::{LlmError, OllamaGenerator};
pub use scheduler::{MaintenanceScheduler, SchedulerTotals};
pub use telemetry::{TracerProviderGuard, init_tracing};
