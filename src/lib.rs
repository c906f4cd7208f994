//! # Profsumma
//!
//! Batch summarisation of professor reviews using LLMs.
//!
//! ## Features
//!
//! - **Joined Records**: ratings and review comments merged per professor
//! - **Resumable Batches**: a persisted cursor lets each run pick up where the
//!   last one stopped, or regenerate everything without losing good summaries
//! - **Provider Agnostic**: Gemini or OpenAI, with retry and rate-limit back-off
//!
//! Two runs must not share a storage directory at the same time.

pub mod agent;
pub mod batch;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod record;
pub mod storage;
pub mod summary;

pub use batch::{BatchController, BatchOptions, RunReport};
pub use config::{Config, RunMode};
pub use record::{aggregate, AggregateOptions, ProfessorRecord};
pub use storage::{JsonFileStore, ResultStore, StateStore};
pub use summary::{SummaryClient, Summarizer, FALLBACK_SENTINEL};
