//! Retrieval-augmented question answering over scraped web content.
//!
//! The crate is split along the two halves of the pipeline. Ingestion
//! ([`extract`], [`chunking`], [`ingest`]) fetches a page, splits it into
//! overlapping chunks and stores embedded chunks in a SQLite-backed vector
//! index. Serving ([`retrieval`], [`compose`], [`server`]) answers queries
//! against that index through an axum HTTP API, attributing every answer
//! to the chunks it was grounded on.

pub mod chunking;
pub mod compose;
pub mod config;
pub mod errors;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod retrieval;
pub mod server;
pub mod state;

pub use compose::AnswerRecord;
pub use config::AppConfig;
pub use errors::ServiceError;
pub use state::AppState;
