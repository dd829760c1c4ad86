#![deny(missing_docs)]

//! Core library for the Rusty Cache search cache and synchronization service.

/// HTTP routing and REST handlers.
pub mod api;
/// Shared cache, key derivation, and rate limiting.
pub mod cache;
/// Environment-driven configuration management.
pub mod config;
/// Vectorizer abstraction and adapters.
pub mod embedding;
/// Search error taxonomy.
pub mod error;
/// Structured logging and tracing setup.
pub mod logging;
/// Search traffic counters.
pub mod metrics;
/// Qdrant search index integration.
pub mod qdrant;
/// Component wiring shared by the binaries.
pub mod runtime;
/// Search types and the caching dispatcher.
pub mod search;
/// Synchronization runs and their status.
pub mod sync;
