//! Qdrant search index integration.

pub mod client;
mod index;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use index::QdrantIndex;
pub use payload::document_point_id;
pub use types::{QdrantError, ScoredPoint};
