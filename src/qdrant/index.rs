//! [`SearchIndex`] implementation backed by a Qdrant collection.

use super::client::QdrantService;
use super::payload::{build_point, current_timestamp_rfc3339, hit_from_payload};
use super::scroller::stream_points;
use super::types::QdrantError;
use crate::config::Config;
use crate::search::{IndexError, IndexedDocument, QueryCriteria, SearchHit, SearchIndex};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde_json::json;

/// Score assigned to keyword matches; Qdrant's full-text filter does not rank.
const KEYWORD_MATCH_SCORE: f32 = 1.0;

/// Search index storing one point per document.
pub struct QdrantIndex {
    service: QdrantService,
    collection: String,
}

impl QdrantIndex {
    /// Wrap an existing client for `collection`.
    pub fn new(service: QdrantService, collection: impl Into<String>) -> Self {
        Self {
            service,
            collection: collection.into(),
        }
    }

    /// Connect using the loaded configuration, creating the collection and indexes when missing.
    pub async fn connect(config: &Config) -> Result<Self, QdrantError> {
        let index = Self::new(
            QdrantService::new(config)?,
            config.qdrant_collection_name.clone(),
        );
        index
            .service
            .create_collection_if_not_exists(&index.collection, config.embedding_dimension as u64)
            .await?;
        index
            .service
            .ensure_payload_indexes(&index.collection)
            .await?;
        tracing::debug!(collection = %index.collection, "Search collection ready");
        Ok(index)
    }

    async fn keyword_hits(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, QdrantError> {
        let filter = json!({
            "must": [
                { "key": "text", "match": { "text": text } }
            ]
        });
        stream_points(&self.service, &self.collection, filter, Some(limit.max(1)))
            .take(limit)
            .map_ok(|(id, payload)| hit_from_payload(id, KEYWORD_MATCH_SCORE, Some(&payload)))
            .try_collect()
            .await
    }
}

#[async_trait]
impl SearchIndex for QdrantIndex {
    async fn upsert(&self, document: IndexedDocument) -> Result<(), IndexError> {
        let point = build_point(&document, &current_timestamp_rfc3339());
        self.service
            .upsert_points(&self.collection, vec![point])
            .await?;
        Ok(())
    }

    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<SearchHit>, IndexError> {
        let hits = match criteria {
            QueryCriteria::Keyword { text, limit } => self.keyword_hits(text, *limit).await?,
            QueryCriteria::Vector {
                vector,
                limit,
                min_score,
            } => self
                .service
                .search_points(&self.collection, vector, *limit, *min_score)
                .await?
                .into_iter()
                .map(|point| hit_from_payload(point.id, point.score, point.payload.as_ref()))
                .collect(),
        };
        Ok(hits)
    }
}
