//! Streaming helpers for iterating Qdrant scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::client::QdrantService;
use super::client::stringify_point_id;
use super::types::{QdrantError, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream `(point id, payload)` pairs matching `filter`, one scroll page at a time.
///
/// Pages are requested lazily, so a consumer that stops early never fetches the rest.
pub fn stream_points<'a>(
    service: &'a QdrantService,
    collection: &'a str,
    filter: Value,
    page_size: Option<usize>,
) -> impl Stream<Item = Result<(String, Map<String, Value>), QdrantError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let limit = page_size.unwrap_or(DEFAULT_SCROLL_LIMIT).max(1);

        loop {
            let body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": limit,
                "filter": filter.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let (Some(id), Some(payload)) = (point.id, point.payload) {
                        yield (stringify_point_id(id), payload);
                    }
                }

                match result.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = collection, status = %status, "Failed to scroll points");
                Err(QdrantError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
