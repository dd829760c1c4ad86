//! Mapping between indexed documents and Qdrant points.

use crate::search::{IndexedDocument, SearchHit};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

/// Namespace for point ids derived from document ids.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9a57_3d2e_4b8a_9e41_5c7d_2a0b_e813);

/// Deterministic point id for `item_id`, so re-syncing a document replaces its point.
pub fn document_point_id(item_id: &str) -> String {
    Uuid::new_v5(&POINT_NAMESPACE, item_id.as_bytes()).to_string()
}

/// Build the point body written for `document`.
pub(crate) fn build_point(document: &IndexedDocument, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("item_id".into(), Value::String(document.id.clone()));
    payload.insert("text".into(), Value::String(document.text.clone()));
    payload.insert(
        "fingerprint".into(),
        Value::String(document.fingerprint.clone()),
    );
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    if let Some(source_uri) = document
        .source_uri
        .as_ref()
        .filter(|value| !value.is_empty())
    {
        payload.insert("source_uri".into(), Value::String(source_uri.clone()));
    }

    json!({
        "id": document_point_id(&document.id),
        "vector": document.vector,
        "payload": payload,
    })
}

/// Convert a stored point back into a search hit.
///
/// The document id comes from the `item_id` payload field; points written by other tools fall
/// back to the point id.
pub(crate) fn hit_from_payload(
    point_id: String,
    score: f32,
    payload: Option<&Map<String, Value>>,
) -> SearchHit {
    let field = |name: &str| {
        payload
            .and_then(|payload| payload.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    SearchHit {
        id: field("item_id").unwrap_or(point_id),
        score,
        text: field("text"),
        source_uri: field("source_uri"),
    }
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
