//! [`VectorIndex`] backed by a Qdrant collection over its REST API.
//!
//! Point ids are UUIDv5 values derived from the [`VectorKey`], so upserting
//! the same chunk twice replaces it. Each payload carries `document_id`,
//! `kind`, `chunk_index`, and `text`; queries filter on `kind` and exclude
//! a document with a `must_not` condition on `document_id`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use docsift_core::index::{VectorIndex, VectorKey, VectorKind, VectorMatch, VectorPoint};

#[derive(Debug, Error)]
pub enum QdrantError {
    #[error("invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryResult {
    Points(Vec<ScoredPoint>),
    Object { points: Vec<ScoredPoint> },
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RetrievedPoint {
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    pub fn new(url: &str, collection: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent(concat!("docsift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(url = %base_url, collection, "initialized Qdrant client");
        Ok(Self {
            client,
            base_url,
            collection: collection.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Create the collection (cosine distance) and its payload indexes if
    /// it does not exist yet.
    pub async fn ensure_collection(&self, dims: usize) -> Result<(), QdrantError> {
        let path = format!("collections/{}", self.collection);
        let response = self.request(Method::GET, &path).send().await?;
        match response.status() {
            StatusCode::OK => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(QdrantError::UnexpectedStatus { status, body });
            }
        }

        tracing::info!(collection = %self.collection, dims, "creating Qdrant collection");
        let body = json!({ "vectors": { "size": dims, "distance": "Cosine" } });
        self.send_json(Method::PUT, &path, &body).await?;

        for field in ["document_id", "kind"] {
            let body = json!({ "field_name": field, "field_schema": "keyword" });
            self.send_json(
                Method::PUT,
                &format!("collections/{}/index?wait=true", self.collection),
                &body,
            )
            .await?;
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, QdrantError> {
        let response = self.request(method, path).json(body).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

/// Deterministic Qdrant point id for a vector key.
pub fn point_id(key: &VectorKey) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.to_string().as_bytes()).to_string()
}

fn document_filter(document_id: &str) -> Value {
    json!({ "must": [ { "key": "document_id", "match": { "value": document_id } } ] })
}

fn query_body(vector: &[f32], top_k: usize, kind: VectorKind, exclude: Option<&str>) -> Value {
    let mut filter = json!({
        "must": [ { "key": "kind", "match": { "value": kind.as_str() } } ]
    });
    if let Some(document_id) = exclude {
        filter["must_not"] = json!([ { "key": "document_id", "match": { "value": document_id } } ]);
    }
    json!({
        "query": vector,
        "limit": top_k,
        "with_payload": true,
        "filter": filter,
    })
}

fn payload_key(payload: &Map<String, Value>) -> Option<VectorKey> {
    let document_id = payload.get("document_id")?.as_str()?.to_string();
    match payload.get("kind")?.as_str()? {
        "centroid" => Some(VectorKey::Centroid { document_id }),
        "chunk" => Some(VectorKey::Chunk {
            document_id,
            chunk_index: payload.get("chunk_index")?.as_i64()?,
        }),
        _ => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let body = json!({
            "points": [ {
                "id": point_id(&point.key),
                "vector": point.vector,
                "payload": {
                    "document_id": point.key.document_id(),
                    "kind": point.key.kind().as_str(),
                    "chunk_index": point.key.chunk_index(),
                    "text": point.text,
                },
            } ]
        });
        self.send_json(
            Method::PUT,
            &format!("collections/{}/points?wait=true", self.collection),
            &body,
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: VectorKind,
        exclude_document: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .send_json(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
                &query_body(vector, top_k, kind, exclude_document),
            )
            .await?;
        let parsed: QdrantResponse<QueryResult> = response.json().await?;
        let points = match parsed.result {
            QueryResult::Points(points) | QueryResult::Object { points } => points,
        };

        Ok(points
            .into_iter()
            .filter_map(|p| {
                let payload = p.payload?;
                let key = payload_key(&payload)?;
                let text = payload
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(VectorMatch {
                    key,
                    score: p.score,
                    text,
                })
            })
            .collect())
    }

    async fn get(&self, key: &VectorKey) -> Result<Option<Vec<f32>>> {
        let body = json!({ "ids": [point_id(key)], "with_vector": true, "with_payload": false });
        let response = self
            .send_json(
                Method::POST,
                &format!("collections/{}/points", self.collection),
                &body,
            )
            .await?;
        let parsed: QdrantResponse<Vec<RetrievedPoint>> = response.json().await?;
        Ok(parsed.result.into_iter().next().and_then(|p| p.vector))
    }

    async fn delete(&self, key: &VectorKey) -> Result<()> {
        let body = json!({ "points": [point_id(key)] });
        self.send_json(
            Method::POST,
            &format!("collections/{}/points/delete?wait=true", self.collection),
            &body,
        )
        .await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let filter = document_filter(document_id);
        let response = self
            .send_json(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
                &json!({ "filter": filter, "exact": true }),
            )
            .await?;
        let counted: QdrantResponse<CountResult> = response.json().await?;
        if counted.result.count == 0 {
            return Ok(0);
        }

        self.send_json(
            Method::POST,
            &format!("collections/{}/points/delete?wait=true", self.collection),
            &json!({ "filter": filter }),
        )
        .await?;
        Ok(counted.result.count)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic_and_distinct() {
        let a = point_id(&VectorKey::chunk("doc", 0));
        assert_eq!(a, point_id(&VectorKey::chunk("doc", 0)));
        assert_ne!(a, point_id(&VectorKey::chunk("doc", 1)));
        assert_ne!(a, point_id(&VectorKey::centroid("doc")));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_query_body_filters_kind_and_excluded_document() {
        let body = query_body(&[0.5, 0.5], 3, VectorKind::Centroid, Some("doc-1"));
        assert_eq!(body["limit"], 3);
        assert_eq!(body["filter"]["must"][0]["match"]["value"], "centroid");
        assert_eq!(body["filter"]["must_not"][0]["match"]["value"], "doc-1");

        let body = query_body(&[0.5], 3, VectorKind::Chunk, None);
        assert!(body["filter"].get("must_not").is_none());
    }

    #[test]
    fn test_payload_key_roundtrip() {
        let payload = json!({ "document_id": "d", "kind": "chunk", "chunk_index": 4 });
        let key = payload_key(payload.as_object().unwrap()).unwrap();
        assert_eq!(key, VectorKey::chunk("d", 4));

        let payload = json!({ "document_id": "d", "kind": "centroid", "chunk_index": null });
        let key = payload_key(payload.as_object().unwrap()).unwrap();
        assert_eq!(key, VectorKey::centroid("d"));
    }

    #[test]
    fn test_endpoint_formatting() {
        let base = normalize_base_url("http://localhost:6333/").unwrap();
        assert_eq!(
            format_endpoint(&base, "/collections/x"),
            "http://localhost:6333/collections/x"
        );
        assert!(normalize_base_url("not a url").is_err());
    }
}
