//! REST index backend — client for the external document-corpus service.
//!
//! Speaks a conventional corpus API, resource names as returned by the
//! service (`corpora/{id}`):
//! - `GET    /corpora` — list
//! - `POST   /corpora` — create `{display_name}`
//! - `POST   /{resource}/documents` — import a document (chunked server-side)
//! - `POST   /{resource}/query` — relevance query
//! - `DELETE /{resource}` — drop a corpus
//!
//! Per-user corpora are named `user-memory-{user_id}`; listings may contain
//! corpora owned by other tools, which are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use waymark_core::error::IndexError;
use waymark_core::memory::{
    CorpusRef, MemoryCategory, MemoryHit, MemoryRecordRef, SemanticIndex,
};
use waymark_core::session::{SessionId, UserId};

use crate::cache::CorpusCache;

const DEFAULT_CHUNK_SIZE: u32 = 512;
const DEFAULT_CHUNK_OVERLAP: u32 = 100;
const DEFAULT_SIMILARITY_FLOOR: f32 = 0.5;

/// A `SemanticIndex` backed by a remote corpus service.
pub struct RestSemanticIndex {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    cache: CorpusCache,
    chunk_size: u32,
    chunk_overlap: u32,
    similarity_floor: f32,
}

impl RestSemanticIndex {
    /// Create a new REST index client with default chunking and floor.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            cache: CorpusCache::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
        }
    }

    /// Override the chunking configuration sent with document imports.
    pub fn with_chunking(mut self, chunk_size: u32, chunk_overlap: u32) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Override the relevance floor sent with queries.
    pub fn with_similarity_floor(mut self, floor: f32) -> Self {
        self.similarity_floor = floor;
        self
    }

    fn corpora_url(&self) -> String {
        format!("{}/corpora", self.base_url)
    }

    fn corpus_url(&self, corpus: &CorpusRef) -> String {
        format!("{}/{}", self.base_url, corpus.resource)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// Map a non-success status to the index error taxonomy. 404 against a
    /// corpus resource means the reference is stale; everything else is the
    /// backend being unavailable for our purposes.
    async fn fail(response: reqwest::Response, corpus: Option<&CorpusRef>) -> IndexError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status == 404 {
            if let Some(corpus) = corpus {
                return IndexError::CorpusNotFound(corpus.resource.clone());
            }
        }

        warn!(status, body = %body, "Index backend returned error");
        IndexError::Unavailable(format!("status {status}: {body}"))
    }

    async fn fetch_corpora(&self) -> Result<Vec<CorpusRef>, IndexError> {
        let response = self
            .request(self.client.get(self.corpora_url()))
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, None).await);
        }

        let listing: ApiCorpusListing = response
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        Ok(listing
            .into_vec()
            .into_iter()
            .filter_map(|api| match api.into_corpus() {
                Some(corpus) => Some(corpus),
                None => {
                    debug!("Skipping corpus without a user-memory display name");
                    None
                }
            })
            .collect())
    }

    async fn find_corpus(&self, display_name: &str) -> Result<Option<CorpusRef>, IndexError> {
        let corpora = self.fetch_corpora().await?;
        Ok(corpora.into_iter().find(|c| c.display_name == display_name))
    }
}

/// Duplicate-create detection. Backends signal an existing corpus either with
/// a conflict status or an "already exists" message.
fn is_already_exists(status: u16, body: &str) -> bool {
    status == 409 || body.to_lowercase().contains("already exists")
}

#[async_trait]
impl SemanticIndex for RestSemanticIndex {
    fn name(&self) -> &str {
        "rest"
    }

    async fn ensure_corpus(&self, user_id: &UserId) -> Result<CorpusRef, IndexError> {
        if let Some(cached) = self.cache.get(user_id).await {
            return Ok(cached);
        }

        let display_name = CorpusRef::display_name_for(user_id);
        if let Some(existing) = self.find_corpus(&display_name).await? {
            self.cache.insert(existing.clone()).await;
            return Ok(existing);
        }

        debug!(user_id = %user_id, "Creating memory corpus");
        let response = self
            .request(self.client.post(self.corpora_url()))
            .json(&CreateCorpusBody {
                display_name: &display_name,
            })
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let api: ApiCorpus = response
                .json()
                .await
                .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;
            let corpus = api
                .into_corpus()
                .ok_or_else(|| IndexError::MalformedResponse("created corpus has no usable display name".into()))?;
            self.cache.insert(corpus.clone()).await;
            return Ok(corpus);
        }

        let body = response.text().await.unwrap_or_default();
        if is_already_exists(status.as_u16(), &body) {
            // A concurrent caller created it between our list and create.
            // Both callers wanted the same corpus, so take theirs.
            info!(user_id = %user_id, "Corpus creation raced, re-reading winner");
            if let Some(winner) = self.find_corpus(&display_name).await? {
                self.cache.insert(winner.clone()).await;
                return Ok(winner);
            }
            return Err(IndexError::MalformedResponse(
                "backend reported corpus exists but does not list it".into(),
            ));
        }

        warn!(status = status.as_u16(), body = %body, "Corpus creation failed");
        Err(IndexError::Unavailable(format!(
            "status {}: {body}",
            status.as_u16()
        )))
    }

    async fn add_memory(
        &self,
        corpus: &CorpusRef,
        text: &str,
        category: MemoryCategory,
        source_session: &SessionId,
    ) -> Result<MemoryRecordRef, IndexError> {
        let url = format!("{}/documents", self.corpus_url(corpus));
        let response = self
            .request(self.client.post(&url))
            .json(&ImportDocumentBody {
                text,
                chunking: ChunkingConfig {
                    chunk_size: self.chunk_size,
                    chunk_overlap: self.chunk_overlap,
                },
                metadata: DocumentMetadata {
                    user_id: corpus.user_id.as_str(),
                    session_id: &source_session.0,
                    category: category.as_str(),
                    created_at: Utc::now(),
                },
            })
            .send()
            .await
            .map_err(|e| IndexError::WriteFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Document import failed");
            return Err(IndexError::WriteFailed(format!("status {status}: {body}")));
        }

        let receipt: ImportReceipt = response
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        Ok(MemoryRecordRef {
            record_id: receipt.record_id,
            corpus: corpus.resource.clone(),
        })
    }

    async fn query(
        &self,
        corpus: &CorpusRef,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        let url = format!("{}/query", self.corpus_url(corpus));
        let response = self
            .request(self.client.post(&url))
            .json(&QueryBody {
                query: query_text,
                top_k,
                similarity_floor: self.similarity_floor,
            })
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fail(response, Some(corpus)).await);
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        let mut hits: Vec<MemoryHit> = result.hits.into_iter().map(ApiHit::into_hit).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn query_bounded_multi(
        &self,
        corpora: &[CorpusRef],
        query_text: &str,
        top_k_per_corpus: usize,
        max_corpora: usize,
    ) -> Result<Vec<MemoryHit>, IndexError> {
        let mut all = Vec::new();
        for corpus in corpora.iter().take(max_corpora) {
            match self.query(corpus, query_text, top_k_per_corpus).await {
                Ok(mut hits) => all.append(&mut hits),
                Err(err) => {
                    warn!(corpus = %corpus.resource, error = %err, "skipping corpus in multi-corpus query");
                }
            }
        }
        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(all)
    }

    async fn list_corpora(&self) -> Result<Vec<CorpusRef>, IndexError> {
        self.fetch_corpora().await
    }

    async fn delete_corpus(&self, corpus: &CorpusRef) -> Result<bool, IndexError> {
        let response = self
            .request(self.client.delete(self.corpus_url(corpus)))
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        match response.status().as_u16() {
            s if (200..300).contains(&s) => {
                self.cache.remove(&corpus.user_id).await;
                Ok(true)
            }
            404 => {
                self.cache.remove(&corpus.user_id).await;
                Ok(false)
            }
            _ => Err(Self::fail(response, None).await),
        }
    }

    async fn health_check(&self) -> Result<(), IndexError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IndexError::Unavailable(format!(
                "health check returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateCorpusBody<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
struct ChunkingConfig {
    chunk_size: u32,
    chunk_overlap: u32,
}

#[derive(Serialize)]
struct DocumentMetadata<'a> {
    user_id: &'a str,
    session_id: &'a str,
    category: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ImportDocumentBody<'a> {
    text: &'a str,
    chunking: ChunkingConfig,
    metadata: DocumentMetadata<'a>,
}

#[derive(Deserialize)]
struct ImportReceipt {
    #[serde(alias = "document_id", alias = "id")]
    record_id: String,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    top_k: usize,
    similarity_floor: f32,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    hits: Vec<ApiHit>,
}

#[derive(Deserialize)]
struct ApiHit {
    #[serde(alias = "document_id", alias = "id")]
    record_id: String,
    #[serde(alias = "content")]
    text: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: ApiHitMetadata,
}

#[derive(Deserialize, Default)]
struct ApiHitMetadata {
    #[serde(default)]
    category: MemoryCategory,
    #[serde(default = "epoch")]
    created_at: DateTime<Utc>,
}

/// Hits without creation metadata sort as oldest, not newest.
fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ApiHit {
    fn into_hit(self) -> MemoryHit {
        MemoryHit {
            record_id: self.record_id,
            text: self.text,
            score: self.score,
            category: self.metadata.category,
            created_at: self.metadata.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ApiCorpus {
    #[serde(alias = "resource", alias = "id")]
    name: String,
    display_name: String,
}

impl ApiCorpus {
    /// Resolve the owning user from the display name. Returns `None` for
    /// corpora this service does not own.
    fn into_corpus(self) -> Option<CorpusRef> {
        let user = self.display_name.strip_prefix("user-memory-")?;
        if user.is_empty() {
            return None;
        }
        Some(CorpusRef {
            resource: self.name,
            user_id: UserId::from(user),
            display_name: self.display_name,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiCorpusListing {
    Wrapped { corpora: Vec<ApiCorpus> },
    Bare(Vec<ApiCorpus>),
}

impl ApiCorpusListing {
    fn into_vec(self) -> Vec<ApiCorpus> {
        match self {
            Self::Wrapped { corpora } => corpora,
            Self::Bare(corpora) => corpora,
        }
    }
}
