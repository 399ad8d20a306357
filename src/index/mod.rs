// Vector index module
// In-memory nearest-neighbor index over the troubleshooting corpus, with
// JSON persistence and copy-on-write snapshots for lock-free reads


use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embeddings::{EmbeddingModel, cosine_distance};
use crate::store::Entry;
use crate::{AssistError, Result};

/// Bump when the persisted layout changes
const INDEX_FORMAT_VERSION: u32 = 1;

/// One indexed entry: the source record plus its cached embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub entry: Entry,
    pub embedding: Vec<f32>,
}

/// A search hit: the matched entry and its cosine distance from the query
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: Entry,
    pub distance: f32,
}

/// Immutable view of the index contents. Searches hold an `Arc` to a
/// snapshot, so a concurrent insert never changes what an in-flight search
/// observes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexSnapshot {
    entries: Vec<IndexedEntry>,
}

/// Persisted index file layout
#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    model_id: String,
    dimension: usize,
    created_at: String,
    entries: Vec<IndexedEntry>,
}

/// Searchable vector index over the knowledge base.
///
/// All entries are embedded with the same model; the model id is recorded
/// at build time and verified on restore, because mixing embedding spaces
/// corrupts nearest-neighbor distances.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingModel>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    model_id: String,
    dimension: usize,
}

impl VectorIndex {
    /// Build the index from the full corpus in one pass.
    ///
    /// Fails with `IndexBuild` if the embedding backend is unavailable or
    /// any entry has no problem text.
    #[inline]
    pub fn build(embedder: Arc<dyn EmbeddingModel>, entries: &[Entry]) -> Result<Self> {
        if !embedder.is_ready() {
            return Err(AssistError::IndexBuild(
                "Embedding backend is not available".to_string(),
            ));
        }

        let mut indexed = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.problem_text.trim().is_empty() {
                return Err(AssistError::IndexBuild(format!(
                    "Entry {} has no problem text",
                    entry.id
                )));
            }

            let embedding = embedder
                .embed(&entry.document_text())
                .map_err(|e| AssistError::IndexBuild(format!("Embedding failed: {}", e)))?;

            indexed.push(IndexedEntry {
                entry: entry.clone(),
                embedding,
            });
        }

        info!(
            "Built vector index with {} entries ({} dimensions, model {})",
            indexed.len(),
            embedder.dimension(),
            embedder.model_id()
        );

        Ok(Self {
            model_id: embedder.model_id(),
            dimension: embedder.dimension(),
            snapshot: RwLock::new(Arc::new(IndexSnapshot { entries: indexed })),
            embedder,
        })
    }

    /// Create an empty index bound to an embedding model
    #[inline]
    pub fn empty(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model_id: embedder.model_id(),
            dimension: embedder.dimension(),
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            embedder,
        }
    }

    /// Nearest entries to `query_embedding`, ascending by cosine distance.
    ///
    /// Ties are broken by entry id so results are deterministic. With a
    /// `filter`, only entries whose device category matches (case
    /// insensitive) are candidates; fewer than `k` matches returns them all.
    #[inline]
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.dimension {
            return Err(AssistError::Embedding(format!(
                "Query dimension {} does not match index dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        // Clone the Arc out so the scan runs without holding the lock
        let snapshot = {
            let guard = self
                .snapshot
                .read()
                .map_err(|_| AssistError::IndexUnavailable("Index lock poisoned".to_string()))?;
            Arc::clone(&guard)
        };

        let mut hits: Vec<SearchHit> = snapshot
            .entries
            .iter()
            .filter(|indexed| match filter {
                Some(category) => indexed
                    .entry
                    .device_category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(category)),
                None => true,
            })
            .map(|indexed| SearchHit {
                entry: indexed.entry.clone(),
                distance: cosine_distance(query_embedding, &indexed.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        hits.truncate(k);

        debug!("Search returned {} hits (k={})", hits.len(), k);
        Ok(hits)
    }

    /// Insert one entry incrementally.
    ///
    /// The new entry is appended to a fresh snapshot which is swapped in
    /// atomically; in-flight searches keep reading the old snapshot and
    /// rankings of pre-existing entries are unchanged.
    #[inline]
    pub fn add(&self, entry: Entry) -> Result<()> {
        if entry.problem_text.trim().is_empty() {
            return Err(AssistError::IndexBuild(format!(
                "Entry {} has no problem text",
                entry.id
            )));
        }

        let embedding = self.embedder.embed(&entry.document_text())?;

        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| AssistError::IndexUnavailable("Index lock poisoned".to_string()))?;

        let mut entries = guard.entries.clone();
        entries.push(IndexedEntry {
            entry: entry.clone(),
            embedding,
        });
        *guard = Arc::new(IndexSnapshot { entries });

        debug!("Added entry {} to index", entry.id);
        Ok(())
    }

    /// Persist the index (vectors + metadata) to a JSON file
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let snapshot = {
            let guard = self
                .snapshot
                .read()
                .map_err(|_| AssistError::IndexUnavailable("Index lock poisoned".to_string()))?;
            Arc::clone(&guard)
        };

        let persisted = PersistedIndex {
            format_version: INDEX_FORMAT_VERSION,
            model_id: self.model_id.clone(),
            dimension: self.dimension,
            created_at: Utc::now().to_rfc3339(),
            entries: snapshot.entries.clone(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string(&persisted)
            .map_err(|e| AssistError::IndexBuild(format!("Failed to serialize index: {}", e)))?;
        fs::write(path, content)?;

        info!(
            "Saved index with {} entries to {}",
            persisted.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore a previously saved index.
    ///
    /// The persisted model id must match the supplied embedder's; a restored
    /// index reproduces the exact search results of the pre-save state.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P, embedder: Arc<dyn EmbeddingModel>) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| {
            AssistError::IndexUnavailable(format!(
                "Failed to read index file {}: {}",
                path.display(),
                e
            ))
        })?;

        let persisted: PersistedIndex = serde_json::from_str(&content).map_err(|e| {
            AssistError::IndexUnavailable(format!(
                "Failed to parse index file {}: {}",
                path.display(),
                e
            ))
        })?;

        if persisted.format_version != INDEX_FORMAT_VERSION {
            return Err(AssistError::IndexUnavailable(format!(
                "Unsupported index format version {}",
                persisted.format_version
            )));
        }

        if persisted.model_id != embedder.model_id() {
            return Err(AssistError::IndexUnavailable(format!(
                "Index was built with model '{}' but the configured model is '{}'; rebuild required",
                persisted.model_id,
                embedder.model_id()
            )));
        }

        if persisted.dimension != embedder.dimension() {
            return Err(AssistError::IndexUnavailable(format!(
                "Index dimension {} does not match model dimension {}",
                persisted.dimension,
                embedder.dimension()
            )));
        }

        for indexed in &persisted.entries {
            if indexed.embedding.len() != persisted.dimension {
                warn!(
                    "Entry {} has embedding of length {}, expected {}",
                    indexed.entry.id,
                    indexed.embedding.len(),
                    persisted.dimension
                );
                return Err(AssistError::IndexUnavailable(format!(
                    "Corrupt index: entry {} has wrong embedding dimension",
                    indexed.entry.id
                )));
            }
        }

        info!(
            "Loaded index with {} entries from {} (model {})",
            persisted.entries.len(),
            path.display(),
            persisted.model_id
        );

        Ok(Self {
            model_id: persisted.model_id,
            dimension: persisted.dimension,
            snapshot: RwLock::new(Arc::new(IndexSnapshot {
                entries: persisted.entries,
            })),
            embedder,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.snapshot.read().map_or(0, |guard| guard.entries.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier of the embedding model that produced this index's vectors
    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed arbitrary text in this index's embedding space
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text)
    }

    /// Whether the embedding backend behind this index is reachable
    #[inline]
    pub fn embedder_ready(&self) -> bool {
        self.embedder.is_ready()
    }
}
