// Retrieval pipeline module
// The decision policy over one query: cache, index search, synthesis, or
// template fallback, with confidence scoring and feedback-aware ranking


pub mod cache;

pub use cache::{AnswerCache, CacheStats};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::index::VectorIndex;
use crate::store::Entry;
use crate::synthesis::{Answer, AnswerSource, AnswerSynthesizer, TemplateAnswerer};
use crate::{AssistError, Result};

/// Distances within the same bucket of this width are treated as ties that
/// feedback counters may reorder
const FEEDBACK_DISTANCE_BUCKET: f32 = 1e-3;

/// One prior exchange, carried as additional grounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTurn {
    pub user: String,
    pub assistant: String,
}

/// An ephemeral retrieval request. Not persisted anywhere.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub text: String,
    /// Optional coarse filter; also appended to the embedded text
    pub device_category: Option<String>,
    /// Prior conversation turns, oldest first
    pub context: Vec<ContextTurn>,
}

impl Query {
    #[inline]
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            device_category: None,
            context: Vec::new(),
        }
    }

    #[inline]
    pub fn with_device<S: Into<String>>(mut self, category: S) -> Self {
        self.device_category = Some(category.into());
        self
    }

    #[inline]
    pub fn with_context(mut self, context: Vec<ContextTurn>) -> Self {
        self.context = context;
        self
    }

    /// The text that gets embedded and cached: the raw query, enriched with
    /// the device category when one is set (queries for the same text but
    /// different devices must not share cache entries).
    #[inline]
    pub fn effective_text(&self) -> String {
        match &self.device_category {
            Some(category) => format!("{} [device: {}]", self.text, category),
            None => self.text.clone(),
        }
    }
}

/// One retrieval candidate with its normalized confidence
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub entry: Entry,
    pub distance: f32,
    pub confidence: f32,
}

/// Terminal state of the decision policy for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    CacheHit,
    Direct,
    Synthesized,
    Fallback,
}

/// Outcome of one pipeline execution
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub answer: Answer,
    /// Ranked candidates considered, best first. Empty on cache hits and
    /// when the index was unavailable.
    pub candidates: Vec<RankedCandidate>,
    pub stage: RetrievalStage,
}

/// Load state of the shared resources, for the status surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub index_loaded: bool,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct FeedbackCounters {
    success: u32,
    failure: u32,
}

impl FeedbackCounters {
    /// Laplace-smoothed success ratio; unknown entries score 0.5
    fn score(self) -> f32 {
        (self.success as f32 + 1.0) / ((self.success + self.failure) as f32 + 2.0)
    }
}

/// The retrieval pipeline: shared, read-mostly resources wired together at
/// process start and used concurrently by independent query executions.
///
/// Guiding contract: a well-formed query always yields an answer with an
/// honest confidence score. Only empty input is an error; every internal
/// failure degrades to a lower-confidence path.
pub struct RetrievalPipeline {
    index: Option<Arc<VectorIndex>>,
    synthesizer: AnswerSynthesizer,
    template: TemplateAnswerer,
    cache: AnswerCache,
    config: RetrievalConfig,
    feedback: RwLock<HashMap<String, FeedbackCounters>>,
}

impl RetrievalPipeline {
    /// Wire up a pipeline. `index: None` means the index failed to load;
    /// every query then takes the template path instead of erroring.
    #[inline]
    pub fn new(
        index: Option<Arc<VectorIndex>>,
        synthesizer: AnswerSynthesizer,
        config: RetrievalConfig,
    ) -> Self {
        if index.is_none() {
            warn!("Pipeline starting without an index; all queries will use the template path");
        }

        Self {
            index,
            synthesizer,
            template: TemplateAnswerer::new(config.fallback_confidence),
            cache: AnswerCache::new(Duration::from_secs(config.cache_ttl_seconds)),
            config,
            feedback: RwLock::new(HashMap::new()),
        }
    }

    /// Map a cosine distance to a confidence score in [0, 1].
    ///
    /// `confidence = max(0, 1 - distance / distance_ceiling)`, so confidence
    /// is 1 at distance 0 and decreases monotonically with distance.
    #[inline]
    pub fn confidence_from_distance(&self, distance: f32) -> f32 {
        (1.0 - distance / self.config.distance_ceiling).clamp(0.0, 1.0)
    }

    /// Run the decision policy for one query.
    ///
    /// Errors only on malformed (empty) input; unavailability of the index,
    /// the embedding backend, or the generative model degrades to a
    /// lower-confidence answer instead.
    #[inline]
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResult> {
        if query.text.trim().is_empty() {
            return Err(AssistError::InvalidQuery(
                "Query text must not be empty".to_string(),
            ));
        }

        let effective_text = query.effective_text();

        // CacheHit: non-expired entry short-circuits the whole pipeline
        if let Some(mut answer) = self.cache.get(&effective_text) {
            debug!("Cache hit for query");
            answer.source = AnswerSource::Cache;
            return Ok(RetrievalResult {
                answer,
                candidates: Vec::new(),
                stage: RetrievalStage::CacheHit,
            });
        }

        // IndexSearch: embed and rank. Failures yield an empty candidate
        // list, which the threshold logic below routes to Fallback.
        let candidates = self.search_candidates(query, &effective_text).await;

        let (stage, answer) = match candidates.first() {
            Some(best) if best.confidence >= self.config.high_confidence => {
                debug!(
                    "Best confidence {:.3} at or above high threshold, returning retrieved solution",
                    best.confidence
                );
                (RetrievalStage::Direct, crate::synthesis::direct_answer(best))
            }
            Some(best) if best.confidence >= self.config.low_confidence => {
                debug!(
                    "Best confidence {:.3} in synthesis band, enhancing with generative model",
                    best.confidence
                );
                let answer = self.synthesizer.synthesize(query, &candidates).await;
                (RetrievalStage::Synthesized, answer)
            }
            _ => {
                debug!("Best confidence below low threshold, using template fallback");
                (
                    RetrievalStage::Fallback,
                    self.template.fallback(&query.text),
                )
            }
        };

        // Every terminal state caches its result before returning
        self.cache.insert(&effective_text, answer.clone());

        Ok(RetrievalResult {
            answer,
            candidates,
            stage,
        })
    }

    /// Embed the query and rank index hits. Returns an empty list when the
    /// index is missing or the embedding backend fails; those conditions
    /// degrade rather than propagate.
    async fn search_candidates(&self, query: &Query, effective_text: &str) -> Vec<RankedCandidate> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        if index.is_empty() {
            debug!("Index is empty, skipping search");
            return Vec::new();
        }

        let embed_index = Arc::clone(index);
        let embed_text = effective_text.to_string();
        let embedding = match tokio::task::spawn_blocking(move || embed_index.embed(&embed_text))
            .await
        {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                warn!("Query embedding failed, degrading to fallback: {}", e);
                return Vec::new();
            }
            Err(e) => {
                warn!("Embedding task failed, degrading to fallback: {}", e);
                return Vec::new();
            }
        };

        let hits = match index.search(
            &embedding,
            self.config.top_k,
            query.device_category.as_deref(),
        ) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Index search failed, degrading to fallback: {}", e);
                return Vec::new();
            }
        };

        let mut candidates: Vec<RankedCandidate> = hits
            .into_iter()
            .map(|hit| RankedCandidate {
                confidence: self.confidence_from_distance(hit.distance),
                entry: hit.entry,
                distance: hit.distance,
            })
            .collect();

        self.apply_feedback_ranking(&mut candidates);
        candidates
    }

    /// Success/failure counters act as a secondary sort key between
    /// near-tied candidates. Distances themselves are never altered, so the
    /// index's geometric ordering stays intact across feedback updates.
    fn apply_feedback_ranking(&self, candidates: &mut [RankedCandidate]) {
        let Ok(feedback) = self.feedback.read() else {
            return;
        };

        if feedback.is_empty() {
            return;
        }

        candidates.sort_by(|a, b| {
            let bucket_a = (a.distance / FEEDBACK_DISTANCE_BUCKET) as i64;
            let bucket_b = (b.distance / FEEDBACK_DISTANCE_BUCKET) as i64;
            bucket_a
                .cmp(&bucket_b)
                .then_with(|| {
                    let score_a = feedback.get(&a.entry.id).copied().unwrap_or_default().score();
                    let score_b = feedback.get(&b.entry.id).copied().unwrap_or_default().score();
                    score_b.total_cmp(&score_a)
                })
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
    }

    /// Record whether a returned solution worked. Influences future ranking
    /// between near-tied candidates only.
    #[inline]
    pub fn record_feedback(&self, entry_id: &str, success: bool) {
        let Ok(mut feedback) = self.feedback.write() else {
            warn!("Feedback lock poisoned, dropping update");
            return;
        };

        let counters = feedback.entry(entry_id.to_string()).or_default();
        if success {
            counters.success += 1;
        } else {
            counters.failure += 1;
        }

        info!(
            "Recorded {} for entry {} ({} success / {} failure)",
            if success { "success" } else { "failure" },
            entry_id,
            counters.success,
            counters.failure
        );
    }

    /// Load state of the index and the generative model
    #[inline]
    pub fn is_ready(&self) -> Readiness {
        Readiness {
            index_loaded: self.index.is_some(),
            model_loaded: self.synthesizer.model_ready(),
        }
    }

    /// Number of entries in the loaded index, if any
    #[inline]
    pub fn index_size(&self) -> Option<usize> {
        self.index.as_ref().map(|index| index.len())
    }

    #[inline]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[inline]
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
