use super::assembler::assemble;
use super::checkpoint::CheckpointStore;
use super::chunker::{Chunker, ChunkerConfig};
use super::error::NarrationError;
use super::synthesizer::{SynthesizedChunk, Synthesizer};
use super::text::{item_slug, prepare_text};
use super::voice::{VoiceProfile, VoiceSelector};
use crate::domain::usage::{UsageSnapshot, UsageTracker};
use crate::infrastructure::repositories::{
    ArtifactStore, IndexEntry, IndexRepository, IndexedItem,
};
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationRequest {
    pub title: String,
    pub text: String,
    /// Source identifier (usually the article URL); keys the index
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationOutcome {
    pub key: String,
    pub audio_ref: String,
    pub cached: bool,
    pub chunk_count: usize,
    pub resumed_chunks: usize,
    pub billed_characters: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

#[derive(Debug, Clone, Copy)]
pub struct NarrationSettings {
    pub chunker: ChunkerConfig,
    /// Deadline for one whole item, including the wait for its lock
    pub pipeline_timeout: Duration,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            pipeline_timeout: DEFAULT_PIPELINE_TIMEOUT,
        }
    }
}

/// Names derived from one request
struct ItemKeys {
    /// Index key: the source identifier, or the slug without one. One index
    /// entry per key; the lock table is keyed by it too.
    index_key: String,
    slug: String,
    artifact_key: String,
}

pub struct NarrationService {
    chunker: Chunker,
    synthesizer: Synthesizer,
    voices: VoiceSelector,
    checkpoints: CheckpointStore,
    artifacts: Arc<dyn ArtifactStore>,
    index_repo: Arc<dyn IndexRepository>,
    usage: Arc<UsageTracker>,
    pipeline_timeout: Duration,
    locks: Cache<String, Arc<Mutex<()>>>,
}

impl NarrationService {
    pub fn new(
        synthesizer: Synthesizer,
        voices: VoiceSelector,
        artifacts: Arc<dyn ArtifactStore>,
        index_repo: Arc<dyn IndexRepository>,
        usage: Arc<UsageTracker>,
        settings: NarrationSettings,
    ) -> Self {
        let mut chunker_config = settings.chunker;
        chunker_config.hard_limit_bytes = chunker_config
            .hard_limit_bytes
            .min(synthesizer.hard_limit_bytes());

        // A lock is held for at most one pipeline timeout, so an idle entry
        // can never be evicted while someone still holds it.
        let locks = Cache::builder()
            .time_to_idle(settings.pipeline_timeout * 2 + Duration::from_secs(60))
            .build();

        Self {
            chunker: Chunker::new(chunker_config),
            synthesizer,
            voices,
            checkpoints: CheckpointStore::new(artifacts.clone()),
            artifacts,
            index_repo,
            usage,
            pipeline_timeout: settings.pipeline_timeout,
            locks,
        }
    }

    async fn lock_for(&self, index_key: &str) -> Arc<Mutex<()>> {
        self.locks
            .get_with(index_key.to_string(), async { Arc::new(Mutex::new(())) })
            .await
    }

    fn keys(&self, request: &NarrationRequest) -> ItemKeys {
        let source = request
            .source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty());
        let slug = item_slug(&request.title, source);
        let extension = self.synthesizer.audio_config().encoding.extension();

        ItemKeys {
            index_key: source.map(str::to_string).unwrap_or_else(|| slug.clone()),
            artifact_key: format!("audio/{}.{}", slug, extension),
            slug,
        }
    }

    async fn run(
        &self,
        request: &NarrationRequest,
        keys: &ItemKeys,
    ) -> Result<NarrationOutcome, NarrationError> {
        // The entry under this key may point at another title's artifact
        // (same source, new title). Only a matching entry is a cache hit.
        let existing = self.index_repo.find(&keys.index_key).await?;
        let replaced = existing
            .as_ref()
            .filter(|entry| entry.artifact_key != keys.artifact_key)
            .map(|entry| entry.artifact_key.clone());

        if self.artifacts.exists(&keys.artifact_key).await? {
            let audio_ref = match existing {
                Some(entry) if replaced.is_none() => entry.audio_ref,
                _ => {
                    tracing::warn!(
                        key = %keys.index_key,
                        artifact_key = %keys.artifact_key,
                        "Index entry missing or stale for an existing artifact, repairing"
                    );
                    let audio_ref = self.artifacts.reference(&keys.artifact_key);
                    self.commit_index(request, keys, &audio_ref, replaced).await?;
                    audio_ref
                }
            };
            return self.serve_cached(keys, audio_ref).await;
        }

        let prepared = prepare_text(&request.text);
        if prepared.is_empty() {
            return Err(NarrationError::Input(
                "text has no speakable content".to_string(),
            ));
        }

        let chunks = self.chunker.split(&prepared)?;
        let fingerprint = CheckpointStore::fingerprint(&chunks);

        let quota_exhausted = if self.voices.degrades_on_quota() {
            self.usage
                .quota_exhausted()
                .await
                .map_err(NarrationError::storage)?
        } else {
            false
        };
        let plan = self
            .checkpoints
            .begin(&keys.slug, &fingerprint, chunks.len(), || {
                self.voices.select(quota_exhausted)
            })
            .await?;

        tracing::info!(
            item = %keys.slug,
            prepared_chars = prepared.chars().count(),
            chunk_count = chunks.len(),
            voice = %plan.voice.name,
            "Narrating item"
        );

        let mut synthesized: Vec<SynthesizedChunk> = Vec::with_capacity(chunks.len());
        let mut resumed_chunks = 0;
        for chunk in &chunks {
            if let Some(done) = self.checkpoints.load(&keys.slug, chunk.index).await? {
                resumed_chunks += 1;
                synthesized.push(done);
                continue;
            }

            let result = self.synthesizer.synthesize_chunk(chunk, &plan.voice).await?;
            self.checkpoints.save(&keys.slug, &result).await?;
            synthesized.push(result);
        }

        let billed_characters: u64 = synthesized.iter().map(|chunk| chunk.billed_chars).sum();
        let truncated_chunks = synthesized.iter().filter(|chunk| chunk.truncated).count();
        let audio = assemble(synthesized)?;

        let content_type = self.synthesizer.audio_config().encoding.content_type();
        let audio_ref = self
            .artifacts
            .put(&keys.artifact_key, &audio, content_type)
            .await?;

        self.commit_index(request, keys, &audio_ref, replaced).await?;

        let usage = self.settle_usage(&keys.slug, billed_characters).await?;

        tracing::info!(
            item = %keys.slug,
            audio_ref = %audio_ref,
            audio_size = audio.len(),
            chunk_count = chunks.len(),
            resumed_chunks = resumed_chunks,
            truncated_chunks = truncated_chunks,
            billed_characters = billed_characters,
            "Item narrated"
        );

        Ok(NarrationOutcome {
            key: keys.index_key.clone(),
            audio_ref,
            cached: false,
            chunk_count: chunks.len(),
            resumed_chunks,
            billed_characters,
            voice: Some(plan.voice),
            usage: Some(usage),
        })
    }

    /// Points the index key at this request's artifact. An artifact the
    /// entry previously referenced is deleted once nothing indexes it.
    async fn commit_index(
        &self,
        request: &NarrationRequest,
        keys: &ItemKeys,
        audio_ref: &str,
        replaced: Option<String>,
    ) -> Result<(), NarrationError> {
        self.index_repo
            .mark_processed(
                &keys.index_key,
                IndexEntry {
                    title: request.title.clone(),
                    processed_date: Utc::now(),
                    audio_ref: audio_ref.to_string(),
                    description: request.description.clone(),
                    artifact_key: keys.artifact_key.clone(),
                },
            )
            .await?;

        if let Some(old_key) = replaced {
            match self.artifacts.delete(&old_key).await {
                Ok(_) => tracing::info!(
                    key = %keys.index_key,
                    artifact_key = %old_key,
                    "Replaced artifact deleted"
                ),
                Err(e) => tracing::warn!(
                    key = %keys.index_key,
                    artifact_key = %old_key,
                    error = %e,
                    "Failed to delete replaced artifact"
                ),
            }
        }
        Ok(())
    }

    /// Cache hit. Also finishes a run that crashed after writing its
    /// artifact by booking unrecorded usage.
    async fn serve_cached(
        &self,
        keys: &ItemKeys,
        audio_ref: String,
    ) -> Result<NarrationOutcome, NarrationError> {

        let usage = match self.checkpoints.pending_usage(&keys.slug).await? {
            Some(billed) => {
                tracing::warn!(item = %keys.slug, billed_characters = billed, "Booking usage of an interrupted run");
                Some(self.settle_usage(&keys.slug, billed).await?)
            }
            None => {
                self.clear_scratch(&keys.slug).await;
                None
            }
        };

        tracing::info!(key = %keys.index_key, audio_ref = %audio_ref, "Cache hit, skipping synthesis");

        Ok(NarrationOutcome {
            key: keys.index_key.clone(),
            audio_ref,
            cached: true,
            chunk_count: 0,
            resumed_chunks: 0,
            billed_characters: 0,
            voice: None,
            usage,
        })
    }

    /// Last phase: ledger first, then the marker, then scratch removal
    async fn settle_usage(&self, slug: &str, billed: u64) -> Result<UsageSnapshot, NarrationError> {
        let month = self.usage.current_month();
        let usage = self
            .usage
            .record_usage(&month, billed)
            .await
            .map_err(NarrationError::storage)?;

        if let Err(e) = self.checkpoints.mark_usage_recorded(slug).await {
            tracing::error!(item = %slug, error = %e, "Failed to mark usage as recorded");
            return Ok(usage);
        }
        self.clear_scratch(slug).await;
        Ok(usage)
    }

    async fn clear_scratch(&self, slug: &str) {
        match self.checkpoints.clear(slug).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(item = %slug, removed_files = removed, "Scratch cleared"),
            Err(e) => tracing::warn!(item = %slug, error = %e, "Failed to clear scratch"),
        }
    }
}

#[async_trait]
pub trait NarrationServiceApi: Send + Sync {
    /// Narrate one item end to end.
    ///
    /// This operation:
    /// - Returns the existing artifact when one exists (no synthesis)
    /// - Chunks the text and synthesizes missing chunks in order, checkpointing each
    /// - Assembles and stores the audio, then commits the index entry
    /// - Records billed characters in the monthly ledger
    ///
    /// Runs under a per-item lock and the pipeline timeout.
    async fn narrate(&self, request: NarrationRequest) -> Result<NarrationOutcome, NarrationError>;

    /// Processed items, newest first
    async fn list_items(&self) -> Result<Vec<IndexedItem>, NarrationError>;

    /// Removes index entries and artifacts older than `max_age`. The usage
    /// ledger is never touched.
    async fn purge_expired(&self, max_age: chrono::Duration) -> Result<usize, NarrationError>;

    async fn usage_stats(&self) -> Result<UsageSnapshot, NarrationError>;
}

#[async_trait]
impl NarrationServiceApi for NarrationService {
    async fn narrate(&self, request: NarrationRequest) -> Result<NarrationOutcome, NarrationError> {
        if request.text.trim().is_empty() {
            return Err(NarrationError::Input("text cannot be empty".to_string()));
        }

        let keys = self.keys(&request);
        let start_time = Instant::now();

        let pipeline = async {
            let _guard = self.lock_for(&keys.index_key).await.lock_owned().await;
            self.run(&request, &keys).await
        };

        match tokio::time::timeout(self.pipeline_timeout, pipeline).await {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    key = %outcome.key,
                    cached = outcome.cached,
                    latency_ms = start_time.elapsed().as_millis(),
                    "Narration finished"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => {
                tracing::error!(item = %keys.slug, error = %e, "Narration failed");
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    item = %keys.slug,
                    timeout_secs = self.pipeline_timeout.as_secs(),
                    "Narration timed out, checkpointed chunks are kept"
                );
                Err(NarrationError::Timeout(self.pipeline_timeout))
            }
        }
    }

    async fn list_items(&self) -> Result<Vec<IndexedItem>, NarrationError> {
        Ok(self.index_repo.list().await?)
    }

    async fn purge_expired(&self, max_age: chrono::Duration) -> Result<usize, NarrationError> {
        let cutoff = Utc::now() - max_age;
        let mut purged = 0;

        for item in self.index_repo.list().await? {
            if item.entry.processed_date >= cutoff {
                continue;
            }

            // Re-read under the item's lock: a narration may have replaced
            // the entry since the listing.
            let _guard = self.lock_for(&item.key).await.lock_owned().await;
            let Some(entry) = self.index_repo.find(&item.key).await? else {
                continue;
            };
            if entry.processed_date >= cutoff {
                continue;
            }

            self.artifacts.delete(&entry.artifact_key).await?;
            if self.index_repo.remove(&item.key).await? {
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::info!(purged = purged, cutoff = %cutoff, "Expired items purged");
        }
        Ok(purged)
    }

    async fn usage_stats(&self) -> Result<UsageSnapshot, NarrationError> {
        self.usage
            .current_month_stats()
            .await
            .map_err(NarrationError::storage)
    }
}
