//! Per-item scratch space holding every chunk the speech service has already
//! accepted, so an interrupted item resumes instead of paying again.
//!
//! Layout under `scratch/{item}/`:
//! - `plan.json`: fingerprint of the chunk texts, chunk count and the voice
//! - `{index:05}.audio`: raw audio of one chunk
//! - `{index:05}.json`: chunk record, written after its audio
//!
//! A chunk counts as done only once its record exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::chunker::TextChunk;
use super::error::NarrationError;
use super::synthesizer::SynthesizedChunk;
use super::voice::VoiceProfile;
use crate::infrastructure::repositories::ArtifactStore;

const SCRATCH_PREFIX: &str = "scratch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPlan {
    pub fingerprint: String,
    pub chunk_count: usize,
    pub voice: VoiceProfile,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkRecord {
    index: usize,
    billed_chars: u64,
    audio_bytes: usize,
    submitted_bytes: usize,
    truncated: bool,
}

pub struct CheckpointStore {
    store: Arc<dyn ArtifactStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Identifies a chunk plan. Any change to chunk boundaries or text
    /// yields a different fingerprint.
    pub fn fingerprint(chunks: &[TextChunk]) -> String {
        let mut hasher = Sha256::new();
        for chunk in chunks {
            hasher.update(chunk.index.to_le_bytes());
            hasher.update(chunk.text.as_bytes());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    fn item_prefix(item: &str) -> String {
        format!("{}/{}", SCRATCH_PREFIX, item)
    }

    fn plan_key(item: &str) -> String {
        format!("{}/plan.json", Self::item_prefix(item))
    }

    fn audio_key(item: &str, index: usize) -> String {
        format!("{}/{:05}.audio", Self::item_prefix(item), index)
    }

    fn record_key(item: &str, index: usize) -> String {
        format!("{}/{:05}.json", Self::item_prefix(item), index)
    }

    /// Returns the plan to work under. A matching plan from an earlier run is
    /// reused with its voice; a stale one is discarded along with its chunks
    /// and `choose_voice` picks the voice for the fresh plan.
    pub async fn begin<F>(
        &self,
        item: &str,
        fingerprint: &str,
        chunk_count: usize,
        choose_voice: F,
    ) -> Result<CheckpointPlan, NarrationError>
    where
        F: FnOnce() -> Result<VoiceProfile, NarrationError> + Send,
    {
        let plan_key = Self::plan_key(item);

        if let Some(bytes) = self.store.get(&plan_key).await? {
            match serde_json::from_slice::<CheckpointPlan>(&bytes) {
                Ok(plan) if plan.fingerprint == fingerprint && plan.chunk_count == chunk_count => {
                    tracing::info!(
                        item = %item,
                        chunk_count = chunk_count,
                        voice = %plan.voice.name,
                        "Resuming from checkpoint"
                    );
                    return Ok(plan);
                }
                Ok(_) => {
                    let removed = self.clear(item).await?;
                    tracing::warn!(
                        item = %item,
                        removed_files = removed,
                        "Checkpoint plan is stale, discarding scratch chunks"
                    );
                }
                Err(e) => {
                    self.store.delete(&plan_key).await?;
                    tracing::error!(item = %item, error = %e, "Corrupt checkpoint plan removed");
                    return Err(NarrationError::Fatal(format!(
                        "corrupt checkpoint plan for '{}': {}",
                        item, e
                    )));
                }
            }
        }

        let plan = CheckpointPlan {
            fingerprint: fingerprint.to_string(),
            chunk_count,
            voice: choose_voice()?,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&plan).map_err(NarrationError::storage)?;
        self.store
            .put(&plan_key, &bytes, "application/json")
            .await?;

        Ok(plan)
    }

    /// A previously checkpointed chunk, if any
    pub async fn load(
        &self,
        item: &str,
        index: usize,
    ) -> Result<Option<SynthesizedChunk>, NarrationError> {
        let record_key = Self::record_key(item, index);
        let Some(bytes) = self.store.get(&record_key).await? else {
            return Ok(None);
        };

        let record = match serde_json::from_slice::<ChunkRecord>(&bytes) {
            Ok(record) if record.index == index => record,
            Ok(record) => {
                return Err(self
                    .reject(item, index, format!("record carries index {}", record.index))
                    .await);
            }
            Err(e) => return Err(self.reject(item, index, e.to_string()).await),
        };

        let audio = match self.store.get(&Self::audio_key(item, index)).await? {
            Some(audio) if audio.len() == record.audio_bytes => audio,
            Some(audio) => {
                let reason = format!(
                    "audio is {} bytes, record says {}",
                    audio.len(),
                    record.audio_bytes
                );
                return Err(self.reject(item, index, reason).await);
            }
            None => return Err(self.reject(item, index, "audio missing".to_string()).await),
        };

        Ok(Some(SynthesizedChunk {
            index,
            audio,
            billed_chars: record.billed_chars,
            submitted_bytes: record.submitted_bytes,
            truncated: record.truncated,
        }))
    }

    pub async fn save(&self, item: &str, chunk: &SynthesizedChunk) -> Result<(), NarrationError> {
        let record = ChunkRecord {
            index: chunk.index,
            billed_chars: chunk.billed_chars,
            audio_bytes: chunk.audio.len(),
            submitted_bytes: chunk.submitted_bytes,
            truncated: chunk.truncated,
        };
        let record_bytes = serde_json::to_vec(&record).map_err(NarrationError::storage)?;

        self.store
            .put(&Self::audio_key(item, chunk.index), &chunk.audio, "audio/mpeg")
            .await?;
        self.store
            .put(
                &Self::record_key(item, chunk.index),
                &record_bytes,
                "application/json",
            )
            .await?;

        tracing::debug!(item = %item, chunk_index = chunk.index, "Chunk checkpointed");
        Ok(())
    }

    /// Billed characters of a finished run whose usage never reached the
    /// ledger. `None` when there is no plan or the usage was recorded.
    pub async fn pending_usage(&self, item: &str) -> Result<Option<u64>, NarrationError> {
        if !self.store.exists(&Self::plan_key(item)).await?
            || self.store.exists(&Self::usage_marker_key(item)).await?
        {
            return Ok(None);
        }

        let mut billed = 0u64;
        for key in self.store.list(&Self::item_prefix(item)).await? {
            if !key.ends_with(".json") || key == Self::plan_key(item) {
                continue;
            }
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<ChunkRecord>(&bytes) {
                Ok(record) => billed += record.billed_chars,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable chunk record");
                }
            }
        }
        Ok(Some(billed))
    }

    pub async fn mark_usage_recorded(&self, item: &str) -> Result<(), NarrationError> {
        self.store
            .put(&Self::usage_marker_key(item), b"", "text/plain")
            .await?;
        Ok(())
    }

    fn usage_marker_key(item: &str) -> String {
        format!("{}/usage.recorded", Self::item_prefix(item))
    }

    /// Removes all scratch files of an item
    pub async fn clear(&self, item: &str) -> Result<usize, NarrationError> {
        Ok(self.store.delete_prefix(&Self::item_prefix(item)).await?)
    }

    /// Drops the bad record so the next run synthesizes the chunk again
    async fn reject(&self, item: &str, index: usize, reason: String) -> NarrationError {
        if let Err(e) = self.store.delete(&Self::record_key(item, index)).await {
            tracing::error!(item = %item, chunk_index = index, error = %e, "Failed to remove corrupt chunk record");
        }
        tracing::error!(item = %item, chunk_index = index, reason = %reason, "Corrupt checkpoint");
        NarrationError::Fatal(format!(
            "corrupt checkpoint for '{}' chunk {}: {}",
            item, index, reason
        ))
    }
}
