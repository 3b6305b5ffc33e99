use std::sync::Arc;
use std::time::{Duration, Instant};

use super::chunker::{TextChunk, SERVICE_HARD_LIMIT_BYTES};
use super::error::NarrationError;
use super::voice::VoiceProfile;
use crate::infrastructure::repositories::{AudioConfig, SpeechError, SpeechRequest, TtsRepository};

/// Limits for the two independent retry paths: shrinking oversized text and
/// backing off on transient service failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisPolicy {
    pub hard_limit_bytes: usize,
    /// Pre-submission trimming stops once the text is at or below this size
    pub truncate_target_bytes: usize,
    /// Characters removed from the tail per trimming step
    pub truncate_step_chars: usize,
    /// Fraction of the text kept after a provider size rejection
    pub shrink_ratio: f32,
    pub max_shrink_attempts: u32,
    /// Below this many characters a rejected chunk fails permanently
    pub min_shrink_chars: usize,
    pub max_service_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            hard_limit_bytes: SERVICE_HARD_LIMIT_BYTES,
            truncate_target_bytes: 4800,
            truncate_step_chars: 50,
            shrink_ratio: 0.8,
            max_shrink_attempts: 5,
            min_shrink_chars: 200,
            max_service_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
        }
    }
}

impl SynthesisPolicy {
    /// Exponential delay for the given retry (0-based), capped
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Audio for one chunk plus what it cost
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedChunk {
    pub index: usize,
    pub audio: Vec<u8>,
    /// Characters of the accepted submission
    pub billed_chars: u64,
    pub submitted_bytes: usize,
    pub truncated: bool,
}

pub struct Synthesizer {
    tts_repo: Arc<dyn TtsRepository>,
    audio_config: AudioConfig,
    policy: SynthesisPolicy,
}

impl Synthesizer {
    pub fn new(
        tts_repo: Arc<dyn TtsRepository>,
        audio_config: AudioConfig,
        policy: SynthesisPolicy,
    ) -> Self {
        Self {
            tts_repo,
            audio_config,
            policy,
        }
    }

    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio_config
    }

    /// Effective per-call limit: the configured limit or the provider's,
    /// whichever is smaller
    pub fn hard_limit_bytes(&self) -> usize {
        self.policy
            .hard_limit_bytes
            .min(self.tts_repo.max_input_bytes())
    }

    fn truncate_target_bytes(&self) -> usize {
        let limit = self.hard_limit_bytes();
        let margin = self
            .policy
            .hard_limit_bytes
            .saturating_sub(self.policy.truncate_target_bytes);
        self.policy
            .truncate_target_bytes
            .min(limit.saturating_sub(margin))
            .max(1)
    }

    pub async fn synthesize_chunk(
        &self,
        chunk: &TextChunk,
        voice: &VoiceProfile,
    ) -> Result<SynthesizedChunk, NarrationError> {
        voice.validate()?;

        let start_time = Instant::now();
        let (mut text, mut truncated) = self.fit_to_limit(chunk)?;
        let mut shrink_attempts = 0u32;

        loop {
            match self.call_with_backoff(chunk.index, &text, voice).await {
                Ok(audio) => {
                    let billed_chars = text.chars().count() as u64;

                    tracing::info!(
                        provider = self.tts_repo.provider(),
                        chunk_index = chunk.index,
                        submitted_bytes = text.len(),
                        billed_chars = billed_chars,
                        audio_size_bytes = audio.len(),
                        shrink_attempts = shrink_attempts,
                        latency_ms = start_time.elapsed().as_millis(),
                        "Chunk synthesized"
                    );

                    return Ok(SynthesizedChunk {
                        index: chunk.index,
                        audio,
                        billed_chars,
                        submitted_bytes: text.len(),
                        truncated,
                    });
                }
                Err(SpeechError::SizeLimitExceeded(message)) => {
                    shrink_attempts += 1;
                    if shrink_attempts > self.policy.max_shrink_attempts {
                        tracing::error!(
                            chunk_index = chunk.index,
                            attempts = shrink_attempts,
                            "Size-limit retries exhausted"
                        );
                        return Err(NarrationError::Fatal(format!(
                            "chunk {} still rejected as oversized after {} shrink attempts: {}",
                            chunk.index, self.policy.max_shrink_attempts, message
                        )));
                    }

                    let current_chars = text.chars().count();
                    let next_chars = (current_chars as f32 * self.policy.shrink_ratio).floor() as usize;
                    if next_chars < self.policy.min_shrink_chars || next_chars >= current_chars {
                        tracing::error!(
                            chunk_index = chunk.index,
                            current_chars = current_chars,
                            "Chunk cannot shrink further"
                        );
                        return Err(NarrationError::SizeLimit {
                            index: chunk.index,
                            message,
                        });
                    }

                    text = take_chars(&text, next_chars).trim_end().to_string();
                    truncated = true;

                    tracing::warn!(
                        chunk_index = chunk.index,
                        attempt = shrink_attempts,
                        from_chars = current_chars,
                        to_chars = next_chars,
                        "Provider rejected chunk as oversized, retrying with shorter text (lossy)"
                    );
                }
                Err(SpeechError::Transient(message)) => {
                    return Err(NarrationError::Fatal(format!(
                        "chunk {}: speech service retries exhausted: {}",
                        chunk.index, message
                    )));
                }
                Err(SpeechError::Rejected(message)) => {
                    return Err(NarrationError::Service(message));
                }
            }
        }
    }

    /// Trims the tail in fixed character decrements when the chunk is over
    /// the hard limit. Lossy.
    fn fit_to_limit(&self, chunk: &TextChunk) -> Result<(String, bool), NarrationError> {
        if chunk.text.len() <= self.hard_limit_bytes() {
            return Ok((chunk.text.clone(), false));
        }

        let target = self.truncate_target_bytes();
        let step = self.policy.truncate_step_chars.max(1);
        let mut trimmed = chunk.text.as_str();

        while trimmed.len() > target {
            let cut = trimmed
                .char_indices()
                .rev()
                .nth(step - 1)
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            trimmed = &trimmed[..cut];
        }

        let trimmed = trimmed.trim_end();
        if trimmed.is_empty() {
            return Err(NarrationError::SizeLimit {
                index: chunk.index,
                message: "nothing left after truncation".to_string(),
            });
        }

        tracing::warn!(
            chunk_index = chunk.index,
            original_bytes = chunk.text.len(),
            submitted_bytes = trimmed.len(),
            dropped_chars = chunk.text.chars().count() - trimmed.chars().count(),
            "Chunk over hard limit, truncated before submission (lossy)"
        );

        Ok((trimmed.to_string(), true))
    }

    async fn call_with_backoff(
        &self,
        chunk_index: usize,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<Vec<u8>, SpeechError> {
        let request = SpeechRequest {
            text: text.to_string(),
            voice: voice.clone(),
            audio_config: self.audio_config,
        };
        let mut retry_count = 0;

        loop {
            match self.tts_repo.synthesize(&request).await {
                Err(SpeechError::Transient(e)) if retry_count < self.policy.max_service_retries => {
                    let delay = self.policy.backoff_delay(retry_count);
                    retry_count += 1;
                    tracing::warn!(
                        chunk_index = chunk_index,
                        retry = retry_count,
                        max_retries = self.policy.max_service_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient speech service failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn take_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
