use crate::domain::tts::VoiceProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    Mp3,
}

impl AudioEncoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
        }
    }
}

/// Output settings sent with every chunk of an item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub encoding: AudioEncoding,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub volume_gain_db: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Mp3,
            speaking_rate: 1.0,
            pitch: 0.0,
            volume_gain_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: VoiceProfile,
    pub audio_config: AudioConfig,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    /// The provider's own size check rejected the text
    #[error("input exceeds provider size limit: {0}")]
    SizeLimitExceeded(String),
    /// Network failures, throttling and 5xx responses
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// Authentication, unknown voice and other non-retryable rejections
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Repository for speech synthesis calls.
/// Abstracts the underlying provider (Google Cloud TTS, AWS Polly).
///
/// Implementations make exactly one billable call per invocation: no
/// splitting, retrying or merging happens here. The pipeline owns those.
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Provider name used in logs
    fn provider(&self) -> &'static str;

    /// Largest UTF-8 input the provider accepts per call
    fn max_input_bytes(&self) -> usize;

    /// Synthesize one chunk, returning raw encoded audio
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError>;
}
