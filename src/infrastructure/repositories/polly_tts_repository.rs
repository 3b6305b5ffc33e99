use super::tts_repository::{AudioEncoding, SpeechError, SpeechRequest, TtsRepository};
use crate::domain::tts::voice::STANDARD_POOL;
use async_trait::async_trait;
use aws_sdk_polly::{
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
    operation::synthesize_speech::SynthesizeSpeechError,
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly bills at most 3000 characters per request
const MAX_INPUT_BYTES: usize = 3000;

/// AWS Polly implementation of TTS repository
pub struct PollyTtsRepository {
    polly_client: Arc<PollyClient>,
}

impl PollyTtsRepository {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Polly voice ids are bare names; pool entries may carry a locale
    /// prefix like `en-US-Joanna`.
    fn voice_id(name: &str) -> VoiceId {
        let bare = name.rsplit('-').next().unwrap_or(name);
        VoiceId::from(bare)
    }

    /// Economy voices run on the standard engine, everything else on neural
    fn engine(pool: &str) -> Engine {
        if pool == STANDARD_POOL {
            Engine::Standard
        } else {
            Engine::Neural
        }
    }

    fn output_format(encoding: AudioEncoding) -> OutputFormat {
        match encoding {
            AudioEncoding::Mp3 => OutputFormat::Mp3,
        }
    }
}

fn classify_error(err: SdkError<SynthesizeSpeechError, HttpResponse>) -> SpeechError {
    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) {
        return SpeechError::Transient(format!("AWS Polly error: {:?}", err));
    }

    let service_error = err.into_service_error();
    let message = format!("AWS Polly error: {}", service_error);

    if service_error.is_text_length_exceeded_exception() {
        SpeechError::SizeLimitExceeded(message)
    } else if service_error.is_service_failure_exception() {
        SpeechError::Transient(message)
    } else if service_error
        .code()
        .map(|code| code.contains("Throttling"))
        .unwrap_or(false)
    {
        SpeechError::Transient(message)
    } else {
        SpeechError::Rejected(message)
    }
}

#[async_trait]
impl TtsRepository for PollyTtsRepository {
    fn provider(&self) -> &'static str {
        "polly"
    }

    fn max_input_bytes(&self) -> usize {
        MAX_INPUT_BYTES
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        let voice_id = Self::voice_id(&request.voice.name);
        let engine = Self::engine(&request.voice.pool);

        tracing::info!(
            voice = %request.voice.name,
            voice_id = ?voice_id,
            engine = ?engine,
            text_length = request.text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(&request.text)
            .voice_id(voice_id)
            .output_format(Self::output_format(request.audio_config.encoding))
            .engine(engine)
            .send()
            .await
            .map_err(|e| {
                let err = classify_error(e);
                tracing::error!(
                    error = %err,
                    text_length = request.text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                err
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            SpeechError::Transient(format!("Failed to read audio stream: {}", e))
        })?;

        let audio_bytes = audio_stream.into_bytes().to_vec();
        tracing::debug!(
            audio_size = audio_bytes.len(),
            "Audio stream collected successfully"
        );

        Ok(audio_bytes)
    }
}
