use super::tts_repository::{AudioEncoding, SpeechError, SpeechRequest, TtsRepository};
use crate::domain::tts::SERVICE_HARD_LIMIT_BYTES;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: InputBody<'a>,
    voice: VoiceBody<'a>,
    audio_config: AudioConfigBody,
}

#[derive(Debug, Serialize)]
struct InputBody<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceBody<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfigBody {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Google Cloud Text-to-Speech REST implementation of TTS repository
pub struct GoogleTtsRepository {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleTtsRepository {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_endpoint(GOOGLE_TTS_URL.to_string(), api_key, request_timeout)
    }

    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    fn encoding_name(encoding: AudioEncoding) -> &'static str {
        match encoding {
            AudioEncoding::Mp3 => "MP3",
        }
    }

    fn body<'a>(request: &'a SpeechRequest) -> SynthesizeBody<'a> {
        SynthesizeBody {
            input: InputBody {
                text: &request.text,
            },
            voice: VoiceBody {
                language_code: &request.voice.language_code,
                name: &request.voice.name,
                ssml_gender: request.voice.gender.to_string(),
            },
            audio_config: AudioConfigBody {
                audio_encoding: Self::encoding_name(request.audio_config.encoding),
                speaking_rate: request.audio_config.speaking_rate,
                pitch: request.audio_config.pitch,
                volume_gain_db: request.audio_config.volume_gain_db,
            },
        }
    }
}

/// Maps an error response onto the retry taxonomy. Google reports oversized
/// input as a 400 whose message mentions the byte limit.
fn classify_status(status: StatusCode, message: String) -> SpeechError {
    let lowered = message.to_lowercase();
    if status == StatusCode::BAD_REQUEST
        && (lowered.contains("longer than") || lowered.contains("exceeds") || lowered.contains("too long"))
    {
        return SpeechError::SizeLimitExceeded(message);
    }

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SpeechError::Transient(format!("{}: {}", status, message))
    } else {
        SpeechError::Rejected(format!("{}: {}", status, message))
    }
}

#[async_trait]
impl TtsRepository for GoogleTtsRepository {
    fn provider(&self) -> &'static str {
        "google"
    }

    fn max_input_bytes(&self) -> usize {
        SERVICE_HARD_LIMIT_BYTES
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        tracing::info!(
            voice = %request.voice.name,
            language = %request.voice.language_code,
            text_length = request.text.len(),
            "Calling Google Cloud TTS text:synthesize"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google Cloud TTS request failed");
                SpeechError::Transient(format!("Google Cloud TTS request error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|envelope| envelope.error.message)
                .unwrap_or(raw);
            let err = classify_status(status, message);
            tracing::error!(
                status = status.as_u16(),
                error = %err,
                text_length = request.text.len(),
                "Google Cloud TTS rejected request"
            );
            return Err(err);
        }

        let body: SynthesizeResponse = response.json().await.map_err(|e| {
            SpeechError::Transient(format!("Failed to decode Google Cloud TTS response: {}", e))
        })?;

        let audio_bytes = STANDARD.decode(body.audio_content.as_bytes()).map_err(|e| {
            SpeechError::Rejected(format!("Google Cloud TTS returned invalid audio: {}", e))
        })?;

        tracing::debug!(
            audio_size = audio_bytes.len(),
            "Google Cloud TTS audio received successfully"
        );

        Ok(audio_bytes)
    }
}
