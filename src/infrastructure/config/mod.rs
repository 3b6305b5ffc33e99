use crate::domain::tts::{ChunkerConfig, NarrationSettings, SynthesisPolicy};
use crate::domain::usage::{Pricing, DEFAULT_FREE_CHARACTERS, DEFAULT_PRICE_PER_MILLION};
use crate::infrastructure::repositories::{AudioConfig, AudioEncoding};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

type ConfigResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Storage. Without a database URL the index and ledger are JSON files.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub public_base_url: Option<String>,
    // Speech provider
    pub tts_provider: TtsProvider,
    pub google_tts_api_key: Option<String>,
    pub aws_region: String,
    pub tts_request_timeout_secs: u64,
    // Chunking and synthesis limits
    pub chunk_target_chars: usize,
    pub chunk_safety_factor: f32,
    pub tts_hard_limit_bytes: usize,
    pub tts_truncate_target_bytes: usize,
    pub tts_truncate_step_chars: usize,
    pub tts_max_shrink_attempts: u32,
    pub tts_min_shrink_chars: usize,
    pub tts_max_service_retries: u32,
    pub tts_retry_base_ms: u64,
    pub pipeline_timeout_secs: u64,
    // Voices
    pub voice_language: String,
    pub voice_seed: Option<u64>,
    pub voice_degrade_on_quota: bool,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub volume_gain_db: f32,
    // Billing
    pub free_tier_characters: i64,
    pub price_per_million_characters: Decimal,
    // Retention of narrated items, disabled when unset
    pub retention_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Google,
    Polly,
}

impl FromStr for TtsProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "google" => Ok(TtsProvider::Google),
            "polly" | "aws" => Ok(TtsProvider::Polly),
            other => Err(format!("unknown speech provider '{}'", other)),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| format!("invalid {}: {}", key, e).into()),
        None => Ok(default),
    }
}

fn parse_optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid {}: {}", key, e).into()),
        None => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let policy = SynthesisPolicy::default();
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Config {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            environment: match optional("ENVIRONMENT").as_deref() {
                Some("production") => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match optional("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: optional("DATABASE_URL"),
            data_dir: optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            public_base_url: optional("PUBLIC_BASE_URL"),
            tts_provider: parse_or(&lookup, "TTS_PROVIDER", TtsProvider::Google)?,
            google_tts_api_key: optional("GOOGLE_TTS_API_KEY"),
            aws_region: optional("AWS_REGION").unwrap_or_else(|| "eu-west-1".to_string()),
            tts_request_timeout_secs: parse_or(&lookup, "TTS_REQUEST_TIMEOUT_SECS", 30)?,
            chunk_target_chars: parse_or(
                &lookup,
                "CHUNK_TARGET_CHARS",
                crate::domain::tts::chunker::DEFAULT_TARGET_CHARS,
            )?,
            chunk_safety_factor: parse_or(
                &lookup,
                "CHUNK_SAFETY_FACTOR",
                crate::domain::tts::chunker::DEFAULT_SAFETY_FACTOR,
            )?,
            tts_hard_limit_bytes: parse_or(&lookup, "TTS_HARD_LIMIT_BYTES", policy.hard_limit_bytes)?,
            tts_truncate_target_bytes: parse_or(
                &lookup,
                "TTS_TRUNCATE_TARGET_BYTES",
                policy.truncate_target_bytes,
            )?,
            tts_truncate_step_chars: parse_or(
                &lookup,
                "TTS_TRUNCATE_STEP_CHARS",
                policy.truncate_step_chars,
            )?,
            tts_max_shrink_attempts: parse_or(
                &lookup,
                "TTS_MAX_SHRINK_ATTEMPTS",
                policy.max_shrink_attempts,
            )?,
            tts_min_shrink_chars: parse_or(&lookup, "TTS_MIN_SHRINK_CHARS", policy.min_shrink_chars)?,
            tts_max_service_retries: parse_or(
                &lookup,
                "TTS_MAX_SERVICE_RETRIES",
                policy.max_service_retries,
            )?,
            tts_retry_base_ms: parse_or(
                &lookup,
                "TTS_RETRY_BASE_MS",
                policy.retry_base_delay.as_millis() as u64,
            )?,
            pipeline_timeout_secs: parse_or(&lookup, "PIPELINE_TIMEOUT_SECS", 300)?,
            voice_language: optional("VOICE_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
            voice_seed: parse_optional(&lookup, "VOICE_SEED")?,
            voice_degrade_on_quota: parse_or(&lookup, "VOICE_DEGRADE_ON_QUOTA", false)?,
            speaking_rate: parse_or(&lookup, "SPEAKING_RATE", 1.0)?,
            pitch: parse_or(&lookup, "PITCH", 0.0)?,
            volume_gain_db: parse_or(&lookup, "VOLUME_GAIN_DB", 0.0)?,
            free_tier_characters: parse_or(
                &lookup,
                "FREE_TIER_CHARACTERS",
                DEFAULT_FREE_CHARACTERS,
            )?,
            price_per_million_characters: parse_or(
                &lookup,
                "PRICE_PER_MILLION_CHARACTERS",
                Decimal::from(DEFAULT_PRICE_PER_MILLION),
            )?,
            retention_days: parse_optional(&lookup, "RETENTION_DAYS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.tts_provider == TtsProvider::Google && self.google_tts_api_key.is_none() {
            return Err("GOOGLE_TTS_API_KEY is required when TTS_PROVIDER=google".into());
        }
        if self.tts_truncate_target_bytes >= self.tts_hard_limit_bytes {
            return Err("TTS_TRUNCATE_TARGET_BYTES must be below TTS_HARD_LIMIT_BYTES".into());
        }
        if self.chunk_safety_factor <= 0.0 || self.chunk_safety_factor > 1.0 {
            return Err("CHUNK_SAFETY_FACTOR must be in (0, 1]".into());
        }
        if self.tts_truncate_step_chars == 0 {
            return Err("TTS_TRUNCATE_STEP_CHARS must be positive".into());
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    pub fn usage_path(&self) -> PathBuf {
        self.data_dir.join("usage.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn tts_request_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_request_timeout_secs)
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            target_chars: self.chunk_target_chars,
            safety_factor: self.chunk_safety_factor,
            hard_limit_bytes: self.tts_hard_limit_bytes,
        }
    }

    pub fn synthesis_policy(&self) -> SynthesisPolicy {
        SynthesisPolicy {
            hard_limit_bytes: self.tts_hard_limit_bytes,
            truncate_target_bytes: self.tts_truncate_target_bytes,
            truncate_step_chars: self.tts_truncate_step_chars,
            max_shrink_attempts: self.tts_max_shrink_attempts,
            min_shrink_chars: self.tts_min_shrink_chars,
            max_service_retries: self.tts_max_service_retries,
            retry_base_delay: Duration::from_millis(self.tts_retry_base_ms),
            ..SynthesisPolicy::default()
        }
    }

    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            encoding: AudioEncoding::Mp3,
            speaking_rate: self.speaking_rate,
            pitch: self.pitch,
            volume_gain_db: self.volume_gain_db,
        }
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            free_characters: self.free_tier_characters,
            price_per_million: self.price_per_million_characters,
        }
    }

    pub fn narration_settings(&self) -> NarrationSettings {
        NarrationSettings {
            chunker: self.chunker_config(),
            pipeline_timeout: Duration::from_secs(self.pipeline_timeout_secs),
        }
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .filter(|days| *days > 0)
            .map(chrono::Duration::days)
    }
}
