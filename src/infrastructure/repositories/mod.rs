pub mod artifact_store;
pub mod google_tts_repository;
pub mod index_repository;
pub mod json_document;
pub mod polly_tts_repository;
pub mod tts_repository;
pub mod usage_repository;

pub use artifact_store::{ArtifactStore, FilesystemArtifactStore, InMemoryArtifactStore};
pub use google_tts_repository::GoogleTtsRepository;
pub use index_repository::{
    IndexEntry, IndexRepository, IndexedItem, JsonIndexRepository, PgIndexRepository,
};
pub use json_document::JsonDocument;
pub use polly_tts_repository::PollyTtsRepository;
pub use tts_repository::{AudioConfig, AudioEncoding, SpeechError, SpeechRequest, TtsRepository};
pub use usage_repository::{JsonUsageRepository, PgUsageRepository, UsageRepository};
