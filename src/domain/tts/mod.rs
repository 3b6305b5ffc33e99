pub mod assembler;
pub mod checkpoint;
pub mod chunker;
pub mod error;
pub mod service;
pub mod synthesizer;
pub mod text;
pub mod voice;

pub use assembler::assemble;
pub use checkpoint::{CheckpointPlan, CheckpointStore};
pub use chunker::{Chunker, ChunkerConfig, TextChunk, SERVICE_HARD_LIMIT_BYTES};
pub use error::NarrationError;
pub use service::{
    NarrationOutcome, NarrationRequest, NarrationService, NarrationServiceApi, NarrationSettings,
};
pub use synthesizer::{SynthesisPolicy, SynthesizedChunk, Synthesizer};
pub use text::{item_slug, prepare_text};
pub use voice::{default_pools, polly_pools, VoiceGender, VoicePool, VoiceProfile, VoiceSelector};
