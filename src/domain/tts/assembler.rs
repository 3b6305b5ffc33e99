//! Joins per-chunk audio into one artifact.
//!
//! MP3 is a sequence of self-delimiting frames, so concatenating buffers in
//! chunk order yields a playable stream without a container-level merge.
//! An encoding without that property would need a real mux step here.

use super::error::NarrationError;
use super::synthesizer::SynthesizedChunk;

/// Concatenate chunk audio strictly by ordinal. Requires ordinals `0..n`
/// with no gaps or duplicates; a single chunk is returned unmodified.
pub fn assemble(mut chunks: Vec<SynthesizedChunk>) -> Result<Vec<u8>, NarrationError> {
    if chunks.is_empty() {
        return Err(NarrationError::Fatal("no audio chunks to assemble".to_string()));
    }

    chunks.sort_by_key(|chunk| chunk.index);

    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.index != expected {
            return Err(NarrationError::Fatal(format!(
                "audio chunk sequence broken: expected index {}, found {}",
                expected, chunk.index
            )));
        }
    }

    if chunks.len() == 1 {
        return Ok(chunks.remove(0).audio);
    }

    let total: usize = chunks.iter().map(|chunk| chunk.audio.len()).sum();
    let mut merged_audio = Vec::with_capacity(total);
    for chunk in &chunks {
        merged_audio.extend_from_slice(&chunk.audio);
    }

    tracing::debug!(
        chunk_count = chunks.len(),
        total_audio_size = merged_audio.len(),
        "Audio chunks assembled"
    );

    Ok(merged_audio)
}
