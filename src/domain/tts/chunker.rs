use regex::Regex;
use std::sync::LazyLock;

use super::error::NarrationError;

/// Maximum UTF-8 size the speech service accepts per call
pub const SERVICE_HARD_LIMIT_BYTES: usize = 5000;

pub const DEFAULT_TARGET_CHARS: usize = 5000;
pub const DEFAULT_SAFETY_FACTOR: f32 = 0.75;

/// Smallest budget that still guarantees progress for a 4-byte character plus
/// the terminating mark of a forced slice.
const MIN_BUDGET: usize = 8;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence pattern is valid"));
static CLAUSE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;:)]+\s+|\s+\(").expect("clause pattern is valid"));

/// A contiguous slice of source text small enough for one service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub byte_len: usize,
}

impl TextChunk {
    pub fn new(index: usize, text: String) -> Self {
        let byte_len = text.len();
        Self {
            index,
            text,
            byte_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkerConfig {
    /// Target chunk size in characters
    pub target_chars: usize,
    /// Fraction of the target actually filled, leaving headroom for
    /// multi-byte expansion
    pub safety_factor: f32,
    pub hard_limit_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_chars: DEFAULT_TARGET_CHARS,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            hard_limit_bytes: SERVICE_HARD_LIMIT_BYTES,
        }
    }
}

/// Splits text into ordered chunks using a boundary-preference cascade:
/// paragraphs, then sentences, then clauses, then forced whitespace slices.
///
/// A piece "fits" when it is within both the safe character size and the hard
/// byte limit, so every emitted chunk respects the service limit regardless of
/// script.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    max_bytes: usize,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        let factor = config.safety_factor.clamp(0.1, 1.0);
        let max_chars = ((config.target_chars as f32 * factor).floor() as usize).max(MIN_BUDGET);
        let max_bytes = config.hard_limit_bytes.max(MIN_BUDGET);

        Self {
            max_chars,
            max_bytes,
        }
    }

    /// Safe size in characters
    pub fn safe_size(&self) -> usize {
        self.max_chars
    }

    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>, NarrationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NarrationError::Input(
                "text cannot be empty or whitespace only".to_string(),
            ));
        }

        if self.fits(text) {
            return Ok(vec![TextChunk::new(0, text.to_string())]);
        }

        let mut acc = Accumulator::new(self);

        for paragraph in PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            acc.start_paragraph();

            if self.fits(paragraph) {
                acc.push(paragraph);
                continue;
            }

            for sentence in split_after(paragraph, &SENTENCE_END) {
                if self.fits(sentence) {
                    acc.push(sentence);
                    continue;
                }

                for clause in split_after(sentence, &CLAUSE_BREAK) {
                    if self.fits(clause) {
                        acc.push(clause);
                        continue;
                    }

                    for slice in self.force_slices(clause) {
                        acc.push(&slice);
                    }
                }
            }
        }

        let chunks = acc.finish();

        tracing::debug!(
            chunk_count = chunks.len(),
            text_bytes = text.len(),
            safe_size = self.max_chars,
            "Text split into chunks"
        );

        Ok(chunks)
    }

    fn fits(&self, piece: &str) -> bool {
        self.within_budget(piece.len(), piece.chars().count())
    }

    fn within_budget(&self, bytes: usize, chars: usize) -> bool {
        bytes <= self.max_bytes && chars <= self.max_chars
    }

    /// Slices an unbreakable fragment at the last whitespace inside the
    /// budget, falling back to a hard character cut. Each slice ends with a
    /// sentence mark. The remainder shrinks on every iteration.
    fn force_slices(&self, fragment: &str) -> Vec<String> {
        let mut slices = Vec::new();
        let mut rest = fragment.trim();

        while !rest.is_empty() {
            let cut = self.slice_end(rest);
            let (head, tail) = rest.split_at(cut);
            slices.push(terminate(head.trim_end()));
            rest = tail.trim_start();
        }

        tracing::warn!(
            fragment_bytes = fragment.len(),
            slice_count = slices.len(),
            "Forced slicing of fragment without natural boundaries"
        );

        slices
    }

    /// Byte offset where the next forced slice ends. Always > 0.
    fn slice_end(&self, rest: &str) -> usize {
        // one unit reserved for the terminating mark
        let max_bytes = self.max_bytes - 1;
        let max_chars = self.max_chars - 1;

        let mut limit = 0;
        for (count, (idx, ch)) in rest.char_indices().enumerate() {
            let end = idx + ch.len_utf8();
            if end > max_bytes || count + 1 > max_chars {
                break;
            }
            limit = end;
        }

        if limit == rest.len() {
            return limit;
        }

        if limit == 0 {
            return rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }

        match rest[..limit].rfind(char::is_whitespace) {
            Some(ws) if ws > 0 => ws,
            _ => limit,
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

/// Packs pieces into chunks, flushing whenever the next piece would overflow.
struct Accumulator<'a> {
    chunker: &'a Chunker,
    current: String,
    current_chars: usize,
    separator: &'static str,
    chunks: Vec<TextChunk>,
}

impl<'a> Accumulator<'a> {
    fn new(chunker: &'a Chunker) -> Self {
        Self {
            chunker,
            current: String::new(),
            current_chars: 0,
            separator: SENTENCE_SEPARATOR,
            chunks: Vec::new(),
        }
    }

    fn start_paragraph(&mut self) {
        self.separator = PARAGRAPH_SEPARATOR;
    }

    /// `piece` must fit on its own
    fn push(&mut self, piece: &str) {
        let separator = std::mem::replace(&mut self.separator, SENTENCE_SEPARATOR);
        let piece_chars = piece.chars().count();

        if !self.current.is_empty() {
            let bytes = self.current.len() + separator.len() + piece.len();
            let chars = self.current_chars + separator.len() + piece_chars;

            if self.chunker.within_budget(bytes, chars) {
                self.current.push_str(separator);
                self.current.push_str(piece);
                self.current_chars = chars;
                return;
            }

            self.flush();
        }

        self.current.push_str(piece);
        self.current_chars = piece_chars;
    }

    fn flush(&mut self) {
        let text = self.current.trim();
        if !text.is_empty() {
            let index = self.chunks.len();
            self.chunks.push(TextChunk::new(index, text.to_string()));
        }
        self.current.clear();
        self.current_chars = 0;
    }

    fn finish(mut self) -> Vec<TextChunk> {
        self.flush();
        self.chunks
    }
}

/// Splits after every match of `pattern`; a match ending in `(` keeps the
/// parenthesis with the following piece.
fn split_after<'t>(text: &'t str, pattern: &Regex) -> Vec<&'t str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for mat in pattern.find_iter(text) {
        let mut end = mat.end();
        if mat.as_str().ends_with('(') {
            end -= 1;
        }
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        start = end;
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        pieces.push(rest);
    }

    pieces
}

fn terminate(slice: &str) -> String {
    if slice.ends_with(['.', '?', '!']) {
        slice.to_string()
    } else {
        format!("{}.", slice)
    }
}
