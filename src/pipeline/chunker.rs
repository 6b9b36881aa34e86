//! Text chunker: splits long text into overlapping, bounded segments so each
//! fits a model context window.
//!
//! Tokens are Unicode word-boundary segments that are not whitespace;
//! whitespace rides along with the token before it. When the token splitter
//! is disabled or misconfigured the chunker falls back to fixed-size,
//! non-overlapping character windows.

use unicode_segmentation::UnicodeSegmentation;

/// Smallest character window used by the fallback splitter.
const MIN_FALLBACK_CHARS: usize = 1000;

/// How text is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// Token windows with overlap.
    Tokens,
    /// Character windows of `max(1000, max_tokens * 2)`, no overlap.
    Characters,
}

impl std::str::FromStr for ChunkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tokens" | "token" => Ok(Self::Tokens),
            "chars" | "characters" => Ok(Self::Characters),
            other => Err(format!("unknown chunk mode '{other}'")),
        }
    }
}

/// Chunker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunker {
    max_tokens: usize,
    overlap_tokens: usize,
    mode: ChunkMode,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(2000, 100)
    }
}

impl Chunker {
    /// Token-aware chunker.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
            mode: ChunkMode::Tokens,
        }
    }

    pub fn with_mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    /// The mode actually used. Token mode needs `0 <= overlap < max`.
    pub fn effective_mode(&self) -> ChunkMode {
        if self.mode == ChunkMode::Tokens
            && self.max_tokens > 0
            && self.overlap_tokens < self.max_tokens
        {
            ChunkMode::Tokens
        } else {
            ChunkMode::Characters
        }
    }

    /// Characters per fallback chunk.
    pub fn fallback_chars(&self) -> usize {
        MIN_FALLBACK_CHARS.max(self.max_tokens.saturating_mul(2))
    }

    /// Split `text` into chunks. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.effective_mode() {
            ChunkMode::Tokens => chunk_tokens(text, self.max_tokens, self.overlap_tokens),
            ChunkMode::Characters => chunk_chars(text, self.fallback_chars()),
        }
    }
}

/// Free-function form of [`Chunker::chunk`] in token mode.
pub fn chunk(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    Chunker::new(max_tokens, overlap_tokens).chunk(text)
}

/// Byte offsets where each token starts. The first token always starts at 0.
fn token_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    for (idx, segment) in text.split_word_bound_indices() {
        if segment.chars().all(char::is_whitespace) {
            continue;
        }
        starts.push(idx);
    }
    match starts.first_mut() {
        Some(first) => *first = 0,
        // Whitespace-only text is a single token.
        None => starts.push(0),
    }
    starts
}

fn chunk_tokens(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let starts = token_starts(text);
    let total = starts.len();
    let step = max_tokens - overlap_tokens;
    let end_of = |token: usize| starts.get(token + 1).copied().unwrap_or(text.len());

    let mut chunks = Vec::new();
    let mut first = 0;
    loop {
        let last = (first + max_tokens).min(total) - 1;
        chunks.push(text[starts[first]..end_of(last)].to_string());
        if last + 1 >= total {
            break;
        }
        first += step;
    }
    chunks
}

fn chunk_chars(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window)
        .map(|w| w.iter().collect::<String>())
        .collect()
}
