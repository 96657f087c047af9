//! Delimiter tokenizer for the TF-IDF index.
//!
//! Lowercases the input and splits on non-alphanumeric characters.
//! Single-character tokens are discarded. Uses a zero-per-token
//! allocation design: one lowercased buffer plus byte spans.

/// Tokenized text: owns the lowercased buffer, provides &str slices via
/// byte spans.
pub struct Tokens {
    buffer: String,
    spans: Vec<(u32, u32)>,
}

impl Tokens {
    /// Returns an iterator over the token `&str` slices.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.spans
            .iter()
            .map(|&(s, e)| &self.buffer[s as usize..e as usize])
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns `true` if there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric, drop
/// single-character tokens.
pub fn tokenize(text: &str) -> Tokens {
    let buffer = text.to_lowercase();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in buffer.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start {
            if buffer[s..i].chars().count() > 1 {
                spans.push((s as u32, i as u32));
            }
            start = None;
        }
    }
    if let Some(s) = start {
        if buffer[s..].chars().count() > 1 {
            spans.push((s as u32, buffer.len() as u32));
        }
    }

    Tokens { buffer, spans }
}
