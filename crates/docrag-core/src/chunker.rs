//! Recursive character chunking with overlap.
//!
//! Separators are tried coarsest first. The first one present in the text is
//! used to cut it into pieces (each piece keeps the separator it starts with);
//! pieces shorter than `chunk_size` are merged greedily into chunks, longer ones
//! are split again with the finer separators. The empty separator cuts between
//! characters and is always last, so every chunk respects the bound.
//!
//! When a chunk is emitted, pieces are dropped from the front of the merge
//! window until at most `chunk_overlap` characters remain; those become the
//! start of the next chunk. All lengths are in characters.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Chunk;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 50,
            separators: ["\n\n", "\n", ". ", " ", ""].iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_valid(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ConfigError> {
        if config.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: ChunkerConfig) -> Self {
        let mut separators: Vec<String> = config.separators.into_iter().filter(|s| !s.is_empty()).collect();
        separators.push(String::new());
        Self { chunk_size: config.chunk_size, chunk_overlap: config.chunk_overlap, separators }
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    /// Split `text` into ordered chunks. Empty or whitespace-only input yields none.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.split(text, &self.separators)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect()
    }

    fn split(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() { break; }
            if text.contains(s.as_str()) {
                separator = s;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &concat(&window));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some((_, dropped)) = window.pop_front() else { break };
                    total -= dropped;
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        if !window.is_empty() {
            push_trimmed(&mut chunks, &concat(&window));
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn concat(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(s, _)| *s).collect()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() { chunks.push(trimmed.to_string()); }
}

/// Split on `separator`, keeping each occurrence at the start of the piece that
/// follows it. The empty separator splits into single characters.
fn split_keep_start<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(separator) {
        if idx > start { pieces.push(&text[start..idx]); }
        start = idx;
    }
    if start < text.len() { pieces.push(&text[start..]); }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(split_keep_start("a. b. c", ". "), vec!["a", ". b", ". c"]);
        assert_eq!(split_keep_start("\n\nx", "\n\n"), vec!["\n\nx"]);
        assert_eq!(split_keep_start("héllo", ""), vec!["h", "é", "l", "l", "o"]);
    }

    #[test]
    fn empty_separator_is_always_last() {
        let chunker = Chunker::new(ChunkerConfig { chunk_size: 10, chunk_overlap: 2, separators: vec!["\n".into()] }).expect("valid");
        assert_eq!(chunker.separators, vec!["\n".to_string(), String::new()]);
    }
}
