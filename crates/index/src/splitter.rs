//! Recursive character splitting with overlap.
//!
//! The text is split on the first separator in the list that occurs in it;
//! pieces still longer than the chunk size are split again with the
//! remaining separators.  Small pieces are then merged back into chunks of
//! at most `chunk_size` characters, each new chunk starting with up to
//! `chunk_overlap` characters carried over from the end of the previous one.
//! Separators stay attached to the start of the piece that follows them.

use anyhow::{Result, bail};

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        if chunk_overlap >= chunk_size {
            bail!("chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})");
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut small)));
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(small));
        }
        chunks
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<String> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(&front),
                        None => break,
                    }
                }
            }
            total += len;
            window.push_back(piece);
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &std::collections::VecDeque<String>) {
    let joined: String = window.iter().map(String::as_str).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out = Vec::new();
    if let Some(first) = parts.next() {
        out.push(first.to_string());
    }
    out.extend(parts.map(|part| format!("{separator}{part}")));
    out.retain(|part| !part.is_empty());
    out
}
