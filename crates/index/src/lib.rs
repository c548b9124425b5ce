//! Ephemeral knowledge indices: one small vector index per answered
//! question, built from the query and its result table.

pub mod arena;
pub mod embedder;
pub mod splitter;
pub mod vector;

pub use arena::{IndexArena, IndexLease};
pub use embedder::{Embedder, HashingEmbedder, OllamaEmbedder, cosine_similarity};
pub use splitter::{DEFAULT_SEPARATORS, RecursiveSplitter};
pub use vector::{INDEX_FILE, ScoredChunk, StoredChunk, VectorIndex};
