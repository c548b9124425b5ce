//! Flat vector index persisted as a single JSON file.
//!
//! Indices are built from exactly one document and are never updated in
//! place: [`VectorIndex::build`] wipes the target directory and writes a
//! fresh `index.json` through a temporary file and a rename, so a reader
//! either sees a complete index or none at all.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::embedder::{Embedder, cosine_similarity};
use crate::splitter::RecursiveSplitter;

pub const INDEX_FILE: &str = "index.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    embedder: String,
    dimensions: usize,
    chunks: Vec<StoredChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dir: PathBuf,
    embedder: String,
    dimensions: usize,
    chunks: Vec<StoredChunk>,
}

impl VectorIndex {
    /// Chunk, embed and persist `document` at `dir`, replacing whatever was
    /// there.
    #[instrument(skip(document, splitter, embedder), fields(dir = %dir.display(), chars = document.len()))]
    pub async fn build(
        document: &str,
        splitter: &RecursiveSplitter,
        embedder: &dyn Embedder,
        dir: &Path,
    ) -> Result<Self> {
        let texts = splitter.split(document);
        if texts.is_empty() {
            bail!("document produced no chunks to index");
        }
        let vectors = embedder
            .embed_all(&texts)
            .await
            .with_context(|| format!("embedding {} chunks with {}", texts.len(), embedder.id()))?;
        if vectors.len() != texts.len() {
            bail!("embedder returned {} vectors for {} chunks", vectors.len(), texts.len());
        }

        let dimensions = embedder.dimensions();
        let chunks: Vec<StoredChunk> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| StoredChunk { text, vector })
            .collect();
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dimensions) {
            bail!("chunk vector has {} dimensions, expected {dimensions}", bad.vector.len());
        }

        let index = Self {
            dir: dir.to_path_buf(),
            embedder: embedder.id(),
            dimensions,
            chunks,
        };
        index.persist().await?;
        info!(chunks = index.chunks.len(), "index built");
        Ok(index)
    }

    async fn persist(&self) -> Result<()> {
        if fs::try_exists(&self.dir).await.unwrap_or(false) {
            fs::remove_dir_all(&self.dir)
                .await
                .with_context(|| format!("clear index dir {}", self.dir.display()))?;
        }
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create index dir {}", self.dir.display()))?;

        let file = IndexFile {
            version: FORMAT_VERSION,
            embedder: self.embedder.clone(),
            dimensions: self.dimensions,
            chunks: self.chunks.clone(),
        };
        let json = serde_json::to_vec(&file).context("serialize index")?;
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        let path = self.dir.join(INDEX_FILE);
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Read an index written by [`build`](Self::build).  The file must have
    /// been produced by the same embedder with the same dimensionality.
    pub async fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let raw = fs::read(&path)
            .await
            .with_context(|| format!("read index {}", path.display()))?;
        let file: IndexFile =
            serde_json::from_slice(&raw).with_context(|| format!("parse index {}", path.display()))?;

        if file.version != FORMAT_VERSION {
            bail!("unsupported index format version {}", file.version);
        }
        if file.embedder != embedder.id() {
            bail!("index built with {}, cannot query it with {}", file.embedder, embedder.id());
        }
        if file.dimensions != embedder.dimensions()
            || file.chunks.iter().any(|c| c.vector.len() != file.dimensions)
        {
            bail!("index dimensions do not match embedder ({})", embedder.dimensions());
        }
        debug!(chunks = file.chunks.len(), dir = %dir.display(), "index loaded");

        Ok(Self {
            dir: dir.to_path_buf(),
            embedder: file.embedder,
            dimensions: file.dimensions,
            chunks: file.chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[StoredChunk] {
        &self.chunks
    }

    /// The `k` chunks most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                text: chunk.text.clone(),
                score: cosine_similarity(&chunk.vector, query),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Embed `question` and return the top-`k` chunks.
    pub async fn retrieve(
        &self,
        embedder: &dyn Embedder,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query = embedder.embed(question).await.context("embedding question")?;
        Ok(self.search(&query, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn splitter() -> RecursiveSplitter {
        RecursiveSplitter::new(60, 20).unwrap()
    }

    #[tokio::test]
    async fn build_then_load_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(128);
        let document = "SQL Query:\nSELECT name, total FROM orders\n\nQuery Results:\n\
                        alice 120\nbob 75\n\ncarol has no orders at all this quarter";

        let built = VectorIndex::build(document, &splitter(), &embedder, dir.path())
            .await
            .unwrap();
        assert!(built.len() > 1);
        assert!(dir.path().join(INDEX_FILE).exists());
        assert!(!dir.path().join("index.json.tmp").exists());

        let loaded = VectorIndex::load(dir.path(), &embedder).await.unwrap();
        assert_eq!(loaded.chunks(), built.chunks());

        let hits = loaded.retrieve(&embedder, "does carol have orders", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("carol"));
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(64);
        std::fs::write(dir.path().join("stale.bin"), b"old").unwrap();

        VectorIndex::build("first result: 1", &splitter(), &embedder, dir.path())
            .await
            .unwrap();
        assert!(!dir.path().join("stale.bin").exists());

        VectorIndex::build("second result: 2", &splitter(), &embedder, dir.path())
            .await
            .unwrap();
        let loaded = VectorIndex::load(dir.path(), &embedder).await.unwrap();
        let all: Vec<_> = loaded.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(all, ["second result: 2"]);
    }

    #[tokio::test]
    async fn load_rejects_other_embedders() {
        let dir = tempfile::tempdir().unwrap();
        VectorIndex::build("x y z", &splitter(), &HashingEmbedder::new(32), dir.path())
            .await
            .unwrap();
        let err = VectorIndex::load(dir.path(), &HashingEmbedder::new(16))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("hashing:32"));
    }

    #[tokio::test]
    async fn empty_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = VectorIndex::build("  ", &splitter(), &HashingEmbedder::new(8), dir.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn search_caps_at_k_and_orders_by_score() {
        let index = VectorIndex {
            dir: PathBuf::from("unused"),
            embedder: "test".into(),
            dimensions: 2,
            chunks: vec![
                StoredChunk { text: "a".into(), vector: vec![1.0, 0.0] },
                StoredChunk { text: "b".into(), vector: vec![0.0, 1.0] },
                StoredChunk { text: "c".into(), vector: vec![0.7, 0.7] },
            ],
        };
        let hits = index.search(&[1.0, 0.1], 2);
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["a", "c"]);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 3);
    }
}
