//! Result set → per-request knowledge index.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use sqlsage_index::{Embedder, RecursiveSplitter, VectorIndex};

use crate::database::ResultSet;

/// The single document indexed for one answer: the query that ran and its
/// result table.
pub fn render_document(result: &ResultSet) -> String {
    format!(
        "SQL Query:\n{}\n\nQuery Results:\n{}",
        result.query.trim(),
        result.to_text_table()
    )
}

#[derive(Clone)]
pub struct Indexer {
    splitter: RecursiveSplitter,
    embedder: Arc<dyn Embedder>,
}

impl Indexer {
    pub fn new(splitter: RecursiveSplitter, embedder: Arc<dyn Embedder>) -> Self {
        Self { splitter, embedder }
    }

    /// Build a fresh index for `result` at `path`, replacing anything there.
    #[instrument(skip_all, fields(rows = result.row_count(), path = %path.display()))]
    pub async fn build(&self, result: &ResultSet, path: &Path) -> Result<VectorIndex> {
        let document = render_document(result);
        VectorIndex::build(&document, &self.splitter, self.embedder.as_ref(), path).await
    }
}

#[cfg(test)]
mod tests {
    use sqlsage_index::HashingEmbedder;

    use super::*;
    use crate::database::CellValue;

    fn result(query: &str, name: &str, total: i64) -> ResultSet {
        ResultSet {
            query: query.into(),
            columns: vec!["customer".into(), "total".into()],
            rows: vec![vec![CellValue::Text(name.into()), CellValue::Int(total)]],
        }
    }

    #[test]
    fn document_has_query_and_results_blocks() {
        let doc = render_document(&result("SELECT customer, total FROM t", "Alice", 120));
        assert_eq!(
            doc,
            "SQL Query:\nSELECT customer, total FROM t\n\nQuery Results:\ncustomer  total\nAlice       120"
        );
    }

    #[tokio::test]
    async fn rebuild_at_same_path_shows_only_latest_result() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let indexer = Indexer::new(RecursiveSplitter::new(500, 200).unwrap(), embedder.clone());

        indexer
            .build(&result("SELECT customer, total FROM big_spenders", "Zelda", 999), dir.path())
            .await
            .unwrap();
        indexer
            .build(&result("SELECT customer, total FROM small_spenders", "Milo", 3), dir.path())
            .await
            .unwrap();

        let index = VectorIndex::load(dir.path(), embedder.as_ref()).await.unwrap();
        let hits = index
            .retrieve(embedder.as_ref(), "Zelda big spenders 999", 10)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        for hit in hits {
            assert!(!hit.text.contains("Zelda"));
            assert!(!hit.text.contains("big_spenders"));
            assert!(hit.text.contains("Milo"));
        }
    }
}
