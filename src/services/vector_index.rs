//! Per-project persistent vector index backed by SQLite.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::IndexError;
use crate::models::{DocumentId, IndexEntry, IndexHit, compare_scores_desc};

pub const INDEX_FILE_NAME: &str = "index.sqlite";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    section TEXT,
    text TEXT NOT NULL,
    begin_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_document ON entries(document_id);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// An open vector index.
///
/// Entries are stored with their embedding as little-endian `f32`s and searched
/// by exhaustive dot product, which is cosine similarity for unit vectors.
pub struct VectorIndex {
    conn: Connection,
    path: PathBuf,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Open the index in `dir`, creating the directory and schema if missing.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE_NAME);

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        let dimension = conn
            .query_row("SELECT value FROM meta WHERE key = 'dimension'", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .and_then(|v| v.parse().ok());

        Ok(Self {
            conn,
            path,
            dimension,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embedding dimension, fixed by the first stored entry.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Distinct document ids with at least one stored entry.
    pub fn document_ids(&self) -> Result<BTreeSet<DocumentId>, IndexError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT document_id FROM entries")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(DocumentId))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    /// Append entries in a single transaction.
    pub fn add(&mut self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }

        let expected = self.dimension.unwrap_or(entries[0].embedding.len());
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entries (document_id, section, text, begin_offset, end_offset, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.document_id.0,
                    entry.section,
                    entry.text,
                    entry.begin as i64,
                    entry.end as i64,
                    encode_embedding(&entry.embedding),
                    now,
                ])?;
            }
            if self.dimension.is_none() {
                tx.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('dimension', ?1)",
                    params![expected.to_string()],
                )?;
            }
        }
        tx.commit()?;

        self.dimension = Some(expected);
        Ok(())
    }

    /// Remove every entry of a document, returning how many were removed.
    ///
    /// Removing the last entry forgets the dimension, so the next add may
    /// come from a different embedding model.
    pub fn delete_document(&mut self, document_id: DocumentId) -> Result<usize, IndexError> {
        let removed = self.conn.execute(
            "DELETE FROM entries WHERE document_id = ?1",
            params![document_id.0],
        )?;
        if removed > 0 && self.is_empty()? {
            self.conn
                .execute("DELETE FROM meta WHERE key = 'dimension'", [])?;
            self.dimension = None;
        }
        Ok(removed)
    }

    /// The `k` entries most similar to `query`.
    ///
    /// Equal scores are ordered by document id, then begin offset.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        match self.dimension {
            Some(expected) if expected != query.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
            _ => {}
        }

        let mut stmt = self.conn.prepare(
            "SELECT document_id, section, text, begin_offset, end_offset, embedding FROM entries",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(5)?;
            Ok(IndexHit {
                document_id: DocumentId(row.get(0)?),
                section: row.get(1)?,
                text: row.get(2)?,
                begin: row.get::<_, i64>(3)? as usize,
                end: row.get::<_, i64>(4)? as usize,
                score: dot(query, &decode_embedding(&blob)),
            })
        })?;

        let mut hits = rows.collect::<Result<Vec<_>, _>>()?;
        hits.sort_by(|a, b| {
            compare_scores_desc(a.score, b.score)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.begin.cmp(&b.begin))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Make all prior writes durable and record the commit time.
    pub fn commit(&mut self) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_commit', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn last_commit(&self) -> Result<Option<String>, IndexError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_commit'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(doc: i64, begin: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            embedding,
            text: format!("text {doc}@{begin}"),
            section: None,
            document_id: DocumentId(doc),
            begin,
            end: begin + 10,
        }
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("projects").join("3");
        let index = VectorIndex::open(&nested).unwrap();

        assert!(nested.join(INDEX_FILE_NAME).exists());
        assert!(index.is_empty().unwrap());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_add_delete_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::open(dir.path()).unwrap();

        index
            .add(&[
                entry(1, 0, vec![1.0, 0.0]),
                entry(1, 10, vec![0.0, 1.0]),
                entry(2, 0, vec![1.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(index.len().unwrap(), 3);
        assert_eq!(
            index.document_ids().unwrap(),
            BTreeSet::from([DocumentId(1), DocumentId(2)])
        );

        assert_eq!(index.delete_document(DocumentId(1)).unwrap(), 2);
        assert_eq!(index.delete_document(DocumentId(1)).unwrap(), 0);
        assert_eq!(index.document_ids().unwrap(), BTreeSet::from([DocumentId(2)]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::open(dir.path()).unwrap();
        index.add(&[entry(1, 0, vec![1.0, 0.0])]).unwrap();

        let err = index.add(&[entry(2, 0, vec![1.0, 0.0, 0.0])]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(index.search(&[1.0], 5).is_err());
    }

    #[test]
    fn test_emptied_index_accepts_new_dimension() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = VectorIndex::open(dir.path()).unwrap();
            index.add(&[entry(1, 0, vec![1.0, 0.0]), entry(2, 0, vec![0.0, 1.0])]).unwrap();

            index.delete_document(DocumentId(1)).unwrap();
            assert_eq!(index.dimension(), Some(2));
            index.delete_document(DocumentId(2)).unwrap();
            assert_eq!(index.dimension(), None);
        }

        let mut index = VectorIndex::open(dir.path()).unwrap();
        assert_eq!(index.dimension(), None);
        index.add(&[entry(3, 0, vec![0.0, 0.0, 1.0])]).unwrap();
        assert_eq!(index.dimension(), Some(3));
        assert_eq!(index.search(&[0.0, 0.0, 1.0], 1).unwrap()[0].document_id, DocumentId(3));
    }

    #[test]
    fn test_search_orders_by_score_then_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::open(dir.path()).unwrap();
        index
            .add(&[
                entry(3, 0, vec![0.6, 0.8]),
                entry(2, 20, vec![1.0, 0.0]),
                entry(2, 5, vec![1.0, 0.0]),
                entry(1, 0, vec![0.0, 1.0]),
            ])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!((hits[0].document_id, hits[0].begin), (DocumentId(2), 5));
        assert_eq!((hits[1].document_id, hits[1].begin), (DocumentId(2), 20));
        assert_eq!(hits[2].document_id, DocumentId(3));
        assert!((hits[2].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = VectorIndex::open(dir.path()).unwrap();
            index.add(&[entry(9, 0, vec![0.0, 1.0])]).unwrap();
            index.commit().unwrap();
            assert!(index.last_commit().unwrap().is_some());
        }

        let index = VectorIndex::open(dir.path()).unwrap();
        assert_eq!(index.len().unwrap(), 1);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.search(&[0.0, 1.0], 1).unwrap()[0].document_id, DocumentId(9));
    }

    #[test]
    fn test_embedding_encoding() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }
}
