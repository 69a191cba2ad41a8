//! SQLite-backed vector store with named collections.
//!
//! Each row keeps the document text, a JSON metadata object and the
//! embedding as a little-endian f32 blob. Queries score every row of a
//! collection by cosine similarity; the collections here hold a few
//! thousand rows at most.

use std::path::Path;

use rusqlite::{params, Connection};
use serde::Serialize;

use super::embedding::cosine_similarity;
use super::errors::KnowledgeError;

// ─── Records ────────────────────────────────────────────────────────────────

/// A document to insert.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

/// A scored query hit.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

impl Hit {
    /// String metadata field, or `""`.
    pub fn meta_str(&self, key: &str) -> &str {
        self.metadata.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }
}

// ─── VectorStore ────────────────────────────────────────────────────────────

pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, KnowledgeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// In-memory store (tests).
    pub fn open_in_memory() -> Result<Self, KnowledgeError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, KnowledgeError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embeddings (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            );
            ",
        )?;
        Ok(Self { conn })
    }

    pub fn count(&self, collection: &str) -> Result<usize, KnowledgeError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Insert records; ids already present are left untouched.
    pub fn add(&mut self, collection: &str, records: &[Record]) -> Result<usize, KnowledgeError> {
        self.write(
            "INSERT OR IGNORE INTO embeddings (collection, id, document, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            collection,
            records,
        )
    }

    /// Insert or replace records by id.
    pub fn upsert(&mut self, collection: &str, records: &[Record]) -> Result<usize, KnowledgeError> {
        self.write(
            "INSERT INTO embeddings (collection, id, document, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, id) DO UPDATE SET
                document = excluded.document,
                metadata = excluded.metadata,
                embedding = excluded.embedding",
            collection,
            records,
        )
    }

    fn write(&mut self, sql: &str, collection: &str, records: &[Record]) -> Result<usize, KnowledgeError> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for record in records {
                let metadata = serde_json::to_string(&record.metadata)?;
                written += stmt.execute(params![
                    collection,
                    record.id,
                    record.document,
                    metadata,
                    encode_embedding(&record.embedding),
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// The `top_k` rows of `collection` most similar to `embedding`.
    pub fn query(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<Hit>, KnowledgeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, document, metadata, embedding FROM embeddings WHERE collection = ?1")?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, document, metadata, blob) = row?;
            let score = cosine_similarity(embedding, &decode_embedding(&blob));
            hits.push(Hit {
                id,
                document,
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                score,
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
