//! SQLite schema and raw queries for the memory index.
//!
//! One database file holds everything the local tier needs:
//!
//! ```sql
//! -- Documents seen by the last sync
//! CREATE TABLE files (
//!     path TEXT PRIMARY KEY,          -- vault-relative, forward slashes
//!     abs_path TEXT NOT NULL,
//!     hash TEXT NOT NULL,             -- blake3 hex of the content ('' = needs reindex)
//!     mtime INTEGER NOT NULL,         -- milliseconds since the epoch
//!     size INTEGER NOT NULL,
//!     title TEXT, tags_json TEXT, aliases_json TEXT, para_category TEXT,
//!     indexed_at TIMESTAMP
//! );
//!
//! -- Chunk rows, mirrored into the chunks_fts FTS5 table
//! CREATE TABLE chunks (id TEXT PRIMARY KEY, path, start_line, end_line, hash, text, updated_at);
//! CREATE VIRTUAL TABLE chunks_fts USING fts5(id UNINDEXED, path UNINDEXED, text);
//!
//! -- f16 vectors keyed by chunk id
//! CREATE TABLE chunk_vectors (id TEXT PRIMARY KEY, embedding BLOB, dims INTEGER);
//!
//! -- Content-addressed embedding cache
//! CREATE TABLE embedding_cache (hash, model, embedding, dims, updated_at, PRIMARY KEY (hash, model));
//!
//! -- Key/value facts about the index (embedding model id)
//! CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! If the FTS5 table cannot be created the index still works: keyword search
//! falls back to `LIKE` matching over `chunks.text`.

use crate::storage::{ChunkInfo, ChunkRecord, DocumentRecord, IndexCounts};
use anyhow::{Context, Result};
use half::f16;
use mnemo_context::{DocumentMetadata, ParaCategory};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MODEL_META_KEY: &str = "embedding_model";

#[derive(Clone, Debug)]
pub struct FileIndex {
    db_path: Option<PathBuf>,
    pool: SqlitePool,
    fts_available: bool,
}

impl FileIndex {
    /// Opens (creating if needed) the index database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create index directory {}", parent.display())
                })?;
            }
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .with_context(|| format!("Failed to open index database {}", db_path.display()))?;
        Self::new_with_pool(Some(db_path.to_path_buf()), pool).await
    }

    /// In-memory index for tests. A single long-lived connection keeps the database alive.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(None, pool).await
    }

    async fn new_with_pool(db_path: Option<PathBuf>, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        let fts_available = Self::create_fts_table(&pool).await;
        Ok(Self {
            db_path,
            pool,
            fts_available,
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                abs_path TEXT NOT NULL,
                hash TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                tags_json TEXT NOT NULL DEFAULT '[]',
                aliases_json TEXT NOT NULL DEFAULT '[]',
                para_category TEXT,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                hash TEXT NOT NULL,
                text TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                dims INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                hash TEXT NOT NULL,
                model TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dims INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (hash, model)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_mtime ON files(mtime)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn create_fts_table(pool: &SqlitePool) -> bool {
        let created = sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(id UNINDEXED, path UNINDEXED, text)",
        )
        .execute(pool)
        .await;
        match created {
            Ok(_) => true,
            Err(e) => {
                warn!("FTS5 unavailable, keyword search will use LIKE matching: {}", e);
                false
            }
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn fts_available(&self) -> bool {
        self.fts_available
    }

    /// On-disk location, or `None` for an in-memory index.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // --- documents ---

    pub async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (path, abs_path, hash, mtime, size, title, tags_json, aliases_json, para_category, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
            ON CONFLICT(path) DO UPDATE SET
                abs_path = excluded.abs_path,
                hash = excluded.hash,
                mtime = excluded.mtime,
                size = excluded.size,
                title = excluded.title,
                tags_json = excluded.tags_json,
                aliases_json = excluded.aliases_json,
                para_category = excluded.para_category,
                indexed_at = datetime('now')
            "#,
        )
        .bind(&doc.path)
        .bind(&doc.abs_path)
        .bind(&doc.hash)
        .bind(doc.mtime)
        .bind(doc.size as i64)
        .bind(&doc.metadata.title)
        .bind(serde_json::to_string(&doc.metadata.tags)?)
        .bind(serde_json::to_string(&doc.metadata.aliases)?)
        .bind(doc.metadata.category.map(|c| c.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_document(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clears a document's stored hash so the next sync treats it as modified.
    pub async fn mark_document_stale(&self, path: &str) -> Result<()> {
        sqlx::query("UPDATE files SET hash = '' WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT path, abs_path, hash, mtime, size, title, tags_json, aliases_json, para_category
             FROM files ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let tags_json: String = row.get("tags_json");
            let aliases_json: String = row.get("aliases_json");
            let category: Option<String> = row.get("para_category");
            let size: i64 = row.get("size");
            documents.push(DocumentRecord {
                path: row.get("path"),
                abs_path: row.get("abs_path"),
                hash: row.get("hash"),
                mtime: row.get("mtime"),
                size: size.max(0) as u64,
                metadata: DocumentMetadata {
                    title: row.get("title"),
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
                    category: category.and_then(|c| c.parse::<ParaCategory>().ok()),
                },
            });
        }
        Ok(documents)
    }

    // --- chunks and keyword search ---

    /// Replaces a chunk row and its FTS entry in one transaction.
    pub async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO chunks (id, path, start_line, end_line, hash, text, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.path)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .bind(&chunk.hash)
        .bind(&chunk.text)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if self.fts_available {
            sqlx::query("DELETE FROM chunks_fts WHERE id = ?1")
                .bind(&chunk.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO chunks_fts (id, path, text) VALUES (?1, ?2, ?3)")
                .bind(&chunk.id)
                .bind(&chunk.path)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Deletes every chunk of `path` from both the chunk table and the FTS table.
    pub async fn delete_chunks_for_path(&self, path: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM chunks WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        if self.fts_available {
            sqlx::query("DELETE FROM chunks_fts WHERE path = ?1")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(result.rows_affected() as usize)
    }

    /// Keyword search. Returns best-first `(id, score)` with higher scores more relevant.
    pub async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if self.fts_available {
            self.search_fts(&terms, limit).await
        } else {
            self.search_like(&terms, limit).await
        }
    }

    async fn search_fts(&self, terms: &[String], limit: usize) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, bm25(chunks_fts) AS rank
            FROM chunks_fts
            WHERE chunks_fts MATCH ?1
            ORDER BY rank ASC, rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(fts_match_expression(terms))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // bm25() is negative with lower meaning better; flip it so callers see higher-is-better.
        Ok(rows
            .into_iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                (row.get("id"), -rank)
            })
            .collect())
    }

    async fn search_like(&self, terms: &[String], limit: usize) -> Result<Vec<(String, f64)>> {
        let clause = terms
            .iter()
            .enumerate()
            .map(|(i, _)| format!("text LIKE ?{} ESCAPE '\\'", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT id FROM chunks WHERE {clause} ORDER BY rowid ASC LIMIT ?{}",
            terms.len() + 1
        );

        let mut query = sqlx::query(&sql);
        for term in terms {
            query = query.bind(format!("%{}%", escape_like(term)));
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        // Substring matches carry no relevance signal; order alone ranks them.
        Ok(rows.into_iter().map(|row| (row.get("id"), 0.0)).collect())
    }

    pub async fn get_chunks(&self, ids: &[String]) -> Result<HashMap<String, ChunkRecord>> {
        let mut chunks = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(chunks);
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, path, start_line, end_line, hash, text FROM chunks WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        for row in query.fetch_all(&self.pool).await? {
            let chunk = chunk_from_row(&row);
            chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(chunks)
    }

    pub async fn first_chunk(&self, path: &str) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            "SELECT id, path, start_line, end_line, hash, text FROM chunks
             WHERE path = ?1 ORDER BY start_line ASC LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(chunk_from_row))
    }

    pub async fn chunk_hashes(&self, path: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT id, hash FROM chunks WHERE path = ?1")
            .bind(path)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("hash")))
            .collect())
    }

    pub async fn list_chunks(&self, path_prefix: Option<&str>, limit: usize) -> Result<Vec<ChunkInfo>> {
        let pattern = format!("{}%", escape_like(path_prefix.unwrap_or("")));
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.path, c.start_line, c.end_line, c.hash, v.id IS NOT NULL AS has_vector
            FROM chunks c LEFT JOIN chunk_vectors v ON v.id = c.id
            WHERE c.path LIKE ?1 ESCAPE '\'
            ORDER BY c.path, c.start_line
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let start_line: i64 = row.get("start_line");
                let end_line: i64 = row.get("end_line");
                let has_vector: i64 = row.get("has_vector");
                ChunkInfo {
                    id: row.get("id"),
                    path: row.get("path"),
                    start_line: start_line as usize,
                    end_line: end_line as usize,
                    hash: row.get("hash"),
                    has_vector: has_vector != 0,
                }
            })
            .collect())
    }

    pub async fn counts(&self) -> Result<IndexCounts> {
        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(IndexCounts {
            files: files as usize,
            chunks: chunks as usize,
            vectors: vectors as usize,
        })
    }

    // --- vectors ---

    pub async fn upsert_vector(&self, id: &str, vector: &[f16]) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO chunk_vectors (id, embedding, dims) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(bytemuck::cast_slice::<f16, u8>(vector))
            .bind(vector.len() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_vector(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn all_vectors(&self) -> Result<Vec<(String, Vec<f16>)>> {
        let rows = sqlx::query("SELECT id, embedding FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                (row.get("id"), decode_vector(&bytes))
            })
            .collect())
    }

    pub async fn vector_dimensions(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunk_vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }

    // --- embedding cache ---

    pub async fn cache_get(&self, hash: &str, model: &str) -> Result<Option<Vec<f16>>> {
        let bytes: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT embedding FROM embedding_cache WHERE hash = ?1 AND model = ?2")
                .bind(hash)
                .bind(model)
                .fetch_optional(&self.pool)
                .await?;
        Ok(bytes.map(|b| decode_vector(&b)))
    }

    pub async fn cache_put(&self, hash: &str, model: &str, vector: &[f16]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embedding_cache (hash, model, embedding, dims, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(hash, model) DO NOTHING
            "#,
        )
        .bind(hash)
        .bind(model)
        .bind(bytemuck::cast_slice::<f16, u8>(vector))
        .bind(vector.len() as i64)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cache_len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embedding_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    // --- meta ---

    /// Records `model` as the index's embedding model. Returns true when a different
    /// model was recorded before, in which case stored vectors have been dropped.
    pub async fn ensure_embedding_model(&self, model: &str) -> Result<bool> {
        let previous: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?1")
            .bind(MODEL_META_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let changed = previous.as_deref().is_some_and(|p| p != model);
        let mut tx = self.pool.begin().await?;
        if changed {
            let dropped = sqlx::query("DELETE FROM chunk_vectors")
                .execute(&mut *tx)
                .await?;
            debug!(
                "Dropped {} vectors built with {:?}",
                dropped.rows_affected(),
                previous
            );
        }
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")
            .bind(MODEL_META_KEY)
            .bind(model)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(changed)
    }

    /// Cheap connectivity check.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
    let start_line: i64 = row.get("start_line");
    let end_line: i64 = row.get("end_line");
    ChunkRecord {
        id: row.get("id"),
        path: row.get("path"),
        start_line: start_line as usize,
        end_line: end_line as usize,
        hash: row.get("hash"),
        text: row.get("text"),
    }
}

fn decode_vector(bytes: &[u8]) -> Vec<f16> {
    // The BLOB buffer carries no alignment guarantee for u16, so no cast_slice here.
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Word terms of a query: maximal runs of alphanumerics and underscores.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// FTS5 MATCH expression requiring every term. Terms are quoted so that operator
/// words and punctuation in user input are taken literally.
pub fn fts_match_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: &str, path: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            path: path.to_string(),
            start_line: 1,
            end_line: 1,
            hash: mnemo_context::content_hash(text),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_query_terms_and_match_expression() {
        let terms = query_terms("sky is  \"blue\" OR-not");
        assert_eq!(terms, vec!["sky", "is", "blue", "OR", "not"]);
        assert_eq!(
            fts_match_expression(&terms[..2]),
            "\"sky\" AND \"is\""
        );
        assert!(query_terms("  ?! ").is_empty());
    }

    #[tokio::test]
    async fn test_fts_search_orders_and_limits() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        assert!(index.fts_available());

        index.upsert_chunk(&chunk("a", "sky.md", "the sky is blue")).await?;
        index.upsert_chunk(&chunk("b", "sea.md", "the sea is blue and the sky is grey")).await?;
        index.upsert_chunk(&chunk("c", "tax.md", "quarterly filing")).await?;

        let hits = index.search_text("sky blue", 10).await?;
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"b"));
        assert!(hits[0].1 >= hits[1].1);

        assert_eq!(index.search_text("sky blue", 1).await?.len(), 1);
        assert!(index.search_text("nothing here", 10).await?.is_empty());
        assert!(index.search_text("", 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_chunks_for_path_clears_fts() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        index.upsert_chunk(&chunk("a", "sky.md", "the sky is blue")).await?;
        index.upsert_chunk(&chunk("a2", "sky.md", "clouds over the sky")).await?;

        assert_eq!(index.delete_chunks_for_path("sky.md").await?, 2);
        assert!(index.search_text("sky", 10).await?.is_empty());
        assert_eq!(index.counts().await?.chunks, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_chunk_replaces_fts_row() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        index.upsert_chunk(&chunk("a", "sky.md", "the sky is blue")).await?;
        index.upsert_chunk(&chunk("a", "sky.md", "the sky is red")).await?;

        assert!(index.search_text("blue", 10).await?.is_empty());
        assert_eq!(index.search_text("red", 10).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_vectors_cache_and_model_change() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        let v = vec![f16::from_f32(0.6), f16::from_f32(0.8)];

        index.upsert_vector("a", &v).await?;
        assert_eq!(index.vector_dimensions().await?, Some(2));
        assert_eq!(index.all_vectors().await?, vec![("a".to_string(), v.clone())]);

        index.cache_put("h", "m1", &v).await?;
        index.cache_put("h", "m1", &[f16::ZERO, f16::ZERO]).await?;
        assert_eq!(index.cache_get("h", "m1").await?, Some(v.clone()));
        assert_eq!(index.cache_get("h", "m2").await?, None);
        assert_eq!(index.cache_len().await?, 1);

        assert!(!index.ensure_embedding_model("m1").await?);
        assert!(!index.ensure_embedding_model("m1").await?);
        assert!(index.ensure_embedding_model("m2").await?);
        assert_eq!(index.counts().await?.vectors, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_documents_roundtrip_and_stale_marking() -> Result<()> {
        let temp_dir = tempdir()?;
        let index = FileIndex::open(&temp_dir.path().join(".mnemo").join("index.db")).await?;
        index.ping().await?;

        let doc = DocumentRecord {
            path: "Projects/sky.md".to_string(),
            abs_path: temp_dir.path().join("Projects/sky.md").display().to_string(),
            hash: "abc".to_string(),
            mtime: 1_700_000_000_000,
            size: 15,
            metadata: DocumentMetadata {
                title: "Sky".to_string(),
                tags: vec!["weather".to_string()],
                aliases: vec!["heavens".to_string()],
                category: Some(ParaCategory::Projects),
            },
        };
        index.upsert_document(&doc).await?;
        assert_eq!(index.list_documents().await?, vec![doc.clone()]);

        index.mark_document_stale(&doc.path).await?;
        assert_eq!(index.list_documents().await?[0].hash, "");

        index.delete_document(&doc.path).await?;
        assert!(index.list_documents().await?.is_empty());
        Ok(())
    }
}
