#![forbid(unsafe_code)]
#![allow(clippy::float_cmp, clippy::indexing_slicing)]

//! Embedding storage and nearest-neighbour search over the `vectors` table.
//!
//! Vectors are stored as little-endian `f32` blobs. Search is an exhaustive
//! cosine scan, which is fine for the size of a single event directory.

use std::io;

use rusqlite::{Connection, params};

use crate::types::{EmbeddingRecord, OwnerType, VectorHit, VectorScore};

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Store an embedding for an owner. Rejects vectors whose length differs from
/// `expected_dim`, since mixed dimensionality makes similarity meaningless.
pub fn store_embedding(
    conn: &Connection,
    owner_type: OwnerType,
    owner_id: &str,
    embedding: &[f32],
    text: &str,
    expected_dim: usize,
    now: i64,
) -> io::Result<i64> {
    if embedding.len() != expected_dim {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "embedding has {} dimensions, directory expects {expected_dim}",
                embedding.len()
            ),
        ));
    }

    conn.execute(
        "INSERT INTO vectors (owner_type, owner_id, embedding, text_content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![owner_type.as_str(), owner_id, encode(embedding), text, now],
    )
    .map_err(|e| io::Error::other(format!("Failed to store embedding: {e}")))?;

    Ok(conn.last_insert_rowid())
}

/// Drop every embedding of one kind for an owner. Used before re-embedding an edited profile.
pub fn delete_embeddings(
    conn: &Connection,
    owner_type: OwnerType,
    owner_id: &str,
) -> io::Result<usize> {
    conn.execute(
        "DELETE FROM vectors WHERE owner_type = ?1 AND owner_id = ?2",
        params![owner_type.as_str(), owner_id],
    )
    .map_err(|e| io::Error::other(format!("Failed to delete embeddings: {e}")))
}

pub fn load_embeddings(conn: &Connection, owner_id: &str) -> io::Result<Vec<EmbeddingRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, owner_type, owner_id, embedding, text_content, created_at
             FROM vectors WHERE owner_id = ?1 ORDER BY id ASC",
        )
        .map_err(|e| io::Error::other(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params![owner_id], |row| {
            let owner_raw: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(3)?;
            Ok(EmbeddingRecord {
                id: row.get(0)?,
                owner_type: OwnerType::parse(&owner_raw).unwrap_or(OwnerType::Note),
                owner_id: row.get(2)?,
                embedding: decode(&bytes),
                text: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| io::Error::other(format!("Failed to query: {e}")))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(io::Error::other)?);
    }
    Ok(results)
}

pub fn count_embeddings(conn: &Connection) -> io::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
        .map_err(io::Error::other)
}

/// Calculate cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`; mismatched or zero-length inputs score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank stored embeddings against `query_embedding`.
///
/// With `min_similarity` set, rows below it are dropped. Results come back
/// highest similarity first, at most `limit` of them.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
    min_similarity: Option<f32>,
) -> io::Result<Vec<VectorHit>> {
    let mut stmt = conn
        .prepare("SELECT owner_type, owner_id, embedding, text_content FROM vectors ORDER BY id")
        .map_err(|e| io::Error::other(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let owner_raw: String = row.get(0)?;
            let owner_id: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(2)?;
            let text: String = row.get(3)?;
            Ok((owner_raw, owner_id, bytes, text))
        })
        .map_err(|e| io::Error::other(format!("Failed to execute query: {e}")))?;

    let mut scored = Vec::new();
    for row in rows {
        let (owner_raw, owner_id, bytes, text) = row.map_err(io::Error::other)?;
        let Some(owner_type) = OwnerType::parse(&owner_raw) else {
            continue;
        };
        let similarity = cosine_similarity(query_embedding, &decode(&bytes));
        if min_similarity.is_some_and(|min| similarity < min) {
            continue;
        }
        scored.push(VectorHit {
            owner_type,
            owner_id,
            text,
            score: VectorScore::Similarity(similarity),
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .relevance()
            .partial_cmp(&a.score.relevance())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    Ok(scored)
}
