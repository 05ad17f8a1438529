//! Chunked object CRUD.
//!
//! An object is an ordered sequence of rows carrying at most [`CHUNK_SIZE`]
//! bytes each. Chunk 0 carries the full metadata plus the denormalised
//! `depth`/`parent` listing columns; later chunks carry only bytes with
//! zeroed metadata so the filtered indexes stay compact.

use chrono::Utc;
use md5::{Digest, Md5};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, keys, parse_ts, StoreError, CHUNK_SIZE};
use crate::types::ObjectMeta;

/// Store a whole object, replacing any previous object at the same key.
/// Delete-then-insert inside one transaction is the atomicity primitive:
/// a concurrent reader sees either the prior object or the new one.
pub fn put_object(
    conn: &mut Connection,
    bucket: &str,
    key: &str,
    data: &[u8],
    content_type: &str,
) -> Result<ObjectMeta, StoreError> {
    let etag = hex::encode(Md5::digest(data));
    let now = Utc::now();

    let tx = conn.transaction()?;
    delete_rows(&tx, bucket, key)?;
    insert_chunks(&tx, bucket, key, data, &etag, &format_ts(now), content_type)?;
    tx.commit()?;

    Ok(ObjectMeta {
        size: data.len() as u64,
        etag,
        last_modified: now,
        content_type: content_type.to_string(),
    })
}

/// Insert the chunk rows for one object. Callers delete prior rows first.
fn insert_chunks(
    conn: &Connection,
    bucket: &str,
    key: &str,
    data: &[u8],
    etag: &str,
    last_modified: &str,
    content_type: &str,
) -> Result<(), StoreError> {
    let head = &data[..data.len().min(CHUNK_SIZE)];
    conn.execute(
        "INSERT INTO objects
             (bucket, key, chunk_index, size, etag, last_modified, content_type, data, depth, parent)
         VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?)",
        params![
            bucket,
            key,
            data.len() as i64,
            etag,
            last_modified,
            content_type,
            head,
            keys::depth(key),
            keys::parent(key),
        ],
    )?;

    let mut chunk_index = 1i64;
    let mut offset = CHUNK_SIZE;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        conn.execute(
            "INSERT INTO objects (bucket, key, chunk_index, data) VALUES (?, ?, ?, ?)",
            params![bucket, key, chunk_index, &data[offset..end]],
        )?;
        chunk_index += 1;
        offset = end;
    }

    Ok(())
}

/// Read the chunk-0 metadata, or `None` when the key does not exist.
pub fn get_meta(
    conn: &Connection,
    bucket: &str,
    key: &str,
) -> Result<Option<ObjectMeta>, StoreError> {
    let row = conn
        .query_row(
            "SELECT size, etag, last_modified, content_type FROM objects
             WHERE bucket = ? AND key = ? AND chunk_index = 0",
            params![bucket, key],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((size, etag, last_modified, content_type)) => Ok(Some(ObjectMeta {
            size: size as u64,
            etag,
            last_modified: parse_ts(&last_modified)?,
            content_type,
        })),
    }
}

/// Read metadata and the full body, concatenating chunks in index order.
pub fn get_object(
    conn: &Connection,
    bucket: &str,
    key: &str,
) -> Result<Option<(ObjectMeta, Vec<u8>)>, StoreError> {
    let Some(meta) = get_meta(conn, bucket, key)? else {
        return Ok(None);
    };

    let mut body = Vec::with_capacity(meta.size as usize);
    let mut stmt = conn.prepare(
        "SELECT data FROM objects WHERE bucket = ? AND key = ? ORDER BY chunk_index",
    )?;
    let chunks = stmt.query_map(params![bucket, key], |row| row.get::<_, Vec<u8>>(0))?;
    for chunk in chunks {
        body.extend_from_slice(&chunk?);
    }

    Ok(Some((meta, body)))
}

/// Delete every row of an object. Returns the number of rows removed;
/// deleting an absent key is not an error.
pub fn delete_object(conn: &Connection, bucket: &str, key: &str) -> Result<usize, StoreError> {
    Ok(delete_rows(conn, bucket, key)?)
}

fn delete_rows(conn: &Connection, bucket: &str, key: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM objects WHERE bucket = ? AND key = ?",
        params![bucket, key],
    )
}

/// Copy a whole object within the bucket, chunk by chunk. The destination
/// gets a fresh `last_modified` and its own `depth`/`parent`; `size`,
/// `etag` and `content_type` carry over from the source. Returns `None`
/// when the source does not exist.
///
/// Chunks are buffered before the destination is replaced so that copying
/// a key onto itself cannot lose the object.
pub fn copy_object(
    conn: &mut Connection,
    bucket: &str,
    src_key: &str,
    dst_key: &str,
) -> Result<Option<ObjectMeta>, StoreError> {
    let Some(src_meta) = get_meta(conn, bucket, src_key)? else {
        return Ok(None);
    };

    let chunks: Vec<Vec<u8>> = {
        let mut stmt = conn.prepare(
            "SELECT data FROM objects WHERE bucket = ? AND key = ? ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![bucket, src_key], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let now = Utc::now();
    let ts = format_ts(now);

    let tx = conn.transaction()?;
    delete_rows(&tx, bucket, dst_key)?;
    for (chunk_index, data) in chunks.iter().enumerate() {
        if chunk_index == 0 {
            tx.execute(
                "INSERT INTO objects
                     (bucket, key, chunk_index, size, etag, last_modified, content_type, data, depth, parent)
                 VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    bucket,
                    dst_key,
                    src_meta.size as i64,
                    src_meta.etag,
                    ts,
                    src_meta.content_type,
                    data,
                    keys::depth(dst_key),
                    keys::parent(dst_key),
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO objects (bucket, key, chunk_index, data) VALUES (?, ?, ?, ?)",
                params![bucket, dst_key, chunk_index as i64, data],
            )?;
        }
    }
    tx.commit()?;

    Ok(Some(ObjectMeta {
        last_modified: now,
        ..src_meta
    }))
}
