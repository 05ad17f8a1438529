//! Multipart upload lifecycle over the `multipart_uploads` and
//! `multipart_parts` tables.
//!
//! Parts follow the same chunking discipline as objects: chunk 0 of a part
//! carries its `size` and MD5 `etag`, later chunks only bytes. Completing an
//! upload re-chunks every part into the object table as one dense sequence
//! and removes the session; aborting removes the session without touching
//! the object table.

use chrono::Utc;
use md5::{Digest, Md5};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_ts, keys, parse_ts, StoreError, CHUNK_SIZE};
use crate::types::{ObjectMeta, UploadInfo, UploadPage};

struct UploadRow {
    bucket: String,
    key: String,
    content_type: String,
}

fn get_upload(conn: &Connection, upload_id: &str) -> Result<Option<UploadRow>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT bucket, key, content_type FROM multipart_uploads WHERE upload_id = ?",
            params![upload_id],
            |row| {
                Ok(UploadRow {
                    bucket: row.get(0)?,
                    key: row.get(1)?,
                    content_type: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Start a new upload session and return its freshly generated id.
pub fn create_upload(
    conn: &Connection,
    bucket: &str,
    key: &str,
    content_type: &str,
) -> Result<String, StoreError> {
    let upload_id = Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO multipart_uploads (upload_id, bucket, key, created_at, content_type)
         VALUES (?, ?, ?, ?, ?)",
        params![upload_id, bucket, key, format_ts(Utc::now()), content_type],
    )?;
    Ok(upload_id)
}

/// Store one part, replacing any previous upload of the same part number.
/// Returns the part's MD5 hex etag.
pub fn upload_part(
    conn: &mut Connection,
    upload_id: &str,
    part_number: u32,
    data: &[u8],
) -> Result<String, StoreError> {
    if get_upload(conn, upload_id)?.is_none() {
        return Err(StoreError::NoSuchUpload(upload_id.to_string()));
    }

    let etag = hex::encode(Md5::digest(data));

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM multipart_parts WHERE upload_id = ? AND part_number = ?",
        params![upload_id, part_number],
    )?;

    let head = &data[..data.len().min(CHUNK_SIZE)];
    tx.execute(
        "INSERT INTO multipart_parts (upload_id, part_number, chunk_index, size, etag, data)
         VALUES (?, ?, 0, ?, ?, ?)",
        params![upload_id, part_number, data.len() as i64, etag, head],
    )?;

    let mut chunk_index = 1i64;
    let mut offset = CHUNK_SIZE;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        tx.execute(
            "INSERT INTO multipart_parts (upload_id, part_number, chunk_index, data)
             VALUES (?, ?, ?, ?)",
            params![upload_id, part_number, chunk_index, &data[offset..end]],
        )?;
        chunk_index += 1;
        offset = end;
    }
    tx.commit()?;

    Ok(etag)
}

/// Assemble the uploaded parts into the object table, replacing any prior
/// object at the session's key, and remove the session. The object etag is
/// the S3 multipart form: MD5 over the concatenated raw part digests,
/// suffixed with the part count.
pub fn complete_upload(
    conn: &mut Connection,
    upload_id: &str,
) -> Result<(String, String, ObjectMeta), StoreError> {
    let upload = get_upload(conn, upload_id)?
        .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;

    let parts: Vec<(i64, i64, String)> = {
        let mut stmt = conn.prepare(
            "SELECT part_number, size, etag FROM multipart_parts
             WHERE upload_id = ? AND chunk_index = 0
             ORDER BY part_number",
        )?;
        let rows = stmt.query_map(params![upload_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<Result<_, _>>()?
    };

    if parts.is_empty() {
        return Err(StoreError::EmptyUpload(upload_id.to_string()));
    }

    let total_size: i64 = parts.iter().map(|(_, size, _)| size).sum();

    let mut digest_concat = Vec::with_capacity(parts.len() * 16);
    for (part_number, _, etag) in &parts {
        let raw = hex::decode(etag).map_err(|_| {
            StoreError::Corrupt(format!("part {part_number} of {upload_id} has a non-hex etag"))
        })?;
        digest_concat.extend_from_slice(&raw);
    }
    let etag = format!("{}-{}", hex::encode(Md5::digest(&digest_concat)), parts.len());

    let now = Utc::now();
    let ts = format_ts(now);

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM objects WHERE bucket = ? AND key = ?",
        params![upload.bucket, upload.key],
    )?;

    // Re-index every part chunk into one dense object chunk sequence.
    let mut next_index = 0i64;
    for (part_number, _, _) in &parts {
        let chunks: Vec<Vec<u8>> = {
            let mut stmt = tx.prepare(
                "SELECT data FROM multipart_parts
                 WHERE upload_id = ? AND part_number = ?
                 ORDER BY chunk_index",
            )?;
            let rows = stmt.query_map(params![upload_id, part_number], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for data in chunks {
            if next_index == 0 {
                tx.execute(
                    "INSERT INTO objects
                         (bucket, key, chunk_index, size, etag, last_modified, content_type, data, depth, parent)
                     VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        upload.bucket,
                        upload.key,
                        total_size,
                        etag,
                        ts,
                        upload.content_type,
                        data,
                        keys::depth(&upload.key),
                        keys::parent(&upload.key),
                    ],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO objects (bucket, key, chunk_index, data) VALUES (?, ?, ?, ?)",
                    params![upload.bucket, upload.key, next_index, data],
                )?;
            }
            next_index += 1;
        }
    }

    tx.execute(
        "DELETE FROM multipart_parts WHERE upload_id = ?",
        params![upload_id],
    )?;
    tx.execute(
        "DELETE FROM multipart_uploads WHERE upload_id = ?",
        params![upload_id],
    )?;
    tx.commit()?;

    let meta = ObjectMeta {
        size: total_size as u64,
        etag,
        last_modified: now,
        content_type: upload.content_type,
    };
    Ok((upload.bucket, upload.key, meta))
}

/// Drop the session and its parts. Idempotent: aborting an unknown or
/// already-finished upload is not an error.
pub fn abort_upload(conn: &mut Connection, upload_id: &str) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM multipart_parts WHERE upload_id = ?",
        params![upload_id],
    )?;
    tx.execute(
        "DELETE FROM multipart_uploads WHERE upload_id = ?",
        params![upload_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// List sessions for a bucket ordered by `(key, upload_id)`.
///
/// Prefix filtering uses the half-open key range, keeping `%` and `_`
/// literal. With both markers present pagination resumes past that exact
/// `(key, upload_id)` pair; with only a key marker it resumes past the key.
pub fn list_uploads(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    key_marker: Option<&str>,
    upload_id_marker: Option<&str>,
    max_uploads: usize,
) -> Result<UploadPage, StoreError> {
    let upper = keys::next_prefix(prefix);
    let pair_markers = match (key_marker, upload_id_marker) {
        (Some(k), Some(u)) => Some((k, u)),
        _ => None,
    };
    let key_only_marker = if pair_markers.is_none() {
        key_marker
    } else {
        None
    };
    let (pair_key, pair_upload) = match pair_markers {
        Some((k, u)) => (Some(k), Some(u)),
        None => (None, None),
    };

    let mut stmt = conn.prepare(
        "SELECT key, upload_id, created_at FROM multipart_uploads
         WHERE bucket = ?1
           AND key >= ?2
           AND (?3 IS NULL OR key < ?3)
           AND (?4 IS NULL OR key > ?4)
           AND (?5 IS NULL OR key > ?5 OR (key = ?5 AND upload_id > ?6))
         ORDER BY key, upload_id LIMIT ?7",
    )?;
    let rows = stmt.query_map(
        params![
            bucket,
            prefix,
            upper,
            key_only_marker,
            pair_key,
            pair_upload,
            (max_uploads + 1) as i64
        ],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    )?;

    let mut uploads = Vec::new();
    for row in rows {
        let (key, upload_id, created_at) = row?;
        uploads.push(UploadInfo {
            key,
            upload_id,
            initiated: parse_ts(&created_at)?,
        });
    }

    let is_truncated = uploads.len() > max_uploads;
    uploads.truncate(max_uploads);
    let (next_key_marker, next_upload_id_marker) = if is_truncated {
        match uploads.last() {
            Some(last) => (Some(last.key.clone()), Some(last.upload_id.clone())),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    Ok(UploadPage {
        uploads,
        is_truncated,
        next_key_marker,
        next_upload_id_marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{migrations, objects};

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::migrate(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_complete_roundtrip() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "m.txt", "text/plain").unwrap();

        upload_part(&mut conn, &upload_id, 1, b"part 1 data").unwrap();
        upload_part(&mut conn, &upload_id, 2, b"part 2 data").unwrap();

        let (bucket, key, meta) = complete_upload(&mut conn, &upload_id).unwrap();
        assert_eq!(bucket, "b");
        assert_eq!(key, "m.txt");
        assert_eq!(meta.size, 22);
        assert!(meta.etag.ends_with("-2"));
        assert_eq!(meta.content_type, "text/plain");

        let (_, body) = objects::get_object(&conn, "b", "m.txt").unwrap().unwrap();
        assert_eq!(body, b"part 1 datapart 2 data");

        // Session and parts are gone.
        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM multipart_uploads", [], |r| r.get(0))
            .unwrap();
        let parts: i64 = conn
            .query_row("SELECT COUNT(*) FROM multipart_parts", [], |r| r.get(0))
            .unwrap();
        assert_eq!((sessions, parts), (0, 0));
    }

    #[test]
    fn test_object_absent_until_complete() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "pending.bin", "").unwrap();
        upload_part(&mut conn, &upload_id, 1, b"data").unwrap();

        assert!(objects::get_object(&conn, "b", "pending.bin").unwrap().is_none());

        complete_upload(&mut conn, &upload_id).unwrap();
        assert!(objects::get_object(&conn, "b", "pending.bin").unwrap().is_some());
    }

    #[test]
    fn test_complete_replaces_existing_object() {
        let mut conn = test_conn();
        objects::put_object(&mut conn, "b", "k", b"old old old", "").unwrap();

        let upload_id = create_upload(&conn, "b", "k", "").unwrap();
        upload_part(&mut conn, &upload_id, 1, b"new").unwrap();
        complete_upload(&mut conn, &upload_id).unwrap();

        let (meta, body) = objects::get_object(&conn, "b", "k").unwrap().unwrap();
        assert_eq!(body, b"new");
        assert_eq!(meta.size, 3);
    }

    #[test]
    fn test_complete_with_zero_parts() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "k", "").unwrap();

        let err = complete_upload(&mut conn, &upload_id).unwrap_err();
        assert!(matches!(err, StoreError::EmptyUpload(_)));
    }

    #[test]
    fn test_complete_unknown_upload() {
        let mut conn = test_conn();
        let err = complete_upload(&mut conn, "nope").unwrap_err();
        assert!(matches!(err, StoreError::NoSuchUpload(_)));
    }

    #[test]
    fn test_part_reupload_is_idempotent() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "k", "").unwrap();

        let etag1 = upload_part(&mut conn, &upload_id, 1, &vec![1u8; CHUNK_SIZE + 50]).unwrap();
        let etag2 = upload_part(&mut conn, &upload_id, 1, b"small").unwrap();
        assert_ne!(etag1, etag2);

        // Only the replacement's chunk rows remain.
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM multipart_parts WHERE upload_id = ? AND part_number = 1",
                params![upload_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);

        complete_upload(&mut conn, &upload_id).unwrap();
        let (_, body) = objects::get_object(&conn, "b", "k").unwrap().unwrap();
        assert_eq!(body, b"small");
    }

    #[test]
    fn test_part_larger_than_chunk_size() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "big.bin", "").unwrap();

        let part1 = vec![7u8; CHUNK_SIZE + 123];
        let part2 = vec![9u8; 456];
        upload_part(&mut conn, &upload_id, 1, &part1).unwrap();
        upload_part(&mut conn, &upload_id, 2, &part2).unwrap();

        let (_, _, meta) = complete_upload(&mut conn, &upload_id).unwrap();
        assert_eq!(meta.size as usize, part1.len() + part2.len());

        let (_, body) = objects::get_object(&conn, "b", "big.bin").unwrap().unwrap();
        let mut expected = part1;
        expected.extend_from_slice(&part2);
        assert_eq!(body, expected);
    }

    #[test]
    fn test_parts_assemble_in_number_order() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "k", "").unwrap();

        // Uploaded out of order; assembled by part number.
        upload_part(&mut conn, &upload_id, 2, b"world").unwrap();
        upload_part(&mut conn, &upload_id, 1, b"hello ").unwrap();

        complete_upload(&mut conn, &upload_id).unwrap();
        let (_, body) = objects::get_object(&conn, "b", "k").unwrap().unwrap();
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn test_upload_part_unknown_session() {
        let mut conn = test_conn();
        let err = upload_part(&mut conn, "ghost", 1, b"x").unwrap_err();
        assert!(matches!(err, StoreError::NoSuchUpload(_)));
    }

    #[test]
    fn test_abort_cleans_up() {
        let mut conn = test_conn();
        let upload_id = create_upload(&conn, "b", "k", "").unwrap();
        upload_part(&mut conn, &upload_id, 1, b"x").unwrap();

        abort_upload(&mut conn, &upload_id).unwrap();

        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM multipart_uploads", [], |r| r.get(0))
            .unwrap();
        let parts: i64 = conn
            .query_row("SELECT COUNT(*) FROM multipart_parts", [], |r| r.get(0))
            .unwrap();
        assert_eq!((sessions, parts), (0, 0));
        assert!(objects::get_object(&conn, "b", "k").unwrap().is_none());

        // Aborting again is fine.
        abort_upload(&mut conn, &upload_id).unwrap();
    }

    #[test]
    fn test_list_uploads_ordering_and_prefix() {
        let mut conn = test_conn();
        let id_b = create_upload(&conn, "b", "b-key", "").unwrap();
        let id_a1 = create_upload(&conn, "b", "a-key", "").unwrap();
        let id_a2 = create_upload(&conn, "b", "a-key", "").unwrap();
        create_upload(&conn, "other", "a-key", "").unwrap();

        let page = list_uploads(&conn, "b", "", None, None, 1000).unwrap();
        assert_eq!(page.uploads.len(), 3);
        assert_eq!(page.uploads[0].key, "a-key");
        assert_eq!(page.uploads[1].key, "a-key");
        assert!(page.uploads[0].upload_id < page.uploads[1].upload_id);
        assert_eq!(page.uploads[2].key, "b-key");
        assert!(!page.is_truncated);

        let page = list_uploads(&conn, "b", "b-", None, None, 1000).unwrap();
        assert_eq!(page.uploads.len(), 1);
        assert_eq!(page.uploads[0].upload_id, id_b);

        let _ = (id_a1, id_a2);
    }

    #[test]
    fn test_list_uploads_pair_marker_pagination() {
        let mut conn = test_conn();
        for key in ["k1", "k1", "k2"] {
            create_upload(&conn, "b", key, "").unwrap();
        }

        let page = list_uploads(&conn, "b", "", None, None, 2).unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.uploads.len(), 2);
        let km = page.next_key_marker.unwrap();
        let um = page.next_upload_id_marker.unwrap();
        assert_eq!(km, "k1");

        let page = list_uploads(&conn, "b", "", Some(&km), Some(&um), 2).unwrap();
        assert_eq!(page.uploads.len(), 1);
        assert_eq!(page.uploads[0].key, "k2");
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_list_uploads_key_marker_only() {
        let mut conn = test_conn();
        for key in ["k1", "k2", "k3"] {
            create_upload(&conn, "b", key, "").unwrap();
        }

        let page = list_uploads(&conn, "b", "", Some("k1"), None, 1000).unwrap();
        let keys: Vec<&str> = page.uploads.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["k2", "k3"]);
    }
}
