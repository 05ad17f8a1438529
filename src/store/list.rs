//! ListObjectsV2 engine.
//!
//! Three code paths share one result shape:
//!
//! * slash delimiter: index scan over the denormalised `parent` column,
//!   merged with the direct children of the prefix;
//! * any other delimiter: key-range scan with over-fetch and post-filter
//!   collapse;
//! * no delimiter: plain key-range scan.
//!
//! Prefix filtering always uses the half-open range `[prefix, next_prefix)`
//! so `%` and `_` in prefixes stay literal. Pagination markers are the raw
//! string value of the last emitted item.

use rusqlite::{params, Connection};

use super::{keys, parse_ts, StoreError};
use crate::types::{ListPage, ListedObject};

/// Run one listing request against the store.
///
/// `marker` is the effective pagination cursor (`continuation-token`, or
/// `start-after` on the first page). An empty `delimiter` means none.
pub fn list_objects(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    delimiter: &str,
    max_keys: usize,
    marker: Option<&str>,
) -> Result<ListPage, StoreError> {
    match delimiter {
        "" => list_plain(conn, bucket, prefix, max_keys, marker),
        "/" => list_slash(conn, bucket, prefix, max_keys, marker),
        _ => list_generic(conn, bucket, prefix, delimiter, max_keys, marker),
    }
}

/// Key-range scan over chunk-0 rows, ordered by key.
fn fetch_range(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    marker: Option<&str>,
    limit: usize,
) -> Result<Vec<ListedObject>, StoreError> {
    let upper = keys::next_prefix(prefix);

    let mut stmt = conn.prepare(
        "SELECT key, size, etag, last_modified FROM objects
         WHERE bucket = ?1 AND chunk_index = 0
           AND key >= ?2
           AND (?3 IS NULL OR key < ?3)
           AND (?4 IS NULL OR key > ?4)
         ORDER BY key LIMIT ?5",
    )?;
    let rows = stmt.query_map(
        params![bucket, prefix, upper, marker, limit as i64],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )?;

    let mut objects = Vec::new();
    for row in rows {
        let (key, size, etag, last_modified) = row?;
        objects.push(ListedObject {
            key,
            size: size as u64,
            etag,
            last_modified: parse_ts(&last_modified)?,
        });
    }
    Ok(objects)
}

/// No delimiter: the first `max_keys` keys of the prefix range.
fn list_plain(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    max_keys: usize,
    marker: Option<&str>,
) -> Result<ListPage, StoreError> {
    let mut objects = fetch_range(conn, bucket, prefix, marker, max_keys + 1)?;

    let is_truncated = objects.len() > max_keys;
    objects.truncate(max_keys);
    let next_continuation_token = if is_truncated {
        objects.last().map(|o| o.key.clone())
    } else {
        None
    };

    Ok(ListPage {
        contents: objects,
        common_prefixes: Vec::new(),
        is_truncated,
        next_continuation_token,
    })
}

/// A merged listing entry, kept sortable by its raw string value.
enum Entry {
    Prefix(String),
    Content(ListedObject),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Prefix(p) => p,
            Entry::Content(o) => &o.key,
        }
    }
}

/// Slash delimiter: one index scan for the common prefixes, one for the
/// direct children, merged and truncated to `max_keys`.
fn list_slash(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    max_keys: usize,
    marker: Option<&str>,
) -> Result<ListPage, StoreError> {
    let target_depth = keys::depth(prefix) + 1;
    let upper = keys::next_prefix(prefix);

    // Resuming after a marker, every further prefix sorts beyond the
    // marker's own parent (or beyond the marker itself when the marker was
    // a prefix entry, whose parent is one level up).
    let prefix_cutoff = marker.map(|m| {
        let p = keys::parent(m);
        if p.is_empty() {
            m.to_string()
        } else {
            p
        }
    });

    let mut common_prefixes: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT parent FROM objects
             WHERE bucket = ?1 AND chunk_index = 0
               AND parent >= ?2
               AND (?3 IS NULL OR parent < ?3)
               AND (?4 IS NULL OR parent > ?4)
             ORDER BY parent",
        )?;
        let rows = stmt.query_map(
            params![bucket, prefix, upper, prefix_cutoff],
            |row| row.get::<_, String>(0),
        )?;
        rows.collect::<Result<_, _>>()?
    };
    common_prefixes.retain(|p| p.starts_with(prefix) && keys::depth(p) == target_depth);

    let contents = {
        let mut stmt = conn.prepare(
            "SELECT key, size, etag, last_modified FROM objects
             WHERE bucket = ?1 AND chunk_index = 0 AND parent = ?2
               AND (?3 IS NULL OR key > ?3)
             ORDER BY key LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![bucket, prefix, marker, (max_keys + 1) as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let mut objects = Vec::new();
        for row in rows {
            let (key, size, etag, last_modified) = row?;
            objects.push(ListedObject {
                key,
                size: size as u64,
                etag,
                last_modified: parse_ts(&last_modified)?,
            });
        }
        objects
    };

    let mut entries: Vec<Entry> = Vec::with_capacity(common_prefixes.len() + contents.len());
    entries.extend(common_prefixes.into_iter().map(Entry::Prefix));
    entries.extend(contents.into_iter().map(Entry::Content));
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    let is_truncated = entries.len() > max_keys;
    entries.truncate(max_keys);
    let next_continuation_token = if is_truncated {
        entries.last().map(|e| e.name().to_string())
    } else {
        None
    };

    let mut page = ListPage {
        is_truncated,
        next_continuation_token,
        ..Default::default()
    };
    for entry in entries {
        match entry {
            Entry::Prefix(p) => page.common_prefixes.push(p),
            Entry::Content(o) => page.contents.push(o),
        }
    }
    Ok(page)
}

/// Arbitrary delimiter: scan the prefix range in key order (over-fetching
/// ten pages' worth) and collapse keys whose tail contains the delimiter.
fn list_generic(
    conn: &Connection,
    bucket: &str,
    prefix: &str,
    delimiter: &str,
    max_keys: usize,
    marker: Option<&str>,
) -> Result<ListPage, StoreError> {
    let rows = fetch_range(conn, bucket, prefix, marker, max_keys * 10 + 1)?;

    let mut contents = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut emitted = 0usize;
    let mut is_truncated = false;

    for obj in rows {
        if emitted == max_keys {
            is_truncated = true;
            break;
        }
        let tail = &obj.key[prefix.len()..];
        if let Some(idx) = tail.find(delimiter) {
            let collapsed = format!("{}{}", prefix, &tail[..idx + delimiter.len()]);
            if common_prefixes.last() != Some(&collapsed) {
                common_prefixes.push(collapsed);
                emitted += 1;
            }
            cursor = Some(obj.key);
        } else {
            cursor = Some(obj.key.clone());
            contents.push(obj);
            emitted += 1;
        }
    }

    let next_continuation_token = if is_truncated { cursor } else { None };

    Ok(ListPage {
        contents,
        common_prefixes,
        is_truncated,
        next_continuation_token,
    })
}
