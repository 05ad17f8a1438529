//! Key derivation for the chunked store.
//!
//! `depth` and `parent` are denormalised onto every chunk-0 row so that
//! slash-delimiter listings run as index scans over `(bucket, parent)`
//! instead of walking every key (see the migrations module).

/// Number of `/` separators in a key.
pub fn depth(key: &str) -> i64 {
    key.bytes().filter(|&b| b == b'/').count() as i64
}

/// Longest prefix of `key` ending in `/`, computed after stripping a single
/// trailing `/`. Returns the empty string for top-level keys.
///
/// `parent("a/b/c") == "a/b/"`, `parent("a/b/") == "a/"`, `parent("a") == ""`.
pub fn parent(key: &str) -> String {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

/// Exclusive upper bound of the half-open key range `[prefix, upper)`.
///
/// Bumping the final character yields the smallest string ordered after
/// every key starting with `prefix`, which keeps `%` and `_` literal where
/// a `LIKE` pattern would treat them as wildcards. Returns `None` when the
/// prefix is empty (the range is unbounded) or the final character has no
/// successor scalar value.
pub fn next_prefix(prefix: &str) -> Option<String> {
    let last = prefix.chars().last()?;
    let succ = char::from_u32(last as u32 + 1)?;
    let mut upper = String::with_capacity(prefix.len() + succ.len_utf8());
    upper.push_str(&prefix[..prefix.len() - last.len_utf8()]);
    upper.push(succ);
    Some(upper)
}
