//! ListObjectsV2 tests: delimiter collapsing, prefix ranges, pagination.

mod common;

use common::{xml_text, xml_texts, TestApp};

#[tokio::test]
async fn test_delimiter_listing_scenario() {
    let app = TestApp::new();
    for key in [
        "root.txt",
        "dir1/file1.txt",
        "dir1/file2.txt",
        "dir1/subdir/file3.txt",
        "dir2/file4.txt",
    ] {
        app.put(key, b"x").await;
    }

    let list = app.list("delimiter=%2F").await;
    assert_eq!(list.status, 200);
    let xml = list.text();

    assert_eq!(xml_texts(xml, "Key"), vec!["root.txt"]);
    // One <Prefix> is the request echo; the rest are CommonPrefixes.
    let prefixes: Vec<&str> = xml_texts(xml, "Prefix")
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    assert_eq!(prefixes, vec!["dir1/", "dir2/"]);
    assert_eq!(xml_text(xml, "KeyCount"), Some("3"));
    assert_eq!(xml_text(xml, "IsTruncated"), Some("false"));
}

#[tokio::test]
async fn test_delimiter_with_prefix() {
    let app = TestApp::new();
    for key in [
        "dir1/file1.txt",
        "dir1/file2.txt",
        "dir1/subdir/file3.txt",
        "dir2/file4.txt",
    ] {
        app.put(key, b"x").await;
    }

    let list = app.list("delimiter=%2F&prefix=dir1%2F").await;
    let xml = list.text();
    assert_eq!(
        xml_texts(xml, "Key"),
        vec!["dir1/file1.txt", "dir1/file2.txt"]
    );
    assert!(xml.contains("<Prefix>dir1/subdir/</Prefix>"));
}

#[tokio::test]
async fn test_prefix_with_special_chars() {
    let app = TestApp::new();
    for key in [
        "test_prefix%weird/file1.txt",
        "test_prefix%weird/file2.txt",
        "test_other/file.txt",
        "testXprefixYweird/file.txt",
    ] {
        app.put(key, b"x").await;
    }

    // %25 = '%', %2F = '/'; the prefix itself contains '_' and '%'.
    let list = app.list("prefix=test_prefix%25weird%2F").await;
    let keys = xml_texts(list.text(), "Key");
    assert_eq!(
        keys,
        vec!["test_prefix%weird/file1.txt", "test_prefix%weird/file2.txt"]
    );
}

#[tokio::test]
async fn test_underscore_prefix_not_a_wildcard() {
    let app = TestApp::new();
    app.put("a_c", b"x").await;
    app.put("abc", b"x").await;

    let list = app.list("prefix=a_").await;
    assert_eq!(xml_texts(list.text(), "Key"), vec!["a_c"]);
}

#[tokio::test]
async fn test_pagination_walk() {
    let app = TestApp::new();
    for i in 0..5 {
        app.put(&format!("k{i}"), b"x").await;
    }

    let page1 = app.list("max-keys=2").await;
    let xml = page1.text();
    assert_eq!(xml_texts(xml, "Key"), vec!["k0", "k1"]);
    assert_eq!(xml_text(xml, "IsTruncated"), Some("true"));
    let token = xml_text(xml, "NextContinuationToken").unwrap().to_string();
    assert_eq!(token, "k1");

    let page2 = app
        .list(&format!("max-keys=2&continuation-token={token}"))
        .await;
    let xml = page2.text();
    assert_eq!(xml_texts(xml, "Key"), vec!["k2", "k3"]);
    assert_eq!(xml_text(xml, "IsTruncated"), Some("true"));

    let token = xml_text(xml, "NextContinuationToken").unwrap().to_string();
    let page3 = app
        .list(&format!("max-keys=2&continuation-token={token}"))
        .await;
    let xml = page3.text();
    assert_eq!(xml_texts(xml, "Key"), vec!["k4"]);
    assert_eq!(xml_text(xml, "IsTruncated"), Some("false"));
    assert!(xml_text(xml, "NextContinuationToken").is_none());
}

#[tokio::test]
async fn test_start_after() {
    let app = TestApp::new();
    for key in ["a", "b", "c"] {
        app.put(key, b"x").await;
    }

    let list = app.list("start-after=a").await;
    assert_eq!(xml_texts(list.text(), "Key"), vec!["b", "c"]);
}

#[tokio::test]
async fn test_generic_delimiter() {
    let app = TestApp::new();
    for key in ["2024-01-a", "2024-01-b", "2024-02-a", "plain"] {
        app.put(key, b"x").await;
    }

    let list = app.list("delimiter=-&prefix=2024-").await;
    let xml = list.text();
    assert_eq!(xml_texts(xml, "Key"), Vec::<&str>::new());
    assert!(xml.contains("<Prefix>2024-01-</Prefix>"));
    assert!(xml.contains("<Prefix>2024-02-</Prefix>"));
    assert_eq!(xml_text(xml, "KeyCount"), Some("2"));
}

#[tokio::test]
async fn test_empty_bucket_listing() {
    let app = TestApp::new();
    let list = app.list("").await;
    let xml = list.text();
    assert_eq!(xml_text(xml, "KeyCount"), Some("0"));
    assert_eq!(xml_text(xml, "IsTruncated"), Some("false"));
    assert!(xml_texts(xml, "Key").is_empty());
}

#[tokio::test]
async fn test_listing_reflects_deletes() {
    let app = TestApp::new();
    app.put("keep", b"x").await;
    app.put("drop", b"x").await;
    app.delete("drop").await;

    let list = app.list("").await;
    assert_eq!(xml_texts(list.text(), "Key"), vec!["keep"]);
}
