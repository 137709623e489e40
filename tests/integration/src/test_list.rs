//! Listing scenarios: delimiters, pagination continuity, and mtime
//! ordering of mixed null/versioned records.

use bytes::Bytes;
use stratus_core::objects::ListParams;
use stratus_core::records::{Attrs, VersioningState};

use crate::{env, make_bucket, tick, TestEnv};

async fn put(env: &TestEnv, bucket: &stratus_core::records::BucketRecord, key: &str) {
    env.store
        .put_object(bucket, key, &format!("owner-{}", bucket.info.name), Bytes::from("x"), Attrs::new())
        .await
        .unwrap_or_else(|e| panic!("put {key}: {e}"));
}

#[tokio::test]
async fn test_should_collapse_common_prefixes() {
    // Keys a/x, a/y, a/sub/z with prefix "a/" and delimiter "/" list two
    // objects and one common prefix.
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;
    for key in ["a/x", "a/y", "a/sub/z"] {
        put(&env, &bucket, key).await;
    }

    let results = env
        .store
        .list_objects(
            &bucket,
            &ListParams {
                prefix: "a/".to_owned(),
                delim: "/".to_owned(),
                max: 100,
                ..ListParams::default()
            },
        )
        .await
        .expect("list");

    let names: Vec<_> = results.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a/x", "a/y"]);
    assert_eq!(results.common_prefixes, vec!["a/sub/".to_owned()]);
    assert!(!results.is_truncated);
}

#[tokio::test]
async fn test_should_paginate_without_duplicates_or_gaps() {
    // Walking the whole bucket through next_marker pages sees every key
    // exactly once, in order.
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;
    let keys: Vec<String> = (0..23).map(|i| format!("key-{i:03}")).collect();
    for key in &keys {
        put(&env, &bucket, key).await;
    }

    let mut seen = Vec::new();
    let mut marker = (String::new(), String::new());
    loop {
        let results = env
            .store
            .list_objects(
                &bucket,
                &ListParams {
                    marker_name: marker.0.clone(),
                    marker_instance: marker.1.clone(),
                    max: 5,
                    ..ListParams::default()
                },
            )
            .await
            .expect("page");
        for entry in &results.entries {
            seen.push(entry.name.clone());
        }
        if !results.is_truncated {
            break;
        }
        let next = results.next_marker.expect("truncated page carries marker");
        marker = next;
    }
    assert_eq!(seen, keys);
}

#[tokio::test]
async fn test_should_paginate_version_listing_continuously() {
    // Pagination across versions of one name: no entry is repeated and
    // none is skipped.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");

    for _ in 0..7 {
        put(&env, &bucket, "versioned").await;
        tick().await;
    }
    put(&env, &bucket, "zother").await;

    let mut seen: Vec<(String, String)> = Vec::new();
    let mut marker = (String::new(), String::new());
    loop {
        let results = env
            .store
            .list_objects(
                &bucket,
                &ListParams {
                    marker_name: marker.0.clone(),
                    marker_instance: marker.1.clone(),
                    max: 3,
                    list_versions: true,
                    ..ListParams::default()
                },
            )
            .await
            .expect("page");
        for entry in &results.entries {
            seen.push((entry.name.clone(), entry.instance.clone()));
        }
        if !results.is_truncated {
            break;
        }
        marker = results.next_marker.expect("marker");
    }

    assert_eq!(seen.len(), 8, "7 versions plus one other key: {seen:?}");
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len(), "duplicates in {seen:?}");
    // All versions of "versioned" come before "zother".
    assert!(seen[..7].iter().all(|(n, _)| n == "versioned"));
    assert_eq!(seen[7].0, "zother");
}

#[tokio::test]
async fn test_should_order_versions_by_mtime_descending() {
    // Null record written between versioned records lists in strict
    // mtime order regardless of key order.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;

    // Null era first (oldest).
    put(&env, &bucket, "k").await;
    tick().await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");
    for _ in 0..3 {
        put(&env, &bucket, "k").await;
        tick().await;
    }

    let results = env
        .store
        .list_objects(
            &bucket,
            &ListParams {
                max: 100,
                list_versions: true,
                ..ListParams::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(results.entries.len(), 4);
    let mtimes: Vec<i64> = results.entries.iter().map(|e| e.mtime_ms).collect();
    let mut sorted = mtimes.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(mtimes, sorted, "descending mtime order");
    // The null record (oldest) is last.
    assert!(results.entries[3].instance.is_empty());
}

#[tokio::test]
async fn test_should_return_empty_listing_for_zero_max() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;
    put(&env, &bucket, "k").await;
    let results = env
        .store
        .list_objects(&bucket, &ListParams::default())
        .await
        .expect("list");
    assert!(results.entries.is_empty());
    assert!(!results.is_truncated);
}

#[tokio::test]
async fn test_should_reject_bogus_version_marker() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;
    put(&env, &bucket, "k").await;
    let err = env
        .store
        .list_objects(
            &bucket,
            &ListParams {
                marker_name: "k".to_owned(),
                marker_instance: "does-not-exist".to_owned(),
                max: 10,
                list_versions: true,
                ..ListParams::default()
            },
        )
        .await
        .expect_err("invalid marker");
    assert!(matches!(
        err,
        stratus_core::CoreError::InvalidArgument { .. }
    ));
}
