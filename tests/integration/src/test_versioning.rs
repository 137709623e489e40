//! Versioned-bucket scenarios: delete markers, version resolution by
//! mtime, null-version reconciliation, and version-ID ordering.

use bytes::Bytes;
use stratus_core::keys::{generate_version_id, version_id_timestamp_ms};
use stratus_core::objects::{Conditions, ListParams};
use stratus_core::records::{Attrs, VersioningState};
use stratus_core::CoreError;

use crate::{env, make_bucket, tick};

#[tokio::test]
async fn test_should_shadow_name_with_delete_marker() {
    // Two puts then a delete: versions listing shows marker, v2, v1 in
    // that order and HEAD reports the name as absent.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");

    env.store
        .put_object(&bucket, "a", "owner-b", Bytes::from(vec![1u8; 100]), Attrs::new())
        .await
        .expect("put v1");
    tick().await;
    env.store
        .put_object(&bucket, "a", "owner-b", Bytes::from(vec![2u8; 200]), Attrs::new())
        .await
        .expect("put v2");
    tick().await;
    let deleted = env
        .store
        .delete_object(&bucket, "a", None, "owner-b")
        .await
        .expect("delete");
    assert!(deleted.delete_marker);

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
        .expect("list versions");
    assert_eq!(results.entries.len(), 3);
    assert!(results.entries[0].is_delete_marker());
    assert!(results.entries[0].is_current());
    assert_eq!(results.entries[1].size, 200);
    assert!(!results.entries[1].is_delete_marker());
    assert_eq!(results.entries[2].size, 100);

    assert!(env
        .store
        .head_object(&bucket, "a", None, &Conditions::default())
        .await
        .expect_err("shadowed")
        .is_not_found());
}

#[tokio::test]
async fn test_should_resolve_head_to_newest_unshadowed_version() {
    // Whatever the put/delete interleaving, HEAD without an instance
    // returns the record with maximal mtime not hidden by a marker.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");

    for size in [10usize, 20, 30] {
        env.store
            .put_object(&bucket, "k", "owner-b", Bytes::from(vec![0u8; size]), Attrs::new())
            .await
            .expect("put");
        tick().await;
    }
    let head = env
        .store
        .head_object(&bucket, "k", None, &Conditions::default())
        .await
        .expect("head");
    assert_eq!(head.size, 30);

    // Delete the newest version: HEAD falls back to the next one.
    let newest = head.instance.clone();
    env.store
        .delete_object(&bucket, "k", Some(&newest), "owner-b")
        .await
        .expect("delete newest");
    let head = env
        .store
        .head_object(&bucket, "k", None, &Conditions::default())
        .await
        .expect("head after delete");
    assert_eq!(head.size, 20);
    assert!(head.is_current());
}

#[tokio::test]
async fn test_should_keep_null_version_among_versions() {
    // A null-era object followed by versioned puts: the null record stays
    // addressable as "null" and sorts by its mtime in listings.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;

    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![7u8; 70]), Attrs::new())
        .await
        .expect("null-era put");
    tick().await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");
    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![8u8; 80]), Attrs::new())
        .await
        .expect("versioned put");

    // The null version remains addressable.
    let null = env
        .store
        .head_object(&bucket, "k", Some("null"), &Conditions::default())
        .await
        .expect("null head");
    assert_eq!(null.size, 70);

    // Listing orders by mtime descending: versioned first, null second.
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
    assert_eq!(results.entries.len(), 2);
    assert_eq!(results.entries[0].size, 80);
    assert_eq!(results.entries[1].size, 70);
    assert!(results.entries[1].instance.is_empty());
}

#[tokio::test]
async fn test_should_reject_get_of_delete_marker_version() {
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");
    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from("x"), Attrs::new())
        .await
        .expect("put");
    tick().await;
    let marker = env
        .store
        .delete_object(&bucket, "k", None, "owner-b")
        .await
        .expect("marker");

    let err = env
        .store
        .read_object(
            &bucket,
            "k",
            Some(&marker.version_id),
            None,
            &Conditions::default(),
        )
        .await
        .expect_err("marker addressed");
    assert!(matches!(err, CoreError::MethodNotAllowed));
}

#[tokio::test]
async fn test_should_roundtrip_version_id_timestamps() {
    // Encoding a timestamp and decoding it is lossless, and later
    // timestamps produce lexicographically smaller IDs.
    for ts in [0u64, 1, 1_700_000_000_000, 218_340_105_584_895] {
        let id = generate_version_id(ts);
        assert_eq!(version_id_timestamp_ms(&id), Some(ts), "ts {ts}");
    }
    let earlier = generate_version_id(1_000_000);
    let later = generate_version_id(2_000_000);
    assert!(later < earlier);
}

#[tokio::test]
async fn test_should_count_only_live_objects_in_stats() {
    // Delete markers never show up in the statistics.
    let env = env().await;
    let mut bucket = make_bucket(&env, "b").await;
    env.store
        .set_bucket_versioning(&mut bucket, VersioningState::Enabled)
        .await
        .expect("enable");

    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![1u8; 500]), Attrs::new())
        .await
        .expect("put");
    tick().await;
    env.store
        .delete_object(&bucket, "k", None, "owner-b")
        .await
        .expect("marker");

    let stats = env.store.bucket_stats(&bucket).await.expect("stats");
    let main = stats.category(stratus_core::records::ObjCategory::Main);
    assert_eq!(main.num_entries, 1);
    assert_eq!(main.total_size, 500);
}
