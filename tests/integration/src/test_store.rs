//! Store-level scenarios: GC routing of deletes, cache behavior, and
//! shutdown.

use bytes::Bytes;
use stratus_core::config::StoreConfig;
use stratus_core::objects::Conditions;
use stratus_core::records::Attrs;

use crate::{env, env_with, make_bucket};

#[tokio::test]
async fn test_should_route_deletes_through_gc_when_enabled() {
    let cfg = StoreConfig::builder().gc_enabled(true).gc_queues(4).build();
    let env = env_with(cfg).await;
    let bucket = make_bucket(&env, "b").await;

    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![3u8; 8192]), Attrs::new())
        .await
        .expect("put");
    assert_eq!(env.svc.object_count(), 1);

    env.store
        .delete_object(&bucket, "k", None, "owner-b")
        .await
        .expect("delete");

    // The index entry is gone but the container awaits the collector —
    // enqueued exactly once.
    assert!(env
        .store
        .head_object(&bucket, "k", None, &Conditions::default())
        .await
        .expect_err("entry gone")
        .is_not_found());
    assert_eq!(env.svc.object_count(), 1);
    let queued = env.store.gc().list().await.expect("gc list");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].size, 8192);
    assert!(queued[0].part_index.is_none());
    assert!(env.svc.object_exists(queued[0].meta.oid));
}

#[tokio::test]
async fn test_should_fall_back_to_synchronous_delete_after_gc_stop() {
    let cfg = StoreConfig::builder().gc_enabled(true).build();
    let env = env_with(cfg).await;
    let bucket = make_bucket(&env, "b").await;
    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![1u8; 100]), Attrs::new())
        .await
        .expect("put");

    // With the collector refusing work, the delete destroys the
    // container inline.
    env.store.gc().stop();
    env.store
        .delete_object(&bucket, "k", None, "owner-b")
        .await
        .expect("delete");
    assert_eq!(env.svc.object_count(), 0);
}

#[tokio::test]
async fn test_should_enqueue_multipart_deletes_with_part_index() {
    let cfg = StoreConfig::builder().gc_enabled(true).build();
    let env = env_with(cfg).await;
    let bucket = make_bucket(&env, "b").await;

    let upload = env
        .store
        .initiate_multipart(&bucket, "obj", "owner-b", Attrs::new())
        .await
        .expect("initiate");
    let mut writer = env
        .store
        .part_writer(&bucket, &upload, 1, 6 * 1024 * 1024)
        .await
        .expect("writer");
    writer
        .process(Bytes::from(vec![9u8; 6 * 1024 * 1024]), 0)
        .await
        .expect("data");
    writer.process(Bytes::new(), 0).await.expect("eos");
    let info = writer.complete(Attrs::new()).await.expect("part");
    env.store
        .complete_multipart(&bucket, &upload, &[(1, info.etag)])
        .await
        .expect("complete");

    env.store
        .delete_object(&bucket, "obj", None, "owner-b")
        .await
        .expect("delete");

    let queued = env.store.gc().list().await.expect("gc list");
    assert_eq!(queued.len(), 1);
    let item = &queued[0];
    assert_eq!(item.tag, upload.upload_id);
    assert!(item
        .part_index
        .as_deref()
        .is_some_and(|idx| idx.ends_with(".multiparts")));
}

#[tokio::test]
async fn test_should_serve_repeated_reads_from_cache() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;
    env.store
        .put_object(&bucket, "hot", "owner-b", Bytes::from("x"), Attrs::new())
        .await
        .expect("put");

    let (hits_before, _) = env.store.obj_cache().stats();
    for _ in 0..5 {
        env.store
            .head_object(&bucket, "hot", Some("null"), &Conditions::default())
            .await
            .expect("head");
    }
    let (hits_after, _) = env.store.obj_cache().stats();
    assert!(hits_after >= hits_before + 5, "repeated HEADs hit the cache");
}

#[tokio::test]
async fn test_should_pass_caches_through_when_disabled() {
    let cfg = StoreConfig::builder().use_metadata_cache(false).build();
    let env = env_with(cfg).await;
    let bucket = make_bucket(&env, "b").await;
    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from("x"), Attrs::new())
        .await
        .expect("put");

    env.store
        .head_object(&bucket, "k", Some("null"), &Conditions::default())
        .await
        .expect("head");
    let (hits, _) = env.store.obj_cache().stats();
    assert_eq!(hits, 0);
}

#[tokio::test]
async fn test_should_finalize_store() {
    let cfg = StoreConfig::builder().gc_enabled(true).build();
    let env = env_with(cfg).await;
    assert!(env.store.gc().is_enabled());

    env.store.finalize();
    assert!(env.store.is_finalized());
    assert!(!env.store.gc().is_enabled());
}

#[tokio::test]
async fn test_should_keep_user_catalog_consistent() {
    let env = env().await;
    let user = crate::make_user(&env, "carol").await;

    let (buckets, _) = env
        .store
        .list_buckets("carol", "", 10)
        .await
        .expect("empty listing");
    assert!(buckets.is_empty());

    env.store
        .create_bucket(
            &user,
            stratus_core::records::BucketInfo {
                name: "carols-data".to_owned(),
                ..Default::default()
            },
            Attrs::new(),
        )
        .await
        .expect("bucket");

    let (buckets, truncated) = env
        .store
        .list_buckets("carol", "", 10)
        .await
        .expect("listing");
    assert!(!truncated);
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].0, "carols-data");
}
