//! Object lifecycle scenarios: zero-byte puts, byte-for-byte round-trips,
//! and container teardown on delete.

use bytes::Bytes;
use stratus_core::objects::Conditions;
use stratus_core::records::Attrs;

use crate::{env, make_bucket};

#[tokio::test]
async fn test_should_store_zero_byte_object_without_container() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;

    let entry = env
        .store
        .put_object(&bucket, "a", "owner-b", Bytes::new(), Attrs::new())
        .await
        .expect("put empty");

    // HEAD reports the empty object with the canonical empty-body ETag.
    let head = env
        .store
        .head_object(&bucket, "a", None, &Conditions::default())
        .await
        .expect("head");
    assert_eq!(head.size, 0);
    assert_eq!(head.etag, "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(entry.etag, head.etag);

    // No byte container was created anywhere.
    assert_eq!(env.svc.object_count(), 0);

    // GET returns an empty body.
    let (_, body) = env
        .store
        .read_object(&bucket, "a", None, None, &Conditions::default())
        .await
        .expect("read");
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_should_roundtrip_bytes_across_block_boundaries() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;

    // Straddles several parity groups of the small-unit layouts.
    let body: Vec<u8> = (0..300_000).map(|i| (i % 253) as u8).collect();
    env.store
        .put_object(&bucket, "blob", "owner-b", Bytes::from(body.clone()), Attrs::new())
        .await
        .expect("put");

    let (entry, data) = env
        .store
        .read_object(&bucket, "blob", None, None, &Conditions::default())
        .await
        .expect("read");
    assert_eq!(entry.size, 300_000);
    assert_eq!(data.as_ref(), &body[..]);

    // An interior range comes back trimmed to the byte.
    let (_, range) = env
        .store
        .read_object(
            &bucket,
            "blob",
            None,
            Some((65_535, 131_073)),
            &Conditions::default(),
        )
        .await
        .expect("range read");
    assert_eq!(range.as_ref(), &body[65_535..=131_073]);
}

#[tokio::test]
async fn test_should_destroy_container_on_delete() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;

    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![9u8; 4096]), Attrs::new())
        .await
        .expect("put");
    assert_eq!(env.svc.object_count(), 1);

    env.store
        .delete_object(&bucket, "k", None, "owner-b")
        .await
        .expect("delete");

    // The byte container is gone, synchronously (no collector running).
    assert_eq!(env.svc.object_count(), 0);
    assert!(env
        .store
        .head_object(&bucket, "k", None, &Conditions::default())
        .await
        .expect_err("object gone")
        .is_not_found());
}

#[tokio::test]
async fn test_should_replace_container_on_overwrite() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;

    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![1u8; 8192]), Attrs::new())
        .await
        .expect("put 1");
    env.store
        .put_object(&bucket, "k", "owner-b", Bytes::from(vec![2u8; 100]), Attrs::new())
        .await
        .expect("put 2");

    // The overwritten null version's container was destroyed, not leaked.
    assert_eq!(env.svc.object_count(), 1);
    let (_, data) = env
        .store
        .read_object(&bucket, "k", None, None, &Conditions::default())
        .await
        .expect("read");
    assert_eq!(data.as_ref(), &[2u8; 100][..]);
}

#[tokio::test]
async fn test_should_stream_through_object_writer() {
    let env = env().await;
    let bucket = make_bucket(&env, "b").await;

    let mut writer = env.store.object_writer(&bucket, "streamed", "owner-b", "owner-b", 0);
    writer
        .process(Bytes::from("hello "), 0)
        .await
        .expect("chunk 1");
    writer
        .process(Bytes::from("stratus"), 6)
        .await
        .expect("chunk 2");
    writer.process(Bytes::new(), 0).await.expect("eos");
    let entry = writer.complete(Attrs::new()).await.expect("complete");
    assert_eq!(entry.size, 13);

    let (_, data) = env
        .store
        .read_object(&bucket, "streamed", None, None, &Conditions::default())
        .await
        .expect("read");
    assert_eq!(data.as_ref(), b"hello stratus");
}

#[tokio::test]
async fn test_should_refuse_bucket_removal_until_empty() {
    let env = env().await;
    let bucket = make_bucket(&env, "full").await;
    env.store
        .put_object(&bucket, "k", "owner-full", Bytes::from("x"), Attrs::new())
        .await
        .expect("put");

    let err = env
        .store
        .remove_bucket("", "full")
        .await
        .expect_err("not empty");
    assert!(matches!(
        err,
        stratus_core::CoreError::BucketNotEmpty { .. }
    ));

    env.store
        .delete_object(&bucket, "k", None, "owner-full")
        .await
        .expect("delete");
    env.store.remove_bucket("", "full").await.expect("now empty");
}
