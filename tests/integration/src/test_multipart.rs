//! Multipart scenarios: the canonical 15+15+7 MiB upload, abort
//! cleanliness, and stats restoration.

use bytes::Bytes;
use stratus_core::checksums::{compute_md5, compute_multipart_etag};
use stratus_core::config::StoreConfig;
use stratus_core::multipart::MultipartUpload;
use stratus_core::objects::Conditions;
use stratus_core::records::{Attrs, BucketRecord, ObjCategory, PartInfo};

use crate::{env, env_with, make_bucket, TestEnv};

const MIB: usize = 1024 * 1024;

async fn upload_part(
    env: &TestEnv,
    bucket: &BucketRecord,
    upload: &MultipartUpload,
    num: u32,
    body: &[u8],
) -> PartInfo {
    let mut writer = env
        .store
        .part_writer(bucket, upload, num, body.len() as u64)
        .await
        .unwrap_or_else(|e| panic!("part writer {num}: {e}"));
    // Feed in a few chunks, as a front-end would.
    let mut off = 0u64;
    for chunk in body.chunks(4 * MIB) {
        writer
            .process(Bytes::copy_from_slice(chunk), off)
            .await
            .unwrap_or_else(|e| panic!("part {num} chunk: {e}"));
        off += chunk.len() as u64;
    }
    writer
        .process(Bytes::new(), 0)
        .await
        .unwrap_or_else(|e| panic!("part {num} eos: {e}"));
    writer
        .complete(Attrs::new())
        .await
        .unwrap_or_else(|e| panic!("part {num} complete: {e}"))
}

#[tokio::test]
async fn test_should_complete_three_part_upload_with_composite_etag() {
    // 15 MiB + 15 MiB + 7 MiB: size is the sum and the ETag is the MD5 of
    // the concatenated part digests with a -3 suffix.
    let env = env().await;
    let bucket = make_bucket(&env, "mp").await;
    let upload = env
        .store
        .initiate_multipart(&bucket, "obj", "owner-mp", Attrs::new())
        .await
        .expect("initiate");

    let p1 = vec![0x11u8; 15 * MIB];
    let p2 = vec![0x22u8; 15 * MIB];
    let p3 = vec![0x33u8; 7 * MIB];
    let i1 = upload_part(&env, &bucket, &upload, 1, &p1).await;
    let i2 = upload_part(&env, &bucket, &upload, 2, &p2).await;
    let i3 = upload_part(&env, &bucket, &upload, 3, &p3).await;

    let entry = env
        .store
        .complete_multipart(
            &bucket,
            &upload,
            &[(1, i1.etag.clone()), (2, i2.etag.clone()), (3, i3.etag.clone())],
        )
        .await
        .expect("complete");

    assert_eq!(entry.size, 37 * MIB as u64);
    let expected = compute_multipart_etag(&[
        compute_md5(&p1),
        compute_md5(&p2),
        compute_md5(&p3),
    ]);
    assert!(expected.ends_with("-3"));
    assert_eq!(entry.etag, expected);

    let head = env
        .store
        .head_object(&bucket, "obj", None, &Conditions::default())
        .await
        .expect("head");
    assert_eq!(head.size, 37 * MIB as u64);
    assert_eq!(head.etag, expected);
}

#[tokio::test]
async fn test_should_read_completed_upload_byte_for_byte() {
    // A full-range GET returns concat(p1, p2, p3) exactly; interior
    // ranges crossing part boundaries stitch correctly.
    let env = env().await;
    let bucket = make_bucket(&env, "mp").await;
    let upload = env
        .store
        .initiate_multipart(&bucket, "obj", "owner-mp", Attrs::new())
        .await
        .expect("initiate");

    let p1: Vec<u8> = (0..6 * MIB).map(|i| (i % 251) as u8).collect();
    let p2: Vec<u8> = (0..6 * MIB).map(|i| (i % 239) as u8).collect();
    let p3: Vec<u8> = (0..2 * MIB).map(|i| (i % 233) as u8).collect();
    let i1 = upload_part(&env, &bucket, &upload, 1, &p1).await;
    let i2 = upload_part(&env, &bucket, &upload, 2, &p2).await;
    let i3 = upload_part(&env, &bucket, &upload, 3, &p3).await;

    env.store
        .complete_multipart(
            &bucket,
            &upload,
            &[(1, i1.etag), (2, i2.etag), (3, i3.etag)],
        )
        .await
        .expect("complete");

    let mut expected = p1.clone();
    expected.extend_from_slice(&p2);
    expected.extend_from_slice(&p3);

    let (_, data) = env
        .store
        .read_object(&bucket, "obj", None, None, &Conditions::default())
        .await
        .expect("full read");
    assert_eq!(data.len(), expected.len());
    assert_eq!(data.as_ref(), &expected[..]);

    // A range spanning the p1/p2 boundary.
    let start = 6 * MIB - 1000;
    let end = 6 * MIB + 1000;
    let (_, range) = env
        .store
        .read_object(
            &bucket,
            "obj",
            None,
            Some((start as u64, end as u64)),
            &Conditions::default(),
        )
        .await
        .expect("boundary read");
    assert_eq!(range.as_ref(), &expected[start..=end]);
}

#[tokio::test]
async fn test_should_restore_stats_after_abort() {
    // Five 10 MiB parts staged and aborted: the bucket's statistics
    // return to their pre-initiate values.
    let env = env().await;
    let bucket = make_bucket(&env, "mp").await;
    let before = env.store.bucket_stats(&bucket).await.expect("stats");

    let upload = env
        .store
        .initiate_multipart(&bucket, "aborted", "owner-mp", Attrs::new())
        .await
        .expect("initiate");
    for num in 1..=5u32 {
        upload_part(&env, &bucket, &upload, num, &vec![num as u8; 10 * MIB]).await;
    }

    let staged = env.store.bucket_stats(&bucket).await.expect("stats");
    assert_eq!(
        staged.category(ObjCategory::Main).total_size,
        50 * MIB as u64
    );

    env.store
        .abort_multipart(&bucket, &upload)
        .await
        .expect("abort");

    let after = env.store.bucket_stats(&bucket).await.expect("stats");
    assert_eq!(
        after.category(ObjCategory::Main),
        before.category(ObjCategory::Main)
    );

    // No part container, part record, or in-progress record remains.
    assert_eq!(env.svc.object_count(), 0);
    let (parts, _, _) = env
        .store
        .list_parts(&bucket, &upload, 100, 0)
        .await
        .expect("list parts");
    assert!(parts.is_empty());
    let (uploads, _) = env
        .store
        .list_multipart_uploads(&bucket, "", "", 100)
        .await
        .expect("list uploads");
    assert!(uploads.is_empty());
}

#[tokio::test]
async fn test_should_run_tiered_upload_end_to_end() {
    // The tiered strategy stages all parts in one composite container;
    // full-stride parts read back contiguously after completion.
    let cfg = StoreConfig::builder().tiered_enabled(true).build();
    let env = env_with(cfg).await;
    let bucket = make_bucket(&env, "mp").await;
    let upload = env
        .store
        .initiate_multipart(&bucket, "tiered", "owner-mp", Attrs::new())
        .await
        .expect("initiate");
    assert!(upload.info.tiered);

    // Full 15 MiB strides plus a short tail, the layout the fixed-stride
    // placement supports.
    let p1 = vec![0xA1u8; 15 * MIB];
    let p2 = vec![0xB2u8; 15 * MIB];
    let p3 = vec![0xC3u8; 3 * MIB];
    let i1 = upload_part(&env, &bucket, &upload, 1, &p1).await;
    let i2 = upload_part(&env, &bucket, &upload, 2, &p2).await;
    let i3 = upload_part(&env, &bucket, &upload, 3, &p3).await;

    let entry = env
        .store
        .complete_multipart(
            &bucket,
            &upload,
            &[(1, i1.etag), (2, i2.etag), (3, i3.etag)],
        )
        .await
        .expect("complete");
    assert_eq!(entry.size, 33 * MIB as u64);

    // Only two containers exist: the composite root and its layer.
    assert_eq!(env.svc.object_count(), 2);

    let (_, data) = env
        .store
        .read_object(&bucket, "tiered", None, None, &Conditions::default())
        .await
        .expect("read");
    let mut expected = p1.clone();
    expected.extend_from_slice(&p2);
    expected.extend_from_slice(&p3);
    assert_eq!(data.len(), expected.len());
    assert_eq!(data.as_ref(), &expected[..]);
}

#[tokio::test]
async fn test_should_delete_completed_upload_with_all_parts() {
    // Deleting a completed multipart object destroys every part
    // container and its part records.
    let env = env().await;
    let bucket = make_bucket(&env, "mp").await;
    let upload = env
        .store
        .initiate_multipart(&bucket, "obj", "owner-mp", Attrs::new())
        .await
        .expect("initiate");
    let i1 = upload_part(&env, &bucket, &upload, 1, &vec![1u8; 6 * MIB]).await;
    let i2 = upload_part(&env, &bucket, &upload, 2, &vec![2u8; MIB]).await;
    env.store
        .complete_multipart(&bucket, &upload, &[(1, i1.etag), (2, i2.etag)])
        .await
        .expect("complete");
    assert_eq!(env.svc.object_count(), 2);

    env.store
        .delete_object(&bucket, "obj", None, "owner-mp")
        .await
        .expect("delete");
    assert_eq!(env.svc.object_count(), 0);

    let stats = env.store.bucket_stats(&bucket).await.expect("stats");
    assert_eq!(stats.category(ObjCategory::Main).num_entries, 0);
    assert_eq!(stats.category(ObjCategory::Main).total_size, 0);
}

#[tokio::test]
async fn test_should_abort_all_uploads_on_bucket_removal() {
    let env = env().await;
    let bucket = make_bucket(&env, "mp").await;
    for name in ["one", "two", "three"] {
        let upload = env
            .store
            .initiate_multipart(&bucket, name, "owner-mp", Attrs::new())
            .await
            .expect("initiate");
        upload_part(&env, &bucket, &upload, 1, &vec![5u8; MIB]).await;
    }

    env.store.remove_bucket("", "mp").await.expect("remove bucket");
    assert_eq!(env.svc.object_count(), 0);
    assert!(env
        .store
        .load_bucket("", "mp")
        .await
        .expect_err("bucket gone")
        .is_not_found());
}
