//! Signed client and object store against a live backend.

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::{cleanup_store, metadata, s3_client, test_store};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_provision_bucket_idempotently() {
        let store = test_store("provision").await;

        let created = store.ensure_bucket().await.expect("ensure_bucket");
        assert!(!created, "second call should find the bucket");

        cleanup_store(&store).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_round_trip_object_and_metadata() {
        let store = test_store("roundtrip").await;
        let meta = metadata(&[("Original-Name", "report%20v2.pdf"), ("permanent", "true")]);

        store
            .put_object("doc-1", Bytes::from_static(b"%PDF-1.7"), Some("application/pdf"), &meta)
            .await
            .expect("put_object");

        let object = store.get_object("doc-1").await.expect("get_object");
        assert_eq!(object.body.as_ref(), b"%PDF-1.7");
        assert_eq!(object.head.content_type(), Some("application/pdf"));
        let stored = object.head.metadata();
        assert_eq!(stored.get("original-name").map(String::as_str), Some("report%20v2.pdf"));
        assert_eq!(stored.get("permanent").map(String::as_str), Some("true"));

        // The official SDK reads back the same user metadata.
        let sdk = s3_client(store.client().config());
        let head = sdk
            .head_object()
            .bucket(store.bucket())
            .key("doc-1")
            .send()
            .await
            .expect("sdk head_object");
        assert_eq!(head.content_length(), Some(8));
        assert_eq!(
            head.metadata().and_then(|m| m.get("permanent")).map(String::as_str),
            Some("true")
        );

        cleanup_store(&store).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_sign_keys_needing_escapes() {
        let store = test_store("escapes").await;
        let key = "dir/a b(1)+~.txt";

        store
            .put_object(key, Bytes::from_static(b"x"), None, &metadata(&[]))
            .await
            .expect("put_object");
        let head = store.head_object(key).await.expect("head_object");
        assert_eq!(head.content_length(), Some(1));

        let keys = store.list_object_keys().await.expect("list");
        assert_eq!(keys, vec![key.to_owned()]);

        cleanup_store(&store).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_objects() {
        let store = test_store("missing").await;

        let err = store.head_object("nope").await.expect_err("missing object");
        assert!(err.is_not_found());
        let err = store.get_object("nope").await.expect_err("missing object");
        assert!(err.is_not_found());

        cleanup_store(&store).await;
    }
}
