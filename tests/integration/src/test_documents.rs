//! Document lifecycle against a live backend.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use bytes::Bytes;
    use tempvault_documents::{
        DocumentError, DocumentManager, ManualClock, NewDocument, SweepOutcome,
    };

    use crate::{cleanup_store, test_store};

    fn now_millis() -> i64 {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        i64::try_from(elapsed.as_millis()).unwrap()
    }

    fn text(name: &str, body: &'static [u8]) -> NewDocument {
        NewDocument {
            file_name: name.to_owned(),
            content_type: Some("text/plain".to_owned()),
            body: Bytes::from_static(body),
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_run_full_document_lifecycle() {
        let store = test_store("lifecycle").await;
        let clock = Arc::new(ManualClock::new(now_millis()));
        let manager = DocumentManager::new(store.clone()).with_clock(clock.clone());

        let temp = manager.upload(text("temp.txt", b"short"), false).await.expect("upload");
        let keep = manager.upload(text("keep.txt", b"long"), true).await.expect("upload");
        assert_eq!(temp.expires_in_seconds, Some(3600));
        assert_eq!(keep.expires_at, None);

        let listed = manager.list().await.expect("list");
        assert_eq!(listed.len(), 2);

        let extended = manager.extend(&temp.id, 120.0).await.expect("extend");
        assert_eq!(extended.expires_in_seconds, 7200);
        let err = manager.extend(&keep.id, 5.0).await.expect_err("permanent");
        assert!(matches!(err, DocumentError::PermanentDocument { .. }));

        let downloaded = manager.download(&temp.id).await.expect("download");
        assert_eq!(downloaded.body.as_ref(), b"short");
        assert_eq!(downloaded.filename, "temp.txt");

        clock.advance(Duration::from_secs(3 * 3600));
        match manager.cleanup().await.expect("cleanup") {
            SweepOutcome::Completed(report) => {
                assert_eq!(report.scanned, 2);
                assert_eq!(report.deleted, 1);
                assert_eq!(report.failed, 0);
            }
            SweepOutcome::Skipped => panic!("sweep should run"),
        }

        let err = manager.download(&temp.id).await.expect_err("expired");
        assert!(matches!(err, DocumentError::NotFoundOrExpired { .. }));
        assert!(manager.download(&keep.id).await.is_ok());

        cleanup_store(&store).await;
    }
}
