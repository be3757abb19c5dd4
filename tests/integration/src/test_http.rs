//! HTTP API against a running server.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use reqwest::header::{
        ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE,
    };
    use serde_json::{Value, json};

    use crate::{multipart_file, server_url};

    async fn upload(
        client: &reqwest::Client,
        path: &str,
        name: &str,
        token: Option<&str>,
    ) -> reqwest::Response {
        let (content_type, body) = multipart_file(name, "text/plain", b"integration payload");
        let mut request = client
            .post(format!("{}{path}", server_url()))
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request.send().await.expect("upload request")
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_health() {
        let resp = reqwest::get(format!("{}/health", server_url())).await.expect("health");

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
        let body: Value = resp.json().await.expect("json");
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_download_and_extend() {
        let client = reqwest::Client::new();

        let resp = upload(&client, "/api/documents", "quarterly:report.txt", None).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = resp.json().await.expect("json");
        let id = created["id"].as_str().expect("id").to_owned();
        assert_eq!(created["permanent"], false);

        let resp = client
            .get(format!("{}/api/documents/{id}", server_url()))
            .send()
            .await
            .expect("download");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"quarterly_report.txt\""
        );
        assert_eq!(resp.bytes().await.expect("body").as_ref(), b"integration payload");

        let resp = client
            .post(format!("{}/api/documents/{id}/extend", server_url()))
            .json(&json!({ "minutes": 30 }))
            .send()
            .await
            .expect("extend");
        assert_eq!(resp.status(), StatusCode::OK);
        let extended: Value = resp.json().await.expect("json");
        assert_eq!(extended["id"], id.as_str());

        let listed: Value = client
            .get(format!("{}/api/documents", server_url()))
            .send()
            .await
            .expect("list")
            .json()
            .await
            .expect("json");
        let items = listed["items"].as_array().expect("items");
        assert!(items.iter().any(|item| item["id"] == id.as_str()));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_bad_requests() {
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/documents", server_url()))
            .body("no multipart here")
            .send()
            .await
            .expect("upload");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = client
            .get(format!("{}/api/documents/{}", server_url(), uuid::Uuid::new_v4()))
            .send()
            .await
            .expect("download");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.expect("json");
        assert_eq!(body["message"], "File not found or expired.");

        let wrong = Some("definitely-wrong");
        let resp = upload(&client, "/api/documents/permanent", "p.txt", wrong).await;
        assert!(
            matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::INTERNAL_SERVER_ERROR),
            "unexpected status {}",
            resp.status()
        );
    }
}
