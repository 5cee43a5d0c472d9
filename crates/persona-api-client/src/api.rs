//! Admin file endpoints.
//!
//! Response types come from `persona_core::models`.

use persona_core::{
    CharacterImageTransfer, CopyFileRequest, MarkUploadedResponse, UploadFolder,
    UploadUrlRequest, UploadUrlResponse,
};

use crate::error::{ClientError, ImportError};
use crate::gateway::{ApiRequest, Gateway};
use crate::normalize::{expect_success, read_json};

pub const SIGN_FAILED_MESSAGE: &str = "Failed to prepare upload";
pub const FINALIZE_FAILED_MESSAGE: &str = "Failed to finalize upload";
pub const COPY_FAILED_MESSAGE: &str = "Failed to copy file";

impl Gateway {
    /// Request a presigned upload target and the provisional `PENDING` record.
    pub async fn request_upload_url(
        &self,
        file_name: &str,
        mime: &str,
        folder: UploadFolder,
    ) -> Result<UploadUrlResponse, ClientError> {
        let body = UploadUrlRequest {
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            folder,
        };
        let request = ApiRequest::post("/admin/files/upload-url").json(&body)?;
        let response = self.send(&request).await?;
        read_json(response, SIGN_FAILED_MESSAGE).await
    }

    /// Confirm that the bytes for `file_id` reached storage.
    pub async fn mark_uploaded(&self, file_id: &str) -> Result<MarkUploadedResponse, ClientError> {
        let path = format!(
            "/admin/files/{}/mark-uploaded",
            urlencoding::encode(file_id)
        );
        let response = self.send(&ApiRequest::patch(path)).await?;
        read_json(response, FINALIZE_FAILED_MESSAGE).await
    }

    /// Register a copy of an existing stored file.
    pub async fn copy_file(&self, file: &CopyFileRequest) -> Result<(), ClientError> {
        let request = ApiRequest::post("/admin/files/copy").json(file)?;
        let response = self.send(&request).await?;
        expect_success(response, COPY_FAILED_MESSAGE).await?;
        Ok(())
    }

    /// Copy every image of a transfer payload, in order.
    ///
    /// The payload is validated first. The first failing copy stops the
    /// import; the error reports how many images were already copied.
    pub async fn import_transfer(
        &self,
        transfer: &CharacterImageTransfer,
    ) -> Result<usize, ImportError> {
        transfer.validate()?;

        let total = transfer.images.len();
        let mut copied = 0;
        for image in transfer.copy_requests() {
            if let Err(source) = self.copy_file(image).await {
                tracing::warn!(
                    file_id = %image.id,
                    copied,
                    total,
                    error = %source,
                    "Transfer import stopped"
                );
                return Err(ImportError::Copy {
                    copied,
                    total,
                    file_id: image.id.clone(),
                    source,
                });
            }
            copied += 1;
            tracing::debug!(file_id = %image.id, copied, total, "Image copied");
        }

        tracing::info!(
            character_id = transfer.character_id.as_deref().unwrap_or("-"),
            copied,
            "Transfer import complete"
        );
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{NoRefresh, TokenStore};
    use mockito::Matcher;
    use persona_core::FileStatus;
    use serde_json::json;
    use std::sync::Arc;

    fn gateway(url: String) -> Gateway {
        Gateway::with_client(
            reqwest::Client::new(),
            url,
            TokenStore::new(Some("t".to_string())),
            Arc::new(NoRefresh),
        )
    }

    fn transfer(ids: &[&str]) -> CharacterImageTransfer {
        let images = ids
            .iter()
            .map(|id| CopyFileRequest {
                id: id.to_string(),
                name: format!("{}.png", id),
                path: format!("public/{}.png", id),
                dir: "public".to_string(),
                status: FileStatus::Uploaded,
                mime: "image/png".to_string(),
                url: None,
            })
            .collect();
        CharacterImageTransfer {
            version: 1,
            character_id: Some("char-1".to_string()),
            exported_at: None,
            images,
        }
    }

    #[tokio::test]
    async fn test_request_upload_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/admin/files/upload-url")
            .match_header("authorization", "Bearer t")
            .match_body(Matcher::Json(json!({
                "fileName": "a.png", "mime": "image/png", "folder": "private"
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "presigned": { "url": "https://bucket.example.com", "fields": { "key": "private/a.png" } },
                    "file": { "id": "f-1", "name": "a.png", "directory": "private", "path": "private/a.png", "status": "PENDING", "mime": "image/png" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let gw = gateway(server.url());
        let signed = gw
            .request_upload_url("a.png", "image/png", UploadFolder::Private)
            .await
            .unwrap();
        assert_eq!(signed.file.status, FileStatus::Pending);
        assert_eq!(signed.presigned.fields["key"], "private/a.png");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mark_uploaded_error_uses_finalize_fallback() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PATCH", "/admin/files/f-1/mark-uploaded")
            .with_status(404)
            .with_body(r#"{"code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let err = gateway(server.url()).mark_uploaded("f-1").await.unwrap_err();
        let api = err.api_error().unwrap();
        assert_eq!(api.status_code, 404);
        assert_eq!(api.message, FINALIZE_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_copy_file_empty_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/admin/files/copy")
            .match_body(Matcher::PartialJson(json!({ "id": "a", "dir": "public" })))
            .with_status(204)
            .create_async()
            .await;

        let gw = gateway(server.url());
        gw.copy_file(&transfer(&["a"]).images[0]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_import_stops_at_first_failure() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/admin/files/copy")
            .match_body(Matcher::PartialJson(json!({ "id": "a" })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let conflict = server
            .mock("POST", "/admin/files/copy")
            .match_body(Matcher::PartialJson(json!({ "id": "b" })))
            .with_status(409)
            .with_body(r#"{"error":{"code":"CONFLICT"}}"#)
            .expect(1)
            .create_async()
            .await;
        let never = server
            .mock("POST", "/admin/files/copy")
            .match_body(Matcher::PartialJson(json!({ "id": "c" })))
            .expect(0)
            .create_async()
            .await;

        let gw = gateway(server.url());
        let err = gw.import_transfer(&transfer(&["a", "b", "c"])).await.unwrap_err();
        match err {
            ImportError::Copy {
                copied,
                total,
                file_id,
                source,
            } => {
                assert_eq!(copied, 1);
                assert_eq!(total, 3);
                assert_eq!(file_id, "b");
                assert_eq!(source.api_error().unwrap().code.as_deref(), Some("CONFLICT"));
            }
            other => panic!("unexpected error: {other}"),
        }
        ok.assert_async().await;
        conflict.assert_async().await;
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_payload_without_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/admin/files/copy")
            .expect(0)
            .create_async()
            .await;

        let gw = gateway(server.url());
        let err = gw.import_transfer(&transfer(&["a", "a"])).await.unwrap_err();
        assert!(matches!(err, ImportError::Invalid(_)));
        mock.assert_async().await;
    }
}
