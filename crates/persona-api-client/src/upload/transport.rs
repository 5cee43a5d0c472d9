//! Binary upload leg.
//!
//! The file goes straight to object storage as a multipart POST against the
//! presigned URL. This leg is unauthenticated and never passes through the
//! gateway.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use persona_core::{PresignedUpload, SelectedFile};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Upload cancelled")]
    Cancelled,

    #[error("Storage rejected the upload with status {0}")]
    Status(u16),

    #[error("Upload request failed: {0}")]
    Network(String),
}

/// Receives `(bytes_sent, bytes_total)` for every progress event.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Sends a file to a presigned storage target.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Upload `file` with the presigned form fields followed by a `file` part.
    ///
    /// Must return [`TransportError::Cancelled`] promptly once `cancel` fires,
    /// abandoning the in-flight request.
    async fn upload(
        &self,
        presigned: &PresignedUpload,
        file: &SelectedFile,
        mime: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;
}

/// [`UploadTransport`] backed by `reqwest`, reporting progress as the body is streamed.
#[derive(Debug, Clone)]
pub struct ReqwestUploadTransport {
    client: Client,
    chunk_size: usize,
}

impl ReqwestUploadTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for ReqwestUploadTransport {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl UploadTransport for ReqwestUploadTransport {
    async fn upload(
        &self,
        presigned: &PresignedUpload,
        file: &SelectedFile,
        mime: &str,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let total = file.size();
        let chunks: Vec<Bytes> = (0..file.data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(file.data.len());
                file.data.slice(start..end)
            })
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let sent = Arc::new(AtomicU64::new(0));
        let body = futures::stream::iter(chunks).map(move |chunk| {
            let so_far = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
            let _ = tx.send(so_far);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut form = Form::new();
        for (key, value) in &presigned.fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part("file", part);

        tracing::debug!(url = %presigned.url, size_bytes = total, "Uploading file to storage");

        let request = self.client.post(&presigned.url).multipart(form).send();
        tokio::pin!(request);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(file_name = %file.name, "Storage upload aborted");
                    return Err(TransportError::Cancelled);
                }
                result = &mut request => {
                    while let Ok(so_far) = rx.try_recv() {
                        progress(so_far, total);
                    }
                    let response = result.map_err(|e| TransportError::Network(e.to_string()))?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(TransportError::Status(status.as_u16()));
                    }
                    return Ok(());
                }
                Some(so_far) = rx.recv() => progress(so_far, total),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    fn presigned(url: String) -> PresignedUpload {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), "public/a.png".to_string());
        fields.insert("policy".to_string(), "p0l1cy".to_string());
        PresignedUpload { url, fields }
    }

    #[tokio::test]
    async fn test_upload_sends_fields_and_file_with_progress() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bucket")
            .match_header("authorization", Matcher::Missing)
            .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="key""#.into()),
                Matcher::Regex("public/a.png".into()),
                Matcher::Regex(r#"name="policy""#.into()),
                Matcher::Regex(r#"name="file"; filename="a.png""#.into()),
                Matcher::Regex("PNGDATA".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        let transport = ReqwestUploadTransport::default().with_chunk_size(3);
        let file = SelectedFile::new("a.png", None, b"PNGDATA".to_vec());
        let events = Mutex::new(Vec::new());
        let on_progress = |sent: u64, total: u64| events.lock().push((sent, total));

        transport
            .upload(
                &presigned(format!("{}/bucket", server.url())),
                &file,
                "image/png",
                &on_progress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = events.into_inner();
        assert_eq!(events.last(), Some(&(7, 7)));
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_non_2xx_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bucket")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .create_async()
            .await;

        let transport = ReqwestUploadTransport::default();
        let file = SelectedFile::new("a.png", None, b"PNGDATA".to_vec());
        let err = transport
            .upload(
                &presigned(format!("{}/bucket", server.url())),
                &file,
                "image/png",
                &|_, _| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status(403)));
    }

    #[tokio::test]
    async fn test_upload_cancelled_before_start() {
        let transport = ReqwestUploadTransport::default();
        let file = SelectedFile::new("a.png", None, b"PNGDATA".to_vec());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transport
            .upload(
                &presigned("http://127.0.0.1:9/bucket".to_string()),
                &file,
                "image/png",
                &|_, _| {},
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
