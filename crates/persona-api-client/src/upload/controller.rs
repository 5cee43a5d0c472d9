//! Upload controller state machine.
//!
//! ```text
//! idle -> selected -> signing -> uploading -> finalizing -> done
//!            \           \           \            \
//!             +-----------+-----------+------------+--> error
//! ```
//!
//! A record is `UPLOADED` only in `done`, and only after the backend confirmed
//! the mark-uploaded call. Failures never escape as `Err`: they land in
//! `error` and are reported through [`UploadEvents::on_error`].

use persona_core::{AcceptList, FileRecord, FileStatus, SelectedFile, UploadFolder};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::transport::{TransportError, UploadTransport};
use crate::api::{FINALIZE_FAILED_MESSAGE, SIGN_FAILED_MESSAGE};
use crate::gateway::Gateway;

pub const UPLOAD_CANCELLED_MESSAGE: &str = "Upload cancelled";
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed, please try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Selected,
    Signing,
    Uploading,
    Finalizing,
    Done,
    Error,
}

impl UploadPhase {
    /// A sign, upload or finalize leg is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadPhase::Signing | UploadPhase::Uploading | UploadPhase::Finalizing
        )
    }
}

/// Callbacks into the owning form.
pub trait UploadEvents: Send + Sync {
    /// Called with the finalized record on `done`, and with `None` on clear.
    fn on_change(&self, record: Option<&FileRecord>);

    /// Called with the resolved message on every transition into `error`.
    fn on_error(&self, message: &str);

    fn on_progress(&self, _percent: u8) {}
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub folder: UploadFolder,
    pub accept: AcceptList,
    pub max_size_mb: Option<u64>,
}

/// State of the current upload. Owned by the controller.
#[derive(Debug, Default)]
pub struct UploadSession {
    phase: UploadPhase,
    file: Option<SelectedFile>,
    mime: Option<String>,
    record: Option<FileRecord>,
    error_message: Option<String>,
    user_message: Option<String>,
    progress: u8,
    cancel: Option<CancellationToken>,
}

impl UploadSession {
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn record(&self) -> Option<&FileRecord> {
        self.record.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Operator-facing copy for the failure: 5xx and known error codes are
    /// mapped to friendly text, network failures to a generic message.
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Cancellation handle of the in-flight upload leg, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}

/// Whole-percent progress, rounded and clamped to 0..=100.
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (sent as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Drives one file at a time through sign, upload and finalize.
pub struct UploadController<T> {
    gateway: Gateway,
    transport: T,
    options: UploadOptions,
    events: Arc<dyn UploadEvents>,
    session: UploadSession,
    teardown: CancellationToken,
}

impl<T: UploadTransport> UploadController<T> {
    pub fn new(
        gateway: Gateway,
        transport: T,
        options: UploadOptions,
        events: Arc<dyn UploadEvents>,
    ) -> Self {
        Self {
            gateway,
            transport,
            options,
            events,
            session: UploadSession::default(),
            teardown: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn phase(&self) -> UploadPhase {
        self.session.phase
    }

    pub fn is_busy(&self) -> bool {
        self.session.phase.is_busy()
    }

    /// Handle that tears the controller down from another task.
    ///
    /// Cancelling it aborts an in-flight storage upload and keeps a pending
    /// one from starting. A torn-down controller cannot upload again.
    pub fn teardown_handle(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    /// Select a file, validating it against the accepted types and size limit.
    ///
    /// Returns `false` when the selection is rejected: while busy (nothing
    /// changes) or on validation failure (the controller moves to `error`).
    pub fn select(&mut self, file: SelectedFile) -> bool {
        if self.is_busy() {
            tracing::warn!(phase = ?self.session.phase, "Selection ignored while an upload is in flight");
            return false;
        }

        self.session = UploadSession::default();

        match self.options.accept.validate(&file, self.options.max_size_mb) {
            Ok(mime) => {
                tracing::debug!(file_name = %file.name, mime = %mime, size_bytes = file.size(), "File selected");
                self.session.file = Some(file);
                self.session.mime = Some(mime);
                self.session.phase = UploadPhase::Selected;
                true
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(message.clone(), message);
                false
            }
        }
    }

    /// Run sign, upload and finalize for the selected file.
    ///
    /// Returns the finalized record on success; on failure the controller is
    /// in `error` and the error callback has been called.
    pub async fn start(&mut self) -> Option<FileRecord> {
        if self.session.phase != UploadPhase::Selected {
            tracing::warn!(phase = ?self.session.phase, "Upload start requires a selected file");
            return None;
        }
        let (Some(file), Some(mime)) = (self.session.file.clone(), self.session.mime.clone()) else {
            return None;
        };
        if self.teardown.is_cancelled() {
            self.fail_cancelled();
            return None;
        }

        // signing
        self.session.phase = UploadPhase::Signing;
        tracing::info!(
            file_name = %file.name,
            size_bytes = file.size(),
            folder = %self.options.folder,
            "Requesting upload URL"
        );
        let signed = match self
            .gateway
            .request_upload_url(&file.name, &mime, self.options.folder)
            .await
        {
            Ok(signed) => signed,
            Err(e) => {
                self.fail(
                    e.resolved_message(SIGN_FAILED_MESSAGE),
                    e.user_message(SIGN_FAILED_MESSAGE),
                );
                return None;
            }
        };
        let mut record = signed.file;
        self.session.record = Some(record.clone());

        if self.teardown.is_cancelled() {
            self.fail_cancelled();
            return None;
        }

        // uploading
        let cancel = self.teardown.child_token();
        self.session.cancel = Some(cancel.clone());
        self.session.phase = UploadPhase::Uploading;
        self.set_progress(0);

        let last_percent = AtomicU8::new(0);
        let result = {
            let events = &self.events;
            let on_progress = |sent: u64, total: u64| {
                let percent = progress_percent(sent, total);
                last_percent.store(percent, Ordering::SeqCst);
                events.on_progress(percent);
            };
            self.transport
                .upload(&signed.presigned, &file, &mime, &on_progress, &cancel)
                .await
        };
        self.session.progress = last_percent.load(Ordering::SeqCst);
        self.session.cancel = None;

        match result {
            Ok(()) => {}
            Err(TransportError::Cancelled) => {
                self.fail_cancelled();
                return None;
            }
            Err(e) => {
                tracing::warn!(file_id = %record.id, error = %e, "Storage upload failed");
                self.fail(UPLOAD_FAILED_MESSAGE.to_string(), UPLOAD_FAILED_MESSAGE.to_string());
                return None;
            }
        }

        // finalizing
        self.session.phase = UploadPhase::Finalizing;
        match self.gateway.mark_uploaded(&record.id).await {
            Ok(response) if response.success => {}
            Ok(_) => {
                self.fail(
                    FINALIZE_FAILED_MESSAGE.to_string(),
                    FINALIZE_FAILED_MESSAGE.to_string(),
                );
                return None;
            }
            Err(e) => {
                self.fail(
                    e.resolved_message(FINALIZE_FAILED_MESSAGE),
                    e.user_message(FINALIZE_FAILED_MESSAGE),
                );
                return None;
            }
        }

        // done
        record.status = FileStatus::Uploaded;
        if self.session.progress != 100 {
            self.set_progress(100);
        }
        self.session.record = Some(record.clone());
        self.session.phase = UploadPhase::Done;
        tracing::info!(file_id = %record.id, path = %record.path, "Upload finalized");
        self.events.on_change(Some(&record));
        Some(record)
    }

    /// Select `file` and, if it is accepted, upload it.
    pub async fn upload(&mut self, file: SelectedFile) -> Option<FileRecord> {
        if !self.select(file) {
            return None;
        }
        self.start().await
    }

    /// Discard the selection and any record, returning to `idle`.
    ///
    /// Rejected while busy. Notifies the form with `None`.
    pub fn clear(&mut self) -> bool {
        if self.is_busy() {
            tracing::warn!(phase = ?self.session.phase, "Clear ignored while an upload is in flight");
            return false;
        }
        self.session = UploadSession::default();
        self.events.on_change(None);
        true
    }

    fn set_progress(&mut self, percent: u8) {
        self.session.progress = percent;
        self.events.on_progress(percent);
    }

    fn fail_cancelled(&mut self) {
        self.fail(
            UPLOAD_CANCELLED_MESSAGE.to_string(),
            UPLOAD_CANCELLED_MESSAGE.to_string(),
        );
    }

    /// `message` is the resolved text handed to the form; `user_message` is
    /// the friendly copy kept on the session.
    fn fail(&mut self, message: String, user_message: String) {
        tracing::warn!(phase = ?self.session.phase, message = %message, "Upload failed");
        self.session.phase = UploadPhase::Error;
        self.session.cancel = None;
        self.session.error_message = Some(message.clone());
        self.session.user_message = Some(user_message);
        self.events.on_error(&message);
    }
}

impl<T> Drop for UploadController<T> {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}
