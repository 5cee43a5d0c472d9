//! Character-image transfer payloads
//!
//! An export bundles the uploaded image files of a character so they can be
//! re-registered in another environment through the file copy endpoint.
//! Imports are validated up front and every problem is reported at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{CopyFileRequest, FileRecord, FileStatus, UploadFolder};
use crate::config::is_http_url;

/// Only payload version currently understood.
pub const TRANSFER_VERSION: u32 = 1;

/// One image in a transfer payload. Same shape as the copy request body.
pub type TransferImage = CopyFileRequest;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Transfer payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Transfer payload is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("File {0} is not uploaded and cannot be exported")]
    NotUploaded(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterImageTransfer {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    pub images: Vec<TransferImage>,
}

impl CharacterImageTransfer {
    /// Build an export payload. Every record must already be `UPLOADED`.
    pub fn export(
        character_id: Option<String>,
        records: &[FileRecord],
    ) -> Result<Self, TransferError> {
        if let Some(pending) = records.iter().find(|r| !r.is_uploaded()) {
            return Err(TransferError::NotUploaded(pending.id.clone()));
        }

        let transfer = Self {
            version: TRANSFER_VERSION,
            character_id,
            exported_at: Some(Utc::now()),
            images: records.iter().map(CopyFileRequest::from).collect(),
        };
        transfer.validate()?;
        Ok(transfer)
    }

    /// Parse and validate an import payload.
    pub fn parse(json: &str) -> Result<Self, TransferError> {
        let transfer: Self = serde_json::from_str(json)?;
        transfer.validate()?;
        Ok(transfer)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        let mut problems = Vec::new();

        if self.version != TRANSFER_VERSION {
            problems.push(format!(
                "unsupported version {} (expected {})",
                self.version, TRANSFER_VERSION
            ));
        }

        if self.images.is_empty() {
            problems.push("no images to transfer".to_string());
        }

        let mut seen = HashSet::new();
        for (index, image) in self.images.iter().enumerate() {
            let label = if image.id.trim().is_empty() {
                format!("image #{}", index + 1)
            } else {
                format!("image {}", image.id)
            };

            for (field, value) in [
                ("id", &image.id),
                ("name", &image.name),
                ("path", &image.path),
                ("mime", &image.mime),
            ] {
                if value.trim().is_empty() {
                    problems.push(format!("{}: {} is empty", label, field));
                }
            }

            if image.status != FileStatus::Uploaded {
                problems.push(format!("{}: status is {}, expected UPLOADED", label, image.status));
            }

            if image.dir.parse::<UploadFolder>().is_err() {
                problems.push(format!(
                    "{}: dir '{}' must be public or private",
                    label, image.dir
                ));
            }

            if let Some(url) = &image.url {
                if !is_http_url(url) {
                    problems.push(format!("{}: url '{}' is not an http(s) URL", label, url));
                }
            }

            if !image.id.trim().is_empty() && !seen.insert(image.id.as_str()) {
                problems.push(format!("{}: duplicate id", label));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TransferError::Invalid(problems))
        }
    }

    /// Copy requests in payload order.
    pub fn copy_requests(&self) -> impl Iterator<Item = &CopyFileRequest> {
        self.images.iter()
    }
}
