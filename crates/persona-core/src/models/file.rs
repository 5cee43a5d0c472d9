use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Created by the sign call; bytes may not be in storage yet
    Pending,
    /// Confirmed by the mark-uploaded call
    Uploaded,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "PENDING"),
            FileStatus::Uploaded => write!(f, "UPLOADED"),
        }
    }
}

/// Destination folder for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFolder {
    #[default]
    Public,
    Private,
}

impl UploadFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFolder::Public => "public",
            UploadFolder::Private => "private",
        }
    }
}

impl fmt::Display for UploadFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadFolder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(UploadFolder::Public),
            "private" => Ok(UploadFolder::Private),
            other => Err(format!("Unknown folder '{}', expected public or private", other)),
        }
    }
}

/// A file known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub directory: String,
    pub path: String,
    pub status: FileStatus,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl FileRecord {
    pub fn is_uploaded(&self) -> bool {
        self.status == FileStatus::Uploaded
    }
}

/// Body of `POST /admin/files/upload-url`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_name: String,
    pub mime: String,
    pub folder: UploadFolder,
}

/// Presigned POST target for direct upload to object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUpload {
    pub url: String,
    /// Form fields that must precede the file part
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Response of `POST /admin/files/upload-url`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub presigned: PresignedUpload,
    /// Provisional record, status `PENDING`
    pub file: FileRecord,
}

/// Response of `PATCH /admin/files/{id}/mark-uploaded`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkUploadedResponse {
    pub success: bool,
}

/// Body of `POST /admin/files/copy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFileRequest {
    pub id: String,
    pub name: String,
    pub path: String,
    pub dir: String,
    pub status: FileStatus,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&FileRecord> for CopyFileRequest {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            path: record.path.clone(),
            dir: record.directory.clone(),
            status: record.status,
            mime: record.mime.clone(),
            url: record.url.clone(),
        }
    }
}
