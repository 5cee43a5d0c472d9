//! Client-side file validation
//!
//! Runs before anything is sent to the backend. The accepted-type list uses
//! the same syntax as an HTML `accept` attribute: `image/png`, `image/*` and
//! `.png` entries separated by commas.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported file type: {name}")]
    UnknownType { name: String },

    #[error("File type {mime} is not allowed for {name}")]
    TypeNotAccepted { name: String, mime: String },

    #[error("File {name} is too large (max {max_mb} MB)")]
    TooLarge { name: String, max_mb: u64 },
}

/// A file picked by the user, held in memory until it is uploaded.
#[derive(Clone)]
pub struct SelectedFile {
    pub name: String,
    /// MIME type reported by the picker, if any
    pub mime: Option<String>,
    pub data: Bytes,
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.data.len())
            .finish()
    }
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.filter(|m| !m.trim().is_empty()),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared MIME type, or the one implied by the file extension.
    pub fn resolved_mime(&self) -> Option<String> {
        if let Some(mime) = &self.mime {
            return Some(mime.trim().to_lowercase());
        }
        mime_guess::from_path(&self.name)
            .first()
            .map(|m| m.essence_str().to_string())
    }

    fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptEntry {
    Mime(String),
    /// Top-level type of a `type/*` entry
    Wildcard(String),
    /// Extension without the leading dot
    Extension(String),
}

/// Set of accepted file types. An empty list accepts every resolvable type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptList {
    entries: Vec<AcceptEntry>,
}

impl FromStr for AcceptList {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| {
                if let Some(ext) = e.strip_prefix('.') {
                    AcceptEntry::Extension(ext.to_string())
                } else if let Some(top) = e.strip_suffix("/*") {
                    AcceptEntry::Wildcard(top.to_string())
                } else {
                    AcceptEntry::Mime(e)
                }
            })
            .collect();
        Ok(Self { entries })
    }
}

impl AcceptList {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn accepts(&self, mime: &str, extension: Option<&str>) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries.iter().any(|entry| match entry {
            AcceptEntry::Mime(accepted) => accepted == mime,
            AcceptEntry::Wildcard(top) => mime
                .split_once('/')
                .map(|(t, _)| t == top)
                .unwrap_or(false),
            AcceptEntry::Extension(ext) => extension == Some(ext.as_str()),
        })
    }

    /// Validate a candidate file, returning the MIME type to upload it with.
    pub fn validate(
        &self,
        file: &SelectedFile,
        max_size_mb: Option<u64>,
    ) -> Result<String, ValidationError> {
        let mime = file.resolved_mime().ok_or_else(|| ValidationError::UnknownType {
            name: file.name.clone(),
        })?;

        if !self.accepts(&mime, file.extension().as_deref()) {
            return Err(ValidationError::TypeNotAccepted {
                name: file.name.clone(),
                mime,
            });
        }

        if let Some(max_mb) = max_size_mb {
            if file.size() > max_mb.saturating_mul(BYTES_PER_MB) {
                return Err(ValidationError::TooLarge {
                    name: file.name.clone(),
                    max_mb,
                });
            }
        }

        Ok(mime)
    }
}
