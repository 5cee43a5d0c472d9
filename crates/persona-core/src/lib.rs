//! Persona Core Library
//!
//! This crate provides the domain models, error types, configuration and
//! validation shared by the Persona admin API client and CLI.

pub mod config;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ErrorMetadata, LogLevel};
pub use models::{
    CharacterImageTransfer, CopyFileRequest, FileRecord, FileStatus, MarkUploadedResponse,
    PresignedUpload, TransferError, TransferImage, UploadFolder, UploadUrlRequest,
    UploadUrlResponse,
};
pub use validation::{AcceptList, SelectedFile, ValidationError};
