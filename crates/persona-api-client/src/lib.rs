//! HTTP client for the Persona admin API.
//!
//! Provides the authenticated [`Gateway`] (bearer token injection with a
//! single refresh-and-retry on 401), the response error normalizer, the admin
//! file endpoints, and the [`UploadController`] that turns a selected file
//! into a server-confirmed [`FileRecord`] through sign, upload and finalize.

pub mod api;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod refresh;
pub mod token;
pub mod upload;

pub use error::{ClientError, ImportError, NETWORK_ERROR_MESSAGE};
pub use gateway::{ApiRequest, Gateway, RequestBody};
pub use normalize::build_error;
pub use refresh::{OAuthRefresher, SingleFlight};
pub use token::{NoRefresh, TokenRefresher, TokenStore};
pub use upload::{
    ProgressFn, ReqwestUploadTransport, TransportError, UploadController, UploadEvents, UploadOptions,
    UploadPhase, UploadSession, UploadTransport,
};

// Re-export domain types for convenience.
pub use persona_core::{
    AcceptList, ApiError, CharacterImageTransfer, ClientConfig, CopyFileRequest, FileRecord,
    FileStatus, PresignedUpload, SelectedFile, UploadFolder,
};
