//! Presigned upload flow: sign, upload to object storage, finalize.

mod controller;
mod transport;

pub use controller::{
    progress_percent, UploadController, UploadEvents, UploadOptions, UploadPhase, UploadSession,
    UPLOAD_CANCELLED_MESSAGE, UPLOAD_FAILED_MESSAGE,
};
pub use transport::{ProgressFn, ReqwestUploadTransport, TransportError, UploadTransport};
