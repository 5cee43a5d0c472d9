//! Data models for the admin client
//!
//! Wire types for the admin file endpoints and the character-image transfer
//! payload used to move assets between environments.

mod file;
pub mod transfer;

pub use file::*;
pub use transfer::{CharacterImageTransfer, TransferError, TransferImage, TRANSFER_VERSION};
