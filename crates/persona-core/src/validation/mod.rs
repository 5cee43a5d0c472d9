//! Validation modules

pub mod file;

pub use file::{AcceptList, SelectedFile, ValidationError, BYTES_PER_MB};
