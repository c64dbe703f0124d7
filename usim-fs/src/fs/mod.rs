//! Card file system model
//!
//! This module contains the building blocks of the card's file hierarchy:
//! elementary files with declarative byte layouts, the MF/DF/ADF containers
//! that own them, and the per-session runtime tree with its application
//! registry.
//!
//! # Example
//! ```ignore
//! use usim_fs::fs::{ElementaryFile, FieldLayout, FileId, SizeConstraint};
//!
//! let ef = ElementaryFile::new(
//!     FileId::new(0xFF03), None, "EF.R1R5", "Rotating parameters",
//!     SizeConstraint::Exact(5),
//!     FieldLayout::bytes(&["R1", "R2", "R3", "R4", "R5"]),
//! )?;
//! let fields = ef.decode("1122334455")?;
//! assert_eq!(fields.get("R3"), Some("33"));
//! ```

mod container;
mod ef;
mod layout;
mod status;
mod tree;

pub use container::{Container, ContainerKind, Node, SelectResponseDecoder};
pub use ef::{EfNode, ElementaryFile, FileId};
pub use layout::{Field, FieldLayout, FieldLength, Fields, SizeConstraint};
pub use status::SW;
pub use tree::{ApplicationRegistry, RuntimeTree};

use thiserror::Error;

/// Errors raised by the file system model
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// A descriptor's size constraint or field layout is inconsistent
    #[error("Invalid configuration for {file}: {reason}")]
    Configuration { file: String, reason: String },

    /// A raw value's length is outside the file's declared bound
    #[error("{file}: length {actual} violates size constraint {constraint}")]
    SizeConstraintViolation {
        file: String,
        actual: usize,
        constraint: SizeConstraint,
    },

    /// Input cannot be mapped onto the declared layout
    #[error("{file}: malformed data: {reason}")]
    MalformedData { file: String, reason: String },

    /// A sibling with the same file id already exists
    #[error("File {fid} already exists in {parent}")]
    DuplicateFileId { fid: FileId, parent: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid ATR: {0}")]
    InvalidAtr(String),

    #[error("Invalid AID: {0}")]
    InvalidAid(String),
}

impl FsError {
    /// ISO 7816-4 status word a card would answer for the same condition
    pub fn status_word(&self) -> u16 {
        match self {
            FsError::Configuration { .. } => SW::UNKNOWN_ERROR,
            FsError::SizeConstraintViolation { .. } => SW::WRONG_LENGTH,
            FsError::MalformedData { .. } => SW::WRONG_DATA,
            FsError::DuplicateFileId { .. } => SW::FILE_ALREADY_EXISTS,
            FsError::FileNotFound(_) => SW::FILE_NOT_FOUND,
            FsError::InvalidAtr(_) | FsError::InvalidAid(_) => SW::WRONG_DATA,
        }
    }
}

/// Result alias used throughout the file system model
pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_mapping() {
        let dup = FsError::DuplicateFileId {
            fid: FileId::new(0x7FF0),
            parent: "MF".to_string(),
        };
        assert_eq!(dup.status_word(), 0x6A89);
        assert_eq!(FsError::FileNotFound("3f00/7ff0".into()).status_word(), 0x6A82);

        let short = FsError::SizeConstraintViolation {
            file: "EF.K".into(),
            actual: 15,
            constraint: SizeConstraint::Exact(16),
        };
        assert_eq!(short.status_word(), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_error_display() {
        let dup = FsError::DuplicateFileId {
            fid: FileId::new(0xA000),
            parent: "MF".to_string(),
        };
        assert_eq!(dup.to_string(), "File a000 already exists in MF");

        let short = FsError::SizeConstraintViolation {
            file: "EF.OPC".into(),
            actual: 4,
            constraint: SizeConstraint::Exact(16),
        };
        assert_eq!(short.to_string(), "EF.OPC: length 4 violates size constraint 16");
    }
}
