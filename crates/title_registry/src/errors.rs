//! Error types for the title registry

use crate::types::EntryId;
use thiserror::Error;

/// Stable numeric result codes returned across the call surface.
///
/// `DuplicateEntry`, `PermissionDenied` and `ViewingRestricted` are reserved:
/// no operation currently produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Unauthorized = 300,
    EntryNotFound = 301,
    DuplicateEntry = 302,
    InvalidTitleName = 303,
    InvalidDocumentSize = 304,
    PermissionDenied = 305,
    NotTitleHolder = 306,
    ViewingRestricted = 307,
    InvalidTagFormat = 308,
}

impl ErrorCode {
    /// Numeric value of the code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

#[derive(Error, Debug)]
pub enum TitleRegistryError {
    #[error("Unauthorized caller")]
    Unauthorized,

    #[error("Title entry not found: {entry_id}")]
    EntryNotFound { entry_id: EntryId },

    #[error("Title entry already exists: {entry_id}")]
    DuplicateEntry { entry_id: EntryId },

    /// Also raised for an out-of-range description.
    #[error("Invalid title name or description")]
    InvalidTitleName,

    #[error("Invalid document size: {size}")]
    InvalidDocumentSize { size: u64 },

    #[error("Permission denied for entry {entry_id}")]
    PermissionDenied { entry_id: EntryId },

    #[error("Caller is not the title holder of entry {entry_id}")]
    NotTitleHolder { entry_id: EntryId },

    #[error("Viewing restricted for entry {entry_id}")]
    ViewingRestricted { entry_id: EntryId },

    #[error("Invalid tag format")]
    InvalidTagFormat,

    #[error("Registry storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Entry id space exhausted")]
    IdSpaceExhausted,
}

impl TitleRegistryError {
    /// Stable result code, or `None` for backend and capacity faults.
    pub fn code(&self) -> Option<ErrorCode> {
        let code = match self {
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::EntryNotFound { .. } => ErrorCode::EntryNotFound,
            Self::DuplicateEntry { .. } => ErrorCode::DuplicateEntry,
            Self::InvalidTitleName => ErrorCode::InvalidTitleName,
            Self::InvalidDocumentSize { .. } => ErrorCode::InvalidDocumentSize,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::NotTitleHolder { .. } => ErrorCode::NotTitleHolder,
            Self::ViewingRestricted { .. } => ErrorCode::ViewingRestricted,
            Self::InvalidTagFormat => ErrorCode::InvalidTagFormat,
            Self::Storage(_) | Self::Serialization(_) | Self::IdSpaceExhausted => return None,
        };
        Some(code)
    }
}

#[cfg(feature = "persistent")]
impl From<sled::Error> for TitleRegistryError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(feature = "persistent")]
impl From<bincode::Error> for TitleRegistryError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TitleRegistryError>;
