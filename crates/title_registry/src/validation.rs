//! Field validation for title registrations and updates.

use crate::errors::{Result, TitleRegistryError};
use crate::types::TitleFields;

pub const MAX_TITLE_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 128;
/// Exclusive upper bound on `document_size`.
pub const MAX_DOCUMENT_SIZE: u64 = 1_000_000_000;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 32;

fn len_within(text: &str, max: usize) -> bool {
    let len = text.chars().count();
    (1..=max).contains(&len)
}

/// Validate caller-supplied title content. The first failing check wins:
/// title, document size, description, tags.
pub fn validate_fields(fields: &TitleFields) -> Result<()> {
    if !len_within(&fields.title, MAX_TITLE_LEN) {
        return Err(TitleRegistryError::InvalidTitleName);
    }

    if fields.document_size == 0 || fields.document_size >= MAX_DOCUMENT_SIZE {
        return Err(TitleRegistryError::InvalidDocumentSize {
            size: fields.document_size,
        });
    }

    // Descriptions share the title-name error kind.
    if !len_within(&fields.description, MAX_DESCRIPTION_LEN) {
        return Err(TitleRegistryError::InvalidTitleName);
    }

    validate_tags(&fields.tags)
}

pub fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.is_empty() || tags.len() > MAX_TAGS {
        return Err(TitleRegistryError::InvalidTagFormat);
    }

    if tags.iter().any(|tag| !len_within(tag, MAX_TAG_LEN)) {
        return Err(TitleRegistryError::InvalidTagFormat);
    }

    Ok(())
}
