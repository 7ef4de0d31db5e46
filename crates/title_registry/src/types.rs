//! Types for the title registry

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Registry-assigned identifier of a title entry.
///
/// Ids start at 1 and are never reused, even after the entry is deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian bytes, used for ordered storage keys.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Opaque identity of a calling principal (32-byte account key).
///
/// Serialized as a 64-character hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(pub [u8; 32]);

impl Principal {
    /// Create from byte array
    pub fn new(key: [u8; 32]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str.len() != 64 {
            return Err(format!(
                "Principal hex must be 64 characters, got {}",
                hex_str.len()
            ));
        }
        let mut key = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut key).map_err(|e| format!("Invalid hex: {e}"))?;
        Ok(Self(key))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Principal::from_hex(&raw).map_err(de::Error::custom)
    }
}

/// Host primitives read by every registry call.
pub trait ChainContext {
    /// Identity of the invoking party.
    fn caller(&self) -> Principal;

    /// Current chain height, used only as a creation stamp.
    fn block_height(&self) -> u64;
}

/// Plain call context supplied by the host for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Principal,
    pub block_height: u64,
}

impl CallContext {
    pub fn new(caller: Principal, block_height: u64) -> Self {
        Self {
            caller,
            block_height,
        }
    }
}

impl ChainContext for CallContext {
    fn caller(&self) -> Principal {
        self.caller
    }

    fn block_height(&self) -> u64 {
        self.block_height
    }
}

/// Caller-supplied content of a title entry.
///
/// Shared by registration and update; validated as a unit before any write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFields {
    pub title: String,
    pub document_size: u64,
    pub description: String,
    /// Insertion order is preserved.
    pub tags: Vec<String>,
}

impl TitleFields {
    pub fn new(
        title: impl Into<String>,
        document_size: u64,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            document_size,
            description: description.into(),
            tags,
        }
    }
}

/// Stored land-title record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub title_name: String,
    pub title_owner: Principal,
    /// Size of the off-chain document in bytes; the content itself is never stored.
    pub document_size: u64,
    /// Chain height at creation. Never rewritten.
    pub registration_block: u64,
    pub description: String,
    pub tags: Vec<String>,
}

impl TitleRecord {
    /// Build a fresh record owned by `owner`.
    pub fn from_fields(fields: TitleFields, owner: Principal, registration_block: u64) -> Self {
        Self {
            title_name: fields.title,
            title_owner: owner,
            document_size: fields.document_size,
            registration_block,
            description: fields.description,
            tags: fields.tags,
        }
    }

    /// Replace the mutable content, keeping owner and registration block.
    pub fn apply_fields(&mut self, fields: TitleFields) {
        self.title_name = fields.title;
        self.document_size = fields.document_size;
        self.description = fields.description;
        self.tags = fields.tags;
    }

    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        self.title_owner == *principal
    }
}

/// Composite key of a viewer permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewPermissionKey {
    pub entry_id: EntryId,
    pub viewer: Principal,
}

impl ViewPermissionKey {
    pub fn new(entry_id: EntryId, viewer: Principal) -> Self {
        Self { entry_id, viewer }
    }
}
