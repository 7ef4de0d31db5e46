//! Registry state and storage backends.
//!
//! The registry keeps its authoritative state in memory and mirrors every
//! accepted mutation to a [`RegistryBackend`]. A mutation is committed to the
//! backend before it is applied in memory, so a failed commit leaves the
//! registry untouched.

use crate::errors::{Result, TitleRegistryError};
use crate::types::{EntryId, Principal, TitleRecord, ViewPermissionKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// In-memory registry state: records, viewer flags, and the id counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryState {
    records: BTreeMap<EntryId, TitleRecord>,
    permissions: HashMap<ViewPermissionKey, bool>,
    /// Owner -> live entry ids. Derived from `records`, never persisted.
    by_owner: HashMap<Principal, BTreeSet<EntryId>>,
    counter: u64,
}

impl RegistryState {
    /// Rebuild state from persisted parts.
    pub fn from_parts(
        records: BTreeMap<EntryId, TitleRecord>,
        permissions: HashMap<ViewPermissionKey, bool>,
        counter: u64,
    ) -> Self {
        let mut by_owner: HashMap<Principal, BTreeSet<EntryId>> = HashMap::new();
        for (id, record) in &records {
            by_owner.entry(record.title_owner).or_default().insert(*id);
        }
        // Never hand out an id at or below one already stored.
        let counter = records
            .keys()
            .next_back()
            .map_or(counter, |max| counter.max(max.0));

        Self {
            records,
            permissions,
            by_owner,
            counter,
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn next_entry_id(&self) -> Result<EntryId> {
        self.counter
            .checked_add(1)
            .map(EntryId)
            .ok_or(TitleRegistryError::IdSpaceExhausted)
    }

    pub fn record(&self, entry_id: &EntryId) -> Option<&TitleRecord> {
        self.records.get(entry_id)
    }

    pub fn permission(&self, key: &ViewPermissionKey) -> Option<bool> {
        self.permissions.get(key).copied()
    }

    pub fn owned_by(&self, owner: &Principal) -> Vec<EntryId> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply a mutation that has already been validated and authorized.
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Register {
                entry_id,
                record,
                creator,
            } => {
                self.by_owner
                    .entry(record.title_owner)
                    .or_default()
                    .insert(entry_id);
                self.records.insert(entry_id, record);
                self.permissions
                    .insert(ViewPermissionKey::new(entry_id, creator), true);
                self.counter = self.counter.max(entry_id.0);
            }
            Mutation::Update { entry_id, record } => {
                self.records.insert(entry_id, record);
            }
            Mutation::Transfer { entry_id, record } => {
                if let Some(previous) = self.records.get(&entry_id) {
                    self.unindex_owner(previous.title_owner, entry_id);
                }
                self.by_owner
                    .entry(record.title_owner)
                    .or_default()
                    .insert(entry_id);
                self.records.insert(entry_id, record);
            }
            Mutation::Delete { entry_id } => {
                // Viewer rows are left in place.
                if let Some(previous) = self.records.remove(&entry_id) {
                    self.unindex_owner(previous.title_owner, entry_id);
                }
            }
        }
    }

    fn unindex_owner(&mut self, owner: Principal, entry_id: EntryId) {
        if let Some(ids) = self.by_owner.get_mut(&owner) {
            ids.remove(&entry_id);
            if ids.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
    }
}

/// A single accepted change to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// New record plus the creator's viewer row; advances the counter.
    Register {
        entry_id: EntryId,
        record: TitleRecord,
        creator: Principal,
    },
    /// Replacement record with new content fields.
    Update {
        entry_id: EntryId,
        record: TitleRecord,
    },
    /// Replacement record with a new owner.
    Transfer {
        entry_id: EntryId,
        record: TitleRecord,
    },
    Delete { entry_id: EntryId },
}

impl Mutation {
    pub fn entry_id(&self) -> EntryId {
        match self {
            Mutation::Register { entry_id, .. }
            | Mutation::Update { entry_id, .. }
            | Mutation::Transfer { entry_id, .. }
            | Mutation::Delete { entry_id } => *entry_id,
        }
    }
}

/// Trait for registry storage backends.
pub trait RegistryBackend: Send + Sync {
    /// Load the persisted state.
    fn load(&self) -> Result<RegistryState>;

    /// Durably record a mutation. Must be all-or-nothing: once the mutation
    /// is visible to [`load`](Self::load), this returns `Ok`.
    fn commit(&self, mutation: &Mutation) -> Result<()>;
}

/// Backend that persists nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl RegistryBackend for MemoryBackend {
    fn load(&self) -> Result<RegistryState> {
        Ok(RegistryState::default())
    }

    fn commit(&self, _mutation: &Mutation) -> Result<()> {
        Ok(())
    }
}

impl<B: RegistryBackend + ?Sized> RegistryBackend for Box<B> {
    fn load(&self) -> Result<RegistryState> {
        (**self).load()
    }

    fn commit(&self, mutation: &Mutation) -> Result<()> {
        (**self).commit(mutation)
    }
}

#[cfg(feature = "persistent")]
pub use self::sled_backend::SledBackend;

#[cfg(feature = "persistent")]
mod sled_backend {
    use super::{Mutation, RegistryBackend, RegistryState};
    use crate::errors::{Result, TitleRegistryError};
    use crate::types::{EntryId, Principal, TitleRecord, ViewPermissionKey};
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use tracing::error;

    const TITLE_PREFIX: &[u8] = b"title:";
    const VIEW_PREFIX: &[u8] = b"view:";
    const COUNTER_KEY: &[u8] = b"meta:counter";

    fn title_key(entry_id: EntryId) -> Vec<u8> {
        let mut key = TITLE_PREFIX.to_vec();
        key.extend_from_slice(&entry_id.to_be_bytes());
        key
    }

    fn view_key(key: &ViewPermissionKey) -> Vec<u8> {
        let mut out = VIEW_PREFIX.to_vec();
        out.extend_from_slice(&key.entry_id.to_be_bytes());
        out.extend_from_slice(key.viewer.as_bytes());
        out
    }

    fn parse_view_key(raw: &[u8]) -> Result<ViewPermissionKey> {
        let body = &raw[VIEW_PREFIX.len()..];
        if body.len() != 8 + 32 {
            return Err(TitleRegistryError::Storage(format!(
                "Malformed permission key of {} bytes",
                raw.len()
            )));
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&body[..8]);
        let mut viewer = [0u8; 32];
        viewer.copy_from_slice(&body[8..]);
        Ok(ViewPermissionKey::new(
            EntryId(u64::from_be_bytes(id)),
            Principal(viewer),
        ))
    }

    /// Sled-backed persistent storage.
    #[derive(Debug, Clone)]
    pub struct SledBackend {
        db: sled::Db,
    }

    impl SledBackend {
        /// Open (or create) a database at `path`.
        ///
        /// Every commit flushes explicitly, so no background flusher is run.
        /// Dropping the last handle then releases the file lock immediately.
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let db = sled::Config::new()
                .path(path)
                .flush_every_ms(None)
                .open()?;
            Ok(Self { db })
        }

        /// Throwaway database removed on drop.
        pub fn temporary() -> Result<Self> {
            let db = sled::Config::new()
                .temporary(true)
                .flush_every_ms(None)
                .open()?;
            Ok(Self { db })
        }
    }

    impl RegistryBackend for SledBackend {
        fn load(&self) -> Result<RegistryState> {
            let mut records = BTreeMap::new();
            for item in self.db.scan_prefix(TITLE_PREFIX) {
                let (_, value) = item?;
                let (entry_id, record): (EntryId, TitleRecord) = bincode::deserialize(&value)?;
                records.insert(entry_id, record);
            }

            let mut permissions = HashMap::new();
            for item in self.db.scan_prefix(VIEW_PREFIX) {
                let (key, value) = item?;
                let can_view: bool = bincode::deserialize(&value)?;
                permissions.insert(parse_view_key(&key)?, can_view);
            }

            let counter = match self.db.get(COUNTER_KEY)? {
                Some(raw) => bincode::deserialize(&raw)?,
                None => 0u64,
            };

            Ok(RegistryState::from_parts(records, permissions, counter))
        }

        fn commit(&self, mutation: &Mutation) -> Result<()> {
            let mut batch = sled::Batch::default();
            match mutation {
                Mutation::Register {
                    entry_id,
                    record,
                    creator,
                } => {
                    batch.insert(title_key(*entry_id), bincode::serialize(&(entry_id, record))?);
                    batch.insert(
                        view_key(&ViewPermissionKey::new(*entry_id, *creator)),
                        bincode::serialize(&true)?,
                    );
                    batch.insert(COUNTER_KEY, bincode::serialize(&entry_id.as_u64())?);
                }
                Mutation::Update { entry_id, record } | Mutation::Transfer { entry_id, record } => {
                    batch.insert(title_key(*entry_id), bincode::serialize(&(entry_id, record))?);
                }
                Mutation::Delete { entry_id } => {
                    batch.remove(title_key(*entry_id));
                }
            }
            // The applied batch is the commit point; it is already visible to
            // readers of the tree, so a flush failure cannot roll it back.
            self.db.apply_batch(batch)?;
            settle_flush(mutation.entry_id(), self.db.flush());
            Ok(())
        }
    }

    fn settle_flush(entry_id: EntryId, flushed: sled::Result<usize>) {
        if let Err(e) = flushed {
            error!(%entry_id, error = %e, "Title mutation applied but not flushed to disk");
        }
    }

}
