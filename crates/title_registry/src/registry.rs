//! Title registry implementation
//!
//! Stores land-title records keyed by a registry-assigned id and enforces
//! single-owner write access over them.

use crate::errors::*;
use crate::storage::{MemoryBackend, Mutation, RegistryBackend, RegistryState};
use crate::types::*;
use crate::validation::validate_fields;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

/// Title Registry
///
/// Every mutating call holds the write guard from validation through commit,
/// so calls are serialized and a rejected call has no observable effect.
pub struct TitleRegistry<B: RegistryBackend = MemoryBackend> {
    state: RwLock<RegistryState>,
    backend: B,
}

impl TitleRegistry<MemoryBackend> {
    /// Create an empty, non-persistent registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            backend: MemoryBackend,
        }
    }
}

impl Default for TitleRegistry<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RegistryBackend> TitleRegistry<B> {
    /// Open a registry over `backend`, restoring whatever it has persisted.
    pub fn with_backend(backend: B) -> Result<Self> {
        let state = backend.load()?;
        info!(
            records = state.len(),
            last_entry_id = state.counter(),
            "Title registry loaded"
        );
        Ok(Self {
            state: RwLock::new(state),
            backend,
        })
    }

    /// Register a new title owned by the caller.
    pub fn register(&self, ctx: &impl ChainContext, fields: TitleFields) -> Result<EntryId> {
        validate_fields(&fields)?;

        let caller = ctx.caller();
        let mut state = self.state.write();
        let entry_id = state.next_entry_id()?;
        let record = TitleRecord::from_fields(fields, caller, ctx.block_height());

        self.commit(
            &mut state,
            Mutation::Register {
                entry_id,
                record,
                creator: caller,
            },
        )?;

        info!(%entry_id, owner = %caller, block = ctx.block_height(), "Title registered");
        Ok(entry_id)
    }

    /// Replace the content fields of a title. Owner only.
    pub fn update(
        &self,
        ctx: &impl ChainContext,
        entry_id: EntryId,
        fields: TitleFields,
    ) -> Result<()> {
        let mut state = self.state.write();
        let mut record = Self::owned_record(&state, entry_id, &ctx.caller())?.clone();
        validate_fields(&fields)?;

        record.apply_fields(fields);
        self.commit(&mut state, Mutation::Update { entry_id, record })?;

        debug!(%entry_id, "Title updated");
        Ok(())
    }

    /// Remove a title permanently. Owner only; the id is never reassigned.
    pub fn delete(&self, ctx: &impl ChainContext, entry_id: EntryId) -> Result<()> {
        let mut state = self.state.write();
        Self::owned_record(&state, entry_id, &ctx.caller())?;

        self.commit(&mut state, Mutation::Delete { entry_id })?;

        info!(%entry_id, "Title deleted");
        Ok(())
    }

    /// Hand a title to `new_owner`. Owner only; viewer rows are untouched.
    pub fn transfer(
        &self,
        ctx: &impl ChainContext,
        entry_id: EntryId,
        new_owner: Principal,
    ) -> Result<()> {
        let mut state = self.state.write();
        let mut record = Self::owned_record(&state, entry_id, &ctx.caller())?.clone();
        let from = record.title_owner;

        record.title_owner = new_owner;
        self.commit(&mut state, Mutation::Transfer { entry_id, record })?;

        info!(%entry_id, %from, to = %new_owner, "Title transferred");
        Ok(())
    }

    /// Fetch a title record
    pub fn get_title(&self, entry_id: EntryId) -> Result<TitleRecord> {
        let state = self.state.read();
        state.record(&entry_id).cloned().ok_or_else(|| {
            debug!(%entry_id, "Title lookup missed");
            TitleRegistryError::EntryNotFound { entry_id }
        })
    }

    /// Stored viewer flag for `(entry_id, viewer)`; `false` when no row exists.
    ///
    /// Rows belonging to deleted titles are still reported.
    pub fn can_view(&self, entry_id: EntryId, viewer: &Principal) -> bool {
        let state = self.state.read();
        state
            .permission(&ViewPermissionKey::new(entry_id, *viewer))
            .unwrap_or(false)
    }

    /// Most recently assigned id, or 0 before the first registration.
    pub fn last_entry_id(&self) -> u64 {
        self.state.read().counter()
    }

    /// Ids of live titles currently held by `owner`, ascending.
    pub fn titles_owned_by(&self, owner: &Principal) -> Vec<EntryId> {
        self.state.read().owned_by(owner)
    }

    /// Number of live titles
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Consistent copy of the whole registry state.
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }

    /// Existence check first, then ownership.
    fn owned_record<'a>(
        state: &'a RegistryState,
        entry_id: EntryId,
        caller: &Principal,
    ) -> Result<&'a TitleRecord> {
        let record = state
            .record(&entry_id)
            .ok_or(TitleRegistryError::EntryNotFound { entry_id })?;

        if !record.is_owned_by(caller) {
            warn!(%entry_id, %caller, "Rejected call from non-holder");
            return Err(TitleRegistryError::NotTitleHolder { entry_id });
        }

        Ok(record)
    }

    fn commit(&self, state: &mut RegistryState, mutation: Mutation) -> Result<()> {
        if let Err(e) = self.backend.commit(&mutation) {
            error!(entry_id = %mutation.entry_id(), error = %e, "Failed to persist title mutation");
            return Err(e);
        }
        state.apply(mutation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn alice() -> CallContext {
        CallContext::new(Principal::new([0xa1; 32]), 100)
    }

    fn bob() -> CallContext {
        CallContext::new(Principal::new([0xb0; 32]), 120)
    }

    fn fields() -> TitleFields {
        TitleFields::new(
            "Parcel 12",
            4096,
            "Riverside lot, north bank",
            vec!["residential".into(), "river".into()],
        )
    }

    fn code<T: std::fmt::Debug>(result: Result<T>) -> Option<ErrorCode> {
        result.unwrap_err().code()
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let registry = TitleRegistry::new();
        assert_eq!(registry.last_entry_id(), 0);

        let first = registry.register(&alice(), fields()).unwrap();
        let second = registry.register(&bob(), fields()).unwrap();
        let third = registry.register(&alice(), fields()).unwrap();

        assert_eq!(first, EntryId(1));
        assert_eq!(second, EntryId(2));
        assert_eq!(third, EntryId(3));
        assert_eq!(registry.last_entry_id(), 3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_records_owner_block_and_viewer() {
        let registry = TitleRegistry::new();
        let ctx = alice();
        let id = registry.register(&ctx, fields()).unwrap();

        let record = registry.get_title(id).unwrap();
        assert_eq!(record.title_owner, ctx.caller);
        assert_eq!(record.registration_block, 100);
        assert_eq!(record.title_name, "Parcel 12");
        assert_eq!(record.tags, vec!["residential", "river"]);

        assert!(registry.can_view(id, &ctx.caller));
        assert!(!registry.can_view(id, &bob().caller));
    }

    #[test]
    fn test_rejected_register_leaves_store_unchanged() {
        let registry = TitleRegistry::new();
        registry.register(&alice(), fields()).unwrap();
        let before = registry.snapshot();

        let mut bad = fields();
        bad.tags = vec![];
        assert_eq!(
            code(registry.register(&alice(), bad)),
            Some(ErrorCode::InvalidTagFormat)
        );

        assert_eq!(registry.snapshot(), before);
        assert_eq!(registry.register(&alice(), fields()).unwrap(), EntryId(2));
    }

    #[test]
    fn test_update_replaces_content_only() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();

        let later = CallContext::new(alice().caller, 999);
        let new_fields = TitleFields::new("Parcel 12B", 8192, "Resurveyed", vec!["survey".into()]);
        registry.update(&later, id, new_fields).unwrap();

        let record = registry.get_title(id).unwrap();
        assert_eq!(record.title_name, "Parcel 12B");
        assert_eq!(record.document_size, 8192);
        assert_eq!(record.description, "Resurveyed");
        assert_eq!(record.tags, vec!["survey"]);
        assert_eq!(record.title_owner, alice().caller);
        assert_eq!(record.registration_block, 100);
    }

    #[test]
    fn test_update_is_idempotent() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();
        let payload = TitleFields::new("Same", 1, "Same", vec!["same".into()]);

        registry.update(&alice(), id, payload.clone()).unwrap();
        let once = registry.snapshot();
        registry.update(&alice(), id, payload).unwrap();
        assert_eq!(registry.snapshot(), once);
    }

    #[test]
    fn test_update_checks_existence_then_owner_then_fields() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();
        let bad = TitleFields::new("", 0, "", vec![]);

        assert_eq!(
            code(registry.update(&alice(), EntryId(42), bad.clone())),
            Some(ErrorCode::EntryNotFound)
        );
        assert_eq!(
            code(registry.update(&bob(), id, bad.clone())),
            Some(ErrorCode::NotTitleHolder)
        );
        assert_eq!(
            code(registry.update(&alice(), id, bad)),
            Some(ErrorCode::InvalidTitleName)
        );
        assert_eq!(registry.get_title(id).unwrap().title_name, "Parcel 12");
    }

    #[test]
    fn test_transfer_moves_write_access() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();

        registry.transfer(&alice(), id, bob().caller).unwrap();
        let record = registry.get_title(id).unwrap();
        assert_eq!(record.title_owner, bob().caller);
        assert_eq!(record.registration_block, 100);
        assert_eq!(record.title_name, "Parcel 12");

        assert_eq!(
            code(registry.transfer(&alice(), id, alice().caller)),
            Some(ErrorCode::NotTitleHolder)
        );
        registry.transfer(&bob(), id, alice().caller).unwrap();
        assert_eq!(registry.get_title(id).unwrap().title_owner, alice().caller);
    }

    #[test]
    fn test_transfer_leaves_viewer_rows() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();
        registry.transfer(&alice(), id, bob().caller).unwrap();

        assert!(registry.can_view(id, &alice().caller));
        assert!(!registry.can_view(id, &bob().caller));
        assert_eq!(registry.titles_owned_by(&bob().caller), vec![id]);
        assert!(registry.titles_owned_by(&alice().caller).is_empty());
    }

    #[test]
    fn test_delete_retires_id() {
        let registry = TitleRegistry::new();
        let id = registry.register(&alice(), fields()).unwrap();

        assert_eq!(
            code(registry.delete(&bob(), id)),
            Some(ErrorCode::NotTitleHolder)
        );
        registry.delete(&alice(), id).unwrap();

        assert_eq!(code(registry.get_title(id)), Some(ErrorCode::EntryNotFound));
        assert_eq!(
            code(registry.update(&alice(), id, fields())),
            Some(ErrorCode::EntryNotFound)
        );
        assert_eq!(
            code(registry.delete(&alice(), id)),
            Some(ErrorCode::EntryNotFound)
        );
        assert_eq!(
            code(registry.transfer(&alice(), id, bob().caller)),
            Some(ErrorCode::EntryNotFound)
        );

        let next = registry.register(&alice(), fields()).unwrap();
        assert_eq!(next, EntryId(2));
        assert!(registry.can_view(id, &alice().caller));
    }

    struct FailingBackend {
        fail: AtomicBool,
    }

    impl RegistryBackend for FailingBackend {
        fn load(&self) -> Result<RegistryState> {
            Ok(RegistryState::default())
        }

        fn commit(&self, _mutation: &Mutation) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(TitleRegistryError::Storage("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_failed_commit_is_not_applied() {
        let registry = TitleRegistry::with_backend(FailingBackend {
            fail: AtomicBool::new(false),
        })
        .unwrap();
        let id = registry.register(&alice(), fields()).unwrap();
        let before = registry.snapshot();

        registry.backend.fail.store(true, Ordering::SeqCst);
        let err = registry.register(&alice(), fields()).unwrap_err();
        assert!(matches!(err, TitleRegistryError::Storage(_)));
        assert!(registry.transfer(&alice(), id, bob().caller).is_err());
        assert!(registry.delete(&alice(), id).is_err());
        assert_eq!(registry.snapshot(), before);

        registry.backend.fail.store(false, Ordering::SeqCst);
        assert_eq!(registry.register(&alice(), fields()).unwrap(), EntryId(2));
    }

    struct ExhaustedBackend;

    impl RegistryBackend for ExhaustedBackend {
        fn load(&self) -> Result<RegistryState> {
            Ok(RegistryState::from_parts(BTreeMap::new(), HashMap::new(), u64::MAX))
        }

        fn commit(&self, _mutation: &Mutation) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_refuses_to_wrap_ids() {
        let registry = TitleRegistry::with_backend(ExhaustedBackend).unwrap();
        let err = registry.register(&alice(), fields()).unwrap_err();
        assert!(matches!(err, TitleRegistryError::IdSpaceExhausted));
        assert!(registry.is_empty());
        assert_eq!(registry.last_entry_id(), u64::MAX);
    }

    #[cfg(feature = "persistent")]
    #[test]
    fn test_sled_backend_tracks_registry_state() {
        let registry =
            TitleRegistry::with_backend(crate::storage::SledBackend::temporary().unwrap()).unwrap();
        let first = registry.register(&alice(), fields()).unwrap();
        let second = registry.register(&alice(), fields()).unwrap();
        registry
            .update(&alice(), first, TitleFields::new("Renamed", 9, "d", vec!["t".into()]))
            .unwrap();
        registry.transfer(&alice(), first, bob().caller).unwrap();
        registry.delete(&alice(), second).unwrap();
        assert!(registry.delete(&alice(), first).is_err());

        // Every acknowledged call is on disk, and nothing rejected is.
        assert_eq!(registry.backend.load().unwrap(), registry.snapshot());
    }
}
