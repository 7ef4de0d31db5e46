//! Request/response envelope over the registry call surface.
//!
//! Every call answers with exactly one of `{"ok": value}`, `{"err": code}`
//! or, for backend faults that carry no result code, `{"fault": message}`.

use crate::errors::TitleRegistryError;
use crate::registry::TitleRegistry;
use crate::storage::RegistryBackend;
use crate::types::{ChainContext, EntryId, Principal, TitleFields};
use serde::{Deserialize, Serialize};

/// A single mutating call against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegistryRequest {
    Register {
        title: String,
        document_size: u64,
        description: String,
        tags: Vec<String>,
    },
    Update {
        entry_id: EntryId,
        title: String,
        document_size: u64,
        description: String,
        tags: Vec<String>,
    },
    Delete {
        entry_id: EntryId,
    },
    Transfer {
        entry_id: EntryId,
        new_owner: Principal,
    },
}

/// Success payload: the new id for `register`, `true` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Flag(bool),
    EntryId(EntryId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryResponse {
    Ok(ResponseValue),
    Err(u32),
    Fault(String),
}

impl RegistryResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, RegistryResponse::Ok(_))
    }
}

impl From<crate::errors::Result<ResponseValue>> for RegistryResponse {
    fn from(result: crate::errors::Result<ResponseValue>) -> Self {
        match result {
            Ok(value) => RegistryResponse::Ok(value),
            Err(e) => e.into(),
        }
    }
}

impl From<TitleRegistryError> for RegistryResponse {
    fn from(err: TitleRegistryError) -> Self {
        match err.code() {
            Some(code) => RegistryResponse::Err(code.as_u32()),
            None => RegistryResponse::Fault(err.to_string()),
        }
    }
}

impl<B: RegistryBackend> TitleRegistry<B> {
    /// Execute one request and wrap the outcome.
    pub fn dispatch(&self, ctx: &impl ChainContext, request: RegistryRequest) -> RegistryResponse {
        let result = match request {
            RegistryRequest::Register {
                title,
                document_size,
                description,
                tags,
            } => self
                .register(ctx, TitleFields::new(title, document_size, description, tags))
                .map(ResponseValue::EntryId),
            RegistryRequest::Update {
                entry_id,
                title,
                document_size,
                description,
                tags,
            } => self
                .update(
                    ctx,
                    entry_id,
                    TitleFields::new(title, document_size, description, tags),
                )
                .map(|()| ResponseValue::Flag(true)),
            RegistryRequest::Delete { entry_id } => self
                .delete(ctx, entry_id)
                .map(|()| ResponseValue::Flag(true)),
            RegistryRequest::Transfer {
                entry_id,
                new_owner,
            } => self
                .transfer(ctx, entry_id, new_owner)
                .map(|()| ResponseValue::Flag(true)),
        };
        result.into()
    }

    /// Decode a JSON request, execute it, and encode the response.
    pub fn dispatch_json(&self, ctx: &impl ChainContext, request: &str) -> anyhow::Result<String> {
        let request: RegistryRequest = serde_json::from_str(request)?;
        let response = self.dispatch(ctx, request);
        Ok(serde_json::to_string(&response)?)
    }
}
