//! Permissioned Land Title Registry
//!
//! Stores land-title records under monotonically increasing ids. Only the
//! current holder of a title may update, delete, or transfer it, and every
//! field is validated before anything is written. The host supplies the
//! caller identity and block height for each call through [`ChainContext`].

pub mod api;
pub mod config;
pub mod errors;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;

pub use api::{RegistryRequest, RegistryResponse, ResponseValue};
pub use config::{init_tracing, BackendKind, LoggingConfig, RegistryConfig, StorageConfig};
pub use errors::*;
pub use registry::TitleRegistry;
#[cfg(feature = "persistent")]
pub use storage::SledBackend;
pub use storage::{MemoryBackend, Mutation, RegistryBackend, RegistryState};
pub use types::*;
