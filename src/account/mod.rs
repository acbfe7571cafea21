//! Account key hierarchy: session context, storage seam and the service
//! that derives, unwraps, caches and scrubs keys.

pub mod context;
pub mod service;
pub mod storage;

pub use context::{AccountKeyContext, KeyRing};
pub use service::{AccountRegistration, KeyHierarchyService, PasswordChange};
pub use storage::{MemoryStorage, SecureStorage, StorageKey};
