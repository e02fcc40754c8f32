//! HandleStore - durable callback-handle persistence
//!
//! A headless task is identified by two opaque handles supplied once by the
//! host application: the registration handle (which entry point to run) and
//! the client handle (which logical client receives events). The process that
//! later needs them may not be the one that stored them, so they live in a
//! small key/value namespace on disk.
//!
//! # Architecture
//!
//! ```text
//! {store_path}/
//! └── handles.db                 # SQLite
//!     └── callback_handles
//!         ├── ({namespace}, registrationCallbackId) -> INTEGER
//!         └── ({namespace}, clientCallbackId)       -> INTEGER
//! ```
//!
//! # Example
//!
//! ```ignore
//! use handlestore::{CallbackHandleSet, HandleStore, SqliteHandleStore};
//!
//! let store = SqliteHandleStore::open(".handles", "com.example.headless")?;
//! store.put(&CallbackHandleSet::from_raw(42i32, 7i64))?;
//! assert_eq!(store.get()?.map(|h| h.client_handle), Some(7));
//! ```

pub mod cli;
pub mod config;
mod handle;
mod store;

pub use handle::{CallbackHandleSet, HandleError, RawHandle};
pub use store::{HandleStore, MemoryHandleStore, SqliteHandleStore};

/// Persisted key for the registration (entry point) handle
pub const KEY_REGISTRATION_HANDLE: &str = "registrationCallbackId";

/// Persisted key for the client handle
pub const KEY_CLIENT_HANDLE: &str = "clientCallbackId";

/// Database file name inside the store directory
pub const DB_FILE_NAME: &str = "handles.db";

/// Default namespace for coordinator-scoped keys
pub const DEFAULT_NAMESPACE: &str = "headless";
