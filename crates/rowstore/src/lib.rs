//! # Huddle Row Store
//!
//! Typed access to the hosted backend that owns every member, channel and
//! message. The backend exposes named *views* (filtered, sorted projections
//! of its tables); this crate wraps their list/get/insert/relation/upload
//! endpoints behind the [`RowStore`] trait.
//!
//! - [`RowStoreClient`]: HTTP implementation over `reqwest`
//! - [`MemoryStore`]: in-process implementation with call recording

pub mod client;
pub mod error;
pub mod memory;
pub mod query;
pub mod store;

pub use client::{ErrorHook, RowStoreClient};
pub use error::{StoreError, StoreResult};
pub use memory::{CallKind, MemoryStore, StoreCall};
pub use query::{ListQuery, Page, Row, SortDirection, SortOrder, Upload};
pub use store::{views, RowStore};
