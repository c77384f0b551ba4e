//! Client-side access to a document database.
//!
//! [`DocumentStore`] is the interface the rest of the workspace codes
//! against. [`MemoryStore`] keeps everything in process; [`firestore`]
//! talks to Cloud Firestore over REST.

mod batch;
mod document;
mod error;
mod memory;
mod query;
mod store;
mod value;

pub mod firestore;

pub use batch::*;
pub use document::*;
pub use error::StoreError;
pub use memory::{FailureMode, MemoryStore};
pub use query::*;
pub use store::*;
pub use value::*;
