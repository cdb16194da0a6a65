//! # Grit Storage
//!
//! Content-addressed storage layer for grit.
//!
//! Provides the on-disk object database (`.git/objects`), the typed object
//! model with its canonical serialization, reference files, and the
//! staging index.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod hash;
mod index;
mod object;
mod refs;
mod repository;
mod store;
mod zlib;

pub use error::{Result, StorageError};
pub use hash::ObjectId;
pub use index::{Index, IndexEntry};
pub use object::{Commit, Object, ObjectType, Signature, TreeEntry};
pub use refs::{Head, RefStore};
pub use repository::Repository;
pub use store::ObjectStore;
pub use zlib::{compress, decompress_from};
