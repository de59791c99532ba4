//! Virtual-filesystem adapter over a flat object store.
//!
//! A bucket has no directories, only keys. This crate maps a hierarchical
//! virtual tree onto that flat key space and serves filesystem-style
//! operations against it. Key components:
//!
//! - [`path`] - pure virtual-path ⇄ object-key conversions
//! - [`FileTree`] - refresh-on-read cache of the virtual tree, rebuilt
//!   wholesale from a backend listing on every listing-class request
//! - [`FsHandler`] - the operation handler mapping protocol requests
//!   (read, write, list, stat, rename, ...) onto the tree and the store
//! - [`ObjectStore`] - the backend contract, implemented by [`S3Store`]
//!   and the in-memory [`MemoryStore`] test double
//!
//! ## Design decisions
//!
//! - **Coarse tree lock**: one mutex serializes every refresh-then-mutate
//!   sequence. Object-store round trips dominate latency, so simplicity
//!   wins over read/write parallelism.
//! - **Per-entry content lock**: in-flight write buffers are guarded
//!   separately, so uploading one file does not block unrelated listings.
//! - **Directory synthesis**: common key prefixes become directories even
//!   when no marker object exists for them.

pub mod entry;
pub mod error;
pub mod memory;
pub mod ops;
pub mod path;
pub mod s3;
pub mod store;
pub mod tree;

pub use entry::{Entry, FileInfo};
pub use error::{FsError, FsResult, StoreError};
pub use memory::MemoryStore;
pub use ops::{CopyOutcome, CopyReport, FileWriter, FsHandler, MAX_WRITE_BYTES, ObjectReader};
pub use s3::{S3Config, S3Store};
pub use store::{Listing, ObjectInfo, ObjectStore};
pub use tree::{FileTree, TreeState};
