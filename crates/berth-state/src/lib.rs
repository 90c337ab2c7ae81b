//! berth-state: embedded document store for berth.
//!
//! Backed by [redb](https://docs.rs/redb), holds the documents host
//! selection reads: hosts, compute descriptions, placed compute instances,
//! compute networks, network profiles, subnets, datastores, endpoints and
//! resource metrics.
//!
//! # Architecture
//!
//! All documents are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{context_id}|{link}`, `{resource_link}|{timestamp}`)
//! enable prefix scans for the queries placement issues.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements [`DocumentReader`], the asynchronous read seam used by
//! the placement filters.

pub mod error;
pub mod reader;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use reader::{DocumentReader, ReadFuture};
pub use store::StateStore;
pub use types::*;
