//! S3-semantics translation core for Stratus.
//!
//! This crate implements S3 object semantics (versioned objects, delete
//! markers, listings, multipart uploads, user and bucket catalogs) on top
//! of two store primitives: ordered key/value indices and striped byte
//! containers, both addressed by 128-bit IDs.
//!
//! # Architecture
//!
//! ```text
//! S3 front-end (out of scope)
//!        |
//!        v
//!    Store (bootstrap context: caches, ID generator, layouts, GC)
//!        |                     |
//!        v                     v
//!  object / multipart     user / bucket
//!      engines               catalogs
//!        |                     |
//!        v                     v
//!  AtomicWriter --> ObjectGateway     IndexGateway <-- MetaCache
//!        |                  |               |
//!        v                  v               v
//!       ObjectService traits      IndexService trait
//! ```
//!
//! Every record an engine persists goes through the schema-versioned
//! codec in [`codec`], with the key scheme of [`keys`] placing object
//! versions in newest-first order inside each bucket index.

pub mod buckets;
pub mod cache;
pub mod catalog;
pub mod checksums;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod gc;
pub mod index;
pub mod keys;
pub mod multipart;
pub mod objects;
pub mod records;
pub mod store;
pub mod users;
pub mod writer;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use store::Store;
