//! Store substrate for the Stratus object gateway.
//!
//! This crate models the two primitive services the gateway core is built
//! on: an **index service** (ordered key/value maps addressed by 128-bit
//! IDs) and an **object service** (striped byte containers, optionally
//! composed of layers with extent maps). It also carries the pieces both
//! sides need to agree on: 128-bit identifiers, striping layouts, and the
//! byte codecs for composite-layer extent records.
//!
//! [`MemService`] is a complete in-process implementation of both service
//! traits. It backs the test suite and embedded deployments; production
//! deployments substitute a network-attached implementation.

pub mod error;
pub mod id;
pub mod layout;
pub mod mem;
pub mod service;

pub use error::{StoreError, StoreResult};
pub use id::{Id128, IdGenerator};
pub use layout::{Layout, LayoutCatalog};
pub use mem::MemService;
pub use service::{CompositeLayer, CreateFlags, IndexService, IoFlags, ObjectService};
