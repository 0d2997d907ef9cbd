//! Object-store adapter for `gitfs`.
//!
//! This crate defines the [`ObjectStore`] trait — the single interface through
//! which the `gitfs` staging engine and merge engine read and write git
//! objects. The core crate never imports `gix` (or any other git library)
//! directly; it depends on `gitfs-git` and programs against the trait.
//!
//! # Crate layout
//!
//! - [`store`] — the [`ObjectStore`] trait definition.
//! - [`types`] — value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`CommitInfo`], [`StoreAttributes`]).
//! - [`error`] — the [`StoreError`] enum returned by all trait methods.
//! - [`gix_store`] — the [`GixStore`] backend, the one shipped implementation.

pub mod error;
pub mod gix_store;
pub mod objects_impl;
pub mod refs_impl;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use gix_store::GixStore;
pub use store::ObjectStore;
pub use types::{
    CommitInfo, EntryMode, GitOid, Identity, OidParseError, RefName, RefNameError,
    StoreAttributes, TreeEntry,
};
