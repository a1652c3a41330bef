// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]
//! Pure-Rust persistent node storage (redb) for the arbor state store.
//!
//! Realizes the four-table persistent layout (leaves, inners, roots,
//! orphans) as redb tables behind the [`arbor_api::backend::NodeBackend`]
//! contract, with one write transaction per committed version.

pub mod redb_backend;

pub use redb_backend::RedbBackend;
