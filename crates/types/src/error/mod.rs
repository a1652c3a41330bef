// Path: crates/types/src/error/mod.rs
//! Error taxonomies for the arbor state store.

use crate::Version;
use thiserror::Error;

/// Errors raised by the versioned tree store.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The requested version has no committed root.
    #[error("version {0} is not committed")]
    VersionMissing(Version),
    /// A range query was given a start bound at or above its end bound.
    #[error("invalid range: start must be below end")]
    InvalidRange,
    /// A node referenced by the tree is missing or does not hash to the
    /// digest it was stored under.
    #[error("corrupt node store: {0}")]
    Corrupt(String),
    /// The backing store failed to read or write.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors raised while verifying a range proof. These surface on
/// untrusted input and never panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The proof contains no leaves.
    #[error("proof has no leaves")]
    Empty,
    /// Structural damage: mismatched path and leaf counts, unconsumed
    /// leaves, or an inner path that cannot occur in a well-formed proof.
    #[error("malformed proof: {0}")]
    Malformed(String),
    /// The re-derived root digest does not match the trusted root.
    #[error("root digest mismatch")]
    RootMismatch,
    /// An absence proof contains the queried key at the given position.
    #[error("absence disproved by leaf {0}")]
    AbsenceDisproved(usize),
    /// The proof does not satisfy any of the absence rules for the key.
    #[error("absence not proven: {0}")]
    AbsenceNotProven(String),
    /// The leaf's recorded value digest does not match the given value.
    #[error("value digest mismatch")]
    ValueDigestMismatch,
    /// The queried key is not among the proof's leaves.
    #[error("key is not covered by this proof")]
    KeyNotInProof,
}
