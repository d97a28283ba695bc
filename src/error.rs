//! Error types for the query engine.
//!
//! Per spec.md §7, only the fatal class of errors (a missing collaborator or
//! a violated internal invariant) is surfaced to the caller as a typed
//! error. Parser errors, malformed operands and out-of-range ids are
//! recovered from locally by the parser/calculator and never reach this
//! type — see `query::parser` and `calculator`.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Fatal errors a query can raise.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A leaf or operator needed a collaborator that wasn't provided to the
    /// engine (e.g. a `STRING` leaf with no `CellTextCompleter`).
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// A collaborator call itself failed (I/O, corrupt store, ...).
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// An internal invariant was violated (e.g. a CQR with a non-empty
    /// intersection between `fm` and `pm`). Treated as a programmer error
    /// per spec.md §7, but returned rather than panicking so a corrupt
    /// store can't take down the whole process.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The engine was constructed without a required collaborator.
    #[error("invalid engine configuration: {0}")]
    InvalidConfiguration(String),
}
