//! Error types and error-handling strategy for Lockstep.
//!
//! This module defines the core error types used throughout the runtime.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - API misuse that the caller can observe is reported as `Err`
//! - Broken scheduler invariants abort the runtime; no partial recovery is
//!   promised

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Logical time ===
    /// Time moved backwards, a delay was non-positive, or a pending update
    /// was committed at the wrong instant.
    Temporal,

    // === Priorities ===
    /// The priority label arena cannot admit another node.
    PriorityExhausted,
    /// Two priorities from distinct bases were compared.
    PriorityMisuse,
    /// An operation named a deleted or foreign priority node.
    InvalidPriority,

    // === API usage ===
    /// A process-only operation was called outside a running process, or a
    /// driver-only operation was called in an invalid runtime state.
    Usage,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,
}

/// The main error type for Lockstep operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error reports a logical-time violation.
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(self.kind, ErrorKind::Temporal)
    }

    /// Returns true if this error reports priority misuse or exhaustion.
    #[must_use]
    pub const fn is_priority(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::PriorityExhausted | ErrorKind::PriorityMisuse | ErrorKind::InvalidPriority
        )
    }

    /// Adds deterministic context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for Lockstep operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::Temporal).with_context("delay must be positive");
        assert_eq!(err.to_string(), "Temporal: delay must be positive");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::Usage)
            .with_context("outer")
            .with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::PriorityMisuse));
        let err = res.context("compare failed").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::PriorityMisuse);
        assert_eq!(err.to_string(), "PriorityMisuse: compare failed");
    }

    #[test]
    fn predicates_match_kind() {
        let temporal = Error::new(ErrorKind::Temporal);
        assert!(temporal.is_temporal());
        assert!(!temporal.is_priority());

        let exhausted = Error::new(ErrorKind::PriorityExhausted);
        assert!(!exhausted.is_temporal());
        assert!(exhausted.is_priority());
    }
}
