//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Ordered list of human-readable validation messages.
///
/// Validation runs to completion before anything is mutated, so callers get
/// every problem with a request at once rather than the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|m| m.contains(needle))
    }

    /// `Ok(())` when empty, otherwise a `DomainError::Validation` carrying all messages.
    pub fn into_result(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl From<Vec<String>> for ValidationErrors {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, locking, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more user inputs failed validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The record is in a state that forbids mutation.
    #[error("{0}")]
    Locked(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors(vec![msg.into()]))
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        Self::Locked(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Human-readable messages suitable for showing to an operator.
    pub fn messages(&self) -> Vec<String> {
        match self {
            DomainError::Validation(errors) => errors.messages().to_vec(),
            DomainError::Locked(msg) => vec![msg.clone()],
            other => vec![other.to_string()],
        }
    }
}
