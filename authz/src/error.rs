//! Error types for the access-policy engine.
//!
//! A denied request is never an error: policies answer `Ok(false)`. The
//! variants here are faults the caller has to tell apart from a denial,
//! either broken configuration caught at registration time or a request that
//! arrived without the context an evaluation needs.

use thiserror::Error;

/// Errors that can occur while building or evaluating access policies.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A declared policy could not be turned into an evaluator.
    ///
    /// Raised while endpoints are registered, never during a request.
    #[error("Invalid policy configuration: {0}")]
    InvalidConfiguration(String),

    /// A policy key has a shape the mapping does not accept
    /// (an empty group, or a group inside a permission-string map).
    #[error("Unsupported policy key: {0}")]
    InvalidKey(String),

    /// The same key was declared twice in one chain mapping.
    #[error("Duplicate policy key: {0}")]
    DuplicateKey(String),

    /// The request method is not one of the supported verbs.
    #[error("Unknown request method: {0}")]
    UnknownVerb(String),

    /// The request descriptor was built without a method.
    #[error("Request descriptor has no method")]
    MissingMethod,

    /// Object-scoped evaluation was requested without a target object.
    #[error("Object-scoped evaluation requires a target object")]
    MissingTarget,

    /// The supplied target is not the object the request names.
    #[error("Target object mismatch: request names '{expected}', got '{actual}'")]
    TargetMismatch { expected: String, actual: String },

    /// The principal provider could not answer a permission query.
    ///
    /// This is not a denial; callers decide how to surface it.
    #[error("Permission lookup failed: {0}")]
    PermissionLookup(String),
}

/// A specialized Result type for access-policy operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
