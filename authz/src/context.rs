//! Collaborator interfaces: who is calling, and what they are touching.
//!
//! Authentication and storage live outside this crate. Hosts adapt their
//! session and model types to [`Principal`] and [`Target`]; the engine only
//! reads them.

use crate::error::Result;
use crate::types::{PermissionSet, RequestDescriptor, Verb};
use serde_json::Value;

/// The caller of a request, as resolved by authentication.
pub trait Principal: Send + Sync {
    /// Stable identifier, used for logging and ownership checks.
    fn id(&self) -> &str;

    fn is_authenticated(&self) -> bool;

    fn is_superuser(&self) -> bool;

    /// Whether the principal holds every permission in `required`.
    ///
    /// An `Err` means the provider could not answer; it must not be
    /// reported as `Ok(false)`.
    fn has_permissions(&self, required: &PermissionSet) -> Result<bool>;
}

/// The object an object-scoped request operates on.
pub trait Target: Send + Sync {
    fn id(&self) -> &str;

    fn entity_type(&self) -> &str;

    /// A named attribute of the object, if it has one.
    fn attribute(&self, name: &str) -> Option<&Value>;
}

/// Everything a policy sees for one evaluation.
///
/// `principal` is `None` only when the endpoint admits unauthenticated
/// callers and nobody is logged in.
#[derive(Clone, Copy)]
pub struct AccessContext<'a> {
    principal: Option<&'a dyn Principal>,
    request: &'a RequestDescriptor,
}

impl<'a> AccessContext<'a> {
    pub fn new(principal: Option<&'a dyn Principal>, request: &'a RequestDescriptor) -> Self {
        Self { principal, request }
    }

    pub fn principal(&self) -> Option<&'a dyn Principal> {
        self.principal
    }

    pub fn request(&self) -> &'a RequestDescriptor {
        self.request
    }

    pub fn verb(&self) -> Verb {
        self.request.verb()
    }

    pub fn action_name(&self) -> Option<&'a str> {
        self.request.action_name()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some_and(|p| p.is_authenticated())
    }

    /// Asks the principal for `required`. A missing principal holds nothing.
    pub fn has_permissions(&self, required: &PermissionSet) -> Result<bool> {
        match self.principal {
            Some(principal) => principal.has_permissions(required),
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for AccessContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessContext")
            .field("principal", &self.principal.map(|p| p.id()))
            .field("request", self.request)
            .finish()
    }
}
