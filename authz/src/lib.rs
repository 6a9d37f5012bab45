//! Declarative access-policy resolution for resource endpoints.
//!
//! An endpoint declares which policies guard it; this crate decides, for one
//! request at a time, whether those policies allow the caller through.
//!
//! # Resolution Flow
//!
//! 1. **Gating**: an anonymous caller is denied when the endpoint requires
//!    authentication; an authenticated superuser is allowed outright.
//! 2. **Declared policies**: every top-level policy of the endpoint must
//!    allow, evaluated in declaration order, stopping at the first denial.
//! 3. **Sub-policies**: chain policies pick the rules that apply to the
//!    request's verb and action and run their sub-policies, which may be
//!    chains themselves.
//!
//! Absence of a declared requirement allows. An endpoint with no policies,
//! a string map without an entry for the request, or a chain without an
//! applicable key all let the request through.
//!
//! # Policy Flavors
//!
//! - [`PermissionPolicy`]: permission strings keyed by verb, action, or both
//! - [`ChainPolicy`]: sub-policies keyed by verb, action, or groups of them
//! - [`CustomPolicy`]: closures for rules that fit neither
//! - [`AllowAny`], [`IsAuthenticated`], [`IsSuperuser`], [`AuthorMatch`]
//!
//! # Example
//!
//! ```rust
//! use access_policy::{
//!     EndpointPolicy, PermissionMap, PermissionPolicy, RequestDescriptor, User, Verb,
//! };
//!
//! let endpoint = EndpointPolicy::new("blog").with_policy(PermissionPolicy::method(
//!     PermissionMap::new().with_verb(Verb::Get, ["app.view_blog"]),
//! ));
//! let reader = User::new("alice").with_permissions(["app.view_blog"]);
//! let request = RequestDescriptor::new(Verb::Get).with_action("list");
//!
//! match endpoint.resolve_endpoint_access(Some(&reader), &request) {
//!     Ok(true) => println!("Access granted"),
//!     Ok(false) => println!("Access denied"),
//!     Err(e) => eprintln!("Authorization error: {}", e),
//! }
//! ```

pub mod context;
pub mod error;
pub mod policy;
pub mod types;

pub use context::{AccessContext, Principal, Target};
pub use error::{AuthzError, Result};
pub use policy::{
    AllowAny, AuthorMatch, ChainKey, ChainPolicy, ChainPolicyBuilder, CustomPolicy,
    IsAuthenticated, IsSuperuser, KeyMember, PermissionFactor, PermissionMap, PermissionPolicy,
    Policy, PolicyRef,
};
pub use types::{
    expand_permission, permission_set, Action, ModelMeta, PermissionSet, RequestDescriptor,
    Resource, User, Verb, FORBIDDEN_PERMISSION,
};

use std::sync::Arc;
use tracing::debug;

/// The declared access policy of one endpoint.
///
/// Built once when the endpoint is registered and shared read-only between
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    name: String,
    authenticated_users_only: bool,
    policies: Vec<PolicyRef>,
}

impl EndpointPolicy {
    /// An endpoint that requires authentication and declares no policies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated_users_only: true,
            policies: Vec::new(),
        }
    }

    pub fn with_policy(self, policy: impl Policy + 'static) -> Self {
        self.with_policy_ref(Arc::new(policy))
    }

    pub fn with_policy_ref(mut self, policy: PolicyRef) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_authenticated_users_only(mut self, required: bool) -> Self {
        self.authenticated_users_only = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn authenticated_users_only(&self) -> bool {
        self.authenticated_users_only
    }

    pub fn policies(&self) -> &[PolicyRef] {
        &self.policies
    }

    /// An absent principal is always anonymous. An unauthenticated one is
    /// anonymous only when the endpoint requires authentication.
    pub fn is_anonymous(&self, principal: Option<&dyn Principal>) -> bool {
        match principal {
            None => true,
            Some(principal) => !principal.is_authenticated() && self.authenticated_users_only,
        }
    }

    /// Superuser status only counts for authenticated principals.
    pub fn is_superuser(principal: Option<&dyn Principal>) -> bool {
        principal.is_some_and(|p| p.is_authenticated() && p.is_superuser())
    }

    /// Endpoint-scoped access check.
    pub fn resolve_endpoint_access(
        &self,
        principal: Option<&dyn Principal>,
        request: &RequestDescriptor,
    ) -> Result<bool> {
        self.evaluate(principal, request, None)
    }

    /// Object-scoped access check. `target` is required.
    pub fn resolve_object_access(
        &self,
        principal: Option<&dyn Principal>,
        request: &RequestDescriptor,
        target: Option<&dyn Target>,
    ) -> Result<bool> {
        let target = target.ok_or(AuthzError::MissingTarget)?;
        if let Some(expected) = request.object_id() {
            if expected != target.id() {
                return Err(AuthzError::TargetMismatch {
                    expected: expected.to_string(),
                    actual: target.id().to_string(),
                });
            }
        }
        self.evaluate(principal, request, Some(target))
    }

    /// Endpoint check, then the object check when a target is supplied.
    ///
    /// A request that names an object must come with its target.
    pub fn resolve(
        &self,
        principal: Option<&dyn Principal>,
        request: &RequestDescriptor,
        target: Option<&dyn Target>,
    ) -> Result<bool> {
        if target.is_none() && request.object_id().is_some() {
            return Err(AuthzError::MissingTarget);
        }
        if !self.resolve_endpoint_access(principal, request)? {
            return Ok(false);
        }
        match target {
            Some(_) => self.resolve_object_access(principal, request, target),
            None => Ok(true),
        }
    }

    fn gate(&self, principal: Option<&dyn Principal>) -> Option<bool> {
        if self.is_anonymous(principal) {
            return Some(false);
        }
        if Self::is_superuser(principal) {
            return Some(true);
        }
        None
    }

    fn evaluate(
        &self,
        principal: Option<&dyn Principal>,
        request: &RequestDescriptor,
        target: Option<&dyn Target>,
    ) -> Result<bool> {
        let caller = principal.map(|p| p.id()).unwrap_or("<none>");

        if let Some(verdict) = self.gate(principal) {
            debug!(
                "{}: {} for {} decided by gating: {}",
                self.name,
                request,
                caller,
                if verdict { "superuser" } else { "anonymous" }
            );
            return Ok(verdict);
        }

        // Gating lets unauthenticated callers through only on open endpoints;
        // policies then see them as `None` and hold no permissions.
        let principal = principal.filter(|p| p.is_authenticated());
        let ctx = AccessContext::new(principal, request);
        let allowed = policy::all_allow(&self.policies, &ctx, target)?;

        debug!(
            "{}: {} for {} {}",
            self.name,
            request,
            caller,
            if allowed { "allowed" } else { "denied" }
        );
        Ok(allowed)
    }
}

/// Endpoint-scoped entry point.
pub fn resolve_endpoint_access(
    principal: Option<&dyn Principal>,
    request: &RequestDescriptor,
    declared_policy: &EndpointPolicy,
) -> Result<bool> {
    declared_policy.resolve_endpoint_access(principal, request)
}

/// Object-scoped entry point.
pub fn resolve_object_access(
    principal: Option<&dyn Principal>,
    request: &RequestDescriptor,
    target: Option<&dyn Target>,
    declared_policy: &EndpointPolicy,
) -> Result<bool> {
    declared_policy.resolve_object_access(principal, request, target)
}
