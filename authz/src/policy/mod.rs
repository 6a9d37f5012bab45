//! Policies and the contract every sub-policy implements.
//!
//! A policy answers two questions: may this request reach the endpoint, and
//! may it touch this particular object. Chains hold policies as
//! [`PolicyRef`] handles, so any implementation (including another chain)
//! can be nested.

pub mod builtin;
pub mod chain;
pub mod custom;
pub mod permissions;

use crate::context::{AccessContext, Target};
use crate::error::Result;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

pub use builtin::{AllowAny, IsAuthenticated, IsSuperuser};
pub use chain::{ChainKey, ChainPolicy, ChainPolicyBuilder, ChainRule, KeyMember};
pub use custom::{AuthorMatch, CustomPolicy};
pub use permissions::{PermissionFactor, PermissionMap, PermissionPolicy};

/// A unit of authorization logic.
pub trait Policy: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Endpoint-scoped check.
    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool>;

    /// Object-scoped check. Unless overridden this is the endpoint check.
    fn allows_object(&self, ctx: &AccessContext<'_>, _target: &dyn Target) -> Result<bool> {
        self.allows_endpoint(ctx)
    }
}

/// Shared handle to a policy.
pub type PolicyRef = Arc<dyn Policy>;

/// Runs the endpoint or object predicate depending on whether a target is
/// present.
pub fn evaluate(
    policy: &dyn Policy,
    ctx: &AccessContext<'_>,
    target: Option<&dyn Target>,
) -> Result<bool> {
    match target {
        Some(target) => policy.allows_object(ctx, target),
        None => policy.allows_endpoint(ctx),
    }
}

/// All-of over `policies`, stopping at the first denial or fault.
pub fn all_allow(
    policies: &[PolicyRef],
    ctx: &AccessContext<'_>,
    target: Option<&dyn Target>,
) -> Result<bool> {
    for policy in policies {
        if !evaluate(policy.as_ref(), ctx, target)? {
            debug!("Policy '{}' denied {}", policy.name(), ctx.request());
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Policies with observable side effects, for short-circuit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    pub struct Counting {
        name: String,
        verdict: bool,
        calls: AtomicUsize,
    }

    impl Counting {
        pub fn allowing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                verdict: true,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn denying(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                verdict: false,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Policy for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        fn allows_endpoint(&self, _ctx: &AccessContext<'_>) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict)
        }
    }
}
