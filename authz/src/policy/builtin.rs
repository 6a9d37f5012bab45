//! Policies that look only at the caller.

use crate::context::{AccessContext, Target};
use crate::error::Result;
use crate::policy::Policy;

/// Allows every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAny;

impl Policy for AllowAny {
    fn name(&self) -> &str {
        "allow_any"
    }

    fn allows_endpoint(&self, _ctx: &AccessContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// Allows authenticated principals only.
///
/// Useful inside chains of endpoints that otherwise admit anonymous callers.
/// Object checks always pass; the endpoint check already ran.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

impl Policy for IsAuthenticated {
    fn name(&self) -> &str {
        "is_authenticated"
    }

    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        Ok(ctx.is_authenticated())
    }

    fn allows_object(&self, _ctx: &AccessContext<'_>, _target: &dyn Target) -> Result<bool> {
        Ok(true)
    }
}

/// Allows authenticated superusers only. Object checks always pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsSuperuser;

impl Policy for IsSuperuser {
    fn name(&self) -> &str {
        "is_superuser"
    }

    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        Ok(ctx
            .principal()
            .is_some_and(|p| p.is_authenticated() && p.is_superuser()))
    }

    fn allows_object(&self, _ctx: &AccessContext<'_>, _target: &dyn Target) -> Result<bool> {
        Ok(true)
    }
}
