//! Extension point for one-off rules that do not fit a mapping.
//!
//! A [`CustomPolicy`] carries up to two predicates. Whichever is not supplied
//! falls back to the native behaviour, which is to allow, so a bare custom
//! policy is a pass-through.

use crate::context::{AccessContext, Target};
use crate::error::Result;
use crate::policy::Policy;
use std::fmt;
use std::sync::Arc;

type EndpointPredicate = dyn Fn(&AccessContext<'_>) -> Result<bool> + Send + Sync;
type ObjectPredicate = dyn Fn(&AccessContext<'_>, &dyn Target) -> Result<bool> + Send + Sync;

/// Policy built from closures.
#[derive(Clone)]
pub struct CustomPolicy {
    name: String,
    endpoint: Option<Arc<EndpointPredicate>>,
    object: Option<Arc<ObjectPredicate>>,
}

impl CustomPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            object: None,
        }
    }

    /// Overrides the endpoint-scoped predicate.
    pub fn on_endpoint<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AccessContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.endpoint = Some(Arc::new(predicate));
        self
    }

    /// Overrides the object-scoped predicate.
    pub fn on_object<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AccessContext<'_>, &dyn Target) -> Result<bool> + Send + Sync + 'static,
    {
        self.object = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for CustomPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPolicy")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.is_some())
            .field("object", &self.object.is_some())
            .finish()
    }
}

impl Policy for CustomPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        match &self.endpoint {
            Some(predicate) => predicate(ctx),
            None => Ok(true),
        }
    }

    fn allows_object(&self, ctx: &AccessContext<'_>, target: &dyn Target) -> Result<bool> {
        match &self.object {
            Some(predicate) => predicate(ctx, target),
            None => Ok(true),
        }
    }
}

/// Object rule: the target's `attribute` must equal the principal's id.
///
/// Endpoint-scoped requests are allowed; ownership only means something
/// once there is an object.
#[derive(Debug, Clone)]
pub struct AuthorMatch {
    attribute: String,
}

impl AuthorMatch {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl Default for AuthorMatch {
    fn default() -> Self {
        Self::new("author")
    }
}

impl Policy for AuthorMatch {
    fn name(&self) -> &str {
        "author_match"
    }

    fn allows_endpoint(&self, _ctx: &AccessContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn allows_object(&self, ctx: &AccessContext<'_>, target: &dyn Target) -> Result<bool> {
        let Some(principal) = ctx.principal() else {
            return Ok(false);
        };
        Ok(target
            .attribute(&self.attribute)
            .and_then(|value| value.as_str())
            .is_some_and(|author| author == principal.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestDescriptor, Resource, User, Verb};

    #[test]
    fn test_bare_custom_policy_passes_through() {
        let policy = CustomPolicy::new("custom");
        let request = RequestDescriptor::new(Verb::Post);
        let ctx = AccessContext::new(None, &request);

        assert!(policy.allows_endpoint(&ctx).unwrap());
        assert!(policy
            .allows_object(&ctx, &Resource::new("1", "Blog"))
            .unwrap());
    }

    #[test]
    fn test_custom_endpoint_predicate() {
        let policy = CustomPolicy::new("only_mvm")
            .on_endpoint(|ctx| Ok(ctx.principal().is_some_and(|p| p.id() == "mvm")));
        let request = RequestDescriptor::new(Verb::Get);

        let mvm = User::new("mvm");
        let other = User::new("alice");
        assert!(policy
            .allows_endpoint(&AccessContext::new(Some(&mvm), &request))
            .unwrap());
        assert!(!policy
            .allows_endpoint(&AccessContext::new(Some(&other), &request))
            .unwrap());
        assert!(format!("{:?}", policy).contains("only_mvm"));
    }

    #[test]
    fn test_author_match() {
        let policy = AuthorMatch::default();
        let request = RequestDescriptor::new(Verb::Put).with_object("3");
        let author = User::new("alice");
        let other = User::new("bob");
        let post = Resource::new("3", "Blog").with_attribute("author", "alice");

        assert!(policy
            .allows_object(&AccessContext::new(Some(&author), &request), &post)
            .unwrap());
        assert!(!policy
            .allows_object(&AccessContext::new(Some(&other), &request), &post)
            .unwrap());
        assert!(!policy
            .allows_object(&AccessContext::new(None, &request), &post)
            .unwrap());
        assert!(policy
            .allows_endpoint(&AccessContext::new(Some(&other), &request))
            .unwrap());
    }

    #[test]
    fn test_author_match_missing_attribute_denies() {
        let policy = AuthorMatch::new("owner");
        let request = RequestDescriptor::new(Verb::Delete);
        let user = User::new("alice");
        let untagged = Resource::new("4", "Comment").with_attribute("owner", 17);

        assert!(!policy
            .allows_object(&AccessContext::new(Some(&user), &request), &untagged)
            .unwrap());
        assert!(!policy
            .allows_object(
                &AccessContext::new(Some(&user), &request),
                &Resource::new("5", "Comment")
            )
            .unwrap());
    }
}
