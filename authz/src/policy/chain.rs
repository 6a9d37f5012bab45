//! Chains of sub-policies keyed by verb, action, or groups of either.
//!
//! # Resolution order
//!
//! For a request with verb `V` and action `A`:
//!
//! 1. If a plain key `V` is declared, all of its policies must allow.
//! 2. If a plain key `A` is declared, all of its policies must allow.
//!    Both plain keys are applied when both are declared.
//! 3. Only when neither plain key matched, every group containing `V` or
//!    `A` is applied, in declaration order.
//! 4. When nothing matched the request is allowed.
//!
//! Evaluation stops at the first denial. Groups never run alongside a plain
//! match, so a requirement declared both specifically and in a group is not
//! applied twice.

use crate::context::{AccessContext, Target};
use crate::error::{AuthzError, Result};
use crate::policy::{all_allow, Policy, PolicyRef};
use crate::types::{RequestDescriptor, Verb};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, trace};

/// One member of a chain key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyMember {
    Verb(Verb),
    Action(String),
}

impl KeyMember {
    /// Upper-case method names become verbs; everything else is an action.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<Verb>() {
            Ok(verb) => KeyMember::Verb(verb),
            Err(_) => KeyMember::Action(raw.to_string()),
        }
    }

    fn matches(&self, request: &RequestDescriptor) -> bool {
        match self {
            KeyMember::Verb(verb) => *verb == request.verb(),
            KeyMember::Action(action) => request.action_name() == Some(action.as_str()),
        }
    }
}

impl fmt::Display for KeyMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMember::Verb(verb) => write!(f, "{}", verb),
            KeyMember::Action(action) => f.write_str(action),
        }
    }
}

/// Lookup key of a chain rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainKey {
    Verb(Verb),
    Action(String),
    /// Aliases sharing one requirement. Never empty.
    Group(BTreeSet<KeyMember>),
}

impl ChainKey {
    /// Parses a single plain key.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(AuthzError::InvalidKey("empty key".to_string()));
        }
        Ok(match KeyMember::parse(raw) {
            KeyMember::Verb(verb) => ChainKey::Verb(verb),
            KeyMember::Action(action) => ChainKey::Action(action),
        })
    }

    /// Builds a group key from raw member names.
    pub fn group<I, S>(members: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = BTreeSet::new();
        for member in members {
            let member = member.as_ref();
            if member.is_empty() {
                return Err(AuthzError::InvalidKey("empty group member".to_string()));
            }
            parsed.insert(KeyMember::parse(member));
        }
        if parsed.is_empty() {
            return Err(AuthzError::InvalidKey("empty group".to_string()));
        }
        Ok(ChainKey::Group(parsed))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ChainKey::Group(_))
    }

    /// Whether a group key has a member matching the request's verb or
    /// action. Plain keys are matched by exact lookup instead.
    fn group_applies(&self, request: &RequestDescriptor) -> bool {
        match self {
            ChainKey::Group(members) => members.iter().any(|m| m.matches(request)),
            _ => false,
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKey::Verb(verb) => write!(f, "{}", verb),
            ChainKey::Action(action) => f.write_str(action),
            ChainKey::Group(members) => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "({})", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainRule {
    key: ChainKey,
    policies: Vec<PolicyRef>,
}

impl ChainRule {
    pub fn key(&self) -> &ChainKey {
        &self.key
    }

    pub fn policies(&self) -> &[PolicyRef] {
        &self.policies
    }
}

/// Chain policy. Immutable once built; use [`ChainPolicy::builder`].
#[derive(Debug, Clone, Default)]
pub struct ChainPolicy {
    rules: Vec<ChainRule>,
}

impl ChainPolicy {
    pub fn builder() -> ChainPolicyBuilder {
        ChainPolicyBuilder::default()
    }

    pub fn rules(&self) -> &[ChainRule] {
        &self.rules
    }

    fn verb_rule(&self, verb: Verb) -> Option<&ChainRule> {
        self.rules
            .iter()
            .find(|rule| rule.key == ChainKey::Verb(verb))
    }

    fn action_rule(&self, action: &str) -> Option<&ChainRule> {
        self.rules
            .iter()
            .find(|rule| matches!(&rule.key, ChainKey::Action(name) if name == action))
    }

    /// Keys whose policies apply to `request`, in evaluation order.
    pub fn applicable_keys(&self, request: &RequestDescriptor) -> Vec<&ChainKey> {
        let plain: Vec<&ChainKey> = self
            .verb_rule(request.verb())
            .into_iter()
            .chain(request.action_name().and_then(|a| self.action_rule(a)))
            .map(|rule| &rule.key)
            .collect();
        if !plain.is_empty() {
            return plain;
        }

        self.rules
            .iter()
            .filter(|rule| rule.key.group_applies(request))
            .map(|rule| &rule.key)
            .collect()
    }

    fn verify(&self, ctx: &AccessContext<'_>, target: Option<&dyn Target>) -> Result<bool> {
        let request = ctx.request();
        let mut matched = false;

        if let Some(rule) = self.verb_rule(request.verb()) {
            trace!("chain: applying key {} to {}", rule.key, request);
            if !all_allow(&rule.policies, ctx, target)? {
                return Ok(false);
            }
            matched = true;
        }

        if let Some(rule) = request.action_name().and_then(|a| self.action_rule(a)) {
            trace!("chain: applying key {} to {}", rule.key, request);
            if !all_allow(&rule.policies, ctx, target)? {
                return Ok(false);
            }
            matched = true;
        }

        if matched {
            return Ok(true);
        }

        for rule in self.rules.iter().filter(|r| r.key.group_applies(request)) {
            trace!("chain: applying group {} to {}", rule.key, request);
            if !all_allow(&rule.policies, ctx, target)? {
                return Ok(false);
            }
            matched = true;
        }

        if !matched {
            debug!("chain: no key declared for {}, allowing", request);
        }
        Ok(true)
    }
}

impl Policy for ChainPolicy {
    fn name(&self) -> &str {
        "chain"
    }

    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        self.verify(ctx, None)
    }

    fn allows_object(&self, ctx: &AccessContext<'_>, target: &dyn Target) -> Result<bool> {
        self.verify(ctx, Some(target))
    }
}

/// Collects chain rules and rejects malformed mappings.
#[derive(Debug, Default)]
pub struct ChainPolicyBuilder {
    rules: Vec<ChainRule>,
}

impl ChainPolicyBuilder {
    pub fn rule<I>(mut self, key: ChainKey, policies: I) -> Self
    where
        I: IntoIterator<Item = PolicyRef>,
    {
        self.rules.push(ChainRule {
            key,
            policies: policies.into_iter().collect(),
        });
        self
    }

    pub fn build(self) -> Result<ChainPolicy> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(&rule.key) {
                return Err(AuthzError::DuplicateKey(rule.key.to_string()));
            }
        }
        Ok(ChainPolicy { rules: self.rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::custom::CustomPolicy;
    use crate::policy::testing::Counting;
    use crate::policy::{PermissionMap, PermissionPolicy};
    use crate::types::{Resource, User};
    use std::sync::Arc;

    fn key(raw: &str) -> ChainKey {
        ChainKey::parse(raw).unwrap()
    }

    fn group(members: &[&str]) -> ChainKey {
        ChainKey::group(members).unwrap()
    }

    fn check(chain: &ChainPolicy, request: &RequestDescriptor) -> bool {
        let user = User::new("alice");
        chain
            .allows_endpoint(&AccessContext::new(Some(&user), request))
            .unwrap()
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(key("GET"), ChainKey::Verb(Verb::Get));
        assert_eq!(key("list"), ChainKey::Action("list".into()));
        assert_eq!(key("get"), ChainKey::Action("get".into()));
        assert!(ChainKey::parse("").is_err());
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            ChainKey::group(empty),
            Err(AuthzError::InvalidKey(_))
        ));
        assert!(ChainKey::group(["PUT", ""]).is_err());
    }

    #[test]
    fn test_group_is_unordered() {
        assert_eq!(group(&["PUT", "PATCH"]), group(&["PATCH", "PUT"]));
        assert_eq!(group(&["PUT", "PATCH"]).to_string(), "(PUT, PATCH)");
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let result = ChainPolicy::builder()
            .rule(group(&["PUT", "PATCH"]), [])
            .rule(group(&["PATCH", "PUT"]), [])
            .build();
        assert!(matches!(result, Err(AuthzError::DuplicateKey(_))));
    }

    #[test]
    fn test_plain_keys_suppress_group_fallback() {
        let p1 = Counting::allowing("p1");
        let p2 = Counting::allowing("p2");
        let p3 = Counting::allowing("p3");
        let chain = ChainPolicy::builder()
            .rule(key("GET"), [p1.clone() as PolicyRef])
            .rule(key("list"), [p2.clone() as PolicyRef])
            .rule(group(&["GET", "list"]), [p3.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Get).with_action("list");
        assert!(check(&chain, &request));
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
        assert_eq!(p3.calls(), 0, "group must not run when a plain key matched");
        assert_eq!(chain.applicable_keys(&request), vec![&key("GET"), &key("list")]);
    }

    #[test]
    fn test_verb_match_alone_suppresses_groups() {
        let grouped = Counting::denying("grouped");
        let chain = ChainPolicy::builder()
            .rule(key("GET"), [])
            .rule(group(&["retrieve", "list"]), [grouped.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Get).with_action("retrieve");
        assert!(check(&chain, &request));
        assert_eq!(grouped.calls(), 0);
    }

    #[test]
    fn test_action_match_alone_suppresses_groups() {
        let action = Counting::allowing("action");
        let grouped = Counting::denying("grouped");
        let chain = ChainPolicy::builder()
            .rule(key("update"), [action.clone() as PolicyRef])
            .rule(group(&["PUT", "PATCH"]), [grouped.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Put).with_action("update");
        assert!(check(&chain, &request));
        assert_eq!(action.calls(), 1);
        assert_eq!(grouped.calls(), 0);
    }

    #[test]
    fn test_group_fallback() {
        let p1 = Counting::allowing("p1");
        let chain = ChainPolicy::builder()
            .rule(group(&["PUT", "PATCH"]), [p1.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Patch).with_action("partial_update");
        assert!(check(&chain, &request));
        assert_eq!(p1.calls(), 1);
    }

    #[test]
    fn test_every_matching_group_applies() {
        let by_verb = Counting::allowing("by_verb");
        let by_action = Counting::denying("by_action");
        let chain = ChainPolicy::builder()
            .rule(group(&["PUT", "PATCH"]), [by_verb.clone() as PolicyRef])
            .rule(group(&["update", "partial_update"]), [by_action.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Patch).with_action("partial_update");
        assert!(!check(&chain, &request));
        assert_eq!(by_verb.calls(), 1);
        assert_eq!(by_action.calls(), 1);
        assert_eq!(chain.applicable_keys(&request).len(), 2);
    }

    #[test]
    fn test_non_matching_group_contributes_nothing() {
        let grouped = Counting::denying("grouped");
        let chain = ChainPolicy::builder()
            .rule(group(&["PUT", "PATCH"]), [grouped.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Get).with_action("list");
        assert!(check(&chain, &request));
        assert_eq!(grouped.calls(), 0);
        assert!(chain.applicable_keys(&request).is_empty());
    }

    #[test]
    fn test_no_declared_key_allows() {
        let chain = ChainPolicy::builder()
            .rule(key("POST"), [Counting::denying("post") as PolicyRef])
            .build()
            .unwrap();

        assert!(check(&chain, &RequestDescriptor::new(Verb::Get)));
        assert!(check(&ChainPolicy::default(), &RequestDescriptor::new(Verb::Delete)));
    }

    #[test]
    fn test_empty_policy_list_under_matched_key_allows() {
        let grouped = Counting::denying("grouped");
        let chain = ChainPolicy::builder()
            .rule(key("DELETE"), [])
            .rule(group(&["DELETE"]), [grouped.clone() as PolicyRef])
            .build()
            .unwrap();

        assert!(check(&chain, &RequestDescriptor::new(Verb::Delete)));
        assert_eq!(grouped.calls(), 0);
    }

    #[test]
    fn test_first_denial_short_circuits() {
        let p1 = Counting::denying("p1");
        let p2 = Counting::allowing("p2");
        let p3 = Counting::allowing("p3");
        let chain = ChainPolicy::builder()
            .rule(key("GET"), [p1.clone() as PolicyRef, p2.clone() as PolicyRef])
            .rule(key("list"), [p3.clone() as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Get).with_action("list");
        assert!(!check(&chain, &request));
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
        assert_eq!(p3.calls(), 0);
    }

    #[test]
    fn test_absent_action_matches_only_verbs() {
        let by_action = Counting::denying("by_action");
        let chain = ChainPolicy::builder()
            .rule(group(&["list", "retrieve"]), [by_action.clone() as PolicyRef])
            .build()
            .unwrap();

        assert!(check(&chain, &RequestDescriptor::new(Verb::Get)));
        assert_eq!(by_action.calls(), 0);
    }

    #[test]
    fn test_object_scope_uses_object_predicate() {
        let owner_only = CustomPolicy::new("owner_only").on_object(|ctx, target| {
            Ok(ctx.principal().map(|p| p.id()) == target.attribute("owner").and_then(|v| v.as_str()))
        });
        let chain = ChainPolicy::builder()
            .rule(key("DELETE"), [Arc::new(owner_only) as PolicyRef])
            .build()
            .unwrap();

        let user = User::new("alice");
        let request = RequestDescriptor::new(Verb::Delete).with_object("9");
        let ctx = AccessContext::new(Some(&user), &request);

        assert!(chain.allows_endpoint(&ctx).unwrap());
        assert!(chain
            .allows_object(&ctx, &Resource::new("9", "Blog").with_attribute("owner", "alice"))
            .unwrap());
        assert!(!chain
            .allows_object(&ctx, &Resource::new("9", "Blog").with_attribute("owner", "bob"))
            .unwrap());
    }

    #[test]
    fn test_nested_chain() {
        let inner = ChainPolicy::builder()
            .rule(
                key("list"),
                [Arc::new(PermissionPolicy::method(
                    PermissionMap::new().with_verb(Verb::Get, ["app.view_blog"]),
                )) as PolicyRef],
            )
            .build()
            .unwrap();
        let outer = ChainPolicy::builder()
            .rule(group(&["GET", "HEAD"]), [Arc::new(inner) as PolicyRef])
            .build()
            .unwrap();

        let request = RequestDescriptor::new(Verb::Get).with_action("list");
        let viewer = User::new("alice").with_permissions(["app.view_blog"]);
        let stranger = User::new("bob");

        assert!(outer
            .allows_endpoint(&AccessContext::new(Some(&viewer), &request))
            .unwrap());
        assert!(!outer
            .allows_endpoint(&AccessContext::new(Some(&stranger), &request))
            .unwrap());
    }

    #[test]
    fn test_repeated_evaluation_is_stable() {
        let chain = ChainPolicy::builder()
            .rule(
                group(&["PUT", "PATCH"]),
                [Arc::new(PermissionPolicy::method(
                    PermissionMap::new().with_verb(Verb::Patch, ["app.change_blog"]),
                )) as PolicyRef],
            )
            .build()
            .unwrap();
        let request = RequestDescriptor::new(Verb::Patch);

        let first = check(&chain, &request);
        for _ in 0..5 {
            assert_eq!(check(&chain, &request), first);
        }
        assert_eq!(chain.rules().len(), 1);
    }
}
