//! Permission-string policies keyed by verb, by action, or by both.
//!
//! The required set for a request is looked up in a [`PermissionMap`]. An
//! empty set means the endpoint declared no restriction and the request is
//! allowed. A non-empty set is granted only when the principal holds all of
//! it.

use crate::context::AccessContext;
use crate::error::Result;
use crate::policy::Policy;
use crate::types::{Action, ModelMeta, PermissionSet, RequestDescriptor, Verb};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Which key spaces a [`PermissionPolicy`] consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionFactor {
    /// Verb only.
    #[serde(rename = "request", alias = "method")]
    Method,
    /// Action only.
    Action,
    /// Union of the verb and action requirements.
    #[default]
    All,
}

/// Required permissions per verb and per action.
///
/// Maps are built once at configuration time and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMap {
    by_verb: HashMap<Verb, PermissionSet>,
    by_action: HashMap<String, PermissionSet>,
}

impl PermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base mapping for method-keyed policies.
    ///
    /// Safe verbs require nothing; `POST` requires `add`, `PUT`/`PATCH`
    /// `change` and `DELETE` `delete` on the model. Without a model every
    /// verb maps to the empty set.
    pub fn model_defaults(model: Option<&ModelMeta>) -> Self {
        let mut map = Self::new();
        for verb in Verb::ALL {
            let required = match (model, verb) {
                (None, _) => PermissionSet::new(),
                (_, verb) if verb.is_safe() => PermissionSet::new(),
                (Some(model), Verb::Post) => PermissionSet::from([model.permission("add")]),
                (Some(model), Verb::Put | Verb::Patch) => {
                    PermissionSet::from([model.permission("change")])
                }
                (Some(model), Verb::Delete) => PermissionSet::from([model.permission("delete")]),
                _ => PermissionSet::new(),
            };
            map.by_verb.insert(verb, required);
        }
        map
    }

    /// Base mapping for action-keyed policies: every standard action, open.
    pub fn standard_actions() -> Self {
        let mut map = Self::new();
        for action in Action::STANDARD {
            map.by_action.insert(action.to_string(), PermissionSet::new());
        }
        map
    }

    /// Base mapping for combined policies: every verb and standard action,
    /// open.
    pub fn open() -> Self {
        let mut map = Self::standard_actions();
        for verb in Verb::ALL {
            map.by_verb.insert(verb, PermissionSet::new());
        }
        map
    }

    pub fn with_verb<I, S>(mut self, verb: Verb, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_verb(verb, permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_action<I, S>(mut self, action: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_action(action, permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert_verb(&mut self, verb: Verb, permissions: PermissionSet) -> Option<PermissionSet> {
        self.by_verb.insert(verb, permissions)
    }

    pub fn insert_action(
        &mut self,
        action: impl Into<String>,
        permissions: PermissionSet,
    ) -> Option<PermissionSet> {
        self.by_action.insert(action.into(), permissions)
    }

    /// Returns `self` with every entry of `overrides` replacing its own.
    pub fn merged(mut self, overrides: &PermissionMap) -> Self {
        for (verb, permissions) in &overrides.by_verb {
            self.by_verb.insert(*verb, permissions.clone());
        }
        for (action, permissions) in &overrides.by_action {
            self.by_action.insert(action.clone(), permissions.clone());
        }
        self
    }

    pub fn for_verb(&self, verb: Verb) -> Option<&PermissionSet> {
        self.by_verb.get(&verb)
    }

    pub fn for_action(&self, action: &str) -> Option<&PermissionSet> {
        self.by_action.get(action)
    }

    pub fn is_empty(&self) -> bool {
        self.by_verb.is_empty() && self.by_action.is_empty()
    }

    /// Permissions `request` needs under `factor`. Missing keys contribute
    /// nothing.
    pub fn required(&self, factor: PermissionFactor, request: &RequestDescriptor) -> PermissionSet {
        let mut required = PermissionSet::new();

        if matches!(factor, PermissionFactor::Method | PermissionFactor::All) {
            if let Some(permissions) = self.for_verb(request.verb()) {
                required.extend(permissions.iter().cloned());
            }
        }

        if matches!(factor, PermissionFactor::Action | PermissionFactor::All) {
            if let Some(permissions) = request.action_name().and_then(|a| self.for_action(a)) {
                required.extend(permissions.iter().cloned());
            }
        }

        required
    }
}

/// Permission-string policy over a [`PermissionMap`].
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    name: String,
    factor: PermissionFactor,
    map: PermissionMap,
}

impl PermissionPolicy {
    pub fn new(factor: PermissionFactor, map: PermissionMap) -> Self {
        let name = match factor {
            PermissionFactor::Method => "request_permissions",
            PermissionFactor::Action => "action_permissions",
            PermissionFactor::All => "request_action_permissions",
        };
        Self {
            name: name.to_string(),
            factor,
            map,
        }
    }

    /// Looks up the verb only.
    pub fn method(map: PermissionMap) -> Self {
        Self::new(PermissionFactor::Method, map)
    }

    /// Looks up the action only.
    pub fn action(map: PermissionMap) -> Self {
        Self::new(PermissionFactor::Action, map)
    }

    /// Looks up both and requires the union.
    pub fn combined(map: PermissionMap) -> Self {
        Self::new(PermissionFactor::All, map)
    }

    pub fn factor(&self) -> PermissionFactor {
        self.factor
    }

    pub fn map(&self) -> &PermissionMap {
        &self.map
    }

    pub fn required_permissions(&self, request: &RequestDescriptor) -> PermissionSet {
        self.map.required(self.factor, request)
    }
}

impl Policy for PermissionPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows_endpoint(&self, ctx: &AccessContext<'_>) -> Result<bool> {
        let required = self.required_permissions(ctx.request());
        if required.is_empty() {
            trace!("{}: no permissions declared for {}", self.name, ctx.request());
            return Ok(true);
        }

        trace!(
            "{}: {} requires {:?}",
            self.name,
            ctx.request(),
            required
        );
        ctx.has_permissions(&required).map_err(|e| {
            warn!("{}: permission lookup failed for {}: {}", self.name, ctx.request(), e);
            e
        })
    }
}
