//! Core value types: verbs, actions, request descriptors, and the in-memory
//! principal and target used by hosts that do not bring their own.
//!
//! Permission strings are opaque. Two permissions are the same only when
//! their strings are byte-for-byte equal; there is no wildcard or prefix
//! matching anywhere in the engine.

use crate::context::{Principal, Target};
use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A set of required (or granted) permission strings.
pub type PermissionSet = BTreeSet<String>;

/// Sentinel permission no principal is ever granted.
///
/// Declaring it for a key turns that key into "deny everyone except
/// superusers".
pub const FORBIDDEN_PERMISSION: &str = "forbidden_403";

/// Builds a [`PermissionSet`] from anything string-like.
pub fn permission_set<I, S>(permissions: I) -> PermissionSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    permissions.into_iter().map(Into::into).collect()
}

/// Transport-level request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Every supported verb, in declaration order.
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Head,
        Verb::Options,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Read-only verbs, which carry no model permission by default.
    pub fn is_safe(&self) -> bool {
        matches!(self, Verb::Get | Verb::Head | Verb::Options)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = AuthzError;

    /// Parses an upper-case method name. Matching is exact so that a
    /// lower-case `"get"` stays available as an action name.
    fn from_str(s: &str) -> Result<Self> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| AuthzError::UnknownVerb(s.to_string()))
    }
}

/// Logical operation an endpoint performs, independent of the verb.
///
/// A `GET` can be a `list` or a `retrieve`; actions let the two carry
/// different requirements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action {
    /// The name of the action (e.g., "list", "partial_update", "publish")
    pub name: String,
}

impl Action {
    /// Names of the actions every resource endpoint provides.
    pub const STANDARD: [&'static str; 6] = [
        "create",
        "retrieve",
        "update",
        "partial_update",
        "destroy",
        "list",
    ];

    /// Creates a new Action with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// What the caller is trying to do: verb, optional action, optional object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_id: Option<String>,
}

impl RequestDescriptor {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            action: None,
            object_id: None,
        }
    }

    /// Builds a descriptor from a raw method string.
    ///
    /// An empty method is a contract violation, not an unknown verb.
    pub fn parse(method: &str) -> Result<Self> {
        let method = method.trim();
        if method.is_empty() {
            return Err(AuthzError::MissingMethod);
        }
        Ok(Self::new(method.parse()?))
    }

    /// Sets the action. An empty name means "no action".
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        let name = action.into();
        self.action = if name.is_empty() {
            None
        } else {
            Some(Action::new(name))
        };
        self
    }

    /// Names the object this request targets.
    pub fn with_object(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn action_name(&self) -> Option<&str> {
        self.action.as_ref().map(|action| action.name.as_str())
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        if let Some(action) = &self.action {
            write!(f, " {}", action)?;
        }
        if let Some(object_id) = &self.object_id {
            write!(f, " [{}]", object_id)?;
        }
        Ok(())
    }
}

/// The model an endpoint serves, used to derive default permission strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelMeta {
    pub app_label: String,
    pub model_name: String,
}

impl ModelMeta {
    pub fn new(app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            model_name: model_name.into(),
        }
    }

    /// Model-level permission for an operation, e.g. `app.change_blog`.
    pub fn permission(&self, operation: &str) -> String {
        format!("{}.{}_{}", self.app_label, operation, self.model_name)
    }
}

/// Expands `{app_label}` and `{model_name}` placeholders in a permission.
///
/// Strings without a `{` are returned untouched. Placeholders need a model,
/// and any other placeholder name is rejected.
pub fn expand_permission(template: &str, model: Option<&ModelMeta>) -> Result<String> {
    if !template.contains('{') {
        return Ok(template.to_string());
    }

    let model = model.ok_or_else(|| {
        AuthzError::InvalidConfiguration(format!(
            "permission '{}' uses a model placeholder but no model is declared",
            template
        ))
    })?;

    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            AuthzError::InvalidConfiguration(format!(
                "unterminated placeholder in permission '{}'",
                template
            ))
        })?;
        match &after[..end] {
            "app_label" => expanded.push_str(&model.app_label),
            "model_name" => expanded.push_str(&model.model_name),
            other => {
                return Err(AuthzError::InvalidConfiguration(format!(
                    "unknown placeholder '{{{}}}' in permission '{}'",
                    other, template
                )))
            }
        }
        rest = &after[end + 1..];
    }
    expanded.push_str(rest);

    Ok(expanded)
}

/// In-memory principal with a fixed set of granted permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl User {
    /// An authenticated, unprivileged user with no permissions.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authenticated: true,
            superuser: false,
            permissions: PermissionSet::new(),
        }
    }

    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            authenticated: false,
            superuser: false,
            permissions: PermissionSet::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn as_superuser(mut self) -> Self {
        self.superuser = true;
        self
    }
}

impl Principal for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }

    fn has_permissions(&self, required: &PermissionSet) -> Result<bool> {
        Ok(required.is_subset(&self.permissions))
    }
}

/// In-memory target object with JSON attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The unique identifier for this resource
    pub id: String,

    /// The type of resource (e.g., "Blog", "Comment")
    pub entity_type: String,

    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    /// Creates a new Resource with the given ID and type.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Target for Resource {
    fn id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
