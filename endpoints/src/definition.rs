//! Serializable endpoint declarations and their compiled permission maps.

use crate::error::{EndpointConfigError, Result};
use access_policy::{
    expand_permission, AuthzError, ChainKey, ModelMeta, PermissionFactor, PermissionMap,
    PermissionSet, Verb,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contents of one endpoint configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointFile {
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
}

/// Declared access policy of one endpoint.
///
/// The three string maps feed the `request`, `action` and `request_action`
/// policies; `permissions_map` feeds the `chain` policy. `policies` lists the
/// top-level policies by name, all of which must allow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Model served by the endpoint, for default and templated permissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelMeta>,
    #[serde(default = "default_authenticated_users_only")]
    pub authenticated_users_only: bool,
    /// Key spaces consulted by the `request_action` policy.
    #[serde(default)]
    pub permission_factor: PermissionFactor,
    /// Attribute compared with the principal id by `author_match`.
    #[serde(default = "default_author_attribute")]
    pub author_attribute: String,
    #[serde(default)]
    pub request_perms_map: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub action_perms_map: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub perms_map: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub permissions_map: Vec<ChainEntry>,
    #[serde(default)]
    pub policies: Vec<String>,
}

pub fn default_authenticated_users_only() -> bool {
    true
}

pub fn default_author_attribute() -> String {
    "author".to_string()
}

/// One `permissions_map` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub key: KeySpec,
    #[serde(default)]
    pub policies: Vec<String>,
}

/// A chain key as written in YAML: a scalar or a list of aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Single(String),
    Group(Vec<String>),
}

impl KeySpec {
    pub fn to_chain_key(&self) -> access_policy::Result<ChainKey> {
        match self {
            KeySpec::Single(raw) => ChainKey::parse(raw),
            KeySpec::Group(members) => ChainKey::group(members),
        }
    }
}

impl EndpointDefinition {
    /// A definition with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            model: None,
            authenticated_users_only: default_authenticated_users_only(),
            permission_factor: PermissionFactor::default(),
            author_attribute: default_author_attribute(),
            request_perms_map: BTreeMap::new(),
            action_perms_map: BTreeMap::new(),
            perms_map: BTreeMap::new(),
            permissions_map: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// Structural checks that do not need the policy registry.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EndpointConfigError::Validation(
                "Endpoint ID cannot be empty".to_string(),
            ));
        }
        if self.author_attribute.is_empty() {
            return Err(EndpointConfigError::Validation(format!(
                "Endpoint '{}' has an empty author_attribute",
                self.id
            )));
        }
        let names = self
            .policies
            .iter()
            .chain(self.permissions_map.iter().flat_map(|e| e.policies.iter()));
        for name in names {
            if name.trim().is_empty() {
                return Err(EndpointConfigError::Validation(format!(
                    "Endpoint '{}' lists an empty policy name",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Method-keyed map: model defaults overridden by `request_perms_map`.
    pub fn request_map(&self) -> Result<PermissionMap> {
        let mut overrides = PermissionMap::new();
        for (key, permissions) in &self.request_perms_map {
            let verb = key.parse::<Verb>().map_err(|_| {
                self.key_error(format!("'{}' in request_perms_map is not a request method", key))
            })?;
            overrides.insert_verb(verb, self.expand(permissions)?);
        }
        Ok(PermissionMap::model_defaults(self.model.as_ref()).merged(&overrides))
    }

    /// Action-keyed map: open standard actions overridden by
    /// `action_perms_map`.
    pub fn action_map(&self) -> Result<PermissionMap> {
        let mut overrides = PermissionMap::new();
        for (key, permissions) in &self.action_perms_map {
            if key.is_empty() || key.parse::<Verb>().is_ok() {
                return Err(self.key_error(format!(
                    "'{}' in action_perms_map is not an action name",
                    key
                )));
            }
            overrides.insert_action(key.clone(), self.expand(permissions)?);
        }
        Ok(PermissionMap::standard_actions().merged(&overrides))
    }

    /// Combined map: every verb and standard action open, overridden by
    /// `perms_map`.
    pub fn combined_map(&self) -> Result<PermissionMap> {
        let mut overrides = PermissionMap::new();
        for (key, permissions) in &self.perms_map {
            let permissions = self.expand(permissions)?;
            match key.parse::<Verb>() {
                Ok(verb) => {
                    overrides.insert_verb(verb, permissions);
                }
                Err(_) if !key.is_empty() => {
                    overrides.insert_action(key.clone(), permissions);
                }
                Err(_) => return Err(self.key_error("empty key in perms_map".to_string())),
            }
        }
        Ok(PermissionMap::open().merged(&overrides))
    }

    fn expand(&self, permissions: &[String]) -> Result<PermissionSet> {
        permissions
            .iter()
            .map(|permission| {
                expand_permission(permission, self.model.as_ref())
                    .map_err(|e| EndpointConfigError::endpoint(&self.id, e))
            })
            .collect()
    }

    fn key_error(&self, message: String) -> EndpointConfigError {
        EndpointConfigError::endpoint(&self.id, AuthzError::InvalidKey(message))
    }
}
