//! Named sub-policies and the registry of compiled endpoints.

use crate::definition::{EndpointDefinition, EndpointFile};
use crate::error::{EndpointConfigError, Result};
use access_policy::{
    AllowAny, AuthorMatch, ChainPolicy, CustomPolicy, EndpointPolicy, IsAuthenticated,
    IsSuperuser, PermissionPolicy, PolicyRef,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a policy for an endpoint from its definition.
pub type PolicyFactory = dyn Fn(&EndpointDefinition) -> Result<PolicyRef> + Send + Sync;

/// Policy names every registry understands.
pub const BUILTIN_POLICIES: [&str; 9] = [
    "allow_any",
    "is_authenticated",
    "is_superuser",
    "custom",
    "author_match",
    "request",
    "action",
    "request_action",
    "chain",
];

/// Resolves policy names used in endpoint definitions.
///
/// Besides the built-ins, hosts can register their own factories before any
/// endpoint is loaded.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    factories: HashMap<String, Arc<PolicyFactory>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named factory. Built-in and already registered names are
    /// rejected.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&EndpointDefinition) -> Result<PolicyRef> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EndpointConfigError::Validation(
                "Policy name cannot be empty".to_string(),
            ));
        }
        if self.contains(&name) {
            return Err(EndpointConfigError::Validation(format!(
                "Policy '{}' is already registered",
                name
            )));
        }
        debug!("Registered policy factory '{}'", name);
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        BUILTIN_POLICIES.contains(&name) || self.factories.contains_key(name)
    }

    /// Builds the policy called `name` for `definition`.
    pub fn build(&self, name: &str, definition: &EndpointDefinition) -> Result<PolicyRef> {
        self.build_policy(name, definition, false)
    }

    fn build_policy(
        &self,
        name: &str,
        definition: &EndpointDefinition,
        inside_chain: bool,
    ) -> Result<PolicyRef> {
        if let Some(factory) = self.factories.get(name) {
            return factory(definition);
        }

        let policy: PolicyRef = match name {
            "allow_any" => Arc::new(AllowAny),
            "is_authenticated" => Arc::new(IsAuthenticated),
            "is_superuser" => Arc::new(IsSuperuser),
            "custom" => Arc::new(CustomPolicy::new("custom")),
            "author_match" => Arc::new(AuthorMatch::new(definition.author_attribute.clone())),
            "request" => Arc::new(PermissionPolicy::method(definition.request_map()?)),
            "action" => Arc::new(PermissionPolicy::action(definition.action_map()?)),
            "request_action" => Arc::new(PermissionPolicy::new(
                definition.permission_factor,
                definition.combined_map()?,
            )),
            "chain" if inside_chain => {
                return Err(EndpointConfigError::Validation(format!(
                    "Endpoint '{}' nests its chain inside its own permissions_map",
                    definition.id
                )))
            }
            "chain" => Arc::new(self.build_chain(definition)?),
            _ => {
                return Err(EndpointConfigError::UnknownPolicy {
                    endpoint: definition.id.clone(),
                    policy: name.to_string(),
                })
            }
        };
        Ok(policy)
    }

    fn build_chain(&self, definition: &EndpointDefinition) -> Result<ChainPolicy> {
        let mut builder = ChainPolicy::builder();
        for entry in &definition.permissions_map {
            let key = entry
                .key
                .to_chain_key()
                .map_err(|e| EndpointConfigError::endpoint(&definition.id, e))?;
            let policies = entry
                .policies
                .iter()
                .map(|name| self.build_policy(name, definition, true))
                .collect::<Result<Vec<_>>>()?;
            builder = builder.rule(key, policies);
        }
        builder
            .build()
            .map_err(|e| EndpointConfigError::endpoint(&definition.id, e))
    }

    /// Validates `definition` and compiles it into an immutable endpoint
    /// policy.
    pub fn compile(&self, definition: &EndpointDefinition) -> Result<EndpointPolicy> {
        definition.validate()?;

        let mut endpoint = EndpointPolicy::new(definition.id.clone())
            .with_authenticated_users_only(definition.authenticated_users_only);
        for name in &definition.policies {
            endpoint = endpoint.with_policy_ref(self.build(name, definition)?);
        }
        Ok(endpoint)
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("PolicyRegistry")
            .field("factories", &names)
            .finish()
    }
}

/// Compiled endpoint policies by endpoint id.
///
/// Filled once at startup; lookups hand out shared, immutable policies.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, Arc<EndpointPolicy>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and stores one endpoint.
    pub fn register(
        &mut self,
        definition: &EndpointDefinition,
        policies: &PolicyRegistry,
    ) -> Result<Arc<EndpointPolicy>> {
        if self.endpoints.contains_key(&definition.id) {
            return Err(EndpointConfigError::DuplicateEndpoint(definition.id.clone()));
        }

        let endpoint = Arc::new(policies.compile(definition)?);
        info!(
            "Registered endpoint '{}' with {} policies",
            definition.id,
            endpoint.policies().len()
        );
        self.endpoints
            .insert(definition.id.clone(), Arc::clone(&endpoint));
        Ok(endpoint)
    }

    /// Registers every endpoint of a YAML document. Returns how many were
    /// added.
    ///
    /// The document is compiled as a whole; if any endpoint fails, none of
    /// them is registered.
    pub fn load_yaml(&mut self, content: &str, policies: &PolicyRegistry) -> Result<usize> {
        let file: EndpointFile = serde_yaml::from_str(content)?;

        let mut staged: BTreeMap<String, Arc<EndpointPolicy>> = BTreeMap::new();
        for definition in &file.endpoints {
            if self.endpoints.contains_key(&definition.id) || staged.contains_key(&definition.id)
            {
                return Err(EndpointConfigError::DuplicateEndpoint(definition.id.clone()));
            }
            let endpoint = policies.compile(definition)?;
            staged.insert(definition.id.clone(), Arc::new(endpoint));
        }

        let count = staged.len();
        for (id, endpoint) in staged {
            info!(
                "Registered endpoint '{}' with {} policies",
                id,
                endpoint.policies().len()
            );
            self.endpoints.insert(id, endpoint);
        }
        Ok(count)
    }

    pub fn load_file(&mut self, path: &Path, policies: &PolicyRegistry) -> Result<usize> {
        debug!("Loading endpoint policies from: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let count = self.load_yaml(&content, policies)?;
        info!("Loaded {} endpoints from {:?}", count, path);
        Ok(count)
    }

    pub fn from_yaml(content: &str, policies: &PolicyRegistry) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_yaml(content, policies)?;
        Ok(registry)
    }

    pub fn from_file(path: &Path, policies: &PolicyRegistry) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_file(path, policies)?;
        Ok(registry)
    }

    /// Loads every `endpoints*.yaml` / `endpoints*.yml` file in `dir`, in
    /// file-name order. The first broken file aborts the load.
    pub fn load_directory(dir: &Path, policies: &PolicyRegistry) -> Result<Self> {
        info!("Loading endpoint policies from directory: {:?}", dir);

        if !dir.is_dir() {
            return Err(EndpointConfigError::Validation(format!(
                "Endpoint directory does not exist: {:?}",
                dir
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            let is_endpoints = path
                .file_stem()
                .map(|stem| stem.to_string_lossy())
                .is_some_and(|stem| stem == "endpoints" || stem.starts_with("endpoints."));

            if is_yaml && is_endpoints {
                paths.push(path);
            } else {
                debug!("Skipping non-endpoint file: {:?}", path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in &paths {
            registry.load_file(path, policies)?;
        }

        info!(
            "Loaded {} endpoints from {} files in {:?}",
            registry.len(),
            paths.len(),
            dir
        );
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<EndpointPolicy>> {
        self.endpoints.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
