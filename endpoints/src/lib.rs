//! YAML-declared endpoint policies.
//!
//! Endpoint definitions name their policies and carry the maps those
//! policies read. Loading compiles every definition into an
//! [`access_policy::EndpointPolicy`], so unknown policy names, malformed
//! chain keys and bad permission templates surface at startup rather than on
//! the first request.
//!
//! ```yaml
//! endpoints:
//!   - id: chain_blog
//!     model: { app_label: app, model_name: blog }
//!     request_perms_map:
//!       GET: ["{app_label}.view_{model_name}"]
//!     action_perms_map:
//!       new_action: [forbidden_403]
//!     permissions_map:
//!       - key: GET
//!         policies: [request]
//!       - key: [update, partial_update]
//!         policies: [custom, action]
//!     policies: [chain]
//! ```

pub mod definition;
pub mod error;
pub mod registry;

pub use definition::{ChainEntry, EndpointDefinition, EndpointFile, KeySpec};
pub use error::{EndpointConfigError, Result};
pub use registry::{EndpointRegistry, PolicyFactory, PolicyRegistry, BUILTIN_POLICIES};
