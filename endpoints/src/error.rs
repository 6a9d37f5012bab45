use access_policy::AuthzError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EndpointConfigError>;

/// Everything that can go wrong while registering endpoints.
///
/// None of these can happen once an endpoint is registered; request-time
/// failures are [`AuthzError`]s from the core.
#[derive(Error, Debug)]
pub enum EndpointConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown policy '{policy}' on endpoint '{endpoint}'")]
    UnknownPolicy { endpoint: String, policy: String },

    #[error("Duplicate endpoint: {0}")]
    DuplicateEndpoint(String),

    #[error("Endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: AuthzError,
    },
}

impl EndpointConfigError {
    pub(crate) fn endpoint(endpoint: &str, source: AuthzError) -> Self {
        EndpointConfigError::Endpoint {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
