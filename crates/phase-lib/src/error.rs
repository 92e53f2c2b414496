//! Error types for cluster queries and event parsing

/// Errors returned by a [`ClusterQuery`](crate::query::ClusterQuery) backend
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("cluster API request failed: {0}")]
    Api(String),

    #[error("malformed object from cluster API: {0}")]
    Malformed(#[from] ConversionError),
}

/// Result type for cluster queries
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Errors extracting a container name from an involved-object field path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("field path {0:?} has no '{{' delimiter")]
    MissingDelimiter(String),

    #[error("field path {0:?} names an empty container")]
    EmptyContainerName(String),
}

/// Errors converting Kubernetes API objects into agent models
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("{kind} is missing required field {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}
