use crate::types::NamespaceName;

/// The reason string carried by [`Error::NamespaceUnknown`], per §4.4: callers
/// may match on it to treat this uniformly with a genuine origin not-found.
pub const NAMESPACE_UNKNOWN_REASON: &str = "namespace not included in informer cache";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cache is read-only")]
    ReadOnly,
    #[error("{resource} \"{name}\" not found: {reason} (namespace=`{namespace}`, group=`{group}`)")]
    NamespaceUnknown {
        group: String,
        resource: String,
        name: String,
        namespace: NamespaceName,
        reason: &'static str,
    },
    #[error("{resource} \"{name}\" not found (group=`{group}`)")]
    NotFound {
        group: String,
        resource: String,
        name: String,
    },
    #[error("failed to convert object: {0}")]
    ConversionFailure(#[from] serde_json::Error),
    #[error("operation `{0}` has no cross-namespace meaning")]
    Unsupported(&'static str),
    #[error("child informer for namespace `{namespace}` failed: {source}")]
    ChildError {
        namespace: NamespaceName,
        #[source]
        source: anyhow::Error,
    },
    #[error("informer was stopped")]
    Stopped,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Builds the distinguished "namespace not included in informer cache"
    /// not-found used by [`crate::lister::NilNamespaceLister`] (§4.4, S4).
    pub fn namespace_unknown(group: impl Into<String>, resource: impl Into<String>, name: impl Into<String>, namespace: NamespaceName) -> Self {
        Error::NamespaceUnknown {
            group: group.into(),
            resource: resource.into(),
            name: name.into(),
            namespace,
            reason: NAMESPACE_UNKNOWN_REASON,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
