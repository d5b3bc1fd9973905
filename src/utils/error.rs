/// Utility enum that covers all possible errors during reconciliation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// Error in user input or ClusterInstallation resource definition, typically missing fields.
    #[error("Invalid ClusterInstallation CRD: {0}")]
    UserInputError(String),

    /// A resource quantity string that does not follow the Kubernetes quantity grammar.
    #[error("Invalid quantity {0:?}")]
    InvalidQuantity(String),

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// Operator settings read from the environment could not be parsed.
    #[error("Invalid operator configuration: {0}")]
    ConfigError(String),
}
