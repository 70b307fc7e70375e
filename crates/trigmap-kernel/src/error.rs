//! Error taxonomy for trigger and map operations.

/// A dependency request that violates one of the graph rules. Always
/// carries the human-readable reason reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    #[error("Cannot update \"dependencies\" for a discovered trigger \"{description}\".")]
    DiscoveredTrigger { description: String },

    #[error("Cannot add dependency from a host to a template.")]
    HostToTemplate,

    #[error("Cannot create dependency on trigger itself.")]
    SelfDependency,

    #[error("Cannot create circular dependencies.")]
    Circular,

    /// A host linked to the trigger's template misses a dependency template.
    #[error("Not all templates are linked to \"{host}\".")]
    TemplatesNotLinked { host: String },

    #[error("Trigger cannot be dependent on a trigger that is inherited from it.")]
    InheritedFrom,

    #[error("Duplicate dependencies in trigger \"{description}\".")]
    Duplicate { description: String },
}

/// Configuration that is missing or malformed. Fatal to the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced at the request boundary.
///
/// Missing objects and objects the principal may not see are reported
/// identically through [`ApiError::NoPermission`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Incorrect arguments passed to function: {0}")]
    Parameters(String),

    #[error("No permissions to referred object or it does not exist!")]
    NoPermission,

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(String),
}

impl ApiError {
    pub fn empty_input() -> Self {
        ApiError::Parameters("Empty input parameter.".to_string())
    }

    /// Whether the caller can fix the request (as opposed to a store fault).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ApiError::Store(_) | ApiError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_messages_name_the_offender() {
        let err = ApiError::from(DependencyError::TemplatesNotLinked {
            host: "web01".to_string(),
        });
        assert_eq!(err.to_string(), "Not all templates are linked to \"web01\".");
        assert!(err.is_client_error());
    }

    #[test]
    fn missing_and_forbidden_share_one_message() {
        assert_eq!(
            ApiError::NoPermission.to_string(),
            "No permissions to referred object or it does not exist!"
        );
        assert!(!ApiError::Store("disk".to_string()).is_client_error());
    }
}
