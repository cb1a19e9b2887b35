//! Module framework error types

use thiserror::Error;

use cumulo_cloud::CloudError;

/// Error that can occur in the entity/mapper/module framework.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Relational store error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cloud provider error.
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Record serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Named module is not registered.
    #[error("module not found: {name}{}", suggestion.as_ref().map(|s| format!(". Did you mean: {s}")).unwrap_or_default())]
    ModuleNotFound {
        name: String,
        suggestion: Option<String>,
    },

    /// A module was registered twice.
    #[error("module already registered: {name}")]
    DuplicateModule { name: String },

    /// A declared dependency is not registered.
    #[error("module {module} depends on unregistered module {dependency}")]
    MissingDependency { module: String, dependency: String },

    /// The declared dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// A module cannot be removed while others depend on it.
    #[error("cannot uninstall {module}: still required by {}", dependents.join(", "))]
    StillDependedOn {
        module: String,
        dependents: Vec<String>,
    },

    /// Identity fields did not match the declared key shape.
    #[error("id generation error. Valid fields are: {expected}. Receiving: {received}")]
    IdGeneration { expected: String, received: String },

    /// A record payload did not match its entity kind.
    #[error("invalid record for {kind}: {message}")]
    InvalidRecord { kind: String, message: String },
}

impl ModuleError {
    /// Create an invalid record error.
    pub fn invalid_record(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::InvalidRecord {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Result type for module framework operations.
pub type ModuleResult<T> = Result<T, ModuleError>;
