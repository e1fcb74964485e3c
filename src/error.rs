//! Error taxonomy shared by the assembly, dispatch and scheduling paths.

use std::fmt;

/// The kinds of resource whose absence the scheduler knows how to heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Guild,
    Channel,
    PersonaFacts,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Guild => write!(f, "guild"),
            ResourceKind::Channel => write!(f, "channel"),
            ResourceKind::PersonaFacts => write!(f, "persona facts"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A guild, channel or guild fact list could not be resolved.
    #[error("{kind} {id} was not found")]
    NotFound { kind: ResourceKind, id: u64 },

    /// The completion API or the chat platform answered with something unusable.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    pub fn not_found(kind: ResourceKind, id: u64) -> Self {
        RelayError::NotFound { kind, id }
    }

    /// Returns the resource kind when this is a `NotFound` failure.
    pub fn missing_resource(&self) -> Option<ResourceKind> {
        match self {
            RelayError::NotFound { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
