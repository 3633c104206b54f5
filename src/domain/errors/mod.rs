// Domain errors - Error types shared by the domain layer and every port

use std::fmt;

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid arguments provided
    BadArgs(String),
    /// Record or virtual file not found
    NotFound(String),
    /// Transcoding engine could not be loaded
    EngineLoad(String),
    /// Engine handle was used after termination
    EngineTerminated,
    /// Virtual file system operation failed
    FileSystem(String),
    /// Engine command could not be run
    Execution(String),
    /// Metadata could not be read from a source
    ProbeFail(String),
    /// A job was asked to make a transition its current status forbids
    InvalidTransition(String),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::BadArgs(msg) => write!(f, "Bad arguments: {}", msg),
            DomainError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DomainError::EngineLoad(msg) => write!(f, "Engine failed to load: {}", msg),
            DomainError::EngineTerminated => write!(f, "Engine has been terminated"),
            DomainError::FileSystem(msg) => write!(f, "Virtual file system error: {}", msg),
            DomainError::Execution(msg) => write!(f, "Execution failed: {}", msg),
            DomainError::ProbeFail(msg) => write!(f, "Probe failed: {}", msg),
            DomainError::InvalidTransition(msg) => write!(f, "Invalid transition: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
