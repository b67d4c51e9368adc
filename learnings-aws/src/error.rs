//! Errors raised while building the stack

use learnings_core::stack::StackError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("Cannot split {cidr} into {count} subnets: {reason}")]
    SubnetSplit {
        cidr: String,
        count: usize,
        reason: String,
    },

    #[error("Pipeline action '{action}' reads artifact '{artifact}' that no earlier stage produces")]
    UnknownArtifact { action: String, artifact: String },

    #[error("Construct '{0}' was not found in the stack")]
    MissingConstruct(String),

    #[error("Stack is invalid:\n{}", format_errors(.0))]
    Invalid(Vec<StackError>),
}

fn format_errors(errors: &[StackError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
