//! Interpreter - Execute a Plan using a Provider
//!
//! CloudFormation applies a whole template at once, so the Interpreter turns
//! a non-empty Plan into a single deployment. This is where side effects
//! actually occur.

use crate::plan::Plan;
use crate::provider::{DeployedStack, Provider, ProviderError, ProviderResult};
use crate::stack::Stack;
use crate::template;

/// Result of applying a Plan or destroying a stack
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The Plan was empty; nothing was sent to the provider
    NoChanges,
    /// Deployment succeeded
    Deployed { stack: DeployedStack },
    /// Stack was deleted
    Destroyed,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// Plan only; never call the provider
    pub dry_run: bool,
    /// Allow plans that replace or delete resources
    pub allow_destructive: bool,
}

/// Interpreter that executes Plans using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Deploy the stack if the Plan contains any change
    pub async fn apply(&self, stack: &Stack, plan: &Plan) -> ProviderResult<ApplyOutcome> {
        if plan.is_empty() {
            return Ok(ApplyOutcome::NoChanges);
        }

        if plan.has_destructive_changes() && !self.config.allow_destructive {
            let summary = plan.summary();
            return Err(ProviderError::new(format!(
                "plan replaces {} and deletes {} resources; destructive changes are not allowed",
                summary.replace, summary.delete
            ))
            .for_stack(&stack.name));
        }

        if self.config.dry_run {
            return Ok(ApplyOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        log::info!(
            "deploying stack {} via {} ({})",
            stack.name,
            self.provider.name(),
            plan.summary()
        );
        let body = template::synthesize(stack);
        let deployed = self.provider.deploy(&stack.name, &body).await?;
        Ok(ApplyOutcome::Deployed { stack: deployed })
    }

    /// Delete the stack
    pub async fn destroy(&self, stack_name: &str) -> ProviderResult<ApplyOutcome> {
        if self.config.dry_run {
            return Ok(ApplyOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        log::info!("destroying stack {} via {}", stack_name, self.provider.name());
        self.provider.destroy(stack_name).await?;
        Ok(ApplyOutcome::Destroyed)
    }
}
