//! CloudFormation Provider implementation
//!
//! Deploys a synthesized template as a single CloudFormation stack and polls
//! the stack until it reaches a terminal status.

use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudformation::Client as CloudFormationClient;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, TemplateStage};
use learnings_core::provider::{BoxFuture, DeployedStack, Provider, ProviderError, ProviderResult};

/// Largest template accepted inline by CreateStack/UpdateStack
pub const MAX_TEMPLATE_BODY_BYTES: usize = 51_200;

const MAX_ATTEMPTS: u32 = 120;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

const NO_UPDATES: &str = "No updates are to be performed";
const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// Coarse classification of a CloudFormation stack status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Succeeded,
    Failed,
}

/// Classify a stack status string such as `UPDATE_ROLLBACK_COMPLETE`
pub fn classify_status(status: &str) -> StackPhase {
    if status.ends_with("_IN_PROGRESS") {
        return StackPhase::InProgress;
    }
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "DELETE_COMPLETE" | "IMPORT_COMPLETE" => {
            StackPhase::Succeeded
        }
        _ => StackPhase::Failed,
    }
}

/// Whether a stack in this status must be deleted before it can be deployed again
pub fn requires_recreate(status: &str) -> bool {
    matches!(status, "ROLLBACK_COMPLETE" | "ROLLBACK_FAILED" | "CREATE_FAILED")
}

fn is_missing_stack(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.contains("does not exist"))
}

fn is_no_update(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.contains(NO_UPDATES))
}

/// Collect the failure reasons of the most recent operation
///
/// Events arrive newest first as `(logical id, resource type, status, reason)`;
/// collection stops at the event that started the operation.
pub fn failure_reasons<'a>(
    events: impl IntoIterator<Item = (&'a str, &'a str, &'a str, Option<&'a str>)>,
) -> Vec<String> {
    let mut reasons = Vec::new();
    for (logical_id, resource_type, status, reason) in events {
        if resource_type == STACK_RESOURCE_TYPE
            && (status == "CREATE_IN_PROGRESS"
                || status == "UPDATE_IN_PROGRESS"
                || status == "DELETE_IN_PROGRESS")
            && reason.is_some_and(|r| r.starts_with("User Initiated"))
        {
            break;
        }
        if status.ends_with("_FAILED") {
            reasons.push(format!(
                "{} {}: {}",
                logical_id,
                status,
                reason.unwrap_or("no reason given")
            ));
        }
    }
    reasons.reverse();
    reasons
}

/// AWS CloudFormation Provider
pub struct CloudFormationProvider {
    client: CloudFormationClient,
}

impl CloudFormationProvider {
    /// Create a provider for the given region, or the ambient region when `None`
    pub async fn new(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Self {
            client: CloudFormationClient::new(&config),
        }
    }

    async fn describe(&self, stack_name: &str) -> ProviderResult<Option<DeployedStack>> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if is_missing_stack(e.message()) => return Ok(None),
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "Failed to describe stack: {}",
                    DisplayErrorContext(&e)
                ))
                .for_stack(stack_name));
            }
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };
        let status = stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();

        let mut deployed = DeployedStack::new(stack_name, status);
        for output in stack.outputs() {
            if let (Some(key), Some(value)) = (output.output_key(), output.output_value()) {
                deployed = deployed.with_output(key, value);
            }
        }
        Ok(Some(deployed))
    }

    async fn template(&self, stack_name: &str) -> ProviderResult<Option<serde_json::Value>> {
        let output = self
            .client
            .get_template()
            .stack_name(stack_name)
            .template_stage(TemplateStage::Original)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to get template: {}", DisplayErrorContext(&e)))
                    .for_stack(stack_name)
            })?;

        output
            .template_body()
            .map(|body| {
                serde_json::from_str(body).map_err(|e| {
                    ProviderError::new("Deployed template is not JSON")
                        .for_stack(stack_name)
                        .with_cause(e)
                })
            })
            .transpose()
    }

    /// Read the failure reasons of the last operation on the stack
    async fn failures(&self, stack_name: &str) -> Vec<String> {
        let result = self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await;

        match result {
            Ok(output) => failure_reasons(output.stack_events().iter().map(|event| {
                (
                    event.logical_resource_id().unwrap_or_default(),
                    event.resource_type().unwrap_or_default(),
                    event.resource_status().map(|s| s.as_str()).unwrap_or_default(),
                    event.resource_status_reason(),
                )
            })),
            Err(e) => {
                log::warn!(
                    "could not read events of stack {}: {}",
                    stack_name,
                    DisplayErrorContext(&e)
                );
                Vec::new()
            }
        }
    }

    /// Wait for the stack to leave its in-progress status
    ///
    /// A stack that no longer exists is reported as `None`.
    async fn wait_for_stack(&self, stack_name: &str) -> ProviderResult<Option<DeployedStack>> {
        for _ in 0..MAX_ATTEMPTS {
            let Some(stack) = self.describe(stack_name).await? else {
                return Ok(None);
            };

            match classify_status(&stack.status) {
                StackPhase::InProgress => {
                    log::debug!("stack {} is {}", stack_name, stack.status);
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                StackPhase::Succeeded => return Ok(Some(stack)),
                StackPhase::Failed => {
                    let reasons = self.failures(stack_name).await;
                    let mut message = format!("Stack ended in {}", stack.status);
                    for reason in reasons {
                        message.push_str("\n  ");
                        message.push_str(&reason);
                    }
                    return Err(ProviderError::new(message).for_stack(stack_name));
                }
            }
        }

        Err(ProviderError::new("Operation timed out").for_stack(stack_name))
    }

    async fn create_stack(&self, stack_name: &str, body: String) -> ProviderResult<()> {
        log::info!("creating stack {}", stack_name);
        self.client
            .create_stack()
            .stack_name(stack_name)
            .template_body(body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create stack: {}", DisplayErrorContext(&e)))
                    .for_stack(stack_name)
            })?;
        Ok(())
    }

    /// Update the stack, returning `false` when CloudFormation reports nothing to do
    async fn update_stack(&self, stack_name: &str, body: String) -> ProviderResult<bool> {
        log::info!("updating stack {}", stack_name);
        let result = self
            .client
            .update_stack()
            .stack_name(stack_name)
            .template_body(body)
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_no_update(e.message()) => Ok(false),
            Err(e) => Err(ProviderError::new(format!(
                "Failed to update stack: {}",
                DisplayErrorContext(&e)
            ))
            .for_stack(stack_name)),
        }
    }

    async fn deploy_stack(
        &self,
        stack_name: &str,
        template: &serde_json::Value,
    ) -> ProviderResult<DeployedStack> {
        let body = serde_json::to_string(template).map_err(|e| {
            ProviderError::new("Failed to serialize template")
                .for_stack(stack_name)
                .with_cause(e)
        })?;
        if body.len() > MAX_TEMPLATE_BODY_BYTES {
            return Err(ProviderError::new(format!(
                "Template is {} bytes; inline templates are limited to {} bytes",
                body.len(),
                MAX_TEMPLATE_BODY_BYTES
            ))
            .for_stack(stack_name));
        }

        match self.describe(stack_name).await? {
            None => self.create_stack(stack_name, body).await?,
            Some(existing) if requires_recreate(&existing.status) => {
                return Err(ProviderError::new(format!(
                    "Stack is in {} and cannot be updated; destroy it first",
                    existing.status
                ))
                .for_stack(stack_name));
            }
            Some(existing) if classify_status(&existing.status) == StackPhase::InProgress => {
                return Err(ProviderError::new(format!(
                    "Stack is busy ({})",
                    existing.status
                ))
                .for_stack(stack_name));
            }
            Some(existing) => {
                if !self.update_stack(stack_name, body).await? {
                    log::info!("stack {} is already up to date", stack_name);
                    return Ok(existing.with_template(template.clone()));
                }
            }
        }

        let deployed = self.wait_for_stack(stack_name).await?.ok_or_else(|| {
            ProviderError::new("Stack disappeared while deploying").for_stack(stack_name)
        })?;
        Ok(deployed.with_template(template.clone()))
    }

    async fn delete_stack(&self, stack_name: &str) -> ProviderResult<()> {
        if self.describe(stack_name).await?.is_none() {
            return Err(ProviderError::new("Stack does not exist").for_stack(stack_name));
        }

        log::info!("deleting stack {}", stack_name);
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete stack: {}", DisplayErrorContext(&e)))
                    .for_stack(stack_name)
            })?;

        self.wait_for_stack(stack_name).await?;
        Ok(())
    }
}

impl Provider for CloudFormationProvider {
    fn name(&self) -> &'static str {
        "cloudformation"
    }

    fn read(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<Option<DeployedStack>>> {
        let stack_name = stack_name.to_string();
        Box::pin(async move {
            let Some(stack) = self.describe(&stack_name).await? else {
                return Ok(None);
            };
            match self.template(&stack_name).await? {
                Some(template) => Ok(Some(stack.with_template(template))),
                None => Ok(Some(stack)),
            }
        })
    }

    fn deploy(
        &self,
        stack_name: &str,
        template: &serde_json::Value,
    ) -> BoxFuture<'_, ProviderResult<DeployedStack>> {
        let stack_name = stack_name.to_string();
        let template = template.clone();
        Box::pin(async move { self.deploy_stack(&stack_name, &template).await })
    }

    fn destroy(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let stack_name = stack_name.to_string();
        Box::pin(async move { self.delete_stack(&stack_name).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_in_progress_statuses() {
        for status in [
            "CREATE_IN_PROGRESS",
            "UPDATE_IN_PROGRESS",
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "DELETE_IN_PROGRESS",
        ] {
            assert_eq!(classify_status(status), StackPhase::InProgress, "{}", status);
        }
    }

    #[test]
    fn classify_terminal_statuses() {
        assert_eq!(classify_status("CREATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("UPDATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("DELETE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify_status("UPDATE_ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify_status("DELETE_FAILED"), StackPhase::Failed);
    }

    #[test]
    fn rolled_back_creation_must_be_recreated() {
        assert!(requires_recreate("ROLLBACK_COMPLETE"));
        assert!(!requires_recreate("UPDATE_ROLLBACK_COMPLETE"));
        assert!(!requires_recreate("CREATE_COMPLETE"));
    }

    #[test]
    fn error_messages_are_recognized() {
        assert!(is_missing_stack(Some("Stack with id CdkStack does not exist")));
        assert!(!is_missing_stack(Some("Access denied")));
        assert!(!is_missing_stack(None));
        assert!(is_no_update(Some("No updates are to be performed.")));
        assert!(!is_no_update(None));
    }

    #[test]
    fn failure_reasons_stop_at_operation_start() {
        let events = vec![
            ("CdkStack", STACK_RESOURCE_TYPE, "ROLLBACK_COMPLETE", None),
            ("Service", "AWS::ECS::Service", "CREATE_FAILED", Some("Resource creation cancelled")),
            ("Messages", "AWS::DynamoDB::Table", "CREATE_FAILED", Some("Table already exists")),
            ("CdkStack", STACK_RESOURCE_TYPE, "CREATE_IN_PROGRESS", Some("User Initiated")),
            ("Old", "AWS::S3::Bucket", "DELETE_FAILED", Some("Bucket not empty")),
        ];

        let reasons = failure_reasons(events);
        assert_eq!(
            reasons,
            vec![
                "Messages CREATE_FAILED: Table already exists".to_string(),
                "Service CREATE_FAILED: Resource creation cancelled".to_string(),
            ]
        );
    }

    #[test]
    fn synthesized_stacks_fit_inline_limit() {
        use crate::config::{PipelineConfig, StackConfig};
        use learnings_core::template;

        let config = StackConfig::with_pipeline(PipelineConfig {
            owner: "octocat".to_string(),
            repo: "my-angular-learnings".to_string(),
            branch: "master".to_string(),
            token_secret_name: "github-token".to_string(),
        });
        let stack = crate::build_stack(&config).unwrap();
        let body = serde_json::to_string(&template::synthesize(&stack)).unwrap();
        assert!(body.len() < MAX_TEMPLATE_BODY_BYTES);
    }
}
