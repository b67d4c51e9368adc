//! Provider - Trait abstracting deployment operations
//!
//! A Provider turns a synthesized template into a deployed stack on some
//! infrastructure (CloudFormation for AWS). Everything upstream of it is pure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::resource::ResourceId;

/// Failure of a deployment operation
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub stack_name: Option<String>,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.stack_name, &self.resource_id) {
            (Some(stack), Some(id)) => write!(f, "[{}/{}] {}", stack, id.name, self.message),
            (Some(stack), None) => write!(f, "[{}] {}", stack, self.message),
            (None, Some(id)) => write!(f, "[{}] {}", id.name, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_name: None,
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_stack(mut self, stack_name: impl Into<String>) -> Self {
        self.stack_name = Some(stack_name.into());
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed future returned by Provider methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stack as it currently exists on the provider side
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedStack {
    pub name: String,
    /// Provider status (e.g., "CREATE_COMPLETE")
    pub status: String,
    /// Template the stack was last deployed with
    pub template: Option<serde_json::Value>,
    /// Stack outputs by name
    pub outputs: HashMap<String, String>,
}

impl DeployedStack {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            template: None,
            outputs: HashMap::new(),
        }
    }

    pub fn with_template(mut self, template: serde_json::Value) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

/// Main Provider trait
///
/// Every method talks to the cloud; everything upstream of a Provider is pure.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "cloudformation")
    fn name(&self) -> &'static str;

    /// Get the deployed stack, or `None` if it does not exist
    fn read(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<Option<DeployedStack>>>;

    /// Create or update the stack so that it matches the template
    ///
    /// Returns once the stack has reached a terminal status.
    fn deploy(
        &self,
        stack_name: &str,
        template: &serde_json::Value,
    ) -> BoxFuture<'_, ProviderResult<DeployedStack>>;

    /// Delete the stack and every resource without a retain policy
    fn destroy(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Lets the CLI pick a provider at runtime
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn read(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<Option<DeployedStack>>> {
        (**self).read(stack_name)
    }

    fn deploy(
        &self,
        stack_name: &str,
        template: &serde_json::Value,
    ) -> BoxFuture<'_, ProviderResult<DeployedStack>> {
        (**self).deploy(stack_name, template)
    }

    fn destroy(&self, stack_name: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).destroy(stack_name)
    }
}
