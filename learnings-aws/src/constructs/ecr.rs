//! ECR repository construct

use learnings_core::resource::{RemovalPolicy, Resource, Value};
use learnings_core::stack::Stack;

use super::child;
use crate::error::BuildError;

pub const REPOSITORY_TYPE: &str = "AWS::ECR::Repository";

/// A declared repository
///
/// Repositories are retained when the stack is deleted, since they may
/// still hold pushed images.
#[derive(Debug, Clone)]
pub struct Repository {
    logical_id: String,
}

impl Repository {
    pub fn new(stack: &mut Stack, id: &str, repository_name: &str) -> Result<Self, BuildError> {
        let resource = Resource::at_path(REPOSITORY_TYPE, child(id, "Resource"))
            .with_attribute("RepositoryName", repository_name)
            .with_removal_policy(RemovalPolicy::Retain);
        let logical_id = stack.add(resource)?;
        Ok(Self { logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn repository_uri(&self) -> Value {
        Value::get_att(&self.logical_id, "RepositoryUri")
    }

    pub fn repository_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }
}
