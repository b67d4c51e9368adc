//! IAM constructs: policy statements, roles and their inline policies

use learnings_core::resource::{PseudoParam, Resource, Value};
use learnings_core::stack::Stack;

use super::child;
use crate::error::BuildError;

pub const ROLE_TYPE: &str = "AWS::IAM::Role";
pub const POLICY_TYPE: &str = "AWS::IAM::Policy";
pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyEffect {
    Allow,
    Deny,
}

impl PolicyEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyEffect::Allow => "Allow",
            PolicyEffect::Deny => "Deny",
        }
    }
}

/// One statement of a policy document
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: PolicyEffect,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            effect: PolicyEffect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
            condition: None,
        }
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<Value>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn on_all_resources(self) -> Self {
        self.with_resource("*")
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("Effect", Value::string(self.effect.as_str())),
            ("Action", Value::strings(self.actions.iter().cloned())),
            ("Resource", Value::List(self.resources.clone())),
        ];
        if let Some(condition) = &self.condition {
            entries.push(("Condition", condition.clone()));
        }
        Value::map(entries)
    }
}

pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    Value::map([
        ("Version", Value::string(POLICY_VERSION)),
        (
            "Statement",
            Value::List(statements.iter().map(PolicyStatement::to_value).collect()),
        ),
    ])
}

/// Trust policy letting an AWS service assume a role
pub fn assume_role_document(service: &str) -> Value {
    Value::map([
        ("Version", Value::string(POLICY_VERSION)),
        (
            "Statement",
            Value::List(vec![Value::map([
                ("Action", Value::string("sts:AssumeRole")),
                ("Effect", Value::string("Allow")),
                (
                    "Principal",
                    Value::map([("Service", Value::string(service))]),
                ),
            ])]),
        ),
    ])
}

/// `arn:<partition>:<service>:<region>:<account>:<resource>` for this stack's region and account
pub fn stack_arn(service: &str, resource: Vec<Value>) -> Value {
    let mut parts = vec![
        Value::string("arn:"),
        Value::Pseudo(PseudoParam::Partition),
        Value::string(format!(":{}:", service)),
        Value::Pseudo(PseudoParam::Region),
        Value::string(":"),
        Value::Pseudo(PseudoParam::AccountId),
        Value::string(":"),
    ];
    parts.extend(resource);
    Value::join("", parts)
}

/// A declared role
#[derive(Debug, Clone)]
pub struct Role {
    path: String,
    logical_id: String,
}

impl Role {
    /// Declare a role assumable by `service` (e.g. `ecs-tasks.amazonaws.com`)
    pub fn new(stack: &mut Stack, path: &str, service: &str) -> Result<Self, BuildError> {
        let resource = Resource::at_path(ROLE_TYPE, child(path, "Resource"))
            .with_attribute("AssumeRolePolicyDocument", assume_role_document(service));
        let logical_id = stack.add(resource)?;
        Ok(Self {
            path: path.to_string(),
            logical_id,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// Attach the statements as the role's default inline policy
    ///
    /// Returns the policy's logical id, or `None` when there is nothing to attach.
    pub fn attach_policy(
        &self,
        stack: &mut Stack,
        statements: &[PolicyStatement],
    ) -> Result<Option<String>, BuildError> {
        if statements.is_empty() {
            return Ok(None);
        }
        let path = child(&child(&self.path, "DefaultPolicy"), "Resource");
        let name = learnings_core::resource::logical_id(&path);
        let resource = Resource::at_path(POLICY_TYPE, path)
            .with_attribute("PolicyName", name)
            .with_attribute("PolicyDocument", policy_document(statements))
            .with_attribute("Roles", Value::List(vec![Value::ref_to(&self.logical_id)]));
        Ok(Some(stack.add(resource)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_renders_lists() {
        let statement = PolicyStatement::allow()
            .with_actions(&["dynamodb:*"])
            .with_resource(Value::get_att("Messages", "Arn"));
        let value = statement.to_value();

        assert_eq!(value.get("Effect"), Some(&Value::string("Allow")));
        assert_eq!(value.get("Action"), Some(&Value::strings(["dynamodb:*"])));
        assert_eq!(
            value.get("Resource"),
            Some(&Value::List(vec![Value::get_att("Messages", "Arn")]))
        );
        assert!(value.get("Condition").is_none());
    }

    #[test]
    fn role_policy_is_named_after_its_path() {
        let mut stack = Stack::new("Test");
        let role = Role::new(&mut stack, "Task/TaskRole", "ecs-tasks.amazonaws.com").unwrap();
        let policy = role
            .attach_policy(
                &mut stack,
                &[PolicyStatement::allow()
                    .with_actions(&["logs:PutLogEvents"])
                    .on_all_resources()],
            )
            .unwrap()
            .unwrap();

        assert_eq!(role.logical_id(), "TaskTaskRole");
        assert_eq!(policy, "TaskTaskRoleDefaultPolicy");
        let resource = stack.find(&policy).unwrap();
        assert_eq!(
            resource.attribute("PolicyName"),
            Some(&Value::string("TaskTaskRoleDefaultPolicy"))
        );
        assert_eq!(
            resource.attribute("Roles"),
            Some(&Value::List(vec![Value::ref_to("TaskTaskRole")]))
        );
    }

    #[test]
    fn empty_policy_is_not_declared() {
        let mut stack = Stack::new("Test");
        let role = Role::new(&mut stack, "Role", "codebuild.amazonaws.com").unwrap();
        assert_eq!(role.attach_policy(&mut stack, &[]).unwrap(), None);
        assert_eq!(stack.resources().len(), 1);
    }
}
