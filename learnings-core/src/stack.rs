//! Stack - The declared resource graph of one deployment unit

use std::collections::HashMap;

use thiserror::Error;

use crate::graph::DependencyGraph;
use crate::resource::{Resource, ResourceId, Value};
use crate::schema::{ResourceSchema, TypeError};

/// Errors found while declaring or validating a stack
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StackError {
    #[error("Logical id '{0}' is declared more than once")]
    DuplicateLogicalId(String),

    #[error("Output '{0}' is declared more than once")]
    DuplicateOutput(String),

    #[error("{resource}: unknown resource type '{resource_type}'")]
    UnknownResourceType {
        resource: String,
        resource_type: String,
    },

    #[error("{resource}: {message}")]
    InvalidAttribute { resource: String, message: String },

    #[error("{from}: reference to undeclared resource '{target}'")]
    DanglingReference { from: String, target: String },

    #[error("{from}: '{resource_type}' has no attribute '{attribute}' for Fn::GetAtt on '{target}'")]
    UnknownReturnValue {
        from: String,
        target: String,
        resource_type: String,
        attribute: String,
    },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

impl StackError {
    fn invalid(id: &ResourceId, error: TypeError) -> Self {
        StackError::InvalidAttribute {
            resource: id.name.clone(),
            message: error.to_string(),
        }
    }
}

/// A stack output
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Ordered collection of resources and outputs
#[derive(Debug, Clone, Default)]
pub struct Stack {
    pub name: String,
    pub description: Option<String>,
    resources: Vec<Resource>,
    outputs: Vec<Output>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Declare a resource, returning its logical id
    pub fn add(&mut self, resource: Resource) -> Result<String, StackError> {
        let logical_id = resource.logical_id().to_string();
        if self.find(&logical_id).is_some() {
            return Err(StackError::DuplicateLogicalId(logical_id));
        }
        log::debug!(
            "declared {} {}",
            resource.id.resource_type,
            resource.id.name
        );
        self.resources.push(resource);
        Ok(logical_id)
    }

    pub fn add_output(&mut self, output: Output) -> Result<(), StackError> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(StackError::DuplicateOutput(output.name));
        }
        self.outputs.push(output);
        Ok(())
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn find(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id() == logical_id)
    }

    pub fn find_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.resources
            .iter_mut()
            .find(|r| r.logical_id() == logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.id.resource_type == resource_type)
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_resources(&self.resources)
    }

    /// Validate the whole stack, collecting every problem found
    pub fn validate(&self, schemas: &HashMap<String, ResourceSchema>) -> Result<(), Vec<StackError>> {
        let mut errors = Vec::new();

        for resource in &self.resources {
            let from = resource.logical_id();
            match schemas.get(&resource.id.resource_type) {
                Some(schema) => {
                    if let Err(type_errors) = schema.validate(&resource.attributes) {
                        errors.extend(
                            type_errors
                                .into_iter()
                                .map(|e| StackError::invalid(&resource.id, e)),
                        );
                    }
                }
                None => errors.push(StackError::UnknownResourceType {
                    resource: from.to_string(),
                    resource_type: resource.id.resource_type.clone(),
                }),
            }

            for value in resource.attributes.values() {
                self.check_references(from, value, schemas, &mut errors);
            }
            for target in &resource.depends_on {
                if self.find(target).is_none() {
                    errors.push(StackError::DanglingReference {
                        from: from.to_string(),
                        target: target.clone(),
                    });
                }
            }
        }

        for output in &self.outputs {
            self.check_references(&output.name, &output.value, schemas, &mut errors);
        }

        if let Some(cycle) = self.dependency_graph().find_cycle() {
            errors.push(StackError::Cycle(cycle));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_references(
        &self,
        from: &str,
        value: &Value,
        schemas: &HashMap<String, ResourceSchema>,
        errors: &mut Vec<StackError>,
    ) {
        match value {
            Value::Ref(target) => {
                if self.find(target).is_none() {
                    errors.push(StackError::DanglingReference {
                        from: from.to_string(),
                        target: target.clone(),
                    });
                }
            }
            Value::GetAtt(target, attribute) => match self.find(target) {
                None => errors.push(StackError::DanglingReference {
                    from: from.to_string(),
                    target: target.clone(),
                }),
                Some(resource) => {
                    if let Some(schema) = schemas.get(&resource.id.resource_type)
                        && !schema.has_return_value(attribute)
                    {
                        errors.push(StackError::UnknownReturnValue {
                            from: from.to_string(),
                            target: target.clone(),
                            resource_type: resource.id.resource_type.clone(),
                            attribute: attribute.clone(),
                        });
                    }
                }
            },
            Value::List(items) => {
                for item in items {
                    self.check_references(from, item, schemas, errors);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    self.check_references(from, v, schemas, errors);
                }
            }
            Value::Join { parts, .. } => {
                for part in parts {
                    self.check_references(from, part, schemas, errors);
                }
            }
            Value::Select { list, .. } => self.check_references(from, list, schemas, errors),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType};

    fn schemas() -> HashMap<String, ResourceSchema> {
        let table = ResourceSchema::new("AWS::DynamoDB::Table")
            .attribute(AttributeSchema::new("BillingMode", AttributeType::String))
            .returns("Arn");
        let policy = ResourceSchema::new("AWS::IAM::Policy")
            .attribute(AttributeSchema::new("PolicyDocument", AttributeType::Any).required());
        [table, policy]
            .into_iter()
            .map(|s| (s.resource_type.clone(), s))
            .collect()
    }

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let mut stack = Stack::new("Test");
        stack
            .add(Resource::new("AWS::DynamoDB::Table", "Messages"))
            .unwrap();
        let err = stack
            .add(Resource::new("AWS::DynamoDB::Table", "Messages"))
            .unwrap_err();
        assert_eq!(err, StackError::DuplicateLogicalId("Messages".to_string()));
    }

    #[test]
    fn duplicate_output_is_rejected() {
        let mut stack = Stack::new("Test");
        stack
            .add_output(Output::new("TableName", Value::ref_to("Messages")))
            .unwrap();
        assert!(
            stack
                .add_output(Output::new("TableName", Value::ref_to("Messages")))
                .is_err()
        );
    }

    #[test]
    fn valid_stack_passes() {
        let mut stack = Stack::new("Test");
        stack
            .add(Resource::new("AWS::DynamoDB::Table", "Messages"))
            .unwrap();
        stack
            .add(Resource::new("AWS::IAM::Policy", "TaskPolicy").with_attribute(
                "PolicyDocument",
                Value::map([("Resource", Value::get_att("Messages", "Arn"))]),
            ))
            .unwrap();
        stack
            .add_output(Output::new("TableName", Value::ref_to("Messages")))
            .unwrap();

        assert!(stack.validate(&schemas()).is_ok());
    }

    #[test]
    fn dangling_and_unknown_attributes_are_reported_together() {
        let mut stack = Stack::new("Test");
        stack
            .add(Resource::new("AWS::DynamoDB::Table", "Messages"))
            .unwrap();
        stack
            .add(Resource::new("AWS::IAM::Policy", "TaskPolicy").with_attribute(
                "PolicyDocument",
                Value::List(vec![
                    Value::get_att("Messages", "StreamArn"),
                    Value::ref_to("Missing"),
                ]),
            ))
            .unwrap();
        stack
            .add(Resource::new("AWS::Unknown::Thing", "Thing"))
            .unwrap();

        let errors = stack.validate(&schemas()).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| matches!(e, StackError::UnknownReturnValue { .. })));
        assert!(errors.iter().any(|e| matches!(e, StackError::DanglingReference { .. })));
        assert!(errors.iter().any(|e| matches!(e, StackError::UnknownResourceType { .. })));
    }

    #[test]
    fn cycles_are_reported() {
        let mut stack = Stack::new("Test");
        stack
            .add(
                Resource::new("AWS::IAM::Policy", "A")
                    .with_attribute("PolicyDocument", Value::ref_to("B")),
            )
            .unwrap();
        stack
            .add(
                Resource::new("AWS::IAM::Policy", "B")
                    .with_attribute("PolicyDocument", Value::ref_to("A")),
            )
            .unwrap();

        let errors = stack.validate(&schemas()).unwrap_err();
        assert!(matches!(errors.as_slice(), [StackError::Cycle(_)]));
    }

    #[test]
    fn resources_of_type_filters() {
        let mut stack = Stack::new("Test");
        stack
            .add(Resource::new("AWS::DynamoDB::Table", "A"))
            .unwrap();
        stack.add(Resource::new("AWS::IAM::Policy", "B")).unwrap();
        assert_eq!(stack.resources_of_type("AWS::DynamoDB::Table").count(), 1);
    }
}
