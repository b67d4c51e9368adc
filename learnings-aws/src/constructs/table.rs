//! DynamoDB table construct

use learnings_core::resource::{RemovalPolicy, Resource, Value};
use learnings_core::stack::Stack;

use super::child;
use crate::error::BuildError;

pub const TABLE_TYPE: &str = "AWS::DynamoDB::Table";

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Number,
    Binary,
}

impl AttributeKind {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            AttributeKind::String => "S",
            AttributeKind::Number => "N",
            AttributeKind::Binary => "B",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingMode {
    PayPerRequest,
    Provisioned { read: u32, write: u32 },
}

#[derive(Debug, Clone)]
pub struct TableProps {
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub billing_mode: BillingMode,
    pub removal_policy: RemovalPolicy,
}

/// A declared table
#[derive(Debug, Clone)]
pub struct Table {
    logical_id: String,
}

impl Table {
    pub fn new(stack: &mut Stack, id: &str, props: TableProps) -> Result<Self, BuildError> {
        let mut keys = vec![&props.partition_key];
        keys.extend(props.sort_key.as_ref());

        let key_schema = keys
            .iter()
            .zip(["HASH", "RANGE"])
            .map(|(key, key_type)| {
                Value::map([
                    ("AttributeName", Value::string(&key.name)),
                    ("KeyType", Value::string(key_type)),
                ])
            })
            .collect();
        let definitions = keys
            .iter()
            .map(|key| {
                Value::map([
                    ("AttributeName", Value::string(&key.name)),
                    ("AttributeType", Value::string(key.kind.as_cfn())),
                ])
            })
            .collect();

        let mut resource = Resource::at_path(TABLE_TYPE, child(id, "Resource"))
            .with_attribute("KeySchema", Value::List(key_schema))
            .with_attribute("AttributeDefinitions", Value::List(definitions))
            .with_removal_policy(props.removal_policy);
        resource = match props.billing_mode {
            BillingMode::PayPerRequest => resource.with_attribute("BillingMode", "PAY_PER_REQUEST"),
            BillingMode::Provisioned { read, write } => resource
                .with_attribute("BillingMode", "PROVISIONED")
                .with_attribute(
                    "ProvisionedThroughput",
                    Value::map([
                        ("ReadCapacityUnits", Value::Int(read.into())),
                        ("WriteCapacityUnits", Value::Int(write.into())),
                    ]),
                ),
        };

        let logical_id = stack.add(resource)?;
        Ok(Self { logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Generated table name
    pub fn table_name(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn table_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioned_table_declares_throughput() {
        let mut stack = Stack::new("Test");
        let table = Table::new(
            &mut stack,
            "Events",
            TableProps {
                partition_key: KeyAttribute::new("id", AttributeKind::String),
                sort_key: None,
                billing_mode: BillingMode::Provisioned { read: 5, write: 1 },
                removal_policy: RemovalPolicy::Retain,
            },
        )
        .unwrap();

        let resource = stack.find(table.logical_id()).unwrap();
        assert_eq!(table.logical_id(), "Events");
        assert_eq!(resource.attribute("BillingMode"), Some(&Value::string("PROVISIONED")));
        assert!(resource.attribute("ProvisionedThroughput").is_some());
        assert_eq!(
            resource.attribute("KeySchema").and_then(Value::as_list).map(<[_]>::len),
            Some(1)
        );
        assert_eq!(resource.removal_policy, Some(RemovalPolicy::Retain));
    }
}
