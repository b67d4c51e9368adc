//! DynamoDB resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for Table
///
/// Based on CloudFormation AWS::DynamoDB::Table resource type.
/// See: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-resource-dynamodb-table.html
pub fn table_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::DynamoDB::Table")
        .with_description("A DynamoDB table")
        .attribute(
            AttributeSchema::new(
                "KeySchema",
                AttributeType::List(Box::new(types::structure(
                    "KeySchema",
                    vec![
                        AttributeSchema::new("AttributeName", AttributeType::String).required(),
                        AttributeSchema::new("KeyType", types::one_of(&["HASH", "RANGE"]))
                            .required(),
                    ],
                ))),
            )
            .required()
            .with_description("The partition key and, optionally, the sort key"),
        )
        .attribute(
            AttributeSchema::new(
                "AttributeDefinitions",
                AttributeType::List(Box::new(types::structure(
                    "AttributeDefinition",
                    vec![
                        AttributeSchema::new("AttributeName", AttributeType::String).required(),
                        AttributeSchema::new("AttributeType", types::one_of(&["S", "N", "B"]))
                            .required(),
                    ],
                ))),
            )
            .with_description("Types of the key attributes"),
        )
        .attribute(AttributeSchema::new(
            "BillingMode",
            types::one_of(&["PAY_PER_REQUEST", "PROVISIONED"]),
        ))
        .attribute(AttributeSchema::new(
            "ProvisionedThroughput",
            types::structure(
                "ProvisionedThroughput",
                vec![
                    AttributeSchema::new("ReadCapacityUnits", types::positive_int()).required(),
                    AttributeSchema::new("WriteCapacityUnits", types::positive_int()).required(),
                ],
            ),
        ))
        .attribute(AttributeSchema::new("TableName", AttributeType::String))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
        .returns("StreamArn")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![table_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnings_core::resource::Value;
    use std::collections::HashMap;

    fn key(name: &str, key_type: &str) -> Value {
        Value::map([
            ("AttributeName", Value::string(name)),
            ("KeyType", Value::string(key_type)),
        ])
    }

    #[test]
    fn key_schema_is_required() {
        assert!(table_schema().validate(&HashMap::new()).is_err());
    }

    #[test]
    fn key_type_is_checked() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "KeySchema".to_string(),
            Value::List(vec![key("app_id", "HASH"), key("created_at", "RANGE")]),
        );
        assert!(table_schema().validate(&attrs).is_ok());

        attrs.insert(
            "KeySchema".to_string(),
            Value::List(vec![key("app_id", "PARTITION")]),
        );
        assert!(table_schema().validate(&attrs).is_err());
    }
}
