//! IAM resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub fn role_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::IAM::Role")
        .with_description("An IAM role")
        .attribute(
            AttributeSchema::new("AssumeRolePolicyDocument", AttributeType::Any)
                .required()
                .with_description("Trust policy naming the principals that may assume the role"),
        )
        .attribute(AttributeSchema::new("Description", AttributeType::String))
        .attribute(AttributeSchema::new("ManagedPolicyArns", types::string_list()))
        .attribute(AttributeSchema::new("RoleName", AttributeType::String))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
        .returns("RoleId")
}

pub fn policy_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::IAM::Policy")
        .with_description("An inline policy attached to roles")
        .attribute(AttributeSchema::new("PolicyDocument", AttributeType::Any).required())
        .attribute(AttributeSchema::new("PolicyName", AttributeType::String).required())
        .attribute(AttributeSchema::new("Roles", types::string_list()))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![role_schema(), policy_schema()]
}
