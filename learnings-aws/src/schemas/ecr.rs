//! ECR resource schema definitions

use learnings_core::schema::{AttributeSchema, ResourceSchema, types};

use super::types as aws_types;

/// Returns the schema for Repository
///
/// Based on CloudFormation AWS::ECR::Repository resource type.
pub fn repository_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ECR::Repository")
        .with_description("A private container image repository")
        .attribute(
            AttributeSchema::new("RepositoryName", aws_types::repository_name())
                .with_description("Name of the repository; generated when omitted"),
        )
        .attribute(AttributeSchema::new(
            "ImageTagMutability",
            types::one_of(&["MUTABLE", "IMMUTABLE"]),
        ))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
        .returns("RepositoryUri")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![repository_schema()]
}
