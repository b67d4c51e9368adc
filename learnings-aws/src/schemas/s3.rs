//! S3 resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for Bucket
pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::S3::Bucket")
        .with_description("An S3 bucket")
        .attribute(AttributeSchema::new("BucketName", AttributeType::String))
        .attribute(
            AttributeSchema::new("BucketEncryption", AttributeType::Any)
                .with_description("Default server-side encryption of new objects"),
        )
        .attribute(AttributeSchema::new(
            "PublicAccessBlockConfiguration",
            types::structure(
                "PublicAccessBlockConfiguration",
                vec![
                    AttributeSchema::new("BlockPublicAcls", AttributeType::Bool),
                    AttributeSchema::new("BlockPublicPolicy", AttributeType::Bool),
                    AttributeSchema::new("IgnorePublicAcls", AttributeType::Bool),
                    AttributeSchema::new("RestrictPublicBuckets", AttributeType::Bool),
                ],
            ),
        ))
        .attribute(AttributeSchema::new(
            "VersioningConfiguration",
            types::structure(
                "VersioningConfiguration",
                vec![
                    AttributeSchema::new("Status", types::one_of(&["Enabled", "Suspended"]))
                        .required(),
                ],
            ),
        ))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
        .returns("DomainName")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![bucket_schema()]
}
