//! CodeBuild resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for Project
///
/// Based on CloudFormation AWS::CodeBuild::Project resource type.
pub fn project_schema() -> ResourceSchema {
    let source_types = ["CODEPIPELINE", "GITHUB", "S3", "NO_SOURCE"];
    ResourceSchema::new("AWS::CodeBuild::Project")
        .with_description("A CodeBuild build project")
        .attribute(AttributeSchema::new("Name", AttributeType::String))
        .attribute(AttributeSchema::new("Description", AttributeType::String))
        .attribute(AttributeSchema::new("ServiceRole", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "Source",
                types::structure(
                    "Source",
                    vec![
                        AttributeSchema::new("Type", types::one_of(&source_types)).required(),
                        AttributeSchema::new("BuildSpec", AttributeType::String),
                    ],
                ),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new(
                "Artifacts",
                types::structure(
                    "Artifacts",
                    vec![
                        AttributeSchema::new(
                            "Type",
                            types::one_of(&["CODEPIPELINE", "S3", "NO_ARTIFACTS"]),
                        )
                        .required(),
                    ],
                ),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new(
                "Environment",
                types::structure(
                    "Environment",
                    vec![
                        AttributeSchema::new(
                            "Type",
                            types::one_of(&["LINUX_CONTAINER", "ARM_CONTAINER"]),
                        )
                        .required(),
                        AttributeSchema::new(
                            "ComputeType",
                            types::one_of(&[
                                "BUILD_GENERAL1_SMALL",
                                "BUILD_GENERAL1_MEDIUM",
                                "BUILD_GENERAL1_LARGE",
                            ]),
                        )
                        .required(),
                        AttributeSchema::new("Image", AttributeType::String).required(),
                        AttributeSchema::new("PrivilegedMode", AttributeType::Bool)
                            .with_description("Required to run the Docker daemon inside the build"),
                        AttributeSchema::new(
                            "ImagePullCredentialsType",
                            types::one_of(&["CODEBUILD", "SERVICE_ROLE"]),
                        ),
                        AttributeSchema::new(
                            "EnvironmentVariables",
                            AttributeType::List(Box::new(types::structure(
                                "EnvironmentVariable",
                                vec![
                                    AttributeSchema::new("Name", AttributeType::String).required(),
                                    AttributeSchema::new("Value", AttributeType::String)
                                        .required(),
                                    AttributeSchema::new(
                                        "Type",
                                        types::one_of(&[
                                            "PLAINTEXT",
                                            "PARAMETER_STORE",
                                            "SECRETS_MANAGER",
                                        ]),
                                    ),
                                ],
                            ))),
                        ),
                    ],
                ),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![project_schema()]
}
