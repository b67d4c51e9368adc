//! CodePipeline resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

fn artifacts() -> AttributeType {
    AttributeType::List(Box::new(types::structure(
        "Artifact",
        vec![AttributeSchema::new("Name", AttributeType::String).required()],
    )))
}

fn action() -> AttributeType {
    types::structure(
        "Action",
        vec![
            AttributeSchema::new("Name", AttributeType::String).required(),
            AttributeSchema::new(
                "ActionTypeId",
                types::structure(
                    "ActionTypeId",
                    vec![
                        AttributeSchema::new(
                            "Category",
                            types::one_of(&[
                                "Source", "Build", "Test", "Deploy", "Approval", "Invoke",
                            ]),
                        )
                        .required(),
                        AttributeSchema::new(
                            "Owner",
                            types::one_of(&["AWS", "ThirdParty", "Custom"]),
                        )
                        .required(),
                        AttributeSchema::new("Provider", AttributeType::String).required(),
                        AttributeSchema::new("Version", AttributeType::String).required(),
                    ],
                ),
            )
            .required(),
            AttributeSchema::new("Configuration", AttributeType::Any),
            AttributeSchema::new("InputArtifacts", artifacts()),
            AttributeSchema::new("OutputArtifacts", artifacts()),
            AttributeSchema::new("RunOrder", types::positive_int()),
            AttributeSchema::new("RoleArn", AttributeType::String),
        ],
    )
}

/// Returns the schema for Pipeline
///
/// Based on CloudFormation AWS::CodePipeline::Pipeline resource type.
pub fn pipeline_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::CodePipeline::Pipeline")
        .with_description("A CodePipeline delivery pipeline")
        .attribute(AttributeSchema::new("Name", AttributeType::String))
        .attribute(AttributeSchema::new("RoleArn", AttributeType::String).required())
        .attribute(AttributeSchema::new(
            "ArtifactStore",
            types::structure(
                "ArtifactStore",
                vec![
                    AttributeSchema::new("Type", types::one_of(&["S3"])).required(),
                    AttributeSchema::new("Location", AttributeType::String).required(),
                ],
            ),
        ))
        .attribute(
            AttributeSchema::new(
                "Stages",
                AttributeType::List(Box::new(types::structure(
                    "Stage",
                    vec![
                        AttributeSchema::new("Name", AttributeType::String).required(),
                        AttributeSchema::new("Actions", AttributeType::List(Box::new(action())))
                            .required(),
                    ],
                ))),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("RestartExecutionOnUpdate", AttributeType::Bool))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Version")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![pipeline_schema()]
}
