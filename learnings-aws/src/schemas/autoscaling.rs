//! Application Auto Scaling resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

pub fn scalable_target_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ApplicationAutoScaling::ScalableTarget")
        .with_description("A resource whose capacity Application Auto Scaling manages")
        .attribute(AttributeSchema::new("MinCapacity", types::non_negative_int()).required())
        .attribute(AttributeSchema::new("MaxCapacity", types::non_negative_int()).required())
        .attribute(
            AttributeSchema::new("ResourceId", AttributeType::String)
                .required()
                .with_description("For ECS services: service/<cluster name>/<service name>"),
        )
        .attribute(AttributeSchema::new("RoleARN", AttributeType::String))
        .attribute(
            AttributeSchema::new(
                "ScalableDimension",
                types::one_of(&["ecs:service:DesiredCount"]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("ServiceNamespace", types::one_of(&["ecs"])).required())
}

pub fn scaling_policy_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ApplicationAutoScaling::ScalingPolicy")
        .with_description("A scaling policy on a scalable target")
        .attribute(AttributeSchema::new("PolicyName", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "PolicyType",
                types::one_of(&["TargetTrackingScaling", "StepScaling"]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("ScalingTargetId", AttributeType::String))
        .attribute(AttributeSchema::new(
            "TargetTrackingScalingPolicyConfiguration",
            types::structure(
                "TargetTrackingScalingPolicyConfiguration",
                vec![
                    AttributeSchema::new("TargetValue", aws_types::percentage()).required(),
                    AttributeSchema::new("ScaleInCooldown", types::non_negative_int()),
                    AttributeSchema::new("ScaleOutCooldown", types::non_negative_int()),
                    AttributeSchema::new(
                        "PredefinedMetricSpecification",
                        types::structure(
                            "PredefinedMetricSpecification",
                            vec![
                                AttributeSchema::new(
                                    "PredefinedMetricType",
                                    types::one_of(&[
                                        "ECSServiceAverageCPUUtilization",
                                        "ECSServiceAverageMemoryUtilization",
                                    ]),
                                )
                                .required(),
                            ],
                        ),
                    ),
                ],
            ),
        ))
        .returns("Arn")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![scalable_target_schema(), scaling_policy_schema()]
}
