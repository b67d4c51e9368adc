//! ECS resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

pub fn cluster_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ECS::Cluster")
        .with_description("An ECS cluster")
        .attribute(AttributeSchema::new("ClusterName", AttributeType::String))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Arn")
}

fn container_definition() -> AttributeType {
    types::structure(
        "ContainerDefinition",
        vec![
            AttributeSchema::new("Name", AttributeType::String).required(),
            AttributeSchema::new("Image", aws_types::container_image()).required(),
            AttributeSchema::new("Essential", AttributeType::Bool),
            AttributeSchema::new("Cpu", types::non_negative_int()),
            AttributeSchema::new("Memory", types::positive_int()),
            AttributeSchema::new(
                "Environment",
                AttributeType::List(Box::new(types::structure(
                    "KeyValuePair",
                    vec![
                        AttributeSchema::new("Name", AttributeType::String).required(),
                        AttributeSchema::new("Value", AttributeType::String).required(),
                    ],
                ))),
            ),
            AttributeSchema::new(
                "PortMappings",
                AttributeType::List(Box::new(types::structure(
                    "PortMapping",
                    vec![
                        AttributeSchema::new("ContainerPort", types::port_number()).required(),
                        AttributeSchema::new("HostPort", types::port_number()),
                        AttributeSchema::new("Protocol", types::one_of(&["tcp", "udp"])),
                    ],
                ))),
            ),
            AttributeSchema::new("HealthCheck", AttributeType::Any),
        ],
    )
}

/// Returns the schema for Task Definition
///
/// Based on CloudFormation AWS::ECS::TaskDefinition resource type.
/// See: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-resource-ecs-taskdefinition.html
pub fn task_definition_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ECS::TaskDefinition")
        .with_description("An ECS task definition")
        .attribute(AttributeSchema::new("Family", AttributeType::String))
        .attribute(
            AttributeSchema::new("Cpu", aws_types::numeric_string())
                .with_description("CPU units for the task, as a string (\"256\" is 0.25 vCPU)"),
        )
        .attribute(
            AttributeSchema::new("Memory", aws_types::numeric_string())
                .with_description("Memory for the task in MiB, as a string"),
        )
        .attribute(AttributeSchema::new(
            "NetworkMode",
            types::one_of(&["awsvpc", "bridge", "host", "none"]),
        ))
        .attribute(AttributeSchema::new(
            "RequiresCompatibilities",
            AttributeType::List(Box::new(types::one_of(&["FARGATE", "EC2", "EXTERNAL"]))),
        ))
        .attribute(
            AttributeSchema::new("ExecutionRoleArn", AttributeType::String)
                .with_description("Role the ECS agent uses to pull images and write logs"),
        )
        .attribute(
            AttributeSchema::new("TaskRoleArn", AttributeType::String)
                .with_description("Role the containers assume at runtime"),
        )
        .attribute(
            AttributeSchema::new(
                "ContainerDefinitions",
                AttributeType::List(Box::new(container_definition())),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("TaskDefinitionArn")
}

/// Returns the schema for Service
pub fn service_schema() -> ResourceSchema {
    let awsvpc = types::structure(
        "AwsVpcConfiguration",
        vec![
            AttributeSchema::new("AssignPublicIp", types::one_of(&["ENABLED", "DISABLED"])),
            AttributeSchema::new("SecurityGroups", types::string_list()),
            AttributeSchema::new("Subnets", types::string_list()).required(),
        ],
    );
    ResourceSchema::new("AWS::ECS::Service")
        .with_description("An ECS service running a task definition")
        .attribute(AttributeSchema::new("Cluster", AttributeType::String))
        .attribute(AttributeSchema::new("TaskDefinition", AttributeType::String).required())
        .attribute(AttributeSchema::new("ServiceName", AttributeType::String))
        .attribute(AttributeSchema::new("DesiredCount", types::non_negative_int()))
        .attribute(AttributeSchema::new(
            "LaunchType",
            types::one_of(&["FARGATE", "EC2", "EXTERNAL"]),
        ))
        .attribute(AttributeSchema::new(
            "NetworkConfiguration",
            types::structure(
                "NetworkConfiguration",
                vec![AttributeSchema::new("AwsvpcConfiguration", awsvpc).required()],
            ),
        ))
        .attribute(AttributeSchema::new(
            "LoadBalancers",
            AttributeType::List(Box::new(types::structure(
                "LoadBalancer",
                vec![
                    AttributeSchema::new("ContainerName", AttributeType::String).required(),
                    AttributeSchema::new("ContainerPort", types::port_number()).required(),
                    AttributeSchema::new("TargetGroupArn", AttributeType::String).required(),
                ],
            ))),
        ))
        .attribute(AttributeSchema::new(
            "HealthCheckGracePeriodSeconds",
            types::non_negative_int(),
        ))
        .attribute(AttributeSchema::new(
            "DeploymentConfiguration",
            types::structure(
                "DeploymentConfiguration",
                vec![
                    AttributeSchema::new("MaximumPercent", types::positive_int()),
                    AttributeSchema::new("MinimumHealthyPercent", types::non_negative_int()),
                ],
            ),
        ))
        .attribute(AttributeSchema::new("EnableECSManagedTags", AttributeType::Bool))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("Name")
        .returns("ServiceArn")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![cluster_schema(), task_definition_schema(), service_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnings_core::resource::Value;
    use std::collections::HashMap;

    #[test]
    fn public_ip_setting_is_an_enum() {
        let mut attrs = HashMap::new();
        attrs.insert("TaskDefinition".to_string(), Value::ref_to("Task"));
        attrs.insert(
            "NetworkConfiguration".to_string(),
            Value::map([(
                "AwsvpcConfiguration",
                Value::map([
                    ("AssignPublicIp", Value::string("NO")),
                    ("Subnets", Value::List(vec![Value::ref_to("Subnet")])),
                ]),
            )]),
        );
        assert!(service_schema().validate(&attrs).is_err());
    }

    #[test]
    fn container_needs_name_and_image() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "ContainerDefinitions".to_string(),
            Value::List(vec![Value::map([("Name", Value::string("web"))])]),
        );
        assert!(task_definition_schema().validate(&attrs).is_err());

        attrs.insert(
            "ContainerDefinitions".to_string(),
            Value::List(vec![Value::map([
                ("Name", Value::string("web")),
                ("Image", Value::string("nginx:latest")),
            ])]),
        );
        assert!(task_definition_schema().validate(&attrs).is_ok());
    }
}
