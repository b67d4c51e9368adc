//! Elastic Load Balancing v2 resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

fn key_value_list(name: &str) -> AttributeType {
    AttributeType::List(Box::new(types::structure(
        name,
        vec![
            AttributeSchema::new("Key", AttributeType::String).required(),
            AttributeSchema::new("Value", AttributeType::String).required(),
        ],
    )))
}

pub fn load_balancer_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
        .with_description("An application or network load balancer")
        .attribute(AttributeSchema::new("Name", AttributeType::String))
        .attribute(AttributeSchema::new(
            "Scheme",
            types::one_of(&["internet-facing", "internal"]),
        ))
        .attribute(AttributeSchema::new(
            "Type",
            types::one_of(&["application", "network", "gateway"]),
        ))
        .attribute(AttributeSchema::new("Subnets", types::string_list()))
        .attribute(AttributeSchema::new("SecurityGroups", types::string_list()))
        .attribute(AttributeSchema::new(
            "LoadBalancerAttributes",
            key_value_list("LoadBalancerAttribute"),
        ))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("CanonicalHostedZoneID")
        .returns("DNSName")
        .returns("LoadBalancerArn")
        .returns("LoadBalancerFullName")
}

pub fn listener_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ElasticLoadBalancingV2::Listener")
        .with_description("A load balancer listener")
        .attribute(AttributeSchema::new("LoadBalancerArn", AttributeType::String).required())
        .attribute(AttributeSchema::new("Port", types::port_number()))
        .attribute(AttributeSchema::new(
            "Protocol",
            types::one_of(&["HTTP", "HTTPS", "TCP", "TLS", "UDP", "TCP_UDP"]),
        ))
        .attribute(
            AttributeSchema::new(
                "DefaultActions",
                AttributeType::List(Box::new(types::structure(
                    "Action",
                    vec![
                        AttributeSchema::new(
                            "Type",
                            types::one_of(&["forward", "redirect", "fixed-response"]),
                        )
                        .required(),
                        AttributeSchema::new("TargetGroupArn", AttributeType::String),
                    ],
                ))),
            )
            .required()
            .with_description("A listener needs at least one default action"),
        )
        .returns("ListenerArn")
}

/// Returns the schema for Target Group
///
/// Health check settings that are not declared use the service defaults.
pub fn target_group_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::ElasticLoadBalancingV2::TargetGroup")
        .with_description("A target group for load balancer routing")
        .attribute(AttributeSchema::new("Name", AttributeType::String))
        .attribute(AttributeSchema::new("Port", types::port_number()))
        .attribute(AttributeSchema::new(
            "Protocol",
            types::one_of(&["HTTP", "HTTPS", "TCP", "TLS", "UDP", "TCP_UDP"]),
        ))
        .attribute(AttributeSchema::new(
            "TargetType",
            types::one_of(&["instance", "ip", "lambda", "alb"]),
        ))
        .attribute(AttributeSchema::new("VpcId", AttributeType::String))
        .attribute(AttributeSchema::new("HealthCheckPath", AttributeType::String))
        .attribute(AttributeSchema::new(
            "HealthCheckIntervalSeconds",
            types::positive_int(),
        ))
        .attribute(AttributeSchema::new(
            "HealthCheckTimeoutSeconds",
            types::positive_int(),
        ))
        .attribute(AttributeSchema::new("HealthyThresholdCount", types::positive_int()))
        .attribute(AttributeSchema::new(
            "UnhealthyThresholdCount",
            types::positive_int(),
        ))
        .attribute(AttributeSchema::new(
            "TargetGroupAttributes",
            key_value_list("TargetGroupAttribute"),
        ))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("LoadBalancerArns")
        .returns("TargetGroupArn")
        .returns("TargetGroupFullName")
        .returns("TargetGroupName")
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![load_balancer_schema(), listener_schema(), target_group_schema()]
}
