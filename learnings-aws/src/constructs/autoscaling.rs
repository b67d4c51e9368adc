//! Task count scaling for ECS services

use learnings_core::resource::{PseudoParam, Resource, Value, logical_id};
use learnings_core::stack::Stack;

use super::child;
use super::ecs::FargateService;
use crate::error::BuildError;

pub const SCALABLE_TARGET_TYPE: &str = "AWS::ApplicationAutoScaling::ScalableTarget";
pub const SCALING_POLICY_TYPE: &str = "AWS::ApplicationAutoScaling::ScalingPolicy";

/// Service-linked role Application Auto Scaling uses for ECS services
const ECS_SCALING_ROLE: &str =
    "role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuScalingProps {
    pub target_utilization_percent: u32,
    pub scale_in_cooldown_secs: u32,
    pub scale_out_cooldown_secs: u32,
}

/// Scalable desired count of a service
#[derive(Debug, Clone)]
pub struct ScalableTaskCount {
    path: String,
    logical_id: String,
}

impl ScalableTaskCount {
    pub fn new(
        stack: &mut Stack,
        service: &FargateService,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Result<Self, BuildError> {
        let path = child(service.path(), "TaskCount");
        let resource_id = Value::join(
            "",
            vec![
                Value::string("service/"),
                service.cluster().cluster_name(),
                Value::string("/"),
                service.service_name(),
            ],
        );
        let role_arn = Value::join(
            "",
            vec![
                Value::string("arn:"),
                Value::Pseudo(PseudoParam::Partition),
                Value::string(":iam::"),
                Value::Pseudo(PseudoParam::AccountId),
                Value::string(format!(":{}", ECS_SCALING_ROLE)),
            ],
        );

        let resource = Resource::at_path(SCALABLE_TARGET_TYPE, child(&path, "Target"))
            .with_attribute("MinCapacity", Value::Int(min_capacity.into()))
            .with_attribute("MaxCapacity", Value::Int(max_capacity.into()))
            .with_attribute("ResourceId", resource_id)
            .with_attribute("RoleARN", role_arn)
            .with_attribute("ScalableDimension", "ecs:service:DesiredCount")
            .with_attribute("ServiceNamespace", "ecs");
        let logical_id = stack.add(resource)?;
        Ok(Self { path, logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Track average CPU utilization of the service's tasks
    pub fn scale_on_cpu_utilization(
        &self,
        stack: &mut Stack,
        id: &str,
        props: CpuScalingProps,
    ) -> Result<String, BuildError> {
        let path = child(&child(&self.path, id), "Resource");
        let configuration = Value::map([
            (
                "PredefinedMetricSpecification",
                Value::map([(
                    "PredefinedMetricType",
                    Value::string("ECSServiceAverageCPUUtilization"),
                )]),
            ),
            (
                "TargetValue",
                Value::Int(props.target_utilization_percent.into()),
            ),
            (
                "ScaleInCooldown",
                Value::Int(props.scale_in_cooldown_secs.into()),
            ),
            (
                "ScaleOutCooldown",
                Value::Int(props.scale_out_cooldown_secs.into()),
            ),
        ]);
        let resource = Resource::at_path(SCALING_POLICY_TYPE, path.as_str())
            .with_attribute("PolicyName", logical_id(&path))
            .with_attribute("PolicyType", "TargetTrackingScaling")
            .with_attribute("ScalingTargetId", Value::ref_to(&self.logical_id))
            .with_attribute("TargetTrackingScalingPolicyConfiguration", configuration);
        Ok(stack.add(resource)?)
    }
}
