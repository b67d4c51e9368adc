//! Application load balancer constructs

use learnings_core::resource::{Resource, Value};
use learnings_core::stack::Stack;

use super::child;
use super::ec2::{Peer, Port, SecurityGroup, SecurityGroupProps};
use super::ecs::FargateService;
use super::vpc::Vpc;
use crate::error::BuildError;

pub const LOAD_BALANCER_TYPE: &str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
pub const LISTENER_TYPE: &str = "AWS::ElasticLoadBalancingV2::Listener";
pub const TARGET_GROUP_TYPE: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";

const TARGET_RULE_DESCRIPTION: &str = "Load balancer to target";

fn key_value(key: &str, value: &str) -> Value {
    Value::map([("Key", Value::string(key)), ("Value", Value::string(value))])
}

#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancerProps<'a> {
    pub vpc: &'a Vpc,
    pub internet_facing: bool,
}

/// A declared application load balancer with its own security group
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancer {
    path: String,
    logical_id: String,
    vpc_id: Value,
    pub security_group: SecurityGroup,
}

impl ApplicationLoadBalancer {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        props: ApplicationLoadBalancerProps,
    ) -> Result<Self, BuildError> {
        let description = format!(
            "Automatically created Security Group for ELB {}{}",
            stack.name,
            learnings_core::resource::logical_id(id)
        );
        let security_group = SecurityGroup::new(
            stack,
            &child(id, "SecurityGroup"),
            SecurityGroupProps {
                vpc: props.vpc,
                description: Some(description),
                allow_all_outbound: false,
            },
        )?;

        let (scheme, subnets) = if props.internet_facing {
            ("internet-facing", props.vpc.public_subnet_ids())
        } else {
            ("internal", props.vpc.private_subnet_ids())
        };
        let mut resource = Resource::at_path(LOAD_BALANCER_TYPE, child(id, "Resource"))
            .with_attribute("Scheme", scheme)
            .with_attribute("Type", "application")
            .with_attribute("Subnets", Value::List(subnets))
            .with_attribute(
                "SecurityGroups",
                Value::List(vec![security_group.group_id()]),
            )
            .with_attribute(
                "LoadBalancerAttributes",
                Value::List(vec![key_value("deletion_protection.enabled", "false")]),
            );
        // Internet-facing load balancers need routes to the internet gateway first
        if props.internet_facing {
            for route in props.vpc.internet_routes() {
                resource = resource.with_dependency(route);
            }
        }
        let logical_id = stack.add(resource)?;

        Ok(Self {
            path: id.to_string(),
            logical_id,
            vpc_id: props.vpc.vpc_id(),
            security_group,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn load_balancer_arn(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn dns_name(&self) -> Value {
        Value::get_att(&self.logical_id, "DNSName")
    }

    /// Declare an HTTP listener
    ///
    /// With `open`, the load balancer's security group admits the listener
    /// port from any IPv4 address.
    pub fn add_listener(
        &self,
        stack: &mut Stack,
        id: &str,
        port: u16,
        open: bool,
    ) -> Result<ApplicationListener, BuildError> {
        let path = child(&self.path, id);
        let resource = Resource::at_path(LISTENER_TYPE, child(&path, "Resource"))
            .with_attribute("LoadBalancerArn", self.load_balancer_arn())
            .with_attribute("Port", Value::Int(port.into()))
            .with_attribute("Protocol", "HTTP");
        let logical_id = stack.add(resource)?;

        let listener = ApplicationListener {
            path,
            logical_id,
            port,
            vpc_id: self.vpc_id.clone(),
            security_group: self.security_group.clone(),
        };
        if open {
            listener.allow_default_port_from_any_ipv4(
                stack,
                &format!("Allow from anyone on port {}", port),
            )?;
        }
        Ok(listener)
    }
}

#[derive(Debug, Clone)]
pub struct AddTargetsProps<'a> {
    pub port: u16,
    pub service: &'a FargateService,
    pub health_check_path: String,
}

/// A declared listener
#[derive(Debug, Clone)]
pub struct ApplicationListener {
    path: String,
    logical_id: String,
    port: u16,
    vpc_id: Value,
    security_group: SecurityGroup,
}

impl ApplicationListener {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn allow_default_port_from_any_ipv4(
        &self,
        stack: &mut Stack,
        description: &str,
    ) -> Result<(), BuildError> {
        self.security_group.add_ingress_rule(
            stack,
            Peer::any_ipv4(),
            Port::tcp(self.port),
            Some(description),
        )
    }

    /// Route the listener to a service through a new `ip` target group
    ///
    /// The first target group added becomes the listener's default action.
    /// The load balancer's security group may reach the service's container
    /// port, and the service's security groups admit it.
    pub fn add_targets(
        &self,
        stack: &mut Stack,
        id: &str,
        props: AddTargetsProps,
    ) -> Result<TargetGroup, BuildError> {
        let resource = Resource::at_path(
            TARGET_GROUP_TYPE,
            child(&child(&self.path, id), "Resource"),
        )
        .with_attribute("Port", Value::Int(props.port.into()))
        .with_attribute("Protocol", "HTTP")
        .with_attribute("TargetType", "ip")
        .with_attribute("VpcId", self.vpc_id.clone())
        .with_attribute("HealthCheckPath", props.health_check_path.as_str())
        .with_attribute(
            "TargetGroupAttributes",
            Value::List(vec![key_value("stickiness.enabled", "false")]),
        );
        let target_group = TargetGroup {
            logical_id: stack.add(resource)?,
        };

        let listener = stack
            .find_mut(&self.logical_id)
            .ok_or_else(|| BuildError::MissingConstruct(self.path.clone()))?;
        if listener.attribute("DefaultActions").is_none() {
            listener.attributes.insert(
                "DefaultActions".to_string(),
                Value::List(vec![Value::map([
                    ("Type", Value::string("forward")),
                    ("TargetGroupArn", target_group.target_group_arn()),
                ])]),
            );
        }

        props
            .service
            .attach_to_target_group(stack, target_group.target_group_arn(), &self.logical_id)?;

        let container_port = props.service.container_port().unwrap_or(props.port);
        for service_group in &props.service.security_groups {
            self.security_group.add_egress_rule(
                stack,
                Peer::SecurityGroup(service_group.clone()),
                Port::tcp(container_port),
                Some(TARGET_RULE_DESCRIPTION),
            )?;
            service_group.add_ingress_rule(
                stack,
                Peer::SecurityGroup(self.security_group.clone()),
                Port::tcp(container_port),
                Some(TARGET_RULE_DESCRIPTION),
            )?;
        }
        Ok(target_group)
    }
}

/// A declared target group
#[derive(Debug, Clone)]
pub struct TargetGroup {
    logical_id: String,
}

impl TargetGroup {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn target_group_arn(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }
}
