//! ECS constructs: cluster, Fargate task definition and service

use learnings_core::resource::{Resource, Value, logical_id};
use learnings_core::stack::Stack;

use super::child;
use super::ec2::SecurityGroup;
use super::iam::{PolicyStatement, Role};
use crate::error::BuildError;

pub const CLUSTER_TYPE: &str = "AWS::ECS::Cluster";
pub const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";
pub const SERVICE_TYPE: &str = "AWS::ECS::Service";

const TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
const HEALTH_CHECK_GRACE_PERIOD_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Cluster {
    logical_id: String,
}

impl Cluster {
    pub fn new(stack: &mut Stack, id: &str) -> Result<Self, BuildError> {
        let logical_id = stack.add(Resource::at_path(CLUSTER_TYPE, child(id, "Resource")))?;
        Ok(Self { logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn cluster_name(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn cluster_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }
}

/// One container of a task definition
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: Value,
    pub essential: bool,
    pub environment: Vec<(String, Value)>,
    pub port_mappings: Vec<u16>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>, image: Value) -> Self {
        Self {
            name: name.into(),
            image,
            essential: true,
            environment: Vec::new(),
            port_mappings: Vec::new(),
        }
    }

    pub fn with_environment(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.environment.push((name.into(), value.into()));
        self
    }

    pub fn with_port_mapping(mut self, container_port: u16) -> Self {
        self.port_mappings.push(container_port);
        self
    }

    fn to_value(&self) -> Value {
        let mut fields = vec![
            ("Name", Value::string(&self.name)),
            ("Image", self.image.clone()),
            ("Essential", Value::Bool(self.essential)),
        ];
        if !self.environment.is_empty() {
            let environment = self
                .environment
                .iter()
                .map(|(name, value)| {
                    Value::map([("Name", Value::string(name)), ("Value", value.clone())])
                })
                .collect();
            fields.push(("Environment", Value::List(environment)));
        }
        if !self.port_mappings.is_empty() {
            let mappings = self
                .port_mappings
                .iter()
                .map(|port| {
                    Value::map([
                        ("ContainerPort", Value::Int((*port).into())),
                        ("Protocol", Value::string("tcp")),
                    ])
                })
                .collect();
            fields.push(("PortMappings", Value::List(mappings)));
        }
        Value::map(fields)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FargateTaskDefinitionProps {
    pub cpu: u32,
    pub memory_mib: u32,
    /// Statements for the role the ECS agent uses to pull the image and ship logs
    pub execution_statements: Vec<PolicyStatement>,
    /// Statements for the role the containers run as
    pub task_statements: Vec<PolicyStatement>,
    pub containers: Vec<ContainerDefinition>,
}

/// A declared Fargate task definition and its two roles
#[derive(Debug, Clone)]
pub struct FargateTaskDefinition {
    logical_id: String,
    pub task_role: Role,
    pub execution_role: Role,
    task_policy: Option<String>,
    /// First container exposing a port; load balancers route to it
    default_container: Option<(String, u16)>,
}

impl FargateTaskDefinition {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        props: FargateTaskDefinitionProps,
    ) -> Result<Self, BuildError> {
        let task_role = Role::new(stack, &child(id, "TaskRole"), TASKS_PRINCIPAL)?;
        let task_policy = task_role.attach_policy(stack, &props.task_statements)?;
        let execution_role = Role::new(stack, &child(id, "ExecutionRole"), TASKS_PRINCIPAL)?;
        execution_role.attach_policy(stack, &props.execution_statements)?;

        let containers = props
            .containers
            .iter()
            .map(ContainerDefinition::to_value)
            .collect();
        let resource = Resource::at_path(TASK_DEFINITION_TYPE, child(id, "Resource"))
            .with_attribute("Family", format!("{}{}", stack.name, logical_id(id)))
            .with_attribute("Cpu", props.cpu.to_string())
            .with_attribute("Memory", props.memory_mib.to_string())
            .with_attribute("NetworkMode", "awsvpc")
            .with_attribute("RequiresCompatibilities", Value::strings(["FARGATE"]))
            .with_attribute("TaskRoleArn", task_role.arn())
            .with_attribute("ExecutionRoleArn", execution_role.arn())
            .with_attribute("ContainerDefinitions", Value::List(containers));
        let logical_id = stack.add(resource)?;

        let default_container = props.containers.iter().find_map(|c| {
            c.port_mappings
                .first()
                .map(|port| (c.name.clone(), *port))
        });

        Ok(Self {
            logical_id,
            task_role,
            execution_role,
            task_policy,
            default_container,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn task_definition_arn(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }
}

#[derive(Debug, Clone)]
pub struct FargateServiceProps<'a> {
    pub cluster: &'a Cluster,
    pub task_definition: &'a FargateTaskDefinition,
    pub desired_count: u32,
    pub security_groups: Vec<&'a SecurityGroup>,
    /// Subnets the tasks run in; the tasks never receive a public IP
    pub subnets: Vec<Value>,
}

/// A declared Fargate service
#[derive(Debug, Clone)]
pub struct FargateService {
    path: String,
    logical_id: String,
    cluster: Cluster,
    default_container: Option<(String, u16)>,
    pub security_groups: Vec<SecurityGroup>,
}

impl FargateService {
    pub fn new(stack: &mut Stack, id: &str, props: FargateServiceProps) -> Result<Self, BuildError> {
        let security_groups: Vec<SecurityGroup> =
            props.security_groups.into_iter().cloned().collect();
        let awsvpc = Value::map([
            ("AssignPublicIp", Value::string("DISABLED")),
            (
                "SecurityGroups",
                Value::List(security_groups.iter().map(SecurityGroup::group_id).collect()),
            ),
            ("Subnets", Value::List(props.subnets)),
        ]);

        let mut resource = Resource::at_path(SERVICE_TYPE, child(id, "Service"))
            .with_attribute("Cluster", props.cluster.cluster_name())
            .with_attribute("TaskDefinition", props.task_definition.task_definition_arn())
            .with_attribute("DesiredCount", Value::Int(props.desired_count.into()))
            .with_attribute("LaunchType", "FARGATE")
            .with_attribute(
                "DeploymentConfiguration",
                Value::map([
                    ("MaximumPercent", Value::Int(200)),
                    ("MinimumHealthyPercent", Value::Int(50)),
                ]),
            )
            .with_attribute("EnableECSManagedTags", false)
            .with_attribute(
                "NetworkConfiguration",
                Value::map([("AwsvpcConfiguration", awsvpc)]),
            )
            .with_dependency(props.task_definition.task_role.logical_id());
        if let Some(policy) = &props.task_definition.task_policy {
            resource = resource.with_dependency(policy);
        }
        let logical_id = stack.add(resource)?;

        Ok(Self {
            path: id.to_string(),
            logical_id,
            cluster: props.cluster.clone(),
            default_container: props.task_definition.default_container.clone(),
            security_groups,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn service_name(&self) -> Value {
        Value::get_att(&self.logical_id, "Name")
    }

    /// Port of the container load balancers route to
    pub fn container_port(&self) -> Option<u16> {
        self.default_container.as_ref().map(|(_, port)| *port)
    }

    /// Register the service's default container into a target group
    ///
    /// The service waits for the listener, since ECS rejects target groups
    /// that are not yet attached to a load balancer.
    pub fn attach_to_target_group(
        &self,
        stack: &mut Stack,
        target_group_arn: Value,
        listener: &str,
    ) -> Result<(), BuildError> {
        let (container_name, container_port) =
            self.default_container.clone().ok_or_else(|| {
                BuildError::MissingConstruct(format!("{}: container with a port mapping", self.path))
            })?;
        let resource = stack
            .find_mut(&self.logical_id)
            .ok_or_else(|| BuildError::MissingConstruct(self.path.clone()))?;

        let mut load_balancers = resource
            .attribute("LoadBalancers")
            .and_then(Value::as_list)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        load_balancers.push(Value::map([
            ("ContainerName", Value::string(container_name)),
            ("ContainerPort", Value::Int(container_port.into())),
            ("TargetGroupArn", target_group_arn),
        ]));
        resource
            .attributes
            .insert("LoadBalancers".to_string(), Value::List(load_balancers));
        resource.attributes.insert(
            "HealthCheckGracePeriodSeconds".to_string(),
            Value::Int(HEALTH_CHECK_GRACE_PERIOD_SECS),
        );
        if !resource.depends_on.iter().any(|d| d == listener) {
            resource.depends_on.push(listener.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_renders_environment_in_order() {
        let container = ContainerDefinition::new("web", Value::string("nginx:latest"))
            .with_environment("B", "2")
            .with_environment("A", Value::ref_to("Table"))
            .with_port_mapping(8080);
        let value = container.to_value();

        let env = value.get("Environment").and_then(Value::as_list).unwrap();
        assert_eq!(env[0].get("Name"), Some(&Value::string("B")));
        assert_eq!(env[1].get("Value"), Some(&Value::ref_to("Table")));
        let ports = value.get("PortMappings").and_then(Value::as_list).unwrap();
        assert_eq!(ports[0].get("ContainerPort"), Some(&Value::Int(8080)));
    }

    #[test]
    fn task_definition_declares_both_roles() {
        let mut stack = Stack::new("CdkStack");
        let task = FargateTaskDefinition::new(
            &mut stack,
            "Task",
            FargateTaskDefinitionProps {
                cpu: 256,
                memory_mib: 512,
                containers: vec![
                    ContainerDefinition::new("web", Value::string("nginx")).with_port_mapping(80),
                ],
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(task.task_role.logical_id(), "TaskTaskRole");
        assert_eq!(task.execution_role.logical_id(), "TaskExecutionRole");
        // No statements, no inline policies
        assert_eq!(stack.resources_of_type("AWS::IAM::Policy").count(), 0);

        let resource = stack.find(task.logical_id()).unwrap();
        assert_eq!(resource.attribute("Cpu"), Some(&Value::string("256")));
        assert_eq!(resource.attribute("Memory"), Some(&Value::string("512")));
        assert_eq!(resource.attribute("Family"), Some(&Value::string("CdkStackTask")));
        assert_eq!(task.default_container, Some(("web".to_string(), 80)));
    }

    #[test]
    fn service_without_port_cannot_join_target_group() {
        let mut stack = Stack::new("CdkStack");
        let cluster = Cluster::new(&mut stack, "Cluster").unwrap();
        let task = FargateTaskDefinition::new(
            &mut stack,
            "Task",
            FargateTaskDefinitionProps {
                cpu: 256,
                memory_mib: 512,
                containers: vec![ContainerDefinition::new("worker", Value::string("busybox"))],
                ..Default::default()
            },
        )
        .unwrap();
        let service = FargateService::new(
            &mut stack,
            "Worker",
            FargateServiceProps {
                cluster: &cluster,
                task_definition: &task,
                desired_count: 1,
                security_groups: vec![],
                subnets: vec![Value::ref_to("Subnet")],
            },
        )
        .unwrap();

        assert_eq!(service.logical_id(), "WorkerService");
        assert_eq!(service.container_port(), None);
        assert!(
            service
                .attach_to_target_group(&mut stack, Value::ref_to("Tg"), "Listener")
                .is_err()
        );
    }
}
