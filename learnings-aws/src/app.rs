//! The learnings stack
//!
//! [`build_stack`] declares every resource of the stack from a
//! [`StackConfig`]; the delivery pipeline is added when the configuration
//! has a `[pipeline]` table.

use learnings_core::resource::{RemovalPolicy, Value};
use learnings_core::stack::{Output, Stack};

use crate::config::{ImageSource, PipelineConfig, StackConfig};
use crate::constructs::autoscaling::{CpuScalingProps, ScalableTaskCount};
use crate::constructs::ec2::{Peer, Port, SecurityGroup, SecurityGroupProps};
use crate::constructs::ecr::Repository;
use crate::constructs::ecs::{
    Cluster, ContainerDefinition, FargateService, FargateServiceProps, FargateTaskDefinition,
    FargateTaskDefinitionProps,
};
use crate::constructs::elbv2::{AddTargetsProps, ApplicationLoadBalancer, ApplicationLoadBalancerProps};
use crate::constructs::iam::PolicyStatement;
use crate::constructs::pipeline::{
    Action, ActionKind, ArtifactBucket, Pipeline, PipelineProject, PipelineProjectProps,
    PipelineProps, Stage, secret_value,
};
use crate::constructs::table::{AttributeKind, BillingMode, KeyAttribute, Table, TableProps};
use crate::constructs::vpc::{Vpc, VpcProps};
use crate::error::BuildError;
use crate::schemas;

pub const TABLE_ID: &str = "Messages";
pub const VPC_ID: &str = "my-react-learnings-cdk-vpc";
pub const REPOSITORY_ID: &str = "my-react-learnings-cdk-ecr-api";
pub const CLUSTER_ID: &str = "my-react-learnings-cluster";
pub const TASK_ID: &str = "my-react-learnings-task";
pub const CONTAINER_NAME: &str = "my-react-container";
pub const SERVICE_SECURITY_GROUP_ID: &str = "my-react-service";
pub const SERVICE_ID: &str = "Service";
pub const LOAD_BALANCER_ID: &str = "my-react-learnings-alb";
pub const PIPELINE_ID: &str = "my-react-learnings-pipeline";
pub const BUILD_PROJECT_ID: &str = "my-react-learnings-build";

pub const TABLE_ENV: &str = "DYNAMODB_MESSAGES_TABLE";
pub const APP_ID_ENV: &str = "APP_ID";

pub const SOURCE_ARTIFACT: &str = "SourceOutput";
pub const BUILD_ARTIFACT: &str = "BuildOutput";

/// Actions that pull the task's image and ship its logs
pub const EXECUTION_ACTIONS: &[&str] = &[
    "ecr:GetAuthorizationToken",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

/// Actions the build needs to push images
pub const IMAGE_PUSH_ACTIONS: &[&str] = &[
    "ecr:GetAuthorizationToken",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
    "ecr:PutImage",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "ecr:DescribeRepositories",
    "ecr:DescribeImages",
    "ecr:ListImages",
];

/// Declare the whole stack and validate it against the resource schemas
pub fn build_stack(config: &StackConfig) -> Result<Stack, BuildError> {
    config.validate()?;
    let mut stack = Stack::new(&config.stack_name).with_description(if config.has_pipeline() {
        "Container service with DynamoDB table, load balancer and delivery pipeline"
    } else {
        "Container service with DynamoDB table and load balancer"
    });

    let table = Table::new(
        &mut stack,
        TABLE_ID,
        TableProps {
            partition_key: KeyAttribute::new("app_id", AttributeKind::String),
            sort_key: Some(KeyAttribute::new("created_at", AttributeKind::Number)),
            billing_mode: BillingMode::PayPerRequest,
            // Not suitable for production data
            removal_policy: RemovalPolicy::Destroy,
        },
    )?;
    stack.add_output(
        Output::new("TableName", table.table_name()).with_description("Name of the messages table"),
    )?;

    let vpc = Vpc::new(
        &mut stack,
        VPC_ID,
        VpcProps {
            cidr: config.vpc.cidr.clone(),
            max_azs: config.vpc.max_azs,
        },
    )?;

    let repository = Repository::new(&mut stack, REPOSITORY_ID, &config.repository_name)?;
    let cluster = Cluster::new(&mut stack, CLUSTER_ID)?;

    let image = match &config.image {
        ImageSource::Repository => repository.repository_uri(),
        ImageSource::Pinned { uri } => {
            log::warn!(
                "container image is pinned to {}, not to the '{}' repository declared in this stack",
                uri,
                config.repository_name
            );
            Value::string(uri)
        }
    };

    let task_definition = FargateTaskDefinition::new(
        &mut stack,
        TASK_ID,
        FargateTaskDefinitionProps {
            cpu: config.task.cpu,
            memory_mib: config.task.memory_mib,
            execution_statements: vec![
                PolicyStatement::allow()
                    .with_actions(EXECUTION_ACTIONS)
                    .on_all_resources(),
            ],
            task_statements: vec![
                PolicyStatement::allow()
                    .with_actions(&["dynamodb:*"])
                    .with_resource(table.table_arn()),
            ],
            containers: vec![
                ContainerDefinition::new(CONTAINER_NAME, image)
                    .with_environment(TABLE_ENV, table.table_name())
                    .with_environment(APP_ID_ENV, config.app_id.as_str())
                    .with_port_mapping(config.task.container_port),
            ],
        },
    )?;

    let service_group = SecurityGroup::new(
        &mut stack,
        SERVICE_SECURITY_GROUP_ID,
        SecurityGroupProps {
            vpc: &vpc,
            description: None,
            allow_all_outbound: true,
        },
    )?;
    service_group.add_ingress_rule(
        &mut stack,
        Peer::any_ipv4(),
        Port::tcp(config.task.container_port),
        None,
    )?;

    let service = FargateService::new(
        &mut stack,
        SERVICE_ID,
        FargateServiceProps {
            cluster: &cluster,
            task_definition: &task_definition,
            desired_count: config.desired_count,
            security_groups: vec![&service_group],
            subnets: vpc.private_subnet_ids(),
        },
    )?;

    if let Some(scaling) = &config.autoscaling {
        let task_count = ScalableTaskCount::new(
            &mut stack,
            &service,
            scaling.min_capacity,
            scaling.max_capacity,
        )?;
        task_count.scale_on_cpu_utilization(
            &mut stack,
            "CpuScaling",
            CpuScalingProps {
                target_utilization_percent: scaling.target_cpu_utilization,
                scale_in_cooldown_secs: scaling.scale_in_cooldown_secs,
                scale_out_cooldown_secs: scaling.scale_out_cooldown_secs,
            },
        )?;
    }

    let load_balancer = ApplicationLoadBalancer::new(
        &mut stack,
        LOAD_BALANCER_ID,
        ApplicationLoadBalancerProps {
            vpc: &vpc,
            internet_facing: true,
        },
    )?;
    let listener = load_balancer.add_listener(&mut stack, "Listener", 80, false)?;
    listener.add_targets(
        &mut stack,
        "Target",
        AddTargetsProps {
            port: 80,
            service: &service,
            health_check_path: "/".to_string(),
        },
    )?;
    listener.allow_default_port_from_any_ipv4(&mut stack, "Open to the world")?;
    stack.add_output(
        Output::new("LoadBalancerDNS", load_balancer.dns_name())
            .with_description("Public address of the service"),
    )?;

    if let Some(pipeline) = &config.pipeline {
        add_pipeline(&mut stack, pipeline, &repository, &cluster, &service)?;
    }

    stack
        .validate(&schemas::schema_map())
        .map_err(BuildError::Invalid)?;
    log::info!(
        "built stack {} with {} resources",
        stack.name,
        stack.resources().len()
    );
    Ok(stack)
}

/// Source -> Build -> Deploy pipeline rolling new images out to the service
fn add_pipeline(
    stack: &mut Stack,
    config: &PipelineConfig,
    repository: &Repository,
    cluster: &Cluster,
    service: &FargateService,
) -> Result<Pipeline, BuildError> {
    let bucket = ArtifactBucket::new(stack, &format!("{}/ArtifactsBucket", PIPELINE_ID))?;

    let project = PipelineProject::new(
        stack,
        BUILD_PROJECT_ID,
        PipelineProjectProps {
            artifact_bucket: &bucket,
            privileged: true,
            environment_variables: vec![
                ("REPOSITORY_URI".to_string(), repository.repository_uri()),
                ("CONTAINER_NAME".to_string(), Value::string(CONTAINER_NAME)),
            ],
            statements: vec![
                PolicyStatement::allow()
                    .with_actions(IMAGE_PUSH_ACTIONS)
                    .on_all_resources(),
            ],
        },
    )?;

    let source = Action::new(
        "GitHub_Source",
        ActionKind::GitHubSource {
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            oauth_token: secret_value(&config.token_secret_name),
            poll_for_source_changes: true,
        },
    )
    .with_output(SOURCE_ARTIFACT);
    let build = Action::new("CodeBuild", project.action_kind())
        .with_input(SOURCE_ARTIFACT)
        .with_output(BUILD_ARTIFACT);
    let deploy = Action::new(
        "DeployAction",
        ActionKind::EcsDeploy {
            cluster_name: cluster.cluster_name(),
            service_name: service.service_name(),
        },
    )
    .with_input(BUILD_ARTIFACT);

    Pipeline::new(
        stack,
        PIPELINE_ID,
        PipelineProps {
            artifact_bucket: &bucket,
            stages: vec![
                Stage::new("Source", vec![source]),
                Stage::new("Build", vec![build]),
                Stage::new("Deploy", vec![deploy]),
            ],
        },
    )
}
