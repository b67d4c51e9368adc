//! Delivery pipeline constructs: artifact bucket, build project and pipeline

use std::collections::HashSet;

use learnings_core::resource::{RemovalPolicy, Resource, Value, logical_id};
use learnings_core::stack::Stack;

use super::child;
use super::iam::{PolicyStatement, Role, stack_arn};
use crate::error::BuildError;

pub const BUCKET_TYPE: &str = "AWS::S3::Bucket";
pub const PROJECT_TYPE: &str = "AWS::CodeBuild::Project";
pub const PIPELINE_TYPE: &str = "AWS::CodePipeline::Pipeline";

const BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";

/// Dynamic reference resolving a Secrets Manager secret at deploy time
pub fn secret_value(secret_name: &str) -> String {
    format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", secret_name)
}

/// Bucket holding the artifacts passed between stages
#[derive(Debug, Clone)]
pub struct ArtifactBucket {
    logical_id: String,
}

impl ArtifactBucket {
    pub fn new(stack: &mut Stack, id: &str) -> Result<Self, BuildError> {
        let resource = Resource::at_path(BUCKET_TYPE, child(id, "Resource"))
            .with_attribute(
                "BucketEncryption",
                Value::map([(
                    "ServerSideEncryptionConfiguration",
                    Value::List(vec![Value::map([(
                        "ServerSideEncryptionByDefault",
                        Value::map([("SSEAlgorithm", Value::string("AES256"))]),
                    )])]),
                )]),
            )
            .with_attribute(
                "PublicAccessBlockConfiguration",
                Value::map([
                    ("BlockPublicAcls", Value::Bool(true)),
                    ("BlockPublicPolicy", Value::Bool(true)),
                    ("IgnorePublicAcls", Value::Bool(true)),
                    ("RestrictPublicBuckets", Value::Bool(true)),
                ]),
            )
            .with_removal_policy(RemovalPolicy::Retain);
        let logical_id = stack.add(resource)?;
        Ok(Self { logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn bucket_name(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn bucket_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// Read and write access to the bucket and its objects
    pub fn read_write_statement(&self) -> PolicyStatement {
        PolicyStatement::allow()
            .with_actions(&[
                "s3:GetObject*",
                "s3:GetBucket*",
                "s3:List*",
                "s3:DeleteObject*",
                "s3:PutObject*",
                "s3:Abort*",
            ])
            .with_resource(self.bucket_arn())
            .with_resource(Value::join("", vec![self.bucket_arn(), Value::string("/*")]))
    }
}

/// What a pipeline action does
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Poll a GitHub branch with an OAuth token
    GitHubSource {
        owner: String,
        repo: String,
        branch: String,
        oauth_token: String,
        poll_for_source_changes: bool,
    },
    /// Run a CodeBuild project
    CodeBuild { project_name: Value, project_arn: Value },
    /// Roll an image definitions artifact out to an ECS service
    EcsDeploy { cluster_name: Value, service_name: Value },
}

impl ActionKind {
    /// `(Category, Owner, Provider, Version)`
    pub fn type_id(&self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            ActionKind::GitHubSource { .. } => ("Source", "ThirdParty", "GitHub", "1"),
            ActionKind::CodeBuild { .. } => ("Build", "AWS", "CodeBuild", "1"),
            ActionKind::EcsDeploy { .. } => ("Deploy", "AWS", "ECS", "1"),
        }
    }

    fn configuration(&self) -> Value {
        match self {
            ActionKind::GitHubSource {
                owner,
                repo,
                branch,
                oauth_token,
                poll_for_source_changes,
            } => Value::map([
                ("Owner", Value::string(owner)),
                ("Repo", Value::string(repo)),
                ("Branch", Value::string(branch)),
                ("OAuthToken", Value::string(oauth_token)),
                ("PollForSourceChanges", Value::Bool(*poll_for_source_changes)),
            ]),
            ActionKind::CodeBuild { project_name, .. } => {
                Value::map([("ProjectName", project_name.clone())])
            }
            ActionKind::EcsDeploy {
                cluster_name,
                service_name,
            } => Value::map([
                ("ClusterName", cluster_name.clone()),
                ("ServiceName", service_name.clone()),
            ]),
        }
    }

    /// Permissions the pipeline role needs to run this action
    fn statements(&self) -> Vec<PolicyStatement> {
        match self {
            ActionKind::GitHubSource { .. } => Vec::new(),
            ActionKind::CodeBuild { project_arn, .. } => vec![
                PolicyStatement::allow()
                    .with_actions(&[
                        "codebuild:BatchGetBuilds",
                        "codebuild:StartBuild",
                        "codebuild:StopBuild",
                    ])
                    .with_resource(project_arn.clone()),
            ],
            ActionKind::EcsDeploy { .. } => vec![
                PolicyStatement::allow()
                    .with_actions(&[
                        "ecs:DescribeServices",
                        "ecs:DescribeTaskDefinition",
                        "ecs:DescribeTasks",
                        "ecs:ListTasks",
                        "ecs:RegisterTaskDefinition",
                        "ecs:TagResource",
                        "ecs:UpdateService",
                    ])
                    .on_all_resources(),
                PolicyStatement::allow()
                    .with_actions(&["iam:PassRole"])
                    .on_all_resources()
                    .with_condition(Value::map([(
                        "StringEqualsIfExists",
                        Value::map([(
                            "iam:PassedToService",
                            Value::strings(["ecs-tasks.amazonaws.com"]),
                        )]),
                    )])),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    fn to_value(&self) -> Value {
        let (category, owner, provider, version) = self.kind.type_id();
        let artifacts = |names: &[String]| {
            Value::List(
                names
                    .iter()
                    .map(|name| Value::map([("Name", Value::string(name))]))
                    .collect(),
            )
        };

        let mut fields = vec![
            ("Name", Value::string(&self.name)),
            (
                "ActionTypeId",
                Value::map([
                    ("Category", Value::string(category)),
                    ("Owner", Value::string(owner)),
                    ("Provider", Value::string(provider)),
                    ("Version", Value::string(version)),
                ]),
            ),
            ("Configuration", self.kind.configuration()),
            ("RunOrder", Value::Int(1)),
        ];
        if !self.inputs.is_empty() {
            fields.push(("InputArtifacts", artifacts(&self.inputs)));
        }
        if !self.outputs.is_empty() {
            fields.push(("OutputArtifacts", artifacts(&self.outputs)));
        }
        Value::map(fields)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }

    fn to_value(&self) -> Value {
        Value::map([
            ("Name", Value::string(&self.name)),
            (
                "Actions",
                Value::List(self.actions.iter().map(Action::to_value).collect()),
            ),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct PipelineProjectProps<'a> {
    pub artifact_bucket: &'a ArtifactBucket,
    /// Needed to run the Docker daemon inside the build
    pub privileged: bool,
    pub environment_variables: Vec<(String, Value)>,
    /// Extra permissions of the build, e.g. pushing images
    pub statements: Vec<PolicyStatement>,
}

/// A CodeBuild project whose source and artifacts come from a pipeline
#[derive(Debug, Clone)]
pub struct PipelineProject {
    logical_id: String,
    pub role: Role,
}

impl PipelineProject {
    pub fn new(stack: &mut Stack, id: &str, props: PipelineProjectProps) -> Result<Self, BuildError> {
        let role = Role::new(stack, &child(id, "Role"), "codebuild.amazonaws.com")?;

        let variables = props
            .environment_variables
            .into_iter()
            .map(|(name, value)| {
                Value::map([
                    ("Name", Value::string(name)),
                    ("Type", Value::string("PLAINTEXT")),
                    ("Value", value),
                ])
            })
            .collect();
        let resource = Resource::at_path(PROJECT_TYPE, child(id, "Resource"))
            .with_attribute("ServiceRole", role.arn())
            .with_attribute("Source", Value::map([("Type", Value::string("CODEPIPELINE"))]))
            .with_attribute(
                "Artifacts",
                Value::map([("Type", Value::string("CODEPIPELINE"))]),
            )
            .with_attribute(
                "Environment",
                Value::map([
                    ("Type", Value::string("LINUX_CONTAINER")),
                    ("ComputeType", Value::string("BUILD_GENERAL1_SMALL")),
                    ("Image", Value::string(BUILD_IMAGE)),
                    ("ImagePullCredentialsType", Value::string("CODEBUILD")),
                    ("PrivilegedMode", Value::Bool(props.privileged)),
                    ("EnvironmentVariables", Value::List(variables)),
                ]),
            );
        let logical_id = stack.add(resource)?;

        let log_group = |suffix: &str| {
            stack_arn(
                "logs",
                vec![
                    Value::string("log-group:/aws/codebuild/"),
                    Value::ref_to(&logical_id),
                    Value::string(suffix),
                ],
            )
        };
        let mut statements = vec![
            PolicyStatement::allow()
                .with_actions(&["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
                .with_resource(log_group(""))
                .with_resource(log_group(":*")),
            props.artifact_bucket.read_write_statement(),
        ];
        statements.extend(props.statements);
        role.attach_policy(stack, &statements)?;

        Ok(Self { logical_id, role })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn project_name(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn project_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    pub fn action_kind(&self) -> ActionKind {
        ActionKind::CodeBuild {
            project_name: self.project_name(),
            project_arn: self.project_arn(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineProps<'a> {
    pub artifact_bucket: &'a ArtifactBucket,
    pub stages: Vec<Stage>,
}

/// A declared pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    logical_id: String,
    pub role: Role,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Declare a pipeline running its stages in order
    ///
    /// Every input artifact must be the output of an action in an earlier stage.
    pub fn new(stack: &mut Stack, id: &str, props: PipelineProps) -> Result<Self, BuildError> {
        check_artifacts(&props.stages)?;

        let role = Role::new(stack, &child(id, "Role"), "codepipeline.amazonaws.com")?;
        let mut statements = vec![props.artifact_bucket.read_write_statement()];
        for action in props.stages.iter().flat_map(|s| &s.actions) {
            statements.extend(action.kind.statements());
        }
        let policy = role.attach_policy(stack, &statements)?;

        let mut resource = Resource::at_path(PIPELINE_TYPE, child(id, "Resource"))
            .with_attribute("RoleArn", role.arn())
            .with_attribute(
                "ArtifactStore",
                Value::map([
                    ("Type", Value::string("S3")),
                    ("Location", props.artifact_bucket.bucket_name()),
                ]),
            )
            .with_attribute(
                "Stages",
                Value::List(props.stages.iter().map(Stage::to_value).collect()),
            )
            .with_attribute("RestartExecutionOnUpdate", true)
            .with_dependency(role.logical_id());
        if let Some(policy) = policy {
            resource = resource.with_dependency(policy);
        }
        let logical_id = stack.add(resource)?;
        log::debug!(
            "{}: stages {}",
            logical_id,
            props
                .stages
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(Self {
            logical_id,
            role,
            stages: props.stages,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

fn check_artifacts(stages: &[Stage]) -> Result<(), BuildError> {
    let mut produced: HashSet<&str> = HashSet::new();
    for stage in stages {
        for action in &stage.actions {
            if let Some(missing) = action
                .inputs
                .iter()
                .find(|input| !produced.contains(input.as_str()))
            {
                return Err(BuildError::UnknownArtifact {
                    action: format!("{}/{}", stage.name, action.name),
                    artifact: missing.clone(),
                });
            }
        }
        for action in &stage.actions {
            produced.extend(action.outputs.iter().map(String::as_str));
        }
    }
    Ok(())
}

/// Logical id the default policy of a construct's role gets
pub fn role_policy_id(role_path: &str) -> String {
    logical_id(&child(&child(role_path, "DefaultPolicy"), "Resource"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Action {
        Action::new(
            "GitHub_Source",
            ActionKind::GitHubSource {
                owner: "octocat".to_string(),
                repo: "app".to_string(),
                branch: "master".to_string(),
                oauth_token: secret_value("github-token"),
                poll_for_source_changes: true,
            },
        )
        .with_output("SourceOutput")
    }

    #[test]
    fn secret_value_is_a_dynamic_reference() {
        assert_eq!(
            secret_value("github-token"),
            "{{resolve:secretsmanager:github-token:SecretString:::}}"
        );
    }

    #[test]
    fn inputs_must_come_from_earlier_stages() {
        let stages = vec![
            Stage::new("Source", vec![source()]),
            Stage::new(
                "Deploy",
                vec![
                    Action::new(
                        "Deploy",
                        ActionKind::EcsDeploy {
                            cluster_name: Value::ref_to("Cluster"),
                            service_name: Value::get_att("Service", "Name"),
                        },
                    )
                    .with_input("BuildOutput"),
                ],
            ),
        ];
        match check_artifacts(&stages) {
            Err(BuildError::UnknownArtifact { action, artifact }) => {
                assert_eq!(action, "Deploy/Deploy");
                assert_eq!(artifact, "BuildOutput");
            }
            other => panic!("expected unknown artifact, got {:?}", other),
        }
    }

    #[test]
    fn pipeline_role_gets_action_permissions() {
        let mut stack = Stack::new("CdkStack");
        let bucket = ArtifactBucket::new(&mut stack, "Pipeline/ArtifactsBucket").unwrap();
        let project = PipelineProject::new(
            &mut stack,
            "Build",
            PipelineProjectProps {
                artifact_bucket: &bucket,
                privileged: true,
                environment_variables: vec![("IMAGE".to_string(), Value::string("x"))],
                statements: vec![],
            },
        )
        .unwrap();
        let pipeline = Pipeline::new(
            &mut stack,
            "Pipeline",
            PipelineProps {
                artifact_bucket: &bucket,
                stages: vec![
                    Stage::new("Source", vec![source()]),
                    Stage::new(
                        "Build",
                        vec![
                            Action::new("Build", project.action_kind())
                                .with_input("SourceOutput")
                                .with_output("BuildOutput"),
                        ],
                    ),
                ],
            },
        )
        .unwrap();

        assert_eq!(pipeline.logical_id(), "Pipeline");
        assert_eq!(pipeline.stages().len(), 2);
        let policy = stack.find(&role_policy_id("Pipeline/Role")).unwrap();
        let statements = policy
            .attribute("PolicyDocument")
            .and_then(|d| d.get("Statement"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[1].get("Resource"),
            Some(&Value::List(vec![Value::get_att("Build", "Arn")]))
        );

        let resource = stack.find("Pipeline").unwrap();
        assert!(resource.depends_on.contains(&"PipelineRoleDefaultPolicy".to_string()));
        assert_eq!(
            stack.find("PipelineArtifactsBucket").unwrap().removal_policy,
            Some(RemovalPolicy::Retain)
        );
    }
}
