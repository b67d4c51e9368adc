//! Stack configuration
//!
//! Every field has a default, so an empty TOML file describes the
//! container-only stack. Adding a `[pipeline]` table adds the delivery pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use learnings_core::schema::parse_cidr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schemas::types as aws_types;

/// Image the pipeline variant has always deployed
pub const PINNED_IMAGE_URI: &str =
    "285661835187.dkr.ecr.us-east-2.amazonaws.com/my-angular-learnings";

/// Repository name of the pipeline variant
pub const PIPELINE_REPOSITORY_NAME: &str = "my-angular-learnings-repo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Where the task's container image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ImageSource {
    /// URI of the repository declared in the stack (`Fn::GetAtt RepositoryUri`)
    Repository,
    /// Fixed image reference, independent of the declared repository
    Pinned { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VpcConfig {
    pub cidr: String,
    pub max_azs: usize,
}

impl Default for VpcConfig {
    fn default() -> Self {
        Self {
            cidr: "10.1.0.0/16".to_string(),
            max_azs: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    pub memory_mib: u32,
    pub cpu: u32,
    pub container_port: u16,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            memory_mib: 512,
            cpu: 256,
            container_port: 80,
        }
    }
}

/// Target-tracking scaling of the service's task count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoScalingConfig {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub target_cpu_utilization: u32,
    pub scale_in_cooldown_secs: u32,
    pub scale_out_cooldown_secs: u32,
}

impl Default for AutoScalingConfig {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 2,
            target_cpu_utilization: 90,
            scale_in_cooldown_secs: 60,
            scale_out_cooldown_secs: 60,
        }
    }
}

/// Source repository and credential of the delivery pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Secrets Manager secret holding the GitHub OAuth token
    pub token_secret_name: String,
}

fn default_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub stack_name: String,
    pub region: Option<String>,
    pub app_id: String,
    pub repository_name: String,
    pub image: ImageSource,
    pub desired_count: u32,
    pub vpc: VpcConfig,
    pub task: TaskConfig,
    pub autoscaling: Option<AutoScalingConfig>,
    pub pipeline: Option<PipelineConfig>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "CdkStack".to_string(),
            region: None,
            app_id: "my-react-learnings".to_string(),
            repository_name: "my-react-learnings".to_string(),
            image: ImageSource::Repository,
            desired_count: 1,
            vpc: VpcConfig::default(),
            task: TaskConfig::default(),
            autoscaling: None,
            pipeline: None,
        }
    }
}

impl StackConfig {
    /// The stack without a delivery pipeline
    pub fn container_only() -> Self {
        Self::default()
    }

    /// The stack with a delivery pipeline, deploying the pinned image
    pub fn with_pipeline(pipeline: PipelineConfig) -> Self {
        Self {
            pipeline: Some(pipeline),
            ..Self::default()
        }
        .pipeline_variant()
    }

    /// Apply the pipeline variant's repository and image to this configuration
    ///
    /// Fails when there is no `[pipeline]` table to apply it to.
    pub fn into_pipeline_variant(self) -> Result<Self, ConfigError> {
        if self.pipeline.is_none() {
            return Err(ConfigError::invalid(
                "pipeline",
                "the pipeline variant needs a [pipeline] table with owner, repo and token_secret_name",
            ));
        }
        Ok(self.pipeline_variant())
    }

    fn pipeline_variant(self) -> Self {
        Self {
            repository_name: PIPELINE_REPOSITORY_NAME.to_string(),
            image: ImageSource::Pinned {
                uri: PINNED_IMAGE_URI.to_string(),
            },
            ..self
        }
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the file when it exists, otherwise use the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_stack_name(&self.stack_name) {
            return Err(ConfigError::invalid(
                "stack_name",
                format!(
                    "'{}' must start with a letter and contain only letters, digits and hyphens (max 128)",
                    self.stack_name
                ),
            ));
        }
        if let Some(region) = &self.region
            && !aws_types::is_valid_region(region)
        {
            return Err(ConfigError::invalid(
                "region",
                format!("unknown region '{}'", region),
            ));
        }
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::invalid("app_id", "must not be empty"));
        }
        if !aws_types::is_valid_repository_name(&self.repository_name) {
            return Err(ConfigError::invalid(
                "repository_name",
                format!("'{}' is not a valid ECR repository name", self.repository_name),
            ));
        }
        if let ImageSource::Pinned { uri } = &self.image
            && (uri.is_empty() || uri.contains(char::is_whitespace))
        {
            return Err(ConfigError::invalid(
                "image.uri",
                format!("'{}' is not an image reference", uri),
            ));
        }

        self.validate_vpc()?;
        self.validate_task()?;

        if let Some(scaling) = &self.autoscaling {
            if scaling.max_capacity == 0 || scaling.min_capacity > scaling.max_capacity {
                return Err(ConfigError::invalid(
                    "autoscaling",
                    format!(
                        "capacity range {}..{} is empty",
                        scaling.min_capacity, scaling.max_capacity
                    ),
                ));
            }
            if !(1..=100).contains(&scaling.target_cpu_utilization) {
                return Err(ConfigError::invalid(
                    "autoscaling.target_cpu_utilization",
                    "must be between 1 and 100",
                ));
            }
        }

        if let Some(pipeline) = &self.pipeline {
            for (field, value) in [
                ("pipeline.owner", &pipeline.owner),
                ("pipeline.repo", &pipeline.repo),
                ("pipeline.branch", &pipeline.branch),
                ("pipeline.token_secret_name", &pipeline.token_secret_name),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::invalid(field, "must not be empty"));
                }
            }
        }
        Ok(())
    }

    fn validate_vpc(&self) -> Result<(), ConfigError> {
        let (_, prefix) =
            parse_cidr(&self.vpc.cidr).map_err(|e| ConfigError::invalid("vpc.cidr", e))?;
        if !(16..=28).contains(&prefix) {
            return Err(ConfigError::invalid(
                "vpc.cidr",
                format!("prefix /{} must be between /16 and /28", prefix),
            ));
        }
        if !(1..=6).contains(&self.vpc.max_azs) {
            return Err(ConfigError::invalid(
                "vpc.max_azs",
                format!("{} must be between 1 and 6", self.vpc.max_azs),
            ));
        }
        Ok(())
    }

    fn validate_task(&self) -> Result<(), ConfigError> {
        if !aws_types::is_valid_fargate_size(self.task.cpu, self.task.memory_mib) {
            return Err(ConfigError::invalid(
                "task",
                format!(
                    "Fargate does not support {} CPU units with {} MiB",
                    self.task.cpu, self.task.memory_mib
                ),
            ));
        }
        if self.task.container_port == 0 {
            return Err(ConfigError::invalid(
                "task.container_port",
                "must be between 1 and 65535",
            ));
        }
        Ok(())
    }
}

fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && name.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pipeline() -> PipelineConfig {
        PipelineConfig {
            owner: "octocat".to_string(),
            repo: "my-angular-learnings".to_string(),
            branch: "master".to_string(),
            token_secret_name: "github-token".to_string(),
        }
    }

    #[test]
    fn empty_file_is_the_container_only_stack() {
        let config = StackConfig::from_toml_str("", "test").unwrap();
        assert_eq!(config, StackConfig::container_only());
        assert_eq!(config.stack_name, "CdkStack");
        assert_eq!(config.vpc.cidr, "10.1.0.0/16");
        assert_eq!(config.vpc.max_azs, 3);
        assert_eq!(config.task.memory_mib, 512);
        assert_eq!(config.task.cpu, 256);
        assert_eq!(config.image, ImageSource::Repository);
        assert!(config.autoscaling.is_none());
        assert!(!config.has_pipeline());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_file() {
        let config = StackConfig::from_toml_str(
            r#"
stack_name = "Learnings"
region = "us-east-2"
image = { source = "pinned", uri = "nginx:1.27" }
desired_count = 2

[vpc]
max_azs = 2

[autoscaling]
max_capacity = 4

[pipeline]
owner = "octocat"
repo = "app"
token_secret_name = "github-token"
"#,
            "test",
        )
        .unwrap();

        assert_eq!(config.stack_name, "Learnings");
        assert_eq!(config.region.as_deref(), Some("us-east-2"));
        assert_eq!(
            config.image,
            ImageSource::Pinned {
                uri: "nginx:1.27".to_string()
            }
        );
        assert_eq!(config.vpc.cidr, "10.1.0.0/16");
        assert_eq!(config.vpc.max_azs, 2);
        let scaling = config.autoscaling.as_ref().unwrap();
        assert_eq!(scaling.min_capacity, 1);
        assert_eq!(scaling.max_capacity, 4);
        assert_eq!(scaling.target_cpu_utilization, 90);
        assert_eq!(config.pipeline.as_ref().unwrap().branch, "master");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = StackConfig::from_toml_str("stak_name = \"typo\"", "test");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn pipeline_preset_pins_the_image() {
        let config = StackConfig::with_pipeline(pipeline());
        assert_eq!(config.repository_name, PIPELINE_REPOSITORY_NAME);
        assert_eq!(
            config.image,
            ImageSource::Pinned {
                uri: PINNED_IMAGE_URI.to_string()
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pipeline_variant_needs_pipeline_table() {
        let result = StackConfig::default().into_pipeline_variant();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let config = StackConfig {
            stack_name: "Other".to_string(),
            pipeline: Some(pipeline()),
            ..StackConfig::default()
        }
        .into_pipeline_variant()
        .unwrap();
        assert_eq!(config.stack_name, "Other");
        assert_eq!(config.repository_name, PIPELINE_REPOSITORY_NAME);
    }

    #[test]
    fn invalid_values_name_the_field() {
        let cases: Vec<(&str, StackConfig)> = vec![
            (
                "stack_name",
                StackConfig {
                    stack_name: "1stack".to_string(),
                    ..StackConfig::default()
                },
            ),
            (
                "region",
                StackConfig {
                    region: Some("moon-1".to_string()),
                    ..StackConfig::default()
                },
            ),
            (
                "vpc.cidr",
                StackConfig {
                    vpc: VpcConfig {
                        cidr: "10.1.0.0/8".to_string(),
                        max_azs: 3,
                    },
                    ..StackConfig::default()
                },
            ),
            (
                "vpc.max_azs",
                StackConfig {
                    vpc: VpcConfig {
                        max_azs: 0,
                        ..VpcConfig::default()
                    },
                    ..StackConfig::default()
                },
            ),
            (
                "task",
                StackConfig {
                    task: TaskConfig {
                        memory_mib: 4096,
                        ..TaskConfig::default()
                    },
                    ..StackConfig::default()
                },
            ),
            (
                "autoscaling",
                StackConfig {
                    autoscaling: Some(AutoScalingConfig {
                        min_capacity: 3,
                        max_capacity: 2,
                        ..AutoScalingConfig::default()
                    }),
                    ..StackConfig::default()
                },
            ),
            (
                "pipeline.owner",
                StackConfig::with_pipeline(PipelineConfig {
                    owner: " ".to_string(),
                    ..pipeline()
                }),
            ),
            (
                "repository_name",
                StackConfig {
                    repository_name: "Bad Name".to_string(),
                    ..StackConfig::default()
                },
            ),
        ];

        for (expected, config) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stack_name = \"FromFile\"").unwrap();

        let config = StackConfig::load(file.path()).unwrap();
        assert_eq!(config.stack_name, "FromFile");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learnings.toml");

        assert_eq!(
            StackConfig::load_or_default(&path).unwrap(),
            StackConfig::default()
        );
        assert!(matches!(
            StackConfig::load(&path),
            Err(ConfigError::Read { .. })
        ));
    }
}
