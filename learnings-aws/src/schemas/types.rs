//! AWS-specific type definitions

use std::sync::LazyLock;

use learnings_core::resource::Value;
use learnings_core::schema::AttributeType;
use regex::Regex;

/// Valid AWS regions
pub const VALID_REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ca-central-1",
    "sa-east-1",
];

static REPOSITORY_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9]+(?:[._-][a-z0-9]+)*/)*[a-z0-9]+(?:[._-][a-z0-9]+)*$").ok()
});

static IMAGE_URI: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\d{12})\.dkr\.ecr\.([a-z0-9-]+)\.amazonaws\.com/([a-z0-9._/-]+)(?::[\w.-]+)?$")
        .ok()
});

/// CPU units accepted by Fargate, with the memory (MiB) each one allows
pub const FARGATE_SIZES: &[(u32, &[u32])] = &[
    (256, &[512, 1024, 2048]),
    (512, &[1024, 2048, 3072, 4096]),
    (1024, &[2048, 3072, 4096, 5120, 6144, 7168, 8192]),
    (
        2048,
        &[
            4096, 5120, 6144, 7168, 8192, 9216, 10240, 11264, 12288, 13312, 14336, 15360, 16384,
        ],
    ),
    (
        4096,
        &[
            8192, 9216, 10240, 11264, 12288, 13312, 14336, 15360, 16384, 17408, 18432, 19456,
            20480, 21504, 22528, 23552, 24576, 25600, 26624, 27648, 28672, 29696, 30720,
        ],
    ),
];

/// Whether Fargate accepts this CPU/memory combination
pub fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    FARGATE_SIZES
        .iter()
        .any(|(c, memories)| *c == cpu && memories.contains(&memory_mib))
}

pub fn is_valid_region(region: &str) -> bool {
    VALID_REGIONS.contains(&region)
}

pub fn is_valid_repository_name(name: &str) -> bool {
    (2..=256).contains(&name.len())
        && REPOSITORY_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(name))
}

/// Parts of a private ECR image URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUri {
    pub account_id: String,
    pub region: String,
    pub repository: String,
}

/// Parse `<account>.dkr.ecr.<region>.amazonaws.com/<repository>[:tag]`
pub fn parse_image_uri(uri: &str) -> Option<ImageUri> {
    let captures = IMAGE_URI.as_ref()?.captures(uri)?;
    Some(ImageUri {
        account_id: captures[1].to_string(),
        region: captures[2].to_string(),
        repository: captures[3].to_string(),
    })
}

fn string_value(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| "expected a string".to_string())
}

pub fn aws_region() -> AttributeType {
    AttributeType::custom("Region", AttributeType::String, |value| {
        let s = string_value(value)?;
        if is_valid_region(s) {
            Ok(())
        } else {
            Err(format!(
                "'{}' is not one of: {}",
                s,
                VALID_REGIONS.join(", ")
            ))
        }
    })
}

/// ECR repository name
pub fn repository_name() -> AttributeType {
    AttributeType::custom("RepositoryName", AttributeType::String, |value| {
        let s = string_value(value)?;
        if is_valid_repository_name(s) {
            Ok(())
        } else {
            Err(format!(
                "'{}' must be lowercase letters, digits and . _ - / separators",
                s
            ))
        }
    })
}

/// Container image reference (`Fn::GetAtt` of a repository or a pinned URI)
pub fn container_image() -> AttributeType {
    AttributeType::custom("ContainerImage", AttributeType::String, |value| {
        match string_value(value)? {
            s if s.is_empty() || s.contains(char::is_whitespace) => {
                Err(format!("'{}' is not an image reference", s))
            }
            _ => Ok(()),
        }
    })
}

/// Numeric string, as CloudFormation expects for task CPU and memory
pub fn numeric_string() -> AttributeType {
    AttributeType::custom("NumericString", AttributeType::String, |value| {
        let s = string_value(value)?;
        s.parse::<u32>()
            .map(|_| ())
            .map_err(|_| format!("'{}' is not a number", s))
    })
}

pub fn percentage() -> AttributeType {
    AttributeType::custom("Percentage", AttributeType::Int, |value| match value {
        Value::Int(n) if (0..=100).contains(n) => Ok(()),
        Value::Int(n) => Err(format!("{} is not between 0 and 100", n)),
        _ => Err("expected an integer".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_region() {
        let t = aws_region();
        assert!(t.validate(&Value::string("us-east-2")).is_ok());
        assert!(t.validate(&Value::string("us-east-9")).is_err());
    }

    #[test]
    fn repository_names() {
        assert!(is_valid_repository_name("my-react-learnings"));
        assert!(is_valid_repository_name("my-angular-learnings-repo"));
        assert!(is_valid_repository_name("team/app_1"));
        assert!(!is_valid_repository_name("My-Repo"));
        assert!(!is_valid_repository_name("-leading"));
        assert!(!is_valid_repository_name("a"));
    }

    #[test]
    fn image_uri_is_split_into_parts() {
        let uri = parse_image_uri(
            "285661835187.dkr.ecr.us-east-2.amazonaws.com/my-angular-learnings",
        )
        .unwrap();
        assert_eq!(uri.account_id, "285661835187");
        assert_eq!(uri.region, "us-east-2");
        assert_eq!(uri.repository, "my-angular-learnings");

        assert!(parse_image_uri("nginx:latest").is_none());
    }

    #[test]
    fn fargate_sizes() {
        assert!(is_valid_fargate_size(256, 512));
        assert!(is_valid_fargate_size(4096, 30720));
        assert!(!is_valid_fargate_size(256, 4096));
        assert!(!is_valid_fargate_size(300, 512));
    }

    #[test]
    fn intrinsic_images_are_accepted() {
        let t = container_image();
        assert!(
            t.validate(&Value::get_att("myreactlearningscdkecrapi", "RepositoryUri"))
                .is_ok()
        );
        assert!(t.validate(&Value::string("bad image")).is_err());
    }
}
