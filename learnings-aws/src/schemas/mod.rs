//! AWS resource schema definitions

pub mod autoscaling;
pub mod codebuild;
pub mod codepipeline;
pub mod dynamodb;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod s3;
pub mod types;

use std::collections::HashMap;

use learnings_core::schema::ResourceSchema;

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(dynamodb::schemas());
    schemas.extend(ec2::schemas());
    schemas.extend(ecr::schemas());
    schemas.extend(ecs::schemas());
    schemas.extend(iam::schemas());
    schemas.extend(elbv2::schemas());
    schemas.extend(autoscaling::schemas());
    schemas.extend(s3::schemas());
    schemas.extend(codebuild::schemas());
    schemas.extend(codepipeline::schemas());
    schemas
}

/// All AWS schemas keyed by CloudFormation resource type
pub fn schema_map() -> HashMap<String, ResourceSchema> {
    all_schemas()
        .into_iter()
        .map(|s| (s.resource_type.clone(), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_types_are_unique() {
        assert_eq!(schema_map().len(), all_schemas().len());
    }
}
