//! Plan - What a deployment would change
//!
//! Effects are listed in declaration order, followed by deletions. Changes
//! to template sections outside `Resources` are kept alongside. Building a
//! Plan never touches the provider.

use std::collections::BTreeMap;

use crate::effect::Effect;

/// Change to a stack-level template section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackChange {
    Description,
    OutputAdded(String),
    OutputChanged(String),
    OutputRemoved(String),
}

impl StackChange {
    pub fn symbol(&self) -> &'static str {
        match self {
            StackChange::OutputAdded(_) => "+",
            StackChange::Description | StackChange::OutputChanged(_) => "~",
            StackChange::OutputRemoved(_) => "-",
        }
    }
}

impl std::fmt::Display for StackChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackChange::Description => write!(f, "{} Description", self.symbol()),
            StackChange::OutputAdded(name)
            | StackChange::OutputChanged(name)
            | StackChange::OutputRemoved(name) => write!(f, "{} Output {}", self.symbol(), name),
        }
    }
}

/// Ordered Effects of one deployment
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
    stack_changes: Vec<StackChange>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn add_stack_change(&mut self, change: StackChange) {
        self.stack_changes.push(change);
    }

    pub fn stack_changes(&self) -> &[StackChange] {
        &self.stack_changes
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.stack_changes.is_empty()
    }

    pub fn has_destructive_changes(&self) -> bool {
        self.effects.iter().any(Effect::is_destructive)
    }

    /// Count effects by kind
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            stack: self.stack_changes.len(),
            ..PlanSummary::default()
        };
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete(_) => summary.delete += 1,
            }
        }
        summary
    }

    /// Group effect indices by the top-level construct that declared them
    ///
    /// Resources without a construct path (and deletions) are grouped under
    /// their own logical id.
    pub fn group_by_construct(&self) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, effect) in self.effects.iter().enumerate() {
            let construct = effect
                .target()
                .and_then(|r| r.path.as_deref())
                .and_then(|p| p.split('/').next())
                .map(str::to_string)
                .unwrap_or_else(|| effect.resource_id().name.clone());
            groups.entry(construct).or_default().push(idx);
        }
        groups
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    /// Description and Outputs changes
    pub stack: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )?;
        if self.stack > 0 {
            write!(f, ", {} stack-level", self.stack)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceId};

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert!(!plan.has_destructive_changes());
    }

    #[test]
    fn plan_summary() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("AWS::EC2::Subnet", "a")));
        plan.add(Effect::Create(Resource::new("AWS::EC2::Subnet", "b")));
        plan.add(Effect::Delete(ResourceId::new("AWS::EC2::Subnet", "c")));

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.delete, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 2 to create, 0 to update, 0 to replace, 1 to delete"
        );
        assert!(plan.has_destructive_changes());
    }

    #[test]
    fn stack_changes_make_plan_non_empty() {
        let mut plan = Plan::new();
        plan.add_stack_change(StackChange::OutputRemoved("LoadBalancerDNS".to_string()));
        plan.add_stack_change(StackChange::Description);

        assert!(!plan.is_empty());
        assert!(!plan.has_destructive_changes());
        assert_eq!(
            plan.summary().to_string(),
            "Plan: 0 to create, 0 to update, 0 to replace, 0 to delete, 2 stack-level"
        );
        assert_eq!(plan.stack_changes()[0].to_string(), "- Output LoadBalancerDNS");
        assert_eq!(plan.stack_changes()[1].to_string(), "~ Description");
    }

    #[test]
    fn group_by_construct_uses_first_path_segment() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::at_path(
            "AWS::EC2::VPC",
            "my-react-learnings-cdk-vpc/Resource",
        )));
        plan.add(Effect::Create(Resource::at_path(
            "AWS::EC2::Subnet",
            "my-react-learnings-cdk-vpc/PublicSubnet1/Subnet",
        )));
        plan.add(Effect::Create(Resource::new("AWS::DynamoDB::Table", "Messages")));

        let groups = plan.group_by_construct();
        assert_eq!(groups["my-react-learnings-cdk-vpc"], vec![0, 1]);
        assert_eq!(groups["Messages"], vec![2]);
    }
}
