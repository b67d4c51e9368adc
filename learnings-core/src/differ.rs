//! Differ - Compare the declared stack with a previous template to generate a Plan
//!
//! The "current state" is whatever a previously synthesized or deployed
//! template holds for each logical id.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value as Json;

use crate::effect::Effect;
use crate::plan::{Plan, StackChange};
use crate::resource::{Resource, ResourceId, State, Value};
use crate::stack::Stack;
use crate::template::{self, TemplateError};

/// Pseudo attribute name used to report a removal policy change
pub const DELETION_POLICY: &str = "DeletionPolicy";

/// Pseudo attribute name used to report a change of explicit dependencies
pub const DEPENDS_ON: &str = "DependsOn";

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Logical id absent from the previous template
    Create(Resource),
    /// Same type, some properties differ
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Same logical id with a different resource type
    Replace { from: State, to: Resource },
    /// Identical to the previous template
    NoChange(ResourceId),
}

impl Diff {
    /// Whether deploying would touch the resource
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare a declared resource with its previous state
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    if current.id.resource_type != desired.id.resource_type {
        return Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
        };
    }

    let mut changed = find_changed_attributes(&desired.attributes, &current.attributes);
    if desired.removal_policy != current.removal_policy {
        changed.push(DELETION_POLICY.to_string());
    }
    let mut depends_on = desired.depends_on.clone();
    depends_on.sort();
    depends_on.dedup();
    if depends_on != current.depends_on {
        changed.push(DEPENDS_ON.to_string());
    }

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state, sorted by name
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    // Properties dropped from the declaration
    changed.extend(
        current
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned(),
    );

    changed.sort();
    changed
}

/// Compute Diff for every declared resource and generate a Plan
///
/// `current_states` is keyed by logical id. Logical ids present there but no
/// longer declared become deletions, ordered by logical id.
pub fn create_plan(desired: &[Resource], current_states: &HashMap<String, State>) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(resource.logical_id())
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace { from, to } => plan.add(Effect::Replace { from, to }),
            Diff::NoChange(_) => {}
        }
    }

    let mut removed: Vec<&State> = current_states
        .iter()
        .filter(|(logical_id, state)| {
            state.exists && !desired.iter().any(|r| r.logical_id() == logical_id.as_str())
        })
        .map(|(_, state)| state)
        .collect();
    removed.sort_by(|a, b| a.id.name.cmp(&b.id.name));
    for state in removed {
        plan.add(Effect::Delete(state.id.clone()));
    }

    plan
}

/// Plan a stack against the template it was last deployed or synthesized with
///
/// Besides resource effects, the `Description` and `Outputs` sections are
/// compared. Without a previous template everything is new.
pub fn create_stack_plan(stack: &Stack, previous: Option<&Json>) -> Result<Plan, TemplateError> {
    let current_states = match previous {
        Some(template) => template::parse(template)?,
        None => HashMap::new(),
    };
    let mut plan = create_plan(stack.resources(), &current_states);

    let previous_description = previous
        .and_then(|t| t.get("Description"))
        .and_then(Json::as_str);
    if stack.description.as_deref() != previous_description {
        plan.add_stack_change(StackChange::Description);
    }

    let desired_outputs = template::outputs_to_json(stack);
    let empty = serde_json::Map::new();
    let previous_outputs = previous
        .and_then(|t| t.get("Outputs"))
        .and_then(Json::as_object)
        .unwrap_or(&empty);

    let names: BTreeSet<&String> = desired_outputs.keys().chain(previous_outputs.keys()).collect();
    for name in names {
        let change = match (desired_outputs.get(name), previous_outputs.get(name)) {
            (Some(_), None) => StackChange::OutputAdded(name.clone()),
            (None, Some(_)) => StackChange::OutputRemoved(name.clone()),
            (Some(desired), Some(current)) if desired != current => {
                StackChange::OutputChanged(name.clone())
            }
            _ => continue,
        };
        plan.add_stack_change(change);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::resource::RemovalPolicy;
    use crate::stack::Output;

    fn table() -> Resource {
        Resource::new("AWS::DynamoDB::Table", "Messages")
            .with_attribute("BillingMode", "PAY_PER_REQUEST")
    }

    #[test]
    fn diff_create_when_not_exists() {
        let current = State::not_found(ResourceId::new("AWS::DynamoDB::Table", "Messages"));
        assert!(matches!(diff(&table(), &current), Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = table();
        let current = State::from(&desired);
        let result = diff(&desired, &current);
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let desired = table().with_attribute("TableClass", "STANDARD");
        let mut attrs = HashMap::new();
        attrs.insert("BillingMode".to_string(), Value::string("PROVISIONED"));
        attrs.insert("SSESpecification".to_string(), Value::map([("SSEEnabled", Value::Bool(true))]));
        let current = State::existing(desired.id.clone(), attrs);

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => {
                assert_eq!(
                    changed_attributes,
                    vec!["BillingMode", "SSESpecification", "TableClass"]
                );
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_reports_removal_policy_change() {
        let desired = table().with_removal_policy(RemovalPolicy::Destroy);
        let current = State::from(&table()).with_removal_policy(Some(RemovalPolicy::Retain));

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec![DELETION_POLICY]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_when_type_changes() {
        let desired = table();
        let current = State::existing(ResourceId::new("AWS::S3::Bucket", "Messages"), HashMap::new());
        assert!(matches!(diff(&desired, &current), Diff::Replace { .. }));
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("AWS::ECR::Repository", "Repo"),
            table().with_attribute("TableClass", "STANDARD"),
        ];

        let mut current_states = HashMap::new();
        current_states.insert("Messages".to_string(), State::from(&table()));
        current_states.insert(
            "OldBucket".to_string(),
            State::existing(ResourceId::new("AWS::S3::Bucket", "OldBucket"), HashMap::new()),
        );

        let plan = create_plan(&resources, &current_states);

        assert_eq!(plan.effects().len(), 3);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
        assert!(matches!(plan.effects()[2], Effect::Delete(ref id) if id.name == "OldBucket"));
    }

    #[test]
    fn diff_reports_depends_on_change() {
        let desired = table().with_dependency("Listener");
        let current = State::from(&table());

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec![DEPENDS_ON]),
            other => panic!("Expected Update, got {:?}", other),
        }

        let current = State::from(&desired);
        assert!(!diff(&desired, &current).is_change());
    }

    fn stack_with_output() -> Stack {
        let mut stack = Stack::new("CdkStack").with_description("Messages stack");
        stack.add(table()).unwrap();
        stack
            .add_output(Output::new("TableName", Value::ref_to("Messages")))
            .unwrap();
        stack
    }

    #[test]
    fn stack_plan_is_empty_against_own_template() {
        let stack = stack_with_output();
        let previous = template::synthesize(&stack);
        assert!(create_stack_plan(&stack, Some(&previous)).unwrap().is_empty());
    }

    #[test]
    fn stack_plan_reports_output_changes() {
        let stack = stack_with_output();
        let mut previous = template::synthesize(&stack);
        previous["Outputs"]["TableName"]["Value"] = json!({ "Ref": "Other" });
        previous["Outputs"]["Stale"] = json!({ "Value": "x" });

        let plan = create_stack_plan(&stack, Some(&previous)).unwrap();
        assert!(plan.effects().is_empty());
        assert_eq!(
            plan.stack_changes(),
            &[
                StackChange::OutputRemoved("Stale".to_string()),
                StackChange::OutputChanged("TableName".to_string()),
            ]
        );

        if let Some(outputs) = previous.as_object_mut() {
            outputs.remove("Outputs");
        }
        let plan = create_stack_plan(&stack, Some(&previous)).unwrap();
        assert_eq!(
            plan.stack_changes(),
            &[StackChange::OutputAdded("TableName".to_string())]
        );
    }

    #[test]
    fn stack_plan_reports_description_change() {
        let stack = stack_with_output();
        let mut previous = template::synthesize(&stack);
        previous["Description"] = json!("older description");

        let plan = create_stack_plan(&stack, Some(&previous)).unwrap();
        assert_eq!(plan.stack_changes(), &[StackChange::Description]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn stack_plan_reports_dropped_depends_on() {
        let mut stack = stack_with_output();
        stack
            .add(Resource::new("AWS::ECS::Service", "Service").with_dependency("Messages"))
            .unwrap();
        let mut previous = template::synthesize(&stack);
        if let Some(service) = previous["Resources"]["Service"].as_object_mut() {
            service.remove("DependsOn");
        }

        let plan = create_stack_plan(&stack, Some(&previous)).unwrap();
        match plan.effects() {
            [Effect::Update {
                id,
                changed_attributes,
                ..
            }] => {
                assert_eq!(id.name, "Service");
                assert_eq!(changed_attributes, &vec![DEPENDS_ON.to_string()]);
            }
            other => panic!("Expected one Update, got {:?}", other),
        }
    }

    #[test]
    fn stack_plan_without_previous_creates_everything() {
        let plan = create_stack_plan(&stack_with_output(), None).unwrap();
        let summary = plan.summary();
        assert_eq!(summary.create, 1);
        assert_eq!(
            plan.stack_changes(),
            &[
                StackChange::Description,
                StackChange::OutputAdded("TableName".to_string()),
            ]
        );
    }
}
