//! Template - Synthesize a stack into a CloudFormation template and read one back
//!
//! Synthesis is pure: the same stack always yields the same JSON document
//! (object keys are emitted in sorted order).

use std::collections::HashMap;

use serde_json::{Map, Value as Json, json};
use thiserror::Error;

use crate::resource::{PseudoParam, RemovalPolicy, ResourceId, State, Value};
use crate::stack::{Output, Stack};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Template read errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template is not a JSON object")]
    NotAnObject,

    #[error("Resource '{logical_id}': {message}")]
    InvalidResource { logical_id: String, message: String },

    #[error("Unsupported template value: {0}")]
    Unsupported(String),

    #[error("Invalid template JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convert an attribute value into its template form
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Int(n) => json!(n),
        Value::Bool(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Ref(id) => json!({ "Ref": id }),
        Value::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id, attr] }),
        Value::Join { delimiter, parts } => json!({
            "Fn::Join": [delimiter, parts.iter().map(value_to_json).collect::<Vec<_>>()]
        }),
        Value::Select { index, list } => json!({ "Fn::Select": [index, value_to_json(list)] }),
        Value::AvailabilityZones => json!({ "Fn::GetAZs": "" }),
        Value::Pseudo(p) => json!({ "Ref": p.as_str() }),
    }
}

/// Convert a template value back into an attribute value
pub fn value_from_json(json: &Json) -> Result<Value, TemplateError> {
    match json {
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| TemplateError::Unsupported(format!("non-integer number {}", n))),
        Json::Array(items) => items
            .iter()
            .map(value_from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Json::Object(map) => intrinsic_from_json(map),
        Json::Null => Err(TemplateError::Unsupported("null".to_string())),
    }
}

fn intrinsic_from_json(map: &Map<String, Json>) -> Result<Value, TemplateError> {
    if let (1, Some((key, arg))) = (map.len(), map.iter().next()) {
        match key.as_str() {
            "Ref" => {
                let target = arg
                    .as_str()
                    .ok_or_else(|| TemplateError::Unsupported(format!("Ref {}", arg)))?;
                return Ok(match PseudoParam::parse(target) {
                    Some(p) => Value::Pseudo(p),
                    None => Value::Ref(target.to_string()),
                });
            }
            "Fn::GetAtt" => {
                let parts: Vec<&str> = match arg {
                    Json::Array(items) => items.iter().filter_map(Json::as_str).collect(),
                    Json::String(s) => s.splitn(2, '.').collect(),
                    _ => Vec::new(),
                };
                return match parts.as_slice() {
                    [id, attr] => Ok(Value::get_att(*id, *attr)),
                    _ => Err(TemplateError::Unsupported(format!("Fn::GetAtt {}", arg))),
                };
            }
            "Fn::Join" => {
                if let Some([Json::String(delimiter), Json::Array(parts)]) =
                    arg.as_array().map(Vec::as_slice)
                {
                    let parts = parts
                        .iter()
                        .map(value_from_json)
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Value::join(delimiter.clone(), parts));
                }
                return Err(TemplateError::Unsupported(format!("Fn::Join {}", arg)));
            }
            "Fn::Select" => {
                if let Some([index, list]) = arg.as_array().map(Vec::as_slice) {
                    let index = index
                        .as_u64()
                        .or_else(|| index.as_str().and_then(|s| s.parse().ok()))
                        .ok_or_else(|| TemplateError::Unsupported(format!("Fn::Select {}", arg)))?;
                    return Ok(Value::Select {
                        index: index as usize,
                        list: Box::new(value_from_json(list)?),
                    });
                }
                return Err(TemplateError::Unsupported(format!("Fn::Select {}", arg)));
            }
            "Fn::GetAZs" => return Ok(Value::AvailabilityZones),
            _ => {}
        }
    }

    let mut out = HashMap::new();
    for (k, v) in map {
        out.insert(k.clone(), value_from_json(v)?);
    }
    Ok(Value::Map(out))
}

/// Synthesize a stack into a CloudFormation template
pub fn synthesize(stack: &Stack) -> Json {
    let mut resources = Map::new();
    for resource in stack.resources() {
        let mut entry = Map::new();
        entry.insert(
            "Type".to_string(),
            Json::String(resource.id.resource_type.clone()),
        );
        if !resource.attributes.is_empty() {
            let properties: Map<String, Json> = resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect();
            entry.insert("Properties".to_string(), Json::Object(properties));
        }
        if !resource.depends_on.is_empty() {
            let mut depends_on = resource.depends_on.clone();
            depends_on.sort();
            entry.insert("DependsOn".to_string(), json!(depends_on));
        }
        if let Some(policy) = resource.removal_policy {
            entry.insert("DeletionPolicy".to_string(), json!(policy.as_cfn()));
            entry.insert("UpdateReplacePolicy".to_string(), json!(policy.as_cfn()));
        }
        if let Some(path) = &resource.path {
            entry.insert(
                "Metadata".to_string(),
                json!({ "Path": format!("{}/{}", stack.name, path) }),
            );
        }
        resources.insert(resource.logical_id().to_string(), Json::Object(entry));
    }

    let mut template = Map::new();
    template.insert(
        "AWSTemplateFormatVersion".to_string(),
        json!(TEMPLATE_FORMAT_VERSION),
    );
    if let Some(desc) = &stack.description {
        template.insert("Description".to_string(), json!(desc));
    }
    template.insert("Resources".to_string(), Json::Object(resources));

    if !stack.outputs().is_empty() {
        template.insert("Outputs".to_string(), Json::Object(outputs_to_json(stack)));
    }

    log::info!(
        "synthesized stack {} with {} resources",
        stack.name,
        stack.resources().len()
    );
    Json::Object(template)
}

/// The `Outputs` section of a stack, keyed by output name
pub fn outputs_to_json(stack: &Stack) -> Map<String, Json> {
    stack
        .outputs()
        .iter()
        .map(|o| (o.name.clone(), output_to_json(o)))
        .collect()
}

fn output_to_json(output: &Output) -> Json {
    let mut entry = Map::new();
    entry.insert("Value".to_string(), value_to_json(&output.value));
    if let Some(desc) = &output.description {
        entry.insert("Description".to_string(), json!(desc));
    }
    Json::Object(entry)
}

/// Render a synthesized template as pretty-printed JSON
pub fn render(stack: &Stack) -> Result<String, TemplateError> {
    Ok(serde_json::to_string_pretty(&synthesize(stack))?)
}

/// Read the resources of a template, keyed by logical id
pub fn parse(template: &Json) -> Result<HashMap<String, State>, TemplateError> {
    let root = template.as_object().ok_or(TemplateError::NotAnObject)?;
    let mut states = HashMap::new();

    let Some(resources) = root.get("Resources").and_then(Json::as_object) else {
        return Ok(states);
    };

    for (logical_id, entry) in resources {
        let invalid = |message: &str| TemplateError::InvalidResource {
            logical_id: logical_id.clone(),
            message: message.to_string(),
        };

        let resource_type = entry
            .get("Type")
            .and_then(Json::as_str)
            .ok_or_else(|| invalid("missing Type"))?;

        let mut attributes = HashMap::new();
        if let Some(props) = entry.get("Properties") {
            let props = props
                .as_object()
                .ok_or_else(|| invalid("Properties is not an object"))?;
            for (k, v) in props {
                attributes.insert(k.clone(), value_from_json(v)?);
            }
        }

        let removal_policy = entry
            .get("DeletionPolicy")
            .and_then(Json::as_str)
            .and_then(RemovalPolicy::from_cfn);

        let depends_on = match entry.get("DependsOn") {
            None => Vec::new(),
            Some(Json::String(target)) => vec![target.clone()],
            Some(Json::Array(targets)) => targets
                .iter()
                .map(|t| t.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("DependsOn entries must be strings"))?,
            Some(_) => return Err(invalid("DependsOn must be a string or a list")),
        };

        let state = State::existing(ResourceId::new(resource_type, logical_id), attributes)
            .with_removal_policy(removal_policy)
            .with_depends_on(depends_on);
        states.insert(logical_id.clone(), state);
    }

    Ok(states)
}

/// Parse template text (JSON) and read its resources
pub fn parse_str(body: &str) -> Result<HashMap<String, State>, TemplateError> {
    let json: Json = serde_json::from_str(body)?;
    parse(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    fn sample_stack() -> Stack {
        let mut stack = Stack::new("CdkStack").with_description("sample");
        stack
            .add(
                Resource::at_path("AWS::DynamoDB::Table", "Messages")
                    .with_attribute("BillingMode", "PAY_PER_REQUEST")
                    .with_removal_policy(RemovalPolicy::Destroy),
            )
            .unwrap();
        stack
            .add(
                Resource::new("AWS::EC2::Subnet", "Subnet1")
                    .with_attribute("AvailabilityZone", Value::availability_zone(1))
                    .with_attribute("VpcId", Value::ref_to("Vpc"))
                    .with_dependency("Gateway"),
            )
            .unwrap();
        stack
            .add_output(Output::new("TableName", Value::ref_to("Messages")))
            .unwrap();
        stack
    }

    #[test]
    fn synthesize_emits_cloudformation_sections() {
        let template = synthesize(&sample_stack());

        assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(template["Description"], "sample");

        let table = &template["Resources"]["Messages"];
        assert_eq!(table["Type"], "AWS::DynamoDB::Table");
        assert_eq!(table["Properties"]["BillingMode"], "PAY_PER_REQUEST");
        assert_eq!(table["DeletionPolicy"], "Delete");
        assert_eq!(table["UpdateReplacePolicy"], "Delete");
        assert_eq!(table["Metadata"]["Path"], "CdkStack/Messages");

        let subnet = &template["Resources"]["Subnet1"];
        assert_eq!(
            subnet["Properties"]["AvailabilityZone"],
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
        assert_eq!(subnet["Properties"]["VpcId"], json!({ "Ref": "Vpc" }));
        assert_eq!(subnet["DependsOn"], json!(["Gateway"]));
        assert!(subnet.get("Metadata").is_none());

        assert_eq!(
            template["Outputs"]["TableName"]["Value"],
            json!({ "Ref": "Messages" })
        );
    }

    #[test]
    fn intrinsics_are_read_back() {
        let cases = [
            (json!({ "Ref": "Messages" }), Value::ref_to("Messages")),
            (
                json!({ "Ref": "AWS::AccountId" }),
                Value::Pseudo(PseudoParam::AccountId),
            ),
            (
                json!({ "Fn::GetAtt": "Messages.Arn" }),
                Value::get_att("Messages", "Arn"),
            ),
            (
                json!({ "Fn::Select": ["2", { "Fn::GetAZs": "" }] }),
                Value::availability_zone(2),
            ),
        ];
        for (json, expected) in cases {
            assert_eq!(value_from_json(&json).unwrap(), expected);
        }
    }

    #[test]
    fn parse_reads_synthesized_template() {
        let stack = sample_stack();
        let states = parse(&synthesize(&stack)).unwrap();

        assert_eq!(states.len(), 2);
        let table = &states["Messages"];
        assert_eq!(table.id.resource_type, "AWS::DynamoDB::Table");
        assert_eq!(table.removal_policy, Some(RemovalPolicy::Destroy));
        assert_eq!(
            states["Subnet1"].attributes,
            stack.find("Subnet1").unwrap().attributes
        );
        assert_eq!(states["Subnet1"].depends_on, vec!["Gateway"]);
        assert!(table.depends_on.is_empty());
    }

    #[test]
    fn parse_accepts_single_depends_on() {
        let template = json!({
            "Resources": {
                "Service": { "Type": "AWS::ECS::Service", "DependsOn": "Listener" },
                "Broken": { "Type": "AWS::ECS::Service", "DependsOn": 3 }
            }
        });
        let err = parse(&template).unwrap_err();
        assert!(err.to_string().contains("Broken"));

        let template = json!({
            "Resources": {
                "Service": { "Type": "AWS::ECS::Service", "DependsOn": "Listener" }
            }
        });
        assert_eq!(parse(&template).unwrap()["Service"].depends_on, vec!["Listener"]);
    }

    #[test]
    fn parse_rejects_resource_without_type() {
        let template = json!({ "Resources": { "Broken": { "Properties": {} } } });
        let err = parse(&template).unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn parse_str_reports_invalid_json() {
        assert!(matches!(parse_str("{"), Err(TemplateError::Json(_))));
        assert!(parse_str("{}").unwrap().is_empty());
    }
}
