//! Schema - Property types of CloudFormation resources
//!
//! Providers define a schema for each CloudFormation resource type so that a
//! declared stack can be checked before anything is synthesized or deployed.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::resource::Value;

/// Validation function of a custom attribute type
pub type Validator = fn(&Value) -> Result<(), String>;

/// Type of a CloudFormation property
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String; intrinsic functions are accepted since they resolve to strings
    String,
    Int,
    Bool,
    /// One of a fixed set of strings
    Enum(Vec<String>),
    /// Named refinement of a base type
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: Validator,
    },
    List(Box<AttributeType>),
    /// Map with free-form keys
    Map(Box<AttributeType>),
    /// Property type with named fields
    Struct {
        name: String,
        fields: Vec<AttributeSchema>,
    },
    /// Unchecked (policy documents, container definitions)
    Any,
}

impl AttributeType {
    pub fn custom(name: impl Into<String>, base: AttributeType, validate: Validator) -> Self {
        AttributeType::Custom {
            name: name.into(),
            base: Box::new(base),
            validate,
        }
    }

    /// Check a value against this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::Any, _) => Ok(()),
            (AttributeType::String, v) if v.is_intrinsic() => Ok(()),
            (AttributeType::String, Value::String(_))
            | (AttributeType::Int, Value::Int(_))
            | (AttributeType::Bool, Value::Bool(_)) => Ok(()),
            (AttributeType::Enum(allowed), Value::String(s)) => {
                if allowed.contains(s) {
                    Ok(())
                } else {
                    Err(TypeError::NotAllowed {
                        value: s.clone(),
                        allowed: allowed.clone(),
                    })
                }
            }
            (AttributeType::Custom { name, base, validate }, v) => {
                if v.is_intrinsic() && matches!(**base, AttributeType::String) {
                    return Ok(());
                }
                validate(v).map_err(|message| TypeError::Invalid {
                    type_name: name.clone(),
                    message,
                })
            }
            // Fn::GetAZs yields a list of strings
            (AttributeType::List(_), Value::AvailabilityZones) => Ok(()),
            (AttributeType::List(inner), Value::List(items)) => {
                items.iter().enumerate().try_for_each(|(index, item)| {
                    inner.validate(item).map_err(|e| TypeError::InList {
                        index,
                        inner: Box::new(e),
                    })
                })
            }
            (AttributeType::Map(inner), Value::Map(map)) => map.iter().try_for_each(|(key, v)| {
                inner.validate(v).map_err(|e| TypeError::InMap {
                    key: key.clone(),
                    inner: Box::new(e),
                })
            }),
            (AttributeType::Struct { fields, .. }, Value::Map(map)) => check_fields(fields, map),
            _ => Err(TypeError::Mismatch {
                expected: self.to_string(),
                found: value.kind(),
            }),
        }
    }
}

fn check_fields(fields: &[AttributeSchema], map: &HashMap<String, Value>) -> Result<(), TypeError> {
    for field in fields {
        match map.get(&field.name) {
            Some(v) => field.attr_type.validate(v).map_err(|e| TypeError::InField {
                field: field.name.clone(),
                inner: Box::new(e),
            })?,
            None if field.required => {
                return Err(TypeError::Missing {
                    name: field.name.clone(),
                });
            }
            None => {}
        }
    }
    let mut unknown: Vec<&String> = map
        .keys()
        .filter(|k| !fields.iter().any(|f| &f.name == *k))
        .collect();
    unknown.sort();
    match unknown.first() {
        Some(name) => Err(TypeError::Unknown {
            name: (*name).clone(),
        }),
        None => Ok(()),
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => f.write_str("String"),
            AttributeType::Int => f.write_str("Int"),
            AttributeType::Bool => f.write_str("Bool"),
            AttributeType::Enum(allowed) => write!(f, "Enum({})", allowed.join(" | ")),
            AttributeType::Custom { name, .. } | AttributeType::Struct { name, .. } => {
                f.write_str(name)
            }
            AttributeType::List(inner) => write!(f, "List<{}>", inner),
            AttributeType::Map(inner) => write!(f, "Map<{}>", inner),
            AttributeType::Any => f.write_str("Any"),
        }
    }
}

/// Problem found in a property value
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("'{value}' is not one of: {}", allowed.join(", "))]
    NotAllowed { value: String, allowed: Vec<String> },

    #[error("invalid {type_name}: {message}")]
    Invalid { type_name: String, message: String },

    #[error("required property '{name}' is missing")]
    Missing { name: String },

    #[error("unknown property '{name}'")]
    Unknown { name: String },

    #[error("[{index}]: {inner}")]
    InList { index: usize, inner: Box<TypeError> },

    #[error("['{key}']: {inner}")]
    InMap { key: String, inner: Box<TypeError> },

    #[error("{field}: {inner}")]
    InField { field: String, inner: Box<TypeError> },
}

impl Value {
    /// Short description of the value's shape, for error messages
    fn kind(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::Ref(id) => format!("Ref {}", id),
            Value::GetAtt(id, attr) => format!("GetAtt {}.{}", id, attr),
            Value::Join { .. } => "Fn::Join".to_string(),
            Value::Select { .. } => "Fn::Select".to_string(),
            Value::AvailabilityZones => "Fn::GetAZs".to_string(),
            Value::Pseudo(p) => format!("Ref {}", p.as_str()),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    /// Attributes readable with `Fn::GetAtt`
    pub return_values: Vec<String>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            return_values: Vec::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn returns(mut self, attribute: impl Into<String>) -> Self {
        self.return_values.push(attribute.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn has_return_value(&self, attribute: &str) -> bool {
        self.return_values.iter().any(|a| a == attribute)
    }

    /// Check declared properties, reporting every problem in property order
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut missing: Vec<&String> = self
            .attributes
            .values()
            .filter(|a| a.required && !attributes.contains_key(&a.name))
            .map(|a| &a.name)
            .collect();
        missing.sort();
        let mut errors: Vec<TypeError> = missing
            .into_iter()
            .map(|name| TypeError::Missing { name: name.clone() })
            .collect();

        let mut names: Vec<&String> = attributes.keys().collect();
        names.sort();
        for name in names {
            let Some(schema) = self.attributes.get(name) else {
                errors.push(TypeError::Unknown { name: name.clone() });
                continue;
            };
            if let Err(e) = schema.attr_type.validate(&attributes[name]) {
                errors.push(TypeError::InField {
                    field: name.clone(),
                    inner: Box::new(e),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Attribute types shared by several resource schemas
pub mod types {
    use super::*;

    fn int_in(value: &Value, range: std::ops::RangeInclusive<i64>) -> Result<(), String> {
        match value {
            Value::Int(n) if range.contains(n) => Ok(()),
            Value::Int(n) => Err(format!("{} is outside {}..={}", n, range.start(), range.end())),
            other => Err(format!("expected an integer, found {}", other.kind())),
        }
    }

    pub fn positive_int() -> AttributeType {
        AttributeType::custom("PositiveInt", AttributeType::Int, |v| int_in(v, 1..=i64::MAX))
    }

    pub fn non_negative_int() -> AttributeType {
        AttributeType::custom("NonNegativeInt", AttributeType::Int, |v| int_in(v, 0..=i64::MAX))
    }

    pub fn port_number() -> AttributeType {
        AttributeType::custom("PortNumber", AttributeType::Int, |v| int_in(v, 0..=65535))
    }

    /// IPv4 CIDR block such as `10.1.0.0/16`
    pub fn cidr() -> AttributeType {
        AttributeType::custom("Cidr", AttributeType::String, |value| match value {
            Value::String(s) => validate_cidr(s),
            other => Err(format!("expected a string, found {}", other.kind())),
        })
    }

    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    pub fn one_of(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    pub fn structure(name: &str, fields: Vec<AttributeSchema>) -> AttributeType {
        AttributeType::Struct {
            name: name.to_string(),
            fields,
        }
    }

    /// `[{ Key, Value }]`
    pub fn tags() -> AttributeType {
        AttributeType::List(Box::new(structure(
            "Tag",
            vec![
                AttributeSchema::new("Key", AttributeType::String).required(),
                AttributeSchema::new("Value", AttributeType::String).required(),
            ],
        )))
    }
}

/// Split an IPv4 CIDR block into its address and prefix length
pub fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), String> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("'{}' is not in address/prefix form", cidr))?;
    let address: Ipv4Addr = address
        .parse()
        .map_err(|_| format!("'{}' is not an IPv4 address", address))?;
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok((address, p)),
        _ => Err(format!("prefix '{}' must be a number from 0 to 32", prefix)),
    }
}

pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    parse_cidr(cidr).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::ref_to("Messages")).is_ok());
        assert!(t.validate(&Value::get_att("Messages", "Arn")).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::one_of(&["PAY_PER_REQUEST", "PROVISIONED"]);
        assert!(t.validate(&Value::string("PAY_PER_REQUEST")).is_ok());
        assert!(t.validate(&Value::string("pay_per_request")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_port_number() {
        let t = types::port_number();
        assert!(t.validate(&Value::Int(80)).is_ok());
        assert!(t.validate(&Value::Int(65536)).is_err());
    }

    #[test]
    fn validate_struct_type() {
        let t = types::structure(
            "KeySchema",
            vec![
                AttributeSchema::new("AttributeName", AttributeType::String).required(),
                AttributeSchema::new("KeyType", types::one_of(&["HASH", "RANGE"])).required(),
            ],
        );

        let ok = Value::map([
            ("AttributeName", Value::string("app_id")),
            ("KeyType", Value::string("HASH")),
        ]);
        assert!(t.validate(&ok).is_ok());

        let missing = Value::map([("AttributeName", Value::string("app_id"))]);
        assert!(matches!(
            t.validate(&missing),
            Err(TypeError::Missing { .. })
        ));

        let unknown = Value::map([
            ("AttributeName", Value::string("app_id")),
            ("KeyType", Value::string("HASH")),
            ("Extra", Value::Bool(true)),
        ]);
        assert!(matches!(
            t.validate(&unknown),
            Err(TypeError::Unknown { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("AWS::ECS::Service")
            .attribute(AttributeSchema::new("Cluster", AttributeType::String).required())
            .attribute(AttributeSchema::new("DesiredCount", types::non_negative_int()));

        let mut attrs = HashMap::new();
        attrs.insert("Cluster".to_string(), Value::ref_to("Cluster"));
        attrs.insert("DesiredCount".to_string(), Value::Int(1));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("Bogus".to_string(), Value::Int(1));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("AWS::ECR::Repository")
            .attribute(AttributeSchema::new("RepositoryName", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn availability_zones_are_a_string_list() {
        let t = types::string_list();
        assert!(t.validate(&Value::AvailabilityZones).is_ok());
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::string("10.1.0.0/16")).is_ok());
        assert!(t.validate(&Value::string("0.0.0.0/0")).is_ok());
        assert!(t.validate(&Value::string("255.255.255.255/32")).is_ok());

        assert!(t.validate(&Value::string("10.0.0.0")).is_err());
        assert!(t.validate(&Value::string("10.0.0.0/33")).is_err());
        assert!(t.validate(&Value::string("10.0.0.256/16")).is_err());
        assert!(t.validate(&Value::string("10.0.0/16")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }
}
