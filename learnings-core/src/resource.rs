//! Resource - Representing resources and their state

use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// CloudFormation resource type (e.g., "AWS::DynamoDB::Table")
    pub resource_type: String,
    /// Logical id of the resource within the template (e.g., "Messages")
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource_type, self.name)
    }
}

/// Path components that name the primary resource of a construct
const HIDDEN_PATH_COMPONENTS: &[&str] = &["Resource", "Default"];

/// Derive a template logical id from a construct path
///
/// Path components are concatenated and every character that is not ASCII
/// alphanumeric is dropped, so `my-react-learnings-cdk-vpc/PublicSubnet1/Subnet`
/// becomes `myreactlearningscdkvpcPublicSubnet1Subnet`. `Resource` and
/// `Default` components are skipped and a component repeating its parent is
/// dropped, so both `Messages/Resource` and `Service/Service` keep the
/// construct id alone.
pub fn logical_id(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        if HIDDEN_PATH_COMPONENTS.contains(&component) || components.last() == Some(&component) {
            continue;
        }
        components.push(component);
    }
    components
        .into_iter()
        .flat_map(str::chars)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Pseudo parameters resolved by CloudFormation at deploy time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoParam {
    AccountId,
    Region,
    Partition,
    UrlSuffix,
    StackName,
}

impl PseudoParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoParam::AccountId => "AWS::AccountId",
            PseudoParam::Region => "AWS::Region",
            PseudoParam::Partition => "AWS::Partition",
            PseudoParam::UrlSuffix => "AWS::URLSuffix",
            PseudoParam::StackName => "AWS::StackName",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWS::AccountId" => Some(PseudoParam::AccountId),
            "AWS::Region" => Some(PseudoParam::Region),
            "AWS::Partition" => Some(PseudoParam::Partition),
            "AWS::URLSuffix" => Some(PseudoParam::UrlSuffix),
            "AWS::StackName" => Some(PseudoParam::StackName),
            _ => None,
        }
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// `Ref` to another resource in the same template (logical id)
    Ref(String),
    /// `Fn::GetAtt` on another resource (logical id, attribute name)
    GetAtt(String, String),
    /// `Fn::Join` of the parts with a delimiter
    Join { delimiter: String, parts: Vec<Value> },
    /// `Fn::Select` of one element of a list
    Select { index: usize, list: Box<Value> },
    /// `Fn::GetAZs ""`: availability zones of the deployment region
    AvailabilityZones,
    /// Pseudo parameter such as `AWS::AccountId`
    Pseudo(PseudoParam),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn ref_to(logical_id: impl Into<String>) -> Self {
        Value::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::GetAtt(logical_id.into(), attribute.into())
    }

    pub fn join(delimiter: impl Into<String>, parts: Vec<Value>) -> Self {
        Value::Join {
            delimiter: delimiter.into(),
            parts,
        }
    }

    /// The `index`-th availability zone of the deployment region
    pub fn availability_zone(index: usize) -> Self {
        Value::Select {
            index,
            list: Box::new(Value::AvailabilityZones),
        }
    }

    /// Build a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// List of plain strings
    pub fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Whether this value is resolved by CloudFormation rather than known at synthesis
    pub fn is_intrinsic(&self) -> bool {
        matches!(
            self,
            Value::Ref(_)
                | Value::GetAtt(_, _)
                | Value::Join { .. }
                | Value::Select { .. }
                | Value::AvailabilityZones
                | Value::Pseudo(_)
        )
    }

    /// Logical ids referenced by this value, in order of appearance
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut Vec<String>) {
        match self {
            Value::Ref(id) | Value::GetAtt(id, _) => {
                if !refs.contains(id) {
                    refs.push(id.clone());
                }
            }
            Value::List(items) => items.iter().for_each(|v| v.collect_references(refs)),
            Value::Map(map) => {
                // Sorted keys keep the reference order stable
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                for key in keys {
                    map[key].collect_references(refs);
                }
            }
            Value::Join { parts, .. } => parts.iter().for_each(|v| v.collect_references(refs)),
            Value::Select { list, .. } => list.collect_references(refs),
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// What happens to a resource when it leaves the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Delete the physical resource
    Destroy,
    /// Orphan the physical resource
    Retain,
}

impl RemovalPolicy {
    /// CloudFormation `DeletionPolicy` value
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }

    pub fn from_cfn(s: &str) -> Option<Self> {
        match s {
            "Delete" => Some(RemovalPolicy::Destroy),
            "Retain" => Some(RemovalPolicy::Retain),
            _ => None,
        }
    }
}

/// Desired state of a resource, as declared by a construct
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    pub removal_policy: Option<RemovalPolicy>,
    /// Logical ids this resource must be created after, beyond its references
    pub depends_on: Vec<String>,
    /// Construct path the resource was declared under
    pub path: Option<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            removal_policy: None,
            depends_on: Vec::new(),
            path: None,
        }
    }

    /// Create a resource whose logical id is derived from its construct path
    pub fn at_path(resource_type: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let mut resource = Self::new(resource_type, logical_id(&path));
        resource.path = Some(path);
        resource
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn with_dependency(mut self, logical_id: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
        self
    }

    pub fn logical_id(&self) -> &str {
        &self.id.name
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Logical ids this resource depends on, through references or `depends_on`
    pub fn dependencies(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.attributes.keys().collect();
        keys.sort();

        let mut deps = Vec::new();
        for key in keys {
            for target in self.attributes[key].references() {
                if !deps.contains(&target) {
                    deps.push(target);
                }
            }
        }
        for target in &self.depends_on {
            if !deps.contains(target) {
                deps.push(target.clone());
            }
        }
        deps
    }
}

/// State of a resource as recorded in a previously synthesized or deployed template
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    pub removal_policy: Option<RemovalPolicy>,
    /// Explicit `DependsOn` entries, sorted
    pub depends_on: Vec<String>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            attributes: HashMap::new(),
            removal_policy: None,
            depends_on: Vec::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            attributes,
            removal_policy: None,
            depends_on: Vec::new(),
            exists: true,
        }
    }

    pub fn with_removal_policy(mut self, policy: Option<RemovalPolicy>) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_depends_on(mut self, mut depends_on: Vec<String>) -> Self {
        depends_on.sort();
        depends_on.dedup();
        self.depends_on = depends_on;
        self
    }
}

impl From<&Resource> for State {
    fn from(resource: &Resource) -> Self {
        State::existing(resource.id.clone(), resource.attributes.clone())
            .with_removal_policy(resource.removal_policy)
            .with_depends_on(resource.depends_on.clone())
    }
}
