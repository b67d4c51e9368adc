//! Effect - A single change to the deployed stack, represented as a value
//!
//! Effects describe what deploying a template would do to each resource.
//! Nothing happens until a Plan of them is handed to the Interpreter.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Resource is new
    Create(Resource),
    /// Resource exists and some properties change in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Logical id is kept but the resource type changed
    Replace { from: State, to: Resource },
    /// Resource is no longer declared
    Delete(ResourceId),
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } => id,
            Effect::Replace { to, .. } => &to.id,
            Effect::Delete(id) => id,
        }
    }

    /// Declared resource this effect leads to, if any
    pub fn target(&self) -> Option<&Resource> {
        match self {
            Effect::Create(r) => Some(r),
            Effect::Update { to, .. } | Effect::Replace { to, .. } => Some(to),
            Effect::Delete(_) => None,
        }
    }

    /// Whether deploying this effect may destroy data
    pub fn is_destructive(&self) -> bool {
        matches!(self, Effect::Replace { .. } | Effect::Delete(_))
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Replace { .. } => "-/+",
            Effect::Delete(_) => "-",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.resource_id();
        write!(f, "{} {} {}", self.symbol(), id.resource_type, id.name)
    }
}
