//! Constructs - Groups of resources declared together
//!
//! Each construct takes the stack, a construct id and its props, declares its
//! resources under the id's path, and returns a handle exposing the
//! references (`Ref` / `Fn::GetAtt`) other constructs wire to.

pub mod autoscaling;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod pipeline;
pub mod table;
pub mod vpc;

use learnings_core::resource::Value;
use learnings_core::stack::Stack;

/// Path of a child construct
pub fn child(parent: &str, id: &str) -> String {
    format!("{}/{}", parent, id)
}

/// `Name` tag carrying the full construct path, as shown in the console
pub fn name_tag(stack: &Stack, path: &str) -> Value {
    Value::List(vec![tag("Name", format!("{}/{}", stack.name, path))])
}

pub fn tag(key: &str, value: impl Into<Value>) -> Value {
    Value::map([("Key", Value::string(key)), ("Value", value.into())])
}
