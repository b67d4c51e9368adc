//! Learnings Core
//!
//! Core library for declaring an infrastructure stack as a graph of resource
//! values, validating it, and synthesizing it into a CloudFormation template.
//! Side effects are confined to Providers driven by the Interpreter.

pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod stack;
pub mod template;
