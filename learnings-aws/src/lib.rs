//! AWS constructs for the learnings stack
//!
//! Constructs declare CloudFormation resources into a [`learnings_core::stack::Stack`],
//! [`app::build_stack`] assembles the whole stack from a [`config::StackConfig`], and
//! [`provider::CloudFormationProvider`] deploys the synthesized template.

pub mod app;
pub mod config;
pub mod constructs;
pub mod error;
pub mod provider;
pub mod schemas;

pub use app::build_stack;
pub use config::StackConfig;
pub use error::BuildError;
pub use provider::CloudFormationProvider;
