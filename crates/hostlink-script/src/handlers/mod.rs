//! Evaluation handlers, one module per family of AST nodes.

pub mod access;
pub mod assignment;
pub mod control_flow;
pub mod functions;
pub mod literals;
pub mod operators;
pub mod variables;
