use crate::error::ScriptError;
use crate::handlers;
use crate::value::ScriptValue;
use hostlink_parser::ast::AstNode;

use super::{Completion, Evaluator};

/// Main evaluation dispatcher
impl Evaluator {
    /// Evaluate an AST node
    ///
    /// Routes each node to its handler. Handlers return a [`Completion`] so
    /// that a `return` nested in blocks, branches or loops reaches the
    /// function that owns it.
    pub fn evaluate(&mut self, node: &AstNode) -> Result<Completion, ScriptError> {
        match node {
            // Literals
            AstNode::Number(n) => Ok(Completion::Normal(ScriptValue::Number(*n))),
            AstNode::StringLiteral(s) => Ok(Completion::Normal(ScriptValue::String(s.clone()))),
            AstNode::Boolean(b) => Ok(Completion::Normal(ScriptValue::Boolean(*b))),
            AstNode::Null => Ok(Completion::Normal(ScriptValue::Null)),
            AstNode::ArrayLiteral(elements) => handlers::literals::evaluate_array(self, elements),
            AstNode::RecordLiteral(fields) => handlers::literals::evaluate_record(self, fields),

            // Variables
            AstNode::VariableRef(name) => handlers::variables::evaluate_reference(self, name),
            AstNode::VariableDecl {
                name,
                mutable,
                initializer,
            } => handlers::variables::evaluate_declaration(self, name, *mutable, initializer),
            AstNode::Assignment { target, value } => {
                handlers::assignment::evaluate_assignment(self, target, value)
            }

            // Access and calls
            AstNode::FieldAccess { record, field } => {
                handlers::access::evaluate_field_access(self, record, field)
            }
            AstNode::IndexAccess { object, index } => {
                handlers::access::evaluate_index_access(self, object, index)
            }
            AstNode::Call { callee, args } => handlers::functions::evaluate_call(self, callee, args),
            AstNode::Lambda { params, body } => {
                Ok(handlers::functions::evaluate_lambda(self, params, body))
            }

            // Operators
            AstNode::BinaryOp { op, left, right } => {
                handlers::operators::evaluate_binary(self, *op, left, right)
            }
            AstNode::UnaryOp { op, operand } => {
                handlers::operators::evaluate_unary(self, *op, operand)
            }

            // Control flow
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => handlers::control_flow::evaluate_if(
                self,
                condition,
                then_branch,
                else_branch.as_deref(),
            ),
            AstNode::While { condition, body } => {
                handlers::control_flow::evaluate_while(self, condition, body)
            }
            AstNode::Block(statements) => handlers::control_flow::evaluate_block(self, statements),
            AstNode::Return(value) => {
                let value = match value {
                    Some(expr) => value_of!(self, expr),
                    None => ScriptValue::Null,
                };
                Ok(Completion::Return(value))
            }
            AstNode::Throw(value) => {
                let value = value_of!(self, value);
                Err(ScriptError::Thrown(value))
            }
            AstNode::TryCatch {
                body,
                binding,
                handler,
            } => handlers::control_flow::evaluate_try(self, body, binding, handler),
        }
    }
}
