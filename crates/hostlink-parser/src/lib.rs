pub mod ast;
pub mod parser;
pub mod pest_parser;

pub use ast::{AstNode, BinaryOp, UnaryOp};
pub use parser::ParseError;
pub use pest_parser::parse;
