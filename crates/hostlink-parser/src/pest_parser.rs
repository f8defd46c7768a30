use crate::ast::AstNode;
use crate::parser::{AstParser, ParseError};
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ScriptParser;

/// Parse a script source into its top-level statements.
pub fn parse(source: &str) -> Result<Vec<AstNode>, ParseError> {
    let mut pairs = ScriptParser::parse(Rule::program, source).map_err(ParseError::from_pest)?;
    let program = pairs
        .next()
        .ok_or_else(|| ParseError::new("Empty program", 1, 1))?;

    let mut builder = AstParser::new();
    builder.build_program(program)
}
