//! Conversion of pest parse trees into [`AstNode`]s.

mod expressions;
mod primary;
mod statements;

use crate::ast::AstNode;
use crate::pest_parser::Rule;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Span;
use thiserror::Error;

/// Syntax error with a 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub(crate) fn from_pest(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        Self::new(err.variant.message().into_owned(), line, column)
    }

    pub(crate) fn at(pair: &Pair<Rule>, message: impl Into<String>) -> Self {
        Self::at_span(pair.as_span(), message)
    }

    pub(crate) fn at_span(span: Span<'_>, message: impl Into<String>) -> Self {
        let (line, column) = span.start_pos().line_col();
        Self::new(message, line, column)
    }
}

pub struct AstParser;

impl AstParser {
    pub fn new() -> Self {
        Self
    }

    pub fn build_program(&mut self, pair: Pair<Rule>) -> Result<Vec<AstNode>, ParseError> {
        let mut statements = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::statement => statements.push(self.build_statement(inner)?),
                Rule::EOI => {}
                other => {
                    return Err(ParseError::at(
                        &inner,
                        format!("Unexpected top-level rule: {:?}", other),
                    ))
                }
            }
        }
        Ok(statements)
    }

    /// Take the next child of the pair spanning `span`.
    pub(super) fn expect_next<'i>(
        inner: &mut Pairs<'i, Rule>,
        span: Span<'i>,
        what: &str,
    ) -> Result<Pair<'i, Rule>, ParseError> {
        inner
            .next()
            .ok_or_else(|| ParseError::at_span(span, format!("Missing {}", what)))
    }
}

impl Default for AstParser {
    fn default() -> Self {
        Self::new()
    }
}
