use crate::ast::AstNode;
use crate::parser::{AstParser, ParseError};
use crate::pest_parser::Rule;
use pest::iterators::Pair;

impl AstParser {
    pub(super) fn build_primary(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let inner = Self::expect_next(&mut pair.into_inner(), span, "primary expression")?;

        match inner.as_rule() {
            Rule::number => {
                let text = inner.as_str();
                text.parse::<f64>()
                    .map(AstNode::Number)
                    .map_err(|_| ParseError::at(&inner, format!("Invalid number '{}'", text)))
            }
            Rule::string_literal => Ok(AstNode::StringLiteral(Self::unescape(&inner)?)),
            Rule::boolean => Ok(AstNode::Boolean(inner.as_str() == "true")),
            Rule::null_literal => Ok(AstNode::Null),
            Rule::array => {
                let elements = inner
                    .into_inner()
                    .map(|element| self.build_expr(element))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AstNode::ArrayLiteral(elements))
            }
            Rule::record => self.build_record(inner),
            Rule::do_block => {
                let span = inner.as_span();
                let block = Self::expect_next(&mut inner.into_inner(), span, "do body")?;
                self.build_block(block)
            }
            Rule::try_expr => self.build_try(inner),
            Rule::identifier => Ok(AstNode::VariableRef(inner.as_str().to_string())),
            Rule::expr => self.build_expr(inner),
            other => Err(ParseError::at(
                &inner,
                format!("Unexpected primary rule: {:?}", other),
            )),
        }
    }

    fn build_record(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let mut fields: Vec<(String, AstNode)> = Vec::new();

        for field in pair.into_inner() {
            let span = field.as_span();
            let mut inner = field.into_inner();

            let key_pair = Self::expect_next(&mut inner, span, "record key")?;
            let key = match key_pair.as_rule() {
                Rule::string_literal => Self::unescape(&key_pair)?,
                _ => key_pair.as_str().to_string(),
            };
            let value = Self::expect_next(&mut inner, span, "record value")?;
            let value = self.build_expr(value)?;

            // Later duplicates win, as they would at runtime
            match fields.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => fields.push((key, value)),
            }
        }

        Ok(AstNode::RecordLiteral(fields))
    }

    fn build_try(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        // Grammar: "try" ~ block ~ "catch" ~ "(" ~ identifier ~ ")" ~ block
        let body = Self::expect_next(&mut inner, span, "try body")?;
        let binding = Self::expect_next(&mut inner, span, "catch binding")?;
        let handler = Self::expect_next(&mut inner, span, "catch body")?;

        Ok(AstNode::TryCatch {
            body: Box::new(self.build_block(body)?),
            binding: binding.as_str().to_string(),
            handler: Box::new(self.build_block(handler)?),
        })
    }

    /// Strip the quotes of a string literal and resolve its escapes.
    fn unescape(pair: &Pair<Rule>) -> Result<String, ParseError> {
        let raw = pair.as_str();
        let body = &raw[1..raw.len() - 1];

        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    return Err(ParseError::at(
                        pair,
                        format!("Unknown escape sequence '\\{}'", other),
                    ))
                }
                None => return Err(ParseError::at(pair, "Unterminated escape sequence")),
            }
        }
        Ok(out)
    }
}
