use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::parser::{AstParser, ParseError};
use crate::pest_parser::Rule;
use pest::iterators::Pair;
use std::rc::Rc;

impl AstParser {
    pub(super) fn build_expr(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let inner = Self::expect_next(&mut pair.into_inner(), span, "expression")?;

        match inner.as_rule() {
            Rule::lambda => self.build_lambda(inner),
            Rule::if_expr => self.build_if(inner),
            Rule::logical_or => self.build_binary(inner),
            other => Err(ParseError::at(
                &inner,
                format!("Unexpected expression rule: {:?}", other),
            )),
        }
    }

    fn build_lambda(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut params = Vec::new();
        let mut body = None;

        // Grammar: "(" ~ params? ~ ")" ~ "=>" ~ (block | expr)
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::params => {
                    for param in inner.into_inner() {
                        let name = param.as_str().to_string();
                        if params.contains(&name) {
                            return Err(ParseError::at(
                                &param,
                                format!("Duplicate parameter '{}'", name),
                            ));
                        }
                        params.push(name);
                    }
                }
                Rule::block => body = Some(self.build_block(inner)?),
                Rule::expr => body = Some(self.build_expr(inner)?),
                other => {
                    return Err(ParseError::at(
                        &inner,
                        format!("Unexpected rule in lambda: {:?}", other),
                    ))
                }
            }
        }

        let body = body.ok_or_else(|| ParseError::at_span(span, "Missing lambda body"))?;
        Ok(AstNode::Lambda {
            params,
            body: Rc::new(body),
        })
    }

    pub(super) fn build_if(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        let condition = Self::expect_next(&mut inner, span, "if condition")?;
        let then_branch = Self::expect_next(&mut inner, span, "if body")?;

        let else_branch = match inner.next() {
            Some(clause) => {
                let clause_span = clause.as_span();
                let branch = Self::expect_next(&mut clause.into_inner(), clause_span, "else body")?;
                let node = match branch.as_rule() {
                    Rule::if_expr => self.build_if(branch)?,
                    _ => self.build_block(branch)?,
                };
                Some(Box::new(node))
            }
            None => None,
        };

        Ok(AstNode::If {
            condition: Box::new(self.build_expr(condition)?),
            then_branch: Box::new(self.build_block(then_branch)?),
            else_branch,
        })
    }

    /// Left-associative chain `operand (op operand)*` for every binary level.
    fn build_binary(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        let first = Self::expect_next(&mut inner, span, "operand")?;
        let mut left = self.build_operand(first)?;

        while let Some(op_pair) = inner.next() {
            let op = BinaryOp::from_symbol(op_pair.as_str()).ok_or_else(|| {
                ParseError::at(&op_pair, format!("Unknown operator '{}'", op_pair.as_str()))
            })?;
            let right = Self::expect_next(&mut inner, span, "right operand")?;
            left = AstNode::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(self.build_operand(right)?),
            };
        }

        Ok(left)
    }

    fn build_operand(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        match pair.as_rule() {
            Rule::logical_or
            | Rule::logical_and
            | Rule::equality
            | Rule::comparison
            | Rule::additive
            | Rule::multiplicative => self.build_binary(pair),
            Rule::unary => self.build_unary(pair),
            other => Err(ParseError::at(
                &pair,
                format!("Unexpected operand rule: {:?}", other),
            )),
        }
    }

    fn build_unary(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let mut ops = Vec::new();
        let mut operand = None;

        // Grammar: unary_op* ~ postfix
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::unary_op => ops.push(match inner.as_str() {
                    "!" => UnaryOp::Not,
                    _ => UnaryOp::Negate,
                }),
                Rule::postfix => operand = Some(self.build_postfix(inner)?),
                other => {
                    return Err(ParseError::at(
                        &inner,
                        format!("Unexpected rule in unary expression: {:?}", other),
                    ))
                }
            }
        }

        let mut node = operand.ok_or_else(|| ParseError::new("Missing unary operand", 1, 1))?;
        // Innermost operator applies first: `-!x` is `-(!x)`
        for op in ops.into_iter().rev() {
            node = AstNode::UnaryOp {
                op,
                operand: Box::new(node),
            };
        }
        Ok(node)
    }

    fn build_postfix(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        let primary = Self::expect_next(&mut inner, span, "primary expression")?;
        let mut node = self.build_primary(primary)?;
        for accessor in inner {
            node = self.apply_accessor(node, accessor)?;
        }
        Ok(node)
    }

    /// Wrap `base` in the call, field or index access described by `pair`.
    pub(super) fn apply_accessor(
        &mut self,
        base: AstNode,
        pair: Pair<Rule>,
    ) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        match pair.as_rule() {
            Rule::call_args => {
                let args = pair
                    .into_inner()
                    .map(|arg| self.build_expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AstNode::Call {
                    callee: Box::new(base),
                    args,
                })
            }
            Rule::field_access => {
                let field = Self::expect_next(&mut pair.into_inner(), span, "field name")?;
                Ok(AstNode::FieldAccess {
                    record: Box::new(base),
                    field: field.as_str().to_string(),
                })
            }
            Rule::index_access => {
                let index = Self::expect_next(&mut pair.into_inner(), span, "index")?;
                Ok(AstNode::IndexAccess {
                    object: Box::new(base),
                    index: Box::new(self.build_expr(index)?),
                })
            }
            other => Err(ParseError::at(
                &pair,
                format!("Unexpected accessor rule: {:?}", other),
            )),
        }
    }
}
