use crate::ast::AstNode;
use crate::parser::{AstParser, ParseError};
use crate::pest_parser::Rule;
use pest::iterators::Pair;

impl AstParser {
    pub(super) fn build_statement(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let inner = Self::expect_next(&mut pair.into_inner(), span, "statement")?;

        match inner.as_rule() {
            Rule::let_statement => self.build_binding(inner, false),
            Rule::mut_statement => self.build_binding(inner, true),
            Rule::return_statement => self.build_return_statement(inner),
            Rule::throw_statement => self.build_throw_statement(inner),
            Rule::while_statement => self.build_while_statement(inner),
            Rule::assignment => self.build_assignment(inner),
            Rule::expr => self.build_expr(inner),
            other => Err(ParseError::at(
                &inner,
                format!("Unexpected statement rule: {:?}", other),
            )),
        }
    }

    fn build_binding(&mut self, pair: Pair<Rule>, mutable: bool) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        // Grammar: ("let" | "mut") ~ identifier ~ "=" ~ expr
        let name = Self::expect_next(&mut inner, span, "binding name")?
            .as_str()
            .to_string();
        let initializer = Self::expect_next(&mut inner, span, "initializer")?;

        Ok(AstNode::VariableDecl {
            name,
            mutable,
            initializer: Box::new(self.build_expr(initializer)?),
        })
    }

    fn build_return_statement(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let value = match pair.into_inner().next() {
            Some(expr) => Some(Box::new(self.build_expr(expr)?)),
            None => None,
        };
        Ok(AstNode::Return(value))
    }

    fn build_throw_statement(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let value = Self::expect_next(&mut pair.into_inner(), span, "thrown value")?;
        Ok(AstNode::Throw(Box::new(self.build_expr(value)?)))
    }

    fn build_while_statement(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        let condition = Self::expect_next(&mut inner, span, "loop condition")?;
        let body = Self::expect_next(&mut inner, span, "loop body")?;

        Ok(AstNode::While {
            condition: Box::new(self.build_expr(condition)?),
            body: Box::new(self.build_block(body)?),
        })
    }

    fn build_assignment(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        let target = Self::expect_next(&mut inner, span, "assignment target")?;
        let value = Self::expect_next(&mut inner, span, "assigned value")?;

        Ok(AstNode::Assignment {
            target: Box::new(self.build_assign_target(target)?),
            value: Box::new(self.build_expr(value)?),
        })
    }

    fn build_assign_target(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        let span = pair.as_span();
        let mut inner = pair.into_inner();

        // Grammar: identifier ~ (field_access | index_access)*
        let root = Self::expect_next(&mut inner, span, "assignment target")?;
        let mut target = AstNode::VariableRef(root.as_str().to_string());
        for accessor in inner {
            target = self.apply_accessor(target, accessor)?;
        }
        Ok(target)
    }

    pub(super) fn build_block(&mut self, pair: Pair<Rule>) -> Result<AstNode, ParseError> {
        if pair.as_rule() != Rule::block {
            return Err(ParseError::at(
                &pair,
                format!("Expected block, got {:?}", pair.as_rule()),
            ));
        }

        let statements = pair
            .into_inner()
            .map(|statement| self.build_statement(statement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AstNode::Block(statements))
    }
}
