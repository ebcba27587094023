//! Expression grammar
//!
//! Precedence climbing, lowest first: `or`, `and`, relational (`== != <> < <=
//! > >= in`, `not in`), additive, multiplicative, power (right associative),
//! unary, primary. Filters attach to primaries and bind tighter than any
//! operator.

use super::Parser;
use crate::engine::ast::{BinaryOp, Expr, FilterCall, Segment, UnaryOp, VariablePath};
use crate::engine::error::Error;
use crate::engine::lexer::{Token, TokenKind};
use crate::engine::value::Value;

impl<'a> Parser<'a> {
    pub fn parse_expression(&mut self) -> Result<Expr, Error> {
        self.nested(|p| p.parse_or())
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "expression is nested deeper than {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, token: &Token) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            position: token.position(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_and()?;
        while let Some(token) = self.match_keyword("or").or_else(|| self.match_symbol("||")) {
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs, token);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_relational()?;
        while let Some(token) = self.match_keyword("and").or_else(|| self.match_symbol("&&")) {
            let rhs = self.parse_relational()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs, token);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, Error> {
        let lhs = self.parse_additive()?;
        let Some(token) = self.current() else {
            return Ok(lhs);
        };
        let op = match (token.kind, token.val.as_str()) {
            (TokenKind::Symbol, "==") => BinaryOp::Eq,
            (TokenKind::Symbol, "!=") | (TokenKind::Symbol, "<>") => BinaryOp::Ne,
            (TokenKind::Symbol, "<") => BinaryOp::Lt,
            (TokenKind::Symbol, "<=") => BinaryOp::Le,
            (TokenKind::Symbol, ">") => BinaryOp::Gt,
            (TokenKind::Symbol, ">=") => BinaryOp::Ge,
            (TokenKind::Keyword, "in") => BinaryOp::In,
            (TokenKind::Keyword, "not") if self.peek(1).map_or(false, |t| t.is_keyword("in")) => {
                self.idx += 1;
                BinaryOp::NotIn
            }
            _ => return Ok(lhs),
        };
        self.idx += 1;
        let rhs = self.parse_additive()?;
        Ok(Self::binary(op, lhs, rhs, token))
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.peek_symbol("+") {
                BinaryOp::Add
            } else if self.peek_symbol("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let Some(token) = self.consume() else {
                return Ok(lhs);
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(op, lhs, rhs, token);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = if self.peek_symbol("*") {
                BinaryOp::Mul
            } else if self.peek_symbol("/") {
                BinaryOp::Div
            } else if self.peek_symbol("%") {
                BinaryOp::Mod
            } else {
                return Ok(lhs);
            };
            let Some(token) = self.consume() else {
                return Ok(lhs);
            };
            let rhs = self.parse_power()?;
            lhs = Self::binary(op, lhs, rhs, token);
        }
    }

    fn parse_power(&mut self) -> Result<Expr, Error> {
        let base = self.parse_unary()?;
        match self.match_symbol("^") {
            Some(token) => {
                let exponent = self.nested(|p| p.parse_power())?;
                Ok(Self::binary(BinaryOp::Pow, base, exponent, token))
            }
            None => Ok(base),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let op = match self.current() {
            Some(t) if t.is_symbol("-") => UnaryOp::Minus,
            Some(t) if t.is_symbol("+") => UnaryOp::Plus,
            Some(t) if t.is_symbol("!") || t.is_keyword("not") => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let Some(token) = self.consume() else {
            return self.parse_primary();
        };
        let operand = self.nested(|p| p.parse_unary())?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            position: token.position(),
        })
    }

    /// An operand followed by its filter chain
    pub fn parse_primary(&mut self) -> Result<Expr, Error> {
        let expr = self.parse_operand()?;
        let mut filters = Vec::new();
        while self.match_symbol("|").is_some() {
            filters.push(self.parse_filter_call()?);
        }
        if filters.is_empty() {
            Ok(expr)
        } else {
            Ok(Expr::Filtered {
                expr: Box::new(expr),
                filters,
            })
        }
    }

    /// `name` or `name:arg` of a single filter
    pub fn parse_filter_call(&mut self) -> Result<FilterCall, Error> {
        let token = self
            .match_kind(TokenKind::Identifier)
            .ok_or_else(|| self.error("expected a filter name"))?;
        if self.registry().is_filter_banned(&token.val) {
            return Err(Error::parse(
                token.position(),
                format!(
                    "usage of filter '{}' is not allowed (sandbox restriction active)",
                    token.val
                ),
            ));
        }
        let func = self.registry().filter(&token.val).cloned().ok_or_else(|| {
            Error::parse(token.position(), format!("filter '{}' does not exist", token.val))
        })?;
        let arg = if self.match_symbol(":").is_some() {
            Some(self.nested(|p| p.parse_operand())?)
        } else {
            None
        };
        Ok(FilterCall {
            name: token.val.clone(),
            arg,
            position: token.position(),
            func,
        })
    }

    /// `a|b:1|c` as used by the `filter` tag
    pub fn parse_filter_chain(&mut self) -> Result<Vec<FilterCall>, Error> {
        let mut filters = vec![self.parse_filter_call()?];
        while self.match_symbol("|").is_some() {
            filters.push(self.parse_filter_call()?);
        }
        Ok(filters)
    }

    fn parse_operand(&mut self) -> Result<Expr, Error> {
        let Some(token) = self.current() else {
            return Err(self.error("expected an expression"));
        };
        match token.kind {
            TokenKind::Symbol if token.val == "(" => {
                self.idx += 1;
                let expr = self.nested(|p| p.parse_expression())?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            TokenKind::Symbol if token.val == "[" => {
                self.idx += 1;
                let items = self.parse_list("]")?;
                Ok(Expr::Array(items))
            }
            TokenKind::Number => self.parse_number(),
            TokenKind::String => {
                self.idx += 1;
                Ok(Expr::Literal(Value::from(token.val.as_str())))
            }
            TokenKind::Keyword if token.val == "true" || token.val == "false" => {
                self.idx += 1;
                Ok(Expr::Literal(Value::Bool(token.val == "true")))
            }
            TokenKind::Identifier => self.parse_variable(),
            _ => Err(Error::parse(
                token.position(),
                format!("unexpected {} in expression", token),
            )),
        }
    }

    /// An integer, or a float written as number `.` number
    fn parse_number(&mut self) -> Result<Expr, Error> {
        let Some(token) = self.consume() else {
            return Err(self.error("expected a number"));
        };
        let fraction = match (self.current(), self.peek(1)) {
            (Some(dot), Some(digits)) if dot.is_symbol(".") && digits.kind == TokenKind::Number => {
                Some(digits)
            }
            _ => None,
        };
        if let Some(digits) = fraction {
            self.idx += 2;
            let text = format!("{}.{}", token.val, digits.val);
            let value = text.parse::<f64>().map_err(|_| {
                Error::parse(token.position(), format!("invalid float literal '{}'", text))
            })?;
            return Ok(Expr::Literal(Value::Float(value)));
        }
        let value = token.val.parse::<i64>().map_err(|_| {
            Error::parse(
                token.position(),
                format!("integer literal '{}' is out of range", token.val),
            )
        })?;
        Ok(Expr::Literal(Value::Int(value)))
    }

    fn parse_variable(&mut self) -> Result<Expr, Error> {
        let Some(token) = self.consume() else {
            return Err(self.error("expected a variable"));
        };
        let mut segments = Vec::new();
        loop {
            if self.peek_symbol(".") {
                let segment = match self.peek(1) {
                    Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::Keyword) => {
                        Segment::Attr(t.val.clone())
                    }
                    Some(t) if t.kind == TokenKind::Number => {
                        let index = t.val.parse::<i64>().map_err(|_| {
                            Error::parse(t.position(), format!("index '{}' is out of range", t.val))
                        })?;
                        Segment::Index(index)
                    }
                    _ => {
                        self.idx += 1;
                        return Err(self.error("expected a name or an index after '.'"));
                    }
                };
                self.idx += 2;
                segments.push(segment);
            } else if self.match_symbol("[").is_some() {
                let key = self.nested(|p| p.parse_expression())?;
                self.expect_symbol("]")?;
                segments.push(Segment::Subscript(key));
            } else if self.match_symbol("(").is_some() {
                let args = self.parse_list(")")?;
                segments.push(Segment::Call(args));
            } else {
                break;
            }
        }
        Ok(Expr::Variable(VariablePath {
            name: token.val.clone(),
            segments,
            position: token.position(),
        }))
    }

    /// Comma separated expressions up to `close`, which is consumed
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expr>, Error> {
        let mut items = Vec::new();
        if self.match_symbol(close).is_some() {
            return Ok(items);
        }
        loop {
            items.push(self.nested(|p| p.parse_expression())?);
            if self.match_symbol(",").is_some() {
                continue;
            }
            self.expect_symbol(close)?;
            return Ok(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::context::Context;
    use crate::engine::set::TemplateSet;

    fn eval(expr: &str) -> String {
        let set = TemplateSet::new("test", Vec::new());
        let tpl = set.from_string(&format!("{{{{ {} }}}}", expr)).unwrap();
        let mut ctx = Context::new();
        ctx.insert("items", vec![1, 2, 3]);
        ctx.insert("name", "tessera");
        ctx.insert("zero", 0);
        tpl.execute(&ctx).unwrap()
    }

    fn compile_err(expr: &str) -> String {
        let set = TemplateSet::new("test", Vec::new());
        set.from_string(&format!("{{{{ {} }}}}", expr))
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("(1 + 2) * 3"), "9");
        assert_eq!(eval("2 ^ 3 ^ 2"), "512");
        assert_eq!(eval("-2 ^ 2"), "4");
        assert_eq!(eval("10 - 4 - 3"), "3");
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(eval("true or false and false"), "True");
        assert_eq!(eval("(true or false) and false"), "False");
    }

    #[test]
    fn test_unary_is_reentrant() {
        assert_eq!(eval("- - 3"), "3");
        assert_eq!(eval("not not true"), "True");
        assert_eq!(eval("!zero"), "True");
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(eval("1.5 + 1"), "2.5");
        assert_eq!(eval("items.0"), "1");
        assert_eq!(eval("1.05 * 2"), "2.1");
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("2 in items"), "True");
        assert_eq!(eval("5 not in items"), "True");
        assert_eq!(eval("\"ess\" in name"), "True");
    }

    #[test]
    fn test_array_literal_and_filters() {
        assert_eq!(eval("[1, 2, 3]|length"), "3");
        assert_eq!(eval("name|upper|length"), "7");
        assert_eq!(eval("items|join:\"-\""), "1-2-3");
    }

    #[test]
    fn test_unknown_filter_position() {
        let set = TemplateSet::new("test", Vec::new());
        let err = set.from_string("{{ name|nope }}").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (1, 9));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(compile_err(&deep).contains("nested deeper"));
        let unary = format!("{}1", "-".repeat(500));
        assert!(compile_err(&unary).contains("nested deeper"));
    }

    #[test]
    fn test_integer_out_of_range() {
        assert!(compile_err("99999999999999999999").contains("out of range"));
    }

    #[test]
    fn test_non_associative_relational() {
        assert!(compile_err("1 < 2 < 3").contains("unexpected"));
    }

    #[test]
    fn test_missing_paths_render_empty() {
        assert_eq!(eval("missing"), "");
        assert_eq!(eval("missing.deeper.still"), "");
    }
}
