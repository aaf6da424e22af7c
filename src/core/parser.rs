//! Purpose: Build an `Expr` tree from the token stream of one literal document.
//! Exports: `parse`.
//! Role: Accepts the full expression grammar so that out-of-grammar constructs
//! reach the validator as named nodes; only malformed text fails here.
//! Invariants: Exactly one expression per document; surrounding blank lines are allowed.
//! Invariants: Node positions are the position of the node's first token.
//! Invariants: No tree taller than `MAX_NESTING` is ever built; deeper input is a grammar error.

use crate::core::ast::{BinaryOp, ComprehensionKind, Expr, ExprKind, Keyword, UnaryOp};
use crate::core::diagnostic::{Pos, SourceMap};
use crate::core::error::{Error, ErrorKind};
use crate::core::lexer::{self, Keyword as Kw, Token, TokenKind};
use crate::core::stack::ensure_sufficient_stack;

/// Deepest expression tree a document may produce, counted in nodes.
pub const MAX_NESTING: usize = 64;

pub fn parse(source: &SourceMap<'_>) -> Result<Expr, Error> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        idx: 0,
        depth: 0,
    };
    parser.document()
}

struct Parser<'s, 'a> {
    source: &'s SourceMap<'a>,
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Token {
        let idx = self.idx.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.idx + n).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.idx += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_keyword(&self, keyword: Kw) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(found) if *found == keyword)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Kw) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, Error> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    fn grammar_error(&self, pos: Pos, message: &str) -> Error {
        self.source.error(ErrorKind::Grammar, pos, message)
    }

    /// Error for the current token: EOF gets its own message.
    fn unexpected(&self) -> Error {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            self.grammar_error(self.source.end_pos(), "unexpected EOF while parsing")
        } else {
            self.grammar_error(token.pos, "invalid syntax")
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn too_deep(&self, pos: Pos) -> Error {
        self.grammar_error(pos, "too many nested expressions")
    }

    fn nested<T>(
        &mut self,
        pos: Pos,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.depth >= MAX_NESTING {
            return Err(self.too_deep(pos));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    /// Builds a node with children, rejecting it when the tree grows past the limit.
    fn node(&self, kind: ExprKind, pos: Pos) -> Result<Expr, Error> {
        let expr = Expr::new(kind, pos);
        if expr.height() as usize > MAX_NESTING {
            return Err(self.too_deep(pos));
        }
        Ok(expr)
    }

    fn document(&mut self) -> Result<Expr, Error> {
        self.skip_newlines();
        let expr = self.test()?;
        self.skip_newlines();
        if !self.at(&TokenKind::Eof) {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn test(&mut self) -> Result<Expr, Error> {
        let pos = self.peek().pos;
        self.nested(pos, Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, Error> {
        if self.at_keyword(Kw::Lambda) {
            return self.lambda();
        }
        let body = self.or_test()?;
        if !self.eat_keyword(Kw::If) {
            return Ok(body);
        }
        let test = self.or_test()?;
        if !self.eat_keyword(Kw::Else) {
            return Err(self.unexpected());
        }
        let orelse = self.test()?;
        let pos = body.pos;
        self.node(
            ExprKind::IfExp {
                body: Box::new(body),
                test: Box::new(test),
                orelse: Box::new(orelse),
            },
            pos,
        )
    }

    fn lambda(&mut self) -> Result<Expr, Error> {
        let start = self.advance();
        while !self.at(&TokenKind::Colon) {
            match self.peek_kind() {
                TokenKind::Ident(_)
                | TokenKind::Comma
                | TokenKind::Assign
                | TokenKind::Star
                | TokenKind::DoubleStar => {
                    self.advance();
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.advance();
        let body = self.test()?;
        self.node(
            ExprKind::Lambda {
                body: Box::new(body),
            },
            start.pos,
        )
    }

    fn or_test(&mut self) -> Result<Expr, Error> {
        self.bool_chain(Kw::Or, Self::and_test)
    }

    fn and_test(&mut self) -> Result<Expr, Error> {
        self.bool_chain(Kw::And, Self::not_test)
    }

    fn bool_chain(
        &mut self,
        keyword: Kw,
        operand: fn(&mut Self) -> Result<Expr, Error>,
    ) -> Result<Expr, Error> {
        let first = operand(self)?;
        if !self.at_keyword(keyword) {
            return Ok(first);
        }
        let pos = first.pos;
        let mut values = vec![first];
        while self.eat_keyword(keyword) {
            values.push(operand(self)?);
        }
        self.node(ExprKind::BoolOp(values), pos)
    }

    fn not_test(&mut self) -> Result<Expr, Error> {
        if self.at_keyword(Kw::Not) {
            let start = self.advance();
            let operand = self.nested(start.pos, Self::not_test)?;
            return self.node(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                start.pos,
            );
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, Error> {
        let left = self.bit_or()?;
        let mut rest = Vec::new();
        while self.eat_comparison_op() {
            rest.push(self.bit_or()?);
        }
        if rest.is_empty() {
            return Ok(left);
        }
        let pos = left.pos;
        self.node(
            ExprKind::Compare {
                left: Box::new(left),
                rest,
            },
            pos,
        )
    }

    fn eat_comparison_op(&mut self) -> bool {
        match self.peek_kind() {
            TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LtEq
            | TokenKind::GtEq
            | TokenKind::EqEq
            | TokenKind::NotEq
            | TokenKind::Keyword(Kw::In) => {
                self.advance();
                true
            }
            TokenKind::Keyword(Kw::Is) => {
                self.advance();
                self.eat_keyword(Kw::Not);
                true
            }
            TokenKind::Keyword(Kw::Not)
                if matches!(self.peek_nth_kind(1), TokenKind::Keyword(Kw::In)) =>
            {
                self.advance();
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, Error>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expr, Error> {
        let mut left = operand(self)?;
        while let Some(op) = op_for(self.peek_kind()) {
            self.advance();
            let right = operand(self)?;
            let pos = left.pos;
            left = self.node(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                pos,
            )?;
        }
        Ok(left)
    }

    fn bit_or(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::bit_xor, |kind| {
            (*kind == TokenKind::Pipe).then_some(BinaryOp::BitOr)
        })
    }

    fn bit_xor(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::bit_and, |kind| {
            (*kind == TokenKind::Caret).then_some(BinaryOp::BitXor)
        })
    }

    fn bit_and(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::shift, |kind| {
            (*kind == TokenKind::Amp).then_some(BinaryOp::BitAnd)
        })
    }

    fn shift(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::arith, |kind| match kind {
            TokenKind::Shl => Some(BinaryOp::Shl),
            TokenKind::Shr => Some(BinaryOp::Shr),
            _ => None,
        })
    }

    fn arith(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::term, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expr, Error> {
        self.binary_level(Self::factor, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::DoubleSlash => Some(BinaryOp::FloorDiv),
            TokenKind::Percent => Some(BinaryOp::Mod),
            TokenKind::At => Some(BinaryOp::MatMul),
            _ => None,
        })
    }

    fn factor(&mut self) -> Result<Expr, Error> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.power(),
        };
        let start = self.advance();
        let operand = self.nested(start.pos, Self::factor)?;
        self.node(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            start.pos,
        )
    }

    fn power(&mut self) -> Result<Expr, Error> {
        let base = self.primary()?;
        let pos = base.pos;
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.nested(pos, Self::factor)?;
        self.node(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinaryOp::Pow,
                right: Box::new(exponent),
            },
            pos,
        )
    }

    fn primary(&mut self) -> Result<Expr, Error> {
        let mut expr = self.atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    expr = self.call(expr)?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.subscript()?;
                    let pos = expr.pos;
                    expr = self.node(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    )?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let TokenKind::Ident(attr) = self.peek_kind().clone() else {
                        return Err(self.unexpected());
                    };
                    self.advance();
                    let pos = expr.pos;
                    expr = self.node(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        pos,
                    )?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Argument list after an opening parenthesis; consumes the closing one.
    fn call(&mut self, func: Expr) -> Result<Expr, Error> {
        let pos = func.pos;
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        let mut seen_keyword = false;

        while !self.at(&TokenKind::RParen) {
            let token_pos = self.peek().pos;
            match self.peek_kind() {
                TokenKind::Star => {
                    self.advance();
                    let value = self.test()?;
                    args.push(self.node(ExprKind::Starred(Box::new(value)), token_pos)?);
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    let value = self.test()?;
                    args.push(self.node(ExprKind::DoubleStarred(Box::new(value)), token_pos)?);
                    seen_keyword = true;
                }
                TokenKind::Ident(name)
                    if matches!(self.peek_nth_kind(1), TokenKind::Assign) =>
                {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    let value = self.test()?;
                    keywords.push(Keyword {
                        name,
                        value,
                        pos: token_pos,
                    });
                    seen_keyword = true;
                }
                _ => {
                    let value = self.test()?;
                    if self.at_keyword(Kw::For) {
                        let element = self.comprehension(ComprehensionKind::Generator, value)?;
                        args.push(element);
                    } else {
                        if seen_keyword {
                            return Err(self.grammar_error(
                                token_pos,
                                "positional argument follows keyword argument",
                            ));
                        }
                        args.push(value);
                    }
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        self.node(
            ExprKind::Call {
                func: Box::new(func),
                args,
                keywords,
            },
            pos,
        )
    }

    /// Subscript body after an opening bracket; slices collapse to their first bound.
    fn subscript(&mut self) -> Result<Expr, Error> {
        let pos = self.peek().pos;
        let mut index = None;
        while !self.at(&TokenKind::RBracket) {
            if self.eat(&TokenKind::Colon) || self.eat(&TokenKind::Comma) {
                continue;
            }
            let part = self.test()?;
            index.get_or_insert(part);
        }
        self.advance();
        Ok(index.unwrap_or_else(|| Expr::new(ExprKind::None, pos)))
    }

    /// Element that may be a `*x` splat inside a display.
    fn display_element(&mut self) -> Result<Expr, Error> {
        if self.at(&TokenKind::Star) {
            let star = self.advance();
            let value = self.bit_or()?;
            return self.node(ExprKind::Starred(Box::new(value)), star.pos);
        }
        self.test()
    }

    /// Parses `for ... in ...` clauses following `element`; the result is
    /// positioned at the element.
    fn comprehension(&mut self, kind: ComprehensionKind, element: Expr) -> Result<Expr, Error> {
        self.comprehension_at(kind, element.pos, element)
    }

    fn comprehension_at(
        &mut self,
        kind: ComprehensionKind,
        pos: Pos,
        element: Expr,
    ) -> Result<Expr, Error> {
        while self.eat_keyword(Kw::For) {
            loop {
                self.bit_or()?;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            if !self.eat_keyword(Kw::In) {
                return Err(self.unexpected());
            }
            self.or_test()?;
            while self.eat_keyword(Kw::If) {
                self.or_test()?;
            }
        }
        self.node(
            ExprKind::Comprehension {
                kind,
                element: Box::new(element),
            },
            pos,
        )
    }

    fn atom(&mut self) -> Result<Expr, Error> {
        let token = self.peek().clone();
        let pos = token.pos;
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(value), pos))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(value), pos))
            }
            TokenKind::Imaginary(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Imaginary(value), pos))
            }
            TokenKind::Str { .. } | TokenKind::Bytes(_) => self.strings(),
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(name), pos))
            }
            TokenKind::Keyword(Kw::None) => {
                self.advance();
                Ok(Expr::new(ExprKind::None, pos))
            }
            TokenKind::Keyword(Kw::True) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            TokenKind::Keyword(Kw::False) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            TokenKind::LParen => {
                self.advance();
                self.paren_display(pos)
            }
            TokenKind::LBracket => {
                self.advance();
                self.list_display(pos)
            }
            TokenKind::LBrace => {
                self.advance();
                self.brace_display(pos)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Adjacent string literals concatenate; bytes and text cannot mix.
    fn strings(&mut self) -> Result<Expr, Error> {
        let pos = self.peek().pos;
        let mut text = String::new();
        let mut bytes: Vec<u8> = Vec::new();
        let mut is_bytes = None;
        let mut formatted = false;

        loop {
            let token_is_bytes = match self.peek_kind() {
                TokenKind::Str { .. } => false,
                TokenKind::Bytes(_) => true,
                _ => break,
            };
            if *is_bytes.get_or_insert(token_is_bytes) != token_is_bytes {
                return Err(self.grammar_error(pos, "cannot mix bytes and nonbytes literals"));
            }
            match self.advance().kind {
                TokenKind::Str {
                    value,
                    formatted: is_formatted,
                } => {
                    text.push_str(&value);
                    formatted |= is_formatted;
                }
                TokenKind::Bytes(value) => bytes.extend_from_slice(&value),
                _ => {}
            }
        }

        let kind = if is_bytes == Some(true) {
            ExprKind::Bytes(bytes)
        } else if formatted {
            ExprKind::FormattedString(text)
        } else {
            ExprKind::Str(text)
        };
        Ok(Expr::new(kind, pos))
    }

    fn paren_display(&mut self, pos: Pos) -> Result<Expr, Error> {
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
        }
        let first = self.display_element()?;
        if self.at_keyword(Kw::For) {
            let comp = self.comprehension_at(ComprehensionKind::Generator, pos, first)?;
            self.expect(&TokenKind::RParen)?;
            return Ok(comp);
        }
        if self.eat(&TokenKind::RParen) {
            // Grouping parentheses; a lone splat is still a tuple element.
            if matches!(first.kind, ExprKind::Starred(_)) {
                return Err(self.grammar_error(first.pos, "invalid syntax"));
            }
            return Ok(first);
        }
        self.expect(&TokenKind::Comma)?;
        let mut items = vec![first];
        self.sequence_tail(&TokenKind::RParen, &mut items)?;
        self.node(ExprKind::Tuple(items), pos)
    }

    fn list_display(&mut self, pos: Pos) -> Result<Expr, Error> {
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), pos));
        }
        let first = self.display_element()?;
        if self.at_keyword(Kw::For) {
            let comp = self.comprehension_at(ComprehensionKind::List, pos, first)?;
            self.expect(&TokenKind::RBracket)?;
            return Ok(comp);
        }
        let mut items = vec![first];
        if self.eat(&TokenKind::Comma) {
            self.sequence_tail(&TokenKind::RBracket, &mut items)?;
        } else {
            self.expect(&TokenKind::RBracket)?;
        }
        self.node(ExprKind::List(items), pos)
    }

    /// Remaining comma-separated elements up to and including `close`.
    fn sequence_tail(&mut self, close: &TokenKind, items: &mut Vec<Expr>) -> Result<(), Error> {
        while !self.at(close) {
            items.push(self.display_element()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(())
    }

    fn brace_display(&mut self, pos: Pos) -> Result<Expr, Error> {
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), pos));
        }

        if self.at(&TokenKind::DoubleStar) {
            return self.dict_display(pos, Vec::new());
        }

        let first = self.display_element()?;
        if self.eat(&TokenKind::Colon) {
            let value = self.test()?;
            if self.at_keyword(Kw::For) {
                let comp = self.comprehension_at(ComprehensionKind::Dict, pos, first)?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(comp);
            }
            let entries = vec![(first, value)];
            if self.eat(&TokenKind::Comma) {
                return self.dict_display(pos, entries);
            }
            self.expect(&TokenKind::RBrace)?;
            return self.node(ExprKind::Dict(entries), pos);
        }

        if self.at_keyword(Kw::For) {
            let comp = self.comprehension_at(ComprehensionKind::Set, pos, first)?;
            self.expect(&TokenKind::RBrace)?;
            return Ok(comp);
        }
        let mut items = vec![first];
        if self.eat(&TokenKind::Comma) {
            self.sequence_tail(&TokenKind::RBrace, &mut items)?;
        } else {
            self.expect(&TokenKind::RBrace)?;
        }
        self.node(ExprKind::Set(items), pos)
    }

    /// Remaining `key: value` entries (or `**mapping` splats) up to the closing brace.
    fn dict_display(&mut self, pos: Pos, mut entries: Vec<(Expr, Expr)>) -> Result<Expr, Error> {
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::DoubleStar) {
                let star = self.advance();
                let value = self.bit_or()?;
                let splat = self.node(ExprKind::DoubleStarred(Box::new(value)), star.pos)?;
                let placeholder = Expr::new(ExprKind::None, star.pos);
                entries.push((splat, placeholder));
            } else {
                let key = self.test()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.test()?;
                entries.push((key, value));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        self.node(ExprKind::Dict(entries), pos)
    }
}
