//! Recursive-descent parser producing the AST the evaluator consumes. The surface
//! grammar favors a small, internally consistent set of productions over exhaustive
//! coverage of every punctuation corner a joke language could invent.

use crate::ast::{
    BinOp, ClassDecl, DeleteTarget, Expr, FunctionDecl, Literal, LifetimeKind, Mutability, ObjectPatternField, Pattern,
    Pos, PostfixKind, PropertyDecl, Stmt, TriLit, WhenDecl,
};
use crate::error::{ErrorKind, JestError, JestResult};
use crate::lexer::{Lexer, Token, TokenKind};

pub fn parse(source: &str) -> JestResult<Vec<Stmt>> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn cur_pos(&self) -> Pos {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> JestResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(JestError::at(
                ErrorKind::UnexpectedToken,
                format!("expected {kind:?}, found {:?}", self.peek()),
                self.cur_pos(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> JestResult<String> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(JestError::at(
                ErrorKind::UnexpectedToken,
                format!("expected identifier, found {other:?}"),
                self.cur_pos(),
            )),
        }
    }

    /// Consumes a trailing run of `!` (returning how many, used as declaration
    /// priority), a lone `?` terminator, or a `;`. Any of these may be absent at a
    /// block boundary.
    fn consume_terminator(&mut self) -> u32 {
        let mut bangs = 0u32;
        while self.eat(&TokenKind::Bang) {
            bangs += 1;
        }
        if bangs == 0 {
            let _ = self.eat(&TokenKind::Terminator) || self.eat(&TokenKind::Semicolon);
        }
        bangs
    }

    fn at_stmt_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof | TokenKind::RBrace)
    }

    fn parse_program(&mut self) -> JestResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> JestResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        match self.peek().clone() {
            TokenKind::Var | TokenKind::Const => self.parse_decl_statement(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Break => {
                self.advance();
                self.consume_terminator();
                Ok(Stmt::Break(pos))
            }
            TokenKind::Continue => {
                self.advance();
                self.consume_terminator();
                Ok(Stmt::Continue(pos))
            }
            TokenKind::Return => {
                self.advance();
                let value =
                    if self.at_stmt_end() || matches!(self.peek(), TokenKind::Bang | TokenKind::Terminator) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                self.consume_terminator();
                Ok(Stmt::Return(value, pos))
            }
            TokenKind::When => self.parse_when(),
            TokenKind::Delete => self.parse_delete(),
            TokenKind::Function => Ok(Stmt::Function(self.parse_function_decl()?, pos)),
            TokenKind::Class => self.parse_class(),
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Stmt::Block(body, pos))
            }
            TokenKind::Reverse | TokenKind::Forward => self.parse_history_move(),
            TokenKind::Identifier(_) if self.is_assignment_ahead() => self.parse_assign(),
            _ => self.parse_expr_statement(),
        }
    }

    /// `reverse x!` / `forward x!` are sugar for an expression statement calling the
    /// corresponding builtin, keeping the evaluator's history-cursor API uniform.
    fn parse_history_move(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        let is_reverse = matches!(self.peek(), TokenKind::Reverse);
        self.advance();
        let name = self.expect_identifier()?;
        self.consume_terminator();
        let callee_name = if is_reverse { "reverse" } else { "forward" };
        let expr = Expr::Call {
            callee: Box::new(Expr::Identifier(callee_name.to_owned(), pos)),
            args: vec![Expr::Identifier(name, pos)],
            pos,
        };
        Ok(Stmt::ExpressionStatement { expr, debug_print: false, pos })
    }

    /// Distinguishes `name = expr` from a bare expression statement starting with an
    /// identifier (e.g. a call or postfix update) by looking for `=` before any
    /// operator/terminator that would start an expression of its own.
    fn is_assignment_ahead(&self) -> bool {
        matches!(self.peek_at(1), TokenKind::Assign)
    }

    fn parse_assign(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expr()?;
        self.consume_terminator();
        Ok(Stmt::Assign { name, value, pos })
    }

    fn parse_decl_statement(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        let word1 = self.advance().kind;
        let word2_tok = self.peek().clone();
        if !matches!(word2_tok, TokenKind::Var | TokenKind::Const) {
            return Err(JestError::at(
                ErrorKind::UnexpectedToken,
                "declarations need two mutability tokens (e.g. 'var var', 'const const')",
                pos,
            ));
        }
        let word2 = self.advance().kind;

        if matches!(word1, TokenKind::Const) && matches!(word2, TokenKind::Const) && self.check(&TokenKind::Const) {
            self.advance();
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Assign)?;
            let init = self.parse_expr()?;
            self.consume_terminator();
            return Ok(Stmt::ConstConstConst { name, init, pos });
        }

        let mutability = match (word1, word2) {
            (TokenKind::Var, TokenKind::Var) => Mutability::VarVar,
            (TokenKind::Var, TokenKind::Const) => Mutability::VarConst,
            (TokenKind::Const, TokenKind::Var) => Mutability::ConstVar,
            (TokenKind::Const, TokenKind::Const) => Mutability::ConstConst,
            _ => unreachable!("checked above"),
        };

        let name = self.expect_identifier()?;
        let lifetime = self.parse_optional_lifetime()?;
        self.expect(&TokenKind::Assign)?;
        let init = self.parse_expr()?;
        let bangs = self.consume_terminator();
        let priority = bangs.max(1);
        Ok(Stmt::VarDecl { mutability, name, priority, lifetime, init, pos })
    }

    /// `@10` (lines) or `@10s` (seconds) right after the declared name, before `=`.
    fn parse_optional_lifetime(&mut self) -> JestResult<LifetimeKind> {
        if !self.eat(&TokenKind::At) {
            return Ok(LifetimeKind::None);
        }
        if let TokenKind::Identifier(word) = self.peek().clone() {
            if word == "infinity" {
                self.advance();
                return Ok(LifetimeKind::Infinity);
            }
        }
        let TokenKind::Number(n) = self.peek().clone() else {
            return Err(JestError::at(ErrorKind::UnexpectedToken, "expected a lifetime length", self.cur_pos()));
        };
        self.advance();
        if let TokenKind::Identifier(unit) = self.peek().clone() {
            if unit == "s" {
                self.advance();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                return Ok(LifetimeKind::Seconds(n as u64));
            }
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(LifetimeKind::Lines(n as u64))
    }

    fn parse_if(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        let idk_branch = if self.check(&TokenKind::Idk) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, idk_branch, pos })
    }

    fn parse_while(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body, pos })
    }

    fn parse_function_decl(&mut self) -> JestResult<FunctionDecl> {
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let mut parameters = Vec::new();
        while !self.check(&TokenKind::RParen) {
            parameters.push(self.expect_identifier()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDecl { name, parameters, body })
    }

    fn parse_class(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace)?;
        let mut properties = Vec::new();
        let mut instance_methods = Vec::new();
        let mut static_methods = Vec::new();
        let mut instance_fallback = None;
        let mut static_fallback = None;

        while !self.check(&TokenKind::RBrace) {
            let is_fallback = self.eat(&TokenKind::At);
            let is_static = self.eat(&TokenKind::Static);
            if self.check(&TokenKind::Function) {
                let decl = self.parse_function_decl()?;
                if is_static {
                    static_methods.push(decl);
                } else {
                    instance_methods.push(decl);
                }
                continue;
            }
            let prop_name = self.expect_identifier()?;
            let initializer = if self.eat(&TokenKind::Assign) { Some(self.parse_expr()?) } else { None };
            self.consume_terminator();
            if is_fallback {
                if is_static {
                    static_fallback = Some(prop_name.clone());
                } else {
                    instance_fallback = Some(prop_name.clone());
                }
            }
            properties.push(PropertyDecl { name: prop_name, is_static, initializer });
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Stmt::Class(
            ClassDecl { name, properties, instance_methods, static_methods, instance_fallback, static_fallback },
            pos,
        ))
    }

    fn parse_when(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let first = self.parse_expr()?;
        let decl = if self.eat(&TokenKind::Matches) {
            let pattern = self.parse_pattern()?;
            let guard = if self.eat(&TokenKind::If) { Some(self.parse_expr()?) } else { None };
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_block()?;
            WhenDecl { condition: first.clone(), pattern: Some((first, pattern, guard)), body }
        } else {
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_block()?;
            WhenDecl { condition: first, pattern: None, body }
        };
        Ok(Stmt::When(decl, pos))
    }

    fn parse_pattern(&mut self) -> JestResult<Pattern> {
        match self.peek().clone() {
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                let mut rest = None;
                while !self.check(&TokenKind::RBracket) {
                    if self.eat(&TokenKind::Ellipsis) {
                        rest = Some(self.expect_identifier()?);
                    } else {
                        elements.push(self.parse_pattern()?);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Pattern::Array { elements, rest })
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    let key = self.expect_identifier()?;
                    self.expect(&TokenKind::Colon)?;
                    let pattern = self.parse_pattern()?;
                    let default = if self.eat(&TokenKind::Assign) { Some(self.parse_expr()?) } else { None };
                    fields.push(ObjectPatternField { key, pattern: Box::new(pattern), default });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Pattern::Object { fields })
            }
            _ => {
                let name = self.expect_identifier()?;
                let default = if self.eat(&TokenKind::Assign) { Some(self.parse_expr()?) } else { None };
                Ok(Pattern::Binding { name, default })
            }
        }
    }

    fn parse_delete(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        if let TokenKind::Identifier(name) = self.peek().clone() {
            let next_is_terminator = matches!(
                self.peek_at(1),
                TokenKind::Bang | TokenKind::Terminator | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            );
            if next_is_terminator {
                self.advance();
                self.consume_terminator();
                return Ok(Stmt::Delete(DeleteTarget::Binding(name), pos));
            }
        }
        let expr = self.parse_expr()?;
        self.consume_terminator();
        Ok(Stmt::Delete(DeleteTarget::Value(expr), pos))
    }

    fn parse_expr_statement(&mut self) -> JestResult<Stmt> {
        let pos = self.cur_pos();
        let expr = self.parse_expr()?;
        let debug_print = self.check(&TokenKind::Terminator);
        self.consume_terminator();
        Ok(Stmt::ExpressionStatement { expr, debug_print, pos })
    }

    // ---- expressions, precedence climbing low to high ----

    fn parse_expr(&mut self) -> JestResult<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> JestResult<Expr> {
        let cond = self.parse_equality()?;
        if self.eat(&TokenKind::Question) {
            let pos = cond.pos();
            let then_branch = self.parse_equality()?;
            self.expect(&TokenKind::Colon)?;
            let else_branch = self.parse_equality()?;
            let maybe_branch =
                if self.eat(&TokenKind::Colon) { Some(Box::new(self.parse_equality()?)) } else { None };
            let undefined_branch =
                if self.eat(&TokenKind::Colon) { Some(Box::new(self.parse_equality()?)) } else { None };
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                maybe_branch,
                undefined_branch,
                pos,
            });
        }
        Ok(cond)
    }

    fn parse_equality(&mut self) -> JestResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqVeryStrict => BinOp::EqVeryStrict,
                TokenKind::EqStrict => BinOp::EqStrict,
                TokenKind::EqLoose => BinOp::EqLoose,
                TokenKind::DiamondRev => BinOp::EqVeryLoose,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), pos };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> JestResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), pos };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> JestResult<Expr> {
        let mut left = self.parse_root_infix()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let right = self.parse_root_infix()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), pos };
        }
        Ok(left)
    }

    fn parse_root_infix(&mut self) -> JestResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while self.check(&TokenKind::Backslash) {
            let pos = self.cur_pos();
            self.advance();
            let degree = self.parse_multiplicative()?;
            left = Expr::RootInfix { base: Box::new(left), degree: Box::new(degree), pos };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> JestResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), pos };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> JestResult<Expr> {
        let pos = self.cur_pos();
        if self.eat(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary { op: crate::ast::UnaryOp::Neg, expr: Box::new(expr), pos });
        }
        if self.eat(&TokenKind::Backslash) {
            let expr = self.parse_unary()?;
            return Ok(Expr::PrefixRoot { expr: Box::new(expr), pos });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> JestResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                TokenKind::LBracket => {
                    let pos = self.cur_pos();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    if self.eat(&TokenKind::Assign) {
                        let value = self.parse_expr()?;
                        expr = Expr::IndexAssign {
                            target: Box::new(expr),
                            index: Box::new(index),
                            value: Box::new(value),
                            pos,
                        };
                    } else {
                        expr = Expr::Index { target: Box::new(expr), index: Box::new(index), pos };
                    }
                }
                TokenKind::LParen => {
                    let pos = self.cur_pos();
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr::Call { callee: Box::new(expr), args, pos };
                }
                TokenKind::PlusRun(n) => {
                    let pos = self.cur_pos();
                    self.advance();
                    expr = Expr::PostfixUpdate {
                        target: Box::new(expr),
                        kind: PostfixKind::Inc,
                        delta: n.saturating_sub(1),
                        pos,
                    };
                }
                TokenKind::MinusRun(n) => {
                    let pos = self.cur_pos();
                    self.advance();
                    expr = Expr::PostfixUpdate {
                        target: Box::new(expr),
                        kind: PostfixKind::Dec,
                        delta: n.saturating_sub(1),
                        pos,
                    };
                }
                TokenKind::StarsRun(n) => {
                    let pos = self.cur_pos();
                    self.advance();
                    expr = Expr::PowerStars { target: Box::new(expr), delta: n, pos };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> JestResult<Expr> {
        let pos = self.cur_pos();
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n), pos))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s), pos))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Literal::Boolean(TriLit::True), pos)),
                    "false" => Ok(Expr::Literal(Literal::Boolean(TriLit::False), pos)),
                    "maybe" => Ok(Expr::Literal(Literal::Boolean(TriLit::Maybe), pos)),
                    "null" => Ok(Expr::Literal(Literal::Null, pos)),
                    "undefined" => Ok(Expr::Literal(Literal::Undefined, pos)),
                    _ => Ok(Expr::Identifier(name, pos)),
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::ArrayLiteral(elements, pos))
            }
            other => Err(JestError::at(ErrorKind::UnexpectedToken, format!("unexpected token {other:?}"), pos)),
        }
    }
}
