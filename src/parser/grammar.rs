//! Recursive-descent parser with precedence climbing
//!
//! ```text
//! expression := comparison [',' expression]        trailing-condition sugar
//! comparison := additive {cmp additive}            2+ ops -> chained
//! additive   := term {('+'|'-') term}
//! term       := unary {('*'|'/'|implicit) unary}
//! unary      := '-' unary | power
//! power      := postfix ['^' exponent]             right-associative
//! postfix    := primary {'!'}
//! ```
//!
//! Two ceilings guard every parse: a recursion-depth counter bumped at each
//! rule that can recurse, and a node counter bumped at every AST
//! construction site. In recovery mode, mismatched `consume` calls append
//! the error and synthesise the expected token, and primary-level failures
//! emit a `__ERROR__` sentinel and advance one token, so one pass collects
//! every error.

use std::sync::Arc;

use crate::ast::{BinaryOp, CompareOp, Expr, ExprKind, PiecewiseCase, UnaryOp};
use crate::core::error::SyntaxError;
use crate::parser::tokens::{Token, TokenKind};

use crate::MAX_NODE_COUNT;

/// Sentinel variable emitted for unparseable primaries in recovery mode.
pub(crate) const ERROR_SENTINEL: &str = "__ERROR__";

const DEFAULT_MULTI_VARS: [&str; 3] = ["x", "y", "z"];

/// Parser knobs taken from the facade configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParserOptions {
    /// Recursion-depth ceiling (default 500).
    pub max_recursion_depth: usize,
    /// Collect errors and continue instead of failing fast.
    pub recover: bool,
}

/// Parse a token stream into one AST root (strict mode).
pub(crate) fn parse_tokens(
    tokens: &[Token],
    options: ParserOptions,
) -> Result<Arc<Expr>, SyntaxError> {
    let mut parser = Parser::new(tokens, options);
    let expr = parser.root()?;
    Ok(Arc::new(expr))
}

/// Parse with recovery: always returns every collected error, plus the
/// (possibly sentinel-ridden) root when one could be built.
pub(crate) fn parse_tokens_recovering(
    tokens: &[Token],
    options: ParserOptions,
) -> (Option<Arc<Expr>>, Vec<SyntaxError>) {
    let mut parser = Parser::new(
        tokens,
        ParserOptions {
            recover: true,
            ..options
        },
    );
    match parser.root() {
        Ok(expr) => (Some(Arc::new(expr)), parser.errors),
        Err(fatal) => {
            parser.errors.push(fatal);
            (None, parser.errors)
        }
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    nodes: usize,
    options: ParserOptions,
    errors: Vec<SyntaxError>,
    delimiters: Vec<TokenKind>,
    integral_depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], options: ParserOptions) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            nodes: 0,
            options,
            errors: Vec::new(),
            delimiters: Vec::new(),
            integral_depth: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Token plumbing
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.token_at(self.pos)
    }

    fn token_at(&self, i: usize) -> &Token {
        self.tokens
            .get(i)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consume a token of `kind` or fail. In recovery mode the error is
    /// recorded and a token of the expected kind is synthesised instead.
    fn consume(&mut self, kind: TokenKind, what: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let got = self.peek().clone();
        let mut err = SyntaxError::new(
            format!("expected {}, found '{}'", what, describe(&got)),
            Some(got.offset),
        );
        if let Some(hint) = closing_hint(kind) {
            err = err.with_suggestion(hint);
        }
        if self.options.recover {
            self.errors.push(err);
            Ok(Token::new(kind, "", got.offset))
        } else {
            Err(err)
        }
    }

    // -------------------------------------------------------------------------
    // Guards
    // -------------------------------------------------------------------------

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > self.options.max_recursion_depth {
            return Err(SyntaxError::new(
                "expression nesting exceeds the recursion limit",
                Some(self.peek().offset),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn mk(&mut self, kind: ExprKind) -> Result<Expr, SyntaxError> {
        self.nodes += 1;
        if self.nodes > MAX_NODE_COUNT {
            return Err(SyntaxError::new(
                "expression exceeds the node count limit",
                Some(self.peek().offset),
            ));
        }
        Ok(Expr::new(kind))
    }

    /// Errors that must end the parse even in recovery mode.
    fn is_fatal(&self, err: &SyntaxError) -> bool {
        self.nodes > MAX_NODE_COUNT
            || self.depth >= self.options.max_recursion_depth
            || err.message.starts_with("expression exceeds")
            || err.message.starts_with("expression nesting")
    }

    // -------------------------------------------------------------------------
    // Entry
    // -------------------------------------------------------------------------

    fn root(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.statement()?;
        if !self.check(TokenKind::Eof) {
            let got = self.peek().clone();
            let err = SyntaxError::new(
                format!("unexpected '{}' after the expression", describe(&got)),
                Some(got.offset),
            );
            if !self.options.recover {
                return Err(err);
            }
            self.errors.push(err);
        }
        Ok(expr)
    }

    /// `let x = e`, `f(a, b) = body`, or a plain expression.
    fn statement(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::LetKeyword) {
            self.advance();
            let name = self.variable_name("variable name after 'let'")?;
            self.consume(TokenKind::Equal, "'=' after the variable name")?;
            let value = self.expression()?;
            return self.mk(ExprKind::Assignment {
                name,
                value: Arc::new(value),
            });
        }

        if let Some((name, params, resume)) = self.function_definition_lookahead() {
            self.pos = resume;
            let body = self.expression()?;
            return self.mk(ExprKind::FunctionDefinition {
                name,
                params,
                body: Arc::new(body),
            });
        }

        self.expression()
    }

    /// `name(p1, ..., pn) = body` — permitted only when the parenthesised
    /// list holds nothing but variables and commas, with no nested parens.
    /// Returns the name, the parameters, and the position just past `=`.
    fn function_definition_lookahead(&self) -> Option<(String, Vec<String>, usize)> {
        let mut i = self.pos;
        if self.token_at(i).kind != TokenKind::Variable {
            return None;
        }
        let name = self.token_at(i).lexeme.clone();
        i += 1;
        // A single-parameter head has a synthetic Multiply in front of `(`.
        if self.token_at(i).kind == TokenKind::Multiply && self.token_at(i).synthetic {
            i += 1;
        }
        if self.token_at(i).kind != TokenKind::LParen {
            return None;
        }
        i += 1;

        let mut params = Vec::new();
        loop {
            match self.token_at(i).kind {
                TokenKind::Variable => {
                    params.push(self.token_at(i).lexeme.clone());
                    i += 1;
                }
                _ => return None,
            }
            match self.token_at(i).kind {
                TokenKind::Comma => i += 1,
                TokenKind::RParen => {
                    i += 1;
                    break;
                }
                _ => return None,
            }
        }
        if params.is_empty() || self.token_at(i).kind != TokenKind::Equal {
            return None;
        }
        Some((name, params, i + 1))
    }

    // -------------------------------------------------------------------------
    // Precedence levels
    // -------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.expression_inner();
        self.leave();
        result
    }

    fn expression_inner(&mut self) -> Result<Expr, SyntaxError> {
        let value = self.comparison()?;
        if self.check(TokenKind::Comma) && self.delimiters.is_empty() && self.integral_depth == 0 {
            self.advance();
            let condition = self.expression()?;
            return self.mk(ExprKind::Conditional {
                value: Arc::new(value),
                condition: Arc::new(condition),
            });
        }
        Ok(value)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.additive()?;
        if compare_op(self.peek().kind).is_none() {
            return Ok(first);
        }

        let mut ops = Vec::new();
        let mut exprs = vec![Arc::new(first)];
        while let Some(op) = compare_op(self.peek().kind) {
            self.advance();
            let rhs = self.additive()?;
            ops.push(op);
            exprs.push(Arc::new(rhs));
        }

        if ops.len() == 1 {
            let right = exprs.pop().unwrap_or_else(|| Arc::new(Expr::variable(ERROR_SENTINEL)));
            let left = exprs.pop().unwrap_or_else(|| Arc::new(Expr::variable(ERROR_SENTINEL)));
            return self.mk(ExprKind::Comparison {
                op: ops[0],
                left,
                right,
            });
        }
        self.mk(ExprKind::ChainedComparison { exprs, ops })
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.term()?;
        loop {
            if self.stops_at_differential() {
                break;
            }
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = self.mk(ExprKind::Binary {
                op,
                left: Arc::new(left),
                right: Arc::new(right),
                source_command: None,
            })?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            if self.stops_at_differential() {
                break;
            }
            let (op, source) = match self.peek().kind {
                TokenKind::Multiply => (BinaryOp::Mul, operator_source(self.peek())),
                TokenKind::Divide => (BinaryOp::Div, operator_source(self.peek())),
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = self.mk(ExprKind::Binary {
                op,
                left: Arc::new(left),
                right: Arc::new(right),
                source_command: source,
            })?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = if self.check(TokenKind::Minus) {
            self.advance();
            self.unary().and_then(|operand| {
                self.mk(ExprKind::Unary {
                    op: UnaryOp::Negate,
                    operand: Arc::new(operand),
                })
            })
        } else {
            self.power()
        };
        self.leave();
        result
    }

    fn power(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.power_inner();
        self.leave();
        result
    }

    fn power_inner(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.postfix()?;
        if !self.check(TokenKind::Power) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.exponent_operand()?;
        self.mk(ExprKind::Binary {
            op: BinaryOp::Pow,
            left: Arc::new(base),
            right: Arc::new(exponent),
            source_command: None,
        })
    }

    /// The right-hand side of `^`: a braced group, a (possibly negated)
    /// power chain. Braced exponents never fuse into conditionals.
    fn exponent_operand(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::Minus) {
            self.advance();
            let inner = self.exponent_operand()?;
            return self.mk(ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Arc::new(inner),
            });
        }
        if self.check(TokenKind::LBrace) {
            return self.brace_group();
        }
        self.power()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        while self.check(TokenKind::Bang) {
            self.advance();
            expr = self.mk(ExprKind::FunctionCall {
                name: "factorial".to_string(),
                args: vec![Arc::new(expr)],
                base: None,
                param: None,
            })?;
        }
        Ok(expr)
    }

    // -------------------------------------------------------------------------
    // Primary
    // -------------------------------------------------------------------------

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.primary_inner();
        self.leave();
        match result {
            Err(err) if self.options.recover && !self.is_fatal(&err) => {
                self.errors.push(err);
                if !self.check(TokenKind::Eof) {
                    self.advance();
                }
                self.mk(ExprKind::Variable(ERROR_SENTINEL.to_string()))
            }
            other => other,
        }
    }

    fn primary_inner(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().kind {
            TokenKind::Number => {
                let token = self.advance();
                self.mk(ExprKind::Number(token.value.unwrap_or(f64::NAN)))
            }
            TokenKind::Constant => {
                let token = self.advance();
                self.mk(ExprKind::Variable(token.lexeme))
            }
            TokenKind::Infty => {
                self.advance();
                self.mk(ExprKind::Number(f64::INFINITY))
            }
            TokenKind::Variable => self.variable_primary(),
            TokenKind::Function => self.function_call(),
            TokenKind::Frac => self.frac(),
            TokenKind::Sqrt => self.sqrt(),
            TokenKind::Binom => self.binom(),
            TokenKind::Sum => self.series(true),
            TokenKind::Prod => self.series(false),
            TokenKind::Lim => self.limit(),
            TokenKind::Int => self.integral(false),
            TokenKind::OInt => self.integral(true),
            TokenKind::IInt => self.multi_integral(2),
            TokenKind::IIIInt => self.multi_integral(3),
            TokenKind::Begin => self.environment(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.consume(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.brace_primary(),
            TokenKind::Pipe if self.peek().opens_group => self.absolute_value(),
            TokenKind::LAngle => self.angle_vector(),
            TokenKind::LBracket => self.interval(),
            TokenKind::Nabla => self.nabla(),
            TokenKind::Partial => self.partial(),
            TokenKind::Text => {
                let token = self.advance();
                self.mk(ExprKind::Variable(token.lexeme))
            }
            TokenKind::FontCommand => self.font_variable(),
            TokenKind::Eof => Err(SyntaxError::new(
                "unexpected end of input",
                Some(self.peek().offset),
            )),
            _ => {
                let token = self.peek().clone();
                Err(SyntaxError::new(
                    format!("unexpected '{}'", describe(&token)),
                    Some(token.offset),
                ))
            }
        }
    }

    /// Variable with optional `_subscript` folding, optionally a function
    /// application when `(` follows directly (the implicit-multiplication
    /// pass only keeps them adjacent for comma-bearing argument lists).
    fn variable_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        let mut name = token.lexeme;
        if self.check(TokenKind::Underscore) {
            self.advance();
            let sub = self.subscript_text()?;
            name = format!("{}_{}", name, sub);
        }

        if self.check(TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            loop {
                let arg = self.comparison()?;
                args.push(Arc::new(arg));
                if self.check(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.consume(TokenKind::RParen, "')' closing the argument list")?;
            return self.mk(ExprKind::FunctionCall {
                name,
                args,
                base: None,
                param: None,
            });
        }

        self.mk(ExprKind::Variable(name))
    }

    /// Raw text of a subscript: a braced run folded into one string, or a
    /// single number/variable token.
    fn subscript_text(&mut self) -> Result<String, SyntaxError> {
        if self.check(TokenKind::LBrace) {
            self.advance();
            let mut text = String::new();
            let mut depth = 1usize;
            loop {
                let token = self.peek().clone();
                match token.kind {
                    TokenKind::LBrace => depth += 1,
                    TokenKind::RBrace => {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            break;
                        }
                    }
                    TokenKind::Eof => {
                        return Err(SyntaxError::new(
                            "unterminated subscript",
                            Some(token.offset),
                        )
                        .with_suggestion("add '}'"));
                    }
                    _ => {}
                }
                if !token.synthetic {
                    text.push_str(&token.lexeme);
                }
                self.advance();
            }
            return Ok(text);
        }

        let token = self.peek().clone();
        match token.kind {
            TokenKind::Variable | TokenKind::Number | TokenKind::Constant => {
                self.advance();
                Ok(token.lexeme)
            }
            _ => Err(SyntaxError::new(
                format!("invalid subscript '{}'", describe(&token)),
                Some(token.offset),
            )),
        }
    }

    /// Function token: optional `[param]`, `^exp` (textbook `\sin^2 x`),
    /// `_{base}`, then the argument list.
    fn function_call(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.function_call_inner();
        self.leave();
        result
    }

    fn function_call_inner(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        let name = token.lexeme;

        let mut param = None;
        if self.check(TokenKind::LBracket) {
            self.advance();
            let p = self.expression()?;
            self.consume(TokenKind::RBracket, "']' closing the parameter")?;
            param = Some(Arc::new(p));
        }

        let mut exponent = None;
        let mut base = None;
        loop {
            if exponent.is_none() && self.check(TokenKind::Power) {
                self.advance();
                exponent = Some(self.exponent_operand()?);
                continue;
            }
            if base.is_none() && self.check(TokenKind::Underscore) {
                self.advance();
                base = Some(Arc::new(self.subscript_operand()?));
                continue;
            }
            break;
        }

        let call = if name == "vec" || name == "hat" {
            self.vector_literal(name == "hat")?
        } else {
            let args = self.call_arguments()?;
            self.mk(ExprKind::FunctionCall {
                name,
                args,
                base,
                param,
            })?
        };

        match exponent {
            Some(exp) => self.mk(ExprKind::Binary {
                op: BinaryOp::Pow,
                left: Arc::new(call),
                right: Arc::new(exp),
                source_command: None,
            }),
            None => Ok(call),
        }
    }

    /// `(` comma list `)` or one primary by implicit application.
    fn call_arguments(&mut self) -> Result<Vec<Arc<Expr>>, SyntaxError> {
        if self.check(TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            loop {
                let arg = self.comparison()?;
                args.push(Arc::new(arg));
                if self.check(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.consume(TokenKind::RParen, "')' closing the argument list")?;
            return Ok(args);
        }
        // Implicit application: one primary, so `\sin x + 1` is `sin(x) + 1`.
        self.eat_synthetic();
        let arg = self.primary()?;
        Ok(vec![Arc::new(arg)])
    }

    /// The subscript argument of a function (`\log_{10}`): a braced
    /// expression or one primary.
    fn subscript_operand(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::LBrace) {
            return self.brace_group();
        }
        self.primary()
    }

    /// `\vec{a, b, c}` / `\hat{a, b, c}`.
    fn vector_literal(&mut self, unit: bool) -> Result<Expr, SyntaxError> {
        self.consume(TokenKind::LBrace, "'{' after the vector command")?;
        let mut components = Vec::new();
        loop {
            let component = self.comparison()?;
            components.push(Arc::new(component));
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.consume(TokenKind::RBrace, "'}' closing the vector")?;
        self.mk(ExprKind::Vector { components, unit })
    }

    // -------------------------------------------------------------------------
    // Fractions and derivatives
    // -------------------------------------------------------------------------

    fn frac(&mut self) -> Result<Expr, SyntaxError> {
        let frac_token = self.advance();

        if self.check(TokenKind::LBrace) {
            if let Some(head) = self.derivative_lookahead() {
                self.pos = head.resume;
                if head.order == 0 {
                    return Err(SyntaxError::new(
                        "derivative order must be at least 1",
                        Some(frac_token.offset),
                    ));
                }
                self.eat_synthetic();
                let body = self.term()?;
                let body = Arc::new(body);
                return if head.partial {
                    self.mk(ExprKind::PartialDerivative {
                        body,
                        var: head.var,
                        order: head.order,
                    })
                } else {
                    self.mk(ExprKind::Derivative {
                        body,
                        var: head.var,
                        order: head.order,
                    })
                };
            }

            let numerator = self.brace_group()?;
            self.eat_synthetic();
            if !self.check(TokenKind::LBrace) {
                return Err(SyntaxError::new(
                    "\\frac requires two arguments",
                    Some(self.peek().offset),
                )
                .with_suggestion("write \\frac{numerator}{denominator}"));
            }
            let denominator = self.brace_group()?;
            return self.mk(ExprKind::Binary {
                op: BinaryOp::Div,
                left: Arc::new(numerator),
                right: Arc::new(denominator),
                source_command: Some("frac".to_string()),
            });
        }

        self.braceless_frac(&frac_token)
    }

    /// `\frac12` and `\frac xy`: exactly two single digits or variables.
    /// Three or more consecutive digits are ambiguous and rejected.
    fn braceless_frac(&mut self, frac_token: &Token) -> Result<Expr, SyntaxError> {
        let ambiguous = |offset| {
            SyntaxError::new("ambiguous braceless fraction", Some(offset))
                .with_suggestion("brace the operands: \\frac{a}{b}")
        };

        let first = self.peek().clone();
        let (numerator, denominator_token) = match first.kind {
            TokenKind::Number => {
                let digits = first.lexeme.clone();
                if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
                    // `\frac12` lexes as one two-digit number; split it.
                    self.advance();
                    let num = f64::from(digits.as_bytes()[0] - b'0');
                    let den = f64::from(digits.as_bytes()[1] - b'0');
                    let left = Arc::new(self.mk(ExprKind::Number(num))?);
                    let right = Arc::new(self.mk(ExprKind::Number(den))?);
                    return self.mk(ExprKind::Binary {
                        op: BinaryOp::Div,
                        left,
                        right,
                        source_command: Some("frac".to_string()),
                    });
                }
                if digits.len() > 1 {
                    return Err(ambiguous(first.offset));
                }
                self.advance();
                let num = self.mk(ExprKind::Number(first.value.unwrap_or(f64::NAN)))?;
                (num, self.next_braceless_operand()?)
            }
            TokenKind::Variable => {
                self.advance();
                let num = self.mk(ExprKind::Variable(first.lexeme.clone()))?;
                (num, self.next_braceless_operand()?)
            }
            _ => {
                return Err(SyntaxError::new(
                    "missing argument to \\frac",
                    Some(frac_token.offset),
                )
                .with_suggestion("write \\frac{numerator}{denominator}"));
            }
        };

        let denominator = match denominator_token.kind {
            TokenKind::Number => {
                if denominator_token.lexeme.len() > 1 {
                    return Err(ambiguous(denominator_token.offset));
                }
                self.mk(ExprKind::Number(denominator_token.value.unwrap_or(f64::NAN)))?
            }
            TokenKind::Variable => self.mk(ExprKind::Variable(denominator_token.lexeme.clone()))?,
            _ => {
                return Err(SyntaxError::new(
                    "missing argument to \\frac",
                    Some(denominator_token.offset),
                )
                .with_suggestion("write \\frac{numerator}{denominator}"));
            }
        };

        self.mk(ExprKind::Binary {
            op: BinaryOp::Div,
            left: Arc::new(numerator),
            right: Arc::new(denominator),
            source_command: Some("frac".to_string()),
        })
    }

    fn next_braceless_operand(&mut self) -> Result<Token, SyntaxError> {
        if self.peek().synthetic && self.peek().kind == TokenKind::Multiply {
            self.advance();
        }
        Ok(self.advance())
    }

    /// Lookahead over `{d}{dx}` / `{\partial^n}{\partial x^n}` heads.
    fn derivative_lookahead(&self) -> Option<DerivativeHead> {
        let mut i = self.pos;

        // Numerator: {d [^n]} or {\partial [^n]}
        if self.token_at(i).kind != TokenKind::LBrace {
            return None;
        }
        i += 1;
        let partial = match self.token_at(i).kind {
            TokenKind::Partial => true,
            TokenKind::Variable if self.token_at(i).lexeme == "d" => false,
            _ => return None,
        };
        i += 1;
        let num_order = self.lookahead_order(&mut i)?;
        if self.token_at(i).kind != TokenKind::RBrace {
            return None;
        }
        i += 1;
        self.skip_synthetic(&mut i);

        // Denominator: {d var [^n]} or {\partial var [^n]}
        if self.token_at(i).kind != TokenKind::LBrace {
            return None;
        }
        i += 1;
        match (partial, self.token_at(i).kind) {
            (true, TokenKind::Partial) => {}
            (false, TokenKind::Variable) if self.token_at(i).lexeme == "d" => {}
            _ => return None,
        }
        i += 1;
        self.skip_synthetic(&mut i);
        if self.token_at(i).kind != TokenKind::Variable {
            return None;
        }
        let var = self.token_at(i).lexeme.clone();
        i += 1;
        let den_order = self.lookahead_order(&mut i)?;
        if self.token_at(i).kind != TokenKind::RBrace {
            return None;
        }
        i += 1;

        let order = match (num_order, den_order) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 1,
            // Mismatched orders: not a derivative head, let \frac handle it.
            (Some(_), Some(_)) => return None,
        };

        Some(DerivativeHead {
            partial,
            order,
            var,
            resume: i,
        })
    }

    /// Parse an optional `^n` / `^{n}` inside the derivative head; returns
    /// `None` to abandon the lookahead on malformed input.
    fn lookahead_order(&self, i: &mut usize) -> Option<Option<u32>> {
        if self.token_at(*i).kind != TokenKind::Power {
            return Some(None);
        }
        *i += 1;
        let braced = self.token_at(*i).kind == TokenKind::LBrace;
        if braced {
            *i += 1;
        }
        if self.token_at(*i).kind != TokenKind::Number {
            return None;
        }
        let value = self.token_at(*i).value?;
        if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
            return None;
        }
        *i += 1;
        if braced {
            if self.token_at(*i).kind != TokenKind::RBrace {
                return None;
            }
            *i += 1;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Some(value as u32))
    }

    fn skip_synthetic(&self, i: &mut usize) {
        if self.token_at(*i).kind == TokenKind::Multiply && self.token_at(*i).synthetic {
            *i += 1;
        }
    }

    /// Drop a synthetic Multiply the insertion pass placed between two
    /// structural positions (`}{`, bound/body seams). The token only exists
    /// to make juxtaposition explicit; here the grammar already knows the
    /// next group belongs to the current form.
    fn eat_synthetic(&mut self) {
        if self.peek().kind == TokenKind::Multiply && self.peek().synthetic {
            self.advance();
        }
    }

    // -------------------------------------------------------------------------
    // Roots, binomials, groups
    // -------------------------------------------------------------------------

    fn sqrt(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        let mut param = None;
        if self.check(TokenKind::LBracket) {
            self.advance();
            let p = self.expression()?;
            self.consume(TokenKind::RBracket, "']' closing the root index")?;
            param = Some(Arc::new(p));
            self.eat_synthetic();
        }
        let arg = if self.check(TokenKind::LBrace) {
            self.brace_group()?
        } else {
            self.primary()?
        };
        self.mk(ExprKind::FunctionCall {
            name: "sqrt".to_string(),
            args: vec![Arc::new(arg)],
            base: None,
            param,
        })
    }

    fn binom(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        let n = self.brace_group()?;
        self.eat_synthetic();
        let k = self.brace_group()?;
        self.mk(ExprKind::Binom {
            n: Arc::new(n),
            k: Arc::new(k),
        })
    }

    /// `{ expression }` with no conditional formation.
    fn brace_group(&mut self) -> Result<Expr, SyntaxError> {
        self.consume(TokenKind::LBrace, "'{'")?;
        let inner = self.expression()?;
        self.consume(TokenKind::RBrace, "'}'")?;
        Ok(inner)
    }

    /// A standalone `{...}` primary; a second group directly after (or past
    /// one synthetic Multiply) forms `{value}{condition}`.
    fn brace_primary(&mut self) -> Result<Expr, SyntaxError> {
        let value = self.brace_group()?;

        let direct = self.check(TokenKind::LBrace);
        let past_synthetic = self.peek().synthetic
            && self.peek().kind == TokenKind::Multiply
            && self.token_at(self.pos + 1).kind == TokenKind::LBrace;

        if direct || past_synthetic {
            if past_synthetic {
                self.advance();
            }
            let condition = self.brace_group()?;
            return self.mk(ExprKind::Conditional {
                value: Arc::new(value),
                condition: Arc::new(condition),
            });
        }
        Ok(value)
    }

    fn absolute_value(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        self.delimiters.push(TokenKind::Pipe);
        let inner = self.expression();
        self.delimiters.pop();
        let inner = inner?;
        if self.check(TokenKind::Pipe) && !self.peek().opens_group {
            self.advance();
        } else {
            let err = SyntaxError::new(
                "unbalanced '|'",
                Some(self.peek().offset),
            )
            .with_suggestion("close the absolute value with '|'");
            if self.options.recover {
                self.errors.push(err);
            } else {
                return Err(err);
            }
        }
        self.mk(ExprKind::Abs(Arc::new(inner)))
    }

    fn angle_vector(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        let mut components = Vec::new();
        loop {
            let component = self.comparison()?;
            components.push(Arc::new(component));
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.consume(TokenKind::RAngle, "'⟩' closing the vector")?;
        self.mk(ExprKind::Vector {
            components,
            unit: false,
        })
    }

    fn interval(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        let lower = self.comparison()?;
        self.consume(TokenKind::Comma, "',' between interval endpoints")?;
        let upper = self.comparison()?;
        self.consume(TokenKind::RBracket, "']' closing the interval")?;
        self.mk(ExprKind::Interval {
            lower: Arc::new(lower),
            upper: Arc::new(upper),
        })
    }

    // -------------------------------------------------------------------------
    // Calculus forms
    // -------------------------------------------------------------------------

    fn series(&mut self, is_sum: bool) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.series_inner(is_sum);
        self.leave();
        result
    }

    fn series_inner(&mut self, is_sum: bool) -> Result<Expr, SyntaxError> {
        let what = if is_sum { "sum" } else { "product" };
        self.advance();
        self.consume(
            TokenKind::Underscore,
            &format!("'_' introducing the {} bounds", what),
        )?;
        self.consume(TokenKind::LBrace, "'{'")?;
        let var = self.variable_name("index variable")?;
        self.consume(TokenKind::Equal, "'=' in the bounds")?;
        let start = self.additive()?;
        self.consume(TokenKind::RBrace, "'}'")?;
        self.consume(
            TokenKind::Power,
            &format!("'^' introducing the {} upper bound", what),
        )?;
        let end = if self.check(TokenKind::LBrace) {
            self.brace_group()?
        } else {
            self.primary()?
        };
        self.eat_synthetic();
        let body = self.term()?;

        let kind = if is_sum {
            ExprKind::SumSeries {
                var,
                start: Arc::new(start),
                end: Arc::new(end),
                body: Arc::new(body),
            }
        } else {
            ExprKind::ProductSeries {
                var,
                start: Arc::new(start),
                end: Arc::new(end),
                body: Arc::new(body),
            }
        };
        self.mk(kind)
    }

    fn limit(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        self.consume(TokenKind::Underscore, "'_' introducing the limit")?;
        self.consume(TokenKind::LBrace, "'{'")?;
        let var = self.variable_name("limit variable")?;
        self.consume(TokenKind::To, "'\\to' in the limit")?;
        let target = self.additive()?;
        self.consume(TokenKind::RBrace, "'}'")?;
        self.eat_synthetic();
        let body = self.term()?;
        self.mk(ExprKind::Limit {
            var,
            target: Arc::new(target),
            body: Arc::new(body),
        })
    }

    fn integral(&mut self, closed: bool) -> Result<Expr, SyntaxError> {
        self.advance();
        let (lower, upper) = self.integral_bounds()?;
        self.eat_synthetic();

        self.integral_depth += 1;
        let body = self.additive();
        self.integral_depth -= 1;
        let body = body?;

        let var = self.consume_differential()?;
        self.mk(ExprKind::Integral {
            lower,
            upper,
            body: Arc::new(body),
            var,
            closed,
        })
    }

    fn multi_integral(&mut self, order: u8) -> Result<Expr, SyntaxError> {
        self.advance();
        let (lower, upper) = self.integral_bounds()?;
        self.eat_synthetic();

        self.integral_depth += 1;
        let body = self.additive();
        self.integral_depth -= 1;
        let body = body?;

        let mut vars = Vec::new();
        while vars.len() < usize::from(order) && self.at_differential() {
            vars.push(self.consume_differential()?);
        }
        // Default the remaining axes, skipping names already used.
        for default in DEFAULT_MULTI_VARS {
            if vars.len() >= usize::from(order) {
                break;
            }
            if !vars.iter().any(|v| v == default) {
                vars.push(default.to_string());
            }
        }

        self.mk(ExprKind::MultiIntegral {
            order,
            lower,
            upper,
            body: Arc::new(body),
            vars,
        })
    }

    #[allow(clippy::type_complexity)]
    fn integral_bounds(
        &mut self,
    ) -> Result<(Option<Arc<Expr>>, Option<Arc<Expr>>), SyntaxError> {
        let mut lower = None;
        let mut upper = None;
        if self.check(TokenKind::Underscore) {
            self.advance();
            lower = Some(Arc::new(self.integral_bound()?));
        }
        if self.check(TokenKind::Power) {
            self.advance();
            upper = Some(Arc::new(self.integral_bound()?));
        }
        Ok((lower, upper))
    }

    /// One integral bound: a braced expression or a single (possibly
    /// negated) primary — `^` after an unbraced bound is not an exponent.
    fn integral_bound(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::LBrace) {
            return self.brace_group();
        }
        if self.check(TokenKind::Minus) {
            self.advance();
            let operand = self.primary()?;
            return self.mk(ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Arc::new(operand),
            });
        }
        self.primary()
    }

    /// Whether the upcoming tokens (skipping synthetic Multiply) spell a
    /// trailing differential `d <var>`.
    fn at_differential(&self) -> bool {
        let mut i = self.pos;
        self.skip_synthetic(&mut i);
        if self.token_at(i).kind != TokenKind::Variable || self.token_at(i).lexeme != "d" {
            return false;
        }
        let mut j = i + 1;
        self.skip_synthetic(&mut j);
        self.token_at(j).kind == TokenKind::Variable
    }

    fn stops_at_differential(&self) -> bool {
        self.integral_depth > 0 && self.at_differential()
    }

    fn consume_differential(&mut self) -> Result<String, SyntaxError> {
        let missing = |offset| {
            SyntaxError::new("missing differential after the integrand", Some(offset))
                .with_suggestion("add dx")
        };

        if self.peek().synthetic && self.peek().kind == TokenKind::Multiply {
            self.advance();
        }
        if self.peek().kind != TokenKind::Variable || self.peek().lexeme != "d" {
            return Err(missing(self.peek().offset));
        }
        self.advance();
        if self.peek().synthetic && self.peek().kind == TokenKind::Multiply {
            self.advance();
        }
        if self.peek().kind != TokenKind::Variable {
            return Err(missing(self.peek().offset));
        }
        let mut var = self.advance().lexeme;
        if self.check(TokenKind::Underscore) {
            self.advance();
            let sub = self.subscript_text()?;
            var = format!("{}_{}", var, sub);
        }
        Ok(var)
    }

    // -------------------------------------------------------------------------
    // Nabla and partial
    // -------------------------------------------------------------------------

    fn nabla(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        if self.check(TokenKind::Power) {
            // \nabla^2 is the Laplacian marker.
            let save = self.pos;
            self.advance();
            let braced = self.check(TokenKind::LBrace);
            if braced {
                self.advance();
            }
            let is_two =
                self.peek().kind == TokenKind::Number && self.peek().value == Some(2.0);
            if is_two {
                self.advance();
                if braced {
                    self.consume(TokenKind::RBrace, "'}'")?;
                }
                self.eat_synthetic();
                let body = self.unary()?;
                return self.mk(ExprKind::FunctionCall {
                    name: "laplacian".to_string(),
                    args: vec![Arc::new(body)],
                    base: None,
                    param: None,
                });
            }
            self.pos = save;
        }
        let body = self.unary()?;
        self.mk(ExprKind::Gradient {
            body: Arc::new(body),
            vars: None,
        })
    }

    fn partial(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        if self.check(TokenKind::Underscore) {
            self.advance();
            let var = self.subscript_text()?;
            self.eat_synthetic();
            let body = self.unary()?;
            return self.mk(ExprKind::PartialDerivative {
                body: Arc::new(body),
                var,
                order: 1,
            });
        }
        Err(SyntaxError::new(
            "'\\partial' outside a derivative",
            Some(token.offset),
        )
        .with_suggestion("write \\frac{\\partial}{\\partial x} or \\partial_x"))
    }

    // -------------------------------------------------------------------------
    // Environments
    // -------------------------------------------------------------------------

    fn environment(&mut self) -> Result<Expr, SyntaxError> {
        let begin = self.advance();
        let env = begin.lexeme.clone();
        match env.as_str() {
            "cases" => self.cases_environment(&env, begin.offset),
            "matrix" | "pmatrix" | "bmatrix" | "vmatrix" | "align" | "aligned" => {
                self.matrix_environment(&env)
            }
            other => Err(SyntaxError::new(
                format!("unknown environment '{}'", other),
                Some(begin.offset),
            )),
        }
    }

    fn matrix_environment(&mut self, env: &str) -> Result<Expr, SyntaxError> {
        let mut rows: Vec<Vec<Arc<Expr>>> = Vec::new();
        let mut row: Vec<Arc<Expr>> = Vec::new();

        loop {
            if self.check(TokenKind::End) {
                // Tolerate a trailing row separator before \end.
                break;
            }
            let cell = self.comparison()?;
            row.push(Arc::new(cell));
            match self.peek().kind {
                TokenKind::Ampersand => {
                    self.advance();
                }
                TokenKind::Backslash => {
                    self.advance();
                    rows.push(std::mem::take(&mut row));
                }
                TokenKind::End => break,
                _ => {
                    let got = self.peek().clone();
                    let err = SyntaxError::new(
                        format!(
                            "expected '&', '\\\\', or \\end{{{}}}, found '{}'",
                            env,
                            describe(&got)
                        ),
                        Some(got.offset),
                    );
                    if self.options.recover && !self.check(TokenKind::Eof) {
                        self.errors.push(err);
                        self.advance();
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        self.expect_environment_end(env)?;

        if rows.is_empty() {
            return Err(SyntaxError::new(
                format!("empty environment '{}'", env),
                Some(self.peek().offset),
            ));
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(SyntaxError::new(
                "matrix rows have differing lengths",
                Some(self.peek().offset),
            ));
        }

        let matrix = self.mk(ExprKind::Matrix { rows })?;
        if env == "vmatrix" {
            // |M| notation evaluates as the determinant.
            return self.mk(ExprKind::Abs(Arc::new(matrix)));
        }
        Ok(matrix)
    }

    fn cases_environment(&mut self, env: &str, offset: usize) -> Result<Expr, SyntaxError> {
        let mut cases: Vec<PiecewiseCase> = Vec::new();

        loop {
            if self.check(TokenKind::End) {
                break;
            }
            let value = self.comparison()?;
            let condition = if self.check(TokenKind::Ampersand) {
                self.advance();
                self.case_condition()?
            } else {
                None
            };
            cases.push(PiecewiseCase {
                value: Arc::new(value),
                condition,
            });
            match self.peek().kind {
                TokenKind::Backslash => {
                    self.advance();
                }
                TokenKind::End => break,
                _ => {
                    let got = self.peek().clone();
                    return Err(SyntaxError::new(
                        format!("expected '\\\\' or \\end{{cases}}, found '{}'", describe(&got)),
                        Some(got.offset),
                    ));
                }
            }
        }
        self.expect_environment_end(env)?;

        if cases.is_empty() {
            return Err(SyntaxError::new("empty cases environment", Some(offset)));
        }
        if cases.iter().filter(|c| c.condition.is_none()).count() > 1 {
            return Err(SyntaxError::new(
                "cases environment has more than one otherwise branch",
                Some(offset),
            ));
        }
        self.mk(ExprKind::Piecewise { cases })
    }

    /// A cases condition cell: `for `/`if ` prefixes are stripped, and a
    /// literal `otherwise`/`else` selects the catch-all arm.
    fn case_condition(&mut self) -> Result<Option<Arc<Expr>>, SyntaxError> {
        if self.check(TokenKind::Text) {
            let word = self.peek().lexeme.clone();
            if word == "otherwise" || word == "else" {
                self.advance();
                return Ok(None);
            }
        }

        // Single-letter runs: collect what they spell before deciding.
        let mut i = self.pos;
        let mut word = String::new();
        let mut ends = Vec::new();
        loop {
            self.skip_synthetic(&mut i);
            let token = self.token_at(i);
            if token.kind == TokenKind::Variable && token.lexeme.chars().count() == 1 {
                word.push_str(&token.lexeme);
                i += 1;
                ends.push((word.len(), i));
            } else {
                break;
            }
        }

        if (word == "otherwise" || word == "else")
            && matches!(
                self.token_at(i).kind,
                TokenKind::Backslash | TokenKind::End
            )
        {
            self.pos = i;
            return Ok(None);
        }
        for prefix in ["for", "if"] {
            if word.starts_with(prefix) && word.len() > prefix.len() {
                if let Some(&(_, resume)) = ends.iter().find(|(len, _)| *len == prefix.len()) {
                    self.pos = resume;
                    break;
                }
            }
        }

        let condition = self.comparison()?;
        Ok(Some(Arc::new(condition)))
    }

    fn expect_environment_end(&mut self, env: &str) -> Result<(), SyntaxError> {
        let end = self.consume(TokenKind::End, &format!("\\end{{{}}}", env))?;
        if !end.lexeme.is_empty() && end.lexeme != env {
            let err = SyntaxError::new(
                format!(
                    "environment mismatch: \\begin{{{}}} closed by \\end{{{}}}",
                    env, end.lexeme
                ),
                Some(end.offset),
            )
            .with_suggestion(format!("close with \\end{{{}}}", env));
            if self.options.recover {
                self.errors.push(err);
            } else {
                return Err(err);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Leaf helpers
    // -------------------------------------------------------------------------

    fn font_variable(&mut self) -> Result<Expr, SyntaxError> {
        let font = self.advance();
        self.consume(TokenKind::LBrace, "'{' after the font command")?;
        let mut inner = String::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => {
                    return Err(SyntaxError::new(
                        "unterminated font command",
                        Some(token.offset),
                    )
                    .with_suggestion("add '}'"));
                }
                _ => {
                    if !token.synthetic {
                        inner.push_str(&token.lexeme);
                    }
                    self.advance();
                }
            }
        }
        self.mk(ExprKind::Variable(format!("{}:{}", font.lexeme, inner)))
    }

    fn variable_name(&mut self, what: &str) -> Result<String, SyntaxError> {
        let token = self.consume(TokenKind::Variable, what)?;
        let mut name = token.lexeme;
        if self.check(TokenKind::Underscore) {
            self.advance();
            let sub = self.subscript_text()?;
            name = format!("{}_{}", name, sub);
        }
        Ok(name)
    }
}

struct DerivativeHead {
    partial: bool,
    order: u32,
    var: String,
    resume: usize,
}

fn compare_op(kind: TokenKind) -> Option<CompareOp> {
    Some(match kind {
        TokenKind::Less => CompareOp::Less,
        TokenKind::Greater => CompareOp::Greater,
        TokenKind::LessEq => CompareOp::LessEq,
        TokenKind::GreaterEq => CompareOp::GreaterEq,
        TokenKind::Equal => CompareOp::Equal,
        TokenKind::Member => CompareOp::Member,
        _ => return None,
    })
}

fn operator_source(token: &Token) -> Option<String> {
    match token.lexeme.as_str() {
        "cdot" | "times" | "div" => Some(token.lexeme.clone()),
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    if token.lexeme.is_empty() {
        format!("{:?}", token.kind)
    } else {
        token.lexeme.clone()
    }
}

fn closing_hint(kind: TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::RBrace => "unbalanced braces; add '}'",
        TokenKind::RParen => "unbalanced parentheses; add ')'",
        TokenKind::RBracket => "add ']'",
        TokenKind::RAngle => "add '⟩'",
        _ => return None,
    })
}
