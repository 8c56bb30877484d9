use tracing::debug;

use crate::{
    ast::{
        BinOp, DEFAULT_PIPE, Expr, ExprKind, PipeStage, Position, Property, SOURCE_STAGE, Token,
        TokenKind, UnaryOp,
    },
    error::{ErrorCode, ParseError, ParseErrors},
    lexer::Lexer,
    value::format_number,
};

type ParseResult<T> = Result<T, ParseError>;

/// Default [`ParserOptions::max_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Language switches recognised by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// Accept `??`
    pub enable_nullish: bool,
    /// Accept `?.` and `?[`
    pub enable_optional_chaining: bool,
    /// Accept `|:` / `|name:` pipe segments
    pub enable_pipes: bool,
    /// Lex `NaN` and `Inf` as numeric literals
    pub enable_ieee754_specials: bool,
    /// Maximum nesting of sub-expressions and prefix operators. Each
    /// parenthesised level recurses through every precedence method, so the
    /// default stays within a 2 MiB thread stack.
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            enable_nullish: true,
            enable_optional_chaining: true,
            enable_pipes: true,
            enable_ieee754_specials: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parses `source` into a syntax tree, reporting every error found.
pub fn parse(source: &str, options: &ParserOptions) -> Result<Expr, ParseErrors> {
    Parser::with_options(source, options.clone()).parse()
}

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    options: ParserOptions,
    errors: Vec<ParseError>,
    depth: usize,
    lexer_failed: bool,
}

impl Parser {
    /// Creates a parser over an already configured lexer, with default options.
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Parser {
            lexer,
            current_token: Token::eof(Position::new(1, 1)),
            options: ParserOptions::default(),
            errors: Vec::new(),
            depth: 0,
            lexer_failed: false,
        };
        parser.advance();
        parser
    }

    pub fn with_options(source: &str, options: ParserOptions) -> Self {
        let lexer = Lexer::new(source).with_ieee754_specials(options.enable_ieee754_specials);
        let mut parser = Parser::new(lexer);
        parser.options = options;
        parser
    }

    fn advance(&mut self) {
        match self.lexer.next_token() {
            Ok(token) => self.current_token = token,
            Err(error) => {
                let position = error.position();
                self.errors.push(error);
                self.lexer_failed = true;
                self.current_token = Token::eof(position);
            }
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current_token.kind) == std::mem::discriminant(kind)
    }

    /// Keeps an error for the final report. Once the lexer has failed, the
    /// syntax errors caused by the truncated stream are dropped.
    fn record(&mut self, error: ParseError) {
        if self.lexer_failed && !error.code.is_lexical() {
            return;
        }
        self.errors.push(error);
    }

    fn enter(&mut self) -> ParseResult<()> {
        if self.depth >= self.options.max_depth {
            return Err(ParseError::new(
                ErrorCode::MaxDepthExceeded,
                format!(
                    "expression nesting exceeds the maximum depth of {}",
                    self.options.max_depth
                ),
                self.current_token.position,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = &self.current_token;
        let (code, message) = match token.kind {
            TokenKind::Eof => (
                ErrorCode::UnexpectedEof,
                format!("unexpected end of input, expected {}", expected),
            ),
            TokenKind::PlusPlus | TokenKind::MinusMinus => (
                ErrorCode::UnexpectedToken,
                format!("'{}' is not a supported operator", token.lexeme),
            ),
            _ => (
                ErrorCode::UnexpectedToken,
                format!("unexpected {}, expected {}", token.kind.describe(), expected),
            ),
        };
        let error = ParseError::new(code, message, token.position).with_expected(expected);
        if token.is_eof() {
            error
        } else {
            error.with_token(token.lexeme.clone())
        }
    }

    /// Error for a construct that should continue with `closing` but doesn't.
    fn closing_error(&self, closing: &TokenKind, opened_at: Position, unclosed: ErrorCode) -> ParseError {
        let token = &self.current_token;
        match &token.kind {
            TokenKind::Eof => ParseError::new(
                unclosed,
                format!("{} opened at {} is never closed", closing_partner(closing), opened_at),
                opened_at,
            )
            .with_expected(closing.symbol()),
            TokenKind::As => ParseError::new(
                ErrorCode::AliasInSubexpression,
                "'as' aliases are only allowed at the end of a top-level pipe segment",
                token.position,
            )
            .with_token("as"),
            TokenKind::Pipe(_) => ParseError::new(
                ErrorCode::PipeInSubexpression,
                "pipes are only allowed at the top level of an expression",
                token.position,
            )
            .with_token(token.lexeme.clone()),
            _ => self.unexpected(&format!("',' or '{}'", closing.symbol())),
        }
    }

    fn feature_disabled(&self, feature: &str) -> ParseError {
        ParseError::new(
            ErrorCode::FeatureDisabled,
            format!("{} is disabled by the parser options", feature),
            self.current_token.position,
        )
        .with_token(self.current_token.lexeme.clone())
    }

    // ------------------------------------------------------------------
    // Programs and pipes
    // ------------------------------------------------------------------

    /// Parses the whole input as a program: one expression, optionally
    /// followed by pipe segments.
    pub fn parse(&mut self) -> Result<Expr, ParseErrors> {
        let start = self.current_token.position;

        if self.current_token.is_eof() {
            if self.errors.is_empty() {
                self.errors.push(ParseError::new(
                    ErrorCode::EmptyExpression,
                    "expression is empty",
                    start,
                ));
            }
            return Err(ParseErrors(std::mem::take(&mut self.errors)));
        }

        let mut stages = Vec::new();
        let mut pipe_type = SOURCE_STAGE.to_string();
        let mut stage_position = start;

        loop {
            match self.parse_stage(pipe_type, stage_position) {
                Ok(stage) => stages.push(stage),
                Err(error) => {
                    self.record(error);
                    self.skip_to_pipe();
                }
            }

            if !matches!(self.current_token.kind, TokenKind::Eof | TokenKind::Pipe(_)) {
                let error = self.unexpected("end of input or a pipe");
                self.record(error);
                self.skip_to_pipe();
            }

            match &self.current_token.kind {
                TokenKind::Pipe(name) => {
                    pipe_type = name.clone().unwrap_or_else(|| DEFAULT_PIPE.to_string());
                    if !self.options.enable_pipes {
                        let error = self.feature_disabled("pipe syntax");
                        self.record(error);
                    }
                    stage_position = self.current_token.position;
                    self.advance();
                }
                _ => break,
            }
        }

        debug!(
            stages = stages.len(),
            errors = self.errors.len(),
            "parsed program"
        );

        if !self.errors.is_empty() {
            return Err(ParseErrors(std::mem::take(&mut self.errors)));
        }

        if stages.len() == 1 && stages[0].alias.is_none() {
            if let Some(stage) = stages.pop() {
                return Ok(stage.expression);
            }
        }
        Ok(Expr::new(ExprKind::Pipe(stages), start))
    }

    fn skip_to_pipe(&mut self) {
        while !matches!(self.current_token.kind, TokenKind::Eof | TokenKind::Pipe(_)) {
            self.advance();
        }
    }

    fn parse_stage(&mut self, pipe_type: String, position: Position) -> ParseResult<PipeStage> {
        if pipe_type != SOURCE_STAGE {
            match self.current_token.kind {
                TokenKind::Eof | TokenKind::Pipe(_) => {
                    return Err(ParseError::new(
                        ErrorCode::EmptyPipe,
                        format!("pipe segment '{}' has no expression", pipe_type),
                        position,
                    ));
                }
                TokenKind::As => {
                    return Err(ParseError::new(
                        ErrorCode::EmptyPipeWithAlias,
                        format!("pipe segment '{}' has an alias but no expression", pipe_type),
                        position,
                    )
                    .with_token("as"));
                }
                _ => {}
            }
        }

        let expression = self.parse_expression()?;
        let alias = if self.check(&TokenKind::As) {
            self.advance();
            let alias = self.parse_alias_name()?;
            if self.check(&TokenKind::As) {
                return Err(ParseError::new(
                    ErrorCode::DuplicateAlias,
                    format!("pipe segment is already aliased as '{}'", alias),
                    self.current_token.position,
                )
                .with_token("as"));
            }
            Some(alias)
        } else {
            None
        };

        Ok(PipeStage {
            expression,
            pipe_type,
            alias,
            position,
        })
    }

    fn parse_alias_name(&mut self) -> ParseResult<String> {
        match &self.current_token.kind {
            TokenKind::Identifier(name) if name.starts_with('$') && name.len() > 1 => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Identifier(name) => Err(ParseError::new(
                ErrorCode::InvalidAlias,
                format!("alias '{}' must start with '$'", name),
                self.current_token.position,
            )
            .with_token(name.clone())
            .with_expected("$name")),
            _ => Err(self.unexpected("an alias name such as $result")),
        }
    }

    // ------------------------------------------------------------------
    // Expressions, loosest to tightest
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.parse_conditional();
        self.leave();
        result
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let condition = self.parse_nullish()?;

        if !self.check(&TokenKind::Question) {
            return Ok(condition);
        }
        let question_at = self.current_token.position;
        self.advance();

        let consequent = self.parse_expression()?;
        if !self.check(&TokenKind::Colon) {
            let error = match self.current_token.kind {
                TokenKind::Eof | TokenKind::As | TokenKind::Pipe(_) => {
                    self.closing_error(&TokenKind::Colon, question_at, ErrorCode::ExpectedToken)
                }
                _ => self.unexpected("':' in conditional expression"),
            };
            return Err(error);
        }
        self.advance();

        // Right-associative: `a ? b : c ? d : e` nests in the alternate.
        let alternate = self.parse_expression()?;

        let position = condition.position;
        Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            position,
        ))
    }

    fn parse_left_assoc(
        &mut self,
        operand: fn(&mut Parser) -> ParseResult<Expr>,
        operator: fn(&TokenKind) -> Option<BinOp>,
    ) -> ParseResult<Expr> {
        let mut left = operand(self)?;

        while let Some(op) = operator(&self.current_token.kind) {
            self.advance();
            let right = operand(self)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_nullish(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_or()?;

        while self.check(&TokenKind::QuestionQuestion) {
            if !self.options.enable_nullish {
                return Err(self.feature_disabled("nullish coalescing"));
            }
            self.advance();
            let right = self.parse_or()?;
            left = binary(BinOp::NullCoalesce, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_and, |kind| match kind {
            TokenKind::BarBar => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_bit_or, |kind| match kind {
            TokenKind::AmpAmp => Some(BinOp::And),
            _ => None,
        })
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_bit_xor, |kind| match kind {
            TokenKind::Bar => Some(BinOp::BitOr),
            _ => None,
        })
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_bit_and, |kind| match kind {
            TokenKind::Tilde => Some(BinOp::BitXor),
            _ => None,
        })
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_equality, |kind| match kind {
            TokenKind::Ampersand => Some(BinOp::BitAnd),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_relational, |kind| match kind {
            TokenKind::EqEq => Some(BinOp::Equal),
            TokenKind::BangEq | TokenKind::LtGt => Some(BinOp::NotEqual),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_shift, |kind| match kind {
            TokenKind::Lt => Some(BinOp::LessThan),
            TokenKind::Gt => Some(BinOp::GreaterThan),
            TokenKind::LtEq => Some(BinOp::LessEqual),
            TokenKind::GtEq => Some(BinOp::GreaterEqual),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_additive, |kind| match kind {
            TokenKind::LtLt => Some(BinOp::ShiftLeft),
            TokenKind::GtGt => Some(BinOp::ShiftRight),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(Parser::parse_power, |kind| match kind {
            TokenKind::Star => Some(BinOp::Multiply),
            TokenKind::Slash => Some(BinOp::Divide),
            TokenKind::Percent => Some(BinOp::Modulo),
            _ => None,
        })
    }

    /// Power is right-associative and its operands are unary expressions, so
    /// `-2 ** 2` is `(-2) ** 2`.
    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_unary()?;

        if !matches!(self.current_token.kind, TokenKind::StarStar | TokenKind::Caret) {
            return Ok(base);
        }
        self.advance();

        self.enter()?;
        let exponent = self.parse_power();
        self.leave();

        Ok(binary(BinOp::Power, base, exponent?))
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.current_token.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        let position = self.current_token.position;
        self.advance();

        self.enter()?;
        let operand = self.parse_unary();
        self.leave();

        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            position,
        ))
    }

    // ------------------------------------------------------------------
    // Postfix chains
    // ------------------------------------------------------------------

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_token.kind {
                TokenKind::Dot => {
                    self.advance();
                    expr = self.parse_member(expr, false)?;
                }
                TokenKind::QuestionDot => {
                    if !self.options.enable_optional_chaining {
                        return Err(self.feature_disabled("optional chaining"));
                    }
                    self.advance();
                    expr = self.parse_member(expr, true)?;
                }
                TokenKind::LBracket => {
                    let open = self.current_token.position;
                    self.advance();
                    expr = self.parse_brackets(expr, false, open)?;
                }
                TokenKind::QuestionBracket => {
                    if !self.options.enable_optional_chaining {
                        return Err(self.feature_disabled("optional chaining"));
                    }
                    let open = self.current_token.position;
                    self.advance();
                    expr = self.parse_brackets(expr, true, open)?;
                }
                TokenKind::LParen => {
                    let callable = matches!(
                        expr.kind,
                        ExprKind::Identifier { optional: false, .. } | ExprKind::Call { .. }
                    );
                    if !callable {
                        return Err(ParseError::new(
                            ErrorCode::InvalidCallTarget,
                            "only a function name can be called",
                            self.current_token.position,
                        )
                        .with_token("("));
                    }
                    let open = self.current_token.position;
                    self.advance();
                    let args = self.parse_arguments(open)?;
                    let position = expr.position;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        position,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// After `.` or `?.`: a name, an integer position, or `(expr)`.
    fn parse_member(&mut self, target: Expr, optional: bool) -> ParseResult<Expr> {
        let position = target.position;
        let token = self.current_token.clone();

        let property = match &token.kind {
            TokenKind::Identifier(name) => Property::Name(name.clone()),
            TokenKind::Boolean(_) | TokenKind::Null | TokenKind::As => {
                Property::Name(token.lexeme.clone())
            }
            TokenKind::Number(n)
                if token.lexeme.chars().all(|c| c.is_ascii_digit()) && *n <= i64::MAX as f64 =>
            {
                Property::Index(*n as i64)
            }
            TokenKind::LParen => {
                self.advance();
                let index = self.parse_expression()?;
                if !self.check(&TokenKind::RParen) {
                    return Err(self.closing_error(&TokenKind::RParen, token.position, ErrorCode::UnclosedParen));
                }
                self.advance();
                return Ok(Expr::new(
                    ExprKind::Index {
                        target: Box::new(target),
                        index: Box::new(index),
                        optional,
                    },
                    position,
                ));
            }
            _ => {
                let mut error = self.unexpected("a property name");
                if !token.is_eof() {
                    error.code = ErrorCode::InvalidProperty;
                }
                return Err(error);
            }
        };
        self.advance();

        Ok(Expr::new(
            ExprKind::Member {
                target: Box::new(target),
                property,
                optional,
            },
            position,
        ))
    }

    /// After `[` or `?[`: an index, or a slice when a `:` appears.
    fn parse_brackets(&mut self, target: Expr, optional: bool, open: Position) -> ParseResult<Expr> {
        let position = target.position;

        if self.check(&TokenKind::RBracket) {
            return Err(ParseError::new(
                ErrorCode::EmptyElement,
                "index expression is empty",
                self.current_token.position,
            )
            .with_token("]"));
        }

        let start = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if !self.check(&TokenKind::Colon) {
            if !self.check(&TokenKind::RBracket) {
                return Err(self.closing_error(&TokenKind::RBracket, open, ErrorCode::UnclosedBracket));
            }
            self.advance();
            return match start {
                Some(index) => Ok(Expr::new(
                    ExprKind::Index {
                        target: Box::new(target),
                        index: Box::new(index),
                        optional,
                    },
                    position,
                )),
                None => Err(self.unexpected("an index expression")),
            };
        }
        self.advance(); // first ':'

        let end = if self.check(&TokenKind::Colon) || self.check(&TokenKind::RBracket) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        let step = if self.check(&TokenKind::Colon) {
            self.advance();
            if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(self.parse_expression()?)
            }
        } else {
            None
        };

        if !self.check(&TokenKind::RBracket) {
            return Err(self.closing_error(&TokenKind::RBracket, open, ErrorCode::UnclosedBracket));
        }
        self.advance();

        Ok(Expr::new(
            ExprKind::Slice {
                target: Box::new(target),
                start: start.map(Box::new),
                end: end.map(Box::new),
                step: step.map(Box::new),
                optional,
            },
            position,
        ))
    }

    // ------------------------------------------------------------------
    // Primaries
    // ------------------------------------------------------------------

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current_token.clone();
        let position = token.position;

        let kind = match token.kind {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::String(value) => ExprKind::String {
                value,
                raw: token.raw,
                single_quoted: token.single_quoted,
            },
            TokenKind::Boolean(b) => ExprKind::Boolean(b),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(name) => ExprKind::Identifier {
                name,
                optional: false,
            },

            // `.name` / `?.name` address the context directly
            TokenKind::Dot | TokenKind::QuestionDot => {
                let optional = matches!(self.current_token.kind, TokenKind::QuestionDot);
                if optional && !self.options.enable_optional_chaining {
                    return Err(self.feature_disabled("optional chaining"));
                }
                self.advance();
                return match &self.current_token.kind {
                    TokenKind::Identifier(name) => {
                        let name = name.clone();
                        self.advance();
                        Ok(Expr::new(ExprKind::Identifier { name, optional }, position))
                    }
                    _ => {
                        let mut error = self.unexpected("a variable name");
                        if !self.current_token.is_eof() {
                            error.code = ErrorCode::InvalidProperty;
                        }
                        Err(error)
                    }
                };
            }

            TokenKind::LParen => {
                self.advance();
                if self.check(&TokenKind::RParen) {
                    return Err(ParseError::new(
                        ErrorCode::UnexpectedToken,
                        "empty parentheses",
                        self.current_token.position,
                    )
                    .with_token(")")
                    .with_expected("expression"));
                }
                let expr = self.parse_expression()?;
                if !self.check(&TokenKind::RParen) {
                    return Err(self.closing_error(&TokenKind::RParen, position, ErrorCode::UnclosedParen));
                }
                self.advance();
                return Ok(expr);
            }
            TokenKind::LBracket => return self.parse_array_literal(position),
            TokenKind::LBrace => return self.parse_object_literal(position),

            _ => return Err(self.unexpected("an expression")),
        };

        self.advance();
        Ok(Expr::new(kind, position))
    }

    /// Comma-separated items up to `closing`. Empty elements and a trailing
    /// comma are recorded and skipped so parsing can continue.
    fn parse_list<T>(
        &mut self,
        closing: TokenKind,
        open: Position,
        unclosed: ErrorCode,
        mut item: impl FnMut(&mut Parser) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut items = Vec::new();

        loop {
            if self.check(&closing) {
                self.advance();
                return Ok(items);
            }
            if self.check(&TokenKind::Comma) {
                let error = ParseError::new(
                    ErrorCode::EmptyElement,
                    "empty element in list",
                    self.current_token.position,
                )
                .with_token(",");
                self.record(error);
                self.advance();
                continue;
            }
            if self.current_token.is_eof() {
                return Err(self.closing_error(&closing, open, unclosed));
            }

            items.push(item(self)?);

            if self.check(&TokenKind::Comma) {
                let comma_at = self.current_token.position;
                self.advance();
                if self.check(&closing) {
                    let error = ParseError::new(
                        ErrorCode::TrailingComma,
                        format!("trailing comma before '{}'", closing.symbol()),
                        comma_at,
                    )
                    .with_token(",");
                    self.record(error);
                }
            } else if !self.check(&closing) {
                return Err(self.closing_error(&closing, open, unclosed));
            }
        }
    }

    fn parse_array_literal(&mut self, open: Position) -> ParseResult<Expr> {
        self.advance(); // [
        let elements = self.parse_list(
            TokenKind::RBracket,
            open,
            ErrorCode::UnclosedBracket,
            Parser::parse_expression,
        )?;
        Ok(Expr::new(ExprKind::Array(elements), open))
    }

    fn parse_object_literal(&mut self, open: Position) -> ParseResult<Expr> {
        self.advance(); // {
        let pairs = self.parse_list(
            TokenKind::RBrace,
            open,
            ErrorCode::UnclosedBrace,
            Parser::parse_object_entry,
        )?;
        Ok(Expr::new(ExprKind::Object(pairs), open))
    }

    fn parse_object_entry(&mut self) -> ParseResult<(String, Expr)> {
        let token = &self.current_token;
        let key = match &token.kind {
            TokenKind::String(s) => s.clone(),
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Number(n) => format_number(*n),
            TokenKind::Boolean(_) | TokenKind::Null | TokenKind::As => token.lexeme.clone(),
            _ => {
                return Err(ParseError::new(
                    ErrorCode::InvalidObjectKey,
                    format!("{} cannot be used as an object key", token.kind.describe()),
                    token.position,
                )
                .with_token(token.lexeme.clone())
                .with_expected("string or identifier"));
            }
        };
        self.advance();

        if !self.check(&TokenKind::Colon) {
            let mut error = self.unexpected("':' after object key");
            if !self.current_token.is_eof() {
                error.code = ErrorCode::ExpectedToken;
            }
            return Err(error);
        }
        self.advance();

        let value = self.parse_expression()?;
        Ok((key, value))
    }

    fn parse_arguments(&mut self, open: Position) -> ParseResult<Vec<Expr>> {
        self.parse_list(
            TokenKind::RParen,
            open,
            ErrorCode::UnclosedParen,
            Parser::parse_expression,
        )
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let position = left.position;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        position,
    )
}

fn closing_partner(closing: &TokenKind) -> &'static str {
    match closing {
        TokenKind::RParen => "'('",
        TokenKind::RBracket => "'['",
        TokenKind::RBrace => "'{'",
        TokenKind::Colon => "'?'",
        _ => "delimiter",
    }
}
