use crate::{
    ast::{Position, Token, TokenKind},
    error::{ErrorCode, ParseError},
};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    /// Lex `NaN` and `Inf` as numbers
    ieee754_specials: bool,
    /// The previous token was `.` or `?.`; a number after it never takes a fraction
    after_dot: bool,
    /// Set once a lexical error has been reported
    halted: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            ieee754_specials: false,
            after_dot: false,
            halted: false,
        }
    }

    pub fn with_ieee754_specials(mut self, enabled: bool) -> Self {
        self.ieee754_specials = enabled;
        self
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn location(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn lexeme_from(&self, begin: usize) -> String {
        self.input[begin..self.position].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self, quote: char, start: Position) -> Result<String, ParseError> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let escape_at = self.location();
                    self.advance();
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('0') => '\0',
                        Some('/') => '/',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        Some('u') => {
                            self.advance();
                            result.push(self.read_unicode_escape(escape_at)?);
                            continue;
                        }
                        Some(other) => {
                            return Err(ParseError::new(
                                ErrorCode::InvalidEscape,
                                format!("invalid escape sequence '\\{}'", other),
                                escape_at,
                            )
                            .with_token(format!("\\{}", other)));
                        }
                        None => break,
                    };
                    result.push(escaped);
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(ParseError::new(
            ErrorCode::UnterminatedString,
            format!("unterminated string: missing closing {}", quote),
            start,
        )
        .with_expected(quote.to_string()))
    }

    /// Reads the `XXXX` after `\u`, combining surrogate pairs.
    fn read_unicode_escape(&mut self, escape_at: Position) -> Result<char, ParseError> {
        let high = self.read_hex4(escape_at)?;
        let code = if (0xD800..0xDC00).contains(&high) {
            if self.current_char() == Some('\\') && self.peek_char(1) == Some('u') {
                self.advance_by(2);
                let low = self.read_hex4(escape_at)?;
                if !(0xDC00..0xE000).contains(&low) {
                    return Err(invalid_unicode(escape_at));
                }
                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
            } else {
                return Err(invalid_unicode(escape_at));
            }
        } else {
            high
        };
        char::from_u32(code).ok_or_else(|| invalid_unicode(escape_at))
    }

    fn read_hex4(&mut self, escape_at: Position) -> Result<u32, ParseError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let digit = self
                .current_char()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| invalid_unicode(escape_at))?;
            value = value * 16 + digit;
            self.advance();
        }
        Ok(value)
    }

    /// Raw strings: no backslash processing, a doubled quote is a literal quote.
    fn read_raw_string(&mut self, quote: char, start: Position) -> Result<String, ParseError> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            if ch == quote {
                if self.peek_char(1) == Some(quote) {
                    result.push(quote);
                    self.advance_by(2);
                    continue;
                }
                self.advance();
                return Ok(result);
            }
            result.push(ch);
            self.advance();
        }

        Err(ParseError::new(
            ErrorCode::UnterminatedString,
            format!("unterminated raw string: missing closing {}", quote),
            start,
        )
        .with_expected(quote.to_string()))
    }

    fn read_number(&mut self, start: Position) -> Result<Token, ParseError> {
        let begin = self.position;

        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if !self.after_dot
            && self.current_char() == Some('.')
            && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if matches!(self.current_char(), Some('e') | Some('E')) {
            let mut offset = 1;
            if matches!(self.peek_char(offset), Some('+') | Some('-')) {
                offset += 1;
            }
            // Only commit to an exponent when a digit follows; otherwise the
            // `e` belongs to the next token.
            if self.peek_char(offset).is_some_and(|c| c.is_ascii_digit()) {
                self.advance_by(offset);
                while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let lexeme = self.lexeme_from(begin);
        match lexeme.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Token::new(TokenKind::Number(value), lexeme, start)),
            Ok(_) => Err(ParseError::new(
                ErrorCode::InvalidNumber,
                format!("number literal '{}' is out of range", lexeme),
                start,
            )
            .with_token(lexeme)),
            Err(_) => Err(ParseError::new(
                ErrorCode::InvalidNumber,
                format!("invalid number literal '{}'", lexeme),
                start,
            )
            .with_token(lexeme)),
        }
    }

    /// After `--`: an operand or operator means two unary minuses.
    fn starts_operand_or_operator(ch: Option<char>) -> bool {
        match ch {
            Some(c) => c.is_alphanumeric() || "_$([{'\"+-*/%^&|~!<>=?".contains(c),
            None => false,
        }
    }

    fn read_pipe_or_bar(&mut self, begin: usize, start: Position) -> Token {
        if self.peek_char(1) == Some('|') {
            self.advance_by(2);
            return Token::new(TokenKind::BarBar, "||", start);
        }
        if self.peek_char(1) == Some(':') {
            self.advance_by(2);
            return Token::new(TokenKind::Pipe(None), "|:", start);
        }

        let mut length = 0;
        while self
            .peek_char(1 + length)
            .is_some_and(|c| c.is_ascii_alphabetic())
        {
            length += 1;
        }
        if length > 0 && self.peek_char(1 + length) == Some(':') {
            let name: String = self.input[self.position + 1..self.position + 1 + length]
                .iter()
                .collect();
            self.advance_by(length + 2);
            return Token::new(TokenKind::Pipe(Some(name)), self.lexeme_from(begin), start);
        }

        self.advance();
        Token::new(TokenKind::Bar, "|", start)
    }

    fn single(&mut self, kind: TokenKind, lexeme: &str, start: Position) -> Token {
        self.advance_by(lexeme.chars().count());
        Token::new(kind, lexeme, start)
    }

    fn scan_token(&mut self, start: Position) -> Result<Token, ParseError> {
        let begin = self.position;

        let Some(ch) = self.current_char() else {
            return Ok(Token::eof(start));
        };
        let next = self.peek_char(1);

        let token = match ch {
            '+' if next == Some('+') => self.single(TokenKind::PlusPlus, "++", start),
            '+' => self.single(TokenKind::Plus, "+", start),
            '-' if next == Some('-') => {
                if Self::starts_operand_or_operator(self.peek_char(2)) {
                    self.single(TokenKind::Minus, "-", start)
                } else {
                    self.single(TokenKind::MinusMinus, "--", start)
                }
            }
            '-' => self.single(TokenKind::Minus, "-", start),
            '*' if next == Some('*') => self.single(TokenKind::StarStar, "**", start),
            '*' => self.single(TokenKind::Star, "*", start),
            '/' => self.single(TokenKind::Slash, "/", start),
            '%' => self.single(TokenKind::Percent, "%", start),
            '^' => self.single(TokenKind::Caret, "^", start),
            '&' if next == Some('&') => self.single(TokenKind::AmpAmp, "&&", start),
            '&' => self.single(TokenKind::Ampersand, "&", start),
            '|' => self.read_pipe_or_bar(begin, start),
            '~' => self.single(TokenKind::Tilde, "~", start),
            '!' if next == Some('=') => self.single(TokenKind::BangEq, "!=", start),
            '!' => self.single(TokenKind::Bang, "!", start),
            '=' if next == Some('=') => self.single(TokenKind::EqEq, "==", start),
            '=' => {
                return Err(ParseError::new(
                    ErrorCode::InvalidCharacter,
                    "unexpected '=' (did you mean '=='?)",
                    start,
                )
                .with_token("=")
                .with_expected("=="));
            }
            '<' if next == Some('=') => self.single(TokenKind::LtEq, "<=", start),
            '<' if next == Some('<') => self.single(TokenKind::LtLt, "<<", start),
            '<' if next == Some('>') => self.single(TokenKind::LtGt, "<>", start),
            '<' => self.single(TokenKind::Lt, "<", start),
            '>' if next == Some('=') => self.single(TokenKind::GtEq, ">=", start),
            '>' if next == Some('>') => self.single(TokenKind::GtGt, ">>", start),
            '>' => self.single(TokenKind::Gt, ">", start),
            '?' if next == Some('?') => self.single(TokenKind::QuestionQuestion, "??", start),
            '?' if next == Some('.') => self.single(TokenKind::QuestionDot, "?.", start),
            '?' if next == Some('[') => self.single(TokenKind::QuestionBracket, "?[", start),
            '?' => self.single(TokenKind::Question, "?", start),
            '.' => self.single(TokenKind::Dot, ".", start),
            ',' => self.single(TokenKind::Comma, ",", start),
            ':' => self.single(TokenKind::Colon, ":", start),
            '(' => self.single(TokenKind::LParen, "(", start),
            ')' => self.single(TokenKind::RParen, ")", start),
            '[' => self.single(TokenKind::LBracket, "[", start),
            ']' => self.single(TokenKind::RBracket, "]", start),
            '{' => self.single(TokenKind::LBrace, "{", start),
            '}' => self.single(TokenKind::RBrace, "}", start),
            'r' if matches!(next, Some('"') | Some('\'')) => {
                self.advance(); // r
                let quote = next.unwrap_or('"');
                let value = self.read_raw_string(quote, start)?;
                let mut token = Token::new(TokenKind::String(value), self.lexeme_from(begin), start);
                token.raw = true;
                token.single_quoted = quote == '\'';
                token
            }
            '"' | '\'' => {
                let value = self.read_string(ch, start)?;
                let mut token = Token::new(TokenKind::String(value), self.lexeme_from(begin), start);
                token.single_quoted = ch == '\'';
                token
            }
            c if c.is_ascii_digit() => self.read_number(start)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let ident = self.read_identifier();
                let kind = match ident.as_str() {
                    "true" => TokenKind::Boolean(true),
                    "false" => TokenKind::Boolean(false),
                    "null" => TokenKind::Null,
                    "as" => TokenKind::As,
                    "NaN" if self.ieee754_specials => TokenKind::Number(f64::NAN),
                    "Inf" if self.ieee754_specials => TokenKind::Number(f64::INFINITY),
                    _ => TokenKind::Identifier(ident.clone()),
                };
                Token::new(kind, ident, start)
            }
            other => {
                return Err(ParseError::new(
                    ErrorCode::InvalidCharacter,
                    format!("invalid character '{}'", other.escape_debug()),
                    start,
                )
                .with_token(other.to_string()));
            }
        };

        Ok(token)
    }

    /// Produces the next token, or `Eof` once the input is exhausted.
    ///
    /// After a lexical error every further call returns `Eof`.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        if self.halted {
            return Ok(Token::eof(self.location()));
        }

        self.skip_whitespace();
        let start = self.location();

        match self.scan_token(start) {
            Ok(token) => {
                self.after_dot = matches!(token.kind, TokenKind::Dot | TokenKind::QuestionDot);
                Ok(token)
            }
            Err(error) => {
                self.halted = true;
                Err(error)
            }
        }
    }

    /// Tokenizes the whole input, ending with the `Eof` token.
    pub fn preload_all(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.is_eof();
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

fn invalid_unicode(position: Position) -> ParseError {
    ParseError::new(
        ErrorCode::InvalidEscape,
        "invalid unicode escape sequence",
        position,
    )
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("true false null as");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Boolean(true));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Boolean(false));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Null);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::As);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
}

#[test]
fn test_pipe() {
    let mut lexer = Lexer::new("[1] |map: $item | 2");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::LBracket);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number(1.0));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::RBracket);
    assert_eq!(
        lexer.next_token().unwrap().kind,
        TokenKind::Pipe(Some("map".to_string()))
    );
    assert_eq!(
        lexer.next_token().unwrap().kind,
        TokenKind::Identifier("$item".to_string())
    );
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Bar);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number(2.0));
}
