use std::fmt;

/// A 1-based source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token kinds produced by the lexer.
///
/// Literal kinds carry their decoded value; the original lexeme is kept on
/// [`Token::lexeme`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Numeric literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// 1e-3
    /// NaN    // only with IEEE-754 specials enabled
    /// ```
    Number(f64),

    /// String literal, already unescaped
    ///
    /// # Examples
    /// ```text
    /// "hello\n"
    /// 'single'
    /// r"raw ""quoted"""
    /// ```
    String(String),

    /// `true` / `false`
    Boolean(bool),

    /// `null`
    Null,

    /// Identifier, including pipe-locals such as `$item`
    Identifier(String),

    /// The `as` keyword introducing a pipe alias
    As,

    // Arithmetic
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `^` (power)
    Caret,
    /// `**` (power)
    StarStar,
    /// `++`, never valid in an expression
    PlusPlus,
    /// `--` not followed by an operand
    MinusMinus,

    // Bitwise and logical
    /// `&`
    Ampersand,
    /// `&&`
    AmpAmp,
    /// `|`
    Bar,
    /// `||`
    BarBar,
    /// `~` (XOR when binary, NOT when unary)
    Tilde,
    /// `!`
    Bang,
    /// `<<`
    LtLt,
    /// `>>`
    GtGt,

    // Comparison
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    /// `<>`
    LtGt,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,

    // Conditional and chaining
    /// `?` of the ternary operator
    Question,
    /// `??`
    QuestionQuestion,
    /// `?.`
    QuestionDot,
    /// `?[`
    QuestionBracket,

    /// Pipe marker: `|:` carries `None`, `|map:` carries `Some("map")`
    Pipe(Option<String>),

    // Delimiters
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::String(s) => format!("string {:?}", s),
            TokenKind::Boolean(b) => b.to_string(),
            TokenKind::Null => "null".to_string(),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Pipe(None) => "'|:'".to_string(),
            TokenKind::Pipe(Some(name)) => format!("'|{}:'", name),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    /// Source spelling of punctuation and operator tokens.
    pub fn symbol(&self) -> &'static str {
        match self {
            TokenKind::As => "as",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::StarStar => "**",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Ampersand => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::Bar => "|",
            TokenKind::BarBar => "||",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::LtGt => "<>",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Question => "?",
            TokenKind::QuestionQuestion => "??",
            TokenKind::QuestionDot => "?.",
            TokenKind::QuestionBracket => "?[",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            _ => "",
        }
    }
}

/// A positioned token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text of the token
    pub lexeme: String,
    /// Position of the first character
    pub position: Position,
    /// Set for `'...'` string literals
    pub single_quoted: bool,
    /// Set for `r"..."` / `r'...'` string literals
    pub raw: bool,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            position,
            single_quoted: false,
            raw: false,
        }
    }

    pub fn eof(position: Position) -> Self {
        Token::new(TokenKind::Eof, "", position)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
