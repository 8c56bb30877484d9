use crate::ast::{BinOp, Position, UnaryOp};

/// A parsed expression together with the position it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Expr { kind, position }
    }

    /// Whether this node is a member or index access (the kind of step `??`
    /// softens).
    pub fn is_access(&self) -> bool {
        matches!(self.kind, ExprKind::Member { .. } | ExprKind::Index { .. })
    }
}

/// Abstract Syntax Tree node kinds.
///
/// Children are owned; the tree never shares nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    /// Numeric literal
    ///
    /// # Example
    /// ```text
    /// 42
    /// ```
    Number(f64),

    /// String literal
    ///
    /// # Example
    /// ```text
    /// "hello"
    /// r'C:\path'
    /// ```
    String {
        value: String,
        raw: bool,
        single_quoted: bool,
    },

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    // References
    /// Variable reference
    ///
    /// Names starting with `$` are pipe-locals; anything else is looked up in
    /// the host context. `optional` is set for the leading `?.name` form.
    ///
    /// # Examples
    /// ```text
    /// price
    /// $item
    /// .user       // same as `user`
    /// ?.user      // null when `user` is not provided
    /// ```
    Identifier { name: String, optional: bool },

    // Operations
    /// Prefix operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation (arithmetic, bitwise, comparison, logical, `??`)
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Ternary conditional
    ///
    /// # Example
    /// ```text
    /// age >= 18 ? "adult" : "minor"
    /// ```
    Conditional {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },

    // Literals of collections
    /// Array literal
    Array(Vec<Expr>),

    /// Object literal, keys in source order
    ///
    /// # Example
    /// ```text
    /// {"name": user.name, total: 3}
    /// ```
    Object(Vec<(String, Expr)>),

    /// Function call
    ///
    /// # Example
    /// ```text
    /// max(a, b)
    /// ```
    Call { callee: Box<Expr>, args: Vec<Expr> },

    // Access
    /// Dotted member access
    ///
    /// # Examples
    /// ```text
    /// user.name
    /// items.0
    /// user?.name
    /// ```
    Member {
        target: Box<Expr>,
        property: Property,
        optional: bool,
    },

    /// Bracketed index access
    ///
    /// # Examples
    /// ```text
    /// items[i + 1]
    /// items?[0]
    /// obj.(key)
    /// ```
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },

    /// Slice of an array or string
    ///
    /// # Examples
    /// ```text
    /// items[1:4]
    /// items[::-1]
    /// ```
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        optional: bool,
    },

    /// Pipe chain; the first stage is the source expression
    ///
    /// # Example
    /// ```text
    /// items |filter: $item.active |map: $item.name as $names
    /// ```
    Pipe(Vec<PipeStage>),
}

/// Property named after a `.`
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Name(String),
    Index(i64),
}

/// Pipe type of the first stage of a chain.
pub const SOURCE_STAGE: &str = "source";

/// Pipe type used by the bare `|:` marker.
pub const DEFAULT_PIPE: &str = "default";

/// One segment of a pipe chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeStage {
    pub expression: Expr,
    /// Handler name (`default` for `|:`, [`SOURCE_STAGE`] for the head)
    pub pipe_type: String,
    /// `as $alias` suffix
    pub alias: Option<String>,
    pub position: Position,
}
