//! Typed syntax tree for the spec macro language.
//!
//! Every node carries a [`Span`] locating it in the source text. The tree is
//! deliberately statement-oriented: the indexing engine only descends into
//! statements and declarations, so expression structure stays shallow.

use std::fmt;

/// A zero-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A half-open source range, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Span { start, end }
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc >= self.start && loc <= self.end
    }

    /// True when `other` lies entirely inside this span.
    pub fn encloses(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A `#` comment with its source span. Comments are gathered by the lexer
/// and attached to declarations in a separate pass, never stored in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

/// Storage class of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Constant,
    Global,
    Local,
    Shared,
}

/// One `name` or `name = init` inside a variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expression>,
    pub span: Span,
}

/// A formal parameter of a function-style macro definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier { name: String, span: Span },
    NumberLiteral { raw: String, span: Span },
    StringLiteral { raw: String, span: Span },
    Call { callee: Box<Expression>, arguments: Vec<Expression>, span: Span },
    Index { object: Box<Expression>, indices: Vec<Expression>, span: Span },
    Unary { operator: String, operand: Box<Expression>, span: Span },
    Binary { operator: String, left: Box<Expression>, right: Box<Expression>, span: Span },
    Assignment { target: Box<Expression>, value: Box<Expression>, span: Span },
    /// Placeholder produced by error recovery; has no children.
    Null { span: Span },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Identifier { span, .. }
            | Expression::NumberLiteral { span, .. }
            | Expression::StringLiteral { span, .. }
            | Expression::Call { span, .. }
            | Expression::Index { span, .. }
            | Expression::Unary { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Assignment { span, .. }
            | Expression::Null { span } => *span,
        }
    }

    /// Literal text when the expression is a number or string literal.
    pub fn literal_text(&self) -> Option<&str> {
        match self {
            Expression::NumberLiteral { raw, .. } | Expression::StringLiteral { raw, .. } => {
                Some(raw)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `def name(a, b) '…'` or (with `params == None`) `def name '…'`.
    FunctionDeclaration {
        name: String,
        name_span: Span,
        /// `None` for a traditional macro defined without a parameter list.
        params: Option<Vec<Parameter>>,
        body: Vec<Statement>,
        /// True for `rdef` definitions.
        runtime: bool,
        span: Span,
    },
    /// `const`, `global`, `local` or `shared` declarations.
    VariableDeclaration {
        kind: DeclarationKind,
        /// Set when the declaration carries the `array` keyword.
        array: bool,
        /// Optional data type word (`float`, `long`, …).
        data_type: Option<String>,
        declarators: Vec<Declarator>,
        span: Span,
    },
    BlockStatement {
        body: Vec<Statement>,
        span: Span,
    },
    IfStatement {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
        span: Span,
    },
    WhileStatement {
        test: Expression,
        body: Box<Statement>,
        span: Span,
    },
    ForStatement {
        body: Box<Statement>,
        span: Span,
    },
    /// Command-style macro invocation, e.g. `wm th tth`.
    MacroStatement {
        name: String,
        arguments: Vec<Expression>,
        span: Span,
    },
    ExpressionStatement {
        expression: Expression,
        span: Span,
    },
    ExitStatement { span: Span },
    QuitStatement { span: Span },
    /// Error-recovery node covering source the parser could not classify.
    InvalidStatement { span: Span },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::FunctionDeclaration { span, .. }
            | Statement::VariableDeclaration { span, .. }
            | Statement::BlockStatement { span, .. }
            | Statement::IfStatement { span, .. }
            | Statement::WhileStatement { span, .. }
            | Statement::ForStatement { span, .. }
            | Statement::MacroStatement { span, .. }
            | Statement::ExpressionStatement { span, .. }
            | Statement::ExitStatement { span }
            | Statement::QuitStatement { span }
            | Statement::InvalidStatement { span } => *span,
        }
    }
}

/// Root of one parsed file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Statement>,
    pub span: Span,
}
