//! Hand-written recursive descent parser for the spec macro language.
//!
//! The parser is tolerant by construction: a line it cannot classify becomes
//! an `InvalidStatement` spanning the consumed tokens, so one bad statement
//! never hides the declarations around it. Hard [`SyntaxError`]s are reserved
//! for input that cannot be tokenized or for unterminated macro bodies.

use super::ast::{
    Comment, DeclarationKind, Declarator, Expression, Location, Parameter, Program, Span,
    Statement,
};
use super::lexer::{self, Token, TokenKind};

/// A non-recoverable parse failure with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub location: Location,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Result of parsing one file: the tree plus the comment side-table.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub program: Program,
    pub comments: Vec<Comment>,
}

/// Parse a whole source file.
pub fn parse(source: &str) -> Result<ParseOutput, SyntaxError> {
    let (tokens, comments) = lexer::tokenize(source).map_err(|e| SyntaxError {
        message: e.message,
        location: e.location,
    })?;
    let end = tokens.last().map(|t| t.span.end).unwrap_or_default();
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.statements(StopAt::Eof)?;
    Ok(ParseOutput {
        program: Program {
            body,
            span: Span::new(Location::default(), end),
        },
        comments,
    })
}

/// Terminator context for a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopAt {
    Eof,
    RBrace,
    BodyClose,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

const DATA_TYPES: &[&str] = &[
    "float", "double", "long", "long64", "ulong", "ulong64", "short", "ushort", "byte", "ubyte",
    "string",
];

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn here(&self) -> Location {
        self.peek()
            .map(|t| t.span.start)
            .or_else(|| self.tokens.last().map(|t| t.span.end))
            .unwrap_or_default()
    }

    fn prev_end(&self) -> Location {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span.end)
            .unwrap_or_default()
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Semicolon)
        )
    }

    fn skip_terminators(&mut self) {
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Semicolon)
        ) {
            self.bump();
        }
    }

    fn ident_text(&self) -> Option<&str> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn statements(&mut self, stop: StopAt) -> Result<Vec<Statement>, SyntaxError> {
        let mut body = Vec::new();
        loop {
            self.skip_terminators();
            match (stop, self.peek().map(|t| &t.kind)) {
                (_, None) => {
                    if stop == StopAt::BodyClose {
                        return Err(SyntaxError {
                            message: "unterminated macro body".to_string(),
                            location: self.prev_end(),
                        });
                    }
                    break;
                }
                (StopAt::RBrace, Some(TokenKind::RBrace))
                | (StopAt::BodyClose, Some(TokenKind::BodyOpen)) => break,
                _ => {}
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::LBrace) => self.block(),
            Some(TokenKind::Identifier(word)) => match word.as_str() {
                "def" | "rdef" => self.function_declaration(word == "rdef"),
                "const" | "constant" => self.variable_declaration(DeclarationKind::Constant),
                "global" => self.variable_declaration(DeclarationKind::Global),
                "local" => self.variable_declaration(DeclarationKind::Local),
                "shared" => self.variable_declaration(DeclarationKind::Shared),
                "if" => self.if_statement(),
                "while" => self.while_statement(),
                "for" => self.for_statement(),
                "exit" => {
                    self.bump();
                    Ok(Statement::ExitStatement {
                        span: Span::new(start, self.prev_end()),
                    })
                }
                "quit" => {
                    self.bump();
                    Ok(Statement::QuitStatement {
                        span: Span::new(start, self.prev_end()),
                    })
                }
                _ => self.macro_or_expression(),
            },
            Some(_) => self.expression_statement(),
            None => Ok(Statement::InvalidStatement {
                span: Span::new(start, start),
            }),
        }
    }

    fn block(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // {
        let body = self.statements(StopAt::RBrace)?;
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
            self.bump();
        }
        Ok(Statement::BlockStatement {
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn function_declaration(&mut self, runtime: bool) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // def / rdef

        let (name, name_span) = match self.peek().cloned() {
            Some(Token { kind: TokenKind::Identifier(name), span }) => {
                self.bump();
                (name, span)
            }
            _ => return self.recover(start),
        };

        let params = if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            Some(self.parameter_list()?)
        } else {
            None
        };

        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::BodyOpen) => {
                self.bump();
            }
            _ => {
                return Err(SyntaxError {
                    message: format!("expected macro body after \"{}\"", name),
                    location: self.here(),
                })
            }
        }

        let body = self.statements(StopAt::BodyClose)?;
        self.bump(); // closing quote

        Ok(Statement::FunctionDeclaration {
            name,
            name_span,
            params,
            body,
            runtime,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parameter_list(&mut self) -> Result<Vec<Parameter>, SyntaxError> {
        self.bump(); // (
        let mut params = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Token { kind: TokenKind::RParen, .. }) => {
                    self.bump();
                    break;
                }
                Some(Token { kind: TokenKind::Comma, .. }) => {
                    self.bump();
                }
                Some(Token { kind: TokenKind::Identifier(name), span }) => {
                    self.bump();
                    params.push(Parameter { name: Some(name), span });
                }
                Some(Token { span, .. }) => {
                    // Destructured or otherwise non-identifier parameter:
                    // recorded positionally with no name.
                    self.bump();
                    params.push(Parameter { name: None, span });
                }
                None => {
                    return Err(SyntaxError {
                        message: "unterminated parameter list".to_string(),
                        location: self.prev_end(),
                    })
                }
            }
        }
        Ok(params)
    }

    fn variable_declaration(&mut self, kind: DeclarationKind) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // keyword

        let mut data_type = None;
        if let Some(word) = self.ident_text() {
            if DATA_TYPES.contains(&word) {
                data_type = Some(word.to_string());
                self.bump();
            }
        }
        let mut array = false;
        if self.ident_text() == Some("array") {
            array = true;
            self.bump();
        }

        let mut declarators = Vec::new();
        while let Some(TokenKind::Identifier(name)) = self.peek().map(|t| t.kind.clone()) {
            let name_start = self.here();
            self.bump();
            // Array dimensions: data[512][512]
            while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LBracket)) {
                self.skip_bracket_group()?;
            }
            let init = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Op(op)) if op == "=" => {
                    self.bump();
                    Some(self.expression(0)?)
                }
                // `constant PI 3.14` form: a bare literal is the initializer.
                Some(TokenKind::Number(_)) | Some(TokenKind::Str(_))
                    if kind == DeclarationKind::Constant =>
                {
                    Some(self.primary()?)
                }
                _ => None,
            };
            declarators.push(Declarator {
                name,
                init,
                span: Span::new(name_start, self.prev_end()),
            });
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                self.bump();
            }
            if self.at_terminator() {
                break;
            }
        }

        if declarators.is_empty() {
            return self.recover(start);
        }
        Ok(Statement::VariableDeclaration {
            kind,
            array,
            data_type,
            declarators,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn skip_bracket_group(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0usize;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::LBracket) => {
                    depth += 1;
                    self.bump();
                }
                Some(TokenKind::RBracket) => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(TokenKind::Newline) | None => {
                    return Err(SyntaxError {
                        message: "unterminated array dimension".to_string(),
                        location: self.prev_end(),
                    })
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn if_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // if
        let test = self.parenthesized_test()?;
        self.skip_terminators();
        let consequent = Box::new(self.statement()?);
        let save = self.pos;
        self.skip_terminators();
        let alternate = if self.ident_text() == Some("else") {
            self.bump();
            self.skip_terminators();
            Some(Box::new(self.statement()?))
        } else {
            self.pos = save;
            None
        };
        Ok(Statement::IfStatement {
            test,
            consequent,
            alternate,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn while_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // while
        let test = self.parenthesized_test()?;
        self.skip_terminators();
        let body = Box::new(self.statement()?);
        Ok(Statement::WhileStatement {
            test,
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn for_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        self.bump(); // for
        // The header is opaque to the indexer; consume the parenthesized
        // group without building expression structure.
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            let mut depth = 0usize;
            loop {
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::LParen) => {
                        depth += 1;
                        self.bump();
                    }
                    Some(TokenKind::RParen) => {
                        depth -= 1;
                        self.bump();
                        if depth == 0 {
                            break;
                        }
                    }
                    None => {
                        return Err(SyntaxError {
                            message: "unterminated for header".to_string(),
                            location: self.prev_end(),
                        })
                    }
                    _ => {
                        self.bump();
                    }
                }
            }
        }
        self.skip_terminators();
        let body = Box::new(self.statement()?);
        Ok(Statement::ForStatement {
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parenthesized_test(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.here();
        if !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            return Ok(Expression::Null {
                span: Span::new(start, start),
            });
        }
        self.bump();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.bump();
            return Ok(Expression::Null {
                span: Span::new(start, self.prev_end()),
            });
        }
        let test = self.expression(0)?;
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.bump();
        }
        Ok(test)
    }

    /// Identifier-led line: either a command-style macro invocation
    /// (`wm th tth`) or an ordinary expression statement (`x = 1`, `f(2)`).
    fn macro_or_expression(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        let command_like = match self.tokens.get(self.pos + 1).map(|t| &t.kind) {
            // `name arg …` with a bare word, number or string argument and no
            // operator in between reads as a macro invocation.
            Some(TokenKind::Identifier(_))
            | Some(TokenKind::Number(_))
            | Some(TokenKind::Str(_))
            | Some(TokenKind::Newline)
            | Some(TokenKind::Semicolon)
            | None => true,
            _ => false,
        };
        if !command_like {
            return self.expression_statement();
        }

        let name = match self.bump() {
            Some(Token { kind: TokenKind::Identifier(name), .. }) => name,
            _ => return self.recover(start),
        };
        let mut arguments = Vec::new();
        while !self.at_terminator() {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Identifier(_))
                | Some(TokenKind::Number(_))
                | Some(TokenKind::Str(_)) => {
                    arguments.push(self.primary()?);
                }
                _ => {
                    // Anything fancier is beyond command syntax; swallow the
                    // rest of the line.
                    self.consume_line();
                    break;
                }
            }
        }
        Ok(Statement::MacroStatement {
            name,
            arguments,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn expression_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.here();
        match self.expression(0) {
            Ok(expression) => {
                if !self.at_terminator()
                    && !matches!(
                        self.peek().map(|t| &t.kind),
                        Some(TokenKind::RBrace) | Some(TokenKind::BodyOpen)
                    )
                {
                    // Trailing garbage: fold the whole line into recovery.
                    return self.recover(start);
                }
                Ok(Statement::ExpressionStatement {
                    span: Span::new(start, self.prev_end()),
                    expression,
                })
            }
            Err(_) => self.recover(start),
        }
    }

    /// Consume to end of line and produce an `InvalidStatement`.
    fn recover(&mut self, start: Location) -> Result<Statement, SyntaxError> {
        self.consume_line();
        Ok(Statement::InvalidStatement {
            span: Span::new(start, self.prev_end()),
        })
    }

    fn consume_line(&mut self) {
        while !self.at_terminator()
            && !matches!(
                self.peek().map(|t| &t.kind),
                Some(TokenKind::RBrace) | Some(TokenKind::BodyOpen)
            )
        {
            self.bump();
        }
    }

    // === Expressions: precedence-climbing ===

    fn expression(&mut self, min_bp: u8) -> Result<Expression, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            let (op, bp, right_assoc) = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Op(op)) => match op.as_str() {
                    "=" | "+=" | "-=" | "*=" | "/=" | "%=" => (op.clone(), 1, true),
                    "||" => (op.clone(), 2, false),
                    "&&" => (op.clone(), 3, false),
                    "|" => (op.clone(), 4, false),
                    "^" => (op.clone(), 5, false),
                    "&" => (op.clone(), 6, false),
                    "==" | "!=" => (op.clone(), 7, false),
                    "<" | ">" | "<=" | ">=" => (op.clone(), 8, false),
                    "<<" | ">>" => (op.clone(), 9, false),
                    "+" | "-" => (op.clone(), 10, false),
                    "*" | "/" | "%" => (op.clone(), 11, false),
                    _ => break,
                },
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            self.bump();
            let next_bp = if right_assoc { bp } else { bp + 1 };
            let right = self.expression(next_bp)?;
            let span = Span::new(left.span().start, right.span().end);
            left = if matches!(op.as_str(), "=" | "+=" | "-=" | "*=" | "/=" | "%=") {
                Expression::Assignment {
                    target: Box::new(left),
                    value: Box::new(right),
                    span,
                }
            } else {
                Expression::Binary {
                    operator: op,
                    left: Box::new(left),
                    right: Box::new(right),
                    span,
                }
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.here();
        if let Some(TokenKind::Op(op)) = self.peek().map(|t| t.kind.clone()) {
            if matches!(op.as_str(), "-" | "+" | "!" | "~" | "++" | "--") {
                self.bump();
                let operand = self.unary()?;
                let span = Span::new(start, operand.span().end);
                return Ok(Expression::Unary {
                    operator: op,
                    operand: Box::new(operand),
                    span,
                });
            }
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expression, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::LParen) => {
                    self.bump();
                    let mut arguments = Vec::new();
                    loop {
                        match self.peek().map(|t| &t.kind) {
                            Some(TokenKind::RParen) => {
                                self.bump();
                                break;
                            }
                            Some(TokenKind::Comma) => {
                                self.bump();
                            }
                            None | Some(TokenKind::Newline) => {
                                return Err(SyntaxError {
                                    message: "unterminated argument list".to_string(),
                                    location: self.prev_end(),
                                })
                            }
                            _ => arguments.push(self.expression(2)?),
                        }
                    }
                    let span = Span::new(expr.span().start, self.prev_end());
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        arguments,
                        span,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let mut indices = Vec::new();
                    loop {
                        match self.peek().map(|t| &t.kind) {
                            Some(TokenKind::RBracket) => {
                                self.bump();
                                break;
                            }
                            Some(TokenKind::Comma) => {
                                self.bump();
                            }
                            None | Some(TokenKind::Newline) => {
                                return Err(SyntaxError {
                                    message: "unterminated subscript".to_string(),
                                    location: self.prev_end(),
                                })
                            }
                            _ => indices.push(self.expression(2)?),
                        }
                    }
                    let span = Span::new(expr.span().start, self.prev_end());
                    expr = Expression::Index {
                        object: Box::new(expr),
                        indices,
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expression, SyntaxError> {
        let token = self.peek().cloned();
        match token {
            Some(Token { kind: TokenKind::Identifier(name), span }) => {
                self.bump();
                Ok(Expression::Identifier { name, span })
            }
            Some(Token { kind: TokenKind::Number(raw), span }) => {
                self.bump();
                Ok(Expression::NumberLiteral { raw, span })
            }
            Some(Token { kind: TokenKind::Str(raw), span }) => {
                self.bump();
                Ok(Expression::StringLiteral { raw, span })
            }
            Some(Token { kind: TokenKind::LParen, .. }) => {
                self.bump();
                let inner = self.expression(2)?;
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
                    self.bump();
                }
                Ok(inner)
            }
            Some(Token { span, .. }) => Err(SyntaxError {
                message: "unexpected token".to_string(),
                location: span.start,
            }),
            None => Err(SyntaxError {
                message: "unexpected end of input".to_string(),
                location: self.prev_end(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source).unwrap().program
    }

    #[test]
    fn function_with_params() {
        let program = parse_ok("def f(a, b) 'exit'\n");
        match &program.body[0] {
            Statement::FunctionDeclaration { name, params, body, runtime, .. } => {
                assert_eq!(name, "f");
                assert!(!runtime);
                let params = params.as_ref().unwrap();
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].name.as_deref(), Some("a"));
                assert!(matches!(body[0], Statement::ExitStatement { .. }));
            }
            other => panic!("expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn traditional_macro_has_no_params() {
        let program = parse_ok("def setup 'mv th 1'\n");
        match &program.body[0] {
            Statement::FunctionDeclaration { params, .. } => assert!(params.is_none()),
            other => panic!("expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn constant_with_literal_initializer() {
        let program = parse_ok("const PI = 3.14\n");
        match &program.body[0] {
            Statement::VariableDeclaration { kind, declarators, .. } => {
                assert_eq!(*kind, DeclarationKind::Constant);
                assert_eq!(declarators[0].name, "PI");
                assert_eq!(
                    declarators[0].init.as_ref().unwrap().literal_text(),
                    Some("3.14")
                );
            }
            other => panic!("expected variable declaration, got {:?}", other),
        }
    }

    #[test]
    fn array_declaration() {
        let program = parse_ok("global float array image[512][512]\n");
        match &program.body[0] {
            Statement::VariableDeclaration { kind, array, data_type, declarators, .. } => {
                assert_eq!(*kind, DeclarationKind::Global);
                assert!(array);
                assert_eq!(data_type.as_deref(), Some("float"));
                assert_eq!(declarators[0].name, "image");
            }
            other => panic!("expected array declaration, got {:?}", other),
        }
    }

    #[test]
    fn command_style_macro_statement() {
        let program = parse_ok("wm th tth\n");
        match &program.body[0] {
            Statement::MacroStatement { name, arguments, .. } => {
                assert_eq!(name, "wm");
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected macro statement, got {:?}", other),
        }
    }

    #[test]
    fn nested_locals_inside_body() {
        let program = parse_ok("def scan(n) '{\n local i\n for (i = 0; i < n; i++) ct\n}'\n");
        let Statement::FunctionDeclaration { body, .. } = &program.body[0] else {
            panic!("expected function declaration");
        };
        let Statement::BlockStatement { body: inner, .. } = &body[0] else {
            panic!("expected block");
        };
        assert!(matches!(
            inner[0],
            Statement::VariableDeclaration { kind: DeclarationKind::Local, .. }
        ));
    }

    #[test]
    fn garbage_recovers_to_invalid_statement() {
        let program = parse_ok("global x\n)))\nglobal y\n");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[1], Statement::InvalidStatement { .. }));
        assert!(matches!(program.body[2], Statement::VariableDeclaration { .. }));
    }

    #[test]
    fn unterminated_body_is_a_syntax_error() {
        let err = parse("def broken 'exit\n").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn idempotent_parse() {
        let source = "const PI = 3.14\ndef f(a) 'exit'\nglobal data\n";
        assert_eq!(parse_ok(source), parse_ok(source));
    }
}
