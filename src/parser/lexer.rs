//! Lexical analysis for the spec macro language.
//!
//! The lexer is hand-written rather than table-driven because spec is
//! line-sensitive: statements end at newlines, `#` comments run to the end
//! of the line, and macro bodies are single-quoted regions that themselves
//! contain statements. Comments are not tokens; they are collected on the
//! side so a later pass can attach them to declarations as documentation.

use super::ast::{Comment, Location, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    Number(String),
    /// Double-quoted string literal, quotes included in the raw text.
    Str(String),
    /// A `'` macro body delimiter. The lexer cannot tell open from close;
    /// the parser tracks body depth and treats each one as a toggle.
    BodyOpen,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    /// Statement-terminating newline.
    Newline,
    /// Operator or punctuation not covered above (`=`, `==`, `+`, …).
    Op(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Raised for input the lexer cannot tokenize at all (an unterminated
/// double-quoted string). Everything else degrades to `Op` tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub location: Location,
}

const OPERATOR_CHARS: &str = "=+-*/%<>!&|^~?:.@$";

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
}

/// Tokenize `source`, returning the token stream and every `#` comment seen.
pub fn tokenize(source: &str) -> Result<(Vec<Token>, Vec<Comment>), LexError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 0,
        column: 0,
        tokens: Vec::new(),
        comments: Vec::new(),
    };
    lexer.run()?;
    Ok((lexer.tokens, lexer.comments))
}

impl Lexer {
    fn loc(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: Location) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.loc()),
        });
    }

    fn run(&mut self) -> Result<(), LexError> {
        while let Some(c) = self.peek() {
            let start = self.loc();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\\' if self.peek2() == Some('\n') => {
                    // Line continuation: no Newline token is emitted.
                    self.bump();
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    // Collapse runs of blank lines into single terminators.
                    if !matches!(
                        self.tokens.last().map(|t| &t.kind),
                        Some(TokenKind::Newline) | None
                    ) {
                        self.push(TokenKind::Newline, start);
                    }
                }
                '#' => self.comment(start),
                '"' => self.string(start)?,
                '\'' => {
                    self.bump();
                    self.push(TokenKind::BodyOpen, start);
                }
                '(' => {
                    self.bump();
                    self.push(TokenKind::LParen, start);
                }
                ')' => {
                    self.bump();
                    self.push(TokenKind::RParen, start);
                }
                '{' => {
                    self.bump();
                    self.push(TokenKind::LBrace, start);
                }
                '}' => {
                    self.bump();
                    self.push(TokenKind::RBrace, start);
                }
                '[' => {
                    self.bump();
                    self.push(TokenKind::LBracket, start);
                }
                ']' => {
                    self.bump();
                    self.push(TokenKind::RBracket, start);
                }
                ',' => {
                    self.bump();
                    self.push(TokenKind::Comma, start);
                }
                ';' => {
                    self.bump();
                    self.push(TokenKind::Semicolon, start);
                }
                c if c.is_ascii_digit() => self.number(start),
                '.' if self.peek2().map_or(false, |c| c.is_ascii_digit()) => self.number(start),
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier(start),
                c if OPERATOR_CHARS.contains(c) => self.operator(start),
                _ => {
                    // Unknown byte: keep going, surface it as an operator so
                    // the parser can fold it into an InvalidStatement.
                    self.bump();
                    self.push(TokenKind::Op(c.to_string()), start);
                }
            }
        }
        Ok(())
    }

    fn comment(&mut self, start: Location) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.bump();
        }
        self.comments.push(Comment {
            text,
            span: Span::new(start, self.loc()),
        });
    }

    fn string(&mut self, start: Location) -> Result<(), LexError> {
        let mut raw = String::new();
        raw.push(self.bump().unwrap_or('"'));
        loop {
            match self.peek() {
                Some('\\') => {
                    raw.push(self.bump().unwrap_or('\\'));
                    if let Some(c) = self.bump() {
                        raw.push(c);
                    }
                }
                Some('"') => {
                    raw.push(self.bump().unwrap_or('"'));
                    break;
                }
                Some('\n') | None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        location: start,
                    });
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(raw), start);
        Ok(())
    }

    fn number(&mut self, start: Location) {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '.' {
                raw.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::Number(raw), start);
    }

    fn identifier(&mut self, start: Location) {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::Identifier(name), start);
    }

    fn operator(&mut self, start: Location) {
        // Greedily match multi-character operators first.
        const TWO: &[&str] = &[
            "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "+=", "-=", "*=", "/=", "%=", "++",
            "--",
        ];
        let c = self.bump().unwrap_or(' ');
        if let Some(next) = self.peek() {
            let pair: String = [c, next].iter().collect();
            if TWO.contains(&pair.as_str()) {
                self.bump();
                self.push(TokenKind::Op(pair), start);
                return;
            }
        }
        self.push(TokenKind::Op(c.to_string()), start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn comments_are_collected_not_tokenized() {
        let (tokens, comments) = tokenize("# leading note\nglobal x\n").unwrap();
        assert!(tokens.iter().all(|t| !matches!(t.kind, TokenKind::Op(_))));
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "# leading note");
        assert_eq!(comments[0].span.start.line, 0);
    }

    #[test]
    fn body_quotes_and_parens() {
        let k = kinds("def f(a) 'exit'");
        assert!(k.contains(&TokenKind::BodyOpen));
        assert!(k.contains(&TokenKind::LParen));
        assert_eq!(
            k.iter()
                .filter(|k| matches!(k, TokenKind::BodyOpen))
                .count(),
            2
        );
    }

    #[test]
    fn line_continuation_suppresses_newline() {
        let k = kinds("global a \\\n b\n");
        let newlines = k.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("x = \"abc\n").is_err());
    }

    #[test]
    fn positions_are_zero_based() {
        let (tokens, _) = tokenize("ab cd").unwrap();
        assert_eq!(tokens[1].span.start, Location::new(0, 3));
        assert_eq!(tokens[1].span.end, Location::new(0, 5));
    }
}
