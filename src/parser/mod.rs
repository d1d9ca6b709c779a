//! Parser front-end: lexer, typed syntax tree and recursive descent parser.

pub mod ast;
pub mod lexer;
pub mod parse;

pub use ast::{Comment, Location, Program, Span, Statement};
pub use parse::{parse, ParseOutput, SyntaxError};
