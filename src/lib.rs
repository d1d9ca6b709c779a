//! Host-independent core of the spec language server.
//!
//! Everything in this library works on plain strings, parse trees and the
//! reference store; the LSP wiring lives in the binary. The pipeline runs
//! one way for indexing (source text → syntax tree → Reference Book →
//! merged store) and one way for queries (cursor position + merged store →
//! symbol and overload lists).

pub mod builtins;
pub mod callsite;
pub mod lints;
pub mod parser;
pub mod reference;
pub mod snippets;
pub mod traverse;
