//! Tree traversal and indexing.
//!
//! Three entry points over one classification core:
//! - [`traverse_whole`] — index a whole file: top-level declarations fill the
//!   Reference Book, every declaration (plus `MARK:`/`TODO:`/`FIXME:`
//!   comments) feeds the outline.
//! - [`traverse_locals`] — the symbols visible at one cursor position,
//!   excluding top-level declarations (the whole-file book supplies those).
//! - [`collect_all_declarations`] — every declaration regardless of nesting.
//!
//! Traversal descends only into statement and declaration children;
//! expression interiors carry no declarations. `InvalidStatement`,
//! `ExitStatement` and `QuitStatement` have no traversable children.

use std::sync::OnceLock;

use regex::Regex;

use crate::parser::ast::{Comment, DeclarationKind, Location, Program, Span, Statement};
use crate::reference::{ReferenceBook, ReferenceCategory, ReferenceItem};

/// Outline node classification, mapped to LSP `SymbolKind` by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    Function,
    Macro,
    Constant,
    Variable,
    Array,
    /// Lightweight entry from a `MARK:`/`TODO:`/`FIXME:` comment.
    Mark,
}

/// One outline entry, nested by range containment.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineSymbol {
    pub name: String,
    pub detail: Option<String>,
    pub kind: OutlineKind,
    pub range: Span,
    pub selection: Span,
    pub children: Vec<OutlineSymbol>,
}

/// Index one parsed file.
pub fn traverse_whole(
    program: &Program,
    comments: &[Comment],
) -> (ReferenceBook, Vec<OutlineSymbol>) {
    let mut book = ReferenceBook::new();
    let mut flat: Vec<OutlineSymbol> = Vec::new();

    let top: Vec<&Statement> = program.body.iter().collect();
    walk_whole(&top, true, comments, &mut book, &mut flat);

    for comment in comments {
        if let Some(entry) = mark_entry(comment) {
            flat.push(entry);
        }
    }
    flat.sort_by_key(|s| (s.range.start, s.selection.start));

    (book, nest_by_containment(flat))
}

/// The symbols in scope at `position`: enclosing functions' formal parameters
/// and declarations already seen on the way down, nested ones only. Top-level
/// declarations are deliberately not re-registered here.
pub fn traverse_locals(program: &Program, position: Location) -> ReferenceBook {
    let mut book = ReferenceBook::new();
    let top: Vec<&Statement> = program.body.iter().collect();
    walk_positional(&top, true, Some(position), &mut book);
    book
}

/// Every declaration in the file, nested or not. Last write wins on
/// duplicate names, matching book semantics.
pub fn collect_all_declarations(program: &Program) -> ReferenceBook {
    let mut book = ReferenceBook::new();
    let top: Vec<&Statement> = program.body.iter().collect();
    walk_positional(&top, true, None, &mut book);
    book
}

// === classification core ===

/// Build (name, item) pairs for one declaration statement.
fn classify(statement: &Statement, description: Option<&str>) -> Vec<(String, ReferenceItem)> {
    match statement {
        Statement::FunctionDeclaration { name, params, span, .. } => {
            let (category, signature) = match params {
                Some(params) => {
                    let rendered: Vec<&str> = params
                        .iter()
                        .map(|p| p.name.as_deref().unwrap_or(""))
                        .collect();
                    (
                        ReferenceCategory::Function,
                        format!("{}({})", name, rendered.join(", ")),
                    )
                }
                // A traditional macro has no formal parameter list at all.
                None => (ReferenceCategory::Macro, name.clone()),
            };
            let mut item = ReferenceItem::new(signature, category);
            item.location = Some(*span);
            item.description = description.map(str::to_string);
            vec![(name.clone(), item)]
        }
        Statement::VariableDeclaration { kind, array, declarators, span, .. } => {
            let category = if *kind == DeclarationKind::Constant {
                ReferenceCategory::Constant
            } else if *array {
                ReferenceCategory::Array
            } else {
                ReferenceCategory::Variable
            };
            declarators
                .iter()
                .map(|decl| {
                    let signature = match decl.init.as_ref().and_then(|e| e.literal_text()) {
                        Some(literal) => format!("{} = {}", decl.name, literal),
                        None => decl.name.clone(),
                    };
                    let mut item = ReferenceItem::new(signature, category);
                    item.location = Some(*span);
                    item.description = description.map(str::to_string);
                    (decl.name.clone(), item)
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn outline_kind(statement: &Statement) -> Option<(OutlineKind, String, Span)> {
    match statement {
        Statement::FunctionDeclaration { name, params, name_span, .. } => {
            let kind = if params.is_some() {
                OutlineKind::Function
            } else {
                OutlineKind::Macro
            };
            Some((kind, name.clone(), *name_span))
        }
        Statement::VariableDeclaration { .. } => None,
        _ => None,
    }
}

/// Statement children per the traversal key table.
fn children(statement: &Statement) -> Vec<&Statement> {
    match statement {
        Statement::FunctionDeclaration { body, .. } | Statement::BlockStatement { body, .. } => {
            body.iter().collect()
        }
        Statement::IfStatement { consequent, alternate, .. } => {
            let mut out = vec![consequent.as_ref()];
            if let Some(alt) = alternate {
                out.push(alt.as_ref());
            }
            out
        }
        Statement::WhileStatement { body, .. } | Statement::ForStatement { body, .. } => {
            vec![body.as_ref()]
        }
        // MacroStatement traversal extends into its arguments, but arguments
        // are expressions and so contribute no declarations.
        Statement::VariableDeclaration { .. }
        | Statement::MacroStatement { .. }
        | Statement::ExpressionStatement { .. }
        | Statement::ExitStatement { .. }
        | Statement::QuitStatement { .. }
        | Statement::InvalidStatement { .. } => Vec::new(),
    }
}

// === whole-file walk ===

fn walk_whole(
    statements: &[&Statement],
    top_level: bool,
    comments: &[Comment],
    book: &mut ReferenceBook,
    flat: &mut Vec<OutlineSymbol>,
) {
    for &statement in statements {
        let description = leading_comment(comments, statement.span().start);
        let entries = classify(statement, description.as_deref());
        if top_level {
            for (name, item) in &entries {
                book.insert(name.clone(), item.clone());
            }
        }

        if let Some((kind, name, selection)) = outline_kind(statement) {
            let detail = entries
                .first()
                .and_then(|(n, item)| item.signature_tail(n).map(str::to_string));
            flat.push(OutlineSymbol {
                name,
                detail,
                kind,
                range: statement.span(),
                selection,
                children: Vec::new(),
            });
        } else if let Statement::VariableDeclaration { kind, array, declarators, .. } = statement {
            let outline = if *kind == DeclarationKind::Constant {
                OutlineKind::Constant
            } else if *array {
                OutlineKind::Array
            } else {
                OutlineKind::Variable
            };
            for decl in declarators {
                flat.push(OutlineSymbol {
                    name: decl.name.clone(),
                    detail: None,
                    kind: outline,
                    range: statement.span(),
                    selection: decl.span,
                    children: Vec::new(),
                });
            }
        }

        walk_whole(&children(statement), false, comments, book, flat);
    }
}

/// The last comment ending on the line directly above `start`.
fn leading_comment(comments: &[Comment], start: Location) -> Option<String> {
    if start.line == 0 {
        return None;
    }
    comments
        .iter()
        .filter(|c| c.span.end.line + 1 == start.line)
        .last()
        .map(|c| c.text.trim_start_matches('#').trim().to_string())
}

// === positional walk ===

/// Returns `false` once the ordering-dependent early exit fires: nothing at
/// or beyond a node starting after the cursor can be in scope.
fn walk_positional(
    statements: &[&Statement],
    top_level: bool,
    position: Option<Location>,
    book: &mut ReferenceBook,
) -> bool {
    for &statement in statements {
        if let Some(cursor) = position {
            if statement.span().start > cursor {
                return false;
            }
            // An already-closed block scopes nothing at the cursor.
            if let Statement::BlockStatement { span, .. } = statement {
                if span.end < cursor {
                    continue;
                }
            }
            if let Statement::FunctionDeclaration { params, span, .. } = statement {
                if span.contains(cursor) {
                    if let Some(params) = params {
                        for param in params.iter().filter_map(|p| p.name.as_deref()) {
                            let mut item =
                                ReferenceItem::new(param, ReferenceCategory::Variable);
                            item.location = Some(*span);
                            book.insert(param.to_string(), item);
                        }
                    }
                }
            }
        }

        // With a position, top-level declarations are supplied by the
        // whole-file book; re-registering them here is deliberately avoided.
        if position.is_none() || !top_level {
            for (name, item) in classify(statement, None) {
                book.insert(name, item);
            }
        }

        if !walk_positional(&children(statement), false, position, book) {
            return false;
        }
    }
    true
}

// === outline helpers ===

fn mark_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(MARK|TODO|FIXME):\s+(\S.*)$").expect("mark regex"))
}

fn mark_entry(comment: &Comment) -> Option<OutlineSymbol> {
    let body = comment.text.trim_start_matches('#');
    let captures = mark_regex().captures(body)?;
    // The `--` detail separator is split off after the match; the regex
    // crate supports no look-around.
    let remainder = captures.get(2)?.as_str();
    let (name, detail) = match remainder.split_once("--") {
        Some((name, detail)) => (name.trim(), Some(detail.trim())),
        None => (remainder.trim(), None),
    };
    if name.is_empty() {
        return None;
    }
    let name = name.to_string();
    let detail = detail.filter(|d| !d.is_empty()).map(str::to_string);
    Some(OutlineSymbol {
        name,
        detail,
        kind: OutlineKind::Mark,
        range: comment.span,
        selection: comment.span,
        children: Vec::new(),
    })
}

/// Nest a source-ordered flat list: each symbol goes under the last-pushed
/// symbol whose range contains it.
fn nest_by_containment(flat: Vec<OutlineSymbol>) -> Vec<OutlineSymbol> {
    let mut roots: Vec<OutlineSymbol> = Vec::new();
    let mut stack: Vec<OutlineSymbol> = Vec::new();

    fn close_into(roots: &mut Vec<OutlineSymbol>, stack: &mut Vec<OutlineSymbol>) {
        if let Some(done) = stack.pop() {
            match stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => roots.push(done),
            }
        }
    }

    for symbol in flat {
        while let Some(top) = stack.last() {
            if top.range.encloses(symbol.range) && top.range != symbol.range {
                break;
            }
            close_into(&mut roots, &mut stack);
        }
        stack.push(symbol);
    }
    while !stack.is_empty() {
        close_into(&mut roots, &mut stack);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn index(source: &str) -> (ReferenceBook, Vec<OutlineSymbol>) {
        let output = parse(source).unwrap();
        traverse_whole(&output.program, &output.comments)
    }

    #[test]
    fn function_and_macro_classification() {
        let (book, _) = index("def f(a, b) 'exit'\ndef g 'exit'\n");
        let f = &book["f"];
        assert_eq!(f.category, ReferenceCategory::Function);
        assert_eq!(f.signature, "f(a, b)");
        let g = &book["g"];
        assert_eq!(g.category, ReferenceCategory::Macro);
        assert_eq!(g.signature, "g");
    }

    #[test]
    fn constant_signature_includes_literal() {
        let (book, _) = index("const PI = 3.14\n");
        let pi = &book["PI"];
        assert_eq!(pi.category, ReferenceCategory::Constant);
        assert_eq!(pi.signature, "PI = 3.14");
        assert!(pi.location.is_some());
    }

    #[test]
    fn variable_and_array_categories() {
        let (book, _) = index("global counts\nglobal float array image[64]\n");
        assert_eq!(book["counts"].category, ReferenceCategory::Variable);
        assert_eq!(book["image"].category, ReferenceCategory::Array);
    }

    #[test]
    fn nested_declarations_stay_out_of_the_book() {
        let (book, outline) = index("def f(a) '{\n local depth\n}'\n");
        assert!(book.contains_key("f"));
        assert!(!book.contains_key("depth"));
        // ... but the outline sees them.
        let f = outline.iter().find(|s| s.name == "f").unwrap();
        fn find(symbols: &[OutlineSymbol], name: &str) -> bool {
            symbols
                .iter()
                .any(|s| s.name == name || find(&s.children, name))
        }
        assert!(find(std::slice::from_ref(f), "depth"));
    }

    #[test]
    fn leading_comment_becomes_description() {
        let source = "# first note\n# move all motors home\ndef home 'exit'\n";
        let (book, _) = index(source);
        assert_eq!(book["home"].description.as_deref(), Some("move all motors home"));
    }

    #[test]
    fn detached_comment_is_ignored() {
        let source = "# far away\n\n\ndef home 'exit'\n";
        let (book, _) = index(source);
        assert!(book["home"].description.is_none());
    }

    #[test]
    fn mark_comments_join_the_outline() {
        let source = "# MARK: Alignment section -- rough alignment\ndef align 'exit'\n";
        let (_, outline) = index(source);
        let mark = outline.iter().find(|s| s.kind == OutlineKind::Mark).unwrap();
        assert_eq!(mark.name, "Alignment section");
        assert_eq!(mark.detail.as_deref(), Some("rough alignment"));
    }

    #[test]
    fn non_mark_comment_is_not_an_outline_entry() {
        let (_, outline) = index("# just words\ndef f 'exit'\n");
        assert!(outline.iter().all(|s| s.kind != OutlineKind::Mark));
    }

    #[test]
    fn mark_comment_without_detail() {
        let (_, outline) = index("# TODO: revisit dwell time\ndef f 'exit'\n");
        let mark = outline.iter().find(|s| s.kind == OutlineKind::Mark).unwrap();
        assert_eq!(mark.name, "revisit dwell time");
        assert!(mark.detail.is_none());

        // A trailing separator with nothing behind it yields no detail either.
        let (_, outline) = index("# FIXME: beam drift --\ndef f 'exit'\n");
        let mark = outline.iter().find(|s| s.kind == OutlineKind::Mark).unwrap();
        assert_eq!(mark.name, "beam drift");
        assert!(mark.detail.is_none());
    }

    #[test]
    fn idempotent_indexing() {
        let source = "const E = 2.718\ndef f(x) 'exit'\nglobal data\n";
        assert_eq!(index(source).0, index(source).0);
    }

    #[test]
    fn locals_include_parameters_inside_function() {
        let source = "def scan(start, stop) '{\n ct\n}'\n";
        let output = parse(source).unwrap();
        // Cursor on the `ct` line, inside the body.
        let inside = Location::new(1, 2);
        let book = traverse_locals(&output.program, inside);
        assert_eq!(book["start"].category, ReferenceCategory::Variable);
        assert_eq!(book["start"].signature, "start");

        // Outside the function the parameter disappears.
        let outside = Location::new(3, 0);
        let book = traverse_locals(&output.program, outside);
        assert!(!book.contains_key("start"));
    }

    #[test]
    fn locals_exclude_top_level_declarations() {
        let source = "global top\ndef f(a) '{\n local inner\n ct\n}'\n";
        let output = parse(source).unwrap();
        let book = traverse_locals(&output.program, Location::new(3, 1));
        assert!(!book.contains_key("top"), "top-level comes from the whole-file book");
        assert!(book.contains_key("inner"));
        assert!(book.contains_key("a"));
    }

    #[test]
    fn locals_stop_at_cursor() {
        let source = "def f(a) '{\n local before\n ct\n local after\n}'\n";
        let output = parse(source).unwrap();
        let book = traverse_locals(&output.program, Location::new(2, 1));
        assert!(book.contains_key("before"));
        assert!(!book.contains_key("after"));
    }

    #[test]
    fn declarations_inside_control_flow_are_collected() {
        let source = "\
def f(a) '{
 if (a) {
  local hit
 }
 while (a) {
  local loop_var
 }
}'
";
        let output = parse(source).unwrap();
        let book = collect_all_declarations(&output.program);
        assert!(book.contains_key("hit"));
        assert!(book.contains_key("loop_var"));
    }

    #[test]
    fn collect_all_includes_nested() {
        let source = "global top\ndef f(a) '{\n local inner\n}'\n";
        let output = parse(source).unwrap();
        let book = collect_all_declarations(&output.program);
        assert!(book.contains_key("top"));
        assert!(book.contains_key("f"));
        assert!(book.contains_key("inner"));
    }
}
