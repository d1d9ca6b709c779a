//! Rule-gated lint passes over a parsed file.
//!
//! Each pass is a secondary traversal cross-referencing the merged store:
//! the caller supplies a `known` predicate answering "is this identifier
//! declared in any registered book". Every rule is independently togglable
//! through configuration; the passes themselves are pure.

use std::collections::HashSet;

use crate::parser::ast::{Expression, Program, Span, Statement};

/// One lint finding: the offending identifier and where it occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct LintFinding {
    pub name: String,
    pub span: Span,
}

/// Identifiers read in expression position with no declaration anywhere.
pub fn undeclared_variables(program: &Program, known: &dyn Fn(&str) -> bool) -> Vec<LintFinding> {
    let mut declared = HashSet::new();
    let mut findings = Vec::new();
    walk(&program.body, &mut declared, known, false, &mut findings);
    findings
}

/// Identifier arguments of command-style macro invocations that resolve to
/// nothing: no declaration, no mnemonic, no built-in.
pub fn undeclared_macro_arguments(
    program: &Program,
    known: &dyn Fn(&str) -> bool,
) -> Vec<LintFinding> {
    let mut declared = HashSet::new();
    let mut findings = Vec::new();
    walk(&program.body, &mut declared, known, true, &mut findings);
    findings
}

fn walk(
    statements: &[Statement],
    declared: &mut HashSet<String>,
    known: &dyn Fn(&str) -> bool,
    macro_arguments: bool,
    findings: &mut Vec<LintFinding>,
) {
    for statement in statements {
        match statement {
            Statement::FunctionDeclaration { name, params, body, .. } => {
                declared.insert(name.clone());
                let mut inner = declared.clone();
                if let Some(params) = params {
                    inner.extend(params.iter().filter_map(|p| p.name.clone()));
                }
                walk(body, &mut inner, known, macro_arguments, findings);
            }
            Statement::VariableDeclaration { declarators, .. } => {
                for decl in declarators {
                    if !macro_arguments {
                        if let Some(init) = &decl.init {
                            check_expression(init, declared, known, findings);
                        }
                    }
                    declared.insert(decl.name.clone());
                }
            }
            Statement::BlockStatement { body, .. } => {
                walk(body, declared, known, macro_arguments, findings);
            }
            Statement::IfStatement { test, consequent, alternate, .. } => {
                if !macro_arguments {
                    check_expression(test, declared, known, findings);
                }
                walk(
                    std::slice::from_ref(consequent),
                    declared,
                    known,
                    macro_arguments,
                    findings,
                );
                if let Some(alternate) = alternate {
                    walk(
                        std::slice::from_ref(alternate),
                        declared,
                        known,
                        macro_arguments,
                        findings,
                    );
                }
            }
            Statement::WhileStatement { test, body, .. } => {
                if !macro_arguments {
                    check_expression(test, declared, known, findings);
                }
                walk(std::slice::from_ref(body), declared, known, macro_arguments, findings);
            }
            Statement::ForStatement { body, .. } => {
                walk(std::slice::from_ref(body), declared, known, macro_arguments, findings);
            }
            Statement::MacroStatement { arguments, .. } => {
                if macro_arguments {
                    for argument in arguments {
                        if let Expression::Identifier { name, span } = argument {
                            if !declared.contains(name) && !known(name) {
                                findings.push(LintFinding {
                                    name: name.clone(),
                                    span: *span,
                                });
                            }
                        }
                    }
                }
            }
            Statement::ExpressionStatement { expression, .. } => {
                if !macro_arguments {
                    check_expression(expression, declared, known, findings);
                }
            }
            Statement::ExitStatement { .. }
            | Statement::QuitStatement { .. }
            | Statement::InvalidStatement { .. } => {}
        }
    }
}

fn check_expression(
    expression: &Expression,
    declared: &HashSet<String>,
    known: &dyn Fn(&str) -> bool,
    findings: &mut Vec<LintFinding>,
) {
    match expression {
        Expression::Identifier { name, span } => {
            if !declared.contains(name) && !known(name) {
                findings.push(LintFinding {
                    name: name.clone(),
                    span: *span,
                });
            }
        }
        Expression::Call { callee, arguments, .. } => {
            check_expression(callee, declared, known, findings);
            for argument in arguments {
                check_expression(argument, declared, known, findings);
            }
        }
        Expression::Index { object, indices, .. } => {
            check_expression(object, declared, known, findings);
            for index in indices {
                check_expression(index, declared, known, findings);
            }
        }
        Expression::Unary { operand, .. } => check_expression(operand, declared, known, findings),
        Expression::Binary { left, right, .. } => {
            check_expression(left, declared, known, findings);
            check_expression(right, declared, known, findings);
        }
        Expression::Assignment { target, value, .. } => {
            // Assignment targets declare-by-use in spec; only the value side
            // is checked.
            if !matches!(target.as_ref(), Expression::Identifier { .. }) {
                check_expression(target, declared, known, findings);
            }
            check_expression(value, declared, known, findings);
        }
        Expression::NumberLiteral { .. }
        | Expression::StringLiteral { .. }
        | Expression::Null { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn parse_program(source: &str) -> Program {
        parse(source).unwrap().program
    }

    #[test]
    fn undeclared_read_is_reported() {
        let program = parse_program("global x\ny = x + missing\n");
        let findings = undeclared_variables(&program, &|_| false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].name, "missing");
    }

    #[test]
    fn store_knowledge_suppresses_findings() {
        let program = parse_program("y = COUNT_TIME\n");
        let findings = undeclared_variables(&program, &|name| name == "COUNT_TIME");
        assert!(findings.is_empty());
    }

    #[test]
    fn parameters_are_in_scope_inside_their_function() {
        let program = parse_program("def f(a) '{\n x = a\n}'\n");
        let findings = undeclared_variables(&program, &|_| false);
        assert!(findings.is_empty());
    }

    #[test]
    fn parameters_leave_scope_with_the_function() {
        let program = parse_program("def f(a) 'exit'\nx = a\n");
        let findings = undeclared_variables(&program, &|_| false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].name, "a");
    }

    #[test]
    fn macro_argument_rule() {
        let program = parse_program("global th\nwm th tth\n");
        let findings = undeclared_macro_arguments(&program, &|name| name == "wm");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].name, "tth");
    }
}
