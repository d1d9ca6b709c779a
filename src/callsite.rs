//! Call-site detection for signature help.
//!
//! Given the text of a line up to the cursor, find the innermost call whose
//! argument list is still open and how many top-level commas have been typed
//! inside it. Implemented as a single backward scan tracking parenthesis
//! depth; fully matched groups (nested calls) are skipped wholesale, so
//! `outer(inner(1,2), 3` resolves to `outer` with one comma counted.

use crate::reference::is_identifier;

/// An unfinished call at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub callee: String,
    /// Index of the argument being typed (top-level commas so far).
    pub active_parameter: u32,
}

/// Scan `line_to_cursor` backward for the innermost unfinished call.
pub fn find_call_site(line_to_cursor: &str) -> Option<CallSite> {
    let chars: Vec<char> = line_to_cursor.chars().collect();
    let mut depth = 0usize;
    let mut commas = 0u32;
    let mut in_string: Option<char> = None;
    let mut open_paren: Option<usize> = None;

    // Walk forward once to know string state at each index is overkill for a
    // single line; instead scan backward and treat quotes as toggles.
    for i in (0..chars.len()).rev() {
        let c = chars[i];
        if let Some(quote) = in_string {
            if c == quote && !(i > 0 && chars[i - 1] == '\\') {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            ')' => depth += 1,
            '(' => {
                if depth == 0 {
                    open_paren = Some(i);
                    break;
                }
                depth -= 1;
            }
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }

    let open = open_paren?;
    // The callee is the identifier run ending directly before the paren.
    let mut start = open;
    while start > 0 {
        let c = chars[start - 1];
        if c.is_ascii_alphanumeric() || c == '_' {
            start -= 1;
        } else {
            break;
        }
    }
    let callee: String = chars[start..open].iter().collect();
    if !is_identifier(&callee) {
        return None;
    }
    Some(CallSite {
        callee,
        active_parameter: commas,
    })
}

/// Split a rendered signature into parameter labels: the text between the
/// outermost parentheses, optional-argument brackets stripped, split on
/// commas.
pub fn split_parameters(signature: &str) -> Vec<String> {
    let Some(open) = signature.find('(') else {
        return Vec::new();
    };
    let Some(close) = signature.rfind(')') else {
        return Vec::new();
    };
    if close <= open + 1 {
        return Vec::new();
    }
    signature[open + 1..close]
        .replace(['[', ']'], "")
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_unfinished_call_wins() {
        let site = find_call_site("x = outer(inner(1,2), 3").unwrap();
        assert_eq!(site.callee, "outer");
        assert_eq!(site.active_parameter, 1);
    }

    #[test]
    fn open_inner_call() {
        let site = find_call_site("outer(inner(1,").unwrap();
        assert_eq!(site.callee, "inner");
        assert_eq!(site.active_parameter, 1);
    }

    #[test]
    fn no_call_no_site() {
        assert!(find_call_site("x = 1 + 2").is_none());
        assert!(find_call_site("f(1, 2)").is_none());
    }

    #[test]
    fn first_parameter_has_index_zero() {
        let site = find_call_site("substr(").unwrap();
        assert_eq!(site.callee, "substr");
        assert_eq!(site.active_parameter, 0);
    }

    #[test]
    fn commas_inside_strings_do_not_count() {
        let site = find_call_site("index(\"a,b\", ").unwrap();
        assert_eq!(site.callee, "index");
        assert_eq!(site.active_parameter, 1);
    }

    #[test]
    fn grouping_parens_without_a_name_are_not_calls() {
        assert!(find_call_site("x = (1 + ").is_none());
    }

    #[test]
    fn parameter_splitting_strips_option_brackets() {
        assert_eq!(
            split_parameters("substr(s, start[, length])"),
            vec!["s", "start", "length"]
        );
        assert_eq!(split_parameters("rand()"), Vec::<String>::new());
        assert_eq!(split_parameters("wa"), Vec::<String>::new());
    }
}
