//! Snippet template mini-language.
//!
//! A template is one line of the form `<body> # <description>`. The body may
//! contain:
//! - `%MOT<n>` / `%CNT<n>` — expands to tabstop `n + 1`: a choice list over
//!   the configured motor (counter) mnemonics, or a plain `motor` / `counter`
//!   text placeholder when none are configured;
//! - `${n:text}` — a regular LSP placeholder, rendered as bare `text` in the
//!   signature projection and kept live in the insert text.
//!
//! A template with no recognizable body/description split, or with a
//! malformed placeholder, is skipped individually; the rest of the set is
//! unaffected.

use std::sync::OnceLock;

use regex::Regex;

use crate::reference::{ReferenceBook, ReferenceCategory, ReferenceItem};

/// One parsed and rendered template.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSnippet {
    /// First word of the body; the completion label and book key.
    pub name: String,
    /// Placeholder-free display form, e.g. `mv motor position`.
    pub signature: String,
    pub description: String,
    /// LSP snippet-syntax insert text.
    pub insert_text: String,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(MOT|CNT)(\d+)|\$\{(\d+):([^}]*)\}").expect("placeholder regex"))
}

/// Parse and render one template line. `None` means the template is
/// malformed and must be skipped.
pub fn render_template(
    template: &str,
    motors: &[String],
    counters: &[String],
) -> Option<RenderedSnippet> {
    let (body, description) = template.split_once(" # ")?;
    let body = body.trim();
    let description = description.trim();
    if body.is_empty() || description.is_empty() {
        return None;
    }
    let name = body.split_whitespace().next()?.to_string();

    let mut signature = String::new();
    let mut insert_text = String::new();
    let mut last = 0;
    for captures in placeholder_regex().captures_iter(body) {
        let whole = captures.get(0)?;
        signature.push_str(&body[last..whole.start()]);
        insert_text.push_str(&body[last..whole.start()]);
        last = whole.end();

        if let (Some(kind), Some(index)) = (captures.get(1), captures.get(2)) {
            let index: u32 = index.as_str().parse().ok()?;
            let tabstop = index + 1;
            let (names, fallback) = if kind.as_str() == "MOT" {
                (motors, "motor")
            } else {
                (counters, "counter")
            };
            signature.push_str(fallback);
            if names.is_empty() {
                insert_text.push_str(&format!("${{{}:{}}}", tabstop, fallback));
            } else {
                // Choice names containing snippet metacharacters would break
                // the choice syntax; such a set is unusable for this template.
                if names.iter().any(|n| n.contains(['|', ',', '$'])) {
                    return None;
                }
                insert_text.push_str(&format!("${{{}|{}|}}", tabstop, names.join(",")));
            }
        } else if let (Some(index), Some(text)) = (captures.get(3), captures.get(4)) {
            signature.push_str(text.as_str());
            insert_text.push_str(&format!("${{{}:{}}}", index.as_str(), text.as_str()));
        }
    }
    signature.push_str(&body[last..]);
    insert_text.push_str(&body[last..]);

    // A stray `%MOT` without a digit never matched; treat it as malformed.
    if signature.contains("%MOT") || signature.contains("%CNT") {
        return None;
    }

    Some(RenderedSnippet {
        name,
        signature,
        description: description.to_string(),
        insert_text,
    })
}

/// Build the snippet book from a template set. Malformed entries are
/// dropped one by one; later templates override earlier ones with the same
/// leading word.
pub fn snippet_book(templates: &[String], motors: &[String], counters: &[String]) -> ReferenceBook {
    let mut book = ReferenceBook::new();
    for template in templates {
        let Some(rendered) = render_template(template, motors, counters) else {
            continue;
        };
        let mut item = ReferenceItem::new(rendered.signature, ReferenceCategory::Snippet);
        item.description = Some(rendered.description);
        item.snippet = Some(rendered.insert_text);
        book.insert(rendered.name, item);
    }
    book
}

/// Default templates merged under user overrides.
pub fn default_templates() -> Vec<String> {
    [
        "ascan %MOT0 ${2:start} ${3:finish} ${4:intervals} ${5:time} # absolute scan of one motor",
        "dscan %MOT0 ${2:start} ${3:finish} ${4:intervals} ${5:time} # relative scan of one motor",
        "mv %MOT0 ${2:position} # move a motor to an absolute position",
        "mvr %MOT0 ${2:delta} # move a motor by a relative amount",
        "ct %CNT0 ${2:time} # count on a counter for a given time",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motors() -> Vec<String> {
        vec!["th".to_string(), "tth".to_string(), "chi".to_string()]
    }

    #[test]
    fn motor_placeholder_renders_choices() {
        let snippet =
            render_template("mv %MOT0 ${2:position} # move motor", &motors(), &[]).unwrap();
        assert_eq!(snippet.name, "mv");
        assert_eq!(snippet.signature, "mv motor position");
        assert_eq!(snippet.description, "move motor");
        assert_eq!(snippet.insert_text, "mv ${1|th,tth,chi|} ${2:position}");
    }

    #[test]
    fn empty_mnemonic_set_falls_back_to_text_placeholder() {
        let snippet = render_template("mv %MOT0 ${2:position} # move motor", &[], &[]).unwrap();
        assert_eq!(snippet.insert_text, "mv ${1:motor} ${2:position}");
    }

    #[test]
    fn counter_placeholder() {
        let counters = vec!["mon".to_string(), "det".to_string()];
        let snippet = render_template("ct %CNT0 ${2:time} # count", &[], &counters).unwrap();
        assert_eq!(snippet.insert_text, "ct ${1|mon,det|} ${2:time}");
        assert_eq!(snippet.signature, "ct counter time");
    }

    #[test]
    fn missing_description_split_is_skipped() {
        assert!(render_template("mv %MOT0", &motors(), &[]).is_none());
        assert!(render_template("   #   ", &motors(), &[]).is_none());
    }

    #[test]
    fn malformed_placeholder_is_skipped() {
        assert!(render_template("mv %MOT ${2:position} # move", &motors(), &[]).is_none());
    }

    #[test]
    fn book_skips_bad_entries_individually() {
        let templates = vec![
            "mv %MOT0 ${2:position} # move motor".to_string(),
            "broken %CNT # nope".to_string(),
        ];
        let book = snippet_book(&templates, &motors(), &[]);
        assert_eq!(book.len(), 1);
        assert!(book.contains_key("mv"));
        assert_eq!(book["mv"].category, ReferenceCategory::Snippet);
        assert!(book["mv"].snippet.is_some());
    }
}
