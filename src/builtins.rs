//! Built-in and external reference databases, plus mnemonic books.
//!
//! Both databases share one JSON shape: symbol entries grouped under the
//! fixed keys `constants`, `variables`, `functions`, `macros` and `keywords`,
//! each entry matching the Reference Item shape minus `category` (the group
//! key supplies it). The built-in database ships embedded in the binary; the
//! external one is read from a user-configured path supporting
//! `${workspaceFolder}/` and `${userHome}/` prefixes.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use semver::VersionReq;
use serde::Deserialize;

use crate::reference::{
    Overload, ReferenceBook, ReferenceCategory, ReferenceItem, VersionGate,
};

const BUILTIN_DATABASE: &str = include_str!("../data/builtins.json");

/// A version gate as written in JSON: either a bare range string or an
/// object carrying a note.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawGate {
    Range(String),
    Detailed { range: String, note: Option<String> },
}

impl RawGate {
    fn parse(self) -> Option<VersionGate> {
        let (range, note) = match self {
            RawGate::Range(range) => (range, None),
            RawGate::Detailed { range, note } => (range, note),
        };
        // An unparseable range disables the gate rather than the entry.
        let range = VersionReq::parse(&range).ok()?;
        Some(VersionGate { range, note })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawOverload {
    signature: String,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawItem {
    signature: String,
    description: Option<String>,
    available: Option<RawGate>,
    deprecated: Option<RawGate>,
    snippet: Option<String>,
    #[serde(default)]
    overloads: Vec<RawOverload>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawDatabase {
    #[serde(default)]
    constants: HashMap<String, RawItem>,
    #[serde(default)]
    variables: HashMap<String, RawItem>,
    #[serde(default)]
    functions: HashMap<String, RawItem>,
    #[serde(default)]
    macros: HashMap<String, RawItem>,
    #[serde(default)]
    keywords: HashMap<String, RawItem>,
}

/// Parse one reference database document into a book.
pub fn parse_database(json: &str) -> Result<ReferenceBook, serde_json::Error> {
    let raw: RawDatabase = serde_json::from_str(json)?;
    let mut book = ReferenceBook::new();
    let groups = [
        (raw.constants, ReferenceCategory::Constant),
        (raw.variables, ReferenceCategory::Variable),
        (raw.functions, ReferenceCategory::Function),
        (raw.macros, ReferenceCategory::Macro),
        (raw.keywords, ReferenceCategory::Keyword),
    ];
    for (group, category) in groups {
        for (name, entry) in group {
            let mut item = ReferenceItem::new(entry.signature, category);
            item.description = entry.description;
            item.available = entry.available.and_then(RawGate::parse);
            item.deprecated = entry.deprecated.and_then(RawGate::parse);
            item.snippet = entry.snippet;
            item.overloads = entry
                .overloads
                .into_iter()
                .map(|o| Overload {
                    signature: o.signature,
                    description: o.description,
                })
                .collect();
            book.insert(name, item);
        }
    }
    Ok(book)
}

/// The embedded built-in database.
pub fn builtin_book() -> Result<ReferenceBook, serde_json::Error> {
    parse_database(BUILTIN_DATABASE)
}

/// Expand a configured database path. `${workspaceFolder}/` resolves against
/// the workspace root, `${userHome}/` against the home directory. A prefix
/// that cannot be resolved yields `None` (external merging stays disabled).
pub fn resolve_database_path(setting: &str, workspace_root: Option<&PathBuf>) -> Option<PathBuf> {
    if setting.is_empty() {
        return None;
    }
    if let Some(rest) = setting.strip_prefix("${workspaceFolder}/") {
        return workspace_root.map(|root| root.join(rest));
    }
    if let Some(rest) = setting.strip_prefix("${userHome}/") {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)?;
        return Some(home.join(rest));
    }
    Some(PathBuf::from(setting))
}

fn mnemonic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]{0,6}$").expect("mnemonic regex"))
}

/// Build a mnemonic book from a configured name → description map. Names
/// that fail the mnemonic shape are dropped individually.
pub fn mnemonic_book(map: &BTreeMap<String, String>) -> ReferenceBook {
    let mut book = ReferenceBook::new();
    for (name, description) in map {
        if !mnemonic_regex().is_match(name) {
            continue;
        }
        let mut item = ReferenceItem::new(name.clone(), ReferenceCategory::Enum);
        if !description.is_empty() {
            item.description = Some(description.clone());
        }
        book.insert(name.clone(), item);
    }
    book
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_database_parses() {
        let book = builtin_book().unwrap();
        assert_eq!(book["substr"].category, ReferenceCategory::Function);
        assert!(!book["substr"].overloads.is_empty());
        assert_eq!(book["ascan"].category, ReferenceCategory::Macro);
        assert_eq!(book["def"].category, ReferenceCategory::Keyword);
        // Built-ins never carry a source location.
        assert!(book.values().all(|item| item.location.is_none()));
    }

    #[test]
    fn category_comes_from_the_group_key() {
        let book = parse_database(
            r#"{"constants": {"PI": {"signature": "PI = 3.14159265"}},
                "macros": {"wa": {"signature": "wa"}}}"#,
        )
        .unwrap();
        assert_eq!(book["PI"].category, ReferenceCategory::Constant);
        assert_eq!(book["wa"].category, ReferenceCategory::Macro);
    }

    #[test]
    fn gates_parse_from_both_shapes() {
        let book = parse_database(
            r#"{"functions": {
                "newfn": {"signature": "newfn()", "available": ">=6.0.0"},
                "oldfn": {"signature": "oldfn()",
                          "deprecated": {"range": ">=6.2.0", "note": "use newfn"}}}}"#,
        )
        .unwrap();
        assert!(book["newfn"].available.is_some());
        let gate = book["oldfn"].deprecated.as_ref().unwrap();
        assert_eq!(gate.note.as_deref(), Some("use newfn"));
    }

    #[test]
    fn malformed_gate_is_dropped_not_fatal() {
        let book = parse_database(
            r#"{"functions": {"f": {"signature": "f()", "available": "not a range"}}}"#,
        )
        .unwrap();
        assert!(book["f"].available.is_none());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_database("{\"functions\": [").is_err());
    }

    #[test]
    fn path_placeholders() {
        let root = PathBuf::from("/work/beamline");
        assert_eq!(
            resolve_database_path("${workspaceFolder}/macros.json", Some(&root)),
            Some(PathBuf::from("/work/beamline/macros.json"))
        );
        assert_eq!(resolve_database_path("${workspaceFolder}/x.json", None), None);
        assert_eq!(
            resolve_database_path("/abs/path.json", None),
            Some(PathBuf::from("/abs/path.json"))
        );
        assert_eq!(resolve_database_path("", None), None);
    }

    #[test]
    fn mnemonic_names_are_validated() {
        let mut map = BTreeMap::new();
        map.insert("th".to_string(), "two-theta circle".to_string());
        map.insert("waytoolong".to_string(), "dropped".to_string());
        map.insert("9bad".to_string(), "dropped".to_string());
        let book = mnemonic_book(&map);
        assert_eq!(book.len(), 1);
        assert_eq!(book["th"].description.as_deref(), Some("two-theta circle"));
    }
}
