//! Reference data model: items, books and the merged store.
//!
//! A *Reference Item* is one indexed symbol (built-in, configured or found by
//! traversing user source). A *Reference Book* maps identifiers to items for
//! one source. The *Reference Store* is the union of all books, keyed by
//! source identity. Queries iterate every book: conflicts are surfaced, not
//! resolved — two sources declaring `foo` produce two hover blocks and two
//! definition candidates.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use semver::{Version, VersionReq};
use tower_lsp::lsp_types::Url;

use crate::parser::Span;

/// Symbol classification. Exactly one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCategory {
    Constant,
    Variable,
    Array,
    Macro,
    Function,
    Keyword,
    Snippet,
    Enum,
}

impl ReferenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceCategory::Constant => "constant",
            ReferenceCategory::Variable => "variable",
            ReferenceCategory::Array => "array",
            ReferenceCategory::Macro => "macro",
            ReferenceCategory::Function => "function",
            ReferenceCategory::Keyword => "keyword",
            ReferenceCategory::Snippet => "snippet",
            ReferenceCategory::Enum => "enum",
        }
    }
}

/// A semantic-version gate with an optional explanatory note.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionGate {
    pub range: VersionReq,
    pub note: Option<String>,
}

/// An alternate call form of a function or macro.
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub signature: String,
    pub description: Option<String>,
}

/// One indexed symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceItem {
    /// Canonical printable form, e.g. `substr(s, start, length)`.
    pub signature: String,
    pub category: ReferenceCategory,
    pub description: Option<String>,
    /// Present iff the item was discovered by traversing user source.
    pub location: Option<Span>,
    /// Visible only when the configured version satisfies the range.
    pub available: Option<VersionGate>,
    /// Tagged deprecated when the configured version satisfies the range.
    pub deprecated: Option<VersionGate>,
    /// Editable insertion template in LSP snippet syntax.
    pub snippet: Option<String>,
    /// Only populated for function/macro items with multiple call forms.
    pub overloads: Vec<Overload>,
}

impl ReferenceItem {
    pub fn new(signature: impl Into<String>, category: ReferenceCategory) -> Self {
        ReferenceItem {
            signature: signature.into(),
            category,
            description: None,
            location: None,
            available: None,
            deprecated: None,
            snippet: None,
            overloads: Vec::new(),
        }
    }

    /// The portion of the signature after the identifier, used as the
    /// completion `detail` (e.g. `(s, start, length)` or ` = 3.14`).
    pub fn signature_tail(&self, name: &str) -> Option<&str> {
        let tail = self.signature.strip_prefix(name)?;
        if tail.is_empty() {
            None
        } else {
            Some(tail)
        }
    }

    /// False when an `available` range excludes `version`.
    pub fn is_available(&self, version: Option<&Version>) -> bool {
        match (&self.available, version) {
            (Some(gate), Some(version)) => gate.range.matches(version),
            _ => true,
        }
    }

    /// The deprecation gate, when it applies to `version`.
    pub fn deprecation(&self, version: Option<&Version>) -> Option<&VersionGate> {
        match (&self.deprecated, version) {
            (Some(gate), Some(version)) if gate.range.matches(version) => Some(gate),
            _ => None,
        }
    }
}

/// identifier → item table for one source. Last write wins.
pub type ReferenceBook = HashMap<String, ReferenceItem>;

/// Identity of one contributing source. Ordering fixes query output order;
/// it implies no precedence between sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKey {
    Builtin,
    External,
    MotorMnemonic,
    CounterMnemonic,
    Snippet,
    WorkspaceFile(Url),
    OpenDocument(Url),
    /// Volatile cursor-scope book, recomputed per query and never persisted.
    ActiveScope,
}

impl SourceKey {
    /// Human-readable origin for hover headers and completion labels.
    pub fn origin_label(&self, current: Option<&Url>) -> String {
        match self {
            SourceKey::Builtin => "built-in".to_string(),
            SourceKey::External => "external".to_string(),
            SourceKey::MotorMnemonic => "motor mnemonic".to_string(),
            SourceKey::CounterMnemonic => "counter mnemonic".to_string(),
            SourceKey::Snippet => "snippet".to_string(),
            SourceKey::ActiveScope => "local".to_string(),
            SourceKey::WorkspaceFile(url) | SourceKey::OpenDocument(url) => {
                if current == Some(url) {
                    "this file".to_string()
                } else {
                    url.path().rsplit('/').next().unwrap_or("file").to_string()
                }
            }
        }
    }

    /// The uri for file-backed sources.
    pub fn url(&self) -> Option<&Url> {
        match self {
            SourceKey::WorkspaceFile(url) | SourceKey::OpenDocument(url) => Some(url),
            _ => None,
        }
    }
}

/// The merged store. All mutation funnels through [`ReferenceStore::replace_book`]
/// so a book is always swapped atomically, never edited in place.
#[derive(Debug, Default)]
pub struct ReferenceStore {
    books: BTreeMap<SourceKey, ReferenceBook>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or create) the book for `key`. The previous book is dropped
    /// wholesale; a query racing this call sees either the old book or the
    /// new one, never a half-built mixture.
    pub fn replace_book(&mut self, key: SourceKey, book: ReferenceBook) {
        self.books.insert(key, book);
    }

    pub fn remove_book(&mut self, key: &SourceKey) {
        self.books.remove(key);
    }

    pub fn book(&self, key: &SourceKey) -> Option<&ReferenceBook> {
        self.books.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &ReferenceBook)> {
        self.books.iter()
    }

    /// All items named `name`, one per contributing source.
    pub fn lookup(&self, name: &str) -> Vec<(&SourceKey, &ReferenceItem)> {
        self.books
            .iter()
            .filter_map(|(key, book)| book.get(name).map(|item| (key, item)))
            .collect()
    }

    /// True when any file-backed source with this url is registered.
    pub fn tracks_file(&self, url: &Url) -> bool {
        self.books
            .keys()
            .any(|key| matches!(key, SourceKey::WorkspaceFile(u) if u == url))
    }
}

/// How much of a description a query surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationLevel {
    #[default]
    Full,
    /// Cut at the first blank line.
    Paragraph,
    /// Cut at the end of the first sentence.
    Sentence,
}

impl TruncationLevel {
    pub fn from_config(value: &str) -> Self {
        match value {
            "paragraph" => TruncationLevel::Paragraph,
            "sentence" => TruncationLevel::Sentence,
            _ => TruncationLevel::Full,
        }
    }

    pub fn apply(&self, description: &str) -> String {
        match self {
            TruncationLevel::Full => description.to_string(),
            TruncationLevel::Paragraph => match description.find("\n\n") {
                Some(cut) => format!("{} …", &description[..cut]),
                None => description.to_string(),
            },
            TruncationLevel::Sentence => match description.find(". ") {
                Some(cut) => format!("{} ...", &description[..cut + 1]),
                None => description.to_string(),
            },
        }
    }
}

/// Render an item's description for one query surface: truncate, then append
/// availability and deprecation notices. Notices are suppressed at sentence
/// level.
pub fn render_description(
    item: &ReferenceItem,
    level: TruncationLevel,
    version: Option<&Version>,
) -> Option<String> {
    let mut text = item.description.as_deref().map(|d| level.apply(d));
    if level == TruncationLevel::Sentence {
        return text;
    }
    if let Some(gate) = &item.available {
        let notice = match &gate.note {
            Some(note) => format!("_Available: `{}`. {}_", gate.range, note),
            None => format!("_Available: `{}`_", gate.range),
        };
        text = Some(match text {
            Some(t) => format!("{}\n\n{}", t, notice),
            None => notice,
        });
    }
    if let Some(gate) = item.deprecation(version) {
        let notice = match &gate.note {
            Some(note) => format!("_Deprecated: `{}`. {}_", gate.range, note),
            None => format!("_Deprecated: `{}`_", gate.range),
        };
        text = Some(match text {
            Some(t) => format!("{}\n\n{}", t, notice),
            None => notice,
        });
    }
    text
}

/// Strict identifier check used by every point query before consulting books.
pub fn is_identifier(word: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex"))
        .is_match(word)
}

/// Build the case-insensitive subsequence matcher for workspace symbol
/// queries: `fb` matches `fooBar`. Returns `None` when the query contains a
/// character outside `[a-zA-Z0-9_]`.
pub fn subsequence_matcher(query: &str) -> Option<Regex> {
    if query.is_empty() || !query.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let mut pattern = String::from("(?i)");
    for c in query.chars() {
        pattern.push_str(".*");
        pattern.push(c);
    }
    Regex::new(&pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(signature: &str, category: ReferenceCategory) -> ReferenceItem {
        ReferenceItem::new(signature, category)
    }

    #[test]
    fn lookup_surfaces_every_source() {
        let mut store = ReferenceStore::new();
        let mut builtin = ReferenceBook::new();
        builtin.insert("foo".to_string(), item("foo(a)", ReferenceCategory::Function));
        let mut external = ReferenceBook::new();
        external.insert("foo".to_string(), item("foo(x, y)", ReferenceCategory::Function));
        store.replace_book(SourceKey::Builtin, builtin);
        store.replace_book(SourceKey::External, external);

        let hits = store.lookup("foo");
        assert_eq!(hits.len(), 2);
        assert_eq!(*hits[0].0, SourceKey::Builtin);
        assert_eq!(*hits[1].0, SourceKey::External);
    }

    #[test]
    fn replace_book_swaps_wholesale() {
        let mut store = ReferenceStore::new();
        let mut first = ReferenceBook::new();
        first.insert("a".to_string(), item("a", ReferenceCategory::Macro));
        store.replace_book(SourceKey::Builtin, first);

        let mut second = ReferenceBook::new();
        second.insert("b".to_string(), item("b", ReferenceCategory::Macro));
        store.replace_book(SourceKey::Builtin, second);

        assert!(store.lookup("a").is_empty());
        assert_eq!(store.lookup("b").len(), 1);
    }

    #[test]
    fn availability_gating() {
        let mut it = item("newfn()", ReferenceCategory::Function);
        it.available = Some(VersionGate {
            range: VersionReq::parse(">=6.0.0").unwrap(),
            note: None,
        });
        let old = Version::parse("5.9.0").unwrap();
        let new = Version::parse("6.0.0").unwrap();
        assert!(!it.is_available(Some(&old)));
        assert!(it.is_available(Some(&new)));
        assert!(it.is_available(None));
    }

    #[test]
    fn deprecation_applies_only_in_range() {
        let mut it = item("oldfn()", ReferenceCategory::Function);
        it.deprecated = Some(VersionGate {
            range: VersionReq::parse(">=6.0.0").unwrap(),
            note: Some("use newfn".to_string()),
        });
        let old = Version::parse("5.0.0").unwrap();
        let new = Version::parse("6.1.0").unwrap();
        assert!(it.deprecation(Some(&old)).is_none());
        assert!(it.deprecation(Some(&new)).is_some());
    }

    #[test]
    fn sentence_truncation() {
        assert_eq!(
            TruncationLevel::Sentence.apply("Does X. Does Y."),
            "Does X. ..."
        );
    }

    #[test]
    fn paragraph_truncation() {
        assert_eq!(
            TruncationLevel::Paragraph.apply("First paragraph.\n\nSecond."),
            "First paragraph. …"
        );
    }

    #[test]
    fn sentence_level_drops_notices() {
        let mut it = item("f()", ReferenceCategory::Function);
        it.description = Some("Does X. Does Y.".to_string());
        it.deprecated = Some(VersionGate {
            range: VersionReq::parse(">=1.0.0").unwrap(),
            note: None,
        });
        let v = Version::parse("2.0.0").unwrap();
        let rendered = render_description(&it, TruncationLevel::Sentence, Some(&v)).unwrap();
        assert_eq!(rendered, "Does X. ...");
        let full = render_description(&it, TruncationLevel::Full, Some(&v)).unwrap();
        assert!(full.contains("Deprecated"));
    }

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("foo_bar1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn subsequence_matching() {
        let re = subsequence_matcher("fb").unwrap();
        assert!(re.is_match("fooBar"));
        assert!(!re.is_match("bar"));
        assert!(subsequence_matcher("a.b").is_none());
    }

    #[test]
    fn signature_tail() {
        let it = item("substr(s, start, length)", ReferenceCategory::Function);
        assert_eq!(it.signature_tail("substr"), Some("(s, start, length)"));
        let bare = item("setup", ReferenceCategory::Macro);
        assert_eq!(bare.signature_tail("setup"), None);
    }
}
