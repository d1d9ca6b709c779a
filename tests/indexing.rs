//! End-to-end tests over the indexing pipeline: source text through parser
//! and traversal into the merged store, then the query helpers on top.

use speclsp::builtins::{builtin_book, mnemonic_book};
use speclsp::callsite::{find_call_site, split_parameters};
use speclsp::parser::{parse, Location};
use speclsp::reference::{
    render_description, subsequence_matcher, ReferenceCategory, ReferenceStore, SourceKey,
    TruncationLevel,
};
use speclsp::snippets::snippet_book;
use speclsp::traverse::{traverse_locals, traverse_whole};
use tower_lsp::lsp_types::Url;

fn index_into(store: &mut ReferenceStore, key: SourceKey, source: &str) {
    let output = parse(source).expect("source should parse");
    let (book, _) = traverse_whole(&output.program, &output.comments);
    store.replace_book(key, book);
}

#[test]
fn conflicting_sources_are_all_surfaced() {
    let mut store = ReferenceStore::new();
    store.replace_book(SourceKey::Builtin, builtin_book().unwrap());

    let url = Url::parse("file:///work/local.mac").unwrap();
    index_into(
        &mut store,
        SourceKey::WorkspaceFile(url),
        "# local override of the counting macro\ndef ct(time) 'exit'\n",
    );

    // `ct` exists both as a built-in macro and a workspace function; the
    // store reports both, built-in first by key order.
    let hits = store.lookup("ct");
    assert_eq!(hits.len(), 2);
    assert_eq!(*hits[0].0, SourceKey::Builtin);
    assert_eq!(hits[0].1.category, ReferenceCategory::Macro);
    assert_eq!(hits[1].1.category, ReferenceCategory::Function);
    assert_eq!(hits[1].1.signature, "ct(time)");
    assert_eq!(
        hits[1].1.description.as_deref(),
        Some("local override of the counting macro")
    );
}

#[test]
fn replacing_a_file_book_drops_its_old_symbols() {
    let mut store = ReferenceStore::new();
    let url = Url::parse("file:///work/scan.mac").unwrap();
    index_into(
        &mut store,
        SourceKey::WorkspaceFile(url.clone()),
        "def old_scan 'exit'\n",
    );
    assert_eq!(store.lookup("old_scan").len(), 1);

    index_into(
        &mut store,
        SourceKey::WorkspaceFile(url.clone()),
        "def new_scan 'exit'\n",
    );
    assert!(store.lookup("old_scan").is_empty());
    assert_eq!(store.lookup("new_scan").len(), 1);
    assert!(store.tracks_file(&url));
}

#[test]
fn cursor_scope_complements_the_whole_file_book() {
    let source = "\
global NPTS_LOCAL
def fly(start, stop) '{
 local dwell
 ct
}'
";
    let output = parse(source).unwrap();
    let (book, _) = traverse_whole(&output.program, &output.comments);

    // Top level is the whole-file book's job.
    assert!(book.contains_key("NPTS_LOCAL"));
    assert!(book.contains_key("fly"));
    assert!(!book.contains_key("dwell"));

    // Inside the body the scope book adds parameters and nested locals but
    // not the top-level names the whole-file book already has.
    let scope = traverse_locals(&output.program, Location::new(3, 1));
    assert!(scope.contains_key("start"));
    assert!(scope.contains_key("stop"));
    assert!(scope.contains_key("dwell"));
    assert!(!scope.contains_key("NPTS_LOCAL"));

    // Outside the body the scope book is empty.
    let scope = traverse_locals(&output.program, Location::new(5, 0));
    assert!(scope.is_empty());
}

#[test]
fn snippet_and_mnemonic_books_follow_configuration() {
    let mut motors = std::collections::BTreeMap::new();
    motors.insert("th".to_string(), "theta circle".to_string());
    motors.insert("tth".to_string(), "two-theta circle".to_string());

    let motor_book = mnemonic_book(&motors);
    assert_eq!(motor_book.len(), 2);
    assert_eq!(motor_book["th"].category, ReferenceCategory::Enum);

    let names: Vec<String> = motors.keys().cloned().collect();
    let templates =
        vec!["ascan %MOT0 ${2:start} ${3:finish} ${4:intervals} ${5:time} # scan one motor".to_string()];
    let book = snippet_book(&templates, &names, &[]);
    let ascan = &book["ascan"];
    assert_eq!(ascan.signature, "ascan motor start finish intervals time");
    assert_eq!(
        ascan.snippet.as_deref(),
        Some("ascan ${1|th,tth|} ${2:start} ${3:finish} ${4:intervals} ${5:time}")
    );
}

#[test]
fn signature_help_pipeline_resolves_overloads() {
    let book = builtin_book().unwrap();
    let substr = &book["substr"];
    assert!(!substr.overloads.is_empty());

    let site = find_call_site("if (substr(name, 2").unwrap();
    assert_eq!(site.callee, "substr");
    assert_eq!(site.active_parameter, 1);

    let parameters = split_parameters(&substr.signature);
    assert!(parameters.len() >= 2);
    assert_eq!(parameters[0], "s");
}

#[test]
fn version_gates_shape_rendered_descriptions() {
    let book = builtin_book().unwrap();
    let getval = &book["getval"];
    assert!(getval.deprecated.is_some());

    let old = semver::Version::parse("6.0.0").unwrap();
    let new = semver::Version::parse("6.2.0").unwrap();
    let before = render_description(getval, TruncationLevel::Full, Some(&old)).unwrap_or_default();
    let after = render_description(getval, TruncationLevel::Full, Some(&new)).unwrap_or_default();
    assert!(!before.contains("Deprecated"));
    assert!(after.contains("Deprecated"));

    let gated = &book["array_op"];
    let too_old = semver::Version::parse("5.0.0").unwrap();
    assert!(!gated.is_available(Some(&too_old)));
    assert!(gated.is_available(Some(&new)));
    assert!(gated.is_available(None));
}

#[test]
fn workspace_symbol_matching_is_a_case_insensitive_subsequence() {
    let mut store = ReferenceStore::new();
    let url = Url::parse("file:///work/align.mac").unwrap();
    index_into(
        &mut store,
        SourceKey::WorkspaceFile(url),
        "def rough_align 'exit'\ndef fineAlign(tol) 'exit'\nglobal beam_current\n",
    );

    let matcher = subsequence_matcher("fa").unwrap();
    let matches: Vec<&str> = store
        .iter()
        .flat_map(|(_, book)| book.keys())
        .filter(|name| matcher.is_match(name))
        .map(String::as_str)
        .collect();
    assert!(matches.contains(&"fineAlign"));
    assert!(!matches.contains(&"beam_current"));
}

#[test]
fn syntax_error_keeps_no_stale_book() {
    // The traversal only ever runs on a successful parse; a failed parse
    // surfaces its error and the caller swaps in an empty book.
    let error = parse("def broken(\n").unwrap_err();
    assert!(error.message.contains("unterminated"));

    let mut store = ReferenceStore::new();
    let url = Url::parse("file:///work/broken.mac").unwrap();
    index_into(
        &mut store,
        SourceKey::OpenDocument(url.clone()),
        "def works 'exit'\n",
    );
    assert_eq!(store.lookup("works").len(), 1);

    store.replace_book(SourceKey::OpenDocument(url), Default::default());
    assert!(store.lookup("works").is_empty());
}
