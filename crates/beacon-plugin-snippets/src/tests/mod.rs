//! Unit tests for snippet matching and the plugin's wire behaviour.

use std::cell::RefCell;
use std::fs;
use std::io::Cursor;

use beacon_plugins::protocol::{
    HostMessage, PluginMetadata, ProtocolError, UnitMessage, read_message,
};
use beacon_plugins::sdk::{Plugin, PluginContext, PluginResult, serve};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{SnippetError, SnippetStore, SnippetsPlugin, TRIGGER};

#[fixture]
fn store() -> SnippetStore {
    let mut store = SnippetStore::default();
    store.insert("sig", "Regards, Sam");
    store.insert("signature-long", "Kind regards,\nSam");
    store.insert("design", "see the design doc");
    store
}

fn names<'a>(found: &[(&'a str, &'a str, f64)]) -> Vec<&'a str> {
    found.iter().map(|(name, _, _)| *name).collect()
}

#[rstest]
#[case::exact_then_prefix_then_substring("sig", &["sig", "signature-long", "design"])]
#[case::case_insensitive("SIGN", &["signature-long", "design"])]
#[case::no_match("zzz", &[])]
#[case::empty_lists_all("", &["design", "sig", "signature-long"])]
fn matching_ranks_names(store: SnippetStore, #[case] query: &str, #[case] expected: &[&str]) {
    assert_eq!(names(&store.matches(query)), expected);
}

#[test]
fn builtins_are_available() {
    let store = SnippetStore::builtin();
    assert!(!store.is_empty());
    let found = store.matches("shrug");
    assert_eq!(found.first().map(|(_, text, _)| *text), Some(r"¯\_(ツ)_/¯"));
}

#[rstest]
fn files_merge_over_builtins() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("snippets.json");
    fs::write(&path, r#"{"arrow": "=>", "addr": "1 Main St"}"#).expect("write snippets");

    let mut store = SnippetStore::builtin();
    let before = store.len();
    store.merge_file(&path).expect("merge");

    assert_eq!(store.len(), before + 1);
    assert_eq!(store.matches("arrow").first().map(|(_, text, _)| *text), Some("=>"));
}

#[rstest]
#[case::missing(None)]
#[case::not_an_object(Some("[1, 2]"))]
#[case::non_string_values(Some(r#"{"n": 1}"#))]
fn unusable_files_are_rejected(#[case] body: Option<&str>) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("snippets.json");
    if let Some(text) = body {
        fs::write(&path, text).expect("write snippets");
    }
    let mut store = SnippetStore::builtin();
    let untouched = store.clone();

    let error = store.merge_file(&path).expect_err("must fail");
    match (body, error) {
        (None, SnippetError::Read { .. }) | (Some(_), SnippetError::Parse { .. }) => {}
        (_, other) => panic!("unexpected error: {other}"),
    }
    assert_eq!(store, untouched);
}

fn line(message: &HostMessage) -> String {
    let mut encoded = serde_json::to_string(message).expect("encode");
    encoded.push('\n');
    encoded
}

#[rstest]
fn picking_a_result_copies_its_text(store: SnippetStore) {
    let input = format!(
        "{}{}",
        line(&HostMessage::Search {
            id: 1,
            query: "sig".into()
        }),
        line(&HostMessage::Activate { id: "1_0".into() })
    );
    let mut reader = Cursor::new(input.into_bytes());
    let mut output = Vec::new();
    let serving = serve_with(store, &mut reader, &mut output);
    assert!(serving.is_ok());

    let mut replies = Vec::new();
    let mut cursor = Cursor::new(output);
    loop {
        match read_message::<_, UnitMessage>(&mut cursor) {
            Ok(message) => replies.push(message),
            Err(ProtocolError::Closed) => break,
            Err(error) => panic!("invalid reply: {error}"),
        }
    }
    let kinds: Vec<_> = replies.iter().map(UnitMessage::kind).collect();
    assert_eq!(kinds, ["ready", "results", "copy", "activated"]);
    assert_eq!(
        replies.get(2),
        Some(&UnitMessage::Copy {
            text: "Regards, Sam".into()
        })
    );
}

/// Serves a plugin preloaded with `store`.
fn serve_with(
    store: SnippetStore,
    reader: &mut Cursor<Vec<u8>>,
    writer: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    PRELOADED.with(|slot| *slot.borrow_mut() = Some(store));
    serve::<Preloaded, _, _>(&[], reader, writer)
}

thread_local! {
    static PRELOADED: RefCell<Option<SnippetStore>> = const { RefCell::new(None) };
}

/// [`SnippetsPlugin`] whose `Default` takes the store staged by
/// [`serve_with`] instead of reading the environment.
struct Preloaded(SnippetsPlugin);

impl Default for Preloaded {
    fn default() -> Self {
        let store = PRELOADED
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_default();
        Self(SnippetsPlugin::with_store(store))
    }
}

impl Plugin for Preloaded {
    fn metadata() -> PluginMetadata {
        SnippetsPlugin::metadata()
    }

    fn search(&mut self, query: &str, ctx: &mut PluginContext) -> Vec<PluginResult> {
        self.0.search(query, ctx)
    }
}

#[test]
fn metadata_declares_the_trigger_and_permissions() {
    let metadata = SnippetsPlugin::metadata();
    assert_eq!(metadata.trigger(), Some(TRIGGER));
    assert!(metadata.validate().is_ok());
    assert!(!metadata.permissions().is_empty());
}
