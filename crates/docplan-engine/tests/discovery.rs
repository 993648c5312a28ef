use docplan_engine::session::{FindInput, QueryMatchInput};
use docplan_engine::{
    Cardinality, DocumentSession, FailureCode, MemoryDocument, NodeType, Revision, Selector,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn load_fixture(name: &str) -> MemoryDocument {
    let md = std::fs::read_to_string(format!(
        "{}/tests/fixtures/{name}.md",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap();
    MemoryDocument::from_markdown(&md)
}

#[test]
fn report_info_snapshot() {
    let mut session = DocumentSession::new(load_fixture("report"));
    let info = session.info();
    insta::assert_yaml_snapshot!("report_info", info);
}

#[test]
fn node_selector_finds_every_list_item() {
    let mut session = DocumentSession::new(load_fixture("report"));

    let result = session
        .find(&FindInput::new(Selector::node(NodeType::ListItem)))
        .unwrap();

    assert_eq!(result.total, 2);
    let ids: Vec<_> = result.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["li1", "li2"]);
}

#[test]
fn text_match_spans_bold_runs() {
    let mut session = DocumentSession::new(load_fixture("report"));
    let mut input = QueryMatchInput::new(Selector::text("grew in every"), Cardinality::ExactlyOne);
    input.include_style = true;

    let output = session.query_match(&input).unwrap();

    assert_eq!(output.total, 1);
    let style = output.matches[0].style.as_ref().unwrap();
    assert!(!style.is_uniform);
}

#[test]
fn pagination_beyond_the_end_returns_nothing() {
    let mut session = DocumentSession::new(load_fixture("report"));

    let result = session
        .find(&FindInput::new(Selector::regex("[A-Z]")).page(5, 100))
        .unwrap();

    assert!(result.items.is_empty());
    assert_eq!(result.page.returned, 0);
    assert!(result.total > 0);
    assert_eq!(result.evaluated_revision, Revision::new(0));
}

#[test]
fn exactly_one_rejects_pagination() {
    let mut session = DocumentSession::new(load_fixture("report"));
    let mut input = QueryMatchInput::new(Selector::text("Revenue"), Cardinality::ExactlyOne);
    input.limit = Some(1);

    let err = session.query_match(&input).unwrap_err();

    assert_eq!(err.code(), FailureCode::InvalidInput);
}

proptest! {
    #[test]
    fn pages_never_exceed_their_limit(words in 1usize..40, limit in 1usize..10, offset in 0usize..50) {
        let text = vec!["echo"; words].join(" ");
        let mut session = DocumentSession::new(MemoryDocument::from_markdown(&text));

        let result = session
            .find(&FindInput::new(Selector::text("echo")).page(limit, offset))
            .unwrap();

        prop_assert_eq!(result.total, words);
        prop_assert_eq!(result.page.returned, result.items.len());
        prop_assert!(result.items.len() <= limit);
        prop_assert_eq!(result.items.len(), words.saturating_sub(offset).min(limit));
    }
}
