use roxmltree::{Document, Node, ParsingOptions};

use crate::error::ParseError;

pub(crate) fn parse_document(text: &str) -> Result<Document<'_>, ParseError> {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

/// Whether `node` matches a candidate name such as `title` or `job:location`.
///
/// Local names compare case-insensitively. A prefixed candidate only matches
/// elements bound to that prefix; an unprefixed one only matches elements
/// without a prefix.
pub(crate) fn matches_name(node: &Node<'_, '_>, candidate: &str) -> bool {
    if !node.is_element() {
        return false;
    }
    let tag = node.tag_name();
    let prefix = tag.namespace().and_then(|uri| node.lookup_prefix(uri));
    match candidate.split_once(':') {
        Some((want_prefix, local)) => {
            tag.name().eq_ignore_ascii_case(local) && prefix == Some(want_prefix)
        }
        None => tag.name().eq_ignore_ascii_case(candidate) && prefix.is_none(),
    }
}

/// First direct child matching any candidate, probing candidates in order.
pub(crate) fn child<'a, 'input>(
    parent: &Node<'a, 'input>,
    candidates: &[&str],
) -> Option<Node<'a, 'input>> {
    candidates.iter().find_map(|candidate| {
        parent
            .children()
            .find(|node| matches_name(node, candidate) && !text_of(node).is_empty())
    })
}

/// All text (including CDATA) below `node`, trimmed.
pub(crate) fn text_of(node: &Node<'_, '_>) -> String {
    let mut out = String::new();
    for text in node.descendants().filter(|n| n.is_text()) {
        if let Some(t) = text.text() {
            if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
            out.push_str(t);
        }
    }
    out.trim().to_string()
}

/// Text of the first child matching any candidate.
pub(crate) fn child_text(parent: &Node<'_, '_>, candidates: &[&str]) -> Option<String> {
    child(parent, candidates).map(|node| text_of(&node))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_respected() {
        let doc = parse_document(
            r#"<item xmlns:media="http://search.yahoo.com/mrss/"><media:title>Ignored</media:title><title>Kept</title></item>"#,
        )
        .unwrap();
        let item = doc.root_element();
        assert_eq!(child_text(&item, &["title"]).as_deref(), Some("Kept"));
        assert_eq!(
            child_text(&item, &["media:title"]).as_deref(),
            Some("Ignored")
        );
    }

    #[test]
    fn empty_candidates_are_skipped() {
        let doc = parse_document("<job><city/><location>Leiden</location></job>").unwrap();
        assert_eq!(
            child_text(&doc.root_element(), &["city", "location"]).as_deref(),
            Some("Leiden")
        );
    }
}
