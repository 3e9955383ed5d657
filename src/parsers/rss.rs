//! Generic RSS 2.0 / RSS 1.0 (RDF) / Atom job feeds.
//!
//! Job feeds extend the base formats with whatever namespace their vendor
//! picked, so each field is looked up through an ordered list of candidate tag
//! names.

use roxmltree::Node;

use super::xml::{child, child_text, matches_name, parse_document, text_of};
use super::{ParseContext, parse_date};
use crate::error::ParseError;
use crate::models::job::RawJob;
use crate::normalize::clean_text;

const TITLE: &[&str] = &["title", "job:title", "jobTitle"];
const DESCRIPTION: &[&str] = &[
    "content:encoded",
    "description",
    "summary",
    "content",
    "job:description",
];
const LOCATION: &[&str] = &[
    "job:location",
    "location",
    "jobLocation",
    "joblocation",
    "city",
    "region",
    "georss:featureName",
];
const COMPANY: &[&str] = &[
    "job:company",
    "company",
    "companyName",
    "hiringOrganization",
    "dc:creator",
    "author",
];
const SALARY: &[&str] = &["job:salary", "salary", "compensation", "baseSalary"];
const DATE: &[&str] = &["pubDate", "published", "updated", "dc:date", "date"];
const ID: &[&str] = &["guid", "id", "job:id", "jobId", "referencenumber"];
const EMPLOYMENT_TYPE: &[&str] = &["job:type", "jobType", "employmentType", "job:employmentType"];

pub fn parse(document: &str, _ctx: &ParseContext<'_>) -> Result<Vec<RawJob>, ParseError> {
    let doc = parse_document(document)?;
    let root = doc.root_element();
    let root_name = root.tag_name().name();
    if !matches!(root_name, "rss" | "RDF" | "feed") {
        return Err(ParseError::UnexpectedRoot(root_name.to_string()));
    }

    let jobs: Vec<RawJob> = root
        .descendants()
        .filter(|node| matches_name(node, "item") || matches_name(node, "entry"))
        .map(|entry| parse_entry(&entry))
        .collect();

    tracing::debug!(entries = jobs.len(), root = root_name, "Parsed feed");
    Ok(jobs)
}

fn parse_entry(entry: &Node<'_, '_>) -> RawJob {
    let text = |candidates: &[&str]| {
        child_text(entry, candidates)
            .map(|t| clean_text(&t))
            .filter(|t| !t.is_empty())
    };

    let (guid, guid_is_link) = match child(entry, ID) {
        Some(node) => {
            let permalink = node.attribute("isPermaLink") != Some("false");
            let value = text_of(&node);
            let looks_like_url = value.starts_with("http://") || value.starts_with("https://");
            (Some(value), permalink && looks_like_url)
        }
        None => (None, false),
    };

    let url = entry_link(entry).or_else(|| guid.clone().filter(|_| guid_is_link));

    RawJob {
        title: text(TITLE).unwrap_or_default(),
        description: child_text(entry, DESCRIPTION)
            .map(|t| clean_text(&t))
            .unwrap_or_default(),
        location: text(LOCATION),
        company: text(COMPANY),
        salary_text: text(SALARY),
        external_id: guid.filter(|g| !g.is_empty()),
        url,
        published_at: child_text(entry, DATE).and_then(|d| parse_date(&d)),
        employment_type_hint: text(EMPLOYMENT_TYPE),
    }
}

/// RSS puts the link in the element text, Atom in `href` of the alternate link.
fn entry_link(entry: &Node<'_, '_>) -> Option<String> {
    let mut fallback = None;
    for link in entry.children().filter(|n| matches_name(n, "link")) {
        let text = text_of(&link);
        if !text.is_empty() {
            return Some(text);
        }
        if let Some(href) = link.attribute("href") {
            match link.attribute("rel") {
                None | Some("alternate") => return Some(href.to_string()),
                _ => {
                    fallback.get_or_insert_with(|| href.to_string());
                }
            }
        }
    }
    fallback
}
