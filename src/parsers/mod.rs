//! Format parsers: raw document in, [`RawJob`] list out.
//!
//! Dispatch is a plain match over [`ParserKind`]; every variant is a pure
//! function over the document text so it can be tested against fixtures.

pub mod html;
pub mod partner_xml;
pub mod rss;
mod xml;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use url::Url;

use crate::error::ParseError;
use crate::models::job::RawJob;
use crate::models::source::{ParserKind, SelectorHints};

/// Per-source inputs a parser may need.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Base for resolving relative links (the source URL).
    pub base_url: Option<&'a Url>,
    pub selectors: &'a SelectorHints,
}

impl<'a> ParseContext<'a> {
    pub fn new(base_url: Option<&'a Url>, selectors: &'a SelectorHints) -> Self {
        Self {
            base_url,
            selectors,
        }
    }

    /// Resolve `href` against the base URL; absolute links pass through.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        if let Ok(absolute) = Url::parse(href) {
            return Some(absolute.into());
        }
        match self.base_url {
            Some(base) => base.join(href).ok().map(Into::into),
            None => Some(href.to_string()),
        }
    }
}

/// Parse `document` with the parser selected by `kind`.
pub fn parse(kind: ParserKind, document: &str, ctx: &ParseContext<'_>) -> Result<Vec<RawJob>, ParseError> {
    match kind {
        ParserKind::Rss => rss::parse(document, ctx),
        ParserKind::PartnerXml => partner_xml::parse(document, ctx),
        ParserKind::HtmlIndeed => html::parse_platform(&html::indeed::PROFILE, document, ctx),
        ParserKind::HtmlJooble => html::parse_platform(&html::jooble::PROFILE, document, ctx),
        ParserKind::HtmlLinkedin => html::parse_platform(&html::linkedin::PROFILE, document, ctx),
        ParserKind::HtmlGeneric => html::parse_generic(document, ctx),
    }
}

/// Dates as published by feeds and job boards.
pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d-%m-%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
