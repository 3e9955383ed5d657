//! Job-board search pages scraped with CSS selectors.
//!
//! Target sites publish no stable contract, so every field is located through
//! an ordered list of candidate selectors ([`Candidates`]). Adding a selector
//! for a redesigned page means adding a string to a profile, not code.

pub mod generic;
pub mod indeed;
pub mod jooble;
pub mod linkedin;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{ParseContext, parse_date};
use crate::error::ParseError;
use crate::models::job::RawJob;
use crate::models::source::SelectorHints;
use crate::normalize::{clean_text, synthesize_description};

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// Default selectors and patterns for one job board.
#[derive(Debug)]
pub struct PlatformProfile {
    pub name: &'static str,
    pub cards: &'static [&'static str],
    pub title: &'static [&'static str],
    pub company: &'static [&'static str],
    pub location: &'static [&'static str],
    pub salary: &'static [&'static str],
    pub description: &'static [&'static str],
    pub link: &'static [&'static str],
    pub date: &'static [&'static str],
    /// Attributes on (or inside) a card that carry the posting id.
    pub id_attributes: &'static [&'static str],
    /// Regex for detail-page hrefs; group 1, when present, is the posting id.
    pub detail_url_pattern: &'static str,
}

/// Ordered candidate selectors for one field.
#[derive(Debug)]
pub struct Candidates {
    compiled: Vec<(String, Selector)>,
}

impl Candidates {
    /// Operator-supplied selectors first, then the defaults.
    pub fn compile(preferred: &[String], defaults: &[&str]) -> Result<Self, ParseError> {
        let mut compiled: Vec<(String, Selector)> = Vec::new();
        for raw in preferred
            .iter()
            .map(String::as_str)
            .chain(defaults.iter().copied())
        {
            let raw = raw.trim();
            if raw.is_empty() || compiled.iter().any(|(seen, _)| seen == raw) {
                continue;
            }
            let selector =
                Selector::parse(raw).map_err(|_| ParseError::Selector(raw.to_string()))?;
            compiled.push((raw.to_string(), selector));
        }
        Ok(Self { compiled })
    }

    /// The first candidate matching at least one element, with its matches.
    pub fn select_in<'a>(&self, document: &'a Html) -> Option<(&str, Vec<ElementRef<'a>>)> {
        self.compiled.iter().find_map(|(raw, selector)| {
            let found: Vec<ElementRef<'a>> = document.select(selector).collect();
            (!found.is_empty()).then_some((raw.as_str(), found))
        })
    }

    pub fn first_element<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.compiled
            .iter()
            .find_map(|(_, selector)| scope.select(selector).next())
    }

    /// Text of the first candidate that yields non-empty text.
    pub fn first_text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.compiled.iter().find_map(|(_, selector)| {
            scope
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// A profile compiled together with a source's selector hints.
struct Extractor {
    cards: Candidates,
    title: Candidates,
    company: Candidates,
    location: Candidates,
    salary: Candidates,
    description: Candidates,
    link: Candidates,
    date: Candidates,
    id_attributes: Vec<(&'static str, Selector)>,
    detail_url: Regex,
}

impl Extractor {
    fn new(profile: &PlatformProfile, hints: &SelectorHints) -> Result<Self, ParseError> {
        let id_attributes = profile
            .id_attributes
            .iter()
            .map(|attr| {
                Selector::parse(&format!("[{attr}]"))
                    .map(|selector| (*attr, selector))
                    .map_err(|_| ParseError::Selector(format!("[{attr}]")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pattern = hints
            .detail_url_pattern
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(profile.detail_url_pattern);

        Ok(Self {
            cards: Candidates::compile(&hints.job_card, profile.cards)?,
            title: Candidates::compile(&hints.title, profile.title)?,
            company: Candidates::compile(&hints.company, profile.company)?,
            location: Candidates::compile(&hints.location, profile.location)?,
            salary: Candidates::compile(&hints.salary, profile.salary)?,
            description: Candidates::compile(&hints.description, profile.description)?,
            link: Candidates::compile(&hints.link, profile.link)?,
            date: Candidates::compile(&[], profile.date)?,
            id_attributes,
            detail_url: Regex::new(pattern)?,
        })
    }

    /// `None` only for empty placeholder cards. A card with content but no
    /// title comes back with an empty title so normalization counts it.
    fn extract_card(&self, card: ElementRef<'_>, ctx: &ParseContext<'_>) -> Option<RawJob> {
        let link = if card.value().name() == "a" && card.value().attr("href").is_some() {
            Some(card)
        } else {
            self.link.first_element(card)
        };
        let href = link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| ctx.resolve(href));

        if href.is_none() && element_text(card).is_empty() {
            return None;
        }

        let title = self
            .title
            .first_text(card)
            .or_else(|| link.map(element_text).filter(|t| !t.is_empty()))
            .unwrap_or_default();
        let company = self.company.first_text(card);
        let location = self.location.first_text(card);
        let description = self
            .description
            .first_text(card)
            .or_else(|| {
                (!title.is_empty()).then(|| {
                    synthesize_description(&title, company.as_deref(), location.as_deref())
                })
            })
            .unwrap_or_default();

        let published_at = self
            .date
            .first_element(card)
            .map(|el| {
                el.value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(el))
            })
            .and_then(|text| parse_date(&text));

        let external_id = self.card_id(card).or_else(|| {
            href.as_deref()
                .and_then(|h| self.detail_url.captures(h))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        });

        Some(RawJob {
            title,
            description,
            location,
            company,
            salary_text: self.salary.first_text(card),
            external_id,
            url: href,
            published_at,
            employment_type_hint: None,
        })
    }

    fn card_id(&self, card: ElementRef<'_>) -> Option<String> {
        self.id_attributes.iter().find_map(|(attr, selector)| {
            card.value()
                .attr(attr)
                .or_else(|| {
                    card.select(selector)
                        .next()
                        .and_then(|el| el.value().attr(attr))
                })
                .map(urn_tail)
                .filter(|id| !id.is_empty())
        })
    }
}

/// `urn:li:jobPosting:123` → `123`; plain ids pass through.
fn urn_tail(value: &str) -> String {
    value.rsplit(':').next().unwrap_or(value).trim().to_string()
}

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Parse a search page with a board profile.
pub fn parse_platform(
    profile: &PlatformProfile,
    document: &str,
    ctx: &ParseContext<'_>,
) -> Result<Vec<RawJob>, ParseError> {
    let extractor = Extractor::new(profile, ctx.selectors)?;
    let html = Html::parse_document(document);

    if let Some((selector, cards)) = extractor.cards.select_in(&html) {
        let total = cards.len();
        let jobs: Vec<RawJob> = cards
            .into_iter()
            .filter_map(|card| extractor.extract_card(card, ctx))
            .collect();
        tracing::debug!(
            platform = profile.name,
            selector,
            cards = total,
            jobs = jobs.len(),
            "Extracted job cards"
        );
        if jobs.iter().any(|job| !job.title.is_empty()) {
            return Ok(jobs);
        }
    }

    let jobs = scan_detail_links(&html, &extractor.detail_url, ctx);
    if jobs.is_empty() {
        tracing::warn!(
            platform = profile.name,
            "No job cards or detail links found; the page layout may have changed"
        );
    } else {
        tracing::info!(
            platform = profile.name,
            jobs = jobs.len(),
            "No card selector matched, fell back to detail links"
        );
    }
    Ok(jobs)
}

/// Generic pages: selectors come from the source's hints, with broad defaults.
pub fn parse_generic(document: &str, ctx: &ParseContext<'_>) -> Result<Vec<RawJob>, ParseError> {
    parse_platform(&generic::PROFILE, document, ctx)
}

/// Last resort: anchors whose href looks like a job detail page.
fn scan_detail_links(html: &Html, pattern: &Regex, ctx: &ParseContext<'_>) -> Vec<RawJob> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();

    for anchor in html.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(caps) = pattern.captures(href) else {
            continue;
        };
        let Some(url) = ctx.resolve(href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = Some(element_text(anchor))
            .filter(|t| !t.is_empty())
            .or_else(|| anchor.value().attr("title").map(clean_text))
            .or_else(|| anchor.value().attr("aria-label").map(clean_text))
            .filter(|t| !t.is_empty());
        let Some(title) = title else {
            continue;
        };

        jobs.push(RawJob {
            description: synthesize_description(&title, None, None),
            title,
            external_id: caps.get(1).map(|m| m.as_str().to_string()),
            url: Some(url),
            ..Default::default()
        });
    }

    jobs
}
