use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum polling interval accepted for a source.
pub const MIN_SCRAPE_INTERVAL_MINUTES: i32 = 5;

/// How a source publishes its postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    HtmlScrape,
    XmlFeed,
    Api,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::HtmlScrape => "html-scrape",
            SourceKind::XmlFeed => "xml-feed",
            SourceKind::Api => "api",
        }
    }

    /// Parser used when the descriptor does not name one.
    pub fn default_parser(&self) -> ParserKind {
        match self {
            SourceKind::HtmlScrape => ParserKind::HtmlGeneric,
            SourceKind::XmlFeed | SourceKind::Api => ParserKind::Rss,
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html-scrape" | "html_scrape" => Ok(SourceKind::HtmlScrape),
            "xml-feed" | "xml_feed" => Ok(SourceKind::XmlFeed),
            "api" => Ok(SourceKind::Api),
            other => Err(format!("unknown source kind '{other}'")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source family, selecting the format parser for a source's documents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    Rss,
    PartnerXml,
    HtmlIndeed,
    HtmlJooble,
    HtmlLinkedin,
    HtmlGeneric,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Rss => "rss",
            ParserKind::PartnerXml => "partner-xml",
            ParserKind::HtmlIndeed => "html-indeed",
            ParserKind::HtmlJooble => "html-jooble",
            ParserKind::HtmlLinkedin => "html-linkedin",
            ParserKind::HtmlGeneric => "html-generic",
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(
            self,
            ParserKind::HtmlIndeed
                | ParserKind::HtmlJooble
                | ParserKind::HtmlLinkedin
                | ParserKind::HtmlGeneric
        )
    }
}

impl FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" | "atom" => Ok(ParserKind::Rss),
            "partner-xml" => Ok(ParserKind::PartnerXml),
            "html-indeed" => Ok(ParserKind::HtmlIndeed),
            "html-jooble" => Ok(ParserKind::HtmlJooble),
            "html-linkedin" => Ok(ParserKind::HtmlLinkedin),
            "html-generic" => Ok(ParserKind::HtmlGeneric),
            other => Err(format!("unknown parser kind '{other}'")),
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of obtaining a document's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Direct,
    RenderProxy,
    HeadlessBrowser,
}

impl StrategyKind {
    /// Preference order used when a source pins nothing.
    pub const DEFAULT_ORDER: [StrategyKind; 3] = [
        StrategyKind::Direct,
        StrategyKind::RenderProxy,
        StrategyKind::HeadlessBrowser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::RenderProxy => "render-proxy",
            StrategyKind::HeadlessBrowser => "headless-browser",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options forwarded to strategies that execute JavaScript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Extra settle time after load, in milliseconds.
    pub wait_ms: Option<u64>,
    /// Ask the rendering service to run scripts; defaults to on.
    pub execute_js: Option<bool>,
    /// Two-letter country code for the proxy exit node.
    pub proxy_country: Option<String>,
}

/// Operator-supplied CSS selectors for HTML extraction. Each list is an
/// ordered set of candidates; empty lists fall back to parser defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorHints {
    pub job_card: Vec<String>,
    pub title: Vec<String>,
    pub company: Vec<String>,
    pub location: Vec<String>,
    pub salary: Vec<String>,
    pub description: Vec<String>,
    pub link: Vec<String>,
    /// Regex matched against anchor hrefs when no card selector matches.
    pub detail_url_pattern: Option<String>,
}

/// Per-source fetch and extraction hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchHints {
    /// Permitted strategies in preference order; empty means the default chain.
    pub strategies: Vec<StrategyKind>,
    /// Use exactly this strategy, no escalation.
    pub pinned: Option<StrategyKind>,
    pub render: RenderOptions,
    pub selectors: SelectorHints,
    /// Phrases removed from partner-feed descriptions, in addition to the
    /// built-in list.
    pub branding_phrases: Vec<String>,
}

impl FetchHints {
    /// The ordered strategy list this source allows.
    pub fn strategy_order(&self) -> Vec<StrategyKind> {
        if let Some(pinned) = self.pinned {
            return vec![pinned];
        }
        if self.strategies.is_empty() {
            return StrategyKind::DEFAULT_ORDER.to_vec();
        }
        let mut order = Vec::with_capacity(self.strategies.len());
        for kind in &self.strategies {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }
}

/// Configuration and run bookkeeping for one external source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub parser: Option<ParserKind>,
    pub is_active: bool,
    pub scrape_interval_minutes: i32,
    pub hints: FetchHints,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SourceDescriptor {
    pub fn new(id: i32, name: &str, url: &str, kind: SourceKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            url: url.to_string(),
            kind,
            parser: None,
            is_active: true,
            scrape_interval_minutes: 60,
            hints: FetchHints::default(),
            last_scraped_at: None,
            last_success_at: None,
            last_error: None,
        }
    }

    pub fn with_parser(mut self, parser: ParserKind) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_interval(mut self, minutes: i32) -> Self {
        self.scrape_interval_minutes = minutes;
        self
    }

    pub fn parser_kind(&self) -> ParserKind {
        self.parser.unwrap_or_else(|| self.kind.default_parser())
    }

    /// Interval clamped to the accepted minimum.
    pub fn effective_interval_minutes(&self) -> u32 {
        self.scrape_interval_minutes.max(MIN_SCRAPE_INTERVAL_MINUTES) as u32
    }
}

/// Fields the pipeline writes back after a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBookkeeping {
    pub last_scraped_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the stored error; `None` leaves it untouched.
    pub last_error: Option<Option<String>>,
    pub is_active: Option<bool>,
}
