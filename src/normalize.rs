//! Pure functions turning a [`RawJob`] into a [`JobRecord`].
//!
//! Everything here is deterministic: the same raw job from the same source
//! always yields the same external id, salary and employment type.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::job::{
    EmploymentType, ExternalIdOrigin, JobRecord, JobStatus, RawJob, Salary, fold_title,
};

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("static regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>()]+").expect("static regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("static regex")
});
static ESCAPED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)&lt;/?(?:p|br|div|span|ul|ol|li|b|strong|em|i|u|a|h[1-6]|table|tr|td|th|section|article|font|img|hr)\b",
    )
    .expect("static regex")
});
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static regex"));

// A number with optional thousands groups, optional 1-2 digit fraction and
// an optional "k" multiplier: 35,000 / 35.000 / 12.50 / 35k / 1 500
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:[.,\u{a0}\u{202f}]\d{3})+|\d+)(?:[.,](\d{1,2}))?(?:\s?(k)\b)?")
        .expect("static regex")
});
static CURRENCY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(EUR|USD|GBP|CHF|CAD|AUD|NZD|INR|JPY|SEK|NOK|DKK|PLN|CZK|ZAR)\b")
        .expect("static regex")
});

static PART_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpart(?:[\s-]?time)?\b|\bdeeltijd\b").expect("static regex")
});
static CONTRACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:contract|contractor|freelance|freelancer|zzp)\b").expect("static regex")
});
static INTERNSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:intern|internship|stage|stagiair|trainee)\b").expect("static regex")
});

/// Phrases partner feeds append to descriptions to advertise themselves.
pub const DEFAULT_BRANDING_PHRASES: &[&str] = &[
    "Apply now via",
    "Apply via",
    "Find more jobs at",
    "Originally posted on",
    "View the full vacancy on",
    "This vacancy was found on",
    "Powered by",
];

/// Query parameters job boards use to carry the posting id.
const URL_ID_PARAMS: &[&str] = &["jk", "id", "jobid", "jobId", "job_id", "vacancyId", "vacancy_id"];

/// Normalization context shared by every job of one pass.
#[derive(Debug, Clone)]
pub struct NormalizeContext<'a> {
    pub source_id: i32,
    pub default_currency: &'a str,
    /// Extra cleaning for partner feeds.
    pub partner_branding: Option<&'a [String]>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Build a persistable record from a raw job.
pub fn normalize(raw: RawJob, ctx: &NormalizeContext<'_>) -> Result<JobRecord, NormalizeError> {
    let title = clean_text(&raw.title);
    if title.is_empty() {
        return Err(NormalizeError::MissingField("title"));
    }

    let mut description = match ctx.partner_branding {
        Some(phrases) => clean_partner_text(&raw.description, phrases),
        None => clean_text(&raw.description),
    };
    let company = raw.company.as_deref().map(clean_text).filter(|s| !s.is_empty());
    let location = raw.location.as_deref().map(clean_text).filter(|s| !s.is_empty());
    if description.is_empty() {
        description = synthesize_description(&title, company.as_deref(), location.as_deref());
    }

    let salary = raw
        .salary_text
        .as_deref()
        .and_then(|text| parse_salary(text, ctx.default_currency));

    let classify_text = match raw.employment_type_hint.as_deref() {
        Some(hint) => format!("{hint} {title} {description}"),
        None => format!("{title} {description}"),
    };
    let employment_type = classify_employment_type(&classify_text);

    let (external_id, id_origin) = derive_external_id(
        raw.external_id.as_deref(),
        raw.url.as_deref(),
        &title,
        ctx.source_id,
    );

    Ok(JobRecord {
        id: None,
        source_id: ctx.source_id,
        external_id,
        id_origin,
        external_url: raw.url,
        title,
        description,
        company,
        location,
        salary,
        employment_type,
        status: JobStatus::Active,
        published_at: raw.published_at,
        scraped_at: ctx.scraped_at,
    })
}

/// Description used when a source publishes none, so storage never sees an
/// empty one.
pub fn synthesize_description(title: &str, company: Option<&str>, location: Option<&str>) -> String {
    let mut text = title.trim().to_string();
    if let Some(company) = company.map(str::trim).filter(|c| !c.is_empty()) {
        text.push_str(" at ");
        text.push_str(company);
    }
    if let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) {
        text.push_str(" in ");
        text.push_str(location);
    }
    text
}

/// Strip markup, decode entities and collapse whitespace.
pub fn clean_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    // Entity-escaped markup (common in feeds) is unescaped first so the tag
    // pass can see it. Escaped brackets around anything else are text.
    let unescaped = if ESCAPED_TAG.is_match(input) {
        decode_entities(input)
    } else {
        input.to_string()
    };
    let without_scripts = SCRIPT_STYLE.replace_all(&unescaped, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let decoded = decode_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// [`clean_text`] plus removal of branding phrases, raw URLs and email
/// addresses.
pub fn clean_partner_text(input: &str, extra_phrases: &[String]) -> String {
    let text = clean_text(input);
    let text = URL.replace_all(&text, " ");
    let mut text = EMAIL.replace_all(&text, " ").into_owned();

    let phrases = DEFAULT_BRANDING_PHRASES
        .iter()
        .copied()
        .chain(extra_phrases.iter().map(String::as_str));
    for phrase in phrases {
        if phrase.trim().is_empty() {
            continue;
        }
        let pattern = format!("(?i){}", regex::escape(phrase.trim()));
        if let Ok(re) = Regex::new(&pattern) {
            text = re.replace_all(&text, " ").into_owned();
        }
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Decode the named entities seen in job feeds plus numeric references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        let code = match body.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => body.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    const NAMED: &[(&str, &str)] = &[
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&apos;", "'"),
        ("&euro;", "€"),
        ("&pound;", "£"),
        ("&yen;", "¥"),
        ("&ndash;", "–"),
        ("&mdash;", "—"),
        ("&hellip;", "…"),
        ("&rsquo;", "'"),
        ("&lsquo;", "'"),
        ("&rdquo;", "\""),
        ("&ldquo;", "\""),
        ("&bull;", "•"),
        ("&eacute;", "é"),
        ("&euml;", "ë"),
        ("&uuml;", "ü"),
        ("&ouml;", "ö"),
        ("&auml;", "ä"),
    ];
    let mut out = numeric.into_owned();
    for (entity, replacement) in NAMED {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    // Last, so "&amp;lt;" decodes to "&lt;" and not "<".
    out.replace("&amp;", "&")
}

/// Extract a salary range from free text.
///
/// One amount gives `min == max`; more give the smallest and largest.
/// Returns `None` when the text holds no digits.
pub fn parse_salary(text: &str, default_currency: &str) -> Option<Salary> {
    let amounts: Vec<f64> = AMOUNT
        .captures_iter(text)
        .filter_map(|caps| {
            let integer: String = caps[1].chars().filter(char::is_ascii_digit).collect();
            let mut value = integer.parse::<f64>().ok()?;
            if let Some(fraction) = caps.get(2) {
                let digits = fraction.as_str();
                let frac = digits.parse::<f64>().ok()? / 10f64.powi(digits.len() as i32);
                value += frac;
            }
            if caps.get(3).is_some() {
                value *= 1000.0;
            }
            Some(value)
        })
        .collect();

    if amounts.is_empty() {
        return None;
    }

    let min = amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let max = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(Salary {
        min,
        max,
        currency: detect_currency(text).unwrap_or_else(|| default_currency.to_uppercase()),
    })
}

fn detect_currency(text: &str) -> Option<String> {
    const SYMBOLS: &[(char, &str)] = &[
        ('€', "EUR"),
        ('£', "GBP"),
        ('$', "USD"),
        ('¥', "JPY"),
        ('₹', "INR"),
    ];
    for (symbol, code) in SYMBOLS {
        if text.contains(*symbol) {
            return Some((*code).to_string());
        }
    }
    CURRENCY_CODE
        .captures(text)
        .map(|caps| caps[1].to_uppercase())
}

/// Keyword classification over the posting text; defaults to full-time.
pub fn classify_employment_type(text: &str) -> EmploymentType {
    if PART_TIME.is_match(text) {
        EmploymentType::PartTime
    } else if CONTRACT.is_match(text) {
        EmploymentType::Contract
    } else if INTERNSHIP.is_match(text) {
        EmploymentType::Internship
    } else {
        EmploymentType::FullTime
    }
}

/// Pick the stable external id for a job.
///
/// Order: source-supplied id, id carried in the detail URL, hash of source
/// identity and title.
pub fn derive_external_id(
    supplied: Option<&str>,
    url: Option<&str>,
    title: &str,
    source_id: i32,
) -> (String, ExternalIdOrigin) {
    if let Some(id) = supplied.map(str::trim).filter(|id| !id.is_empty()) {
        return (id.to_string(), ExternalIdOrigin::Supplied);
    }
    if let Some(id) = url.and_then(id_from_url) {
        return (id, ExternalIdOrigin::Url);
    }
    (hashed_id(source_id, title), ExternalIdOrigin::Hashed)
}

/// Id carried by a detail URL: a well-known id query parameter, else the
/// last non-empty path segment.
pub fn id_from_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = url::Url::parse(raw) {
        for (key, value) in parsed.query_pairs() {
            if URL_ID_PARAMS.contains(&key.as_ref()) && !value.is_empty() {
                return Some(value.into_owned());
            }
        }
        return parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .filter(|segment| !segment.is_empty());
    }

    // Relative link
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

fn hashed_id(source_id: i32, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(fold_title(title).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("h-{}", &digest[..32])
}
