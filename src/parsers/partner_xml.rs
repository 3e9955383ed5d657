//! Partner vacancy feeds in the `<source><job>…</job></source>` layout.
//!
//! The reference number is the partner's own id and is used as the external
//! id directly. Branding and link stripping of descriptions happens in the
//! normalizer, keyed on this parser kind.

use roxmltree::Node;

use super::xml::{child_text, matches_name, parse_document};
use super::{ParseContext, parse_date};
use crate::error::ParseError;
use crate::models::job::RawJob;
use crate::normalize::clean_text;

const JOB: &[&str] = &["job", "vacancy", "item"];
const TITLE: &[&str] = &["title", "jobtitle", "functiontitle", "name"];
const REFERENCE: &[&str] = &["referencenumber", "reference", "jobid", "vacancyid", "id"];
const URL: &[&str] = &["url", "link", "applyurl", "apply_url"];
const COMPANY: &[&str] = &["company", "companyname", "employer", "organisation"];
const CITY: &[&str] = &["city", "place", "town"];
const STATE: &[&str] = &["state", "region", "province"];
const COUNTRY: &[&str] = &["country"];
const LOCATION: &[&str] = &["location", "worklocation"];
const DESCRIPTION: &[&str] = &["description", "jobdescription", "body", "text"];
const SALARY: &[&str] = &["salary", "salaryrange", "compensation", "wage"];
const DATE: &[&str] = &["date", "pubdate", "publishdate", "created"];
const JOB_TYPE: &[&str] = &["jobtype", "employmenttype", "contracttype", "type"];

pub fn parse(document: &str, ctx: &ParseContext<'_>) -> Result<Vec<RawJob>, ParseError> {
    let doc = parse_document(document)?;
    let root = doc.root_element();

    let jobs: Vec<RawJob> = root
        .descendants()
        .filter(|node| JOB.iter().any(|name| matches_name(node, name)))
        .filter(|node| *node != root)
        .map(|job| parse_job(&job, ctx))
        .collect();

    let root_name = root.tag_name().name();
    if jobs.is_empty() && !["source", "jobs", "vacancies", "feed"]
        .iter()
        .any(|name| root_name.eq_ignore_ascii_case(name))
    {
        return Err(ParseError::UnexpectedRoot(root_name.to_string()));
    }

    tracing::debug!(jobs = jobs.len(), root = root_name, "Parsed partner feed");
    Ok(jobs)
}

fn parse_job(job: &Node<'_, '_>, ctx: &ParseContext<'_>) -> RawJob {
    let text = |candidates: &[&str]| {
        child_text(job, candidates)
            .map(|t| clean_text(&t))
            .filter(|t| !t.is_empty())
    };

    let location = text(LOCATION).or_else(|| {
        let parts: Vec<String> = [CITY, STATE, COUNTRY]
            .iter()
            .copied()
            .filter_map(|candidates| text(candidates))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    });

    RawJob {
        title: text(TITLE).unwrap_or_default(),
        // Left uncleaned: partner-specific stripping runs during normalization.
        description: child_text(job, DESCRIPTION).unwrap_or_default(),
        location,
        company: text(COMPANY),
        salary_text: text(SALARY),
        external_id: text(REFERENCE),
        url: child_text(job, URL).and_then(|href| ctx.resolve(&href)),
        published_at: child_text(job, DATE).and_then(|d| parse_date(&d)),
        employment_type_hint: text(JOB_TYPE),
    }
}
