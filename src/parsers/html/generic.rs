use super::PlatformProfile;

/// Broad defaults for career pages without a dedicated profile. Operator
/// selectors from the source hints are tried before these.
pub const PROFILE: PlatformProfile = PlatformProfile {
    name: "generic",
    cards: &[
        "[data-job-id]",
        ".job-card",
        ".job-listing",
        ".job-item",
        ".vacancy-item",
        ".vacancy",
        "li.job",
        "article.job",
    ],
    title: &[
        ".job-title",
        "h2 a",
        "h3 a",
        ".title",
        "h2",
        "h3",
    ],
    company: &[".company", ".company-name", "[class*='company']", ".employer"],
    location: &[".location", ".job-location", "[class*='location']"],
    salary: &[".salary", "[class*='salary']"],
    description: &[".description", ".summary", ".snippet", "p"],
    link: &["a[href]"],
    date: &["time", ".date"],
    id_attributes: &["data-job-id", "data-jobid"],
    detail_url_pattern: r"/(?:jobs?|vacanc(?:y|ies)|vacatures?|careers?|positions?|openings?)/([^/?#]+)",
};
