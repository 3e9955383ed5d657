use super::PlatformProfile;

/// Indeed search result pages. Indeed fronts these with Cloudflare, which is
/// why the family is a deactivation candidate by default.
pub const PROFILE: PlatformProfile = PlatformProfile {
    name: "indeed",
    cards: &[
        "div.job_seen_beacon",
        "li div.cardOutline",
        "div.jobsearch-SerpJobCard",
        "a.tapItem",
        "td.resultContent",
    ],
    title: &[
        "h2.jobTitle span[title]",
        "h2.jobTitle a span",
        "a.jcs-JobTitle span",
        "h2.jobTitle",
        ".jobtitle",
    ],
    company: &[
        "[data-testid='company-name']",
        "span.companyName",
        ".company",
    ],
    location: &[
        "[data-testid='text-location']",
        "div.companyLocation",
        ".location",
    ],
    salary: &[
        "div.salary-snippet-container",
        ".salary-snippet",
        ".metadata.salary-snippet-container",
        "[data-testid='attribute_snippet_testid']",
        ".salaryText",
    ],
    description: &[
        "div.job-snippet",
        "[data-testid='jobsnippet_footer']",
        ".summary",
    ],
    link: &["h2.jobTitle a", "a.jcs-JobTitle", "a[data-jk]", "a[href]"],
    date: &["span.date", "[data-testid='myJobsStateDate']"],
    id_attributes: &["data-jk"],
    detail_url_pattern: r"/(?:viewjob|rc/clk|pagead/clk)\?(?:[^#]*&)?jk=([0-9a-fA-F]+)",
};
