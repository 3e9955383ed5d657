use super::PlatformProfile;

/// LinkedIn's public (logged-out) job search pages.
pub const PROFILE: PlatformProfile = PlatformProfile {
    name: "linkedin",
    cards: &[
        "ul.jobs-search__results-list > li",
        "div.base-card",
        "div.job-search-card",
        "li.result-card",
    ],
    title: &[
        "h3.base-search-card__title",
        ".base-search-card__title",
        ".result-card__title",
        "h3",
    ],
    company: &[
        "h4.base-search-card__subtitle a",
        "h4.base-search-card__subtitle",
        ".job-search-card__company-name",
        ".result-card__subtitle",
    ],
    location: &[
        ".job-search-card__location",
        ".base-search-card__metadata .job-search-card__location",
        ".job-result-card__location",
    ],
    salary: &[".job-search-card__salary-info", ".base-search-card__salary"],
    description: &[".job-search-card__snippet", ".result-card__snippet"],
    link: &[
        "a.base-card__full-link",
        "a.base-search-card--link",
        "a.result-card__full-card-link",
        "a[href]",
    ],
    date: &["time[datetime]", "time"],
    id_attributes: &["data-entity-urn", "data-id"],
    detail_url_pattern: r"/jobs/view/(?:[^/?#]*?-)?(\d+)",
};

#[cfg(test)]
mod tests {
    use super::super::parse_platform;
    use super::*;
    use crate::models::source::SelectorHints;
    use crate::parsers::ParseContext;

    #[test]
    fn extracts_guest_search_results() {
        let page = r#"<html><body><ul class="jobs-search__results-list">
          <li><div class="base-card" data-entity-urn="urn:li:jobPosting:4012345678">
            <a class="base-card__full-link" href="https://nl.linkedin.com/jobs/view/backend-developer-at-acme-4012345678?trk=public"></a>
            <div class="base-search-card__info">
              <h3 class="base-search-card__title">  Backend Developer  </h3>
              <h4 class="base-search-card__subtitle"><a href="/company/acme">Acme</a></h4>
              <div class="base-search-card__metadata">
                <span class="job-search-card__location">Amsterdam, North Holland</span>
                <time class="job-search-card__listdate" datetime="2025-06-02">1 week ago</time>
              </div>
            </div>
          </div></li>
          <li><div class="base-card">
            <a class="base-card__full-link" href="https://nl.linkedin.com/jobs/view/data-intern-4019999999"></a>
            <h3 class="base-search-card__title">Data Intern</h3>
          </div></li>
        </ul></body></html>"#;
        let hints = SelectorHints::default();
        let jobs = parse_platform(&PROFILE, page, &ParseContext::new(None, &hints)).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].title, "Backend Developer");
        assert_eq!(jobs[0].external_id.as_deref(), Some("4012345678"));
        assert_eq!(jobs[0].company.as_deref(), Some("Acme"));
        assert_eq!(
            jobs[0].location.as_deref(),
            Some("Amsterdam, North Holland")
        );
        assert!(jobs[0].published_at.is_some());

        assert_eq!(jobs[1].external_id.as_deref(), Some("4019999999"));
        assert_eq!(jobs[1].description, "Data Intern");
    }
}
