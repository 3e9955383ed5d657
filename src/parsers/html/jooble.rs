use super::PlatformProfile;

/// Jooble search pages. Class names are hashed and rotate, so the
/// `data-test-name` attributes come first.
pub const PROFILE: PlatformProfile = PlatformProfile {
    name: "jooble",
    cards: &[
        "article[data-test-name='_jobCard']",
        "div[data-test-name='_jobCard']",
        "div.vacancy_wrapper",
        "article",
    ],
    title: &["h2 a", "header h2", "a.job_card_link", "h2"],
    company: &[
        "[data-test-name='_companyName']",
        ".company-name",
        ".company",
    ],
    location: &[
        "[data-test-name='_jobLocation']",
        "[data-test-name='_location']",
        ".location",
    ],
    salary: &["[data-test-name='_salary']", ".jkit_salary", ".salary"],
    description: &[
        "[data-test-name='_jobSnippet']",
        ".description",
        ".desc",
    ],
    link: &["h2 a", "a[href*='/desc/']", "a[href]"],
    date: &["[data-test-name='_jobDate']", "time"],
    id_attributes: &[],
    detail_url_pattern: r"/desc/(-?\d+)",
};

#[cfg(test)]
mod tests {
    use super::super::parse_platform;
    use super::*;
    use crate::models::source::SelectorHints;
    use crate::parsers::ParseContext;

    #[test]
    fn extracts_cards_and_numeric_ids() {
        let page = r#"<html><body><div class="results">
          <article data-test-name="_jobCard">
            <header><h2><a href="https://nl.jooble.org/desc/-1838473?ckey=chef">Chef de partie</a></h2></header>
            <p data-test-name="_companyName">Hotel Plaza</p>
            <div data-test-name="_jobLocation">Den Haag</div>
            <div data-test-name="_jobSnippet">Cooking for <b>200</b> guests.</div>
          </article>
          <article data-test-name="_jobCard">
            <header><h2><a href="/desc/99127">Sous chef</a></h2></header>
            <p data-test-name="_salary">€2.900 per month</p>
          </article>
        </div></body></html>"#;
        let base = url::Url::parse("https://nl.jooble.org/SearchResult?ukw=chef").unwrap();
        let hints = SelectorHints::default();
        let jobs = parse_platform(&PROFILE, page, &ParseContext::new(Some(&base), &hints)).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].title, "Chef de partie");
        assert_eq!(jobs[0].external_id.as_deref(), Some("-1838473"));
        assert_eq!(jobs[0].company.as_deref(), Some("Hotel Plaza"));
        assert_eq!(jobs[0].description, "Cooking for 200 guests.");

        assert_eq!(jobs[1].external_id.as_deref(), Some("99127"));
        assert_eq!(
            jobs[1].url.as_deref(),
            Some("https://nl.jooble.org/desc/99127")
        );
        assert_eq!(jobs[1].salary_text.as_deref(), Some("€2.900 per month"));
        assert_eq!(jobs[1].description, "Sous chef");
    }
}
