#![allow(dead_code)]

use std::sync::Arc;

use jobharvest::config::PipelineConfig;
use jobharvest::fetch::FetchChain;
use jobharvest::runner::SourceRunner;
use jobharvest::store::MemoryStore;

pub const CHALLENGE_PAGE: &str = r#"<!DOCTYPE html><html><head><title>Just a moment...</title></head>
<body><div id="cf-wrapper">Checking your browser before accessing nl.indeed.com</div>
<script>window._cf_chl_opt={cvId:'3'};</script></body></html>"#;

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        request_timeout_secs: 5,
        pass_timeout_secs: 20,
        worker_pool_size: 2,
        ..PipelineConfig::default()
    }
}

pub fn runner_with(store: Arc<MemoryStore>, config: PipelineConfig) -> Arc<SourceRunner> {
    let chain = FetchChain::from_config(&config).expect("fetch chain");
    Arc::new(SourceRunner::new(store, chain, Arc::new(config)))
}

pub fn runner(store: Arc<MemoryStore>) -> Arc<SourceRunner> {
    runner_with(store, pipeline_config())
}

/// RSS 2.0 document with one `<item>` per `(guid, title)` pair.
pub fn rss_feed(items: &[(&str, &str)]) -> String {
    let mut feed = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Vacatures</title>"#,
    );
    for (guid, title) in items {
        feed.push_str(&format!(
            "<item><guid>{guid}</guid><title>{title}</title>\
             <link>https://jobs.example.org/vacature/{guid}</link>\
             <description>Full-time role in Utrecht. Salary €3.000 - €3.800 per month.</description>\
             <pubDate>Mon, 12 Oct 2026 09:00:00 GMT</pubDate></item>"
        ));
    }
    feed.push_str("</channel></rss>");
    feed
}

/// RSS 2.0 document whose items carry neither a guid nor a link.
pub fn rss_feed_without_ids(titles: &[&str]) -> String {
    let mut feed = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Vacatures</title>"#,
    );
    for title in titles {
        feed.push_str(&format!(
            "<item><title>{title}</title>\
             <description>Shifts in Rotterdam. Contact the office to apply.</description></item>"
        ));
    }
    feed.push_str("</channel></rss>");
    feed
}

/// Indeed-style search page; a `None` title renders a card with a company
/// and location but no title or link.
pub fn indeed_page(titles: &[Option<&str>]) -> String {
    let mut page = String::from(r#"<html><body><ul class="jobsearch-ResultsList">"#);
    for (n, title) in titles.iter().enumerate() {
        let card = match title {
            Some(title) => format!(
                r#"<h2 class="jobTitle"><a class="jcs-JobTitle" data-jk="c{n:04}" href="/rc/clk?jk=c{n:04}"><span title="{title}">{title}</span></a></h2>"#
            ),
            None => String::new(),
        };
        page.push_str(&format!(
            r#"<li><div class="job_seen_beacon">{card}<span data-testid="company-name">Northwind</span><div data-testid="text-location">Tilburg</div></div></li>"#
        ));
    }
    page.push_str("</ul></body></html>");
    page
}
