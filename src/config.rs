use std::time::Duration;

use clap::Parser;

use crate::models::source::ParserKind;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Parser, Debug, Clone)]
#[command(name = "jobharvest", about = "Scheduled job-posting ingestion")]
pub struct Config {
    /// Database connection URL (required by `serve` and `scrape`)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Bearer token required by the admin API (unset = open)
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineConfig,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the scheduler and the admin API (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run one synchronous pass for a source and print the result
    Scrape {
        #[arg(long)]
        source_id: i32,
    },
    /// Print the cron cadence an interval maps to
    SchedulePreview {
        #[arg(long)]
        minutes: u32,
    },
}

impl Config {
    /// The database URL, for commands that open the store.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

/// Settings consumed by the ingestion pipeline.
#[derive(clap::Args, Debug, Clone)]
pub struct PipelineConfig {
    /// Per-strategy request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Hard deadline for a whole pass in seconds
    #[arg(long, env = "PASS_TIMEOUT_SECS", default_value = "300")]
    pub pass_timeout_secs: u64,

    /// Maximum number of passes running at once
    #[arg(long, env = "WORKER_POOL_SIZE", default_value = "4")]
    pub worker_pool_size: usize,

    /// User-Agent sent by the direct and browser strategies
    #[arg(long, env = "USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    #[arg(long, env = "ACCEPT_LANGUAGE", default_value = "en-US,en;q=0.9")]
    pub accept_language: String,

    /// Currency assumed when a salary string names none
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = "EUR")]
    pub default_currency: String,

    /// Rendering proxy endpoint (ScraperAPI-style GET API)
    #[arg(long, env = "RENDER_PROXY_URL")]
    pub render_proxy_url: Option<String>,

    #[arg(long, env = "RENDER_PROXY_API_KEY")]
    pub render_proxy_api_key: Option<String>,

    #[arg(long, env = "RENDER_PROXY_ENABLED", default_value = "true")]
    pub render_proxy_enabled: bool,

    /// WebDriver endpoint driving a headless browser (chromedriver, selenium)
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Settle time after page load in the headless browser, in milliseconds
    #[arg(long, env = "BROWSER_SETTLE_MS", default_value = "3000")]
    pub browser_settle_ms: u64,

    /// How long the headless browser waits out a challenge page, in seconds
    #[arg(long, env = "CHALLENGE_TIMEOUT_SECS", default_value = "20")]
    pub challenge_timeout_secs: u64,

    /// Scheduler reconciliation cadence in seconds
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value = "300")]
    pub reconcile_interval_secs: u64,

    /// Source families deactivated when every strategy hits a bot challenge
    #[arg(
        long,
        env = "FRAGILE_PLATFORMS",
        value_enum,
        value_delimiter = ',',
        default_value = "html-indeed"
    )]
    pub fragile_platforms: Vec<ParserKind>,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    pub fn browser_settle(&self) -> Duration {
        Duration::from_millis(self.browser_settle_ms)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// The rendering proxy is usable only when enabled and fully configured.
    pub fn render_proxy(&self) -> Option<(&str, &str)> {
        if !self.render_proxy_enabled {
            return None;
        }
        match (&self.render_proxy_url, &self.render_proxy_api_key) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Some((url.as_str(), key.as_str()))
            }
            _ => None,
        }
    }

    pub fn is_fragile(&self, parser: ParserKind) -> bool {
        self.fragile_platforms.contains(&parser)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            pass_timeout_secs: 300,
            worker_pool_size: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_currency: "EUR".to_string(),
            render_proxy_url: None,
            render_proxy_api_key: None,
            render_proxy_enabled: true,
            webdriver_url: None,
            browser_settle_ms: 3000,
            challenge_timeout_secs: 20,
            reconcile_interval_secs: 300,
            fragile_platforms: vec![ParserKind::HtmlIndeed],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_style_lists() {
        let config = Config::parse_from([
            "jobharvest",
            "--database-url",
            "postgres://localhost/jobs",
            "--fragile-platforms",
            "html-indeed,html-linkedin",
            "scrape",
            "--source-id",
            "4",
        ]);
        assert!(config.pipeline.is_fragile(ParserKind::HtmlLinkedin));
        assert!(!config.pipeline.is_fragile(ParserKind::Rss));
        assert!(matches!(
            config.resolved_command(),
            Command::Scrape { source_id: 4 }
        ));
    }

    #[test]
    fn schedule_preview_needs_no_database() {
        let config = Config::try_parse_from(["jobharvest", "schedule-preview", "--minutes", "45"])
            .unwrap();
        assert!(matches!(
            config.resolved_command(),
            Command::SchedulePreview { minutes: 45 }
        ));

        let blank = Config::try_parse_from(["jobharvest", "--database-url", " ", "serve"]).unwrap();
        assert_eq!(blank.database_url(), None);
    }

    #[test]
    fn render_proxy_needs_url_and_key() {
        let mut pipeline = PipelineConfig {
            render_proxy_url: Some("https://proxy.test".to_string()),
            ..PipelineConfig::default()
        };
        assert!(pipeline.render_proxy().is_none());

        pipeline.render_proxy_api_key = Some("k".to_string());
        assert!(pipeline.render_proxy().is_some());

        pipeline.render_proxy_enabled = false;
        assert!(pipeline.render_proxy().is_none());
    }
}
