use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub season: u16,
    pub pfr_base_url: String,
    pub nfl_base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            season: 2024,
            pfr_base_url: "https://www.pro-football-reference.com".to_string(),
            nfl_base_url: "https://www.nfl.com".to_string(),
        }
    }
}

impl SourceConfig {
    /// Season schedule page listing every game with its box score link.
    pub fn schedule_url(&self) -> String {
        format!("{}/years/{}/games.htm", self.pfr_base_url, self.season)
    }

    /// Season summary page carrying the team drive averages.
    pub fn season_url(&self) -> String {
        format!("{}/years/{}/", self.pfr_base_url, self.season)
    }

    pub fn pfr_url(&self, path: &str) -> String {
        format!("{}{}", self.pfr_base_url, path)
    }

    pub fn nfl_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.nfl_base_url,
            path.replace("{season}", &self.season.to_string())
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        // pro-football-reference blocks clients above 20 requests a minute
        Self {
            requests_per_minute: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.5938.88 Safari/537.36".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Falls back to the Chrome/Chromium found on PATH when unset.
    pub chrome_executable: Option<PathBuf>,
    pub render_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            render_timeout_secs: 10,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperConfig {
    pub sources: SourceConfig,
    pub rate_limits: RateLimits,
    pub scraping: ScrapingConfig,
    pub browser: BrowserSettings,
    pub output: OutputConfig,
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(season) = parse_var::<u16>("NFL_SEASON") {
            config.sources.season = season;
        }
        if let Ok(url) = env::var("PFR_BASE_URL") {
            config.sources.pfr_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = env::var("NFL_BASE_URL") {
            config.sources.nfl_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(rpm) = parse_var::<u32>("RATE_LIMIT_RPM") {
            config.rate_limits.requests_per_minute = rpm;
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.scraping.user_agent = user_agent;
        }
        if let Some(timeout) = parse_var::<u64>("SCRAPER_TIMEOUT_SECS") {
            config.scraping.request_timeout_secs = timeout;
        }
        if let Ok(path) = env::var("CHROME_EXECUTABLE") {
            config.browser.chrome_executable = Some(PathBuf::from(path));
        }
        if let Some(timeout) = parse_var::<u64>("RENDER_TIMEOUT_SECS") {
            config.browser.render_timeout_secs = timeout;
        }
        if let Ok(dir) = env::var("OUTPUT_DIR") {
            config.output.dir = PathBuf::from(dir);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, keeping default", name, value);
            None
        }
    }
}
