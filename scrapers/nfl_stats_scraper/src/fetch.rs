use anyhow::{anyhow, Context, Result};
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    Page,
};
use futures::StreamExt;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::ScraperConfig,
    metrics::{FetchKind, MetricsCollector},
};

/// Source of page markup.
#[allow(async_fn_in_trait)]
pub trait HtmlFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String>;

    /// Markup after client-side rendering, once `ready_selector` matches.
    /// Fetchers without a browser return the served markup.
    async fn fetch_rendered(&self, url: &str, _ready_selector: &str) -> Result<String> {
        self.fetch_html(url).await
    }
}

/// Per-minute request budget shared by every fetcher of a run, so HTTP and
/// browser requests to the same site count against one quota.
#[derive(Clone)]
pub struct RequestPacer {
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    metrics: MetricsCollector,
}

impl RequestPacer {
    pub fn new(config: &ScraperConfig, metrics: MetricsCollector) -> Result<Self> {
        // No burst, so the per-minute budget holds over any window
        let quota = Quota::per_minute(
            NonZeroU32::new(config.rate_limits.requests_per_minute)
                .ok_or_else(|| anyhow!("Invalid requests_per_minute value"))?,
        )
        .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            metrics,
        })
    }

    /// Waits for the next request slot and records the time spent waiting.
    pub async fn until_ready(&self) {
        let wait_start = Instant::now();
        self.rate_limiter.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

/// Plain HTTP GET, rate limited per minute.
pub struct HttpFetcher {
    client: reqwest::Client,
    pacer: RequestPacer,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig, pacer: RequestPacer) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.scraping.user_agent)
            .timeout(Duration::from_secs(config.scraping.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, pacer })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Bad response from {}", url))?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }
}

impl HtmlFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.pacer.until_ready().await;

        debug!("GET {}", url);
        let tracker = self.pacer.metrics().record_request_start(FetchKind::Http);
        match self.get(url).await {
            Ok(body) => {
                tracker.succeed();
                Ok(body)
            }
            Err(e) => {
                tracker.fail(format!("{:#}", e));
                Err(e)
            }
        }
    }
}

/// Headless Chrome session. Owns the browser process until `shutdown`.
pub struct BrowserFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    render_timeout: Duration,
    poll_interval: Duration,
    pacer: RequestPacer,
}

impl BrowserFetcher {
    pub async fn launch(config: &ScraperConfig, pacer: RequestPacer) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--ignore-certificate-errors")
            .arg(format!("--user-agent={}", config.scraping.user_agent));
        if let Some(path) = &config.browser.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch headless Chrome")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
        });
        info!("Headless browser started");

        Ok(Self {
            browser,
            handler,
            render_timeout: Duration::from_secs(config.browser.render_timeout_secs),
            poll_interval: Duration::from_millis(config.browser.poll_interval_ms),
            pacer,
        })
    }

    /// Polls until `selector` matches or the render timeout passes.
    async fn wait_for(&self, page: &Page, selector: &str) -> bool {
        let deadline = Instant::now() + self.render_timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn render(&self, url: &str, ready_selector: &str) -> Result<String> {
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;

        let started = Instant::now();
        if self.wait_for(&page, ready_selector).await {
            debug!("'{}' ready on {} after {:?}", ready_selector, url, started.elapsed());
        } else {
            // The locator still reports which tables are missing
            warn!(
                "'{}' did not appear on {} within {:?}, extracting what rendered",
                ready_selector, url, self.render_timeout
            );
        }

        let html = page
            .content()
            .await
            .with_context(|| format!("Failed to read rendered markup of {}", url));
        if let Err(e) = page.close().await {
            debug!("Failed to close page {}: {}", url, e);
        }
        html
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("Failed to close headless browser")?;
        self.browser
            .wait()
            .await
            .context("Headless browser did not exit")?;
        self.handler.abort();
        info!("Headless browser stopped");
        Ok(())
    }
}

impl HtmlFetcher for BrowserFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.fetch_rendered(url, "body").await
    }

    async fn fetch_rendered(&self, url: &str, ready_selector: &str) -> Result<String> {
        self.pacer.until_ready().await;

        debug!("Rendering {}", url);
        let tracker = self.pacer.metrics().record_request_start(FetchKind::Rendered);
        match self.render(url, ready_selector).await {
            Ok(html) => {
                tracker.succeed();
                Ok(html)
            }
            Err(e) => {
                tracker.fail(format!("{:#}", e));
                Err(e)
            }
        }
    }
}

/// HTTP for plain pages, plus an optional browser for pages that render
/// client side. Without a browser every page comes over HTTP.
pub struct PageFetcher {
    http: HttpFetcher,
    browser: Option<BrowserFetcher>,
}

impl PageFetcher {
    pub fn new(http: HttpFetcher, browser: Option<BrowserFetcher>) -> Self {
        Self { http, browser }
    }

    pub async fn shutdown(self) -> Result<()> {
        match self.browser {
            Some(browser) => browser.shutdown().await,
            None => Ok(()),
        }
    }
}

impl HtmlFetcher for PageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.http.fetch_html(url).await
    }

    async fn fetch_rendered(&self, url: &str, ready_selector: &str) -> Result<String> {
        match &self.browser {
            Some(browser) => browser.fetch_rendered(url, ready_selector).await,
            None => self.http.fetch_html(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paced_config(requests_per_minute: u32) -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.rate_limits.requests_per_minute = requests_per_minute;
        config
    }

    fn fetcher(metrics: &MetricsCollector) -> HttpFetcher {
        // Keep the limiter out of the way in tests
        let config = paced_config(6000);
        let pacer = RequestPacer::new(&config, metrics.clone()).unwrap();
        HttpFetcher::new(&config, pacer).unwrap()
    }

    #[tokio::test]
    async fn test_http_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/years/2024/games.htm")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<table id=\"games\"></table>")
            .create_async()
            .await;

        let metrics = MetricsCollector::new();
        let body = fetcher(&metrics)
            .fetch_html(&format!("{}/years/2024/games.htm", server.url()))
            .await
            .unwrap();

        assert_eq!(body, "<table id=\"games\"></table>");
        mock.assert_async().await;
        assert_eq!(metrics.get_metrics().successful_requests, 1);
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let metrics = MetricsCollector::new();
        let result = fetcher(&metrics)
            .fetch_html(&format!("{}/missing", server.url()))
            .await;

        assert!(result.is_err());
        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.failed_requests, 1);
        assert!(snapshot.last_error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_rendered_falls_back_to_http_without_browser() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/years/2024/")
            .with_status(200)
            .with_body("<table id=\"drives\"></table>")
            .create_async()
            .await;

        let metrics = MetricsCollector::new();
        let pages = PageFetcher::new(fetcher(&metrics), None);
        let body = pages
            .fetch_rendered(&format!("{}/years/2024/", server.url()), "table#drives")
            .await
            .unwrap();

        assert!(body.contains("drives"));
        assert_eq!(metrics.get_metrics().rendered_pages, 0);
        pages.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rendered_fetch_shares_request_budget() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/years/2024/games.htm")
            .with_status(200)
            .with_body("<table id=\"games\"></table>")
            .create_async()
            .await;
        server
            .mock("GET", "/years/2024/")
            .with_status(200)
            .with_body("<table id=\"drives\"></table>")
            .create_async()
            .await;

        // One request every 100ms
        let config = paced_config(600);
        let metrics = MetricsCollector::new();
        let pacer = RequestPacer::new(&config, metrics.clone()).unwrap();
        let schedule = HttpFetcher::new(&config, pacer.clone()).unwrap();
        let pages = PageFetcher::new(HttpFetcher::new(&config, pacer).unwrap(), None);

        schedule
            .fetch_html(&format!("{}/years/2024/games.htm", server.url()))
            .await
            .unwrap();
        assert!(metrics.get_metrics().rate_limiter_wait_time_ms < 50.0);

        pages
            .fetch_rendered(&format!("{}/years/2024/", server.url()), "table#drives")
            .await
            .unwrap();
        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.successful_requests, 2);
        assert!(
            snapshot.rate_limiter_wait_time_ms >= 50.0,
            "rendered fetch waited {}ms",
            snapshot.rate_limiter_wait_time_ms
        );
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let config = paced_config(0);
        assert!(RequestPacer::new(&config, MetricsCollector::new()).is_err());
    }
}
