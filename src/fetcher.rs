use crate::config::FetcherConfig;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// One page retrieval request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// CSS selector the renderer waits for before returning HTML.
    pub wait_selector: Option<String>,
    /// Extra request headers (user-agent override, cookie clearing).
    pub headers: Vec<(String, String)>,
    /// Skip the renderer cache so repeated fetches see fresh server state.
    pub bypass_cache: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_selector: None,
            headers: Vec::new(),
            bypass_cache: false,
        }
    }

    pub fn wait_for(mut self, selector: &str) -> Self {
        self.wait_selector = Some(selector.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// URL the navigation actually landed on (after redirects/bridges).
    pub final_url: String,
    pub status: u16,
}

impl FetchedPage {
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single stateful browsing session.
///
/// Exactly one page is in flight at a time; discovery and detail collection
/// share the session through an exclusive borrow, which is what rules out
/// concurrent item fetches.
#[async_trait]
pub trait PageSession: Send {
    async fn fetch(&mut self, request: FetchRequest) -> Result<FetchedPage>;

    /// Trigger one more load step on the most recently fetched page and
    /// return the fresh render. Used by infinite-scroll discovery.
    async fn scroll_more(&mut self) -> Result<FetchedPage>;
}

/// What the rendering service answers with for one render call.
#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
    url: String,
    status: u16,
}

/// `PageSession` backed by a Browserless-style HTML rendering service.
///
/// The service renders the page in a real browser and reports the final URL
/// and upstream status alongside the HTML, so this side stays free of any
/// browser plumbing.
pub struct RenderSession {
    client: reqwest::Client,
    endpoint: String,
    current: Option<FetchRequest>,
    scroll_passes: u32,
}

impl RenderSession {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(ScraperError::Config(
                "fetcher.endpoint is not configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScraperError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            current: None,
            scroll_passes: 0,
        })
    }

    async fn render(&self, request: &FetchRequest, scroll_passes: u32) -> Result<FetchedPage> {
        let mut body = serde_json::json!({ "url": request.url });
        if let Some(selector) = &request.wait_selector {
            body["waitForSelector"] = serde_json::json!({ "selector": selector });
        }
        if scroll_passes > 0 {
            body["scrollPasses"] = serde_json::json!(scroll_passes);
        }
        if request.bypass_cache {
            body["bypassCache"] = serde_json::json!(true);
        }
        if !request.headers.is_empty() {
            let headers: serde_json::Map<String, serde_json::Value> = request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            body["headers"] = serde_json::Value::Object(headers);
        }

        debug!(url = %request.url, scroll_passes, "Rendering page");

        let response = self
            .client
            .post(format!("{}/content", self.endpoint))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(url = %request.url, status = status.as_u16(), "Renderer refused the page");
            return Err(ScraperError::Fetch(format!(
                "renderer returned status {} for {}: {}",
                status.as_u16(),
                request.url,
                message
            )));
        }

        let rendered: RenderResponse = response.json().await?;
        Ok(FetchedPage {
            html: rendered.html,
            final_url: rendered.url,
            status: rendered.status,
        })
    }
}

#[async_trait]
impl PageSession for RenderSession {
    async fn fetch(&mut self, request: FetchRequest) -> Result<FetchedPage> {
        let page = self.render(&request, 0).await?;
        self.current = Some(request);
        self.scroll_passes = 0;
        Ok(page)
    }

    async fn scroll_more(&mut self) -> Result<FetchedPage> {
        let request = self
            .current
            .clone()
            .ok_or_else(|| ScraperError::Fetch("no page in session to scroll".to_string()))?;
        self.scroll_passes += 1;
        self.render(&request, self.scroll_passes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_endpoint_fails_fast() {
        let config = FetcherConfig {
            endpoint: "  ".to_string(),
            timeout_secs: 30,
        };
        assert!(RenderSession::new(&config).is_err());
    }

    #[test]
    fn request_builder_accumulates() {
        let request = FetchRequest::new("https://example.com")
            .wait_for("td.subject")
            .header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .bypass_cache();

        assert_eq!(request.wait_selector.as_deref(), Some("td.subject"));
        assert_eq!(request.headers.len(), 1);
        assert!(request.bypass_cache);
    }
}
