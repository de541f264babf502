use crate::{error::FetchError, FetchedPage, PageFetcher, Politeness};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE},
    Client, Url,
};
use std::collections::HashMap;
use texting_robots::Robot;
use tokio::time::Duration;
use tracing::{debug, warn};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
/// Token matched against `User-agent` lines of robots.txt.
const ROBOTS_AGENT: &str = "Mozilla";

const PAGE_TIMEOUT: Duration = Duration::from_secs(25);
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Client shared by page fetches, open-data lookups and robots.txt fetches.
/// Redirects are followed.
pub fn build_client() -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("fr,fr-FR;q=0.9,en;q=0.8"),
    );
    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        debug!("Visit {}", url);
        let response = self.client.get(url).timeout(PAGE_TIMEOUT).send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_lowercase().contains("text/html") {
            return Err(FetchError::NotHtml {
                status,
                content_type,
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Parse {
                    status,
                    message: e.to_string(),
                }
            }
        })?;

        Ok(FetchedPage {
            status,
            final_url,
            body,
        })
    }
}

/// robots.txt rules, fetched once per origin. An origin whose robots.txt is
/// missing or unreachable allows everything.
pub struct RobotsCache {
    client: Client,
    rules: HashMap<String, Option<Robot>>,
}

impl RobotsCache {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            rules: HashMap::new(),
        }
    }

    async fn fetch_rules(&self, origin: &str) -> Option<Robot> {
        let robots_url = format!("{}/robots.txt", origin);
        let response = match self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Cannot fetch {}: {}", robots_url, e);
                return None;
            }
        };
        if response.status().as_u16() >= 400 {
            debug!("No robots.txt at {} ({})", origin, response.status());
            return None;
        }

        let body = response.bytes().await.ok()?;
        match Robot::new(ROBOTS_AGENT, &body) {
            Ok(robot) => Some(robot),
            Err(e) => {
                warn!("Unparseable {}: {}", robots_url, e);
                None
            }
        }
    }

    #[cfg(test)]
    fn seed(&mut self, origin: &str, robots_txt: &str) {
        let robot = Robot::new(ROBOTS_AGENT, robots_txt.as_bytes()).ok();
        self.rules.insert(origin.to_string(), robot);
    }
}

#[async_trait::async_trait]
impl Politeness for RobotsCache {
    async fn is_allowed(&mut self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return true,
        };
        let origin = parsed.origin();
        if !origin.is_tuple() {
            return true;
        }
        let origin = origin.ascii_serialization();

        if !self.rules.contains_key(&origin) {
            let robot = self.fetch_rules(&origin).await;
            self.rules.insert(origin.clone(), robot);
        }

        match self.rules.get(&origin) {
            Some(Some(robot)) => robot.allowed(url),
            _ => true,
        }
    }
}

/// Politeness that never blocks (`--no-robots`).
pub struct AllowAll;

#[async_trait::async_trait]
impl Politeness for AllowAll {
    async fn is_allowed(&mut self, _url: &str) -> bool {
        true
    }
}
