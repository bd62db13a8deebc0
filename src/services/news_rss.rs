//! Google News RSS search.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::http::{MAX_ERROR_BODY, truncate};
use super::{NewsFeed, NewsItem};
use crate::error::ServiceError;

pub const GOOGLE_NEWS_RSS: &str = "https://news.google.com/rss/search";

const USER_AGENT: &str = "prospect-engine/0.1 (news-monitor)";

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item>(.*?)</item>").expect("valid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<link>(.*?)</link>").expect("valid regex"));
static PUB_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pubDate>(.*?)</pubDate>").expect("valid regex"));

pub struct GoogleNewsRss {
    url: String,
    http: reqwest::Client,
}

impl Default for GoogleNewsRss {
    fn default() -> Self {
        Self::with_url(GOOGLE_NEWS_RSS)
    }
}

impl GoogleNewsRss {
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NewsFeed for GoogleNewsRss {
    async fn search(&self, query: &str) -> Result<Vec<NewsItem>, ServiceError> {
        let http_err = |e: reqwest::Error| ServiceError::Http {
            service: "google_news".to_string(),
            reason: e.to_string(),
        };

        let resp = self
            .http
            .get(&self.url)
            .query(&[("q", query), ("hl", "en"), ("gl", "US"), ("ceid", "US:en")])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(http_err)?;
        let status = resp.status();
        let text = resp.text().await.map_err(http_err)?;

        if !status.is_success() {
            return Err(ServiceError::Remote {
                service: "google_news".to_string(),
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }
        Ok(parse_rss(&text))
    }
}

/// Extract `<item>` entries. Malformed feeds yield whatever items are readable.
pub fn parse_rss(xml: &str) -> Vec<NewsItem> {
    ITEM_RE
        .captures_iter(xml)
        .map(|item| {
            let body = &item[1];
            NewsItem {
                title: field(&TITLE_RE, body).unwrap_or_default(),
                link: field(&LINK_RE, body).unwrap_or_default(),
                published: field(&PUB_DATE_RE, body),
            }
        })
        .collect()
}

fn field(re: &Regex, body: &str) -> Option<String> {
    let raw = re.captures(body)?.get(1)?.as_str().trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    let text = unescape(raw);
    if text.is_empty() { None } else { Some(text) }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock_server::{MockResponse, MockServer};

    const FEED: &str = r#"<?xml version="1.0"?>
<rss><channel><title>Search</title>
<item><title>Acme Capital appoints Head of AI &amp; Data</title><link>https://news.example/1</link><pubDate>Mon, 05 Oct 2026 08:00:00 GMT</pubDate></item>
<item><title><![CDATA[Acme backs ML startup]]></title><link>https://news.example/2</link></item>
</channel></rss>"#;

    #[test]
    fn parses_items() {
        let items = parse_rss(FEED);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Acme Capital appoints Head of AI & Data");
        assert_eq!(items[0].published.as_deref(), Some("Mon, 05 Oct 2026 08:00:00 GMT"));
        assert_eq!(items[1].title, "Acme backs ML startup");
        assert!(items[1].published.is_none());
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_rss("not xml at all").is_empty());
    }

    #[tokio::test]
    async fn search_sends_query_and_user_agent() {
        let server = MockServer::start(vec![MockResponse::text(200, FEED)]).await;
        let feed = GoogleNewsRss::with_url(&format!("{}/rss/search", server.base_url()));

        let items = feed.search("\"Acme\" AND AI").await.unwrap();
        assert_eq!(items.len(), 2);

        let request = &server.requests()[0];
        assert!(request.line.starts_with("GET /rss/search?q="));
        assert!(request.headers.to_lowercase().contains("user-agent: prospect-engine"));
    }

    #[tokio::test]
    async fn non_success_is_remote_error() {
        let server = MockServer::start(vec![MockResponse::text(503, "busy")]).await;
        let feed = GoogleNewsRss::with_url(&server.base_url());
        let err = feed.search("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Remote { status: 503, .. }));
    }
}
