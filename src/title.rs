//! Fetches and announces titles of web pages linked in channels.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::Error;
use crate::http;
use crate::services::TitleFetcher;
use crate::utils::{Truncatable, extract_urls};

/// The maximum number of characters of a title to announce.
const MAX_TITLE_LENGTH: usize = 100;

/// How much of a page is read looking for its title.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Looks up `<title>` of linked pages over HTTP.
pub struct HttpTitleFetcher {
    client: http::Client,
    title_selector: Selector,
    last_title: Mutex<Option<String>>,
}

impl HttpTitleFetcher {
    /// Creates a fetcher with the default HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new() -> Result<Self, Error> {
        Ok(Self::with_client(http::build_client()?))
    }

    /// Creates a fetcher that uses `client`.
    #[must_use]
    pub fn with_client(client: http::Client) -> Self {
        HttpTitleFetcher {
            client,
            title_selector: Selector::parse("title").expect("invalid selector"),
            last_title: Mutex::new(None),
        }
    }

    /// Fetches `url` and returns its title, if it is an HTML page with one.
    ///
    /// Only the first 256 KiB of the page are read.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn fetch_title(&self, url: &Url) -> Result<Option<String>, Error> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("html"));

        if !is_html {
            debug!(%url, "not an html page");

            return Ok(None);
        }

        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await? {
            let remaining = MAX_BODY_BYTES - body.len();

            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(%url, limit = MAX_BODY_BYTES, "page body truncated");
                break;
            }

            body.extend_from_slice(&chunk);
        }

        Ok(self.extract_title(&String::from_utf8_lossy(&body)))
    }

    /// Returns the whitespace-collapsed, truncated `<title>` of `html`.
    #[must_use]
    pub fn extract_title(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let element = document.select(&self.title_selector).next()?;
        let text: String = element.text().collect();
        let title = text.split_whitespace().collect::<Vec<_>>().join(" ");

        (!title.is_empty()).then(|| {
            title
                .truncate_with_suffix(MAX_TITLE_LENGTH, "...")
                .into_owned()
        })
    }

    /// Returns true if `title` differs from the previous announced title, remembering it.
    fn is_new(&self, title: &str) -> bool {
        let mut last = self
            .last_title
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if last.as_deref() == Some(title) {
            return false;
        }

        *last = Some(title.to_string());

        true
    }
}

#[async_trait]
impl TitleFetcher for HttpTitleFetcher {
    async fn fetch_titles(&self, text: &str) -> Result<Vec<String>, Error> {
        let Some(urls) = extract_urls(text) else {
            return Ok(vec![]);
        };
        let mut lines = vec![];

        for url in urls {
            match self.fetch_title(&url).await {
                Ok(Some(title)) if self.is_new(&title) => lines.push(format!("Title: {title}")),
                Ok(_) => {}
                Err(err) => warn!(%url, %err, "could not fetch title"),
            }
        }

        Ok(lines)
    }
}
