// Webshare search API client
// POST form requests, XML responses: <response><status>OK</status><total>N</total><file>...</file></response>

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;

use super::catalog::{SearchPage, SearchQuery, SearchSource};
use crate::config::WebshareConfig;
use crate::models::RawFile;

pub const WEBSHARE_API_BASE: &str = "https://webshare.cz/api";
pub const MAX_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum WebshareError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webshare returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid XML response: {0}")]
    Xml(String),

    #[error("Webshare API error: {message} ({})", .code.as_deref().unwrap_or("no code"))]
    Api {
        message: String,
        code: Option<String>,
    },
}

/// Webshare API client
pub struct WebshareClient {
    client: Client,
    base_url: String,
    category: String,
}

impl WebshareClient {
    pub fn new(config: &WebshareConfig) -> Result<Self, WebshareError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            category: config.category.clone(),
        })
    }

    async fn post(&self, endpoint: &str, form: &[(&str, String)]) -> Result<String, WebshareError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("Accept", "text/xml; charset=UTF-8")
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WebshareError::Status(response.status()));
        }

        Ok(response.text().await?)
    }

    /// Search files. `limit` is clamped to 1..=100.
    pub async fn search_files(&self, query: &SearchQuery) -> Result<SearchPage, WebshareError> {
        let limit = query.limit.clamp(1, MAX_SEARCH_LIMIT);
        let mut form = vec![
            ("what", query.what.clone()),
            ("category", self.category.clone()),
            ("limit", limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(sort) = query.sort {
            form.push(("sort", sort.as_str().to_string()));
        }

        tracing::debug!(
            "Webshare search: what='{}' offset={} limit={}",
            query.what,
            query.offset,
            limit
        );

        let body = self.post("/search/", &form).await?;
        parse_search_response(&body)
    }
}

#[async_trait]
impl SearchSource for WebshareClient {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<SearchPage> {
        Ok(self.search_files(query).await?)
    }
}

/// Parse a `/search/` response body into total count and raw file records.
pub fn parse_search_response(xml: &str) -> Result<SearchPage, WebshareError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut status: Option<String> = None;
    let mut code: Option<String> = None;
    let mut message: Option<String> = None;
    let mut total: Option<String> = None;
    let mut files = Vec::new();

    let mut current_file: Option<RawFile> = None;
    let mut current_tag: Option<String> = None;

    loop {
        let text = match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "file" {
                    current_file = Some(RawFile::default());
                } else {
                    current_tag = Some(name);
                }
                continue;
            }
            Ok(Event::Text(e)) => e
                .unescape()
                .map_err(|err| WebshareError::Xml(err.to_string()))?
                .into_owned(),
            Ok(Event::CData(e)) => String::from_utf8_lossy(&e.into_inner()).into_owned(),
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"file" {
                    if let Some(file) = current_file.take() {
                        files.push(file);
                    }
                }
                current_tag = None;
                continue;
            }
            // <tag/> carries no value
            Ok(Event::Empty(_)) => continue,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(WebshareError::Xml(format!(
                    "at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => continue,
        };

        match (current_file.as_mut(), current_tag.as_deref()) {
            (Some(file), Some(tag)) => file.set(tag, text),
            (None, Some("status")) => status = Some(text),
            (None, Some("code")) => code = Some(text),
            (None, Some("message")) => message = Some(text),
            (None, Some("total")) => total = Some(text),
            _ => {}
        }
    }

    match status.as_deref() {
        Some("OK") => {}
        None if files.is_empty() && total.is_none() => {
            return Err(WebshareError::Xml("missing <status> element".to_string()))
        }
        other => {
            return Err(WebshareError::Api {
                message: message
                    .or_else(|| other.map(str::to_string))
                    .unwrap_or_else(|| "Unknown error".to_string()),
                code,
            })
        }
    }

    let total = total
        .as_deref()
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);

    Ok(SearchPage { total, files })
}
