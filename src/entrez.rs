use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::KiraError;

const TOOL_NAME: &str = "kira-am";

/// Blocking E-utilities client. Every request is followed by the configured
/// pause, whether it succeeded or not, to stay under NCBI's rate limit.
#[derive(Clone)]
pub struct EntrezClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
    delay: Duration,
}

impl EntrezClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{TOOL_NAME}/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::EntrezHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| KiraError::EntrezHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.eutils_base.clone(),
            email: config.email.clone(),
            api_key: config.api_key.clone(),
            delay: config.delay,
        })
    }

    /// UIDs matching `term` in `db`.
    pub fn esearch(&self, db: &str, term: &str) -> Result<Vec<String>, KiraError> {
        let body = self.get_text("esearch.fcgi", &[("db", db), ("term", term), ("retmode", "json")])?;
        let payload: Value =
            serde_json::from_str(&body).map_err(|err| KiraError::EntrezHttp(err.to_string()))?;
        Ok(payload["esearchresult"]["idlist"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// UIDs in `db` linked from `id` in `dbfrom`, in response order.
    pub fn elink(&self, dbfrom: &str, db: &str, id: &str) -> Result<Vec<String>, KiraError> {
        let body = self.get_text(
            "elink.fcgi",
            &[("dbfrom", dbfrom), ("db", db), ("id", id), ("retmode", "json")],
        )?;
        let payload: Value =
            serde_json::from_str(&body).map_err(|err| KiraError::EntrezHttp(err.to_string()))?;
        Ok(linked_ids(&payload))
    }

    /// Raw XML record(s) for `id`.
    pub fn efetch_xml(&self, db: &str, id: &str) -> Result<String, KiraError> {
        self.get_text("efetch.fcgi", &[("db", db), ("id", id), ("retmode", "xml")])
    }

    fn get_text(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, KiraError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("tool", TOOL_NAME));
        query.push(("email", self.email.as_str()));
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.as_str()));
        }
        let url = build_query_url(&format!("{}/{endpoint}", self.base_url), &query);
        debug!(endpoint, "entrez request");

        let result = self.send_with_retries(&url).and_then(|response| {
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "Entrez request failed".to_string());
                return Err(KiraError::EntrezStatus { status, message });
            }
            response
                .text()
                .map_err(|err| KiraError::EntrezHttp(err.to_string()))
        });
        self.throttle();
        result
    }

    fn throttle(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, KiraError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::EntrezHttp(err.to_string()));
                }
            }
        }
    }
}

fn linked_ids(payload: &Value) -> Vec<String> {
    let mut output = Vec::new();
    if let Some(linksets) = payload["linksets"].as_array() {
        for linkset in linksets {
            if let Some(dbs) = linkset["linksetdbs"].as_array() {
                for db in dbs {
                    if let Some(links) = db["links"].as_array() {
                        for link in links {
                            if let Some(value) = link.as_str() {
                                output.push(value.to_string());
                            } else if let Some(num) = link.as_u64() {
                                output.push(num.to_string());
                            }
                        }
                    }
                }
            }
        }
    }
    output
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub(crate) fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push('?');
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}

/// Text of the first `<tag>...</tag>` element, entities decoded.
pub(crate) fn first_element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    let text = unescape_xml(xml[start..end].trim());
    (!text.is_empty()).then_some(text)
}

pub(crate) fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
