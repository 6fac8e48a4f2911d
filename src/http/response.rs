//! Response wrapper and query helpers

use std::cell::OnceCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::HttpMethod;
use crate::error::{Result, ScrapeError};
use crate::http::request::RequestBuilder;
use crate::session::Session;
use crate::utils::UrlUtils;

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script").expect("Failed to parse script selector - this is a bug")
});

// Permissive: finds bracketed runs of JSON-ish characters and quoted strings.
// Candidates are validated by serde_json afterwards.
static JSON_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:[{\[](?:[,:{}\[\]0-9.\-+Eaeflnr-u \n\r\t]|".*?")+[}\]])"#)
        .expect("Failed to compile JSON candidate pattern - this is a bug")
});

/// Result of [`Response::find_element`]
#[derive(Debug, Clone)]
pub enum Selection<'a> {
    None,
    One(ElementRef<'a>),
    All(Vec<ElementRef<'a>>),
}

impl<'a> Selection<'a> {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::None => true,
            Selection::One(_) => false,
            Selection::All(elements) => elements.is_empty(),
        }
    }

    pub fn into_vec(self) -> Vec<ElementRef<'a>> {
        match self {
            Selection::None => Vec::new(),
            Selection::One(element) => vec![element],
            Selection::All(elements) => elements,
        }
    }
}

/// A regular expression given either as source text or already compiled
pub enum RegexSource<'a> {
    Text(&'a str),
    Compiled(&'a Regex),
}

impl<'a> From<&'a str> for RegexSource<'a> {
    fn from(pattern: &'a str) -> Self {
        RegexSource::Text(pattern)
    }
}

impl<'a> From<&'a String> for RegexSource<'a> {
    fn from(pattern: &'a String) -> Self {
        RegexSource::Text(pattern)
    }
}

impl<'a> From<&'a Regex> for RegexSource<'a> {
    fn from(regex: &'a Regex) -> Self {
        RegexSource::Compiled(regex)
    }
}

/// One match of [`Response::match_regex`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegexMatch {
    pub matched: String,
    pub start: usize,
    /// Capture groups 1..n; `None` for groups that did not participate
    pub groups: Vec<Option<String>>,
}

/// A completed response and its lazily parsed HTML document
pub struct Response {
    session: Rc<Session>,
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    text: String,
    document: OnceCell<Html>,
}

impl Response {
    pub(crate) fn new(
        session: Rc<Session>,
        url: Url,
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Self {
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let text = decode_body_with_charset(&body, content_type);
        Self {
            session,
            url,
            status,
            headers,
            body,
            text,
            document: OnceCell::new(),
        }
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// Final URL, after redirects
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The body parsed as HTML; parsed on first use
    pub fn document(&self) -> &Html {
        self.document.get_or_init(|| Html::parse_document(&self.text))
    }

    /// Write the raw body to `path`, e.g. to inspect what the server sent.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let path = path.as_ref();
        std::fs::write(path, &self.body)?;
        debug!("Saved {} bytes to {:?}", self.body.len(), path);
        Ok(self)
    }

    /// Every element matching `selector`
    pub fn select(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.document().select(&selector).collect())
    }

    /// First element matching `selector`, or all of them when `return_all` is set.
    pub fn find_element(&self, selector: &str, return_all: bool) -> Result<Selection<'_>> {
        let selector = parse_selector(selector)?;
        let mut matches = self.document().select(&selector);
        if return_all {
            return Ok(Selection::All(matches.collect()));
        }
        Ok(match matches.next() {
            Some(element) => Selection::One(element),
            None => Selection::None,
        })
    }

    pub fn scripts(&self) -> Vec<ElementRef<'_>> {
        self.document().select(&SCRIPT_SELECTOR).collect()
    }

    /// Scripts without a `src` attribute
    pub fn inline_scripts(&self) -> Vec<ElementRef<'_>> {
        self.scripts()
            .into_iter()
            .filter(|script| script.value().attr("src").is_none())
            .collect()
    }

    /// Scripts loaded through a `src` attribute
    pub fn external_scripts(&self) -> Vec<ElementRef<'_>> {
        self.scripts()
            .into_iter()
            .filter(|script| script.value().attr("src").is_some())
            .collect()
    }

    /// A GET builder for every external script, on the same session.
    /// Relative `src` values resolve against the response URL.
    pub fn external_script_requests(&self) -> Vec<RequestBuilder> {
        self.external_scripts()
            .into_iter()
            .filter_map(|script| script.value().attr("src"))
            .filter_map(|src| match UrlUtils::resolve(&self.url, src) {
                Ok(url) => Some(RequestBuilder::new(
                    Rc::clone(&self.session),
                    url,
                    HttpMethod::Get,
                )),
                Err(e) => {
                    warn!("Skipping script: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Parse every inline `<script type="application/json">` body.
    pub fn application_json(&self) -> Result<Vec<Value>> {
        self.inline_scripts()
            .into_iter()
            .filter(|script| script.value().attr("type") == Some("application/json"))
            .map(|script| serde_json::from_str(&script_text(&script)).map_err(ScrapeError::from))
            .collect()
    }

    /// JSON values found anywhere in inline script text.
    ///
    /// Candidates come from a permissive pattern; those that fail to parse
    /// are skipped. Scripts are scanned one at a time as the iterator advances.
    pub fn json_objects(&self) -> impl Iterator<Item = Value> + '_ {
        self.inline_scripts().into_iter().flat_map(|script| {
            let text = script_text(&script);
            JSON_CANDIDATE
                .find_iter(&text)
                .filter_map(|candidate| serde_json::from_str(candidate.as_str()).ok())
                .collect::<Vec<Value>>()
        })
    }

    /// [`Self::application_json`] when `application_json_only` is set,
    /// otherwise [`Self::json_objects`].
    pub fn find_json_objects(
        &self,
        application_json_only: bool,
    ) -> Result<Box<dyn Iterator<Item = Value> + '_>> {
        if application_json_only {
            Ok(Box::new(self.application_json()?.into_iter()))
        } else {
            Ok(Box::new(self.json_objects()))
        }
    }

    /// All matches of `pattern` in the response text.
    ///
    /// `multiline` makes `^`/`$` match at line boundaries; it only applies to
    /// patterns given as text.
    pub fn match_regex<'a>(
        &self,
        pattern: impl Into<RegexSource<'a>>,
        multiline: bool,
    ) -> Result<Vec<RegexMatch>> {
        let compiled;
        let regex = match pattern.into() {
            RegexSource::Compiled(regex) => regex,
            RegexSource::Text(source) => {
                compiled = RegexBuilder::new(source)
                    .multi_line(multiline)
                    .build()
                    .map_err(|e| ScrapeError::invalid(format!("Invalid regex: {}", e)))?;
                &compiled
            }
        };

        Ok(regex
            .captures_iter(&self.text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                Some(RegexMatch {
                    matched: whole.as_str().to_string(),
                    start: whole.start(),
                    groups: captures
                        .iter()
                        .skip(1)
                        .map(|group| group.map(|g| g.as_str().to_string()))
                        .collect(),
                })
            })
            .collect())
    }

    /// The whole body as JSON
    pub fn to_json(&self) -> Result<Value> {
        self.json()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text)?)
    }

    /// True for 4xx and 5xx statuses
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    pub fn error_for_status(&self) -> Result<&Self> {
        if self.is_error() {
            return Err(self.status_error());
        }
        Ok(self)
    }

    /// Call `callback` with the session, this response and the status error
    /// when the status is 4xx or 5xx. The callback's return value is dropped.
    pub fn on_http_error<F, R>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Session, &Response, &ScrapeError) -> R,
    {
        if self.is_error() {
            let error = self.status_error();
            debug!("Handling {}", error);
            let _ = callback(&*self.session, self, &error);
        }
        self
    }

    fn status_error(&self) -> ScrapeError {
        ScrapeError::HttpStatus {
            status: self.status,
            url: self.url.to_string(),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::invalid(format!("Invalid CSS selector '{}': {}", selector, e)))
}

fn script_text(script: &ElementRef<'_>) -> String {
    script.text().collect()
}

/// Charset named in a `Content-Type` value, lowercased
pub(crate) fn extract_charset(content_type: Option<&str>) -> Option<String> {
    content_type?.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Decode `body` with the declared charset, falling back to UTF-8.
pub(crate) fn decode_body_with_charset(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = extract_charset(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}
