//! HTTP client module
//!
//! [`Client`] is the entry point of the request chain: it owns the shared
//! [`Session`] and hands out either an [`AuthStage`] or a [`RequestBuilder`].

use std::collections::HashMap;
use std::rc::Rc;

use url::Url;

use crate::config::{ClientConfig, HttpMethod};
use crate::error::{Result, ScrapeError};
use crate::session::Session;
use crate::utils::UrlUtils;

pub mod auth;
pub mod request;
pub mod response;

pub use auth::AuthStage;
pub use request::{ParamSource, ParamValue, RequestBuilder, RequestView};
pub use response::{RegexMatch, RegexSource, Response, Selection};

/// Scraping client anchoring one shared session
#[derive(Debug, Clone)]
pub struct Client {
    session: Rc<Session>,
}

impl Client {
    /// Create a client with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            session: Rc::new(Session::new(&config)?),
        })
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// Start an authenticated chain against `url` with `method`.
    ///
    /// `headers` are merged into the session defaults, so every later request
    /// from this client sends them too.
    pub fn auth(
        &self,
        url: &str,
        method: &str,
        headers: Option<HashMap<String, String>>,
    ) -> Result<AuthStage> {
        let (url, method) = validate_target(url, method)?;
        if let Some(headers) = headers {
            self.session.extend_default_headers(headers);
        }
        Ok(AuthStage::new(Rc::clone(&self.session), url, method))
    }

    /// Skip authentication and go straight to building a request.
    pub fn no_auth(&self, url: &str, method: &str) -> Result<RequestBuilder> {
        let (url, method) = validate_target(url, method)?;
        Ok(RequestBuilder::new(Rc::clone(&self.session), url, method))
    }
}

fn validate_target(url: &str, method: &str) -> Result<(Url, HttpMethod)> {
    if url.trim().is_empty() || method.trim().is_empty() {
        return Err(ScrapeError::invalid(
            "You must supply both 'url' and 'method' parameters.",
        ));
    }
    Ok((UrlUtils::validate_url(url)?, method.parse()?))
}
