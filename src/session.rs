//! Shared connection context
//!
//! A [`Session`] is owned by a [`crate::http::Client`] behind an `Rc`; every
//! auth stage, request builder and response created from that client holds a
//! clone of the same handle, so cookie changes made through one chain are seen
//! by all of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use reqwest::{Client as HttpClient, ClientBuilder};
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use url::Url;

use crate::config::ClientConfig;
use crate::cookie::{CookieJar, SessionCookies};
use crate::error::{Result, ScrapeError};
use crate::ssl::SslUtils;

pub struct Session {
    http: HttpClient,
    runtime: Runtime,
    default_headers: RefCell<HashMap<String, String>>,
    cookies: Arc<SessionCookies>,
}

impl Session {
    /// Build the transport and the runtime used to block on it
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let cookies = Arc::new(SessionCookies::new());
        let mut builder = ClientBuilder::new()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(config.max_redirects as usize)
            } else {
                reqwest::redirect::Policy::none()
            });

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        // Configure proxy if specified
        if let Some(proxy_config) = &config.proxy {
            let proxy = reqwest::Proxy::all(&proxy_config.url)
                .map_err(|e| ScrapeError::Config(format!("Invalid proxy: {}", e)))?;

            let proxy = if let (Some(username), Some(password)) =
                (&proxy_config.username, &proxy_config.password)
            {
                proxy.basic_auth(username, password)
            } else {
                proxy
            };

            builder = builder.proxy(proxy);
        }

        // Configure SSL/TLS
        SslUtils::validate_config(&config.ssl)?;
        if !config.ssl.verify_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca_cert) = &config.ssl.ca_cert_file {
            builder = builder.add_root_certificate(SslUtils::load_ca_certificate(ca_cert)?);
        }

        let http = builder.build().map_err(ScrapeError::Http)?;
        let runtime = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ScrapeError::Config(format!("Failed to create async runtime: {}", e)))?;

        Ok(Self {
            http,
            runtime,
            default_headers: RefCell::new(config.default_headers.clone()),
            cookies,
        })
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Run a transport future to completion on the session runtime.
    ///
    /// Panics if called from within another async runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Headers sent with every request
    pub fn default_headers(&self) -> HashMap<String, String> {
        self.default_headers.borrow().clone()
    }

    /// Add to the default headers; existing names are overwritten.
    pub fn extend_default_headers(&self, headers: HashMap<String, String>) {
        if headers.is_empty() {
            return;
        }
        debug!("Adding {} default header(s) to session", headers.len());
        self.default_headers.borrow_mut().extend(headers);
    }

    /// Snapshot of every live cookie, injected and learned from responses
    pub fn cookies(&self) -> CookieJar {
        self.cookies.snapshot()
    }

    /// Cookies that a request to `url` would carry
    pub fn cookies_for(&self, url: &Url) -> CookieJar {
        self.cookies.for_url(url)
    }

    /// Cookies added through [`crate::http::AuthStage::cookie`]
    pub fn injected_cookies(&self) -> CookieJar {
        self.cookies.injected()
    }

    /// Replace the injected cookie set; cookies learned from responses are kept.
    pub fn replace_cookies(&self, jar: CookieJar) {
        debug!("Session cookie set now holds {} injected cookie(s)", jar.len());
        self.cookies.replace_injected(jar);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("default_headers", &self.default_headers.borrow())
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}
