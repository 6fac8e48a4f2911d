//! Cookie authentication stage

use std::rc::Rc;

use log::debug;
use url::Url;

use crate::config::HttpMethod;
use crate::cookie::CookieSource;
use crate::error::Result;
use crate::http::request::RequestBuilder;
use crate::session::Session;

/// Injects cookies into the shared session before a request is built
#[derive(Debug)]
pub struct AuthStage {
    session: Rc<Session>,
    url: Url,
    method: HttpMethod,
}

impl AuthStage {
    pub(crate) fn new(session: Rc<Session>, url: Url, method: HttpMethod) -> Self {
        Self {
            session,
            url,
            method,
        }
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// Merge `source` into the session cookies and return a builder for the
    /// URL and method this stage was created with.
    ///
    /// Accepts a `k=v; k=v` string, a `HashMap<String, String>`, or anything
    /// implementing [`crate::cookie::CookieCollection`]. New values replace
    /// existing cookies with the same name.
    pub fn cookie<'a>(&self, source: impl Into<CookieSource<'a>>) -> Result<RequestBuilder> {
        let incoming = source.into().into_map()?;
        debug!("Merging {} cookie(s) into session", incoming.len());
        let merged = self.session.injected_cookies().merged(incoming);
        self.session.replace_cookies(merged);

        Ok(RequestBuilder::new(
            Rc::clone(&self.session),
            self.url.clone(),
            self.method,
        ))
    }
}
