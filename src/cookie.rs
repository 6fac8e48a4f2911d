//! Session cookie storage and cookie source normalization

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use log::debug;
use reqwest::cookie::CookieStore;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::utils::StringUtils;

/// Name/value cookie set shared by every request issued through a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Plain name/value view of the jar
    pub fn to_map(&self) -> HashMap<String, String> {
        self.cookies
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Right-biased union: incoming values replace existing ones on name collision.
    pub fn merged(&self, incoming: HashMap<String, String>) -> CookieJar {
        let mut cookies = self.cookies.clone();
        cookies.extend(incoming);
        CookieJar { cookies }
    }

    /// Render as a `Cookie` request header value
    pub fn to_header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl FromIterator<(String, String)> for CookieJar {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        CookieJar {
            cookies: iter.into_iter().collect(),
        }
    }
}

/// A cookie learned from a `Set-Cookie` response header, scoped to the
/// domain and path it was set for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScopedCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires: Option<Instant>,
}

impl ScopedCookie {
    /// Parse a `Set-Cookie` value received from `url`.
    ///
    /// Returns `None` for malformed values and for a `Domain` the request
    /// host does not belong to.
    fn parse(header: &str, url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = ScopedCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: host.clone(),
            host_only: true,
            path: default_path(url),
            secure: false,
            expires: None,
        };

        for part in parts {
            let (attr, val) = match part.split_once('=') {
                Some((attr, val)) => (attr.trim(), val.trim()),
                None => (part.trim(), ""),
            };
            match attr.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(&host, &domain) {
                        debug!("Rejecting cookie '{}' for foreign domain '{}'", name, domain);
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "max-age" => {
                    if let Ok(seconds) = val.parse::<i64>() {
                        let now = Instant::now();
                        cookie.expires = match u64::try_from(seconds) {
                            Ok(seconds) if seconds > 0 => {
                                now.checked_add(Duration::from_secs(seconds))
                            }
                            _ => Some(now),
                        };
                    }
                }
                "secure" => cookie.secure = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Instant::now())
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };
        domain_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired()
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Directory of the request path, `/` for top-level resources
fn default_path(url: &Url) -> String {
    match url.path().rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(end) => url.path()[..end].to_string(),
    }
}

#[derive(Debug, Default)]
struct CookieState {
    injected: CookieJar,
    scoped: Vec<ScopedCookie>,
}

/// Cookie state of a session, shared with the transport.
///
/// Cookies added by the caller are sent to every host. Cookies learned from
/// responses, including redirect hops, are only sent back to URLs matching
/// their domain and path. An injected cookie shadows a learned one of the
/// same name until a response sets that name again.
#[derive(Debug, Default)]
pub struct SessionCookies {
    state: RwLock<CookieState>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CookieState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CookieState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cookies added by the caller
    pub fn injected(&self) -> CookieJar {
        self.read().injected.clone()
    }

    /// Replace the caller-supplied cookies
    pub fn replace_injected(&self, jar: CookieJar) {
        self.write().injected = jar;
    }

    /// Every live cookie by name, learned ones overlaid by injected ones
    pub fn snapshot(&self) -> CookieJar {
        let state = self.read();
        let mut jar: CookieJar = state
            .scoped
            .iter()
            .filter(|cookie| !cookie.is_expired())
            .map(|cookie| (cookie.name.clone(), cookie.value.clone()))
            .collect();
        for (name, value) in state.injected.iter() {
            jar.set(name, value);
        }
        jar
    }

    /// Cookies that apply to `url`, in request header order
    pub fn for_url(&self, url: &Url) -> CookieJar {
        let state = self.read();
        let mut jar: CookieJar = state
            .scoped
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| (cookie.name.clone(), cookie.value.clone()))
            .collect();
        for (name, value) in state.injected.iter() {
            jar.set(name, value);
        }
        jar
    }

    /// Record a `Set-Cookie` value received from `url`.
    pub fn store_response_cookie(&self, header: &str, url: &Url) {
        let Some(cookie) = ScopedCookie::parse(header, url) else {
            return;
        };
        debug!("Storing cookie '{}' for {}{}", cookie.name, cookie.domain, cookie.path);

        let mut state = self.write();
        state.injected.remove(&cookie.name);
        state.scoped.retain(|existing| {
            !(existing.name == cookie.name
                && existing.domain == cookie.domain
                && existing.path == cookie.path)
        });
        if !cookie.is_expired() {
            state.scoped.push(cookie);
        }
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers.filter_map(|value| value.to_str().ok()) {
            self.store_response_cookie(header, url);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let jar = self.for_url(url);
        if jar.is_empty() {
            return None;
        }
        HeaderValue::from_str(&jar.to_header_value()).ok()
    }
}

/// An object that can expose its cookies as a name/value map.
///
/// Returning `None` means no usable mapping could be extracted.
pub trait CookieCollection {
    fn cookie_map(&self) -> Option<HashMap<String, String>>;
}

impl CookieCollection for CookieJar {
    fn cookie_map(&self) -> Option<HashMap<String, String>> {
        Some(self.to_map())
    }
}

/// Reads the `Set-Cookie` entries of a response header map.
impl CookieCollection for HeaderMap {
    fn cookie_map(&self) -> Option<HashMap<String, String>> {
        let cookies: HashMap<String, String> = set_cookie_pairs(self).collect();
        if cookies.is_empty() {
            None
        } else {
            Some(cookies)
        }
    }
}

fn set_cookie_pairs(headers: &HeaderMap) -> impl Iterator<Item = (String, String)> + '_ {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            let first = value.split(';').next()?.trim();
            let (name, value) = first.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
}

/// The shapes a cookie source may take when authenticating a session
pub enum CookieSource<'a> {
    /// `key1=value1; key2=value2`
    Raw(String),
    Map(HashMap<String, String>),
    Collection(&'a dyn CookieCollection),
}

impl CookieSource<'_> {
    /// Normalize the source into a plain name/value map.
    pub fn into_map(self) -> Result<HashMap<String, String>> {
        match self {
            CookieSource::Raw(raw) => Ok(StringUtils::parse_pairs(&raw, "; ")?
                .into_iter()
                .collect()),
            CookieSource::Map(map) => Ok(map),
            CookieSource::Collection(collection) => collection
                .cookie_map()
                .ok_or_else(|| ScrapeError::invalid("Unable to parse 'cookie'.")),
        }
    }
}

impl From<&str> for CookieSource<'_> {
    fn from(raw: &str) -> Self {
        CookieSource::Raw(raw.to_string())
    }
}

impl From<String> for CookieSource<'_> {
    fn from(raw: String) -> Self {
        CookieSource::Raw(raw)
    }
}

impl From<HashMap<String, String>> for CookieSource<'_> {
    fn from(map: HashMap<String, String>) -> Self {
        CookieSource::Map(map)
    }
}

impl<'a> From<&'a CookieJar> for CookieSource<'a> {
    fn from(jar: &'a CookieJar) -> Self {
        CookieSource::Collection(jar)
    }
}

impl<'a> From<&'a HeaderMap> for CookieSource<'a> {
    fn from(headers: &'a HeaderMap) -> Self {
        CookieSource::Collection(headers)
    }
}
