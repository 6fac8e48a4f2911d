//! Request building and dispatch

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde::Serialize;
use url::Url;

use crate::config::HttpMethod;
use crate::error::{Result, ScrapeError};
use crate::http::response::Response;
use crate::session::Session;
use crate::utils::StringUtils;

/// A query parameter or header value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Real(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(value) => f.write_str(value),
            ParamValue::Integer(value) => write!(f, "{}", value),
            ParamValue::Boolean(value) => write!(f, "{}", value),
            ParamValue::Real(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Boolean(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Real(value)
    }
}

impl TryFrom<serde_json::Value> for ParamValue {
    type Error = ScrapeError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::String(text) => Ok(ParamValue::Text(text)),
            Value::Bool(flag) => Ok(ParamValue::Boolean(flag)),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(integer), _) => Ok(ParamValue::Integer(integer)),
                (None, Some(real)) => Ok(ParamValue::Real(real)),
                (None, None) => Err(ScrapeError::invalid(format!(
                    "Unsupported number for 'value': {}",
                    number
                ))),
            },
            other => Err(ScrapeError::invalid(format!(
                "Invalid type for 'value': {}",
                other
            ))),
        }
    }
}

/// Input accepted by the plural setters
#[derive(Debug, Clone)]
pub enum ParamSource {
    Map(Vec<(String, ParamValue)>),
    /// `k1=v1&k2=v2`
    Text(String),
    /// UTF-8 encoded `k1=v1&k2=v2`
    Bytes(Vec<u8>),
    /// A JSON object with scalar values
    Json(serde_json::Value),
}

impl ParamSource {
    fn into_pairs(self) -> Result<Vec<(String, ParamValue)>> {
        match self {
            ParamSource::Map(pairs) => Ok(pairs),
            ParamSource::Text(text) => Self::parse_text(&text),
            ParamSource::Bytes(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| ScrapeError::invalid(format!("Parameters are not UTF-8: {}", e)))?;
                Self::parse_text(&text)
            }
            ParamSource::Json(serde_json::Value::Object(object)) => object
                .into_iter()
                .map(|(key, value)| ParamValue::try_from(value).map(|value| (key, value)))
                .collect(),
            ParamSource::Json(other) => Err(ScrapeError::invalid(format!(
                "Invalid type for 'params': expected a JSON object, got {}",
                other
            ))),
        }
    }

    fn parse_text(text: &str) -> Result<Vec<(String, ParamValue)>> {
        Ok(StringUtils::parse_pairs(text, "&")?
            .into_iter()
            .map(|(key, value)| (key, ParamValue::Text(value)))
            .collect())
    }
}

impl<K, V> From<HashMap<K, V>> for ParamSource
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from(map: HashMap<K, V>) -> Self {
        ParamSource::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V> From<Vec<(K, V)>> for ParamSource
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        ParamSource::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<&str> for ParamSource {
    fn from(text: &str) -> Self {
        ParamSource::Text(text.to_string())
    }
}

impl From<String> for ParamSource {
    fn from(text: String) -> Self {
        ParamSource::Text(text)
    }
}

impl From<&[u8]> for ParamSource {
    fn from(bytes: &[u8]) -> Self {
        ParamSource::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ParamSource {
    fn from(bytes: Vec<u8>) -> Self {
        ParamSource::Bytes(bytes)
    }
}

impl From<serde_json::Value> for ParamSource {
    fn from(value: serde_json::Value) -> Self {
        ParamSource::Json(value)
    }
}

/// Read-only snapshot of a builder's state
#[derive(Debug, Serialize)]
pub struct RequestView<'a> {
    pub method: HttpMethod,
    pub url: &'a Url,
    pub params: &'a HashMap<String, ParamValue>,
    pub custom_headers: &'a HashMap<String, ParamValue>,
    #[serde(skip)]
    pub session: &'a Rc<Session>,
}

/// Accumulates one pending request over a shared session
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    session: Rc<Session>,
    url: Url,
    method: HttpMethod,
    params: HashMap<String, ParamValue>,
    custom_headers: HashMap<String, ParamValue>,
}

impl RequestBuilder {
    pub(crate) fn new(session: Rc<Session>, url: Url, method: HttpMethod) -> Self {
        Self {
            session,
            url,
            method,
            params: HashMap::new(),
            custom_headers: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    pub fn view(&self) -> RequestView<'_> {
        RequestView {
            method: self.method,
            url: &self.url,
            params: &self.params,
            custom_headers: &self.custom_headers,
            session: &self.session,
        }
    }

    pub fn set_query_param(
        &mut self,
        key: &str,
        value: impl Into<ParamValue>,
    ) -> Result<&mut Self> {
        self.params.insert(clean_key(key)?, value.into());
        Ok(self)
    }

    /// Set every parameter in `source`, one key at a time.
    pub fn set_query_params(&mut self, source: impl Into<ParamSource>) -> Result<&mut Self> {
        for (key, value) in source.into().into_pairs()? {
            self.set_query_param(&key, value)?;
        }
        Ok(self)
    }

    pub fn set_custom_header(
        &mut self,
        key: &str,
        value: impl Into<ParamValue>,
    ) -> Result<&mut Self> {
        self.custom_headers.insert(clean_key(key)?, value.into());
        Ok(self)
    }

    pub fn set_custom_headers(&mut self, source: impl Into<ParamSource>) -> Result<&mut Self> {
        for (key, value) in source.into().into_pairs()? {
            self.set_custom_header(&key, value)?;
        }
        Ok(self)
    }

    /// Set headers from a raw dump such as one copied out of browser devtools.
    pub fn set_custom_headers_from_raw(&mut self, raw: &str) -> Result<&mut Self> {
        let headers = StringUtils::parse_raw_headers(raw)?;
        self.set_custom_headers(headers)
    }

    /// Send the request over the shared session and wait for the full body.
    ///
    /// The builder is left untouched, so the same request can be sent again.
    pub fn dispatch(&self) -> Result<Response> {
        let headers = self.build_headers()?;
        let query: Vec<(&str, String)> = self
            .params
            .iter()
            .map(|(key, value)| (key.as_str(), value.to_string()))
            .collect();

        debug!("> {} {}", self.method, self.url);
        for (name, value) in headers.iter() {
            trace!("> {}: {}", name, value.to_str().unwrap_or("<non-utf8>"));
        }

        let request = self
            .session
            .http()
            .request(self.method.into(), self.url.clone())
            .query(&query)
            .headers(headers);

        let (url, status, headers, body) = self.session.block_on(async {
            let response = request.send().await?;
            let url = response.url().clone();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, ScrapeError>((url, status, headers, body))
        })?;

        debug!("< {} {} ({} bytes)", status, url, body.len());

        Ok(Response::new(
            Rc::clone(&self.session),
            url,
            status,
            headers,
            body.to_vec(),
        ))
    }

    /// Session defaults, then custom headers.
    ///
    /// Session cookies are added by the transport on every hop. A custom
    /// `Cookie` header replaces that, so the session cookies for this URL are
    /// appended to it here.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (key, value) in self.session.default_headers() {
            headers.insert(header_name(&key)?, header_value(&key, &value)?);
        }
        for (key, value) in &self.custom_headers {
            headers.insert(header_name(key)?, header_value(key, &value.to_string())?);
        }

        let custom = headers.get(COOKIE).and_then(|v| v.to_str().ok()).map(str::to_string);
        if let Some(existing) = custom {
            let cookies = self.session.cookies_for(&self.url).to_header_value();
            if !cookies.is_empty() {
                let cookie_header = format!("{}; {}", existing, cookies);
                headers.insert(COOKIE, header_value("Cookie", &cookie_header)?);
            }
        }
        Ok(headers)
    }
}

fn clean_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ScrapeError::invalid("Invalid value for 'key': empty key"));
    }
    Ok(key.to_string())
}

fn header_name(key: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(key.as_bytes())
        .map_err(|e| ScrapeError::invalid(format!("Invalid header name '{}': {}", key, e)))
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ScrapeError::invalid(format!("Invalid value for header '{}': {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::{ParamSource, ParamValue};
    use crate::error::ScrapeError;
    use crate::http::{Client, RequestBuilder};
    use reqwest::header::COOKIE;
    use serde_json::json;
    use std::collections::HashMap;

    fn builder(client: &Client) -> RequestBuilder {
        client
            .auth("https://www.site.com", "POST", None)
            .expect("auth stage")
            .cookie("username=bob; login_date=20230810_135603")
            .expect("builder")
    }

    fn expected_params() -> HashMap<String, ParamValue> {
        HashMap::from([
            ("username".to_string(), ParamValue::from("bob")),
            ("hashed_password".to_string(), ParamValue::from(true)),
            ("action".to_string(), ParamValue::from(3)),
            ("salt".to_string(), ParamValue::from(4992.004)),
        ])
    }

    #[test]
    fn params_set_one_by_one() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_query_param("username", "bob")
            .and_then(|r| r.set_query_param("hashed_password", true))
            .and_then(|r| r.set_query_param("action", 3))
            .and_then(|r| r.set_query_param("salt", 4992.004))
            .and_then(|r| r.set_custom_header("X-Requested-With", "XMLHttpRequest"))
            .expect("chain");
        assert_eq!(req.view().params, &expected_params());
        assert_eq!(req.view().custom_headers.len(), 1);
    }

    #[test]
    fn params_from_json_object_match_singular_setter() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_query_params(json!({
            "username": "bob",
            "hashed_password": true,
            "action": 3,
            "salt": 4992.004,
        }))
        .expect("params");
        assert_eq!(req.view().params, &expected_params());
    }

    #[test]
    fn params_from_text_and_bytes_agree() {
        let client = Client::new().expect("client");
        let mut from_text = builder(&client);
        from_text.set_query_params("q=rust&page=2& lang =en").expect("text");
        let mut from_bytes = builder(&client);
        from_bytes
            .set_query_params(b"q=rust&page=2& lang =en".as_slice())
            .expect("bytes");
        let mut one_by_one = builder(&client);
        one_by_one
            .set_query_param("q", "rust")
            .and_then(|r| r.set_query_param("page", "2"))
            .and_then(|r| r.set_query_param("lang", "en"))
            .expect("singular");

        assert_eq!(from_text.view().params, one_by_one.view().params);
        assert_eq!(from_bytes.view().params, one_by_one.view().params);
    }

    #[test]
    fn empty_sources_leave_state_empty() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_query_params(HashMap::<String, String>::new())
            .and_then(|r| r.set_custom_headers(json!({})))
            .and_then(|r| r.set_custom_headers_from_raw(""))
            .expect("empty sources");
        assert!(req.view().params.is_empty());
        assert!(req.view().custom_headers.is_empty());
    }

    #[test]
    fn blank_pair_strings_are_rejected() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);

        let err = req.set_query_params("").expect_err("blank params");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req.set_custom_headers("  ").expect_err("blank headers");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));
        assert!(req.view().params.is_empty());
    }

    #[test]
    fn setters_reject_bad_input() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);

        let err = req.set_query_param("   ", "x").expect_err("empty key");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req
            .set_custom_headers(json!({"X-List": [1, 2]}))
            .expect_err("array value");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req
            .set_query_params(json!({"nothing": null}))
            .expect_err("null value");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req.set_query_params(json!([1, 2])).expect_err("array root");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req
            .set_query_params(vec![0xff_u8, 0xfe])
            .expect_err("invalid utf-8");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));

        let err = req.set_query_params("a=1&b").expect_err("missing equals");
        assert!(matches!(err, ScrapeError::InvalidArgument(_)));
    }

    #[test]
    fn keys_are_trimmed() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_custom_header("  X-Custom-Pi ", 3.1415).expect("header");
        assert_eq!(
            req.view().custom_headers.get("X-Custom-Pi"),
            Some(&ParamValue::Real(3.1415))
        );
    }

    #[test]
    fn raw_headers_merge_into_custom_headers() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_custom_header("X-Username", "Ximaz").expect("header");
        req.set_custom_headers_from_raw(":method: GET\nAccept: text/html\n  X-Username: bob")
            .expect("raw");
        let headers = req.view().custom_headers;
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Accept"], ParamValue::from("text/html"));
        assert_eq!(headers["X-Username"], ParamValue::from("bob"));
    }

    #[test]
    fn view_serializes_as_key_value_pairs() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_custom_header("X-Age-Verification", 13)
            .and_then(|r| r.set_query_param("flag", false))
            .expect("setters");
        let view = serde_json::to_value(req.view()).expect("serialize");
        assert_eq!(
            view,
            json!({
                "method": "POST",
                "url": "https://www.site.com/",
                "params": {"flag": false},
                "custom_headers": {"X-Age-Verification": 13},
            })
        );
    }

    #[test]
    fn cookies_join_custom_cookie_header() {
        let client = Client::new().expect("client");
        let mut req = builder(&client);
        req.set_custom_header("Cookie", "tracking=off").expect("header");
        let headers = req.build_headers().expect("headers");
        assert_eq!(
            headers.get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("tracking=off; login_date=20230810_135603; username=bob")
        );
    }

    #[test]
    fn display_renders_wire_values() {
        assert_eq!(ParamValue::from(true).to_string(), "true");
        assert_eq!(ParamValue::from(13).to_string(), "13");
        assert_eq!(ParamValue::from(4992.004).to_string(), "4992.004");
        assert_eq!(ParamValue::from("a b").to_string(), "a b");
        assert!(matches!(
            ParamSource::from("a=1"),
            ParamSource::Text(ref text) if text == "a=1"
        ));
    }
}
