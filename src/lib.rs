//! scrapechain - a fluent HTTP scraping helper
//!
//! A [`Client`] owns one shared session (default headers and cookies). From it
//! you either authenticate with cookies or go straight to a
//! [`RequestBuilder`], set query parameters and headers, dispatch, and query
//! the resulting [`Response`] with CSS selectors, regular expressions or JSON
//! helpers.
//!
//! ```no_run
//! use scrapechain::Client;
//!
//! # fn main() -> scrapechain::Result<()> {
//! let client = Client::new()?;
//! let mut request = client
//!     .auth("https://example.com/account", "GET", None)?
//!     .cookie("session=abc123; theme=dark")?;
//! request
//!     .set_query_param("page", 2)?
//!     .set_custom_headers_from_raw("Accept: text/html\nX-Requested-With: XMLHttpRequest")?;
//!
//! let response = request.dispatch()?;
//! response.on_http_error(|_, _, err| eprintln!("request failed: {}", err));
//! for title in response.select("h2.title")? {
//!     println!("{}", title.text().collect::<String>());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod cookie;
pub mod error;
pub mod exit_code;
pub mod http;
pub mod logging;
pub mod output;
pub mod session;
pub mod ssl;
pub mod utils;

pub use cookie::{CookieCollection, CookieJar, CookieSource, SessionCookies};
pub use error::{Result, ScrapeError};
pub use http::{AuthStage, Client, ParamSource, ParamValue, RequestBuilder, Response};
pub use session::Session;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
