//! Utility functions and helpers

use crate::error::{Result, ScrapeError};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;


/// URL validation and parsing utilities
pub struct UrlUtils;

impl UrlUtils {
    /// Validate and normalize URL
    pub fn validate_url(input: &str) -> Result<Url> {
        let input = input.trim();
        // Add http:// if no scheme is provided
        let url_str = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{}", input)
        };

        Url::parse(&url_str)
            .map_err(|e| ScrapeError::InvalidUrl(format!("Invalid URL '{}': {}", input, e)))
    }

    /// Resolve a possibly relative reference (e.g. a script `src`) against a base URL
    pub fn resolve(base: &Url, reference: &str) -> Result<Url> {
        base.join(reference.trim()).map_err(|e| {
            ScrapeError::InvalidUrl(format!("Cannot resolve '{}' against {}: {}", reference, base, e))
        })
    }
}

/// File system utilities
pub struct FileUtils;

impl FileUtils {
    /// Expand tilde (~) in file paths
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => Ok(home_dir.join(rest)),
                None => Err(ScrapeError::Config(
                    "Cannot determine home directory".to_string(),
                )),
            }
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

/// String utilities
pub struct StringUtils;

impl StringUtils {
    /// Parse a single `key: value` header as given on the command line
    pub fn parse_header(input: &str) -> Result<(String, String)> {
        match input.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ScrapeError::InvalidArgument(format!(
                "Invalid header format: '{}'. Expected 'key: value'",
                input
            ))),
        }
    }

    /// Parse a raw header dump, such as one copied from browser developer tools.
    ///
    /// Lines break on `\n`, `\r\n` or a bare `\r` and are trimmed; blank lines
    /// and HTTP/2 pseudo-headers (`:method`, `:authority`, ...) are skipped.
    /// Every other line must contain `": "`, and only its first occurrence
    /// separates the key from the value. When a key repeats, the last line wins.
    pub fn parse_raw_headers(raw: &str) -> Result<HashMap<String, String>> {
        let mut headers = HashMap::new();
        for line in raw.split(['\n', '\r']).map(str::trim) {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (key, value) = line.split_once(": ").ok_or_else(|| {
                ScrapeError::InvalidArgument(format!(
                    "Invalid raw header line: '{}'. Expected 'Key: Value'",
                    line
                ))
            })?;
            headers.insert(key.to_string(), value.to_string());
        }
        Ok(headers)
    }

    /// Split `k1=v1<sep>k2=v2` into ordered pairs, splitting each segment on
    /// its first `=`. Blank input is a single segment without `=` and is rejected.
    pub fn parse_pairs(input: &str, separator: &str) -> Result<Vec<(String, String)>> {
        input
            .split(separator)
            .map(|segment| {
                segment
                    .split_once('=')
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .ok_or_else(|| {
                        ScrapeError::InvalidArgument(format!(
                            "Invalid pair '{}'. Expected 'key=value'",
                            segment
                        ))
                    })
            })
            .collect()
    }

    /// Parse timeout values (supports suffixes like 's', 'm', 'h')
    pub fn parse_timeout(input: &str) -> Result<std::time::Duration> {
        if let Ok(seconds) = input.parse::<u64>() {
            return Ok(std::time::Duration::from_secs(seconds));
        }

        let (number_part, suffix) = if let Some(stripped) = input.strip_suffix('s') {
            (stripped, 1)
        } else if let Some(stripped) = input.strip_suffix('m') {
            (stripped, 60)
        } else if let Some(stripped) = input.strip_suffix('h') {
            (stripped, 3600)
        } else {
            return Err(ScrapeError::Config(format!(
                "Invalid timeout format: '{}'. Use number with optional suffix (s/m/h)",
                input
            )));
        };

        let number: u64 = number_part
            .parse()
            .map_err(|_| ScrapeError::Config(format!("Invalid timeout number: '{}'", number_part)))?;

        Ok(std::time::Duration::from_secs(number * suffix))
    }
}
