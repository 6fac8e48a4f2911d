//! Output formatting and display utilities

use crate::error::Result;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::io::{self, Write};

/// Writes command results to stdout, or any other writer
pub struct OutputWriter<W: Write> {
    out: W,
    include_headers: bool,
}

impl OutputWriter<io::Stdout> {
    pub fn stdout(include_headers: bool) -> Self {
        Self::new(io::stdout(), include_headers)
    }
}

impl<W: Write> OutputWriter<W> {
    pub fn new(out: W, include_headers: bool) -> Self {
        Self {
            out,
            include_headers,
        }
    }

    /// Write a response body, preceded by its status line and headers when enabled
    pub fn write_body(&mut self, status: StatusCode, headers: &HeaderMap, body: &str) -> Result<()> {
        if self.include_headers {
            self.out
                .write_all(format_response_headers(status, headers).as_bytes())?;
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(body.as_bytes())?;
        if !body.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Write one result per line
    pub fn write_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            writeln!(self.out, "{}", line.as_ref())?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_response_headers(status: StatusCode, headers: &HeaderMap) -> String {
    let mut output = format!(
        "HTTP {} {}\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in headers {
        output.push_str(&format!(
            "{}: {}\n",
            name,
            value.to_str().unwrap_or("<non-utf8>")
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{format_response_headers, OutputWriter};
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;

    #[test]
    fn format_response_headers_includes_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("value"));
        let output = format_response_headers(StatusCode::OK, &headers);
        assert!(output.starts_with("HTTP 200 OK\n"));
        assert!(output.contains("x-test: value\n"));
    }

    #[test]
    fn write_body_optionally_includes_headers() {
        let mut writer = OutputWriter::new(Vec::new(), false);
        writer
            .write_body(StatusCode::OK, &HeaderMap::new(), "hello")
            .expect("write");
        assert_eq!(writer.into_inner(), b"hello\n");

        let mut writer = OutputWriter::new(Vec::new(), true);
        writer
            .write_body(StatusCode::NOT_FOUND, &HeaderMap::new(), "gone\n")
            .expect("write");
        let written = String::from_utf8(writer.into_inner()).expect("utf-8");
        assert_eq!(written, "HTTP 404 Not Found\n\ngone\n");
    }

    #[test]
    fn write_lines_terminates_each_line() {
        let mut writer = OutputWriter::new(Vec::new(), false);
        writer.write_lines(["a", "b"]).expect("write");
        assert_eq!(writer.into_inner(), b"a\nb\n");
    }
}
