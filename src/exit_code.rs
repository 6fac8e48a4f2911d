use crate::error::ScrapeError;

/// Exit code returned when `--fail` is set and the server answered 4xx/5xx
pub const HTTP_FAILURE: i32 = 22;

pub fn exit_code_for_error(err: &ScrapeError) -> i32 {
    match err {
        ScrapeError::InvalidUrl(_) => 3,
        ScrapeError::Config(_) | ScrapeError::InvalidArgument(_) => 2,
        ScrapeError::HttpStatus { .. } => HTTP_FAILURE,
        ScrapeError::Io(_) => 23,
        ScrapeError::Decode(_) => 26,
        ScrapeError::Http(err) => http_exit_code(err),
    }
}

fn http_exit_code(err: &reqwest::Error) -> i32 {
    if err.is_timeout() {
        return 28;
    }
    if err.is_connect() {
        return 7;
    }
    if err.is_redirect() {
        return 47;
    }
    if err.is_request() {
        return 2;
    }
    43
}
