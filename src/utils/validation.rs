//! URL and input validation utilities

use url::Url;

use crate::core::models::{AppError, AppResult};

/// Trim a submitted URL and reject blank input.
///
/// Anything else goes through unchanged: the engine decides what it can
/// extract, including inputs that are not URLs at all (e.g. `ytsearch:`).
pub fn validate_job_url(url: &str) -> AppResult<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidUrl("URL must not be empty".to_string()));
    }
    Ok(url)
}

/// Check if the input is an http(s) URL
pub fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_job_url() {
        assert_eq!(
            validate_job_url("  https://example.com/v1 ").unwrap(),
            "https://example.com/v1"
        );
        assert_eq!(validate_job_url("ytsearch:rust").unwrap(), "ytsearch:rust");
        assert!(matches!(validate_job_url(""), Err(AppError::InvalidUrl(_))));
        assert!(matches!(validate_job_url("   "), Err(AppError::InvalidUrl(_))));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/watch?v=1"));
        assert!(is_http_url("http://example.com"));
        assert!(!is_http_url("ftp://example.com/file"));
        assert!(!is_http_url("not a url"));
    }
}
