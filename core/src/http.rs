//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! The core builds `HttpRequest` values and parses `HttpResponse` values as
//! plain data. Executing the request is the job of a [`Transport`]
//! implementation, so the query-building and XML-decoding halves stay
//! deterministic and can be tested without a server.
//!
//! [`Transport`]: crate::transport::Transport

/// HTTP method for a request. The XML publishing interface accepts the same
/// parameters either in the query string (GET) or as a form body (POST).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An HTTP request described as plain data.
///
/// Built by `FmClient::build_request`. For `Get` the query string is already
/// part of `url`; for `Post` it travels in `body`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/".to_string(),
            headers: vec![("User-Agent".to_string(), "fmxml".to_string())],
            body: None,
        };
        assert_eq!(req.header("user-agent"), Some("fmxml"));
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn success_range() {
        let mut resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(resp.is_success());
        resp.status = 302;
        assert!(!resp.is_success());
        resp.status = 500;
        assert!(!resp.is_success());
    }
}
