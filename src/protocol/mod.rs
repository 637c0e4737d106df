//! RLCP protocol model: urls, status codes, headers and the request/response
//! envelopes exchanged over one socket connection.
//!
//! All entities are immutable after construction; they are built per exchange
//! and discarded after serialization or dispatch.

pub mod codec;

use std::collections::HashMap;
use std::fmt;

use crate::error::BadUrl;
use crate::methods::{Method, RequestBody, ResponseBody};

/// Url scheme prefix every RLCP url starts with.
pub const SCHEME: &str = "rlcp://";

/// Address of an RLCP server, with optional client credentials.
///
/// Textual form: `rlcp://[login:password@]host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    host: String,
    port: String,
    credentials: Option<(String, String)>,
}

impl Url {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Url {
        Url {
            host: host.into(),
            port: port.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(
        host: impl Into<String>,
        port: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Url {
        Url {
            host: host.into(),
            port: port.into(),
            credentials: Some((login.into(), password.into())),
        }
    }

    /// Parses the textual form. The scheme is required; the remainder must
    /// split into either `host:port` or `login:password@host:port`.
    pub fn parse(raw: &str) -> Result<Url, BadUrl> {
        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| BadUrl(raw.to_string()))?;
        let parts: Vec<&str> = rest
            .split([':', '@'])
            .filter(|part| !part.is_empty())
            .collect();
        match parts.as_slice() {
            [host, port] => Ok(Url::new(*host, *port)),
            [login, password, host, port] => {
                Ok(Url::with_credentials(*host, *port, *login, *password))
            }
            _ => Err(BadUrl(raw.to_string())),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn login(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(login, _)| login.as_str())
    }

    pub fn password(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(_, password)| password.as_str())
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some((login, password)) => {
                write!(f, "{SCHEME}{login}:{password}@{}:{}", self.host, self.port)
            }
            None => write!(f, "{SCHEME}{}:{}", self.host, self.port),
        }
    }
}

/// Return codes of an RLCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    Moved,
    IncorrectRequest,
    IncorrectReference,
    AuthFailed,
    UnsupportedMethod,
    MissingHeader,
    MissingHeaderValue,
    Unavailable,
    NotImplementedMethod,
}

impl StatusCode {
    pub const ALL: [StatusCode; 10] = [
        StatusCode::Success,
        StatusCode::Moved,
        StatusCode::IncorrectRequest,
        StatusCode::IncorrectReference,
        StatusCode::AuthFailed,
        StatusCode::UnsupportedMethod,
        StatusCode::MissingHeader,
        StatusCode::MissingHeaderValue,
        StatusCode::Unavailable,
        StatusCode::NotImplementedMethod,
    ];

    pub fn code(self) -> u16 {
        match self {
            StatusCode::Success => 200,
            StatusCode::Moved => 300,
            StatusCode::IncorrectRequest => 400,
            StatusCode::IncorrectReference => 401,
            StatusCode::AuthFailed => 402,
            StatusCode::UnsupportedMethod => 403,
            StatusCode::MissingHeader => 404,
            StatusCode::MissingHeaderValue => 405,
            StatusCode::Unavailable => 500,
            StatusCode::NotImplementedMethod => 501,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Success => "Request is successfully processed and response contains result",
            StatusCode::Moved => "Requested resource is temporary moved",
            StatusCode::IncorrectRequest => "Incorrect Request",
            StatusCode::IncorrectReference => "Incorrect reference sets",
            StatusCode::AuthFailed => "Authentication failed",
            StatusCode::UnsupportedMethod => "Unsupported method",
            StatusCode::MissingHeader => "Absence of necessary header field",
            StatusCode::MissingHeaderValue => "Absence of necessary header value",
            StatusCode::Unavailable => "Resource is temporary unavailable",
            StatusCode::NotImplementedMethod => "Method is not supported by this server",
        }
    }

    pub fn from_code(code: u16) -> Option<StatusCode> {
        StatusCode::ALL.iter().copied().find(|c| c.code() == code)
    }
}

/// Header of an RLCP request: method, server url, body length and any
/// further named fields (unordered, last write wins).
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub method: Method,
    pub url: Url,
    pub content_length: usize,
    pub fields: HashMap<String, String>,
}

impl RequestHeader {
    pub fn new(method: Method, url: Url, content_length: usize) -> RequestHeader {
        RequestHeader {
            method,
            url,
            content_length,
            fields: HashMap::new(),
        }
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Header of an RLCP response: status code, optional free-text error detail,
/// body length and further named fields.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub code: StatusCode,
    pub error_detail: Option<String>,
    pub content_length: usize,
    pub fields: HashMap<String, String>,
}

impl ResponseHeader {
    /// Success header for a body of the given serialized length.
    pub fn successful(content_length: usize) -> ResponseHeader {
        ResponseHeader {
            code: StatusCode::Success,
            error_detail: None,
            content_length,
            fields: HashMap::new(),
        }
    }

    /// Failure header; the response carries no body.
    pub fn failed(code: StatusCode, detail: impl Into<String>) -> ResponseHeader {
        ResponseHeader {
            code,
            error_detail: Some(detail.into()),
            content_length: 0,
            fields: HashMap::new(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// The error text put on the status line: the code's fixed message,
    /// extended with the free-text detail unless the detail already carries
    /// the message.
    pub fn error_text(&self) -> String {
        match &self.error_detail {
            Some(detail) if detail.contains(self.code.message()) => detail.clone(),
            Some(detail) => format!("{} - {}", self.code.message(), detail),
            None => self.code.message().to_string(),
        }
    }
}

/// One parsed RLCP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub header: RequestHeader,
    pub body: RequestBody,
}

/// One parsed RLCP response. The body is present only on Success.
#[derive(Debug, Clone)]
pub struct Response {
    pub header: ResponseHeader,
    pub body: Option<ResponseBody>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_round_trip_without_credentials() {
        let url = Url::parse("rlcp://host:1234").unwrap();
        assert_eq!(url.host(), "host");
        assert_eq!(url.port(), "1234");
        assert_eq!(url.login(), None);
        assert_eq!(url.password(), None);
        assert_eq!(url.to_string(), "rlcp://host:1234");
    }

    #[test]
    fn test_url_round_trip_with_credentials() {
        let url = Url::parse("rlcp://l:p@host:1234").unwrap();
        assert_eq!(url.host(), "host");
        assert_eq!(url.port(), "1234");
        assert_eq!(url.login(), Some("l"));
        assert_eq!(url.password(), Some("p"));
        assert_eq!(url.to_string(), "rlcp://l:p@host:1234");
    }

    #[test]
    fn test_url_without_scheme_is_rejected() {
        assert!(Url::parse("badraw").is_err());
    }

    #[test]
    fn test_url_without_port_is_rejected() {
        assert!(Url::parse("rlcp://badraw").is_err());
    }

    #[test]
    fn test_url_with_partial_credentials_is_rejected() {
        assert!(Url::parse("rlcp://login@host:1234").is_err());
    }

    #[test]
    fn test_status_code_table() {
        assert_eq!(StatusCode::Success.code(), 200);
        assert_eq!(StatusCode::from_code(402), Some(StatusCode::AuthFailed));
        assert_eq!(StatusCode::from_code(501), Some(StatusCode::NotImplementedMethod));
        assert_eq!(StatusCode::from_code(999), None);
        for code in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(code.code()), Some(code));
        }
    }

    #[test]
    fn test_response_header_error_text() {
        let header = ResponseHeader::failed(StatusCode::AuthFailed, "authorization failed");
        assert!(!header.is_successful());
        assert_eq!(header.error_text(), "Authentication failed - authorization failed");

        // a detail that already carries the fixed message is kept verbatim
        let header = ResponseHeader::failed(
            StatusCode::AuthFailed,
            "Authentication failed - authorization failed",
        );
        assert_eq!(header.error_text(), "Authentication failed - authorization failed");
    }

    #[test]
    fn test_successful_header() {
        let header = ResponseHeader::successful(42);
        assert!(header.is_successful());
        assert_eq!(header.content_length, 42);
        assert_eq!(header.error_text(), StatusCode::Success.message());
    }
}
