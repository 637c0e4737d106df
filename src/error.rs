//! Error taxonomy for the RLCP protocol and server.
//!
//! Codec failures compose bottom-up: a bad url or a missing header field is a
//! [`BadHeader`], a malformed XML body is a [`BadBody`], and both fold into
//! [`BadRequest`] / [`BadResponse`] at the codec surface. None of these ever
//! reach the wire; the connection server converts them into status-coded
//! responses.

use std::time::Duration;

use thiserror::Error;

use crate::xml::XmlError;

/// A string that is not a well-formed `rlcp://` url.
#[derive(Debug, Error)]
#[error("bad rlcp url: {0:?}")]
pub struct BadUrl(pub String);

/// Failures while parsing a request or response header block.
#[derive(Debug, Error)]
pub enum BadHeader {
    #[error("header block is empty")]
    Empty,

    #[error("first header line is not an RLCP method: {0:?}")]
    UnknownMethod(String),

    #[error("missing url header field")]
    MissingUrl,

    #[error("missing content-length header field")]
    MissingContentLength,

    #[error("content-length is not a number: {0:?}")]
    BadContentLength(String),

    #[error("unknown status code: {0:?}")]
    UnknownStatusCode(String),

    #[error(transparent)]
    Url(#[from] BadUrl),
}

/// Failures while parsing an XML body.
#[derive(Debug, Error)]
pub enum BadBody {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("missing {0} element")]
    MissingElement(&'static str),

    #[error("missing {attribute} attribute of {element}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("{attribute} attribute of {element} is not a number: {value:?}")]
    BadNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
}

/// Top-level request parse failure.
#[derive(Debug, Error)]
pub enum BadRequest {
    #[error("empty request")]
    Empty,

    #[error("unrecognized rlcp method")]
    UnsupportedMethod,

    #[error("bad request header: {0}")]
    Header(#[from] BadHeader),

    #[error("bad request body: {0}")]
    Body(#[from] BadBody),
}

/// Top-level response parse failure.
#[derive(Debug, Error)]
pub enum BadResponse {
    #[error("empty response")]
    Empty,

    #[error("bad response header: {0}")]
    Header(#[from] BadHeader),

    #[error("bad response body: {0}")]
    Body(#[from] BadBody),
}

/// A body handed to a method constructor belongs to another method.
#[derive(Debug, Error)]
#[error("body is a {found} body, expected {expected}")]
pub struct WrongBodyMethod {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Terminal failure of a whole request flow, mapped to an Unavailable
/// response by the connection server.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("request flow deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("request processing failed: {0}")]
    Processing(String),
}
