//! RLCP method registry.
//!
//! The four methods form a closed set fixed at compile time. [`Method`] is
//! the dispatch table for everything per-method: canonical names, request and
//! response body parsers and serializers, header builders and the
//! request/response constructors. No other component branches on method
//! names.

pub mod calculate;
pub mod check;
pub mod echo;
pub mod generate;

use std::str::FromStr;

use crate::error::{BadBody, WrongBodyMethod};
use crate::protocol::{Request, RequestHeader, Response, ResponseHeader, Url};
use crate::xml::{Document, Element};

use generate::GeneratingResult;

/// Fixed XML element and attribute vocabulary of the protocol.
pub(crate) mod names {
    pub const REQUEST: &str = "Request";
    pub const RESPONSE: &str = "Response";
    pub const CONDITIONS: &str = "Conditions";
    pub const CONDITION_FOR_GENERATING: &str = "ConditionForGenerating";
    pub const CONDITION_FOR_CHECKING: &str = "ConditionForChecking";
    pub const CONDITION_FOR_CALCULATING: &str = "ConditionForCalculating";
    pub const INPUT: &str = "Input";
    pub const OUTPUT: &str = "Output";
    pub const INSTRUCTIONS: &str = "Instructions";
    pub const PRE_GENERATED: &str = "PreGenerated";
    pub const TEXT: &str = "Text";
    pub const CODE: &str = "Code";
    pub const GENERATING_RESULT: &str = "GeneratingResult";
    pub const CHECKING_RESULT: &str = "CheckingResult";
    pub const CALCULATING_RESULT: &str = "CalculatingResult";
    pub const ID: &str = "id";
    pub const TIME: &str = "Time";
    pub const RESULT: &str = "Result";
}

/// DOCTYPE system-ids stamped on serialized bodies. Compatibility markers
/// only; never validated on parse.
pub(crate) const REQUEST_DTD: &str = "http://de.ifmo.ru/--DTD/Request.dtd";
pub(crate) const RESPONSE_DTD: &str = "http://de.ifmo.ru/--DTD/Response.dtd";

/// One of the four RLCP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Generate,
    Check,
    Calculate,
    Echo,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Generate, Method::Check, Method::Calculate, Method::Echo];

    /// Canonical name, capitalized; uppercased on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Method::Generate => "Generate",
            Method::Check => "Check",
            Method::Calculate => "Calculate",
            Method::Echo => "Echo",
        }
    }

    /// Case-insensitive exact-name lookup.
    pub fn from_name(name: &str) -> Option<Method> {
        Method::ALL
            .iter()
            .copied()
            .find(|method| method.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Schema element names unique to each method; the recognizer falls back
    /// to these when a raw text has no leading method line (responses, bare
    /// bodies).
    fn schema_tokens(self) -> &'static [&'static str] {
        match self {
            Method::Generate => &["conditionforgenerating", "generatingresult"],
            Method::Check => &["conditionforchecking", "checkingresult"],
            Method::Calculate => &["conditionforcalculating", "calculatingresult"],
            Method::Echo => &[],
        }
    }

    /// Recognizes the method of a raw request or response text: exact match
    /// on the first non-empty line, then substring match on per-method schema
    /// element names.
    pub fn recognize(raw: &str) -> Option<Method> {
        if let Some(first) = raw.split(['\r', '\n']).find(|line| !line.trim().is_empty()) {
            if let Some(method) = Method::from_name(first) {
                return Some(method);
            }
        }
        let lower = raw.to_lowercase();
        Method::ALL.iter().copied().find(|method| {
            method
                .schema_tokens()
                .iter()
                .any(|token| lower.contains(token))
        })
    }

    pub fn parse_request_body(self, body: &str) -> Result<RequestBody, BadBody> {
        match self {
            Method::Generate => Ok(RequestBody::Generate(generate::parse_request_body(body)?)),
            Method::Check => Ok(RequestBody::Check(check::parse_request_body(body)?)),
            Method::Calculate => Ok(RequestBody::Calculate(calculate::parse_request_body(body)?)),
            Method::Echo => Ok(RequestBody::Echo),
        }
    }

    pub fn parse_response_body(self, body: &str) -> Result<ResponseBody, BadBody> {
        match self {
            Method::Generate => Ok(ResponseBody::Generate(generate::parse_response_body(body)?)),
            Method::Check => Ok(ResponseBody::Check(check::parse_response_body(body)?)),
            Method::Calculate => Ok(ResponseBody::Calculate(calculate::parse_response_body(body)?)),
            Method::Echo => Ok(ResponseBody::Echo),
        }
    }

    /// Request header for this method.
    pub fn header(self, url: Url, content_length: usize) -> RequestHeader {
        RequestHeader::new(self, url, content_length)
    }

    /// Builds a complete request around a body of this method, computing the
    /// content-length from the serialized body.
    pub fn build_request(self, url: Url, body: RequestBody) -> Result<Request, WrongBodyMethod> {
        if body.method() != self {
            return Err(WrongBodyMethod {
                expected: self.name(),
                found: body.method().name(),
            });
        }
        let header = self.header(url, body.content_length());
        Ok(Request { header, body })
    }

    /// Builds a Success response around a body of this method.
    pub fn build_response(self, body: ResponseBody) -> Result<Response, WrongBodyMethod> {
        if body.method() != self {
            return Err(WrongBodyMethod {
                expected: self.name(),
                found: body.method().name(),
            });
        }
        let header = ResponseHeader::successful(body.content_length());
        Ok(Response {
            header,
            body: Some(body),
        })
    }
}

/// Request body of any method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Generate(generate::GenerateRequestBody),
    Check(check::CheckRequestBody),
    Calculate(calculate::CalculateRequestBody),
    Echo,
}

impl RequestBody {
    pub fn method(&self) -> Method {
        match self {
            RequestBody::Generate(_) => Method::Generate,
            RequestBody::Check(_) => Method::Check,
            RequestBody::Calculate(_) => Method::Calculate,
            RequestBody::Echo => Method::Echo,
        }
    }

    /// Serialized XML form; Echo bodies serialize to the empty string.
    pub fn serialize(&self) -> String {
        match self {
            RequestBody::Generate(body) => generate::serialize_request_body(body),
            RequestBody::Check(body) => check::serialize_request_body(body),
            RequestBody::Calculate(body) => calculate::serialize_request_body(body),
            RequestBody::Echo => String::new(),
        }
    }

    pub fn content_length(&self) -> usize {
        self.serialize().len()
    }
}

/// Response body of any method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Generate(generate::GenerateResponseBody),
    Check(check::CheckResponseBody),
    Calculate(calculate::CalculateResponseBody),
    Echo,
}

impl ResponseBody {
    pub fn method(&self) -> Method {
        match self {
            ResponseBody::Generate(_) => Method::Generate,
            ResponseBody::Check(_) => Method::Check,
            ResponseBody::Calculate(_) => Method::Calculate,
            ResponseBody::Echo => Method::Echo,
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            ResponseBody::Generate(body) => generate::serialize_response_body(body),
            ResponseBody::Check(body) => check::serialize_response_body(body),
            ResponseBody::Calculate(body) => calculate::serialize_response_body(body),
            ResponseBody::Echo => String::new(),
        }
    }

    pub fn content_length(&self) -> usize {
        self.serialize().len()
    }
}

/// Parses a request body string; required to be non-empty XML.
pub(crate) fn require_document(body: &str) -> Result<Document, BadBody> {
    if body.trim().is_empty() {
        return Err(BadBody::MissingElement(names::REQUEST));
    }
    Ok(Document::parse(body)?)
}

/// Parses a response body string; an empty string is a valid empty body.
pub(crate) fn optional_document(body: &str) -> Result<Option<Document>, BadBody> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(Document::parse(body)?))
}

/// Text payload carried as a comment inside a direct child element.
pub(crate) fn comment_of(parent: &Element, name: &str) -> Option<String> {
    parent
        .child(name)
        .and_then(|element| element.comment_text().map(str::to_string))
}

pub(crate) fn int_attr<T: FromStr>(
    element: &Element,
    element_name: &'static str,
    attribute: &'static str,
) -> Result<T, BadBody> {
    let value = element.attr(attribute).ok_or(BadBody::MissingAttribute {
        element: element_name,
        attribute,
    })?;
    value.parse().map_err(|_| BadBody::BadNumber {
        element: element_name,
        attribute,
        value: value.to_string(),
    })
}

/// The PreGenerated triple, when the element is present; absent payload
/// comments read as empty strings.
pub(crate) fn parse_pre_generated(root: &Element) -> Option<GeneratingResult> {
    let element = root.descendant(names::PRE_GENERATED)?;
    Some(GeneratingResult {
        text: comment_of(element, names::TEXT).unwrap_or_default(),
        code: comment_of(element, names::CODE).unwrap_or_default(),
        instructions: comment_of(element, names::INSTRUCTIONS).unwrap_or_default(),
    })
}

pub(crate) fn add_pre_generated(parent: &mut Element, pre_generated: &GeneratingResult) {
    let element = parent.add_element(names::PRE_GENERATED);
    element.add_element(names::TEXT).add_comment(&pre_generated.text);
    element.add_element(names::CODE).add_comment(&pre_generated.code);
    element
        .add_element(names::INSTRUCTIONS)
        .add_comment(&pre_generated.instructions);
}

/// Serializes a request body document: pretty print with the Request
/// DOCTYPE, line endings normalized to LF, trimmed.
pub(crate) fn request_body_to_string(document: &Document) -> String {
    body_to_string(document, names::REQUEST, REQUEST_DTD)
}

/// Serializes a response body document with the Response DOCTYPE.
pub(crate) fn response_body_to_string(document: &Document) -> String {
    body_to_string(document, names::RESPONSE, RESPONSE_DTD)
}

fn body_to_string(document: &Document, doctype_name: &str, system_id: &str) -> String {
    document
        .to_pretty_string(Some((doctype_name, system_id)))
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}
