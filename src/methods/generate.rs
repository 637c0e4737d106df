//! Generate method bodies and their XML form.
//!
//! A Generate request carries one condition; the response carries the
//! `(text, code, instructions)` triple that later Check and Calculate calls
//! thread through unchanged as PreGenerated.

use crate::error::BadBody;
use crate::xml::{Document, Element};

use super::names;
use super::{comment_of, optional_document, request_body_to_string, require_document,
    response_body_to_string};

/// Data produced by Generate and substituted into later method calls.
///
/// `text` is shown to the user, `code` feeds the virtual stand, and
/// `instructions` is extra data for server-side processing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratingResult {
    pub text: String,
    pub code: String,
    pub instructions: String,
}

impl GeneratingResult {
    pub fn new(
        text: impl Into<String>,
        code: impl Into<String>,
        instructions: impl Into<String>,
    ) -> GeneratingResult {
        GeneratingResult {
            text: text.into(),
            code: code.into(),
            instructions: instructions.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateRequestBody {
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateResponseBody {
    pub result: GeneratingResult,
}

pub(crate) fn parse_request_body(body: &str) -> Result<GenerateRequestBody, BadBody> {
    let document = require_document(body)?;
    let condition = document
        .root
        .descendant(names::CONDITION_FOR_GENERATING)
        .and_then(|element| comment_of(element, names::INPUT))
        .unwrap_or_default();
    Ok(GenerateRequestBody { condition })
}

pub(crate) fn serialize_request_body(body: &GenerateRequestBody) -> String {
    let mut root = Element::new(names::REQUEST);
    root.add_element(names::CONDITIONS)
        .add_element(names::CONDITION_FOR_GENERATING)
        .add_element(names::INPUT)
        .add_comment(&body.condition);
    request_body_to_string(&Document { root })
}

pub(crate) fn parse_response_body(body: &str) -> Result<GenerateResponseBody, BadBody> {
    let Some(document) = optional_document(body)? else {
        return Ok(GenerateResponseBody::default());
    };
    let result = match document.root.child(names::GENERATING_RESULT) {
        Some(element) => GeneratingResult {
            text: comment_of(element, names::TEXT).unwrap_or_default(),
            code: comment_of(element, names::CODE).unwrap_or_default(),
            instructions: comment_of(element, names::INSTRUCTIONS).unwrap_or_default(),
        },
        None => GeneratingResult::default(),
    };
    Ok(GenerateResponseBody { result })
}

pub(crate) fn serialize_response_body(body: &GenerateResponseBody) -> String {
    let mut root = Element::new(names::RESPONSE);
    let result = root.add_element(names::GENERATING_RESULT);
    result.add_element(names::TEXT).add_comment(&body.result.text);
    result.add_element(names::CODE).add_comment(&body.result.code);
    result
        .add_element(names::INSTRUCTIONS)
        .add_comment(&body.result.instructions);
    response_body_to_string(&Document { root })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_round_trip() {
        let body = GenerateRequestBody {
            condition: "generating cond".to_string(),
        };
        let serialized = serialize_request_body(&body);
        assert!(serialized.starts_with("<?xml"));
        assert!(serialized.contains("<!DOCTYPE Request SYSTEM \"http://de.ifmo.ru/--DTD/Request.dtd\">"));
        assert!(serialized.contains("<!--generating cond-->"));
        assert_eq!(parse_request_body(&serialized).unwrap(), body);
    }

    #[test]
    fn test_response_body_round_trip() {
        let body = GenerateResponseBody {
            result: GeneratingResult::new("text", "code", "instructions"),
        };
        let serialized = serialize_response_body(&body);
        assert!(serialized.contains("<GeneratingResult>"));
        assert_eq!(parse_response_body(&serialized).unwrap(), body);
    }

    #[test]
    fn test_empty_response_body_parses_to_empty_strings() {
        let body = parse_response_body("").unwrap();
        assert_eq!(body.result.text, "");
        assert_eq!(body.result.code, "");
        assert_eq!(body.result.instructions, "");
    }

    #[test]
    fn test_empty_request_body_is_rejected() {
        assert!(parse_request_body("").is_err());
        assert!(parse_request_body("   \n").is_err());
    }

    #[test]
    fn test_malformed_request_body_is_rejected() {
        assert!(parse_request_body("<Request><Conditions>").is_err());
    }
}
