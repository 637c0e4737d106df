//! Calculate method bodies and their XML form.

use crate::error::BadBody;
use crate::xml::{Document, Element};

use super::generate::GeneratingResult;
use super::names;
use super::{add_pre_generated, comment_of, optional_document, parse_pre_generated,
    request_body_to_string, require_document, response_body_to_string};

/// Data returned by Calculate: text for the user, code for the virtual
/// stand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalculatingResult {
    pub text: String,
    pub code: String,
}

impl CalculatingResult {
    pub fn new(text: impl Into<String>, code: impl Into<String>) -> CalculatingResult {
        CalculatingResult {
            text: text.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalculateRequestBody {
    pub condition: String,
    pub instructions: String,
    pub pre_generated: Option<GeneratingResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalculateResponseBody {
    pub result: CalculatingResult,
}

pub(crate) fn parse_request_body(body: &str) -> Result<CalculateRequestBody, BadBody> {
    let document = require_document(body)?;
    let root = &document.root;
    let condition = root
        .descendant(names::CONDITION_FOR_CALCULATING)
        .and_then(|element| comment_of(element, names::INPUT))
        .unwrap_or_default();
    let instructions = comment_of(root, names::INSTRUCTIONS).unwrap_or_default();
    let pre_generated = parse_pre_generated(root);
    Ok(CalculateRequestBody {
        condition,
        instructions,
        pre_generated,
    })
}

pub(crate) fn serialize_request_body(body: &CalculateRequestBody) -> String {
    let mut root = Element::new(names::REQUEST);
    root.add_element(names::CONDITIONS)
        .add_element(names::CONDITION_FOR_CALCULATING)
        .add_element(names::INPUT)
        .add_comment(&body.condition);
    root.add_element(names::INSTRUCTIONS)
        .add_comment(&body.instructions);
    if let Some(pre_generated) = &body.pre_generated {
        add_pre_generated(&mut root, pre_generated);
    }
    request_body_to_string(&Document { root })
}

pub(crate) fn parse_response_body(body: &str) -> Result<CalculateResponseBody, BadBody> {
    let Some(document) = optional_document(body)? else {
        return Ok(CalculateResponseBody::default());
    };
    let result = match document.root.child(names::CALCULATING_RESULT) {
        Some(element) => CalculatingResult {
            text: comment_of(element, names::TEXT).unwrap_or_default(),
            code: comment_of(element, names::CODE).unwrap_or_default(),
        },
        None => CalculatingResult::default(),
    };
    Ok(CalculateResponseBody { result })
}

pub(crate) fn serialize_response_body(body: &CalculateResponseBody) -> String {
    let mut root = Element::new(names::RESPONSE);
    let result = root.add_element(names::CALCULATING_RESULT);
    result.add_element(names::TEXT).add_comment(&body.result.text);
    result.add_element(names::CODE).add_comment(&body.result.code);
    response_body_to_string(&Document { root })
}
